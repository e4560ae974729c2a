//! # Mutation Protocol
//!
//! The only writer of the MetaData graph. Six operations, each taking a
//! batch of requests and `CrudOptions`:
//!
//! - `create`: new detached entities
//! - `update`: shallow payload merge plus MetaData field changes
//! - `delete`: remove an entity and cascade to its descendants
//! - `embed`: create an entity directly under a parent
//! - `transfer`: re-parent, refusing cycles and bubbling up to the nearest
//!   container
//! - `eject`: move an entity to its grandparent and flatten its subtree
//!
//! Batches are sequential, not atomic. Every item yields an `ItemOutcome`;
//! absent identities are skipped without error and unexpected failures are
//! logged and recorded as `Failed` so the rest of the batch still runs.

use crate::metadata::{MetaData, TEMPORARY_FLAG};
use crate::primitives::{MAX_TRAIL_LENGTH, META_KEY};
use crate::session::Session;
use crate::store::{ChangeKind, created_stamp, stamp};
use crate::{EntityId, Identity, RecordType, Timestamp, ValorError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// =============================================================================
// REQUESTS & OPTIONS
// =============================================================================

/// Options recognized by every operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrudOptions {
    /// Do not publish on the change bus.
    pub silent: bool,
    /// Keep created entities out of storage.
    pub temporary: bool,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// A new detached entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(default)]
    pub can_contain_children: bool,
}

impl CreateRequest {
    #[must_use]
    pub fn new(record_type: &str, data: Value) -> Self {
        Self {
            id: None,
            record_type: RecordType::new(record_type),
            data,
            can_contain_children: false,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(EntityId::new(id));
        self
    }

    /// Mark the entity as able to hold children.
    #[must_use]
    pub fn container(mut self) -> Self {
        self.can_contain_children = true;
        self
    }
}

/// Changes to an existing entity. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub id: EntityId,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub can_contain_children: Option<bool>,
    #[serde(default)]
    pub flags: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub alternative_ids: Option<BTreeMap<String, EntityId>>,
}

impl UpdateRequest {
    /// Payload-only update.
    #[must_use]
    pub fn data(id: &EntityId, data: Value) -> Self {
        Self {
            id: id.clone(),
            data: match data {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            ..Self::default()
        }
    }
}

/// A new entity created directly under `parent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedRequest {
    pub parent: Identity,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(default)]
    pub can_contain_children: bool,
}

impl EmbedRequest {
    #[must_use]
    pub fn new(parent: &Identity, record_type: &str, data: Value) -> Self {
        Self {
            parent: parent.clone(),
            record_type: RecordType::new(record_type),
            data,
            can_contain_children: false,
        }
    }

    #[must_use]
    pub fn container(mut self) -> Self {
        self.can_contain_children = true;
        self
    }
}

/// Move `from` under `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: Identity,
    pub to: Identity,
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Why an item was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotFound(EntityId),
    NoCollection(RecordType),
    Invalid(String),
    Duplicate(EntityId),
    CycleRejected { from: EntityId, to: EntityId },
    NoEligibleContainer(EntityId),
    NoGrandparent(EntityId),
}

/// Result of one batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemOutcome {
    Applied { identity: Identity },
    Skipped { reason: SkipReason },
    Failed { error: String },
}

impl ItemOutcome {
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Applied { identity } => Some(identity),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Outcomes of a batch, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    /// Identities of the applied items.
    #[must_use]
    pub fn applied(&self) -> Vec<Identity> {
        self.outcomes
            .iter()
            .filter_map(ItemOutcome::identity)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }

    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Skipped { .. }))
            .count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Failed { .. }))
            .count()
    }

    fn push(&mut self, op: &'static str, outcome: ItemOutcome) {
        match &outcome {
            ItemOutcome::Skipped { reason } => tracing::debug!(op, ?reason, "item skipped"),
            ItemOutcome::Failed { error } => tracing::warn!(op, error = %error, "item failed"),
            ItemOutcome::Applied { .. } => {}
        }
        self.outcomes.push(outcome);
    }
}

fn skipped(reason: SkipReason) -> ItemOutcome {
    ItemOutcome::Skipped { reason }
}

fn failed(e: &ValorError) -> ItemOutcome {
    ItemOutcome::Failed {
        error: e.to_string(),
    }
}

// =============================================================================
// MUTATION ENGINE
// =============================================================================

/// Entry points of the mutation protocol.
pub struct MutationEngine;

impl MutationEngine {
    /// Create detached entities. Every entity of one batch shares `createdOn`.
    pub fn create(
        session: &mut Session,
        requests: impl IntoIterator<Item = CreateRequest>,
        options: CrudOptions,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let created_on = session.tick();
        for request in requests {
            let outcome = create_one(session, request, created_on, options);
            report.push("create", outcome);
        }
        report
    }

    /// Merge changes into existing entities. Absent ids are skipped.
    pub fn update(
        session: &mut Session,
        requests: impl IntoIterator<Item = UpdateRequest>,
        options: CrudOptions,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let last_edit = session.tick();
        for request in requests {
            let outcome = update_one(session, request, last_edit, options);
            report.push("update", outcome);
        }
        report
    }

    /// Delete entities and everything below them.
    pub fn delete(
        session: &mut Session,
        identities: impl IntoIterator<Item = Identity>,
        options: CrudOptions,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for identity in identities {
            let outcome = delete_one(session, &identity, options);
            report.push("delete", outcome);
        }
        report
    }

    /// Create entities under existing parents.
    pub fn embed(
        session: &mut Session,
        requests: impl IntoIterator<Item = EmbedRequest>,
        options: CrudOptions,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let created_on = session.tick();
        for request in requests {
            let outcome = embed_one(session, request, created_on, options);
            report.push("embed", outcome);
        }
        report
    }

    /// Re-parent entities.
    pub fn transfer(
        session: &mut Session,
        requests: impl IntoIterator<Item = TransferRequest>,
        options: CrudOptions,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for request in requests {
            let outcome = transfer_one(session, &request.from, &request.to, options);
            report.push("transfer", outcome);
        }
        report
    }

    /// Move entities to their grandparent and flatten their subtrees there.
    pub fn eject(
        session: &mut Session,
        identities: impl IntoIterator<Item = Identity>,
        options: CrudOptions,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for identity in identities {
            let outcome = eject_one(session, &identity, options);
            report.push("eject", outcome);
        }
        report
    }
}

// =============================================================================
// CREATE / EMBED
// =============================================================================

/// Payload as stored: the request data plus `id`, `type` and `__meta__`.
fn build_payload(
    data: Value,
    identity: &Identity,
    created_on: Timestamp,
    last_edit: Timestamp,
) -> Option<Value> {
    let Value::Object(mut object) = data else {
        return None;
    };
    object.insert("id".to_string(), Value::from(identity.id.as_str()));
    object.insert("type".to_string(), Value::from(identity.record_type.as_str()));
    Some(stamp(Value::Object(object), created_on, last_edit))
}

fn create_one(
    session: &mut Session,
    request: CreateRequest,
    created_on: Timestamp,
    options: CrudOptions,
) -> ItemOutcome {
    if session.collection(&request.record_type).is_none() {
        return skipped(SkipReason::NoCollection(request.record_type));
    }
    if !session
        .validator()
        .validate(&request.record_type, &request.data)
    {
        return skipped(SkipReason::Invalid(format!(
            "{} payload rejected",
            request.record_type
        )));
    }

    let id = request.id.unwrap_or_else(EntityId::generate);
    if session.check(&id) {
        return skipped(SkipReason::Duplicate(id));
    }
    let identity = Identity {
        id,
        record_type: request.record_type,
    };
    let Some(payload) = build_payload(request.data, &identity, created_on, created_on) else {
        return skipped(SkipReason::Invalid("payload must be an object".to_string()));
    };

    let mut meta = MetaData::new(&identity, created_on);
    meta.can_contain_children = request.can_contain_children;
    if options.temporary {
        meta.flags
            .insert(TEMPORARY_FLAG.to_string(), Value::Bool(true));
    }

    if let Some(collection) = session.collection_mut(&identity.record_type) {
        collection.insert(identity.id.clone(), payload);
    }
    session.index_mut().insert(meta);

    if let Err(e) = session.persist(&identity.id) {
        return failed(&e);
    }
    if !options.silent {
        session.publish_upsert(&identity.id, ChangeKind::Create);
    }
    ItemOutcome::Applied { identity }
}

fn embed_one(
    session: &mut Session,
    request: EmbedRequest,
    created_on: Timestamp,
    options: CrudOptions,
) -> ItemOutcome {
    if !session.check(&request.parent.id) {
        return skipped(SkipReason::NotFound(request.parent.id));
    }
    let parent = request.parent;
    let create = CreateRequest {
        id: None,
        record_type: request.record_type,
        data: request.data,
        can_contain_children: request.can_contain_children,
    };
    let outcome = create_one(session, create, created_on, CrudOptions { silent: true, ..options });
    let ItemOutcome::Applied { identity } = outcome else {
        return outcome;
    };

    session.index_mut().link(&identity, &parent);
    touch(session, &parent.id, created_on);
    let persisted = session
        .persist_meta(&identity.id)
        .and_then(|()| session.persist_meta(&parent.id));
    if let Err(e) = persisted {
        return failed(&e);
    }
    if !options.silent {
        session.publish_upsert(&identity.id, ChangeKind::Create);
        session.publish_meta(&parent.id);
    }
    ItemOutcome::Applied { identity }
}

// =============================================================================
// UPDATE
// =============================================================================

fn update_one(
    session: &mut Session,
    request: UpdateRequest,
    last_edit: Timestamp,
    options: CrudOptions,
) -> ItemOutcome {
    let Some(meta) = session.read(&request.id) else {
        return skipped(SkipReason::NotFound(request.id));
    };
    let record_type = meta.record_type.clone();
    let Some(current) = session
        .collection(&record_type)
        .map(|c| c.get(&request.id).cloned())
    else {
        return skipped(SkipReason::NoCollection(record_type));
    };

    let mut patch = request.data;
    for reserved in ["id", "type", META_KEY] {
        patch.remove(reserved);
    }

    let mut merged = current.unwrap_or_else(empty_object);
    crate::collection::merge_object(&mut merged, &patch);
    if !session.validator().validate(&record_type, &merged) {
        return skipped(SkipReason::Invalid(format!("{record_type} payload rejected")));
    }
    let created_on = created_stamp(&merged).unwrap_or(last_edit);
    let merged = stamp(merged, created_on, last_edit);

    if let Some(collection) = session.collection_mut(&record_type) {
        collection.insert(request.id.clone(), merged);
    }
    if let Some(row) = session.index_mut().get_mut(&request.id) {
        row.last_edit = last_edit;
        if let Some(enabled) = request.enabled {
            row.enabled = enabled;
        }
        if let Some(container) = request.can_contain_children {
            row.can_contain_children = container;
        }
        if let Some(flags) = request.flags {
            row.flags.extend(flags);
        }
        if let Some(aliases) = request.alternative_ids {
            row.alternative_ids.extend(aliases);
        }
    }

    if let Err(e) = session.persist(&request.id) {
        return failed(&e);
    }
    if !options.silent {
        session.publish_upsert(&request.id, ChangeKind::Update);
    }
    ItemOutcome::Applied {
        identity: Identity {
            id: request.id,
            record_type,
        },
    }
}

// =============================================================================
// DELETE
// =============================================================================

fn delete_one(session: &mut Session, identity: &Identity, options: CrudOptions) -> ItemOutcome {
    if !session.check(&identity.id) {
        return skipped(SkipReason::NotFound(identity.id.clone()));
    }
    let record_type = session
        .read(&identity.id)
        .map(|m| m.record_type.clone())
        .unwrap_or_else(|| identity.record_type.clone());
    if session.collection(&record_type).is_none() {
        return skipped(SkipReason::NoCollection(record_type));
    }
    let identity = Identity {
        id: identity.id.clone(),
        record_type,
    };

    let descendants = session.descendants_of(&identity.id, None);
    if let Err(e) = remove_entity(session, &identity, options) {
        return failed(&e);
    }

    let mut errors = Vec::new();
    for descendant in descendants {
        if !session.check(&descendant.id) {
            continue;
        }
        if let Err(e) = remove_entity(session, &descendant, options) {
            tracing::warn!(id = %descendant.id, error = %e, "cascade delete failed");
            errors.push(e.to_string());
        }
    }
    if !errors.is_empty() {
        return ItemOutcome::Failed {
            error: errors.join("; "),
        };
    }
    ItemOutcome::Applied { identity }
}

/// Remove one entity: its parent's child entry, its payload and its row.
fn remove_entity(
    session: &mut Session,
    identity: &Identity,
    options: CrudOptions,
) -> Result<(), ValorError> {
    let record_type = session
        .read(&identity.id)
        .map(|m| m.record_type.clone())
        .ok_or_else(|| ValorError::NotFound(identity.id.to_string()))?;
    let identity = Identity {
        id: identity.id.clone(),
        record_type,
    };

    if let Some(parent) = session.index_mut().unlink(&identity) {
        let now = session.tick();
        touch(session, &parent.id, now);
        session.persist_meta(&parent.id)?;
        if !options.silent {
            session.publish_meta(&parent.id);
        }
    }

    if let Some(collection) = session.collection_mut(&identity.record_type) {
        collection.remove(&identity.id);
    }
    session.index_mut().remove(&identity.id);
    session.unpersist(&identity)?;
    if !options.silent {
        session.publish_delete(&identity);
    }
    Ok(())
}

// =============================================================================
// TRANSFER / EJECT
// =============================================================================

fn touch(session: &mut Session, id: &EntityId, at: Timestamp) {
    if let Some(row) = session.index_mut().get_mut(id) {
        row.last_edit = row.last_edit.max(at);
    }
}

/// Resolve the container `from` would actually land in, starting at `to`.
///
/// Walks up from `to` while the candidate cannot contain children. Every
/// candidate is checked against the trail so no step can close a cycle.
fn resolve_target(
    session: &Session,
    from: &Identity,
    to: &Identity,
) -> Result<Identity, SkipReason> {
    let mut target = to.clone();
    for _ in 0..MAX_TRAIL_LENGTH {
        if target.id == from.id || session.index().is_ancestor(&from.id, &target.id) {
            return Err(SkipReason::CycleRejected {
                from: from.id.clone(),
                to: target.id.clone(),
            });
        }
        let Some(meta) = session.read(&target.id) else {
            return Err(SkipReason::NotFound(target.id));
        };
        if meta.can_contain_children {
            return Ok(meta.identity());
        }
        match &meta.parent {
            Some(parent) if session.check(&parent.id) => target = parent.clone(),
            _ => return Err(SkipReason::NoEligibleContainer(to.id.clone())),
        }
    }
    Err(SkipReason::NoEligibleContainer(to.id.clone()))
}

fn transfer_one(
    session: &mut Session,
    from: &Identity,
    to: &Identity,
    options: CrudOptions,
) -> ItemOutcome {
    if !session.check(&from.id) {
        return skipped(SkipReason::NotFound(from.id.clone()));
    }
    if !session.check(&to.id) {
        return skipped(SkipReason::NotFound(to.id.clone()));
    }
    let target = match resolve_target(session, from, to) {
        Ok(target) => target,
        Err(reason) => return skipped(reason),
    };
    let Some(from) = session.read(&from.id).map(MetaData::identity) else {
        return skipped(SkipReason::NotFound(from.id.clone()));
    };

    let now = session.tick();
    let mut touched = vec![from.id.clone(), target.id.clone()];
    if let Some(origin) = session.index_mut().unlink(&from) {
        touched.push(origin.id);
    }
    session.index_mut().link(&from, &target);

    for id in &touched {
        touch(session, id, now);
    }
    for id in &touched {
        if let Err(e) = session.persist_meta(id) {
            return failed(&e);
        }
    }
    if !options.silent {
        for id in &touched {
            session.publish_meta(id);
        }
    }
    ItemOutcome::Applied { identity: from }
}

fn eject_one(session: &mut Session, identity: &Identity, options: CrudOptions) -> ItemOutcome {
    if !session.check(&identity.id) {
        return skipped(SkipReason::NotFound(identity.id.clone()));
    }

    let mut queue = VecDeque::from([identity.clone()]);
    let mut visited = BTreeSet::new();
    let mut root_outcome = None;

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.id.clone()) {
            continue;
        }
        let Some(meta) = session.read(&current.id) else {
            continue;
        };
        let former_children: Vec<Identity> = meta.child_identities().cloned().collect();
        let grandparent = meta
            .parent
            .as_ref()
            .and_then(|parent| session.read(&parent.id))
            .and_then(|parent| parent.parent.clone())
            .filter(|grand| session.check(&grand.id));

        let outcome = match grandparent {
            Some(grand) => transfer_one(session, &current, &grand, options),
            None => skipped(SkipReason::NoGrandparent(current.id.clone())),
        };
        let moved = outcome.is_applied();
        if root_outcome.is_none() {
            root_outcome = Some(outcome);
        }
        if moved {
            queue.extend(former_children);
        }
    }

    root_outcome.unwrap_or_else(|| skipped(SkipReason::NotFound(identity.id.clone())))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RecordStorage;
    use crate::primitives::INDEX_TABLE;
    use serde_json::json;

    fn opts() -> CrudOptions {
        CrudOptions::default()
    }

    fn create(session: &mut Session, id: &str, ty: &str, container: bool) -> Identity {
        let mut request = CreateRequest::new(ty, json!({"name": id, "description": id})).with_id(id);
        request.can_contain_children = container;
        let report = MutationEngine::create(session, [request], opts());
        report.applied().into_iter().next().expect("created")
    }

    fn transfer(session: &mut Session, from: &Identity, to: &Identity) -> BatchReport {
        MutationEngine::transfer(
            session,
            [TransferRequest {
                from: from.clone(),
                to: to.clone(),
            }],
            opts(),
        )
    }

    fn parent_of(session: &Session, id: &Identity) -> Option<EntityId> {
        session
            .read(&id.id)
            .and_then(|m| m.parent.as_ref())
            .map(|p| p.id.clone())
    }

    #[test]
    fn create_assigns_ids_and_fresh_rows() {
        let mut session = Session::for_sheets();
        let report = MutationEngine::create(
            &mut session,
            [
                CreateRequest::new("skill", json!({"name": "Stealth"})),
                CreateRequest::new("skill", json!({"name": "Climbing"})),
            ],
            opts(),
        );
        let created = report.applied();
        assert_eq!(created.len(), 2);
        assert_ne!(created[0].id, created[1].id);

        let a = session.read(&created[0].id).expect("row");
        let b = session.read(&created[1].id).expect("row");
        assert!(a.enabled && a.parent.is_none() && a.children.is_empty());
        assert_eq!(a.created_on, b.created_on);

        let payload = session.record(&created[0].id).expect("payload");
        assert_eq!(payload["name"], "Stealth");
        assert_eq!(payload["type"], "skill");
        assert!(payload[META_KEY]["createdOn"].is_u64());
    }

    #[test]
    fn create_skips_unknown_type_and_invalid_payload() {
        let mut session = Session::for_sheets();
        let report = MutationEngine::create(
            &mut session,
            [
                CreateRequest::new("spaceship", json!({})),
                CreateRequest::new("skill", json!({"points": 1})),
                CreateRequest::new("skill", json!({"name": "Fast-Draw"})),
            ],
            opts(),
        );
        assert_eq!(report.skipped_count(), 2);
        assert_eq!(report.applied_count(), 1);
    }

    #[test]
    fn update_merges_payload_and_skips_missing() {
        let mut session = Session::for_sheets();
        let skill = create(&mut session, "s1", "skill", false);
        let before = session.read(&skill.id).map(|m| m.last_edit).expect("row");

        let report = MutationEngine::update(
            &mut session,
            [
                UpdateRequest::data(&skill.id, json!({"points": 4, "id": "hijack"})),
                UpdateRequest::data(&EntityId::new("ghost"), json!({"points": 1})),
            ],
            opts(),
        );
        assert_eq!(report.applied_count(), 1);
        assert_eq!(
            report.outcomes[1],
            ItemOutcome::Skipped {
                reason: SkipReason::NotFound(EntityId::new("ghost"))
            }
        );

        let payload = session.record(&skill.id).expect("payload");
        assert_eq!(payload["points"], 4);
        assert_eq!(payload["name"], "s1");
        assert_eq!(payload["id"], "s1");
        assert!(session.read(&skill.id).map(|m| m.last_edit).expect("row") > before);
    }

    #[test]
    fn update_can_disable_entity() {
        let mut session = Session::for_sheets();
        let skill = create(&mut session, "s1", "skill", false);
        let request = UpdateRequest {
            id: skill.id.clone(),
            enabled: Some(false),
            ..UpdateRequest::default()
        };
        MutationEngine::update(&mut session, [request], opts());
        assert!(!session.read(&skill.id).expect("row").enabled);
    }

    #[test]
    fn embed_links_both_halves() {
        let mut session = Session::for_sheets();
        let character = create(&mut session, "c", "character", true);
        let report = MutationEngine::embed(
            &mut session,
            [EmbedRequest::new(&character, "skill", json!({"name": "Stealth"}))],
            opts(),
        );
        let child = report.applied().into_iter().next().expect("embedded");
        assert_eq!(parent_of(&session, &child), Some(character.id.clone()));
        assert!(session.read(&character.id).expect("row").has_child(&child));
        assert!(session.index().broken_links().is_empty());
    }

    #[test]
    fn embed_under_missing_parent_is_skipped() {
        let mut session = Session::for_sheets();
        let report = MutationEngine::embed(
            &mut session,
            [EmbedRequest::new(
                &Identity::new("ghost", "character"),
                "skill",
                json!({"name": "Stealth"}),
            )],
            opts(),
        );
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(session.index().len(), 0);
    }

    #[test]
    fn transfer_moves_and_keeps_reciprocity() {
        let mut session = Session::for_sheets();
        let a = create(&mut session, "a", "equipment", true);
        let b = create(&mut session, "b", "equipment", true);
        let item = create(&mut session, "item", "equipment", false);

        transfer(&mut session, &item, &a);
        assert_eq!(parent_of(&session, &item), Some(a.id.clone()));
        transfer(&mut session, &item, &b);
        assert_eq!(parent_of(&session, &item), Some(b.id.clone()));
        assert!(session.read(&a.id).expect("row").children.is_empty());
        assert!(session.index().broken_links().is_empty());
    }

    #[test]
    fn transfer_rejects_cycles_without_mutation() {
        let mut session = Session::for_sheets();
        let a = create(&mut session, "a", "equipment", true);
        let b = create(&mut session, "b", "equipment", true);
        transfer(&mut session, &b, &a);

        let report = transfer(&mut session, &a, &b);
        assert!(matches!(
            report.outcomes[0],
            ItemOutcome::Skipped {
                reason: SkipReason::CycleRejected { .. }
            }
        ));
        assert!(session.read(&a.id).expect("row").parent.is_none());

        let report = transfer(&mut session, &a, &a);
        assert_eq!(report.skipped_count(), 1);
        assert!(session.read(&a.id).expect("row").parent.is_none());
    }

    #[test]
    fn transfer_bubbles_to_nearest_container() {
        let mut session = Session::for_sheets();
        let bag = create(&mut session, "bag", "equipment", true);
        let rope = create(&mut session, "rope", "equipment", false);
        let knife = create(&mut session, "knife", "equipment", false);
        transfer(&mut session, &rope, &bag);

        transfer(&mut session, &knife, &rope);
        assert_eq!(parent_of(&session, &knife), Some(bag.id.clone()));
    }

    #[test]
    fn transfer_without_any_container_is_skipped() {
        let mut session = Session::for_sheets();
        let rope = create(&mut session, "rope", "equipment", false);
        let knife = create(&mut session, "knife", "equipment", false);
        let report = transfer(&mut session, &knife, &rope);
        assert_eq!(
            report.outcomes[0],
            ItemOutcome::Skipped {
                reason: SkipReason::NoEligibleContainer(rope.id.clone())
            }
        );
    }

    #[test]
    fn delete_cascades_to_descendants() {
        let mut session = Session::for_sheets();
        let root = create(&mut session, "root", "character", true);
        let bag = create(&mut session, "bag", "equipment", true);
        let coin = create(&mut session, "coin", "equipment", false);
        transfer(&mut session, &bag, &root);
        transfer(&mut session, &coin, &bag);

        let report = MutationEngine::delete(&mut session, [bag.clone()], opts());
        assert_eq!(report.applied_count(), 1);
        assert!(!session.check(&bag.id));
        assert!(!session.check(&coin.id));
        assert!(session.record(&coin.id).is_none());
        assert!(session.read(&root.id).expect("row").children.is_empty());
        assert!(session.index().broken_links().is_empty());

        let storage = session.storage();
        assert!(storage.get(INDEX_TABLE, &coin.id).expect("get").is_none());
        assert!(storage.get("equipment", &coin.id).expect("get").is_none());
    }

    #[test]
    fn delete_missing_is_skipped_and_batch_continues() {
        let mut session = Session::for_sheets();
        let skill = create(&mut session, "s", "skill", false);
        let report = MutationEngine::delete(
            &mut session,
            [Identity::new("ghost", "skill"), skill.clone()],
            opts(),
        );
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.applied_count(), 1);
        assert!(!session.check(&skill.id));
    }

    #[test]
    fn eject_promotes_and_flattens() {
        let mut session = Session::for_sheets();
        let root = create(&mut session, "root", "character", true);
        let bag = create(&mut session, "bag", "equipment", true);
        let pouch = create(&mut session, "pouch", "equipment", true);
        let coin = create(&mut session, "coin", "equipment", false);
        transfer(&mut session, &bag, &root);
        transfer(&mut session, &pouch, &bag);
        transfer(&mut session, &coin, &pouch);

        let report = MutationEngine::eject(&mut session, [pouch.clone()], opts());
        assert_eq!(report.applied_count(), 1);
        assert_eq!(parent_of(&session, &pouch), Some(root.id.clone()));
        assert_eq!(parent_of(&session, &coin), Some(root.id.clone()));
        assert!(session.read(&bag.id).expect("row").children.is_empty());
        assert!(session.index().broken_links().is_empty());
    }

    #[test]
    fn eject_without_grandparent_is_skipped() {
        let mut session = Session::for_sheets();
        let root = create(&mut session, "root", "character", true);
        let skill = create(&mut session, "s", "skill", false);
        transfer(&mut session, &skill, &root);
        let report = MutationEngine::eject(&mut session, [skill.clone()], opts());
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(parent_of(&session, &skill), Some(root.id));
    }

    #[test]
    fn silent_mutations_do_not_publish() {
        let mut session = Session::for_sheets();
        let mut rx = session.subscribe();
        MutationEngine::create(
            &mut session,
            [CreateRequest::new("skill", json!({"name": "Stealth"}))],
            CrudOptions {
                silent: true,
                temporary: false,
            },
        );
        assert!(rx.try_recv().is_err());

        MutationEngine::create(
            &mut session,
            [CreateRequest::new("skill", json!({"name": "Climbing"}))],
            opts(),
        );
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn temporary_entities_are_not_persisted() {
        let mut session = Session::for_sheets();
        let report = MutationEngine::create(
            &mut session,
            [CreateRequest::new("skill", json!({"name": "Stealth"}))],
            CrudOptions {
                silent: false,
                temporary: true,
            },
        );
        let skill = report.applied().into_iter().next().expect("created");
        assert!(session.check(&skill.id));
        assert!(session.read(&skill.id).expect("row").is_temporary());
        let storage = session.storage();
        assert!(storage.get(INDEX_TABLE, &skill.id).expect("get").is_none());
    }
}
