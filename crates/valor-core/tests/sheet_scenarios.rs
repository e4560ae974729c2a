//! # Sheet Scenarios
//!
//! End-to-end runs through a session: build a character with the mutation
//! protocol, derive its sheet, persist and reload, and replay change feeds.

#![allow(clippy::unwrap_used, clippy::panic)]

use serde_json::{Value, json};
use valor_core::derive::attribute::{SPEED, MOVE};
use valor_core::store::{CellEvent, ChangeEvent, ChangeKind};
use valor_core::{
    CharacterSnapshot, CreateRequest, CrudOptions, EmbedRequest, FeedOutcome, Identity,
    MutationEngine, RecordStorage, Session,
};

// =============================================================================
// HELPERS
// =============================================================================

fn create(session: &mut Session, ty: &str, data: Value) -> Identity {
    MutationEngine::create(
        session,
        [CreateRequest::new(ty, data).container()],
        CrudOptions::default(),
    )
    .applied()
    .into_iter()
    .next()
    .expect("created")
}

fn embed(session: &mut Session, parent: &Identity, ty: &str, data: Value) -> Identity {
    MutationEngine::embed(
        session,
        [EmbedRequest::new(parent, ty, data).container()],
        CrudOptions::default(),
    )
    .applied()
    .into_iter()
    .next()
    .expect("embedded")
}

fn fighter(session: &mut Session) -> Identity {
    create(
        session,
        "character",
        json!({
            "pointTotal": 100,
            "profile": {"name": "Brand"},
            "attributeLevels": {
                "DX": {"levelsIncreased": 3},
                "HT": {"levelsIncreased": 2}
            }
        }),
    )
}

// =============================================================================
// DERIVATION THROUGH THE GRAPH
// =============================================================================

#[test]
fn speed_and_move_follow_dx_and_ht() {
    let mut session = Session::for_sheets();
    let pc = fighter(&mut session);
    let sheet = CharacterSnapshot::from_session(&session, &pc.id)
        .expect("snapshot")
        .derive();
    assert_eq!(sheet.attributes[SPEED].level, 6.25);
    assert_eq!(sheet.attributes[MOVE].level, 6.0);
    assert_eq!(sheet.attributes["DX"].points, 60.0);
}

#[test]
fn trait_with_percentage_limitation() {
    let mut session = Session::for_sheets();
    let pc = fighter(&mut session);
    let reflexes = embed(
        &mut session,
        &pc,
        "trait",
        json!({"name": "Combat Reflexes", "basePoints": 10}),
    );
    embed(
        &mut session,
        &reflexes,
        "modifier",
        json!({"name": "Only vs. melee", "cost": -20, "costType": "percentage"}),
    );

    let sheet = CharacterSnapshot::from_session(&session, &pc.id)
        .expect("snapshot")
        .derive();
    assert_eq!(sheet.traits.len(), 1);
    assert_eq!(sheet.traits[0].adjusted_points, 8.0);
    assert_eq!(sheet.totals.advantages, 8.0);
}

#[test]
fn technique_is_clamped_by_its_limit() {
    let mut session = Session::for_sheets();
    let pc = fighter(&mut session);
    embed(
        &mut session,
        &pc,
        "skill",
        json!({"name": "Broadsword", "difficulty": "A", "points": 4}),
    );
    embed(
        &mut session,
        &pc,
        "technique",
        json!({
            "name": "Feint",
            "difficulty": "A",
            "points": 10,
            "default": {"type": "Skill", "name": "Broadsword", "modifier": -2},
            "limit": 2
        }),
    );

    let sheet = CharacterSnapshot::from_session(&session, &pc.id)
        .expect("snapshot")
        .derive();
    let level_of = |name: &str| {
        sheet
            .skills
            .iter()
            .find(|s| s.name == name)
            .map(|s| (s.level, s.relative_level))
            .expect("resolved")
    };
    assert_eq!(level_of("Broadsword"), (14.0, 1.0));
    assert_eq!(level_of("Feint"), (16.0, 2.0));
    assert_eq!(sheet.totals.skills, 4.0);
    assert_eq!(sheet.totals.techniques, 10.0);
}

#[test]
fn cost_factor_floors_at_a_fifth_of_the_price() {
    let mut session = Session::for_sheets();
    let pc = fighter(&mut session);
    let sword = embed(
        &mut session,
        &pc,
        "equipment",
        json!({"description": "Cheap sword", "value": 100, "weight": 3}),
    );
    embed(
        &mut session,
        &sword,
        "equipment modifier",
        json!({"name": "Cheap", "cost": "-1cf", "costType": "to_base_cost"}),
    );

    let sheet = CharacterSnapshot::from_session(&session, &pc.id)
        .expect("snapshot")
        .derive();
    assert_eq!(sheet.equipment[0].adjusted_value, 20.0);
    assert_eq!(sheet.carried_weight, 3.0);
}

#[test]
fn heavy_pack_raises_encumbrance() {
    let mut session = Session::for_sheets();
    let pc = fighter(&mut session);
    let pack = embed(
        &mut session,
        &pc,
        "equipment",
        json!({"description": "Pack", "weight": 5}),
    );
    embed(
        &mut session,
        &pack,
        "equipment",
        json!({"description": "Ingot", "weight": 10, "quantity": 3}),
    );

    let sheet = CharacterSnapshot::from_session(&session, &pc.id)
        .expect("snapshot")
        .derive();
    // ST 10: basic lift 20; 35 lb is within 2x.
    assert_eq!(sheet.basic_lift, 20.0);
    assert_eq!(sheet.carried_weight, 35.0);
    assert_eq!(sheet.encumbrance_level, -1);
    assert_eq!(sheet.encumbered_dodge, (sheet.dodge * 0.8).floor());
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[test]
fn redb_session_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sheet.redb");

    let (pc, skill, scratch) = {
        let mut session = Session::open_redb(&path).expect("open");
        let pc = fighter(&mut session);
        let skill = embed(&mut session, &pc, "skill", json!({"name": "Stealth", "points": 2}));
        let scratch = MutationEngine::embed(
            &mut session,
            [EmbedRequest::new(&pc, "skill", json!({"name": "Draft"}))],
            CrudOptions {
                temporary: true,
                ..CrudOptions::default()
            },
        )
        .applied()
        .into_iter()
        .next()
        .expect("scratch");
        (pc, skill, scratch)
    };

    let session = Session::open_redb(&path).expect("reopen");
    assert!(session.check(&pc.id));
    assert!(session.check(&skill.id));
    assert!(!session.check(&scratch.id));
    assert_eq!(session.record(&skill.id).expect("payload")["name"], "Stealth");

    let row = session.read(&pc.id).expect("row");
    assert!(row.has_child(&skill));
    assert!(!row.has_child(&scratch));
    assert!(session.index().broken_links().is_empty());
}

// =============================================================================
// CHANGE FEED & RECORD CELLS
// =============================================================================

#[test]
fn replayed_feed_is_idempotent() {
    let mut session = Session::for_sheets();
    let pc = fighter(&mut session);
    let skill = embed(&mut session, &pc, "skill", json!({"name": "Stealth", "points": 1}));

    let mut remote = session.record(&skill.id).expect("payload").clone();
    remote["points"] = json!(8);
    remote["__meta__"]["lastEdit"] = json!(1_000_000);
    let event = ChangeEvent::upsert("skill", &skill.id, ChangeKind::Update, remote);

    let first = session.apply_feed([event.clone()]);
    let second = session.apply_feed([event]);
    assert_eq!(first, vec![FeedOutcome::Admitted]);
    assert_eq!(second, vec![FeedOutcome::Stale]);
    assert_eq!(session.record(&skill.id).expect("payload")["points"], 8);
}

#[tokio::test]
async fn record_cell_persists_edits_and_sees_deletes() {
    let mut session = Session::for_sheets();
    let pc = fighter(&mut session);
    let skill = embed(&mut session, &pc, "skill", json!({"name": "Stealth", "points": 1}));

    let cell = session.open_cell(&skill).expect("cell");
    let mut events = cell.subscribe().expect("live cell");

    let stamped = cell
        .edit(json!({"name": "Stealth", "points": 4}))
        .expect("edit");
    assert!(matches!(events.recv().await, Ok(CellEvent::Changed(v)) if v == stamped));
    cell.flush().await.expect("flush");

    let stored = session
        .storage()
        .get("skill", &skill.id)
        .expect("get")
        .expect("row");
    assert_eq!(stored["points"], 4);

    MutationEngine::delete(&mut session, [skill.clone()], CrudOptions::default());
    assert!(matches!(events.recv().await, Ok(CellEvent::Deleted)));
    assert!(cell.is_deleted());
}
