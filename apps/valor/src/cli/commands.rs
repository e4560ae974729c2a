//! # CLI Command Implementations

use super::{Backend, CliError};
use crate::api;
use crate::config::AppConfig;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use valor_core::primitives::{INDEX_TABLE, MAX_TRAVERSAL_DEPTH};
use valor_core::store::ChangeEvent;
use valor_core::{
    CharacterSnapshot, EntityId, FeedOutcome, MetaData, RecordStorage, Session, ValorError,
};

/// Maximum size of a feed file (100 MB).
const MAX_FEED_FILE_SIZE: u64 = 100 * 1024 * 1024;

// =============================================================================
// FILE VALIDATION
// =============================================================================

/// Canonicalize `path` and require a regular file no larger than `max_size`.
fn validate_input_file(path: &Path, max_size: u64) -> Result<PathBuf, CliError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| format!("invalid file path '{}': {e}", path.display()))?;
    let metadata = std::fs::metadata(&canonical)?;
    if !metadata.is_file() {
        return Err(format!("'{}' is not a regular file", path.display()).into());
    }
    if metadata.len() > max_size {
        return Err(format!(
            "file size {} bytes exceeds maximum allowed {max_size} bytes",
            metadata.len()
        )
        .into());
    }
    Ok(canonical)
}

// =============================================================================
// SESSION LOADING
// =============================================================================

/// Open the configured backend and load what it holds.
pub fn open_session(config: &AppConfig, backend: Backend) -> Result<Session, ValorError> {
    let session = match backend {
        Backend::Memory => Session::for_sheets(),
        Backend::Redb => Session::open_redb(&config.database)?,
    };
    Ok(session.with_config(config.session_config()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &AppConfig, backend: Backend) -> Result<(), CliError> {
    let session = open_session(config, backend)?;

    println!("Valor Sheet Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Address:  {}", config.addr());
    println!("  Backend:  {backend:?}");
    println!("  Database: {}", config.database.display());
    println!();
    println!("Endpoints:");
    println!("  GET  /health                    - Health check");
    println!("  GET  /status                    - Session counts");
    println!("  GET  /entities/{{id}}             - Entity row and payload");
    println!("  POST /entities/{{operation}}      - create, update, delete, embed, transfer, eject");
    println!("  POST /feed                      - Apply external changes");
    println!("  GET  /characters/{{id}}/derived   - Derived sheet");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(config, session).await?;
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create an empty redb database.
pub fn cmd_init(config: &AppConfig, backend: Backend, force: bool) -> Result<(), CliError> {
    if backend == Backend::Memory {
        return Err("init needs the redb backend".into());
    }
    let path = &config.database;
    if path.exists() {
        if !force {
            return Err(format!(
                "database '{}' already exists (use --force to replace it)",
                path.display()
            )
            .into());
        }
        std::fs::remove_file(path)?;
        tracing::info!(path = %path.display(), "removed existing database");
    }
    let session = Session::open_redb(path)?;
    println!(
        "Initialized empty sheet database at {} ({} collections)",
        path.display(),
        session.registered_types().count()
    );
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

pub fn cmd_status(config: &AppConfig, backend: Backend, json_mode: bool) -> Result<(), CliError> {
    let session = open_session(config, backend)?;
    let stats = session.stats();

    if json_mode {
        return print_json(&stats);
    }
    println!("Valor Sheet Status");
    println!("==================");
    println!("Entities:     {}", stats.entities);
    println!("Broken links: {}", stats.broken_links);
    println!("Persistent:   {}", stats.persistent);
    println!();
    for (record_type, count) in &stats.collections {
        println!("  {record_type:<20} {count}");
    }
    Ok(())
}

// =============================================================================
// TREE COMMAND
// =============================================================================

fn label(session: &Session, meta: &MetaData) -> String {
    let payload = session.record(&meta.id);
    ["name", "description"]
        .iter()
        .find_map(|key| payload.and_then(|p| p.get(*key)).and_then(|v| v.as_str()))
        .unwrap_or("")
        .to_string()
}

/// Print `id` and its subtree, depth first, indented by level.
pub fn cmd_tree(
    config: &AppConfig,
    backend: Backend,
    id: &str,
    max_depth: Option<usize>,
) -> Result<(), CliError> {
    let session = open_session(config, backend)?;
    let id = EntityId::new(id);
    let root = session
        .read(&id)
        .ok_or_else(|| ValorError::NotFound(id.to_string()))?;
    let limit = max_depth.unwrap_or(MAX_TRAVERSAL_DEPTH).min(MAX_TRAVERSAL_DEPTH);

    let mut visited = BTreeSet::new();
    let mut stack = vec![(root, 0usize)];
    while let Some((meta, depth)) = stack.pop() {
        if !visited.insert(meta.id.clone()) {
            continue;
        }
        let disabled = if meta.enabled { "" } else { " (disabled)" };
        println!(
            "{:indent$}{} [{}] {}{disabled}",
            "",
            label(&session, meta),
            meta.record_type,
            meta.id,
            indent = depth * 2
        );
        if depth >= limit {
            continue;
        }
        let children: Vec<&MetaData> = meta
            .child_identities()
            .filter_map(|child| session.read(&child.id))
            .collect();
        stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
    }
    Ok(())
}

// =============================================================================
// DERIVATION COMMANDS
// =============================================================================

pub fn cmd_totals(
    config: &AppConfig,
    backend: Backend,
    json_mode: bool,
    id: &str,
) -> Result<(), CliError> {
    let session = open_session(config, backend)?;
    let snapshot = CharacterSnapshot::from_session(&session, &EntityId::new(id))?;
    let totals = snapshot.totals();

    if json_mode {
        return print_json(&totals);
    }
    println!("Point totals for {}", snapshot.name.as_deref().unwrap_or(id));
    println!("  Racial:        {}", totals.racial_points);
    println!("  Attributes:    {}", totals.attribute_points);
    println!("  Advantages:    {}", totals.advantages);
    println!("  Perks:         {}", totals.perks);
    println!("  Disadvantages: {}", totals.disadvantages);
    println!("  Quirks:        {}", totals.quirks);
    println!("  Skills:        {}", totals.skills);
    println!("  Techniques:    {}", totals.techniques);
    println!("  Spells:        {}", totals.spells);
    println!("  Total:         {} / {}", totals.total, totals.budget);
    println!("  Unspent:       {}", totals.unspent);
    Ok(())
}

pub fn cmd_sheet(config: &AppConfig, backend: Backend, id: &str) -> Result<(), CliError> {
    let session = open_session(config, backend)?;
    let snapshot = CharacterSnapshot::from_session(&session, &EntityId::new(id))?;
    print_json(&snapshot.derive())
}

// =============================================================================
// FEED COMMAND
// =============================================================================

/// Parse a feed file: one `ChangeEvent` per non-blank line.
pub fn parse_feed(text: &str) -> Result<Vec<ChangeEvent>, CliError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<ChangeEvent>(line)
                .map_err(|e| -> CliError { format!("line {}: {e}", n + 1).into() })
        })
        .collect()
}

/// Apply a feed file and write what was admitted back to storage.
pub fn cmd_feed(
    config: &AppConfig,
    backend: Backend,
    json_mode: bool,
    file: &Path,
) -> Result<(), CliError> {
    let path = validate_input_file(file, MAX_FEED_FILE_SIZE)?;
    let events = parse_feed(&std::fs::read_to_string(path)?)?;

    let mut session = open_session(config, backend)?;
    let storage = session.storage();
    let mut outcomes = Vec::with_capacity(events.len());
    for event in events {
        // an index delete takes the subtree with it
        let cascade = if event.table == INDEX_TABLE {
            session.descendants_of(&event.key, None)
        } else {
            Vec::new()
        };
        let held = session.read(&event.key);
        let payload_table = held.map(|m| m.record_type.clone());
        let old_parent = held.and_then(|m| m.parent.clone());
        let outcome = session
            .apply_feed([event.clone()])
            .pop()
            .unwrap_or(FeedOutcome::Ignored);

        match (outcome, &event.value) {
            (FeedOutcome::Admitted, Some(value)) => storage.put(&event.table, &event.key, value)?,
            (FeedOutcome::Deleted, _) => {
                storage.delete(&event.table, &event.key)?;
                if event.table == INDEX_TABLE {
                    if let Some(record_type) = payload_table {
                        storage.delete(record_type.as_str(), &event.key)?;
                    }
                    for gone in cascade {
                        storage.delete(gone.record_type.as_str(), &gone.id)?;
                        storage.delete(INDEX_TABLE, &gone.id)?;
                    }
                }
            }
            _ => {}
        }
        if event.table == INDEX_TABLE && outcome != FeedOutcome::Stale {
            let new_parent = session.read(&event.key).and_then(|m| m.parent.clone());
            for parent in old_parent.into_iter().chain(new_parent) {
                if let Some(row) = session.read(&parent.id) {
                    storage.put(INDEX_TABLE, &parent.id, &serde_json::to_value(row)?)?;
                }
            }
        }
        outcomes.push(outcome);
    }

    if json_mode {
        return print_json(&outcomes);
    }
    let count = |wanted: FeedOutcome| outcomes.iter().filter(|o| **o == wanted).count();
    println!("Applied {} feed events", outcomes.len());
    println!("  Admitted: {}", count(FeedOutcome::Admitted));
    println!("  Stale:    {}", count(FeedOutcome::Stale));
    println!("  Deleted:  {}", count(FeedOutcome::Deleted));
    println!("  Ignored:  {}", count(FeedOutcome::Ignored));
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use valor_core::store::ChangeKind;

    #[test]
    fn feed_lines_parse_and_skip_blanks() {
        let text = concat!(
            r#"{"table":"skill","key":"s1","type":"create","value":{"name":"Stealth","__meta__":{"lastEdit":3}}}"#,
            "\n\n",
            r#"{"table":"skill","key":"s1","type":"delete"}"#,
            "\n"
        );
        let events = parse_feed(text).expect("parse");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, ChangeKind::Create);
        assert_eq!(events[1].kind, ChangeKind::Delete);
        assert!(events[1].value.is_none());
    }

    #[test]
    fn feed_errors_name_the_line() {
        let err = parse_feed("{\"table\":\"skill\"}\nnot json").expect_err("bad feed");
        assert!(err.to_string().starts_with("line 1"));
    }

    #[test]
    fn memory_backend_opens_empty() {
        let session = open_session(&AppConfig::default(), Backend::Memory).expect("open");
        assert_eq!(session.stats().entities, 0);
        assert!(!session.stats().persistent);
    }

    #[test]
    fn init_refuses_memory_backend() {
        assert!(cmd_init(&AppConfig::default(), Backend::Memory, false).is_err());
    }

    #[test]
    fn init_creates_and_guards_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            database: dir.path().join("sheet.redb"),
            ..AppConfig::default()
        };
        cmd_init(&config, Backend::Redb, false).expect("init");
        assert!(config.database.exists());
        assert!(cmd_init(&config, Backend::Redb, false).is_err());
        cmd_init(&config, Backend::Redb, true).expect("forced init");
    }

    #[test]
    fn index_delete_feed_removes_subtree_from_storage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            database: dir.path().join("sheet.redb"),
            ..AppConfig::default()
        };
        cmd_init(&config, Backend::Redb, false).expect("init");

        let rows = concat!(
            r#"{"table":"index","key":"bag","type":"create","value":{"id":"bag","type":"equipment","lastEdit":10,"children":{"equipment":{"rope":{"id":"rope","type":"equipment"}}}}}"#,
            "\n",
            r#"{"table":"index","key":"rope","type":"create","value":{"id":"rope","type":"equipment","lastEdit":10,"parent":{"id":"bag","type":"equipment"},"children":{"equipment":{"knot":{"id":"knot","type":"equipment"}}}}}"#,
            "\n",
            r#"{"table":"index","key":"knot","type":"create","value":{"id":"knot","type":"equipment","lastEdit":10,"parent":{"id":"rope","type":"equipment"}}}"#,
            "\n",
            r#"{"table":"equipment","key":"knot","type":"create","value":{"description":"Knot","__meta__":{"lastEdit":10}}}"#,
            "\n"
        );
        let first = dir.path().join("rows.jsonl");
        std::fs::write(&first, rows).expect("write feed");
        cmd_feed(&config, Backend::Redb, true, &first).expect("feed");

        let second = dir.path().join("delete.jsonl");
        std::fs::write(&second, r#"{"table":"index","key":"rope","type":"delete"}"#)
            .expect("write feed");
        cmd_feed(&config, Backend::Redb, true, &second).expect("feed");

        let session = open_session(&config, Backend::Redb).expect("reopen");
        assert!(session.check(&EntityId::new("bag")));
        assert!(!session.check(&EntityId::new("rope")));
        assert!(!session.check(&EntityId::new("knot")));
        let stored = session
            .storage()
            .get("equipment", &EntityId::new("knot"))
            .expect("get");
        assert!(stored.is_none());
        let bag = session.read(&EntityId::new("bag")).expect("bag");
        assert_eq!(bag.child_identities().count(), 0);
        assert!(session.index().broken_links().is_empty());
    }
}
