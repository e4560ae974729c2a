//! # Core Type Definitions
//!
//! Identifiers, timestamps and the error type shared by every module:
//! - Entity identifiers (`EntityId`, `RecordType`, `Identity`)
//! - Edit timestamps (`Timestamp`)
//! - Error types (`ValorError`)
//!
//! All identifier types implement `Ord` so they can key `BTreeMap`s and
//! produce stable iteration order.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique identifier of an entity within its type namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Name of a record type, which is also the name of its collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordType(pub String);

impl RecordType {
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Record type names used by character sheets.
pub mod record_types {
    pub const CHARACTER: &str = "character";
    pub const SKILL: &str = "skill";
    pub const TECHNIQUE: &str = "technique";
    pub const SPELL: &str = "spell";
    pub const TRAIT: &str = "trait";
    pub const TRAIT_MODIFIER: &str = "modifier";
    pub const EQUIPMENT: &str = "equipment";
    pub const EQUIPMENT_MODIFIER: &str = "equipment modifier";
    pub const MELEE_WEAPON: &str = "melee weapon";
    pub const RANGED_WEAPON: &str = "ranged weapon";

    /// Every record type a sheet session registers by default.
    pub const SHEET_TYPES: [&str; 10] = [
        CHARACTER,
        SKILL,
        TECHNIQUE,
        SPELL,
        TRAIT,
        TRAIT_MODIFIER,
        EQUIPMENT,
        EQUIPMENT_MODIFIER,
        MELEE_WEAPON,
        RANGED_WEAPON,
    ];
}

/// The `{id, type}` pair that addresses one entity. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub record_type: RecordType,
}

impl Identity {
    #[must_use]
    pub fn new(id: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(id),
            record_type: RecordType::new(record_type),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.record_type, self.id)
    }
}

// =============================================================================
// TIMESTAMPS
// =============================================================================

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    #[must_use]
    pub const fn millis(self) -> u64 {
        self.0
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised inside the engine.
///
/// Mutations never surface these to callers directly: the protocol layer
/// logs them and records a per-item outcome instead.
#[derive(Debug, Error)]
pub enum ValorError {
    /// The referenced identity does not exist.
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// A transfer would make an entity its own ancestor.
    #[error("Transfer of {from} under {to} would create a cycle")]
    CycleRejected { from: String, to: String },

    /// No collection is registered for the record type.
    #[error("No collection registered for type: {0}")]
    NoCollection(String),

    /// The payload failed validation or has the wrong shape.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A walk exceeded its bound on a malformed graph.
    #[error("Traversal limit reached at {0}")]
    TraversalLimit(String),

    /// A record cell or writer channel closed unexpectedly.
    #[error("Channel closed: {0}")]
    Channel(String),
}

impl From<serde_json::Error> for ValorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
