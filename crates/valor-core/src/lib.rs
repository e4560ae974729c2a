//! # valor-core
//!
//! The character-sheet core for Valor.
//!
//! Two halves share this crate:
//!
//! - the entity graph and sync layer: a `MetaData` index over every entity,
//!   one record collection per entity type, reactive record cells and the
//!   create / update / delete / embed / transfer / eject protocol;
//! - the derivation engine: attributes, skills and techniques, trait cost,
//!   equipment cost and weight, computed from typed snapshots of the graph.
//!
//! A `Session` owns all shared state and is passed explicitly. There are no
//! globals.

// =============================================================================
// MODULES
// =============================================================================

pub mod collection;
pub mod derive;
pub mod graph;
pub mod metadata;
pub mod mutation;
pub mod primitives;
pub mod session;
pub mod storage;
pub mod store;
pub mod types;
pub mod validation;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{EntityId, Identity, RecordType, Timestamp, ValorError, record_types};

// =============================================================================
// RE-EXPORTS: Graph & Protocol
// =============================================================================

pub use collection::Collection;
pub use graph::{BrokenLink, MetaIndex};
pub use metadata::MetaData;
pub use mutation::{
    BatchReport, CreateRequest, CrudOptions, EmbedRequest, ItemOutcome, MutationEngine,
    SkipReason, TransferRequest, UpdateRequest,
};
pub use session::{FeedOutcome, Session, SessionConfig, SessionStats};
pub use storage::{RecordStorage, StorageBackend};
pub use store::{ChangeEvent, ChangeKind, RecordCell};
pub use validation::{AcceptAll, RequiredFields, Validator};

// =============================================================================
// RE-EXPORTS: Derivation
// =============================================================================

pub use derive::{CharacterSnapshot, DerivedSheet, PointTotals};
