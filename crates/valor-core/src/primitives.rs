//! # Primitives
//!
//! Runtime constants shared by the graph, the record store and the
//! derivation engine. These are compiled in; the app layer may override the
//! debounce window through `SessionConfig`.

/// Debounce window for durable writes, in milliseconds.
///
/// Edits to one record that arrive within this window coalesce into a single
/// storage write.
pub const DEBOUNCE_WINDOW_MS: u64 = 250;

/// Hard ceiling on the depth of a descendant walk.
///
/// `descendants_of(id, None)` is "unbounded" from the caller's point of view,
/// but a corrupted children index must still terminate.
pub const MAX_TRAVERSAL_DEPTH: usize = 1024;

/// Maximum number of ancestors returned by a trail walk.
pub const MAX_TRAIL_LENGTH: usize = 1024;

/// Key under which the store keeps `{ createdOn, lastEdit }` on every payload.
pub const META_KEY: &str = "__meta__";

/// Name of the storage table holding the MetaData index.
pub const INDEX_TABLE: &str = "index";

// =============================================================================
// DERIVATION CONSTANTS
// =============================================================================

/// Lowest net percentage a trait modifier bucket may reach.
///
/// Limitations can never reduce a cost by more than 80%.
pub const LIMITATION_FLOOR: f64 = -80.0;

/// Lowest cost factor an equipment item may accumulate.
///
/// A floor of -0.8 leaves a final multiplier of 0.2.
pub const MIN_COST_FACTOR: f64 = -0.8;

/// Level assigned to attributes that cannot be resolved.
pub const UNRESOLVED_LEVEL: f64 = f64::NEG_INFINITY;
