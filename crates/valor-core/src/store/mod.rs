//! # Reactive Record Store
//!
//! Per-record observable state, last-writer-wins admission of external
//! changes, and debounced write-back to storage.
//!
//! - `admission`: the pure admission rule and `__meta__` stamping
//! - `clock`: monotonic edit stamps
//! - `feed`: change events
//! - `writer`: debounced durable writes
//! - `cell`: the per-record state cell tying these together

pub mod admission;
pub mod cell;
pub mod clock;
pub mod feed;
pub mod writer;

pub use admission::{admit, created_stamp, edit_stamp, stamp};
pub use cell::{CellEvent, CellOutcome, RecordCell};
pub use clock::EditClock;
pub use feed::{ChangeEvent, ChangeKind};
pub use writer::DebouncedWriter;
