//! Save admission control
//!
//! Components:
//! - `gate`: `DebounceGate`, the single in-flight save slot plus the trailing debounce.
//! - `processed_set`: `ProcessedSet`, per-save dedupe keys released by scoped claims.

pub mod gate;
pub mod processed_set;

pub use gate::{DebounceGate, SavePermit};
pub use processed_set::{DedupeKey, ProcessedClaim, ProcessedSet};
