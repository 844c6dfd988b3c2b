//! Reconciliation subsystem
//!
//! Attaches backend-assigned ids to the local items of a finished save.
//!
//! Components:
//! - `types`: the `Assignment` produced for each matched item.
//! - `matcher`: `ReconciliationMatcher` (exact `client_ref` match, then the trailing time window).

pub mod matcher;
pub mod types;

pub use matcher::ReconciliationMatcher;
pub use types::{Assignment, MatchKind};
