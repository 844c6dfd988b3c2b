//! Save coordination subsystem
//!
//! Turns the registry's pending items into one submission to the persistence
//! API and settles the outcome back onto the registry.
//!
//! Components:
//! - `coordinator`: `SaveCoordinator::perform_save`, `SaveOptions` and `SaveReport`.
//! - `outcome`: classification of aggregate counts and per-item upload attribution.

pub mod coordinator;
pub mod outcome;

pub use coordinator::{SaveCoordinator, SaveOptions, SaveReport};
pub use outcome::{classify, SaveClassification};
