pub mod error_handling;

pub mod configuration;

pub mod capture_registry;
pub mod annotation;
pub mod persistence;
pub mod reconciliation;
pub mod debounce_gate;

pub mod save_coordinator;
pub use save_coordinator::*;

pub mod session_management;
pub use session_management::*;
