//! Session management core module.
//!
//! An inspection session ties the capture registry, the annotation store and
//! the save coordinator together behind the operations the UI calls: capture,
//! delete, the save triggers and ending the session.

use serde::{Deserialize, Serialize};

/// Submodule for the inspection session facade.
pub mod session;

pub use session::{InspectionSession, SaveTrigger, ScreenshotPayload};

/// Represents the current status of a session.
///
/// Variants:
/// - `Active`: Captures and saves are accepted.
/// - `Completed`: The session was ended; its registry contents are superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Completed,
}
