//! Data model for items captured during an inspection session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::blob_store::ObjectUrl;
use crate::annotation::data_uri;
use crate::annotation::types::CanvasId;
use crate::persistence::types::BackendId;

/// Save lifecycle of a captured item.
///
/// Legal transitions are `Unsaved -> Saving -> Saved` and
/// `Unsaved -> Saving -> Unsaved` (failed save). `Saved` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Unsaved,
    Saving,
    Saved,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        matches!(
            (self, next),
            (LifecycleState::Unsaved, LifecycleState::Saving)
                | (LifecycleState::Saving, LifecycleState::Saved)
                | (LifecycleState::Saving, LifecycleState::Unsaved)
        )
    }
}

/// Raw recording as it comes off the remote feed.
#[derive(Debug, Clone)]
pub struct RecordingCapture {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub timestamp_label: String,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapturedRecording {
    pub local_id: Uuid,
    /// Owned exclusively by this entry; revoked on removal.
    pub blob_url: ObjectUrl,
    pub mime_type: String,
    pub timestamp_label: String,
    pub captured_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub size_bytes: u64,
    pub lifecycle_state: LifecycleState,
    pub backend_id: Option<BackendId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapturedScreenshot {
    pub local_id: Uuid,
    pub canvas_id: CanvasId,
    /// `data:` URI of the captured frame (replaced by the merged image once saved).
    pub raw_image_data: String,
    pub captured_at: DateTime<Utc>,
    pub lifecycle_state: LifecycleState,
    pub backend_id: Option<BackendId>,
    pub has_drawings: bool,
}

impl CapturedScreenshot {
    /// Approximate decoded size of the image payload.
    pub fn size_bytes(&self) -> u64 {
        data_uri::decoded_len(&self.raw_image_data)
    }
}

/// Either kind of captured item, as returned by registry lookups.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedItem {
    Recording(CapturedRecording),
    Screenshot(CapturedScreenshot),
}

impl CapturedItem {
    pub fn local_id(&self) -> Uuid {
        match self {
            CapturedItem::Recording(r) => r.local_id,
            CapturedItem::Screenshot(s) => s.local_id,
        }
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        match self {
            CapturedItem::Recording(r) => r.lifecycle_state,
            CapturedItem::Screenshot(s) => s.lifecycle_state,
        }
    }

    pub fn backend_id(&self) -> Option<&BackendId> {
        match self {
            CapturedItem::Recording(r) => r.backend_id.as_ref(),
            CapturedItem::Screenshot(s) => s.backend_id.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        use LifecycleState::*;
        assert!(Unsaved.can_transition_to(Saving));
        assert!(Saving.can_transition_to(Saved));
        assert!(Saving.can_transition_to(Unsaved));

        assert!(!Unsaved.can_transition_to(Saved));
        assert!(!Saved.can_transition_to(Unsaved));
        assert!(!Saved.can_transition_to(Saving));
        assert!(!Saving.can_transition_to(Saving));
    }
}
