//! In-memory registry of captured recordings and screenshots.
//!
//! The registry is the single writer of every item's [`LifecycleState`]. Callers
//! (UI events, incoming-capture callbacks, the save coordinator) share it behind
//! an `Arc` and go through the transition functions below; nothing else touches
//! the state field. Screenshot order is insertion order and is never rearranged,
//! because backend-reported positions are interpreted against it.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use log::{debug, info, warn};
use uuid::Uuid;

use super::blob_store::BlobStore;
use super::types::{
    CapturedItem, CapturedRecording, CapturedScreenshot, LifecycleState, RecordingCapture,
};
use crate::annotation::types::CanvasId;
use crate::error_handling::types::RegistryError;
use crate::persistence::types::BackendId;

#[derive(Debug, Default)]
struct RegistryInner {
    recordings: Vec<CapturedRecording>,
    screenshots: Vec<CapturedScreenshot>,
}

impl RegistryInner {
    fn state_mut(&mut self, id: Uuid) -> Option<&mut LifecycleState> {
        if let Some(r) = self.recordings.iter_mut().find(|r| r.local_id == id) {
            return Some(&mut r.lifecycle_state);
        }
        self.screenshots
            .iter_mut()
            .find(|s| s.local_id == id)
            .map(|s| &mut s.lifecycle_state)
    }

    fn backend_id_mut(&mut self, id: Uuid) -> Option<&mut Option<BackendId>> {
        if let Some(r) = self.recordings.iter_mut().find(|r| r.local_id == id) {
            return Some(&mut r.backend_id);
        }
        self.screenshots
            .iter_mut()
            .find(|s| s.local_id == id)
            .map(|s| &mut s.backend_id)
    }
}

/// An item taken out of the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Removed {
    pub item: CapturedItem,
    /// `(index, sequence length before removal)` for screenshots.
    pub screenshot_slot: Option<(usize, usize)>,
}

#[derive(Debug, Default)]
pub struct CaptureRegistry {
    inner: Mutex<RegistryInner>,
    blobs: BlobStore,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn blob_store(&self) -> &BlobStore {
        &self.blobs
    }

    /// Registers a finished recording. The blob is parked behind an object URL owned by the entry.
    pub fn add_recording(&self, capture: RecordingCapture) -> Uuid {
        let local_id = Uuid::new_v4();
        let size_bytes = capture.bytes.len() as u64;
        let blob_url = self
            .blobs
            .create_object_url(capture.bytes, &capture.mime_type);

        info!(
            "[{}] recording added: {} byte(s), {:.1}s, label={}",
            local_id, size_bytes, capture.duration_seconds, capture.timestamp_label
        );

        self.inner().recordings.push(CapturedRecording {
            local_id,
            blob_url,
            mime_type: capture.mime_type,
            timestamp_label: capture.timestamp_label,
            captured_at: Utc::now(),
            duration_seconds: capture.duration_seconds,
            size_bytes,
            lifecycle_state: LifecycleState::Unsaved,
            backend_id: None,
        });
        local_id
    }

    /// Appends a freshly captured frame at the end of the screenshot sequence.
    pub fn add_screenshot(&self, raw_data: impl Into<String>, canvas_id: CanvasId) -> Uuid {
        let local_id = Uuid::new_v4();
        let mut inner = self.inner();
        info!(
            "[{}] screenshot added at index {} (canvas {})",
            local_id,
            inner.screenshots.len(),
            canvas_id
        );
        inner.screenshots.push(CapturedScreenshot {
            local_id,
            canvas_id,
            raw_image_data: raw_data.into(),
            captured_at: Utc::now(),
            lifecycle_state: LifecycleState::Unsaved,
            backend_id: None,
            has_drawings: false,
        });
        local_id
    }

    /// Re-admits a screenshot that already lives on the backend as a `Saved` item.
    ///
    /// This is the explicit re-capture path: the only way an item enters `Saved`
    /// without passing through `Saving`.
    pub fn restore_screenshot(
        &self,
        data: impl Into<String>,
        canvas_id: CanvasId,
        backend_id: BackendId,
    ) -> Uuid {
        let local_id = Uuid::new_v4();
        debug!("[{}] screenshot restored from backend {}", local_id, backend_id);
        self.inner().screenshots.push(CapturedScreenshot {
            local_id,
            canvas_id,
            raw_image_data: data.into(),
            captured_at: Utc::now(),
            lifecycle_state: LifecycleState::Saved,
            backend_id: Some(backend_id),
            has_drawings: false,
        });
        local_id
    }

    fn transition(&self, id: Uuid, to: LifecycleState) -> Result<(), RegistryError> {
        Self::transition_locked(&mut self.inner(), id, to)
    }

    fn transition_locked(
        inner: &mut RegistryInner,
        id: Uuid,
        to: LifecycleState,
    ) -> Result<(), RegistryError> {
        let state = inner.state_mut(id).ok_or(RegistryError::NotFound(id))?;
        if !state.can_transition_to(to) {
            return Err(RegistryError::InvalidTransition {
                id,
                from: *state,
                to,
            });
        }
        debug!("[{}] {:?} -> {:?}", id, *state, to);
        *state = to;
        Ok(())
    }

    pub fn mark_saving(&self, id: Uuid) -> Result<(), RegistryError> {
        self.transition(id, LifecycleState::Saving)
    }

    /// Completes a save. A backend id is attached only if the item has none yet.
    ///
    /// State and id are written under one lock, so a concurrent removal either
    /// sees the item fully saved or makes this call fail with `NotFound`.
    pub fn mark_saved(&self, id: Uuid, backend_id: Option<BackendId>) -> Result<(), RegistryError> {
        let mut inner = self.inner();
        Self::transition_locked(&mut inner, id, LifecycleState::Saved)?;
        let Some(new_id) = backend_id else {
            return Ok(());
        };
        match inner.backend_id_mut(id) {
            Some(Some(existing)) => {
                warn!("[{}] already bound to {}; ignoring {}", id, existing, new_id);
            }
            Some(slot) => *slot = Some(new_id),
            None => return Err(RegistryError::NotFound(id)),
        }
        Ok(())
    }

    /// Reverts a failed save back to `Unsaved`.
    pub fn mark_failed(&self, id: Uuid) -> Result<(), RegistryError> {
        self.transition(id, LifecycleState::Unsaved)
    }

    /// Swaps in the image that was actually uploaded (the merged one).
    pub fn update_screenshot_image(
        &self,
        id: Uuid,
        data: String,
        has_drawings: bool,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner();
        let shot = inner
            .screenshots
            .iter_mut()
            .find(|s| s.local_id == id)
            .ok_or(RegistryError::NotFound(id))?;
        shot.raw_image_data = data;
        shot.has_drawings = has_drawings;
        Ok(())
    }

    /// Removes an item, revoking the recording's object URL first.
    pub fn remove_item(&self, id: Uuid) -> Result<CapturedItem, RegistryError> {
        self.remove_indexed(id).map(|removed| removed.item)
    }

    /// Like [`CaptureRegistry::remove_item`], but also reports where a removed
    /// screenshot sat and how long the sequence was at that moment.
    pub fn remove_indexed(&self, id: Uuid) -> Result<Removed, RegistryError> {
        let mut inner = self.inner();
        if let Some(pos) = inner.recordings.iter().position(|r| r.local_id == id) {
            let recording = inner.recordings.remove(pos);
            drop(inner);
            self.blobs.revoke(&recording.blob_url);
            info!("[{}] recording removed", id);
            return Ok(Removed {
                item: CapturedItem::Recording(recording),
                screenshot_slot: None,
            });
        }
        if let Some(pos) = inner.screenshots.iter().position(|s| s.local_id == id) {
            let count = inner.screenshots.len();
            let screenshot = inner.screenshots.remove(pos);
            info!("[{}] screenshot removed from index {}", id, pos);
            return Ok(Removed {
                item: CapturedItem::Screenshot(screenshot),
                screenshot_slot: Some((pos, count)),
            });
        }
        Err(RegistryError::NotFound(id))
    }

    /// Drops every item, e.g. when the session ends. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let (recordings, screenshots) = {
            let mut inner = self.inner();
            (
                std::mem::take(&mut inner.recordings),
                std::mem::take(&mut inner.screenshots),
            )
        };
        for recording in &recordings {
            self.blobs.revoke(&recording.blob_url);
        }
        let dropped = recordings.len() + screenshots.len();
        info!("registry cleared: {} item(s) superseded", dropped);
        dropped
    }

    pub fn get(&self, id: Uuid) -> Option<CapturedItem> {
        let inner = self.inner();
        if let Some(r) = inner.recordings.iter().find(|r| r.local_id == id) {
            return Some(CapturedItem::Recording(r.clone()));
        }
        inner
            .screenshots
            .iter()
            .find(|s| s.local_id == id)
            .map(|s| CapturedItem::Screenshot(s.clone()))
    }

    pub fn recordings(&self) -> Vec<CapturedRecording> {
        self.inner().recordings.clone()
    }

    /// Snapshot of the live screenshot sequence, in capture order.
    pub fn screenshots(&self) -> Vec<CapturedScreenshot> {
        self.inner().screenshots.clone()
    }

    pub fn screenshot_id_at(&self, index: usize) -> Option<Uuid> {
        self.inner().screenshots.get(index).map(|s| s.local_id)
    }

    /// Bytes of a recording's parked blob.
    pub fn recording_payload(&self, id: Uuid) -> Result<Vec<u8>, RegistryError> {
        let url = self
            .inner()
            .recordings
            .iter()
            .find(|r| r.local_id == id)
            .map(|r| r.blob_url.clone())
            .ok_or(RegistryError::NotFound(id))?;
        self.blobs
            .read(&url)
            .map(|(bytes, _)| bytes)
            .ok_or(RegistryError::MissingPayload(id))
    }

    pub fn has_payload(&self, recording: &CapturedRecording) -> bool {
        self.blobs.read(&recording.blob_url).is_some()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner();
        inner.recordings.len() + inner.screenshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
