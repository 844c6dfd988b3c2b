//! The save transaction.
//!
//! [`SaveCoordinator::perform_save`] is the only code path that submits to the
//! persistence API. One call builds one batch from everything not yet saved,
//! submits it as a single request and settles every item it touched:
//!
//! 1. recordings (pending, payload present, not already claimed in this call)
//!    are base64 encoded into the batch;
//! 2. screenshots not yet saved are merged with their stroke layer on the
//!    blocking pool and added with their position in the live sequence;
//! 3. the batch is submitted together with the caller's form metadata;
//! 4. the aggregate counts are classified, backend records are reconciled onto
//!    local items, and each touched item ends up `Saved` or back at `Unsaved`.
//!
//! A transport error reverts every touched item to `Unsaved` and is returned
//! to the caller. Dedupe claims and the in-flight permit are scoped to the
//! call and released on every exit path, including a dropped future.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::outcome::{attribute_uploads, classify, Attempt, SaveClassification};
use crate::annotation::data_uri;
use crate::annotation::{AnnotationMerger, AnnotationStore, MergedImage};
use crate::capture_registry::{CaptureRegistry, LifecycleState};
use crate::configuration::{Config, LimitsConfig};
use crate::debounce_gate::{DebounceGate, DedupeKey, ProcessedClaim, ProcessedSet};
use crate::error_handling::types::{RegistryError, SaveError};
use crate::persistence::types::{
    BackendId, FormMetadata, PersistedRecord, RecordingUpload, SaveOutcomeSummary,
    SaveRequestBatch, ScreenshotUpload,
};
use crate::persistence::PersistenceApi;
use crate::reconciliation::ReconciliationMatcher;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Ask the backend to close the remote session once the batch is stored.
    pub disconnect: bool,
}

/// Result of a save that was admitted by the gate and got a response.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    pub summary: SaveOutcomeSummary,
    pub classification: SaveClassification,
    pub saved_recordings: Vec<Uuid>,
    pub saved_screenshots: Vec<Uuid>,
    /// Items sent in the batch that were attributed to the failed count.
    pub reverted: Vec<Uuid>,
    /// Saved items for which no backend record could be matched.
    pub unreconciled: Vec<Uuid>,
    pub disconnect: bool,
}

/// Items moved to `Saving` by the current call. Anything still `Saving` when
/// this is dropped goes back to `Unsaved`.
struct SavingGuard<'a> {
    registry: &'a CaptureRegistry,
    ids: Vec<Uuid>,
}

impl<'a> SavingGuard<'a> {
    fn new(registry: &'a CaptureRegistry) -> Self {
        Self {
            registry,
            ids: Vec::new(),
        }
    }

    fn track(&mut self, id: Uuid) {
        self.ids.push(id);
    }

    fn revert(&mut self) -> Vec<Uuid> {
        self.ids
            .drain(..)
            .filter(|id| self.registry.mark_failed(*id).is_ok())
            .collect()
    }

    fn disarm(&mut self) {
        self.ids.clear();
    }
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        if !self.ids.is_empty() {
            let reverted = self.revert();
            warn!("save abandoned; {} item(s) back to unsaved", reverted.len());
        }
    }
}

#[derive(Debug, Default)]
struct Settled {
    saved: Vec<Uuid>,
    reverted: Vec<Uuid>,
    unreconciled: Vec<Uuid>,
}

pub struct SaveCoordinator {
    session_id: String,
    registry: Arc<CaptureRegistry>,
    annotations: Arc<AnnotationStore>,
    merger: AnnotationMerger,
    matcher: ReconciliationMatcher,
    persistence: Arc<dyn PersistenceApi>,
    gate: Arc<DebounceGate>,
    processed: ProcessedSet,
    limits: LimitsConfig,
}

impl SaveCoordinator {
    pub fn new(
        session_id: impl Into<String>,
        registry: Arc<CaptureRegistry>,
        annotations: Arc<AnnotationStore>,
        persistence: Arc<dyn PersistenceApi>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            registry,
            merger: AnnotationMerger::new(Arc::clone(&annotations)),
            annotations,
            matcher: ReconciliationMatcher::default(),
            persistence,
            gate: Arc::new(DebounceGate::default()),
            processed: ProcessedSet::new(),
            limits: LimitsConfig::default(),
        }
    }

    pub fn from_config(
        config: &Config,
        registry: Arc<CaptureRegistry>,
        annotations: Arc<AnnotationStore>,
        persistence: Arc<dyn PersistenceApi>,
    ) -> Self {
        Self::new(
            config.persistence.session_id.clone(),
            registry,
            annotations,
            persistence,
        )
        .with_gate(Arc::new(DebounceGate::new(config.debounce())))
        .with_limits(config.limits)
        .with_matcher(ReconciliationMatcher::new(config.reconciliation_window()))
    }

    pub fn with_gate(mut self, gate: Arc<DebounceGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_matcher(mut self, matcher: ReconciliationMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn registry(&self) -> &Arc<CaptureRegistry> {
        &self.registry
    }

    pub fn annotations(&self) -> &Arc<AnnotationStore> {
        &self.annotations
    }

    pub fn persistence(&self) -> &Arc<dyn PersistenceApi> {
        &self.persistence
    }

    pub fn gate(&self) -> &Arc<DebounceGate> {
        &self.gate
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    /// Runs one save. `Ok(None)` means another save was in flight and this
    /// trigger was ignored.
    pub async fn perform_save(
        &self,
        form: &FormMetadata,
        options: SaveOptions,
    ) -> Result<Option<SaveReport>, SaveError> {
        let Some(_permit) = self.gate.try_acquire() else {
            info!(
                "[{}] save refused: another save is in flight",
                self.session_id
            );
            return Ok(None);
        };
        self.run(form, options).await.map(Some)
    }

    async fn run(
        &self,
        form: &FormMetadata,
        options: SaveOptions,
    ) -> Result<SaveReport, SaveError> {
        let mut batch = SaveRequestBatch::new(&self.session_id, form.clone(), options.disconnect);
        let mut touched = SavingGuard::new(&self.registry);
        let mut claims = Vec::new();

        let recording_attempts = self.collect_recordings(&mut batch, &mut touched, &mut claims)?;
        let (screenshot_attempts, mut merged) =
            self.collect_screenshots(&mut batch, &mut touched).await?;

        info!(
            "[{}] submitting {} recording(s), {} screenshot(s), disconnect={}",
            self.session_id,
            batch.recordings.len(),
            batch.screenshots.len(),
            options.disconnect
        );

        let response = match self.persistence.submit(&batch).await {
            Ok(response) => response,
            Err(e) => {
                let reverted = touched.revert();
                error!(
                    "[{}] save failed, {} item(s) reverted to unsaved: {}",
                    self.session_id,
                    reverted.len(),
                    e
                );
                return Err(SaveError::Transport(e));
            }
        };

        let summary = response.upload_summary;
        let classification = classify(&summary);
        let now = Utc::now();

        let recordings = self.settle(
            &recording_attempts,
            &response.persisted_recordings,
            summary.recordings_uploaded,
            now,
        );
        let screenshots = self.settle(
            &screenshot_attempts,
            &response.persisted_screenshots,
            summary.screenshots_uploaded,
            now,
        );

        for id in &screenshots.saved {
            if let Some(image) = merged.remove(id) {
                self.keep_uploaded_image(*id, image);
            }
        }
        touched.disarm();

        match classification {
            SaveClassification::AllSucceeded | SaveClassification::NothingAttempted => info!(
                "[{}] save complete: {}/{} item(s) stored",
                self.session_id,
                summary.uploaded(),
                summary.attempted()
            ),
            SaveClassification::PartialSuccess { failed } => warn!(
                "[{}] save partially failed: {} of {} item(s) not stored",
                self.session_id,
                failed,
                summary.attempted()
            ),
            SaveClassification::AllFailed => error!(
                "[{}] save stored nothing ({} attempted)",
                self.session_id,
                summary.attempted()
            ),
        }

        let mut reverted = recordings.reverted;
        reverted.extend(screenshots.reverted);
        let mut unreconciled = recordings.unreconciled;
        unreconciled.extend(screenshots.unreconciled);

        Ok(SaveReport {
            summary,
            classification,
            saved_recordings: recordings.saved,
            saved_screenshots: screenshots.saved,
            reverted,
            unreconciled,
            disconnect: options.disconnect,
        })
    }

    fn collect_recordings<'a>(
        &'a self,
        batch: &mut SaveRequestBatch,
        touched: &mut SavingGuard<'_>,
        claims: &mut Vec<ProcessedClaim<'a>>,
    ) -> Result<Vec<Attempt>, SaveError> {
        let mut attempts = Vec::new();

        for recording in self.registry.recordings() {
            let id = recording.local_id;
            match recording.lifecycle_state {
                LifecycleState::Saved => {
                    trace!("[{}] recording already saved", id);
                    continue;
                }
                LifecycleState::Saving => {
                    warn!("[{}] recording still marked saving; skipped", id);
                    continue;
                }
                LifecycleState::Unsaved => {}
            }
            if !self.registry.has_payload(&recording) {
                warn!("[{}] recording has no payload; skipped", id);
                continue;
            }
            let Some(claim) = self
                .processed
                .claim(DedupeKey::new(id, recording.timestamp_label.clone()))
            else {
                continue;
            };

            let bytes = match self.registry.recording_payload(id) {
                Ok(bytes) => bytes,
                Err(RegistryError::NotFound(_)) | Err(RegistryError::MissingPayload(_)) => {
                    warn!("[{}] recording vanished while building the batch", id);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let oversized = recording.size_bytes > self.limits.max_recording_bytes;
            if oversized {
                warn!(
                    "[{}] recording is {} byte(s), above the {} byte ceiling; sending anyway",
                    id, recording.size_bytes, self.limits.max_recording_bytes
                );
            }

            match self.registry.mark_saving(id) {
                Ok(()) => touched.track(id),
                Err(RegistryError::NotFound(_)) => {
                    warn!("[{}] recording removed while building the batch", id);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            batch.recordings.push(RecordingUpload {
                client_ref: id,
                data: data_uri::encode(&recording.mime_type, &bytes),
                timestamp: recording.timestamp_label.clone(),
                duration_seconds: recording.duration_seconds,
                size_bytes: recording.size_bytes,
            });
            attempts.push(Attempt {
                local_id: id,
                oversized,
            });
            claims.push(claim);
        }

        Ok(attempts)
    }

    async fn collect_screenshots(
        &self,
        batch: &mut SaveRequestBatch,
        touched: &mut SavingGuard<'_>,
    ) -> Result<(Vec<Attempt>, HashMap<Uuid, MergedImage>), SaveError> {
        let mut attempts = Vec::new();
        let mut merged_images = HashMap::new();

        for (index, shot) in self.registry.screenshots().into_iter().enumerate() {
            let id = shot.local_id;
            match shot.lifecycle_state {
                LifecycleState::Saved => {
                    trace!("[{}] screenshot {} already saved", id, index);
                    continue;
                }
                LifecycleState::Saving => {
                    warn!("[{}] screenshot {} still marked saving; skipped", id, index);
                    continue;
                }
                LifecycleState::Unsaved => {}
            }

            let candidates = shot.canvas_id.candidates(index);
            let merged = self
                .merger
                .merge_in_background(shot.raw_image_data, candidates)
                .await;
            let size = data_uri::decoded_len(&merged.data);
            let oversized = size > self.limits.max_screenshot_bytes;
            if oversized {
                warn!(
                    "[{}] screenshot is {} byte(s), above the {} byte ceiling; sending anyway",
                    id, size, self.limits.max_screenshot_bytes
                );
            }

            match self.registry.mark_saving(id) {
                Ok(()) => touched.track(id),
                Err(RegistryError::NotFound(_)) => {
                    warn!("[{}] screenshot removed while building the batch", id);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            debug!(
                "[{}] screenshot {} queued (drawings: {})",
                id, index, merged.has_drawings
            );
            batch.screenshots.push(ScreenshotUpload {
                client_ref: id,
                data: merged.data.clone(),
                original_index: index,
                has_drawings: merged.has_drawings,
            });
            attempts.push(Attempt {
                local_id: id,
                oversized,
            });
            merged_images.insert(id, merged);
        }

        Ok((attempts, merged_images))
    }

    /// Decides which attempts were stored, then hands out backend ids. Echoed
    /// records are trusted before the counts are attributed; anonymous records
    /// are only paired with items already attributed as stored, so an item the
    /// backend rejected can never receive another item's id.
    fn settle(
        &self,
        attempts: &[Attempt],
        records: &[PersistedRecord],
        uploaded: u32,
        now: DateTime<Utc>,
    ) -> Settled {
        let ids: Vec<Uuid> = attempts.iter().map(|a| a.local_id).collect();
        let exact = self.matcher.match_exact(&ids, records);
        let echoed: HashSet<Uuid> = exact.iter().map(|a| a.local_id).collect();
        let (to_save, to_revert) = attribute_uploads(attempts, &echoed, uploaded);

        let waiting: Vec<Uuid> = to_save
            .iter()
            .filter(|id| !echoed.contains(*id))
            .copied()
            .collect();
        let windowed = self.matcher.match_windowed(&waiting, records, now);
        let mut backend_ids: HashMap<Uuid, BackendId> = exact
            .into_iter()
            .chain(windowed)
            .map(|a| (a.local_id, a.backend_id))
            .collect();

        let mut settled = Settled::default();
        for id in to_save {
            let backend_id = backend_ids.remove(&id);
            let matched = backend_id.is_some();
            match self.registry.mark_saved(id, backend_id) {
                Ok(()) => {
                    if !matched {
                        debug!("[{}] saved without a backend id", id);
                        settled.unreconciled.push(id);
                    }
                    settled.saved.push(id);
                }
                Err(RegistryError::NotFound(_)) => {
                    warn!("[{}] removed during save; result dropped", id)
                }
                Err(e) => warn!("[{}] could not mark saved: {}", id, e),
            }
        }
        for id in to_revert {
            match self.registry.mark_failed(id) {
                Ok(()) => settled.reverted.push(id),
                Err(RegistryError::NotFound(_)) => {
                    warn!("[{}] removed during save; revert skipped", id)
                }
                Err(e) => warn!("[{}] could not revert: {}", id, e),
            }
        }
        settled
    }

    /// A saved screenshot keeps the image that was actually uploaded, and its
    /// strokes, now burned into that image, are dropped.
    fn keep_uploaded_image(&self, id: Uuid, image: MergedImage) {
        if !image.has_drawings {
            return;
        }
        if let Err(e) = self.registry.update_screenshot_image(id, image.data, true) {
            warn!("[{}] could not store merged image: {}", id, e);
            return;
        }
        if let Some(canvas_id) = image.canvas_id {
            self.annotations.clear(&canvas_id);
            debug!("[{}] annotation layer {} cleared", id, canvas_id);
        }
    }
}
