use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::annotation::{AnnotationStore, CanvasId};
use crate::capture_registry::{CaptureRegistry, CapturedItem, LifecycleState, RecordingCapture};
use crate::configuration::Config;
use crate::error_handling::types::SessionError;
use crate::persistence::types::{BackendId, FormMetadata};
use crate::persistence::PersistenceApi;
use crate::save_coordinator::{SaveCoordinator, SaveOptions, SaveReport};
use crate::SessionStatus;

/// A screenshot as handed over by the RTC collaborator.
///
/// Freshly captured frames arrive as a bare data URI; screenshots loaded back
/// from the backend (or reopened in the enlarged view) arrive with their
/// canvas id and save status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScreenshotPayload {
    Raw(String),
    Annotated {
        data: String,
        /// Canvas id the drawing collaborator files this screenshot's strokes under.
        id: String,
        #[serde(default)]
        backend_id: Option<BackendId>,
        #[serde(default)]
        is_saved: bool,
    },
}

/// What caused a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    Manual,
    /// Save, ask the backend to close the remote connection, end the session.
    DisconnectAndSave,
    /// Save and end the session; the call is already over.
    EndAndRedirect,
    /// Debounced keyboard/timer save.
    Autosave,
}

impl SaveTrigger {
    pub fn options(self) -> SaveOptions {
        SaveOptions {
            disconnect: self == SaveTrigger::DisconnectAndSave,
        }
    }

    pub fn ends_session(self) -> bool {
        matches!(
            self,
            SaveTrigger::DisconnectAndSave | SaveTrigger::EndAndRedirect
        )
    }
}

/// One live remote-inspection session.
pub struct InspectionSession {
    id: String,
    started_at: DateTime<Utc>,
    ended_at: Mutex<Option<DateTime<Utc>>>,
    status: Mutex<SessionStatus>,
    form: Mutex<FormMetadata>,
    coordinator: Arc<SaveCoordinator>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InspectionSession {
    pub fn new(coordinator: SaveCoordinator) -> Self {
        let id = coordinator.session_id().to_string();
        info!("[{}] session started", id);
        Self {
            id,
            started_at: Utc::now(),
            ended_at: Mutex::new(None),
            status: Mutex::new(SessionStatus::Active),
            form: Mutex::new(FormMetadata::new()),
            coordinator: Arc::new(coordinator),
        }
    }

    pub fn from_config(config: &Config, persistence: Arc<dyn PersistenceApi>) -> Self {
        Self::new(SaveCoordinator::from_config(
            config,
            Arc::new(CaptureRegistry::new()),
            Arc::new(AnnotationStore::new()),
            persistence,
        ))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        *lock(&self.ended_at)
    }

    pub fn status(&self) -> SessionStatus {
        *lock(&self.status)
    }

    pub fn registry(&self) -> &Arc<CaptureRegistry> {
        self.coordinator.registry()
    }

    pub fn annotations(&self) -> &Arc<AnnotationStore> {
        self.coordinator.annotations()
    }

    pub fn coordinator(&self) -> &Arc<SaveCoordinator> {
        &self.coordinator
    }

    pub fn set_form(&self, form: FormMetadata) {
        *lock(&self.form) = form;
    }

    pub fn form(&self) -> FormMetadata {
        lock(&self.form).clone()
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        match self.status() {
            SessionStatus::Active => Ok(()),
            SessionStatus::Completed => Err(SessionError::SessionEnded),
        }
    }

    pub fn capture_screenshot(&self, payload: ScreenshotPayload) -> Result<Uuid, SessionError> {
        self.ensure_active()?;
        let registry = self.registry();
        let id = match payload {
            ScreenshotPayload::Raw(data) => {
                let canvas_id = CanvasId::new(format!("capture-{}", Uuid::new_v4().simple()));
                registry.add_screenshot(data, canvas_id)
            }
            ScreenshotPayload::Annotated {
                data,
                id,
                backend_id,
                is_saved,
            } => match (is_saved, backend_id) {
                (true, Some(backend_id)) => {
                    registry.restore_screenshot(data, CanvasId::new(id), backend_id)
                }
                (true, None) => {
                    warn!(
                        "[{}] screenshot {} claims saved but has no backend id; treating as new",
                        self.id, id
                    );
                    registry.add_screenshot(data, CanvasId::new(id))
                }
                (false, _) => registry.add_screenshot(data, CanvasId::new(id)),
            },
        };
        Ok(id)
    }

    pub fn capture_recording(&self, capture: RecordingCapture) -> Result<Uuid, SessionError> {
        self.ensure_active()?;
        Ok(self.registry().add_recording(capture))
    }

    /// Removes an item locally and, if it was saved, from the backend.
    ///
    /// The backend delete is best effort: its failure is logged and the local
    /// removal happens anyway. A saved item without a backend id cannot be
    /// addressed remotely and is kept.
    pub async fn delete_item(&self, local_id: Uuid) -> Result<CapturedItem, SessionError> {
        let item = self
            .registry()
            .get(local_id)
            .ok_or(SessionError::NotFound(local_id))?;

        if item.lifecycle_state() == LifecycleState::Saved {
            let Some(backend_id) = item.backend_id().cloned() else {
                warn!(
                    "[{}] {} is saved but was never reconciled; delete refused",
                    self.id, local_id
                );
                return Err(SessionError::InvalidIdFormat(local_id));
            };
            let persistence = self.coordinator.persistence();
            let result = match &item {
                CapturedItem::Recording(_) => {
                    persistence.delete_recording(&self.id, &backend_id).await
                }
                CapturedItem::Screenshot(_) => {
                    persistence.delete_screenshot(&self.id, &backend_id).await
                }
            };
            match result {
                Ok(()) => debug!("[{}] backend record {} deleted", self.id, backend_id),
                Err(e) => warn!(
                    "[{}] backend delete of {} failed, removing locally anyway: {}",
                    self.id, backend_id, e
                ),
            }
        }

        let removed = self.registry().remove_indexed(local_id)?;
        if let CapturedItem::Screenshot(shot) = &removed.item {
            let annotations = self.annotations();
            annotations.clear(&shot.canvas_id);
            annotations.clear(&shot.canvas_id.enlarged());
            if let Some((index, count)) = removed.screenshot_slot {
                annotations.remove_positional(index, count);
            }
        }
        Ok(removed.item)
    }

    /// Positional delete, as issued by the thumbnail strip.
    pub async fn delete_screenshot_at(&self, index: usize) -> Result<CapturedItem, SessionError> {
        let id = self
            .registry()
            .screenshot_id_at(index)
            .ok_or(SessionError::NoScreenshotAt(index))?;
        self.delete_item(id).await
    }

    pub async fn save(&self) -> Result<Option<SaveReport>, SessionError> {
        self.trigger(SaveTrigger::Manual).await
    }

    pub async fn disconnect_and_save(&self) -> Result<Option<SaveReport>, SessionError> {
        self.trigger(SaveTrigger::DisconnectAndSave).await
    }

    pub async fn end_and_redirect(&self) -> Result<Option<SaveReport>, SessionError> {
        self.trigger(SaveTrigger::EndAndRedirect).await
    }

    /// Runs one save for `trigger`. `Ok(None)` means another save was in
    /// flight; a session-ending trigger refused this way leaves the session open.
    pub async fn trigger(&self, trigger: SaveTrigger) -> Result<Option<SaveReport>, SessionError> {
        self.ensure_active()?;
        debug!("[{}] save triggered: {:?}", self.id, trigger);
        let form = self.form();
        let result = self
            .coordinator
            .perform_save(&form, trigger.options())
            .await;

        if trigger.ends_session() && !matches!(result, Ok(None)) {
            self.end();
        }
        Ok(result?)
    }

    /// Schedules a debounced save; bursts of requests collapse into one.
    pub fn request_autosave(self: &Arc<Self>) {
        if self.ensure_active().is_err() {
            return;
        }
        let session = Arc::clone(self);
        self.coordinator.gate().debounce(move || async move {
            match session.trigger(SaveTrigger::Autosave).await {
                Ok(Some(report)) => debug!(
                    "[{}] autosave finished: {:?}",
                    session.id, report.classification
                ),
                Ok(None) => debug!("[{}] autosave skipped, save in flight", session.id),
                Err(e) => warn!("[{}] autosave failed: {}", session.id, e),
            }
        });
    }

    /// Marks the session completed and drops everything it captured.
    /// Returns the number of items superseded. Calling it twice is harmless.
    pub fn end(&self) -> usize {
        {
            let mut status = lock(&self.status);
            if *status == SessionStatus::Completed {
                return 0;
            }
            *status = SessionStatus::Completed;
        }
        *lock(&self.ended_at) = Some(Utc::now());
        self.coordinator.gate().cancel_pending();
        let dropped = self.registry().clear();
        info!("[{}] session ended, {} item(s) superseded", self.id, dropped);
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationLayer, Point, Stroke};
    use crate::error_handling::types::{PersistenceError, SaveError, TransportError};
    use crate::persistence::mock_persistence::{backend_id_for, MockPersistence};
    use crate::save_coordinator::SaveClassification;
    use std::time::Duration;
    use tokio_test::assert_ok;

    const PNG_1X1: &str = concat!(
        "data:image/png;base64,",
        "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNk",
        "YAAAAAYAAjCB0C8AAAAASUVORK5CYII="
    );

    fn session_with(api: Arc<MockPersistence>) -> Arc<InspectionSession> {
        let _ = env_logger::builder().is_test(true).try_init();
        let coordinator = SaveCoordinator::new(
            "insp-42",
            Arc::new(CaptureRegistry::new()),
            Arc::new(AnnotationStore::new()),
            api as Arc<dyn PersistenceApi>,
        );
        Arc::new(InspectionSession::new(coordinator))
    }

    fn recording(label: &str) -> RecordingCapture {
        RecordingCapture {
            bytes: vec![0u8; 64],
            mime_type: "video/webm".into(),
            timestamp_label: label.into(),
            duration_seconds: 1.5,
        }
    }

    async fn saved_screenshot(session: &InspectionSession) -> Uuid {
        let id = session
            .capture_screenshot(ScreenshotPayload::Raw(PNG_1X1.into()))
            .unwrap();
        session.save().await.unwrap().unwrap();
        id
    }

    #[test]
    fn payload_json_shapes() {
        let raw: ScreenshotPayload =
            serde_json::from_str(r#""data:image/png;base64,AAAA""#).unwrap();
        assert_eq!(raw, ScreenshotPayload::Raw("data:image/png;base64,AAAA".into()));

        let annotated: ScreenshotPayload = serde_json::from_str(
            r#"{"data": "data:image/png;base64,AAAA", "id": "screenshot-3",
                "backend_id": "abc", "is_saved": true}"#,
        )
        .unwrap();
        assert!(matches!(
            annotated,
            ScreenshotPayload::Annotated { is_saved: true, backend_id: Some(_), .. }
        ));
    }

    #[test]
    fn annotated_saved_payload_is_restored_as_saved() {
        let session = session_with(Arc::new(MockPersistence::accepting()));
        let restored = session
            .capture_screenshot(ScreenshotPayload::Annotated {
                data: PNG_1X1.into(),
                id: "screenshot-0".into(),
                backend_id: BackendId::parse("b-1").ok(),
                is_saved: true,
            })
            .unwrap();
        let fresh = session
            .capture_screenshot(ScreenshotPayload::Annotated {
                data: PNG_1X1.into(),
                id: "screenshot-1".into(),
                backend_id: None,
                is_saved: false,
            })
            .unwrap();

        let registry = session.registry();
        assert_eq!(registry.get(restored).unwrap().lifecycle_state(), LifecycleState::Saved);
        assert_eq!(registry.get(fresh).unwrap().lifecycle_state(), LifecycleState::Unsaved);
        match registry.get(fresh).unwrap() {
            CapturedItem::Screenshot(s) => assert_eq!(s.canvas_id, CanvasId::new("screenshot-1")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn deleting_unsaved_item_stays_local() {
        let api = Arc::new(MockPersistence::accepting());
        let session = session_with(Arc::clone(&api));
        let id = session.capture_recording(recording("t1")).unwrap();

        assert_ok!(session.delete_item(id).await);
        assert!(api.deleted().is_empty());
        assert!(session.registry().is_empty());
        assert_eq!(session.registry().blob_store().live_count(), 0);
    }

    #[tokio::test]
    async fn deleting_saved_item_reaches_backend() {
        let api = Arc::new(MockPersistence::accepting());
        let session = session_with(Arc::clone(&api));
        let id = saved_screenshot(&session).await;

        assert_ok!(session.delete_item(id).await);
        assert_eq!(api.deleted(), vec![("screenshot", backend_id_for(id))]);
        assert!(session.registry().get(id).is_none());
    }

    #[tokio::test]
    async fn backend_delete_failure_still_removes_locally() {
        let api = Arc::new(MockPersistence::accepting());
        let session = session_with(Arc::clone(&api));
        let id = saved_screenshot(&session).await;
        api.fail_deletes_with(PersistenceError::Transport(TransportError::Timeout));

        assert_ok!(session.delete_item(id).await);
        assert!(session.registry().get(id).is_none());
    }

    #[tokio::test]
    async fn saved_item_without_backend_id_cannot_be_deleted() {
        let api = Arc::new(MockPersistence::new(|batch| {
            let mut response = crate::persistence::mock_persistence::accept_all(batch);
            response.persisted_screenshots.clear();
            Ok(response)
        }));
        let session = session_with(Arc::clone(&api));
        let id = saved_screenshot(&session).await;

        let err = session.delete_item(id).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidIdFormat(x) if x == id));
        assert!(api.deleted().is_empty());
        assert!(session.registry().get(id).is_some());
    }

    #[tokio::test]
    async fn positional_delete() {
        let session = session_with(Arc::new(MockPersistence::accepting()));
        let first = session
            .capture_screenshot(ScreenshotPayload::Raw(PNG_1X1.into()))
            .unwrap();
        let second = session
            .capture_screenshot(ScreenshotPayload::Raw(PNG_1X1.into()))
            .unwrap();

        let removed = session.delete_screenshot_at(0).await.unwrap();
        assert_eq!(removed.local_id(), first);
        assert_eq!(session.registry().screenshot_id_at(0), Some(second));
        assert!(matches!(
            session.delete_screenshot_at(5).await,
            Err(SessionError::NoScreenshotAt(5))
        ));
        assert!(matches!(
            session.delete_item(Uuid::new_v4()).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleted_screenshot_strokes_do_not_move_to_its_neighbour() {
        let api = Arc::new(MockPersistence::accepting());
        let session = session_with(Arc::clone(&api));
        let first = session
            .capture_screenshot(ScreenshotPayload::Raw(PNG_1X1.into()))
            .unwrap();
        session
            .capture_screenshot(ScreenshotPayload::Raw(PNG_1X1.into()))
            .unwrap();
        session.annotations().set(AnnotationLayer::new(
            CanvasId::positional(0),
            vec![Stroke::pen("#f00", 1.0, vec![Point::new(0.0, 0.0)])],
        ));

        session.delete_item(first).await.unwrap();
        session.save().await.unwrap().unwrap();

        let sent = &api.submissions()[0].screenshots;
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].has_drawings);
        assert!(session.annotations().is_empty());
    }

    #[tokio::test]
    async fn positional_strokes_follow_their_screenshot_after_delete() {
        let api = Arc::new(MockPersistence::accepting());
        let session = session_with(Arc::clone(&api));
        let first = session
            .capture_screenshot(ScreenshotPayload::Raw(PNG_1X1.into()))
            .unwrap();
        let second = session
            .capture_screenshot(ScreenshotPayload::Raw(PNG_1X1.into()))
            .unwrap();
        session.annotations().set(AnnotationLayer::new(
            CanvasId::positional(1),
            vec![Stroke::pen("#00f", 1.0, vec![Point::new(0.0, 0.0)])],
        ));

        session.delete_item(first).await.unwrap();
        session.save().await.unwrap().unwrap();

        let sent = &api.submissions()[0].screenshots[0];
        assert_eq!(sent.client_ref, second);
        assert_eq!(sent.original_index, 0);
        assert!(sent.has_drawings);
    }

    #[tokio::test]
    async fn disconnect_and_save_ends_the_session() {
        let api = Arc::new(MockPersistence::accepting());
        let session = session_with(Arc::clone(&api));
        session.capture_recording(recording("t1")).unwrap();
        session.set_form(FormMetadata::new().with("result", "pass"));

        let report = session.disconnect_and_save().await.unwrap().unwrap();

        assert!(report.disconnect);
        assert_eq!(report.classification, SaveClassification::AllSucceeded);
        assert!(api.submissions()[0].disconnect);
        assert_eq!(api.submissions()[0].form, FormMetadata::new().with("result", "pass"));
        assert_eq!(session.status(), SessionStatus::Completed);
        assert!(session.ended_at().is_some());
        assert!(session.registry().is_empty());
        assert_eq!(session.registry().blob_store().live_count(), 0);

        assert!(matches!(
            session.capture_recording(recording("t2")),
            Err(SessionError::SessionEnded)
        ));
        assert!(matches!(session.save().await, Err(SessionError::SessionEnded)));
    }

    #[tokio::test]
    async fn end_and_redirect_ends_even_when_save_fails() {
        let api = Arc::new(MockPersistence::failing(TransportError::Connection(
            "refused".into(),
        )));
        let session = session_with(Arc::clone(&api));
        session
            .capture_screenshot(ScreenshotPayload::Raw(PNG_1X1.into()))
            .unwrap();

        let err = session.end_and_redirect().await.unwrap_err();

        assert!(matches!(err, SessionError::Save(SaveError::Transport(_))));
        assert!(!api.submissions()[0].disconnect);
        assert_eq!(session.status(), SessionStatus::Completed);
        assert!(session.registry().is_empty());
    }

    #[tokio::test]
    async fn manual_save_failure_keeps_session_open() {
        let api = Arc::new(MockPersistence::failing(TransportError::Timeout));
        let session = session_with(Arc::clone(&api));
        let id = session
            .capture_screenshot(ScreenshotPayload::Raw(PNG_1X1.into()))
            .unwrap();

        assert!(session.save().await.is_err());
        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(
            session.registry().get(id).unwrap().lifecycle_state(),
            LifecycleState::Unsaved
        );
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_bursts_submit_once() {
        let api = Arc::new(MockPersistence::accepting());
        let session = session_with(Arc::clone(&api));
        session
            .capture_screenshot(ScreenshotPayload::Raw(PNG_1X1.into()))
            .unwrap();

        for _ in 0..3 {
            session.request_autosave();
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(api.submit_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ending_cancels_scheduled_autosave() {
        let api = Arc::new(MockPersistence::accepting());
        let session = session_with(Arc::clone(&api));
        session.request_autosave();

        assert_eq!(session.end(), 0);
        assert_eq!(session.end(), 0);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(api.submit_count(), 0);
        assert_eq!(session.status(), SessionStatus::Completed);
    }
}
