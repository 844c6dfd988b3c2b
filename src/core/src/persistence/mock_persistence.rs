//! Scripted stand-in for the persistence API.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error_handling::types::{PersistenceError, TransportError};
use crate::persistence::persistence_trait::PersistenceApi;
use crate::persistence::types::{
    BackendId, PersistedRecord, SaveOutcomeSummary, SaveRequestBatch, SubmitResponse,
};

type Responder =
    Box<dyn Fn(&SaveRequestBatch) -> Result<SubmitResponse, TransportError> + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Id the mock backend assigns to a local item.
pub fn backend_id_for(local_id: Uuid) -> BackendId {
    BackendId::parse(&format!("srv-{}", local_id.simple())).unwrap()
}

fn record(local_id: Uuid, echo: bool) -> PersistedRecord {
    PersistedRecord {
        id: backend_id_for(local_id).to_string(),
        timestamp: Utc::now(),
        client_ref: echo.then_some(local_id),
    }
}

/// Stores everything, returning one fresh record per item without `client_ref`.
pub fn accept_all(batch: &SaveRequestBatch) -> SubmitResponse {
    accept_where(batch, false, |_| true)
}

/// Stores the items `keep` selects; `echo` controls whether records carry `client_ref`.
pub fn accept_where(
    batch: &SaveRequestBatch,
    echo: bool,
    keep: impl Fn(Uuid) -> bool,
) -> SubmitResponse {
    let recordings: Vec<Uuid> = batch
        .recordings
        .iter()
        .map(|r| r.client_ref)
        .filter(|id| keep(*id))
        .collect();
    let screenshots: Vec<Uuid> = batch
        .screenshots
        .iter()
        .map(|s| s.client_ref)
        .filter(|id| keep(*id))
        .collect();
    SubmitResponse {
        upload_summary: SaveOutcomeSummary {
            recordings_attempted: batch.recordings.len() as u32,
            recordings_uploaded: recordings.len() as u32,
            screenshots_attempted: batch.screenshots.len() as u32,
            screenshots_uploaded: screenshots.len() as u32,
        },
        persisted_screenshots: screenshots.into_iter().map(|id| record(id, echo)).collect(),
        persisted_recordings: recordings.into_iter().map(|id| record(id, echo)).collect(),
    }
}

pub struct MockPersistence {
    responder: Mutex<Responder>,
    delay: Duration,
    submissions: Mutex<Vec<SaveRequestBatch>>,
    deleted: Mutex<Vec<(&'static str, BackendId)>>,
    delete_result: Mutex<Result<(), PersistenceError>>,
}

impl MockPersistence {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&SaveRequestBatch) -> Result<SubmitResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            responder: Mutex::new(Box::new(responder)),
            delay: Duration::ZERO,
            submissions: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            delete_result: Mutex::new(Ok(())),
        }
    }

    pub fn accepting() -> Self {
        Self::new(|batch| Ok(accept_all(batch)))
    }

    pub fn failing(err: TransportError) -> Self {
        Self::new(move |_| Err(err.clone()))
    }

    /// Every submit sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&SaveRequestBatch) -> Result<SubmitResponse, TransportError> + Send + Sync + 'static,
    {
        *lock(&self.responder) = Box::new(responder);
    }

    pub fn fail_deletes_with(&self, err: PersistenceError) {
        *lock(&self.delete_result) = Err(err);
    }

    pub fn submissions(&self) -> Vec<SaveRequestBatch> {
        lock(&self.submissions).clone()
    }

    pub fn submit_count(&self) -> usize {
        lock(&self.submissions).len()
    }

    pub fn deleted(&self) -> Vec<(&'static str, BackendId)> {
        lock(&self.deleted).clone()
    }
}

#[async_trait]
impl PersistenceApi for MockPersistence {
    async fn submit(&self, batch: &SaveRequestBatch) -> Result<SubmitResponse, TransportError> {
        lock(&self.submissions).push(batch.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (*lock(&self.responder))(batch)
    }

    async fn delete_recording(
        &self,
        _session_id: &str,
        id: &BackendId,
    ) -> Result<(), PersistenceError> {
        lock(&self.deleted).push(("recording", id.clone()));
        lock(&self.delete_result).clone()
    }

    async fn delete_screenshot(
        &self,
        _session_id: &str,
        id: &BackendId,
    ) -> Result<(), PersistenceError> {
        lock(&self.deleted).push(("screenshot", id.clone()));
        lock(&self.delete_result).clone()
    }
}
