//! Persistence API trait
//!
//! The remote backend that durably stores recordings and screenshots. The save
//! pipeline only ever talks to it through this trait, which keeps the HTTP
//! client swappable for an in-memory fake in tests.

use async_trait::async_trait;

use crate::error_handling::types::{PersistenceError, TransportError};
use crate::persistence::types::{BackendId, SaveRequestBatch, SubmitResponse};

#[async_trait]
pub trait PersistenceApi: Send + Sync {
    /// Submits one save batch. Any error means nothing in the batch can be assumed stored.
    async fn submit(&self, batch: &SaveRequestBatch) -> Result<SubmitResponse, TransportError>;

    async fn delete_recording(&self, session_id: &str, id: &BackendId)
        -> Result<(), PersistenceError>;

    async fn delete_screenshot(&self, session_id: &str, id: &BackendId)
        -> Result<(), PersistenceError>;
}
