//! Persistence subsystem
//!
//! Everything that crosses the network to the remote persistence API.
//!
//! Components:
//! - `persistence_trait`: the `PersistenceApi` trait defining the backend surface.
//! - `types`: request/response wire types and `BackendId`.
//! - `http_persistence`: reqwest-backed implementation.
//! - `mock_persistence`: scripted in-memory backend for tests.

pub mod http_persistence;
#[cfg(test)]
pub mod mock_persistence;
pub mod persistence_trait;
pub mod types;

pub use http_persistence::HttpPersistence;
pub use persistence_trait::PersistenceApi;
pub use types::{
    BackendId, FormMetadata, PersistedRecord, RecordingUpload, SaveOutcomeSummary,
    SaveRequestBatch, ScreenshotUpload, SubmitResponse,
};
