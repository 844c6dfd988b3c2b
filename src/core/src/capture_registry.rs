//! Capture registry subsystem
//!
//! Holds every recording and screenshot captured during a live inspection
//! session together with its save lifecycle state.
//!
//! Components:
//! - `types`: the captured item data model and lifecycle states.
//! - `blob_store`: transient object URLs owning recording bytes until removal.
//! - `registry`: the `CaptureRegistry` and its transition functions.

pub mod blob_store;
pub mod registry;
pub mod types;

pub use blob_store::{BlobStore, ObjectUrl};
pub use registry::{CaptureRegistry, Removed};
pub use types::{
    CapturedItem, CapturedRecording, CapturedScreenshot, LifecycleState, RecordingCapture,
};
