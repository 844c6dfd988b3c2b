//! Annotation subsystem
//!
//! Stroke layers drawn over screenshots and the merger that flattens them into
//! the uploaded image.
//!
//! Components:
//! - `types`: canvas ids, strokes and layers.
//! - `store`: the shared `AnnotationStore` (get/set/clear).
//! - `data_uri`: `data:` URI encode/parse.
//! - `merger`: `AnnotationMerger`, stroke rasterisation and compositing.

pub mod data_uri;
pub mod merger;
pub mod store;
pub mod types;

pub use merger::{AnnotationMerger, MergedImage};
pub use store::AnnotationStore;
pub use types::{AnnotationLayer, CanvasId, Point, Stroke, StrokeTool};
