use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;

use super::types::{AnnotationLayer, CanvasId, Stroke};

/// Shared map of stroke layers, at most one per canvas.
///
/// The drawing collaborator writes layers through [`AnnotationStore::set`]; the
/// save pipeline only reads them and clears a layer once its screenshot is saved.
#[derive(Debug, Default)]
pub struct AnnotationStore {
    layers: Mutex<HashMap<CanvasId, AnnotationLayer>>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn layers(&self) -> MutexGuard<'_, HashMap<CanvasId, AnnotationLayer>> {
        self.layers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, canvas_id: &CanvasId) -> Option<AnnotationLayer> {
        self.layers().get(canvas_id).cloned()
    }

    /// Stores `layer`, replacing whatever was filed under the same canvas.
    pub fn set(&self, layer: AnnotationLayer) {
        debug!(
            "[{}] annotation layer set ({} stroke(s))",
            layer.canvas_id,
            layer.strokes.len()
        );
        self.layers().insert(layer.canvas_id.clone(), layer);
    }

    pub fn clear(&self, canvas_id: &CanvasId) -> Option<AnnotationLayer> {
        let removed = self.layers().remove(canvas_id);
        if removed.is_some() {
            debug!("[{}] annotation layer cleared", canvas_id);
        }
        removed
    }

    /// Follows the removal of screenshot `index` from a sequence of `count`:
    /// its positional layer is dropped and every positional layer behind it
    /// moves down one slot, like the thumbnails they were drawn on.
    pub fn remove_positional(&self, index: usize, count: usize) -> Option<AnnotationLayer> {
        let mut layers = self.layers();
        let removed = layers.remove(&CanvasId::positional(index));
        for from in index + 1..count {
            if let Some(mut layer) = layers.remove(&CanvasId::positional(from)) {
                let to = CanvasId::positional(from - 1);
                debug!("[{}] annotation layer moved to {}", layer.canvas_id, to);
                layer.canvas_id = to.clone();
                layers.insert(to, layer);
            }
        }
        removed
    }

    pub fn strokes_for(&self, canvas_id: &CanvasId) -> Vec<Stroke> {
        self.layers()
            .get(canvas_id)
            .map(|l| l.strokes.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.layers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
