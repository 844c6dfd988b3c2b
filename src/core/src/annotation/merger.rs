//! Flattens a screenshot's stroke layer into the image that gets uploaded.
//!
//! Strokes are rasterised, in recorded order, onto a transparent overlay the size
//! of the base image: pen and highlighter strokes blend their color in, eraser
//! strokes punch the overlay back to transparent. The overlay is then composited
//! onto a copy of the base. Erasing therefore removes earlier strokes but never
//! the photographed content underneath.
//!
//! Merging is best effort. Any failure yields the original image with
//! `has_drawings = false`; it never blocks the save that asked for it.

use std::io::Cursor;
use std::sync::Arc;

use image::{imageops, ImageFormat, Rgba, RgbaImage};
use log::{debug, warn};

use super::data_uri::{self, DataUri};
use super::store::AnnotationStore;
use super::types::{CanvasId, Stroke, StrokeTool};
use crate::error_handling::types::MergeError;

/// Result of [`AnnotationMerger::merge_with_background`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergedImage {
    /// `data:` URI to upload.
    pub data: String,
    pub has_drawings: bool,
    /// Canvas whose strokes were used, if any candidate had strokes.
    pub canvas_id: Option<CanvasId>,
}

#[derive(Clone)]
pub struct AnnotationMerger {
    store: Arc<AnnotationStore>,
}

impl AnnotationMerger {
    pub fn new(store: Arc<AnnotationStore>) -> Self {
        Self { store }
    }

    /// First candidate canvas with a non-empty stroke set.
    pub fn resolve_canvas(&self, candidates: &[CanvasId]) -> Option<(CanvasId, Vec<Stroke>)> {
        candidates.iter().find_map(|id| {
            let strokes = self.store.strokes_for(id);
            (!strokes.is_empty()).then(|| (id.clone(), strokes))
        })
    }

    /// The unmerged fallback: `base` as it is, no drawings.
    pub fn passthrough(base: impl Into<String>) -> MergedImage {
        MergedImage {
            data: base.into(),
            has_drawings: false,
            canvas_id: None,
        }
    }

    /// Merges the strokes of the first matching candidate canvas into `base`.
    ///
    /// With no strokes on any candidate, `base` comes back unchanged.
    pub fn merge_with_background(&self, base: &str, candidates: &[CanvasId]) -> MergedImage {
        let Some((canvas_id, strokes)) = self.resolve_canvas(candidates) else {
            return Self::passthrough(base);
        };

        match rasterize_onto(base, &strokes) {
            Ok(data) => {
                debug!("[{}] merged {} stroke(s)", canvas_id, strokes.len());
                MergedImage {
                    data,
                    has_drawings: true,
                    canvas_id: Some(canvas_id),
                }
            }
            Err(e) => {
                warn!(
                    "[{}] merge failed, uploading unannotated image: {}",
                    canvas_id, e
                );
                MergedImage {
                    data: base.to_string(),
                    has_drawings: false,
                    canvas_id: Some(canvas_id),
                }
            }
        }
    }

    pub fn merge_for_canvas(&self, base: &str, canvas_id: &CanvasId) -> MergedImage {
        self.merge_with_background(base, std::slice::from_ref(canvas_id))
    }

    /// [`AnnotationMerger::merge_with_background`] on the blocking pool, so
    /// decoding and rasterising never stall the async runtime.
    pub async fn merge_in_background(
        &self,
        base: String,
        candidates: Vec<CanvasId>,
    ) -> MergedImage {
        if self.resolve_canvas(&candidates).is_none() {
            return Self::passthrough(base);
        }
        let merger = self.clone();
        let fallback = base.clone();
        match tokio::task::spawn_blocking(move || merger.merge_with_background(&base, &candidates))
            .await
        {
            Ok(merged) => merged,
            Err(e) => {
                warn!("merge task failed, uploading unannotated image: {}", e);
                Self::passthrough(fallback)
            }
        }
    }
}

/// Decodes `base`, draws `strokes` over it and returns a PNG data URI.
pub fn rasterize_onto(base: &str, strokes: &[Stroke]) -> Result<String, MergeError> {
    let source = DataUri::parse(base)?;
    let mut canvas = image::load_from_memory(&source.bytes)
        .map_err(|e| MergeError::Decode(e.to_string()))?
        .to_rgba8();
    if canvas.width() == 0 || canvas.height() == 0 {
        return Err(MergeError::EmptyImage);
    }

    let mut overlay = RgbaImage::new(canvas.width(), canvas.height());
    for stroke in strokes {
        paint_stroke(&mut overlay, stroke)?;
    }
    imageops::overlay(&mut canvas, &overlay, 0, 0);

    let png = encode_png(&canvas)?;
    Ok(data_uri::encode("image/png", &png))
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, MergeError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| MergeError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}

/// Coverage of a single stroke; each pixel is painted at most once per stroke
/// so translucent tools don't darken where their stamps overlap.
struct StrokeMask {
    width: u32,
    height: u32,
    covered: Vec<bool>,
}

impl StrokeMask {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            covered: vec![false; (width as usize) * (height as usize)],
        }
    }

    fn stamp_disc(&mut self, cx: f32, cy: f32, radius: f32) {
        let max_x = self.width as i64 - 1;
        let max_y = self.height as i64 - 1;
        let min_px = ((cx - radius).floor() as i64).clamp(0, max_x);
        let max_px = ((cx + radius).ceil() as i64).clamp(0, max_x);
        let min_py = ((cy - radius).floor() as i64).clamp(0, max_y);
        let max_py = ((cy + radius).ceil() as i64).clamp(0, max_y);
        let r2 = radius * radius;
        for y in min_py..=max_py {
            for x in min_px..=max_px {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                if dx * dx + dy * dy <= r2 {
                    self.covered[(y as usize) * (self.width as usize) + x as usize] = true;
                }
            }
        }
    }

    /// Stamps discs along the part of the segment that can touch the image.
    /// Consecutive discs are at most half a radius apart, so the cost is
    /// bounded by the image size rather than by the raw coordinates.
    fn stamp_segment(&mut self, from: (f32, f32), to: (f32, f32), radius: f32) {
        let Some((from, to)) = self.clip(from, to, radius) else {
            return;
        };
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;
        let spacing = (radius / 2.0).max(1.0);
        let steps = ((dx * dx + dy * dy).sqrt() / spacing).ceil().max(1.0) as u32;
        for step in 0..=steps {
            let t = step as f32 / steps as f32;
            self.stamp_disc(from.0 + dx * t, from.1 + dy * t, radius);
        }
    }

    /// Liang-Barsky clip against the image bounds grown by `radius`.
    fn clip(
        &self,
        from: (f32, f32),
        to: (f32, f32),
        radius: f32,
    ) -> Option<((f32, f32), (f32, f32))> {
        let finite = [from.0, from.1, to.0, to.1, radius]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return None;
        }
        let (min_x, max_x) = (-radius, self.width as f32 - 1.0 + radius);
        let (min_y, max_y) = (-radius, self.height as f32 - 1.0 + radius);
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;

        let mut t0 = 0.0f32;
        let mut t1 = 1.0f32;
        for (p, q) in [
            (-dx, from.0 - min_x),
            (dx, max_x - from.0),
            (-dy, from.1 - min_y),
            (dy, max_y - from.1),
        ] {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
                continue;
            }
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
            if t0 > t1 {
                return None;
            }
        }

        Some((
            (from.0 + dx * t0, from.1 + dy * t0),
            (from.0 + dx * t1, from.1 + dy * t1),
        ))
    }

    fn pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.covered
            .iter()
            .enumerate()
            .filter(|(_, hit)| **hit)
            .map(move |(i, _)| ((i as u32) % self.width, (i as u32) / self.width))
    }
}

fn paint_stroke(overlay: &mut RgbaImage, stroke: &Stroke) -> Result<(), MergeError> {
    if stroke.points.is_empty() {
        return Ok(());
    }
    let color = stroke.rgba()?;
    let radius = (stroke.width.max(1.0) / 2.0).max(0.6);

    let mut mask = StrokeMask::new(overlay.width(), overlay.height());
    let points: Vec<(f32, f32)> = stroke.points.iter().map(|p| (p.x, p.y)).collect();
    if points.len() == 1 {
        mask.stamp_disc(points[0].0, points[0].1, radius);
    }
    for pair in points.windows(2) {
        mask.stamp_segment(pair[0], pair[1], radius);
    }

    for (x, y) in mask.pixels() {
        let next = match stroke.tool {
            StrokeTool::Eraser => Rgba([0, 0, 0, 0]),
            StrokeTool::Pen | StrokeTool::Highlighter => {
                blend_over(*overlay.get_pixel(x, y), color)
            }
        };
        overlay.put_pixel(x, y, next);
    }
    Ok(())
}

/// Source-over compositing of non-premultiplied RGBA.
fn blend_over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = f32::from(src[3]) / 255.0;
    if sa <= 0.0 {
        return dst;
    }
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let channel = |s: u8, d: u8| {
        let v = (f32::from(s) * sa + f32::from(d) * da * (1.0 - sa)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(src[0], dst[0]),
        channel(src[1], dst[1]),
        channel(src[2], dst[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
