//! Stroke data as produced by the drawing collaborator.

use std::fmt;

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::error_handling::types::MergeError;

/// Key of the stroke layer drawn over a screenshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanvasId(String);

impl CanvasId {
    pub fn new(id: impl Into<String>) -> Self {
        CanvasId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id the drawing collaborator uses when the screenshot is reopened in the enlarged view.
    pub fn enlarged(&self) -> CanvasId {
        CanvasId(format!("enlarged-{}", self.0))
    }

    /// Positional id used by the thumbnail strip.
    pub fn positional(index: usize) -> CanvasId {
        CanvasId(format!("screenshot-{}", index))
    }

    /// Every id a screenshot's strokes may be filed under, highest priority first.
    ///
    /// A screenshot can be drawn on in more than one view and each view names its
    /// canvas differently; which one holds the strokes is not known up front.
    pub fn candidates(&self, index: usize) -> Vec<CanvasId> {
        vec![self.clone(), self.enlarged(), CanvasId::positional(index)]
    }
}

impl fmt::Display for CanvasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeTool {
    Pen,
    Highlighter,
    /// Clears previously drawn strokes instead of painting.
    Eraser,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub tool: StrokeTool,
    /// CSS-style hex color: `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub color: String,
    pub width: f32,
    pub points: Vec<Point>,
}

impl Stroke {
    pub fn pen(color: &str, width: f32, points: Vec<Point>) -> Self {
        Self {
            tool: StrokeTool::Pen,
            color: color.to_string(),
            width,
            points,
        }
    }

    pub fn eraser(width: f32, points: Vec<Point>) -> Self {
        Self {
            tool: StrokeTool::Eraser,
            color: "#000000".to_string(),
            width,
            points,
        }
    }

    /// Resolved paint color, with the highlighter's translucency applied.
    pub fn rgba(&self) -> Result<Rgba<u8>, MergeError> {
        let mut color = parse_hex_color(&self.color)?;
        if self.tool == StrokeTool::Highlighter {
            color[3] = (f32::from(color[3]) * 0.35).round() as u8;
        }
        Ok(color)
    }
}

fn parse_hex_color(raw: &str) -> Result<Rgba<u8>, MergeError> {
    let invalid = || MergeError::InvalidColor(raw.to_string());
    let hex = raw.trim().strip_prefix('#').ok_or_else(invalid)?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
    match hex.len() {
        3 => {
            let mut out = [255u8; 4];
            for (i, c) in hex.chars().enumerate() {
                let v = channel(&c.to_string())?;
                out[i] = v * 17;
            }
            Ok(Rgba(out))
        }
        6 | 8 => {
            let mut out = [255u8; 4];
            for i in 0..hex.len() / 2 {
                out[i] = channel(&hex[i * 2..i * 2 + 2])?;
            }
            Ok(Rgba(out))
        }
        _ => Err(invalid()),
    }
}

/// All strokes drawn on one canvas, in recorded order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationLayer {
    pub canvas_id: CanvasId,
    pub strokes: Vec<Stroke>,
    #[serde(default)]
    pub is_saved: bool,
}

impl AnnotationLayer {
    pub fn new(canvas_id: CanvasId, strokes: Vec<Stroke>) -> Self {
        Self {
            canvas_id,
            strokes,
            is_saved: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_order() {
        let id = CanvasId::new("canvas-3f2a");
        let candidates = id.candidates(4);
        assert_eq!(
            candidates,
            vec![
                CanvasId::new("canvas-3f2a"),
                CanvasId::new("enlarged-canvas-3f2a"),
                CanvasId::new("screenshot-4"),
            ]
        );
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#f00").unwrap(), Rgba([255, 0, 0, 255]));
        assert_eq!(parse_hex_color("#00ff7f").unwrap(), Rgba([0, 255, 127, 255]));
        assert_eq!(parse_hex_color("#11223344").unwrap(), Rgba([0x11, 0x22, 0x33, 0x44]));
        assert!(parse_hex_color("red").is_err());
        assert!(parse_hex_color("#12345").is_err());
        assert!(parse_hex_color("#gg0000").is_err());
    }

    #[test]
    fn highlighter_is_translucent() {
        let stroke = Stroke {
            tool: StrokeTool::Highlighter,
            color: "#ffff00".into(),
            width: 12.0,
            points: vec![Point::new(1.0, 1.0)],
        };
        assert_eq!(stroke.rgba().unwrap(), Rgba([255, 255, 0, 89]));
    }

    #[test]
    fn stroke_json_shape() {
        let json = r##"{"tool":"eraser","color":"#000","width":8,"points":[{"x":1,"y":2}]}"##;
        let stroke: Stroke = serde_json::from_str(json).unwrap();
        assert_eq!(stroke.tool, StrokeTool::Eraser);
        assert_eq!(stroke.points, vec![Point::new(1.0, 2.0)]);
    }
}
