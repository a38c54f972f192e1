use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Shape {
    Square,
    Rect,
    Circle,
    Triangle,
    Line,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Tool {
    Pen,
    Eraser,
    Shape(Shape),
}

impl Tool {
    /// Freehand tools paint on every pointer move; shapes paint once on release.
    pub fn is_freehand(self) -> bool {
        matches!(self, Tool::Pen | Tool::Eraser)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct StrokeStyle {
    pub color: [u8; 4],
    /// Line width in logical pixels.
    pub thickness: f32,
}

impl StrokeStyle {
    pub const MIN_THICKNESS: f32 = 0.5;
    pub const MAX_THICKNESS: f32 = 64.0;

    pub fn new(color: [u8; 4], thickness: f32) -> Self {
        Self {
            color,
            thickness: thickness.clamp(Self::MIN_THICKNESS, Self::MAX_THICKNESS),
        }
    }
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: [255, 255, 255, 255],
            thickness: 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_deserializes_shape_variants() {
        let tool: Tool = serde_json::from_str(r#"{"shape":"circle"}"#).expect("shape tool");
        assert_eq!(tool, Tool::Shape(Shape::Circle));
        assert!(!tool.is_freehand());

        let pen: Tool = serde_json::from_str(r#""pen""#).expect("pen tool");
        assert!(pen.is_freehand());
    }

    #[test]
    fn thickness_is_clamped() {
        assert_eq!(StrokeStyle::new([0, 0, 0, 255], 500.0).thickness, 64.0);
        assert_eq!(StrokeStyle::new([0, 0, 0, 255], 0.0).thickness, 0.5);
    }
}
