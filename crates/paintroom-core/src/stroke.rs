//! Strokes, segments and brush attributes.
//!
//! A [`Stroke`] is one finished pointer gesture. While the pointer is still down the
//! gesture lives in a [`StrokeBuilder`], which hands out a [`Segment`] for every point
//! added so peers can render the line before it is finished.

use kurbo::{BezPath, Point, Rect};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum number of points for a stroke to be recorded in the log.
pub const MIN_STROKE_POINTS: usize = 2;

/// Default brush color.
pub const DEFAULT_COLOR: &str = "#1a1a2e";

/// Default brush width in canvas pixels.
pub const DEFAULT_WIDTH: f64 = 4.0;

/// Colors offered by the toolbar palette.
pub const DEFAULT_PALETTE: [&str; 16] = [
    "#1a1a2e", "#e94560", "#0f3460", "#16213e", "#53d8fb", "#e7305b", "#f38181", "#fce38a",
    "#95e1d3", "#3a506b", "#f5f5f5", "#ff6b6b", "#4ecdc4", "#45b7d1", "#f9ca24", "#6c5ce7",
];

/// Stroke validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrokeError {
    #[error("Stroke needs at least {MIN_STROKE_POINTS} points, got {0}")]
    TooFewPoints(usize),
    #[error("Point ({0}, {1}) is not finite")]
    NonFinite(f64, f64),
    #[error("Brush width must be positive, got {0}")]
    InvalidWidth(f64),
    #[error("Segment needs exactly 2 points, got {0}")]
    SegmentArity(usize),
}

/// Whether a brush paints color or removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BrushMode {
    /// Paint with the brush color.
    #[default]
    #[serde(rename = "pencil")]
    Draw,
    /// Clear pixels back to transparent; the color is ignored.
    #[serde(rename = "eraser")]
    Erase,
}

/// Immutable drawing attributes shared by every point of a stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrushStyle {
    /// Opaque color token, only meaningful in [`BrushMode::Draw`].
    pub color: String,
    /// Line width in canvas pixels.
    #[serde(rename = "size")]
    pub width: f64,
    /// Draw or erase.
    #[serde(rename = "tool")]
    pub mode: BrushMode,
}

impl BrushStyle {
    /// Create a drawing brush.
    pub fn draw(color: impl Into<String>, width: f64) -> Self {
        Self {
            color: color.into(),
            width,
            mode: BrushMode::Draw,
        }
    }

    /// Create an eraser. The color is kept at the default so the payload stays well formed.
    pub fn erase(width: f64) -> Self {
        Self {
            color: DEFAULT_COLOR.to_string(),
            width,
            mode: BrushMode::Erase,
        }
    }

    /// Whether this brush erases.
    pub fn is_eraser(&self) -> bool {
        self.mode == BrushMode::Erase
    }

    fn validate(&self) -> Result<(), StrokeError> {
        if !self.width.is_finite() || self.width <= 0.0 {
            return Err(StrokeError::InvalidWidth(self.width));
        }
        Ok(())
    }
}

impl Default for BrushStyle {
    fn default() -> Self {
        Self::draw(DEFAULT_COLOR, DEFAULT_WIDTH)
    }
}

fn validate_points(points: &[Point]) -> Result<(), StrokeError> {
    if let Some(p) = points.iter().find(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(StrokeError::NonFinite(p.x, p.y));
    }
    Ok(())
}

/// Payload shape shared by strokes and segments on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathPayload {
    pub points: Vec<Point>,
    #[serde(flatten)]
    pub style: BrushStyle,
}

/// One completed gesture: an ordered point sequence with fixed attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PathPayload", into = "PathPayload")]
pub struct Stroke {
    points: Vec<Point>,
    style: BrushStyle,
}

impl Stroke {
    /// Build a stroke, rejecting gestures below [`MIN_STROKE_POINTS`], non-finite
    /// coordinates and bad widths.
    pub fn new(points: Vec<Point>, style: BrushStyle) -> Result<Self, StrokeError> {
        if points.len() < MIN_STROKE_POINTS {
            return Err(StrokeError::TooFewPoints(points.len()));
        }
        validate_points(&points)?;
        style.validate()?;
        Ok(Self { points, style })
    }

    /// Points in gesture order.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Drawing attributes.
    pub fn style(&self) -> &BrushStyle {
        &self.style
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false for a constructed stroke; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Axis-aligned bounds of the points, grown by half the brush width.
    pub fn bounds(&self) -> Rect {
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;

        for point in &self.points {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }

        Rect::new(min_x, min_y, max_x, max_y).inflate(self.style.width / 2.0, self.style.width / 2.0)
    }

    /// Smoothed outline of the stroke.
    ///
    /// Each interior point is used as a quadratic control point with the curve passing
    /// through the midpoints of consecutive points; the path ends with a straight line to
    /// the final point.
    pub fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let Some(first) = self.points.first() else {
            return path;
        };

        path.move_to(*first);
        for pair in self.points.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            path.quad_to(prev, prev.midpoint(curr));
        }
        if let Some(last) = self.points.last() {
            path.line_to(*last);
        }

        path
    }
}

impl TryFrom<PathPayload> for Stroke {
    type Error = StrokeError;

    fn try_from(payload: PathPayload) -> Result<Self, Self::Error> {
        Stroke::new(payload.points, payload.style)
    }
}

impl From<Stroke> for PathPayload {
    fn from(stroke: Stroke) -> Self {
        Self {
            points: stroke.points,
            style: stroke.style,
        }
    }
}

/// The newest two points of an in-progress stroke, sent as a live rendering hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PathPayload", into = "PathPayload")]
pub struct Segment {
    pub from: Point,
    pub to: Point,
    pub style: BrushStyle,
}

impl TryFrom<PathPayload> for Segment {
    type Error = StrokeError;

    fn try_from(payload: PathPayload) -> Result<Self, Self::Error> {
        if payload.points.len() != 2 {
            return Err(StrokeError::SegmentArity(payload.points.len()));
        }
        validate_points(&payload.points)?;
        payload.style.validate()?;
        Ok(Self {
            from: payload.points[0],
            to: payload.points[1],
            style: payload.style,
        })
    }
}

impl From<Segment> for PathPayload {
    fn from(segment: Segment) -> Self {
        Self {
            points: vec![segment.from, segment.to],
            style: segment.style,
        }
    }
}

/// A gesture still under the pointer.
#[derive(Debug, Clone)]
pub struct StrokeBuilder {
    points: Vec<Point>,
    style: BrushStyle,
}

impl StrokeBuilder {
    /// Start a gesture at `origin`.
    pub fn new(origin: Point, style: BrushStyle) -> Self {
        Self {
            points: vec![origin],
            style,
        }
    }

    /// Add a point and return the segment from the previous point to it.
    pub fn add_point(&mut self, point: Point) -> Option<Segment> {
        let prev = *self.points.last()?;
        self.points.push(point);
        Some(Segment {
            from: prev,
            to: point,
            style: self.style.clone(),
        })
    }

    /// Number of points so far.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no points were recorded.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Attributes of the gesture.
    pub fn style(&self) -> &BrushStyle {
        &self.style
    }

    /// Finish the gesture. Gestures below [`MIN_STROKE_POINTS`] or with invalid data
    /// yield `None`.
    pub fn finish(self) -> Option<Stroke> {
        if self.points.len() < MIN_STROKE_POINTS {
            return None;
        }
        match Stroke::new(self.points, self.style) {
            Ok(stroke) => Some(stroke),
            Err(e) => {
                log::warn!("Discarding local stroke: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red(width: f64) -> BrushStyle {
        BrushStyle::draw("red", width)
    }

    #[test]
    fn test_stroke_rejects_short_gestures() {
        assert_eq!(Stroke::new(vec![], red(4.0)), Err(StrokeError::TooFewPoints(0)));
        assert_eq!(
            Stroke::new(vec![Point::new(3.0, 3.0)], red(4.0)),
            Err(StrokeError::TooFewPoints(1))
        );
    }

    #[test]
    fn test_stroke_rejects_bad_width() {
        let points = vec![Point::ZERO, Point::new(1.0, 1.0)];
        let result = Stroke::new(points.clone(), red(0.0));
        assert_eq!(result, Err(StrokeError::InvalidWidth(0.0)));
        let result = Stroke::new(points, red(f64::NAN));
        assert!(matches!(result, Err(StrokeError::InvalidWidth(_))));
    }

    #[test]
    fn test_stroke_rejects_non_finite_point() {
        let result = Stroke::new(vec![Point::ZERO, Point::new(f64::INFINITY, 1.0)], red(2.0));
        assert!(matches!(result, Err(StrokeError::NonFinite(_, _))));
    }

    #[test]
    fn test_builder_yields_segments() {
        let mut builder = StrokeBuilder::new(Point::new(0.0, 0.0), red(4.0));
        let seg = builder.add_point(Point::new(5.0, 5.0)).unwrap();
        assert_eq!(seg.from, Point::new(0.0, 0.0));
        assert_eq!(seg.to, Point::new(5.0, 5.0));

        let seg = builder.add_point(Point::new(10.0, 0.0)).unwrap();
        assert_eq!(seg.from, Point::new(5.0, 5.0));
        assert_eq!(builder.len(), 3);

        let stroke = builder.finish().unwrap();
        assert_eq!(stroke.len(), 3);
        assert_eq!(stroke.style().color, "red");
    }

    #[test]
    fn test_single_point_gesture_is_discarded() {
        let builder = StrokeBuilder::new(Point::new(1.0, 1.0), red(4.0));
        assert!(builder.finish().is_none());
    }

    #[test]
    fn test_stroke_wire_format() {
        let stroke = Stroke::new(
            vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)],
            BrushStyle::draw("#e94560", 6.0),
        )
        .unwrap();
        let json = serde_json::to_value(&stroke).unwrap();
        assert_eq!(json["color"], "#e94560");
        assert_eq!(json["size"], 6.0);
        assert_eq!(json["tool"], "pencil");
        assert_eq!(json["points"][1]["x"], 5.0);
    }

    #[test]
    fn test_stroke_deserialize_validates() {
        let json = r#"{"points":[],"color":"red","size":4,"tool":"pencil"}"#;
        assert!(serde_json::from_str::<Stroke>(json).is_err());

        let json = r#"{"points":[{"x":1,"y":2}],"color":"red","size":4,"tool":"pencil"}"#;
        assert!(serde_json::from_str::<Stroke>(json).is_err());

        let json = r#"{"points":[{"x":1,"y":2},{"x":3,"y":4}],"color":"red","size":-1,"tool":"eraser"}"#;
        assert!(serde_json::from_str::<Stroke>(json).is_err());

        let json = r#"{"points":[{"x":1,"y":2},{"x":3,"y":4}],"color":"","size":8,"tool":"eraser"}"#;
        let stroke: Stroke = serde_json::from_str(json).unwrap();
        assert!(stroke.style().is_eraser());
    }

    #[test]
    fn test_segment_requires_two_points() {
        let json = r#"{"points":[{"x":1,"y":2}],"color":"red","size":4,"tool":"pencil"}"#;
        assert!(serde_json::from_str::<Segment>(json).is_err());

        let json = r#"{"points":[{"x":1,"y":2},{"x":3,"y":4}],"color":"red","size":4,"tool":"pencil"}"#;
        let seg: Segment = serde_json::from_str(json).unwrap();
        assert_eq!(seg.to, Point::new(3.0, 4.0));
    }

    #[test]
    fn test_bounds_include_brush_radius() {
        let stroke = Stroke::new(
            vec![Point::new(10.0, 10.0), Point::new(20.0, 30.0)],
            red(4.0),
        )
        .unwrap();
        let bounds = stroke.bounds();
        assert!((bounds.x0 - 8.0).abs() < f64::EPSILON);
        assert!((bounds.y1 - 32.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_smoothed_path_ends_at_last_point() {
        let stroke = Stroke::new(
            vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0), Point::new(10.0, 0.0)],
            red(4.0),
        )
        .unwrap();
        let path = stroke.to_path();
        assert_eq!(path.elements().len(), 4);
        assert_eq!(path.elements().last(), Some(&kurbo::PathEl::LineTo(Point::new(10.0, 0.0))));
    }
}
