//! Rendering surface and membership view contracts.
//!
//! The engine never touches pixels itself. It calls into a [`RenderSurface`] for every
//! drawing effect and into a [`MembershipView`] when the room's participant count changes.

use crate::stroke::{BrushStyle, Segment, Stroke};
use kurbo::Point;
use thiserror::Error;

/// Surface errors.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Snapshot of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Result type for surface operations.
pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// Something that turns strokes into pixels.
///
/// Completed strokes are authoritative: rendering a sequence of strokes onto a cleared
/// surface must always give the same result, so the event log can be replayed to rebuild
/// a canvas. Live segments are a preview only. The next committed stroke, clear or base
/// image discards every preview drawn so far.
pub trait RenderSurface {
    /// Preview a straight segment of an in-progress stroke.
    fn render_segment(&mut self, from: Point, to: Point, style: &BrushStyle);

    /// Commit a complete stroke and drop the live preview.
    fn render_stroke(&mut self, stroke: &Stroke);

    /// Erase everything.
    fn clear_canvas(&mut self);

    /// Replace the canvas contents with a previously captured snapshot.
    fn load_base_image(&mut self, bytes: &[u8]) -> SurfaceResult<()>;

    /// Capture the committed canvas contents, without live previews.
    fn snapshot(&self) -> SurfaceResult<Vec<u8>>;

    /// MIME type of the bytes produced by [`RenderSurface::snapshot`].
    fn snapshot_mime(&self) -> &'static str {
        "image/png"
    }
}

/// UI sink for the online participant count.
pub trait MembershipView {
    fn set_membership_count(&mut self, count: usize);
}

impl MembershipView for Option<usize> {
    fn set_membership_count(&mut self, count: usize) {
        *self = Some(count);
    }
}

/// Surface that records draw calls instead of rasterizing them.
///
/// The committed "pixels" are the strokes drawn since the last clear; snapshots are
/// that list as JSON. Live segments are kept apart until the next commit.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    strokes: Vec<Stroke>,
    live: Vec<Segment>,
    clears: usize,
    base_images: usize,
    snapshot_limit: Option<usize>,
}

impl RecordingSurface {
    /// Create an empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail snapshots larger than `limit` bytes.
    pub fn with_snapshot_limit(mut self, limit: usize) -> Self {
        self.snapshot_limit = Some(limit);
        self
    }

    /// Committed strokes, in draw order.
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Segments previewed since the last commit.
    pub fn live_segments(&self) -> &[Segment] {
        &self.live
    }

    /// Whether nothing at all is shown.
    pub fn is_blank(&self) -> bool {
        self.strokes.is_empty() && self.live.is_empty()
    }

    /// How many times the canvas was cleared.
    pub fn clear_count(&self) -> usize {
        self.clears
    }

    /// How many base images were loaded.
    pub fn base_image_count(&self) -> usize {
        self.base_images
    }
}

impl RenderSurface for RecordingSurface {
    fn render_segment(&mut self, from: Point, to: Point, style: &BrushStyle) {
        self.live.push(Segment {
            from,
            to,
            style: style.clone(),
        });
    }

    fn render_stroke(&mut self, stroke: &Stroke) {
        self.live.clear();
        self.strokes.push(stroke.clone());
    }

    fn clear_canvas(&mut self) {
        self.live.clear();
        self.strokes.clear();
        self.clears += 1;
    }

    fn load_base_image(&mut self, bytes: &[u8]) -> SurfaceResult<()> {
        let strokes: Vec<Stroke> =
            serde_json::from_slice(bytes).map_err(|e| SurfaceError::Decode(e.to_string()))?;
        self.live.clear();
        self.strokes = strokes;
        self.base_images += 1;
        Ok(())
    }

    fn snapshot(&self) -> SurfaceResult<Vec<u8>> {
        let bytes =
            serde_json::to_vec(&self.strokes).map_err(|e| SurfaceError::Encode(e.to_string()))?;
        match self.snapshot_limit {
            Some(limit) if bytes.len() > limit => Err(SurfaceError::TooLarge {
                size: bytes.len(),
                limit,
            }),
            _ => Ok(bytes),
        }
    }

    fn snapshot_mime(&self) -> &'static str {
        "application/json"
    }
}
