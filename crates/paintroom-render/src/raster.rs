//! CPU rasterizer implementing [`RenderSurface`].
//!
//! Strokes are stroked with round caps and joins onto a `tiny_skia` pixmap. Eraser
//! strokes use `DestinationOut`, so they remove alpha instead of painting color.
//!
//! The surface keeps two layers. The committed canvas only ever receives complete
//! strokes, clears and base images, which keeps it identical to a replay of the log.
//! Live segments go to a preview copy of it that is thrown away on the next commit.

use crate::color::brush_color;
use kurbo::{BezPath, PathEl, Point};
use paintroom_core::stroke::{BrushStyle, Stroke};
use paintroom_core::surface::{RenderSurface, SurfaceError, SurfaceResult};
use peniko::Color;
use std::path::Path;
use thiserror::Error;
use tiny_skia::{
    BlendMode, FilterQuality, LineCap, LineJoin, Paint, PathBuilder, Pixmap, PixmapPaint,
    Transform,
};

/// Errors from creating rasters or writing them to disk.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Cannot allocate a {width}x{height} canvas")]
    Size { width: u32, height: u32 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// Result type for raster operations.
pub type RasterResult<T> = Result<T, RasterError>;

/// Raster surface settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterConfig {
    pub width: u32,
    pub height: u32,
    /// Fill used when the canvas is cleared.
    pub background: Color,
    /// Snapshots larger than this are refused.
    pub max_snapshot_bytes: Option<usize>,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            background: Color::from_rgba8(0, 0, 0, 0),
            max_snapshot_bytes: None,
        }
    }
}

impl RasterConfig {
    /// Set the canvas size in pixels.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the background fill.
    pub fn with_background(mut self, color: Color) -> Self {
        self.background = color;
        self
    }

    /// Limit snapshot size.
    pub fn with_max_snapshot_bytes(mut self, limit: usize) -> Self {
        self.max_snapshot_bytes = Some(limit);
        self
    }
}

/// Pixmap-backed canvas with a live preview layer.
pub struct RasterSurface {
    config: RasterConfig,
    canvas: Pixmap,
    preview: Option<Pixmap>,
}

impl RasterSurface {
    /// Create a cleared canvas.
    pub fn new(config: RasterConfig) -> RasterResult<Self> {
        let canvas = blank(config.width, config.height, config.background)?;
        Ok(Self {
            config,
            canvas,
            preview: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    /// What is currently shown: the preview while a stroke is live, else the canvas.
    fn visible(&self) -> &Pixmap {
        self.preview.as_ref().unwrap_or(&self.canvas)
    }

    /// Raw premultiplied RGBA bytes of what is shown, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.visible().data()
    }

    /// The straight RGBA value shown at `(x, y)`, if inside the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let c = self.visible().pixel(x, y)?.demultiply();
        Some([c.red(), c.green(), c.blue(), c.alpha()])
    }

    /// Change the canvas size. Contents are cleared; replay the log to restore them.
    pub fn resize(&mut self, width: u32, height: u32) -> RasterResult<()> {
        self.canvas = blank(width, height, self.config.background)?;
        self.preview = None;
        self.config.width = width;
        self.config.height = height;
        Ok(())
    }

    /// Encode what is shown as PNG.
    pub fn to_png(&self) -> SurfaceResult<Vec<u8>> {
        encode(self.visible())
    }

    /// Write what is shown to a PNG file.
    pub fn save_png(&self, path: impl AsRef<Path>) -> RasterResult<()> {
        let data = self.to_png()?;
        std::fs::write(path.as_ref(), &data)?;
        log::info!("Wrote {} ({} bytes)", path.as_ref().display(), data.len());
        Ok(())
    }

    fn fill_background(&mut self) {
        self.canvas.fill(skia_color(self.config.background));
        self.preview = None;
    }
}

fn skia_color(color: Color) -> tiny_skia::Color {
    let c = color.to_rgba8();
    tiny_skia::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

fn blank(width: u32, height: u32, background: Color) -> RasterResult<Pixmap> {
    let mut pixmap = Pixmap::new(width, height).ok_or(RasterError::Size { width, height })?;
    pixmap.fill(skia_color(background));
    Ok(pixmap)
}

fn encode(pixmap: &Pixmap) -> SurfaceResult<Vec<u8>> {
    pixmap
        .encode_png()
        .map_err(|e| SurfaceError::Encode(format!("PNG encoding failed: {e}")))
}

fn to_skia_path(path: &BezPath) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => pb.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => pb.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(c, p) => pb.quad_to(c.x as f32, c.y as f32, p.x as f32, p.y as f32),
            PathEl::CurveTo(c1, c2, p) => pb.cubic_to(
                c1.x as f32,
                c1.y as f32,
                c2.x as f32,
                c2.y as f32,
                p.x as f32,
                p.y as f32,
            ),
            PathEl::ClosePath => pb.close(),
        }
    }
    pb.finish()
}

/// Stroke `path` onto `pixmap` with the brush.
fn stroke_path(pixmap: &mut Pixmap, path: &BezPath, style: &BrushStyle) {
    let Some(path) = to_skia_path(path) else {
        log::debug!("Skipping degenerate path");
        return;
    };

    let mut paint = Paint::default();
    paint.anti_alias = true;
    if style.is_eraser() {
        paint.set_color_rgba8(0, 0, 0, 255);
        paint.blend_mode = BlendMode::DestinationOut;
    } else {
        let c = brush_color(&style.color).to_rgba8();
        paint.set_color_rgba8(c.r, c.g, c.b, c.a);
    }

    let pen = tiny_skia::Stroke {
        width: style.width as f32,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..tiny_skia::Stroke::default()
    };
    pixmap.stroke_path(&path, &paint, &pen, Transform::identity(), None);
}

impl RenderSurface for RasterSurface {
    fn render_segment(&mut self, from: Point, to: Point, style: &BrushStyle) {
        let mut path = BezPath::new();
        path.move_to(from);
        path.line_to(to);
        let preview = self.preview.get_or_insert_with(|| self.canvas.clone());
        stroke_path(preview, &path, style);
    }

    fn render_stroke(&mut self, stroke: &Stroke) {
        stroke_path(&mut self.canvas, &stroke.to_path(), stroke.style());
        self.preview = None;
    }

    fn clear_canvas(&mut self) {
        self.fill_background();
    }

    fn load_base_image(&mut self, bytes: &[u8]) -> SurfaceResult<()> {
        let image = Pixmap::decode_png(bytes).map_err(|e| SurfaceError::Decode(e.to_string()))?;
        if image.width() != self.width() || image.height() != self.height() {
            log::debug!(
                "Base image is {}x{}, canvas is {}x{}; drawing at origin",
                image.width(),
                image.height(),
                self.width(),
                self.height()
            );
        }

        self.fill_background();
        let paint = PixmapPaint {
            blend_mode: BlendMode::Source,
            quality: FilterQuality::Nearest,
            ..PixmapPaint::default()
        };
        self.canvas
            .draw_pixmap(0, 0, image.as_ref(), &paint, Transform::identity(), None);
        Ok(())
    }

    fn snapshot(&self) -> SurfaceResult<Vec<u8>> {
        let data = encode(&self.canvas)?;
        match self.config.max_snapshot_bytes {
            Some(limit) if data.len() > limit => Err(SurfaceError::TooLarge {
                size: data.len(),
                limit,
            }),
            _ => Ok(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paintroom_core::{SyncConfig, SyncEngine};

    fn surface() -> RasterSurface {
        RasterSurface::new(RasterConfig::default().with_size(64, 64)).unwrap()
    }

    fn line(from: (f64, f64), to: (f64, f64), style: BrushStyle) -> Stroke {
        Stroke::new(
            vec![
                Point::new(from.0, from.1),
                Point::new((from.0 + to.0) / 2.0, (from.1 + to.1) / 2.0),
                Point::new(to.0, to.1),
            ],
            style,
        )
        .unwrap()
    }

    /// PNG stores straight alpha, so a round trip may move a channel by one.
    fn assert_close(a: &[u8], b: &[u8]) {
        assert_eq!(a.len(), b.len());
        let worst = a.iter().zip(b).map(|(x, y)| x.abs_diff(*y)).max().unwrap_or(0);
        assert!(worst <= 1, "pixels differ by up to {}", worst);
    }

    #[test]
    fn test_stroke_paints_pixels() {
        let mut s = surface();
        s.render_stroke(&line((10.0, 32.0), (54.0, 32.0), BrushStyle::draw("#ff0000", 6.0)));
        assert_eq!(s.pixel(32, 32), Some([255, 0, 0, 255]));
        assert_eq!(s.pixel(32, 5), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_round_caps() {
        let mut s = surface();
        s.render_segment(Point::new(20.0, 20.0), Point::new(40.0, 20.0), &BrushStyle::draw("#000", 10.0));
        // Just past the end point, within the radius
        assert_eq!(s.pixel(43, 20).map(|p| p[3]), Some(255));
        // Corner of the square cap region stays empty
        assert_eq!(s.pixel(44, 15).map(|p| p[3]), Some(0));
    }

    #[test]
    fn test_erase_order_matters() {
        let draw = line((10.0, 32.0), (54.0, 32.0), BrushStyle::draw("#0000ff", 6.0));
        let erase = line((32.0, 10.0), (32.0, 54.0), BrushStyle::erase(10.0));

        let mut drawn_then_erased = surface();
        drawn_then_erased.render_stroke(&draw);
        drawn_then_erased.render_stroke(&erase);
        assert_eq!(drawn_then_erased.pixel(32, 32), Some([0, 0, 0, 0]));

        let mut erased_then_drawn = surface();
        erased_then_drawn.render_stroke(&erase);
        erased_then_drawn.render_stroke(&draw);
        assert_eq!(erased_then_drawn.pixel(32, 32), Some([0, 0, 255, 255]));
    }

    #[test]
    fn test_canvases_match_their_own_replay() {
        let mut drawer = SyncEngine::new(SyncConfig::default());
        let mut receiver = SyncEngine::new(SyncConfig::default());
        let mut drawn = surface();
        let mut received = surface();

        let gestures = [
            (BrushStyle::draw("#e94560", 4.0), vec![(5.0, 5.0), (20.0, 40.0), (60.0, 30.0)]),
            (BrushStyle::draw("#53d8fb80", 8.0), vec![(5.0, 50.0), (30.0, 20.0), (60.0, 10.0)]),
            (BrushStyle::erase(6.0), vec![(30.0, 0.0), (34.0, 30.0), (30.0, 64.0)]),
        ];
        for (style, points) in gestures {
            drawer.begin_local_stroke(Point::new(points[0].0, points[0].1), style);
            for &(x, y) in &points[1..] {
                drawer.extend_local_stroke(Point::new(x, y), &mut drawn);
            }
            drawer.complete_local_stroke(&mut drawn);
            for env in drawer.take_outgoing() {
                receiver.handle_envelope(&env, &mut received);
            }
        }
        assert_eq!(receiver.log(), drawer.log());

        for (engine, canvas) in [(&drawer, &drawn), (&receiver, &received)] {
            let mut replayed = surface();
            engine.redraw(&mut replayed);
            assert_eq!(canvas.pixels(), replayed.pixels());
        }
        assert_eq!(drawn.pixels(), received.pixels());
    }

    #[test]
    fn test_live_segments_are_transient() {
        let mut s = surface();
        s.render_segment(Point::new(10.0, 10.0), Point::new(50.0, 10.0), &BrushStyle::draw("#000", 6.0));
        assert_eq!(s.pixel(30, 10).map(|p| p[3]), Some(255));

        // Snapshots carry committed strokes only
        let mut other = surface();
        other.load_base_image(&s.snapshot().unwrap()).unwrap();
        assert_eq!(other.pixel(30, 10), Some([0, 0, 0, 0]));

        // Committing a stroke elsewhere drops the preview
        s.render_stroke(&line((10.0, 50.0), (50.0, 50.0), BrushStyle::draw("#000", 6.0)));
        assert_eq!(s.pixel(30, 10), Some([0, 0, 0, 0]));
        assert_eq!(s.pixel(30, 50).map(|p| p[3]), Some(255));
    }

    #[test]
    fn test_snapshot_loads_into_other_surface() {
        let mut source = surface();
        source.render_stroke(&line((10.0, 10.0), (50.0, 50.0), BrushStyle::draw("#1a1a2e", 4.0)));
        let png = source.snapshot().unwrap();

        let mut target = surface();
        target.load_base_image(&png).unwrap();
        assert_close(target.pixels(), source.pixels());
    }

    #[test]
    fn test_bad_base_image_leaves_canvas() {
        let mut s = surface();
        s.render_stroke(&line((10.0, 32.0), (54.0, 32.0), BrushStyle::draw("#ff0000", 6.0)));
        let before = s.pixels().to_vec();
        assert!(matches!(s.load_base_image(b"not a png"), Err(SurfaceError::Decode(_))));
        assert_eq!(s.pixels(), &before[..]);
    }

    #[test]
    fn test_base_image_of_other_size() {
        let mut small = RasterSurface::new(RasterConfig::default().with_size(8, 8)).unwrap();
        small.render_stroke(&line((0.0, 4.0), (8.0, 4.0), BrushStyle::draw("#fff", 4.0)));
        let png = small.to_png().unwrap();

        let mut s = surface();
        s.load_base_image(&png).unwrap();
        assert_eq!(s.pixel(4, 4), small.pixel(4, 4));
        assert_eq!(s.pixel(20, 4), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_snapshot_limit() {
        let config = RasterConfig::default().with_size(64, 64).with_max_snapshot_bytes(16);
        let mut s = RasterSurface::new(config).unwrap();
        s.render_stroke(&line((10.0, 32.0), (54.0, 32.0), BrushStyle::draw("#ff0000", 6.0)));
        assert!(matches!(s.snapshot(), Err(SurfaceError::TooLarge { limit: 16, .. })));
    }

    #[test]
    fn test_clear_and_resize_use_background() {
        let white = Color::from_rgba8(255, 255, 255, 255);
        let config = RasterConfig::default().with_size(4, 4).with_background(white);
        let mut s = RasterSurface::new(config).unwrap();
        s.render_segment(Point::new(0.0, 0.0), Point::new(4.0, 4.0), &BrushStyle::draw("#000", 4.0));
        s.clear_canvas();
        assert_eq!(s.pixel(1, 1), Some([255, 255, 255, 255]));

        s.resize(10, 2).unwrap();
        assert_eq!((s.width(), s.height()), (10, 2));
        assert_eq!(s.pixel(9, 1), Some([255, 255, 255, 255]));
        assert_eq!(s.pixel(0, 2), None);
    }

    #[test]
    fn test_zero_size_is_an_error() {
        let config = RasterConfig::default().with_size(0, 10);
        assert!(matches!(
            RasterSurface::new(config),
            Err(RasterError::Size { width: 0, height: 10 })
        ));
        assert!(surface().resize(10, 0).is_err());
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canvas.png");
        let mut s = surface();
        s.render_stroke(&line((10.0, 32.0), (54.0, 32.0), BrushStyle::draw("#ff0000", 6.0)));
        s.save_png(&path).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), s.to_png().unwrap());
        let decoded = Pixmap::load_png(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
        assert_close(decoded.data(), s.pixels());
    }
}
