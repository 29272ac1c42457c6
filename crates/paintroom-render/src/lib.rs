//! Paintroom Render Library
//!
//! CPU rasterizer for Paintroom canvases, built on `tiny_skia`. [`RasterSurface`]
//! implements the core `RenderSurface` contract and snapshots to PNG for late-join
//! reconciliation.

pub mod color;
mod raster;

pub use color::{brush_color, parse_css_color};
pub use raster::{RasterConfig, RasterError, RasterResult, RasterSurface};
