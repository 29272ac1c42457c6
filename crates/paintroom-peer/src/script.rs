//! Scripted drawing input.
//!
//! A script is a JSON array of strokes in wire format. The player feeds one point per
//! frame into the engine, the way a pointer would, so peers see live segments followed
//! by the completed stroke.

use kurbo::Point;
use paintroom_core::{RenderSurface, Stroke, SyncEngine};
use std::collections::VecDeque;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid script: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load strokes from a JSON file.
pub fn load(path: impl AsRef<Path>) -> Result<Vec<Stroke>, ScriptError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Replays strokes as pointer input, one point per [`ScriptPlayer::step`].
pub struct ScriptPlayer {
    pending: VecDeque<Stroke>,
    current: Option<(Stroke, usize)>,
}

impl ScriptPlayer {
    pub fn new(strokes: Vec<Stroke>) -> Self {
        Self {
            pending: strokes.into(),
            current: None,
        }
    }

    /// Whether every stroke has been drawn.
    pub fn is_done(&self) -> bool {
        self.pending.is_empty() && self.current.is_none()
    }

    /// Feed the next point into `engine`.
    pub fn step(&mut self, engine: &mut SyncEngine, surface: &mut dyn RenderSurface) {
        match self.current.take() {
            None => {
                let Some(stroke) = self.pending.pop_front() else {
                    return;
                };
                let start = stroke.points()[0];
                engine.begin_local_stroke(start, stroke.style().clone());
                self.current = Some((stroke, 1));
            }
            Some((stroke, next)) if next < stroke.len() => {
                let point: Point = stroke.points()[next];
                engine.extend_local_stroke(point, surface);
                self.current = Some((stroke, next + 1));
            }
            Some(_) => {
                if let Some(stroke) = engine.complete_local_stroke(surface) {
                    log::debug!("Finished scripted stroke with {} points", stroke.len());
                }
            }
        }
    }
}
