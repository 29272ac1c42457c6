//! Per-peer log of completed strokes.

use crate::stroke::Stroke;
use crate::surface::RenderSurface;

/// Ordered record of completed strokes for one room.
///
/// The log only grows by [`EventLog::append`] or changes wholesale through
/// [`EventLog::replace`] and [`EventLog::clear`]. Individual strokes are never
/// inserted or removed in the middle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLog {
    strokes: Vec<Stroke>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed stroke.
    pub fn append(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    /// Replace the whole log, e.g. with a reconciliation response.
    pub fn replace(&mut self, strokes: Vec<Stroke>) {
        self.strokes = strokes;
    }

    /// Empty the log. Returns false if it was already empty.
    pub fn clear(&mut self) -> bool {
        if self.strokes.is_empty() {
            return false;
        }
        self.strokes.clear();
        true
    }

    /// Strokes in stored order.
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Iterate strokes in stored order.
    pub fn iter(&self) -> std::slice::Iter<'_, Stroke> {
        self.strokes.iter()
    }

    /// Number of strokes.
    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    /// Clear `surface` and draw every stroke in stored order.
    pub fn replay(&self, surface: &mut dyn RenderSurface) {
        surface.clear_canvas();
        for stroke in &self.strokes {
            surface.render_stroke(stroke);
        }
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Stroke;
    type IntoIter = std::slice::Iter<'a, Stroke>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::BrushStyle;
    use crate::surface::RecordingSurface;
    use kurbo::Point;

    fn line(x: f64) -> Stroke {
        Stroke::new(
            vec![Point::new(x, 0.0), Point::new(x, 10.0)],
            BrushStyle::draw("#000000", 2.0),
        )
        .unwrap()
    }

    #[test]
    fn test_append_keeps_order() {
        let mut log = EventLog::new();
        log.append(line(1.0));
        log.append(line(2.0));
        assert_eq!(log.len(), 2);
        assert_eq!(log.strokes()[0], line(1.0));
        assert_eq!(log.strokes()[1], line(2.0));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut log = EventLog::new();
        log.append(line(1.0));
        assert!(log.clear());
        assert!(!log.clear());
        assert!(log.is_empty());
    }

    #[test]
    fn test_replace_swaps_contents() {
        let mut log = EventLog::new();
        log.append(line(1.0));
        log.replace(vec![line(3.0), line(4.0)]);
        assert_eq!(log.strokes(), &[line(3.0), line(4.0)]);
    }

    #[test]
    fn test_replay_clears_then_draws_in_order() {
        let mut log = EventLog::new();
        log.append(line(1.0));
        log.append(line(2.0));

        let mut surface = RecordingSurface::new();
        surface.render_stroke(&line(99.0));
        log.replay(&mut surface);

        assert_eq!(surface.strokes(), &[line(1.0), line(2.0)]);
        assert_eq!(surface.clear_count(), 1);
    }
}
