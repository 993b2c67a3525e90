//! Pointer-driven rectangle selection on the full-viewport capture surface.

use crate::protocol::Region;

/// Either side shorter than this counts as a cancelled selection.
pub const MIN_SELECTION_PX: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection {
    Captured(Region),
    Cancelled,
}

/// Tracks pointer-down → pointer-move → pointer-up and normalises the drag
/// into a rectangle regardless of drag direction.
#[derive(Debug, Default, Clone)]
pub struct SelectionTracker {
    anchor: Option<(f64, f64)>,
    cursor: Option<(f64, f64)>,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_selecting(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn pointer_down(&mut self, x: f64, y: f64) {
        self.anchor = Some((x, y));
        self.cursor = Some((x, y));
    }

    /// Returns the rectangle to draw as the selection box, if dragging.
    pub fn pointer_move(&mut self, x: f64, y: f64) -> Option<Region> {
        let anchor = self.anchor?;
        self.cursor = Some((x, y));
        Some(normalise(anchor, (x, y)))
    }

    pub fn pointer_up(&mut self, x: f64, y: f64) -> Selection {
        let Some(anchor) = self.anchor.take() else {
            return Selection::Cancelled;
        };
        self.cursor = None;

        let region = normalise(anchor, (x, y));
        if region.width < MIN_SELECTION_PX || region.height < MIN_SELECTION_PX {
            log::debug!(
                "[CAPTURE] Selection {}x{} below minimum, treating as cancel",
                region.width,
                region.height
            );
            Selection::Cancelled
        } else {
            Selection::Captured(region)
        }
    }

    pub fn current(&self) -> Option<Region> {
        Some(normalise(self.anchor?, self.cursor?))
    }
}

fn normalise(start: (f64, f64), end: (f64, f64)) -> Region {
    Region {
        left: start.0.min(end.0),
        top: start.1.min(end.1),
        width: (end.0 - start.0).abs(),
        height: (end.1 - start.1).abs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drag(from: (f64, f64), to: (f64, f64)) -> Selection {
        let mut t = SelectionTracker::new();
        t.pointer_down(from.0, from.1);
        t.pointer_move((from.0 + to.0) / 2.0, (from.1 + to.1) / 2.0);
        t.pointer_up(to.0, to.1)
    }

    #[test]
    fn exact_minimum_is_captured() {
        assert_eq!(
            drag((0.0, 0.0), (10.0, 10.0)),
            Selection::Captured(Region {
                left: 0.0,
                top: 0.0,
                width: 10.0,
                height: 10.0
            })
        );
    }

    #[test]
    fn thin_selection_is_cancelled() {
        assert_eq!(drag((0.0, 0.0), (200.0, 9.0)), Selection::Cancelled);
        assert_eq!(drag((0.0, 0.0), (9.5, 200.0)), Selection::Cancelled);
    }

    #[test]
    fn reverse_drag_is_normalised() {
        match drag((120.0, 80.0), (20.0, 30.0)) {
            Selection::Captured(r) => {
                assert_eq!((r.left, r.top, r.width, r.height), (20.0, 30.0, 100.0, 50.0));
            }
            Selection::Cancelled => panic!("expected a capture"),
        }
    }

    #[test]
    fn pointer_up_without_down_cancels() {
        let mut t = SelectionTracker::new();
        assert_eq!(t.pointer_up(50.0, 50.0), Selection::Cancelled);
    }

    #[test]
    fn move_reports_live_box_only_while_dragging() {
        let mut t = SelectionTracker::new();
        assert!(t.pointer_move(5.0, 5.0).is_none());
        t.pointer_down(10.0, 10.0);
        let live = t.pointer_move(30.0, 40.0).unwrap();
        assert_eq!((live.width, live.height), (20.0, 30.0));
        assert_eq!(t.current(), Some(live));
        t.pointer_up(30.0, 40.0);
        assert!(!t.is_selecting());
        assert!(t.current().is_none());
    }
}
