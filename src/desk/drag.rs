//! Drag gesture tracking and drop-target resolution for the board.
//!
//! A press on a card starts a gesture; once the pointer has travelled at
//! least the activation distance the gesture becomes a drag. Releasing a
//! gesture that never activated is a click-through to the ticket detail.
//! Only one gesture is tracked at a time.

use brodesk_common::{TicketId, TicketStatus};

pub const DEFAULT_ACTIVATION_DISTANCE: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureOutcome {
    /// Released below the threshold: open the ticket.
    Click(TicketId),
    /// Dropped on a different column.
    Drop {
        ticket_id: TicketId,
        from: TicketStatus,
        to: TicketStatus,
    },
    /// Dropped outside any column, on the origin column, or cancelled.
    NoOp,
}

#[derive(Debug, Clone)]
struct Gesture {
    ticket_id: TicketId,
    origin: TicketStatus,
    start: Point,
    dragging: bool,
}

#[derive(Debug, Clone)]
pub struct DragTracker {
    activation_distance: f64,
    active: Option<Gesture>,
}

impl Default for DragTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVATION_DISTANCE)
    }
}

impl DragTracker {
    pub fn new(activation_distance: f64) -> Self {
        Self {
            activation_distance: activation_distance.max(0.0),
            active: None,
        }
    }

    /// Start a gesture on a card. Returns false if one is already in flight.
    pub fn press(&mut self, ticket_id: TicketId, origin: TicketStatus, at: Point) -> bool {
        if self.active.is_some() {
            return false;
        }
        self.active = Some(Gesture {
            ticket_id,
            origin,
            start: at,
            dragging: false,
        });
        true
    }

    /// Track pointer movement. Returns whether the gesture is now a drag.
    pub fn move_to(&mut self, at: Point) -> bool {
        let threshold = self.activation_distance;
        match self.active.as_mut() {
            Some(g) => {
                if !g.dragging && g.start.distance(&at) >= threshold {
                    g.dragging = true;
                }
                g.dragging
            }
            None => false,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.active.as_ref().is_some_and(|g| g.dragging)
    }

    /// The card currently being dragged, for overlay rendering.
    pub fn dragged(&self) -> Option<TicketId> {
        self.active
            .as_ref()
            .filter(|g| g.dragging)
            .map(|g| g.ticket_id)
    }

    /// Finish the gesture over `column` (a column id, `None` if outside the board).
    pub fn release(&mut self, column: Option<&str>) -> GestureOutcome {
        let Some(gesture) = self.active.take() else {
            return GestureOutcome::NoOp;
        };
        if !gesture.dragging {
            return GestureOutcome::Click(gesture.ticket_id);
        }
        match resolve_drop(gesture.origin, column) {
            Some(to) => GestureOutcome::Drop {
                ticket_id: gesture.ticket_id,
                from: gesture.origin,
                to,
            },
            None => GestureOutcome::NoOp,
        }
    }

    pub fn cancel(&mut self) {
        self.active = None;
    }
}

/// Map a drop target to a status. Column ids are the status wire names;
/// anything else, or the origin column, is not a move.
pub fn resolve_drop(origin: TicketStatus, column: Option<&str>) -> Option<TicketStatus> {
    let target: TicketStatus = column?.parse().ok()?;
    (target != origin).then_some(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_drop() {
        use TicketStatus::*;
        assert_eq!(resolve_drop(Open, Some("resolved")), Some(Resolved));
        assert_eq!(resolve_drop(Open, Some("open")), None);
        assert_eq!(resolve_drop(Open, Some("backlog")), None);
        assert_eq!(resolve_drop(Open, None), None);
    }

    #[test]
    fn test_short_travel_is_click() {
        let id = TicketId::new();
        let mut tracker = DragTracker::default();
        assert!(tracker.press(id, TicketStatus::Open, Point::new(0.0, 0.0)));
        assert!(!tracker.move_to(Point::new(3.0, 4.0)));
        assert_eq!(tracker.release(Some("closed")), GestureOutcome::Click(id));
    }

    #[test]
    fn test_drag_past_threshold_drops() {
        let id = TicketId::new();
        let mut tracker = DragTracker::default();
        tracker.press(id, TicketStatus::Open, Point::new(0.0, 0.0));
        assert!(tracker.move_to(Point::new(6.0, 8.0)));
        // Coming back under the threshold does not deactivate.
        assert!(tracker.move_to(Point::new(1.0, 1.0)));
        assert_eq!(tracker.dragged(), Some(id));
        assert_eq!(
            tracker.release(Some("in_progress")),
            GestureOutcome::Drop {
                ticket_id: id,
                from: TicketStatus::Open,
                to: TicketStatus::InProgress
            }
        );
        assert!(!tracker.is_dragging());
    }

    #[test]
    fn test_drop_on_origin_or_outside_is_noop() {
        let mut tracker = DragTracker::default();
        tracker.press(TicketId::new(), TicketStatus::NeedInfo, Point::new(0.0, 0.0));
        tracker.move_to(Point::new(50.0, 0.0));
        assert_eq!(tracker.release(Some("need_info")), GestureOutcome::NoOp);

        tracker.press(TicketId::new(), TicketStatus::NeedInfo, Point::new(0.0, 0.0));
        tracker.move_to(Point::new(50.0, 0.0));
        assert_eq!(tracker.release(None), GestureOutcome::NoOp);
    }

    #[test]
    fn test_single_gesture_at_a_time() {
        let first = TicketId::new();
        let mut tracker = DragTracker::default();
        assert!(tracker.press(first, TicketStatus::Open, Point::new(0.0, 0.0)));
        assert!(!tracker.press(TicketId::new(), TicketStatus::Open, Point::new(0.0, 0.0)));
        tracker.cancel();
        assert!(tracker.press(TicketId::new(), TicketStatus::Open, Point::new(0.0, 0.0)));
    }
}
