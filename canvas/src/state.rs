//! Application state - the central struct owning the whole pipeline.
//!
//! A single `CanvasState` owns the classifier, router, stroke capture,
//! object store, and session, and `frame` advances them in a fixed order:
//! remote application, classification, routing, object update. Remote
//! events re-enter through the same lifecycle entry points as local
//! actions and never pass through the classifier.

use tracing::{debug, info, warn};

use crate::net::{ReplicatedEvent, Session, SessionEvent};
use crate::objects::ObjectStore;
use crate::router::{GestureRouter, RouterConfig, RouterEvent};
use crate::stroke::{Polygon, StrokeCapture, StrokeConfig};
use crate::tracking::classifier::ClassifierConfig;
use crate::tracking::{Gesture, GestureClassifier, HandSample};

/// The pastel drawing palette. New strokes and balloons take the active
/// color.
pub const PALETTE: [&str; 6] = [
    "#ffb3ba", "#ffdfba", "#ffffba", "#baffc9", "#bae1ff", "#e3baff",
];

// ── Status line ────────────────────────────────────────────

/// Transient or persistent user-facing status message.
struct StatusLine {
    message: Option<String>,
    expires_at_ms: Option<f64>,
}

impl StatusLine {
    fn new() -> Self {
        Self {
            message: None,
            expires_at_ms: None,
        }
    }

    /// Show a message; `ttl_ms: None` makes it persistent.
    fn show(&mut self, message: &str, ttl_ms: Option<f64>, now_ms: f64) {
        self.message = Some(message.to_string());
        self.expires_at_ms = ttl_ms.map(|ttl| now_ms + ttl);
    }

    fn clear(&mut self) {
        self.message = None;
        self.expires_at_ms = None;
    }

    fn current(&self, now_ms: f64) -> Option<&str> {
        match (self.message.as_deref(), self.expires_at_ms) {
            (Some(_), Some(expiry)) if now_ms >= expiry => None,
            (msg, _) => msg,
        }
    }
}

// ── Canvas state ───────────────────────────────────────────

/// Central application state.
pub struct CanvasState {
    pub running: bool,
    pub classifier: GestureClassifier,
    pub router: GestureRouter,
    pub stroke: StrokeCapture,
    pub objects: ObjectStore,
    pub session: Session,
    current_color: String,
    hand_visible: bool,
    status: StatusLine,
    last_frame_ms: f64,
    /// The gesture the last frame resolved to, for render and logs.
    pub last_gesture: Gesture,
}

impl CanvasState {
    pub fn new(session: Session, color: &str) -> Self {
        Self {
            running: true,
            classifier: GestureClassifier::new(ClassifierConfig::default()),
            router: GestureRouter::new(RouterConfig::default()),
            stroke: StrokeCapture::new(StrokeConfig::default()),
            objects: ObjectStore::new(),
            session,
            current_color: color.to_string(),
            hand_visible: false,
            status: StatusLine::new(),
            last_frame_ms: 0.0,
            last_gesture: Gesture::None,
        }
    }

    pub fn current_color(&self) -> &str {
        &self.current_color
    }

    /// Switch the active drawing color.
    pub fn set_color(&mut self, color: &str) {
        info!(color, "color selected");
        self.current_color = color.to_string();
    }

    /// Advance the whole pipeline by one frame. Within the frame the order
    /// is fixed: session poll, classification, routing, object update.
    pub fn frame(&mut self, sample: Option<&HandSample>, now_ms: f64) {
        for event in self.session.poll() {
            self.apply_session_event(event, now_ms);
        }

        let visible = sample.is_some();
        if visible != self.hand_visible {
            if visible {
                self.status.clear();
            } else {
                self.status.show("Show your hand to begin", None, now_ms);
            }
            self.hand_visible = visible;
        }

        let gesture = self.classifier.classify(sample, now_ms);
        let mut events = self.router.route(
            &gesture,
            sample,
            now_ms,
            &mut self.stroke,
            &mut self.objects,
            &self.current_color,
        );
        events.extend(self.router.tick(now_ms, &mut self.stroke, &mut self.objects));
        for event in events {
            self.handle_router_event(event, now_ms);
        }

        let dt = if self.last_frame_ms > 0.0 {
            ((now_ms - self.last_frame_ms) / 1000.0).clamp(0.0, 0.1) as f32
        } else {
            0.0
        };
        self.objects.update(dt);
        self.last_frame_ms = now_ms;
        self.last_gesture = gesture.current;
    }

    fn handle_router_event(&mut self, event: RouterEvent, now_ms: f64) {
        match event {
            RouterEvent::BalloonCreated { id, polygon, color } => {
                debug!(id, "balloon committed");
                // Fire-and-forget: a no-op unless a peer is connected.
                self.session.broadcast(&ReplicatedEvent::BalloonCreated {
                    color,
                    points: polygon.points,
                });
            }
            RouterEvent::StrokeRejected => {
                self.status.show("Draw a larger shape", Some(1500.0), now_ms);
            }
            RouterEvent::CreateFailed { .. } => {
                self.status.show("Failed to create shape", Some(2000.0), now_ms);
            }
            RouterEvent::ObjectPoked(_)
            | RouterEvent::ObjectGrabbed(_)
            | RouterEvent::ObjectReleased(_)
            | RouterEvent::ObjectRemoved(_) => {}
        }
    }

    fn apply_session_event(&mut self, event: SessionEvent, now_ms: f64) {
        match event {
            SessionEvent::Remote(ReplicatedEvent::BalloonCreated { color, points }) => {
                match self
                    .objects
                    .create_from_polygon(Polygon { points }, &color)
                {
                    Ok(id) => debug!(id, "replicated balloon applied"),
                    Err(e) => warn!("ignoring degenerate replicated balloon: {e:#}"),
                }
            }
            SessionEvent::Remote(ReplicatedEvent::ClearAll) => {
                // Safe to apply even when the local set is already empty.
                let removed = self.objects.clear_all();
                self.router.invalidate(&removed);
                self.stroke.clear_all();
                debug!(count = removed.len(), "remote clear-all applied");
            }
            SessionEvent::PeerJoined => {
                self.status.show("Friend joined!", Some(2000.0), now_ms);
            }
            SessionEvent::PeerLeft => {
                self.status.show("Friend left", Some(2000.0), now_ms);
            }
            SessionEvent::JoinRejected { reason } => {
                self.status
                    .show(&format!("Failed to connect: {reason}"), Some(3000.0), now_ms);
            }
        }
    }

    /// Remove the most recent balloon (toolbar path).
    pub fn undo(&mut self, now_ms: f64) {
        let removed = self.objects.undo();
        self.router.invalidate(&removed);
        if !removed.is_empty() {
            self.status.show("Undo", Some(1000.0), now_ms);
        }
    }

    /// Clear every balloon and the stroke layer, and tell the peer
    /// (toolbar path).
    pub fn clear_all(&mut self) {
        let removed = self.objects.clear_all();
        self.router.invalidate(&removed);
        self.stroke.clear_all();
        self.session.broadcast(&ReplicatedEvent::ClearAll);
    }

    pub fn show_status(&mut self, message: &str, ttl_ms: Option<f64>, now_ms: f64) {
        self.status.show(message, ttl_ms, now_ms);
    }

    pub fn status(&self, now_ms: f64) -> Option<&str> {
        self.status.current(now_ms)
    }

    pub fn hand_visible(&self) -> bool {
        self.hand_visible
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::session::ConnectionStatus;
    use crate::tracking::source::{pose_draw, pose_fist, pose_palm, pose_pinch};
    use crate::tracking::Point;
    use std::thread::sleep;
    use std::time::Duration;

    fn offline_state() -> CanvasState {
        // Ephemeral listener, no peer: broadcasts are silent no-ops.
        let session = Session::host(0, false).unwrap();
        CanvasState::new(session, PALETTE[0])
    }

    /// Drive a full circle of draw frames; returns the clock after the
    /// last frame.
    fn draw_circle(state: &mut CanvasState, center: Point, radius: f32, mut now: f64) -> f64 {
        for i in 0..10 {
            let angle = i as f32 / 10.0 * std::f32::consts::TAU;
            let tip = Point::new(
                center.x + radius * angle.cos(),
                center.y + radius * angle.sin(),
            );
            state.frame(Some(&pose_draw(tip)), now);
            now += 33.0;
        }
        now
    }

    /// Hold palm until closure triggers, then run the clock past the
    /// inflate animation.
    fn close_and_inflate(state: &mut CanvasState, at: Point, mut now: f64) -> f64 {
        let palm = pose_palm(at);
        state.frame(Some(&palm), now);
        now += 801.0;
        state.frame(Some(&palm), now);
        now += 601.0;
        state.frame(Some(&palm), now);
        now
    }

    #[test]
    fn ten_draw_frames_in_a_loop_become_one_balloon() {
        let mut state = offline_state();
        let center = Point::new(100.0, 100.0);
        let now = draw_circle(&mut state, center, 50.0, 1000.0);
        assert_eq!(state.stroke.current().unwrap().points.len(), 10);

        close_and_inflate(&mut state, center, now);
        assert_eq!(state.objects.len(), 1);
        assert!(!state.stroke.is_active());
        // Not connected: nothing was (or could be) broadcast.
        assert_eq!(state.session.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn balloon_replicates_to_connected_peer_exactly_once() {
        let mut state = offline_state();
        let port = state.session.local_port().unwrap();
        let code = state.session.room_code().to_string();
        let mut peer = Session::join(&format!("127.0.0.1:{port}"), &code, false).unwrap();

        // Complete the handshake from both ends.
        let mut now = 1000.0;
        for _ in 0..10 {
            state.frame(None, now);
            peer.poll();
            now += 33.0;
            sleep(Duration::from_millis(2));
        }
        assert!(state.session.is_connected());
        assert!(peer.is_connected());

        let center = Point::new(100.0, 100.0);
        let now = draw_circle(&mut state, center, 50.0, now);
        close_and_inflate(&mut state, center, now);
        assert_eq!(state.objects.len(), 1);

        let mut remote = Vec::new();
        for _ in 0..10 {
            remote.extend(peer.poll());
            sleep(Duration::from_millis(2));
        }
        let balloons: Vec<_> = remote
            .iter()
            .filter(|e| matches!(e, SessionEvent::Remote(ReplicatedEvent::BalloonCreated { .. })))
            .collect();
        assert_eq!(balloons.len(), 1, "expected exactly one replication event");
    }

    #[test]
    fn remote_balloon_and_local_balloon_are_structurally_identical() {
        let mut host = offline_state();
        let port = host.session.local_port().unwrap();
        let code = host.session.room_code().to_string();
        let guest_session = Session::join(&format!("127.0.0.1:{port}"), &code, false).unwrap();
        let mut guest = CanvasState::new(guest_session, PALETTE[1]);

        let mut now = 1000.0;
        for _ in 0..10 {
            host.frame(None, now);
            guest.frame(None, now);
            now += 33.0;
            sleep(Duration::from_millis(2));
        }
        assert!(host.session.is_connected() && guest.session.is_connected());

        let center = Point::new(100.0, 100.0);
        let after = draw_circle(&mut host, center, 50.0, now);
        let mut now = close_and_inflate(&mut host, center, after);

        for _ in 0..10 {
            host.frame(None, now);
            guest.frame(None, now);
            now += 33.0;
            sleep(Duration::from_millis(2));
        }

        assert_eq!(host.objects.len(), 1);
        assert_eq!(guest.objects.len(), 1);
        let local = host.objects.iter().next().unwrap();
        let remote = guest.objects.iter().next().unwrap();
        assert_eq!(local.position, remote.position);
        assert_eq!(local.radius, remote.radius);
        assert_eq!(local.color, remote.color);
        assert_eq!(local.polygon, remote.polygon);
    }

    #[test]
    fn interrupted_palm_hold_does_not_close() {
        let mut state = offline_state();
        let center = Point::new(100.0, 100.0);
        let now = draw_circle(&mut state, center, 50.0, 1000.0);

        let palm = pose_palm(center);
        let fist = pose_fist(center);
        // T1 = 500ms palm, fist gap, T2 = 500ms palm: never closes.
        state.frame(Some(&palm), now);
        state.frame(Some(&palm), now + 500.0);
        state.frame(Some(&fist), now + 533.0);
        state.frame(Some(&palm), now + 566.0);
        state.frame(Some(&palm), now + 1066.0);

        assert_eq!(state.objects.len(), 0);
        assert!(state.stroke.is_active());
    }

    #[test]
    fn rejected_closure_shows_transient_status() {
        let mut state = offline_state();
        // A two-point scribble cannot close.
        state.frame(Some(&pose_draw(Point::new(100.0, 100.0))), 1000.0);
        state.frame(Some(&pose_draw(Point::new(150.0, 100.0))), 1033.0);

        let palm = pose_palm(Point::new(100.0, 100.0));
        state.frame(Some(&palm), 1066.0);
        state.frame(Some(&palm), 1900.0);

        assert_eq!(state.status(1900.0), Some("Draw a larger shape"));
        assert!(state.stroke.is_active());
        // The message expires on its own.
        assert_eq!(state.status(1900.0 + 1501.0), None);
    }

    #[test]
    fn undo_releases_grab_on_the_undone_balloon() {
        let mut state = offline_state();
        let center = Point::new(100.0, 100.0);
        let now = draw_circle(&mut state, center, 50.0, 1000.0);
        let now = close_and_inflate(&mut state, center, now);
        assert_eq!(state.objects.len(), 1);

        state.frame(Some(&pose_pinch(center)), now);
        assert!(state.router.grabbed().is_some());

        state.undo(now + 33.0);
        assert_eq!(state.router.grabbed(), None);
        assert!(state.objects.is_empty());
        assert_eq!(state.status(now + 40.0), Some("Undo"));
    }

    #[test]
    fn clear_all_is_idempotent_and_releases_grab() {
        let mut state = offline_state();
        let center = Point::new(100.0, 100.0);
        let now = draw_circle(&mut state, center, 50.0, 1000.0);
        let now = close_and_inflate(&mut state, center, now);

        state.frame(Some(&pose_pinch(center)), now);
        assert!(state.router.grabbed().is_some());

        state.clear_all();
        assert!(state.objects.is_empty());
        assert_eq!(state.router.grabbed(), None);
        state.clear_all();
        assert!(state.objects.is_empty());
    }

    #[test]
    fn remote_clear_all_applies_idempotently() {
        let mut host = offline_state();
        let port = host.session.local_port().unwrap();
        let code = host.session.room_code().to_string();
        let guest_session = Session::join(&format!("127.0.0.1:{port}"), &code, false).unwrap();
        let mut guest = CanvasState::new(guest_session, PALETTE[2]);

        let mut now = 1000.0;
        for _ in 0..10 {
            host.frame(None, now);
            guest.frame(None, now);
            now += 33.0;
            sleep(Duration::from_millis(2));
        }

        let center = Point::new(100.0, 100.0);
        let after = draw_circle(&mut host, center, 50.0, now);
        let mut now = close_and_inflate(&mut host, center, after);
        assert_eq!(host.objects.len(), 1);

        // Let the balloon replicate before clearing.
        for _ in 0..10 {
            host.frame(None, now);
            guest.frame(None, now);
            now += 33.0;
            sleep(Duration::from_millis(2));
        }
        assert_eq!(guest.objects.len(), 1);

        // Guest clears twice in a row; the host applies both without change
        // beyond the first.
        guest.clear_all();
        guest.clear_all();
        for _ in 0..10 {
            host.frame(None, now);
            guest.frame(None, now);
            now += 33.0;
            sleep(Duration::from_millis(2));
        }
        assert!(host.objects.is_empty());
        assert!(guest.objects.is_empty());
    }

    #[test]
    fn hand_presence_drives_status_message() {
        let mut state = offline_state();
        state.frame(Some(&pose_palm(Point::new(100.0, 100.0))), 1000.0);
        assert_eq!(state.status(1000.0), None);
        assert!(state.hand_visible());

        state.frame(None, 1033.0);
        assert_eq!(state.status(1033.0), Some("Show your hand to begin"));
        // Persistent until the hand comes back.
        assert_eq!(state.status(60_000.0), Some("Show your hand to begin"));

        state.frame(Some(&pose_palm(Point::new(100.0, 100.0))), 60_033.0);
        assert_eq!(state.status(60_033.0), None);
    }

    #[test]
    fn set_color_applies_to_new_strokes() {
        let mut state = offline_state();
        state.set_color(PALETTE[3]);
        state.frame(Some(&pose_draw(Point::new(100.0, 100.0))), 1000.0);
        assert_eq!(state.stroke.current().unwrap().color, PALETTE[3]);
        assert_eq!(state.current_color(), PALETTE[3]);
    }
}
