//! Gesture router - the per-frame state machine that turns classified
//! gestures into stroke, object, and replication actions.
//!
//! One call to [`GestureRouter::route`] per frame handles the active
//! gesture; one call to [`GestureRouter::tick`] advances the multi-frame
//! close-and-inflate transition. The router holds at most a *reference*
//! to a grabbed balloon - [`GestureRouter::invalidate`] is the single
//! release-on-invalidate site for every destructive path (swipe, undo,
//! clear-all, remote clear-all).

use tracing::{debug, info, warn};

use crate::objects::{ObjectId, ObjectStore};
use crate::stroke::{Polygon, StrokeCapture};
use crate::tracking::{Gesture, GestureState, HandSample, Point};

// ── Config ─────────────────────────────────────────────────

/// Timing and manipulation tunables.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Continuous palm hold required to trigger stroke closure.
    pub palm_hold_ms: f64,
    /// Duration of the closing-pulse animation before the balloon commits.
    pub inflate_ms: f64,
    /// Rotation applied per pixel of pinch movement.
    pub rotate_factor: f32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            palm_hold_ms: 800.0,
            inflate_ms: 600.0,
            rotate_factor: 0.02,
        }
    }
}

// ── Events ─────────────────────────────────────────────────

/// Side effects the router reports back to the application layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterEvent {
    /// A balloon was committed from a closed stroke; the polygon is the
    /// replication payload.
    BalloonCreated {
        id: ObjectId,
        polygon: Polygon,
        color: String,
    },
    /// The closure test rejected the stroke.
    StrokeRejected,
    /// Balloon construction failed after the stroke was discarded.
    CreateFailed { reason: String },
    ObjectPoked(ObjectId),
    ObjectGrabbed(ObjectId),
    ObjectReleased(ObjectId),
    ObjectRemoved(ObjectId),
}

// ── Close-and-inflate phase ────────────────────────────────

/// The multi-frame stroke-to-balloon transition, advanced once per tick so
/// it never blocks the loop and cancellation stays representable.
enum InflatePhase {
    Idle,
    Closing {
        polygon: Polygon,
        color: String,
        started_ms: f64,
    },
}

// ── Router ─────────────────────────────────────────────────

pub struct GestureRouter {
    config: RouterConfig,
    grabbed: Option<ObjectId>,
    grab_anchor: Option<Point>,
    palm_hold_started: Option<f64>,
    inflate: InflatePhase,
    last_gesture: Gesture,
}

impl GestureRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            grabbed: None,
            grab_anchor: None,
            palm_hold_started: None,
            inflate: InflatePhase::Idle,
            last_gesture: Gesture::None,
        }
    }

    /// The currently grabbed balloon, if any.
    pub fn grabbed(&self) -> Option<ObjectId> {
        self.grabbed
    }

    /// Closing-pulse progress in [0, 1] for renderers, while inflating.
    pub fn closing_progress(&self, now_ms: f64) -> Option<f32> {
        match &self.inflate {
            InflatePhase::Idle => None,
            InflatePhase::Closing { started_ms, .. } => {
                Some((((now_ms - started_ms) / self.config.inflate_ms).clamp(0.0, 1.0)) as f32)
            }
        }
    }

    /// Route one classified frame into its handler.
    pub fn route(
        &mut self,
        gesture: &GestureState,
        sample: Option<&HandSample>,
        now_ms: f64,
        stroke: &mut StrokeCapture,
        objects: &mut ObjectStore,
        color: &str,
    ) -> Vec<RouterEvent> {
        let mut events = Vec::new();

        // Change bookkeeping runs before the handler so a fresh palm frame
        // never inherits a stale hold timer.
        if gesture.current != self.last_gesture {
            if self.last_gesture == Gesture::Draw {
                stroke.clear_live();
            }
            self.palm_hold_started = None;
        }

        match gesture.current {
            Gesture::Draw => {
                if let Some(sample) = sample {
                    self.on_draw(sample, stroke, objects, color, &mut events);
                }
            }
            Gesture::Pinch => {
                if let Some(sample) = sample {
                    self.on_pinch(sample, stroke, objects, &mut events);
                }
            }
            Gesture::Palm => {
                // Palm always takes manipulation priority over a grab.
                self.release_grab(objects, &mut events);
                self.on_palm(now_ms, stroke, &mut events);
            }
            Gesture::Swipe => {
                if let Some(sample) = sample {
                    self.on_swipe(sample, objects, &mut events);
                }
            }
            Gesture::None | Gesture::Fist => {
                // Any gesture loss relinquishes a grab, not just palm.
                self.release_grab(objects, &mut events);
            }
        }

        self.last_gesture = gesture.current;
        events
    }

    fn on_draw(
        &mut self,
        sample: &HandSample,
        stroke: &mut StrokeCapture,
        objects: &mut ObjectStore,
        color: &str,
        events: &mut Vec<RouterEvent>,
    ) {
        let tip = sample.index_tip();
        // The live cursor updates whether or not a stroke is active.
        stroke.update_live(tip);

        // A fingertip over a balloon pokes it; drawing is suppressed for
        // the frame.
        if let Some(id) = objects.object_at(tip) {
            objects.poke(id);
            events.push(RouterEvent::ObjectPoked(id));
            return;
        }

        if stroke.is_active() {
            stroke.add_point(tip);
        } else {
            stroke.start(tip, color);
        }
    }

    fn on_pinch(
        &mut self,
        sample: &HandSample,
        stroke: &mut StrokeCapture,
        objects: &mut ObjectStore,
        events: &mut Vec<RouterEvent>,
    ) {
        // Pinch suspends drawing without discarding work.
        if stroke.is_active() && !stroke.is_paused() {
            stroke.pause();
        }

        let mid = sample.pinch_center();
        match self.grabbed {
            None => {
                if let Some(id) = objects.object_at(mid) {
                    objects.grab(id);
                    self.grabbed = Some(id);
                    self.grab_anchor = Some(mid);
                    events.push(RouterEvent::ObjectGrabbed(id));
                }
            }
            Some(id) => {
                if let Some(anchor) = self.grab_anchor {
                    objects.move_to(id, mid);
                    // Rotation rides along with translation.
                    objects.rotate(
                        id,
                        (mid.x - anchor.x) * self.config.rotate_factor,
                        (mid.y - anchor.y) * self.config.rotate_factor,
                    );
                }
                self.grab_anchor = Some(mid);
            }
        }
    }

    fn on_palm(&mut self, now_ms: f64, stroke: &mut StrokeCapture, events: &mut Vec<RouterEvent>) {
        let started = *self.palm_hold_started.get_or_insert(now_ms);
        if now_ms - started >= self.config.palm_hold_ms {
            // A new closure needs a fresh hold from zero.
            self.palm_hold_started = None;
            self.begin_close(now_ms, stroke, events);
        }
    }

    fn begin_close(
        &mut self,
        now_ms: f64,
        stroke: &mut StrokeCapture,
        events: &mut Vec<RouterEvent>,
    ) {
        if !stroke.is_active() || matches!(self.inflate, InflatePhase::Closing { .. }) {
            return;
        }
        let color = stroke
            .current()
            .map(|s| s.color.clone())
            .unwrap_or_default();
        match stroke.close() {
            Some(polygon) => {
                stroke.clear_live();
                info!(points = polygon.points.len(), "stroke closed, inflating");
                self.inflate = InflatePhase::Closing {
                    polygon,
                    color,
                    started_ms: now_ms,
                };
            }
            None => {
                debug!("closure test rejected the stroke");
                events.push(RouterEvent::StrokeRejected);
            }
        }
    }

    fn on_swipe(
        &mut self,
        sample: &HandSample,
        objects: &mut ObjectStore,
        events: &mut Vec<RouterEvent>,
    ) {
        if let Some(id) = objects.object_at(sample.index_tip()) {
            let removed = objects.remove(id);
            self.invalidate(&removed);
            events.push(RouterEvent::ObjectRemoved(id));
        }
    }

    fn release_grab(&mut self, objects: &mut ObjectStore, events: &mut Vec<RouterEvent>) {
        self.grab_anchor = None;
        if let Some(id) = self.grabbed.take() {
            objects.release(id);
            events.push(RouterEvent::ObjectReleased(id));
        }
    }

    /// Advance the close-and-inflate transition by one frame. At full
    /// progress the stroke leaves the 2D layer and the balloon commits;
    /// commit failure surfaces as an event and the drawing is lost - an
    /// accepted trade-off, never silently retried.
    pub fn tick(
        &mut self,
        now_ms: f64,
        stroke: &mut StrokeCapture,
        objects: &mut ObjectStore,
    ) -> Vec<RouterEvent> {
        let mut events = Vec::new();
        let phase = std::mem::replace(&mut self.inflate, InflatePhase::Idle);
        if let InflatePhase::Closing {
            polygon,
            color,
            started_ms,
        } = phase
        {
            let progress = (now_ms - started_ms) / self.config.inflate_ms;
            if progress < 1.0 {
                self.inflate = InflatePhase::Closing {
                    polygon,
                    color,
                    started_ms,
                };
            } else {
                // The stroke is discarded before the balloon exists, so a
                // failing commit cannot leave a closed-but-uncommitted stroke.
                stroke.clear();
                match objects.create_from_polygon(polygon.clone(), &color) {
                    Ok(id) => events.push(RouterEvent::BalloonCreated { id, polygon, color }),
                    Err(e) => {
                        warn!("balloon creation failed: {e:#}");
                        events.push(RouterEvent::CreateFailed {
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
        events
    }

    /// Drop the grab reference if its object was just destroyed. Called for
    /// every destructive object-store operation, local or remote.
    pub fn invalidate(&mut self, removed: &[ObjectId]) {
        if let Some(id) = self.grabbed {
            if removed.contains(&id) {
                debug!(id, "grab released by object removal");
                self.grabbed = None;
                self.grab_anchor = None;
            }
        }
    }
}

// ── Test helpers ───────────────────────────────────────────

#[cfg(test)]
fn gesture(current: Gesture) -> GestureState {
    GestureState {
        current,
        previous: Gesture::None,
        started_at_ms: 0.0,
        duration_ms: 0.0,
        velocity: Point::default(),
        confidence: 1.0,
        pinch_distance: 0.0,
    }
}

// ── Tests ──────────────────────────────────────────────────
