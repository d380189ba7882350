//! Gesture classification from hand landmark samples.
//!
//! Maps one sample plus the classifier's own short-term memory to a
//! discrete gesture with start time, duration, and palm velocity.
//! Detection runs in priority order - pinch, draw, palm, fist - and the
//! first match wins, so a pinching hand is never mistaken for a pointing
//! one. All thresholds are ratios of the hand scale, keeping the result
//! invariant to hand size and distance from the camera.

use tracing::debug;

use super::landmarks::{HandSample, Landmark, Point};

// ── Gesture types ──────────────────────────────────────────

/// Recognized gesture states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    /// No hand, or no recognizable pose.
    None,
    /// Index finger alone extended.
    Draw,
    /// Thumb and index fingertips close together.
    Pinch,
    /// All four non-thumb fingers extended.
    Palm,
    /// Reserved: part of the routing contract but never produced by this
    /// classifier.
    Swipe,
    /// All four non-thumb fingers curled.
    Fist,
}

impl Gesture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Draw => "draw",
            Self::Pinch => "pinch",
            Self::Palm => "palm",
            Self::Swipe => "swipe",
            Self::Fist => "fist",
        }
    }
}

/// Classified gesture state for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureState {
    /// The active gesture.
    pub current: Gesture,
    /// The previous *distinct* gesture, not the previous frame's.
    pub previous: Gesture,
    /// When the active gesture began (caller clock, milliseconds).
    pub started_at_ms: f64,
    /// How long the active gesture has been held. Zero exactly on the
    /// frame where `current` changed.
    pub duration_ms: f64,
    /// Palm-center velocity in pixels per second.
    pub velocity: Point,
    /// Tracking confidence (0.0 when no hand is visible).
    pub confidence: f32,
    /// Raw thumb-index distance, exposed even when the winning gesture is
    /// not pinch, for pinch-intensity consumers.
    pub pinch_distance: f32,
}

// ── Config ─────────────────────────────────────────────────

/// Thresholds for gesture detection.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Pinch threshold as a fraction of the hand scale.
    pub pinch_ratio: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { pinch_ratio: 0.40 }
    }
}

// ── Classifier ─────────────────────────────────────────────

/// Stateful gesture classifier.
///
/// Deterministic given the current sample and its own bounded memory (last
/// sample, active gesture, gesture start time). Time is passed in by the
/// caller; the classifier never reads a clock.
pub struct GestureClassifier {
    pub config: ClassifierConfig,
    last_sample: Option<HandSample>,
    last_sample_ms: f64,
    current: Gesture,
    previous: Gesture,
    started_at_ms: f64,
    primed: bool,
}

impl GestureClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            last_sample: None,
            last_sample_ms: 0.0,
            current: Gesture::None,
            previous: Gesture::None,
            started_at_ms: 0.0,
            primed: false,
        }
    }

    /// Classify one frame. A `None` sample classifies as [`Gesture::None`]
    /// with zero velocity, without touching the stored last sample, so a
    /// dropped frame does not corrupt velocity continuity - but duration
    /// bookkeeping still treats it as the active gesture.
    pub fn classify(&mut self, sample: Option<&HandSample>, now_ms: f64) -> GestureState {
        let detected = sample.map(|s| self.detect(s)).unwrap_or(Gesture::None);

        if !self.primed || detected != self.current {
            if self.primed {
                self.previous = self.current;
                debug!(
                    from = self.current.as_str(),
                    to = detected.as_str(),
                    "gesture changed"
                );
            }
            self.current = detected;
            self.started_at_ms = now_ms;
            self.primed = true;
        }

        let (velocity, pinch_distance, confidence) = match sample {
            Some(s) => {
                let velocity = match &self.last_sample {
                    Some(prev) if now_ms > self.last_sample_ms => {
                        let dt = ((now_ms - self.last_sample_ms) / 1000.0) as f32;
                        let c = s.palm_center();
                        let p = prev.palm_center();
                        Point::new((c.x - p.x) / dt, (c.y - p.y) / dt)
                    }
                    _ => Point::default(),
                };
                let pinch = s.distance(Landmark::ThumbTip, Landmark::IndexTip);
                self.last_sample = Some(s.clone());
                self.last_sample_ms = now_ms;
                (velocity, pinch, 1.0)
            }
            None => (Point::default(), 0.0, 0.0),
        };

        GestureState {
            current: self.current,
            previous: self.previous,
            started_at_ms: self.started_at_ms,
            duration_ms: now_ms - self.started_at_ms,
            velocity,
            confidence,
            pinch_distance,
        }
    }

    /// Detect the gesture for a single sample, in priority order.
    fn detect(&self, sample: &HandSample) -> Gesture {
        // Pinch first: thumb-index distance under a scale-adaptive threshold.
        let pinch = sample.distance(Landmark::ThumbTip, Landmark::IndexTip);
        if pinch < self.config.pinch_ratio * sample.hand_scale() {
            return Gesture::Pinch;
        }

        let [index, middle, ring, pinky] = Landmark::finger_tip_pip_pairs()
            .map(|(tip, pip)| sample.finger_extended(tip, pip));

        if index && !middle && !ring && !pinky {
            return Gesture::Draw;
        }
        if index && middle && ring && pinky {
            return Gesture::Palm;
        }
        if !index && !middle && !ring && !pinky {
            return Gesture::Fist;
        }
        Gesture::None
    }
}

// ── Tests ──────────────────────────────────────────────────
