//! Hand landmark data structures and geometry queries.
//!
//! Models the 21-point hand skeleton delivered by the landmark source
//! (wrist, finger joints, fingertips). Points arrive in pixel space,
//! already mirrored to match the user's view. Provides the distance
//! queries, palm-center estimate, and hand-scale normalization the
//! gesture classifier is built on.

// ── Landmark definitions ───────────────────────────────────

/// The 21 hand landmarks, in source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Landmark {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Total number of landmarks per hand.
pub const LANDMARK_COUNT: usize = 21;

impl Landmark {
    /// Convert landmark enum to array index (0-20).
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// (tip, pip) pairs for the four non-thumb fingers, index first.
    pub fn finger_tip_pip_pairs() -> [(Landmark, Landmark); 4] {
        [
            (Self::IndexTip, Self::IndexPip),
            (Self::MiddleTip, Self::MiddlePip),
            (Self::RingTip, Self::RingPip),
            (Self::PinkyTip, Self::PinkyPip),
        ]
    }
}

// ── Points ─────────────────────────────────────────────────

/// A 2D point in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Midpoint between this point and another.
    pub fn midpoint(&self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// A 3D point in model space (optional per sample).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

// ── Hand sample ────────────────────────────────────────────

/// One frame of hand tracking: 21 pixel-space points plus optional
/// model-space points. Immutable once produced; the classifier keeps
/// whatever short-term memory it needs, nothing else retains samples.
#[derive(Debug, Clone, PartialEq)]
pub struct HandSample {
    /// Pixel-space landmark positions, indexed by [`Landmark`].
    pub points: [Point; LANDMARK_COUNT],
    /// Model-space landmark positions, when the source provides them.
    pub world: Option<[Point3; LANDMARK_COUNT]>,
}

impl HandSample {
    pub fn new(points: [Point; LANDMARK_COUNT]) -> Self {
        Self {
            points,
            world: None,
        }
    }

    /// Position of a single landmark.
    pub fn point(&self, landmark: Landmark) -> Point {
        self.points[landmark.index()]
    }

    /// Euclidean distance between two landmarks.
    pub fn distance(&self, a: Landmark, b: Landmark) -> f32 {
        self.point(a).distance(self.point(b))
    }

    /// Index fingertip - the drawing cursor.
    pub fn index_tip(&self) -> Point {
        self.point(Landmark::IndexTip)
    }

    /// Midpoint of thumb and index fingertips - the manipulation anchor
    /// while pinching.
    pub fn pinch_center(&self) -> Point {
        self.point(Landmark::ThumbTip)
            .midpoint(self.point(Landmark::IndexTip))
    }

    /// Mean of wrist and the two outer MCP knuckles. Stable under finger
    /// motion, which makes it the reference point for palm velocity.
    pub fn palm_center(&self) -> Point {
        let w = self.point(Landmark::Wrist);
        let i = self.point(Landmark::IndexMcp);
        let p = self.point(Landmark::PinkyMcp);
        Point::new((w.x + i.x + p.x) / 3.0, (w.y + i.y + p.y) / 3.0)
    }

    /// Wrist-to-index-MCP distance. Gesture thresholds scale with this so
    /// classification is invariant to hand size and camera distance.
    pub fn hand_scale(&self) -> f32 {
        self.distance(Landmark::Wrist, Landmark::IndexMcp)
    }

    /// Radial finger-extension test: the tip is farther from the wrist than
    /// its PIP joint. Orientation-independent, no angle computation needed.
    pub fn finger_extended(&self, tip: Landmark, pip: Landmark) -> bool {
        self.distance(Landmark::Wrist, tip) > self.distance(Landmark::Wrist, pip)
    }
}

// ── Tests ──────────────────────────────────────────────────
