//! Landmark sources - the boundary to camera capture and ML inference.
//!
//! A [`LandmarkSource`] yields one frame of hand landmarks (or no hand)
//! per tick. Real inference runs out of process; the sources shipped here
//! synthesize or replay landmark streams so the full pipeline runs in
//! demos and CI without a camera. Sources run inline in the frame loop,
//! preserving the single-threaded model.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

use super::landmarks::{HandSample, Landmark, Point, LANDMARK_COUNT};

// ── Source trait ───────────────────────────────────────────

/// What a source produced for this frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceFrame {
    /// A hand is visible.
    Sample(HandSample),
    /// The source is live but no hand is in view.
    NoHand,
    /// The source has nothing more to deliver.
    Exhausted,
}

/// Anything that can deliver landmark frames to the pipeline.
pub trait LandmarkSource {
    /// Produce the frame for the given instant (caller clock, milliseconds).
    fn next_frame(&mut self, now_ms: f64) -> SourceFrame;

    /// Stop and release the underlying resource. Idempotent; called on
    /// teardown.
    fn stop(&mut self) {}
}

// ── Synthetic poses ────────────────────────────────────────
//
// Rigid hand layouts anchored at a caller-supplied point. Used by the
// scripted source and by tests across the crate.

fn set(points: &mut [Point; LANDMARK_COUNT], lm: Landmark, x: f32, y: f32) {
    points[lm.index()] = Point::new(x, y);
}

fn curled_finger(
    points: &mut [Point; LANDMARK_COUNT],
    chain: [Landmark; 4],
    base: Point,
    dx: f32,
) {
    let [mcp, pip, dip, tip] = chain;
    set(points, mcp, base.x + dx, base.y + 70.0);
    set(points, pip, base.x + dx, base.y + 52.0);
    set(points, dip, base.x + dx, base.y + 60.0);
    set(points, tip, base.x + dx, base.y + 72.0);
}

/// Index finger extended toward `tip`, the rest curled.
pub fn pose_draw(tip: Point) -> HandSample {
    let wrist = Point::new(tip.x, tip.y + 140.0);
    let mut points = [wrist; LANDMARK_COUNT];
    set(&mut points, Landmark::IndexMcp, tip.x, tip.y + 70.0);
    set(&mut points, Landmark::IndexPip, tip.x, tip.y + 45.0);
    set(&mut points, Landmark::IndexDip, tip.x, tip.y + 20.0);
    set(&mut points, Landmark::IndexTip, tip.x, tip.y);
    curled_finger(
        &mut points,
        [
            Landmark::MiddleMcp,
            Landmark::MiddlePip,
            Landmark::MiddleDip,
            Landmark::MiddleTip,
        ],
        tip,
        16.0,
    );
    curled_finger(
        &mut points,
        [
            Landmark::RingMcp,
            Landmark::RingPip,
            Landmark::RingDip,
            Landmark::RingTip,
        ],
        tip,
        32.0,
    );
    curled_finger(
        &mut points,
        [
            Landmark::PinkyMcp,
            Landmark::PinkyPip,
            Landmark::PinkyDip,
            Landmark::PinkyTip,
        ],
        tip,
        48.0,
    );
    set(&mut points, Landmark::ThumbCmc, tip.x - 28.0, tip.y + 112.0);
    set(&mut points, Landmark::ThumbMcp, tip.x - 44.0, tip.y + 96.0);
    set(&mut points, Landmark::ThumbIp, tip.x - 56.0, tip.y + 84.0);
    set(&mut points, Landmark::ThumbTip, tip.x - 68.0, tip.y + 72.0);
    HandSample::new(points)
}

/// Thumb and index fingertips touching around `center`.
pub fn pose_pinch(center: Point) -> HandSample {
    let mut sample = pose_draw(Point::new(center.x + 9.0, center.y));
    sample.points[Landmark::ThumbTip.index()] = Point::new(center.x - 9.0, center.y);
    sample
}

/// All four non-thumb fingers extended above `center`.
pub fn pose_palm(center: Point) -> HandSample {
    let wrist = Point::new(center.x, center.y + 100.0);
    let mut points = [wrist; LANDMARK_COUNT];
    let fingers = [
        ([Landmark::IndexMcp, Landmark::IndexPip, Landmark::IndexDip, Landmark::IndexTip], -18.0),
        ([Landmark::MiddleMcp, Landmark::MiddlePip, Landmark::MiddleDip, Landmark::MiddleTip], -6.0),
        ([Landmark::RingMcp, Landmark::RingPip, Landmark::RingDip, Landmark::RingTip], 6.0),
        ([Landmark::PinkyMcp, Landmark::PinkyPip, Landmark::PinkyDip, Landmark::PinkyTip], 18.0),
    ];
    for ([mcp, pip, dip, tip], dx) in fingers {
        set(&mut points, mcp, center.x + dx, center.y + 40.0);
        set(&mut points, pip, center.x + dx, center.y + 8.0);
        set(&mut points, dip, center.x + dx, center.y - 16.0);
        set(&mut points, tip, center.x + dx, center.y - 40.0);
    }
    set(&mut points, Landmark::ThumbTip, center.x - 70.0, center.y + 30.0);
    HandSample::new(points)
}

/// All four non-thumb fingers curled in front of `center`.
pub fn pose_fist(center: Point) -> HandSample {
    let wrist = Point::new(center.x, center.y + 100.0);
    let mut points = [wrist; LANDMARK_COUNT];
    let fingers = [
        ([Landmark::IndexMcp, Landmark::IndexPip, Landmark::IndexDip, Landmark::IndexTip], -18.0),
        ([Landmark::MiddleMcp, Landmark::MiddlePip, Landmark::MiddleDip, Landmark::MiddleTip], -6.0),
        ([Landmark::RingMcp, Landmark::RingPip, Landmark::RingDip, Landmark::RingTip], 6.0),
        ([Landmark::PinkyMcp, Landmark::PinkyPip, Landmark::PinkyDip, Landmark::PinkyTip], 18.0),
    ];
    for ([mcp, pip, dip, tip], dx) in fingers {
        set(&mut points, mcp, center.x + dx, center.y + 40.0);
        set(&mut points, pip, center.x + dx, center.y + 8.0);
        set(&mut points, dip, center.x + dx, center.y + 20.0);
        set(&mut points, tip, center.x + dx, center.y + 34.0);
    }
    set(&mut points, Landmark::ThumbTip, center.x - 70.0, center.y + 40.0);
    HandSample::new(points)
}

// ── ScriptedSource ─────────────────────────────────────────

/// One segment of a scripted gesture performance.
#[derive(Debug, Clone, Copy)]
enum Step {
    /// No hand in view for N frames.
    Away(usize),
    /// Draw a full circle over N frames.
    DrawCircle {
        center: Point,
        radius: f32,
        frames: usize,
    },
    /// Hold an open palm at a point for N frames.
    HoldPalm { at: Point, frames: usize },
    /// Pinch and drag from one point to another over N frames.
    PinchDrag {
        from: Point,
        to: Point,
        frames: usize,
    },
}

impl Step {
    fn frames(&self) -> usize {
        match self {
            Step::Away(n) => *n,
            Step::DrawCircle { frames, .. }
            | Step::HoldPalm { frames, .. }
            | Step::PinchDrag { frames, .. } => *frames,
        }
    }
}

/// Synthesizes a scripted gesture performance, frame by frame. Deterministic
/// and wall-clock independent: the script advances one step per call.
pub struct ScriptedSource {
    steps: Vec<Step>,
    cursor: usize,
    frame_in_step: usize,
    stopped: bool,
}

impl ScriptedSource {
    /// The demo script: draw a circle, hold palm to inflate it, then pinch
    /// the balloon and drag it aside.
    pub fn demo() -> Self {
        let center = Point::new(480.0, 360.0);
        Self::new(vec![
            Step::Away(5),
            Step::DrawCircle {
                center,
                radius: 120.0,
                frames: 40,
            },
            Step::HoldPalm { at: center, frames: 40 },
            Step::Away(10),
            Step::PinchDrag {
                from: center,
                to: Point::new(720.0, 280.0),
                frames: 30,
            },
        ])
    }

    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            cursor: 0,
            frame_in_step: 0,
            stopped: false,
        }
    }
}

impl LandmarkSource for ScriptedSource {
    fn next_frame(&mut self, _now_ms: f64) -> SourceFrame {
        if self.stopped {
            return SourceFrame::Exhausted;
        }
        let step = loop {
            match self.steps.get(self.cursor) {
                None => return SourceFrame::Exhausted,
                Some(step) if self.frame_in_step >= step.frames() => {
                    self.cursor += 1;
                    self.frame_in_step = 0;
                }
                Some(step) => break *step,
            }
        };

        let t = self.frame_in_step;
        self.frame_in_step += 1;

        match step {
            Step::Away(_) => SourceFrame::NoHand,
            Step::DrawCircle {
                center,
                radius,
                frames,
            } => {
                // Sweep a full turn, ending back at the start point so the
                // closure test passes.
                let angle = t as f32 / (frames - 1) as f32 * std::f32::consts::TAU;
                let tip = Point::new(
                    center.x + radius * angle.cos(),
                    center.y + radius * angle.sin(),
                );
                SourceFrame::Sample(pose_draw(tip))
            }
            Step::HoldPalm { at, .. } => SourceFrame::Sample(pose_palm(at)),
            Step::PinchDrag { from, to, frames } => {
                let k = t as f32 / (frames - 1) as f32;
                let at = Point::new(from.x + (to.x - from.x) * k, from.y + (to.y - from.y) * k);
                SourceFrame::Sample(pose_pinch(at))
            }
        }
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            info!("scripted source stopped");
        }
    }
}

// ── ReplaySource ───────────────────────────────────────────

/// Replays recorded landmark frames from a file: one frame per line, 42
/// whitespace-separated pixel coordinates (x y per landmark, in source
/// order); a blank line means no hand was in view that frame.
pub struct ReplaySource {
    frames: Vec<Option<HandSample>>,
    cursor: usize,
    stopped: bool,
}

impl ReplaySource {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening landmark recording {}", path.display()))?;
        let mut frames = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("reading line {}", line_no + 1))?;
            frames.push(
                parse_frame(&line)
                    .with_context(|| format!("{}:{}", path.display(), line_no + 1))?,
            );
        }
        info!(frames = frames.len(), path = %path.display(), "loaded landmark recording");
        Ok(Self {
            frames,
            cursor: 0,
            stopped: false,
        })
    }
}

fn parse_frame(line: &str) -> Result<Option<HandSample>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let values: Vec<f32> = trimmed
        .split_whitespace()
        .map(|v| v.parse::<f32>().with_context(|| format!("bad coordinate {v:?}")))
        .collect::<Result<_>>()?;
    if values.len() != LANDMARK_COUNT * 2 {
        bail!(
            "expected {} coordinates, got {}",
            LANDMARK_COUNT * 2,
            values.len()
        );
    }
    let mut points = [Point::default(); LANDMARK_COUNT];
    for (i, pair) in values.chunks(2).enumerate() {
        points[i] = Point::new(pair[0], pair[1]);
    }
    Ok(Some(HandSample::new(points)))
}

impl LandmarkSource for ReplaySource {
    fn next_frame(&mut self, _now_ms: f64) -> SourceFrame {
        if self.stopped {
            return SourceFrame::Exhausted;
        }
        match self.frames.get(self.cursor) {
            None => SourceFrame::Exhausted,
            Some(frame) => {
                self.cursor += 1;
                match frame {
                    Some(sample) => SourceFrame::Sample(sample.clone()),
                    None => SourceFrame::NoHand,
                }
            }
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_pose_has_only_index_extended() {
        let s = pose_draw(Point::new(200.0, 200.0));
        let [index, middle, ring, pinky] =
            Landmark::finger_tip_pip_pairs().map(|(tip, pip)| s.finger_extended(tip, pip));
        assert!(index && !middle && !ring && !pinky);
    }

    #[test]
    fn palm_pose_has_all_fingers_extended() {
        let s = pose_palm(Point::new(200.0, 200.0));
        for (tip, pip) in Landmark::finger_tip_pip_pairs() {
            assert!(s.finger_extended(tip, pip));
        }
    }

    #[test]
    fn pinch_pose_centers_on_anchor() {
        let s = pose_pinch(Point::new(321.0, 123.0));
        let c = s.pinch_center();
        assert!((c.x - 321.0).abs() < 1e-3);
        assert!((c.y - 123.0).abs() < 1e-3);
    }

    #[test]
    fn scripted_circle_returns_to_start() {
        let mut src = ScriptedSource::new(vec![Step::DrawCircle {
            center: Point::new(100.0, 100.0),
            radius: 50.0,
            frames: 20,
        }]);
        let mut tips = Vec::new();
        while let SourceFrame::Sample(s) = src.next_frame(0.0) {
            tips.push(s.index_tip());
        }
        assert_eq!(tips.len(), 20);
        let gap = tips[0].distance(tips[19]);
        assert!(gap < 1.0, "circle should close, gap = {gap}");
    }

    #[test]
    fn scripted_source_exhausts_then_stays_exhausted() {
        let mut src = ScriptedSource::new(vec![Step::Away(2)]);
        assert_eq!(src.next_frame(0.0), SourceFrame::NoHand);
        assert_eq!(src.next_frame(0.0), SourceFrame::NoHand);
        assert_eq!(src.next_frame(0.0), SourceFrame::Exhausted);
        assert_eq!(src.next_frame(0.0), SourceFrame::Exhausted);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut src = ScriptedSource::demo();
        src.stop();
        src.stop();
        assert_eq!(src.next_frame(0.0), SourceFrame::Exhausted);
    }

    #[test]
    fn parse_frame_accepts_blank_as_no_hand() {
        assert_eq!(parse_frame("   ").unwrap(), None);
    }

    #[test]
    fn parse_frame_rejects_short_lines() {
        assert!(parse_frame("1 2 3").is_err());
    }

    #[test]
    fn parse_frame_reads_full_sample() {
        let line: String = (0..42).map(|i| format!("{i} ")).collect();
        let sample = parse_frame(&line).unwrap().unwrap();
        assert_eq!(sample.point(Landmark::Wrist), Point::new(0.0, 1.0));
        assert_eq!(sample.point(Landmark::PinkyTip), Point::new(40.0, 41.0));
    }
}
