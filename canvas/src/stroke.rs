//! Stroke capture - the in-progress freehand path and its closure test.
//!
//! Owns the lifecycle of the 2D stroke layer: strokes accumulate points
//! while drawing, survive a pinch as paused geometry, and convert to
//! polygons through [`StrokeCapture::close`]. Rasterization lives outside
//! this crate; what matters here is when a stroke may close and what
//! geometry it hands to the object lifecycle.

use tracing::debug;

use crate::tracking::Point;

// ── Config ─────────────────────────────────────────────────

/// Thresholds for the stroke closure test.
#[derive(Debug, Clone)]
pub struct StrokeConfig {
    /// Minimum number of points before a stroke may close.
    pub min_close_points: usize,
    /// Minimum bounding-box extent (pixels) - rejects specks.
    pub min_extent: f32,
    /// Maximum endpoint gap as a fraction of the bounding-box diagonal.
    pub close_gap_ratio: f32,
}

impl Default for StrokeConfig {
    fn default() -> Self {
        Self {
            min_close_points: 10,
            min_extent: 30.0,
            close_gap_ratio: 0.35,
        }
    }
}

// ── Geometry ───────────────────────────────────────────────

/// A closed polygon produced from a stroke. The ring is implicit: the last
/// point connects back to the first.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    /// Axis-aligned bounding box as (min, max) corners.
    pub fn bounds(&self) -> (Point, Point) {
        bounds_of(&self.points)
    }

    /// Mean of the polygon's points.
    pub fn centroid(&self) -> Point {
        let n = self.points.len().max(1) as f32;
        let (sx, sy) = self
            .points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / n, sy / n)
    }

    /// Bounding-box diagonal length.
    pub fn diagonal(&self) -> f32 {
        let (min, max) = self.bounds();
        min.distance(max)
    }
}

fn bounds_of(points: &[Point]) -> (Point, Point) {
    let mut min = Point::new(f32::MAX, f32::MAX);
    let mut max = Point::new(f32::MIN, f32::MIN);
    for p in points {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    (min, max)
}

// ── Stroke ─────────────────────────────────────────────────

/// An in-progress freehand path.
#[derive(Debug, Clone)]
pub struct Stroke {
    pub points: Vec<Point>,
    pub color: String,
    /// Set once the closure test has passed; a closed stroke accepts no
    /// more points while its inflation animation runs.
    pub closed: bool,
    /// Set while a pinch suspends drawing; geometry is retained.
    pub paused: bool,
}

/// Owns the single active stroke and the live preview cursor.
pub struct StrokeCapture {
    config: StrokeConfig,
    current: Option<Stroke>,
    live: Option<Point>,
}

impl StrokeCapture {
    pub fn new(config: StrokeConfig) -> Self {
        Self {
            config,
            current: None,
            live: None,
        }
    }

    /// Begin a new stroke, replacing any existing one.
    pub fn start(&mut self, at: Point, color: &str) {
        if self.current.is_some() {
            debug!("starting a new stroke over an unfinished one");
        }
        self.current = Some(Stroke {
            points: vec![at],
            color: color.to_string(),
            closed: false,
            paused: false,
        });
    }

    /// Append a point to the active stroke. Resumes a paused stroke;
    /// ignored while the stroke is closed or when none is active.
    pub fn add_point(&mut self, p: Point) {
        if let Some(stroke) = &mut self.current {
            if stroke.closed {
                return;
            }
            stroke.paused = false;
            stroke.points.push(p);
        }
    }

    /// Suspend drawing without discarding geometry.
    pub fn pause(&mut self) {
        if let Some(stroke) = &mut self.current {
            stroke.paused = true;
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.current.as_ref().map(|s| s.paused).unwrap_or(false)
    }

    pub fn current(&self) -> Option<&Stroke> {
        self.current.as_ref()
    }

    /// Run the closure test. On success the stroke is marked closed and its
    /// geometry is returned; on rejection the stroke is left exactly as it
    /// was - open, same point list.
    pub fn close(&mut self) -> Option<Polygon> {
        let stroke = self.current.as_mut()?;
        if stroke.closed || stroke.points.len() < self.config.min_close_points {
            return None;
        }
        let (min, max) = bounds_of(&stroke.points);
        let extent = (max.x - min.x).max(max.y - min.y);
        if extent < self.config.min_extent {
            return None;
        }
        let diagonal = min.distance(max);
        let gap = stroke.points[0].distance(*stroke.points.last()?);
        if gap > self.config.close_gap_ratio * diagonal {
            return None;
        }
        stroke.closed = true;
        debug!(points = stroke.points.len(), "stroke closed");
        Some(Polygon {
            points: stroke.points.clone(),
        })
    }

    /// Discard the active stroke.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Discard the stroke and the live cursor (local or remote clear-all).
    pub fn clear_all(&mut self) {
        self.current = None;
        self.live = None;
    }

    /// Update the live preview cursor.
    pub fn update_live(&mut self, p: Point) {
        self.live = Some(p);
    }

    /// Drop the live preview cursor.
    pub fn clear_live(&mut self) {
        self.live = None;
    }

    pub fn live(&self) -> Option<Point> {
        self.live
    }
}

// ── Tests ──────────────────────────────────────────────────
