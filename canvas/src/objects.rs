//! Balloon object lifecycle - creation from closed strokes, manipulation,
//! undo history, and hit testing.
//!
//! The store is the single owner of every balloon; everything else holds
//! ids. Destructive operations return the removed ids so the caller can
//! funnel them through the router's release-on-invalidate path. A removed
//! balloon is simply absent from the store - there is no tombstone state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::stroke::Polygon;
use crate::tracking::Point;

/// Monotonically increasing object ID generator.
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique object ID.
fn next_object_id() -> ObjectId {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

pub type ObjectId = u64;

/// Idle bob cycle rate (radians per second) and amplitude (pixels).
const BOB_RATE: f32 = 2.0;
const BOB_AMPLITUDE: f32 = 4.0;
/// How far a poke lifts a balloon and how fast the impulse decays.
const POKE_LIFT: f32 = 10.0;
const POKE_DECAY: f32 = 2.5;
/// Smallest hit-test radius, so thin shapes stay grabbable.
const MIN_RADIUS: f32 = 12.0;

/// Manipulation state of a live balloon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Manipulation {
    Free,
    Grabbed,
}

/// A persisted balloon derived from a closed stroke.
#[derive(Debug, Clone)]
pub struct BalloonObject {
    pub id: ObjectId,
    /// Source stroke geometry; also the replication payload.
    pub polygon: Polygon,
    pub color: String,
    pub position: Point,
    pub rotation: (f32, f32),
    pub scale: f32,
    /// Hit-test radius derived from the polygon extent.
    pub radius: f32,
    pub state: Manipulation,
    bob_phase: f32,
    poke_impulse: f32,
}

impl BalloonObject {
    /// Where the balloon currently renders and hit-tests: the base position
    /// plus idle bob and poke lift. Grabbed balloons track the hand exactly.
    pub fn display_position(&self) -> Point {
        if self.state == Manipulation::Grabbed {
            return self.position;
        }
        Point::new(
            self.position.x,
            self.position.y + self.bob_phase.sin() * BOB_AMPLITUDE
                - self.poke_impulse * POKE_LIFT,
        )
    }
}

/// Owner of all balloon objects.
pub struct ObjectStore {
    objects: HashMap<ObjectId, BalloonObject>,
    /// Creation order; drives undo.
    created: Vec<ObjectId>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            created: Vec::new(),
        }
    }

    /// Build a balloon from a closed polygon. Deterministic: the same
    /// polygon always yields the same pose and radius, so peers applying a
    /// replicated stroke converge on the same object.
    pub fn create_from_polygon(&mut self, polygon: Polygon, color: &str) -> Result<ObjectId> {
        if polygon.points.len() < 3 {
            bail!("polygon needs at least 3 points, got {}", polygon.points.len());
        }
        let (min, max) = polygon.bounds();
        if max.x - min.x <= f32::EPSILON || max.y - min.y <= f32::EPSILON {
            bail!("degenerate polygon with no area");
        }

        let position = polygon.centroid();
        let radius = (polygon.diagonal() / 2.0).max(MIN_RADIUS);
        let id = next_object_id();
        self.objects.insert(
            id,
            BalloonObject {
                id,
                polygon,
                color: color.to_string(),
                position,
                rotation: (0.0, 0.0),
                scale: 1.0,
                radius,
                state: Manipulation::Free,
                // Deterministic phase offset keeps peers in step.
                bob_phase: (position.x + position.y) * 0.05 % std::f32::consts::TAU,
                poke_impulse: 0.0,
            },
        );
        self.created.push(id);
        info!(id, color, radius, "balloon created");
        Ok(id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&BalloonObject> {
        self.objects.get(&id)
    }

    /// The closest balloon whose display radius contains the point.
    pub fn object_at(&self, p: Point) -> Option<ObjectId> {
        self.objects
            .values()
            .filter_map(|o| {
                let d = o.display_position().distance(p);
                (d <= o.radius * o.scale).then_some((o.id, d))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    pub fn grab(&mut self, id: ObjectId) -> bool {
        match self.objects.get_mut(&id) {
            Some(o) => {
                o.state = Manipulation::Grabbed;
                debug!(id, "balloon grabbed");
                true
            }
            None => false,
        }
    }

    pub fn release(&mut self, id: ObjectId) {
        if let Some(o) = self.objects.get_mut(&id) {
            o.state = Manipulation::Free;
            debug!(id, "balloon released");
        }
    }

    pub fn move_to(&mut self, id: ObjectId, p: Point) {
        if let Some(o) = self.objects.get_mut(&id) {
            o.position = p;
        }
    }

    /// Incremental rotation, applied as a side effect of translation while
    /// grabbed.
    pub fn rotate(&mut self, id: ObjectId, dx: f32, dy: f32) {
        if let Some(o) = self.objects.get_mut(&id) {
            o.rotation.0 += dx;
            o.rotation.1 += dy;
        }
    }

    /// Give a balloon a brief upward impulse.
    pub fn poke(&mut self, id: ObjectId) {
        if let Some(o) = self.objects.get_mut(&id) {
            o.poke_impulse = 1.0;
            debug!(id, "balloon poked");
        }
    }

    /// Remove one balloon. Returns the removed ids for grab invalidation.
    pub fn remove(&mut self, id: ObjectId) -> Vec<ObjectId> {
        match self.objects.remove(&id) {
            Some(_) => {
                info!(id, "balloon removed");
                vec![id]
            }
            None => Vec::new(),
        }
    }

    /// Remove the most recently created balloon still alive. A no-op on an
    /// empty history.
    pub fn undo(&mut self) -> Vec<ObjectId> {
        while let Some(id) = self.created.pop() {
            if self.objects.remove(&id).is_some() {
                info!(id, "undo removed balloon");
                return vec![id];
            }
        }
        Vec::new()
    }

    /// Remove every balloon. Idempotent.
    pub fn clear_all(&mut self) -> Vec<ObjectId> {
        self.created.clear();
        let removed: Vec<ObjectId> = self.objects.drain().map(|(id, _)| id).collect();
        if !removed.is_empty() {
            info!(count = removed.len(), "cleared all balloons");
        }
        removed
    }

    /// Advance idle animation: bob phases and poke impulse decay.
    pub fn update(&mut self, dt: f32) {
        for o in self.objects.values_mut() {
            o.bob_phase = (o.bob_phase + dt * BOB_RATE) % std::f32::consts::TAU;
            o.poke_impulse = (o.poke_impulse - dt * POKE_DECAY).max(0.0);
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BalloonObject> {
        self.objects.values()
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn square(center: Point, half: f32) -> Polygon {
        Polygon {
            points: vec![
                Point::new(center.x - half, center.y - half),
                Point::new(center.x + half, center.y - half),
                Point::new(center.x + half, center.y + half),
                Point::new(center.x - half, center.y + half),
            ],
        }
    }

    #[test]
    fn create_places_balloon_at_centroid() {
        let mut store = ObjectStore::new();
        let id = store
            .create_from_polygon(square(Point::new(100.0, 100.0), 40.0), "#ffb3ba")
            .unwrap();
        let o = store.get(id).unwrap();
        assert_eq!(o.position, Point::new(100.0, 100.0));
        assert_eq!(o.state, Manipulation::Free);
        assert!(o.radius > 40.0);
    }

    #[test]
    fn create_rejects_degenerate_polygons() {
        let mut store = ObjectStore::new();
        assert!(store
            .create_from_polygon(Polygon { points: vec![Point::new(0.0, 0.0)] }, "#fff")
            .is_err());
        // Collinear points: zero height.
        let flat = Polygon {
            points: vec![
                Point::new(0.0, 5.0),
                Point::new(50.0, 5.0),
                Point::new(100.0, 5.0),
            ],
        };
        assert!(store.create_from_polygon(flat, "#fff").is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn construction_is_deterministic() {
        let mut a = ObjectStore::new();
        let mut b = ObjectStore::new();
        let poly = square(Point::new(77.0, 33.0), 25.0);
        let ia = a.create_from_polygon(poly.clone(), "#baffc9").unwrap();
        let ib = b.create_from_polygon(poly, "#baffc9").unwrap();
        let (oa, ob) = (a.get(ia).unwrap(), b.get(ib).unwrap());
        assert_eq!(oa.position, ob.position);
        assert_eq!(oa.radius, ob.radius);
        assert_eq!(oa.scale, ob.scale);
        assert_eq!(oa.rotation, ob.rotation);
    }

    #[test]
    fn hit_test_picks_closest_containing_balloon() {
        let mut store = ObjectStore::new();
        let near = store
            .create_from_polygon(square(Point::new(100.0, 100.0), 40.0), "#fff")
            .unwrap();
        let far = store
            .create_from_polygon(square(Point::new(150.0, 100.0), 40.0), "#fff")
            .unwrap();

        assert_eq!(store.object_at(Point::new(105.0, 100.0)), Some(near));
        assert_eq!(store.object_at(Point::new(148.0, 100.0)), Some(far));
        assert_eq!(store.object_at(Point::new(500.0, 500.0)), None);
    }

    #[test]
    fn grab_move_rotate_release() {
        let mut store = ObjectStore::new();
        let id = store
            .create_from_polygon(square(Point::new(100.0, 100.0), 40.0), "#fff")
            .unwrap();

        assert!(store.grab(id));
        assert_eq!(store.get(id).unwrap().state, Manipulation::Grabbed);
        // Grabbed balloons track the hand exactly, no bob offset.
        store.move_to(id, Point::new(200.0, 50.0));
        assert_eq!(store.get(id).unwrap().display_position(), Point::new(200.0, 50.0));

        store.rotate(id, 0.1, -0.2);
        assert_eq!(store.get(id).unwrap().rotation, (0.1, -0.2));

        store.release(id);
        assert_eq!(store.get(id).unwrap().state, Manipulation::Free);
        assert!(!store.grab(9999));
    }

    #[test]
    fn poke_lifts_then_decays() {
        let mut store = ObjectStore::new();
        let id = store
            .create_from_polygon(square(Point::new(100.0, 100.0), 40.0), "#fff")
            .unwrap();
        let before = store.get(id).unwrap().display_position().y;
        store.poke(id);
        let poked = store.get(id).unwrap().display_position().y;
        assert!(poked < before, "poke should lift the balloon");

        // Impulse fully decays within a second; after that only the bob
        // offset remains.
        store.update(1.0);
        let base = store.get(id).unwrap().position.y;
        let rest = store.get(id).unwrap().display_position().y;
        assert!((rest - base).abs() <= BOB_AMPLITUDE + 1e-3);
    }

    #[test]
    fn undo_removes_newest_first() {
        let mut store = ObjectStore::new();
        let first = store
            .create_from_polygon(square(Point::new(100.0, 100.0), 40.0), "#fff")
            .unwrap();
        let second = store
            .create_from_polygon(square(Point::new(300.0, 100.0), 40.0), "#fff")
            .unwrap();

        assert_eq!(store.undo(), vec![second]);
        assert_eq!(store.undo(), vec![first]);
        assert!(store.undo().is_empty());
        assert!(store.undo().is_empty());
    }

    #[test]
    fn undo_skips_already_removed_objects() {
        let mut store = ObjectStore::new();
        let first = store
            .create_from_polygon(square(Point::new(100.0, 100.0), 40.0), "#fff")
            .unwrap();
        let second = store
            .create_from_polygon(square(Point::new(300.0, 100.0), 40.0), "#fff")
            .unwrap();

        assert_eq!(store.remove(second), vec![second]);
        assert_eq!(store.undo(), vec![first]);
        assert!(store.is_empty());
    }

    #[test]
    fn clear_all_is_idempotent() {
        let mut store = ObjectStore::new();
        store
            .create_from_polygon(square(Point::new(100.0, 100.0), 40.0), "#fff")
            .unwrap();
        store
            .create_from_polygon(square(Point::new(300.0, 100.0), 40.0), "#fff")
            .unwrap();

        assert_eq!(store.clear_all().len(), 2);
        assert!(store.is_empty());
        assert!(store.clear_all().is_empty());
        assert!(store.is_empty());
        // History is gone too.
        assert!(store.undo().is_empty());
    }
}
