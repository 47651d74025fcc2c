//! Collision Primitives
//!
//! Axis-aligned boxes, circles, swept tests, and the velocity helpers
//! (clamp, drag, bounce) shared by both simulation engines.

use serde::{Serialize, Deserialize};

use super::vec2::Vec2;

/// Shared physics constants.
pub mod constants {
    /// Downward acceleration applied to projectiles (pixels/s²).
    pub const GRAVITY: f32 = 980.0;
    /// Per-tick velocity multiplier.
    pub const AIR_RESISTANCE: f32 = 0.99;
    /// Energy kept after a bounce.
    pub const BOUNCE_DAMPING: f32 = 0.7;
    /// Hard speed cap (pixels/s).
    pub const MAX_VELOCITY: f32 = 2000.0;
}

// =============================================================================
// AABB
// =============================================================================

/// Axis-aligned bounding box, anchored at its top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl Aabb {
    /// Create a box from its top-left corner and size.
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn left(&self) -> f32 {
        self.x
    }

    #[inline]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    #[inline]
    pub fn top(&self) -> f32 {
        self.y
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Center point.
    #[inline]
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Strict overlap test (touching edges do not intersect).
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.left() < other.right()
            && self.right() > other.left()
            && self.top() < other.bottom()
            && self.bottom() > other.top()
    }

    /// Inclusive point containment.
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.left()
            && point.x <= self.right()
            && point.y >= self.top()
            && point.y <= self.bottom()
    }

    /// Closest point on (or in) the box to `point`.
    #[inline]
    pub fn closest_point(&self, point: Vec2) -> Vec2 {
        Vec2::new(
            point.x.clamp(self.left(), self.right()),
            point.y.clamp(self.top(), self.bottom()),
        )
    }

    /// Outward normal of the face nearest to `point`.
    ///
    /// For points outside the box this is the face the point lies beyond
    /// (by largest separation); for points inside it is the face with the
    /// smallest penetration. Ties prefer the horizontal faces.
    pub fn surface_normal(&self, point: Vec2) -> Vec2 {
        let center = self.center();
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        let dx = point.x - center.x;
        let dy = point.y - center.y;

        // Distance past (positive) or short of (negative) each face pair.
        let over_x = dx.abs() - half_w;
        let over_y = dy.abs() - half_h;

        if over_x > over_y {
            if dx < 0.0 { Vec2::LEFT } else { Vec2::RIGHT }
        } else if dy < 0.0 {
            Vec2::UP
        } else {
            Vec2::DOWN
        }
    }
}

// =============================================================================
// CIRCLE
// =============================================================================

/// Circle collider.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    /// Center
    pub position: Vec2,
    /// Radius
    pub radius: f32,
}

impl Circle {
    pub const fn new(position: Vec2, radius: f32) -> Self {
        Self { position, radius }
    }

    /// Strict overlap with another circle.
    #[inline]
    pub fn intersects(&self, other: &Circle) -> bool {
        circles_overlap(self.position, self.radius, other.position, other.radius)
    }

    /// Inclusive point containment.
    #[inline]
    pub fn contains(&self, point: Vec2) -> bool {
        self.position.distance_squared(point) <= self.radius * self.radius
    }

    /// Circle vs box, via the closest point on the box.
    #[inline]
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.contains(aabb.closest_point(self.position))
    }
}

/// Check if two circles overlap (touching does not count).
#[inline]
pub fn circles_overlap(pos_a: Vec2, radius_a: f32, pos_b: Vec2, radius_b: f32) -> bool {
    let combined = radius_a + radius_b;
    pos_a.distance_squared(pos_b) < combined * combined
}

// =============================================================================
// SWEPT TESTS
// =============================================================================

/// Does the segment `start..end` touch `circle`?
pub fn line_circle_intersection(start: Vec2, end: Vec2, circle: &Circle) -> bool {
    let d = end - start;
    let f = start - circle.position;

    let a = d.dot(d);
    if a == 0.0 {
        return circle.contains(start);
    }
    let b = 2.0 * f.dot(d);
    let c = f.dot(f) - circle.radius * circle.radius;

    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return false;
    }

    let root = discriminant.sqrt();
    let t1 = (-b - root) / (2.0 * a);
    let t2 = (-b + root) / (2.0 * a);

    (0.0..=1.0).contains(&t1) || (0.0..=1.0).contains(&t2) || (t1 < 0.0 && t2 > 1.0)
}

/// Result of a swept box test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepHit {
    /// Fraction of the step (0..=1) at which contact begins.
    pub time: f32,
}

/// Sweep `moving` along `velocity * dt` against `stationary`.
///
/// Uses the Minkowski sum of the two boxes and a slab ray cast from the
/// moving box's corner. Returns `None` when no contact happens this step.
pub fn sweep_aabb(moving: &Aabb, velocity: Vec2, stationary: &Aabb, dt: f32) -> Option<SweepHit> {
    let expanded = Aabb::new(
        stationary.x - moving.width,
        stationary.y - moving.height,
        stationary.width + moving.width,
        stationary.height + moving.height,
    );
    let start = Vec2::new(moving.x, moving.y);

    if expanded.contains(start) {
        return Some(SweepHit { time: 0.0 });
    }

    let mut t_min = 0.0f32;
    let mut t_max = 1.0f32;
    let step = velocity.scale(dt);

    for (origin, delta, lo, hi) in [
        (start.x, step.x, expanded.left(), expanded.right()),
        (start.y, step.y, expanded.top(), expanded.bottom()),
    ] {
        if delta == 0.0 {
            // Parallel to this slab: must already be inside it.
            if origin < lo || origin > hi {
                return None;
            }
            continue;
        }
        let t1 = (lo - origin) / delta;
        let t2 = (hi - origin) / delta;
        t_min = t_min.max(t1.min(t2));
        t_max = t_max.min(t1.max(t2));
    }

    if t_min > t_max || t_max < 0.0 || t_min > 1.0 {
        return None;
    }
    Some(SweepHit { time: t_min })
}

// =============================================================================
// VELOCITY HELPERS
// =============================================================================

/// Cap speed at `max`, preserving direction.
#[inline]
pub fn clamp_velocity(velocity: Vec2, max: f32) -> Vec2 {
    if velocity.length_squared() > max * max {
        velocity.normalize().scale(max)
    } else {
        velocity
    }
}

/// One tick of air drag.
#[inline]
pub fn apply_air_resistance(velocity: Vec2) -> Vec2 {
    velocity.scale(constants::AIR_RESISTANCE)
}

/// Reflect `velocity` about `normal` and damp it.
#[inline]
pub fn calculate_bounce(velocity: Vec2, normal: Vec2) -> Vec2 {
    let dot = velocity.dot(normal);
    (velocity - normal.scale(2.0 * dot)).scale(constants::BOUNCE_DAMPING)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_edges_and_center() {
        let b = Aabb::new(700.0, 500.0, 200.0, 200.0);
        assert_eq!(b.right(), 900.0);
        assert_eq!(b.bottom(), 700.0);
        assert_eq!(b.center(), Vec2::new(800.0, 600.0));
    }

    #[test]
    fn test_aabb_intersects_is_strict() {
        let a = Aabb::new(0.0, 0.0, 10.0, 10.0);
        let touching = Aabb::new(10.0, 0.0, 10.0, 10.0);
        let overlapping = Aabb::new(5.0, 5.0, 10.0, 10.0);
        assert!(!a.intersects(&touching));
        assert!(a.intersects(&overlapping));
    }

    #[test]
    fn test_surface_normal_picks_nearest_face() {
        let b = Aabb::new(0.0, 0.0, 100.0, 100.0);
        assert_eq!(b.surface_normal(Vec2::new(-3.0, 50.0)), Vec2::LEFT);
        assert_eq!(b.surface_normal(Vec2::new(103.0, 40.0)), Vec2::RIGHT);
        assert_eq!(b.surface_normal(Vec2::new(50.0, -2.0)), Vec2::UP);
        assert_eq!(b.surface_normal(Vec2::new(50.0, 101.0)), Vec2::DOWN);
        // Inside, closest to the left face
        assert_eq!(b.surface_normal(Vec2::new(2.0, 50.0)), Vec2::LEFT);
    }

    #[test]
    fn test_circle_overlap() {
        let a = Circle::new(Vec2::new(0.0, 0.0), 20.0);
        let b = Circle::new(Vec2::new(24.0, 0.0), 5.0);
        let c = Circle::new(Vec2::new(25.0, 0.0), 5.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c), "touching circles do not overlap");
    }

    #[test]
    fn test_circle_aabb() {
        let b = Aabb::new(0.0, 0.0, 10.0, 10.0);
        assert!(Circle::new(Vec2::new(13.0, 5.0), 5.0).intersects_aabb(&b));
        assert!(!Circle::new(Vec2::new(16.0, 5.0), 5.0).intersects_aabb(&b));
        assert!(!Circle::new(Vec2::new(14.0, 14.0), 5.0).intersects_aabb(&b));
    }

    #[test]
    fn test_line_circle() {
        let circle = Circle::new(Vec2::new(50.0, 0.0), 5.0);
        assert!(line_circle_intersection(Vec2::ZERO, Vec2::new(100.0, 0.0), &circle));
        assert!(!line_circle_intersection(Vec2::ZERO, Vec2::new(40.0, 0.0), &circle));
        assert!(!line_circle_intersection(Vec2::new(0.0, 10.0), Vec2::new(100.0, 10.0), &circle));
        // Segment entirely inside the circle
        assert!(line_circle_intersection(
            Vec2::new(49.0, 0.0),
            Vec2::new(51.0, 0.0),
            &circle
        ));
    }

    #[test]
    fn test_sweep_aabb_hits_midway() {
        let moving = Aabb::new(0.0, 0.0, 10.0, 10.0);
        let wall = Aabb::new(50.0, 0.0, 10.0, 10.0);
        let hit = sweep_aabb(&moving, Vec2::new(100.0, 0.0), &wall, 1.0).unwrap();
        assert!((hit.time - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_sweep_aabb_misses() {
        let moving = Aabb::new(0.0, 0.0, 10.0, 10.0);
        let wall = Aabb::new(50.0, 100.0, 10.0, 10.0);
        assert!(sweep_aabb(&moving, Vec2::new(100.0, 0.0), &wall, 1.0).is_none());
        // Too slow to reach this step
        let near = Aabb::new(50.0, 0.0, 10.0, 10.0);
        assert!(sweep_aabb(&moving, Vec2::new(10.0, 0.0), &near, 1.0).is_none());
    }

    #[test]
    fn test_clamp_velocity() {
        let v = clamp_velocity(Vec2::new(3000.0, 4000.0), constants::MAX_VELOCITY);
        assert!((v.length() - constants::MAX_VELOCITY).abs() < 1e-2);
        let slow = Vec2::new(3.0, 4.0);
        assert_eq!(clamp_velocity(slow, constants::MAX_VELOCITY), slow);
    }

    #[test]
    fn test_bounce_reflects_and_damps() {
        let v = calculate_bounce(Vec2::new(100.0, 0.0), Vec2::LEFT);
        assert!((v.x - -70.0).abs() < 1e-4);
        assert_eq!(v.y, 0.0);
    }
}
