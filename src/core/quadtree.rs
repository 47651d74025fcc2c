//! Quadtree Spatial Partition
//!
//! Recursive four-way subdivision of a bounded region. Answers "which
//! entries lie within radius r of point p" without scanning every entry.
//!
//! Leaves hold up to `capacity` entries; inserting past that splits the
//! leaf into four quadrants (top-left, top-right, bottom-left,
//! bottom-right) split at the midpoint. Points on a midline belong to the
//! right/bottom quadrant. Depth is capped so coincident points cannot
//! subdivide forever.

use super::collision::{Aabb, Circle};
use super::vec2::Vec2;

/// Default leaf capacity before subdivision.
pub const DEFAULT_CAPACITY: usize = 10;

/// Deepest level a node may split to.
pub const MAX_DEPTH: u8 = 8;

/// A bounded quadtree storing values at points.
#[derive(Debug, Clone)]
pub struct Quadtree<T> {
    root: Node<T>,
    capacity: usize,
    len: usize,
}

#[derive(Debug, Clone)]
struct Node<T> {
    bounds: Aabb,
    depth: u8,
    entries: Vec<(Vec2, T)>,
    children: Option<Box<[Node<T>; 4]>>,
}

impl<T> Quadtree<T> {
    /// Create an empty tree over `bounds`.
    pub fn new(bounds: Aabb, capacity: usize) -> Self {
        Self {
            root: Node::leaf(bounds, 0),
            capacity: capacity.max(1),
            len: 0,
        }
    }

    /// Region covered by the tree.
    pub fn bounds(&self) -> Aabb {
        self.root.bounds
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert `value` at `point`.
    ///
    /// Returns `false` (and drops nothing into the tree) when the point lies
    /// outside the root bounds.
    pub fn insert(&mut self, point: Vec2, value: T) -> bool {
        if !self.root.bounds.contains(point) {
            return false;
        }
        self.root.insert(point, value, self.capacity);
        self.len += 1;
        true
    }

    /// Remove every entry, keeping the root bounds.
    pub fn clear(&mut self) {
        self.root = Node::leaf(self.root.bounds, 0);
        self.len = 0;
    }

    /// All entries within `radius` of `center` (inclusive).
    pub fn query_radius(&self, center: Vec2, radius: f32) -> Vec<(Vec2, &T)> {
        let mut found = Vec::new();
        let circle = Circle::new(center, radius);
        self.root.query_radius(&circle, &mut found);
        found
    }

    /// All entries whose point lies inside `range` (inclusive).
    pub fn query_range(&self, range: &Aabb) -> Vec<(Vec2, &T)> {
        let mut found = Vec::new();
        self.root.query_range(range, &mut found);
        found
    }

    /// Number of nodes in the tree (for diagnostics).
    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }
}

impl<T> Node<T> {
    fn leaf(bounds: Aabb, depth: u8) -> Self {
        Self {
            bounds,
            depth,
            entries: Vec::new(),
            children: None,
        }
    }

    /// Quadrant index for a point: 0 TL, 1 TR, 2 BL, 3 BR.
    fn quadrant(&self, point: Vec2) -> usize {
        let mid = self.bounds.center();
        let right = point.x >= mid.x;
        let bottom = point.y >= mid.y;
        match (right, bottom) {
            (false, false) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (true, true) => 3,
        }
    }

    fn insert(&mut self, point: Vec2, value: T, capacity: usize) {
        let idx = self.quadrant(point);
        if let Some(children) = self.children.as_mut() {
            children[idx].insert(point, value, capacity);
            return;
        }

        self.entries.push((point, value));
        if self.entries.len() > capacity && self.depth < MAX_DEPTH {
            self.subdivide(capacity);
        }
    }

    fn subdivide(&mut self, capacity: usize) {
        let Aabb { x, y, width, height } = self.bounds;
        let hw = width / 2.0;
        let hh = height / 2.0;
        let depth = self.depth + 1;

        let mut children = Box::new([
            Node::leaf(Aabb::new(x, y, hw, hh), depth),
            Node::leaf(Aabb::new(x + hw, y, hw, hh), depth),
            Node::leaf(Aabb::new(x, y + hh, hw, hh), depth),
            Node::leaf(Aabb::new(x + hw, y + hh, hw, hh), depth),
        ]);

        for (point, value) in std::mem::take(&mut self.entries) {
            let idx = self.quadrant(point);
            children[idx].insert(point, value, capacity);
        }
        self.children = Some(children);
    }

    fn query_radius<'a>(&'a self, circle: &Circle, found: &mut Vec<(Vec2, &'a T)>) {
        if !circle.intersects_aabb(&self.bounds) {
            return;
        }

        found.extend(
            self.entries
                .iter()
                .filter(|(point, _)| circle.contains(*point))
                .map(|(point, value)| (*point, value)),
        );

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query_radius(circle, found);
            }
        }
    }

    fn query_range<'a>(&'a self, range: &Aabb, found: &mut Vec<(Vec2, &'a T)>) {
        let overlaps = range.left() <= self.bounds.right()
            && range.right() >= self.bounds.left()
            && range.top() <= self.bounds.bottom()
            && range.bottom() >= self.bounds.top();
        if !overlaps {
            return;
        }

        found.extend(
            self.entries
                .iter()
                .filter(|(point, _)| range.contains(*point))
                .map(|(point, value)| (*point, value)),
        );

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query_range(range, found);
            }
        }
    }

    fn node_count(&self) -> usize {
        1 + self
            .children
            .as_ref()
            .map(|c| c.iter().map(Node::node_count).sum())
            .unwrap_or(0)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arena() -> Aabb {
        Aabb::new(0.0, 0.0, 1920.0, 1080.0)
    }

    #[test]
    fn test_insert_and_len() {
        let mut tree = Quadtree::new(arena(), DEFAULT_CAPACITY);
        assert!(tree.is_empty());
        assert!(tree.insert(Vec2::new(10.0, 10.0), 1));
        assert!(tree.insert(Vec2::new(1920.0, 1080.0), 2), "edges are inside");
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut tree = Quadtree::new(arena(), DEFAULT_CAPACITY);
        assert!(!tree.insert(Vec2::new(-1.0, 10.0), 1));
        assert!(!tree.insert(Vec2::new(10.0, 2000.0), 2));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_subdivides_past_capacity() {
        let mut tree = Quadtree::new(arena(), 4);
        let spread = [(100.0, 100.0), (1800.0, 100.0), (100.0, 1000.0), (1800.0, 1000.0), (500.0, 300.0)];
        for (i, (x, y)) in spread.into_iter().enumerate() {
            tree.insert(Vec2::new(x, y), i);
        }
        assert_eq!(tree.node_count(), 5);
        assert_eq!(tree.query_range(&arena()).len(), 5);

        // Crowding one quadrant splits it again
        let mut tree = Quadtree::new(arena(), 4);
        let crowded = [(100.0, 100.0), (700.0, 100.0), (100.0, 400.0), (700.0, 400.0), (300.0, 300.0)];
        for (i, (x, y)) in crowded.into_iter().enumerate() {
            tree.insert(Vec2::new(x, y), i);
        }
        assert_eq!(tree.node_count(), 9);
        assert_eq!(tree.query_range(&arena()).len(), 5);
    }

    #[test]
    fn test_coincident_points_stop_at_max_depth() {
        let mut tree = Quadtree::new(arena(), 1);
        for i in 0..50 {
            tree.insert(Vec2::new(3.0, 3.0), i);
        }
        assert_eq!(tree.len(), 50);
        assert_eq!(tree.query_radius(Vec2::new(3.0, 3.0), 0.0).len(), 50);
    }

    #[test]
    fn test_query_radius_inclusive() {
        let mut tree = Quadtree::new(arena(), DEFAULT_CAPACITY);
        tree.insert(Vec2::new(100.0, 100.0), "a");
        tree.insert(Vec2::new(600.0, 100.0), "b");
        tree.insert(Vec2::new(700.0, 100.0), "c");

        let mut hits: Vec<&str> = tree
            .query_radius(Vec2::new(100.0, 100.0), 500.0)
            .into_iter()
            .map(|(_, v)| *v)
            .collect();
        hits.sort();
        assert_eq!(hits, vec!["a", "b"]);
    }

    #[test]
    fn test_clear() {
        let mut tree = Quadtree::new(arena(), 2);
        for i in 0..20 {
            tree.insert(Vec2::new(i as f32 * 50.0, 500.0), i);
        }
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 1);
    }

    proptest! {
        #[test]
        fn prop_radius_query_matches_brute_force(
            points in prop::collection::vec((0.0f32..1920.0, 0.0f32..1080.0), 0..200),
            cx in -200.0f32..2100.0,
            cy in -200.0f32..1300.0,
            radius in 0.0f32..800.0,
            capacity in 1usize..12,
        ) {
            let mut tree = Quadtree::new(arena(), capacity);
            for (i, (x, y)) in points.iter().enumerate() {
                prop_assert!(tree.insert(Vec2::new(*x, *y), i));
            }

            let center = Vec2::new(cx, cy);
            let mut from_tree: Vec<usize> = tree
                .query_radius(center, radius)
                .into_iter()
                .map(|(_, i)| *i)
                .collect();
            from_tree.sort_unstable();

            let brute: Vec<usize> = points
                .iter()
                .enumerate()
                .filter(|(_, (x, y))| {
                    Vec2::new(*x, *y).distance_squared(center) <= radius * radius
                })
                .map(|(i, _)| i)
                .collect();

            prop_assert_eq!(from_tree, brute);
        }
    }
}
