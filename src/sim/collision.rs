//! Bounding-volume geometry
//!
//! Everything in the city collides as an axis-aligned box, a vertical
//! cylinder, or a plain distance threshold. Which one is used is a per-pair
//! performance choice made by the caller.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Box standing on the ground, centred on `base` in XZ
    pub fn from_footprint(base: Vec3, half_x: f32, half_z: f32, height: f32) -> Self {
        Self {
            min: Vec3::new(base.x - half_x, base.y, base.z - half_z),
            max: Vec3::new(base.x + half_x, base.y + height, base.z + half_z),
        }
    }

    /// Grow the box by `amount` on every side
    pub fn expanded(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(amount),
            max: self.max + Vec3::splat(amount),
        }
    }

    /// Smallest box containing both
    pub fn union(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Overlap test (touching faces count as intersecting)
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Ground-plane distance from `p` to the box footprint (0 inside)
    pub fn planar_distance_to(&self, p: Vec3) -> f32 {
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dz = (self.min.z - p.z).max(0.0).max(p.z - self.max.z);
        (dx * dx + dz * dz).sqrt()
    }
}

/// World-space box of a `width` x `length` rectangle yawed by `heading`.
///
/// Length runs along the local +Z (forward) axis.
pub fn oriented_footprint(
    center: Vec3,
    heading: f32,
    width: f32,
    length: f32,
    height: f32,
) -> Aabb {
    let (s, c) = heading.sin_cos();
    let (s, c) = (s.abs(), c.abs());
    let half_x = c * width * 0.5 + s * length * 0.5;
    let half_z = s * width * 0.5 + c * length * 0.5;
    Aabb::from_footprint(center, half_x, half_z, height)
}

/// Vertical cylinder test for targets whose origin sits on the ground.
///
/// A hit requires the point to be inside `radius` horizontally and strictly
/// between the base and `height` above it.
pub fn cylinder_contains(base: Vec3, radius: f32, height: f32, p: Vec3) -> bool {
    let dx = p.x - base.x;
    let dz = p.z - base.z;
    let dy = p.y - base.y;
    dx * dx + dz * dz < radius * radius && dy > 0.0 && dy < height
}

/// Full 3D distance-squared threshold test
#[inline]
pub fn within_radius(a: Vec3, b: Vec3, radius: f32) -> bool {
    a.distance_squared(b) < radius * radius
}

/// Decompose `target - origin` into (forward, lateral) distances along a heading.
///
/// Forward is signed (negative means behind), lateral is unsigned.
pub fn project_on_heading(origin: Vec3, forward: Vec3, target: Vec3) -> (f32, f32) {
    let to = Vec3::new(target.x - origin.x, 0.0, target.z - origin.z);
    let fwd = Vec3::new(forward.x, 0.0, forward.z).normalize_or_zero();
    let along = to.dot(fwd);
    let lateral = (to - fwd * along).length();
    (along, lateral)
}

/// Horizontal push direction from `from` toward `to`, or `fallback` when they coincide
pub fn push_direction(from: Vec3, to: Vec3, fallback: Vec3) -> Vec3 {
    let d = Vec3::new(to.x - from.x, 0.0, to.z - from.z);
    if d.length_squared() > 1e-4 {
        d.normalize()
    } else {
        fallback.normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_aabb_intersects() {
        let a = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        let b = Aabb::new(Vec3::splat(1.0), Vec3::splat(3.0));
        let c = Aabb::new(Vec3::splat(2.5), Vec3::splat(4.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.expanded(0.5).intersects(&c));
    }

    #[test]
    fn test_oriented_footprint_swaps_axes() {
        let along_z = oriented_footprint(Vec3::ZERO, 0.0, 4.0, 8.0, 2.0);
        assert!((along_z.size().x - 4.0).abs() < 1e-4);
        assert!((along_z.size().z - 8.0).abs() < 1e-4);

        let along_x = oriented_footprint(Vec3::ZERO, FRAC_PI_2, 4.0, 8.0, 2.0);
        assert!((along_x.size().x - 8.0).abs() < 1e-4);
        assert!((along_x.size().z - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_cylinder_ignores_feet_and_sky() {
        let base = Vec3::new(10.0, 0.0, 10.0);
        assert!(cylinder_contains(base, 0.6, 2.8, Vec3::new(10.3, 1.5, 10.0)));
        assert!(!cylinder_contains(base, 0.6, 2.8, Vec3::new(10.0, 0.0, 10.0)));
        assert!(!cylinder_contains(base, 0.6, 2.8, Vec3::new(10.0, 3.0, 10.0)));
        assert!(!cylinder_contains(base, 0.6, 2.8, Vec3::new(10.7, 1.0, 10.0)));
    }

    #[test]
    fn test_project_on_heading() {
        let (along, lateral) = project_on_heading(Vec3::ZERO, Vec3::Z, Vec3::new(1.0, 0.0, 4.0));
        assert!((along - 4.0).abs() < 1e-5);
        assert!((lateral - 1.0).abs() < 1e-5);

        let (behind, _) = project_on_heading(Vec3::ZERO, Vec3::Z, Vec3::new(0.0, 0.0, -3.0));
        assert!(behind < 0.0);
    }

    #[test]
    fn test_planar_distance_to_box() {
        let b = Aabb::new(Vec3::ZERO, Vec3::new(2.0, 10.0, 2.0));
        assert_eq!(b.planar_distance_to(Vec3::new(1.0, 50.0, 1.0)), 0.0);
        assert!((b.planar_distance_to(Vec3::new(5.0, 0.0, 1.0)) - 3.0).abs() < 1e-5);
    }
}
