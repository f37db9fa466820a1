//! Street Sim - open-world city sandbox simulation core
//!
//! Core modules:
//! - `sim`: Deterministic simulation (world model, AI, player, ballistics, escalation)
//! - `persistence`: getState/setState snapshot for the host's save slot
//! - `settings`: Quality presets and gameplay tuning
//! - `error`: Error types for the few fallible operations

pub mod error;
pub mod persistence;
pub mod settings;
pub mod sim;

pub use error::{SimError, SimResult};
pub use settings::{QualityPreset, Settings, Tuning};

use glam::Vec3;

/// Game configuration constants
pub mod consts {
    use glam::Vec3;

    /// Fixed simulation timestep. Speeds are expressed per 1/60 s frame.
    pub const SIM_DT: f32 = 1.0 / 60.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 4;
    /// Frame rate that per-frame speeds are normalized against
    pub const BASELINE_FPS: f32 = 60.0;

    /// Half extent of the city ground plane
    pub const WORLD_HALF_EXTENT: f32 = 500.0;
    /// Vehicles are clamped inside this half extent
    pub const VEHICLE_BOUND: f32 = 490.0;
    /// Pedestrians past this half extent are respawned
    pub const PEDESTRIAN_BOUND: f32 = 600.0;

    /// Distance between parallel roads in the generated grid
    pub const ROAD_SPACING: f32 = 120.0;
    /// Roads run at i * ROAD_SPACING for i in -ROAD_GRID_HALF..=ROAD_GRID_HALF
    pub const ROAD_GRID_HALF: i32 = 4;
    /// Lateral offset of a lane centre from the road centre line
    pub const LANE_OFFSET: f32 = 3.0;
    /// Half width of the carriageway pedestrians treat as "road"
    pub const ROAD_HALF_WIDTH: f32 = 3.5;
    /// Lateral offset of a sidewalk from its road centre line
    pub const SIDEWALK_OFFSET: f32 = 10.0;

    /// Wanted level ceiling
    pub const MAX_WANTED_LEVEL: u8 = 5;
    /// Where arrested players serve their sentence
    pub const JAIL_POSITION: Vec3 = Vec3::new(-450.0, 0.0, -450.0);
    /// Release and default spawn point
    pub const RELEASE_POSITION: Vec3 = Vec3::ZERO;
    /// Weapon shop counter
    pub const SHOP_POSITION: Vec3 = Vec3::new(108.0, 0.0, 112.0);

    /// Starting player stats
    pub const PLAYER_START_HEALTH: i32 = 100;
    pub const PLAYER_START_MONEY: u32 = 1000;
}

/// Normalized angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f32) -> f32 {
    use std::f32::consts::PI;
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Yaw (rotation about +Y) that faces along `dir` on the ground plane.
///
/// Yaw 0 faces +Z, yaw π/2 faces +X.
#[inline]
pub fn heading_of(dir: Vec3) -> f32 {
    dir.x.atan2(dir.z)
}

/// Unit ground-plane vector for a yaw
#[inline]
pub fn forward_from_heading(yaw: f32) -> Vec3 {
    Vec3::new(yaw.sin(), 0.0, yaw.cos())
}

/// Step `current` toward `target` along the shortest arc, at most `max_step` radians
#[inline]
pub fn rotate_toward(current: f32, target: f32, max_step: f32) -> f32 {
    let delta = normalize_angle(target - current);
    normalize_angle(current + delta.clamp(-max_step, max_step))
}

/// Ground-plane (XZ) distance between two points
#[inline]
pub fn planar_distance(a: Vec3, b: Vec3) -> f32 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    (dx * dx + dz * dz).sqrt()
}

/// Ground-plane (XZ) squared distance between two points
#[inline]
pub fn planar_distance_sq(a: Vec3, b: Vec3) -> f32 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    dx * dx + dz * dz
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_normalize_angle_wraps() {
        assert!((normalize_angle(3.0 * PI) - (-PI)).abs() < 1e-5);
        assert!((normalize_angle(-FRAC_PI_2) + FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_heading_round_trip() {
        let yaw = heading_of(Vec3::X);
        assert!((yaw - FRAC_PI_2).abs() < 1e-6);
        let f = forward_from_heading(yaw);
        assert!((f - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_rotate_toward_takes_short_way() {
        // From just below +π to just above -π is a tiny step across the seam
        let next = rotate_toward(PI - 0.05, -PI + 0.05, 0.2);
        assert!(normalize_angle(next - (-PI + 0.05)).abs() < 1e-4);

        let clamped = rotate_toward(0.0, 1.0, 0.05);
        assert!((clamped - 0.05).abs() < 1e-6);
    }
}
