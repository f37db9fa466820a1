//! Pedestrian AI
//!
//! Sidewalk following, idling, road crossing and building avoidance, with
//! distance-banded update throttling. Pedestrians never dodge traffic on
//! their own: vehicles stop for them, and the collision resolver reports
//! near misses that make them step aside.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

use glam::{Quat, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::collision::Aabb;
use super::lod::{self, PedestrianBand};
use super::state::{EntityId, GameState, NearMiss};
use super::world::{Orientation, World};
use crate::consts::*;
use crate::settings::Tuning;
use crate::{forward_from_heading, heading_of, planar_distance, planar_distance_sq};

/// Pedestrian archetype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PedestrianKind {
    Civilian,
    Businessman,
    Tourist,
}

impl PedestrianKind {
    /// Walking speed range in units per 1/60 s frame
    pub fn speed_range(&self) -> (f32, f32) {
        match self {
            PedestrianKind::Civilian => (0.08, 0.11),
            PedestrianKind::Businessman => (0.10, 0.12),
            PedestrianKind::Tourist => (0.05, 0.08),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

/// Gait used by the walk cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalkStyle {
    Normal,
    Energetic,
    Slow,
    Confident,
    Nervous,
    Casual,
}

impl WalkStyle {
    const ALL: [WalkStyle; 6] = [
        WalkStyle::Normal,
        WalkStyle::Energetic,
        WalkStyle::Slow,
        WalkStyle::Confident,
        WalkStyle::Nervous,
        WalkStyle::Casual,
    ];

    /// (phase rate, leg amplitude, arm amplitude, bob amplitude)
    fn gait(&self) -> (f32, f32, f32, f32) {
        match self {
            WalkStyle::Normal => (1.0, 0.3, 0.2, 0.07),
            WalkStyle::Energetic => (1.0, 0.5, 0.4, 0.1),
            WalkStyle::Slow => (0.7, 0.2, 0.15, 0.05),
            WalkStyle::Confident => (1.0, 0.35, 0.3, 0.0),
            WalkStyle::Nervous => (1.2, 0.25, 0.2, 0.08),
            WalkStyle::Casual => (0.9, 0.3, 0.25, 0.06),
        }
    }
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PedestrianState {
    Walking,
    Idle,
    Crossing,
    Dead,
}

/// Render detail flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderDetail {
    #[default]
    Full,
    /// Distance-culled stand-in; AI is suspended
    Impostor,
}

/// Personality traits (0-1). They shape animation and idle length only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Traits {
    pub nervousness: f32,
    pub confidence: f32,
    pub energy: f32,
}

/// Walk-cycle clock
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WalkCycle {
    pub time: f32,
    pub intensity: f32,
    pub frequency: f32,
}

/// Limb rotations (radians about the local X axis) read by the renderer
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LimbPose {
    pub left_leg: f32,
    pub right_leg: f32,
    pub left_arm: f32,
    pub right_arm: f32,
    /// Vertical body offset
    pub bob: f32,
}

/// A pedestrian
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pedestrian {
    pub id: EntityId,
    pub kind: PedestrianKind,
    pub gender: Gender,
    pub style: WalkStyle,
    pub traits: Traits,
    pub pos: Vec3,
    /// Yaw about +Y
    pub heading: f32,
    /// Sidewalk being followed (none for drivers)
    pub path: Option<usize>,
    pub target: Vec3,
    /// Current speed (units per 1/60 s frame)
    pub speed: f32,
    /// Speed to return to after a crossing
    pub base_speed: f32,
    pub direction: Vec3,
    pub state: PedestrianState,
    /// Seconds spent idling
    pub idle_time: f32,
    pub max_idle_time: f32,
    pub cross_target: Option<Vec3>,
    /// When the pedestrian first failed to get around a building
    pub stuck_since_ms: Option<f64>,
    pub health: i32,
    pub detail: RenderDetail,
    /// Waiting in the impostor restore queue
    pub queued_for_restore: bool,
    /// Counter for half-rate updates in the middle LOD band
    pub lod_frame: u32,
    pub walk: WalkCycle,
    pub pose: LimbPose,
    pub died_at_ms: Option<f64>,
}

/// Collision half extent of a pedestrian's box
pub const PEDESTRIAN_HALF_WIDTH: f32 = 0.5;
/// Collision height of a pedestrian's box
pub const PEDESTRIAN_HEIGHT: f32 = 2.0;
/// Seat height of a driver inside a vehicle
pub const DRIVER_SEAT_HEIGHT: f32 = 0.5;

impl Pedestrian {
    /// Random identity at `pos`; movement fields are filled by the caller
    fn with_identity<R: Rng>(id: EntityId, pos: Vec3, rng: &mut R) -> Self {
        let kind = match rng.random_range(0..3) {
            0 => PedestrianKind::Civilian,
            1 => PedestrianKind::Businessman,
            _ => PedestrianKind::Tourist,
        };
        let gender = if rng.random_bool(0.5) {
            Gender::Male
        } else {
            Gender::Female
        };
        let (lo, hi) = kind.speed_range();
        let speed = rng.random_range(lo..hi);
        Self {
            id,
            kind,
            gender,
            style: WalkStyle::ALL[rng.random_range(0..WalkStyle::ALL.len())],
            traits: Traits {
                nervousness: rng.random(),
                confidence: rng.random(),
                energy: rng.random(),
            },
            pos,
            heading: 0.0,
            path: None,
            target: pos,
            speed,
            base_speed: speed,
            direction: Vec3::Z,
            state: PedestrianState::Walking,
            idle_time: 0.0,
            max_idle_time: rng.random_range(3.0..8.0),
            cross_target: None,
            stuck_since_ms: None,
            health: 100,
            detail: RenderDetail::Full,
            queued_for_restore: false,
            lod_frame: 0,
            walk: WalkCycle {
                time: rng.random_range(0.0..TAU),
                intensity: rng.random_range(0.5..1.0),
                frequency: rng.random_range(1.0..1.5),
            },
            pose: LimbPose::default(),
            died_at_ms: None,
        }
    }

    /// Spawn a walker somewhere along a sidewalk
    pub fn spawn<R: Rng>(id: EntityId, world: &World, path_index: usize, rng: &mut R) -> Self {
        let pos = world.random_path_position(path_index, rng);
        let mut ped = Self::with_identity(id, pos, rng);
        ped.assign_path(world, path_index, pos);
        ped
    }

    /// A seated driver; never part of the free-roaming set
    pub fn driver<R: Rng>(id: EntityId, seat: Vec3, rng: &mut R) -> Self {
        let mut ped = Self::with_identity(id, seat + Vec3::Y * DRIVER_SEAT_HEIGHT, rng);
        ped.state = PedestrianState::Idle;
        ped.speed = 0.0;
        ped
    }

    pub fn is_dead(&self) -> bool {
        self.state == PedestrianState::Dead
    }

    /// Collision box at `pos`
    pub fn bounds_at(pos: Vec3) -> Aabb {
        Aabb::from_footprint(
            pos,
            PEDESTRIAN_HALF_WIDTH,
            PEDESTRIAN_HALF_WIDTH,
            PEDESTRIAN_HEIGHT,
        )
    }

    fn assign_path(&mut self, world: &World, path_index: usize, pos: Vec3) {
        let Some(path) = world.path(path_index) else {
            return;
        };
        self.pos = pos;
        self.path = Some(path_index);
        self.direction = path.direction;
        self.target = path.end;
        self.heading = heading_of(path.direction);
        self.state = PedestrianState::Walking;
        self.idle_time = 0.0;
        self.cross_target = None;
        self.stuck_since_ms = None;
        self.speed = self.base_speed;
    }

    /// Teleport onto a random sidewalk
    pub fn respawn<R: Rng>(&mut self, world: &World, rng: &mut R) {
        if world.paths().is_empty() {
            return;
        }
        let index = rng.random_range(0..world.paths().len());
        let pos = world.random_path_position(index, rng);
        self.assign_path(world, index, pos);
    }

    /// Terminal transition; only the collision resolver calls this
    pub fn kill(&mut self, now_ms: f64) {
        if self.is_dead() {
            return;
        }
        self.state = PedestrianState::Dead;
        self.health = 0;
        self.speed = 0.0;
        self.cross_target = None;
        self.died_at_ms = Some(now_ms);
        self.pose = LimbPose::default();
        self.pos.y = 0.1;
    }

    fn go_idle<R: Rng>(&mut self, tuning: &Tuning, rng: &mut R) {
        self.state = PedestrianState::Idle;
        self.idle_time = 0.0;
        self.max_idle_time = idle_dwell(tuning, self.traits, rng);
        self.cross_target = None;
        self.speed = self.base_speed;
        self.pose = LimbPose::default();
    }

    /// Sidestep away from a vehicle and stop to recover
    fn react_to_near_miss<R: Rng>(&mut self, miss: &NearMiss, tuning: &Tuning, rng: &mut R) {
        let away = Vec3::new(self.pos.x - miss.from.x, 0.0, self.pos.z - miss.from.z);
        let push = if away.length_squared() > 1e-4 {
            away.normalize()
        } else {
            Vec3::new(rng.random::<f32>() - 0.5, 0.0, rng.random::<f32>() - 0.5).normalize_or_zero()
        };
        self.pos += push * miss.push;
        self.go_idle(tuning, rng);
    }
}

/// Idle dwell in seconds. Nervous pedestrians do not linger.
fn idle_dwell<R: Rng>(tuning: &Tuning, traits: Traits, rng: &mut R) -> f32 {
    let base = rng.random_range(tuning.ped_idle_min_secs..=tuning.ped_idle_max_secs);
    let scale = 1.0 - 0.3 * (traits.nervousness - 0.5);
    (base * scale).clamp(tuning.ped_idle_min_secs, tuning.ped_idle_max_secs)
}

fn out_of_bounds(p: Vec3) -> bool {
    p.x.abs() > PEDESTRIAN_BOUND || p.z.abs() > PEDESTRIAN_BOUND
}

/// Read-only context for one pedestrian step
struct StepContext<'a> {
    world: &'a World,
    tuning: &'a Tuning,
    now_ms: f64,
    /// Player position when on foot and free
    player: Option<Vec3>,
    animate: bool,
}

/// Advance all free-roaming pedestrians by one tick.
///
/// `camera` drives the LOD bands; without one every pedestrian updates at
/// full rate.
pub fn update_pedestrians(state: &mut GameState, dt: f32, camera: Option<Vec3>) {
    let GameState {
        pedestrians,
        world,
        settings,
        rng,
        near_misses,
        lod,
        player,
        time_ms,
        ..
    } = state;

    // Near misses flagged by the resolver last tick
    for miss in near_misses.drain(..) {
        if let Some(ped) = pedestrians
            .iter_mut()
            .find(|p| p.id == miss.pedestrian && !p.is_dead())
        {
            ped.react_to_near_miss(&miss, &settings.tuning, rng);
        }
    }

    let quality = settings.quality;
    let full_range_sq = quality.pedestrian_full_range().powi(2);
    let player_pos = player.on_foot_position();

    for ped in pedestrians.iter_mut() {
        if ped.is_dead() {
            continue;
        }

        let band = match camera {
            Some(cam) => lod::pedestrian_band(quality, cam.distance_squared(ped.pos)),
            None => PedestrianBand::Near,
        };

        let step_dt = match band {
            PedestrianBand::Culled => {
                lod::demote_to_impostor(ped);
                continue;
            }
            _ if ped.detail == RenderDetail::Impostor => {
                lod::request_restore(&mut lod.pedestrian_restores, ped);
                continue;
            }
            PedestrianBand::Middle => {
                ped.lod_frame = ped.lod_frame.wrapping_add(1);
                if ped.lod_frame % 2 != 0 {
                    continue;
                }
                dt * 2.0
            }
            PedestrianBand::Near => dt,
        };

        let ctx = StepContext {
            world,
            tuning: &settings.tuning,
            now_ms: *time_ms,
            player: player_pos,
            animate: camera.is_none_or(|cam| cam.distance_squared(ped.pos) < full_range_sq),
        };
        step_pedestrian(ped, &ctx, step_dt, rng);
    }

    lod::process_pedestrian_restores(
        &mut lod.pedestrian_restores,
        pedestrians,
        quality.pedestrian_restores_per_tick(),
        camera,
        quality,
    );
}

fn step_pedestrian<R: Rng>(ped: &mut Pedestrian, ctx: &StepContext, dt: f32, rng: &mut R) {
    match ped.state {
        PedestrianState::Walking => {
            walk(ped, ctx, dt, rng);
            if ped.state == PedestrianState::Walking {
                if rng.random::<f32>() < ctx.tuning.ped_idle_chance {
                    ped.go_idle(ctx.tuning, rng);
                } else if let Some(player) = ctx.player {
                    notice_player(ped, player, ctx.tuning, rng);
                }
            }
        }
        PedestrianState::Crossing => cross(ped, ctx, dt, rng),
        PedestrianState::Idle => idle(ped, ctx, dt),
        PedestrianState::Dead => {}
    }
}

/// Occasionally turn to look at a nearby player
fn notice_player<R: Rng>(ped: &mut Pedestrian, player: Vec3, tuning: &Tuning, rng: &mut R) {
    if planar_distance_sq(ped.pos, player) < tuning.ped_notice_radius.powi(2)
        && rng.random::<f32>() < tuning.ped_notice_chance
    {
        ped.heading = heading_of(player - ped.pos);
        ped.go_idle(tuning, rng);
    }
}

fn walk<R: Rng>(ped: &mut Pedestrian, ctx: &StepContext, dt: f32, rng: &mut R) {
    let step = ped.speed * dt * BASELINE_FPS;
    let next = ped.pos + ped.direction * step;

    if ctx
        .world
        .building_overlapping(&Pedestrian::bounds_at(next))
        .is_none()
    {
        ped.pos = next;
        ped.heading = heading_of(ped.direction);
        ped.stuck_since_ms = None;
    } else {
        avoid_obstacle(ped, ctx, step, rng);
    }

    if ctx.animate {
        animate_walk(ped, dt);
    }

    if planar_distance(ped.pos, ped.target) < ctx.tuning.ped_arrival_distance
        || out_of_bounds(ped.pos)
    {
        if rng.random::<f32>() < ctx.tuning.ped_cross_chance && attempt_crossing(ped, ctx) {
            return;
        }
        ped.respawn(ctx.world, rng);
    }
}

/// Try ±45° then ±90° around a blocking building, else wait out the stuck timer
fn avoid_obstacle<R: Rng>(ped: &mut Pedestrian, ctx: &StepContext, step: f32, rng: &mut R) {
    for offset in [FRAC_PI_4, -FRAC_PI_4, FRAC_PI_2, -FRAC_PI_2] {
        let dir = Quat::from_rotation_y(offset) * ped.direction;
        let candidate = ped.pos + dir * step;
        if ctx
            .world
            .building_overlapping(&Pedestrian::bounds_at(candidate))
            .is_none()
        {
            ped.pos = candidate;
            ped.heading = heading_of(dir);
            return;
        }
    }

    let since = *ped.stuck_since_ms.get_or_insert(ctx.now_ms);
    if ctx.now_ms - since > ctx.tuning.ped_stuck_timeout_ms {
        let angle = rng.random_range(0.0..TAU);
        ped.target = ped.pos + Vec3::new(angle.cos(), 0.0, angle.sin()) * 10.0;
        ped.direction = (ped.target - ped.pos).normalize_or_zero();
        ped.stuck_since_ms = None;
    }
}

/// Head for the far side of a perpendicular road, if one is close enough
fn attempt_crossing(ped: &mut Pedestrian, ctx: &StepContext) -> bool {
    let Some(path) = ped.path.and_then(|i| ctx.world.path(i)) else {
        return false;
    };
    let Some(road) = ctx.world.perpendicular_road_near(
        ped.pos,
        path.orientation,
        ctx.tuning.ped_cross_search_distance,
    ) else {
        return false;
    };

    let lateral = road.orientation.lateral(ped.pos);
    let sign = if lateral < road.coord { 1.0 } else { -1.0 };
    let far_side = road.coord + sign * (ROAD_HALF_WIDTH + 2.0 + 6.0);
    let mut target = ped.pos;
    match road.orientation {
        Orientation::Horizontal => target.z = far_side,
        Orientation::Vertical => target.x = far_side,
    }
    if out_of_bounds(target) {
        return false;
    }

    ped.state = PedestrianState::Crossing;
    ped.cross_target = Some(target);
    true
}

fn cross<R: Rng>(ped: &mut Pedestrian, ctx: &StepContext, dt: f32, rng: &mut R) {
    let Some(target) = ped.cross_target else {
        ped.state = PedestrianState::Walking;
        return;
    };
    let to = Vec3::new(target.x - ped.pos.x, 0.0, target.z - ped.pos.z);
    let dist = to.length();
    if dist < ctx.tuning.ped_cross_arrival {
        ped.state = PedestrianState::Walking;
        ped.cross_target = None;
        ped.speed = ped.base_speed;
        return;
    }

    let step = ped.speed * dt * BASELINE_FPS * ctx.tuning.ped_cross_speed_factor;
    let dir = to / dist;
    ped.pos += dir * step.min(dist);
    ped.heading = heading_of(dir);
    if ctx.animate {
        animate_walk(ped, dt * ctx.tuning.ped_cross_speed_factor);
    }
    if out_of_bounds(ped.pos) {
        ped.respawn(ctx.world, rng);
    }
}

fn idle(ped: &mut Pedestrian, ctx: &StepContext, dt: f32) {
    ped.idle_time += dt;
    if ctx.animate {
        animate_idle(ped, dt);
    }
    if ped.idle_time >= ped.max_idle_time {
        ped.state = PedestrianState::Walking;
        ped.idle_time = 0.0;
        ped.pose = LimbPose::default();
        // Resume along the path after a look-around
        ped.heading = heading_of(ped.direction);
    }
}

fn animate_walk(ped: &mut Pedestrian, dt: f32) {
    let (rate, leg_amp, arm_amp, bob_amp) = ped.style.gait();
    ped.walk.time += dt * 8.0 * ped.walk.frequency;
    let t = ped.walk.time * rate;

    let mut leg = t.sin() * leg_amp * ped.walk.intensity;
    if ped.traits.confidence > 0.8 {
        leg *= 1.2;
    }
    let arm_scale = match ped.gender {
        Gender::Female => 0.8,
        Gender::Male => 1.0,
    };
    let arm = (t + PI).sin() * arm_amp * ped.walk.intensity * arm_scale;
    let mut bob = (t * 2.0).sin() * bob_amp;
    if ped.traits.energy > 0.8 {
        bob += (t * 2.0).sin().abs() * 0.1;
    }

    ped.pose = LimbPose {
        left_leg: leg,
        right_leg: -leg,
        left_arm: arm,
        right_arm: -arm,
        bob,
    };
}

fn animate_idle(ped: &mut Pedestrian, dt: f32) {
    let t = ped.idle_time * 2.0;
    let mut pose = LimbPose {
        bob: (t * 0.5).sin() * 0.05,
        ..LimbPose::default()
    };
    match ped.kind {
        // Phone call
        PedestrianKind::Businessman if t.sin() > 0.8 => pose.right_arm = -PI / 3.0,
        // Checking the time
        PedestrianKind::Businessman if (t * 1.5).sin() > 0.9 => pose.left_arm = -PI / 6.0,
        PedestrianKind::Tourist => {
            ped.heading += (t * 0.7).sin() * 0.5 * dt;
            if (t * 1.2).sin() > 0.85 {
                pose.left_arm = -PI / 4.0;
                pose.right_arm = -PI / 4.0;
            }
        }
        PedestrianKind::Civilian if (t * 1.2).sin() > 0.9 => pose.right_arm = -PI / 3.0,
        _ => {}
    }
    ped.pose = pose;
}

/// Keep a seated driver glued to its vehicle
pub fn seat_driver(driver: &mut Pedestrian, vehicle_pos: Vec3, heading: f32) {
    driver.pos = vehicle_pos + Vec3::Y * DRIVER_SEAT_HEIGHT;
    driver.heading = heading;
    driver.direction = forward_from_heading(heading);
}
