//! Vehicle AI
//!
//! Civilian traffic follows lanes of the road network, stopping for anything
//! directly ahead. Police and tanks ignore the network and chase the player.

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::collision::{Aabb, oriented_footprint, project_on_heading};
use super::pedestrian::{Pedestrian, seat_driver};
use super::projectile::Projectile;
use super::state::{EffectKind, EntityId, GameEvent, GameState};
use super::world::World;
use crate::consts::*;
use crate::settings::Tuning;
use crate::{forward_from_heading, heading_of, normalize_angle, planar_distance, rotate_toward};

/// Vehicle archetype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleKind {
    Sedan,
    Suv,
    Truck,
    Police,
    Tank,
}

impl VehicleKind {
    const CIVILIAN: [VehicleKind; 3] = [VehicleKind::Sedan, VehicleKind::Suv, VehicleKind::Truck];

    /// Body width
    pub fn width(&self) -> f32 {
        match self {
            VehicleKind::Sedan | VehicleKind::Police => 4.0,
            VehicleKind::Suv => 5.0,
            VehicleKind::Truck => 6.0,
            VehicleKind::Tank => 6.0,
        }
    }

    /// Body length along the heading
    pub fn length(&self) -> f32 {
        match self {
            VehicleKind::Sedan | VehicleKind::Police => 8.0,
            VehicleKind::Suv => 10.0,
            VehicleKind::Truck => 12.0,
            VehicleKind::Tank => 10.0,
        }
    }

    pub fn height(&self) -> f32 {
        match self {
            VehicleKind::Sedan | VehicleKind::Police => 2.0,
            VehicleKind::Suv => 2.5,
            VehicleKind::Truck => 3.0,
            VehicleKind::Tank => 3.0,
        }
    }

    /// Radius used by the pedestrian proximity checks
    pub fn proximity_size(&self) -> f32 {
        match self {
            VehicleKind::Sedan | VehicleKind::Police => 2.2,
            VehicleKind::Suv => 2.8,
            VehicleKind::Truck => 3.2,
            VehicleKind::Tank => 3.5,
        }
    }

    pub fn max_health(&self) -> i32 {
        match self {
            VehicleKind::Tank => 1000,
            _ => 100,
        }
    }

    pub fn is_tank(&self) -> bool {
        matches!(self, VehicleKind::Tank)
    }
}

/// Why a vehicle is standing still
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopCause {
    Pedestrian(EntityId),
    /// The player on foot
    Player,
    /// Another vehicle
    Obstacle(EntityId),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopState {
    pub cause: StopCause,
    pub since_ms: f64,
    /// Speed to restore once the way is clear
    pub resume_speed: f32,
}

/// Rotating gun turret carried by tanks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Turret {
    /// Yaw relative to the hull
    pub yaw: f32,
    /// Commanded yaw relative to the hull (player-driven tanks)
    pub aim: f32,
    pub last_shot_ms: Option<f64>,
}

impl Turret {
    /// Turret world yaw for a hull heading
    pub fn world_yaw(&self, hull_heading: f32) -> f32 {
        normalize_angle(hull_heading + self.yaw)
    }

    pub fn ready(&self, now_ms: f64, cooldown_ms: f64) -> bool {
        self.last_shot_ms.is_none_or(|t| now_ms - t >= cooldown_ms)
    }
}

/// A vehicle of any kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: EntityId,
    pub kind: VehicleKind,
    pub pos: Vec3,
    /// Yaw about +Y
    pub heading: f32,
    /// Signed speed along the heading (units per 1/60 s frame)
    pub speed: f32,
    /// Preferred traffic speed
    pub cruise_speed: f32,
    /// Travel direction of the current lane
    pub direction: Vec3,
    /// Road segment being followed
    pub segment: Option<usize>,
    pub target: Vec3,
    /// Pause at an intersection before pulling away
    pub wait_until_ms: Option<f64>,
    pub(crate) player_driven: bool,
    pub broken: bool,
    pub broken_at_ms: Option<f64>,
    /// Left by the player; traffic AI no longer drives it
    pub abandoned: bool,
    pub stop: Option<StopState>,
    pub health: i32,
    /// AI driver, removed for good when the player takes the vehicle
    pub driver: Option<Pedestrian>,
    pub turret: Option<Turret>,
    /// Part of the police/military response
    pub pursuit: bool,
    /// Tank crew killed; the hull is free to capture
    pub driver_dead: bool,
    /// Position before this tick's move (used to undo building hits)
    pub last_pos: Vec3,
    /// Cosmetic roll of a wreck
    pub tilt: f32,
    /// Next wreck smoke puff
    pub next_smoke_ms: f64,
}

/// Fallback speed when a timed-out stop has nothing to resume to
const UNSTICK_SPEED: f32 = 0.2;
/// Distance from the hull centre to the muzzle
const MUZZLE_OFFSET: f32 = 4.0;
/// Muzzle height of an AI tank
const MUZZLE_HEIGHT: f32 = 3.0;
/// AI shell speed (per frame)
const AI_SHELL_SPEED: f32 = 2.0;
const POLICE_SPAWN_RANGE: (f32, f32) = (10.0, 20.0);
const TANK_SPAWN_RANGE: (f32, f32) = (30.0, 50.0);
const TANK_SPEED: f32 = 0.12;

impl Vehicle {
    /// A parked vehicle with no driver
    pub fn new(id: EntityId, kind: VehicleKind, pos: Vec3, heading: f32) -> Self {
        let direction = forward_from_heading(heading);
        Self {
            id,
            kind,
            pos,
            heading,
            speed: 0.0,
            cruise_speed: 0.0,
            direction,
            segment: None,
            target: pos,
            wait_until_ms: None,
            player_driven: false,
            broken: false,
            broken_at_ms: None,
            abandoned: false,
            stop: None,
            health: kind.max_health(),
            driver: None,
            turret: kind.is_tank().then_some(Turret {
                yaw: 0.0,
                aim: 0.0,
                last_shot_ms: None,
            }),
            pursuit: false,
            driver_dead: false,
            last_pos: pos,
            tilt: 0.0,
            next_smoke_ms: 0.0,
        }
    }

    /// Civilian car on a random lane with a driver aboard
    pub fn spawn_traffic<R: Rng>(
        id: EntityId,
        driver_id: EntityId,
        world: &World,
        rng: &mut R,
    ) -> Option<Self> {
        if world.segments().is_empty() {
            return None;
        }
        let kind = VehicleKind::CIVILIAN[rng.random_range(0..VehicleKind::CIVILIAN.len())];
        let mut vehicle = Self::new(id, kind, Vec3::ZERO, 0.0);
        vehicle.cruise_speed = rng.random_range(0.2..0.5);
        vehicle.respawn_on_random_segment(world, rng);
        vehicle.driver = Some(Pedestrian::driver(driver_id, vehicle.pos, rng));
        Some(vehicle)
    }

    /// Police car or tank joining the chase
    pub fn spawn_pursuit<R: Rng>(
        id: EntityId,
        driver_id: EntityId,
        kind: VehicleKind,
        pos: Vec3,
        toward: Vec3,
        tuning: &Tuning,
        rng: &mut R,
    ) -> Self {
        let mut vehicle = Self::new(id, kind, pos, heading_of(toward - pos));
        vehicle.pursuit = true;
        vehicle.cruise_speed = if kind.is_tank() {
            TANK_SPEED
        } else {
            rng.random_range(0.3..0.5) * tuning.police_speed_factor
        };
        vehicle.speed = vehicle.cruise_speed;
        vehicle.driver = Some(Pedestrian::driver(driver_id, pos, rng));
        vehicle
    }

    pub fn forward(&self) -> Vec3 {
        forward_from_heading(self.heading)
    }

    pub fn is_player_driven(&self) -> bool {
        self.player_driven
    }

    pub fn is_tank(&self) -> bool {
        self.kind.is_tank()
    }

    /// World-space collision box
    pub fn bounds(&self) -> Aabb {
        self.bounds_at(self.pos)
    }

    pub fn bounds_at(&self, pos: Vec3) -> Aabb {
        oriented_footprint(
            pos,
            self.heading,
            self.kind.width(),
            self.kind.length(),
            self.kind.height(),
        )
    }

    /// Point projectiles are tested against
    pub fn hit_center(&self) -> Vec3 {
        self.pos + Vec3::Y * (self.kind.height() * 0.5)
    }

    /// Terminal wreck state; never repaired
    pub fn break_down(&mut self, now_ms: f64) {
        if self.broken {
            return;
        }
        self.broken = true;
        self.broken_at_ms = Some(now_ms);
        self.next_smoke_ms = now_ms;
        self.speed = 0.0;
        self.stop = None;
        self.wait_until_ms = None;
        self.tilt = 0.2;
        self.health = 0;
    }

    /// Hand control to the player, discarding any AI driver
    pub(crate) fn take_control(&mut self) {
        if let Some(driver) = self.driver.take() {
            log::debug!("Driver {} removed from vehicle {}", driver.id, self.id);
        }
        self.player_driven = true;
        self.abandoned = false;
        self.pursuit = false;
        self.speed = 0.0;
        self.stop = None;
        self.wait_until_ms = None;
        self.last_pos = self.pos;
        if let Some(turret) = self.turret.as_mut() {
            turret.aim = turret.yaw;
        }
    }

    /// Release player control
    pub(crate) fn release_control(&mut self) {
        self.player_driven = false;
        self.abandoned = true;
        self.speed = 0.0;
    }

    /// Teleport onto a random lane
    pub fn respawn_on_random_segment<R: Rng>(&mut self, world: &World, rng: &mut R) {
        let segments = world.segments();
        if segments.is_empty() {
            return;
        }
        let index = rng.random_range(0..segments.len());
        let segment = &segments[index];
        let t = rng.random_range(0.0..0.8);
        let jitter = rng.random_range(-1.0..1.0);
        let side = Vec3::new(segment.direction.z, 0.0, -segment.direction.x);
        self.pos = segment.start.lerp(segment.end, t) + side * jitter;
        self.pos.y = 0.0;
        self.last_pos = self.pos;
        self.segment = Some(index);
        self.direction = segment.direction;
        self.target = segment.end;
        self.heading = heading_of(segment.direction);
        self.speed = self.cruise_speed;
        self.stop = None;
        self.wait_until_ms = None;
    }
}

/// Something a moving vehicle might run into
#[derive(Debug, Clone, Copy)]
struct Blocker {
    id: EntityId,
    pos: Vec3,
    half_length: f32,
}

struct TrafficContext<'a> {
    world: &'a World,
    tuning: &'a Tuning,
    now_ms: f64,
    pedestrians: &'a [(EntityId, Vec3)],
    vehicles: &'a [Blocker],
    player_on_foot: Option<Vec3>,
    /// Where pursuit units are heading
    pursuit_target: Option<Vec3>,
}

/// A shell an AI tank decided to fire this tick
struct TankShot {
    owner: EntityId,
    origin: Vec3,
    velocity: Vec3,
}

/// Advance every AI-controlled vehicle by one tick
pub fn update_vehicles(state: &mut GameState, dt: f32) {
    let pedestrians: Vec<(EntityId, Vec3)> = state
        .pedestrians
        .iter()
        .filter(|p| !p.is_dead())
        .map(|p| (p.id, p.pos))
        .collect();
    let blockers: Vec<Blocker> = state
        .vehicles
        .iter()
        .map(|v| Blocker {
            id: v.id,
            pos: v.pos,
            half_length: v.kind.length() * 0.5,
        })
        .collect();
    let pursuit_target = pursuit_target(state);
    let player_on_foot = state.player.on_foot_position();
    let frame_scale = dt * BASELINE_FPS;

    let GameState {
        vehicles,
        world,
        settings,
        rng,
        time_ms,
        ..
    } = state;
    let ctx = TrafficContext {
        world,
        tuning: &settings.tuning,
        now_ms: *time_ms,
        pedestrians: &pedestrians,
        vehicles: &blockers,
        player_on_foot,
        pursuit_target,
    };

    let mut shots = Vec::new();
    for vehicle in vehicles.iter_mut() {
        if vehicle.broken || vehicle.player_driven {
            continue;
        }
        match vehicle.kind {
            VehicleKind::Police if vehicle.pursuit => drive_police(vehicle, &ctx, frame_scale),
            VehicleKind::Tank if vehicle.pursuit => {
                if let Some(shot) = drive_tank(vehicle, &ctx, frame_scale) {
                    shots.push(shot);
                }
            }
            _ if vehicle.abandoned || vehicle.driver_dead => {}
            _ => drive_traffic(vehicle, &ctx, frame_scale, rng),
        }
        if let Some(driver) = vehicle.driver.as_mut() {
            seat_driver(driver, vehicle.pos, vehicle.heading);
        }
    }

    for shot in shots {
        let id = state.next_entity_id();
        let now = state.time_ms;
        state
            .projectiles
            .push(Projectile::ai_shell(id, shot.owner, shot.origin, shot.velocity, now));
        state.events.push(GameEvent::TankFired {
            vehicle: shot.owner,
            from_player: false,
        });
        state.spawn_effect(EffectKind::MuzzleFlash, shot.origin, Vec3::ZERO, 1.5, 0.1);
        state.spawn_effect(EffectKind::TankSmoke, shot.origin, Vec3::Y * 0.05, 1.0, 1.0);
    }
}

/// The player's position, or the player's vehicle, while they can be chased
fn pursuit_target(state: &GameState) -> Option<Vec3> {
    if !state.player.is_active() {
        return None;
    }
    match state.player_vehicle() {
        Some(v) => Some(v.pos),
        None => Some(state.player.pos),
    }
}

fn drive_traffic<R: Rng>(vehicle: &mut Vehicle, ctx: &TrafficContext, fs: f32, rng: &mut R) {
    if let Some(until) = vehicle.wait_until_ms {
        if ctx.now_ms < until {
            return;
        }
        vehicle.wait_until_ms = None;
    }

    // Stops are decided before any movement this tick
    if let Some(stop) = vehicle.stop {
        if should_resume(vehicle, &stop, ctx) {
            vehicle.stop = None;
            vehicle.speed = if stop.resume_speed > 0.01 {
                stop.resume_speed
            } else {
                UNSTICK_SPEED
            };
        } else {
            vehicle.speed = 0.0;
            return;
        }
    } else if let Some(cause) = detect_blocker(vehicle, ctx) {
        vehicle.stop = Some(StopState {
            cause,
            since_ms: ctx.now_ms,
            resume_speed: vehicle.speed.max(vehicle.cruise_speed),
        });
        vehicle.speed = 0.0;
        return;
    }

    let target_heading = heading_of(vehicle.target - vehicle.pos);
    vehicle.heading = rotate_toward(
        vehicle.heading,
        target_heading,
        ctx.tuning.vehicle_turn_rate * fs,
    );
    vehicle.pos += vehicle.forward() * vehicle.speed * fs;
    vehicle.pos = ctx.world.bounds.clamp(vehicle.pos, WORLD_HALF_EXTENT - VEHICLE_BOUND);

    if planar_distance(vehicle.pos, vehicle.target) < ctx.tuning.segment_arrival {
        match choose_next_segment(vehicle, ctx.world, ctx.tuning, rng) {
            Some(index) => {
                if let Some(segment) = ctx.world.segment(index) {
                    vehicle.segment = Some(index);
                    vehicle.direction = segment.direction;
                    vehicle.target = segment.end;
                    vehicle.wait_until_ms = Some(ctx.now_ms + rng.random_range(300.0..1000.0));
                }
            }
            None => vehicle.respawn_on_random_segment(ctx.world, rng),
        }
    }
}

/// In-lane obstacle within stopping distance, checked in priority order
fn detect_blocker(vehicle: &Vehicle, ctx: &TrafficContext) -> Option<StopCause> {
    let forward = vehicle.forward();
    let tuning = ctx.tuning;
    let in_lane = |target: Vec3, reach: f32| {
        let (along, lateral) = project_on_heading(vehicle.pos, forward, target);
        along > 0.0 && along < reach && lateral < tuning.lane_threshold
    };

    let nearest = ctx
        .pedestrians
        .iter()
        .min_by(|a, b| {
            a.1.distance_squared(vehicle.pos)
                .total_cmp(&b.1.distance_squared(vehicle.pos))
        });
    if let Some(&(id, pos)) = nearest {
        if in_lane(pos, tuning.stop_distance) {
            return Some(StopCause::Pedestrian(id));
        }
    }

    if let Some(player) = ctx.player_on_foot {
        if in_lane(player, tuning.stop_distance) {
            return Some(StopCause::Player);
        }
    }

    let own_half = vehicle.kind.length() * 0.5;
    ctx.vehicles
        .iter()
        .filter(|b| b.id != vehicle.id)
        .find(|b| {
            // Measured centre to centre, so both half lengths are added
            in_lane(b.pos, tuning.stop_distance + own_half + b.half_length)
        })
        .map(|b| StopCause::Obstacle(b.id))
}

fn should_resume(vehicle: &Vehicle, stop: &StopState, ctx: &TrafficContext) -> bool {
    let tuning = ctx.tuning;
    if ctx.now_ms - stop.since_ms >= tuning.stop_timeout_ms {
        log::debug!("Vehicle {} broke a stop deadlock", vehicle.id);
        return true;
    }

    let (pos, reach) = match stop.cause {
        StopCause::Pedestrian(id) => (
            ctx.pedestrians.iter().find(|p| p.0 == id).map(|p| p.1),
            tuning.stop_distance,
        ),
        StopCause::Player => (ctx.player_on_foot, tuning.stop_distance),
        StopCause::Obstacle(id) => {
            let own_half = vehicle.kind.length() * 0.5;
            let blocker = ctx.vehicles.iter().find(|b| b.id == id);
            (
                blocker.map(|b| b.pos),
                tuning.stop_distance
                    + blocker.map_or(0.0, |b| own_half + b.half_length),
            )
        }
    };
    let Some(pos) = pos else {
        return true;
    };

    let (along, lateral) = project_on_heading(vehicle.pos, vehicle.forward(), pos);
    along <= 0.0
        || along > reach + tuning.resume_margin
        || lateral > tuning.lane_threshold + tuning.resume_margin
}

/// Weighted pick of a lane starting near the vehicle, never a U-turn
fn choose_next_segment<R: Rng>(
    vehicle: &Vehicle,
    world: &World,
    tuning: &Tuning,
    rng: &mut R,
) -> Option<usize> {
    let candidates: Vec<(usize, u32)> = world
        .segments_starting_near(vehicle.pos, tuning.segment_search_radius)
        .filter(|(index, _)| Some(*index) != vehicle.segment)
        .filter_map(|(index, segment)| {
            let dot = segment.direction.dot(vehicle.direction);
            let weight = if dot <= -0.5 {
                return None;
            } else if dot > 0.8 {
                3
            } else if dot > 0.0 {
                2
            } else {
                1
            };
            Some((index, weight))
        })
        .collect();

    let total: u32 = candidates.iter().map(|c| c.1).sum();
    if total == 0 {
        return None;
    }
    let mut pick = rng.random_range(0..total);
    for (index, weight) in candidates {
        if pick < weight {
            return Some(index);
        }
        pick -= weight;
    }
    None
}

fn drive_police(vehicle: &mut Vehicle, ctx: &TrafficContext, fs: f32) {
    let Some(target) = ctx.pursuit_target else {
        vehicle.speed = 0.0;
        return;
    };
    vehicle.heading = heading_of(target - vehicle.pos);
    if planar_distance(vehicle.pos, target) <= ctx.tuning.police_standoff {
        return;
    }

    let next = vehicle.pos + vehicle.forward() * vehicle.cruise_speed * fs;
    if ctx.world.building_overlapping(&vehicle.bounds_at(next)).is_some() {
        return;
    }
    let forward = vehicle.forward();
    let reach = vehicle.kind.length() * 0.5 + 1.5;
    let pedestrian_ahead = ctx.pedestrians.iter().any(|&(_, p)| {
        let (along, lateral) = project_on_heading(vehicle.pos, forward, p);
        along > 0.0 && along < reach && lateral < vehicle.kind.proximity_size()
    });
    if pedestrian_ahead {
        return;
    }
    vehicle.speed = vehicle.cruise_speed;
    vehicle.pos = ctx.world.bounds.clamp(next, WORLD_HALF_EXTENT - VEHICLE_BOUND);
}

fn drive_tank(vehicle: &mut Vehicle, ctx: &TrafficContext, fs: f32) -> Option<TankShot> {
    if vehicle.driver_dead {
        vehicle.speed = 0.0;
        return None;
    }
    let Some(target) = ctx.pursuit_target else {
        vehicle.speed = 0.0;
        return None;
    };
    let tuning = ctx.tuning;
    let aim = heading_of(target - vehicle.pos);
    let distance = planar_distance(vehicle.pos, target);

    vehicle.heading = rotate_toward(vehicle.heading, aim, tuning.vehicle_turn_rate * fs);
    vehicle.last_pos = vehicle.pos;
    if distance > tuning.tank_standoff {
        let next = vehicle.pos + vehicle.forward() * vehicle.cruise_speed * fs;
        if ctx.world.building_overlapping(&vehicle.bounds_at(next)).is_none() {
            vehicle.pos = ctx.world.bounds.clamp(next, WORLD_HALF_EXTENT - VEHICLE_BOUND);
            vehicle.speed = vehicle.cruise_speed;
        } else {
            vehicle.speed = 0.0;
        }
    } else {
        vehicle.speed = 0.0;
    }

    let heading = vehicle.heading;
    let turret = vehicle.turret.as_mut()?;
    let relative = normalize_angle(aim - heading);
    turret.yaw = rotate_toward(turret.yaw, relative, tuning.turret_turn_rate * fs);

    if distance >= tuning.tank_fire_range || !turret.ready(ctx.now_ms, tuning.tank_fire_cooldown_ms) {
        return None;
    }
    turret.last_shot_ms = Some(ctx.now_ms);

    let barrel = forward_from_heading(turret.world_yaw(heading));
    let origin = vehicle.pos + barrel * MUZZLE_OFFSET + Vec3::Y * MUZZLE_HEIGHT;
    let aim_point = target + Vec3::Y;
    let velocity = (aim_point - origin).normalize_or(barrel) * AI_SHELL_SPEED;
    Some(TankShot {
        owner: vehicle.id,
        origin,
        velocity,
    })
}

/// Remove every police car and tank still under AI control
pub fn clear_pursuit(state: &mut GameState) {
    let before = state.vehicles.len();
    state.vehicles.retain(|v| !v.pursuit || v.player_driven);
    let removed = before - state.vehicles.len();
    if removed > 0 {
        log::info!("Cleared {} pursuit units", removed);
    }
}

/// Replace the response force with one sized for `level`.
///
/// One police car for levels 1-3, `level - 3` tanks from level 4.
pub fn spawn_pursuit_force(state: &mut GameState, level: u8) {
    clear_pursuit(state);
    if level == 0 {
        return;
    }
    let origin = match state.player_vehicle() {
        Some(v) => v.pos,
        None => state.player.pos,
    };

    let (kind, count, range) = if level <= 3 {
        (VehicleKind::Police, 1, POLICE_SPAWN_RANGE)
    } else {
        (VehicleKind::Tank, (level - 3) as usize, TANK_SPAWN_RANGE)
    };

    for _ in 0..count {
        let angle = state.rng.random_range(0.0..std::f32::consts::TAU);
        let dist = state.rng.random_range(range.0..range.1);
        let dir = Vec3::new(angle.cos(), 0.0, angle.sin());
        let id = state.next_entity_id();
        let driver_id = state.next_entity_id();
        let mut unit = Vehicle::spawn_pursuit(
            id,
            driver_id,
            kind,
            origin + dir * dist,
            origin,
            &state.settings.tuning,
            &mut state.rng,
        );
        clear_of_buildings(&mut unit, &state.world, dir);
        state.vehicles.push(unit);
    }
    log::info!("Wanted level {}: dispatched {} {:?}", level, count, kind);
}

/// Slide a freshly spawned unit outward until it no longer sits in a building
fn clear_of_buildings(vehicle: &mut Vehicle, world: &World, outward: Vec3) {
    for _ in 0..10 {
        if world.building_overlapping(&vehicle.bounds()).is_none() {
            break;
        }
        vehicle.pos += outward * 5.0;
    }
    vehicle.pos = world.bounds.clamp(vehicle.pos, WORLD_HALF_EXTENT - VEHICLE_BOUND);
    vehicle.last_pos = vehicle.pos;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;
    use crate::sim::world::WorldLayout;
    use std::f32::consts::FRAC_PI_2;

    fn bare_state() -> GameState {
        let mut state = GameState::with_world(
            World::from_layout(WorldLayout::default()),
            crate::Settings::default(),
            21,
        );
        // Park the player well away from the test lanes
        state.player.pos = Vec3::new(-300.0, 0.0, -300.0);
        state
    }

    /// Eastbound car on the right lane of the z = 0 road
    fn eastbound(state: &mut GameState, x: f32) -> EntityId {
        let id = state.next_entity_id();
        let mut v = Vehicle::new(id, VehicleKind::Sedan, Vec3::new(x, 0.0, -3.0), FRAC_PI_2);
        v.cruise_speed = 0.3;
        v.speed = 0.3;
        v.direction = Vec3::X;
        v.target = Vec3::new(120.0, 0.0, -3.0);
        state.vehicles.push(v);
        id
    }

    fn pedestrian_at(state: &mut GameState, pos: Vec3) -> EntityId {
        let id = state.next_entity_id();
        let mut ped = Pedestrian::spawn(id, &state.world, 0, &mut state.rng);
        ped.pos = pos;
        state.pedestrians.push(ped);
        id
    }

    #[test]
    fn test_stops_for_pedestrian_before_moving() {
        let mut state = bare_state();
        let car = eastbound(&mut state, 10.0);
        let ped = pedestrian_at(&mut state, Vec3::new(14.0, 0.0, -3.0));

        update_vehicles(&mut state, SIM_DT);
        let v = state.vehicle(car).unwrap();
        assert_eq!(v.speed, 0.0);
        assert_eq!(v.pos, Vec3::new(10.0, 0.0, -3.0));
        assert_eq!(v.stop.map(|s| s.cause), Some(StopCause::Pedestrian(ped)));
    }

    #[test]
    fn test_ignores_pedestrian_outside_lane() {
        let mut state = bare_state();
        let car = eastbound(&mut state, 10.0);
        pedestrian_at(&mut state, Vec3::new(14.0, 0.0, 3.5));

        update_vehicles(&mut state, SIM_DT);
        let v = state.vehicle(car).unwrap();
        assert!(v.stop.is_none());
        assert!(v.pos.x > 10.0);
    }

    #[test]
    fn test_resumes_with_hysteresis() {
        let mut state = bare_state();
        let car = eastbound(&mut state, 10.0);
        let ped = pedestrian_at(&mut state, Vec3::new(14.0, 0.0, -3.0));
        update_vehicles(&mut state, SIM_DT);

        // Just past the stop distance but inside the margin: still waiting
        state.pedestrian_mut(ped).unwrap().pos.x = 15.5;
        update_vehicles(&mut state, SIM_DT);
        assert!(state.vehicle(car).unwrap().stop.is_some());

        state.pedestrian_mut(ped).unwrap().pos.x = 16.5;
        update_vehicles(&mut state, SIM_DT);
        let v = state.vehicle(car).unwrap();
        assert!(v.stop.is_none());
        assert!((v.speed - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_stop_times_out() {
        let mut state = bare_state();
        let car = eastbound(&mut state, 10.0);
        pedestrian_at(&mut state, Vec3::new(14.0, 0.0, -3.0));
        update_vehicles(&mut state, SIM_DT);
        assert!(state.vehicle(car).unwrap().stop.is_some());

        state.time_ms = 10_000.0;
        update_vehicles(&mut state, SIM_DT);
        let v = state.vehicle(car).unwrap();
        assert!(v.speed > 0.0);
        assert!(v.pos.x > 10.0);
    }

    #[test]
    fn test_queues_behind_vehicle_ahead() {
        let mut state = bare_state();
        let rear = eastbound(&mut state, 10.0);
        let front = eastbound(&mut state, 20.0);
        state.vehicle_mut(front).unwrap().speed = 0.0;
        state.vehicle_mut(front).unwrap().wait_until_ms = Some(60_000.0);

        update_vehicles(&mut state, SIM_DT);
        let v = state.vehicle(rear).unwrap();
        assert_eq!(v.stop.map(|s| s.cause), Some(StopCause::Obstacle(front)));
    }

    #[test]
    fn test_picks_non_reversing_segment_on_arrival() {
        let mut state = bare_state();
        let car = eastbound(&mut state, 118.0);
        update_vehicles(&mut state, SIM_DT);
        let v = state.vehicle(car).unwrap();
        assert!(v.direction.dot(Vec3::X) > -0.5);
        assert_ne!(v.target, Vec3::new(120.0, 0.0, -3.0));
        assert!(v.wait_until_ms.is_some());
    }

    #[test]
    fn test_police_hold_standoff() {
        let mut state = bare_state();
        state.player.pos = Vec3::new(200.0, 0.0, 60.0);
        let id = state.next_entity_id();
        let mut cop = Vehicle::spawn_pursuit(
            id,
            999,
            VehicleKind::Police,
            Vec3::new(205.0, 0.0, 60.0),
            state.player.pos,
            &state.settings.tuning,
            &mut state.rng,
        );
        cop.heading = 0.0;
        state.vehicles.push(cop);

        update_vehicles(&mut state, SIM_DT);
        let cop = state.vehicle(id).unwrap();
        assert_eq!(cop.pos, Vec3::new(205.0, 0.0, 60.0));
        // Faces the player even while holding position
        assert!((cop.heading - heading_of(Vec3::new(-1.0, 0.0, 0.0))).abs() < 1e-4);
    }

    #[test]
    fn test_police_close_in_faster_than_traffic() {
        let mut state = bare_state();
        state.player.pos = Vec3::new(200.0, 0.0, 60.0);
        let id = state.next_entity_id();
        let cop = Vehicle::spawn_pursuit(
            id,
            999,
            VehicleKind::Police,
            Vec3::new(230.0, 0.0, 60.0),
            state.player.pos,
            &state.settings.tuning,
            &mut state.rng,
        );
        assert!(cop.cruise_speed >= 0.45);
        state.vehicles.push(cop);

        update_vehicles(&mut state, SIM_DT);
        assert!(state.vehicle(id).unwrap().pos.x < 230.0);
    }

    #[test]
    fn test_tank_fires_on_cooldown_in_range() {
        let mut state = bare_state();
        state.player.pos = Vec3::new(200.0, 0.0, 60.0);
        let id = state.next_entity_id();
        let tank = Vehicle::spawn_pursuit(
            id,
            999,
            VehicleKind::Tank,
            Vec3::new(230.0, 0.0, 60.0),
            state.player.pos,
            &state.settings.tuning,
            &mut state.rng,
        );
        state.vehicles.push(tank);

        update_vehicles(&mut state, SIM_DT);
        assert_eq!(state.projectiles.len(), 1);
        let shell = &state.projectiles[0];
        assert!(shell.attribution.from_ai && shell.attribution.from_tank);
        assert_eq!(shell.attribution.owner, Some(id));

        state.time_ms = 1000.0;
        update_vehicles(&mut state, SIM_DT);
        assert_eq!(state.projectiles.len(), 1);

        state.time_ms = 2000.0;
        update_vehicles(&mut state, SIM_DT);
        assert_eq!(state.projectiles.len(), 2);
    }

    #[test]
    fn test_tank_with_dead_crew_is_inert() {
        let mut state = bare_state();
        state.player.pos = Vec3::new(200.0, 0.0, 60.0);
        let id = state.next_entity_id();
        let mut tank = Vehicle::spawn_pursuit(
            id,
            999,
            VehicleKind::Tank,
            Vec3::new(230.0, 0.0, 60.0),
            state.player.pos,
            &state.settings.tuning,
            &mut state.rng,
        );
        tank.driver_dead = true;
        tank.driver = None;
        state.vehicles.push(tank);

        update_vehicles(&mut state, SIM_DT);
        assert!(state.projectiles.is_empty());
        assert_eq!(state.vehicle(id).unwrap().pos, Vec3::new(230.0, 0.0, 60.0));
    }

    #[test]
    fn test_force_size_tracks_level() {
        let mut state = bare_state();
        spawn_pursuit_force(&mut state, 2);
        assert_eq!(state.vehicles.iter().filter(|v| v.pursuit).count(), 1);
        spawn_pursuit_force(&mut state, 5);
        let tanks = state
            .vehicles
            .iter()
            .filter(|v| v.pursuit && v.is_tank())
            .count();
        assert_eq!(tanks, 2);
        assert_eq!(state.vehicles.iter().filter(|v| v.pursuit).count(), 2);
        spawn_pursuit_force(&mut state, 0);
        assert!(state.vehicles.iter().all(|v| !v.pursuit));
    }

    #[test]
    fn test_driver_rides_along() {
        let mut state = bare_state();
        let id = state.next_entity_id();
        let driver_id = state.next_entity_id();
        let mut v = Vehicle::spawn_traffic(id, driver_id, &state.world, &mut state.rng).unwrap();
        v.wait_until_ms = None;
        state.vehicles.push(v);
        for _ in 0..30 {
            update_vehicles(&mut state, SIM_DT);
        }
        let v = state.vehicle(id).unwrap();
        let driver = v.driver.as_ref().unwrap();
        assert!((driver.pos - (v.pos + Vec3::Y * 0.5)).length() < 1e-4);
    }
}
