//! Player controller
//!
//! The player is either on foot or driving; the mode is the possession link,
//! not a type. Driving a tank swaps hand weapons for the main gun.

use std::f32::consts::FRAC_PI_3;
use std::fmt;

use glam::{Vec2, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::collision::Aabb;
use super::escalation::{self, WantedLevel};
use super::projectile::Projectile;
use super::state::{EffectKind, EntityId, GameEvent, GameState};
use super::tick::TickInput;
use super::vehicle::Vehicle;
use crate::consts::*;
use crate::error::{SimError, SimResult};
use crate::{forward_from_heading, normalize_angle, planar_distance};

/// Hand weapons sold at the shop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponKind {
    Rifle,
    Smg,
    RocketLauncher,
}

impl WeaponKind {
    pub const ALL: [WeaponKind; 3] = [
        WeaponKind::Rifle,
        WeaponKind::Smg,
        WeaponKind::RocketLauncher,
    ];

    /// Weapon bound to a number key (1-3)
    pub fn from_slot(slot: u8) -> Option<Self> {
        match slot {
            1 => Some(WeaponKind::Rifle),
            2 => Some(WeaponKind::Smg),
            3 => Some(WeaponKind::RocketLauncher),
            _ => None,
        }
    }

    /// Minimum time between shots
    pub fn cooldown_ms(&self) -> f64 {
        match self {
            WeaponKind::Rifle => 100.0,
            WeaponKind::Smg => 50.0,
            WeaponKind::RocketLauncher => 2000.0,
        }
    }

    pub fn price(&self) -> u32 {
        match self {
            WeaponKind::Rifle => 2000,
            WeaponKind::Smg => 1000,
            WeaponKind::RocketLauncher => 5000,
        }
    }

    /// Bullet damage against pedestrians
    pub fn pedestrian_damage(&self) -> i32 {
        match self {
            WeaponKind::Rifle => 34,
            WeaponKind::Smg => 7,
            WeaponKind::RocketLauncher => ROCKET_DAMAGE,
        }
    }

    /// Bullet damage against vehicle health
    pub fn vehicle_damage(&self) -> i32 {
        match self {
            WeaponKind::Rifle => 25,
            WeaponKind::Smg => 15,
            WeaponKind::RocketLauncher => ROCKET_DAMAGE,
        }
    }
}

impl fmt::Display for WeaponKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WeaponKind::Rifle => "Rifle",
            WeaponKind::Smg => "SMG",
            WeaponKind::RocketLauncher => "Rocket launcher",
        };
        f.write_str(name)
    }
}

/// Owned weapons and fire timing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arsenal {
    pub owned: Vec<WeaponKind>,
    pub equipped: Option<WeaponKind>,
    pub last_fire_ms: Option<f64>,
}

impl Arsenal {
    pub fn owns(&self, kind: WeaponKind) -> bool {
        self.owned.contains(&kind)
    }

    /// Equip an owned weapon; unowned selections are ignored
    pub fn equip(&mut self, kind: WeaponKind) -> bool {
        if self.owns(kind) {
            self.equipped = Some(kind);
            true
        } else {
            false
        }
    }

    /// Time until the equipped weapon can fire again
    pub fn cooldown_remaining(&self, now_ms: f64) -> f64 {
        match (self.equipped, self.last_fire_ms) {
            (Some(kind), Some(last)) => (kind.cooldown_ms() - (now_ms - last)).max(0.0),
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraMode {
    FirstPerson,
    ThirdPerson,
}

/// View state driven by accumulated mouse deltas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub mode: CameraMode,
    pub yaw: f32,
    pub pitch: f32,
    /// Orbit distance in third person
    pub distance: f32,
    pub position: Vec3,
    pub target: Vec3,
}

/// First-person eye height
const EYE_HEIGHT: f32 = 2.2;
/// Height of the third-person orbit centre above the followed entity
const ORBIT_HEIGHT: f32 = 4.0;
const MAX_PITCH: f32 = FRAC_PI_3;

impl Camera {
    pub fn new(distance: f32) -> Self {
        Self {
            mode: CameraMode::ThirdPerson,
            yaw: 0.0,
            pitch: 0.0,
            distance,
            position: Vec3::new(0.0, ORBIT_HEIGHT, -distance),
            target: Vec3::Y * ORBIT_HEIGHT,
        }
    }

    /// View direction including pitch
    pub fn forward(&self) -> Vec3 {
        let (sp, cp) = self.pitch.sin_cos();
        let (sy, cy) = self.yaw.sin_cos();
        Vec3::new(sy * cp, sp, cy * cp)
    }

    /// View direction projected onto the ground
    pub fn flat_forward(&self) -> Vec3 {
        forward_from_heading(self.yaw)
    }

    pub fn right(&self) -> Vec3 {
        self.flat_forward().cross(Vec3::Y)
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            CameraMode::FirstPerson => CameraMode::ThirdPerson,
            CameraMode::ThirdPerson => CameraMode::FirstPerson,
        };
    }

    pub fn apply_look(&mut self, delta: Vec2, sensitivity: f32, invert_y: bool) {
        let y_sign = if invert_y { -1.0 } else { 1.0 };
        self.yaw = normalize_angle(self.yaw - delta.x * sensitivity);
        self.pitch = (self.pitch - delta.y * sensitivity * y_sign).clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// Place the camera relative to the entity it follows
    pub fn follow(&mut self, anchor: Vec3) {
        match self.mode {
            CameraMode::FirstPerson => {
                self.position = anchor + Vec3::Y * EYE_HEIGHT;
                self.target = self.position + self.forward();
            }
            CameraMode::ThirdPerson => {
                self.target = anchor + Vec3::Y * ORBIT_HEIGHT;
                self.position = self.target - self.forward() * self.distance;
                self.position.y = self.position.y.max(1.0);
            }
        }
    }
}

/// The player avatar and progression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub pos: Vec3,
    pub velocity: Vec3,
    /// Facing on foot
    pub heading: f32,
    pub on_ground: bool,
    pub health: i32,
    pub money: u32,
    pub wanted: WantedLevel,
    pub arsenal: Arsenal,
    /// Possessed vehicle; the vehicle's flag mirrors this
    pub(crate) vehicle: Option<EntityId>,
    /// Set while serving a jail sentence
    pub jail_release_ms: Option<f64>,
    /// Set after a crash ejection until the respawn
    pub respawn_at_ms: Option<f64>,
    /// When police first got close enough to apprehend on foot
    pub apprehension_since_ms: Option<f64>,
}

// On foot
const WALK_SPEED: f32 = 0.3;
const WALK_DECAY: f32 = 0.8;
const JUMP_IMPULSE: f32 = 0.5;
const GRAVITY: f32 = 0.024;
const BODY_HALF_WIDTH: f32 = 0.5;
const BODY_HEIGHT: f32 = 2.5;

// Cars
const CAR_ACCEL: f32 = 0.02;
const CAR_MAX_SPEED: f32 = 0.4;
const CAR_REVERSE_SPEED: f32 = -0.2;
const CAR_DECAY: f32 = 0.95;
const CAR_TURN_RATE: f32 = 0.05;
/// Cars only steer above this speed
const CAR_STEER_MIN_SPEED: f32 = 0.1;
const BOOST_FACTOR: f32 = 2.5;

// Tanks
const TANK_ACCEL: f32 = 0.005;
const TANK_MAX_SPEED: f32 = 0.15;
const TANK_REVERSE_SPEED: f32 = -0.1;
const TANK_DECAY: f32 = 0.9;
const TANK_TURN_RATE: f32 = 0.03;
const TURRET_WHEEL_RATE: f32 = 0.005;
const TURRET_FOLLOW: f32 = 0.1;
const TANK_FIRE_COOLDOWN_MS: f64 = 1000.0;
const TANK_SHELL_SPEED: f32 = 2.5;
const TANK_SHELL_LOFT: f32 = 0.1;
const TANK_SHELL_GRAVITY: f32 = 0.015;
const TANK_SHELL_DAMAGE: i32 = 1000;
const TANK_SHELL_RADIUS: f32 = 10.0;
const TANK_MUZZLE_DISTANCE: f32 = 6.5;
const TANK_MUZZLE_HEIGHT: f32 = 2.8;
const TANK_RECOIL: f32 = 0.3;

// Hand weapons
const MUZZLE_HEIGHT: f32 = 2.0;
const BULLET_SPEED: f32 = 2.0;
const ROCKET_SPEED: f32 = 0.8;
const ROCKET_GRAVITY: f32 = 0.008;
const ROCKET_DAMAGE: i32 = 500;
const ROCKET_RADIUS: f32 = 4.0;

/// Sideways distance from the vehicle centre when getting out
const EXIT_OFFSET: f32 = 3.0;
const CAMERA_ZOOM_RATE: f32 = 0.01;

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

impl Player {
    pub fn new() -> Self {
        Self {
            pos: RELEASE_POSITION,
            velocity: Vec3::ZERO,
            heading: 0.0,
            on_ground: true,
            health: PLAYER_START_HEALTH,
            money: PLAYER_START_MONEY,
            wanted: WantedLevel::default(),
            arsenal: Arsenal::default(),
            vehicle: None,
            jail_release_ms: None,
            respawn_at_ms: None,
            apprehension_since_ms: None,
        }
    }

    pub fn vehicle(&self) -> Option<EntityId> {
        self.vehicle
    }

    pub fn in_vehicle(&self) -> bool {
        self.vehicle.is_some()
    }

    pub fn is_jailed(&self) -> bool {
        self.jail_release_ms.is_some()
    }

    /// Free to act: not in jail and not waiting to respawn
    pub fn is_active(&self) -> bool {
        self.jail_release_ms.is_none() && self.respawn_at_ms.is_none()
    }

    /// Position while walking around free, for AI that reacts to the player
    pub fn on_foot_position(&self) -> Option<Vec3> {
        (self.is_active() && self.vehicle.is_none()).then_some(self.pos)
    }

    fn bounds_at(pos: Vec3) -> Aabb {
        Aabb::from_footprint(pos, BODY_HALF_WIDTH, BODY_HALF_WIDTH, BODY_HEIGHT)
    }
}

/// Apply one tick of player input
pub fn update_player(state: &mut GameState, input: &TickInput, dt: f32) {
    let frame_scale = dt * BASELINE_FPS;
    let sensitivity = state.settings.mouse_sensitivity;
    let invert_y = state.settings.invert_y;
    state.camera.apply_look(input.look_delta, sensitivity, invert_y);
    if input.toggle_camera {
        state.camera.toggle_mode();
    }

    if state.player.is_active() {
        if let Some(slot) = input.select_weapon {
            select_weapon(state, slot);
        }
        if input.interact {
            interact(state);
        }

        match state.player.vehicle {
            Some(id) => drive(state, id, input, frame_scale),
            None => {
                walk(state, input, frame_scale);
                if input.fire {
                    fire_weapon(state);
                }
                zoom_camera(state, input.wheel_delta);
            }
        }

        if state.shop_open
            && (state.player.in_vehicle()
                || planar_distance(state.player.pos, SHOP_POSITION)
                    > state.settings.tuning.shop_radius * 2.0)
        {
            state.shop_open = false;
            state.events.push(GameEvent::ShopToggled { open: false });
        }
    }

    let anchor = state.player_vehicle().map_or(state.player.pos, |v| v.pos);
    state.camera.follow(anchor);
}

fn zoom_camera(state: &mut GameState, wheel: f32) {
    if wheel == 0.0 {
        return;
    }
    let (min, max) = crate::Settings::CAMERA_DISTANCE_RANGE;
    state.camera.distance = (state.camera.distance + wheel * CAMERA_ZOOM_RATE).clamp(min, max);
}

fn select_weapon(state: &mut GameState, slot: u8) {
    let Some(kind) = WeaponKind::from_slot(slot) else {
        return;
    };
    if state.player.arsenal.equip(kind) {
        log::info!("Equipped {}", kind);
    }
}

/// Exit, toggle the shop, or enter a vehicle, in that order of priority
fn interact(state: &mut GameState) {
    if state.player.in_vehicle() {
        exit_vehicle(state);
        return;
    }

    if planar_distance(state.player.pos, SHOP_POSITION) < state.settings.tuning.shop_radius {
        state.shop_open = !state.shop_open;
        state.events.push(GameEvent::ShopToggled {
            open: state.shop_open,
        });
        return;
    }

    let radius = state.settings.tuning.enter_radius;
    let player_pos = state.player.pos;
    let nearest = state
        .vehicles
        .iter()
        .filter(|v| !v.broken && !v.player_driven)
        .filter(|v| !v.is_tank() || v.driver_dead)
        .map(|v| (planar_distance(v.pos, player_pos), v.id))
        .filter(|(d, _)| *d < radius)
        .min_by(|a, b| a.0.total_cmp(&b.0));
    if let Some((_, id)) = nearest {
        enter_vehicle(state, id);
    }
}

/// Take a vehicle. Its AI driver, if any, is discarded in the same step.
pub fn enter_vehicle(state: &mut GameState, id: EntityId) -> bool {
    if state.player.vehicle.is_some() {
        return false;
    }
    let Some(vehicle) = state.vehicle_mut(id) else {
        return false;
    };
    if vehicle.broken {
        return false;
    }
    vehicle.take_control();
    state.player.vehicle = Some(id);
    state.player.velocity = Vec3::ZERO;
    state.shop_open = false;
    state.events.push(GameEvent::VehicleEntered { vehicle: id });
    log::info!("Entered vehicle {}", id);
    true
}

/// Get out, unless police are close enough to make the arrest
pub fn exit_vehicle(state: &mut GameState) {
    let Some(id) = state.player.vehicle else {
        return;
    };
    if state.player.wanted.get() >= 1
        && escalation::police_within(state, state.settings.tuning.arrest_radius)
    {
        escalation::arrest(state);
        return;
    }
    release_vehicle(state, id);
}

/// Unlink the player from a vehicle and place them beside it
pub(crate) fn release_vehicle(state: &mut GameState, id: EntityId) {
    state.player.vehicle = None;
    state.player.velocity = Vec3::ZERO;
    let Some(vehicle) = state.vehicle_mut(id) else {
        return;
    };
    vehicle.release_control();
    let side = -vehicle.forward().cross(Vec3::Y);
    let exit = vehicle.pos + side * EXIT_OFFSET;
    state.player.pos = Vec3::new(exit.x, 0.0, exit.z);
    state.player.on_ground = true;
    state.events.push(GameEvent::VehicleExited { vehicle: id });
    log::info!("Exited vehicle {}", id);
}

fn walk(state: &mut GameState, input: &TickInput, fs: f32) {
    let camera = &state.camera;
    let player = &mut state.player;

    let mut wish = camera.flat_forward() * input.movement.y + camera.right() * input.movement.x;
    if wish.length_squared() > 1.0 {
        wish = wish.normalize();
    }
    if wish.length_squared() > 1e-6 {
        player.velocity.x = wish.x * WALK_SPEED;
        player.velocity.z = wish.z * WALK_SPEED;
        player.heading = camera.yaw;
    } else {
        let decay = WALK_DECAY.powf(fs);
        player.velocity.x *= decay;
        player.velocity.z *= decay;
    }

    if input.jump && player.on_ground {
        player.velocity.y = JUMP_IMPULSE;
        player.on_ground = false;
    }
    player.velocity.y -= GRAVITY * fs;

    // Resolve horizontal movement per axis so walls can be slid along
    let world = &state.world;
    let step = player.velocity * fs;
    for axis in [Vec3::X, Vec3::Z] {
        let next = player.pos + axis * step.dot(axis);
        if world.building_overlapping(&Player::bounds_at(next)).is_none() {
            player.pos = next;
        }
    }

    player.pos.y += step.y;
    if player.pos.y <= 0.0 {
        player.pos.y = 0.0;
        player.velocity.y = 0.0;
        player.on_ground = true;
    }
    player.pos = world.bounds.clamp(player.pos, WORLD_HALF_EXTENT - VEHICLE_BOUND);
}

fn fire_weapon(state: &mut GameState) {
    let now = state.time_ms;
    let arsenal = &state.player.arsenal;
    let Some(kind) = arsenal.equipped.filter(|k| arsenal.owns(*k)) else {
        return;
    };
    if arsenal.cooldown_remaining(now) > 0.0 {
        return;
    }
    state.player.arsenal.last_fire_ms = Some(now);

    let direction = state.camera.forward();
    let origin = state.player.pos + Vec3::Y * MUZZLE_HEIGHT;
    let id = state.next_entity_id();
    let projectile = match kind {
        WeaponKind::RocketLauncher => Projectile::rocket(
            id,
            origin + direction * 2.0,
            direction * ROCKET_SPEED,
            ROCKET_GRAVITY,
            ROCKET_DAMAGE,
            ROCKET_RADIUS,
            now,
        ),
        WeaponKind::Rifle | WeaponKind::Smg => Projectile::bullet(
            id,
            origin + direction,
            direction * BULLET_SPEED,
            kind.pedestrian_damage(),
            kind.vehicle_damage(),
            now,
        ),
    };
    state.projectiles.push(projectile);
    state.events.push(GameEvent::WeaponFired { weapon: kind });
    state.spawn_effect(EffectKind::MuzzleFlash, origin + direction, Vec3::ZERO, 0.3, 0.05);
}

fn drive(state: &mut GameState, id: EntityId, input: &TickInput, fs: f32) {
    let Some(index) = state.vehicles.iter().position(|v| v.id == id) else {
        // The vehicle vanished under the player
        state.player.vehicle = None;
        return;
    };
    let world = &state.world;
    let vehicle = &mut state.vehicles[index];
    if vehicle.broken {
        return;
    }
    vehicle.last_pos = vehicle.pos;

    if vehicle.is_tank() {
        drive_tank(vehicle, input, fs);
    } else {
        drive_car(vehicle, input, fs);
    }
    vehicle.pos += vehicle.forward() * vehicle.speed * fs;
    vehicle.pos = world.bounds.clamp(vehicle.pos, WORLD_HALF_EXTENT - VEHICLE_BOUND);
    state.player.pos = vehicle.pos;

    if vehicle.is_tank() && input.fire {
        fire_tank(state, index);
    }
}

fn drive_car(vehicle: &mut Vehicle, input: &TickInput, fs: f32) {
    let max_speed = if input.boost {
        CAR_MAX_SPEED * BOOST_FACTOR
    } else {
        CAR_MAX_SPEED
    };
    if input.movement.y > 0.0 {
        vehicle.speed = (vehicle.speed + CAR_ACCEL * fs).min(max_speed);
    } else if input.movement.y < 0.0 {
        vehicle.speed = (vehicle.speed - CAR_ACCEL * 0.5 * fs).max(CAR_REVERSE_SPEED);
    } else {
        vehicle.speed *= CAR_DECAY.powf(fs);
        if vehicle.speed.abs() < 0.01 {
            vehicle.speed = 0.0;
        }
    }

    if vehicle.speed.abs() > CAR_STEER_MIN_SPEED {
        vehicle.heading = normalize_angle(vehicle.heading - input.movement.x * CAR_TURN_RATE * fs);
    }
}

fn drive_tank(tank: &mut Vehicle, input: &TickInput, fs: f32) {
    if input.movement.y > 0.0 {
        tank.speed = (tank.speed + TANK_ACCEL * fs).min(TANK_MAX_SPEED);
    } else if input.movement.y < 0.0 {
        tank.speed = (tank.speed - TANK_ACCEL * 0.3 * fs).max(TANK_REVERSE_SPEED);
    } else {
        tank.speed *= TANK_DECAY.powf(fs);
        if tank.speed.abs() < 0.001 {
            tank.speed = 0.0;
        }
    }

    // Tracks turn on the spot
    tank.heading = normalize_angle(tank.heading - input.movement.x * TANK_TURN_RATE * fs);

    if let Some(turret) = tank.turret.as_mut() {
        turret.aim -= input.wheel_delta * TURRET_WHEEL_RATE;
        let diff = turret.aim - turret.yaw;
        if diff.abs() > 0.001 {
            turret.yaw += diff * (1.0 - (1.0 - TURRET_FOLLOW).powf(fs));
        } else {
            turret.yaw = turret.aim;
        }
    }
}

fn fire_tank(state: &mut GameState, index: usize) {
    let now = state.time_ms;
    let tank = &mut state.vehicles[index];
    let heading = tank.heading;
    let Some(turret) = tank.turret.as_mut() else {
        return;
    };
    if !turret.ready(now, TANK_FIRE_COOLDOWN_MS) {
        return;
    }
    turret.last_shot_ms = Some(now);

    let direction = forward_from_heading(turret.world_yaw(heading));
    let origin = tank.pos + Vec3::Y * TANK_MUZZLE_HEIGHT + direction * TANK_MUZZLE_DISTANCE;
    let velocity = direction * TANK_SHELL_SPEED + Vec3::Y * TANK_SHELL_LOFT;
    tank.speed -= TANK_RECOIL;
    let owner = tank.id;

    let id = state.next_entity_id();
    state.projectiles.push(Projectile::player_shell(
        id,
        owner,
        origin,
        velocity,
        TANK_SHELL_GRAVITY,
        TANK_SHELL_DAMAGE,
        TANK_SHELL_RADIUS,
        now,
    ));
    state.events.push(GameEvent::TankFired {
        vehicle: owner,
        from_player: true,
    });
    state.spawn_effect(EffectKind::MuzzleFlash, origin, Vec3::ZERO, 2.0, 0.1);
    for _ in 0..4 {
        let drift = Vec3::new(
            state.rng.random_range(-0.05..0.05),
            0.05,
            state.rng.random_range(-0.05..0.05),
        );
        state.spawn_effect(EffectKind::TankSmoke, origin, drift, 1.0, 1.5);
    }
}

/// Time until the player can fire again (hand weapon or tank gun)
pub fn fire_cooldown_remaining(state: &GameState) -> f64 {
    let now = state.time_ms;
    match state.player_vehicle() {
        Some(v) => v
            .turret
            .and_then(|t| t.last_shot_ms)
            .map_or(0.0, |last| (TANK_FIRE_COOLDOWN_MS - (now - last)).max(0.0)),
        None => state.player.arsenal.cooldown_remaining(now),
    }
}

/// Buy a weapon. On success the weapon is equipped and the shop closes.
pub fn purchase(state: &mut GameState, kind: WeaponKind) -> SimResult<()> {
    let price = kind.price();
    let player = &mut state.player;
    let result = if player.money < price {
        Err(SimError::InsufficientFunds {
            needed: price,
            available: player.money,
        })
    } else if player.arsenal.owns(kind) {
        Err(SimError::AlreadyOwned(kind))
    } else {
        player.money -= price;
        player.arsenal.owned.push(kind);
        player.arsenal.equip(kind);
        Ok(())
    };

    match &result {
        Ok(()) => {
            log::info!("Purchased {} for ${}", kind, price);
            state.events.push(GameEvent::WeaponPurchased { weapon: kind });
            if state.shop_open {
                state.shop_open = false;
                state.events.push(GameEvent::ShopToggled { open: false });
            }
        }
        Err(err) => {
            log::info!("Purchase rejected: {}", err);
            state.events.push(GameEvent::PurchaseRejected {
                weapon: kind,
                reason: err.to_string(),
            });
        }
    }
    result
}
