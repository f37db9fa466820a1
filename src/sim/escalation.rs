//! Collision consequences and the wanted-level state machine
//!
//! Runs after every mover has stepped. Projectile impacts, vehicle contacts
//! and building crashes are turned into deaths, wrecks, ejections and wanted
//! level changes here, and nowhere else.

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::collision::{Aabb, push_direction};
use super::pedestrian::{PedestrianState, PEDESTRIAN_HALF_WIDTH};
use super::player::release_vehicle;
use super::projectile::{Impact, ImpactTarget, ProjectileKind, Attribution};
use super::state::{EffectKind, EntityId, GameEvent, GameState, NearMiss};
use super::vehicle::{clear_pursuit, spawn_pursuit_force, VehicleKind};
use crate::consts::*;

/// Wanted level, always within 0..=5
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct WantedLevel(u8);

impl WantedLevel {
    pub fn get(&self) -> u8 {
        self.0
    }

    /// Returns false when already at the maximum
    fn raise(&mut self) -> bool {
        if self.0 < MAX_WANTED_LEVEL {
            self.0 += 1;
            true
        } else {
            false
        }
    }

    fn clear(&mut self) {
        self.0 = 0;
    }
}

impl TryFrom<u8> for WantedLevel {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        if level <= MAX_WANTED_LEVEL {
            Ok(Self(level))
        } else {
            Err(format!("wanted level {} exceeds {}", level, MAX_WANTED_LEVEL))
        }
    }
}

impl From<WantedLevel> for u8 {
    fn from(level: WantedLevel) -> Self {
        level.0
    }
}

/// Pedestrian contact box height
const PEDESTRIAN_CONTACT_HEIGHT: f32 = 3.0;
/// Contact boxes are grown by this much before testing
const CONTACT_MARGIN: f32 = 0.5;
const BUILDING_MARGIN: f32 = 0.3;
/// Below this a vehicle counts as stationary for contacts
const MOVING_SPEED: f32 = 0.02;
const NEAR_MISS_RANGE: f32 = 1.2;
const NEAR_MISS_PUSH: f32 = 1.5;
const CROSSING_PUSH: f32 = 1.0;
/// Kill reward range in dollars
const KILL_REWARD: (u32, u32) = (250, 750);
/// Wreck smoke interval
const SMOKE_INTERVAL_MS: f64 = 250.0;

/// One wanted level up, with a fresh response force sized for it.
///
/// At the maximum this is a no-op.
pub fn raise_wanted(state: &mut GameState) {
    if !state.player.wanted.raise() {
        return;
    }
    let level = state.player.wanted.get();
    log::info!("Wanted level raised to {}", level);
    state.events.push(GameEvent::WantedLevelChanged { level });
    spawn_pursuit_force(state, level);
}

/// Restore a saved wanted level, rebuilding the matching response force
pub fn restore_wanted(state: &mut GameState, level: WantedLevel) {
    if state.player.wanted == level {
        return;
    }
    state.player.wanted = level;
    state.events.push(GameEvent::WantedLevelChanged { level: level.get() });
    spawn_pursuit_force(state, level.get());
}

/// Any active police car within `radius` of the player
pub fn police_within(state: &GameState, radius: f32) -> bool {
    let anchor = state.player_vehicle().map_or(state.player.pos, |v| v.pos);
    state.vehicles.iter().any(|v| {
        v.kind == VehicleKind::Police
            && v.pursuit
            && !v.broken
            && crate::planar_distance(v.pos, anchor) < radius
    })
}

/// Jail the player: wanted level and pursuit are cleared, release is timed
pub fn arrest(state: &mut GameState) {
    if let Some(id) = state.player.vehicle() {
        release_vehicle(state, id);
    }
    let now = state.time_ms;
    let player = &mut state.player;
    player.pos = JAIL_POSITION;
    player.velocity = Vec3::ZERO;
    player.on_ground = true;
    player.apprehension_since_ms = None;
    player.respawn_at_ms = None;
    player.jail_release_ms = Some(now + state.settings.tuning.jail_sentence_ms);
    if player.wanted.get() > 0 {
        player.wanted.clear();
        state.events.push(GameEvent::WantedLevelChanged { level: 0 });
    }
    clear_pursuit(state);
    state.shop_open = false;
    state.events.push(GameEvent::Arrested);
    log::info!("Player arrested");
}

/// Apply this tick's consequences
pub fn resolve(state: &mut GameState, impacts: Vec<Impact>) {
    for impact in impacts {
        apply_impact(state, &impact);
    }
    player_vehicle_hits_pedestrians(state);
    vehicle_collisions(state);
    player_vehicle_hits_buildings(state);
    traffic_near_misses(state);
    check_apprehension(state);
    run_timers(state);
}

fn apply_impact(state: &mut GameState, impact: &Impact) {
    match impact.target {
        ImpactTarget::Ground | ImpactTarget::Building(_) => {}
        ImpactTarget::Pedestrian(id) => hit_pedestrian(state, id, impact),
        ImpactTarget::Vehicle(id) => hit_vehicle(state, id, impact),
        ImpactTarget::Tank(id) => hit_tank(state, id, impact.kind, impact.attribution),
    }
    if impact.explosive {
        explode(state, impact.point, impact.explosion_radius, impact.attribution);
    }
}

fn hit_pedestrian(state: &mut GameState, id: EntityId, impact: &Impact) {
    let Some(ped) = state.pedestrian_mut(id) else {
        return;
    };
    if ped.is_dead() {
        return;
    }
    if impact.kind == ProjectileKind::Bullet {
        ped.health -= impact.damage;
        if ped.health > 0 {
            return;
        }
        if impact.attribution.from_player {
            let reward = state.rng.random_range(KILL_REWARD.0..=KILL_REWARD.1);
            state.player.money = state.player.money.saturating_add(reward);
            log::info!("Earned ${} for a kill", reward);
        }
    }
    kill_pedestrian(state, id, impact.attribution.from_player);
}

/// Terminal pedestrian transition; player kills raise the wanted level
fn kill_pedestrian(state: &mut GameState, id: EntityId, by_player: bool) {
    let now = state.time_ms;
    let Some(ped) = state.pedestrian_mut(id) else {
        return;
    };
    if ped.is_dead() {
        return;
    }
    ped.kill(now);
    state.events.push(GameEvent::PedestrianKilled {
        pedestrian: id,
        by_player,
    });
    if by_player {
        raise_wanted(state);
    }
}

fn hit_vehicle(state: &mut GameState, id: EntityId, impact: &Impact) {
    let Some(vehicle) = state.vehicle_mut(id) else {
        return;
    };
    if vehicle.broken {
        return;
    }
    let is_player_vehicle = vehicle.player_driven;

    if impact.kind == ProjectileKind::Bullet {
        vehicle.health -= impact.vehicle_damage;
        if vehicle.health <= 0 {
            destroy_vehicle(state, id, EJECT_FROM_CRASH);
        }
        return;
    }

    destroy_vehicle(state, id, EJECT_FROM_CRASH);
    // A tank destroying the player's car costs another star
    if is_player_vehicle && impact.attribution.from_ai {
        raise_wanted(state);
    }
}

/// Direct tank hit: bullets bounce off, heavier rounds follow the tank rules
fn hit_tank(state: &mut GameState, id: EntityId, kind: ProjectileKind, attribution: Attribution) {
    if kind == ProjectileKind::Bullet {
        return;
    }
    apply_tank_rule(state, id, attribution);
}

/// The tank damage table, shared by direct hits and blasts.
///
/// The player's own tank ignores all ordnance. Player tank shells destroy
/// other tanks; anything else only kills the crew and leaves the hull.
fn apply_tank_rule(state: &mut GameState, id: EntityId, attribution: Attribution) {
    let Some(tank) = state.vehicle_mut(id) else {
        return;
    };
    if tank.broken || tank.player_driven {
        return;
    }
    if attribution.from_player && attribution.from_tank {
        log::info!("Tank {} destroyed", id);
        destroy_vehicle(state, id, EJECT_FROM_CRASH);
    } else if !tank.driver_dead {
        tank.driver_dead = true;
        tank.driver = None;
        tank.speed = 0.0;
        log::info!("Tank {} crew killed", id);
    }
}

/// Area damage. The kill radius is the visual radius scaled up to match the
/// fully grown blast.
pub fn explode(state: &mut GameState, center: Vec3, visual_radius: f32, attribution: Attribution) {
    let radius = visual_radius * state.settings.tuning.explosion_radius_multiplier;
    let radius_sq = radius * radius;
    state.events.push(GameEvent::Explosion {
        pos: center,
        radius,
    });
    state.spawn_effect(EffectKind::Explosion, center, Vec3::ZERO, radius, 1.0);

    let victims: Vec<EntityId> = state
        .pedestrians
        .iter()
        .filter(|p| !p.is_dead() && p.pos.distance_squared(center) < radius_sq)
        .map(|p| p.id)
        .collect();
    for id in victims {
        kill_pedestrian(state, id, attribution.from_player);
        if let Some(ped) = state.pedestrian_mut(id) {
            let away = push_direction(center, ped.pos, Vec3::X);
            ped.pos += away * 3.0;
        }
    }

    let caught: Vec<(EntityId, bool)> = state
        .vehicles
        .iter()
        .filter(|v| !v.broken && v.pos.distance_squared(center) < radius_sq)
        .map(|v| (v.id, v.is_tank()))
        .collect();
    for (id, is_tank) in caught {
        if is_tank {
            apply_tank_rule(state, id, attribution);
            continue;
        }
        if let Some(vehicle) = state.vehicle_mut(id) {
            let away = push_direction(center, vehicle.pos, Vec3::X);
            vehicle.pos += away * 2.0;
        }
        destroy_vehicle(state, id, EJECT_FROM_CRASH);
    }
}

/// Knockback applied when thrown from a vehicle: (backward, upward)
type Knockback = (f32, f32);
const EJECT_FROM_CRASH: Knockback = (3.0, 2.0);
const EJECT_FROM_BUILDING: Knockback = (2.0, 1.0);

/// Wreck a vehicle, throwing the player out if they were driving it
fn destroy_vehicle(state: &mut GameState, id: EntityId, knockback: Knockback) {
    let now = state.time_ms;
    let Some(vehicle) = state.vehicle_mut(id) else {
        return;
    };
    if vehicle.broken {
        return;
    }
    vehicle.break_down(now);
    vehicle.driver = None;
    let was_player = vehicle.player_driven;
    state.events.push(GameEvent::VehicleDestroyed { vehicle: id });
    if was_player {
        eject_player(state, id, knockback);
    }
}

/// Throw the player out of a wrecked vehicle and schedule the respawn
fn eject_player(state: &mut GameState, id: EntityId, knockback: Knockback) {
    let now = state.time_ms;
    let Some(vehicle) = state.vehicle_mut(id) else {
        state.player.vehicle = None;
        return;
    };
    vehicle.player_driven = false;
    vehicle.abandoned = true;
    let thrown = -vehicle.forward() * knockback.0 + Vec3::Y * knockback.1;
    let origin = vehicle.pos;

    let player = &mut state.player;
    player.vehicle = None;
    player.pos = origin + thrown;
    player.velocity = thrown;
    player.on_ground = false;
    player.respawn_at_ms = Some(now + state.settings.tuning.respawn_delay_ms);
    state.events.push(GameEvent::Ejected { vehicle: id });
    log::info!("Player ejected from vehicle {}", id);
}

fn pedestrian_box(pos: Vec3) -> Aabb {
    Aabb::from_footprint(
        pos,
        PEDESTRIAN_HALF_WIDTH,
        PEDESTRIAN_HALF_WIDTH,
        PEDESTRIAN_CONTACT_HEIGHT,
    )
}

/// Running someone over is a kill and a wanted level
fn player_vehicle_hits_pedestrians(state: &mut GameState) {
    let Some(vehicle) = state.player_vehicle() else {
        return;
    };
    if vehicle.broken || vehicle.speed.abs() <= MOVING_SPEED {
        return;
    }
    let vehicle_id = vehicle.id;
    let hit_box = vehicle.bounds().expanded(CONTACT_MARGIN);
    let victims: Vec<(EntityId, Vec3)> = state
        .pedestrians
        .iter()
        .filter(|p| !p.is_dead() && hit_box.intersects(&pedestrian_box(p.pos)))
        .map(|p| (p.id, p.pos))
        .collect();

    for (id, ped_pos) in victims {
        log::info!("Pedestrian {} run over", id);
        kill_pedestrian(state, id, true);
        if let Some(vehicle) = state.vehicle_mut(vehicle_id) {
            let back = push_direction(ped_pos, vehicle.pos, -vehicle.forward());
            vehicle.pos += back * 0.5;
        }
    }
}

/// Contacts started by a mover: the player's vehicle, or a pursuing tank
fn vehicle_collisions(state: &mut GameState) {
    let movers: Vec<EntityId> = state
        .vehicles
        .iter()
        .filter(|v| !v.broken && v.speed.abs() > MOVING_SPEED)
        .filter(|v| v.player_driven || (v.is_tank() && v.pursuit && !v.driver_dead))
        .map(|v| v.id)
        .collect();

    for mover_id in movers {
        let Some(mover) = state.vehicle(mover_id) else {
            continue;
        };
        if mover.broken {
            continue;
        }
        let mover_box = mover.bounds().expanded(CONTACT_MARGIN);
        let mover_is_tank = mover.is_tank();
        let mover_pos = mover.pos;
        let hits: Vec<(EntityId, bool)> = state
            .vehicles
            .iter()
            .filter(|o| o.id != mover_id && !o.broken && mover_box.intersects(&o.bounds()))
            .map(|o| (o.id, o.is_tank()))
            .collect();

        for (other_id, other_is_tank) in hits {
            match (mover_is_tank, other_is_tank) {
                // Tanks flatten cars and only lose momentum
                (true, false) => {
                    destroy_vehicle(state, other_id, EJECT_FROM_CRASH);
                    if let Some(tank) = state.vehicle_mut(mover_id) {
                        tank.speed *= 0.5;
                    }
                }
                (false, true) => {
                    destroy_vehicle(state, mover_id, EJECT_FROM_CRASH);
                    if let Some(tank) = state.vehicle_mut(other_id) {
                        tank.speed *= 0.5;
                    }
                }
                (true, true) => {
                    for id in [mover_id, other_id] {
                        if let Some(tank) = state.vehicle_mut(id) {
                            tank.speed *= 0.5;
                        }
                    }
                }
                (false, false) => {
                    let other_pos = state.vehicle(other_id).map_or(mover_pos, |o| o.pos);
                    let apart = push_direction(mover_pos, other_pos, Vec3::X);
                    if let Some(other) = state.vehicle_mut(other_id) {
                        other.pos += apart;
                    }
                    if let Some(mover) = state.vehicle_mut(mover_id) {
                        mover.pos -= apart;
                    }
                    destroy_vehicle(state, other_id, EJECT_FROM_CRASH);
                    destroy_vehicle(state, mover_id, EJECT_FROM_CRASH);
                }
            }
            if state.vehicle(mover_id).is_none_or(|m| m.broken) {
                break;
            }
        }
    }
}

/// Fast crashes wreck the car; slow ones and tanks are just stopped
fn player_vehicle_hits_buildings(state: &mut GameState) {
    let crash_speed = state.settings.tuning.crash_speed;
    let Some(id) = state.player.vehicle() else {
        return;
    };
    let Some(vehicle) = state.vehicle(id) else {
        return;
    };
    if vehicle.broken {
        return;
    }
    let probe = vehicle.bounds().expanded(BUILDING_MARGIN);
    if state.world.building_overlapping(&probe).is_none() {
        return;
    }

    if !vehicle.is_tank() && vehicle.speed.abs() >= crash_speed {
        log::info!("Vehicle {} crashed into a building", id);
        destroy_vehicle(state, id, EJECT_FROM_BUILDING);
        return;
    }
    if let Some(vehicle) = state.vehicle_mut(id) {
        vehicle.pos = vehicle.last_pos;
        vehicle.speed = 0.0;
        let pos = vehicle.pos;
        state.player.pos = pos;
    }
}

/// AI vehicles brushing past pedestrians make them step aside
fn traffic_near_misses(state: &mut GameState) {
    let mut flagged: Vec<NearMiss> = Vec::new();
    for vehicle in state
        .vehicles
        .iter()
        .filter(|v| !v.broken && !v.player_driven && v.speed.abs() > MOVING_SPEED)
    {
        let reach = NEAR_MISS_RANGE + vehicle.kind.proximity_size();
        let forward = vehicle.forward();
        for ped in state.pedestrians.iter().filter(|p| !p.is_dead()) {
            if flagged.iter().any(|m| m.pedestrian == ped.id) {
                continue;
            }
            let dist = crate::planar_distance(vehicle.pos, ped.pos);
            let push = if dist < reach {
                Some(NEAR_MISS_PUSH)
            } else if ped.state == PedestrianState::Crossing
                && dist < reach * 3.0
                && forward.dot(push_direction(vehicle.pos, ped.pos, forward)) > 0.5
            {
                Some(CROSSING_PUSH)
            } else {
                None
            };
            if let Some(push) = push {
                flagged.push(NearMiss {
                    pedestrian: ped.id,
                    from: vehicle.pos,
                    push,
                });
            }
        }
    }
    state.near_misses.extend(flagged);
}

/// Police that stay close to a wanted pedestrian long enough make the arrest
fn check_apprehension(state: &mut GameState) {
    let tuning = &state.settings.tuning;
    let (radius, delay) = (tuning.apprehend_radius, tuning.apprehend_delay_ms);
    if state.player.on_foot_position().is_none() || state.player.wanted.get() == 0 {
        state.player.apprehension_since_ms = None;
        return;
    }
    if !police_within(state, radius) {
        state.player.apprehension_since_ms = None;
        return;
    }
    let now = state.time_ms;
    let since = *state.player.apprehension_since_ms.get_or_insert(now);
    if now - since >= delay {
        arrest(state);
    }
}

/// Corpse and wreck removal, wreck smoke, jail release and respawn
fn run_timers(state: &mut GameState) {
    let now = state.time_ms;
    let tuning = &state.settings.tuning;
    let (corpse_ttl, wreck_ttl) = (tuning.corpse_lifetime_ms, tuning.wreck_lifetime_ms);

    state
        .pedestrians
        .retain(|p| p.died_at_ms.is_none_or(|t| now - t < corpse_ttl));
    state
        .vehicles
        .retain(|v| v.broken_at_ms.is_none_or(|t| now - t < wreck_ttl));

    let smoking: Vec<Vec3> = state
        .vehicles
        .iter_mut()
        .filter(|v| v.broken && now >= v.next_smoke_ms)
        .map(|v| {
            v.next_smoke_ms = now + SMOKE_INTERVAL_MS;
            v.pos + Vec3::Y * v.kind.height()
        })
        .collect();
    for pos in smoking {
        let drift = Vec3::new(
            state.rng.random_range(-0.02..0.02),
            0.04,
            state.rng.random_range(-0.02..0.02),
        );
        state.spawn_effect(EffectKind::Smoke, pos, drift, 1.5, 2.0);
    }

    if state.player.jail_release_ms.is_some_and(|t| now >= t) {
        let player = &mut state.player;
        player.jail_release_ms = None;
        player.pos = RELEASE_POSITION;
        player.velocity = Vec3::ZERO;
        state.events.push(GameEvent::Released);
        log::info!("Player released from jail");
    }

    if state.player.respawn_at_ms.is_some_and(|t| now >= t) {
        let player = &mut state.player;
        player.respawn_at_ms = None;
        player.pos = RELEASE_POSITION;
        player.velocity = Vec3::ZERO;
        player.on_ground = true;
        player.health = PLAYER_START_HEALTH;
        state.events.push(GameEvent::Respawned);
        log::info!("Player respawned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::pedestrian::Pedestrian;
    use crate::sim::player::enter_vehicle;
    use crate::sim::vehicle::Vehicle;
    use crate::sim::world::{World, WorldLayout};
    use proptest::prelude::*;

    fn bare_state() -> GameState {
        let mut state = GameState::with_world(
            World::from_layout(WorldLayout::default()),
            crate::Settings::default(),
            17,
        );
        state.player.pos = Vec3::new(60.0, 0.0, 60.0);
        state
    }

    fn pedestrian_at(state: &mut GameState, pos: Vec3) -> EntityId {
        let id = state.next_entity_id();
        let mut ped = Pedestrian::spawn(id, &state.world, 0, &mut state.rng);
        ped.pos = pos;
        state.pedestrians.push(ped);
        id
    }

    fn vehicle_at(state: &mut GameState, kind: VehicleKind, pos: Vec3) -> EntityId {
        let id = state.next_entity_id();
        state.vehicles.push(Vehicle::new(id, kind, pos, 0.0));
        id
    }

    fn impact(target: ImpactTarget, kind: ProjectileKind, attribution: Attribution) -> Impact {
        Impact {
            point: Vec3::new(0.0, 1.0, 0.0),
            target,
            kind,
            damage: 500,
            vehicle_damage: 500,
            explosive: false,
            explosion_radius: 0.0,
            attribution,
        }
    }

    const PLAYER_ROCKET: Attribution = Attribution {
        from_player: true,
        from_ai: false,
        from_tank: false,
        owner: None,
    };

    fn ai_shell(owner: EntityId) -> Attribution {
        Attribution {
            from_player: false,
            from_ai: true,
            from_tank: true,
            owner: Some(owner),
        }
    }

    fn player_shell(owner: EntityId) -> Attribution {
        Attribution {
            from_player: true,
            from_ai: false,
            from_tank: true,
            owner: Some(owner),
        }
    }

    #[test]
    fn test_wanted_level_saturates_at_five() {
        let mut state = bare_state();
        for _ in 0..6 {
            raise_wanted(&mut state);
        }
        assert_eq!(state.player.wanted.get(), 5);
        let tanks = state.vehicles.iter().filter(|v| v.pursuit).count();
        assert_eq!(tanks, 2);
    }

    #[test]
    fn test_wanted_level_rejects_out_of_range_json() {
        assert!(serde_json::from_str::<WantedLevel>("6").is_err());
        assert_eq!(serde_json::from_str::<WantedLevel>("3").unwrap().get(), 3);
    }

    #[test]
    fn test_bullets_wear_down_pedestrians() {
        let mut state = bare_state();
        let id = pedestrian_at(&mut state, Vec3::new(10.0, 0.0, 10.0));
        let mut shot = impact(ImpactTarget::Pedestrian(id), ProjectileKind::Bullet, PLAYER_ROCKET);
        shot.damage = 34;

        resolve(&mut state, vec![shot, shot]);
        assert!(!state.pedestrian(id).unwrap().is_dead());
        assert_eq!(state.player.wanted.get(), 0);

        resolve(&mut state, vec![shot]);
        assert!(state.pedestrian(id).unwrap().is_dead());
        assert_eq!(state.player.wanted.get(), 1);
        assert!((1250..=1750).contains(&state.player.money));
    }

    #[test]
    fn test_explosion_radius_is_strict() {
        let mut state = bare_state();
        // Visual radius 4 -> effective 10
        let inside = pedestrian_at(&mut state, Vec3::new(9.9, 0.0, 0.0));
        let outside = pedestrian_at(&mut state, Vec3::new(0.0, 0.0, 10.1));
        let edge = pedestrian_at(&mut state, Vec3::new(-10.0, 0.0, 0.0));
        explode(&mut state, Vec3::ZERO, 4.0, PLAYER_ROCKET);
        assert!(state.pedestrian(inside).unwrap().is_dead());
        assert!(!state.pedestrian(outside).unwrap().is_dead());
        assert!(!state.pedestrian(edge).unwrap().is_dead());
    }

    #[test]
    fn test_rocket_blast_kills_three_and_wrecks_car() {
        let mut state = bare_state();
        let peds: Vec<EntityId> = [
            Vec3::new(3.0, 0.0, 0.0),
            Vec3::new(-2.0, 0.0, 4.0),
            Vec3::new(0.0, 0.0, -6.0),
        ]
        .into_iter()
        .map(|p| pedestrian_at(&mut state, p))
        .collect();
        let car = vehicle_at(&mut state, VehicleKind::Sedan, Vec3::new(5.0, 0.0, 5.0));

        let mut rocket = impact(ImpactTarget::Ground, ProjectileKind::Rocket, PLAYER_ROCKET);
        rocket.point = Vec3::ZERO;
        rocket.explosive = true;
        rocket.explosion_radius = 4.0;
        resolve(&mut state, vec![rocket]);

        for id in peds {
            assert_eq!(state.pedestrian(id).unwrap().state, PedestrianState::Dead);
        }
        assert!(state.vehicle(car).unwrap().broken);
    }

    #[test]
    fn test_tank_rule_table() {
        let mut state = bare_state();
        let enemy = vehicle_at(&mut state, VehicleKind::Tank, Vec3::new(100.0, 0.0, 100.0));
        let mine = vehicle_at(&mut state, VehicleKind::Tank, Vec3::new(-100.0, 0.0, -100.0));
        state.vehicle_mut(mine).unwrap().driver_dead = true;
        state.player.pos = Vec3::new(-100.0, 0.0, -100.0);
        assert!(enter_vehicle(&mut state, mine));

        // Player rocket: crew dies, hull survives
        apply_tank_rule(&mut state, enemy, PLAYER_ROCKET);
        let t = state.vehicle(enemy).unwrap();
        assert!(t.driver_dead && !t.broken);

        // AI fire and the player's own shells never touch the player's tank
        apply_tank_rule(&mut state, mine, ai_shell(enemy));
        apply_tank_rule(&mut state, mine, player_shell(mine));
        assert!(!state.vehicle(mine).unwrap().broken);

        // Player tank shell destroys
        apply_tank_rule(&mut state, enemy, player_shell(mine));
        assert!(state.vehicle(enemy).unwrap().broken);
    }

    #[test]
    fn test_bullets_bounce_off_tanks() {
        let mut state = bare_state();
        let tank = vehicle_at(&mut state, VehicleKind::Tank, Vec3::new(10.0, 0.0, 10.0));
        let shot = impact(ImpactTarget::Tank(tank), ProjectileKind::Bullet, PLAYER_ROCKET);
        resolve(&mut state, vec![shot]);
        let t = state.vehicle(tank).unwrap();
        assert!(!t.driver_dead && !t.broken);
    }

    #[test]
    fn test_ai_shell_on_player_car_ejects_and_escalates() {
        let mut state = bare_state();
        let car = vehicle_at(&mut state, VehicleKind::Sedan, Vec3::new(60.0, 0.0, 60.0));
        assert!(enter_vehicle(&mut state, car));

        let hit = impact(ImpactTarget::Vehicle(car), ProjectileKind::Shell, ai_shell(999));
        resolve(&mut state, vec![hit]);

        assert!(state.vehicle(car).unwrap().broken);
        assert!(state.player.vehicle().is_none());
        assert!(state.player.respawn_at_ms.is_some());
        assert_eq!(state.player.wanted.get(), 1);
        assert!(state.possession_is_consistent());
    }

    #[test]
    fn test_running_over_pedestrian_raises_wanted_and_sends_one_cop() {
        let mut state = bare_state();
        let car = vehicle_at(&mut state, VehicleKind::Sedan, Vec3::new(60.0, 0.0, 60.0));
        assert!(enter_vehicle(&mut state, car));
        state.vehicle_mut(car).unwrap().speed = 0.4;
        let ped = pedestrian_at(&mut state, Vec3::new(60.0, 0.0, 64.5));

        resolve(&mut state, Vec::new());
        assert!(state.pedestrian(ped).unwrap().is_dead());
        assert_eq!(state.player.wanted.get(), 1);
        let police = state
            .vehicles
            .iter()
            .filter(|v| v.kind == VehicleKind::Police && v.pursuit)
            .count();
        assert_eq!(police, 1);
    }

    #[test]
    fn test_tank_flattens_car_and_slows() {
        let mut state = bare_state();
        let tank = vehicle_at(&mut state, VehicleKind::Tank, Vec3::new(0.0, 0.0, 0.0));
        state.vehicle_mut(tank).unwrap().driver_dead = true;
        state.player.pos = Vec3::ZERO;
        assert!(enter_vehicle(&mut state, tank));
        state.vehicle_mut(tank).unwrap().speed = 0.15;
        let car = vehicle_at(&mut state, VehicleKind::Sedan, Vec3::new(0.0, 0.0, 9.0));

        resolve(&mut state, Vec::new());
        assert!(state.vehicle(car).unwrap().broken);
        let t = state.vehicle(tank).unwrap();
        assert!(!t.broken);
        assert!((t.speed - 0.075).abs() < 1e-6);
    }

    #[test]
    fn test_car_into_tank_is_wrecked() {
        let mut state = bare_state();
        let car = vehicle_at(&mut state, VehicleKind::Sedan, Vec3::new(0.0, 0.0, 0.0));
        state.player.pos = Vec3::ZERO;
        assert!(enter_vehicle(&mut state, car));
        state.vehicle_mut(car).unwrap().speed = 0.4;
        let tank = vehicle_at(&mut state, VehicleKind::Tank, Vec3::new(0.0, 0.0, 9.0));
        state.vehicle_mut(tank).unwrap().speed = 0.3;

        resolve(&mut state, Vec::new());
        assert!(state.vehicle(car).unwrap().broken);
        let tank = state.vehicle(tank).unwrap();
        assert!(!tank.broken);
        assert!((tank.speed - 0.15).abs() < 1e-6);
        assert!(state.player.vehicle().is_none());
    }

    #[test]
    fn test_car_on_car_breaks_both() {
        let mut state = bare_state();
        let car = vehicle_at(&mut state, VehicleKind::Sedan, Vec3::new(0.0, 0.0, 0.0));
        state.player.pos = Vec3::ZERO;
        assert!(enter_vehicle(&mut state, car));
        state.vehicle_mut(car).unwrap().speed = 0.4;
        let other = vehicle_at(&mut state, VehicleKind::Suv, Vec3::new(0.0, 0.0, 8.0));

        resolve(&mut state, Vec::new());
        assert!(state.vehicle(car).unwrap().broken);
        assert!(state.vehicle(other).unwrap().broken);
    }

    #[test]
    fn test_building_crash_depends_on_speed() {
        let wall = Aabb::new(Vec3::new(-10.0, 0.0, 4.1), Vec3::new(10.0, 10.0, 20.0));
        let mut state = GameState::with_world(
            World::from_layout(WorldLayout {
                buildings: vec![wall],
                ..Default::default()
            }),
            crate::Settings::default(),
            2,
        );
        let car = vehicle_at(&mut state, VehicleKind::Sedan, Vec3::new(0.0, 0.0, 0.0));
        state.player.pos = Vec3::ZERO;
        assert!(enter_vehicle(&mut state, car));
        {
            let v = state.vehicle_mut(car).unwrap();
            v.last_pos = Vec3::new(0.0, 0.0, -0.1);
            v.speed = 0.1;
        }
        resolve(&mut state, Vec::new());
        let v = state.vehicle(car).unwrap();
        assert!(!v.broken);
        assert_eq!(v.pos, Vec3::new(0.0, 0.0, -0.1));
        assert_eq!(v.speed, 0.0);

        state.vehicle_mut(car).unwrap().pos = Vec3::ZERO;
        state.vehicle_mut(car).unwrap().speed = 0.3;
        resolve(&mut state, Vec::new());
        assert!(state.vehicle(car).unwrap().broken);
        assert!(state.player.vehicle().is_none());
    }

    #[test]
    fn test_exit_near_police_while_wanted_means_jail() {
        let mut state = bare_state();
        let car = vehicle_at(&mut state, VehicleKind::Sedan, Vec3::new(60.0, 0.0, 60.0));
        assert!(enter_vehicle(&mut state, car));
        raise_wanted(&mut state);
        raise_wanted(&mut state);
        // Put the dispatched unit 15 units away
        let cop = state
            .vehicles
            .iter_mut()
            .find(|v| v.kind == VehicleKind::Police)
            .unwrap();
        cop.pos = Vec3::new(75.0, 0.0, 60.0);

        crate::sim::player::exit_vehicle(&mut state);
        assert_eq!(state.player.pos, JAIL_POSITION);
        assert_eq!(state.player.wanted.get(), 0);
        assert!(state.vehicles.iter().all(|v| !v.pursuit));
        assert!(state.possession_is_consistent());

        state.time_ms = 10_000.0;
        resolve(&mut state, Vec::new());
        assert_eq!(state.player.pos, RELEASE_POSITION);
        assert!(!state.player.is_jailed());
    }

    #[test]
    fn test_on_foot_apprehension_takes_time() {
        let mut state = bare_state();
        raise_wanted(&mut state);
        let cop = state
            .vehicles
            .iter_mut()
            .find(|v| v.kind == VehicleKind::Police)
            .unwrap();
        cop.pos = state.player.pos + Vec3::new(5.0, 0.0, 0.0);

        resolve(&mut state, Vec::new());
        assert!(!state.player.is_jailed());
        state.time_ms = 3000.0;
        resolve(&mut state, Vec::new());
        assert!(state.player.is_jailed());
    }

    #[test]
    fn test_corpses_and_wrecks_are_removed_on_schedule() {
        let mut state = bare_state();
        let ped = pedestrian_at(&mut state, Vec3::new(10.0, 0.0, 10.0));
        let car = vehicle_at(&mut state, VehicleKind::Sedan, Vec3::new(30.0, 0.0, 30.0));
        state.pedestrian_mut(ped).unwrap().kill(0.0);
        state.vehicle_mut(car).unwrap().break_down(0.0);

        state.time_ms = 9_999.0;
        resolve(&mut state, Vec::new());
        assert!(state.vehicle(car).is_some());
        assert!(state.effects.iter().any(|e| e.kind == EffectKind::Smoke));

        state.time_ms = 10_000.0;
        resolve(&mut state, Vec::new());
        assert!(state.vehicle(car).is_none());
        assert!(state.pedestrian(ped).is_some());

        state.time_ms = 30_000.0;
        resolve(&mut state, Vec::new());
        assert!(state.pedestrian(ped).is_none());
    }

    #[test]
    fn test_traffic_near_miss_is_flagged() {
        let mut state = bare_state();
        let car = vehicle_at(&mut state, VehicleKind::Sedan, Vec3::new(0.0, 0.0, 0.0));
        state.vehicle_mut(car).unwrap().speed = 0.3;
        let ped = pedestrian_at(&mut state, Vec3::new(2.5, 0.0, 0.0));
        resolve(&mut state, Vec::new());
        assert_eq!(state.near_misses.len(), 1);
        assert_eq!(state.near_misses[0].pedestrian, ped);
        assert!(!state.pedestrian(ped).unwrap().is_dead());
    }

    proptest! {
        #[test]
        fn prop_wanted_level_bounded(raises in 0usize..20, arrest_at in proptest::option::of(0usize..20)) {
            let mut state = bare_state();
            for i in 0..raises {
                if Some(i) == arrest_at {
                    arrest(&mut state);
                }
                raise_wanted(&mut state);
                prop_assert!(state.player.wanted.get() <= MAX_WANTED_LEVEL);
            }
            let expected = match arrest_at {
                Some(i) if i < raises => (raises - i).min(5),
                _ => raises.min(5),
            };
            prop_assert_eq!(state.player.wanted.get() as usize, expected);
        }
    }
}
