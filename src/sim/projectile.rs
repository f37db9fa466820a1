//! Projectile flight and hit detection
//!
//! Projectiles only detect what they hit. The consequences (damage, kills,
//! explosions, wanted level) are applied by the escalation resolver from the
//! returned [`Impact`] list.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::collision::cylinder_contains;
use super::state::{EntityId, GameState};
use super::vehicle::Vehicle;
use crate::consts::BASELINE_FPS;
use crate::heading_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectileKind {
    Bullet,
    Rocket,
    /// Tank round
    Shell,
}

/// Who fired a projectile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attribution {
    pub from_player: bool,
    pub from_ai: bool,
    pub from_tank: bool,
    /// Vehicle that fired it; never hit by its own round
    pub owner: Option<EntityId>,
}

/// A projectile in flight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projectile {
    pub id: EntityId,
    pub kind: ProjectileKind,
    pub pos: Vec3,
    /// Units per 1/60 s frame
    pub velocity: Vec3,
    /// Downward acceleration per frame (0 for bullets)
    pub gravity: f32,
    /// Damage to pedestrians
    pub damage: i32,
    /// Damage to vehicle health
    pub vehicle_damage: i32,
    pub explosive: bool,
    /// Visual explosion radius
    pub explosion_radius: f32,
    pub created_ms: f64,
    pub attribution: Attribution,
    /// Render orientation derived from velocity
    pub yaw: f32,
    pub pitch: f32,
}

impl Projectile {
    fn launch(
        id: EntityId,
        kind: ProjectileKind,
        pos: Vec3,
        velocity: Vec3,
        now_ms: f64,
        attribution: Attribution,
    ) -> Self {
        let mut projectile = Self {
            id,
            kind,
            pos,
            velocity,
            gravity: 0.0,
            damage: 0,
            vehicle_damage: 0,
            explosive: false,
            explosion_radius: 0.0,
            created_ms: now_ms,
            attribution,
            yaw: 0.0,
            pitch: 0.0,
        };
        projectile.orient();
        projectile
    }

    /// Straight-flying player bullet
    pub fn bullet(
        id: EntityId,
        pos: Vec3,
        velocity: Vec3,
        damage: i32,
        vehicle_damage: i32,
        now_ms: f64,
    ) -> Self {
        let mut p = Self::launch(
            id,
            ProjectileKind::Bullet,
            pos,
            velocity,
            now_ms,
            Attribution {
                from_player: true,
                ..Default::default()
            },
        );
        p.damage = damage;
        p.vehicle_damage = vehicle_damage;
        p
    }

    /// Player rocket: arcing and explosive
    pub fn rocket(
        id: EntityId,
        pos: Vec3,
        velocity: Vec3,
        gravity: f32,
        damage: i32,
        explosion_radius: f32,
        now_ms: f64,
    ) -> Self {
        let mut p = Self::launch(
            id,
            ProjectileKind::Rocket,
            pos,
            velocity,
            now_ms,
            Attribution {
                from_player: true,
                ..Default::default()
            },
        );
        p.gravity = gravity;
        p.damage = damage;
        p.vehicle_damage = damage;
        p.explosive = true;
        p.explosion_radius = explosion_radius;
        p
    }

    /// Shell from a player-driven tank
    #[allow(clippy::too_many_arguments)]
    pub fn player_shell(
        id: EntityId,
        owner: EntityId,
        pos: Vec3,
        velocity: Vec3,
        gravity: f32,
        damage: i32,
        explosion_radius: f32,
        now_ms: f64,
    ) -> Self {
        let mut p = Self::launch(
            id,
            ProjectileKind::Shell,
            pos,
            velocity,
            now_ms,
            Attribution {
                from_player: true,
                from_ai: false,
                from_tank: true,
                owner: Some(owner),
            },
        );
        p.gravity = gravity;
        p.damage = damage;
        p.vehicle_damage = damage;
        p.explosive = true;
        p.explosion_radius = explosion_radius;
        p
    }

    /// Flat-trajectory shell from an AI tank
    pub fn ai_shell(id: EntityId, owner: EntityId, pos: Vec3, velocity: Vec3, now_ms: f64) -> Self {
        let mut p = Self::launch(
            id,
            ProjectileKind::Shell,
            pos,
            velocity,
            now_ms,
            Attribution {
                from_player: false,
                from_ai: true,
                from_tank: true,
                owner: Some(owner),
            },
        );
        p.damage = 100;
        p.vehicle_damage = 100;
        p
    }

    /// Bullets chip at health; rockets and shells destroy on contact
    pub fn is_instant_kill(&self) -> bool {
        !matches!(self.kind, ProjectileKind::Bullet)
    }

    fn orient(&mut self) {
        let speed = self.velocity.length();
        if speed > 1e-6 {
            self.yaw = heading_of(self.velocity);
            self.pitch = (self.velocity.y / speed).clamp(-1.0, 1.0).asin();
        }
    }
}

/// What a projectile ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactTarget {
    Ground,
    Pedestrian(EntityId),
    Vehicle(EntityId),
    Tank(EntityId),
    Building(usize),
}

/// A hit, handed to the resolver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    pub point: Vec3,
    pub target: ImpactTarget,
    pub kind: ProjectileKind,
    pub damage: i32,
    pub vehicle_damage: i32,
    pub explosive: bool,
    pub explosion_radius: f32,
    pub attribution: Attribution,
}

impl Impact {
    fn new(projectile: &Projectile, point: Vec3, target: ImpactTarget) -> Self {
        Self {
            point,
            target,
            kind: projectile.kind,
            damage: projectile.damage,
            vehicle_damage: projectile.vehicle_damage,
            explosive: projectile.explosive,
            explosion_radius: projectile.explosion_radius,
            attribution: projectile.attribution,
        }
    }
}

/// Pedestrian hit cylinder
const PEDESTRIAN_HIT_RADIUS: f32 = 0.6;
const PEDESTRIAN_HIT_HEIGHT: f32 = 2.8;
/// Distance-squared thresholds around a vehicle's centre
const VEHICLE_HIT_RADIUS_SQ: f32 = 9.0;
const TANK_HIT_RADIUS_SQ: f32 = 12.25;
/// Longest stretch of a tick's flight tested as one point
const SWEEP_STEP: f32 = 0.5;

/// Integrate all projectiles, drop expired ones, and report hits.
///
/// A projectile is consumed by its first hit; only one impact per projectile
/// per tick.
pub fn update_projectiles(state: &mut GameState, dt: f32) -> Vec<Impact> {
    let frame_scale = dt * BASELINE_FPS;
    let now = state.time_ms;
    let ttl = state.settings.tuning.projectile_ttl_ms;
    let GameState {
        projectiles,
        pedestrians,
        vehicles,
        world,
        ..
    } = state;

    let mut impacts = Vec::new();
    projectiles.retain_mut(|p| {
        if now - p.created_ms >= ttl {
            return false;
        }

        if p.gravity != 0.0 {
            p.velocity.y -= p.gravity * frame_scale;
        }
        p.orient();

        let start = p.pos;
        let travel = p.velocity * frame_scale;
        let samples = ((travel.length() / SWEEP_STEP).ceil() as usize).max(1);
        for i in 1..=samples {
            let point = start + travel * (i as f32 / samples as f32);
            if let Some(target) = hit_test(p, point, pedestrians, vehicles, world) {
                impacts.push(Impact::new(p, point, target));
                return false;
            }
        }
        p.pos = start + travel;
        true
    });
    impacts
}

fn hit_test(
    p: &Projectile,
    point: Vec3,
    pedestrians: &[super::pedestrian::Pedestrian],
    vehicles: &[Vehicle],
    world: &super::world::World,
) -> Option<ImpactTarget> {
    if point.y <= 0.0 {
        return Some(ImpactTarget::Ground);
    }

    if let Some(ped) = pedestrians.iter().find(|ped| {
        !ped.is_dead()
            && cylinder_contains(ped.pos, PEDESTRIAN_HIT_RADIUS, PEDESTRIAN_HIT_HEIGHT, point)
    }) {
        return Some(ImpactTarget::Pedestrian(ped.id));
    }

    let not_owner = |v: &&Vehicle| p.attribution.owner != Some(v.id);

    if let Some(v) = vehicles
        .iter()
        .filter(|v| !v.is_tank())
        .filter(not_owner)
        .find(|v| v.hit_center().distance_squared(point) < VEHICLE_HIT_RADIUS_SQ)
    {
        return Some(ImpactTarget::Vehicle(v.id));
    }

    if let Some(v) = vehicles
        .iter()
        .filter(|v| v.is_tank())
        .filter(not_owner)
        .find(|v| v.hit_center().distance_squared(point) < TANK_HIT_RADIUS_SQ)
    {
        return Some(ImpactTarget::Tank(v.id));
    }

    world.building_at(point).map(ImpactTarget::Building)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;
    use crate::sim::pedestrian::Pedestrian;
    use crate::sim::vehicle::VehicleKind;
    use crate::sim::world::{World, WorldLayout};
    use crate::sim::collision::Aabb;

    fn bare_state(buildings: Vec<Aabb>) -> GameState {
        GameState::with_world(
            World::from_layout(WorldLayout {
                buildings,
                ..Default::default()
            }),
            crate::Settings::default(),
            9,
        )
    }

    fn fire(state: &mut GameState, pos: Vec3, velocity: Vec3) -> EntityId {
        let id = state.next_entity_id();
        let now = state.time_ms;
        state
            .projectiles
            .push(Projectile::bullet(id, pos, velocity, 34, 25, now));
        id
    }

    #[test]
    fn test_expires_exactly_at_ttl() {
        let mut state = bare_state(Vec::new());
        // Straight up into empty sky
        fire(&mut state, Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, 0.01, 0.0));

        state.time_ms = 4999.0;
        assert!(update_projectiles(&mut state, SIM_DT).is_empty());
        assert_eq!(state.projectiles.len(), 1);

        state.time_ms = 5000.0;
        assert!(update_projectiles(&mut state, SIM_DT).is_empty());
        assert!(state.projectiles.is_empty());
    }

    #[test]
    fn test_gravity_bends_rocket_into_ground() {
        let mut state = bare_state(Vec::new());
        let id = state.next_entity_id();
        state.projectiles.push(Projectile::rocket(
            id,
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(0.8, 0.0, 0.0),
            0.008,
            500,
            4.0,
            0.0,
        ));

        let mut impact = None;
        for _ in 0..200 {
            let hits = update_projectiles(&mut state, SIM_DT);
            if let Some(hit) = hits.first() {
                impact = Some(*hit);
                break;
            }
        }
        let impact = impact.unwrap();
        assert_eq!(impact.target, ImpactTarget::Ground);
        assert!(impact.explosive);
        assert!(state.projectiles.is_empty());
    }

    #[test]
    fn test_pedestrian_hit_takes_precedence_over_building() {
        let wall = Aabb::new(Vec3::new(10.0, 0.0, -5.0), Vec3::new(20.0, 10.0, 5.0));
        let mut state = bare_state(vec![wall]);
        let ped_id = state.next_entity_id();
        let mut ped = Pedestrian::spawn(ped_id, &state.world, 0, &mut state.rng);
        ped.pos = Vec3::new(10.2, 0.0, 0.0);
        state.pedestrians.push(ped);

        fire(&mut state, Vec3::new(8.0, 1.5, 0.0), Vec3::new(2.0, 0.0, 0.0));
        let hits = update_projectiles(&mut state, SIM_DT);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target, ImpactTarget::Pedestrian(ped_id));
    }

    #[test]
    fn test_fast_bullet_does_not_tunnel() {
        let mut state = bare_state(Vec::new());
        let ped_id = state.next_entity_id();
        let mut ped = Pedestrian::spawn(ped_id, &state.world, 0, &mut state.rng);
        ped.pos = Vec3::new(51.0, 0.0, 0.0);
        state.pedestrians.push(ped);

        // Lands at x = 52 after one tick, straight through the body
        fire(&mut state, Vec3::new(50.0, 1.5, 0.0), Vec3::new(2.0, 0.0, 0.0));
        let hits = update_projectiles(&mut state, SIM_DT);
        assert_eq!(hits.first().map(|h| h.target), Some(ImpactTarget::Pedestrian(ped_id)));
    }

    #[test]
    fn test_tank_shell_never_hits_its_own_tank() {
        let mut state = bare_state(Vec::new());
        let tank_id = state.next_entity_id();
        state
            .vehicles
            .push(Vehicle::new(tank_id, VehicleKind::Tank, Vec3::new(0.0, 0.0, 0.0), 0.0));

        let id = state.next_entity_id();
        state.projectiles.push(Projectile::ai_shell(
            id,
            tank_id,
            Vec3::new(0.0, 1.5, 0.5),
            Vec3::new(0.0, 0.0, 2.0),
            0.0,
        ));
        assert!(update_projectiles(&mut state, SIM_DT).is_empty());
        assert_eq!(state.projectiles.len(), 1);
    }

    #[test]
    fn test_tank_hit_uses_wider_radius() {
        let mut state = bare_state(Vec::new());
        let tank_id = state.next_entity_id();
        state
            .vehicles
            .push(Vehicle::new(tank_id, VehicleKind::Tank, Vec3::new(0.0, 0.0, 0.0), 0.0));
        // 3.2 to the side of the hull centre: outside a car's radius, inside a tank's
        fire(&mut state, Vec3::new(3.2, 1.5, -4.0), Vec3::new(0.0, 0.0, 2.0));
        let mut hits = Vec::new();
        for _ in 0..4 {
            hits.extend(update_projectiles(&mut state, SIM_DT));
        }
        assert_eq!(hits.first().map(|h| h.target), Some(ImpactTarget::Tank(tank_id)));
    }

    #[test]
    fn test_building_hit() {
        let wall = Aabb::new(Vec3::new(10.0, 0.0, -5.0), Vec3::new(20.0, 10.0, 5.0));
        let mut state = bare_state(vec![wall]);
        fire(&mut state, Vec3::new(9.0, 5.0, 0.0), Vec3::new(2.0, 0.0, 0.0));
        let hits = update_projectiles(&mut state, SIM_DT);
        assert_eq!(hits.first().map(|h| h.target), Some(ImpactTarget::Building(0)));
    }
}
