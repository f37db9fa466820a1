//! Read-only views for the host: HUD values and render instances
//!
//! The core never renders. Hosts pull a [`Hud`] for the overlay and a flat
//! buffer of [`InstanceRaw`] records they can upload as-is.

use bytemuck::{Pod, Zeroable};
use serde::Serialize;

use super::pedestrian::{PedestrianKind, PedestrianState, RenderDetail};
use super::player::{fire_cooldown_remaining, CameraMode, WeaponKind};
use super::state::{EffectKind, GameState};
use super::projectile::ProjectileKind;
use super::vehicle::VehicleKind;
use super::world::BuildingDetail;

/// Overlay values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hud {
    pub money: u32,
    pub health: i32,
    pub wanted_stars: u8,
    pub fire_cooldown_remaining_ms: f64,
    pub equipped: Option<WeaponKind>,
    pub owned: Vec<WeaponKind>,
    pub in_vehicle: bool,
    pub in_tank: bool,
    pub jailed: bool,
    /// Seconds until release, when jailed
    pub jail_seconds_left: Option<f64>,
    pub shop_open: bool,
    pub first_person: bool,
}

pub fn hud(state: &GameState) -> Hud {
    let player = &state.player;
    Hud {
        money: player.money,
        health: player.health,
        wanted_stars: player.wanted.get(),
        fire_cooldown_remaining_ms: fire_cooldown_remaining(state),
        equipped: player.arsenal.equipped,
        owned: player.arsenal.owned.clone(),
        in_vehicle: player.in_vehicle(),
        in_tank: state.player_vehicle().is_some_and(|v| v.is_tank()),
        jailed: player.is_jailed(),
        jail_seconds_left: player
            .jail_release_ms
            .map(|t| ((t - state.time_ms) / 1000.0).max(0.0)),
        shop_open: state.shop_open,
        first_person: state.camera.mode == CameraMode::FirstPerson,
    }
}

/// Instance kinds, one range per entity family
pub mod kind {
    pub const PLAYER: u32 = 0;
    pub const PEDESTRIAN_CIVILIAN: u32 = 10;
    pub const PEDESTRIAN_BUSINESSMAN: u32 = 11;
    pub const PEDESTRIAN_TOURIST: u32 = 12;
    pub const SEDAN: u32 = 20;
    pub const SUV: u32 = 21;
    pub const TRUCK: u32 = 22;
    pub const POLICE: u32 = 23;
    pub const TANK: u32 = 24;
    pub const BULLET: u32 = 30;
    pub const ROCKET: u32 = 31;
    pub const SHELL: u32 = 32;
    pub const MUZZLE_FLASH: u32 = 40;
    pub const EXPLOSION: u32 = 41;
    pub const SMOKE: u32 = 42;
    pub const TANK_SMOKE: u32 = 43;
    pub const BUILDING: u32 = 50;
}

/// Instance flag bits
pub mod flags {
    pub const BROKEN: u32 = 1;
    pub const PLAYER_DRIVEN: u32 = 1 << 1;
    pub const IMPOSTOR: u32 = 1 << 2;
    pub const DEAD: u32 = 1 << 3;
    pub const LOW_DETAIL: u32 = 1 << 4;
    pub const PURSUIT: u32 = 1 << 5;
    /// Player hidden (jailed, awaiting respawn, driving or first-person)
    pub const HIDDEN: u32 = 1 << 6;
}

/// One render instance (48 bytes, no padding)
///
/// `extra` depends on the kind:
/// - pedestrians: left leg, right leg, left arm, right arm swing
/// - vehicles: turret world yaw, tilt, speed
/// - projectiles: pitch
/// - effects: size, age fraction
/// - buildings: size x, y, z
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct InstanceRaw {
    pub position: [f32; 3],
    pub yaw: f32,
    pub kind: u32,
    pub flags: u32,
    pub _pad: [u32; 2],
    pub extra: [f32; 4],
}

fn pedestrian_kind(kind: PedestrianKind) -> u32 {
    match kind {
        PedestrianKind::Civilian => kind::PEDESTRIAN_CIVILIAN,
        PedestrianKind::Businessman => kind::PEDESTRIAN_BUSINESSMAN,
        PedestrianKind::Tourist => kind::PEDESTRIAN_TOURIST,
    }
}

fn vehicle_kind(kind: VehicleKind) -> u32 {
    match kind {
        VehicleKind::Sedan => kind::SEDAN,
        VehicleKind::Suv => kind::SUV,
        VehicleKind::Truck => kind::TRUCK,
        VehicleKind::Police => kind::POLICE,
        VehicleKind::Tank => kind::TANK,
    }
}

/// Dynamic entities in a fixed order: player, pedestrians, vehicles,
/// projectiles, effects
pub fn instances(state: &GameState) -> Vec<InstanceRaw> {
    let mut out = Vec::with_capacity(
        1 + state.pedestrians.len()
            + state.vehicles.len()
            + state.projectiles.len()
            + state.effects.len(),
    );

    let player = &state.player;
    let mut player_flags = 0;
    let first_person = state.camera.mode == CameraMode::FirstPerson;
    if !player.is_active() || player.in_vehicle() || first_person {
        player_flags |= flags::HIDDEN;
    }
    out.push(InstanceRaw {
        position: player.pos.to_array(),
        yaw: player.heading,
        kind: kind::PLAYER,
        flags: player_flags,
        ..Default::default()
    });

    for ped in &state.pedestrians {
        let mut f = 0;
        if ped.detail == RenderDetail::Impostor {
            f |= flags::IMPOSTOR;
        }
        if ped.state == PedestrianState::Dead {
            f |= flags::DEAD;
        }
        let pose = &ped.pose;
        let mut position = ped.pos;
        position.y += pose.bob;
        out.push(InstanceRaw {
            position: position.to_array(),
            yaw: ped.heading,
            kind: pedestrian_kind(ped.kind),
            flags: f,
            extra: [pose.left_leg, pose.right_leg, pose.left_arm, pose.right_arm],
            ..Default::default()
        });
    }

    for v in &state.vehicles {
        let mut f = 0;
        if v.broken {
            f |= flags::BROKEN;
        }
        if v.is_player_driven() {
            f |= flags::PLAYER_DRIVEN;
        }
        if v.pursuit {
            f |= flags::PURSUIT;
        }
        let turret_yaw = v
            .turret
            .as_ref()
            .map_or(v.heading, |t| t.world_yaw(v.heading));
        out.push(InstanceRaw {
            position: v.pos.to_array(),
            yaw: v.heading,
            kind: vehicle_kind(v.kind),
            flags: f,
            extra: [turret_yaw, v.tilt, v.speed, 0.0],
            ..Default::default()
        });
    }

    for p in &state.projectiles {
        let kind = match p.kind {
            ProjectileKind::Bullet => kind::BULLET,
            ProjectileKind::Rocket => kind::ROCKET,
            ProjectileKind::Shell => kind::SHELL,
        };
        out.push(InstanceRaw {
            position: p.pos.to_array(),
            yaw: p.yaw,
            kind,
            extra: [p.pitch, 0.0, 0.0, 0.0],
            ..Default::default()
        });
    }

    for e in &state.effects {
        let kind = match e.kind {
            EffectKind::MuzzleFlash => kind::MUZZLE_FLASH,
            EffectKind::Explosion => kind::EXPLOSION,
            EffectKind::Smoke => kind::SMOKE,
            EffectKind::TankSmoke => kind::TANK_SMOKE,
        };
        out.push(InstanceRaw {
            position: e.pos.to_array(),
            kind,
            extra: [e.size, e.age_fraction(), 0.0, 0.0],
            ..Default::default()
        });
    }

    out
}

/// Static buildings; only the detail flag changes between frames
pub fn building_instances(state: &GameState) -> Vec<InstanceRaw> {
    state
        .world
        .buildings()
        .iter()
        .map(|b| {
            let bounds = b.bounds();
            let size = bounds.size();
            InstanceRaw {
                position: bounds.center().to_array(),
                kind: kind::BUILDING,
                flags: match b.detail {
                    BuildingDetail::High => 0,
                    BuildingDetail::Low => flags::LOW_DETAIL,
                },
                extra: [size.x, size.y, size.z, 0.0],
                ..Default::default()
            }
        })
        .collect()
}

/// Instances as raw bytes for a GPU upload
pub fn instance_bytes(instances: &[InstanceRaw]) -> &[u8] {
    bytemuck::cast_slice(instances)
}
