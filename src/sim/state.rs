//! Game state and entity registry
//!
//! Every live entity is owned here, in vectors kept sorted by id so the
//! update order is stable from tick to tick. Cross-entity links are plain
//! ids and are resolved through lookups that tolerate dangling references.

use std::collections::VecDeque;

use glam::Vec3;
use rand::Rng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::pedestrian::Pedestrian;
use super::player::{Camera, Player, WeaponKind};
use super::projectile::Projectile;
use super::vehicle::Vehicle;
use super::world::World;
use crate::settings::Settings;

/// Stable identifier shared by all dynamic entities
pub type EntityId = u32;

/// Seed and stream the simulation RNG was created from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState {
    pub seed: u64,
    pub stream: u64,
}

impl RngState {
    pub fn new(seed: u64) -> Self {
        Self { seed, stream: 0 }
    }

    pub fn to_rng(&self) -> Pcg32 {
        Pcg32::new(self.seed, self.stream)
    }
}

/// Short-lived visual effect kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    MuzzleFlash,
    Explosion,
    /// Rising smoke from wrecks
    Smoke,
    /// Exhaust puff from a tank shot
    TankSmoke,
}

/// A visual effect (never gameplay-affecting)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Effect {
    pub id: EntityId,
    pub kind: EffectKind,
    pub pos: Vec3,
    pub velocity: Vec3,
    pub size: f32,
    /// Remaining life in seconds
    pub life: f32,
    pub max_life: f32,
}

impl Effect {
    /// 0 when fresh, 1 when about to vanish
    pub fn age_fraction(&self) -> f32 {
        if self.max_life <= 0.0 {
            1.0
        } else {
            1.0 - (self.life / self.max_life).clamp(0.0, 1.0)
        }
    }
}

/// Gameplay events raised during a tick, drained by the host (HUD, audio)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    WantedLevelChanged { level: u8 },
    Arrested,
    Released,
    VehicleEntered { vehicle: EntityId },
    VehicleExited { vehicle: EntityId },
    /// Thrown out of a vehicle that was wrecked under the player
    Ejected { vehicle: EntityId },
    Respawned,
    WeaponPurchased { weapon: WeaponKind },
    PurchaseRejected { weapon: WeaponKind, reason: String },
    WeaponFired { weapon: WeaponKind },
    TankFired { vehicle: EntityId, from_player: bool },
    Explosion { pos: Vec3, radius: f32 },
    PedestrianKilled { pedestrian: EntityId, by_player: bool },
    VehicleDestroyed { vehicle: EntityId },
    ShopToggled { open: bool },
}

/// A vehicle brushed past a pedestrian; the pedestrian steps aside next tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NearMiss {
    pub pedestrian: EntityId,
    /// Position of the vehicle at the time
    pub from: Vec3,
    /// Sidestep distance
    pub push: f32,
}

/// Level-of-detail bookkeeping carried between ticks
#[derive(Debug, Clone, Default)]
pub struct LodState {
    /// Impostor pedestrians waiting to be restored to full detail
    pub pedestrian_restores: VecDeque<EntityId>,
    /// Low-detail buildings waiting to be restored to full detail
    pub building_restores: VecDeque<usize>,
    /// Ticks since the last building LOD pass
    pub frame: u32,
}

/// Complete simulation state
#[derive(Debug, Clone)]
pub struct GameState {
    /// Run seed for reproducibility
    pub seed: u64,
    /// RNG origin
    pub rng_state: RngState,
    /// Live RNG; all randomness in the simulation draws from here
    pub rng: Pcg32,
    pub settings: Settings,
    pub world: World,
    /// Simulation clock in milliseconds
    pub time_ms: f64,
    /// Simulation tick counter
    pub time_ticks: u64,
    pub player: Player,
    pub camera: Camera,
    /// Free-roaming pedestrians (sorted by id)
    pub pedestrians: Vec<Pedestrian>,
    /// Traffic, police and tanks (sorted by id)
    pub vehicles: Vec<Vehicle>,
    /// Bullets, rockets and shells in flight (sorted by id)
    pub projectiles: Vec<Projectile>,
    pub effects: Vec<Effect>,
    /// Events raised since the host last drained them
    pub events: Vec<GameEvent>,
    /// Pedestrians to sidestep on their next update
    pub near_misses: Vec<NearMiss>,
    pub lod: LodState,
    /// Weapon shop menu is open
    pub shop_open: bool,
    next_id: EntityId,
}

impl GameState {
    /// Generated city with the default population
    pub fn new(seed: u64) -> Self {
        Self::with_settings(seed, Settings::default())
    }

    /// Generated city using the given settings
    pub fn with_settings(seed: u64, settings: Settings) -> Self {
        let mut state = Self::with_world(World::generate(seed), settings, seed);
        state.populate();
        state
    }

    /// Empty state on a prebuilt world; nothing is spawned
    pub fn with_world(world: World, settings: Settings, seed: u64) -> Self {
        let rng_state = RngState::new(seed);
        let camera = Camera::new(settings.effective_camera_distance());
        Self {
            seed,
            rng_state,
            rng: rng_state.to_rng(),
            settings,
            world,
            time_ms: 0.0,
            time_ticks: 0,
            player: Player::new(),
            camera,
            pedestrians: Vec::new(),
            vehicles: Vec::new(),
            projectiles: Vec::new(),
            effects: Vec::new(),
            events: Vec::new(),
            near_misses: Vec::new(),
            lod: LodState::default(),
            shop_open: false,
            next_id: 1,
        }
    }

    /// Spawn the configured pedestrians and civilian traffic
    pub fn populate(&mut self) {
        if !self.world.paths().is_empty() {
            for _ in 0..self.settings.pedestrian_count {
                let id = self.next_entity_id();
                let path = self.rng.random_range(0..self.world.paths().len());
                let ped = Pedestrian::spawn(id, &self.world, path, &mut self.rng);
                self.pedestrians.push(ped);
            }
        }

        let traffic = self.settings.traffic_count.min(self.world.segments().len());
        for _ in 0..traffic {
            let id = self.next_entity_id();
            let driver_id = self.next_entity_id();
            if let Some(vehicle) =
                Vehicle::spawn_traffic(id, driver_id, &self.world, &mut self.rng)
            {
                self.vehicles.push(vehicle);
            }
        }

        log::info!(
            "Populated city: {} pedestrians, {} vehicles",
            self.pedestrians.len(),
            self.vehicles.len()
        );
    }

    /// Allocate a new entity ID
    pub fn next_entity_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Ensure entities are sorted by ID for deterministic iteration
    pub fn normalize_order(&mut self) {
        self.pedestrians.sort_by_key(|p| p.id);
        self.vehicles.sort_by_key(|v| v.id);
        self.projectiles.sort_by_key(|p| p.id);
        self.effects.sort_by_key(|e| e.id);
    }

    pub fn pedestrian(&self, id: EntityId) -> Option<&Pedestrian> {
        self.pedestrians.iter().find(|p| p.id == id)
    }

    pub fn pedestrian_mut(&mut self, id: EntityId) -> Option<&mut Pedestrian> {
        self.pedestrians.iter_mut().find(|p| p.id == id)
    }

    pub fn vehicle(&self, id: EntityId) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    pub fn vehicle_mut(&mut self, id: EntityId) -> Option<&mut Vehicle> {
        self.vehicles.iter_mut().find(|v| v.id == id)
    }

    /// The vehicle the player is driving, if it still exists
    pub fn player_vehicle(&self) -> Option<&Vehicle> {
        self.player.vehicle().and_then(|id| self.vehicle(id))
    }

    /// Queue a visual effect, respecting the quality preset's cap
    pub fn spawn_effect(
        &mut self,
        kind: EffectKind,
        pos: Vec3,
        velocity: Vec3,
        size: f32,
        life: f32,
    ) {
        if self.effects.len() >= self.settings.quality.max_effects() {
            return;
        }
        let id = self.next_entity_id();
        self.effects.push(Effect {
            id,
            kind,
            pos,
            velocity,
            size,
            life,
            max_life: life,
        });
    }

    /// Drain events raised since the last call
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// At most one vehicle is player-driven, it is the one the player
    /// references, and it has no AI driver.
    pub fn possession_is_consistent(&self) -> bool {
        let driven: Vec<&Vehicle> = self.vehicles.iter().filter(|v| v.player_driven).collect();
        match (self.player.vehicle(), driven.as_slice()) {
            (None, []) => true,
            (Some(id), [v]) => v.id == id && v.driver.is_none(),
            _ => false,
        }
    }
}
