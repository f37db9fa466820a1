//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by entity ID)
//! - No rendering or platform dependencies

pub mod collision;
pub mod escalation;
pub mod lod;
pub mod pedestrian;
pub mod player;
pub mod projectile;
pub mod state;
pub mod tick;
pub mod vehicle;
pub mod view;
pub mod world;

pub use collision::Aabb;
pub use escalation::WantedLevel;
pub use pedestrian::{Pedestrian, PedestrianKind, PedestrianState};
pub use player::{Camera, CameraMode, Player, WeaponKind, enter_vehicle, exit_vehicle, purchase};
pub use projectile::{Projectile, ProjectileKind};
pub use state::{EntityId, GameEvent, GameState};
pub use tick::{FrameStepper, TickInput, tick};
pub use vehicle::{Vehicle, VehicleKind};
pub use view::{Hud, InstanceRaw, hud, instances};
pub use world::{World, WorldLayout};
