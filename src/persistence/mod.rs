//! Player save slot
//!
//! The host saves and restores a small snapshot of the player: position,
//! health, money, wanted level, possession flag and arsenal. The city
//! itself is regenerated from the seed, so nothing else is stored.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::consts::PLAYER_START_HEALTH;
use crate::error::{SimError, SimResult};
use crate::sim::escalation::{restore_wanted, WantedLevel};
use crate::sim::player::{release_vehicle, WeaponKind};
use crate::sim::GameState;

/// Plain structured snapshot exchanged with the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSnapshot {
    pub position: Vec3,
    pub health: i32,
    pub money: u32,
    pub wanted_level: WantedLevel,
    pub is_in_vehicle: bool,
    #[serde(default)]
    pub owned_weapons: Vec<WeaponKind>,
    #[serde(default)]
    pub equipped: Option<WeaponKind>,
}

impl SaveSnapshot {
    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> SimResult<Self> {
        let snapshot: SaveSnapshot = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn validate(&self) -> SimResult<()> {
        if !self.position.is_finite() {
            return Err(SimError::InvalidSnapshot("position is not finite".into()));
        }
        if !(0..=PLAYER_START_HEALTH).contains(&self.health) {
            return Err(SimError::InvalidSnapshot(format!(
                "health {} out of range",
                self.health
            )));
        }
        if let Some(weapon) = self.equipped {
            if !self.owned_weapons.contains(&weapon) {
                return Err(SimError::InvalidSnapshot(format!(
                    "equipped {} is not owned",
                    weapon
                )));
            }
        }
        Ok(())
    }
}

/// Capture the player's save slot
pub fn get_state(state: &GameState) -> SaveSnapshot {
    let player = &state.player;
    let position = state.player_vehicle().map_or(player.pos, |v| v.pos);
    SaveSnapshot {
        position,
        health: player.health,
        money: player.money,
        wanted_level: player.wanted,
        is_in_vehicle: player.in_vehicle(),
        owned_weapons: player.arsenal.owned.clone(),
        equipped: player.arsenal.equipped,
    }
}

/// Apply a save slot.
///
/// A snapshot that says "on foot" takes the player out of any vehicle. One
/// that says "in vehicle" while the player is on foot cannot name a vehicle
/// to enter, so the flag is ignored and the player stays on foot.
pub fn set_state(state: &mut GameState, snapshot: &SaveSnapshot) -> SimResult<()> {
    snapshot.validate()?;

    if !snapshot.is_in_vehicle {
        if let Some(id) = state.player.vehicle() {
            release_vehicle(state, id);
        }
    }

    match state.player.vehicle() {
        Some(id) => {
            if let Some(vehicle) = state.vehicle_mut(id) {
                vehicle.pos = Vec3::new(snapshot.position.x, 0.0, snapshot.position.z);
                vehicle.last_pos = vehicle.pos;
            }
            state.player.pos = snapshot.position;
        }
        None => {
            state.player.pos = snapshot.position;
            state.player.on_ground = snapshot.position.y <= 0.0;
        }
    }

    let player = &mut state.player;
    player.velocity = Vec3::ZERO;
    player.health = snapshot.health;
    player.money = snapshot.money;
    player.apprehension_since_ms = None;
    player.arsenal.owned = snapshot.owned_weapons.clone();
    player.arsenal.equipped = snapshot.equipped;

    restore_wanted(state, snapshot.wanted_level);
    log::info!(
        "Restored save: ${}, wanted {}",
        snapshot.money,
        snapshot.wanted_level.get()
    );
    Ok(())
}

/// LocalStorage key (used only in wasm32)
#[allow(dead_code)]
const STORAGE_KEY: &str = "street_sim_save";

/// Save the slot to LocalStorage (WASM only)
#[cfg(target_arch = "wasm32")]
pub fn save(state: &GameState) -> SimResult<()> {
    let storage = web_sys::window()
        .and_then(|w| w.local_storage().ok())
        .flatten()
        .ok_or_else(|| SimError::Storage("LocalStorage unavailable".into()))?;
    let json = get_state(state).to_json()?;
    storage
        .set_item(STORAGE_KEY, &json)
        .map_err(|_| SimError::Storage("write rejected".into()))?;
    log::info!("Game saved");
    Ok(())
}

/// Load the slot from LocalStorage (WASM only)
#[cfg(target_arch = "wasm32")]
pub fn load() -> SimResult<Option<SaveSnapshot>> {
    let Some(storage) = web_sys::window()
        .and_then(|w| w.local_storage().ok())
        .flatten()
    else {
        return Ok(None);
    };
    match storage.get_item(STORAGE_KEY) {
        Ok(Some(json)) => SaveSnapshot::from_json(&json).map(Some),
        Ok(None) => Ok(None),
        Err(_) => Err(SimError::Storage("read rejected".into())),
    }
}

/// Native stubs
#[cfg(not(target_arch = "wasm32"))]
pub fn save(_state: &GameState) -> SimResult<()> {
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
pub fn load() -> SimResult<Option<SaveSnapshot>> {
    Ok(None)
}
