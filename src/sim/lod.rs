//! Distance-based level of detail
//!
//! Demotion is immediate. Promotion back to full detail goes through a FIFO
//! queue drained under a per-tick budget, so a fast camera sweep cannot
//! restore hundreds of entities in one frame.

use std::collections::VecDeque;

use glam::Vec3;

use super::pedestrian::{Pedestrian, RenderDetail};
use super::state::{EntityId, GameState};
use super::world::BuildingDetail;
use crate::settings::QualityPreset;

/// Building bands are re-evaluated this often, in ticks
pub const BUILDING_LOD_INTERVAL: u32 = 30;

/// Update band for a pedestrian, from its squared distance to the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PedestrianBand {
    /// Every tick
    Near,
    /// Every other tick with a doubled step
    Middle,
    /// Impostor, no AI
    Culled,
}

pub fn pedestrian_band(quality: QualityPreset, dist_sq: f32) -> PedestrianBand {
    if dist_sq > quality.pedestrian_cull_range().powi(2) {
        PedestrianBand::Culled
    } else if dist_sq > quality.pedestrian_partial_range().powi(2) {
        PedestrianBand::Middle
    } else {
        PedestrianBand::Near
    }
}

pub fn demote_to_impostor(ped: &mut Pedestrian) {
    if ped.detail != RenderDetail::Impostor {
        ped.detail = RenderDetail::Impostor;
    }
}

/// Queue an impostor for restoration; queued at most once
pub fn request_restore(queue: &mut VecDeque<EntityId>, ped: &mut Pedestrian) {
    if !ped.queued_for_restore {
        ped.queued_for_restore = true;
        queue.push_back(ped.id);
    }
}

/// Restore up to `budget` queued pedestrians. Ids that no longer resolve
/// (removed corpses) and pedestrians that have since drifted into the cull
/// band are dropped without using the budget.
pub fn process_pedestrian_restores(
    queue: &mut VecDeque<EntityId>,
    pedestrians: &mut [Pedestrian],
    budget: usize,
    camera: Option<Vec3>,
    quality: QualityPreset,
) -> usize {
    let mut restored = 0;
    while restored < budget {
        let Some(id) = queue.pop_front() else {
            break;
        };
        let Some(ped) = pedestrians.iter_mut().find(|p| p.id == id) else {
            continue;
        };
        ped.queued_for_restore = false;
        let culled = camera.is_some_and(|cam| {
            pedestrian_band(quality, cam.distance_squared(ped.pos)) == PedestrianBand::Culled
        });
        if culled {
            continue;
        }
        ped.detail = RenderDetail::Full;
        restored += 1;
    }
    restored
}

/// Building pass: bands every `BUILDING_LOD_INTERVAL` ticks, restores every tick
pub fn update_buildings(state: &mut GameState, camera: Vec3) {
    let quality = state.settings.quality;
    let lod = &mut state.lod;
    lod.frame = lod.frame.wrapping_add(1);

    if lod.frame % BUILDING_LOD_INTERVAL == 0 {
        let high_sq = quality.building_high_range().powi(2);
        for (index, building) in state.world.buildings_mut().iter_mut().enumerate() {
            let dist_sq = crate::planar_distance_sq(camera, building.bounds().center());
            if dist_sq > high_sq {
                building.detail = BuildingDetail::Low;
            } else if building.detail == BuildingDetail::Low && !building.queued_for_restore {
                building.queued_for_restore = true;
                lod.building_restores.push_back(index);
            }
        }
    }

    let buildings = state.world.buildings_mut();
    let mut restored = 0;
    while restored < quality.building_restores_per_tick() {
        let Some(index) = lod.building_restores.pop_front() else {
            break;
        };
        let Some(building) = buildings.get_mut(index) else {
            continue;
        };
        building.queued_for_restore = false;
        building.detail = BuildingDetail::High;
        restored += 1;
    }
}
