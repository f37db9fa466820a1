//! Game settings and gameplay tuning
//!
//! Persisted separately from the save snapshot in LocalStorage. The `Tuning`
//! block collects every playtested threshold the AI and escalation code
//! reads, so none of them are hard-wired into the update logic.

use serde::{Deserialize, Serialize};

/// Quality preset levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(not(target_arch = "wasm32"), derive(clap::ValueEnum))]
pub enum QualityPreset {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityPreset::Low => "Low",
            QualityPreset::Medium => "Medium",
            QualityPreset::High => "High",
        }
    }

    /// Pedestrians closer than this to the camera are animated every tick
    pub fn pedestrian_full_range(&self) -> f32 {
        match self {
            QualityPreset::Low => 40.0,
            QualityPreset::Medium => 60.0,
            QualityPreset::High => 80.0,
        }
    }

    /// Pedestrians past this range (and inside the cull range) update every other tick
    pub fn pedestrian_partial_range(&self) -> f32 {
        match self {
            QualityPreset::Low => 80.0,
            QualityPreset::Medium => 120.0,
            QualityPreset::High => 160.0,
        }
    }

    /// Pedestrians past this distance become impostors and stop thinking
    pub fn pedestrian_cull_range(&self) -> f32 {
        match self {
            QualityPreset::Low => 140.0,
            QualityPreset::Medium => 200.0,
            QualityPreset::High => 280.0,
        }
    }

    /// Impostor-to-full restorations processed per tick
    pub fn pedestrian_restores_per_tick(&self) -> usize {
        match self {
            QualityPreset::Low => 6,
            QualityPreset::Medium => 12,
            QualityPreset::High => 24,
        }
    }

    /// Buildings closer than this render at full detail, the rest drop to low
    pub fn building_high_range(&self) -> f32 {
        match self {
            QualityPreset::Low => 70.0,
            QualityPreset::Medium => 100.0,
            QualityPreset::High => 150.0,
        }
    }

    /// Low-to-high building restorations processed per tick
    pub fn building_restores_per_tick(&self) -> usize {
        match self {
            QualityPreset::Low => 3,
            QualityPreset::Medium => 6,
            QualityPreset::High => 12,
        }
    }

    /// Maximum live effect entities (smoke, flashes, explosions)
    pub fn max_effects(&self) -> usize {
        match self {
            QualityPreset::Low => 64,
            QualityPreset::Medium => 256,
            QualityPreset::High => 512,
        }
    }
}

/// Empirical gameplay thresholds.
///
/// Distances are world units, speeds are per 1/60 s frame, times are
/// milliseconds of simulation clock unless the name says otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    // === Pedestrians ===
    /// Per-tick chance a walking pedestrian stops to idle
    pub ped_idle_chance: f32,
    /// Idle dwell range in seconds
    pub ped_idle_min_secs: f32,
    pub ped_idle_max_secs: f32,
    /// Distance to the path end that counts as arrival
    pub ped_arrival_distance: f32,
    /// Chance to cross the road on arrival instead of respawning
    pub ped_cross_chance: f32,
    /// How far to look for a perpendicular road to cross
    pub ped_cross_search_distance: f32,
    /// Movement multiplier while crossing
    pub ped_cross_speed_factor: f32,
    /// Distance to the far-side target that ends a crossing
    pub ped_cross_arrival: f32,
    /// Blocked pedestrians pick a new target after this long
    pub ped_stuck_timeout_ms: f64,
    /// Corpses are removed after this long
    pub corpse_lifetime_ms: f64,
    /// Radius around the player in which pedestrians may turn to look
    pub ped_notice_radius: f32,
    /// Per-tick chance a nearby pedestrian stops to look at the player
    pub ped_notice_chance: f32,

    // === Traffic ===
    /// Forward distance at which a vehicle stops for an obstacle
    pub stop_distance: f32,
    /// Lateral distance from the heading axis that counts as "in lane"
    pub lane_threshold: f32,
    /// Extra clearance required before a stopped vehicle resumes
    pub resume_margin: f32,
    /// Hard deadlock breaker for stopped vehicles
    pub stop_timeout_ms: f64,
    /// Distance to the segment end that counts as arrival
    pub segment_arrival: f32,
    /// Search radius for the next segment's start point
    pub segment_search_radius: f32,
    /// Maximum heading change per tick
    pub vehicle_turn_rate: f32,
    /// Wrecks are removed after this long
    pub wreck_lifetime_ms: f64,
    /// Player vehicles hitting a building at this speed or faster are wrecked
    pub crash_speed: f32,

    // === Pursuit ===
    /// Police speed relative to civilian traffic
    pub police_speed_factor: f32,
    /// Distance at which police stop approaching
    pub police_standoff: f32,
    /// Distance at which tanks stop approaching
    pub tank_standoff: f32,
    /// Tanks only fire inside this range
    pub tank_fire_range: f32,
    /// Reload time for AI tanks
    pub tank_fire_cooldown_ms: f64,
    /// Turret traverse per tick
    pub turret_turn_rate: f32,
    /// Police this close to a wanted pedestrian start an arrest
    pub apprehend_radius: f32,
    /// How long police must stay close before the arrest completes
    pub apprehend_delay_ms: f64,

    // === Player ===
    /// Vehicles inside this radius can be entered
    pub enter_radius: f32,
    /// Exiting with police inside this radius while wanted means arrest
    pub arrest_radius: f32,
    /// Jail time before automatic release
    pub jail_sentence_ms: f64,
    /// Delay between crash ejection and respawn
    pub respawn_delay_ms: f64,
    /// Distance to the shop counter that allows browsing
    pub shop_radius: f32,

    // === Ballistics ===
    /// Projectiles expire after this long regardless of hits
    pub projectile_ttl_ms: f64,
    /// Effective kill radius relative to the visual explosion radius
    pub explosion_radius_multiplier: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            ped_idle_chance: 0.001,
            ped_idle_min_secs: 3.0,
            ped_idle_max_secs: 8.0,
            ped_arrival_distance: 5.0,
            ped_cross_chance: 0.35,
            ped_cross_search_distance: 40.0,
            ped_cross_speed_factor: 1.6,
            ped_cross_arrival: 0.5,
            ped_stuck_timeout_ms: 2000.0,
            corpse_lifetime_ms: 30_000.0,
            ped_notice_radius: 15.0,
            ped_notice_chance: 0.01,

            stop_distance: 5.0,
            lane_threshold: 3.0,
            resume_margin: 1.0,
            stop_timeout_ms: 10_000.0,
            segment_arrival: 3.0,
            segment_search_radius: 25.0,
            vehicle_turn_rate: 0.05,
            wreck_lifetime_ms: 10_000.0,
            crash_speed: 0.25,

            police_speed_factor: 1.5,
            police_standoff: 6.0,
            tank_standoff: 8.0,
            tank_fire_range: 50.0,
            tank_fire_cooldown_ms: 2000.0,
            turret_turn_rate: 0.05,
            apprehend_radius: 7.0,
            apprehend_delay_ms: 3000.0,

            enter_radius: 3.0,
            arrest_radius: 20.0,
            jail_sentence_ms: 10_000.0,
            respawn_delay_ms: 3000.0,
            shop_radius: 5.0,

            projectile_ttl_ms: 5000.0,
            explosion_radius_multiplier: 2.5,
        }
    }
}

/// Game settings/preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Graphics quality preset (drives LOD bands and effect caps)
    pub quality: QualityPreset,

    // === Population ===
    /// Free-roaming pedestrians spawned at startup
    #[serde(default = "default_pedestrian_count")]
    pub pedestrian_count: usize,
    /// Civilian vehicles spawned at startup, at most one per road segment
    #[serde(default = "default_traffic_count")]
    pub traffic_count: usize,

    // === Camera ===
    /// Radians of rotation per pixel of mouse movement
    pub mouse_sensitivity: f32,
    /// Third-person orbit distance
    pub camera_distance: f32,
    /// Invert vertical look
    pub invert_y: bool,

    /// Gameplay thresholds
    #[serde(default)]
    pub tuning: Tuning,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quality: QualityPreset::Medium,
            pedestrian_count: default_pedestrian_count(),
            traffic_count: default_traffic_count(),
            mouse_sensitivity: 0.002,
            camera_distance: 30.0,
            invert_y: false,
            tuning: Tuning::default(),
        }
    }
}

fn default_pedestrian_count() -> usize {
    400
}

fn default_traffic_count() -> usize {
    20
}

impl Settings {
    /// Minimum and maximum third-person orbit distance
    pub const CAMERA_DISTANCE_RANGE: (f32, f32) = (10.0, 50.0);

    /// Create settings from a quality preset (applies preset defaults)
    pub fn from_preset(preset: QualityPreset) -> Self {
        let mut settings = Self::default();
        settings.apply_preset(preset);
        settings
    }

    /// Apply a quality preset
    pub fn apply_preset(&mut self, preset: QualityPreset) {
        self.quality = preset;
    }

    /// Orbit distance clamped to the supported range
    pub fn effective_camera_distance(&self) -> f32 {
        let (min, max) = Self::CAMERA_DISTANCE_RANGE;
        self.camera_distance.clamp(min, max)
    }

    /// LocalStorage key
    #[allow(dead_code)]
    const STORAGE_KEY: &'static str = "street_sim_settings";

    /// Load settings from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                if let Ok(settings) = serde_json::from_str(&json) {
                    log::info!("Loaded settings from LocalStorage");
                    return settings;
                }
            }
        }

        log::info!("Using default settings");
        Self::default()
    }

    /// Save settings to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(json) = serde_json::to_string(self) {
                let _ = storage.set_item(Self::STORAGE_KEY, &json);
                log::info!("Settings saved");
            }
        }
    }

    /// Native stubs
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        Self::default()
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save(&self) {
        // No-op for native
    }
}
