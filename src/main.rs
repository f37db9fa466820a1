//! Street Sim entry point
//!
//! Native builds run the city headless for a fixed number of ticks and print
//! a summary. Web builds export a handle the browser glue drives each frame.

#[cfg(target_arch = "wasm32")]
mod wasm_host {
    use wasm_bindgen::prelude::*;

    use street_sim::persistence::{self, SaveSnapshot};
    use street_sim::settings::Settings;
    use street_sim::sim::{self, FrameStepper, GameState, TickInput, WeaponKind};

    fn js_error(e: impl std::fmt::Display) -> JsValue {
        JsValue::from_str(&e.to_string())
    }

    /// Simulation handle owned by the page
    #[wasm_bindgen]
    pub struct SimHandle {
        state: GameState,
        stepper: FrameStepper,
    }

    #[wasm_bindgen]
    impl SimHandle {
        /// Without a seed the current time is used
        #[wasm_bindgen(constructor)]
        pub fn new(seed: Option<f64>) -> SimHandle {
            let seed = seed.unwrap_or_else(js_sys::Date::now) as u64;
            let mut state = GameState::with_settings(seed, Settings::load());
            match persistence::load() {
                Ok(Some(snapshot)) => {
                    if let Err(e) = persistence::set_state(&mut state, &snapshot) {
                        log::warn!("Ignoring saved game: {}", e);
                    }
                }
                Ok(None) => log::info!("No saved game, starting fresh"),
                Err(e) => log::warn!("Could not read saved game: {}", e),
            }
            SimHandle {
                state,
                stepper: FrameStepper::new(),
            }
        }

        /// Advance by a frame's worth of seconds; returns ticks run
        pub fn advance(&mut self, frame_dt: f32) -> u32 {
            self.stepper.advance(&mut self.state, frame_dt)
        }

        /// Replace the pending input snapshot. Deltas and one-shots already
        /// queued but not yet consumed are merged in.
        pub fn set_input(&mut self, json: &str) -> Result<(), JsValue> {
            let next: TickInput = serde_json::from_str(json).map_err(js_error)?;
            let pending = self.stepper.input;
            self.stepper.input = TickInput {
                interact: next.interact || pending.interact,
                toggle_camera: next.toggle_camera || pending.toggle_camera,
                select_weapon: next.select_weapon.or(pending.select_weapon),
                look_delta: next.look_delta + pending.look_delta,
                wheel_delta: next.wheel_delta + pending.wheel_delta,
                ..next
            };
            Ok(())
        }

        pub fn hud_json(&self) -> Result<String, JsValue> {
            serde_json::to_string(&sim::hud(&self.state)).map_err(js_error)
        }

        pub fn events_json(&mut self) -> Result<String, JsValue> {
            serde_json::to_string(&self.state.take_events()).map_err(js_error)
        }

        /// Dynamic instance buffer, see `InstanceRaw`
        pub fn instances(&self) -> Vec<u8> {
            sim::view::instance_bytes(&sim::instances(&self.state)).to_vec()
        }

        pub fn building_instances(&self) -> Vec<u8> {
            sim::view::instance_bytes(&sim::view::building_instances(&self.state)).to_vec()
        }

        pub fn purchase(&mut self, slot: u8) -> Result<(), JsValue> {
            let kind = WeaponKind::from_slot(slot)
                .ok_or_else(|| JsValue::from_str("unknown weapon slot"))?;
            sim::purchase(&mut self.state, kind).map_err(js_error)
        }

        pub fn get_state(&self) -> Result<String, JsValue> {
            persistence::get_state(&self.state)
                .to_json()
                .map_err(js_error)
        }

        pub fn set_state(&mut self, json: &str) -> Result<(), JsValue> {
            let snapshot = SaveSnapshot::from_json(json).map_err(js_error)?;
            persistence::set_state(&mut self.state, &snapshot).map_err(js_error)?;
            self.stepper.reset();
            Ok(())
        }

        pub fn save(&self) -> Result<(), JsValue> {
            persistence::save(&self.state).map_err(js_error)
        }
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn wasm_main() {
    console_error_panic_hook::set_once();
    if let Err(e) = console_log::init_with_level(log::Level::Info) {
        let message = format!("logger init failed: {}", e);
        web_sys::console::error_1(&wasm_bindgen::JsValue::from_str(&message));
    }
    log::info!("Street Sim starting...");
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

/// Headless run of the city
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// World and RNG seed
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Simulated seconds to run
    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    seconds: u32,
    /// Quality preset driving the LOD bands
    #[arg(long, value_enum, default_value_t = street_sim::settings::QualityPreset::Medium)]
    quality: street_sim::settings::QualityPreset,
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use clap::Parser;
    use street_sim::settings::Settings;
    use street_sim::sim::pedestrian::RenderDetail;
    use street_sim::sim::{self, GameState, tick::run_idle};

    env_logger::init();
    let args = CliArgs::parse();

    log::info!(
        "Street Sim (native) seed {} for {}s at {} quality",
        args.seed,
        args.seconds,
        args.quality.as_str()
    );
    let mut state = GameState::with_settings(args.seed, Settings::from_preset(args.quality));
    for second in 1..=args.seconds {
        run_idle(&mut state, 60);
        if second % 10 == 0 {
            let moving = state.vehicles.iter().filter(|v| v.speed.abs() > 0.01).count();
            let impostors = state
                .pedestrians
                .iter()
                .filter(|p| p.detail == RenderDetail::Impostor)
                .count();
            log::info!(
                "t={}s pedestrians={} impostors={} vehicles={} moving={} effects={}",
                second,
                state.pedestrians.len(),
                impostors,
                state.vehicles.len(),
                moving,
                state.effects.len()
            );
        }
    }

    match serde_json::to_string_pretty(&sim::hud(&state)) {
        Ok(json) => println!("{}", json),
        Err(e) => log::error!("Could not encode HUD: {}", e),
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use clap::Parser;
    use street_sim::settings::QualityPreset;

    #[test]
    fn test_cli_defaults() {
        let args = CliArgs::try_parse_from(["street-sim"]).unwrap();
        assert_eq!(args.seed, 1);
        assert_eq!(args.seconds, 60);
        assert_eq!(args.quality, QualityPreset::Medium);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::try_parse_from([
            "street-sim",
            "--seed",
            "42",
            "--seconds",
            "5",
            "--quality",
            "high",
        ])
        .unwrap();
        assert_eq!(args.seed, 42);
        assert_eq!(args.seconds, 5);
        assert_eq!(args.quality, QualityPreset::High);
    }

    #[test]
    fn test_cli_rejects_bad_input() {
        assert!(CliArgs::try_parse_from(["street-sim", "--seconds", "abc"]).is_err());
        assert!(CliArgs::try_parse_from(["street-sim", "--seconds", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["street-sim", "--sed", "5"]).is_err());
        assert!(CliArgs::try_parse_from(["street-sim", "--quality", "ultra"]).is_err());
    }
}
