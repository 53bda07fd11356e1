//! Game timing and tuning configuration
//!
//! Defaults mirror `crate::consts`. Persisted in LocalStorage on web so a
//! host page can tune a build without recompiling.

use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Timing and tuning knobs for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    // === Simulation ===
    /// Fixed integrator step (seconds)
    pub fixed_timestep: f64,
    /// Cap on wall time consumed per frame (seconds)
    pub max_frame_time: f64,
    /// Friction multiplier during a spike
    pub friction_coefficient: f64,

    // === Progression ===
    /// Feedback display time before the next phase (ms)
    pub feedback_delay_ms: f64,
    /// Wrong-answer friction spike (ms)
    pub friction_spike_ms: f64,
    /// Delay after allocation before the next question (ms)
    pub allocation_confirm_ms: f64,
    /// Correct streak that triggers resonance
    pub resonance_streak: u32,
    /// Countdown start value (seconds)
    pub countdown_from: u8,
    /// Finish line distance
    pub finish_line: f64,

    // === Multiplayer ===
    /// Outbound write throttle (ms)
    pub sync_interval_ms: f64,
    /// How long a disconnected peer remains visible (ms)
    pub disconnect_grace_ms: f64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: FIXED_TIMESTEP,
            max_frame_time: MAX_FRAME_TIME,
            friction_coefficient: FRICTION_COEFFICIENT,

            feedback_delay_ms: FEEDBACK_DELAY_MS,
            friction_spike_ms: FRICTION_SPIKE_DURATION_MS,
            allocation_confirm_ms: ALLOCATION_CONFIRM_MS,
            resonance_streak: RESONANCE_STREAK,
            countdown_from: COUNTDOWN_FROM,
            finish_line: FINISH_LINE_DISTANCE,

            sync_interval_ms: SYNC_INTERVAL_MS,
            disconnect_grace_ms: DISCONNECT_GRACE_MS,
        }
    }
}

impl GameConfig {
    /// Parse a (possibly partial) JSON override; missing fields keep defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Replace non-positive timings with defaults
    ///
    /// The scheduler divides by `fixed_timestep` and the reconciler by
    /// `sync_interval_ms`, so neither may be zero.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.fixed_timestep > 0.0) {
            self.fixed_timestep = defaults.fixed_timestep;
        }
        if !(self.max_frame_time >= self.fixed_timestep) {
            self.max_frame_time = defaults.max_frame_time.max(self.fixed_timestep);
        }
        if !(self.sync_interval_ms > 0.0) {
            self.sync_interval_ms = defaults.sync_interval_ms;
        }
        if self.resonance_streak == 0 {
            self.resonance_streak = defaults.resonance_streak;
        }
        self
    }

    /// LocalStorage key
    #[allow(dead_code)]
    const STORAGE_KEY: &'static str = "calculus_racer_config";

    /// Load config from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                match Self::from_json(&json) {
                    Ok(config) => {
                        log::info!("Loaded config from LocalStorage");
                        return config;
                    }
                    Err(e) => log::warn!("Ignoring stored config: {}", e),
                }
            }
        }

        log::info!("Using default config");
        Self::default()
    }

    /// Save config to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(json) = serde_json::to_string(self) {
                let _ = storage.set_item(Self::STORAGE_KEY, &json);
                log::info!("Config saved");
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
