//! Calculus Racer - A quiz racing game driven by a derivative cascade
//!
//! Core modules:
//! - `sim`: Deterministic simulation (integrator, fixed-step loop, progression)
//! - `multiplayer`: Transport abstraction, room management, peer state sync
//! - `questions`: Question bank loading with fallback data
//! - `platform`: Browser/native platform abstraction (clock, frames)
//! - `session`: Explicit wiring of one local player's components
//! - `settings`: Data-driven timing and tuning

pub mod error;
pub mod multiplayer;
pub mod platform;
pub mod questions;
pub mod session;
pub mod settings;
pub mod sim;

pub use error::{QuestionError, RoomError, TransportError};
pub use session::GameSession;
pub use settings::GameConfig;

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep (30 Hz)
    pub const FIXED_TIMESTEP: f64 = 1.0 / 30.0;
    /// Maximum wall time consumed per frame to prevent spiral of death
    pub const MAX_FRAME_TIME: f64 = 0.1;
    /// Tolerance for the accumulator comparison in the fixed-step loop
    pub const STEP_EPSILON: f64 = 1e-4;

    /// Multiplier applied to acceleration and velocity while a friction spike is active
    pub const FRICTION_COEFFICIENT: f64 = 0.95;

    /// Delay between answer feedback and the next phase (ms)
    pub const FEEDBACK_DELAY_MS: f64 = 1500.0;
    /// Friction spike penalty duration after a wrong answer (ms)
    pub const FRICTION_SPIKE_DURATION_MS: f64 = 2000.0;
    /// Extra wait past spike expiry before forcing a listener refresh (ms)
    pub const FRICTION_REFRESH_MARGIN_MS: f64 = 10.0;
    /// Visual confirmation delay after allocating points (ms)
    pub const ALLOCATION_CONFIRM_MS: f64 = 500.0;
    /// Consecutive correct answers needed for resonance
    pub const RESONANCE_STREAK: u32 = 5;
    /// Countdown length before the race starts (seconds)
    pub const COUNTDOWN_FROM: u8 = 3;
    /// Countdown tick interval (ms)
    pub const COUNTDOWN_TICK_MS: f64 = 1000.0;

    /// Distance a racer must cover to finish
    pub const FINISH_LINE_DISTANCE: f64 = 1000.0;

    /// Minimum interval between outbound state writes (ms, 5 Hz)
    pub const SYNC_INTERVAL_MS: f64 = 200.0;
    /// How long a disconnected peer stays visible (ms)
    pub const DISCONNECT_GRACE_MS: f64 = 10_000.0;
    /// Maximum players per room
    pub const ROOM_CAPACITY: usize = 4;
}

/// Round to 3 decimal places, half away from zero
///
/// Every mutated physics field goes through this so independent clients
/// compare equal.
#[inline]
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
