//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Time read through `platform::Clock`, never ambiently
//! - Every physics mutation rounded to 3 decimals
//! - No rendering or platform dependencies

pub mod observer;
pub mod physics;
pub mod progression;
pub mod scheduler;
pub mod timers;

pub use observer::{Subscribers, Subscription};
pub use physics::{PhysicsEngine, PhysicsPatch, PhysicsState, PhysicsVariable};
pub use progression::{FeedbackState, GameState, GameStateManager, LastInput, ProgressionEvent};
pub use scheduler::{FrictionProbe, GameLoop};
pub use timers::{TimerId, TimerQueue};
