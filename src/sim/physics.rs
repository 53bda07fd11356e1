//! Derivative cascade integrator
//!
//! One racer's kinematics: jerk feeds acceleration, acceleration feeds
//! velocity, velocity feeds position. Every mutated field is rounded to
//! three decimals so clients stepping the same inputs stay bit-identical.

use serde::{Deserialize, Serialize};

use crate::consts::FRICTION_COEFFICIENT;
use crate::round3;

/// Kinematic state of a racer
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsState {
    #[serde(rename = "pos")]
    pub position: f64,
    #[serde(rename = "vel")]
    pub velocity: f64,
    #[serde(rename = "acc")]
    pub acceleration: f64,
    pub jerk: f64,
}

impl PhysicsState {
    pub fn get(&self, variable: PhysicsVariable) -> f64 {
        match variable {
            PhysicsVariable::Position => self.position,
            PhysicsVariable::Velocity => self.velocity,
            PhysicsVariable::Acceleration => self.acceleration,
            PhysicsVariable::Jerk => self.jerk,
        }
    }

    fn slot(&mut self, variable: PhysicsVariable) -> &mut f64 {
        match variable {
            PhysicsVariable::Position => &mut self.position,
            PhysicsVariable::Velocity => &mut self.velocity,
            PhysicsVariable::Acceleration => &mut self.acceleration,
            PhysicsVariable::Jerk => &mut self.jerk,
        }
    }

    /// Copy with every field rounded to three decimals
    pub fn rounded(&self) -> Self {
        Self {
            position: round3(self.position),
            velocity: round3(self.velocity),
            acceleration: round3(self.acceleration),
            jerk: round3(self.jerk),
        }
    }
}

/// The four investable variables, in allocation-key order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicsVariable {
    Position,
    Velocity,
    Acceleration,
    Jerk,
}

impl PhysicsVariable {
    pub const ALL: [PhysicsVariable; 4] = [
        PhysicsVariable::Position,
        PhysicsVariable::Velocity,
        PhysicsVariable::Acceleration,
        PhysicsVariable::Jerk,
    ];

    /// Map an answer/allocation index (0-3) to a variable
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            PhysicsVariable::Position => 0,
            PhysicsVariable::Velocity => 1,
            PhysicsVariable::Acceleration => 2,
            PhysicsVariable::Jerk => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhysicsVariable::Position => "pos",
            PhysicsVariable::Velocity => "vel",
            PhysicsVariable::Acceleration => "acc",
            PhysicsVariable::Jerk => "jerk",
        }
    }
}

/// Partial state update (recovery/testing hook)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhysicsPatch {
    pub position: Option<f64>,
    pub velocity: Option<f64>,
    pub acceleration: Option<f64>,
    pub jerk: Option<f64>,
}

/// Fixed-step integrator owning one `PhysicsState`
#[derive(Debug, Clone)]
pub struct PhysicsEngine {
    state: PhysicsState,
    friction_coefficient: f64,
}

impl Default for PhysicsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsEngine {
    pub fn new() -> Self {
        Self::with_friction(FRICTION_COEFFICIENT)
    }

    pub fn with_friction(friction_coefficient: f64) -> Self {
        Self {
            state: PhysicsState::default(),
            friction_coefficient,
        }
    }

    /// Advance by `dt` seconds
    ///
    /// Friction is applied to acceleration and velocity before the cascade.
    /// Jerk never decays on its own. The caller owns `dt` clamping.
    pub fn update(&mut self, dt: f64, friction_active: bool) {
        let s = &mut self.state;

        if friction_active {
            s.acceleration *= self.friction_coefficient;
            s.velocity *= self.friction_coefficient;
        }

        s.acceleration += s.jerk * dt;
        s.velocity += s.acceleration * dt;
        s.position += s.velocity * dt;

        s.acceleration = round3(s.acceleration);
        s.velocity = round3(s.velocity);
        s.position = round3(s.position);
    }

    /// Add `amount` to one variable (point allocation)
    pub fn add_value(&mut self, variable: PhysicsVariable, amount: f64) {
        let slot = self.state.slot(variable);
        *slot = round3(*slot + amount);
    }

    /// Copy of the current state
    pub fn get_state(&self) -> PhysicsState {
        self.state
    }

    /// Merge a partial update; merged fields are rounded like any other mutation
    pub fn set_state(&mut self, patch: PhysicsPatch) {
        let s = &mut self.state;
        if let Some(v) = patch.position {
            s.position = round3(v);
        }
        if let Some(v) = patch.velocity {
            s.velocity = round3(v);
        }
        if let Some(v) = patch.acceleration {
            s.acceleration = round3(v);
        }
        if let Some(v) = patch.jerk {
            s.jerk = round3(v);
        }
    }

    /// Zero all fields (new race)
    pub fn reset(&mut self) {
        self.state = PhysicsState::default();
    }
}
