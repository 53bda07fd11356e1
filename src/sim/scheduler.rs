//! Fixed timestep game loop
//!
//! Converts variable-rate frame callbacks into whole integrator steps.
//! Wall time accumulates; each frame drains as many fixed steps as fit,
//! with the per-frame time capped so a stalled tab cannot trigger an
//! unbounded catch-up.

use std::cell::RefCell;
use std::rc::Rc;

use super::observer::{Subscribers, Subscription};
use super::physics::PhysicsEngine;
use crate::consts::{FIXED_TIMESTEP, MAX_FRAME_TIME, STEP_EPSILON};
use crate::platform::{Clock, FrameHost, FrameId};
use crate::settings::GameConfig;

/// Reports whether the friction spike is active for the next step
pub type FrictionProbe = Box<dyn Fn() -> bool>;

/// Drives a `PhysicsEngine` at a fixed rate from host frames
pub struct GameLoop {
    physics: Rc<RefCell<PhysicsEngine>>,
    clock: Rc<dyn Clock>,
    frames: Rc<dyn FrameHost>,
    friction_probe: Option<FrictionProbe>,
    subscribers: Subscribers<f64>,

    is_running: bool,
    /// Timestamp of the previous frame (ms)
    last_time: f64,
    /// Elapsed seconds not yet simulated
    accumulator: f64,
    pending_frame: Option<FrameId>,

    fixed_timestep: f64,
    max_frame_time: f64,
    /// Fixed steps executed since construction
    total_steps: u64,
}

impl GameLoop {
    pub fn new(
        physics: Rc<RefCell<PhysicsEngine>>,
        clock: Rc<dyn Clock>,
        frames: Rc<dyn FrameHost>,
    ) -> Self {
        Self {
            physics,
            clock,
            frames,
            friction_probe: None,
            subscribers: Subscribers::new(),
            is_running: false,
            last_time: 0.0,
            accumulator: 0.0,
            pending_frame: None,
            fixed_timestep: FIXED_TIMESTEP,
            max_frame_time: MAX_FRAME_TIME,
            total_steps: 0,
        }
    }

    pub fn with_config(
        physics: Rc<RefCell<PhysicsEngine>>,
        clock: Rc<dyn Clock>,
        frames: Rc<dyn FrameHost>,
        config: &GameConfig,
    ) -> Self {
        let config = config.clone().sanitized();
        let mut game_loop = Self::new(physics, clock, frames);
        game_loop.fixed_timestep = config.fixed_timestep;
        game_loop.max_frame_time = config.max_frame_time;
        game_loop
    }

    /// Install the friction source consulted before every step
    pub fn set_friction_probe(&mut self, probe: FrictionProbe) {
        self.friction_probe = Some(probe);
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn fixed_timestep(&self) -> f64 {
        self.fixed_timestep
    }

    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn start(&mut self) {
        if self.is_running {
            return;
        }
        self.is_running = true;
        self.accumulator = 0.0;
        self.last_time = self.clock.now_ms();
        self.pending_frame = Some(self.frames.request_frame());
    }

    /// Stop and cancel the scheduled frame; safe to call repeatedly
    pub fn stop(&mut self) {
        self.is_running = false;
        if let Some(id) = self.pending_frame.take() {
            self.frames.cancel_frame(id);
        }
    }

    /// Register a callback run once per fixed step with the step size
    pub fn subscribe(&self, callback: impl FnMut(&f64) + 'static) -> Subscription {
        self.subscribers.subscribe(callback)
    }

    /// Handle one host frame at `timestamp` (ms); returns steps executed
    ///
    /// All due integrations run before any subscriber is notified. A frame
    /// delivered after `stop` does nothing.
    pub fn on_frame(&mut self, timestamp: f64) -> u32 {
        if !self.is_running {
            return 0;
        }
        self.pending_frame = None;

        let elapsed = ((timestamp - self.last_time) / 1000.0).clamp(0.0, self.max_frame_time);
        self.last_time = timestamp;
        self.accumulator += elapsed;

        let mut steps = 0;
        while self.accumulator + STEP_EPSILON >= self.fixed_timestep {
            let friction = self.friction_probe.as_ref().is_some_and(|probe| probe());
            self.physics
                .borrow_mut()
                .update(self.fixed_timestep, friction);
            self.accumulator = (self.accumulator - self.fixed_timestep).max(0.0);
            steps += 1;
        }
        self.total_steps += steps as u64;

        for _ in 0..steps {
            self.subscribers.notify(&self.fixed_timestep);
        }

        if self.is_running {
            self.pending_frame = Some(self.frames.request_frame());
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ManualClock, ManualFrames};
    use crate::sim::physics::PhysicsVariable;
    use std::cell::Cell;

    const FRAME_MS: f64 = 1000.0 / 30.0;

    fn setup() -> (GameLoop, Rc<RefCell<PhysicsEngine>>, ManualClock, ManualFrames) {
        let physics = Rc::new(RefCell::new(PhysicsEngine::new()));
        let clock = ManualClock::new(0.0);
        let frames = ManualFrames::new();
        let game_loop = GameLoop::new(
            physics.clone(),
            Rc::new(clock.clone()),
            Rc::new(frames.clone()),
        );
        (game_loop, physics, clock, frames)
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut game_loop, _, _, frames) = setup();
        game_loop.start();
        game_loop.start();
        assert!(game_loop.is_running());
        assert_eq!(frames.pending().len(), 1);
    }

    #[test]
    fn test_one_step_per_fixed_interval() {
        let (mut game_loop, physics, _, _) = setup();
        physics.borrow_mut().add_value(PhysicsVariable::Velocity, 3.0);
        game_loop.start();

        assert_eq!(game_loop.on_frame(FRAME_MS), 1);
        assert_eq!(game_loop.on_frame(FRAME_MS * 2.0), 1);
        assert_eq!(physics.borrow().get_state().position, 0.2);
    }

    #[test]
    fn test_short_frames_accumulate() {
        let (mut game_loop, _, _, _) = setup();
        game_loop.start();
        assert_eq!(game_loop.on_frame(10.0), 0);
        assert_eq!(game_loop.on_frame(20.0), 0);
        assert_eq!(game_loop.on_frame(FRAME_MS + 1.0), 1);
        assert!(game_loop.accumulator() >= 0.0);
    }

    #[test]
    fn test_long_stall_capped_at_three_steps() {
        let (mut game_loop, _, _, _) = setup();
        game_loop.start();
        assert_eq!(game_loop.on_frame(5000.0), 3);
        assert!(game_loop.accumulator() < game_loop.fixed_timestep());
        assert_eq!(game_loop.total_steps(), 3);
    }

    #[test]
    fn test_subscribers_notified_per_step_after_integration() {
        let (mut game_loop, physics, _, _) = setup();
        physics.borrow_mut().add_value(PhysicsVariable::Velocity, 30.0);
        let calls = Rc::new(Cell::new(0));
        let positions = Rc::new(RefCell::new(Vec::new()));

        let (c, p, ph) = (calls.clone(), positions.clone(), physics.clone());
        let _sub = game_loop.subscribe(move |dt| {
            assert!((dt - FIXED_TIMESTEP).abs() < 1e-12);
            c.set(c.get() + 1);
            p.borrow_mut().push(ph.borrow().get_state().position);
        });

        game_loop.start();
        game_loop.on_frame(100.0);
        assert_eq!(calls.get(), 3);
        // Every notification observes the fully integrated frame
        assert_eq!(*positions.borrow(), vec![3.0, 3.0, 3.0]);
    }

    #[test]
    fn test_friction_probe_consulted() {
        let (mut game_loop, physics, _, _) = setup();
        physics.borrow_mut().add_value(PhysicsVariable::Velocity, 10.0);
        game_loop.set_friction_probe(Box::new(|| true));
        game_loop.start();
        game_loop.on_frame(FRAME_MS);
        assert_eq!(physics.borrow().get_state().velocity, 9.5);
    }

    #[test]
    fn test_stop_cancels_pending_frame_and_ignores_late_frames() {
        let (mut game_loop, physics, _, frames) = setup();
        physics.borrow_mut().add_value(PhysicsVariable::Velocity, 1.0);
        game_loop.start();
        game_loop.stop();
        game_loop.stop();
        assert!(frames.pending().is_empty());

        assert_eq!(game_loop.on_frame(1000.0), 0);
        assert_eq!(physics.borrow().get_state().position, 0.0);
    }

    #[test]
    fn test_restart_resets_accumulator() {
        let (mut game_loop, _, clock, _) = setup();
        game_loop.start();
        game_loop.on_frame(20.0);
        game_loop.stop();
        clock.set(10_000.0);
        game_loop.start();
        assert_eq!(game_loop.accumulator(), 0.0);
        assert_eq!(game_loop.on_frame(10_010.0), 0);
    }

    #[test]
    fn test_each_frame_requests_next() {
        let (mut game_loop, _, _, frames) = setup();
        game_loop.start();
        let first = frames.take_next();
        assert!(first.is_some());
        game_loop.on_frame(FRAME_MS);
        assert_eq!(frames.pending().len(), 1);
    }
}
