//! One local player's wiring
//!
//! Owns the integrator, the fixed-step loop, the progression state machine
//! and optionally a peer sync. The host calls [`GameSession::frame`] for
//! every delivered frame and [`GameSession::handle_input`] for key presses.

use std::cell::RefCell;
use std::rc::Rc;

use crate::multiplayer::{SyncManager, Transport};
use crate::platform::{Clock, FrameHost};
use crate::questions::Question;
use crate::settings::GameConfig;
use crate::sim::{GameLoop, GameState, GameStateManager, PhysicsEngine, PhysicsState, Subscription};

pub struct GameSession {
    config: GameConfig,
    clock: Rc<dyn Clock>,
    physics: Rc<RefCell<PhysicsEngine>>,
    game_loop: GameLoop,
    progression: Rc<RefCell<GameStateManager>>,
    sync: Option<SyncManager>,
    /// Finish record already published
    finish_sent: bool,
    subscriptions: Vec<Subscription>,
}

impl GameSession {
    pub fn new(clock: Rc<dyn Clock>, frames: Rc<dyn FrameHost>, config: GameConfig) -> Self {
        let config = config.sanitized();
        let physics = Rc::new(RefCell::new(PhysicsEngine::with_friction(
            config.friction_coefficient,
        )));

        let mut manager = GameStateManager::with_config(clock.clone(), &config);
        manager.set_engine(physics.clone());
        let progression = Rc::new(RefCell::new(manager));

        let mut game_loop = GameLoop::with_config(physics.clone(), clock.clone(), frames, &config);
        let probe = Rc::downgrade(&progression);
        game_loop.set_friction_probe(Box::new(move || {
            probe
                .upgrade()
                .and_then(|p| p.try_borrow().ok().map(|p| p.is_friction_spike_active()))
                .unwrap_or(false)
        }));

        Self {
            config,
            clock,
            physics,
            game_loop,
            progression,
            sync: None,
            finish_sent: false,
            subscriptions: Vec::new(),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn physics(&self) -> Rc<RefCell<PhysicsEngine>> {
        self.physics.clone()
    }

    pub fn physics_state(&self) -> PhysicsState {
        self.physics.borrow().get_state()
    }

    pub fn state(&self) -> GameState {
        self.progression.borrow().get_state()
    }

    /// Elapsed race time, frozen at the finish
    pub fn race_time_ms(&self) -> Option<f64> {
        self.progression.borrow().race_time_ms()
    }

    pub fn set_questions(&mut self, questions: Vec<Question>) {
        self.progression.borrow_mut().set_questions(questions);
    }

    /// Observe progression snapshots for as long as the session lives
    pub fn on_state_change(&mut self, listener: impl FnMut(&GameState) + 'static) {
        let subscription = self.progression.borrow().subscribe(listener);
        self.subscriptions.push(subscription);
    }

    /// Observe fixed steps for as long as the session lives
    pub fn on_step(&mut self, callback: impl FnMut(&f64) + 'static) {
        let subscription = self.game_loop.subscribe(callback);
        self.subscriptions.push(subscription);
    }

    /// Join peer sync for `uid` in `room_id`
    pub fn attach_sync(&mut self, transport: Rc<dyn Transport>, room_id: &str, uid: &str) {
        let mut sync = SyncManager::with_config(transport, self.clock.clone(), &self.config);
        sync.start_sync(room_id, uid);
        self.sync = Some(sync);
    }

    pub fn sync(&self) -> Option<&SyncManager> {
        self.sync.as_ref()
    }

    /// Start the frame loop and the pre-race countdown
    pub fn start(&mut self) {
        self.game_loop.start();
        self.progression.borrow_mut().begin_countdown();
    }

    pub fn handle_input(&mut self, key: &str) {
        self.progression.borrow_mut().handle_input(key);
    }

    /// Run one host frame at `timestamp` (ms); returns fixed steps executed
    pub fn frame(&mut self, timestamp: f64) -> u32 {
        let steps = self.game_loop.on_frame(timestamp);

        let physics = self.physics_state();
        let (finished, streak, resonance) = {
            let mut progression = self.progression.borrow_mut();
            progression.poll_timers();
            progression.check_finish(&physics);
            let state = progression.get_state();
            (state.is_race_finished, state.streak, state.is_resonance_active)
        };

        if let Some(sync) = self.sync.as_mut() {
            if finished {
                if !self.finish_sent {
                    self.finish_sent = sync.send_race_finish(&physics, Some(streak), Some(resonance));
                }
            } else {
                sync.write_local_state(&physics, Some(streak), Some(resonance));
            }
            sync.pump();
        }
        steps
    }

    /// Fresh race with the same bank, players and sync
    pub fn restart(&mut self) {
        self.physics.borrow_mut().reset();
        self.progression.borrow_mut().reset();
        self.finish_sent = false;
        self.progression.borrow_mut().begin_countdown();
    }

    /// Stop the loop, cancel timers and release every subscription
    pub fn shutdown(&mut self) {
        self.game_loop.stop();
        self.progression.borrow_mut().cancel_timers();
        if let Some(sync) = self.sync.as_mut() {
            sync.stop_sync();
        }
        for mut subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}

impl Drop for GameSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
