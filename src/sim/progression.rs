//! Quiz progression state machine
//!
//! Question -> feedback -> allocation -> next question. A correct answer
//! banks points and grows the streak; a wrong answer resets the streak and
//! triggers a friction spike. Banked points are invested into one physics
//! variable, never the same one twice in a row.
//!
//! Delays are events in a [`TimerQueue`]; the host calls
//! [`GameStateManager::poll_timers`] every frame.

use std::cell::RefCell;
use std::rc::Rc;

use super::observer::{Subscribers, Subscription};
use super::physics::{PhysicsEngine, PhysicsState, PhysicsVariable};
use super::timers::TimerQueue;
use crate::platform::Clock;
use crate::questions::Question;
use crate::settings::GameConfig;

/// Answer feedback currently shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackState {
    #[default]
    Idle,
    Correct,
    Wrong,
}

/// Most recent accepted key press
///
/// Renderers compare `sequence_id` to detect new input rather than
/// comparing keys.
#[derive(Debug, Clone, PartialEq)]
pub struct LastInput {
    pub key: String,
    pub timestamp: f64,
    pub sequence_id: u64,
}

/// Snapshot of one local player's progression
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GameState {
    pub current_question: Option<Rc<Question>>,
    /// Points earned but not yet allocated
    pub holding_value: u32,
    pub feedback_state: FeedbackState,
    pub is_allocation_active: bool,
    pub is_game_active: bool,
    /// Variable index (0-3) of the most recent successful allocation
    pub last_allocated_index: Option<usize>,
    pub last_input: Option<LastInput>,
    /// Absolute time (ms) the friction spike expires
    pub friction_spike_end: f64,
    /// Consecutive correct answers
    pub streak: u32,
    pub is_resonance_active: bool,
    pub is_race_finished: bool,
    pub race_start_time: Option<f64>,
    pub race_end_time: Option<f64>,
    /// Seconds left before the race starts, while counting down
    pub countdown: Option<u8>,
}

/// Delayed transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionEvent {
    /// Correct-answer feedback ends; allocation phase begins
    EnterAllocation,
    /// Load the next question
    AdvanceQuestion,
    /// Friction spike expired; push a fresh snapshot to listeners
    RefreshAfterSpike,
    CountdownTick,
}

/// Owns the `GameState` and every rule that mutates it
pub struct GameStateManager {
    state: GameState,
    listeners: Subscribers<GameState>,
    engine: Option<Rc<RefCell<PhysicsEngine>>>,
    clock: Rc<dyn Clock>,
    timers: TimerQueue<ProgressionEvent>,

    questions: Vec<Rc<Question>>,
    current_question_index: Option<usize>,
    sequence_counter: u64,
    /// Set between an answer/allocation and the question change it triggers
    awaiting_next: bool,
    config: GameConfig,
}

impl GameStateManager {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self::with_config(clock, &GameConfig::default())
    }

    pub fn with_config(clock: Rc<dyn Clock>, config: &GameConfig) -> Self {
        Self {
            state: GameState::default(),
            listeners: Subscribers::new(),
            engine: None,
            clock,
            timers: TimerQueue::new(),
            questions: Vec::new(),
            current_question_index: None,
            sequence_counter: 0,
            awaiting_next: false,
            config: config.clone().sanitized(),
        }
    }

    /// Attach the integrator that allocations invest into
    pub fn set_engine(&mut self, engine: Rc<RefCell<PhysicsEngine>>) {
        self.engine = Some(engine);
    }

    /// Copy of the attached integrator's state
    pub fn physics_state(&self) -> Option<PhysicsState> {
        self.engine.as_ref().map(|e| e.borrow().get_state())
    }

    /// Defensive copy of the current state
    pub fn get_state(&self) -> GameState {
        self.state.clone()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Register a listener; it immediately receives the current snapshot
    pub fn subscribe(&self, listener: impl FnMut(&GameState) + 'static) -> Subscription {
        let mut listener = listener;
        listener(&self.state);
        self.listeners.subscribe(listener)
    }

    fn notify(&self) {
        self.listeners.notify(&self.state);
    }

    fn now(&self) -> f64 {
        self.clock.now_ms()
    }

    fn schedule(&mut self, delay_ms: f64, event: ProgressionEvent) {
        let due = self.now() + delay_ms;
        self.timers.schedule(due, event);
    }

    /// Replace the question bank and show its first question
    ///
    /// An empty bank is ignored.
    pub fn set_questions(&mut self, questions: Vec<Question>) {
        if questions.is_empty() {
            log::warn!("Ignoring empty question bank");
            return;
        }
        self.questions = questions.into_iter().map(Rc::new).collect();
        self.current_question_index = None;
        self.next_question();
    }

    fn next_question(&mut self) {
        self.awaiting_next = false;
        if self.questions.is_empty() {
            return;
        }
        let index = self
            .current_question_index
            .map_or(0, |i| (i + 1) % self.questions.len());
        self.current_question_index = Some(index);
        self.state.current_question = Some(Rc::clone(&self.questions[index]));
        self.state.feedback_state = FeedbackState::Idle;
        self.notify();
    }

    pub fn start_race(&mut self) {
        self.state.is_game_active = true;
        self.state.race_start_time = Some(self.now());
        self.notify();
    }

    /// Count down from the configured value, then start the race
    pub fn begin_countdown(&mut self) {
        if self.state.is_game_active || self.state.is_race_finished || self.state.countdown.is_some()
        {
            return;
        }
        if self.config.countdown_from == 0 {
            self.start_race();
            return;
        }
        self.state.countdown = Some(self.config.countdown_from);
        self.notify();
        self.schedule(crate::consts::COUNTDOWN_TICK_MS, ProgressionEvent::CountdownTick);
    }

    /// Score `choice_index` against the current question
    ///
    /// Ignored once the race is finished, while feedback is showing, during
    /// the allocation phase, and between an answer or allocation and the
    /// question change it triggers. The last two keep one question from
    /// being scored twice.
    pub fn submit_answer(&mut self, choice_index: usize) {
        if self.state.is_race_finished {
            return;
        }
        if self.state.feedback_state != FeedbackState::Idle
            || self.state.is_allocation_active
            || self.awaiting_next
        {
            return;
        }
        let Some(question) = self.state.current_question.clone() else {
            return;
        };
        if self.engine.is_none() {
            log::error!("GameStateManager: PhysicsEngine not connected. Call set_engine() before submitting answers.");
            return;
        }

        if choice_index == question.correct_index {
            self.state.feedback_state = FeedbackState::Correct;
            self.state.holding_value += question.points;
            self.state.streak += 1;
            if self.state.streak >= self.config.resonance_streak {
                self.state.is_resonance_active = true;
            }
            self.notify();
            self.schedule(self.config.feedback_delay_ms, ProgressionEvent::EnterAllocation);
        } else {
            self.state.feedback_state = FeedbackState::Wrong;
            self.state.streak = 0;
            self.state.is_resonance_active = false;
            self.state.friction_spike_end = self.now() + self.config.friction_spike_ms;
            self.awaiting_next = true;
            self.notify();

            self.schedule(self.config.feedback_delay_ms, ProgressionEvent::AdvanceQuestion);
            self.schedule(
                self.config.friction_spike_ms + crate::consts::FRICTION_REFRESH_MARGIN_MS,
                ProgressionEvent::RefreshAfterSpike,
            );
        }
    }

    pub fn is_friction_spike_active(&self) -> bool {
        self.now() < self.state.friction_spike_end
    }

    /// Invest all banked points into the variable at `choice_index`
    ///
    /// Choosing the same variable as the previous allocation is ignored.
    pub fn allocate_points(&mut self, choice_index: usize) {
        if self.state.is_race_finished {
            return;
        }
        if !self.state.is_allocation_active || self.state.holding_value == 0 {
            return;
        }
        let Some(engine) = self.engine.clone() else {
            log::error!("GameStateManager: PhysicsEngine not connected. Call set_engine() before allocating points.");
            return;
        };
        let Some(variable) = PhysicsVariable::from_index(choice_index) else {
            return;
        };
        if self.state.last_allocated_index == Some(choice_index) {
            log::debug!("Allocation to {} repeated; ignored", variable.as_str());
            return;
        }

        engine
            .borrow_mut()
            .add_value(variable, self.state.holding_value as f64);
        self.state.holding_value = 0;
        self.state.is_allocation_active = false;
        self.state.last_allocated_index = Some(choice_index);
        self.awaiting_next = true;
        self.notify();

        self.schedule(self.config.allocation_confirm_ms, ProgressionEvent::AdvanceQuestion);
    }

    /// Record a key press and route answer keys `1`-`4`
    ///
    /// During the allocation phase the key picks a variable, otherwise it
    /// answers the current question. Other keys are ignored.
    pub fn handle_input(&mut self, key: &str) {
        let choice_index = match key {
            "1" => 0,
            "2" => 1,
            "3" => 2,
            "4" => 3,
            _ => return,
        };

        self.sequence_counter += 1;
        self.state.last_input = Some(LastInput {
            key: key.to_string(),
            timestamp: self.now(),
            sequence_id: self.sequence_counter,
        });
        self.notify();

        if self.state.is_allocation_active {
            self.allocate_points(choice_index);
        } else {
            self.submit_answer(choice_index);
        }
    }

    /// Finish the race if `physics` has crossed the finish line
    pub fn check_finish(&mut self, physics: &PhysicsState) -> bool {
        if !self.state.is_game_active || self.state.is_race_finished {
            return false;
        }
        if physics.position >= self.config.finish_line {
            self.finish_race();
            return true;
        }
        false
    }

    /// Terminal transition; gameplay actions become no-ops
    pub fn finish_race(&mut self) {
        if self.state.is_race_finished {
            return;
        }
        self.state.is_race_finished = true;
        self.state.race_end_time = Some(self.now());
        self.state.is_allocation_active = false;
        self.state.feedback_state = FeedbackState::Idle;
        self.state.countdown = None;
        self.timers
            .cancel_where(|e| *e != ProgressionEvent::RefreshAfterSpike);
        log::info!("Race finished in {:.0} ms", self.race_time_ms().unwrap_or(0.0));
        self.notify();
    }

    /// Elapsed race time, frozen once finished
    pub fn race_time_ms(&self) -> Option<f64> {
        let start = self.state.race_start_time?;
        let end = self.state.race_end_time.unwrap_or_else(|| self.now());
        Some((end - start).max(0.0))
    }

    /// Fire every delayed transition due by now
    pub fn poll_timers(&mut self) -> usize {
        let mut fired = 0;
        while let Some((_, event)) = self.timers.pop_due(self.now()) {
            self.handle_event(event);
            fired += 1;
        }
        fired
    }

    fn handle_event(&mut self, event: ProgressionEvent) {
        match event {
            ProgressionEvent::EnterAllocation => {
                self.state.feedback_state = FeedbackState::Idle;
                self.state.is_allocation_active = true;
                self.notify();
            }
            ProgressionEvent::AdvanceQuestion => self.next_question(),
            ProgressionEvent::RefreshAfterSpike => self.notify(),
            ProgressionEvent::CountdownTick => {
                let remaining = self.state.countdown.unwrap_or(0).saturating_sub(1);
                if remaining == 0 {
                    self.state.countdown = None;
                    self.start_race();
                } else {
                    self.state.countdown = Some(remaining);
                    self.notify();
                    self.schedule(crate::consts::COUNTDOWN_TICK_MS, ProgressionEvent::CountdownTick);
                }
            }
        }
    }

    /// Cancel every pending transition (teardown)
    pub fn cancel_timers(&mut self) {
        self.timers.clear();
        self.awaiting_next = false;
    }

    /// Fresh race: clears progress, streak and allocation memory
    ///
    /// The question bank and listeners are kept; the first question is
    /// shown again.
    pub fn reset(&mut self) {
        self.timers.clear();
        self.state = GameState::default();
        self.awaiting_next = false;
        self.current_question_index = None;
        if self.questions.is_empty() {
            self.notify();
        } else {
            self.next_question();
        }
    }
}
