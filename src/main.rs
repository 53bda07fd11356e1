//! Calculus Racer entry point
//!
//! Web: single-player race driven by requestAnimationFrame and the keyboard.
//! Native: a headless two-bot race over the in-memory transport.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_game {
    use std::cell::RefCell;
    use std::rc::Rc;
    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::*;

    use calculus_racer::platform::{BrowserFrames, MonotonicClock};
    use calculus_racer::questions::fetch_questions;
    use calculus_racer::sim::GameState;
    use calculus_racer::{GameConfig, GameSession};

    fn log_state(state: &GameState) {
        if let Some(q) = &state.current_question {
            log::debug!(
                "{} | holding {} | streak {} | allocation {}",
                q.text,
                state.holding_value,
                state.streak,
                state.is_allocation_active
            );
        }
        if let Some(n) = state.countdown {
            log::info!("{}...", n);
        }
    }

    pub async fn run() {
        console_error_panic_hook::set_once();
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            web_sys::console::error_1(&format!("Failed to init logger: {e}").into());
        }

        log::info!("Calculus Racer starting...");

        let Some(window) = web_sys::window() else {
            log::error!("No window; nothing to run");
            return;
        };

        let config = GameConfig::load();
        let questions = fetch_questions().await;

        let frames = BrowserFrames::new();
        let session = Rc::new(RefCell::new(GameSession::new(
            Rc::new(MonotonicClock::new()),
            Rc::new(frames.clone()),
            config,
        )));
        {
            let mut s = session.borrow_mut();
            s.set_questions(questions);
            s.on_state_change(log_state);
        }

        // Frame loop
        {
            let session = session.clone();
            frames.set_callback(Closure::<dyn FnMut(f64)>::new(move |time: f64| {
                if let Ok(mut s) = session.try_borrow_mut() {
                    s.frame(time);
                }
            }));
        }

        // Keyboard
        {
            let session = session.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: web_sys::KeyboardEvent| {
                let Ok(mut s) = session.try_borrow_mut() else {
                    return;
                };
                match event.key().as_str() {
                    "r" | "R" if s.state().is_race_finished => {
                        log::info!("Restarting race");
                        s.restart();
                    }
                    key => s.handle_input(key),
                }
            });
            let _ = window
                .add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        session.borrow_mut().start();
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn wasm_main() {
    wasm_game::run().await;
}

#[cfg(not(target_arch = "wasm32"))]
mod headless {
    use std::rc::Rc;

    use calculus_racer::multiplayer::{MemoryTransport, RoomManager};
    use calculus_racer::platform::{Clock, ManualClock, ManualFrames, SystemClock};
    use calculus_racer::questions::{ANSWER_COUNT, fallback_questions};
    use calculus_racer::sim::FeedbackState;
    use calculus_racer::{GameConfig, GameSession, RoomError};

    const FRAME_MS: f64 = 1000.0 / 60.0;
    const RACE_LIMIT_MS: f64 = 180_000.0;
    const PASSWORD: &str = "calculus";

    /// Scripted player: answers every question, fumbling once its streak
    /// reaches `fumble_at`, and alternates jerk/acceleration investments
    struct Bot {
        uid: &'static str,
        fumble_at: Option<u32>,
        session: GameSession,
        frames: ManualFrames,
    }

    impl Bot {
        fn new(uid: &'static str, fumble_at: Option<u32>, clock: &ManualClock) -> Self {
            let frames = ManualFrames::new();
            let mut session = GameSession::new(
                Rc::new(clock.clone()),
                Rc::new(frames.clone()),
                GameConfig::default(),
            );
            session.set_questions(fallback_questions());
            Self {
                uid,
                fumble_at,
                session,
                frames,
            }
        }

        fn frame(&mut self, now: f64) {
            self.frames.take_next();
            self.session.frame(now);
            self.act();
        }

        fn act(&mut self) {
            let state = self.session.state();
            if !state.is_game_active || state.is_race_finished {
                return;
            }
            if state.is_allocation_active {
                let key = if state.last_allocated_index == Some(3) { "3" } else { "4" };
                self.session.handle_input(key);
            } else if state.feedback_state == FeedbackState::Idle {
                let Some(question) = state.current_question else {
                    return;
                };
                let fumble = self.fumble_at.is_some_and(|n| state.streak >= n);
                let choice = if fumble {
                    (question.correct_index + 1) % ANSWER_COUNT
                } else {
                    question.correct_index
                };
                self.session.handle_input(&(choice + 1).to_string());
            }
        }
    }

    pub fn run() -> Result<(), RoomError> {
        let clock = ManualClock::new(0.0);
        let transport = MemoryTransport::new(Rc::new(clock.clone()));

        let mut rooms = RoomManager::new(Rc::new(transport.clone()), SystemClock.now_ms() as u64);
        let room_id = rooms.create_room("alice", PASSWORD)?;
        let member = rooms.join_room("bob", &room_id, PASSWORD)?;
        log::info!("Room {} ready; bob in slot {}", room_id, member.slot);

        let mut bots = vec![
            Bot::new("alice", None, &clock),
            Bot::new("bob", Some(3), &clock),
        ];
        for bot in &mut bots {
            bot.session
                .attach_sync(Rc::new(transport.clone()), &room_id, bot.uid);
            bot.session.start();
        }

        while clock.now_ms() < RACE_LIMIT_MS {
            clock.advance(FRAME_MS);
            let now = clock.now_ms();
            for bot in &mut bots {
                bot.frame(now);
            }
            if bots.iter().all(|b| b.session.state().is_race_finished) {
                break;
            }
        }

        let now = clock.now_ms();
        for bot in &bots {
            let physics = bot.session.physics_state();
            let peers = bot
                .session
                .sync()
                .map(|s| s.get_remote_players(now).len())
                .unwrap_or(0);
            if bot.session.state().is_race_finished {
                println!(
                    "{:>6}: finished in {:.2}s (pos {:.1}, jerk {:.1}), sees {} peer(s)",
                    bot.uid,
                    bot.session.race_time_ms().unwrap_or(0.0) / 1000.0,
                    physics.position,
                    physics.jerk,
                    peers
                );
            } else {
                println!("{:>6}: did not finish (pos {:.1})", bot.uid, physics.position);
            }
        }
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Calculus Racer (native) starting...");
    log::info!("Running a headless race - run with `trunk serve` for the web version");

    if let Err(e) = headless::run() {
        log::error!("Headless race failed: {}", e);
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}
