//! Platform abstraction layer
//!
//! Handles browser/native differences for:
//! - Wall-clock time (milliseconds)
//! - Per-frame callbacks (requestAnimationFrame on web)
//!
//! Everything in `sim` and `multiplayer` reads time through [`Clock`] so
//! tests can drive it with [`ManualClock`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Source of the current time in milliseconds
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Epoch wall clock (`Date.now()` on web)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[cfg(target_arch = "wasm32")]
    fn now_ms(&self) -> f64 {
        js_sys::Date::now()
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn now_ms(&self) -> f64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }
}

/// Monotonic high-resolution clock (`performance.now()` on web)
///
/// Frame timestamps from requestAnimationFrame share this time base.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    #[cfg(not(target_arch = "wasm32"))]
    origin: std::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            origin: std::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[cfg(target_arch = "wasm32")]
    fn now_ms(&self) -> f64 {
        web_sys::window()
            .and_then(|w| w.performance())
            .map(|p| p.now())
            .unwrap_or_else(js_sys::Date::now)
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Manually advanced clock for tests and headless runs
///
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, ms: f64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

/// Handle for a scheduled frame callback
pub type FrameId = u32;

/// Per-frame callback facility
///
/// The host invokes the scheduler's frame handler when a requested frame
/// arrives; `cancel_frame` must guarantee a cancelled frame never arrives.
pub trait FrameHost {
    fn request_frame(&self) -> FrameId;
    fn cancel_frame(&self, id: FrameId);
}

/// Records frame requests without ever delivering them
///
/// Tests and the native demo call the scheduler's frame handler directly
/// and inspect which frames are still pending.
#[derive(Debug, Clone, Default)]
pub struct ManualFrames {
    inner: Rc<RefCell<ManualFramesInner>>,
}

#[derive(Debug, Default)]
struct ManualFramesInner {
    next_id: FrameId,
    pending: Vec<FrameId>,
}

impl ManualFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame ids requested and not yet cancelled or taken
    pub fn pending(&self) -> Vec<FrameId> {
        self.inner.borrow().pending.clone()
    }

    /// Consume the oldest pending frame, as if the host delivered it
    pub fn take_next(&self) -> Option<FrameId> {
        let mut inner = self.inner.borrow_mut();
        if inner.pending.is_empty() {
            None
        } else {
            Some(inner.pending.remove(0))
        }
    }
}

impl FrameHost for ManualFrames {
    fn request_frame(&self) -> FrameId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.pending.push(id);
        id
    }

    fn cancel_frame(&self, id: FrameId) {
        self.inner.borrow_mut().pending.retain(|&f| f != id);
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserFrames;

#[cfg(target_arch = "wasm32")]
mod browser {
    use std::cell::RefCell;
    use std::rc::Rc;

    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::*;

    use super::{FrameHost, FrameId};

    /// requestAnimationFrame-backed frame host
    ///
    /// The frame callback is installed after construction because it
    /// usually captures the session that owns this host.
    #[derive(Clone, Default)]
    pub struct BrowserFrames {
        callback: Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>,
    }

    impl BrowserFrames {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_callback(&self, callback: Closure<dyn FnMut(f64)>) {
            *self.callback.borrow_mut() = Some(callback);
        }
    }

    impl FrameHost for BrowserFrames {
        fn request_frame(&self) -> FrameId {
            let Some(window) = web_sys::window() else {
                log::error!("No window; cannot schedule frame");
                return 0;
            };
            let callback = self.callback.borrow();
            match callback.as_ref() {
                Some(cb) => window
                    .request_animation_frame(cb.as_ref().unchecked_ref())
                    .map(|id| id as FrameId)
                    .unwrap_or(0),
                None => {
                    log::error!("Frame callback not installed");
                    0
                }
            }
        }

        fn cancel_frame(&self, id: FrameId) {
            if let Some(window) = web_sys::window() {
                let _ = window.cancel_animation_frame(id as i32);
            }
        }
    }
}
