//! Cancelable delayed events
//!
//! Phase transitions (feedback delay, allocation confirmation, friction
//! spike refresh, countdown) are queued here instead of fire-and-forget
//! timers. The owner polls with the current time; `clear` on teardown
//! guarantees nothing queued earlier can fire afterwards.

/// Handle for a queued event
pub type TimerId = u64;

#[derive(Debug, Clone)]
struct Pending<E> {
    id: TimerId,
    due_ms: f64,
    event: E,
}

/// Queue of events keyed by absolute due time
#[derive(Debug, Clone)]
pub struct TimerQueue<E> {
    pending: Vec<Pending<E>>,
    next_id: TimerId,
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            next_id: 1,
        }
    }

    /// Queue `event` to fire once `now >= due_ms`
    pub fn schedule(&mut self, due_ms: f64, event: E) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push(Pending { id, due_ms, event });
        id
    }

    /// Drop a queued event; unknown ids are ignored
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.id != id);
        self.pending.len() != before
    }

    /// Drop queued events matching `pred`
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&E) -> bool) {
        self.pending.retain(|p| !pred(&p.event));
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Earliest due time, if anything is queued
    pub fn next_due(&self) -> Option<f64> {
        self.pending
            .iter()
            .map(|p| p.due_ms)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Remove and return the earliest event due at `now_ms`
    ///
    /// Ties fire in scheduling order.
    pub fn pop_due(&mut self, now_ms: f64) -> Option<(TimerId, E)> {
        let idx = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due_ms <= now_ms)
            .min_by(|(_, a), (_, b)| a.due_ms.total_cmp(&b.due_ms).then(a.id.cmp(&b.id)))
            .map(|(i, _)| i)?;
        let p = self.pending.remove(idx);
        Some((p.id, p.event))
    }
}
