//! Synchronous publish/subscribe registry
//!
//! Callbacks run in subscription order on the caller's stack. A
//! [`Subscription`] removes its callback; removing twice, or after the
//! registry is gone, does nothing.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Callback<T> = Rc<RefCell<dyn FnMut(&T)>>;

struct Registry<T: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// Registry of callbacks receiving `&T`
pub struct Subscribers<T: 'static> {
    registry: Rc<RefCell<Registry<T>>>,
}

impl<T: 'static> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                next_id: 1,
                entries: Vec::new(),
            })),
        }
    }

    pub fn subscribe(&self, callback: impl FnMut(&T) + 'static) -> Subscription {
        let mut reg = self.registry.borrow_mut();
        let id = reg.next_id;
        reg.next_id += 1;
        let callback: Callback<T> = Rc::new(RefCell::new(callback));
        reg.entries.push((id, callback));

        let weak: Weak<RefCell<Registry<T>>> = Rc::downgrade(&self.registry);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(reg) = weak.upgrade() {
                    reg.borrow_mut().entries.retain(|(eid, _)| *eid != id);
                }
            })),
        }
    }

    /// Invoke every callback registered at the time of the call
    ///
    /// The list is snapshotted first, so callbacks may unsubscribe
    /// themselves or others while being notified.
    pub fn notify(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = self
            .registry
            .borrow()
            .entries
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        for cb in callbacks {
            // A callback that re-enters its own notification is skipped
            if let Ok(mut f) = cb.try_borrow_mut() {
                (*f)(value);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.registry.borrow_mut().entries.clear();
    }
}

/// Disposer returned by [`Subscribers::subscribe`]
///
/// Dropping without calling `unsubscribe` keeps the callback registered.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn unsubscribe(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    pub fn is_active(&self) -> bool {
        self.remove.is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_notify_and_unsubscribe_idempotent() {
        let subs = Subscribers::<u32>::new();
        let seen = Rc::new(Cell::new(0));
        let s = seen.clone();
        let mut handle = subs.subscribe(move |v| s.set(s.get() + *v));

        subs.notify(&2);
        assert_eq!(seen.get(), 2);

        handle.unsubscribe();
        handle.unsubscribe();
        assert!(!handle.is_active());
        subs.notify(&5);
        assert_eq!(seen.get(), 2);
        assert!(subs.is_empty());
    }

    #[test]
    fn test_unsubscribe_during_notify() {
        let subs = Subscribers::<()>::new();
        let hits = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let (h, sl) = (hits.clone(), slot.clone());
        let handle = subs.subscribe(move |_| {
            h.set(h.get() + 1);
            if let Some(mut sub) = sl.borrow_mut().take() {
                sub.unsubscribe();
            }
        });
        *slot.borrow_mut() = Some(handle);

        subs.notify(&());
        subs.notify(&());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let subs = Subscribers::<u8>::new();
        let mut handle = subs.subscribe(|_| {});
        drop(subs);
        handle.unsubscribe();
        assert!(!handle.is_active());
    }
}
