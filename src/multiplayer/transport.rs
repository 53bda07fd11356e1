//! Realtime database abstraction
//!
//! The game talks to a hierarchical JSON store (Firebase Realtime Database
//! shaped): slash-separated paths, value listeners that fire with the
//! whole subtree, server-side on-disconnect writes and a server timestamp
//! placeholder. [`MemoryTransport`] is a complete in-process store used
//! by tests and the native build.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value, json};

use crate::error::{TransportError, TransportResult};
use crate::platform::Clock;

/// Virtual path reporting this client's connectivity as a bool
pub const CONNECTED_PATH: &str = ".info/connected";

/// Handle for a value listener
pub type ListenerId = u64;

/// Called with the value at the listened path (`None` if absent)
pub type ValueCallback = Box<dyn FnMut(Option<&Value>)>;

/// Placeholder the server replaces with its own clock on write
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.len() == 1 && o.get(".sv").and_then(Value::as_str) == Some("timestamp"))
}

/// Split a path into its non-empty segments
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

pub trait Transport {
    /// Replace the value at `path` (`Null` deletes)
    fn set(&self, path: &str, value: Value) -> TransportResult<()>;

    /// Merge the fields of an object into the value at `path`
    fn update(&self, path: &str, fields: Value) -> TransportResult<()>;

    fn get(&self, path: &str) -> TransportResult<Option<Value>>;

    /// Atomically rewrite the value at `path`
    ///
    /// `apply` receives the current value and returns the replacement, or
    /// `None` to abort. Returns whether the write was committed.
    fn transaction(
        &self,
        path: &str,
        apply: &mut dyn FnMut(Option<&Value>) -> Option<Value>,
    ) -> TransportResult<bool>;

    /// Listen for changes at or below `path`; fires once immediately
    fn subscribe(&self, path: &str, callback: ValueCallback) -> TransportResult<ListenerId>;

    /// Remove a listener; unknown ids are ignored
    fn unsubscribe(&self, id: ListenerId);

    /// Register an update the server applies if this client drops
    fn on_disconnect_update(&self, path: &str, fields: Value) -> TransportResult<()>;

    /// Drop on-disconnect updates registered for `path`
    fn cancel_on_disconnect(&self, path: &str);
}

struct Listener {
    id: ListenerId,
    path: String,
    /// Taken out while the callback runs
    callback: Option<ValueCallback>,
}

struct Inner {
    root: Value,
    listeners: Vec<Listener>,
    on_disconnect: Vec<(String, Value)>,
    next_listener_id: ListenerId,
    connected: bool,
    fail_writes: bool,
}

/// In-process realtime store
///
/// Clones share the same data, like two handles onto one database.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Rc<RefCell<Inner>>,
    clock: Rc<dyn Clock>,
}

impl MemoryTransport {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                root: Value::Object(Map::new()),
                listeners: Vec::new(),
                on_disconnect: Vec::new(),
                next_listener_id: 1,
                connected: true,
                fail_writes: false,
            })),
            clock,
        }
    }

    /// Make every subsequent write fail (simulated outage)
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.borrow().connected
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    /// Simulate the client dropping: on-disconnect updates are applied
    /// server-side and connectivity listeners see `false`
    pub fn disconnect(&self) {
        let pending = {
            let mut inner = self.inner.borrow_mut();
            if !inner.connected {
                return;
            }
            inner.connected = false;
            std::mem::take(&mut inner.on_disconnect)
        };
        for (path, fields) in pending {
            if let Err(e) = self.apply_update(&path, fields) {
                log::warn!("On-disconnect update for {} failed: {}", path, e);
            }
        }
        self.fire(CONNECTED_PATH);
    }

    pub fn reconnect(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.connected {
                return;
            }
            inner.connected = true;
        }
        self.fire(CONNECTED_PATH);
    }

    fn check_writable(&self, path: &str) -> TransportResult<()> {
        let inner = self.inner.borrow();
        if inner.fail_writes || !inner.connected {
            return Err(TransportError::Unavailable(format!("write to {path} failed")));
        }
        if path.starts_with(".info") {
            return Err(TransportError::Rejected {
                path: path.to_string(),
                reason: "read-only path".to_string(),
            });
        }
        Ok(())
    }

    fn resolve(&self, value: Value) -> Value {
        match value {
            v if is_server_timestamp(&v) => json!(self.clock.now_ms()),
            Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, self.resolve(v))).collect())
            }
            Value::Array(items) => Value::Array(items.into_iter().map(|v| self.resolve(v)).collect()),
            other => other,
        }
    }

    fn read(&self, path: &str) -> Option<Value> {
        let inner = self.inner.borrow();
        if path == CONNECTED_PATH {
            return Some(Value::Bool(inner.connected));
        }
        let mut node = &inner.root;
        for seg in segments(path) {
            node = node.as_object()?.get(seg)?;
        }
        Some(node.clone())
    }

    /// Write without connectivity checks or notification
    fn write(&self, path: &str, value: Value) {
        let value = self.resolve(value);
        let segs = segments(path);
        let mut inner = self.inner.borrow_mut();
        let Some((last, parents)) = segs.split_last() else {
            inner.root = if value.is_object() {
                value
            } else {
                Value::Object(Map::new())
            };
            return;
        };

        let mut node = &mut inner.root;
        for seg in parents {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Some(map) = node.as_object_mut() else {
                return;
            };
            node = map
                .entry(seg.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        if let Some(map) = node.as_object_mut() {
            if value.is_null() {
                map.remove(*last);
            } else {
                map.insert(last.to_string(), value);
            }
        }
    }

    fn apply_update(&self, path: &str, fields: Value) -> TransportResult<()> {
        let Value::Object(fields) = fields else {
            return Err(TransportError::Rejected {
                path: path.to_string(),
                reason: "update requires an object".to_string(),
            });
        };
        let base = segments(path).join("/");
        for (key, value) in fields {
            self.write(&format!("{base}/{key}"), value);
        }
        self.fire(path);
        Ok(())
    }

    /// Notify listeners whose path overlaps `changed`
    fn fire(&self, changed: &str) {
        let changed_segs = segments(changed);
        let targets: Vec<(ListenerId, String)> = self
            .inner
            .borrow()
            .listeners
            .iter()
            .filter(|l| {
                let ls = segments(&l.path);
                ls.starts_with(&changed_segs) || changed_segs.starts_with(&ls)
            })
            .map(|l| (l.id, l.path.clone()))
            .collect();

        for (id, path) in targets {
            self.invoke(id, &path);
        }
    }

    fn invoke(&self, id: ListenerId, path: &str) {
        let callback = self
            .inner
            .borrow_mut()
            .listeners
            .iter_mut()
            .find(|l| l.id == id)
            .and_then(|l| l.callback.take());
        let Some(mut callback) = callback else {
            return;
        };

        let value = self.read(path);
        callback(value.as_ref());

        // Put it back unless it was unsubscribed meanwhile
        if let Some(l) = self
            .inner
            .borrow_mut()
            .listeners
            .iter_mut()
            .find(|l| l.id == id)
        {
            l.callback = Some(callback);
        }
    }
}

impl Transport for MemoryTransport {
    fn set(&self, path: &str, value: Value) -> TransportResult<()> {
        self.check_writable(path)?;
        self.write(path, value);
        self.fire(path);
        Ok(())
    }

    fn update(&self, path: &str, fields: Value) -> TransportResult<()> {
        self.check_writable(path)?;
        self.apply_update(path, fields)
    }

    fn get(&self, path: &str) -> TransportResult<Option<Value>> {
        Ok(self.read(path))
    }

    fn transaction(
        &self,
        path: &str,
        apply: &mut dyn FnMut(Option<&Value>) -> Option<Value>,
    ) -> TransportResult<bool> {
        self.check_writable(path)?;
        let current = self.read(path);
        match apply(current.as_ref()) {
            Some(next) => {
                self.write(path, next);
                self.fire(path);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn subscribe(&self, path: &str, callback: ValueCallback) -> TransportResult<ListenerId> {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            inner.listeners.push(Listener {
                id,
                path: path.to_string(),
                callback: Some(callback),
            });
            id
        };
        self.invoke(id, path);
        Ok(id)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.inner.borrow_mut().listeners.retain(|l| l.id != id);
    }

    fn on_disconnect_update(&self, path: &str, fields: Value) -> TransportResult<()> {
        if !fields.is_object() {
            return Err(TransportError::Rejected {
                path: path.to_string(),
                reason: "update requires an object".to_string(),
            });
        }
        self.inner
            .borrow_mut()
            .on_disconnect
            .push((path.to_string(), fields));
        Ok(())
    }

    fn cancel_on_disconnect(&self, path: &str) {
        self.inner
            .borrow_mut()
            .on_disconnect
            .retain(|(p, _)| p != path);
    }
}
