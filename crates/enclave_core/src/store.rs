//! Default state container
//!
//! `Store` keeps one plain-data state value and a slot map of listeners.
//! Writes are serialized through a single lock; listeners run after the lock
//! is released, so a listener may read (or write) the store again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::container::{InitError, Listener, StateContainer, StateUpdate, Subscription};
use crate::error::ContainerError;

new_key_type! {
    /// Identifier for a listener attached to a store
    pub struct ListenerId;
}

struct StoreInner {
    state: Value,
    listeners: SlotMap<ListenerId, Listener>,
    /// Number of committed writes
    version: u64,
}

/// Synchronous, clonable state container
///
/// Clones are handles to the same state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
}

impl Store {
    /// Create a store holding `initial`
    pub fn new(initial: Value) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                state: initial,
                listeners: SlotMap::with_key(),
                version: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of committed writes since creation
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Read the current state through a closure without cloning it
    pub fn with_state<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.lock().state)
    }

    fn detach(inner: &Weak<Mutex<StoreInner>>, id: ListenerId) {
        if let Some(inner) = inner.upgrade() {
            inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .listeners
                .remove(id);
        }
    }
}

/// Assign the top-level keys of `patch` onto `current`
fn assign(current: &Value, patch: Value) -> Result<Value, ContainerError> {
    let Value::Object(base) = current else {
        return Err(ContainerError::not_an_object(current));
    };
    let patch = match patch {
        Value::Object(patch) => patch,
        other => return Err(ContainerError::not_an_object(&other)),
    };

    let mut next = base.clone();
    for (key, value) in patch {
        next.insert(key, value);
    }
    Ok(Value::Object(next))
}

impl StateContainer for Store {
    fn create<F>(init: F) -> Result<Self, InitError>
    where
        F: FnOnce() -> Result<Value, InitError>,
    {
        init().map(Store::new)
    }

    fn get_state(&self) -> Value {
        self.lock().state.clone()
    }

    /// Replacers run against a snapshot with the lock released, so they may
    /// read or write this store. The write they return is committed last.
    fn set_state(&self, update: StateUpdate, replace: bool) {
        let next = match update {
            StateUpdate::Value(value) => value,
            replacer => replacer.resolve(&self.get_state()),
        };

        let (next, previous, listeners) = {
            let mut inner = self.lock();
            let next = if replace {
                next
            } else {
                match assign(&inner.state, next) {
                    Ok(next) => next,
                    Err(e) => {
                        warn!("Store::set_state: ignoring partial update: {}", e);
                        return;
                    }
                }
            };

            if next == inner.state {
                return;
            }

            let previous = std::mem::replace(&mut inner.state, next.clone());
            inner.version += 1;
            trace!(
                "Store::set_state: version {} ({} listeners)",
                inner.version,
                inner.listeners.len()
            );

            let listeners: SmallVec<[Listener; 4]> = inner.listeners.values().cloned().collect();
            (next, previous, listeners)
        };

        for listener in listeners {
            listener(&next, &previous);
        }
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        let id = self.lock().listeners.insert(listener);
        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || Store::detach(&weak, id))
    }

    fn release(&self) {
        self.lock().listeners.clear();
    }

    fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn same_container(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Store")
            .field("state", &inner.state)
            .field("listeners", &inner.listeners.len())
            .field("version", &inner.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_create_runs_initializer() {
        let store = Store::create(|| Ok(json!({ "count": 0 }))).unwrap();
        assert_eq!(store.get_state(), json!({ "count": 0 }));
    }

    #[test]
    fn test_create_propagates_initializer_error() {
        let result = Store::create(|| Err("boom".into()));
        let err = result.err().expect("initializer should fail");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_partial_update_assigns_top_level_keys() {
        let store = Store::new(json!({ "a": 1, "nested": { "x": 1, "y": 2 } }));
        store.set_state(StateUpdate::Value(json!({ "nested": { "x": 5 } })), false);

        assert_eq!(store.get_state(), json!({ "a": 1, "nested": { "x": 5 } }));
    }

    #[test]
    fn test_replace_discards_missing_keys() {
        let store = Store::new(json!({ "a": 1, "b": 2 }));
        store.set_state(StateUpdate::Value(json!({ "b": 3 })), true);

        assert_eq!(store.get_state(), json!({ "b": 3 }));
    }

    #[test]
    fn test_replacer_sees_current_state() {
        let store = Store::new(json!({ "count": 1 }));
        store.set_state(
            StateUpdate::replacer(|s| json!({ "count": s["count"].as_i64().unwrap_or(0) + 1 })),
            true,
        );

        assert_eq!(store.get_state(), json!({ "count": 2 }));
    }

    #[test]
    fn test_replacer_can_read_store() {
        let store = Store::new(json!({ "count": 1 }));
        let handle = store.clone();
        let (tx, rx) = std::sync::mpsc::channel();

        std::thread::spawn(move || {
            store.set_state(
                StateUpdate::replacer(move |s| {
                    let seen = handle.get_state();
                    json!({ "count": s["count"].as_i64().unwrap() + seen["count"].as_i64().unwrap() })
                }),
                true,
            );
            tx.send(store.get_state()).unwrap();
        });

        let state = rx
            .recv_timeout(std::time::Duration::from_secs(3))
            .expect("set_state with a reading replacer should return");
        assert_eq!(state, json!({ "count": 2 }));
    }

    #[test]
    fn test_replacer_result_commits_after_inner_write() {
        let store = Store::new(json!({ "count": 0 }));
        let handle = store.clone();

        store.set_state(
            StateUpdate::replacer(move |_| {
                handle.set_state(json!({ "count": 5, "inner": true }).into(), true);
                json!({ "count": 1 })
            }),
            false,
        );

        assert_eq!(store.get_state(), json!({ "count": 1, "inner": true }));
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn test_with_state_borrows_without_cloning() {
        let store = Store::new(json!({ "items": [1, 2, 3] }));
        let len = store.with_state(|s| s["items"].as_array().map(Vec::len));

        assert_eq!(len, Some(3));
    }

    #[test]
    fn test_partial_update_on_non_object_is_ignored() {
        let store = Store::new(json!(7));
        store.set_state(StateUpdate::Value(json!({ "a": 1 })), false);

        assert_eq!(store.get_state(), json!(7));
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_listeners_receive_next_and_previous() {
        let store = Store::new(json!({ "count": 0 }));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let _sub = store.subscribe(Arc::new(move |next: &Value, prev: &Value| {
            seen_clone
                .lock()
                .unwrap()
                .push((next["count"].clone(), prev["count"].clone()));
        }));

        store.set_state(json!({ "count": 1 }).into(), false);
        store.set_state(json!({ "count": 2 }).into(), false);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(json!(1), json!(0)), (json!(2), json!(1))]
        );
    }

    #[test]
    fn test_unchanged_write_does_not_notify() {
        let store = Store::new(json!({ "count": 0 }));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let _sub = store.subscribe(Arc::new(move |_: &Value, _: &Value| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        store.set_state(json!({ "count": 0 }).into(), true);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_unsubscribe_detaches_listener() {
        let store = Store::new(json!({}));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let sub = store.subscribe(Arc::new(move |_: &Value, _: &Value| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(store.listener_count(), 1);

        sub.unsubscribe();
        store.set_state(json!({ "a": 1 }).into(), false);

        assert_eq!(store.listener_count(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listener_can_read_store() {
        let store = Store::new(json!({ "count": 0 }));
        let observed = Arc::new(Mutex::new(None));
        let observed_clone = observed.clone();
        let handle = store.clone();

        let _sub = store.subscribe(Arc::new(move |_: &Value, _: &Value| {
            *observed_clone.lock().unwrap() = Some(handle.get_state());
        }));
        store.set_state(json!({ "count": 3 }).into(), false);

        assert_eq!(*observed.lock().unwrap(), Some(json!({ "count": 3 })));
    }

    #[test]
    fn test_release_clears_listeners() {
        let store = Store::new(json!({}));
        let _a = store.subscribe(Arc::new(|_: &Value, _: &Value| {}));
        let _b = store.subscribe(Arc::new(|_: &Value, _: &Value| {}));
        assert_eq!(store.listener_count(), 2);

        store.release();
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_same_container() {
        let a = Store::new(json!({}));
        let b = Store::new(json!({}));

        assert!(a.same_container(&a.clone()));
        assert!(!a.same_container(&b));
    }
}
