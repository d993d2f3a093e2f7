//! State container contract
//!
//! The scope registry never touches state directly. Everything it needs from
//! a reactive primitive goes through [`StateContainer`]: create from an
//! initializer, read a snapshot, write (patch or replace), and subscribe.
//!
//! The trait is object safe so extensions can be handed a `&dyn StateContainer`
//! without knowing the concrete container type.

use std::fmt;

use serde_json::Value;

/// Error produced by a state initializer
pub type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Change listener, called with `(next, previous)` after every committed write
pub type Listener = std::sync::Arc<dyn Fn(&Value, &Value) + Send + Sync>;

/// Next state passed to [`StateContainer::set_state`]
pub enum StateUpdate {
    /// A literal next state (or patch, when not replacing)
    Value(Value),
    /// Computes the next state from the current one
    Replacer(Box<dyn FnOnce(&Value) -> Value + Send>),
}

impl StateUpdate {
    /// Create an update from a closure over the current state
    pub fn replacer<F>(f: F) -> Self
    where
        F: FnOnce(&Value) -> Value + Send + 'static,
    {
        StateUpdate::Replacer(Box::new(f))
    }

    /// Produce the update's value against the current state
    pub fn resolve(self, current: &Value) -> Value {
        match self {
            StateUpdate::Value(value) => value,
            StateUpdate::Replacer(f) => f(current),
        }
    }
}

impl From<Value> for StateUpdate {
    fn from(value: Value) -> Self {
        StateUpdate::Value(value)
    }
}

impl fmt::Debug for StateUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateUpdate::Value(value) => f.debug_tuple("Value").field(value).finish(),
            StateUpdate::Replacer(_) => f.write_str("Replacer(..)"),
        }
    }
}

/// Handle returned by [`StateContainer::subscribe`]
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Create a subscription that runs `release` when unsubscribed
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A subscription that is attached to nothing
    pub fn inert() -> Self {
        Self { release: None }
    }

    /// Whether unsubscribing would detach a live listener
    pub fn is_inert(&self) -> bool {
        self.release.is_none()
    }

    /// Detach the listener
    pub fn unsubscribe(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("inert", &self.is_inert())
            .finish()
    }
}

/// Reactive state container consumed by the scope registry
pub trait StateContainer: Send + Sync + 'static {
    /// Create a fresh container by running `init`
    ///
    /// An initializer error is returned unchanged and no container is created.
    fn create<F>(init: F) -> Result<Self, InitError>
    where
        F: FnOnce() -> Result<Value, InitError>,
        Self: Sized;

    /// Snapshot of the current state
    fn get_state(&self) -> Value;

    /// Write the next state
    ///
    /// With `replace = true` the update becomes the whole state. Otherwise its
    /// top-level keys are assigned onto the current state.
    fn set_state(&self, update: StateUpdate, replace: bool);

    /// Register a listener called synchronously after each committed write
    fn subscribe(&self, listener: Listener) -> Subscription;

    /// Drop every listener attached to this container
    fn release(&self);

    /// Number of attached listeners
    fn listener_count(&self) -> usize;

    /// Whether `other` is a handle to the same underlying container
    fn same_container(&self, other: &Self) -> bool
    where
        Self: Sized;
}
