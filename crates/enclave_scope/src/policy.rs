//! Strict/fallback policy
//!
//! Every failed resolution goes through [`handle_failure`]:
//!
//! 1. the definition's error hook (if any) sees the error and may abort with its own
//! 2. strict definitions return the error
//! 3. non-strict definitions degrade; the caller picks the substitute
//!
//! The substitutes differ by reason. With no scope at all there is no live
//! instance, so the caller gets a [`FallbackSnapshot`] of the static fallback
//! state. When only the key is missing, the nearest live instance stands in.

use std::fmt;
use std::sync::Arc;

use enclave_core::{Listener, StateUpdate, Subscription};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::definition::StoreDefinition;
use crate::error::ScopeError;
use crate::key::InstanceKey;

/// Why a resolution failed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    NoScope,
    KeyNotFound(InstanceKey),
}

impl FailureReason {
    pub fn into_error(self, store: &str) -> ScopeError {
        match self {
            FailureReason::NoScope => ScopeError::NoScope {
                store: store.to_string(),
            },
            FailureReason::KeyNotFound(key) => ScopeError::KeyNotFound {
                store: store.to_string(),
                key,
            },
        }
    }
}

/// Apply the policy to a failure; `Ok` means the caller should degrade
pub(crate) fn handle_failure(
    definition: &StoreDefinition,
    reason: FailureReason,
) -> Result<(), ScopeError> {
    let error = reason.into_error(definition.name());

    if let Some(hook) = definition.on_error() {
        hook(&error)?;
    }

    if definition.is_strict() {
        return Err(error);
    }

    if definition.debug() {
        debug!("{}: resolution degraded: {}", definition.name(), error);
    }
    Ok(())
}

/// Read-only stand-in served when no scope exists
///
/// Holds the definition's static fallback state (or an empty object). Writes
/// and mutator calls are ignored with a warning; subscriptions never fire.
#[derive(Clone)]
pub struct FallbackSnapshot {
    definition: StoreDefinition,
    state: Arc<Value>,
}

impl FallbackSnapshot {
    pub(crate) fn new(definition: StoreDefinition) -> Self {
        let state = definition
            .fallback_state()
            .cloned()
            .unwrap_or_else(|| Arc::new(Value::Object(Map::new())));
        Self { definition, state }
    }

    pub fn store_name(&self) -> &str {
        self.definition.name()
    }

    pub fn get_state(&self) -> Value {
        (*self.state).clone()
    }

    pub fn select<T>(&self, selector: impl FnOnce(&Value) -> T) -> T {
        selector(&self.state)
    }

    pub fn set_state(&self, _update: impl Into<StateUpdate>, _replace: bool) {
        warn!(
            "{}: set_state on fallback state ignored; no scope is mounted",
            self.definition.name()
        );
    }

    pub fn dispatch(&self, mutator: &str, _payload: Value) -> Result<(), ScopeError> {
        if self.definition.mutator(mutator).is_none() {
            return Err(ScopeError::UnknownMutator {
                store: self.definition.name().to_string(),
                mutator: mutator.to_string(),
            });
        }

        warn!(
            "{}: mutator {} on fallback state ignored; no scope is mounted",
            self.definition.name(),
            mutator
        );
        Ok(())
    }

    pub fn subscribe(&self, _listener: Listener) -> Subscription {
        Subscription::inert()
    }
}

impl fmt::Debug for FallbackSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackSnapshot")
            .field("store", &self.definition.name())
            .field("state", &self.state)
            .finish()
    }
}
