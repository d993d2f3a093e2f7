//! Resolution engine
//!
//! Maps a consumer's request to an instance. The consumer passes the nearest
//! enclosing node (if the host found one) and optionally an explicit key:
//!
//! - no node: the policy runs with [`FailureReason::NoScope`]
//! - no key: the node's own instance, the common path
//! - key present in the node's inherited map: that instance
//! - key missing: the policy runs with [`FailureReason::KeyNotFound`]; if it
//!   degrades, the node's own instance stands in
//!
//! Lookups are single map probes; nothing walks the tree at read time.

use enclave_core::{Listener, StateContainer, StateUpdate, Store, Subscription};
use serde_json::Value;
use tracing::trace;

use crate::error::ScopeError;
use crate::instance::Instance;
use crate::key::InstanceKey;
use crate::policy::{handle_failure, FailureReason, FallbackSnapshot};
use crate::registry::{NodeId, ScopeRegistry};

/// Result of a resolution
#[derive(Clone, Debug)]
pub enum Resolved<C = Store> {
    /// A live, writable instance
    Live(Instance<C>),
    /// The read-only fallback served when no scope exists
    Fallback(FallbackSnapshot),
}

impl<C: StateContainer> Resolved<C> {
    pub fn is_live(&self) -> bool {
        matches!(self, Resolved::Live(_))
    }

    pub fn as_instance(&self) -> Option<&Instance<C>> {
        match self {
            Resolved::Live(instance) => Some(instance),
            Resolved::Fallback(_) => None,
        }
    }

    pub fn into_instance(self) -> Option<Instance<C>> {
        match self {
            Resolved::Live(instance) => Some(instance),
            Resolved::Fallback(_) => None,
        }
    }

    /// Key of the live instance; `None` for the fallback
    pub fn key(&self) -> Option<&InstanceKey> {
        self.as_instance().map(Instance::key)
    }

    pub fn get_state(&self) -> Value {
        match self {
            Resolved::Live(instance) => instance.get_state(),
            Resolved::Fallback(snapshot) => snapshot.get_state(),
        }
    }

    pub fn select<T>(&self, selector: impl FnOnce(&Value) -> T) -> T {
        match self {
            Resolved::Live(instance) => instance.select(selector),
            Resolved::Fallback(snapshot) => snapshot.select(selector),
        }
    }

    pub fn set_state(&self, update: impl Into<StateUpdate>, replace: bool) {
        match self {
            Resolved::Live(instance) => instance.set_state(update, replace),
            Resolved::Fallback(snapshot) => snapshot.set_state(update, replace),
        }
    }

    pub fn dispatch(&self, mutator: &str, payload: Value) -> Result<(), ScopeError> {
        match self {
            Resolved::Live(instance) => instance.dispatch(mutator, payload),
            Resolved::Fallback(snapshot) => snapshot.dispatch(mutator, payload),
        }
    }

    pub fn subscribe(&self, listener: Listener) -> Subscription {
        match self {
            Resolved::Live(instance) => instance.subscribe(listener),
            Resolved::Fallback(snapshot) => snapshot.subscribe(listener),
        }
    }
}

/// Consumer-side lookup options
#[derive(Clone, Debug, Default)]
pub struct ResolveOptions {
    /// Explicit instance key; the nearest instance when `None`
    pub from: Option<InstanceKey>,
}

impl ResolveOptions {
    pub fn from_key(key: impl Into<InstanceKey>) -> Self {
        Self {
            from: Some(key.into()),
        }
    }
}

impl<C: StateContainer + Clone> ScopeRegistry<C> {
    /// Resolve `key` as seen from `node`
    ///
    /// `node` is the nearest enclosing node, or `None` when the consumer is
    /// outside every boundary. A node that has been removed counts as none.
    pub fn resolve(
        &self,
        node: Option<NodeId>,
        key: Option<&InstanceKey>,
    ) -> Result<Resolved<C>, ScopeError> {
        let definition = self.definition();

        let Some(node) = node.and_then(|id| self.node(id)) else {
            handle_failure(definition, FailureReason::NoScope)?;
            return Ok(Resolved::Fallback(FallbackSnapshot::new(definition.clone())));
        };

        let Some(key) = key else {
            return Ok(Resolved::Live(node.local_instance().clone()));
        };

        match node.lookup(key) {
            Some(instance) => {
                trace!("{}: resolved {}", definition.name(), key);
                Ok(Resolved::Live(instance.clone()))
            }
            None => {
                handle_failure(definition, FailureReason::KeyNotFound(key.clone()))?;
                Ok(Resolved::Live(node.local_instance().clone()))
            }
        }
    }

    /// Handle to the resolved instance, for writes and subscriptions
    pub fn use_store(
        &self,
        node: Option<NodeId>,
        options: &ResolveOptions,
    ) -> Result<Resolved<C>, ScopeError> {
        self.resolve(node, options.from.as_ref())
    }

    /// Full state of the nearest instance
    pub fn use_state(&self, node: Option<NodeId>) -> Result<Value, ScopeError> {
        self.resolve(node, None).map(|resolved| resolved.get_state())
    }

    /// Selected slice of the resolved instance's state
    pub fn use_selector<T>(
        &self,
        node: Option<NodeId>,
        selector: impl FnOnce(&Value) -> T,
        options: &ResolveOptions,
    ) -> Result<T, ScopeError> {
        self.use_store(node, options)
            .map(|resolved| resolved.select(selector))
    }

    /// Like [`use_selector`](Self::use_selector), but returns `fallback` on any failure
    pub fn use_selector_or<T>(
        &self,
        node: Option<NodeId>,
        selector: impl FnOnce(&Value) -> T,
        options: &ResolveOptions,
        fallback: T,
    ) -> T {
        match self.use_store(node, options) {
            Ok(resolved) => resolved.select(selector),
            Err(e) => {
                trace!("{}: using caller fallback: {}", self.definition().name(), e);
                fallback
            }
        }
    }
}
