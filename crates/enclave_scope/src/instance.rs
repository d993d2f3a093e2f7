//! Live store instances

use std::fmt;

use enclave_core::{Listener, StateContainer, StateUpdate, Store, Subscription};
use serde_json::Value;
use tracing::trace;

use crate::definition::StoreDefinition;
use crate::error::ScopeError;
use crate::key::InstanceKey;

/// One container created from a store definition, published under a key
///
/// Clones are handles to the same container. The owning registry node holds
/// one; descendant nodes hold more in their inherited maps.
#[derive(Clone)]
pub struct Instance<C = Store> {
    key: InstanceKey,
    container: C,
    definition: StoreDefinition,
}

impl<C: StateContainer> Instance<C> {
    pub(crate) fn new(key: InstanceKey, container: C, definition: StoreDefinition) -> Self {
        Self {
            key,
            container,
            definition,
        }
    }

    pub fn key(&self) -> &InstanceKey {
        &self.key
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    pub fn definition(&self) -> &StoreDefinition {
        &self.definition
    }

    pub fn get_state(&self) -> Value {
        self.container.get_state()
    }

    pub fn select<T>(&self, selector: impl FnOnce(&Value) -> T) -> T {
        selector(&self.container.get_state())
    }

    pub fn set_state(&self, update: impl Into<StateUpdate>, replace: bool) {
        self.container.set_state(update.into(), replace);
    }

    /// Run a named mutator against the current state
    pub fn dispatch(&self, mutator: &str, payload: Value) -> Result<(), ScopeError> {
        let Some(f) = self.definition.mutator(mutator).cloned() else {
            return Err(ScopeError::UnknownMutator {
                store: self.definition.name().to_string(),
                mutator: mutator.to_string(),
            });
        };

        trace!("{}[{}]: dispatch {}", self.definition.name(), self.key, mutator);
        self.container
            .set_state(StateUpdate::replacer(move |state| f(state, payload)), true);
        Ok(())
    }

    pub fn subscribe(&self, listener: Listener) -> Subscription {
        self.container.subscribe(listener)
    }

    /// Whether both handles point at the same container
    pub fn same_instance(&self, other: &Self) -> bool {
        self.container.same_container(&other.container)
    }
}

impl<C> fmt::Debug for Instance<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("store", &self.definition.name())
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
