//! Store extensions
//!
//! Hooks for wrapping instances with outside behavior such as persistence or
//! time-travel debugging. The registry calls them at the two points of an
//! instance's life it controls; everything else goes through the container.

use enclave_core::StateContainer;

use crate::key::InstanceKey;

pub trait StoreExtension: Send + Sync {
    fn name(&self) -> &str;

    /// Called once a node's instance is fully constructed and registered
    fn on_create(&self, _store: &str, _key: &InstanceKey, _container: &dyn StateContainer) {}

    /// Called when the owning boundary is torn down, after listeners are released
    fn on_release(&self, _store: &str, _key: &InstanceKey) {}
}
