//! Enclave Scoped Stores
//!
//! Instantiate one store definition many times, each instance scoped to a
//! subtree of a component tree:
//!
//! - **Definitions**: an initializer, named mutators and configuration,
//!   built once ([`StoreDefinition`])
//! - **Registry nodes**: one per mounted boundary, holding the boundary's own
//!   instance plus everything inherited from enclosing boundaries
//!   ([`ScopeRegistry`])
//! - **Resolution**: nearest instance by default, ancestors by explicit key,
//!   with a strict or lenient policy on failure
//! - **Merging**: seeding a fresh instance from a boundary's partial state
//!   (shallow, deep, replace or custom)
//!
//! The host UI runtime drives the registry: it mounts a boundary when one is
//! entered, threads the resulting [`NodeId`] to consumers below it, and
//! unmounts on teardown.
//!
//! # Example
//!
//! ```rust
//! use enclave_scope::{BoundaryId, BoundaryProps, ResolveOptions, ScopeRegistry, StoreDefinition};
//! use serde_json::json;
//!
//! let counter = StoreDefinition::builder("Counter")
//!     .initial_state(json!({ "count": 0 }))
//!     .build()
//!     .unwrap();
//! let mut registry: ScopeRegistry = ScopeRegistry::new(counter);
//!
//! let outer = registry
//!     .mount(BoundaryId::new(), None, BoundaryProps::keyed("outer"))
//!     .unwrap();
//! let inner = registry
//!     .mount(
//!         BoundaryId::new(),
//!         Some(outer),
//!         BoundaryProps::keyed("inner").with_initial(json!({ "count": 10 })),
//!     )
//!     .unwrap();
//!
//! assert_eq!(registry.use_state(Some(inner)).unwrap(), json!({ "count": 10 }));
//!
//! let outer_count = registry
//!     .use_selector(Some(inner), |s| s["count"].clone(), &ResolveOptions::from_key("outer"))
//!     .unwrap();
//! assert_eq!(outer_count, json!(0));
//! ```

pub mod config;
pub mod definition;
pub mod error;
pub mod extension;
pub mod instance;
pub mod key;
pub mod merge;
pub mod policy;
pub mod registry;
pub mod resolve;

pub use config::{MergeOptions, StoreOptions};
pub use definition::{ErrorHook, Initializer, Mutator, StoreDefinition, StoreDefinitionBuilder};
pub use error::{ConfigError, ScopeError};
pub use extension::StoreExtension;
pub use instance::Instance;
pub use key::{InstanceKey, Symbol};
pub use merge::{CustomMerge, MergeMode, MergePlan, MergeStrategy};
pub use policy::{FailureReason, FallbackSnapshot};
pub use registry::{BoundaryId, BoundaryProps, InheritedMap, NodeId, RegistryNode, ScopeRegistry};
pub use resolve::{ResolveOptions, Resolved};

pub use enclave_core::{Listener, StateContainer, StateUpdate, Store, Subscription};
