//! Enclave Core Runtime
//!
//! This crate provides the state container primitive used by scoped stores:
//!
//! - **State containers**: a narrow read / write / subscribe contract
//!   ([`StateContainer`]) that the scope registry depends on
//! - **Default store**: [`Store`], a synchronous container holding a plain-data
//!   [`serde_json::Value`] and notifying listeners in the same pass
//!
//! # Example
//!
//! ```rust
//! use enclave_core::{StateContainer, StateUpdate, Store};
//! use serde_json::{json, Value};
//!
//! let store = Store::new(json!({ "count": 0 }));
//!
//! let _sub = store.subscribe(std::sync::Arc::new(|next: &Value, _prev: &Value| {
//!     println!("count is now {}", next["count"]);
//! }));
//!
//! store.set_state(StateUpdate::Value(json!({ "count": 1 })), false);
//! assert_eq!(store.get_state(), json!({ "count": 1 }));
//! ```

pub mod container;
pub mod error;
pub mod store;

pub use container::{InitError, Listener, StateContainer, StateUpdate, Subscription};
pub use error::ContainerError;
pub use store::{ListenerId, Store};
