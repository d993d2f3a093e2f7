use enclave_core::InitError;
use thiserror::Error;

use crate::key::InstanceKey;

/// Errors raised while constructing or resolving scoped instances
#[derive(Debug, Error)]
pub enum ScopeError {
    /// No enclosing registry node exists for this store
    #[error("no enclosing scope for store \"{store}\"; mount a boundary above this consumer")]
    NoScope { store: String },

    /// The explicit key is not in the nearest node's inherited map
    #[error("store \"{store}\" has no instance {key} in scope")]
    KeyNotFound { store: String, key: InstanceKey },

    /// The state initializer failed; returned unchanged
    #[error(transparent)]
    Initializer(InitError),

    #[error("store \"{store}\" has no mutator named \"{mutator}\"")]
    UnknownMutator { store: String, mutator: String },

    /// Raised by a user error hook
    #[error("{0}")]
    Hook(String),
}

impl ScopeError {
    pub fn is_no_scope(&self) -> bool {
        matches!(self, ScopeError::NoScope { .. })
    }

    pub fn is_key_not_found(&self) -> bool {
        matches!(self, ScopeError::KeyNotFound { .. })
    }
}

/// Errors raised while building a store definition
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("store definition requires a non-empty name")]
    MissingName,

    #[error("store \"{store}\" sets a fallback state but is strict; set strict = false")]
    FallbackRequiresNonStrict { store: String },

    #[error("invalid store options: {0}")]
    Parse(#[from] toml::de::Error),
}
