//! Store definitions
//!
//! A [`StoreDefinition`] is the immutable template every scoped instance is
//! created from: an initializer for the state, named mutators, and the
//! configuration that drives merging and the strict/fallback policy.
//!
//! # Example
//!
//! ```rust
//! use enclave_scope::StoreDefinition;
//! use serde_json::{json, Value};
//!
//! let counter = StoreDefinition::builder("Counter")
//!     .initial_state(json!({ "count": 0 }))
//!     .mutator("increment", |state: &Value, by: Value| {
//!         let count = state["count"].as_i64().unwrap_or(0);
//!         json!({ "count": count + by.as_i64().unwrap_or(1) })
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(counter.name(), "Counter");
//! assert!(counter.is_strict());
//! ```

use std::fmt;
use std::sync::Arc;

use enclave_core::InitError;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::config::{MergeOptions, StoreOptions};
use crate::error::{ConfigError, ScopeError};
use crate::extension::StoreExtension;
use crate::key::InstanceKey;
use crate::merge::{CustomMerge, MergeMode, MergePlan, MergeStrategy};

/// Produces the initial state of a fresh instance
pub type Initializer = Arc<dyn Fn() -> Result<Value, InitError> + Send + Sync>;

/// Named state transition: `(current, payload) -> next`
pub type Mutator = Arc<dyn Fn(&Value, Value) -> Value + Send + Sync>;

/// Called with every failed resolution before the policy applies
///
/// Returning `Err` aborts resolution with that error.
pub type ErrorHook = Arc<dyn Fn(&ScopeError) -> Result<(), ScopeError> + Send + Sync>;

struct DefinitionInner {
    name: Arc<str>,
    initializer: Initializer,
    mutators: FxHashMap<Arc<str>, Mutator>,
    default_key: InstanceKey,
    strict: bool,
    fallback_state: Option<Arc<Value>>,
    merge: MergePlan,
    on_error: Option<ErrorHook>,
    extensions: Vec<Arc<dyn StoreExtension>>,
    debug: bool,
}

/// Immutable store template; clones share the same definition
#[derive(Clone)]
pub struct StoreDefinition {
    inner: Arc<DefinitionInner>,
}

impl StoreDefinition {
    /// Start building a definition with the given display name
    pub fn builder(name: impl Into<String>) -> StoreDefinitionBuilder {
        StoreDefinitionBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn initializer(&self) -> &Initializer {
        &self.inner.initializer
    }

    pub fn mutator(&self, name: &str) -> Option<&Mutator> {
        self.inner.mutators.get(name)
    }

    /// Names of all registered mutators, in no particular order
    pub fn mutator_names(&self) -> impl Iterator<Item = &str> {
        self.inner.mutators.keys().map(|name| &**name)
    }

    /// Key used by boundaries that don't name their instance
    pub fn default_key(&self) -> &InstanceKey {
        &self.inner.default_key
    }

    pub fn is_strict(&self) -> bool {
        self.inner.strict
    }

    pub fn fallback_state(&self) -> Option<&Arc<Value>> {
        self.inner.fallback_state.as_ref()
    }

    pub fn merge_plan(&self) -> &MergePlan {
        &self.inner.merge
    }

    pub fn on_error(&self) -> Option<&ErrorHook> {
        self.inner.on_error.as_ref()
    }

    pub fn extensions(&self) -> &[Arc<dyn StoreExtension>] {
        &self.inner.extensions
    }

    pub fn debug(&self) -> bool {
        self.inner.debug
    }

    /// Whether both handles refer to the same definition
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for StoreDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreDefinition")
            .field("name", &self.inner.name)
            .field("default_key", &self.inner.default_key)
            .field("strict", &self.inner.strict)
            .field("merge", &self.inner.merge)
            .field("mutators", &self.inner.mutators.len())
            .field("extensions", &self.inner.extensions.len())
            .finish()
    }
}

/// Builder for [`StoreDefinition`]
pub struct StoreDefinitionBuilder {
    options: StoreOptions,
    initializer: Option<Initializer>,
    mutators: FxHashMap<Arc<str>, Mutator>,
    default_merge: Option<MergeMode>,
    custom_merge: Option<CustomMerge>,
    on_error: Option<ErrorHook>,
    extensions: Vec<Arc<dyn StoreExtension>>,
}

impl StoreDefinitionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            options: StoreOptions::new(name),
            initializer: None,
            mutators: FxHashMap::default(),
            default_merge: None,
            custom_merge: None,
            on_error: None,
            extensions: Vec::new(),
        }
    }

    /// Apply static options, e.g. loaded from TOML
    ///
    /// An empty `name` in `options` keeps the builder's name.
    pub fn options(mut self, options: StoreOptions) -> Self {
        let name = if options.name.trim().is_empty() {
            std::mem::take(&mut self.options.name)
        } else {
            options.name.clone()
        };
        self.options = StoreOptions { name, ..options };
        self
    }

    /// Set a fallible initializer, run once per instance
    pub fn initializer<F>(mut self, init: F) -> Self
    where
        F: Fn() -> Result<Value, InitError> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(init));
        self
    }

    /// Shorthand for an initializer that clones a fixed state
    pub fn initial_state(self, state: Value) -> Self {
        self.initializer(move || Ok(state.clone()))
    }

    pub fn mutator<F>(mut self, name: impl Into<Arc<str>>, mutator: F) -> Self
    where
        F: Fn(&Value, Value) -> Value + Send + Sync + 'static,
    {
        self.mutators.insert(name.into(), Arc::new(mutator));
        self
    }

    pub fn default_instance_id(mut self, id: impl Into<String>) -> Self {
        self.options.default_instance_id = Some(id.into());
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.options.strict = strict;
        self
    }

    /// State served read-only when no scope exists; requires `strict(false)`
    pub fn fallback_state(mut self, state: Value) -> Self {
        self.options.fallback_state = Some(state);
        self
    }

    pub fn merge_options(mut self, merge: MergeOptions) -> Self {
        self.options.merge = merge;
        self
    }

    /// Default merge mode, taking precedence over `MergeOptions::shallow`
    pub fn default_merge(mut self, mode: MergeMode) -> Self {
        self.default_merge = Some(mode);
        self
    }

    /// Replace all built-in merging (including key filtering)
    pub fn custom_merge<F>(mut self, merge: F) -> Self
    where
        F: Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    {
        self.custom_merge = Some(Arc::new(merge));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ScopeError) -> Result<(), ScopeError> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn extension(mut self, extension: impl StoreExtension + 'static) -> Self {
        self.extensions.push(Arc::new(extension));
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    pub fn build(self) -> Result<StoreDefinition, ConfigError> {
        self.options.validate()?;

        let StoreOptions {
            name,
            default_instance_id,
            strict,
            fallback_state,
            merge,
            debug,
        } = self.options;

        let strategy = match self.custom_merge {
            Some(custom) => MergeStrategy::Custom(custom),
            None => self.default_merge.unwrap_or_else(|| merge.mode()).into(),
        };

        let name: Arc<str> = name.into();
        let default_key = match default_instance_id {
            Some(id) => InstanceKey::named(id),
            None => InstanceKey::symbol(name.clone()),
        };

        let initializer: Initializer = match self.initializer {
            Some(initializer) => initializer,
            None => Arc::new(empty_state),
        };

        Ok(StoreDefinition {
            inner: Arc::new(DefinitionInner {
                name,
                initializer,
                mutators: self.mutators,
                default_key,
                strict,
                fallback_state: fallback_state.map(Arc::new),
                merge: merge.plan(strategy),
                on_error: self.on_error,
                extensions: self.extensions,
                debug,
            }),
        })
    }
}

fn empty_state() -> Result<Value, InitError> {
    Ok(Value::Object(Default::default()))
}
