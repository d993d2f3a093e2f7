//! Merge engine
//!
//! Pure functions combining a base state with a partial override. Only JSON
//! objects count as containers; arrays, scalars and null are leaves and are
//! always replaced wholesale.
//!
//! None of these functions fail. A partial that is not an object is an empty
//! override and leaves the base unchanged.
//!
//! # Precedence
//!
//! [`MergePlan::apply`] implements the order used when a boundary seeds its
//! instance:
//!
//! 1. a custom merge, if configured, receives `(base, partial)` and wins outright
//! 2. otherwise the partial is filtered by whitelist, then blacklist
//! 3. then merged with the call-site [`MergeMode`], or the plan's default

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smallvec::SmallVec;

/// User-supplied merge, called as `(base, partial) -> next`
pub type CustomMerge = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

/// Merge mode chosen at a boundary
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    #[default]
    Shallow,
    Deep,
    Replace,
}

/// Merge strategy resolved once when a store definition is built
#[derive(Clone)]
pub enum MergeStrategy {
    Shallow,
    Deep,
    Replace,
    Custom(CustomMerge),
}

impl MergeStrategy {
    /// The built-in mode this strategy maps to, `None` for custom merges
    pub fn mode(&self) -> Option<MergeMode> {
        match self {
            MergeStrategy::Shallow => Some(MergeMode::Shallow),
            MergeStrategy::Deep => Some(MergeMode::Deep),
            MergeStrategy::Replace => Some(MergeMode::Replace),
            MergeStrategy::Custom(_) => None,
        }
    }
}

impl From<MergeMode> for MergeStrategy {
    fn from(mode: MergeMode) -> Self {
        match mode {
            MergeMode::Shallow => MergeStrategy::Shallow,
            MergeMode::Deep => MergeStrategy::Deep,
            MergeMode::Replace => MergeStrategy::Replace,
        }
    }
}

impl fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStrategy::Shallow => f.write_str("Shallow"),
            MergeStrategy::Deep => f.write_str("Deep"),
            MergeStrategy::Replace => f.write_str("Replace"),
            MergeStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Overwrite each top-level key of `base` that `partial` provides
pub fn merge_shallow(base: &Value, partial: &Value) -> Value {
    let Value::Object(patch) = partial else {
        return base.clone();
    };

    let mut next = match base {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    for (key, value) in patch {
        next.insert(key.clone(), value.clone());
    }
    Value::Object(next)
}

/// Shallow merge applied recursively wherever both sides hold an object
pub fn merge_deep(base: &Value, partial: &Value) -> Value {
    let Value::Object(patch) = partial else {
        return base.clone();
    };

    let mut next = match base {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    for (key, value) in patch {
        let merged = match (next.get(key), value) {
            (Some(existing), Value::Object(_)) if existing.is_object() => merge_deep(existing, value),
            _ => value.clone(),
        };
        next.insert(key.clone(), merged);
    }
    Value::Object(next)
}

/// The partial becomes the whole state; `base` only survives a non-object partial
pub fn replace(base: &Value, partial: &Value) -> Value {
    match partial {
        Value::Object(_) => partial.clone(),
        _ => base.clone(),
    }
}

/// Drop keys of `partial` outside a non-empty whitelist, then any blacklisted key
pub fn filter_by_lists<S: AsRef<str>>(partial: &Value, whitelist: &[S], blacklist: &[S]) -> Value {
    let Value::Object(map) = partial else {
        return partial.clone();
    };

    let filtered = map
        .iter()
        .filter(|(key, _)| whitelist.is_empty() || whitelist.iter().any(|w| w.as_ref() == key.as_str()))
        .filter(|(key, _)| !blacklist.iter().any(|b| b.as_ref() == key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(filtered)
}

/// Merge a partial with a built-in mode
pub fn merge_with(mode: MergeMode, base: &Value, partial: &Value) -> Value {
    match mode {
        MergeMode::Shallow => merge_shallow(base, partial),
        MergeMode::Deep => merge_deep(base, partial),
        MergeMode::Replace => replace(base, partial),
    }
}

/// Resolved merge configuration of a store definition
#[derive(Clone, Debug)]
pub struct MergePlan {
    strategy: MergeStrategy,
    whitelist: SmallVec<[String; 4]>,
    blacklist: SmallVec<[String; 4]>,
}

impl Default for MergePlan {
    fn default() -> Self {
        Self::new(MergeStrategy::Shallow)
    }
}

impl MergePlan {
    pub fn new(strategy: MergeStrategy) -> Self {
        Self {
            strategy,
            whitelist: SmallVec::new(),
            blacklist: SmallVec::new(),
        }
    }

    pub fn with_whitelist<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_blacklist<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn strategy(&self) -> &MergeStrategy {
        &self.strategy
    }

    pub fn whitelist(&self) -> &[String] {
        &self.whitelist
    }

    pub fn blacklist(&self) -> &[String] {
        &self.blacklist
    }

    /// Compute the next full state from `base` and `partial`
    ///
    /// `mode` is the boundary's explicit choice. It is ignored when a custom
    /// merge is configured.
    pub fn apply(&self, base: &Value, partial: &Value, mode: Option<MergeMode>) -> Value {
        let default_mode = match &self.strategy {
            MergeStrategy::Custom(custom) => return custom(base, partial),
            strategy => strategy.mode().unwrap_or_default(),
        };

        let filtered = filter_by_lists(partial, self.whitelist.as_slice(), self.blacklist.as_slice());
        merge_with(mode.unwrap_or(default_mode), base, &filtered)
    }
}
