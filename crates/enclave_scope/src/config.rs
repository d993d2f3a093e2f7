//! Store configuration
//!
//! The data-only part of a store definition. It can be written in TOML and
//! loaded at startup, then handed to [`StoreDefinitionBuilder::options`].
//! Closures (initializer, mutators, custom merge, error hook, extensions)
//! are attached on the builder in code.
//!
//! ```toml
//! name = "Counter"
//! default_instance_id = "root"
//! strict = false
//! debug = true
//!
//! [fallback_state]
//! count = 0
//!
//! [merge]
//! shallow = false
//! whitelist = ["count"]
//! ```
//!
//! [`StoreDefinitionBuilder::options`]: crate::definition::StoreDefinitionBuilder::options

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::merge::{MergeMode, MergePlan, MergeStrategy};

/// Merge settings for seeding an instance from a boundary's initial state
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct MergeOptions {
    /// `false` selects deep merging; unset or `true` keeps the shallow default
    #[serde(default)]
    pub shallow: Option<bool>,
    /// If non-empty, only these top-level keys are taken from a partial
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Top-level keys always dropped from a partial
    #[serde(default)]
    pub blacklist: Vec<String>,
}

impl MergeOptions {
    /// Default mode implied by the `shallow` flag
    pub fn mode(&self) -> MergeMode {
        match self.shallow {
            Some(false) => MergeMode::Deep,
            _ => MergeMode::Shallow,
        }
    }

    /// Resolve into a plan with the given strategy
    pub(crate) fn plan(&self, strategy: MergeStrategy) -> MergePlan {
        MergePlan::new(strategy)
            .with_whitelist(self.whitelist.iter().cloned())
            .with_blacklist(self.blacklist.iter().cloned())
    }
}

/// Static store configuration
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StoreOptions {
    /// Display name used in errors and logs
    pub name: String,
    /// Key for boundaries that don't name their instance
    #[serde(default)]
    pub default_instance_id: Option<String>,
    /// Fail resolution loudly instead of degrading
    #[serde(default = "default_true")]
    pub strict: bool,
    /// Read-only state served when no scope exists (non-strict only)
    #[serde(default)]
    pub fallback_state: Option<Value>,
    #[serde(default)]
    pub merge: MergeOptions,
    /// Log degraded resolutions at debug level
    #[serde(default)]
    pub debug: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            default_instance_id: None,
            strict: true,
            fallback_state: None,
            merge: MergeOptions::default(),
            debug: false,
        }
    }
}

impl StoreOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse options from a TOML document
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(src)?)
    }

    /// Check the invariants the builder enforces
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingName);
        }
        if self.strict && self.fallback_state.is_some() {
            return Err(ConfigError::FallbackRequiresNonStrict {
                store: self.name.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_defaults_are_strict_and_shallow() {
        let options = StoreOptions::from_toml_str(r#"name = "Counter""#).unwrap();

        assert_eq!(options, StoreOptions::new("Counter"));
        assert!(options.strict);
        assert_eq!(options.merge.mode(), MergeMode::Shallow);
    }

    #[test]
    fn test_full_document() {
        let src = r#"
            name = "Counter"
            default_instance_id = "root"
            strict = false
            debug = true

            [fallback_state]
            count = 0
            labels = ["a", "b"]

            [merge]
            shallow = false
            whitelist = ["count"]
            blacklist = ["secret"]
        "#;
        let options = StoreOptions::from_toml_str(src).unwrap();

        assert_eq!(options.default_instance_id.as_deref(), Some("root"));
        assert!(!options.strict);
        assert!(options.debug);
        assert_eq!(
            options.fallback_state,
            Some(json!({ "count": 0, "labels": ["a", "b"] }))
        );
        assert_eq!(options.merge.mode(), MergeMode::Deep);
        assert_eq!(options.merge.whitelist, vec!["count".to_string()]);
        assert_eq!(options.merge.blacklist, vec!["secret".to_string()]);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_parse_error() {
        let err = StoreOptions::from_toml_str("strict = false").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_strict_fallback() {
        let options = StoreOptions {
            fallback_state: Some(json!({ "count": 0 })),
            ..StoreOptions::new("Counter")
        };

        assert!(matches!(
            options.validate(),
            Err(ConfigError::FallbackRequiresNonStrict { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        assert!(matches!(
            StoreOptions::new("  ").validate(),
            Err(ConfigError::MissingName)
        ));
    }
}
