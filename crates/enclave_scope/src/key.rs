//! Instance keys
//!
//! A boundary publishes its instance under a key. Keys are either explicit
//! names or process-unique symbols; a symbol only ever equals itself, so two
//! definitions that both fall back to a symbol default never collide.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// Unique key token with a human-readable label
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    label: Arc<str>,
}

impl Symbol {
    /// Allocate a new symbol; no other symbol will compare equal to it
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            label: label.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({}#{})", self.label, self.id)
    }
}

/// Identifier an instance is published under
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InstanceKey {
    Named(Arc<str>),
    Symbol(Symbol),
}

impl InstanceKey {
    /// Create a named key
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        InstanceKey::Named(name.into())
    }

    /// Allocate a fresh symbol key
    pub fn symbol(label: impl Into<Arc<str>>) -> Self {
        InstanceKey::Symbol(Symbol::new(label))
    }

    /// The name, if this is a named key
    pub fn as_name(&self) -> Option<&str> {
        match self {
            InstanceKey::Named(name) => Some(name),
            InstanceKey::Symbol(_) => None,
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, InstanceKey::Symbol(_))
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::Named(name) => write!(f, "\"{}\"", name),
            InstanceKey::Symbol(symbol) => write!(f, "Symbol({})", symbol.label),
        }
    }
}

impl From<&str> for InstanceKey {
    fn from(name: &str) -> Self {
        InstanceKey::named(name)
    }
}

impl From<String> for InstanceKey {
    fn from(name: String) -> Self {
        InstanceKey::named(name)
    }
}

impl From<Symbol> for InstanceKey {
    fn from(symbol: Symbol) -> Self {
        InstanceKey::Symbol(symbol)
    }
}
