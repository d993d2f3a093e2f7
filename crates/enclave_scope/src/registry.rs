//! Scope registry
//!
//! One [`ScopeRegistry`] per store definition tracks the registry nodes of
//! every mounted boundary. Nodes live in a slot map arena and form a tree that
//! mirrors the host's boundary tree.
//!
//! Each node owns one local instance and an inherited map: a copy of its
//! parent's map with the local key inserted on top. Inserting into the copy
//! never touches the parent, so a child shadowing a key is invisible above it.
//!
//! # Lifecycle
//!
//! ```ignore
//! let boundary = BoundaryId::new();
//!
//! // First evaluation creates the node; later ones return the same id.
//! let node = registry.mount(boundary, parent, BoundaryProps::keyed("root"))?;
//! assert_eq!(registry.mount(boundary, parent, BoundaryProps::default())?, node);
//!
//! // Teardown releases the instance's listeners. Parents are unaffected.
//! registry.unmount(boundary);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use enclave_core::{StateContainer, StateUpdate, Store};
use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};
use serde_json::Value;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::definition::StoreDefinition;
use crate::error::ScopeError;
use crate::instance::Instance;
use crate::key::InstanceKey;
use crate::merge::MergeMode;

new_key_type! {
    /// Identifier for a registry node
    pub struct NodeId;
}

/// Stable identity of a host boundary across re-evaluations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundaryId(u64);

static NEXT_BOUNDARY: AtomicU64 = AtomicU64::new(1);

impl BoundaryId {
    /// Allocate a process-unique boundary id
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(NEXT_BOUNDARY.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap an identity the host already tracks
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn to_raw(self) -> u64 {
        self.0
    }
}

/// Ordered key -> instance map visible from a node
pub type InheritedMap<C> = IndexMap<InstanceKey, Instance<C>, FxBuildHasher>;

/// Per-boundary inputs for node construction
#[derive(Clone, Debug, Default)]
pub struct BoundaryProps {
    /// Key to publish under; the definition's default key when `None`
    pub key: Option<InstanceKey>,
    /// Partial state merged into the fresh instance
    pub initial: Option<Value>,
    /// Merge mode for `initial`, overriding the definition's default
    pub merge: Option<MergeMode>,
}

impl BoundaryProps {
    pub fn keyed(key: impl Into<InstanceKey>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn with_initial(mut self, initial: Value) -> Self {
        self.initial = Some(initial);
        self
    }

    pub fn with_merge(mut self, mode: MergeMode) -> Self {
        self.merge = Some(mode);
        self
    }
}

/// Bookkeeping for one mounted boundary
pub struct RegistryNode<C = Store> {
    local: Instance<C>,
    inherited: InheritedMap<C>,
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 4]>,
    depth: usize,
    boundary: Option<BoundaryId>,
}

impl<C: StateContainer> RegistryNode<C> {
    pub fn local_key(&self) -> &InstanceKey {
        self.local.key()
    }

    pub fn local_instance(&self) -> &Instance<C> {
        &self.local
    }

    pub fn inherited(&self) -> &InheritedMap<C> {
        &self.inherited
    }

    /// Instance published under `key` at this node
    pub fn lookup(&self, key: &InstanceKey) -> Option<&Instance<C>> {
        self.inherited.get(key)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Number of enclosing nodes; roots are at depth 0
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn boundary(&self) -> Option<BoundaryId> {
        self.boundary
    }
}

/// Registry of scoped instances for one store definition
pub struct ScopeRegistry<C = Store> {
    definition: StoreDefinition,
    nodes: SlotMap<NodeId, RegistryNode<C>>,
    boundaries: FxHashMap<BoundaryId, NodeId>,
}

impl<C: StateContainer + Clone> ScopeRegistry<C> {
    pub fn new(definition: StoreDefinition) -> Self {
        Self {
            definition,
            nodes: SlotMap::with_key(),
            boundaries: FxHashMap::default(),
        }
    }

    pub fn definition(&self) -> &StoreDefinition {
        &self.definition
    }

    pub fn node(&self, id: NodeId) -> Option<&RegistryNode<C>> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Mint an identity for a boundary that is about to mount for the first time
    pub fn allocate_boundary(&self) -> BoundaryId {
        BoundaryId::new()
    }

    /// Node created for a mounted boundary
    pub fn node_for(&self, boundary: BoundaryId) -> Option<NodeId> {
        self.boundaries.get(&boundary).copied()
    }

    /// Live children of a node
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(|n| n.children()).unwrap_or(&[])
    }

    /// Live ancestors of a node, nearest first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut next = self.nodes.get(id).and_then(|n| n.parent);
        std::iter::from_fn(move || {
            let current = next?;
            next = self.nodes.get(current)?.parent;
            Some(current)
        })
    }

    /// Build a node under `parent`
    ///
    /// Creates a fresh instance, merges `props.initial` into it, then builds
    /// the inherited map. The node is registered only once all of that has
    /// succeeded; an initializer error is returned unchanged and leaves the
    /// registry as it was.
    pub fn create_node(
        &mut self,
        parent: Option<NodeId>,
        props: BoundaryProps,
    ) -> Result<NodeId, ScopeError> {
        self.insert_node(parent, props, None)
    }

    fn insert_node(
        &mut self,
        parent: Option<NodeId>,
        props: BoundaryProps,
        boundary: Option<BoundaryId>,
    ) -> Result<NodeId, ScopeError> {
        let definition = self.definition.clone();
        let key = props
            .key
            .unwrap_or_else(|| definition.default_key().clone());

        let initializer = definition.initializer();
        let container = C::create(|| initializer()).map_err(ScopeError::Initializer)?;

        if let Some(partial) = &props.initial {
            let base = container.get_state();
            let merged = definition.merge_plan().apply(&base, partial, props.merge);
            container.set_state(StateUpdate::Value(merged), true);
        }

        let parent = parent.filter(|id| {
            let live = self.nodes.contains_key(*id);
            if !live {
                warn!(
                    "{}: parent node {:?} is not mounted; creating {} as a root",
                    definition.name(),
                    id,
                    key
                );
            }
            live
        });

        let (mut inherited, depth) = match parent.and_then(|id| self.nodes.get(id)) {
            Some(parent) => (parent.inherited.clone(), parent.depth + 1),
            None => (InheritedMap::default(), 0),
        };

        let local = Instance::new(key.clone(), container, definition.clone());
        inherited.insert(key.clone(), local.clone());

        let id = self.nodes.insert(RegistryNode {
            local,
            inherited,
            parent,
            children: SmallVec::new(),
            depth,
            boundary,
        });
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.push(id);
        }

        trace!(
            "{}: created node {:?} for {} at depth {}",
            definition.name(),
            id,
            key,
            depth
        );

        if let Some(node) = self.nodes.get(id) {
            for extension in definition.extensions() {
                extension.on_create(definition.name(), &key, node.local.container());
            }
        }

        Ok(id)
    }

    /// Node for `boundary`, created on first mount
    ///
    /// Re-mounting a boundary that is already mounted returns its node and
    /// ignores `parent` and `props`.
    pub fn mount(
        &mut self,
        boundary: BoundaryId,
        parent: Option<NodeId>,
        props: BoundaryProps,
    ) -> Result<NodeId, ScopeError> {
        if let Some(id) = self.node_for(boundary) {
            return Ok(id);
        }

        let id = self.insert_node(parent, props, Some(boundary))?;
        self.boundaries.insert(boundary, id);
        Ok(id)
    }

    /// Tear down the node of `boundary`; `false` if it wasn't mounted
    pub fn unmount(&mut self, boundary: BoundaryId) -> bool {
        match self.boundaries.get(&boundary).copied() {
            Some(id) => self.remove_node(id),
            None => false,
        }
    }

    /// Remove a node and release its instance's listeners
    ///
    /// The parent's inherited map and instance are left untouched. Children
    /// keep working; their maps hold their own handles.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.remove(id) else {
            return false;
        };

        if let Some(boundary) = node.boundary {
            self.boundaries.remove(&boundary);
        }
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|child| *child != id);
        }

        node.local.container().release();

        let name = self.definition.name();
        trace!("{}: removed node {:?} ({})", name, id, node.local.key());
        for extension in self.definition.extensions() {
            extension.on_release(name, node.local.key());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn counter() -> StoreDefinition {
        StoreDefinition::builder("Counter")
            .initial_state(json!({ "count": 0 }))
            .build()
            .unwrap()
    }

    #[test]
    fn test_root_node_has_only_its_own_entry() {
        let mut registry: ScopeRegistry = ScopeRegistry::new(counter());
        let root = registry.create_node(None, BoundaryProps::keyed("root")).unwrap();
        let node = registry.node(root).unwrap();

        assert_eq!(node.inherited().len(), 1);
        assert_eq!(node.local_key(), &InstanceKey::from("root"));
        assert!(node
            .lookup(&"root".into())
            .unwrap()
            .same_instance(node.local_instance()));
        assert_eq!(node.depth(), 0);
        assert_eq!(node.parent(), None);
    }

    #[test]
    fn test_default_key_is_used_when_unkeyed() {
        let def = counter();
        let mut registry: ScopeRegistry = ScopeRegistry::new(def.clone());
        let root = registry.create_node(None, BoundaryProps::default()).unwrap();

        assert_eq!(registry.node(root).unwrap().local_key(), def.default_key());
    }

    #[test]
    fn test_child_inherits_and_shadows() {
        let mut registry: ScopeRegistry = ScopeRegistry::new(counter());
        let root = registry.create_node(None, BoundaryProps::keyed("root")).unwrap();
        let mid = registry
            .create_node(Some(root), BoundaryProps::keyed("mid"))
            .unwrap();
        let shadow = registry
            .create_node(Some(mid), BoundaryProps::keyed("root"))
            .unwrap();

        let mid_node = registry.node(mid).unwrap();
        let keys: Vec<_> = mid_node.inherited().keys().cloned().collect();
        assert_eq!(keys, vec![InstanceKey::from("root"), InstanceKey::from("mid")]);

        let shadow_node = registry.node(shadow).unwrap();
        assert_eq!(shadow_node.inherited().len(), 2);
        assert!(shadow_node
            .lookup(&"root".into())
            .unwrap()
            .same_instance(shadow_node.local_instance()));
        assert!(shadow_node
            .lookup(&"mid".into())
            .unwrap()
            .same_instance(mid_node.local_instance()));

        // The parent still sees the original root instance.
        let root_node = registry.node(root).unwrap();
        assert!(mid_node
            .lookup(&"root".into())
            .unwrap()
            .same_instance(root_node.local_instance()));
        assert_eq!(shadow_node.depth(), 2);
    }

    #[test]
    fn test_siblings_are_independent() {
        let mut registry: ScopeRegistry = ScopeRegistry::new(counter());
        let root = registry.create_node(None, BoundaryProps::keyed("root")).unwrap();
        let a = registry.create_node(Some(root), BoundaryProps::keyed("item")).unwrap();
        let b = registry.create_node(Some(root), BoundaryProps::keyed("item")).unwrap();

        let a_inst = registry.node(a).unwrap().local_instance().clone();
        let b_inst = registry.node(b).unwrap().local_instance().clone();
        assert!(!a_inst.same_instance(&b_inst));

        a_inst.set_state(json!({ "count": 5 }), true);
        assert_eq!(a_inst.get_state(), json!({ "count": 5 }));
        assert_eq!(b_inst.get_state(), json!({ "count": 0 }));
        assert_eq!(registry.children(root), &[a, b]);
    }

    #[test]
    fn test_initial_state_is_merged() {
        let mut registry: ScopeRegistry = ScopeRegistry::new(counter());
        let id = registry
            .create_node(
                None,
                BoundaryProps::keyed("root").with_initial(json!({ "count": 10 })),
            )
            .unwrap();

        assert_eq!(
            registry.node(id).unwrap().local_instance().get_state(),
            json!({ "count": 10 })
        );
    }

    #[test]
    fn test_failing_initializer_registers_nothing() {
        let def = StoreDefinition::builder("Broken")
            .initializer(|| Err("initializer exploded".into()))
            .build()
            .unwrap();
        let mut registry: ScopeRegistry = ScopeRegistry::new(def);

        let err = registry
            .create_node(None, BoundaryProps::default())
            .unwrap_err();
        assert!(matches!(err, ScopeError::Initializer(_)));
        assert_eq!(err.to_string(), "initializer exploded");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_mount_is_memoized_per_boundary() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let def = StoreDefinition::builder("Counter")
            .initializer(move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "count": 0 }))
            })
            .build()
            .unwrap();
        let mut registry: ScopeRegistry = ScopeRegistry::new(def);
        let boundary = registry.allocate_boundary();

        let first = registry.mount(boundary, None, BoundaryProps::keyed("root")).unwrap();
        let second = registry
            .mount(
                boundary,
                None,
                BoundaryProps::keyed("other").with_initial(json!({ "count": 3 })),
            )
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.node_for(boundary), Some(first));
        assert_eq!(registry.node(first).unwrap().boundary(), Some(boundary));
    }

    #[test]
    fn test_unmount_releases_listeners_and_spares_parent() {
        let mut registry: ScopeRegistry = ScopeRegistry::new(counter());
        let outer = BoundaryId::new();
        let inner = BoundaryId::new();
        let root = registry.mount(outer, None, BoundaryProps::keyed("root")).unwrap();
        let child = registry
            .mount(inner, Some(root), BoundaryProps::keyed("child"))
            .unwrap();

        let child_inst = registry.node(child).unwrap().local_instance().clone();
        let _sub = child_inst.subscribe(Arc::new(|_: &Value, _: &Value| {}));
        assert_eq!(child_inst.container().listener_count(), 1);

        assert!(registry.unmount(inner));
        assert!(!registry.unmount(inner));

        assert_eq!(child_inst.container().listener_count(), 0);
        assert!(!registry.contains(child));
        assert_eq!(registry.node_for(inner), None);
        assert!(registry.children(root).is_empty());

        let root_node = registry.node(root).unwrap();
        assert_eq!(root_node.inherited().len(), 1);
        assert_eq!(root_node.local_instance().get_state(), json!({ "count": 0 }));
    }

    #[test]
    fn test_child_outlives_parent_teardown() {
        let mut registry: ScopeRegistry = ScopeRegistry::new(counter());
        let root = registry.create_node(None, BoundaryProps::keyed("root")).unwrap();
        let child = registry
            .create_node(Some(root), BoundaryProps::keyed("child"))
            .unwrap();

        assert!(registry.remove_node(root));

        let node = registry.node(child).unwrap();
        assert_eq!(node.inherited().len(), 2);
        assert_eq!(registry.ancestors(child).count(), 0);
    }

    #[test]
    fn test_stale_parent_creates_root() {
        let mut registry: ScopeRegistry = ScopeRegistry::new(counter());
        let gone = registry.create_node(None, BoundaryProps::keyed("gone")).unwrap();
        registry.remove_node(gone);

        let id = registry
            .create_node(Some(gone), BoundaryProps::keyed("root"))
            .unwrap();
        let node = registry.node(id).unwrap();
        assert_eq!(node.parent(), None);
        assert_eq!(node.inherited().len(), 1);
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let mut registry: ScopeRegistry = ScopeRegistry::new(counter());
        let a = registry.create_node(None, BoundaryProps::keyed("a")).unwrap();
        let b = registry.create_node(Some(a), BoundaryProps::keyed("b")).unwrap();
        let c = registry.create_node(Some(b), BoundaryProps::keyed("c")).unwrap();

        assert_eq!(registry.ancestors(c).collect::<Vec<_>>(), vec![b, a]);
        assert_eq!(registry.ancestors(a).count(), 0);
    }
}
