//! Scene node registry
//!
//! Bidirectional map between live entities and the renderer nodes that
//! represent them. The synchronizer owns the content side of a binding
//! (content transform, shape, children group, material); the frame-staged
//! builder owns the staged side (collision proxy, pick sensor, and the path
//! shape of segmented entities).

use crate::model::EntityId;
use crate::render::{NodeHandle, SensorHandle};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Renderer nodes representing one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneNodeBinding {
    /// Entity represented
    pub entity: EntityId,
    /// Whether the entity is segmented (never a pick target)
    pub segmented: bool,
    /// Node the content node is attached under (scene root or a parent's
    /// children group)
    pub parent_node: Option<NodeHandle>,
    /// Transform node carrying position, rotation and scale
    pub content: NodeHandle,
    /// Visible geometry under the content node
    pub shape: Option<NodeHandle>,
    /// Group holding nodes derived from child entities
    pub children_group: Option<NodeHandle>,
    /// Material used for visual feedback
    pub material: Option<NodeHandle>,
    /// Collision / bounding proxy
    pub proxy: Option<NodeHandle>,
    /// Pick sensor testing the proxy against other proxies
    pub sensor: Option<SensorHandle>,
}

impl SceneNodeBinding {
    /// Binding with only a content node
    pub fn new(entity: EntityId, content: NodeHandle) -> Self {
        Self {
            entity,
            segmented: false,
            parent_node: None,
            content,
            shape: None,
            children_group: None,
            material: None,
            proxy: None,
            sensor: None,
        }
    }

    fn nodes(&self) -> impl Iterator<Item = NodeHandle> {
        [Some(self.content), self.shape, self.children_group, self.material, self.proxy]
            .into_iter()
            .flatten()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    bindings: HashMap<EntityId, SceneNodeBinding>,
    nodes: HashMap<NodeHandle, EntityId>,
    sensors: HashMap<SensorHandle, EntityId>,
    root: Option<NodeHandle>,
}

impl RegistryState {
    fn index(&mut self, binding: &SceneNodeBinding) {
        for node in binding.nodes() {
            self.nodes.insert(node, binding.entity);
        }
        if let Some(sensor) = binding.sensor {
            self.sensors.insert(sensor, binding.entity);
        }
    }

    fn unindex(&mut self, binding: &SceneNodeBinding) {
        for node in binding.nodes() {
            self.nodes.remove(&node);
        }
        if let Some(sensor) = binding.sensor {
            self.sensors.remove(&sensor);
        }
    }
}

/// Thread-safe entity ↔ node registry
#[derive(Debug, Default)]
pub struct SceneNodeRegistry {
    state: RwLock<RegistryState>,
}

impl SceneNodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a binding
    ///
    /// Returns `false` and leaves the registry untouched if the entity is
    /// already bound.
    pub fn bind(&self, binding: SceneNodeBinding) -> bool {
        let mut state = self.write();
        if state.bindings.contains_key(&binding.entity) {
            return false;
        }
        state.index(&binding);
        state.bindings.insert(binding.entity, binding);
        true
    }

    /// Remove and return a binding
    pub fn unbind(&self, entity: EntityId) -> Option<SceneNodeBinding> {
        let mut state = self.write();
        let binding = state.bindings.remove(&entity)?;
        state.unindex(&binding);
        Some(binding)
    }

    /// Modify a binding in place, keeping the reverse indices consistent
    ///
    /// Returns the updated binding, or `None` if the entity is not bound.
    pub fn update<F>(&self, entity: EntityId, modify: F) -> Option<SceneNodeBinding>
    where
        F: FnOnce(&mut SceneNodeBinding),
    {
        let mut state = self.write();
        let mut binding = *state.bindings.get(&entity)?;
        state.unindex(&binding);
        modify(&mut binding);
        binding.entity = entity;
        state.index(&binding);
        state.bindings.insert(entity, binding);
        Some(binding)
    }

    /// Whether an entity is bound
    pub fn contains(&self, entity: EntityId) -> bool {
        self.read().bindings.contains_key(&entity)
    }

    /// Copy of an entity's binding
    pub fn binding(&self, entity: EntityId) -> Option<SceneNodeBinding> {
        self.read().bindings.get(&entity).copied()
    }

    /// Entity owning a node
    pub fn entity_for_node(&self, node: NodeHandle) -> Option<EntityId> {
        self.read().nodes.get(&node).copied()
    }

    /// Entity owning a pick sensor
    pub fn entity_for_sensor(&self, sensor: SensorHandle) -> Option<EntityId> {
        self.read().sensors.get(&sensor).copied()
    }

    /// All bound entities in ascending id order
    pub fn entities(&self) -> Vec<EntityId> {
        let mut entities: Vec<EntityId> = self.read().bindings.keys().copied().collect();
        entities.sort_unstable();
        entities
    }

    /// Entities whose content node hangs directly under `node`
    pub fn attached_under(&self, node: NodeHandle) -> Vec<EntityId> {
        let mut entities: Vec<EntityId> = self
            .read()
            .bindings
            .values()
            .filter(|binding| binding.parent_node == Some(node))
            .map(|binding| binding.entity)
            .collect();
        entities.sort_unstable();
        entities
    }

    /// Every binding with a collision proxy, in ascending entity order
    pub fn proxies(&self) -> Vec<(EntityId, NodeHandle)> {
        let mut proxies: Vec<(EntityId, NodeHandle)> = self
            .read()
            .bindings
            .values()
            .filter_map(|binding| binding.proxy.map(|proxy| (binding.entity, proxy)))
            .collect();
        proxies.sort_unstable_by_key(|(entity, _)| *entity);
        proxies
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.read().bindings.len()
    }

    /// Whether there are no bindings
    pub fn is_empty(&self) -> bool {
        self.read().bindings.is_empty()
    }

    /// Content root node of the scene
    pub fn root(&self) -> Option<NodeHandle> {
        self.read().root
    }

    /// Replace the content root node
    pub fn set_root(&self, root: Option<NodeHandle>) -> Option<NodeHandle> {
        std::mem::replace(&mut self.write().root, root)
    }

    /// Drop every binding and return them
    pub fn clear(&self) -> Vec<SceneNodeBinding> {
        let mut state = self.write();
        state.nodes.clear();
        state.sensors.clear();
        state.bindings.drain().map(|(_, binding)| binding).collect()
    }
}
