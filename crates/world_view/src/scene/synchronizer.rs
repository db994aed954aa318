//! Scene synchronizer
//!
//! Mirrors entity-model notifications into the renderer's scene graph. Each
//! live entity gets a content transform with its visible shape, a material
//! and a children group where child entities attach:
//!
//! ```text
//! root
//! ├── content (Transform)            entity A
//! │   ├── shape (Box | Path)
//! │   ├── material
//! │   ├── proxy (collision mode, staged)
//! │   └── children (Group)
//! │       └── content                entity B, child of A
//! └── path bounds (Transform)        segmented entity, staged
//! ```
//!
//! Adding the world entity replaces the whole scene. Every structural
//! change runs inside one [`UpdateScope`].

use super::geometry::SceneFragment;
use super::registry::{SceneNodeBinding, SceneNodeRegistry};
use super::staging::{FrameStagedBuilder, StagedKind};
use crate::error::{ErrorReporter, SceneError};
use crate::foundation::math::{Frame, Vec3};
use crate::model::{Entity, EntityFlags, EntityId, EntityModel, EntityProperty, ModelEvent, SubpartId, TransactionId};
use crate::picking::collision::CollisionMonitor;
use crate::picking::coordinator::PickingCoordinator;
use crate::picking::request::PickKey;
use crate::render::{BackendError, Field, FieldValue, NodeHandle, NodeKind, SceneBackend, UpdateScope};
use crate::settings::PickingMode;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Collaborators the synchronizer drives
pub struct SynchronizerParts {
    /// Renderer
    pub backend: Arc<dyn SceneBackend>,
    /// Authoritative entity store
    pub model: Arc<dyn EntityModel>,
    /// Entity ↔ node map
    pub registry: Arc<SceneNodeRegistry>,
    /// Staged construction queue
    pub builder: Arc<FrameStagedBuilder>,
    /// Elevation picking
    pub picking: Arc<PickingCoordinator>,
    /// Collision feedback
    pub collision: Arc<CollisionMonitor>,
    /// Failure side channel
    pub reporter: Arc<dyn ErrorReporter>,
}

/// Keeps the scene graph in step with the entity model
pub struct SceneSynchronizer {
    parts: SynchronizerParts,
    mode: PickingMode,
    world: Mutex<Option<EntityId>>,
}

impl SceneSynchronizer {
    /// Create a synchronizer for the given picking mode
    pub fn new(parts: SynchronizerParts, mode: PickingMode) -> Self {
        Self {
            parts,
            mode,
            world: Mutex::new(None),
        }
    }

    /// Active picking mode
    pub fn mode(&self) -> PickingMode {
        self.mode
    }

    /// Entity currently acting as the world
    pub fn world(&self) -> Option<EntityId> {
        *self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn report(&self, error: impl Into<SceneError>) {
        self.parts.reporter.report(&error.into());
    }

    /// Dispatch a model notification
    pub fn handle(&self, event: &ModelEvent) {
        match event {
            ModelEvent::Added(entity) => self.on_entity_added(entity),
            ModelEvent::Removed(id) => self.on_entity_removed(*id),
            ModelEvent::Moved { entity, position, transaction } => {
                self.on_entity_moved(*entity, *position, *transaction);
            }
            ModelEvent::SubpartMoved { entity, subpart, position, transaction } => {
                self.on_subpart_moved(*entity, *subpart, *position, *transaction);
            }
            ModelEvent::PropertyChanged { entity, property } => {
                self.on_entity_property_changed(*entity, property);
            }
        }
    }

    // ------------------------------------------------------------------
    // Add
    // ------------------------------------------------------------------

    /// An entity became live
    ///
    /// Adding the world replaces the scene. Adding an entity that is
    /// already bound does nothing.
    pub fn on_entity_added(&self, entity: &Entity) {
        if entity.is_world() {
            self.replace_world(entity);
            return;
        }
        let _scope = UpdateScope::new(self.parts.backend.as_ref());
        self.add_tree(entity);
    }

    fn replace_world(&self, world: &Entity) {
        log::info!("Replacing scene with world {} ({} children)", world.id, world.children.len());
        let _scope = UpdateScope::new(self.parts.backend.as_ref());
        self.teardown();

        match self.parts.backend.create_node(NodeKind::Group, None) {
            Ok(root) => {
                self.parts.registry.set_root(Some(root));
            }
            Err(e) => {
                self.report(e);
                return;
            }
        }
        *self.world.lock().unwrap_or_else(PoisonError::into_inner) = Some(world.id);

        for child in &world.children {
            match self.parts.model.entity(*child) {
                Some(entity) => self.add_tree(&entity),
                None => log::warn!("World child {} is not in the model", child),
            }
        }
    }

    /// Remove every binding, the content root and all picking state
    fn teardown(&self) {
        self.parts.picking.reset();
        self.parts.collision.clear();
        self.parts.builder.clear();
        for binding in self.parts.registry.clear() {
            if let Some(sensor) = binding.sensor {
                if let Err(e) = self.parts.backend.remove_sensor(sensor) {
                    self.report(e);
                }
            }
        }
        if let Some(root) = self.parts.registry.set_root(None) {
            if let Err(e) = self.parts.backend.remove_node(root) {
                self.report(e);
            }
        }
        *self.world.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Add an entity and, recursively, its children from the model
    fn add_tree(&self, entity: &Entity) {
        if self.parts.registry.contains(entity.id) {
            log::debug!("{} already bound, ignoring duplicate add", entity.id);
            return;
        }
        if let Err(e) = self.add_entity(entity) {
            self.report(e);
            return;
        }
        for child in &entity.children {
            if let Some(child) = self.parts.model.entity(*child) {
                self.add_tree(&child);
            }
        }
        self.reattach_children(entity.id, &entity.children);
    }

    fn ensure_root(&self) -> Result<NodeHandle, BackendError> {
        if let Some(root) = self.parts.registry.root() {
            return Ok(root);
        }
        let root = self.parts.backend.create_node(NodeKind::Group, None)?;
        self.parts.registry.set_root(Some(root));
        Ok(root)
    }

    fn attachment_point(&self, parent: Option<EntityId>) -> Result<NodeHandle, BackendError> {
        match parent
            .and_then(|id| self.parts.registry.binding(id))
            .and_then(|binding| binding.children_group)
        {
            Some(group) => Ok(group),
            None => self.ensure_root(),
        }
    }

    fn add_entity(&self, entity: &Entity) -> Result<(), SceneError> {
        let fragment = SceneFragment::derive(entity)?;
        let parent_node = self.attachment_point(entity.parent)?;
        let backend = &self.parts.backend;

        let content = backend.create_node(fragment.transform_node(), Some(parent_node))?;
        let mut binding = SceneNodeBinding::new(entity.id, content);
        binding.segmented = fragment.is_segmented();
        binding.parent_node = Some(parent_node);

        let nodes = (|| -> Result<(), BackendError> {
            if !binding.segmented {
                binding.shape = Some(backend.create_node(fragment.shape_node(), Some(content))?);
                binding.material = Some(backend.create_node(NodeKind::Material { emissive: Vec3::zeros() }, Some(content))?);
            }
            binding.children_group = Some(backend.create_node(NodeKind::Group, Some(content))?);
            Ok(())
        })();
        if let Err(e) = nodes {
            if let Err(cleanup) = backend.remove_node(content) {
                log::warn!("Could not remove partial content of {}: {}", entity.id, cleanup);
            }
            return Err(e.into());
        }

        self.parts.registry.bind(binding);
        log::debug!("Bound {} to {}", entity.id, content);

        if binding.segmented {
            self.parts.builder.enqueue(entity.id, StagedKind::PathGeometry, fragment);
            return Ok(());
        }
        match self.mode {
            PickingMode::Elevation => {
                if let Some(shape) = binding.shape {
                    self.parts.picking.add_target(entity.id, shape);
                }
            }
            PickingMode::Collision => self.parts.builder.enqueue(entity.id, StagedKind::CollisionProxy, fragment),
            PickingMode::Disabled => {}
        }
        Ok(())
    }

    /// Move bound children whose content hangs elsewhere under `parent`,
    /// and release bound entities no longer listed as its children
    fn reattach_children(&self, parent: EntityId, children: &[EntityId]) {
        let Some(group) = self.parts.registry.binding(parent).and_then(|b| b.children_group) else {
            return;
        };

        let mut stale: Vec<EntityId> = self
            .parts
            .registry
            .attached_under(group)
            .into_iter()
            .filter(|attached| !children.contains(attached))
            .collect();
        stale.extend(children.iter().copied().filter(|child| {
            self.parts
                .registry
                .binding(*child)
                .is_some_and(|binding| binding.parent_node != Some(group))
        }));

        for entity in stale {
            self.rebuild_subtree(entity);
        }
    }

    /// Drop an entity's nodes (and its bound descendants) and build them
    /// again from the model's current snapshot
    fn rebuild_subtree(&self, entity: EntityId) {
        log::debug!("Re-attaching {}", entity);
        self.remove_subtree(entity);
        if let Some(snapshot) = self.parts.model.entity(entity) {
            self.add_tree(&snapshot);
        }
    }

    // ------------------------------------------------------------------
    // Remove
    // ------------------------------------------------------------------

    /// An entity was removed
    pub fn on_entity_removed(&self, id: EntityId) {
        if self.world() == Some(id) {
            log::info!("World {} removed, clearing scene", id);
            let _scope = UpdateScope::new(self.parts.backend.as_ref());
            self.teardown();
            return;
        }
        if !self.parts.registry.contains(id) {
            self.report(SceneError::BindingNotFound(id));
            return;
        }
        let _scope = UpdateScope::new(self.parts.backend.as_ref());
        self.remove_subtree(id);
    }

    fn remove_subtree(&self, id: EntityId) {
        let Some(binding) = self.parts.registry.unbind(id) else {
            return;
        };
        // Descendant content goes away with this content node
        if let Some(group) = binding.children_group {
            for child in self.parts.registry.attached_under(group) {
                self.release(child);
            }
        }
        self.forget(&binding);
        if let Err(e) = self.parts.backend.remove_node(binding.content) {
            self.report(e);
        }
        log::debug!("Unbound {}", id);
    }

    /// Unbind a descendant whose nodes are removed with an ancestor
    fn release(&self, id: EntityId) {
        let Some(binding) = self.parts.registry.unbind(id) else {
            return;
        };
        if let Some(group) = binding.children_group {
            for child in self.parts.registry.attached_under(group) {
                self.release(child);
            }
        }
        self.forget(&binding);
    }

    /// Drop pool, monitor and builder state plus nodes outside the content
    /// subtree
    fn forget(&self, binding: &SceneNodeBinding) {
        let id = binding.entity;
        self.parts.picking.forget_entity(id);
        self.parts.collision.unregister(id);
        self.parts.builder.cancel(id);
        if let Some(sensor) = binding.sensor {
            if let Err(e) = self.parts.backend.remove_sensor(sensor) {
                self.report(e);
            }
        }
        if binding.segmented {
            if let Some(proxy) = binding.proxy {
                if let Err(e) = self.parts.backend.remove_node(proxy) {
                    self.report(e);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    /// A property of an entity changed
    ///
    /// Only the sub-node the property maps to is replaced.
    pub fn on_entity_property_changed(&self, id: EntityId, property: &EntityProperty) {
        if !property.affects_geometry() {
            return;
        }
        let Some(binding) = self.parts.registry.binding(id) else {
            self.report(SceneError::BindingNotFound(id));
            return;
        };
        let Some(entity) = self.parts.model.entity(id) else {
            return;
        };
        let fragment = match SceneFragment::derive(&entity) {
            Ok(fragment) => fragment,
            Err(e) => {
                self.report(e);
                return;
            }
        };

        let _scope = UpdateScope::new(self.parts.backend.as_ref());
        let result = match property {
            EntityProperty::Position | EntityProperty::Rotation | EntityProperty::Scale => {
                self.restage_segmented_descendants(&entity);
                self.write_transform(&binding, &fragment)
            }
            EntityProperty::Dimensions => self.write_dimensions(&binding, &fragment),
            EntityProperty::Vertices => {
                self.parts.builder.enqueue(id, StagedKind::PathUpdate, fragment);
                Ok(())
            }
            EntityProperty::Children => {
                self.reattach_children(id, &entity.children);
                for child in &entity.children {
                    if let Some(child) = self.parts.model.entity(*child) {
                        self.add_tree(&child);
                    }
                }
                Ok(())
            }
            EntityProperty::Collision | EntityProperty::Other(_) => Ok(()),
        };
        if let Err(e) = result {
            self.report(e);
        }
    }

    fn write_transform(&self, binding: &SceneNodeBinding, fragment: &SceneFragment) -> Result<(), BackendError> {
        if binding.segmented {
            return Ok(());
        }
        for (field, value) in fragment.transform_fields() {
            self.parts.backend.set_field(binding.content, field, value)?;
        }
        self.parts.collision.mark_unsettled();
        Ok(())
    }

    fn write_dimensions(&self, binding: &SceneNodeBinding, fragment: &SceneFragment) -> Result<(), BackendError> {
        if binding.segmented {
            return Ok(());
        }
        let size = FieldValue::Vec3(fragment.proxy_size);
        for node in [binding.shape, binding.proxy].into_iter().flatten() {
            self.parts.backend.set_field(node, Field::Size, size.clone())?;
        }
        self.parts.collision.mark_unsettled();
        Ok(())
    }

    /// An entity moved
    ///
    /// The content transform follows immediately; in elevation mode the
    /// move is then handed to the picking coordinator unless the entity is
    /// fixed or segmented.
    pub fn on_entity_moved(&self, id: EntityId, position: Vec3, transaction: Option<TransactionId>) {
        let Some(binding) = self.parts.registry.binding(id) else {
            self.report(SceneError::BindingNotFound(id));
            return;
        };
        if binding.segmented {
            return;
        }
        {
            let _scope = UpdateScope::new(self.parts.backend.as_ref());
            if let Err(e) = self.parts.backend.set_field(binding.content, Field::Translation, FieldValue::Vec3(position)) {
                self.report(e);
            }
        }
        if let Some(entity) = self.parts.model.entity(id) {
            self.restage_segmented_descendants(&entity);
        }

        match self.mode {
            PickingMode::Elevation => match self.parts.model.entity(id) {
                Some(entity) if !entity.flags.contains(EntityFlags::FIXED) => {
                    let frame = self.parent_frame(&entity);
                    self.parts.picking.on_position_changed(PickKey::entity(id), position, frame, transaction);
                }
                _ => {}
            },
            PickingMode::Collision => self.parts.collision.mark_unsettled(),
            PickingMode::Disabled => {}
        }
    }

    /// A vertex of a segmented entity moved
    pub fn on_subpart_moved(
        &self,
        id: EntityId,
        subpart: SubpartId,
        position: Vec3,
        transaction: Option<TransactionId>,
    ) {
        if !self.parts.registry.contains(id) {
            self.report(SceneError::BindingNotFound(id));
            return;
        }
        let Some(entity) = self.parts.model.entity(id) else {
            return;
        };
        match SceneFragment::derive(&entity) {
            Ok(fragment) => self.parts.builder.enqueue(id, StagedKind::PathUpdate, fragment),
            Err(e) => self.report(e),
        }
        if self.mode == PickingMode::Elevation && !entity.flags.contains(EntityFlags::FIXED) {
            let frame = self.parent_frame(&entity);
            self.parts.picking.on_position_changed(PickKey::subpart(id, subpart), position, frame, transaction);
        }
    }

    /// Queue a bounds rebuild for every bound segmented entity below
    /// `entity`
    ///
    /// Path bounds proxies hang off the scene root at world coordinates, so
    /// they go stale when an ancestor's transform changes.
    fn restage_segmented_descendants(&self, entity: &Entity) {
        let mut visited = BTreeSet::from([entity.id]);
        let mut pending = entity.children.clone();
        while let Some(id) = pending.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(child) = self.parts.model.entity(id) else { continue };
            pending.extend(child.children.iter().copied());
            let bound_segmented = self.parts.registry.binding(id).is_some_and(|binding| binding.segmented);
            if !bound_segmented {
                continue;
            }
            match SceneFragment::derive(&child) {
                Ok(fragment) => self.parts.builder.enqueue(id, StagedKind::PathUpdate, fragment),
                Err(e) => self.report(e),
            }
        }
    }

    /// Space an entity's position (and vertices) are expressed in
    ///
    /// Stacks the model transforms of every ancestor below the world.
    /// Segmented ancestors contribute nothing; their content transform is
    /// the identity.
    fn parent_frame(&self, entity: &Entity) -> Frame {
        let mut steps = Vec::new();
        let mut visited = BTreeSet::new();
        let mut next = entity.parent;
        while let Some(id) = next {
            if !visited.insert(id) {
                log::warn!("Parent chain of {} loops at {}", entity.id, id);
                break;
            }
            let Some(parent) = self.parts.model.entity(id) else { break };
            if parent.is_world() {
                break;
            }
            if !parent.is_segmented() {
                steps.push(Frame::from_transform(parent.position, &parent.rotation, parent.scale));
            }
            next = parent.parent;
        }
        steps.iter().rev().fold(Frame::identity(), |frame, step| frame.then(step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingReporter;
    use crate::model::InMemoryModel;
    use crate::render::HeadlessBackend;
    use crate::settings::{FeedbackConfig, PickingConfig};
    use approx::assert_relative_eq;

    struct Fixture {
        backend: Arc<HeadlessBackend>,
        model: Arc<InMemoryModel>,
        reporter: Arc<CollectingReporter>,
        registry: Arc<SceneNodeRegistry>,
        builder: Arc<FrameStagedBuilder>,
        picking: Arc<PickingCoordinator>,
        sync: SceneSynchronizer,
    }

    impl Fixture {
        fn new(mode: PickingMode) -> Self {
            let backend = Arc::new(HeadlessBackend::new());
            let model = Arc::new(InMemoryModel::new());
            let reporter = Arc::new(CollectingReporter::new());
            let registry = Arc::new(SceneNodeRegistry::new());
            let picking = Arc::new(PickingCoordinator::new(
                backend.clone(),
                model.clone(),
                reporter.clone(),
                PickingConfig::default(),
            ));
            let collision = Arc::new(CollisionMonitor::new(
                backend.clone(),
                model.clone(),
                reporter.clone(),
                FeedbackConfig::default(),
            ));
            let builder = Arc::new(FrameStagedBuilder::new(
                backend.clone(),
                registry.clone(),
                collision.clone(),
                reporter.clone(),
            ));
            let sync = SceneSynchronizer::new(
                SynchronizerParts {
                    backend: backend.clone(),
                    model: model.clone(),
                    registry: registry.clone(),
                    builder: builder.clone(),
                    picking: picking.clone(),
                    collision,
                    reporter: reporter.clone(),
                },
                mode,
            );
            Self { backend, model, reporter, registry, builder, picking, sync }
        }

        fn deliver(&self) {
            for event in self.model.drain_events() {
                self.sync.handle(&event);
            }
        }
    }

    #[test]
    fn test_add_binds_once() {
        let fx = Fixture::new(PickingMode::Elevation);
        fx.model.insert(Entity::model(1));
        fx.deliver();
        let binding = fx.registry.binding(EntityId(1)).unwrap();
        assert!(binding.shape.is_some());
        assert!(binding.material.is_some());
        assert!(fx.picking.is_target(EntityId(1)));

        let nodes = fx.backend.node_count();
        fx.model.replay_added(EntityId(1));
        fx.deliver();
        assert_eq!(fx.registry.len(), 1);
        assert_eq!(fx.backend.node_count(), nodes);
    }

    #[test]
    fn test_remove_deletes_nodes_and_pool_entry() {
        let fx = Fixture::new(PickingMode::Elevation);
        fx.model.insert(Entity::model(1));
        fx.deliver();
        let content = fx.registry.binding(EntityId(1)).unwrap().content;

        fx.model.remove(EntityId(1));
        fx.deliver();
        assert!(!fx.registry.contains(EntityId(1)));
        assert!(!fx.backend.contains_node(content));
        assert!(!fx.picking.is_target(EntityId(1)));
    }

    #[test]
    fn test_remove_unknown_reports_binding_not_found() {
        let fx = Fixture::new(PickingMode::Elevation);
        fx.sync.on_entity_removed(EntityId(42));
        assert_eq!(fx.reporter.errors(), vec![SceneError::BindingNotFound(EntityId(42))]);
    }

    #[test]
    fn test_collision_mode_stages_proxy() {
        let fx = Fixture::new(PickingMode::Collision);
        fx.model.insert(Entity::model(1));
        fx.deliver();
        assert_eq!(fx.builder.pending(), 1);
        assert_eq!(fx.picking.target_count(), 0);
    }

    #[test]
    fn test_segmented_entity_goes_to_builder_not_pool() {
        let fx = Fixture::new(PickingMode::Elevation);
        fx.model.insert(Entity::segment(3, vec![Vec3::zeros(), Vec3::new(2.0, 0.0, 0.0)]));
        fx.deliver();
        let binding = fx.registry.binding(EntityId(3)).unwrap();
        assert!(binding.segmented);
        assert!(binding.shape.is_none());
        assert_eq!(fx.builder.pending(), 1);
        assert!(!fx.picking.is_target(EntityId(3)));
    }

    #[test]
    fn test_dimension_change_replaces_shape_size_only() {
        let fx = Fixture::new(PickingMode::Disabled);
        fx.model.insert(Entity::model(1));
        fx.deliver();
        let before = fx.registry.binding(EntityId(1)).unwrap();

        fx.model.update(EntityId(1), EntityProperty::Dimensions, |e| e.dimensions = Vec3::new(2.0, 3.0, 4.0));
        fx.deliver();
        let after = fx.registry.binding(EntityId(1)).unwrap();
        assert_eq!(before, after);
        assert_eq!(
            fx.backend.node_kind(after.shape.unwrap()),
            Some(NodeKind::Box { size: Vec3::new(2.0, 3.0, 4.0) })
        );
    }

    #[test]
    fn test_non_geometric_property_ignored() {
        let fx = Fixture::new(PickingMode::Disabled);
        fx.model.insert(Entity::model(1));
        fx.deliver();
        let scopes = fx.backend.update_scopes();
        fx.model.update(EntityId(1), EntityProperty::Other("label".into()), |_| {});
        fx.deliver();
        assert_eq!(fx.backend.update_scopes(), scopes);
    }

    #[test]
    fn test_fixed_entity_not_picked_on_move() {
        let fx = Fixture::new(PickingMode::Elevation);
        fx.model.insert(Entity::model(1).with_flags(EntityFlags::FIXED));
        fx.model.insert(Entity::model(2));
        fx.deliver();

        fx.model.move_entity(EntityId(1), Vec3::new(3.0, 0.0, 0.0));
        fx.deliver();
        assert!(fx.picking.active_request().is_none());

        fx.model.move_entity(EntityId(2), Vec3::new(3.0, 0.0, 0.0));
        fx.deliver();
        assert_eq!(fx.picking.active_request().map(|r| r.key.entity), Some(EntityId(2)));
        let content = fx.registry.binding(EntityId(2)).unwrap().content;
        assert_eq!(fx.backend.field(content, Field::Translation), Ok(FieldValue::Vec3(Vec3::new(3.0, 0.0, 0.0))));
    }

    #[test]
    fn test_child_nests_under_parent_group() {
        let fx = Fixture::new(PickingMode::Disabled);
        fx.model.insert(Entity::model(1));
        fx.model.insert(Entity::model(2).with_parent(EntityId(1)));
        fx.deliver();

        let parent = fx.registry.binding(EntityId(1)).unwrap();
        let child = fx.registry.binding(EntityId(2)).unwrap();
        assert_eq!(child.parent_node, parent.children_group);

        fx.model.remove(EntityId(1));
        fx.deliver();
        assert!(fx.registry.is_empty());
        assert!(!fx.backend.contains_node(child.content));
    }

    #[test]
    fn test_child_move_carries_parent_frame() {
        let fx = Fixture::new(PickingMode::Elevation);
        fx.model.insert(
            Entity::model(1)
                .with_position(Vec3::new(10.0, 0.0, 10.0))
                .with_scale(Vec3::new(2.0, 1.0, 2.0))
                .with_flags(EntityFlags::FIXED),
        );
        fx.model.insert(Entity::model(2).with_parent(EntityId(1)));
        fx.deliver();

        fx.model.move_entity(EntityId(2), Vec3::new(1.0, 0.0, 0.0));
        fx.deliver();
        let request = fx.picking.active_request().unwrap();
        assert_eq!(request.target, Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(request.world_target(), Vec3::new(12.0, 0.0, 10.0), epsilon = 1e-5);

        // The parent is a surface through its own shape only
        let parent = fx.registry.binding(EntityId(1)).unwrap();
        let sensor = fx.picking.sensor().unwrap();
        assert_eq!(fx.backend.sensor_targets(sensor), vec![parent.shape.unwrap()]);
    }

    #[test]
    fn test_parent_move_restages_segmented_child_bounds() {
        let fx = Fixture::new(PickingMode::Disabled);
        fx.model.insert(Entity::model(1));
        fx.model.insert(Entity::segment(2, vec![Vec3::zeros(), Vec3::new(2.0, 0.0, 0.0)]).with_parent(EntityId(1)));
        fx.deliver();
        let settle = || {
            for _ in 0..2 {
                fx.backend.advance_frame();
                fx.builder.tick();
            }
            fx.backend.advance_frame();
        };
        settle();
        let proxy = fx.registry.binding(EntityId(2)).unwrap().proxy.unwrap();
        assert_relative_eq!(fx.backend.world_bounds(proxy).unwrap().center(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-5);

        fx.model.move_entity(EntityId(1), Vec3::new(5.0, 0.0, 0.0));
        fx.deliver();
        assert_eq!(fx.builder.pending(), 1);
        settle();

        let moved = fx.registry.binding(EntityId(2)).unwrap().proxy.unwrap();
        assert!(!fx.backend.contains_node(proxy));
        assert_relative_eq!(fx.backend.world_bounds(moved).unwrap().center(), Vec3::new(6.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_world_add_replaces_scene() {
        let fx = Fixture::new(PickingMode::Elevation);
        fx.model.insert(Entity::model(7));
        fx.deliver();
        let old_root = fx.registry.root().unwrap();

        fx.model.insert_silently(Entity::model(1));
        fx.model.insert_silently(Entity::model(2));
        fx.model
            .insert(Entity::new(EntityId(100), crate::model::EntityKind::World).with_children(vec![EntityId(1), EntityId(2)]));
        fx.deliver();

        assert_eq!(fx.sync.world(), Some(EntityId(100)));
        assert!(!fx.backend.contains_node(old_root));
        let mut bound = fx.registry.entities();
        bound.sort_unstable();
        assert_eq!(bound, vec![EntityId(1), EntityId(2)]);
        assert_eq!(fx.picking.target_count(), 2);

        fx.model.remove(EntityId(100));
        fx.deliver();
        assert!(fx.registry.is_empty());
        assert!(fx.registry.root().is_none());
        assert_eq!(fx.picking.target_count(), 0);
    }

    #[test]
    fn test_structural_changes_are_scoped() {
        let fx = Fixture::new(PickingMode::Elevation);
        fx.model.insert(Entity::model(1));
        fx.model.insert(Entity::model(2).with_parent(EntityId(1)));
        fx.model.move_entity(EntityId(1), Vec3::new(1.0, 0.0, 0.0));
        fx.model.update(EntityId(1), EntityProperty::Scale, |e| e.scale = Vec3::new(2.0, 2.0, 2.0));
        fx.model.remove(EntityId(2));
        fx.deliver();
        assert_eq!(fx.backend.unscoped_mutations(), 0);
        assert!(fx.backend.update_scopes() >= 5);
    }
}
