//! Headless in-memory renderer
//!
//! Keeps a retained scene tree without drawing anything and reproduces the
//! timing behavior the view has to cope with in a real engine:
//!
//! - nodes cannot be queried spatially in the frame they were inserted
//! - sensor geometry/target changes are confirmed on the next frame
//! - enabled sensors report their intersections every frame after that
//!
//! Picking uses world-space axis-aligned bounds: rays are tested with the
//! slab method, volumes with box overlap. Frames only advance when
//! [`HeadlessBackend::advance_frame`] is called.

use super::{
    BackendError, Field, FieldValue, NodeHandle, NodeKind, PickGeometry, PickHit, RenderEvent,
    SceneBackend, SensorHandle,
};
use crate::foundation::math::{Aabb, AxisAngle, Pose, Vec3};
use slotmap::{new_key_type, Key, KeyData, SlotMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

new_key_type! {
    struct NodeKey;
    struct SensorKey;
}

fn node_key(handle: NodeHandle) -> NodeKey {
    NodeKey::from(KeyData::from_ffi(handle.0))
}

fn node_handle(key: NodeKey) -> NodeHandle {
    NodeHandle(key.data().as_ffi())
}

fn sensor_key(handle: SensorHandle) -> SensorKey {
    SensorKey::from(KeyData::from_ffi(handle.0))
}

fn sensor_handle(key: SensorKey) -> SensorHandle {
    SensorHandle(key.data().as_ffi())
}

#[derive(Debug)]
struct HeadlessNode {
    kind: NodeKind,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
    inserted_frame: u64,
}

#[derive(Debug)]
struct HeadlessSensor {
    geometry: PickGeometry,
    targets: Vec<NodeHandle>,
    enabled: bool,
    geometry_pending: bool,
    targets_pending: bool,
}

#[derive(Debug, Default)]
struct HeadlessState {
    nodes: SlotMap<NodeKey, HeadlessNode>,
    sensors: SlotMap<SensorKey, HeadlessSensor>,
    frame: u64,
    update_depth: u32,
    update_scopes: usize,
    unscoped_mutations: usize,
    events: Vec<RenderEvent>,
    viewpoint: Pose,
}

impl HeadlessState {
    fn node(&self, handle: NodeHandle) -> Result<&HeadlessNode, BackendError> {
        self.nodes
            .get(node_key(handle))
            .ok_or(BackendError::NodeNotFound(handle))
    }

    fn sensor_mut(&mut self, handle: SensorHandle) -> Result<&mut HeadlessSensor, BackendError> {
        self.sensors
            .get_mut(sensor_key(handle))
            .ok_or(BackendError::SensorNotFound(handle))
    }

    fn note_mutation(&mut self) {
        if self.update_depth == 0 {
            self.unscoped_mutations += 1;
        }
    }

    /// Map a point from `key`'s local space to world space
    fn to_world(&self, key: NodeKey, point: Vec3) -> Vec3 {
        let mut point = point;
        let mut current = Some(key);
        while let Some(k) = current {
            let Some(node) = self.nodes.get(k) else { break };
            if let NodeKind::Transform { translation, rotation, scale } = &node.kind {
                point = translation + rotation.to_quat() * point.component_mul(scale);
            }
            current = node.parent;
        }
        point
    }

    fn subtree_bounds(&self, key: NodeKey) -> Option<Aabb> {
        let node = self.nodes.get(key)?;
        let local_points: Vec<Vec3> = match &node.kind {
            NodeKind::Box { size } | NodeKind::Proxy { size } => box_corners(*size),
            NodeKind::Path { points } => points.clone(),
            _ => Vec::new(),
        };
        // Shapes live in their parent's space; transforms apply to children
        let space = match node.kind {
            NodeKind::Transform { .. } => Some(key),
            _ => node.parent,
        };
        let mut world_points: Vec<Vec3> = local_points
            .iter()
            .map(|point| space.map_or(*point, |k| self.to_world(k, *point)))
            .collect();

        for child in &node.children {
            if let Some(bounds) = self.subtree_bounds(*child) {
                world_points.push(bounds.min);
                world_points.push(bounds.max);
            }
        }
        Aabb::enclosing(&world_points)
    }

    fn remove_subtree(&mut self, key: NodeKey) {
        if let Some(node) = self.nodes.remove(key) {
            for child in node.children {
                self.remove_subtree(child);
            }
        }
    }

    fn sensor_hits(&self, sensor: &HeadlessSensor) -> Vec<PickHit> {
        let mut hits = Vec::new();
        match &sensor.geometry {
            PickGeometry::Ray { origin, direction, length } => {
                let Some(direction) = direction.try_normalize(1.0e-6) else {
                    return hits;
                };
                for target in &sensor.targets {
                    let Some(bounds) = self.subtree_bounds(node_key(*target)) else { continue };
                    if let Some(t) = bounds.intersect_ray(*origin, direction, *length) {
                        hits.push(PickHit { node: *target, point: origin + direction * t });
                    }
                }
            }
            PickGeometry::Volume(volume) => {
                let Some(own) = self.subtree_bounds(node_key(*volume)) else {
                    return hits;
                };
                for target in &sensor.targets {
                    if target == volume {
                        continue;
                    }
                    let Some(bounds) = self.subtree_bounds(node_key(*target)) else { continue };
                    if own.overlaps(&bounds) {
                        hits.push(PickHit { node: *target, point: bounds.center() });
                    }
                }
            }
        }
        hits
    }
}

fn box_corners(size: Vec3) -> Vec<Vec3> {
    let half = size * 0.5;
    let mut corners = Vec::with_capacity(8);
    for sx in [-1.0, 1.0] {
        for sy in [-1.0, 1.0] {
            for sz in [-1.0, 1.0] {
                corners.push(Vec3::new(sx * half.x, sy * half.y, sz * half.z));
            }
        }
    }
    corners
}

/// In-memory [`SceneBackend`] with frame-accurate event timing
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    state: Mutex<HeadlessState>,
}

impl HeadlessBackend {
    /// Create an empty scene at frame 0
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Render one frame
    ///
    /// Queues a [`RenderEvent::FrameTick`], confirms pending sensor changes
    /// and reports intersections of enabled, settled sensors.
    pub fn advance_frame(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.frame += 1;
        state.events.push(RenderEvent::FrameTick);

        let keys: Vec<SensorKey> = state.sensors.keys().collect();
        for key in keys {
            let Some(sensor) = state.sensors.get(key) else { continue };
            let handle = sensor_handle(key);
            if sensor.geometry_pending || sensor.targets_pending {
                let (geometry, targets) = (sensor.geometry_pending, sensor.targets_pending);
                if geometry {
                    state.events.push(RenderEvent::GeometryApplied(handle));
                }
                if targets {
                    state.events.push(RenderEvent::TargetsApplied(handle));
                }
                if let Some(sensor) = state.sensors.get_mut(key) {
                    sensor.geometry_pending = false;
                    sensor.targets_pending = false;
                }
                continue;
            }
            if sensor.enabled {
                let hits = state.sensor_hits(sensor);
                state.events.push(RenderEvent::Intersection { sensor: handle, hits });
            }
        }
    }

    /// Current frame number
    pub fn frame(&self) -> u64 {
        self.lock().frame
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Whether a node exists
    pub fn contains_node(&self, node: NodeHandle) -> bool {
        self.lock().nodes.contains_key(node_key(node))
    }

    /// Kind of a live node
    pub fn node_kind(&self, node: NodeHandle) -> Option<NodeKind> {
        self.lock().nodes.get(node_key(node)).map(|n| n.kind.clone())
    }

    /// Children of a live node
    pub fn children(&self, node: NodeHandle) -> Vec<NodeHandle> {
        self.lock()
            .nodes
            .get(node_key(node))
            .map(|n| n.children.iter().copied().map(node_handle).collect())
            .unwrap_or_default()
    }

    /// Number of live sensors
    pub fn sensor_count(&self) -> usize {
        self.lock().sensors.len()
    }

    /// Current target list of a sensor
    pub fn sensor_targets(&self, sensor: SensorHandle) -> Vec<NodeHandle> {
        self.lock()
            .sensors
            .get(sensor_key(sensor))
            .map(|s| s.targets.clone())
            .unwrap_or_default()
    }

    /// Whether a sensor is enabled
    pub fn sensor_enabled(&self, sensor: SensorHandle) -> bool {
        self.lock()
            .sensors
            .get(sensor_key(sensor))
            .is_some_and(|s| s.enabled)
    }

    /// Last viewpoint set through the backend
    pub fn viewpoint(&self) -> Pose {
        self.lock().viewpoint
    }

    /// Number of completed atomic update scopes
    pub fn update_scopes(&self) -> usize {
        self.lock().update_scopes
    }

    /// Number of scene mutations made outside any atomic update scope
    pub fn unscoped_mutations(&self) -> usize {
        self.lock().unscoped_mutations
    }
}

impl SceneBackend for HeadlessBackend {
    fn create_node(&self, kind: NodeKind, parent: Option<NodeHandle>) -> Result<NodeHandle, BackendError> {
        let mut state = self.lock();
        let parent_key = match parent {
            Some(handle) => {
                state.node(handle)?;
                Some(node_key(handle))
            }
            None => None,
        };
        state.note_mutation();
        let inserted_frame = state.frame;
        let key = state.nodes.insert(HeadlessNode {
            kind,
            parent: parent_key,
            children: Vec::new(),
            inserted_frame,
        });
        if let Some(parent) = parent_key.and_then(|k| state.nodes.get_mut(k)) {
            parent.children.push(key);
        }
        Ok(node_handle(key))
    }

    fn remove_node(&self, node: NodeHandle) -> Result<(), BackendError> {
        let mut state = self.lock();
        let key = node_key(node);
        let parent = state.node(node)?.parent;
        state.note_mutation();
        if let Some(parent) = parent.and_then(|k| state.nodes.get_mut(k)) {
            parent.children.retain(|child| *child != key);
        }
        state.remove_subtree(key);
        Ok(())
    }

    fn set_field(&self, node: NodeHandle, field: Field, value: FieldValue) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.note_mutation();
        let target = state
            .nodes
            .get_mut(node_key(node))
            .ok_or(BackendError::NodeNotFound(node))?;
        match (&mut target.kind, field, value) {
            (NodeKind::Transform { translation, .. }, Field::Translation, FieldValue::Vec3(v)) => *translation = v,
            (NodeKind::Transform { rotation, .. }, Field::Rotation, FieldValue::Rotation(r)) => *rotation = r,
            (NodeKind::Transform { scale, .. }, Field::Scale, FieldValue::Vec3(v)) => *scale = v,
            (NodeKind::Box { size } | NodeKind::Proxy { size }, Field::Size, FieldValue::Vec3(v)) => *size = v,
            (NodeKind::Path { points }, Field::Points, FieldValue::Points(p)) => *points = p,
            (NodeKind::Material { emissive }, Field::EmissiveColor, FieldValue::Vec3(v)) => *emissive = v,
            _ => return Err(BackendError::InvalidField { node, field }),
        }
        Ok(())
    }

    fn field(&self, node: NodeHandle, field: Field) -> Result<FieldValue, BackendError> {
        let state = self.lock();
        let target = state.node(node)?;
        let value = match (&target.kind, field) {
            (NodeKind::Transform { translation, .. }, Field::Translation) => FieldValue::Vec3(*translation),
            (NodeKind::Transform { rotation, .. }, Field::Rotation) => FieldValue::Rotation(*rotation),
            (NodeKind::Transform { scale, .. }, Field::Scale) => FieldValue::Vec3(*scale),
            (NodeKind::Box { size } | NodeKind::Proxy { size }, Field::Size) => FieldValue::Vec3(*size),
            (NodeKind::Path { points }, Field::Points) => FieldValue::Points(points.clone()),
            (NodeKind::Material { emissive }, Field::EmissiveColor) => FieldValue::Vec3(*emissive),
            _ => return Err(BackendError::InvalidField { node, field }),
        };
        Ok(value)
    }

    fn world_bounds(&self, node: NodeHandle) -> Result<Aabb, BackendError> {
        let state = self.lock();
        let target = state.node(node)?;
        if target.inserted_frame >= state.frame {
            return Err(BackendError::NotSettled(node));
        }
        state
            .subtree_bounds(node_key(node))
            .ok_or_else(|| BackendError::Rejected(format!("{node} has no geometry")))
    }

    fn create_sensor(&self, geometry: PickGeometry) -> Result<SensorHandle, BackendError> {
        let mut state = self.lock();
        let key = state.sensors.insert(HeadlessSensor {
            geometry,
            targets: Vec::new(),
            enabled: false,
            geometry_pending: true,
            targets_pending: false,
        });
        Ok(sensor_handle(key))
    }

    fn set_sensor_geometry(&self, sensor: SensorHandle, geometry: PickGeometry) -> Result<(), BackendError> {
        let mut state = self.lock();
        let target = state.sensor_mut(sensor)?;
        target.geometry = geometry;
        target.geometry_pending = true;
        Ok(())
    }

    fn set_sensor_targets(&self, sensor: SensorHandle, targets: &[NodeHandle]) -> Result<(), BackendError> {
        let mut state = self.lock();
        let target = state.sensor_mut(sensor)?;
        target.targets = targets.to_vec();
        target.targets_pending = true;
        Ok(())
    }

    fn set_sensor_enabled(&self, sensor: SensorHandle, enabled: bool) -> Result<(), BackendError> {
        self.lock().sensor_mut(sensor)?.enabled = enabled;
        Ok(())
    }

    fn remove_sensor(&self, sensor: SensorHandle) -> Result<(), BackendError> {
        self.lock()
            .sensors
            .remove(sensor_key(sensor))
            .map(|_| ())
            .ok_or(BackendError::SensorNotFound(sensor))
    }

    fn set_viewpoint(&self, pose: Pose) -> Result<(), BackendError> {
        self.lock().viewpoint = pose;
        Ok(())
    }

    fn begin_update(&self) {
        self.lock().update_depth += 1;
    }

    fn end_update(&self) {
        let mut state = self.lock();
        if state.update_depth == 0 {
            log::warn!("end_update without matching begin_update");
            return;
        }
        state.update_depth -= 1;
        if state.update_depth == 0 {
            state.update_scopes += 1;
        }
    }

    fn drain_events(&self) -> Vec<RenderEvent> {
        std::mem::take(&mut self.lock().events)
    }
}

impl HeadlessBackend {
    /// Convenience: a transform node with identity rotation and unit scale
    pub fn create_transform(&self, translation: Vec3, parent: Option<NodeHandle>) -> Result<NodeHandle, BackendError> {
        self.create_node(
            NodeKind::Transform {
                translation,
                rotation: AxisAngle::identity(),
                scale: Vec3::new(1.0, 1.0, 1.0),
            },
            parent,
        )
    }
}
