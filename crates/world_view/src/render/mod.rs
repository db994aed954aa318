//! Rendering engine interface
//!
//! The view drives an external retained-mode renderer through
//! [`SceneBackend`]. Handles are opaque; the renderer owns the nodes.
//!
//! Two timing rules of the renderer shape everything above this module:
//!
//! - Spatial queries on a node are only valid one frame after the node was
//!   inserted ([`BackendError::NotSettled`] before that).
//! - Pick sensor geometry and target list changes take effect on a later
//!   frame; the renderer confirms them with [`RenderEvent::GeometryApplied`]
//!   and [`RenderEvent::TargetsApplied`].
//!
//! Renderer events are never delivered synchronously from a backend call.
//! They queue up and are collected with [`SceneBackend::drain_events`].

pub mod headless;

use crate::foundation::math::{Aabb, AxisAngle, Pose, Vec3};
use std::fmt;
use thiserror::Error;

pub use headless::HeadlessBackend;

/// Opaque handle of a renderer-owned scene node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(pub u64);

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{:x}", self.0)
    }
}

/// Opaque handle of a renderer-owned pick sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorHandle(pub u64);

impl fmt::Display for SensorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sensor#{:x}", self.0)
    }
}

/// Node types the view creates
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Plain grouping node
    Group,
    /// Transform applied to all children
    Transform {
        /// Translation
        translation: Vec3,
        /// Rotation
        rotation: AxisAngle,
        /// Non-uniform scale
        scale: Vec3,
    },
    /// Visible box centered on its parent's origin
    Box {
        /// Full edge lengths
        size: Vec3,
    },
    /// Composite path through a list of points
    Path {
        /// Path vertices in the parent's space
        points: Vec<Vec3>,
    },
    /// Invisible box used as a collision proxy
    Proxy {
        /// Full edge lengths
        size: Vec3,
    },
    /// Material applied to sibling geometry
    Material {
        /// Emissive color, used for collision highlighting
        emissive: Vec3,
    },
}

/// Mutable node fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// `Transform` translation
    Translation,
    /// `Transform` rotation
    Rotation,
    /// `Transform` scale
    Scale,
    /// `Box` / `Proxy` size
    Size,
    /// `Path` points
    Points,
    /// `Material` emissive color
    EmissiveColor,
}

/// Value written to or read from a [`Field`]
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Vector valued fields
    Vec3(Vec3),
    /// Rotation fields
    Rotation(AxisAngle),
    /// Point list fields
    Points(Vec<Vec3>),
}

/// Shape a pick sensor tests with
#[derive(Debug, Clone, PartialEq)]
pub enum PickGeometry {
    /// A ray segment
    Ray {
        /// Start of the ray
        origin: Vec3,
        /// Direction (normalized by the renderer)
        direction: Vec3,
        /// Length of the segment
        length: f32,
    },
    /// The world-space volume of an existing node
    Volume(NodeHandle),
}

/// One intersection reported by a pick sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickHit {
    /// Target node that was hit
    pub node: NodeHandle,
    /// Intersection point in world space
    pub point: Vec3,
}

/// Renderer notifications
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// A new frame was rendered
    FrameTick,
    /// The sensor's pick geometry change took effect
    GeometryApplied(SensorHandle),
    /// The sensor's target list change took effect
    TargetsApplied(SensorHandle),
    /// Intersection state of an enabled sensor for this frame
    ///
    /// An empty hit list means the sensor is not intersecting anything.
    Intersection {
        /// Reporting sensor
        sensor: SensorHandle,
        /// Current hits
        hits: Vec<PickHit>,
    },
}

/// Backend failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The node does not exist
    #[error("Unknown node {0}")]
    NodeNotFound(NodeHandle),

    /// The sensor does not exist
    #[error("Unknown sensor {0}")]
    SensorNotFound(SensorHandle),

    /// The node has no such field or the value has the wrong type
    #[error("Field {field:?} is not valid on {node}")]
    InvalidField {
        /// Node written to
        node: NodeHandle,
        /// Field written
        field: Field,
    },

    /// A spatial query was made before the node settled
    #[error("Node {0} has not settled yet")]
    NotSettled(NodeHandle),

    /// The renderer refused the operation
    #[error("Renderer rejected operation: {0}")]
    Rejected(String),
}

/// Operations the view needs from a retained-mode renderer
pub trait SceneBackend: Send + Sync {
    /// Create a node, optionally attached under `parent`
    fn create_node(&self, kind: NodeKind, parent: Option<NodeHandle>) -> Result<NodeHandle, BackendError>;

    /// Remove a node and its whole subtree
    fn remove_node(&self, node: NodeHandle) -> Result<(), BackendError>;

    /// Write a field
    fn set_field(&self, node: NodeHandle, field: Field, value: FieldValue) -> Result<(), BackendError>;

    /// Read a field
    fn field(&self, node: NodeHandle, field: Field) -> Result<FieldValue, BackendError>;

    /// World-space bounds of a node's subtree
    fn world_bounds(&self, node: NodeHandle) -> Result<Aabb, BackendError>;

    /// Create a disabled pick sensor
    fn create_sensor(&self, geometry: PickGeometry) -> Result<SensorHandle, BackendError>;

    /// Replace a sensor's pick geometry
    fn set_sensor_geometry(&self, sensor: SensorHandle, geometry: PickGeometry) -> Result<(), BackendError>;

    /// Replace a sensor's target list
    fn set_sensor_targets(&self, sensor: SensorHandle, targets: &[NodeHandle]) -> Result<(), BackendError>;

    /// Enable or disable a sensor
    fn set_sensor_enabled(&self, sensor: SensorHandle, enabled: bool) -> Result<(), BackendError>;

    /// Destroy a sensor
    fn remove_sensor(&self, sensor: SensorHandle) -> Result<(), BackendError>;

    /// Move the local viewpoint
    fn set_viewpoint(&self, pose: Pose) -> Result<(), BackendError>;

    /// Start an atomic update; nothing is presented until the matching end
    fn begin_update(&self);

    /// Finish an atomic update
    fn end_update(&self);

    /// Collect queued renderer events
    fn drain_events(&self) -> Vec<RenderEvent>;
}

/// RAII atomic update scope
///
/// Calls [`SceneBackend::begin_update`] on creation and
/// [`SceneBackend::end_update`] on drop, so early returns cannot leave the
/// renderer holding a half-applied change.
pub struct UpdateScope<'a> {
    backend: &'a dyn SceneBackend,
}

impl<'a> UpdateScope<'a> {
    /// Open a scope
    pub fn new(backend: &'a dyn SceneBackend) -> Self {
        backend.begin_update();
        Self { backend }
    }
}

impl Drop for UpdateScope<'_> {
    fn drop(&mut self) {
        self.backend.end_update();
    }
}
