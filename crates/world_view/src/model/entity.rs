//! Entity snapshot types read from the entity model

use crate::foundation::math::{AxisAngle, Vec3};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity identifier assigned by the entity model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Index of a sub-part (vertex) of a segmented entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubpartId(pub u32);

/// Correlation token for commands issued to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

/// Entity type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// The root of the world; adding it replaces the whole scene
    World,
    /// A placed model
    Model,
    /// A segmented entity (walls, paths) made of vertices
    Segment,
    /// A single vertex
    Vertex,
    /// A floor zone
    Zone,
    /// A viewpoint marker
    Viewpoint,
    /// Anything else the model knows about
    Other,
}

bitflags! {
    /// Per-entity behavior flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EntityFlags: u32 {
        /// Built from sub-part vertices; never used as a pick target
        const SEGMENTED = 1 << 0;
        /// Collision state is tracked but not highlighted
        const SUPPRESS_COLLISION_FEEDBACK = 1 << 1;
        /// Never re-placed by elevation picking
        const FIXED = 1 << 2;
    }
}

/// Snapshot of an entity as held by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Identity
    pub id: EntityId,
    /// Type tag
    pub kind: EntityKind,
    /// Position relative to the parent entity (world space at top level)
    pub position: Vec3,
    /// Rotation
    pub rotation: AxisAngle,
    /// Scale factors
    pub scale: Vec3,
    /// Box size of the entity's geometry before scaling
    pub dimensions: Vec3,
    /// Parent entity, if any
    pub parent: Option<EntityId>,
    /// Child entities
    pub children: Vec<EntityId>,
    /// Behavior flags
    pub flags: EntityFlags,
    /// Sub-part positions of a segmented entity, indexed by [`SubpartId`]
    pub vertices: Vec<Vec3>,
    /// Last collision state written through a command
    pub colliding: bool,
    /// Entities this one currently collides with
    pub collision_targets: Vec<EntityId>,
}

impl Entity {
    /// Create an entity of the given kind at the origin with unit size
    pub fn new(id: EntityId, kind: EntityKind) -> Self {
        Self {
            id,
            kind,
            position: Vec3::zeros(),
            rotation: AxisAngle::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            dimensions: Vec3::new(1.0, 1.0, 1.0),
            parent: None,
            children: Vec::new(),
            flags: EntityFlags::empty(),
            vertices: Vec::new(),
            colliding: false,
            collision_targets: Vec::new(),
        }
    }

    /// Convenience constructor for a placed model
    pub fn model(id: u32) -> Self {
        Self::new(EntityId(id), EntityKind::Model)
    }

    /// Convenience constructor for a segmented entity with the given vertices
    pub fn segment(id: u32, vertices: Vec<Vec3>) -> Self {
        let mut entity = Self::new(EntityId(id), EntityKind::Segment);
        entity.flags |= EntityFlags::SEGMENTED;
        entity.vertices = vertices;
        entity
    }

    /// Set position
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Set rotation
    pub fn with_rotation(mut self, rotation: AxisAngle) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set scale
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Set box dimensions
    pub fn with_dimensions(mut self, dimensions: Vec3) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Add flags
    pub fn with_flags(mut self, flags: EntityFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Set the parent link
    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set the child links
    pub fn with_children(mut self, children: Vec<EntityId>) -> Self {
        self.children = children;
        self
    }

    /// Whether the entity is built from sub-part vertices
    pub fn is_segmented(&self) -> bool {
        self.flags.contains(EntityFlags::SEGMENTED)
    }

    /// Whether this is the distinguished world entity
    pub fn is_world(&self) -> bool {
        self.kind == EntityKind::World
    }
}

/// Property of an entity that changed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityProperty {
    /// Position changed
    Position,
    /// Rotation changed
    Rotation,
    /// Scale changed
    Scale,
    /// Child list changed
    Children,
    /// Sub-part vertices changed
    Vertices,
    /// Box dimensions changed
    Dimensions,
    /// Collision flag or targets changed
    Collision,
    /// Any other named property
    Other(String),
}

impl EntityProperty {
    /// Whether a change to this property requires new scene geometry
    pub fn affects_geometry(&self) -> bool {
        matches!(
            self,
            Self::Position | Self::Rotation | Self::Scale | Self::Children | Self::Vertices | Self::Dimensions
        )
    }
}
