//! Scene fragments derived from entity snapshots
//!
//! A fragment is the renderer-independent description of the nodes one
//! entity needs. Segmented entities place their path in the parent's space,
//! so their content transform is always the identity.

use crate::error::SceneError;
use crate::foundation::math::{AxisAngle, Vec3};
use crate::model::{Entity, EntityFlags, EntityId};
use crate::render::{Field, FieldValue, NodeKind};

/// Visible shape of an entity
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeSpec {
    /// Box of the entity's dimensions
    Box {
        /// Full edge lengths
        size: Vec3,
    },
    /// Composite path through the entity's vertices
    Path {
        /// Path vertices
        points: Vec<Vec3>,
    },
}

/// Everything needed to build one entity's scene representation
#[derive(Debug, Clone, PartialEq)]
pub struct SceneFragment {
    /// Entity described
    pub entity: EntityId,
    /// Parent entity, whose children group hosts this fragment
    pub parent: Option<EntityId>,
    /// Content translation
    pub translation: Vec3,
    /// Content rotation
    pub rotation: AxisAngle,
    /// Content scale
    pub scale: Vec3,
    /// Visible shape
    pub shape: ShapeSpec,
    /// Size of the collision proxy box
    pub proxy_size: Vec3,
    /// Behavior flags copied from the entity
    pub flags: EntityFlags,
}

impl SceneFragment {
    /// Derive a fragment from an entity snapshot
    ///
    /// Fails with [`SceneError::Construction`] when the snapshot cannot be
    /// represented: non-finite transforms, non-positive dimensions, or a
    /// segmented entity with fewer than two vertices.
    pub fn derive(entity: &Entity) -> Result<Self, SceneError> {
        let fail = |reason: &str| SceneError::Construction {
            entity: entity.id,
            reason: reason.to_string(),
        };

        if !all_finite(&entity.position) || !all_finite(&entity.scale) || !entity.rotation.angle.is_finite() {
            return Err(fail("non-finite transform"));
        }

        if entity.is_segmented() {
            if entity.vertices.len() < 2 {
                return Err(fail("segmented entity needs at least two vertices"));
            }
            if !entity.vertices.iter().all(all_finite) {
                return Err(fail("non-finite vertex"));
            }
            return Ok(Self {
                entity: entity.id,
                parent: entity.parent,
                translation: Vec3::zeros(),
                rotation: AxisAngle::identity(),
                scale: Vec3::new(1.0, 1.0, 1.0),
                shape: ShapeSpec::Path { points: entity.vertices.clone() },
                proxy_size: Vec3::zeros(),
                flags: entity.flags,
            });
        }

        if !all_finite(&entity.dimensions) || entity.dimensions.iter().any(|d| *d <= 0.0) {
            return Err(fail("dimensions must be positive"));
        }

        Ok(Self {
            entity: entity.id,
            parent: entity.parent,
            translation: entity.position,
            rotation: entity.rotation,
            scale: entity.scale,
            shape: ShapeSpec::Box { size: entity.dimensions },
            proxy_size: entity.dimensions,
            flags: entity.flags,
        })
    }

    /// Whether the fragment is a composite path
    pub fn is_segmented(&self) -> bool {
        matches!(self.shape, ShapeSpec::Path { .. })
    }

    /// Content transform node
    pub fn transform_node(&self) -> NodeKind {
        NodeKind::Transform {
            translation: self.translation,
            rotation: self.rotation,
            scale: self.scale,
        }
    }

    /// Visible shape node
    pub fn shape_node(&self) -> NodeKind {
        match &self.shape {
            ShapeSpec::Box { size } => NodeKind::Box { size: *size },
            ShapeSpec::Path { points } => NodeKind::Path { points: points.clone() },
        }
    }

    /// Collision proxy node
    pub fn proxy_node(&self) -> NodeKind {
        NodeKind::Proxy { size: self.proxy_size }
    }

    /// Path points, for segmented fragments
    pub fn points(&self) -> Option<&[Vec3]> {
        match &self.shape {
            ShapeSpec::Path { points } => Some(points),
            ShapeSpec::Box { .. } => None,
        }
    }

    /// Field writes that bring an existing content transform up to date
    pub fn transform_fields(&self) -> [(Field, FieldValue); 3] {
        [
            (Field::Translation, FieldValue::Vec3(self.translation)),
            (Field::Rotation, FieldValue::Rotation(self.rotation)),
            (Field::Scale, FieldValue::Vec3(self.scale)),
        ]
    }
}

fn all_finite(v: &Vec3) -> bool {
    v.iter().all(|c| c.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_fragment_uses_entity_transform() {
        let entity = Entity::model(1)
            .with_position(Vec3::new(1.0, 2.0, 3.0))
            .with_dimensions(Vec3::new(2.0, 1.0, 0.5));
        let fragment = SceneFragment::derive(&entity).unwrap();
        assert!(!fragment.is_segmented());
        assert_eq!(fragment.translation, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(fragment.shape_node(), NodeKind::Box { size: Vec3::new(2.0, 1.0, 0.5) });
        assert_eq!(fragment.proxy_node(), NodeKind::Proxy { size: Vec3::new(2.0, 1.0, 0.5) });
    }

    #[test]
    fn test_path_fragment_has_identity_transform() {
        let entity = Entity::segment(2, vec![Vec3::zeros(), Vec3::new(4.0, 0.0, 0.0)])
            .with_position(Vec3::new(9.0, 9.0, 9.0));
        let fragment = SceneFragment::derive(&entity).unwrap();
        assert!(fragment.is_segmented());
        assert_eq!(fragment.translation, Vec3::zeros());
        assert_eq!(fragment.points().map(<[Vec3]>::len), Some(2));
    }

    #[test]
    fn test_malformed_entities_rejected() {
        let flat = Entity::model(3).with_dimensions(Vec3::new(1.0, 0.0, 1.0));
        assert!(matches!(
            SceneFragment::derive(&flat),
            Err(SceneError::Construction { entity: EntityId(3), .. })
        ));

        let stub = Entity::segment(4, vec![Vec3::zeros()]);
        assert!(SceneFragment::derive(&stub).is_err());

        let lost = Entity::model(5).with_position(Vec3::new(f32::NAN, 0.0, 0.0));
        assert!(SceneFragment::derive(&lost).is_err());
    }
}
