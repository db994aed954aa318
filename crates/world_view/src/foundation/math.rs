//! Math utilities and types
//!
//! Provides the geometric vocabulary shared by the model, the scene and the
//! picking code: vectors, axis-angle rotations, viewpoint poses and
//! axis-aligned boxes.

use serde::{Deserialize, Serialize};

pub use nalgebra::{Matrix4, Quaternion, Unit, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// 4x4 matrix type for affine transforms
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// The up axis used for elevation queries (+Y)
pub const UP: usize = 1;

/// Rotation expressed as a unit axis and an angle in radians
///
/// This is the form the entity model stores; it is converted to a
/// quaternion only when velocities have to be estimated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisAngle {
    /// Rotation axis (not required to be normalized on input)
    pub axis: Vec3,
    /// Rotation angle in radians
    pub angle: f32,
}

impl AxisAngle {
    /// Create a new axis-angle rotation
    pub fn new(axis: Vec3, angle: f32) -> Self {
        Self { axis, angle }
    }

    /// The identity rotation (zero angle around +Y)
    pub fn identity() -> Self {
        Self { axis: Vec3::y(), angle: 0.0 }
    }

    /// Convert to a unit quaternion
    ///
    /// A degenerate (zero length) axis yields the identity rotation.
    pub fn to_quat(&self) -> Quat {
        match Unit::try_new(self.axis, 1.0e-6) {
            Some(axis) => Quat::from_axis_angle(&axis, self.angle),
            None => Quat::identity(),
        }
    }

    /// Convert back from a unit quaternion
    pub fn from_quat(rotation: &Quat) -> Self {
        match rotation.axis_angle() {
            Some((axis, angle)) => Self { axis: axis.into_inner(), angle },
            None => Self::identity(),
        }
    }
}

impl Default for AxisAngle {
    fn default() -> Self {
        Self::identity()
    }
}

/// Viewpoint pose: position plus orientation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Eye position
    pub position: Vec3,
    /// View orientation
    pub orientation: AxisAngle,
}

impl Pose {
    /// Create a new pose
    pub fn new(position: Vec3, orientation: AxisAngle) -> Self {
        Self { position, orientation }
    }

    /// Pose at a position with identity orientation
    pub fn at(position: Vec3) -> Self {
        Self { position, orientation: AxisAngle::identity() }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::at(Vec3::zeros())
    }
}

/// Affine mapping from a local coordinate space to world space
///
/// Built by stacking translate/rotate/scale steps from the outermost
/// ancestor inwards, the same order the scene graph applies them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    matrix: Mat4,
}

impl Frame {
    /// World space itself
    pub fn identity() -> Self {
        Self { matrix: Mat4::identity() }
    }

    /// Frame of one transform step
    pub fn from_transform(translation: Vec3, rotation: &AxisAngle, scale: Vec3) -> Self {
        Self {
            matrix: Mat4::new_translation(&translation)
                * rotation.to_quat().to_homogeneous()
                * Mat4::new_nonuniform_scaling(&scale),
        }
    }

    /// Nest `inner` inside this frame
    #[must_use]
    pub fn then(&self, inner: &Self) -> Self {
        Self { matrix: self.matrix * inner.matrix }
    }

    /// Whether this is the identity frame
    pub fn is_identity(&self) -> bool {
        self.matrix == Mat4::identity()
    }

    /// Map a local point to world space
    pub fn to_world(&self, point: Vec3) -> Vec3 {
        self.matrix.transform_point(&Point3::from(point)).coords
    }

    /// Map a world point into this frame
    ///
    /// `None` when the frame collapses an axis (zero scale).
    pub fn to_local(&self, point: Vec3) -> Option<Vec3> {
        let inverse = self.matrix.try_inverse()?;
        Some(inverse.transform_point(&Point3::from(point)).coords)
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::identity()
    }
}

/// Axis-Aligned Bounding Box for proxy volumes and pick tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given half extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Smallest box enclosing all points, `None` for an empty slice
    pub fn enclosing(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bounds = Self::new(*first, *first);
        for point in rest {
            bounds.min = bounds.min.inf(point);
            bounds.max = bounds.max.sup(point);
        }
        Some(bounds)
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if this AABB intersects another AABB
    ///
    /// Touching faces do not count as an overlap; proxies placed flush
    /// against each other are not colliding.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x && self.max.x > other.min.x &&
        self.min.y < other.max.y && self.max.y > other.min.y &&
        self.min.z < other.max.z && self.max.z > other.min.z
    }

    /// Test ray intersection with this AABB using the slab method
    ///
    /// Returns the distance to the entry point if the ray intersects within
    /// `max_distance`.
    pub fn intersect_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<f32> {
        let inv = |d: f32| if d != 0.0 { 1.0 / d } else { f32::INFINITY };
        let inv_dir = Vec3::new(inv(direction.x), inv(direction.y), inv(direction.z));

        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;
        for axis in 0..3 {
            if direction[axis] == 0.0 {
                // Parallel to this slab: must already be inside it
                if origin[axis] < self.min[axis] || origin[axis] > self.max[axis] {
                    return None;
                }
                continue;
            }
            let t1 = (self.min[axis] - origin[axis]) * inv_dir[axis];
            let t2 = (self.max[axis] - origin[axis]) * inv_dir[axis];
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
        }

        if t_max >= t_min && t_max >= 0.0 && t_min <= max_distance {
            Some(t_min.max(0.0))
        } else {
            None
        }
    }
}

/// Component-wise approximate equality of two positions
pub fn positions_match(a: &Vec3, b: &Vec3, epsilon: f32) -> bool {
    (a - b).iter().all(|component| component.abs() <= epsilon)
}
