//! Commands issued by the view against the entity model

use super::entity::{EntityId, SubpartId, TransactionId};
use crate::foundation::math::{Pose, Vec3};
use serde::{Deserialize, Serialize};

/// A command submitted to the entity model
///
/// Every command carries the transaction id it was issued under, which the
/// model is expected to echo back on the notifications it produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Move an entity (final, not transient)
    MoveEntity {
        /// Entity to move
        entity: EntityId,
        /// Position before the move
        from: Vec3,
        /// Position after the move
        to: Vec3,
        /// Correlation token
        transaction: TransactionId,
    },
    /// Move one vertex of a segmented entity
    MoveSubpart {
        /// Owning entity
        entity: EntityId,
        /// Vertex index
        subpart: SubpartId,
        /// Position before the move
        from: Vec3,
        /// Position after the move
        to: Vec3,
        /// Correlation token
        transaction: TransactionId,
    },
    /// Update an entity's collision flag and colliding-entity list
    UpdateCollision {
        /// Entity whose state changed
        entity: EntityId,
        /// Whether it currently collides with anything
        colliding: bool,
        /// The entities it collides with
        targets: Vec<EntityId>,
        /// Correlation token
        transaction: TransactionId,
    },
    /// Change the shared viewpoint
    ChangeView {
        /// New pose
        pose: Pose,
        /// Estimated linear velocity (units per second)
        linear_velocity: Vec3,
        /// Estimated angular velocity (axis scaled by radians per second)
        angular_velocity: Vec3,
        /// Transient updates are interpolation hints; the final one commits
        transient: bool,
        /// Correlation token shared by every update of one navigation gesture
        transaction: TransactionId,
    },
    /// Announce that this view takes over as navigation master
    TakeOverView {
        /// Correlation token
        transaction: TransactionId,
    },
}

impl Command {
    /// Transaction id of the command
    pub fn transaction(&self) -> TransactionId {
        match self {
            Self::MoveEntity { transaction, .. }
            | Self::MoveSubpart { transaction, .. }
            | Self::UpdateCollision { transaction, .. }
            | Self::ChangeView { transaction, .. }
            | Self::TakeOverView { transaction } => *transaction,
        }
    }

    /// Whether this is a transient view change
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ChangeView { transient: true, .. })
    }
}
