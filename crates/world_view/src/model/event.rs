//! Notifications emitted by the entity model

use super::entity::{Entity, EntityId, EntityProperty, SubpartId, TransactionId};
use crate::foundation::math::Vec3;

/// Entity model notification
///
/// `transaction` is the id of the command that caused the change, when the
/// model knows it. Changes replayed from peers or made by the user directly
/// carry `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// An entity became live
    Added(Entity),
    /// An entity was removed
    Removed(EntityId),
    /// An entity moved
    Moved {
        /// Entity that moved
        entity: EntityId,
        /// New position
        position: Vec3,
        /// Command that caused the move, if known
        transaction: Option<TransactionId>,
    },
    /// A vertex of a segmented entity moved
    SubpartMoved {
        /// Owning entity
        entity: EntityId,
        /// Vertex index
        subpart: SubpartId,
        /// New position
        position: Vec3,
        /// Command that caused the move, if known
        transaction: Option<TransactionId>,
    },
    /// Some other property changed
    PropertyChanged {
        /// Entity whose property changed
        entity: EntityId,
        /// Which property
        property: EntityProperty,
    },
}

impl ModelEvent {
    /// Entity the event concerns
    pub fn entity_id(&self) -> EntityId {
        match self {
            Self::Added(entity) => entity.id,
            Self::Removed(entity)
            | Self::Moved { entity, .. }
            | Self::SubpartMoved { entity, .. }
            | Self::PropertyChanged { entity, .. } => *entity,
        }
    }
}
