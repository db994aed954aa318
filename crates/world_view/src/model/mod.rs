//! Entity model interface
//!
//! The entity model is the authoritative store of placed entities. The view
//! only reads snapshots from it and submits [`Command`]s; changes come back
//! as [`ModelEvent`]s.

pub mod command;
pub mod entity;
pub mod event;
pub mod memory;

pub use command::Command;
pub use entity::{Entity, EntityFlags, EntityId, EntityKind, EntityProperty, SubpartId, TransactionId};
pub use event::ModelEvent;
pub use memory::InMemoryModel;

/// Access to the authoritative entity store
///
/// Implementations must be callable from the renderer callback thread and
/// from the navigation poller thread.
pub trait EntityModel: Send + Sync {
    /// Current snapshot of an entity, `None` if it is not live
    fn entity(&self, id: EntityId) -> Option<Entity>;

    /// Obtain a fresh, unique transaction id
    fn issue_transaction_id(&self) -> TransactionId;

    /// Submit a command
    ///
    /// The model may emit notifications as a consequence; it must not call
    /// back into the view synchronously from inside this method.
    fn apply(&self, command: Command);
}
