//! In-memory entity model
//!
//! A small authoritative store used by the viewer binary and by tests. It
//! applies commands to its entities, records every command it receives and
//! queues the notifications a real model would broadcast.

use super::{Command, Entity, EntityId, EntityModel, EntityProperty, ModelEvent, TransactionId};
use crate::foundation::math::Vec3;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MemoryState {
    entities: HashMap<EntityId, Entity>,
    next_transaction: u64,
    applied: Vec<Command>,
    pending: VecDeque<ModelEvent>,
}

/// Entity model kept entirely in memory
#[derive(Debug)]
pub struct InMemoryModel {
    state: Mutex<MemoryState>,
    echo_transactions: bool,
}

impl InMemoryModel {
    /// Create an empty model that echoes transaction ids on notifications
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            echo_transactions: true,
        }
    }

    /// Create a model that drops transaction ids from its notifications,
    /// like a peer replaying changes over the network
    pub fn without_transaction_echo() -> Self {
        Self {
            echo_transactions: false,
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an entity and announce it
    ///
    /// If the entity names a parent that is live, it is appended to the
    /// parent's children.
    pub fn insert(&self, entity: Entity) {
        let mut state = self.lock();
        if let Some(parent) = entity.parent.and_then(|id| state.entities.get_mut(&id)) {
            if !parent.children.contains(&entity.id) {
                parent.children.push(entity.id);
            }
        }
        state.pending.push_back(ModelEvent::Added(entity.clone()));
        state.entities.insert(entity.id, entity);
    }

    /// Insert an entity without announcing it
    ///
    /// Used to stage the children of a world entity before the world itself
    /// is announced.
    pub fn insert_silently(&self, entity: Entity) {
        self.lock().entities.insert(entity.id, entity);
    }

    /// Re-announce an already inserted entity (networked replay)
    pub fn replay_added(&self, id: EntityId) {
        let mut state = self.lock();
        if let Some(entity) = state.entities.get(&id).cloned() {
            state.pending.push_back(ModelEvent::Added(entity));
        }
    }

    /// Remove an entity and announce it
    pub fn remove(&self, id: EntityId) -> Option<Entity> {
        let mut state = self.lock();
        let removed = state.entities.remove(&id)?;
        for entity in state.entities.values_mut() {
            entity.children.retain(|child| *child != id);
        }
        state.pending.push_back(ModelEvent::Removed(id));
        Some(removed)
    }

    /// Move an entity as a user gesture would (no transaction)
    pub fn move_entity(&self, id: EntityId, position: Vec3) -> bool {
        let mut state = self.lock();
        let Some(entity) = state.entities.get_mut(&id) else {
            return false;
        };
        entity.position = position;
        state.pending.push_back(ModelEvent::Moved { entity: id, position, transaction: None });
        true
    }

    /// Mutate an entity in place and announce the changed property
    pub fn update<F>(&self, id: EntityId, property: EntityProperty, mutate: F) -> bool
    where
        F: FnOnce(&mut Entity),
    {
        let mut state = self.lock();
        let Some(entity) = state.entities.get_mut(&id) else {
            return false;
        };
        mutate(entity);
        state.pending.push_back(ModelEvent::PropertyChanged { entity: id, property });
        true
    }

    /// Take all queued notifications
    pub fn drain_events(&self) -> Vec<ModelEvent> {
        self.lock().pending.drain(..).collect()
    }

    /// All commands applied so far, in order
    pub fn applied_commands(&self) -> Vec<Command> {
        self.lock().applied.clone()
    }

    /// Forget the recorded commands
    pub fn clear_applied(&self) {
        self.lock().applied.clear();
    }

    /// Number of live entities
    pub fn len(&self) -> usize {
        self.lock().entities.len()
    }

    /// Whether the model holds no entities
    pub fn is_empty(&self) -> bool {
        self.lock().entities.is_empty()
    }
}

impl Default for InMemoryModel {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityModel for InMemoryModel {
    fn entity(&self, id: EntityId) -> Option<Entity> {
        self.lock().entities.get(&id).cloned()
    }

    fn issue_transaction_id(&self) -> TransactionId {
        let mut state = self.lock();
        state.next_transaction += 1;
        TransactionId(state.next_transaction)
    }

    fn apply(&self, command: Command) {
        let echo = self.echo_transactions.then(|| command.transaction());
        let mut guard = self.lock();
        let state = &mut *guard;
        match &command {
            Command::MoveEntity { entity, to, .. } => {
                if let Some(target) = state.entities.get_mut(entity) {
                    target.position = *to;
                    state.pending.push_back(ModelEvent::Moved {
                        entity: *entity,
                        position: *to,
                        transaction: echo,
                    });
                }
            }
            Command::MoveSubpart { entity, subpart, to, .. } => {
                let index = subpart.0 as usize;
                let moved = state
                    .entities
                    .get_mut(entity)
                    .and_then(|target| target.vertices.get_mut(index))
                    .map(|vertex| *vertex = *to)
                    .is_some();
                if moved {
                    state.pending.push_back(ModelEvent::SubpartMoved {
                        entity: *entity,
                        subpart: *subpart,
                        position: *to,
                        transaction: echo,
                    });
                }
            }
            Command::UpdateCollision { entity, colliding, targets, .. } => {
                if let Some(target) = state.entities.get_mut(entity) {
                    target.colliding = *colliding;
                    target.collision_targets.clone_from(targets);
                    state.pending.push_back(ModelEvent::PropertyChanged {
                        entity: *entity,
                        property: EntityProperty::Collision,
                    });
                }
            }
            Command::ChangeView { .. } | Command::TakeOverView { .. } => {}
        }
        log::trace!("Model applied {:?}", command);
        state.applied.push(command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubpartId;

    #[test]
    fn test_transaction_ids_are_unique() {
        let model = InMemoryModel::new();
        let a = model.issue_transaction_id();
        let b = model.issue_transaction_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_move_command_echoes_transaction() {
        let model = InMemoryModel::new();
        model.insert(Entity::model(1));
        model.drain_events();

        let transaction = model.issue_transaction_id();
        model.apply(Command::MoveEntity {
            entity: EntityId(1),
            from: Vec3::zeros(),
            to: Vec3::new(1.0, 2.0, 3.0),
            transaction,
        });

        assert_eq!(
            model.drain_events(),
            vec![ModelEvent::Moved {
                entity: EntityId(1),
                position: Vec3::new(1.0, 2.0, 3.0),
                transaction: Some(transaction),
            }]
        );
        assert_eq!(model.entity(EntityId(1)).unwrap().position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_replay_model_drops_transaction() {
        let model = InMemoryModel::without_transaction_echo();
        model.insert(Entity::segment(4, vec![Vec3::zeros(), Vec3::x()]));
        model.drain_events();

        let transaction = model.issue_transaction_id();
        model.apply(Command::MoveSubpart {
            entity: EntityId(4),
            subpart: SubpartId(1),
            from: Vec3::x(),
            to: Vec3::new(1.0, 0.5, 0.0),
            transaction,
        });

        match model.drain_events().as_slice() {
            [ModelEvent::SubpartMoved { transaction: None, .. }] => {}
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_child_insert_links_parent() {
        let model = InMemoryModel::new();
        model.insert(Entity::model(1));
        model.insert(Entity::model(2).with_parent(EntityId(1)));
        assert_eq!(model.entity(EntityId(1)).unwrap().children, vec![EntityId(2)]);

        model.remove(EntityId(2));
        assert!(model.entity(EntityId(1)).unwrap().children.is_empty());
    }
}
