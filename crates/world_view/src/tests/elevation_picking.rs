//! Elevation picking scenarios driven through model notifications

use super::Harness;
use crate::foundation::math::Vec3;
use crate::model::{Command, Entity, EntityFlags, EntityId, InMemoryModel, ModelEvent, SubpartId};
use crate::picking::{PickKey, PickPhase, PickRequest};
use crate::render::{Field, FieldValue, SceneBackend};
use crate::settings::{OverflowPolicy, ViewConfig};
use crate::SceneError;

/// Flat terrain whose top face is at `top`
fn terrain(id: u32, top: f32) -> Entity {
    Entity::model(id)
        .with_position(Vec3::new(0.0, top - 1.0, 0.0))
        .with_dimensions(Vec3::new(40.0, 2.0, 40.0))
        .with_flags(EntityFlags::FIXED)
}

fn moves(commands: &[Command]) -> Vec<(EntityId, Vec3, Vec3)> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::MoveEntity { entity, from, to, .. } => Some((*entity, *from, *to)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_drop_onto_block_and_suppress_echo() {
        let harness = Harness::new(ViewConfig::default());
        harness.model.insert(
            Entity::model(9)
                .with_position(Vec3::new(5.0, 1.0, 5.0))
                .with_dimensions(Vec3::new(4.0, 2.0, 4.0))
                .with_flags(EntityFlags::FIXED),
        );
        harness.model.insert(Entity::model(1));
        harness.deliver();
        assert_eq!(harness.view.picking().target_count(), 2);

        let request = PickRequest::new(PickKey::entity(EntityId(1)), Vec3::new(5.0, 0.0, 5.0)).with_origin(Vec3::zeros());
        harness.view.picking().queue_config_request(request);
        assert!(!harness.view.picking().is_target(EntityId(1)));

        harness.frames(2);
        let issued = moves(&harness.model.applied_commands());
        assert_eq!(issued.len(), 1);
        let (entity, from, to) = issued[0];
        assert_eq!(entity, EntityId(1));
        assert_eq!(from, Vec3::zeros());
        assert_relative_eq!(to, Vec3::new(5.0, 2.0, 5.0), epsilon = 1e-4);

        // The echoed move was delivered by the second frame; nothing re-queued
        assert_eq!(harness.view.picking().phase(), PickPhase::Idle);
        assert!(harness.view.picking().is_target(EntityId(1)));
        assert_eq!(harness.view.picking().outstanding_echoes(), 0);
        harness.frames(3);
        assert_eq!(moves(&harness.model.applied_commands()).len(), 1);
    }

    #[test]
    fn test_user_move_lands_on_terrain() {
        let harness = Harness::new(ViewConfig::default());
        harness.model.insert(terrain(9, 3.0));
        harness.model.insert(Entity::model(1));
        harness.deliver();

        harness.model.move_entity(EntityId(1), Vec3::new(4.0, 0.0, -2.0));
        harness.deliver();
        harness.frames(3);

        let issued = moves(&harness.model.applied_commands());
        assert_eq!(issued.len(), 1);
        assert_relative_eq!(issued[0].2, Vec3::new(4.0, 3.0, -2.0), epsilon = 1e-4);
        let content = harness.view.registry().binding(EntityId(1)).unwrap().content;
        assert_eq!(
            harness.backend.field(content, Field::Translation),
            Ok(FieldValue::Vec3(issued[0].2))
        );
    }

    #[test]
    fn test_same_key_coalesces_to_newest() {
        let harness = Harness::new(ViewConfig::default());
        harness.model.insert(terrain(9, 0.0));
        harness.model.insert(Entity::model(1));
        harness.model.insert(Entity::model(2));
        harness.deliver();

        // Entity 1 occupies the sensor; two moves of entity 2 queue behind it
        harness.model.move_entity(EntityId(1), Vec3::new(1.0, 0.0, 1.0));
        harness.model.move_entity(EntityId(2), Vec3::new(2.0, 5.0, 2.0));
        harness.model.move_entity(EntityId(2), Vec3::new(3.0, 5.0, 3.0));
        harness.deliver();
        let queued = harness.view.picking().queued();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].target, Vec3::new(3.0, 5.0, 3.0));

        harness.frames(6);
        let issued: Vec<_> = moves(&harness.model.applied_commands())
            .into_iter()
            .filter(|(entity, _, _)| *entity == EntityId(2))
            .collect();
        assert_eq!(issued.len(), 1);
        assert_relative_eq!(issued[0].2, Vec3::new(3.0, 0.0, 3.0), epsilon = 1e-4);
    }

    #[test]
    fn test_pick_without_surface_abandons_within_watchdog() {
        let ticks = 5;
        let harness = Harness::new(ViewConfig::new().with_watchdog_ticks(ticks));
        harness.model.insert(Entity::model(1));
        harness.deliver();

        harness.model.move_entity(EntityId(1), Vec3::new(100.0, 0.0, 100.0));
        harness.deliver();
        assert!(harness.view.picking().active_request().is_some());

        harness.frames(ticks as usize);
        assert!(harness.view.picking().active_request().is_none());
        assert!(harness.view.picking().is_target(EntityId(1)));
        assert!(matches!(
            harness.reporter.errors().as_slice(),
            [SceneError::PickTimeout { entity: EntityId(1), .. }]
        ));
        assert!(moves(&harness.model.applied_commands()).is_empty());
    }

    #[test]
    fn test_replayed_moves_without_transaction_matched_by_position() {
        let harness = Harness::with_model(ViewConfig::default(), InMemoryModel::without_transaction_echo());
        harness.model.insert(terrain(9, 1.5));
        harness.model.insert(Entity::model(1));
        harness.deliver();

        harness.model.move_entity(EntityId(1), Vec3::new(2.0, 0.0, 2.0));
        harness.deliver();
        harness.frames(4);
        assert_eq!(moves(&harness.model.applied_commands()).len(), 1);
        assert_eq!(harness.view.picking().phase(), PickPhase::Idle);
        assert_eq!(harness.view.picking().outstanding_echoes(), 0);
    }

    #[test]
    fn test_segment_vertex_move_issues_subpart_command() {
        let harness = Harness::new(ViewConfig::default());
        harness.model.insert(terrain(9, 0.75));
        harness
            .model
            .insert(Entity::segment(4, vec![Vec3::zeros(), Vec3::new(3.0, 0.0, 0.0)]));
        harness.deliver();
        harness.frames(2);

        harness.view.handle_model_event(&ModelEvent::SubpartMoved {
            entity: EntityId(4),
            subpart: SubpartId(1),
            position: Vec3::new(3.0, 0.0, 1.0),
            transaction: None,
        });
        harness.frames(3);

        let subpart_moves: Vec<_> = harness
            .model
            .applied_commands()
            .into_iter()
            .filter_map(|command| match command {
                Command::MoveSubpart { entity, subpart, to, .. } => Some((entity, subpart, to)),
                _ => None,
            })
            .collect();
        assert_eq!(subpart_moves.len(), 1);
        assert_eq!(subpart_moves[0].0, EntityId(4));
        assert_eq!(subpart_moves[0].1, SubpartId(1));
        assert_relative_eq!(subpart_moves[0].2, Vec3::new(3.0, 0.75, 1.0), epsilon = 1e-4);
    }

    #[test]
    fn test_bounded_queue_reports_overflow() {
        let harness = Harness::new(ViewConfig::new().with_queue_limit(2, OverflowPolicy::DropOldest));
        for id in 1..=4 {
            harness.model.insert(Entity::model(id));
        }
        harness.deliver();
        for id in 1..=4 {
            harness.model.move_entity(EntityId(id), Vec3::new(id as f32, 0.0, 0.0));
        }
        harness.deliver();

        let queued: Vec<EntityId> = harness.view.picking().queued().iter().map(|r| r.key.entity).collect();
        assert_eq!(queued, vec![EntityId(3), EntityId(4)]);
        assert!(matches!(
            harness.reporter.errors().as_slice(),
            [SceneError::QueueOverflow { entity: EntityId(2), capacity: 2 }]
        ));
    }

    #[test]
    fn test_child_of_offset_parent_lands_on_parent() {
        let harness = Harness::new(ViewConfig::default());
        harness.model.insert(
            Entity::model(8)
                .with_dimensions(Vec3::new(2.0, 10.0, 2.0))
                .with_flags(EntityFlags::FIXED),
        );
        harness.model.insert(
            Entity::model(9)
                .with_position(Vec3::new(10.0, 0.0, 10.0))
                .with_dimensions(Vec3::new(2.0, 1.0, 2.0))
                .with_flags(EntityFlags::FIXED),
        );
        harness.model.insert(Entity::model(3).with_parent(EntityId(9)).with_position(Vec3::new(0.0, 2.0, 0.0)));
        harness.deliver();

        harness.model.move_entity(EntityId(3), Vec3::zeros());
        harness.deliver();
        harness.frames(3);

        let issued = moves(&harness.model.applied_commands());
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].0, EntityId(3));
        assert_relative_eq!(issued[0].2, Vec3::new(0.0, 0.5, 0.0), epsilon = 1e-4);

        let child = harness.view.registry().binding(EntityId(3)).unwrap();
        let bounds = harness.backend.world_bounds(child.shape.unwrap()).unwrap();
        assert_relative_eq!(bounds.center(), Vec3::new(10.0, 0.5, 10.0), epsilon = 1e-4);
    }

    #[test]
    fn test_child_never_lands_on_itself() {
        let harness = Harness::new(ViewConfig::default());
        harness.model.insert(Entity::model(9).with_flags(EntityFlags::FIXED));
        harness.model.insert(Entity::model(3).with_parent(EntityId(9)).with_position(Vec3::new(0.0, 3.0, 0.0)));
        harness.deliver();

        for _ in 0..3 {
            harness.model.move_entity(EntityId(3), Vec3::new(0.0, 3.0, 0.0));
            harness.deliver();
            harness.frames(3);
        }

        let issued = moves(&harness.model.applied_commands());
        assert_eq!(issued.len(), 3);
        for (entity, _, to) in issued {
            assert_eq!(entity, EntityId(3));
            assert_relative_eq!(to, Vec3::new(0.0, 0.5, 0.0), epsilon = 1e-4);
        }
        assert!(harness.view.picking().is_target(EntityId(3)));
    }
}
