//! Navigation arbitration scenarios through the view

use super::Harness;
use crate::foundation::math::{Pose, Vec3};
use crate::model::Command;
use crate::settings::{NavigationMode, ViewConfig};
use std::time::Duration;

fn view_changes(commands: &[Command]) -> Vec<(bool, Pose)> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::ChangeView { transient, pose, .. } => Some((*transient, *pose)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rapid_updates_commit_once_after_idle() {
        let harness = Harness::new(ViewConfig::default());
        harness.view.set_navigation_mode(NavigationMode::Master);
        assert!(matches!(harness.model.applied_commands().as_slice(), [Command::TakeOverView { .. }]));

        for step in 1..=3u8 {
            harness.view.on_viewpoint_changed(Pose::at(Vec3::new(f32::from(step), 0.0, 0.0)));
            harness.clock.advance(Duration::from_millis(30));
            assert!(!harness.view.navigation().poll());
        }
        let changes = view_changes(&harness.model.applied_commands());
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|(transient, _)| *transient));

        let transactions: Vec<_> = harness.model.applied_commands()[1..].iter().map(Command::transaction).collect();
        assert!(transactions.windows(2).all(|pair| pair[0] == pair[1]));

        harness.clock.advance(Duration::from_millis(250));
        assert!(harness.view.navigation().poll());
        assert!(!harness.view.navigation().poll());

        let changes = view_changes(&harness.model.applied_commands());
        let finals: Vec<_> = changes.iter().filter(|(transient, _)| !transient).collect();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].1.position, Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(harness.view.navigation().state().last_committed.map(|p| p.position), Some(Vec3::new(3.0, 0.0, 0.0)));
    }

    #[test]
    fn test_new_gesture_gets_new_transaction() {
        let harness = Harness::new(ViewConfig::new().with_navigation_mode(NavigationMode::Master));
        harness.view.on_viewpoint_changed(Pose::at(Vec3::zeros()));
        harness.clock.advance(Duration::from_millis(300));
        assert!(harness.view.navigation().poll());
        harness.view.on_viewpoint_changed(Pose::at(Vec3::new(1.0, 0.0, 0.0)));

        let transactions: Vec<_> = harness.model.applied_commands().iter().map(Command::transaction).collect();
        assert_eq!(transactions.len(), 3);
        assert_eq!(transactions[0], transactions[1]);
        assert_ne!(transactions[1], transactions[2]);
    }

    #[test]
    fn test_free_view_publishes_nothing() {
        let harness = Harness::new(ViewConfig::default());
        harness.view.on_viewpoint_changed(Pose::at(Vec3::new(2.0, 0.0, 0.0)));
        harness.clock.advance(Duration::from_secs(1));
        assert!(!harness.view.navigation().poll());
        harness.view.on_remote_pose(Pose::at(Vec3::new(9.0, 9.0, 9.0)));
        assert!(harness.model.applied_commands().is_empty());
        assert_eq!(harness.backend.viewpoint(), Pose::default());
    }

    #[test]
    fn test_slave_applies_master_poses() {
        let harness = Harness::new(ViewConfig::new().with_navigation_mode(NavigationMode::Slave));
        let pose = Pose::at(Vec3::new(1.0, 2.0, 3.0));
        harness.view.on_remote_pose(pose);
        assert_eq!(harness.backend.viewpoint(), pose);
        assert!(harness.model.applied_commands().is_empty());
    }
}
