//! # World View
//!
//! Scene synchronization and asynchronous picking for interactive 3D world
//! views.
//!
//! ## Features
//!
//! - **Scene synchronization**: mirrors an external entity model into a
//!   retained-mode renderer's scene graph
//! - **Frame-staged construction**: geometry whose bounds are only known a
//!   frame after insertion is built in two steps, one per frame
//! - **Elevation picking**: moved entities are dropped onto the highest
//!   surface below them, with echo suppression of the resulting moves
//! - **Collision feedback**: per-entity proxy volumes report overlaps back
//!   to the model and highlight colliding entities
//! - **Navigation arbitration**: master/slave/free viewpoint sharing with
//!   debounced final commits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use world_view::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ViewConfig::load_from_file("view.toml")?;
//!     let backend = Arc::new(HeadlessBackend::new());
//!     let model = Arc::new(InMemoryModel::new());
//!     let view = WorldView::new(config, backend.clone(), model.clone(), Arc::new(LogReporter))?;
//!
//!     model.insert(Entity::model(1).with_position(Vec3::new(5.0, 0.0, 5.0)));
//!     loop {
//!         for event in model.drain_events() {
//!             view.handle_model_event(&event);
//!         }
//!         backend.advance_frame();
//!         view.pump_render_events();
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod effects;
pub mod error;
pub mod events;
pub mod foundation;
pub mod model;
pub mod navigation;
pub mod picking;
pub mod render;
pub mod scene;
pub mod settings;
pub mod view;

#[cfg(test)]
mod tests;

pub use error::{CollectingReporter, ErrorReporter, LogReporter, SceneError};
pub use view::WorldView;

/// Common imports for view users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError},
        error::{CollectingReporter, ErrorReporter, LogReporter, SceneError},
        events::{EventBus, Subscriber, SubscriberError, Tool, UiEvent},
        foundation::{
            math::{Aabb, AxisAngle, Frame, Pose, Vec3},
            time::{Clock, FrameCount, ManualClock, SystemClock},
        },
        model::{Command, Entity, EntityFlags, EntityId, EntityKind, EntityModel, EntityProperty, InMemoryModel, ModelEvent},
        navigation::NavigationArbitrator,
        picking::{CollisionMonitor, PickPhase, PickingCoordinator},
        render::{HeadlessBackend, NodeHandle, RenderEvent, SceneBackend},
        scene::{FrameStagedBuilder, SceneNodeRegistry, SceneSynchronizer},
        settings::{NavigationMode, OverflowPolicy, PickingMode, ViewConfig},
        view::{PumpReport, WorldView},
    };
}
