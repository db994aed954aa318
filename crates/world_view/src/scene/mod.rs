//! Scene synchronization
//!
//! Keeps the renderer's scene graph in step with the entity model and owns
//! the constructions that need more than one frame.

pub mod geometry;
pub mod registry;
pub mod staging;
pub mod synchronizer;

pub use geometry::{SceneFragment, ShapeSpec};
pub use registry::{SceneNodeBinding, SceneNodeRegistry};
pub use staging::{FrameStagedBuilder, StagedKind, StagedTask, TaskPhase, TickOutcome};
pub use synchronizer::{SceneSynchronizer, SynchronizerParts};
