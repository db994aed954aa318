//! Frame-staged geometry builder
//!
//! Some derived geometry depends on spatial queries that the renderer can
//! only answer one frame after the queried node was inserted. The builder
//! therefore runs each construction as two steps on consecutive frame
//! ticks:
//!
//! 1. [`TaskPhase::PendingInsertion`]: insert (or update) the content the
//!    query depends on.
//! 2. [`TaskPhase::Commit`]: query the now settled bounds, create the
//!    bounding proxy or pick sensor, record it in the registry and pop the
//!    task.
//!
//! Exactly one step runs per tick. When the queue drains after a commit,
//! every collision sensor's target list is rebuilt once.

use super::geometry::SceneFragment;
use super::registry::SceneNodeRegistry;
use crate::error::{ErrorReporter, SceneError};
use crate::foundation::math::{AxisAngle, Vec3};
use crate::model::{EntityFlags, EntityId};
use crate::picking::collision::{CollisionMonitor, ProxyRegistration};
use crate::render::{BackendError, Field, FieldValue, NodeHandle, NodeKind, PickGeometry, SceneBackend, UpdateScope};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Smallest edge of a path bounding proxy; flat paths still get a volume
const MIN_PROXY_EDGE: f32 = 0.05;

/// What a staged task builds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedKind {
    /// Composite path of a segmented entity plus its bounding proxy
    PathGeometry,
    /// New vertices for an existing path, or a moved ancestor; the
    /// bounding proxy is rebuilt
    PathUpdate,
    /// Collision proxy and volume sensor of a regular entity
    CollisionProxy,
}

/// Step a staged task runs next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    /// Content still has to be inserted
    PendingInsertion,
    /// Content was inserted on an earlier tick and can be queried
    Commit {
        /// Node whose settled bounds the commit step reads
        inserted: NodeHandle,
    },
}

/// One queued construction
#[derive(Debug, Clone, PartialEq)]
pub struct StagedTask {
    /// Entity being built
    pub entity: EntityId,
    /// What is built
    pub kind: StagedKind,
    /// Snapshot the construction derives from
    pub fragment: SceneFragment,
    /// Next step
    pub phase: TaskPhase,
}

/// Result of one builder tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing queued
    Idle,
    /// The head task inserted its content
    Inserted(EntityId),
    /// The head task committed; more tasks wait
    Committed(EntityId),
    /// The head task committed and the queue drained
    Drained(EntityId),
    /// The head task failed and was dropped
    Failed(EntityId),
}

#[derive(Debug, Default)]
struct BuilderState {
    queue: VecDeque<StagedTask>,
}

/// FIFO of two-step constructions driven by frame ticks
pub struct FrameStagedBuilder {
    backend: Arc<dyn SceneBackend>,
    registry: Arc<SceneNodeRegistry>,
    collision: Arc<CollisionMonitor>,
    reporter: Arc<dyn ErrorReporter>,
    state: Mutex<BuilderState>,
}

impl FrameStagedBuilder {
    /// Create an empty builder
    pub fn new(
        backend: Arc<dyn SceneBackend>,
        registry: Arc<SceneNodeRegistry>,
        collision: Arc<CollisionMonitor>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            backend,
            registry,
            collision,
            reporter,
            state: Mutex::new(BuilderState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BuilderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a construction
    ///
    /// A queued [`StagedKind::PathUpdate`] for the same entity that has not
    /// started yet is superseded.
    pub fn enqueue(&self, entity: EntityId, kind: StagedKind, fragment: SceneFragment) {
        let mut state = self.lock();
        if kind == StagedKind::PathUpdate {
            state.queue.retain(|task| {
                !(task.entity == entity && task.kind == kind && task.phase == TaskPhase::PendingInsertion)
            });
        }
        state.queue.push_back(StagedTask {
            entity,
            kind,
            fragment,
            phase: TaskPhase::PendingInsertion,
        });
    }

    /// Drop every task of a removed entity
    pub fn cancel(&self, entity: EntityId) -> usize {
        let mut state = self.lock();
        let before = state.queue.len();
        state.queue.retain(|task| task.entity != entity);
        before - state.queue.len()
    }

    /// Drop every task
    pub fn clear(&self) {
        self.lock().queue.clear();
    }

    /// Whether constructions are waiting
    pub fn is_busy(&self) -> bool {
        !self.lock().queue.is_empty()
    }

    /// Number of queued tasks
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Run one construction step
    pub fn tick(&self) -> TickOutcome {
        let Some(task) = self.lock().queue.front().cloned() else {
            return TickOutcome::Idle;
        };
        let entity = task.entity;

        let Some(binding) = self.registry.binding(entity) else {
            // Removed between enqueue and now
            self.pop(entity);
            return TickOutcome::Failed(entity);
        };

        let step = {
            let _scope = UpdateScope::new(self.backend.as_ref());
            match task.phase {
                TaskPhase::PendingInsertion => self.insert(&task, binding.content, binding.shape, binding.proxy),
                TaskPhase::Commit { inserted } => self.commit(&task, inserted, binding.material).map(|()| inserted),
            }
        };

        match (task.phase, step) {
            (TaskPhase::PendingInsertion, Ok(inserted)) => {
                if let Some(head) = self.lock().queue.front_mut().filter(|head| head.entity == entity) {
                    head.phase = TaskPhase::Commit { inserted };
                }
                TickOutcome::Inserted(entity)
            }
            (TaskPhase::Commit { .. }, Ok(_)) => {
                if self.pop(entity) {
                    self.collision.rebuild_target_lists();
                    TickOutcome::Drained(entity)
                } else {
                    TickOutcome::Committed(entity)
                }
            }
            (_, Err(e)) => {
                self.reporter.report(&SceneError::Construction {
                    entity,
                    reason: e.to_string(),
                });
                self.pop(entity);
                TickOutcome::Failed(entity)
            }
        }
    }

    /// Pop the head task if it belongs to `entity`; returns whether the
    /// queue is now empty
    fn pop(&self, entity: EntityId) -> bool {
        let mut state = self.lock();
        if state.queue.front().is_some_and(|head| head.entity == entity) {
            state.queue.pop_front();
        }
        state.queue.is_empty()
    }

    fn insert(
        &self,
        task: &StagedTask,
        content: NodeHandle,
        shape: Option<NodeHandle>,
        proxy: Option<NodeHandle>,
    ) -> Result<NodeHandle, BackendError> {
        match task.kind {
            StagedKind::PathGeometry => {
                let path = self.backend.create_node(task.fragment.shape_node(), Some(content))?;
                self.registry.update(task.entity, |binding| binding.shape = Some(path));
                Ok(path)
            }
            StagedKind::PathUpdate => {
                let points = task.fragment.points().unwrap_or_default().to_vec();
                let path = match shape {
                    Some(path) => {
                        self.backend.set_field(path, Field::Points, FieldValue::Points(points))?;
                        path
                    }
                    None => {
                        let path = self.backend.create_node(task.fragment.shape_node(), Some(content))?;
                        self.registry.update(task.entity, |binding| binding.shape = Some(path));
                        path
                    }
                };
                if let Some(old) = proxy {
                    self.collision.unregister(task.entity);
                    self.backend.remove_node(old)?;
                    self.registry.update(task.entity, |binding| binding.proxy = None);
                }
                Ok(path)
            }
            StagedKind::CollisionProxy => {
                let proxy = self.backend.create_node(task.fragment.proxy_node(), Some(content))?;
                self.registry.update(task.entity, |binding| binding.proxy = Some(proxy));
                Ok(proxy)
            }
        }
    }

    fn commit(&self, task: &StagedTask, inserted: NodeHandle, material: Option<NodeHandle>) -> Result<(), BackendError> {
        let bounds = self.backend.world_bounds(inserted)?;
        match task.kind {
            StagedKind::PathGeometry | StagedKind::PathUpdate => {
                // Bounds are world space, so the proxy hangs off the root
                let anchor = self.backend.create_node(
                    NodeKind::Transform {
                        translation: bounds.center(),
                        rotation: AxisAngle::identity(),
                        scale: Vec3::new(1.0, 1.0, 1.0),
                    },
                    self.registry.root(),
                )?;
                let size = (bounds.extents() * 2.0).map(|edge| edge.max(MIN_PROXY_EDGE));
                if let Err(e) = self.backend.create_node(NodeKind::Proxy { size }, Some(anchor)) {
                    self.backend.remove_node(anchor)?;
                    return Err(e);
                }
                self.registry.update(task.entity, |binding| binding.proxy = Some(anchor));
                self.collision.register_obstacle(task.entity, anchor);
                log::debug!("Built path bounds for {}: {:?}", task.entity, bounds);
            }
            StagedKind::CollisionProxy => {
                let sensor = self.backend.create_sensor(PickGeometry::Volume(inserted))?;
                self.backend.set_sensor_enabled(sensor, true)?;
                self.registry.update(task.entity, |binding| binding.sensor = Some(sensor));
                self.collision.register(ProxyRegistration {
                    entity: task.entity,
                    proxy: inserted,
                    sensor,
                    material,
                    feedback: !task.fragment.flags.contains(EntityFlags::SUPPRESS_COLLISION_FEEDBACK),
                });
                log::debug!("Built collision proxy for {}", task.entity);
            }
        }
        Ok(())
    }
}
