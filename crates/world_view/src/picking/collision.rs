//! Collision feedback between entity proxies
//!
//! Every tracked entity owns a box proxy and a volume pick sensor whose
//! targets are all other proxies. Intersection reports are buffered per
//! entity and evaluated once per settled frame: a frame where no proxy moved
//! and no staged construction is in progress. Commands go to the model only
//! when an entity's collision state actually changes.

use crate::effects::Effects;
use crate::error::ErrorReporter;
use crate::model::{Command, EntityId, EntityModel};
use crate::render::{Field, FieldValue, NodeHandle, PickHit, RenderEvent, SceneBackend, SensorHandle, UpdateScope};
use crate::settings::FeedbackConfig;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A proxy handed to the monitor by the staged builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyRegistration {
    /// Owning entity
    pub entity: EntityId,
    /// Proxy volume node
    pub proxy: NodeHandle,
    /// Volume sensor testing the proxy
    pub sensor: SensorHandle,
    /// Material whose emissive color shows collisions
    pub material: Option<NodeHandle>,
    /// Whether collisions are highlighted
    pub feedback: bool,
}

#[derive(Debug)]
struct TrackedProxy {
    registration: ProxyRegistration,
    colliding: bool,
    targets: Vec<EntityId>,
    latest: Option<Vec<EntityId>>,
}

#[derive(Debug, Default)]
struct CollisionState {
    tracked: BTreeMap<EntityId, TrackedProxy>,
    obstacles: BTreeMap<EntityId, NodeHandle>,
    settle_frames: u32,
}

impl CollisionState {
    fn owner_of(&self, node: NodeHandle) -> Option<EntityId> {
        self.tracked
            .iter()
            .find(|(_, tracked)| tracked.registration.proxy == node)
            .map(|(entity, _)| *entity)
            .or_else(|| {
                self.obstacles
                    .iter()
                    .find(|(_, proxy)| **proxy == node)
                    .map(|(entity, _)| *entity)
            })
    }

    fn tracked_by_sensor(&mut self, sensor: SensorHandle) -> Option<(&EntityId, &mut TrackedProxy)> {
        self.tracked
            .iter_mut()
            .find(|(_, tracked)| tracked.registration.sensor == sensor)
    }

    fn unsettle(&mut self) {
        self.settle_frames = 1;
        for tracked in self.tracked.values_mut() {
            tracked.latest = None;
        }
    }
}

/// Per-entity collision state tracker
pub struct CollisionMonitor {
    backend: Arc<dyn SceneBackend>,
    model: Arc<dyn EntityModel>,
    reporter: Arc<dyn ErrorReporter>,
    feedback: FeedbackConfig,
    state: Mutex<CollisionState>,
}

impl CollisionMonitor {
    /// Create a monitor tracking nothing
    pub fn new(
        backend: Arc<dyn SceneBackend>,
        model: Arc<dyn EntityModel>,
        reporter: Arc<dyn ErrorReporter>,
        feedback: FeedbackConfig,
    ) -> Self {
        Self {
            backend,
            model,
            reporter,
            feedback,
            state: Mutex::new(CollisionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CollisionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, effects: Effects) {
        effects.flush(self.model.as_ref(), self.reporter.as_ref());
    }

    /// Start tracking an entity's proxy
    ///
    /// Its sensor gets a target list on the next [`Self::rebuild_target_lists`].
    pub fn register(&self, registration: ProxyRegistration) {
        log::debug!("Tracking collisions of {} via {}", registration.entity, registration.sensor);
        self.lock().tracked.insert(
            registration.entity,
            TrackedProxy {
                registration,
                colliding: false,
                targets: Vec::new(),
                latest: None,
            },
        );
    }

    /// Add a proxy other entities collide with but which has no state itself
    pub fn register_obstacle(&self, entity: EntityId, proxy: NodeHandle) {
        self.lock().obstacles.insert(entity, proxy);
    }

    /// Stop tracking an entity
    ///
    /// The remaining sensors are retargeted so that nobody keeps testing
    /// against the removed proxy. Returns `false` if the entity was unknown.
    pub fn unregister(&self, entity: EntityId) -> bool {
        let removed = {
            let mut state = self.lock();
            let tracked = state.tracked.remove(&entity).is_some();
            let obstacle = state.obstacles.remove(&entity).is_some();
            tracked || obstacle
        };
        if removed {
            self.rebuild_target_lists();
        }
        removed
    }

    /// Forget everything
    pub fn clear(&self) {
        let mut state = self.lock();
        state.tracked.clear();
        state.obstacles.clear();
        state.settle_frames = 0;
    }

    /// Point every sensor at all proxies except its own
    pub fn rebuild_target_lists(&self) {
        let mut effects = Effects::new();
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            let proxies: Vec<(EntityId, NodeHandle)> = state
                .tracked
                .iter()
                .map(|(entity, tracked)| (*entity, tracked.registration.proxy))
                .chain(state.obstacles.iter().map(|(entity, proxy)| (*entity, *proxy)))
                .collect();

            for (entity, tracked) in &state.tracked {
                let targets: Vec<NodeHandle> = proxies
                    .iter()
                    .filter(|(other, _)| other != entity)
                    .map(|(_, proxy)| *proxy)
                    .collect();
                if let Err(e) = self.backend.set_sensor_targets(tracked.registration.sensor, &targets) {
                    effects.error(e);
                }
            }
            log::debug!("Rebuilt collision targets for {} sensors", state.tracked.len());
            state.unsettle();
        }
        self.flush(effects);
    }

    /// A proxy moved or changed size; skip the next frame's reports
    pub fn mark_unsettled(&self) {
        self.lock().unsettle();
    }

    /// Route a renderer event addressed to a collision sensor
    ///
    /// Returns `true` if the event belonged to one of the tracked sensors.
    pub fn handle_render_event(&self, event: &RenderEvent) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        match event {
            RenderEvent::FrameTick => false,
            RenderEvent::GeometryApplied(sensor) | RenderEvent::TargetsApplied(sensor) => {
                state.tracked_by_sensor(*sensor).is_some()
            }
            RenderEvent::Intersection { sensor, hits } => {
                let colliders = colliding_entities(state, hits);
                match state.tracked_by_sensor(*sensor) {
                    Some((entity, tracked)) => {
                        let own = *entity;
                        tracked.latest = Some(colliders.into_iter().filter(|other| *other != own).collect());
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Evaluate buffered reports
    ///
    /// Nothing is evaluated while `construction_pending` is set or while the
    /// scene is settling after a proxy change.
    pub fn on_frame(&self, construction_pending: bool) {
        let mut effects = Effects::new();
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            if state.settle_frames > 0 {
                state.settle_frames -= 1;
                return;
            }
            if construction_pending {
                return;
            }

            let _scope = UpdateScope::new(self.backend.as_ref());
            for (entity, tracked) in &mut state.tracked {
                let Some(targets) = tracked.latest.take() else { continue };
                let colliding = !targets.is_empty();
                if colliding == tracked.colliding && targets == tracked.targets {
                    continue;
                }
                log::debug!("{} collision state: {} {:?}", entity, colliding, targets);
                tracked.colliding = colliding;
                tracked.targets.clone_from(&targets);

                if tracked.registration.feedback {
                    if let Some(material) = tracked.registration.material {
                        let color = if colliding {
                            self.feedback.collision_color
                        } else {
                            self.feedback.normal_color
                        };
                        if let Err(e) = self.backend.set_field(material, Field::EmissiveColor, FieldValue::Vec3(color)) {
                            effects.error(e);
                        }
                    }
                }

                effects.command(Command::UpdateCollision {
                    entity: *entity,
                    colliding,
                    targets,
                    transaction: self.model.issue_transaction_id(),
                });
            }
        }
        self.flush(effects);
    }

    /// Current collision state of a tracked entity
    pub fn state_of(&self, entity: EntityId) -> Option<(bool, Vec<EntityId>)> {
        self.lock()
            .tracked
            .get(&entity)
            .map(|tracked| (tracked.colliding, tracked.targets.clone()))
    }

    /// Number of tracked entities
    pub fn tracked_count(&self) -> usize {
        self.lock().tracked.len()
    }
}

fn colliding_entities(state: &CollisionState, hits: &[PickHit]) -> Vec<EntityId> {
    let mut entities: Vec<EntityId> = hits.iter().filter_map(|hit| state.owner_of(hit.node)).collect();
    entities.sort_unstable();
    entities.dedup();
    entities
}
