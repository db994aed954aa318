//! Elevation picking coordinator
//!
//! Places moved entities on the highest surface below them. The renderer
//! answers pick queries asynchronously, so a request walks through a small
//! state machine driven by renderer events:
//!
//! ```text
//! Idle ─queue─▶ ConfiguringGeometry ─▶ GeometryPending ─geometry ok─▶ TargetsPending
//!   ▲                                        │ (targets ok first)          │ targets ok
//!   │                                        └───────────────▶ Resolvable ◀┘
//!   └──────────── intersection resolved / watchdog expired ───────┘
//! ```
//!
//! Only one request is active at a time. Requests arriving meanwhile wait in
//! a [`PendingPickQueue`] where a newer request for the same entity (or
//! vertex) replaces the older one. The active request is never preempted;
//! only its watchdog can cancel it.

use super::echo::{CompletedPickRecord, EchoFilter};
use super::request::{Enqueued, PendingPickQueue, PickKey, PickRequest};
use crate::effects::Effects;
use crate::error::{ErrorReporter, SceneError};
use crate::foundation::math::{positions_match, Frame, Vec3, UP};
use crate::foundation::time::FrameCount;
use crate::model::{Command, EntityId, EntityModel, SubpartId, TransactionId};
use crate::render::{BackendError, NodeHandle, PickGeometry, PickHit, RenderEvent, SceneBackend, SensorHandle};
use crate::settings::PickingConfig;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Phase of the elevation pick state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickPhase {
    /// No active request; sensor disabled
    Idle,
    /// The sensor is being reconfigured for a new request
    ConfiguringGeometry,
    /// Waiting for the renderer to confirm the new pick geometry
    GeometryPending,
    /// Geometry confirmed, waiting for the target list
    TargetsPending,
    /// Both confirmed; the next intersection resolves the request
    Resolvable,
}

#[derive(Debug)]
struct ActivePick {
    request: PickRequest,
    geometry_ready: bool,
    targets_ready: bool,
    ticks_left: u32,
    /// Pool entry withdrawn for self-exclusion
    excluded: Option<NodeHandle>,
    /// The entity was removed while its pick was in flight
    orphaned: bool,
}

#[derive(Debug)]
struct CoordinatorState {
    sensor: Option<SensorHandle>,
    phase: PickPhase,
    active: Option<ActivePick>,
    queue: PendingPickQueue,
    pool: BTreeMap<EntityId, NodeHandle>,
    echoes: EchoFilter,
    frame: FrameCount,
}

/// Asynchronous elevation pick coordinator
pub struct PickingCoordinator {
    backend: Arc<dyn SceneBackend>,
    model: Arc<dyn EntityModel>,
    reporter: Arc<dyn ErrorReporter>,
    config: PickingConfig,
    state: Mutex<CoordinatorState>,
}

impl PickingCoordinator {
    /// Create an idle coordinator
    ///
    /// The pick sensor is created lazily by the first request.
    pub fn new(
        backend: Arc<dyn SceneBackend>,
        model: Arc<dyn EntityModel>,
        reporter: Arc<dyn ErrorReporter>,
        config: PickingConfig,
    ) -> Self {
        let state = CoordinatorState {
            sensor: None,
            phase: PickPhase::Idle,
            active: None,
            queue: PendingPickQueue::new(config.queue_capacity, config.overflow_policy),
            pool: BTreeMap::new(),
            echoes: EchoFilter::new(config.echo_ttl_frames, config.position_epsilon),
            frame: FrameCount::default(),
        };
        Self {
            backend,
            model,
            reporter,
            config,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, effects: Effects) {
        effects.flush(self.model.as_ref(), self.reporter.as_ref());
    }

    // ------------------------------------------------------------------
    // Target pool
    // ------------------------------------------------------------------

    /// Make an entity's own shape node a surface other entities can land on
    pub fn add_target(&self, entity: EntityId, node: NodeHandle) {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.active.as_mut() {
            Some(active) if active.request.key.entity == entity => active.excluded = Some(node),
            _ => {
                state.pool.insert(entity, node);
            }
        }
    }

    /// Forget everything about a removed entity
    ///
    /// Its pool entry, queued requests and echo records are dropped. If its
    /// pick is active, the pick runs to completion but issues no command.
    pub fn forget_entity(&self, entity: EntityId) {
        let mut state = self.lock();
        state.pool.remove(&entity);
        let dropped = state.queue.remove_entity(entity);
        state.echoes.forget_entity(entity);
        if let Some(active) = state.active.as_mut().filter(|a| a.request.key.entity == entity) {
            active.excluded = None;
            active.orphaned = true;
        }
        if dropped > 0 {
            log::debug!("Dropped {} queued picks for removed {}", dropped, entity);
        }
    }

    /// Drop all state: pool, queue, active request and echo records
    pub fn reset(&self) {
        let mut effects = Effects::new();
        {
            let mut state = self.lock();
            state.pool.clear();
            state.queue.clear();
            state.echoes.clear();
            state.active = None;
            state.phase = PickPhase::Idle;
            if let Some(sensor) = state.sensor {
                if let Err(e) = self.backend.set_sensor_enabled(sensor, false) {
                    effects.error(e);
                }
            }
        }
        self.flush(effects);
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Queue a pick request
    ///
    /// When idle the request is configured immediately. Otherwise it waits,
    /// replacing any queued request with the same key.
    pub fn queue_config_request(&self, request: PickRequest) {
        let mut effects = Effects::new();
        {
            let mut state = self.lock();
            self.enqueue(&mut state, request, &mut effects);
        }
        self.flush(effects);
    }

    /// React to an entity move reported by the model
    ///
    /// Returns `true` if a pick was queued, `false` if the move was the echo
    /// of a move this coordinator issued.
    pub fn on_entity_moved(&self, entity: EntityId, position: Vec3, transaction: Option<TransactionId>) -> bool {
        self.on_position_changed(PickKey::entity(entity), position, Frame::identity(), transaction)
    }

    /// React to a vertex move of a segmented entity
    pub fn on_subpart_moved(
        &self,
        entity: EntityId,
        subpart: SubpartId,
        position: Vec3,
        transaction: Option<TransactionId>,
    ) -> bool {
        self.on_position_changed(PickKey::subpart(entity, subpart), position, Frame::identity(), transaction)
    }

    /// React to a move whose position is relative to `frame`
    ///
    /// Entities nested under a parent report parent-relative positions;
    /// `frame` maps them to world space for the ray cast, and the resolved
    /// position is mapped back before the move command is issued.
    pub fn on_position_changed(
        &self,
        key: PickKey,
        position: Vec3,
        frame: Frame,
        transaction: Option<TransactionId>,
    ) -> bool {
        let mut effects = Effects::new();
        let queued = {
            let mut state = self.lock();
            if state.echoes.take_match(key, &position, transaction) {
                log::debug!("Suppressed echo of pick move for {}", key);
                false
            } else {
                self.enqueue(&mut state, PickRequest::new(key, position).with_frame(frame), &mut effects);
                true
            }
        };
        self.flush(effects);
        queued
    }

    fn enqueue(&self, state: &mut CoordinatorState, request: PickRequest, effects: &mut Effects) {
        let key = request.key;
        match state.queue.push(request) {
            Enqueued::Appended | Enqueued::Replaced => {}
            Enqueued::DroppedOldest(dropped) => effects.error(SceneError::QueueOverflow {
                entity: dropped.key.entity,
                capacity: self.config.queue_capacity,
            }),
            Enqueued::Rejected => effects.error(SceneError::QueueOverflow {
                entity: key.entity,
                capacity: self.config.queue_capacity,
            }),
        }
        if state.active.is_none() {
            self.start_next(state, effects);
        }
    }

    /// Configure the next queued request, or go idle
    fn start_next(&self, state: &mut CoordinatorState, effects: &mut Effects) {
        while let Some(request) = state.queue.pop() {
            match self.configure(state, request) {
                Ok(()) => return,
                Err(e) => effects.error(e),
            }
        }
        state.phase = PickPhase::Idle;
        if let Some(sensor) = state.sensor {
            if let Err(e) = self.backend.set_sensor_enabled(sensor, false) {
                effects.error(e);
            }
        }
    }

    fn configure(&self, state: &mut CoordinatorState, request: PickRequest) -> Result<(), BackendError> {
        state.phase = PickPhase::ConfiguringGeometry;
        let mut origin = request.world_target();
        origin[UP] += self.config.ray_height;
        let geometry = PickGeometry::Ray {
            origin,
            direction: -Vec3::y(),
            length: self.config.ray_length,
        };

        let sensor = match state.sensor {
            Some(sensor) => {
                self.backend.set_sensor_geometry(sensor, geometry)?;
                sensor
            }
            None => {
                let sensor = self.backend.create_sensor(geometry)?;
                state.sensor = Some(sensor);
                sensor
            }
        };

        let excluded = state.pool.remove(&request.key.entity);
        let targets: Vec<NodeHandle> = state.pool.values().copied().collect();
        let armed = self
            .backend
            .set_sensor_targets(sensor, &targets)
            .and_then(|()| self.backend.set_sensor_enabled(sensor, true));
        if let Err(e) = armed {
            if let Some(node) = excluded {
                state.pool.insert(request.key.entity, node);
            }
            state.phase = PickPhase::Idle;
            return Err(e);
        }

        log::trace!("Configured pick for {} at {:?}", request.key, request.target);
        state.active = Some(ActivePick {
            request,
            geometry_ready: false,
            targets_ready: false,
            ticks_left: self.config.watchdog_ticks,
            excluded,
            orphaned: false,
        });
        state.phase = PickPhase::GeometryPending;
        Ok(())
    }

    /// Finish the active request and move on to the next one
    fn complete_active(&self, state: &mut CoordinatorState, effects: &mut Effects) {
        if let Some(active) = state.active.take() {
            if let Some(node) = active.excluded {
                state.pool.insert(active.request.key.entity, node);
            }
        }
        self.start_next(state, effects);
    }

    // ------------------------------------------------------------------
    // Renderer events
    // ------------------------------------------------------------------

    /// Route a renderer event addressed to the pick sensor
    ///
    /// Returns `true` if the event belonged to this coordinator.
    /// [`RenderEvent::FrameTick`] is not consumed; call [`Self::on_frame`].
    pub fn handle_render_event(&self, event: &RenderEvent) -> bool {
        match event {
            RenderEvent::FrameTick => false,
            RenderEvent::GeometryApplied(sensor) => self.on_geometry_ready(*sensor),
            RenderEvent::TargetsApplied(sensor) => self.on_targets_ready(*sensor),
            RenderEvent::Intersection { sensor, hits } => self.on_intersection(*sensor, hits),
        }
    }

    /// The renderer applied the pick geometry
    pub fn on_geometry_ready(&self, sensor: SensorHandle) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.sensor != Some(sensor) {
            return false;
        }
        let phase = state.phase;
        if let Some(active) = state.active.as_mut() {
            active.geometry_ready = true;
            if matches!(phase, PickPhase::GeometryPending) {
                state.phase = if active.targets_ready {
                    PickPhase::Resolvable
                } else {
                    PickPhase::TargetsPending
                };
            }
        }
        true
    }

    /// The renderer applied the pick target list
    pub fn on_targets_ready(&self, sensor: SensorHandle) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.sensor != Some(sensor) {
            return false;
        }
        let phase = state.phase;
        if let Some(active) = state.active.as_mut() {
            active.targets_ready = true;
            if matches!(phase, PickPhase::TargetsPending) && active.geometry_ready {
                state.phase = PickPhase::Resolvable;
            }
        }
        true
    }

    /// The pick sensor reported intersections
    pub fn on_intersection(&self, sensor: SensorHandle, hits: &[PickHit]) -> bool {
        let mut effects = Effects::new();
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            if state.sensor != Some(sensor) {
                return false;
            }
            if state.phase != PickPhase::Resolvable {
                log::trace!("Discarded stale intersection in phase {:?}", state.phase);
                return true;
            }
            let Some(elevation) = hits.iter().map(|hit| hit.point[UP]).reduce(f32::max) else {
                return true;
            };
            if let Some(active) = state.active.as_ref() {
                let request = &active.request;
                let mut landing = request.world_target();
                landing[UP] = elevation;
                match request.frame.to_local(landing) {
                    _ if active.orphaned => {
                        log::debug!("Resolved pick for removed {}, no move issued", request.key);
                    }
                    None => log::warn!("Pick for {} landed in a collapsed parent space", request.key),
                    Some(resolved) if positions_match(&resolved, &request.origin, self.config.position_epsilon) => {
                        log::trace!("Pick for {} already at elevation {}", request.key, elevation);
                    }
                    Some(resolved) => {
                        let transaction = self.model.issue_transaction_id();
                        effects.command(move_command(request, resolved, transaction));
                        let recorded = state.frame;
                        state.echoes.record(CompletedPickRecord {
                            key: request.key,
                            position: resolved,
                            transaction,
                            recorded,
                        });
                    }
                }
            }
            self.complete_active(state, &mut effects);
        }
        self.flush(effects);
        true
    }

    /// Advance the watchdog and expire old echo records
    pub fn on_frame(&self) {
        let mut effects = Effects::new();
        {
            let mut state = self.lock();
            state.frame = state.frame.next();
            let now = state.frame;
            state.echoes.expire(now);

            let expired = match state.active.as_mut() {
                Some(active) => {
                    active.ticks_left = active.ticks_left.saturating_sub(1);
                    (active.ticks_left == 0).then_some(active.request.key)
                }
                None => None,
            };
            if let Some(key) = expired {
                effects.error(SceneError::PickTimeout {
                    entity: key.entity,
                    subpart: key.subpart,
                    ticks: self.config.watchdog_ticks,
                });
                self.complete_active(&mut state, &mut effects);
            }
        }
        self.flush(effects);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Current phase
    pub fn phase(&self) -> PickPhase {
        self.lock().phase
    }

    /// The request being resolved
    pub fn active_request(&self) -> Option<PickRequest> {
        self.lock().active.as_ref().map(|active| active.request.clone())
    }

    /// Waiting requests, oldest first
    pub fn queued(&self) -> Vec<PickRequest> {
        self.lock().queue.iter().cloned().collect()
    }

    /// Whether an entity is currently in the target pool
    pub fn is_target(&self, entity: EntityId) -> bool {
        self.lock().pool.contains_key(&entity)
    }

    /// Number of entities in the target pool
    pub fn target_count(&self) -> usize {
        self.lock().pool.len()
    }

    /// The pick sensor, once created
    pub fn sensor(&self) -> Option<SensorHandle> {
        self.lock().sensor
    }

    /// Number of completed picks whose echo has not arrived yet
    pub fn outstanding_echoes(&self) -> usize {
        self.lock().echoes.len()
    }
}

fn move_command(request: &PickRequest, to: Vec3, transaction: TransactionId) -> Command {
    match request.key.subpart {
        Some(subpart) => Command::MoveSubpart {
            entity: request.key.entity,
            subpart,
            from: request.origin,
            to,
            transaction,
        },
        None => Command::MoveEntity {
            entity: request.key.entity,
            from: request.origin,
            to,
            transaction,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingReporter;
    use crate::foundation::math::AxisAngle;
    use crate::model::{Entity, InMemoryModel, ModelEvent};
    use crate::render::{HeadlessBackend, NodeKind};
    use approx::assert_relative_eq;

    struct Fixture {
        backend: Arc<HeadlessBackend>,
        model: Arc<InMemoryModel>,
        reporter: Arc<CollectingReporter>,
        picking: PickingCoordinator,
    }

    impl Fixture {
        fn new(config: PickingConfig) -> Self {
            let backend = Arc::new(HeadlessBackend::new());
            let model = Arc::new(InMemoryModel::new());
            let reporter = Arc::new(CollectingReporter::new());
            let picking = PickingCoordinator::new(backend.clone(), model.clone(), reporter.clone(), config);
            Self { backend, model, reporter, picking }
        }

        /// Box of `size` centered at `center`, returned as its transform node
        fn surface(&self, center: Vec3, size: Vec3) -> NodeHandle {
            let node = self.backend.create_transform(center, None).unwrap();
            self.backend.create_node(NodeKind::Box { size }, Some(node)).unwrap();
            node
        }

        fn frame(&self) {
            self.backend.advance_frame();
            for event in self.backend.drain_events() {
                if event == RenderEvent::FrameTick {
                    self.picking.on_frame();
                } else {
                    self.picking.handle_render_event(&event);
                }
            }
        }
    }

    #[test]
    fn test_elevation_resolution_issues_move() {
        let fx = Fixture::new(PickingConfig::default());
        fx.model.insert(Entity::model(1));
        let terrain = fx.surface(Vec3::new(5.0, 1.0, 5.0), Vec3::new(4.0, 2.0, 4.0));
        fx.picking.add_target(EntityId(9), terrain);

        fx.picking.queue_config_request(
            PickRequest::new(PickKey::entity(EntityId(1)), Vec3::new(5.0, 0.0, 5.0)).with_origin(Vec3::zeros()),
        );
        assert_eq!(fx.picking.phase(), PickPhase::GeometryPending);

        fx.frame();
        assert_eq!(fx.picking.phase(), PickPhase::Resolvable);
        fx.frame();
        assert_eq!(fx.picking.phase(), PickPhase::Idle);

        match fx.model.applied_commands().as_slice() {
            [Command::MoveEntity { entity, from, to, .. }] => {
                assert_eq!(*entity, EntityId(1));
                assert_eq!(*from, Vec3::zeros());
                assert_relative_eq!(*to, Vec3::new(5.0, 2.0, 5.0), epsilon = 1e-4);
            }
            other => panic!("unexpected commands {other:?}"),
        }
        assert!(!fx.backend.sensor_enabled(fx.picking.sensor().unwrap()));
    }

    #[test]
    fn test_echo_does_not_retrigger() {
        let fx = Fixture::new(PickingConfig::default());
        fx.model.insert(Entity::model(1));
        let terrain = fx.surface(Vec3::new(0.0, -0.5, 0.0), Vec3::new(10.0, 3.0, 10.0));
        fx.picking.add_target(EntityId(9), terrain);

        assert!(fx.picking.on_entity_moved(EntityId(1), Vec3::new(1.0, 0.0, 1.0), None));
        fx.frame();
        fx.frame();
        assert_eq!(fx.picking.outstanding_echoes(), 1);

        for event in fx.model.drain_events() {
            if let ModelEvent::Moved { entity, position, transaction } = event {
                assert!(!fx.picking.on_entity_moved(entity, position, transaction));
            }
        }
        assert_eq!(fx.picking.phase(), PickPhase::Idle);
        assert_eq!(fx.picking.outstanding_echoes(), 0);
        assert_eq!(fx.model.applied_commands().len(), 1);
    }

    #[test]
    fn test_unchanged_position_issues_nothing() {
        let fx = Fixture::new(PickingConfig::default());
        let terrain = fx.surface(Vec3::new(0.0, -1.0, 0.0), Vec3::new(10.0, 2.0, 10.0));
        fx.picking.add_target(EntityId(9), terrain);

        fx.picking.queue_config_request(PickRequest::new(PickKey::entity(EntityId(1)), Vec3::new(2.0, 0.0, 2.0)));
        fx.frame();
        fx.frame();
        assert!(fx.model.applied_commands().is_empty());
        assert_eq!(fx.picking.phase(), PickPhase::Idle);
    }

    #[test]
    fn test_self_exclusion_and_reinstatement() {
        let fx = Fixture::new(PickingConfig::default());
        let own = fx.surface(Vec3::new(0.0, 10.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        fx.picking.add_target(EntityId(1), own);

        fx.picking.queue_config_request(PickRequest::new(PickKey::entity(EntityId(1)), Vec3::zeros()));
        assert!(!fx.picking.is_target(EntityId(1)));
        let sensor = fx.picking.sensor().unwrap();
        assert!(fx.backend.sensor_targets(sensor).is_empty());

        for _ in 0..PickingConfig::default().watchdog_ticks {
            fx.frame();
        }
        assert!(fx.picking.is_target(EntityId(1)));
        assert!(fx.model.applied_commands().is_empty());
    }

    #[test]
    fn test_watchdog_abandons_and_moves_on() {
        let config = PickingConfig { watchdog_ticks: 4, ..PickingConfig::default() };
        let fx = Fixture::new(config);

        fx.picking.queue_config_request(PickRequest::new(PickKey::entity(EntityId(1)), Vec3::zeros()));
        fx.picking.queue_config_request(PickRequest::new(PickKey::entity(EntityId(2)), Vec3::zeros()));
        for _ in 0..3 {
            fx.frame();
        }
        assert_eq!(fx.picking.active_request().unwrap().key.entity, EntityId(1));
        fx.frame();
        assert_eq!(fx.picking.active_request().unwrap().key.entity, EntityId(2));
        assert!(matches!(
            fx.reporter.errors().as_slice(),
            [SceneError::PickTimeout { entity: EntityId(1), ticks: 4, .. }]
        ));

        for _ in 0..4 {
            fx.frame();
        }
        assert_eq!(fx.picking.phase(), PickPhase::Idle);
        assert_eq!(fx.reporter.errors().len(), 2);
    }

    #[test]
    fn test_same_key_coalesces_while_busy() {
        let fx = Fixture::new(PickingConfig::default());
        fx.picking.queue_config_request(PickRequest::new(PickKey::entity(EntityId(1)), Vec3::zeros()));
        fx.picking.queue_config_request(PickRequest::new(PickKey::entity(EntityId(2)), Vec3::new(1.0, 0.0, 0.0)));
        fx.picking.queue_config_request(PickRequest::new(PickKey::entity(EntityId(2)), Vec3::new(2.0, 0.0, 0.0)));

        let queued = fx.picking.queued();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].target.x, 2.0);
    }

    #[test]
    fn test_stale_intersection_discarded() {
        let fx = Fixture::new(PickingConfig::default());
        fx.picking.queue_config_request(PickRequest::new(PickKey::entity(EntityId(1)), Vec3::zeros()));
        let sensor = fx.picking.sensor().unwrap();
        let hit = PickHit { node: NodeHandle(1), point: Vec3::new(0.0, 4.0, 0.0) };

        assert!(fx.picking.on_intersection(sensor, &[hit]));
        assert_eq!(fx.picking.phase(), PickPhase::GeometryPending);
        assert!(fx.model.applied_commands().is_empty());
        assert!(!fx.picking.on_intersection(SensorHandle(u64::MAX), &[hit]));
    }

    #[test]
    fn test_targets_before_geometry() {
        let fx = Fixture::new(PickingConfig::default());
        fx.picking.queue_config_request(PickRequest::new(PickKey::entity(EntityId(1)), Vec3::zeros()));
        let sensor = fx.picking.sensor().unwrap();

        fx.picking.on_targets_ready(sensor);
        assert_eq!(fx.picking.phase(), PickPhase::GeometryPending);
        fx.picking.on_geometry_ready(sensor);
        assert_eq!(fx.picking.phase(), PickPhase::Resolvable);
    }

    #[test]
    fn test_subpart_pick_issues_subpart_move() {
        let fx = Fixture::new(PickingConfig::default());
        let terrain = fx.surface(Vec3::new(0.0, 0.0, 0.0), Vec3::new(10.0, 1.0, 10.0));
        fx.picking.add_target(EntityId(9), terrain);

        fx.picking.on_subpart_moved(EntityId(4), SubpartId(1), Vec3::new(1.0, 3.0, 1.0), None);
        fx.frame();
        fx.frame();
        match fx.model.applied_commands().as_slice() {
            [Command::MoveSubpart { subpart, to, .. }] => {
                assert_eq!(*subpart, SubpartId(1));
                assert_relative_eq!(to.y, 0.5, epsilon = 1e-4);
            }
            other => panic!("unexpected commands {other:?}"),
        }
    }

    #[test]
    fn test_removed_entity_resolves_silently() {
        let fx = Fixture::new(PickingConfig::default());
        let terrain = fx.surface(Vec3::zeros(), Vec3::new(10.0, 2.0, 10.0));
        fx.picking.add_target(EntityId(9), terrain);

        fx.picking.queue_config_request(PickRequest::new(PickKey::entity(EntityId(1)), Vec3::new(0.0, 5.0, 0.0)));
        fx.picking.forget_entity(EntityId(1));
        fx.frame();
        fx.frame();
        assert!(fx.model.applied_commands().is_empty());
        assert!(!fx.picking.is_target(EntityId(1)));
        assert_eq!(fx.picking.phase(), PickPhase::Idle);
    }

    #[test]
    fn test_parent_relative_pick_casts_in_world_space() {
        let fx = Fixture::new(PickingConfig::default());
        fx.model.insert(Entity::model(1));
        // Decoy under the parent-space origin, table under the parent
        let decoy = fx.surface(Vec3::new(0.0, 2.5, 0.0), Vec3::new(2.0, 5.0, 2.0));
        let table = fx.surface(Vec3::new(10.0, 0.0, 10.0), Vec3::new(2.0, 1.0, 2.0));
        fx.picking.add_target(EntityId(8), decoy);
        fx.picking.add_target(EntityId(9), table);

        let parent = Frame::from_transform(Vec3::new(10.0, 0.0, 10.0), &AxisAngle::identity(), Vec3::new(1.0, 1.0, 1.0));
        assert!(fx.picking.on_position_changed(PickKey::entity(EntityId(1)), Vec3::new(0.0, 3.0, 0.0), parent, None));
        fx.frame();
        fx.frame();

        match fx.model.applied_commands().as_slice() {
            [Command::MoveEntity { from, to, .. }] => {
                assert_eq!(*from, Vec3::new(0.0, 3.0, 0.0));
                assert_relative_eq!(*to, Vec3::new(0.0, 0.5, 0.0), epsilon = 1e-4);
            }
            other => panic!("unexpected commands {other:?}"),
        }
    }
}
