//! World view adapter
//!
//! Wires the scene synchronizer, the frame-staged builder, both picking
//! variants and the navigation arbitrator to one renderer and one entity
//! model. The host feeds it model notifications and pumps renderer events
//! once per frame:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use world_view::prelude::*;
//!
//! let backend = Arc::new(HeadlessBackend::new());
//! let model = Arc::new(InMemoryModel::new());
//! let view = WorldView::new(ViewConfig::default(), backend.clone(), model.clone(), Arc::new(LogReporter))?;
//!
//! model.insert(Entity::model(1));
//! for event in model.drain_events() {
//!     view.handle_model_event(&event);
//! }
//! backend.advance_frame();
//! view.pump_render_events();
//! # Ok::<(), world_view::config::ConfigError>(())
//! ```

use crate::config::ConfigError;
use crate::error::ErrorReporter;
use crate::events::{DeliveryReport, EventBus, Subscriber, SubscriberError, SubscriptionId, Tool, UiEvent};
use crate::foundation::math::Pose;
use crate::foundation::time::{Clock, SystemClock};
use crate::model::{EntityId, EntityModel, ModelEvent};
use crate::navigation::NavigationArbitrator;
use crate::picking::{CollisionMonitor, PickingCoordinator};
use crate::render::{RenderEvent, SceneBackend};
use crate::scene::{FrameStagedBuilder, SceneNodeRegistry, SceneSynchronizer, SynchronizerParts};
use crate::settings::{NavigationMode, ViewConfig};
use std::sync::{Arc, Mutex, PoisonError};

/// Counts of what one [`WorldView::pump_render_events`] call delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Queued model events dispatched before renderer events
    pub model_events: usize,
    /// Frame ticks processed
    pub frames: usize,
    /// Other renderer events consumed by a picking component
    pub consumed: usize,
    /// Renderer events nobody wanted
    pub ignored: usize,
}

#[derive(Debug, Default)]
struct UiState {
    tool: Option<Tool>,
    selection: Vec<EntityId>,
}

/// One view of the shared world
pub struct WorldView {
    config: ViewConfig,
    backend: Arc<dyn SceneBackend>,
    registry: Arc<SceneNodeRegistry>,
    builder: Arc<FrameStagedBuilder>,
    picking: Arc<PickingCoordinator>,
    collision: Arc<CollisionMonitor>,
    synchronizer: Arc<SceneSynchronizer>,
    navigation: NavigationArbitrator,
    model_events: EventBus<ModelEvent>,
    ui_events: EventBus<UiEvent>,
    ui: Mutex<UiState>,
}

impl WorldView {
    /// Build a view using the system clock
    pub fn new(
        config: ViewConfig,
        backend: Arc<dyn SceneBackend>,
        model: Arc<dyn EntityModel>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self, ConfigError> {
        Self::with_clock(config, backend, model, reporter, Arc::new(SystemClock))
    }

    /// Build a view reading wall-clock time from `clock`
    ///
    /// The navigation poller is not started; call
    /// [`Self::start_navigation_poller`] or drive [`Self::navigation`]
    /// explicitly.
    pub fn with_clock(
        config: ViewConfig,
        backend: Arc<dyn SceneBackend>,
        model: Arc<dyn EntityModel>,
        reporter: Arc<dyn ErrorReporter>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = Arc::new(SceneNodeRegistry::new());
        let picking = Arc::new(PickingCoordinator::new(
            backend.clone(),
            model.clone(),
            reporter.clone(),
            config.picking.clone(),
        ));
        let collision = Arc::new(CollisionMonitor::new(
            backend.clone(),
            model.clone(),
            reporter.clone(),
            config.feedback.clone(),
        ));
        let builder = Arc::new(FrameStagedBuilder::new(
            backend.clone(),
            registry.clone(),
            collision.clone(),
            reporter.clone(),
        ));
        let synchronizer = Arc::new(SceneSynchronizer::new(
            SynchronizerParts {
                backend: backend.clone(),
                model: model.clone(),
                registry: registry.clone(),
                builder: builder.clone(),
                picking: picking.clone(),
                collision: collision.clone(),
                reporter: reporter.clone(),
            },
            config.picking.mode,
        ));
        let navigation = NavigationArbitrator::new(model, backend.clone(), reporter, clock, &config.navigation);

        let model_events = EventBus::new("model");
        let handler = synchronizer.clone();
        model_events.subscribe(
            "scene-synchronizer",
            Arc::new(move |event: &ModelEvent| -> Result<(), SubscriberError> {
                handler.handle(event);
                Ok(())
            }),
        );

        log::info!(
            "World view ready (picking {:?}, navigation {:?})",
            config.picking.mode,
            config.navigation.initial_mode
        );
        Ok(Self {
            config,
            backend,
            registry,
            builder,
            picking,
            collision,
            synchronizer,
            navigation,
            model_events,
            ui_events: EventBus::new("ui"),
            ui: Mutex::new(UiState::default()),
        })
    }

    /// Configuration the view was built with
    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Model side
    // ------------------------------------------------------------------

    /// Deliver a model notification now
    ///
    /// The scene synchronizer always sees it first, then any subscriber
    /// added with [`Self::subscribe_model`].
    pub fn handle_model_event(&self, event: &ModelEvent) -> DeliveryReport {
        self.model_events.publish(event)
    }

    /// Queue a model notification for the next [`Self::pump_render_events`]
    ///
    /// Safe to call from any thread.
    pub fn post_model_event(&self, event: ModelEvent) {
        self.model_events.post(event);
    }

    /// Observe model notifications after the synchronizer handled them
    pub fn subscribe_model(&self, name: &str, subscriber: Arc<dyn Subscriber<ModelEvent>>) -> SubscriptionId {
        self.model_events.subscribe(name, subscriber)
    }

    // ------------------------------------------------------------------
    // Renderer side
    // ------------------------------------------------------------------

    /// Dispatch queued model events, then route every queued renderer event
    pub fn pump_render_events(&self) -> PumpReport {
        let mut report = PumpReport {
            model_events: self.model_events.dispatch(),
            ..PumpReport::default()
        };
        for event in self.backend.drain_events() {
            if self.route(&event) {
                if event == RenderEvent::FrameTick {
                    report.frames += 1;
                } else {
                    report.consumed += 1;
                }
            } else {
                log::trace!("Unclaimed renderer event {:?}", event);
                report.ignored += 1;
            }
        }
        report
    }

    fn route(&self, event: &RenderEvent) -> bool {
        if *event == RenderEvent::FrameTick {
            self.builder.tick();
            self.picking.on_frame();
            self.collision.on_frame(self.builder.is_busy());
            return true;
        }
        self.picking.handle_render_event(event) || self.collision.handle_render_event(event)
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Start the background navigation debounce poller
    pub fn start_navigation_poller(&self) -> std::io::Result<()> {
        self.navigation.start_poller()
    }

    /// Switch navigation mode
    pub fn set_navigation_mode(&self, mode: NavigationMode) {
        self.navigation.set_mode(mode);
    }

    /// The local viewpoint moved
    pub fn on_viewpoint_changed(&self, pose: Pose) {
        self.navigation.on_viewpoint_changed(pose);
    }

    /// A pose published by the master view arrived
    pub fn on_remote_pose(&self, pose: Pose) {
        self.navigation.on_remote_pose(pose);
    }

    // ------------------------------------------------------------------
    // UI side
    // ------------------------------------------------------------------

    /// Change the current tool and notify UI subscribers
    pub fn set_tool(&self, tool: Tool) {
        {
            let mut ui = self.ui.lock().unwrap_or_else(PoisonError::into_inner);
            if ui.tool.as_ref() == Some(&tool) {
                return;
            }
            ui.tool = Some(tool.clone());
        }
        log::debug!("Tool changed to {:?}", tool);
        self.ui_events.publish(&UiEvent::ToolChanged(tool));
    }

    /// Current tool
    pub fn tool(&self) -> Option<Tool> {
        self.ui.lock().unwrap_or_else(PoisonError::into_inner).tool.clone()
    }

    /// Change the current selection and notify UI subscribers
    pub fn set_selection(&self, selection: Vec<EntityId>) {
        {
            let mut ui = self.ui.lock().unwrap_or_else(PoisonError::into_inner);
            if ui.selection == selection {
                return;
            }
            ui.selection.clone_from(&selection);
        }
        self.ui_events.publish(&UiEvent::SelectionChanged(selection));
    }

    /// Current selection
    pub fn selection(&self) -> Vec<EntityId> {
        self.ui.lock().unwrap_or_else(PoisonError::into_inner).selection.clone()
    }

    /// Observe tool and selection changes
    pub fn subscribe_ui(&self, name: &str, subscriber: Arc<dyn Subscriber<UiEvent>>) -> SubscriptionId {
        self.ui_events.subscribe(name, subscriber)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Entity ↔ node map
    pub fn registry(&self) -> &SceneNodeRegistry {
        &self.registry
    }

    /// Scene synchronizer
    pub fn synchronizer(&self) -> &SceneSynchronizer {
        &self.synchronizer
    }

    /// Staged construction queue
    pub fn builder(&self) -> &FrameStagedBuilder {
        &self.builder
    }

    /// Elevation picking
    pub fn picking(&self) -> &PickingCoordinator {
        &self.picking
    }

    /// Collision feedback
    pub fn collision(&self) -> &CollisionMonitor {
        &self.collision
    }

    /// Navigation arbitration
    pub fn navigation(&self) -> &NavigationArbitrator {
        &self.navigation
    }

    /// Stop background work
    ///
    /// Pending navigation gestures are committed if this view is master.
    pub fn shutdown(&self) {
        if self.navigation.mode() == NavigationMode::Master {
            self.navigation.poll_at(self.navigation_deadline());
        }
        self.navigation.shutdown();
        log::info!("World view shut down");
    }

    /// An instant at which any pending navigation gesture counts as idle
    fn navigation_deadline(&self) -> std::time::Instant {
        let state = self.navigation.state();
        match state.last_activity {
            Some(last) => last + self.config.navigation.poll_interval(),
            None => std::time::Instant::now(),
        }
    }
}

impl Drop for WorldView {
    fn drop(&mut self) {
        self.navigation.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingReporter;
    use crate::model::{Command, Entity, InMemoryModel};
    use crate::render::HeadlessBackend;
    use crate::settings::PickingMode;
    use crate::foundation::math::Vec3;

    fn view(config: ViewConfig) -> (WorldView, Arc<HeadlessBackend>, Arc<InMemoryModel>) {
        let backend = Arc::new(HeadlessBackend::new());
        let model = Arc::new(InMemoryModel::new());
        let view = WorldView::new(config, backend.clone(), model.clone(), Arc::new(CollectingReporter::new())).unwrap();
        (view, backend, model)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let backend = Arc::new(HeadlessBackend::new());
        let model = Arc::new(InMemoryModel::new());
        let result = WorldView::new(
            ViewConfig::new().with_watchdog_ticks(0),
            backend,
            model,
            Arc::new(CollectingReporter::new()),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_posted_model_events_dispatched_on_pump() {
        let (view, backend, model) = view(ViewConfig::new().with_picking_mode(PickingMode::Disabled));
        model.insert(Entity::model(1));
        for event in model.drain_events() {
            view.post_model_event(event);
        }
        assert!(!view.registry().contains(EntityId(1)));

        backend.advance_frame();
        let report = view.pump_render_events();
        assert_eq!(report.model_events, 1);
        assert_eq!(report.frames, 1);
        assert!(view.registry().contains(EntityId(1)));
    }

    #[test]
    fn test_model_subscribers_run_after_synchronizer() {
        let (view, _backend, model) = view(ViewConfig::new().with_picking_mode(PickingMode::Disabled));
        let seen_bound = Arc::new(Mutex::new(Vec::new()));
        let registry_check = seen_bound.clone();
        let registry = view.registry.clone();
        view.subscribe_model(
            "probe",
            Arc::new(move |event: &ModelEvent| -> Result<(), SubscriberError> {
                registry_check.lock().unwrap().push(registry.contains(event.entity_id()));
                Ok(())
            }),
        );

        model.insert(Entity::model(4));
        for event in model.drain_events() {
            assert_eq!(view.handle_model_event(&event).delivered, 2);
        }
        assert_eq!(*seen_bound.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_tool_and_selection_notify_once_per_change() {
        let (view, _backend, _model) = view(ViewConfig::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        view.subscribe_ui(
            "recorder",
            Arc::new(move |event: &UiEvent| -> Result<(), SubscriberError> {
                sink.lock().unwrap().push(event.clone());
                Ok(())
            }),
        );

        view.set_tool(Tool::Navigate);
        view.set_tool(Tool::Navigate);
        view.set_selection(vec![EntityId(2), EntityId(3)]);
        view.set_selection(vec![EntityId(2), EntityId(3)]);

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                UiEvent::ToolChanged(Tool::Navigate),
                UiEvent::SelectionChanged(vec![EntityId(2), EntityId(3)]),
            ]
        );
        assert_eq!(view.tool(), Some(Tool::Navigate));
        assert_eq!(view.selection(), vec![EntityId(2), EntityId(3)]);
    }

    #[test]
    fn test_shutdown_commits_pending_gesture() {
        let (view, _backend, model) = view(ViewConfig::new().with_navigation_mode(NavigationMode::Master));
        view.start_navigation_poller().unwrap();
        view.on_viewpoint_changed(Pose::at(Vec3::new(1.0, 2.0, 3.0)));
        view.shutdown();

        assert!(!view.navigation().is_polling());
        let finals: Vec<_> = model
            .applied_commands()
            .into_iter()
            .filter(|command| matches!(command, Command::ChangeView { transient: false, .. }))
            .collect();
        assert_eq!(finals.len(), 1);
    }
}
