//! Headless world viewer
//!
//! Runs a scripted authoring session against the in-memory model and the
//! headless renderer: builds a small world, drops a few models onto the
//! terrain, drags one around and navigates as master.
//!
//! Usage: `world_viewer [config.toml|config.ron]`

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use world_view::foundation::logging;
use world_view::prelude::*;

/// Frames rendered between scripted steps
const SETTLE_FRAMES: usize = 4;

#[derive(Error, Debug)]
enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Navigation poller failed to start: {0}")]
    Poller(#[from] std::io::Error),
}

struct ViewerApp {
    backend: Arc<HeadlessBackend>,
    model: Arc<InMemoryModel>,
    view: WorldView,
}

impl ViewerApp {
    fn new(config: ViewConfig) -> Result<Self, AppError> {
        let backend = Arc::new(HeadlessBackend::new());
        let model = Arc::new(InMemoryModel::new());
        let view = WorldView::new(config, backend.clone(), model.clone(), Arc::new(LogReporter))?;
        view.subscribe_ui(
            "log",
            Arc::new(|event: &UiEvent| -> Result<(), SubscriberError> {
                log::info!("UI: {:?}", event);
                Ok(())
            }),
        );
        Ok(Self { backend, model, view })
    }

    /// Hand queued model notifications to the view
    fn deliver(&self) {
        for event in self.model.drain_events() {
            self.view.post_model_event(event);
        }
    }

    /// Render frames, feeding model echoes back in between
    fn run_frames(&self, count: usize) {
        for _ in 0..count {
            self.deliver();
            self.backend.advance_frame();
            let report = self.view.pump_render_events();
            log::trace!("Frame {}: {:?}", self.backend.frame(), report);
        }
        self.deliver();
        self.view.pump_render_events();
    }

    fn build_world(&self) {
        log::info!("Building world");
        let terrain = Entity::model(2)
            .with_position(Vec3::new(0.0, -0.5, 0.0))
            .with_dimensions(Vec3::new(50.0, 1.0, 50.0))
            .with_flags(EntityFlags::FIXED);
        let plinth = Entity::model(3)
            .with_position(Vec3::new(6.0, 1.0, 6.0))
            .with_dimensions(Vec3::new(4.0, 2.0, 4.0))
            .with_flags(EntityFlags::FIXED);
        let wall = Entity::segment(
            4,
            vec![Vec3::new(-10.0, 0.0, -10.0), Vec3::new(10.0, 0.0, -10.0), Vec3::new(10.0, 0.0, 10.0)],
        );
        let world = Entity::new(EntityId(1), EntityKind::World).with_children(vec![EntityId(2), EntityId(3), EntityId(4)]);

        for entity in [terrain, plinth, wall] {
            self.model.insert_silently(entity);
        }
        self.model.insert(world);
        self.run_frames(SETTLE_FRAMES);
    }

    fn place_models(&self) {
        self.view.set_tool(Tool::Place("chair".into()));
        for (id, x, z) in [(10, -3.0, 2.0), (11, 2.0, -4.0)] {
            self.model.insert(Entity::model(id).with_position(Vec3::new(x, 5.0, z)));
        }
        self.run_frames(1);
        for id in [10, 11] {
            if let Some(entity) = self.model.entity(EntityId(id)) {
                // Re-announce the drop position so it gets elevation picked
                self.model.move_entity(entity.id, entity.position);
            }
        }
        self.run_frames(SETTLE_FRAMES * 3);
    }

    fn drag_onto_plinth(&self) {
        self.view.set_tool(Tool::Select);
        self.view.set_selection(vec![EntityId(10)]);
        for step in 1..=4u8 {
            let t = f32::from(step) / 4.0;
            let position = Vec3::new(-3.0 + 9.0 * t, 0.0, 2.0 + 4.0 * t);
            self.model.move_entity(EntityId(10), position);
            self.run_frames(1);
        }
        self.run_frames(SETTLE_FRAMES * 2);
    }

    fn navigate(&self) -> Result<(), AppError> {
        self.view.set_tool(Tool::Navigate);
        self.view.start_navigation_poller()?;
        self.view.set_navigation_mode(NavigationMode::Master);
        for step in 0..5u8 {
            let angle = f32::from(step) * 0.1;
            let pose = Pose::new(Vec3::new(0.0, 10.0, 20.0 - f32::from(step)), AxisAngle::new(Vec3::y(), angle));
            self.view.on_viewpoint_changed(pose);
            std::thread::sleep(Duration::from_millis(40));
        }
        std::thread::sleep(Duration::from_millis(400));
        Ok(())
    }

    fn summarize(&self) {
        for id in [10, 11] {
            if let Some(entity) = self.model.entity(EntityId(id)) {
                log::info!("{} rests at {:?}", entity.id, entity.position);
            }
        }
        let commands = self.model.applied_commands();
        let moves = commands.iter().filter(|c| matches!(c, Command::MoveEntity { .. })).count();
        let views = commands.iter().filter(|c| matches!(c, Command::ChangeView { .. })).count();
        let finals = commands.iter().filter(|c| matches!(c, Command::ChangeView { transient: false, .. })).count();
        log::info!(
            "{} bindings, {} scene nodes, {} moves, {} view changes ({} final)",
            self.view.registry().len(),
            self.backend.node_count(),
            moves,
            views,
            finals
        );
    }

    fn run(&self) -> Result<(), AppError> {
        self.build_world();
        self.place_models();
        self.drag_onto_plinth();
        self.navigate()?;
        self.summarize();
        self.view.shutdown();
        Ok(())
    }
}

fn load_config() -> Result<ViewConfig, ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => ViewConfig::load_from_file(path),
        None => Ok(ViewConfig::default()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    logging::init_with_level(&config.logging.level);
    log::info!("Starting headless world viewer");

    let app = ViewerApp::new(config)?;
    app.run()?;

    log::info!("Viewer finished");
    Ok(())
}
