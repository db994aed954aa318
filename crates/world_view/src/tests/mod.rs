//! End-to-end scenarios through [`WorldView`]
//!
//! Each scenario runs the real synchronizer, builder and picking code
//! against the headless backend and the in-memory model, delivering model
//! notifications and renderer events the way a host application would.

mod elevation_picking;
mod navigation_sync;

use crate::error::CollectingReporter;
use crate::foundation::time::ManualClock;
use crate::model::InMemoryModel;
use crate::render::HeadlessBackend;
use crate::settings::ViewConfig;
use crate::view::WorldView;
use std::sync::Arc;

/// A view wired to headless collaborators
pub(crate) struct Harness {
    pub backend: Arc<HeadlessBackend>,
    pub model: Arc<InMemoryModel>,
    pub reporter: Arc<CollectingReporter>,
    pub clock: Arc<ManualClock>,
    pub view: WorldView,
}

impl Harness {
    pub fn new(config: ViewConfig) -> Self {
        Self::with_model(config, InMemoryModel::new())
    }

    pub fn with_model(config: ViewConfig, model: InMemoryModel) -> Self {
        let backend = Arc::new(HeadlessBackend::new());
        let model = Arc::new(model);
        let reporter = Arc::new(CollectingReporter::new());
        let clock = Arc::new(ManualClock::new());
        let view = WorldView::with_clock(config, backend.clone(), model.clone(), reporter.clone(), clock.clone())
            .unwrap();
        Self { backend, model, reporter, clock, view }
    }

    /// Hand every queued model notification to the view
    pub fn deliver(&self) {
        for event in self.model.drain_events() {
            self.view.handle_model_event(&event);
        }
    }

    /// Render one frame, then deliver whatever the model emitted in response
    pub fn frame(&self) {
        self.backend.advance_frame();
        self.view.pump_render_events();
        self.deliver();
    }

    pub fn frames(&self, count: usize) {
        for _ in 0..count {
            self.frame();
        }
    }
}
