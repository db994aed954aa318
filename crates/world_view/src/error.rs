//! Error taxonomy and the side-channel error reporter
//!
//! Nothing in the view propagates a failure across component boundaries.
//! Components report through an [`ErrorReporter`] and leave the affected
//! entity in a consistent (possibly incomplete) state.

use crate::model::{EntityId, SubpartId};
use crate::render::BackendError;
use thiserror::Error;

/// Failures observed by the scene synchronizer, builder and picking code
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    /// Removal or update requested for an entity with no scene binding
    #[error("No scene binding for {0}")]
    BindingNotFound(EntityId),

    /// An active elevation pick saw no intersection before its watchdog expired
    #[error("Pick for {entity} (subpart {subpart:?}) timed out after {ticks} frames")]
    PickTimeout {
        /// Entity that was being picked
        entity: EntityId,
        /// Sub-part, for segmented entities
        subpart: Option<SubpartId>,
        /// Watchdog length in frames
        ticks: u32,
    },

    /// Derived geometry could not be built
    #[error("Scene construction failed for {entity}: {reason}")]
    Construction {
        /// Entity whose representation is incomplete
        entity: EntityId,
        /// What went wrong
        reason: String,
    },

    /// The pending pick queue was full
    #[error("Pick queue full ({capacity}), dropped request for {entity}")]
    QueueOverflow {
        /// Entity whose request was dropped
        entity: EntityId,
        /// Configured capacity
        capacity: usize,
    },

    /// The rendering backend refused an operation
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl SceneError {
    /// Whether the failure is expected in normal operation
    ///
    /// Expected failures are logged at warn level, the others at error.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::BindingNotFound(_) | Self::PickTimeout { .. } | Self::QueueOverflow { .. })
    }
}

/// Side channel receiving non-fatal failures
pub trait ErrorReporter: Send + Sync {
    /// Record a failure
    fn report(&self, error: &SceneError);
}

/// Reporter that writes failures to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, error: &SceneError) {
        if error.is_benign() {
            log::warn!("{}", error);
        } else {
            log::error!("{}", error);
        }
    }
}

/// Reporter that keeps every failure in memory
#[derive(Debug, Default)]
pub struct CollectingReporter {
    errors: std::sync::Mutex<Vec<SceneError>>,
}

impl CollectingReporter {
    /// Create an empty reporter
    pub fn new() -> Self {
        Self::default()
    }

    /// Failures reported so far
    pub fn errors(&self) -> Vec<SceneError> {
        self.errors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, error: &SceneError) {
        LogReporter.report(error);
        self.errors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(error.clone());
    }
}
