//! Side effects collected while a component holds its lock
//!
//! Coordinators never call into the entity model or the error reporter with
//! their own state locked. They gather commands and failures into an
//! [`Effects`] value and flush it once the guard is dropped.

use crate::error::{ErrorReporter, SceneError};
use crate::model::{Command, EntityModel};

/// Commands and failures awaiting delivery
#[derive(Debug, Default)]
pub struct Effects {
    /// Commands for the entity model, in issue order
    pub commands: Vec<Command>,
    /// Failures for the error reporter
    pub errors: Vec<SceneError>,
}

impl Effects {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command
    pub fn command(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Queue a failure
    pub fn error(&mut self, error: impl Into<SceneError>) {
        self.errors.push(error.into());
    }

    /// Whether there is nothing to deliver
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.errors.is_empty()
    }

    /// Report failures, then submit commands
    pub fn flush(self, model: &dyn EntityModel, reporter: &dyn ErrorReporter) {
        for error in &self.errors {
            reporter.report(error);
        }
        for command in self.commands {
            model.apply(command);
        }
    }
}
