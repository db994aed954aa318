//! Navigation arbitration
//!
//! Cooperating views share one authoritative viewpoint. A view is in one of
//! three modes:
//!
//! - **Master**: local viewpoint motion is published. Every intermediate
//!   pose goes out as a transient view change with estimated velocities;
//!   once motion stops for the poll interval a single final change commits
//!   the last pose.
//! - **Slave**: the view follows poses published by the master.
//! - **Free**: the view navigates on its own and publishes nothing.
//!
//! All updates of one gesture share a transaction id. The debounce check
//! runs on a background [`poller`] thread; tests drive it explicitly with
//! [`NavigationArbitrator::poll`].

pub mod poller;

use crate::effects::Effects;
use crate::error::{ErrorReporter, SceneError};
use crate::foundation::math::{Pose, Vec3};
use crate::foundation::time::Clock;
use crate::model::{Command, EntityModel, TransactionId};
use crate::render::SceneBackend;
use crate::settings::{NavigationConfig, NavigationMode};
use poller::Poller;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Shared navigation state
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationState {
    /// Current mode
    pub mode: NavigationMode,
    /// Last pose committed with a final view change
    pub last_committed: Option<Pose>,
    /// Most recent local pose
    pub last_pose: Option<Pose>,
    /// Transaction of the gesture in progress
    pub pending: Option<TransactionId>,
    /// When the most recent local pose arrived
    pub last_activity: Option<Instant>,
    /// Previous pose sample used for velocity estimation
    previous_sample: Option<(Pose, Instant)>,
}

impl NavigationState {
    fn new(mode: NavigationMode) -> Self {
        Self {
            mode,
            last_committed: None,
            last_pose: None,
            pending: None,
            last_activity: None,
            previous_sample: None,
        }
    }
}

struct NavigationShared {
    state: Mutex<NavigationState>,
    model: Arc<dyn EntityModel>,
    backend: Arc<dyn SceneBackend>,
    reporter: Arc<dyn ErrorReporter>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl NavigationShared {
    fn lock(&self) -> MutexGuard<'_, NavigationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, effects: Effects) {
        effects.flush(self.model.as_ref(), self.reporter.as_ref());
    }

    fn poll_at(&self, now: Instant) -> bool {
        let mut effects = Effects::new();
        let committed = {
            let mut state = self.lock();
            let idle = state
                .last_activity
                .is_some_and(|last| now.saturating_duration_since(last) >= self.interval);
            if state.pending.is_some() && idle {
                if state.mode == NavigationMode::Master {
                    commit_final(&mut state, &mut effects)
                } else {
                    state.pending = None;
                    false
                }
            } else {
                false
            }
        };
        self.flush(effects);
        committed
    }
}

/// Issue the final view change of the gesture in progress
fn commit_final(state: &mut NavigationState, effects: &mut Effects) -> bool {
    let (Some(transaction), Some(pose)) = (state.pending.take(), state.last_pose) else {
        return false;
    };
    log::debug!("Committing viewpoint {:?} ({:?})", pose.position, transaction);
    effects.command(Command::ChangeView {
        pose,
        linear_velocity: Vec3::zeros(),
        angular_velocity: Vec3::zeros(),
        transient: false,
        transaction,
    });
    state.last_committed = Some(pose);
    state.previous_sample = None;
    true
}

/// Linear and angular velocity between two pose samples
fn estimate_velocity(from: &Pose, to: &Pose, elapsed: Duration) -> (Vec3, Vec3) {
    let seconds = elapsed.as_secs_f32();
    if seconds <= f32::EPSILON {
        return (Vec3::zeros(), Vec3::zeros());
    }
    let linear = (to.position - from.position) / seconds;
    let delta = to.orientation.to_quat() * from.orientation.to_quat().inverse();
    let angular = delta.scaled_axis() / seconds;
    (linear, angular)
}

/// Master/slave/free viewpoint arbitration
pub struct NavigationArbitrator {
    shared: Arc<NavigationShared>,
    poller: Mutex<Option<Poller>>,
}

impl NavigationArbitrator {
    /// Create an arbitrator; the poller is not running yet
    pub fn new(
        model: Arc<dyn EntityModel>,
        backend: Arc<dyn SceneBackend>,
        reporter: Arc<dyn ErrorReporter>,
        clock: Arc<dyn Clock>,
        config: &NavigationConfig,
    ) -> Self {
        let shared = NavigationShared {
            state: Mutex::new(NavigationState::new(config.initial_mode)),
            model,
            backend,
            reporter,
            clock,
            interval: config.poll_interval(),
        };
        Self {
            shared: Arc::new(shared),
            poller: Mutex::new(None),
        }
    }

    fn poller(&self) -> MutexGuard<'_, Option<Poller>> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the background debounce poller
    ///
    /// Does nothing if it is already running.
    pub fn start_poller(&self) -> std::io::Result<()> {
        let mut poller = self.poller();
        if poller.is_some() {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        let interval = shared.interval;
        *poller = Some(Poller::spawn(interval, move || {
            let now = shared.clock.now();
            shared.poll_at(now);
        })?);
        Ok(())
    }

    /// Whether the background poller is running
    pub fn is_polling(&self) -> bool {
        self.poller().is_some()
    }

    /// Stop and join the background poller
    pub fn shutdown(&self) {
        if let Some(poller) = self.poller().take() {
            poller.stop();
            log::debug!("Navigation poller stopped");
        }
    }

    /// Current mode
    pub fn mode(&self) -> NavigationMode {
        self.shared.lock().mode
    }

    /// Snapshot of the shared state
    pub fn state(&self) -> NavigationState {
        self.shared.lock().clone()
    }

    /// Switch mode
    ///
    /// Leaving Master mid-gesture commits the last pose first; entering
    /// Master announces the takeover to the model.
    pub fn set_mode(&self, mode: NavigationMode) {
        let mut effects = Effects::new();
        {
            let mut state = self.shared.lock();
            if state.mode == mode {
                return;
            }
            if state.mode == NavigationMode::Master {
                commit_final(&mut state, &mut effects);
            }
            state.pending = None;
            state.previous_sample = None;
            if mode == NavigationMode::Master {
                effects.command(Command::TakeOverView {
                    transaction: self.shared.model.issue_transaction_id(),
                });
            }
            log::info!("Navigation mode {:?} -> {:?}", state.mode, mode);
            state.mode = mode;
        }
        self.shared.flush(effects);
    }

    /// The local viewpoint moved
    pub fn on_viewpoint_changed(&self, pose: Pose) {
        let now = self.shared.clock.now();
        self.on_viewpoint_changed_at(pose, now);
    }

    /// [`Self::on_viewpoint_changed`] at an explicit instant
    pub fn on_viewpoint_changed_at(&self, pose: Pose, now: Instant) {
        let mut effects = Effects::new();
        {
            let mut state = self.shared.lock();
            state.last_pose = Some(pose);
            if state.mode != NavigationMode::Master {
                return;
            }
            let transaction = match state.pending {
                Some(transaction) => transaction,
                None => {
                    let transaction = self.shared.model.issue_transaction_id();
                    state.pending = Some(transaction);
                    transaction
                }
            };
            let (linear_velocity, angular_velocity) = match state.previous_sample {
                Some((previous, at)) => estimate_velocity(&previous, &pose, now.saturating_duration_since(at)),
                None => (Vec3::zeros(), Vec3::zeros()),
            };
            effects.command(Command::ChangeView {
                pose,
                linear_velocity,
                angular_velocity,
                transient: true,
                transaction,
            });
            state.previous_sample = Some((pose, now));
            state.last_activity = Some(now);
        }
        self.shared.flush(effects);
    }

    /// A pose published by the master view arrived
    ///
    /// Applied to the local viewpoint only in Slave mode.
    pub fn on_remote_pose(&self, pose: Pose) {
        {
            let mut state = self.shared.lock();
            if state.mode != NavigationMode::Slave {
                return;
            }
            state.last_committed = Some(pose);
        }
        if let Err(e) = self.shared.backend.set_viewpoint(pose) {
            self.shared.reporter.report(&SceneError::Backend(e));
        }
    }

    /// Run the debounce check now
    ///
    /// Returns `true` if a final view change was committed.
    pub fn poll(&self) -> bool {
        let now = self.shared.clock.now();
        self.shared.poll_at(now)
    }

    /// [`Self::poll`] at an explicit instant
    pub fn poll_at(&self, now: Instant) -> bool {
        self.shared.poll_at(now)
    }
}

impl Drop for NavigationArbitrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
