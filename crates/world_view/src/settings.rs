//! # View Configuration
//!
//! Settings for the scene synchronizer, the picking engine and the
//! navigation arbitrator. All sections have working defaults; a view can be
//! configured entirely in code with the `with_*` builders or loaded from a
//! `.toml` / `.ron` file through [`Config`].
//!
//! ```toml
//! [picking]
//! mode = "Elevation"
//! watchdog_ticks = 12
//!
//! [navigation]
//! poll_interval_ms = 250
//! ```

use crate::config::{Config, ConfigError};
use crate::foundation::math::Vec3;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which picking behavior newly added entities participate in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickingMode {
    /// Terrain-following placement: moved entities are dropped onto the
    /// highest surface below them
    Elevation,
    /// Collision feedback between per-entity proxy volumes
    Collision,
    /// No picking; scene synchronization only
    Disabled,
}

/// What to do when the pending pick queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Drop the oldest queued request to make room
    DropOldest,
    /// Refuse the incoming request
    RejectNewest,
}

/// Navigation role of this view among cooperating views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationMode {
    /// This view drives the shared viewpoint
    Master,
    /// This view follows the master's viewpoint
    Slave,
    /// This view navigates independently
    Free,
}

/// Picking engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PickingConfig {
    /// Active picking behavior
    pub mode: PickingMode,
    /// Frame ticks an active elevation pick may wait for an intersection
    pub watchdog_ticks: u32,
    /// Maximum number of queued (not active) pick requests
    pub queue_capacity: usize,
    /// Behavior when the queue is full
    pub overflow_policy: OverflowPolicy,
    /// Height above the target at which the pick ray starts
    pub ray_height: f32,
    /// Length of the downward pick ray
    pub ray_length: f32,
    /// Tolerance when comparing positions
    pub position_epsilon: f32,
    /// Frames a completed pick stays eligible for echo suppression
    pub echo_ttl_frames: u64,
}

impl Default for PickingConfig {
    fn default() -> Self {
        Self {
            mode: PickingMode::Elevation,
            watchdog_ticks: 12,
            queue_capacity: 256,
            overflow_policy: OverflowPolicy::DropOldest,
            ray_height: 1000.0,
            ray_length: 2000.0,
            position_epsilon: 1.0e-4,
            echo_ttl_frames: 600,
        }
    }
}

impl PickingConfig {
    /// Validate ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watchdog_ticks == 0 {
            return Err(ConfigError::Invalid("picking.watchdog_ticks must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("picking.queue_capacity must be at least 1".into()));
        }
        if !(self.ray_length > 0.0) {
            return Err(ConfigError::Invalid("picking.ray_length must be positive".into()));
        }
        if self.position_epsilon < 0.0 {
            return Err(ConfigError::Invalid("picking.position_epsilon must not be negative".into()));
        }
        Ok(())
    }
}

/// Navigation arbitration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Mode the view starts in
    pub initial_mode: NavigationMode,
    /// Debounce interval between the last viewpoint motion and the final commit
    pub poll_interval_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            initial_mode: NavigationMode::Free,
            poll_interval_ms: 250,
        }
    }
}

impl NavigationConfig {
    /// Poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Visual feedback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Emissive color applied to colliding entities
    pub collision_color: Vec3,
    /// Emissive color of entities that are not colliding
    pub normal_color: Vec3,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            collision_color: Vec3::new(0.8, 0.1, 0.1),
            normal_color: Vec3::zeros(),
        }
    }
}

/// Logging settings for binaries embedding the view
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level filter (`RUST_LOG` overrides it)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

/// Complete view configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Picking engine settings
    pub picking: PickingConfig,
    /// Navigation settings
    pub navigation: NavigationConfig,
    /// Visual feedback settings
    pub feedback: FeedbackConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl ViewConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the picking mode
    pub fn with_picking_mode(mut self, mode: PickingMode) -> Self {
        self.picking.mode = mode;
        self
    }

    /// Set the pick watchdog in frame ticks
    pub fn with_watchdog_ticks(mut self, ticks: u32) -> Self {
        self.picking.watchdog_ticks = ticks;
        self
    }

    /// Set queue capacity and overflow behavior
    pub fn with_queue_limit(mut self, capacity: usize, policy: OverflowPolicy) -> Self {
        self.picking.queue_capacity = capacity;
        self.picking.overflow_policy = policy;
        self
    }

    /// Set the initial navigation mode
    pub fn with_navigation_mode(mut self, mode: NavigationMode) -> Self {
        self.navigation.initial_mode = mode;
        self
    }

    /// Set the navigation debounce interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.navigation.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.picking.validate()?;
        if self.navigation.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("navigation.poll_interval_ms must be at least 1".into()));
        }
        Ok(())
    }
}

impl Config for ViewConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ViewConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.picking.mode, PickingMode::Elevation);
        assert_eq!(config.navigation.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_zero_watchdog_rejected() {
        let config = ViewConfig::new().with_watchdog_ticks(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ViewConfig = toml::from_str(
            "[picking]\nmode = \"Collision\"\nwatchdog_ticks = 4\n\n[navigation]\ninitial_mode = \"Master\"\n",
        )
        .unwrap();
        assert_eq!(config.picking.mode, PickingMode::Collision);
        assert_eq!(config.picking.watchdog_ticks, 4);
        assert_eq!(config.picking.queue_capacity, 256);
        assert_eq!(config.navigation.initial_mode, NavigationMode::Master);
        assert_eq!(config.navigation.poll_interval_ms, 250);
    }

    #[test]
    fn test_ron_round_trip_through_file() {
        let path = std::env::temp_dir().join(format!("world_view_config_{}.ron", std::process::id()));
        let config = ViewConfig::new()
            .with_picking_mode(PickingMode::Disabled)
            .with_queue_limit(8, OverflowPolicy::RejectNewest);
        config.save_to_file(&path).unwrap();
        let loaded = ViewConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.picking.mode, PickingMode::Disabled);
        assert_eq!(loaded.picking.queue_capacity, 8);
        assert_eq!(loaded.picking.overflow_policy, OverflowPolicy::RejectNewest);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let result = ViewConfig::load_from_file("settings.yaml");
        assert!(result.is_err());
    }
}
