//! Logging utilities

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize logging with a default level filter
///
/// `RUST_LOG` still takes precedence when it is set. Returns `false` when a
/// logger was already installed; the existing one keeps running.
pub fn init_with_level(level: &str) -> bool {
    let parsed = level.parse::<log::LevelFilter>().ok();
    let filter = parsed.unwrap_or(log::LevelFilter::Info);
    let installed = match env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .try_init()
    {
        Ok(()) => true,
        Err(e) => {
            log::trace!("Keeping existing logger: {}", e);
            false
        }
    };
    if parsed.is_none() {
        log::warn!("Unknown log level {:?}, using {}", level, filter);
    }
    installed
}
