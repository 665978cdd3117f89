//! Logging setup for binaries and tests using the crate

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    init_with_level("info");
}

/// Initialize the logging system, defaulting to `level` when `RUST_LOG` is unset.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_with_level(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::debug!("Logger already initialized, keeping existing configuration");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_with_level("debug");
        init_with_level("warn");
        init();
        assert!(log::max_level() >= log::LevelFilter::Error);
    }
}
