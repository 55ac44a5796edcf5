// Diagnostics - process-wide log sink
//
// The library only talks to the `log` facade. The embedder calls
// `init_logging` once; RUST_LOG still overrides the configured level.

use crate::config::DebugConfig;
use env_logger::Builder;
use log::LevelFilter;

/// Initialize logging. Calling it twice is harmless.
pub fn init_logging(config: &DebugConfig) {
    let level = parse_level(&config.log_level);

    let mut builder = Builder::new();
    builder.filter_level(level);
    builder.parse_default_env();

    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}

fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}
