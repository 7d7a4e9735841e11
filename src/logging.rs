//! Logger set-up.
//!
//! `log4rs.yml` in the working directory wins; without it a console logger
//! at `info` (or `RUST_LOG`'s level) is installed.

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::error::Error;
use std::path::Path;

pub const LOG_CONFIG_FILE: &str = "log4rs.yml";

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l:5})} {t} - {m}{n}";

/// Parse a level name, defaulting to `Info`.
pub fn level_from(name: Option<&str>) -> LevelFilter {
    name.and_then(|n| n.trim().parse().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Console config writing to stderr so stdout stays a clean listing.
pub fn fallback_config(level: LevelFilter) -> Result<Config, Box<dyn Error>> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))?;
    Ok(config)
}

/// Initialise logging from `path` if present, otherwise from the fallback.
pub fn init(path: &Path) -> Result<(), Box<dyn Error>> {
    if path.exists() {
        log4rs::init_file(path, Default::default())?;
        log::debug!("Logging configured from {}", path.display());
        return Ok(());
    }
    let level = level_from(std::env::var("RUST_LOG").ok().as_deref());
    log4rs::init_config(fallback_config(level)?)?;
    log::debug!("{} not found, logging to stderr at {level}", path.display());
    Ok(())
}
