use std::path::Path;
use anyhow::{Context, Result};
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} | {h({l}):<5} | {t} | {m}{n}";

/// Console logging through env_logger, or console plus file through log4rs
/// when a log file is given. `RUST_LOG` still applies on the console-only path.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    match log_file {
        None => {
            env_logger::Builder::new()
                .filter_level(level)
                .parse_default_env()
                .try_init()
                .context("Failed to initialize console logging")?;
        }
        Some(path) => {
            let console = ConsoleAppender::builder()
                .target(Target::Stderr)
                .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
                .build();
            let file = FileAppender::builder()
                .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
                .build(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;

            let config = Config::builder()
                .appender(Appender::builder().build("console", Box::new(console)))
                .appender(Appender::builder().build("file", Box::new(file)))
                .build(Root::builder().appender("console").appender("file").build(level))
                .context("Invalid logging configuration")?;

            log4rs::init_config(config).context("Failed to initialize file logging")?;
        }
    }

    Ok(())
}
