//! Logging to the terminal and to the session log file
//!
//! The terminal and the file are two separate outputs with their own verbosity, so that a bench
//! run can keep the terminal readable while the file holds the full record of the session.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use log::{self, info};
use colored::{ColoredString, Colorize};
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Verbosity of each log output.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLevels {
    /// Terminal output, must let `INFO` through
    pub console: LevelFilter,

    /// Session log file
    pub file: LevelFilter,

    /// Per-target overrides applied to both outputs
    pub targets: Vec<(String, LevelFilter)>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("The console must show `INFO` messages, found the level `{0}`")]
    QuietConsole(LevelFilter),

    #[error("Cannot open the session log file: {0}")]
    LogFile(std::io::Error),

    #[error("Cannot install the logger: {0}")]
    Install(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl LogLevels {
    /// The same level on both outputs.
    pub fn new(level: LevelFilter) -> Self {
        Self {
            console: level,
            file: level,
            targets: Vec::new()
        }
    }

    /// Override the level of one target, such as a chatty link module.
    pub fn with_target<T: Into<String>>(mut self, target: T, level: LevelFilter) -> Self {
        self.targets.push((target.into(), level));
        self
    }

    /// The most verbose level any output accepts.
    pub fn max_level(&self) -> LevelFilter {
        self.console.max(self.file)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Install the logger for this process, writing to stdout and to the session log file.
///
/// Must only be called once.
pub fn logger_init(
    levels: &LogLevels,
    session: &session::Session
) -> Result<(), LoggerInitError> {

    if levels.console < log::Level::Info {
        return Err(LoggerInitError::QuietConsole(levels.console))
    }

    let log_file = fern::log_file(&session.log_file_path)
        .map_err(LoggerInitError::LogFile)?;

    let console = fern::Dispatch::new()
        .format(|out, message, record| {
            if record.level() > log::Level::Info {
                out.finish(format_args!(
                    "[{:10.6} {}] {}: {}",
                    session::get_elapsed_seconds(),
                    level_tag(record.level()),
                    record.target(),
                    message
                ))
            }
            else {
                out.finish(format_args!(
                    "[{:10.6} {}] {}",
                    session::get_elapsed_seconds(),
                    level_tag(record.level()),
                    message
                ))
            }
        })
        .level(levels.console)
        .chain(std::io::stdout());

    // No colour codes in the file
    let file = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{:.6} {:<5} {}: {}",
                session::get_elapsed_seconds(),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(levels.file)
        .chain(log_file);

    let mut root = fern::Dispatch::new().level(levels.max_level());
    for (target, level) in &levels.targets {
        root = root.level_for(target.clone(), *level);
    }

    root.chain(console)
        .chain(file)
        .apply()
        .map_err(LoggerInitError::Install)?;

    info!("Session {:?}", session.session_root);
    info!("    Started {}", session::get_epoch().format("%Y-%m-%d %H:%M:%S UTC"));
    info!("    Console level {}, file level {}", levels.console, levels.file);
    info!("    Log file {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn level_tag(level: log::Level) -> ColoredString {
    match level {
        log::Level::Trace => "TRC".dimmed().italic(),
        log::Level::Debug => "DBG".dimmed(),
        log::Level::Info  => "INF".normal(),
        log::Level::Warn  => "WRN".yellow(),
        log::Level::Error => "ERR".red().bold()
    }
}
