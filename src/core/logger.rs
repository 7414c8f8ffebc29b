// Quickbar - Systemd-Style Logger
// Copyright (C) 2025 Akaere Networks
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Systemd-style logging for the launcher
//!
//! stdout belongs to the launcher front end, so log lines go to stderr or,
//! with `--log-file`, are appended to a file. Startup steps are reported as
//! `[   OK   ]` / `[  FAILED ]` / `[   WARN ]` status lines. The global logger
//! is callable from any thread, including plugin background tasks.

use std::fs::{ File, OpenOptions };
use std::io::{ self, Write };
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;

const RESET: &str = "\x1b[0m";

/// Log levels, numbered as systemd priorities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl LogLevel {
    pub fn priority(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Emergency => "EMERG",
            LogLevel::Alert => "ALERT",
            LogLevel::Critical => "CRIT",
            LogLevel::Error => "ERR",
            LogLevel::Warning => "WARNING",
            LogLevel::Notice => "NOTICE",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    fn color(self) -> &'static str {
        match self {
            LogLevel::Emergency => "\x1b[1;41m",
            LogLevel::Alert => "\x1b[1;91m",
            LogLevel::Critical => "\x1b[1;31m",
            LogLevel::Error => "\x1b[31m",
            LogLevel::Warning => "\x1b[33m",
            LogLevel::Notice => "\x1b[36m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Debug => "\x1b[37m",
        }
    }
}

/// Outcome of a startup step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Failed,
    Warn,
}

impl Status {
    fn marker(self) -> &'static str {
        match self {
            Status::Ok => "[   OK   ]",
            Status::Failed => "[  FAILED ]",
            Status::Warn => "[   WARN ]",
        }
    }

    fn level(self) -> LogLevel {
        match self {
            Status::Ok => LogLevel::Info,
            Status::Failed => LogLevel::Error,
            Status::Warn => LogLevel::Warning,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    pub use_colors: bool,
    pub include_timestamp: bool,
    /// Append the emitting module path to each line
    pub include_target: bool,
    /// Append to this file instead of writing to stderr
    pub log_file: Option<PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Warning,
            use_colors: atty::is(atty::Stream::Stderr),
            include_timestamp: true,
            include_target: false,
            log_file: None,
        }
    }
}

static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

#[derive(Debug)]
enum Sink {
    Stderr,
    File(File),
}

impl Sink {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self {
            Sink::Stderr => writeln!(io::stderr().lock(), "{}", line),
            Sink::File(file) => writeln!(file, "{}", line),
        }
    }
}

#[derive(Debug)]
pub struct Logger {
    config: LoggerConfig,
    sink: Mutex<Sink>,
}

impl Logger {
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        let sink = match &config.log_file {
            Some(path) =>
                Sink::File(
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                        .map_err(|e| LoggerError::OpenFile(path.clone(), e))?
                ),
            None => Sink::Stderr,
        };

        Ok(Self { config, sink: Mutex::new(sink) })
    }

    /// Install `config` as the process-wide logger
    pub fn init(config: LoggerConfig) -> Result<(), LoggerError> {
        let logger = Self::new(config)?;

        let mut global = LOGGER.lock().map_err(|_| LoggerError::Poisoned)?;
        if global.is_some() {
            return Err(LoggerError::AlreadyInitialized);
        }
        *global = Some(logger);
        Ok(())
    }

    pub fn should_log(&self, level: LogLevel) -> bool {
        level <= self.config.min_level
    }

    pub fn log(&self, level: LogLevel, target: &str, message: &str) {
        if !self.should_log(level) {
            return;
        }

        let line = self.format_line(level, target, message);
        if let Ok(mut sink) = self.sink.lock() {
            // Nowhere left to report a failing sink
            let _ = sink.write_line(&line);
        }
    }

    fn colorize(&self) -> bool {
        self.config.use_colors && self.config.log_file.is_none()
    }

    fn format_line(&self, level: LogLevel, target: &str, message: &str) -> String {
        let mut line = String::new();

        if self.config.include_timestamp {
            line.push_str(&Local::now().format("%Y-%m-%d %H:%M:%S ").to_string());
        }

        let (tag, body) = match status_of(message) {
            Some(status) => (status.marker().to_string(), &message[status.marker().len()..]),
            None => (format!("[{}]", level.label()), message),
        };
        let color = status_of(message).map_or(level.color(), |status| status.level().color());

        if self.colorize() {
            line.push_str(&format!("{}{}{}", color, tag, RESET));
        } else {
            line.push_str(&tag);
        }
        if !body.is_empty() {
            if !body.starts_with(' ') {
                line.push(' ');
            }
            line.push_str(body);
        }

        if self.config.include_target && !target.is_empty() {
            line.push_str(&format!(" ({})", target));
        }

        line
    }
}

fn status_of(message: &str) -> Option<Status> {
    [Status::Ok, Status::Failed, Status::Warn]
        .into_iter()
        .find(|status| message.starts_with(status.marker()))
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::core::logger::log_with_level($crate::core::logger::LogLevel::Error, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::core::logger::log_with_level($crate::core::logger::LogLevel::Warning, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_notice {
    ($($arg:tt)*) => {
        $crate::core::logger::log_with_level($crate::core::logger::LogLevel::Notice, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::core::logger::log_with_level($crate::core::logger::LogLevel::Info, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::core::logger::log_with_level($crate::core::logger::LogLevel::Debug, module_path!(), &format!($($arg)*))
    };
}

/// Route a message to the global logger; a no-op before [`Logger::init`]
pub fn log_with_level(level: LogLevel, target: &str, message: &str) {
    if let Ok(global) = LOGGER.lock() {
        if let Some(logger) = global.as_ref() {
            logger.log(level, target, message);
        }
    }
}

/// Report the outcome of a startup step
pub fn log_status(status: Status, step: &str, detail: Option<&str>) {
    let message = match (status, detail) {
        (_, None) => format!("{} Starting {}", status.marker(), step),
        (Status::Ok, Some(detail)) => format!("{} Starting {} ({})", status.marker(), step, detail),
        (_, Some(detail)) => format!("{} Starting {} - {}", status.marker(), step, detail),
    };
    log_with_level(status.level(), module_path!(), &message);
}

#[macro_export]
macro_rules! log_init_ok {
    ($step:expr) => {
        $crate::core::logger::log_status($crate::core::logger::Status::Ok, $step, None)
    };
}

#[macro_export]
macro_rules! log_init_ok_with_details {
    ($step:expr, $details:expr) => {
        $crate::core::logger::log_status($crate::core::logger::Status::Ok, $step, Some::<&str>($details))
    };
}

#[macro_export]
macro_rules! log_init_failed {
    ($step:expr, $error:expr) => {
        $crate::core::logger::log_status($crate::core::logger::Status::Failed, $step, Some::<&str>($error))
    };
}

#[macro_export]
macro_rules! log_init_warn {
    ($step:expr, $warning:expr) => {
        $crate::core::logger::log_status($crate::core::logger::Status::Warn, $step, Some::<&str>($warning))
    };
}

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("Logger already initialized")]
    AlreadyInitialized,
    #[error("Logger lock poisoned")]
    Poisoned,
    #[error("Failed to open log file {0:?}: {1}")]
    OpenFile(PathBuf, #[source] std::io::Error),
}

/// Build the global logger from the command line switches
///
/// Default threshold is `Warning`; `--verbose` lowers it to `Info` and
/// `--debug` to `Debug` (with module paths).
pub fn init_from_args(debug: bool, verbose: bool, log_file: Option<PathBuf>, no_color: bool) -> Result<(), LoggerError> {
    let min_level = match (debug, verbose) {
        (true, _) => LogLevel::Debug,
        (false, true) => LogLevel::Info,
        (false, false) => LogLevel::Warning,
    };

    Logger::init(LoggerConfig {
        min_level,
        use_colors: !no_color && atty::is(atty::Stream::Stderr),
        include_timestamp: true,
        include_target: debug,
        log_file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_logger(path: PathBuf, min_level: LogLevel) -> Logger {
        Logger::new(LoggerConfig {
            min_level,
            use_colors: true,
            include_timestamp: false,
            include_target: false,
            log_file: Some(path),
        }).unwrap()
    }

    #[test]
    fn test_levels_follow_systemd_priorities() {
        assert_eq!(LogLevel::Error.priority(), 3);
        assert_eq!(LogLevel::Debug.priority(), 7);
        assert!(LogLevel::Warning < LogLevel::Info);
    }

    #[test]
    fn test_threshold_filtering() {
        let temp_dir = TempDir::new().unwrap();
        let logger = file_logger(temp_dir.path().join("q.log"), LogLevel::Warning);

        assert!(logger.should_log(LogLevel::Error));
        assert!(logger.should_log(LogLevel::Warning));
        assert!(!logger.should_log(LogLevel::Info));
    }

    #[test]
    fn test_file_sink_is_plain_text() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("quickbar.log");
        let logger = file_logger(path.clone(), LogLevel::Info);

        logger.log(LogLevel::Warning, "test", "plugin skipped");
        logger.log(LogLevel::Debug, "test", "filtered out");
        logger.log(LogLevel::Info, "test", "[   OK   ] Starting registry");

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "[WARNING] plugin skipped\n[   OK   ] Starting registry\n");
    }

    #[test]
    fn test_status_detection() {
        assert_eq!(status_of("[  FAILED ] Starting x - boom"), Some(Status::Failed));
        assert_eq!(status_of("[   WARN ] Starting x"), Some(Status::Warn));
        assert_eq!(status_of("plain"), None);
    }

    #[test]
    fn test_missing_log_directory_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = LoggerConfig {
            log_file: Some(temp_dir.path().join("missing").join("q.log")),
            ..Default::default()
        };
        assert!(matches!(Logger::new(config), Err(LoggerError::OpenFile(..))));
    }
}
