/// Structured logging for the Ripple monitoring service
///
/// Backend for the `log` facade. Every line carries a UTC timestamp, the
/// level, and the component target (`ingest`, `alert`, `flush`, ...).
/// Supports console output and an optional append-only log file for daemon
/// operation, plus classification helpers for outbound HTTP failures.

use chrono::Utc;
use log::{LevelFilter, Log, Metadata, Record};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Service component, used as the `log` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Ingest,
    Mqtt,
    Buffer,
    Alert,
    Flush,
    Storage,
    Aggregate,
    Pipeline,
}

impl Component {
    pub fn target(self) -> &'static str {
        match self {
            Component::Ingest => "ingest",
            Component::Mqtt => "mqtt",
            Component::Buffer => "buffer",
            Component::Alert => "alert",
            Component::Flush => "flush",
            Component::Storage => "storage",
            Component::Aggregate => "aggregate",
            Component::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target())
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - nothing an operator needs to act on
    Expected,
    /// Unexpected failure - credentials, endpoint or payload misconfiguration
    Unexpected,
    /// Unknown - transient network or upstream trouble, may clear on its own
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classify an outbound HTTP failure (warning POST, snapshot upload, fetch)
/// from its error text.
pub fn classify_failure(error_message: &str) -> FailureType {
    // 4xx means our request is wrong: bad JWT, wrong endpoint, rejected body
    if error_message.contains("HTTP error: 4") {
        FailureType::Unexpected
    }
    // A response we could not understand suggests an API change
    else if error_message.contains("Parse error") {
        FailureType::Unexpected
    }
    // 5xx, timeouts and refused connections usually clear up
    else {
        FailureType::Unknown
    }
}

/// Log an outbound failure with automatic classification
pub fn log_failure(
    component: Component,
    subject: Option<&str>,
    operation: &str,
    err: &dyn std::error::Error,
) {
    let error_msg = err.to_string();
    let failure_type = classify_failure(&error_msg);
    let subject_part = subject.map(|s| format!("[{}] ", s)).unwrap_or_default();

    let message = format!("{}{} failed [{}]: {}", subject_part, operation, failure_type, error_msg);

    let target = component.target();
    match failure_type {
        FailureType::Expected => log::debug!(target: target, "{}", message),
        FailureType::Unexpected => log::error!(target: target, "{}", message),
        FailureType::Unknown => log::warn!(target: target, "{}", message),
    }
}

// ---------------------------------------------------------------------------
// Flush Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one flush cycle
pub fn log_flush_summary(total_records: usize, topics: &[String], peak_buffered: usize) {
    if total_records == 0 {
        log::debug!(target: "flush", "Flush complete: buffers were empty");
        return;
    }
    log::info!(
        target: "flush",
        "Flush complete: {} records across [{}], peak buffered {}",
        total_records,
        topics.join(", "),
        peak_buffered
    );
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

pub struct Logger {
    /// Minimum level to emit
    min_level: LevelFilter,
    /// Optional file path for logging
    log_file: Option<Mutex<std::fs::File>>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    pub fn new(min_level: LevelFilter, log_file: Option<&str>, console_timestamps: bool) -> std::io::Result<Self> {
        let log_file = match log_file {
            Some(path) => Some(Mutex::new(
                OpenOptions::new().create(true).append(true).open(path)?,
            )),
            None => None,
        };
        Ok(Logger {
            min_level,
            log_file,
            console_timestamps,
        })
    }

    fn format_entry(record: &Record) -> String {
        format!(
            "{} {:<5} {}: {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.min_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let entry = Self::format_entry(record);

        // Console output
        if self.console_timestamps {
            match record.level() {
                log::Level::Error | log::Level::Warn => eprintln!("{}", entry),
                _ => println!("{}", entry),
            }
        } else {
            match record.level() {
                log::Level::Error => eprintln!("   ✗ {}: {}", record.target(), record.args()),
                log::Level::Warn => eprintln!("   ⚠ {}: {}", record.target(), record.args()),
                _ => println!("   {}", record.args()),
            }
        }

        // File output
        if let Some(file) = &self.log_file {
            if let Ok(mut file) = file.lock() {
                if let Err(e) = writeln!(file, "{}", entry) {
                    eprintln!("Failed to write to log file: {}", e);
                }
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.log_file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Install the global logger. Later calls are ignored.
pub fn init_logger(min_level: LevelFilter, log_file: Option<&str>, console_timestamps: bool) -> std::io::Result<()> {
    let logger = Logger::new(min_level, log_file, console_timestamps)?;
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(min_level);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotifyError, UploadError};

    #[test]
    fn test_failure_classification() {
        let auth = UploadError::Http(401).to_string();
        assert_eq!(classify_failure(&auth), FailureType::Unexpected);

        let outage = NotifyError::Http(503).to_string();
        assert_eq!(classify_failure(&outage), FailureType::Unknown);

        let refused = NotifyError::Transport("connection refused".to_string()).to_string();
        assert_eq!(classify_failure(&refused), FailureType::Unknown);

        let garbled = UploadError::Parse("missing IpfsHash".to_string()).to_string();
        assert_eq!(classify_failure(&garbled), FailureType::Unexpected);
    }

    #[test]
    fn test_file_logger_appends_entries() {
        let path = std::env::temp_dir().join(format!("ripple_log_{}.log", std::process::id()));
        let path_str = path.to_str().unwrap();
        let logger = Logger::new(LevelFilter::Info, Some(path_str), true).unwrap();

        logger.log(
            &Record::builder()
                .args(format_args!("flush ok"))
                .level(log::Level::Info)
                .target("flush")
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("too chatty"))
                .level(log::Level::Debug)
                .target("flush")
                .build(),
        );
        logger.flush();

        let contents = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(contents.contains("INFO  flush: flush ok"));
        assert!(!contents.contains("too chatty"));
    }

    #[test]
    fn test_init_logger_installs_once() {
        // The global logger may already be set by another test; both calls
        // must still succeed.
        assert!(init_logger(LevelFilter::Warn, None, false).is_ok());
        assert!(init_logger(LevelFilter::Debug, None, true).is_ok());
        log::warn!(target: "pipeline", "logger installed");
    }
}
