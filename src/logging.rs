use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{Level, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};
use uuid::Uuid;

use crate::content::{CultureSelection, PublishStatus};

const DEFAULT_MAX_LOG_ENTRIES: usize = 1024;
const LOG_FILE_PREFIX: &str = "webhook_logs";

pub type LogLevel = Level;

/// Something the webhook receiver reports while handling a call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    Received {
        token: String,
        secret_configured: bool,
    },
    Unauthorized,
    InvalidContentKey {
        raw: Option<String>,
    },
    ContentNotFound {
        key: Uuid,
    },
    PublishFailed {
        key: Uuid,
        status: PublishStatus,
    },
    Published {
        key: Uuid,
        property_alias: String,
        cultures: CultureSelection,
    },
    StoreFault {
        key: Option<Uuid>,
        message: String,
    },
}

impl fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebhookEvent::Received {
                token,
                secret_configured,
            } => write!(
                f,
                "Webhook called. Token: {}, SecretConfigured: {}",
                token, secret_configured
            ),
            WebhookEvent::Unauthorized => write!(f, "Unauthorized webhook call. Token mismatch."),
            WebhookEvent::InvalidContentKey { raw } => {
                write!(f, "Invalid ContentKey in configuration: {:?}", raw)
            }
            WebhookEvent::ContentNotFound { key } => write!(f, "Content not found for key {}", key),
            WebhookEvent::PublishFailed { key, status } => {
                write!(f, "Publish failed for content {}: {}", key, status)
            }
            WebhookEvent::Published {
                key,
                property_alias,
                cultures,
            } => write!(
                f,
                "Stored payload in '{}' and published content {} ({})",
                property_alias, key, cultures
            ),
            WebhookEvent::StoreFault { key, message } => match key {
                Some(key) => write!(f, "Content store fault for {}: {}", key, message),
                None => write!(f, "Content store fault: {}", message),
            },
        }
    }
}

/// Injected destination for receiver events
pub trait EventSink: Send + Sync {
    fn record(&self, level: LogLevel, event: &WebhookEvent);

    fn info(&self, event: WebhookEvent) {
        self.record(Level::INFO, &event);
    }

    fn warn(&self, event: WebhookEvent) {
        self.record(Level::WARN, &event);
    }

    fn error(&self, event: WebhookEvent) {
        self.record(Level::ERROR, &event);
    }
}

/// Forwards receiver events to the `tracing` subscriber
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, level: LogLevel, event: &WebhookEvent) {
        match level {
            Level::ERROR => error!(target: "webhook", "{}", event),
            Level::WARN => warn!(target: "webhook", "{}", event),
            _ => info!(target: "webhook", "{}", event),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub event: WebhookEvent,
}

/// Keeps the most recent receiver events in memory
#[derive(Clone)]
pub struct MemoryEventLog {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    max_entries: usize,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_LOG_ENTRIES)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            max_entries: max_entries.max(1),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn get_logs_by_level(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.level == level)
            .collect()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MemoryEventLog {
    fn record(&self, level: LogLevel, event: &WebhookEvent) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop the oldest entries once full
        while entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            timestamp: Utc::now(),
            level,
            event: event.clone(),
        });
    }
}

pub struct FileLogger {
    log_directory: PathBuf,
    rotation: Rotation,
}

impl FileLogger {
    pub fn new(log_directory: PathBuf) -> Self {
        Self {
            log_directory,
            rotation: Rotation::DAILY,
        }
    }

    pub fn setup_file_logging(
        &self,
    ) -> std::io::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
        // Ensure log directory exists
        std::fs::create_dir_all(&self.log_directory)?;

        let file_appender =
            RollingFileAppender::new(self.rotation.clone(), &self.log_directory, LOG_FILE_PREFIX);

        Ok(tracing_appender::non_blocking(file_appender))
    }
}

/// Install the global subscriber: console output plus, when given, a rolling file.
///
/// The returned guard flushes the file writer and must be held until exit.
pub fn setup_logging(file_logger: Option<&FileLogger>) -> std::io::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match file_logger {
        Some(file_logger) => {
            let (file_writer, guard) = file_logger.setup_file_logging()?;
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_fmt::layer()) // Console output
                .with(
                    tracing_fmt::layer()
                        .with_writer(file_writer)
                        .with_ansi(false), // Disable ANSI colors for file logs
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_fmt::layer())
                .init();
            Ok(None)
        }
    }
}
