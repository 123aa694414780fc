//! Diagnostics setup and chat logging to disk.
//!
//! When enabled, inbound PRIVMSG and NOTICE lines are appended to daily log
//! files named `<server>_<target>_<date>.log` in the configured log directory
//! (default: `~/.local/share/crabbot/logs/`).

use crate::app::event::Event;
use crate::config::LoggingConfig;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the
/// configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Writes chat lines to per-channel/query daily log files.
///
/// File handles are cached for the lifetime of the logger. A file that
/// cannot be opened is reported once and its lines are dropped.
pub struct ChatLogger {
    enabled: bool,
    server: String,
    log_dir: PathBuf,
    log_channels: bool,
    log_queries: bool,
    file_handles: HashMap<String, Option<fs::File>>,
}

impl ChatLogger {
    pub fn new(config: &LoggingConfig, server: &str) -> Self {
        Self {
            enabled: config.enabled,
            server: sanitize(server),
            log_dir: expand_home(&config.log_dir),
            log_channels: config.log_channels,
            log_queries: config.log_queries,
            file_handles: HashMap::new(),
        }
    }

    /// Append `event` to its target's log file. No-op if logging is disabled
    /// or the target type is not configured for logging.
    pub fn log(&mut self, event: &Event) {
        if !self.enabled {
            return;
        }
        let is_channel = event.channel.starts_with('#');
        if (is_channel && !self.log_channels) || (!is_channel && !self.log_queries) {
            return;
        }
        if event.channel.is_empty() {
            return;
        }

        let now = chrono::Local::now();
        let line = match event.command.as_str() {
            "NOTICE" => format!("[{}] -{}- {}", now.format("%H:%M:%S"), event.nick, event.txt),
            _ => format!("[{}] <{}> {}", now.format("%H:%M:%S"), event.nick, event.txt),
        };

        let filename = format!(
            "{}_{}_{}.log",
            self.server,
            sanitize(&event.channel),
            now.format("%Y-%m-%d")
        );
        let log_dir = &self.log_dir;
        let handle = self.file_handles.entry(filename.clone()).or_insert_with(|| {
            let _ = fs::create_dir_all(log_dir);
            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_dir.join(&filename))
            {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!(file = %filename, error = %e, "cannot open chat log");
                    None
                }
            }
        });

        if let Some(file) = handle {
            let _ = writeln!(file, "{}", line);
        }
    }
}

/// Cheap handle that hands chat lines to a [`ChatLogger`] running on the
/// blocking pool, so file I/O never stalls an async worker.
#[derive(Clone)]
pub struct ChatLog {
    tx: Option<mpsc::UnboundedSender<Event>>,
}

impl ChatLog {
    /// Start the writer. Must be called from inside a tokio runtime; the
    /// writer exits once every handle is dropped.
    pub fn spawn(mut logger: ChatLogger) -> Self {
        if !logger.enabled {
            return Self { tx: None };
        }
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        tokio::task::spawn_blocking(move || {
            while let Some(event) = rx.blocking_recv() {
                logger.log(&event);
            }
        });
        Self { tx: Some(tx) }
    }

    pub fn log(&self, event: &Event) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event.clone());
        }
    }
}

fn sanitize(target: &str) -> String {
    target
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn expand_home(dir: &str) -> PathBuf {
    match dir.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(dir)),
        None => PathBuf::from(dir),
    }
}
