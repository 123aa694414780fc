use crate::app::bus::Bus;
use crate::app::command::Table;
use crate::app::output::Pacer;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State shared by every handler and transport in the process.
///
/// `pacer` is the process-wide send lock: holding it serializes protocol
/// writes across all IRC connections and carries the shared send clock.
pub struct Kernel {
    pub bus: Bus,
    pub table: Table,
    pub pacer: tokio::sync::Mutex<Pacer>,
    pub workers: usize,
    pub started: Instant,
    pub version: String,
}

impl Kernel {
    pub fn new(table: Table, workers: usize, send_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            bus: Bus::new(),
            table,
            pacer: tokio::sync::Mutex::new(Pacer::new(send_interval)),
            workers: workers.max(1),
            started: Instant::now(),
            version: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        })
    }
}
