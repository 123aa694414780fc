//! Outgoing delivery queue, decoupled from the dispatch loop.
//!
//! [`Output::say`] only enqueues; a dedicated task drains the queue in FIFO
//! order into the transport's [`EventSink`]. Pacing of the actual writes is
//! the sink's business (see [`Pacer`]).

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Something that produces events, one per call.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Next event, or `None` once the source is exhausted.
    async fn poll(&self) -> Option<crate::app::event::Event>;
}

/// Something that writes text to a destination.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn dosay(&self, channel: &str, text: &str);
}

/// `None` is the stop sentinel.
type Item = Option<(String, String)>;

pub struct Output {
    tx: Mutex<Option<mpsc::UnboundedSender<Item>>>,
    stopped: AtomicBool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    pub fn new() -> Self {
        Self {
            tx: Mutex::new(None),
            stopped: AtomicBool::new(true),
        }
    }

    /// Open a fresh queue and spawn the task that drains it into `sink`.
    pub fn start(&self, sink: Arc<dyn EventSink>) -> JoinHandle<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tx.lock() = Some(tx);
        self.stopped.store(false, Ordering::SeqCst);
        tokio::spawn(output(rx, sink))
    }

    /// Enqueue `text` for `channel`. A no-op once stopped.
    pub fn say(&self, channel: &str, text: &str) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(Some((channel.to_string(), text.to_string())));
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(None);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

async fn output(mut rx: mpsc::UnboundedReceiver<Item>, sink: Arc<dyn EventSink>) {
    while let Some(Some((channel, text))) = rx.recv().await {
        sink.dosay(&channel, &text).await;
    }
    debug!("output queue drained");
}

/// Enforces a minimum spacing between consecutive sends.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Sleep until `interval` has passed since the previous send, then
    /// record this one.
    pub async fn pace(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        self.last = Some(Instant::now());
    }
}
