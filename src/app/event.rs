//! The routed unit of work flowing through a [`Handler`](super::handler::Handler).
//!
//! An [`Event`] is cheap to clone: every clone shares the same completion
//! signal, result buffer and worker list, so a caller can keep one copy and
//! [`wait`](Event::wait) on it while the dispatch path consumes another.

use crate::app::bus::Bus;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Event type used for command execution.
pub const CMD: &str = "cmd";
/// Event type used for transport failures.
pub const ERROR: &str = "error";

#[derive(Clone, Debug, Default)]
pub struct Event {
    /// Dispatch key: a protocol verb such as `PRIVMSG`, or `cmd`/`error`.
    pub kind: String,
    pub command: String,
    pub origin: String,
    pub nick: String,
    pub channel: String,
    pub txt: String,
    pub arguments: Vec<String>,
    /// Words of `txt` after the first one.
    pub args: Vec<String>,
    /// Text of `txt` after the first word.
    pub rest: String,
    /// Identity of the transport that produced the event.
    pub orig: String,
    pub rawstr: String,
    pub(crate) signal: Signal,
}

impl Event {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Self::default()
        }
    }

    /// Build a `cmd` event from a line of command text.
    pub fn command(text: &str) -> Self {
        let mut event = Self::new(CMD);
        event.set_text(text);
        event
    }

    /// Replace `txt` and recompute `args`/`rest` from it.
    pub fn set_text(&mut self, text: &str) {
        let text = text.trim();
        self.txt = text.to_string();
        self.args = text.split_whitespace().skip(1).map(String::from).collect();
        self.rest = text
            .split_once(char::is_whitespace)
            .map(|(_, rest)| rest.trim_start().to_string())
            .unwrap_or_default();
    }

    /// First word of `txt`, the command verb for `cmd` events.
    pub fn verb(&self) -> &str {
        self.txt.split_whitespace().next().unwrap_or("")
    }

    /// Append a line to the command result.
    pub fn reply(&self, text: impl Into<String>) {
        self.signal.inner.result.lock().push(text.into());
    }

    pub fn result(&self) -> Vec<String> {
        self.signal.inner.result.lock().clone()
    }

    /// Deliver the command result to the producing transport.
    pub fn show(&self, bus: &Bus) {
        for line in self.result() {
            bus.say(&self.orig, &self.channel, &line);
        }
    }

    /// Mark the event complete. Returns `false` if it already was.
    pub fn ready(&self) -> bool {
        self.signal.inner.done.send_if_modified(|done| {
            if *done {
                false
            } else {
                *done = true;
                true
            }
        })
    }

    pub fn is_ready(&self) -> bool {
        *self.signal.inner.done.borrow()
    }

    /// Block until [`ready`](Self::ready) fires, then join every worker that
    /// processed this event.
    pub async fn wait(&self) {
        let mut rx = self.signal.inner.done.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|done| *done).await;
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.signal.inner.workers.lock());
        for worker in workers {
            let _ = worker.await;
        }
    }

    pub(crate) fn track(&self, worker: JoinHandle<()>) {
        self.signal.inner.workers.lock().push(worker);
    }
}

/// Shared completion state of an event and all of its clones.
#[derive(Clone)]
pub(crate) struct Signal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    done: watch::Sender<bool>,
    result: Mutex<Vec<String>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for Signal {
    fn default() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(SignalInner {
                done,
                result: Mutex::new(Vec::new()),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("ready", &*self.inner.done.borrow())
            .finish()
    }
}

/// Marks an event ready when dropped, including during a panic unwind.
pub(crate) struct ReadyGuard(pub(crate) Event);

impl Drop for ReadyGuard {
    fn drop(&mut self) {
        self.0.ready();
    }
}
