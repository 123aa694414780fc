//! Dispatch core: a queue-driven event loop that maps an event's `kind` to a
//! registered callback and runs it on a bounded pool of worker tasks.
//!
//! Lifecycle is `created -> started -> stopped`. A stopped handler is not
//! restarted; build a new one instead.

use crate::app::command::Command;
use crate::app::event::{Event, ReadyGuard, CMD};
use crate::app::kernel::Kernel;
use crate::app::output::EventSource;
use crate::error::{CommandError, LoadError};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type Callback = Arc<dyn Fn(Arc<Handler>, Event) -> BoxFuture<'static, ()> + Send + Sync>;

/// `None` is the poison value that ends the loop.
type Slot = Option<Event>;

pub struct Handler {
    name: String,
    kernel: Arc<Kernel>,
    callbacks: RwLock<HashMap<String, Callback>>,
    cmds: RwLock<HashMap<String, Command>>,
    queue: mpsc::UnboundedSender<Slot>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<Slot>>>,
    pool: Arc<Semaphore>,
    stopped: AtomicBool,
    connected: watch::Sender<bool>,
}

impl Handler {
    pub fn new(name: &str, kernel: Arc<Kernel>) -> Arc<Self> {
        let (queue, inbox) = mpsc::unbounded_channel();
        let (connected, _) = watch::channel(false);
        let handler = Arc::new(Self {
            name: name.to_string(),
            pool: Arc::new(Semaphore::new(kernel.workers)),
            kernel,
            callbacks: RwLock::new(HashMap::new()),
            cmds: RwLock::new(HashMap::new()),
            queue,
            inbox: Mutex::new(Some(inbox)),
            stopped: AtomicBool::new(false),
            connected,
        });
        handler.register(CMD, cmd);
        handler
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Bind `callback` to events of `kind`. Last writer wins.
    pub fn register<F, Fut>(&self, kind: &str, callback: F)
    where
        F: Fn(Arc<Handler>, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: Callback = Arc::new(move |handler, event| callback(handler, event).boxed());
        self.callbacks.write().insert(kind.to_string(), callback);
    }

    /// Register a command directly on this handler, bypassing module loading.
    pub fn add_command<F>(&self, verb: &str, func: F)
    where
        F: Fn(&Handler, &Event) -> Result<(), CommandError> + Send + Sync + 'static,
    {
        self.cmds.write().insert(verb.to_string(), Arc::new(func));
    }

    /// Enqueue an event. The queue is unbounded, so this never blocks or
    /// rejects; running out of memory here is fatal to the process.
    pub fn put(&self, event: Event) {
        if self.queue.send(Some(event)).is_err() {
            debug!(handler = %self.name, "event dropped, handler loop has exited");
        }
    }

    /// Spawn the dispatch loop. Calling this again is a no-op.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let inbox = self.inbox.lock().take()?;
        Some(tokio::spawn(self.clone().handle_loop(inbox)))
    }

    /// Enqueue the poison value. Safe to call more than once.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.set_connected(false);
            let _ = self.queue.send(None);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.send_replace(connected);
    }

    pub async fn wait_connected(&self) {
        let mut rx = self.connected.subscribe();
        let _ = rx.wait_for(|connected| *connected).await;
    }

    async fn handle_loop(self: Arc<Self>, mut inbox: mpsc::UnboundedReceiver<Slot>) {
        debug!(handler = %self.name, "dispatch loop started");
        while let Some(Some(mut event)) = inbox.recv().await {
            if event.orig.is_empty() {
                event.orig = self.name.clone();
            }
            // Waiting for a permit here keeps spawn order FIFO.
            let Ok(permit) = self.pool.clone().acquire_owned().await else {
                break;
            };
            let handler = self.clone();
            let worker = event.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let _ready = ReadyGuard(worker.clone());
                handler.dispatch(worker).await;
            });
            event.track(handle);
        }
        debug!(handler = %self.name, "dispatch loop stopped");
    }

    /// Run the callback registered for `event.kind`, if any.
    pub async fn dispatch(self: &Arc<Self>, event: Event) {
        let callback = self.callbacks.read().get(&event.kind).cloned();
        match callback {
            Some(callback) => callback(self.clone(), event).await,
            None => debug!(handler = %self.name, kind = %event.kind, "no callback"),
        }
    }

    /// Resolve a command verb, loading its owning module on first use.
    /// `Ok(None)` means the verb is unknown.
    pub async fn getcmd(&self, verb: &str) -> Result<Option<Command>, LoadError> {
        let local = self.cmds.read().get(verb).cloned();
        if local.is_some() {
            return Ok(local);
        }
        let Some(owner) = self.kernel.table.owner(verb) else {
            return Ok(None);
        };
        let module = self.kernel.table.load(&owner).await?;
        let mut cmds = self.cmds.write();
        for (name, func) in &module.commands {
            cmds.entry(name.clone()).or_insert_with(|| func.clone());
        }
        Ok(cmds.get(verb).cloned())
    }

    /// Run one command line synchronously, bypassing the queue.
    pub async fn once(self: &Arc<Self>, text: &str) -> Event {
        self.set_connected(true);
        let mut event = Event::command(text);
        event.orig = self.name.clone();
        cmd(self.clone(), event.clone()).await;
        event.wait().await;
        event
    }

    /// Feed events from `source` into the queue once the handler is
    /// connected, until the source runs dry.
    pub fn spawn_input(self: &Arc<Self>, source: Arc<dyn EventSource>) -> JoinHandle<()> {
        let handler = self.clone();
        tokio::spawn(async move {
            handler.wait_connected().await;
            while let Some(event) = source.poll().await {
                handler.put(event);
            }
            debug!(handler = %handler.name, "input exhausted");
        })
    }
}

/// Default `cmd` callback: resolve the verb, run it, show the result and
/// always mark the event ready.
pub async fn cmd(handler: Arc<Handler>, event: Event) {
    let verb = event.verb().to_string();
    match handler.getcmd(&verb).await {
        Ok(Some(func)) => {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| func(&*handler, &event)))
                .unwrap_or_else(|panic| Err(CommandError::Panicked(panic_message(&*panic))));
            match outcome {
                Ok(()) => {}
                Err(e @ CommandError::Usage(_)) => event.reply(e.to_string()),
                Err(e) => warn!(verb = %verb, error = %e, "command failed"),
            }
            event.show(&handler.kernel.bus);
        }
        Ok(None) => debug!(verb = %verb, "unknown command"),
        Err(e) => warn!(verb = %verb, error = %e, "command module unavailable"),
    }
    event.ready();
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::bus::tests::Recorder;
    use crate::app::command::tests::EchoLoader;
    use crate::app::command::Table;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn kernel(workers: usize) -> (Arc<Kernel>, Arc<AtomicUsize>) {
        let (loader, loads) = EchoLoader::new();
        (
            Kernel::new(Table::new(loader), workers, Duration::ZERO),
            loads,
        )
    }

    #[tokio::test]
    async fn events_are_dispatched_in_fifo_order() {
        let (kernel, _) = kernel(1);
        let handler = Handler::new("fifo", kernel);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        handler.register("test", move |_, event| {
            let log = log.clone();
            async move {
                log.lock().push(event.txt.clone());
            }
        });
        handler.start();

        let events: Vec<Event> = ["e1", "e2", "e3"]
            .iter()
            .map(|txt| {
                let mut event = Event::new("test");
                event.txt = txt.to_string();
                event
            })
            .collect();
        for event in &events {
            handler.put(event.clone());
        }
        for event in &events {
            tokio::time::timeout(Duration::from_secs(2), event.wait())
                .await
                .unwrap();
        }

        assert_eq!(*seen.lock(), vec!["e1", "e2", "e3"]);
        handler.stop();
    }

    #[tokio::test]
    async fn loop_stamps_orig_and_marks_unhandled_events_ready() {
        let (kernel, _) = kernel(4);
        let handler = Handler::new("stamp", kernel);
        let orig = Arc::new(Mutex::new(String::new()));
        let seen = orig.clone();
        handler.register("test", move |_, event| {
            let seen = seen.clone();
            async move {
                *seen.lock() = event.orig.clone();
            }
        });
        handler.start();

        let handled = Event::new("test");
        let unhandled = Event::new("nobody-listens");
        handler.put(handled.clone());
        handler.put(unhandled.clone());
        handled.wait().await;
        unhandled.wait().await;

        assert_eq!(*orig.lock(), "stamp");
        assert!(unhandled.is_ready());
    }

    #[tokio::test]
    async fn once_runs_a_lazily_loaded_command() {
        let (kernel, loads) = kernel(4);
        let handler = Handler::new("console", kernel.clone());
        let console = Recorder::new("console", &[]);
        kernel.bus.add(console.clone());

        let event = handler.once("echo hello there").await;

        assert!(event.is_ready());
        assert_eq!(event.result(), vec!["hello there"]);
        assert_eq!(console.said.lock()[0].1, "hello there");

        // A second handler shares the module cache.
        let other = Handler::new("other", kernel);
        other.once("echo again").await;
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_and_failing_commands_still_complete() {
        let (kernel, _) = kernel(4);
        let handler = Handler::new("h", kernel);

        let unknown = handler.once("nosuchverb").await;
        assert!(unknown.result().is_empty());

        let panicked = handler.once("boom").await;
        assert!(panicked.is_ready());
        assert!(panicked.result().is_empty());

        let failed = handler.once("fail").await;
        assert!(failed.is_ready());
        assert_eq!(failed.result(), vec!["usage: fail <nothing>"]);
    }

    #[tokio::test]
    async fn queued_commands_unblock_waiters() {
        let (kernel, _) = kernel(4);
        let handler = Handler::new("queued", kernel);
        handler.start();

        let event = Event::command("echo via queue");
        handler.put(event.clone());
        tokio::time::timeout(Duration::from_secs(2), event.wait())
            .await
            .unwrap();

        assert_eq!(event.result(), vec!["via queue"]);
    }

    #[tokio::test]
    async fn missing_module_is_a_typed_error() {
        let (kernel, _) = kernel(4);
        let handler = Handler::new("h", kernel);

        assert!(handler.getcmd("nosuchverb").await.unwrap().is_none());
        assert!(matches!(
            handler.getcmd("ghost").await,
            Err(LoadError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn instance_commands_take_precedence() {
        let (kernel, _) = kernel(4);
        let handler = Handler::new("h", kernel);
        handler.add_command("echo", |_, event| {
            event.reply("local");
            Ok(())
        });

        let event = handler.once("echo x").await;
        assert_eq!(event.result(), vec!["local"]);
    }

    #[tokio::test]
    async fn stop_twice_does_not_hang() {
        let (kernel, _) = kernel(4);
        let handler = Handler::new("h", kernel);
        let task = handler.start().unwrap();
        assert!(handler.start().is_none());

        handler.stop();
        handler.stop();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        assert!(handler.is_stopped());
        handler.put(Event::new("late"));
    }
}
