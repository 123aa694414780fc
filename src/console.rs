//! Interactive console: one command per stdin line, results on stdout.

use crate::app::bus::Bot;
use crate::app::event::Event;
use crate::app::handler::Handler;
use crate::app::output::{EventSink, EventSource};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::debug;

pub const REPR: &str = "console";

pub struct Console<R> {
    lines: Mutex<Lines<BufReader<R>>>,
    stopped: AtomicBool,
}

impl Console<tokio::io::Stdin> {
    pub fn stdin() -> Arc<Self> {
        Self::new(tokio::io::stdin())
    }
}

impl<R: AsyncRead + Unpin + Send + 'static> Console<R> {
    pub fn new(input: R) -> Arc<Self> {
        Arc::new(Self {
            lines: Mutex::new(BufReader::new(input).lines()),
            stopped: AtomicBool::new(false),
        })
    }

    /// Run commands until `exit`, `quit` or end of input. `handler` must be
    /// named [`REPR`] so results find their way back here.
    pub async fn run(self: &Arc<Self>, handler: &Arc<Handler>) {
        handler.kernel().bus.add(self.clone());
        while let Some(event) = self.poll().await {
            if matches!(event.verb(), "exit" | "quit") {
                break;
            }
            handler.once(&event.txt).await;
        }
        self.stopped.store(true, Ordering::SeqCst);
        handler.kernel().bus.remove(REPR);
        debug!("console closed");
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send + 'static> EventSource for Console<R> {
    async fn poll(&self) -> Option<Event> {
        loop {
            let line = self.lines.lock().await.next_line().await.ok()??;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut event = Event::command(line);
            event.orig = REPR.to_string();
            return Some(event);
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send + 'static> EventSink for Console<R> {
    async fn dosay(&self, channel: &str, text: &str) {
        self.say(channel, text);
    }
}

impl<R: AsyncRead + Unpin + Send + 'static> Bot for Console<R> {
    fn repr(&self) -> &str {
        REPR
    }

    fn say(&self, _channel: &str, text: &str) {
        if !self.stopped.load(Ordering::SeqCst) {
            println!("{}", text);
        }
    }

    fn announce(&self, text: &str) {
        self.say("", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::command::tests::EchoLoader;
    use crate::app::command::Table;
    use crate::app::kernel::Kernel;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn lines_run_until_quit() {
        let (loader, _) = EchoLoader::new();
        let kernel = Kernel::new(Table::new(loader), 2, Duration::ZERO);
        let handler = Handler::new(REPR, kernel.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        handler.add_command("note", move |_, event| {
            log.lock().push(event.rest.clone());
            Ok(())
        });

        let input: &'static [u8] = b"note one\n\n  note two  \nquit\nnote three\n";
        let console = Console::new(input);
        console.run(&handler).await;

        assert_eq!(*seen.lock(), vec!["one", "two"]);
        assert_eq!(kernel.bus.len(), 0);
    }

    #[tokio::test]
    async fn end_of_input_ends_the_session() {
        let input: &'static [u8] = b"anything\n";
        let console = Console::new(input);
        assert_eq!(console.poll().await.map(|e| e.txt), Some("anything".to_string()));
        assert!(console.poll().await.is_none());
    }
}
