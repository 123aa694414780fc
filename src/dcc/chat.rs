//! DCC CHAT side-channel.
//!
//! A private line-oriented socket to one peer. Every line the peer sends is
//! a command; replies go straight back over the socket without the shared
//! send throttle. Authorization happened before [`DccChat::connect`].

use crate::app::bus::Bot;
use crate::app::event::Event;
use crate::app::handler::Handler;
use crate::app::kernel::Kernel;
use crate::app::output::{EventSink, EventSource, Output};
use crate::dcc::parser::DccOffer;
use crate::error::TransportError;
use crate::irc::connection::{self, LineReader};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct DccChat {
    repr: String,
    nick: String,
    origin: String,
    handler: Arc<Handler>,
    output: Output,
    reader: Mutex<LineReader<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl DccChat {
    /// Connect to the peer that sent `offer`. `origin` is the sender's full
    /// `nick!user@host`.
    pub async fn connect(
        kernel: Arc<Kernel>,
        offer: &DccOffer,
        origin: &str,
        limit: Duration,
    ) -> Result<Arc<Self>, TransportError> {
        let (reader, writer) = connection::connect((offer.ip, offer.port), limit).await?;
        let nick = origin.split('!').next().unwrap_or(origin).to_string();
        let repr = format!("dcc/{}@{}:{}", nick, offer.ip, offer.port);
        info!(peer = %repr, "DCC chat connected");
        Ok(Arc::new(Self {
            handler: Handler::new(&repr, kernel),
            repr,
            nick,
            origin: origin.to_string(),
            output: Output::new(),
            reader: Mutex::new(reader),
            writer: Mutex::new(Some(writer)),
        }))
    }

    /// Run the chat until the peer hangs up, then deregister and close.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let chat = self.clone();
        tokio::spawn(async move {
            chat.handler.start();
            chat.handler.kernel().bus.add(chat.clone());
            let output = chat.output.start(chat.clone());
            chat.output.say(&chat.nick, &format!("Welcome {}", chat.nick));
            chat.handler.set_connected(true);

            let _ = chat.handler.spawn_input(chat.clone()).await;

            chat.handler.kernel().bus.remove(&chat.repr);
            chat.handler.stop();
            chat.output.stop();
            let _ = output.await;
            if let Some(mut writer) = chat.writer.lock().await.take() {
                let _ = writer.shutdown().await;
            }
            info!(peer = %chat.repr, "DCC chat closed");
        })
    }
}

#[async_trait]
impl EventSource for DccChat {
    async fn poll(&self) -> Option<Event> {
        let line = match self.reader.lock().await.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return None,
            Err(e) => {
                debug!(peer = %self.repr, error = %e, "DCC read failed");
                return None;
            }
        };
        let mut event = Event::command(&line);
        event.nick = self.nick.clone();
        event.origin = self.origin.clone();
        event.channel = self.nick.clone();
        event.orig = self.repr.clone();
        Some(event)
    }
}

#[async_trait]
impl EventSink for DccChat {
    async fn dosay(&self, _channel: &str, text: &str) {
        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return;
        };
        let line = format!("{}\n", text.trim_end_matches(['\r', '\n']));
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            debug!(peer = %self.repr, error = %e, "DCC write failed");
        }
    }
}

impl Bot for DccChat {
    fn repr(&self) -> &str {
        &self.repr
    }

    fn say(&self, channel: &str, text: &str) {
        self.output.say(channel, text);
    }

    fn announce(&self, text: &str) {
        self.output.say(&self.nick, text);
    }
}
