//! IRC transport: one server connection driven through a [`Handler`].
//!
//! The connection moves through [`Phase`]s from `Disconnected` to `Joined`.
//! Any read failure, server `ERROR` or missed keepalive tears the whole
//! connection down and builds it again after a short delay. Only
//! [`Irc::shutdown`] is terminal.

use crate::app::bus::Bot;
use crate::app::event::{Event, ERROR};
use crate::app::handler::Handler;
use crate::app::kernel::Kernel;
use crate::app::output::{EventSink, EventSource, Output};
use crate::config::{BotConfig, CtcpConfig, DccConfig, ServerConfig, TimingConfig};
use crate::dcc::chat::DccChat;
use crate::dcc::parser::parse_dcc_chat;
use crate::dcc::security::authorize;
use crate::irc::connection::{self, LineReader};
use crate::irc::parser::parsing;
use crate::irc::wrap::{wrap, WRAP_WIDTH};
use crate::logging::{ChatLog, ChatLogger};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Longest line body; the wire limit is 512 bytes including CRLF.
const MAX_LINE: usize = 510;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Connected,
    Registered,
    Joined,
    Error,
    Reconnecting,
}

/// Per-transport connection counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub nrconnect: u64,
    pub nrerror: u64,
    pub nrsend: u64,
}

struct State {
    nick: String,
    host: String,
    phase: Phase,
    pongcheck: bool,
    stats: Stats,
    last: Option<Instant>,
}

pub struct Irc {
    me: Weak<Irc>,
    repr: String,
    server: ServerConfig,
    timing: TimingConfig,
    dcc: DccConfig,
    ctcp: CtcpConfig,
    handler: Arc<Handler>,
    state: Mutex<State>,
    reader: tokio::sync::Mutex<Option<LineReader<OwnedReadHalf>>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    output: Output,
    stopped: AtomicBool,
    reconnecting: AtomicBool,
    terminated: AtomicBool,
    joined: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    keepers: Arc<AtomicUsize>,
    logger: ChatLog,
}

impl Irc {
    pub fn new(kernel: Arc<Kernel>, server: ServerConfig, config: &BotConfig) -> Arc<Self> {
        let repr = format!("irc/{}", server.name);
        Arc::new_cyclic(|me: &Weak<Irc>| {
            let handler = Handler::new(&repr, kernel);
            hook(&handler, me, "PRIVMSG", Irc::on_privmsg);
            hook(&handler, me, "NOTICE", Irc::on_notice);
            hook(&handler, me, "QUIT", Irc::on_quit);
            hook(&handler, me, "ERROR", Irc::on_error);
            hook(&handler, me, ERROR, Irc::on_error);
            let (joined, _) = watch::channel(false);
            Self {
                me: me.clone(),
                state: Mutex::new(State {
                    nick: server.nickname.clone(),
                    host: server.host.clone(),
                    phase: Phase::Disconnected,
                    pongcheck: false,
                    stats: Stats::default(),
                    last: None,
                }),
                logger: ChatLog::spawn(ChatLogger::new(&config.logging, &server.name)),
                repr,
                server,
                timing: config.timing.clone(),
                dcc: config.dcc.clone(),
                ctcp: config.ctcp.clone(),
                handler,
                reader: tokio::sync::Mutex::new(None),
                writer: tokio::sync::Mutex::new(None),
                output: Output::new(),
                stopped: AtomicBool::new(true),
                reconnecting: AtomicBool::new(false),
                terminated: AtomicBool::new(false),
                joined,
                tasks: Mutex::new(Vec::new()),
                keepers: Arc::new(AtomicUsize::new(0)),
            }
        })
    }

    pub fn handler(&self) -> &Arc<Handler> {
        &self.handler
    }

    pub fn nick(&self) -> String {
        self.state.lock().nick.clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn stats(&self) -> Stats {
        self.state.lock().stats
    }

    /// Time of the last PRIVMSG written to the server.
    pub fn last_send(&self) -> Option<Instant> {
        self.state.lock().last
    }

    /// Number of keepalive tasks currently alive.
    pub fn keepers(&self) -> usize {
        self.keepers.load(Ordering::SeqCst)
    }

    fn set_phase(&self, phase: Phase) {
        let mut state = self.state.lock();
        if state.phase != phase {
            debug!(irc = %self.repr, from = ?state.phase, to = ?phase, "phase");
            state.phase = phase;
        }
    }

    /// Connect, log on and wait for the channels to be joined.
    pub async fn start(self: &Arc<Self>) {
        if self.terminated.load(Ordering::SeqCst) {
            return;
        }
        self.stopped.store(false, Ordering::SeqCst);
        self.joined.send_replace(false);
        self.handler.start();
        self.handler.kernel().bus.add(self.clone());

        let connected = self.doconnect().await;
        // A running reconnect is done once its socket is up. Failures from
        // here on must be free to start the next one.
        self.reconnecting.store(false, Ordering::SeqCst);
        if !connected {
            return;
        }
        self.handler.set_connected(true);
        let tasks = vec![
            self.output.start(self.clone()),
            self.handler.spawn_input(self.clone()),
            self.keep(),
        ];
        self.tasks.lock().extend(tasks);
        self.logon().await;

        if !self.server.channels.is_empty() {
            let mut joined = self.joined.subscribe();
            let limit = self.timing.join_timeout();
            let in_time = tokio::time::timeout(limit, joined.wait_for(|j| *j))
                .await
                .is_ok();
            if !in_time {
                warn!(irc = %self.repr, secs = limit.as_secs(), "channels not joined in time");
            }
        }
    }

    /// Retry the TCP connect until it succeeds. `false` if stopped meanwhile.
    async fn doconnect(&self) -> bool {
        let addr = (self.server.host.as_str(), self.server.port);
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return false;
            }
            self.set_phase(Phase::Connecting);
            match connection::connect(addr, CONNECT_TIMEOUT).await {
                Ok((reader, writer)) => {
                    *self.reader.lock().await = Some(reader);
                    *self.writer.lock().await = Some(writer);
                    break;
                }
                Err(e) => {
                    warn!(irc = %self.repr, host = %self.server.host, error = %e, "connect failed");
                    tokio::time::sleep(self.timing.connect_retry()).await;
                }
            }
        }
        {
            let mut state = self.state.lock();
            state.stats.nrconnect += 1;
            state.nick = self.server.nickname.clone();
            state.host = self.server.host.clone();
            state.pongcheck = false;
        }
        self.set_phase(Phase::Connected);
        info!(irc = %self.repr, host = %self.server.host, port = self.server.port, "connected");
        true
    }

    async fn logon(&self) {
        let nick = self.nick();
        self.raw(&format!("NICK {}", nick)).await;
        self.raw(&format!(
            "USER {} {} {} :{}",
            self.server.username(),
            self.server.host,
            self.server.host,
            self.server.realname()
        ))
        .await;
        self.set_phase(Phase::Registered);
    }

    /// Tear the connection down. The handler keeps running so a later
    /// `start` can reuse it. Safe to call more than once.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.output.stop();
        self.handler.set_connected(false);
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task.abort();
            let _ = task.await;
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.reader.lock().await.take();
        self.handler.kernel().bus.remove(&self.repr);
        self.set_phase(Phase::Disconnected);
    }

    /// Rebuild the connection in the background. Ignored while a reconnect
    /// is already running or after [`shutdown`](Self::shutdown).
    pub fn reconnect(&self) {
        if self.terminated.load(Ordering::SeqCst) {
            return;
        }
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(irc) = self.me.upgrade() else {
            self.reconnecting.store(false, Ordering::SeqCst);
            return;
        };
        info!(irc = %self.repr, "reconnecting");
        self.set_phase(Phase::Reconnecting);
        tokio::spawn(async move {
            irc.stop().await;
            irc.set_phase(Phase::Reconnecting);
            tokio::time::sleep(irc.timing.reconnect_delay()).await;
            irc.start().await;
        });
    }

    /// Say goodbye and stop for good.
    pub async fn shutdown(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        let message = self
            .server
            .quit_message
            .clone()
            .unwrap_or_else(|| self.handler.kernel().version.clone());
        self.raw(&format!("QUIT :{}", message)).await;
        self.stop().await;
        self.handler.stop();
        info!(irc = %self.repr, "shut down");
    }

    /// Keepalive: PING the server every ping interval and reconnect when
    /// no PONG arrives in time.
    fn keep(self: &Arc<Self>) -> JoinHandle<()> {
        let irc = self.clone();
        let live = Keeper::new(self.keepers.clone());
        tokio::spawn(async move {
            let _live = live;
            loop {
                tokio::time::sleep(irc.timing.ping_interval()).await;
                let host = {
                    let mut state = irc.state.lock();
                    state.pongcheck = true;
                    state.host.clone()
                };
                irc.raw(&format!("PING {}", host)).await;
                tokio::time::sleep(irc.timing.pong_timeout()).await;
                let missed = irc.state.lock().pongcheck;
                if missed {
                    warn!(irc = %irc.repr, "no PONG from server");
                    irc.reconnect();
                    break;
                }
            }
        })
    }

    /// Write one protocol line. A failed write becomes an `error` event.
    pub async fn raw(&self, text: &str) {
        let line = frame(text);
        trace!(irc = %self.repr, ">> {}", line.trim_end());
        let mut writer = self.writer.lock().await;
        let Some(socket) = writer.as_mut() else {
            debug!(irc = %self.repr, "not connected, line dropped");
            return;
        };
        if let Err(e) = socket.write_all(line.as_bytes()).await {
            warn!(irc = %self.repr, error = %e, "write failed");
            *writer = None;
            self.handler.put(self.failure(&format!("write failed: {}", e)));
        }
    }

    /// An `error` event tagged with the current connection generation.
    fn failure(&self, reason: &str) -> Event {
        let (host, generation) = {
            let state = self.state.lock();
            (state.host.clone(), state.stats.nrconnect)
        };
        let mut event = Event::new(ERROR);
        event.command = ERROR.to_string();
        event.origin = host;
        event.orig = self.repr.clone();
        event.arguments = vec![generation.to_string()];
        event.txt = reason.to_string();
        event
    }

    /// Protocol bookkeeping done on the read path, before dispatch.
    async fn bookkeep(&self, event: &Event) {
        match event.command.as_str() {
            "PING" => {
                self.state.lock().pongcheck = true;
                self.raw(&format!("PONG :{}", event.txt)).await;
            }
            "PONG" => {
                self.state.lock().pongcheck = false;
            }
            "001" => {
                let nick = {
                    let mut state = self.state.lock();
                    if let Some(nick) = event.arguments.first() {
                        state.nick = nick.clone();
                    }
                    state.nick.clone()
                };
                self.set_phase(Phase::Registered);
                info!(irc = %self.repr, nick = %nick, "registered");
                if let Some(modes) = &self.server.modes {
                    self.raw(&format!("MODE {} {}", nick, modes)).await;
                }
                for channel in &self.server.channels {
                    self.raw(&format!("JOIN {}", channel)).await;
                }
            }
            "002" => {
                if let Some(host) = event.args.get(2) {
                    self.state.lock().host = host.trim_end_matches(',').to_string();
                }
            }
            "366" => {
                self.set_phase(Phase::Joined);
                self.joined.send_replace(true);
            }
            "ERROR" => {
                // Checked here so the hangup that follows cannot race it.
                if event.txt.to_lowercase().contains("kill") {
                    self.terminated.store(true, Ordering::SeqCst);
                }
            }
            "433" => {
                let nick = {
                    let mut state = self.state.lock();
                    state.nick.push('_');
                    state.nick.clone()
                };
                info!(irc = %self.repr, nick = %nick, "nickname in use, retrying");
                self.raw(&format!("NICK {}", nick)).await;
            }
            _ => {}
        }
    }

    async fn on_privmsg(self: Arc<Self>, event: Event) {
        self.logger.log(&event);
        let txt = event.txt.trim();
        if txt.starts_with("DCC CHAT") {
            self.dcc_chat(&event).await;
            return;
        }
        if txt == "VERSION" {
            if self.ctcp.reply_version {
                self.raw(&format!(
                    "NOTICE {} :\u{1}VERSION {}\u{1}",
                    event.nick, self.ctcp.version_string
                ))
                .await;
            }
            return;
        }
        let Some(text) = self.command_text(txt) else {
            return;
        };
        let mut command = Event::command(text);
        command.command = event.command.clone();
        command.origin = event.origin.clone();
        command.nick = event.nick.clone();
        command.channel = event.channel.clone();
        command.arguments = event.arguments.clone();
        command.orig = event.orig.clone();
        command.rawstr = event.rawstr.clone();
        self.handler.put(command);
    }

    /// Command text of a chat line, if the line is meant for the bot.
    fn command_text<'a>(&self, txt: &'a str) -> Option<&'a str> {
        let prefix = self.server.command_char.as_str();
        let text = if !prefix.is_empty() && txt.starts_with(prefix) {
            &txt[prefix.len()..]
        } else {
            let nick = self.nick();
            let rest = txt.strip_prefix(nick.as_str())?;
            rest.strip_prefix(':').or_else(|| rest.strip_prefix(','))?
        };
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    async fn dcc_chat(&self, event: &Event) {
        let Some(offer) = parse_dcc_chat(&event.txt) else {
            debug!(irc = %self.repr, txt = %event.txt, "malformed DCC offer");
            return;
        };
        if let Err(refusal) = authorize(&self.dcc, &event.origin, &offer.ip) {
            warn!(irc = %self.repr, reason = %refusal, "DCC chat refused");
            return;
        }
        match DccChat::connect(
            self.handler.kernel().clone(),
            &offer,
            &event.origin,
            self.dcc.connect_timeout(),
        )
        .await
        {
            Ok(chat) => {
                chat.start();
            }
            Err(e) => warn!(irc = %self.repr, nick = %event.nick, error = %e, "DCC connect failed"),
        }
    }

    async fn on_notice(self: Arc<Self>, event: Event) {
        self.logger.log(&event);
    }

    async fn on_quit(self: Arc<Self>, event: Event) {
        if event.nick == self.nick() {
            info!(irc = %self.repr, "own QUIT seen");
            self.reconnect();
        }
    }

    async fn on_error(self: Arc<Self>, event: Event) {
        if event.kind == ERROR {
            let current = self.state.lock().stats.nrconnect.to_string();
            if event.arguments.first() != Some(&current) {
                debug!(irc = %self.repr, txt = %event.txt, "stale error ignored");
                return;
            }
        }
        if self.reconnecting.load(Ordering::SeqCst) {
            debug!(irc = %self.repr, txt = %event.txt, "error during reconnect ignored");
            return;
        }
        self.state.lock().stats.nrerror += 1;
        self.set_phase(Phase::Error);
        if event.txt.to_lowercase().contains("kill") {
            info!(irc = %self.repr, txt = %event.txt, "killed by server, not reconnecting");
            return;
        }
        warn!(irc = %self.repr, txt = %event.txt, "connection error");
        self.reconnect();
    }
}

#[async_trait]
impl EventSource for Irc {
    async fn poll(&self) -> Option<Event> {
        let read = {
            let mut reader = self.reader.lock().await;
            let lines = reader.as_mut()?;
            let read = tokio::time::timeout(self.timing.read_timeout(), lines.next_line()).await;
            if !matches!(read, Ok(Ok(Some(_)))) {
                *reader = None;
            }
            read
        };
        let line = match read {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => return Some(self.failure("connection closed by server")),
            Ok(Err(e)) => return Some(self.failure(&format!("read failed: {}", e))),
            Err(_) => {
                let secs = self.timing.read_timeout().as_secs();
                return Some(self.failure(&format!("no data for {}s", secs)));
            }
        };
        trace!(irc = %self.repr, "<< {}", line);
        let host = self.state.lock().host.clone();
        let event = parsing(&line, &host, &self.repr);
        self.bookkeep(&event).await;
        Some(event)
    }
}

#[async_trait]
impl EventSink for Irc {
    /// Paced PRIVMSG delivery. Holding the kernel's pacer serializes sends
    /// across every connection in the process.
    async fn dosay(&self, channel: &str, text: &str) {
        let mut pacer = self.handler.kernel().pacer.lock().await;
        let text = text.replace(['\r', '\n'], " ");
        for chunk in wrap(&text, WRAP_WIDTH) {
            pacer.pace().await;
            {
                let mut state = self.state.lock();
                state.stats.nrsend += 1;
                state.last = Some(Instant::now());
            }
            self.raw(&format!("PRIVMSG {} :{}", channel, chunk)).await;
        }
    }
}

impl Bot for Irc {
    fn repr(&self) -> &str {
        &self.repr
    }

    fn say(&self, channel: &str, text: &str) {
        self.output.say(channel, text);
    }

    fn announce(&self, text: &str) {
        for channel in &self.server.channels {
            self.output.say(channel, text);
        }
    }
}

/// Register an [`Irc`] method as a handler callback. The transport is held
/// weakly so the handler does not keep it alive.
fn hook<F, Fut>(handler: &Handler, me: &Weak<Irc>, kind: &str, callback: F)
where
    F: Fn(Arc<Irc>, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let me = me.clone();
    handler.register(kind, move |_, event| {
        let run = me.upgrade().map(|irc| callback(irc, event));
        async move {
            if let Some(run) = run {
                run.await;
            }
        }
    });
}

/// Terminate `text` with CRLF, clipped to the wire limit on a char boundary.
fn frame(text: &str) -> String {
    let text = text.trim_end_matches(['\r', '\n']).replace(['\r', '\n'], " ");
    let mut end = text.len().min(MAX_LINE);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\r\n", &text[..end])
}

/// Counts itself in `keepers` for as long as it lives.
struct Keeper(Arc<AtomicUsize>);

impl Keeper {
    fn new(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for Keeper {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
