//! Fan-out registry of live bots.
//!
//! Members are added when their transport starts and removed when it stops,
//! so a long-running process does not accumulate dead entries.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// A running transport that can receive output.
pub trait Bot: Send + Sync {
    /// Unique identity, matched against [`Event::orig`](super::event::Event).
    fn repr(&self) -> &str;

    /// Queue `text` for delivery to `channel`. Never blocks.
    fn say(&self, channel: &str, text: &str);

    /// Deliver `text` to every channel this bot sits in.
    fn announce(&self, text: &str);
}

#[derive(Default)]
pub struct Bus {
    bots: RwLock<Vec<Arc<dyn Bot>>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bot. A bot with the same `repr` is replaced.
    pub fn add(&self, bot: Arc<dyn Bot>) {
        let mut bots = self.bots.write();
        bots.retain(|b| b.repr() != bot.repr());
        debug!(bot = %bot.repr(), "added to bus");
        bots.push(bot);
    }

    pub fn remove(&self, repr: &str) {
        let mut bots = self.bots.write();
        let before = bots.len();
        bots.retain(|b| b.repr() != repr);
        if bots.len() != before {
            debug!(bot = %repr, "removed from bus");
        }
    }

    pub fn announce(&self, text: &str) {
        for bot in self.snapshot() {
            bot.announce(text);
        }
    }

    /// Route output to the bot whose `repr` equals `orig`.
    pub fn say(&self, orig: &str, channel: &str, text: &str) {
        match self.snapshot().into_iter().find(|b| b.repr() == orig) {
            Some(bot) => bot.say(channel, text),
            None => debug!(orig = %orig, "no bot on the bus for output"),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.bots.read().iter().map(|b| b.repr().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.bots.read().len()
    }

    // Callers run outside the lock so a bot may touch the bus from `say`.
    fn snapshot(&self) -> Vec<Arc<dyn Bot>> {
        self.bots.read().clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records everything said to it.
    pub(crate) struct Recorder {
        pub(crate) name: String,
        pub(crate) channels: Vec<String>,
        pub(crate) said: Mutex<Vec<(String, String)>>,
    }

    impl Recorder {
        pub(crate) fn new(name: &str, channels: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                channels: channels.iter().map(|c| c.to_string()).collect(),
                said: Mutex::new(Vec::new()),
            })
        }
    }

    impl Bot for Recorder {
        fn repr(&self) -> &str {
            &self.name
        }

        fn say(&self, channel: &str, text: &str) {
            self.said.lock().push((channel.to_string(), text.to_string()));
        }

        fn announce(&self, text: &str) {
            for channel in &self.channels {
                self.say(channel, text);
            }
        }
    }

    #[test]
    fn announce_reaches_every_channel_of_every_bot() {
        let bus = Bus::new();
        let a = Recorder::new("a", &["#one", "#two"]);
        let b = Recorder::new("b", &["#three"]);
        bus.add(a.clone());
        bus.add(b.clone());

        bus.announce("hello");

        assert_eq!(a.said.lock().len(), 2);
        assert_eq!(b.said.lock()[0], ("#three".to_string(), "hello".to_string()));
    }

    #[test]
    fn say_routes_by_repr() {
        let bus = Bus::new();
        let a = Recorder::new("a", &[]);
        let b = Recorder::new("b", &[]);
        bus.add(a.clone());
        bus.add(b.clone());

        bus.say("b", "#chan", "hi");
        bus.say("nobody", "#chan", "lost");

        assert!(a.said.lock().is_empty());
        assert_eq!(b.said.lock().len(), 1);
    }

    #[test]
    fn add_replaces_and_remove_deregisters() {
        let bus = Bus::new();
        bus.add(Recorder::new("a", &[]));
        bus.add(Recorder::new("a", &[]));
        assert_eq!(bus.len(), 1);

        bus.remove("a");
        bus.remove("a");
        assert_eq!(bus.len(), 0);
    }
}
