//! Configuration data model.
//!
//! All structs derive `Serialize`/`Deserialize` for TOML persistence.
//! Every field has a sensible default so the bot works out of the box.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::nickname::generate_nickname;

/// Root bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_servers")]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub dcc: DccConfig,
    #[serde(default)]
    pub ctcp: CtcpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Size of each handler's worker pool.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Read commands from stdin.
    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            timing: TimingConfig::default(),
            dcc: DccConfig::default(),
            ctcp: CtcpConfig::default(),
            logging: LoggingConfig::default(),
            workers: default_workers(),
            console: true,
        }
    }
}

fn default_servers() -> Vec<ServerConfig> {
    vec![ServerConfig {
        name: "libera".into(),
        host: "irc.libera.chat".into(),
        port: default_port(),
        nickname: generate_nickname(),
        username: None,
        realname: None,
        channels: vec!["#crabbot".into()],
        command_char: default_command_char(),
        modes: None,
        auto_connect: false,
        quit_message: None,
    }]
}

/// Configuration for a single IRC server connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// User-facing label (e.g. `"libera"`).
    pub name: String,
    /// Hostname or IP address of the IRC server.
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_nickname")]
    pub nickname: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub realname: Option<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    /// Prefix that turns a chat line into a command.
    #[serde(default = "default_command_char")]
    pub command_char: String,
    /// User modes applied after registration, e.g. `"+B"`.
    #[serde(default)]
    pub modes: Option<String>,
    #[serde(default)]
    pub auto_connect: bool,
    #[serde(default)]
    pub quit_message: Option<String>,
}

impl ServerConfig {
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.nickname)
    }

    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or(&self.nickname)
    }
}

/// Connection lifecycle timings, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_connect_retry")]
    pub connect_retry_secs: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
    #[serde(default = "default_send_interval")]
    pub send_interval_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_retry_secs: default_connect_retry(),
            reconnect_delay_secs: default_reconnect_delay(),
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
            send_interval_secs: default_send_interval(),
            read_timeout_secs: default_read_timeout(),
            join_timeout_secs: default_join_timeout(),
        }
    }
}

impl TimingConfig {
    pub fn connect_retry(&self) -> Duration {
        Duration::from_secs(self.connect_retry_secs)
    }
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
    pub fn send_interval(&self) -> Duration {
        Duration::from_secs(self.send_interval_secs)
    }
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

/// DCC CHAT settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DccConfig {
    /// Glob masks (`nick!user@host`) allowed to open a DCC chat.
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub reject_private_ips: bool,
    #[serde(default = "default_dcc_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for DccConfig {
    fn default() -> Self {
        Self {
            allowed: Vec::new(),
            reject_private_ips: false,
            connect_timeout_secs: default_dcc_timeout(),
        }
    }
}

impl DccConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// CTCP (Client-To-Client Protocol) auto-reply settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtcpConfig {
    #[serde(default = "default_true")]
    pub reply_version: bool,
    #[serde(default = "default_version_string")]
    pub version_string: String,
}

impl Default for CtcpConfig {
    fn default() -> Self {
        Self {
            reply_version: true,
            version_string: default_version_string(),
        }
    }
}

/// Diagnostics and chat log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_true")]
    pub log_channels: bool,
    #[serde(default)]
    pub log_queries: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            enabled: false,
            log_dir: default_log_dir(),
            log_channels: true,
            log_queries: false,
        }
    }
}

fn default_nickname() -> String {
    generate_nickname()
}
fn default_port() -> u16 {
    6667
}
fn default_true() -> bool {
    true
}
fn default_command_char() -> String {
    "!".to_string()
}
fn default_workers() -> usize {
    64
}
fn default_connect_retry() -> u64 {
    10
}
fn default_reconnect_delay() -> u64 {
    5
}
fn default_ping_interval() -> u64 {
    60
}
fn default_pong_timeout() -> u64 {
    2
}
fn default_send_interval() -> u64 {
    4
}
fn default_read_timeout() -> u64 {
    20 * 60
}
fn default_join_timeout() -> u64 {
    60
}
fn default_dcc_timeout() -> u64 {
    10
}
fn default_level() -> String {
    "info".to_string()
}
fn default_log_dir() -> String {
    "~/.local/share/crabbot/logs".to_string()
}
fn default_version_string() -> String {
    format!("CrabBot {} - Rust IRC bot", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_server_entry_gets_defaults() {
        let cfg: BotConfig = toml::from_str(
            r##"
            [[servers]]
            name = "local"
            host = "127.0.0.1"
            nickname = "crab"
            channels = ["#test"]
            "##,
        )
        .unwrap();

        let srv = &cfg.servers[0];
        assert_eq!(srv.port, 6667);
        assert_eq!(srv.command_char, "!");
        assert_eq!(srv.username(), "crab");
        assert_eq!(cfg.timing.send_interval(), Duration::from_secs(4));
        assert_eq!(cfg.timing.read_timeout(), Duration::from_secs(1200));
        assert_eq!(cfg.workers, 64);
        assert!(cfg.console);
        assert!(!cfg.logging.enabled);
    }

    #[test]
    fn empty_file_uses_builtin_servers() {
        let cfg: BotConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.servers.len(), 1);
        assert!(!cfg.servers[0].nickname.is_empty());
        assert_eq!(cfg.timing.ping_interval_secs, 60);
    }

    #[test]
    fn defaults_survive_a_toml_round_trip() {
        let cfg = BotConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: BotConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.servers[0].host, cfg.servers[0].host);
        assert_eq!(back.dcc.connect_timeout_secs, 10);
    }
}
