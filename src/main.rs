mod app;
mod commands;
mod config;
mod console;
mod dcc;
mod error;
mod irc;
mod logging;

use crate::app::command::Table;
use crate::app::handler::Handler;
use crate::app::kernel::Kernel;
use crate::console::Console;
use crate::irc::client::Irc;
use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = config::load_config(path.as_deref())?;
    logging::init_tracing(&cfg.logging);

    let kernel = Kernel::new(
        Table::new(commands::loader()),
        cfg.workers,
        cfg.timing.send_interval(),
    );
    info!(version = %kernel.version, workers = kernel.workers, "starting");

    let mut bots = Vec::new();
    for server in cfg.servers.iter().filter(|s| s.auto_connect) {
        let irc = Irc::new(kernel.clone(), server.clone(), &cfg);
        let starter = irc.clone();
        tokio::spawn(async move { starter.start().await });
        bots.push(irc);
    }

    if cfg.console {
        let handler = Handler::new(console::REPR, kernel.clone());
        let console = Console::stdin();
        tokio::select! {
            _ = console.run(&handler) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
        handler.stop();
    } else {
        tokio::signal::ctrl_c().await?;
    }

    info!("shutting down");
    for irc in &bots {
        irc.shutdown().await;
    }
    Ok(())
}
