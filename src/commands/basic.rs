//! The `basic` module: introspection and broadcast commands.

use crate::app::command::Module;
use crate::app::event::Event;
use crate::app::handler::Handler;
use crate::error::CommandError;

pub const NAME: &str = "basic";

pub const VERBS: &[&str] = &["cmds", "version", "up", "fleet", "ann"];

pub fn module() -> Module {
    Module::new(NAME)
        .with("cmds", cmds)
        .with("version", version)
        .with("up", up)
        .with("fleet", fleet)
        .with("ann", ann)
}

fn cmds(handler: &Handler, event: &Event) -> Result<(), CommandError> {
    event.reply(handler.kernel().table.verbs().join(","));
    Ok(())
}

fn version(handler: &Handler, event: &Event) -> Result<(), CommandError> {
    event.reply(handler.kernel().version.clone());
    Ok(())
}

fn up(handler: &Handler, event: &Event) -> Result<(), CommandError> {
    event.reply(elapsed(handler.kernel().started.elapsed().as_secs()));
    Ok(())
}

fn fleet(handler: &Handler, event: &Event) -> Result<(), CommandError> {
    let names = handler.kernel().bus.names();
    if names.is_empty() {
        event.reply("no bots running");
    } else {
        event.reply(format!("{} | {}", names.len(), names.join(" ")));
    }
    Ok(())
}

fn ann(handler: &Handler, event: &Event) -> Result<(), CommandError> {
    if event.rest.is_empty() {
        return Err(CommandError::Usage("ann <text>".into()));
    }
    handler.kernel().bus.announce(&event.rest);
    Ok(())
}

/// `1d2h3m4s` style duration, leading zero units omitted.
fn elapsed(secs: u64) -> String {
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    let mut text = String::new();
    for (value, unit) in [(days, 'd'), (hours, 'h'), (minutes, 'm')] {
        if value > 0 || !text.is_empty() {
            text.push_str(&format!("{}{}", value, unit));
        }
    }
    text.push_str(&format!("{}s", seconds));
    text
}
