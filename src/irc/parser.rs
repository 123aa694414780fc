//! IRC line parser.
//!
//! Decomposes `:origin COMMAND arg1 arg2 :trailing text` into an [`Event`].
//! Lines without a trailing segment fall back to using everything after the
//! first `:` (or the whole line) as text; real servers rely on this for
//! numerics such as `005`.

use crate::app::event::Event;

/// Parse one raw line received from `server` by the transport `orig`.
pub fn parsing(line: &str, server: &str, orig: &str) -> Event {
    let rawstr = line.replace('\u{1}', "");
    let mut event = Event::default();
    event.orig = orig.to_string();
    event.rawstr = rawstr.clone();

    let words: Vec<&str> = rawstr.split_whitespace().collect();
    let mut origin = words.first().map_or(server, |w| *w).to_string();
    let mut txt = String::new();

    if let Some(stripped) = origin.strip_prefix(':') {
        origin = stripped.to_string();
        if let Some(command) = words.get(1) {
            event.command = command.to_string();
        }
        let mut trailing = Vec::new();
        let mut adding = false;
        for word in words.iter().skip(2) {
            if word.matches(':').count() <= 1 && word.starts_with(':') {
                adding = true;
                trailing.push(&word[1..]);
                continue;
            }
            if adding {
                trailing.push(*word);
            } else {
                event.arguments.push(word.to_string());
            }
        }
        txt = trailing.join(" ");
    } else {
        event.command = origin;
        origin = server.to_string();
    }
    event.kind = event.command.clone();

    event.nick = match origin.split_once('!') {
        Some((nick, _)) => nick.to_string(),
        None => String::new(),
    };
    event.origin = origin;

    // Numerics put our own nick first, so their channel comes later.
    let numeric = event.command.bytes().all(|b| b.is_ascii_digit());
    let target = if numeric {
        event.arguments.iter().skip(1).find(|a| a.starts_with('#'))
    } else {
        event.arguments.first().filter(|a| a.starts_with('#'))
    };
    event.channel = match target {
        Some(target) => target.clone(),
        None => event.nick.clone(),
    };

    if txt.is_empty() {
        let body = rawstr.strip_prefix(':').unwrap_or(&rawstr);
        txt = match body.split_once(':') {
            Some((_, after)) => after.to_string(),
            None => body.to_string(),
        };
    }
    event.set_text(&txt);
    event.txt = txt;
    event
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER: &str = "irc.example.net";

    struct Expect {
        line: &'static str,
        command: &'static str,
        origin: &'static str,
        nick: &'static str,
        channel: &'static str,
        txt: &'static str,
    }

    #[test]
    fn decomposes_reference_lines() {
        let table = [
            Expect {
                line: ":alice!al@host.example PRIVMSG #rust :hello there world",
                command: "PRIVMSG",
                origin: "alice!al@host.example",
                nick: "alice",
                channel: "#rust",
                txt: "hello there world",
            },
            Expect {
                line: ":alice!al@host.example PRIVMSG crabbot :!version",
                command: "PRIVMSG",
                origin: "alice!al@host.example",
                nick: "alice",
                channel: "alice",
                txt: "!version",
            },
            Expect {
                line: ":irc.example.net 001 crabbot :Welcome to the Example IRC Network crabbot",
                command: "001",
                origin: "irc.example.net",
                nick: "",
                channel: "",
                txt: "Welcome to the Example IRC Network crabbot",
            },
            Expect {
                line: ":irc.example.net 005 crabbot CHANTYPES=# NETWORK=Example",
                command: "005",
                origin: "irc.example.net",
                nick: "",
                channel: "",
                txt: "irc.example.net 005 crabbot CHANTYPES=# NETWORK=Example",
            },
            Expect {
                line: ":irc.example.net 366 crabbot #rust :End of /NAMES list.",
                command: "366",
                origin: "irc.example.net",
                nick: "",
                channel: "#rust",
                txt: "End of /NAMES list.",
            },
            Expect {
                line: "PING :irc.example.net",
                command: "PING",
                origin: SERVER,
                nick: "",
                channel: "",
                txt: "irc.example.net",
            },
            Expect {
                line: ":bob!b@h JOIN #rust",
                command: "JOIN",
                origin: "bob!b@h",
                nick: "bob",
                channel: "#rust",
                txt: "bob!b@h JOIN #rust",
            },
            Expect {
                line: ":bob!b@h JOIN :#rust",
                command: "JOIN",
                origin: "bob!b@h",
                nick: "bob",
                channel: "bob",
                txt: "#rust",
            },
        ];

        for case in table {
            let event = parsing(case.line, SERVER, "irc-test");
            assert_eq!(event.command, case.command, "{}", case.line);
            assert_eq!(event.kind, case.command, "{}", case.line);
            assert_eq!(event.origin, case.origin, "{}", case.line);
            assert_eq!(event.nick, case.nick, "{}", case.line);
            assert_eq!(event.channel, case.channel, "{}", case.line);
            assert_eq!(event.txt, case.txt, "{}", case.line);
            assert_eq!(event.orig, "irc-test");
        }
    }

    #[test]
    fn positional_arguments_and_args_are_kept() {
        let event = parsing(
            ":irc.example.net 002 crabbot :Your host is irc.example.net, running version x",
            SERVER,
            "t",
        );
        assert_eq!(event.arguments, vec!["crabbot"]);
        assert_eq!(event.args[2], "irc.example.net,");
    }

    #[test]
    fn ctcp_markers_are_stripped() {
        let event = parsing(
            ":alice!a@h PRIVMSG crabbot :\u{1}DCC CHAT chat 2130706433 5000\u{1}",
            SERVER,
            "t",
        );
        assert_eq!(event.txt, "DCC CHAT chat 2130706433 5000");
    }

    #[test]
    fn colons_inside_words_do_not_start_the_trailing_text() {
        let event = parsing(":a!b@c PRIVMSG #x ::) smile", SERVER, "t");
        assert_eq!(event.arguments, vec!["#x", "::)", "smile"]);
        assert_eq!(event.channel, "#x");
        assert_eq!(event.txt, ":) smile");
    }

    #[test]
    fn channel_is_the_first_argument_even_without_trailing_text() {
        let event = parsing(
            ":alice!a@h PRIVMSG #rust :http://example.com look",
            SERVER,
            "t",
        );
        assert_eq!(event.arguments, vec!["#rust", ":http://example.com", "look"]);
        assert_eq!(event.channel, "#rust");

        let event = parsing(":alice!a@h PRIVMSG #rust :bot: echo hi", SERVER, "t");
        assert_eq!(event.channel, "#rust");
        assert_eq!(event.txt, "bot: echo hi");

        let event = parsing(":alice!a@h PRIVMSG crabbot ::) #elsewhere", SERVER, "t");
        assert_eq!(event.channel, "alice");
    }
}
