use std::io::{self, Write};

use crate::core::message::{Role, Turn};
use crate::core::session::{Session, SessionId};
use crate::engine::PresentationSink;

/// Presentation sink that renders the transcript on stdout.
pub struct TerminalSink {
    echo: bool,
    active: Option<SessionId>,
    active_title: String,
    mid_reply: bool,
}

impl TerminalSink {
    /// With `echo` off nothing is printed; one-shot JSON output uses that.
    pub fn new(echo: bool) -> Self {
        Self {
            echo,
            active: None,
            active_title: String::new(),
            mid_reply: false,
        }
    }
}

impl PresentationSink for TerminalSink {
    fn on_session_list_changed(&mut self, sessions: &[Session], active_index: usize) {
        let Some(active) = sessions.get(active_index) else {
            return;
        };
        let changed = self.active != Some(active.id()) || self.active_title != active.title();
        self.active = Some(active.id());
        self.active_title = active.title().to_string();
        if self.echo && changed {
            eprintln!("\x1b[90m[{}] {}\x1b[0m", active_index + 1, active.title());
        }
    }

    fn on_append_text(&mut self, _session: SessionId, fragment: &str) {
        if !self.echo {
            return;
        }
        if !self.mid_reply {
            print!("\x1b[36;1maurora>\x1b[0m ");
            self.mid_reply = true;
        }
        print!("{fragment}");
        io::stdout().flush().ok();
    }

    fn on_turn_committed(&mut self, _session: SessionId, turn: &Turn) {
        if turn.role() != Role::Assistant {
            return;
        }
        if self.echo {
            if !self.mid_reply {
                // Empty reply: nothing was streamed.
                print!("\x1b[36;1maurora>\x1b[0m ");
            }
            println!();
        }
        self.mid_reply = false;
    }
}

pub fn print_transcript(session: &Session) {
    if session.turns().is_empty() {
        println!("\x1b[90m(empty)\x1b[0m");
        return;
    }
    for turn in session.turns() {
        match turn.role() {
            Role::User => println!("\x1b[32;1myou>\x1b[0m {}", turn.content()),
            Role::Assistant => println!("\x1b[36;1maurora>\x1b[0m {}", turn.content()),
            Role::System => println!("\x1b[90msystem> {}\x1b[0m", turn.content()),
        }
    }
}

pub fn print_sessions(sessions: &[Session], active_index: usize, titles: &[String]) {
    for (idx, (session, title)) in sessions.iter().zip(titles).enumerate() {
        let marker = if idx == active_index { " *" } else { "" };
        println!(
            "  \x1b[90m{:>2}\x1b[0m  {}{}  ({} turns, {})",
            idx + 1,
            title,
            marker,
            session.turns().len(),
            session.created_at().format("%H:%M"),
        );
    }
}
