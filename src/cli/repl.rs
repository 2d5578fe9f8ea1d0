use anyhow::Result;
use std::io::{self, Write};
use tokio::sync::Notify;

use super::output::{self, TerminalSink};
use crate::engine::ChatController;

/// Ctrl-C while a reply is streaming abandons it; `interrupt` is notified by
/// the signal listener.
pub fn run(mut controller: ChatController<TerminalSink>, interrupt: &Notify) -> Result<()> {
    println!("\x1b[1maurora-chat\x1b[0m v{}", env!("CARGO_PKG_VERSION"));
    println!("Model: \x1b[36m{}\x1b[0m", controller.model_id());
    println!("Type \x1b[33m/help\x1b[0m for commands, \x1b[33mCtrl-C\x1b[0m to cancel a reply, \x1b[33mCtrl-D\x1b[0m to exit.\n");

    loop {
        eprint!("\x1b[32;1myou>\x1b[0m ");
        io::stderr().flush().ok();

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) => {
                // EOF (Ctrl-D)
                println!("\nGoodbye!");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if input.starts_with('/') {
            if handle_command(input, &mut controller) {
                continue;
            }
            break;
        }

        match controller.submit(input) {
            Ok(_) => {
                if controller.run_until_idle_or(interrupt) {
                    println!("\n\x1b[33m(cancelled)\x1b[0m");
                }
            }
            Err(e) => eprintln!("\x1b[31m{e}\x1b[0m"),
        }
    }

    controller.shutdown();
    Ok(())
}

/// Returns false when the REPL should exit.
fn handle_command(input: &str, controller: &mut ChatController<TerminalSink>) -> bool {
    let mut parts = input.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let arg = parts.next();

    match command {
        "/help" | "/h" => {
            println!("\x1b[1mCommands:\x1b[0m");
            println!("  /new        Start a new chat");
            println!("  /sessions   List chats");
            println!("  /select N   Switch to chat N");
            println!("  /history    Show the current chat");
            println!("  /exit       Exit");
        }
        "/exit" | "/quit" | "/q" => {
            println!("Goodbye!");
            return false;
        }
        "/new" | "/n" => {
            controller.create_session();
        }
        "/sessions" | "/s" => {
            let registry = controller.registry();
            let titles: Vec<String> = (0..registry.len())
                .filter_map(|i| registry.display_title(i))
                .collect();
            output::print_sessions(registry.sessions(), registry.active_index(), &titles);
        }
        "/select" => match arg.and_then(|a| a.parse::<usize>().ok()) {
            Some(n) if n >= 1 && controller.select_session(n - 1) => {
                output::print_transcript(controller.registry().active());
            }
            _ => eprintln!("Usage: /select N (1..={})", controller.registry().len()),
        },
        "/history" => {
            output::print_transcript(controller.registry().active());
        }
        _ => {
            eprintln!("Unknown command: {input}. Type /help for available commands.");
        }
    }
    true
}
