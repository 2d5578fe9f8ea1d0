mod output;
mod repl;

pub use output::TerminalSink;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

use crate::core::error::{AuroraError, ERROR_MARKER_PREFIX};
use crate::core::message::Role;
use crate::engine::{ChatController, NetworkContext};

#[derive(Parser, Debug)]
#[command(name = "aurora-chat", version, about = "Streaming multi-session chat client")]
struct Cli {
    /// Non-interactive mode: send one message and print the reply
    #[arg(short, long)]
    prompt: Option<String>,

    /// Working directory (for the local aurora-chat.json)
    #[arg(short = 'c', long = "cwd")]
    working_dir: Option<PathBuf>,

    /// Output format for non-interactive mode
    #[arg(short = 'f', long = "format", default_value = "text")]
    output_format: OutputFormat,

    /// Model to use (overrides config)
    #[arg(short, long)]
    model: Option<String>,

    /// Chat-completions endpoint (overrides config)
    #[arg(long)]
    endpoint: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        crate::core::config::load_config(cli.working_dir.clone()).map_err(AuroraError::from)?;
    if let Some(model) = cli.model {
        config.model_id = model;
    }
    if let Some(endpoint) = cli.endpoint {
        config.endpoint_url = endpoint;
    }

    let filter = if cli.debug || config.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if !config.has_api_key() {
        anyhow::bail!(
            "No API key found. Set OPENROUTER_API_KEY or add api_key to aurora-chat.json."
        );
    }

    let provider = crate::providers::create_provider(&config).map_err(AuroraError::from)?;
    let network = NetworkContext::start().map_err(AuroraError::from)?;

    match cli.prompt {
        Some(prompt) => {
            let echo = matches!(cli.output_format, OutputFormat::Text);
            let controller = ChatController::new(provider, network, TerminalSink::new(echo));
            run_once(controller, &prompt, cli.output_format)
        }
        None => {
            let interrupt = Arc::new(Notify::new());
            let listener = Arc::clone(&interrupt);
            network
                .spawn(async move {
                    while tokio::signal::ctrl_c().await.is_ok() {
                        listener.notify_waiters();
                    }
                })
                .map_err(AuroraError::from)?;
            let controller = ChatController::new(provider, network, TerminalSink::new(true));
            repl::run(controller, &interrupt)
        }
    }
}

fn run_once(
    mut controller: ChatController<TerminalSink>,
    prompt: &str,
    output_format: OutputFormat,
) -> Result<()> {
    controller.submit(prompt).map_err(AuroraError::from)?;
    controller.run_until_idle();

    let session = controller.registry().active();
    let reply = session
        .turns()
        .iter()
        .rev()
        .find(|t| t.role() == Role::Assistant)
        .map(|t| t.content().to_string())
        .unwrap_or_default();
    let failed = reply.starts_with(ERROR_MARKER_PREFIX);

    if let OutputFormat::Json = output_format {
        let (content, error) = if failed {
            ("", Some(reply.as_str()))
        } else {
            (reply.as_str(), None)
        };
        let output = serde_json::json!({
            "title": session.title(),
            "content": content,
            "error": error,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    controller.shutdown();
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
