//! LLM-driven Zork session runner.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use zork_core::agent::{ChatEndpointConfig, HttpChatClient, LlmStrategy};
use zork_core::session::channel::{InterpreterChannel, InterpreterConfig};
use zork_core::session::logs::SessionLog;
use zork_core::session::{Session, SessionConfig};

#[derive(Parser)]
#[command(name = "zork-runner")]
#[command(about = "Plays Zork through a Z-machine interpreter, with an LLM choosing commands")]
#[command(version)]
struct Cli {
    /// OpenAI-compatible chat completions base URL
    #[arg(long, env = "ZORK_LLM_URL", default_value = "http://localhost:8000/v1")]
    endpoint: String,

    /// Model name passed to the completion endpoint
    #[arg(
        long,
        env = "ZORK_LLM_MODEL",
        default_value = "meta-llama/Llama-3.1-8B-Instruct"
    )]
    model: String,

    /// Bearer token for the endpoint (many local servers accept any value)
    #[arg(long, env = "ZORK_API_KEY", default_value = "EMPTY", hide_env_values = true)]
    api_key: String,

    /// Z-machine story file to play
    #[arg(long, env = "ZORK_STORY_FILE", default_value = "zork1.z3")]
    story_file: PathBuf,

    /// Maximum number of turns before the session stops itself
    #[arg(long, env = "ZORK_MAX_TURNS", default_value_t = 500)]
    max_turns: u32,

    /// Directory for transcript, turn log and summary files
    #[arg(long, env = "ZORK_LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,

    /// Z-machine interpreter program
    #[arg(long, env = "ZORK_INTERPRETER", default_value = "dfrotz")]
    interpreter: String,

    /// Extra argument for the interpreter, before the story file (repeatable)
    #[arg(long = "interpreter-arg")]
    interpreter_args: Vec<String>,

    /// Delay between turns, in milliseconds
    #[arg(long, default_value_t = 500)]
    turn_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if !cli.story_file.exists() {
        anyhow::bail!(
            "story file {} not found (point --story-file at a Z-machine game file)",
            cli.story_file.display()
        );
    }

    info!(
        model = %cli.model,
        endpoint = %cli.endpoint,
        story = %cli.story_file.display(),
        "starting session"
    );

    let channel = InterpreterChannel::spawn(&InterpreterConfig {
        program: cli.interpreter.clone(),
        args: cli.interpreter_args.clone(),
        story_file: cli.story_file.clone(),
    })?;

    let backend = HttpChatClient::new(ChatEndpointConfig {
        base_url: cli.endpoint.clone(),
        model: cli.model.clone(),
        api_key: cli.api_key.clone(),
    });
    let strategy = LlmStrategy::new(backend);

    let log = SessionLog::create(&cli.log_dir)?;

    let (interrupt_tx, interrupt_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = interrupt_tx.send(true);
        }
    });

    let cfg = SessionConfig {
        max_turns: cli.max_turns,
        turn_delay: Duration::from_millis(cli.turn_delay_ms),
        model: cli.model,
        ..SessionConfig::default()
    };

    let session = Session::new(channel, Box::new(strategy), log, cfg, interrupt_rx);
    let (outcome, _summary) = session.run().await?;
    info!(outcome = outcome.describe(), "session finished");
    Ok(())
}
