//! Replays a walkthrough command file against the interpreter, turn by
//! turn, with the same parsing and logging as an LLM session.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use zork_core::agent::ScriptedStrategy;
use zork_core::session::channel::{InterpreterChannel, InterpreterConfig};
use zork_core::session::logs::SessionLog;
use zork_core::session::{Session, SessionConfig};

#[derive(Parser)]
#[command(name = "walkthrough")]
#[command(about = "Replays a scripted command list through the Z-machine interpreter")]
#[command(version)]
struct Cli {
    /// Z-machine story file to play
    story_file: PathBuf,

    /// Text file with one game command per line (blank lines skipped)
    commands_file: PathBuf,

    /// Directory for transcript, turn log and summary files
    #[arg(long, env = "ZORK_LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,

    /// Z-machine interpreter program
    #[arg(long, env = "ZORK_INTERPRETER", default_value = "dfrotz")]
    interpreter: String,

    /// Extra argument for the interpreter, before the story file (repeatable)
    #[arg(long = "interpreter-arg")]
    interpreter_args: Vec<String>,
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
        anyhow::bail!("story file {} not found", cli.story_file.display());
    }

    let strategy = ScriptedStrategy::from_file(&cli.commands_file)?;
    let command_count = strategy.remaining();
    info!(
        commands = command_count,
        story = %cli.story_file.display(),
        "replaying walkthrough"
    );

    let channel = InterpreterChannel::spawn(&InterpreterConfig {
        program: cli.interpreter.clone(),
        args: cli.interpreter_args.clone(),
        story_file: cli.story_file.clone(),
    })?;

    let log = SessionLog::create(&cli.log_dir)?;

    let (interrupt_tx, interrupt_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = interrupt_tx.send(true);
        }
    });

    let cfg = SessionConfig {
        // The script bounds the session; leave one slot past it so the
        // final outcome reports exhaustion rather than the turn budget.
        max_turns: u32::try_from(command_count)
            .unwrap_or(u32::MAX)
            .saturating_add(1),
        model: "scripted".to_string(),
        ..SessionConfig::default()
    };

    let session = Session::new(channel, Box::new(strategy), log, cfg, interrupt_rx);
    let (outcome, summary) = session.run().await?;
    info!(
        outcome = outcome.describe(),
        turns = summary.total_turns,
        score = summary.final_score,
        "walkthrough finished"
    );
    Ok(())
}
