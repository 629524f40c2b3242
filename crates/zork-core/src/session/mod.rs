//! Session orchestrator: owns the interpreter channel and the log sinks,
//! and drives the turn loop until a terminal state.
//!
//! One logical thread of control: each turn sends a command, blocks (with a
//! bounded timeout) for the next prompt marker, interprets the output, asks
//! the strategy for the next command, logs, and paces. The only cancellation
//! is a whole-session interrupt, delivered over a watch channel and handled
//! as a terminal transition.

pub mod channel;
pub mod logs;

use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::agent::DecisionStrategy;
use crate::command::sanitize;
use crate::parser::{GameParser, GameState};
use channel::{GameChannel, ReadOutcome};
use logs::{SessionLog, SessionSummary};

/// Terminal states of a session. Victory is checked before death, so a
/// chunk that trips both heuristics ends in `Won`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Won,
    Lost,
    ErrorAborted,
    TurnLimitReached,
    /// The scripted command list was consumed.
    ScriptExhausted,
    Interrupted,
}

impl SessionOutcome {
    pub fn describe(self) -> &'static str {
        match self {
            SessionOutcome::Won => "game won",
            SessionOutcome::Lost => "player died",
            SessionOutcome::ErrorAborted => "too many consecutive command errors",
            SessionOutcome::TurnLimitReached => "turn budget exhausted",
            SessionOutcome::ScriptExhausted => "command script exhausted",
            SessionOutcome::Interrupted => "interrupted by user",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_turns: u32,
    /// Consecutive not-understood turns before aborting.
    pub error_abort_threshold: u32,
    /// Inter-turn pacing, mostly to respect completion-endpoint rate
    /// limits.
    pub turn_delay: Duration,
    pub first_prompt_timeout: Duration,
    pub turn_timeout: Duration,
    /// Recorded in the summary; "scripted" for walkthrough runs.
    pub model: String,
    /// Assumed until a score banner reveals the real maximum.
    pub default_max_score: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: 500,
            error_abort_threshold: 3,
            turn_delay: Duration::from_millis(500),
            first_prompt_timeout: Duration::from_secs(10),
            turn_timeout: Duration::from_secs(5),
            model: "scripted".to_string(),
            default_max_score: 350,
        }
    }
}

pub struct Session<C> {
    channel: C,
    strategy: Box<dyn DecisionStrategy>,
    parser: GameParser,
    log: SessionLog,
    cfg: SessionConfig,
    interrupt: watch::Receiver<bool>,
    turn_count: u32,
    current_score: u32,
    max_score: u32,
    consecutive_errors: u32,
}

impl<C: GameChannel> Session<C> {
    pub fn new(
        channel: C,
        strategy: Box<dyn DecisionStrategy>,
        log: SessionLog,
        cfg: SessionConfig,
        interrupt: watch::Receiver<bool>,
    ) -> Self {
        let max_score = cfg.default_max_score;
        Self {
            channel,
            strategy,
            parser: GameParser::new(),
            log,
            cfg,
            interrupt,
            turn_count: 0,
            current_score: 0,
            max_score,
            consecutive_errors: 0,
        }
    }

    /// Runs the session to a terminal state. Cleanup (channel close,
    /// summary persistence, final status block) happens on every exit path,
    /// including loop errors, so the outcome is always recoverable from
    /// disk.
    pub async fn run(mut self) -> anyhow::Result<(SessionOutcome, SessionSummary)> {
        let result = self.drive().await;

        if let Err(err) = self.channel.close().await {
            debug!(error = %format!("{err:#}"), "ignoring channel close failure");
        }

        let summary = self.make_summary();
        self.log.write_summary(&summary);

        match result {
            Ok(outcome) => {
                self.print_final(outcome, &summary);
                Ok((outcome, summary))
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "session ended abnormally");
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> anyhow::Result<SessionOutcome> {
        let initial = match self
            .channel
            .read_to_prompt(self.cfg.first_prompt_timeout)
            .await
        {
            Ok(ReadOutcome::Prompt(text)) => text,
            Ok(ReadOutcome::Timeout(partial)) => {
                warn!("timed out waiting for the first prompt, using partial output");
                partial
            }
            Err(err) => {
                return Err(err).context("waiting for the interpreter's first prompt");
            }
        };

        let mut state = self.parser.interpret(&initial);
        self.note_score(&state);

        println!("{}", "=".repeat(80));
        println!("INITIAL GAME STATE");
        println!("{}", "=".repeat(80));
        println!("{}", state.cleaned_text);

        let mut last_command: Option<String> = None;

        loop {
            if *self.interrupt.borrow() {
                return Ok(SessionOutcome::Interrupted);
            }
            if state.flags.is_victory {
                return Ok(SessionOutcome::Won);
            }
            if state.flags.is_death {
                return Ok(SessionOutcome::Lost);
            }
            if self.turn_count >= self.cfg.max_turns {
                return Ok(SessionOutcome::TurnLimitReached);
            }

            let error_mode = state.flags.is_command_error
                && self.consecutive_errors < self.cfg.error_abort_threshold;
            let decision = match self
                .strategy
                .next_command(&state, error_mode, last_command.as_deref())
                .await?
            {
                Some(decision) => decision,
                None => return Ok(SessionOutcome::ScriptExhausted),
            };
            let command = sanitize(&decision.command);

            self.turn_count += 1;
            self.channel
                .send_line(&command)
                .await
                .context("sending command to the interpreter")?;

            let raw = self
                .channel
                .read_to_prompt(self.cfg.turn_timeout)
                .await
                .context("reading the interpreter's response")?
                .into_text();

            state = self.parser.interpret(&raw);
            self.note_score(&state);

            if state.flags.is_command_error {
                self.consecutive_errors += 1;
            } else {
                self.consecutive_errors = 0;
            }
            last_command = Some(command.clone());

            self.log.record_turn(
                self.turn_count,
                &command,
                &raw,
                &state,
                decision.rationale.as_deref(),
            );
            self.print_status(&command, &state);

            if self.consecutive_errors >= self.cfg.error_abort_threshold {
                return Ok(SessionOutcome::ErrorAborted);
            }

            let delay = self.cfg.turn_delay;
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.interrupt.changed() => {}
            }
        }
    }

    fn note_score(&mut self, state: &GameState) {
        if let Some((current, max)) = state.score {
            self.current_score = current;
            self.max_score = max;
        }
    }

    fn make_summary(&self) -> SessionSummary {
        let completion_percentage = if self.max_score == 0 {
            0.0
        } else {
            f64::from(self.current_score) / f64::from(self.max_score) * 100.0
        };
        SessionSummary {
            timestamp: Local::now().to_rfc3339(),
            total_turns: self.turn_count,
            final_score: self.current_score,
            max_score: self.max_score,
            completion_percentage,
            model: self.cfg.model.clone(),
            transcript: self.log.transcript_path().display().to_string(),
            turn_log: self.log.turn_log_path().display().to_string(),
        }
    }

    fn print_status(&self, command: &str, state: &GameState) {
        println!("\n{}", "=".repeat(80));
        println!("Turn {}/{}", self.turn_count, self.cfg.max_turns);
        println!("{}", "=".repeat(80));
        println!("Command: {command}");
        if let Some(location) = state.location.as_deref() {
            println!("Location: {location}");
        }
        if let Some((current, max)) = state.score {
            println!("Score: {current}/{max}");
        }
        if state.flags.is_command_error {
            println!("Command not understood by game");
        }
        if state.flags.is_death {
            println!("Player died!");
        }
        if state.flags.is_victory {
            println!("VICTORY! Game completed!");
        }
        println!("\nGame response:");
        let head: String = state.cleaned_text.chars().take(500).collect();
        println!("{head}");
        if state.cleaned_text.chars().count() > 500 {
            println!("... (truncated)");
        }
    }

    fn print_final(&self, outcome: SessionOutcome, summary: &SessionSummary) {
        println!("\n{}", "=".repeat(80));
        println!("GAME SESSION ENDED: {}", outcome.describe());
        println!("{}", "=".repeat(80));
        println!("Final statistics:");
        println!("  Turns played: {}", summary.total_turns);
        println!(
            "  Final score: {}/{}",
            summary.final_score, summary.max_score
        );
        println!("  Completion: {:.1}%", summary.completion_percentage);
        println!("Logs:");
        println!("  Transcript: {}", summary.transcript);
        println!("  Turn log: {}", summary.turn_log);
        println!("  Summary: {}", self.log.summary_path().display());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::agent::ScriptedStrategy;
    use crate::session::channel::ChannelError;

    const ZORK_OPENING: &str = "ZORK I: The Great Underground Empire\n\nWest of House\nYou are standing in an open field west of a white house, with a boarded front door.\nThere is a small mailbox here.\n";

    #[derive(Default)]
    struct FakeChannelState {
        reads: VecDeque<Result<ReadOutcome, ChannelError>>,
        sent: Vec<String>,
        closed: bool,
    }

    #[derive(Clone, Default)]
    struct FakeChannel {
        state: Arc<Mutex<FakeChannelState>>,
    }

    impl FakeChannel {
        fn push_prompt(&self, text: &str) {
            self.state
                .lock()
                .unwrap()
                .reads
                .push_back(Ok(ReadOutcome::Prompt(text.to_string())));
        }

        fn sent(&self) -> Vec<String> {
            self.state.lock().unwrap().sent.clone()
        }

        fn closed(&self) -> bool {
            self.state.lock().unwrap().closed
        }
    }

    impl GameChannel for FakeChannel {
        fn read_to_prompt<'a>(
            &'a mut self,
            _timeout: Duration,
        ) -> Pin<Box<dyn Future<Output = Result<ReadOutcome, ChannelError>> + Send + 'a>> {
            Box::pin(async move {
                self.state
                    .lock()
                    .unwrap()
                    .reads
                    .pop_front()
                    .unwrap_or(Err(ChannelError::ConnectionLost))
            })
        }

        fn send_line<'a>(
            &'a mut self,
            line: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + 'a>> {
            Box::pin(async move {
                self.state.lock().unwrap().sent.push(line.to_string());
                Ok(())
            })
        }

        fn close<'a>(
            &'a mut self,
        ) -> Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + 'a>> {
            Box::pin(async move {
                self.state.lock().unwrap().closed = true;
                Ok(())
            })
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            turn_delay: Duration::from_millis(0),
            ..SessionConfig::default()
        }
    }

    fn new_session(
        channel: FakeChannel,
        strategy: Box<dyn DecisionStrategy>,
        cfg: SessionConfig,
    ) -> (Session<FakeChannel>, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::create(dir.path()).expect("log");
        let (_tx, rx) = watch::channel(false);
        (Session::new(channel, strategy, log, cfg, rx), dir)
    }

    #[tokio::test]
    async fn scripted_opening_plays_four_turns_without_errors() {
        let channel = FakeChannel::default();
        channel.push_prompt(ZORK_OPENING);
        channel.push_prompt("North of House\nYou are facing the north side of a white house.");
        channel.push_prompt("Opening the small mailbox reveals a leaflet.");
        channel.push_prompt("Taken.");
        channel.push_prompt("\"WELCOME TO ZORK!\nZORK is a game of adventure, danger, and low cunning.\"");

        let strategy = ScriptedStrategy::new([
            "north",
            "open mailbox",
            "take leaflet",
            "read leaflet",
        ]);
        let (session, _dir) = new_session(channel.clone(), Box::new(strategy), test_config());

        let (outcome, summary) = session.run().await.expect("session");
        assert_eq!(outcome, SessionOutcome::ScriptExhausted);
        assert_eq!(summary.total_turns, 4);
        assert_eq!(
            channel.sent(),
            vec!["north", "open mailbox", "take leaflet", "read leaflet"]
        );
        assert!(channel.closed());

        let jsonl = std::fs::read_to_string(&summary.turn_log).expect("turn log");
        let records: Vec<serde_json::Value> = jsonl
            .lines()
            .map(|l| serde_json::from_str(l).expect("json"))
            .collect();
        assert_eq!(records.len(), 4);
        for record in &records {
            assert_eq!(record["state"]["flags"]["is_command_error"], false);
            assert_eq!(record["state"]["flags"]["is_death"], false);
        }
    }

    #[tokio::test]
    async fn aborts_after_exactly_three_consecutive_errors() {
        let channel = FakeChannel::default();
        channel.push_prompt(ZORK_OPENING);
        for _ in 0..5 {
            channel.push_prompt("I don't understand that.");
        }

        let strategy = ScriptedStrategy::new(["xyzzy", "xyzzy", "xyzzy", "xyzzy", "xyzzy"]);
        let (session, _dir) = new_session(channel.clone(), Box::new(strategy), test_config());

        let (outcome, summary) = session.run().await.expect("session");
        assert_eq!(outcome, SessionOutcome::ErrorAborted);
        assert_eq!(summary.total_turns, 3);
        assert_eq!(channel.sent().len(), 3);
    }

    #[tokio::test]
    async fn two_errors_then_success_resets_the_counter() {
        let channel = FakeChannel::default();
        channel.push_prompt(ZORK_OPENING);
        channel.push_prompt("I don't understand that.");
        channel.push_prompt("I don't know the word \"plugh\".");
        channel.push_prompt("Taken.");
        channel.push_prompt("I don't understand that.");
        channel.push_prompt("I don't understand that.");
        channel.push_prompt("Dropped.");

        let strategy =
            ScriptedStrategy::new(["xyzzy", "plugh", "take leaflet", "a", "b", "drop leaflet"]);
        let (session, _dir) = new_session(channel.clone(), Box::new(strategy), test_config());

        let (outcome, summary) = session.run().await.expect("session");
        // The counter never reaches 3, so the whole script plays out.
        assert_eq!(outcome, SessionOutcome::ScriptExhausted);
        assert_eq!(summary.total_turns, 6);
    }

    #[tokio::test]
    async fn victory_is_checked_before_death() {
        let channel = FakeChannel::default();
        channel.push_prompt(ZORK_OPENING);
        channel.push_prompt("Congratulations! ... but also: You have been eaten by a grue.");

        let strategy = ScriptedStrategy::new(["down", "never sent"]);
        let (session, _dir) = new_session(channel.clone(), Box::new(strategy), test_config());

        let (outcome, _) = session.run().await.expect("session");
        assert_eq!(outcome, SessionOutcome::Won);
        assert_eq!(channel.sent().len(), 1);
    }

    #[tokio::test]
    async fn death_ends_the_session_as_lost() {
        let channel = FakeChannel::default();
        channel.push_prompt(ZORK_OPENING);
        channel.push_prompt("It is now pitch black. You are likely to be eaten by a grue.\nOh no! You have walked into the slavering fangs of a lurking grue!");

        let strategy = ScriptedStrategy::new(["down", "never sent"]);
        let (session, _dir) = new_session(channel.clone(), Box::new(strategy), test_config());

        let (outcome, summary) = session.run().await.expect("session");
        assert_eq!(outcome, SessionOutcome::Lost);
        assert_eq!(summary.total_turns, 1);
    }

    #[tokio::test]
    async fn turn_budget_bounds_the_session() {
        let channel = FakeChannel::default();
        channel.push_prompt(ZORK_OPENING);
        channel.push_prompt("You go north.");
        channel.push_prompt("You go south.");

        let strategy = ScriptedStrategy::new(["north", "south", "north", "south"]);
        let cfg = SessionConfig {
            max_turns: 2,
            ..test_config()
        };
        let (session, _dir) = new_session(channel.clone(), Box::new(strategy), cfg);

        let (outcome, summary) = session.run().await.expect("session");
        assert_eq!(outcome, SessionOutcome::TurnLimitReached);
        assert_eq!(summary.total_turns, 2);
    }

    #[tokio::test]
    async fn summary_carries_score_and_completion_percentage() {
        let channel = FakeChannel::default();
        channel.push_prompt(ZORK_OPENING);
        channel.push_prompt("Your score is 45 (total of 350 points), in 30 moves.");

        let strategy = ScriptedStrategy::new(["score"]);
        let (session, _dir) = new_session(channel.clone(), Box::new(strategy), test_config());

        let (_, summary) = session.run().await.expect("session");
        assert_eq!(summary.final_score, 45);
        assert_eq!(summary.max_score, 350);
        assert!((summary.completion_percentage - 12.857142857142858).abs() < 1e-9);

        let written: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(_dir.path().join(
                std::path::Path::new(&summary.turn_log)
                    .file_name()
                    .map(|n| {
                        n.to_string_lossy()
                            .replace("turns_", "summary_")
                            .replace(".jsonl", ".json")
                    })
                    .expect("file name"),
            ))
            .expect("summary file"),
        )
        .expect("json");
        assert_eq!(written["total_turns"], 1);
        assert_eq!(written["final_score"], 45);
        assert_eq!(written["max_score"], 350);
    }

    #[tokio::test]
    async fn interrupt_is_a_graceful_terminal_state_with_summary() {
        let channel = FakeChannel::default();
        channel.push_prompt(ZORK_OPENING);

        let strategy = ScriptedStrategy::new(["north"]);
        let dir = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::create(dir.path()).expect("log");
        let (tx, rx) = watch::channel(false);
        tx.send(true).expect("interrupt");

        let session = Session::new(channel.clone(), Box::new(strategy), log, test_config(), rx);
        let (outcome, summary) = session.run().await.expect("session");
        assert_eq!(outcome, SessionOutcome::Interrupted);
        assert_eq!(summary.total_turns, 0);
        assert!(channel.closed());
        assert!(std::path::Path::new(&summary.transcript).exists());
    }

    #[tokio::test]
    async fn connection_loss_still_writes_the_summary() {
        let channel = FakeChannel::default();
        channel.push_prompt(ZORK_OPENING);
        // Next read hits the empty queue -> ConnectionLost.

        let strategy = ScriptedStrategy::new(["north", "south"]);
        let dir = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::create(dir.path()).expect("log");
        let summary_path = log.summary_path().to_path_buf();
        let (_tx, rx) = watch::channel(false);

        let session = Session::new(channel.clone(), Box::new(strategy), log, test_config(), rx);
        let err = session.run().await.expect_err("should fail");
        assert!(format!("{err:#}").contains("closed the channel"));
        assert!(summary_path.exists());
    }
}
