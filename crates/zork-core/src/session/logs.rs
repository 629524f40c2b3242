//! Per-session log sinks: a human-readable transcript, a JSONL turn log,
//! and a single end-of-session summary.
//!
//! All writes are best-effort: a failed append warns and the session keeps
//! playing, so a full disk never kills a run.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use serde::Serialize;
use tracing::warn;

use crate::parser::GameState;

/// JSONL turn log entries keep only the head of the raw output.
const OUTPUT_TRUNCATE_CHARS: usize = 500;

#[derive(Debug, Serialize)]
struct TurnRecord<'a> {
    turn: u32,
    timestamp: String,
    command: &'a str,
    truncated_output: String,
    state: &'a GameState,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_rationale: Option<&'a str>,
}

/// Written exactly once when the session reaches any terminal state.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionSummary {
    pub timestamp: String,
    pub total_turns: u32,
    pub final_score: u32,
    pub max_score: u32,
    pub completion_percentage: f64,
    pub model: String,
    pub transcript: String,
    pub turn_log: String,
}

pub struct SessionLog {
    transcript_path: PathBuf,
    turn_log_path: PathBuf,
    summary_path: PathBuf,
    transcript: File,
    turn_log: File,
    summary_written: bool,
}

impl SessionLog {
    /// Creates the three timestamped files under `log_dir` (created if
    /// missing). Creation failure is fatal: a session that cannot log at
    /// all should not start.
    pub fn create(log_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let transcript_path = log_dir.join(format!("transcript_{stamp}.txt"));
        let turn_log_path = log_dir.join(format!("turns_{stamp}.jsonl"));
        let summary_path = log_dir.join(format!("summary_{stamp}.json"));

        let transcript = Self::open_append(&transcript_path)?;
        let turn_log = Self::open_append(&turn_log_path)?;

        Ok(Self {
            transcript_path,
            turn_log_path,
            summary_path,
            transcript,
            turn_log,
            summary_written: false,
        })
    }

    fn open_append(path: &Path) -> anyhow::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))
    }

    pub fn transcript_path(&self) -> &Path {
        &self.transcript_path
    }

    pub fn turn_log_path(&self) -> &Path {
        &self.turn_log_path
    }

    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }

    /// Appends one turn to both the transcript and the JSONL log.
    pub fn record_turn(
        &mut self,
        turn: u32,
        command: &str,
        raw_output: &str,
        state: &GameState,
        agent_rationale: Option<&str>,
    ) {
        if let Err(err) = self.try_record_turn(turn, command, raw_output, state, agent_rationale) {
            warn!(turn, error = %format!("{err:#}"), "failed to append turn log entry");
        }
    }

    fn try_record_turn(
        &mut self,
        turn: u32,
        command: &str,
        raw_output: &str,
        state: &GameState,
        agent_rationale: Option<&str>,
    ) -> anyhow::Result<()> {
        writeln!(self.transcript, "\n{}", "=".repeat(80))?;
        writeln!(self.transcript, "TURN {turn}")?;
        writeln!(self.transcript, "{}", "=".repeat(80))?;
        writeln!(self.transcript, "COMMAND: {command}")?;
        writeln!(self.transcript, "\nGAME OUTPUT:\n{raw_output}")?;
        if let Some((current, max)) = state.score {
            writeln!(self.transcript, "\nSCORE: {current}/{max}")?;
        }

        let record = TurnRecord {
            turn,
            timestamp: Local::now().to_rfc3339(),
            command,
            truncated_output: raw_output.chars().take(OUTPUT_TRUNCATE_CHARS).collect(),
            state,
            agent_rationale,
        };
        let line = serde_json::to_string(&record).context("serialize turn record")?;
        writeln!(self.turn_log, "{line}")?;
        Ok(())
    }

    /// Persists the summary. Only the first call writes; later calls are
    /// ignored so every termination path can call this unconditionally.
    pub fn write_summary(&mut self, summary: &SessionSummary) {
        if self.summary_written {
            return;
        }
        self.summary_written = true;
        if let Err(err) = self.try_write_summary(summary) {
            warn!(error = %format!("{err:#}"), "failed to write session summary");
        }
    }

    fn try_write_summary(&self, summary: &SessionSummary) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(summary).context("serialize summary")?;
        fs::write(&self.summary_path, json)
            .with_context(|| format!("write {}", self.summary_path.display()))?;
        Ok(())
    }
}
