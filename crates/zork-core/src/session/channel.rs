//! Line-command channel to the subordinate interpreter process.
//!
//! The protocol is strictly synchronous: send one command line, read text
//! until the next prompt marker. A read that times out is expected and
//! yields whatever partial text arrived; a closed pipe is fatal. The
//! distinction is carried in types, never by inspecting error text.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

/// Character the interpreter emits when it is ready for the next command.
pub const PROMPT_MARKER: u8 = b'>';

#[derive(Debug, Error)]
pub enum ChannelError {
    /// The subordinate process closed its side; the session cannot
    /// continue.
    #[error("subordinate interpreter closed the channel")]
    ConnectionLost,
    #[error("channel i/o failed")]
    Io(#[from] std::io::Error),
}

/// What a bounded read produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The prompt marker was seen; holds everything printed before it.
    Prompt(String),
    /// The timeout elapsed first; holds whatever partial text arrived.
    /// Expected near game-over screens, not a failure.
    Timeout(String),
}

impl ReadOutcome {
    /// Collapses both cases to the text, which is how the session loop
    /// consumes a turn's output.
    pub fn into_text(self) -> String {
        match self {
            ReadOutcome::Prompt(text) | ReadOutcome::Timeout(text) => text,
        }
    }
}

/// Seam between the orchestrator and the interpreter process, so the loop
/// can be driven by a fake in tests.
pub trait GameChannel: Send {
    fn read_to_prompt<'a>(
        &'a mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<ReadOutcome, ChannelError>> + Send + 'a>>;

    fn send_line<'a>(
        &'a mut self,
        line: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + 'a>>;

    fn close<'a>(&'a mut self) -> Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + 'a>>;
}

#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Interpreter program, e.g. `dfrotz`.
    pub program: String,
    /// Extra arguments placed before the story file.
    pub args: Vec<String>,
    pub story_file: PathBuf,
}

/// Channel backed by a spawned interpreter with piped stdio.
#[derive(Debug)]
pub struct InterpreterChannel {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl InterpreterChannel {
    /// Spawn failure (interpreter not installed, bad story path) is fatal
    /// and happens before any session state exists.
    pub fn spawn(cfg: &InterpreterConfig) -> anyhow::Result<Self> {
        let mut child = Command::new(&cfg.program)
            .args(&cfg.args)
            .arg(&cfg.story_file)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| {
                format!(
                    "failed to launch interpreter `{}` - is it installed and on PATH? \
                     (point --interpreter at a Z-machine interpreter such as dfrotz)",
                    cfg.program
                )
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("interpreter stdin was not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("interpreter stdout was not piped"))?;

        debug!(program = %cfg.program, story = %cfg.story_file.display(), "interpreter launched");
        Ok(Self {
            child,
            stdin,
            stdout,
        })
    }
}

impl GameChannel for InterpreterChannel {
    fn read_to_prompt<'a>(
        &'a mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<ReadOutcome, ChannelError>> + Send + 'a>> {
        Box::pin(async move {
            let deadline = tokio::time::Instant::now() + timeout;
            let mut collected: Vec<u8> = Vec::new();
            let mut chunk = [0u8; 1024];

            loop {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    return Ok(ReadOutcome::Timeout(
                        String::from_utf8_lossy(&collected).into_owned(),
                    ));
                }

                match tokio::time::timeout(remaining, self.stdout.read(&mut chunk)).await {
                    Err(_elapsed) => {
                        return Ok(ReadOutcome::Timeout(
                            String::from_utf8_lossy(&collected).into_owned(),
                        ));
                    }
                    Ok(Ok(0)) => return Err(ChannelError::ConnectionLost),
                    Ok(Ok(n)) => {
                        for &byte in &chunk[..n] {
                            if byte == PROMPT_MARKER {
                                return Ok(ReadOutcome::Prompt(
                                    String::from_utf8_lossy(&collected).into_owned(),
                                ));
                            }
                            collected.push(byte);
                        }
                    }
                    Ok(Err(err)) => return Err(ChannelError::Io(err)),
                }
            }
        })
    }

    fn send_line<'a>(
        &'a mut self,
        line: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + 'a>> {
        Box::pin(async move {
            self.stdin.write_all(line.as_bytes()).await?;
            self.stdin.write_all(b"\n").await?;
            self.stdin.flush().await?;
            Ok(())
        })
    }

    fn close<'a>(&'a mut self) -> Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + 'a>> {
        Box::pin(async move {
            // Best effort: ask the child to die and reap it.
            let _ = self.child.start_kill();
            let _ = self.child.wait().await;
            Ok(())
        })
    }
}
