//! Fire-and-forget walkthrough strategy: consumes a pre-loaded command
//! list, one per call, with no feedback from the game state.

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use anyhow::Context;

use super::{Decision, DecisionStrategy};
use crate::parser::GameState;

#[derive(Debug, Clone, Default)]
pub struct ScriptedStrategy {
    commands: VecDeque<String>,
}

impl ScriptedStrategy {
    pub fn new(commands: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// Loads one command per non-blank line, in file order.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read commands file {}", path.display()))?;
        Ok(Self::new(
            text.lines().map(str::trim).filter(|l| !l.is_empty()),
        ))
    }

    pub fn remaining(&self) -> usize {
        self.commands.len()
    }
}

impl DecisionStrategy for ScriptedStrategy {
    fn next_command<'a>(
        &'a mut self,
        _state: &'a GameState,
        _error_mode: bool,
        _last_command: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Decision>>> + Send + 'a>> {
        Box::pin(async move {
            Ok(self.commands.pop_front().map(|command| Decision {
                command,
                rationale: None,
            }))
        })
    }
}
