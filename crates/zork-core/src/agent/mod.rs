//! Decision strategies: given an interpreted game state, pick the next
//! command.
//!
//! The two variants (pre-loaded walkthrough script, LLM-backed agent) sit
//! behind the same [`DecisionStrategy`] trait so the session loop never
//! branches on a mode flag.

pub mod llm;
pub mod prompt;
pub mod scripted;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::parser::GameState;

pub use llm::{ChatEndpointConfig, CompletionBackend, HttpChatClient, LlmStrategy};
pub use scripted::ScriptedStrategy;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One conversational turn; doubles as the wire `messages` entry for the
/// completion endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Bounded FIFO of user/assistant turns. The system instruction is never
/// stored here; it is held separately and prepended at query time.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<ChatTurn>,
    max_exchanges: usize,
}

impl ConversationHistory {
    pub fn new(max_exchanges: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_exchanges,
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(ChatRole::User, content.into());
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(ChatRole::Assistant, content.into());
    }

    fn push(&mut self, role: ChatRole, content: String) {
        self.turns.push_back(ChatTurn { role, content });
        // Re-establish the bound, oldest entries first.
        while self.turns.len() > self.max_exchanges * 2 {
            self.turns.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> impl Iterator<Item = &ChatTurn> {
        self.turns.iter()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// A strategy's answer for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Sanitized command ready to transmit.
    pub command: String,
    /// Raw model output, when there is one, for the structured turn log.
    pub rationale: Option<String>,
}

/// Seam between the session loop and whatever picks commands.
///
/// `error_mode` is set by the orchestrator while the current state signals a
/// command error and the consecutive-error counter is still under the abort
/// threshold. `Ok(None)` means the strategy has nothing left (a consumed
/// script) and ends the session.
pub trait DecisionStrategy: Send {
    fn next_command<'a>(
        &'a mut self,
        state: &'a GameState,
        error_mode: bool,
        last_command: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Decision>>> + Send + 'a>>;
}
