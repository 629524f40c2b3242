//! LLM-backed decision strategy and its chat-completions client.
//!
//! The HTTP client is isolated behind [`CompletionBackend`] and adapts the
//! endpoint's response into a plain [`CompletionText`] so the rest of the
//! agent never sees endpoint-library quirks. The one quirk handled here is
//! the token-limit parameter name: newer servers want
//! `max_completion_tokens`, older ones want `max_tokens`, and a server that
//! rejects the first gets exactly one retry with the second.

use std::future::Future;
use std::pin::Pin;

use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{prompt, ChatRole, ChatTurn, ConversationHistory, Decision, DecisionStrategy};
use crate::command::sanitize;
use crate::parser::GameState;

/// Returned when the endpoint fails for any non-parameter reason; keeps the
/// session alive instead of raising.
pub const FALLBACK_COMMAND: &str = "look";

/// Token budget tuned for a short imperative command.
const COMMAND_TOKEN_BUDGET: u32 = 50;

/// Stop at sentence/line boundaries; the model should emit one command.
const STOP_SEQUENCES: &[&str] = &["\n", ".", "?", "!"];

const DEFAULT_MAX_EXCHANGES: usize = 20;

/// Explicit result type at the agent boundary (whatever the endpoint
/// returns is adapted into this).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionText {
    pub content: String,
}

pub trait CompletionBackend: Send + Sync {
    fn complete<'a>(
        &'a self,
        messages: Vec<ChatTurn>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CompletionText>> + Send + 'a>>;
}

#[derive(Debug, Clone)]
pub struct ChatEndpointConfig {
    /// Base URL, e.g. `http://localhost:8000/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenLimitField {
    MaxCompletionTokens,
    MaxTokens,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    stop: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    /// Left unset: some endpoints reject temperature overrides, so the
    /// model default is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl<'a> ChatRequest<'a> {
    fn new(model: &'a str, messages: &'a [ChatTurn], field: TokenLimitField) -> Self {
        let (max_completion_tokens, max_tokens) = match field {
            TokenLimitField::MaxCompletionTokens => (Some(COMMAND_TOKEN_BUDGET), None),
            TokenLimitField::MaxTokens => (None, Some(COMMAND_TOKEN_BUDGET)),
        };
        Self {
            model,
            messages,
            stop: STOP_SEQUENCES,
            max_completion_tokens,
            max_tokens,
            temperature: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// A failure attributable to the server rejecting the newer token-limit
/// parameter name (the only failure retried at this layer).
fn is_token_limit_param_error(err: &anyhow::Error) -> bool {
    format!("{err:#}").contains("max_completion_tokens")
}

/// OpenAI-style `POST {base_url}/chat/completions` client.
pub struct HttpChatClient {
    client: Client,
    cfg: ChatEndpointConfig,
}

impl HttpChatClient {
    pub fn new(cfg: ChatEndpointConfig) -> Self {
        Self {
            client: Client::new(),
            cfg,
        }
    }

    async fn request_once(
        &self,
        messages: &[ChatTurn],
        field: TokenLimitField,
    ) -> anyhow::Result<CompletionText> {
        let body = ChatRequest::new(&self.cfg.model, messages, field);

        debug!(model = %self.cfg.model, ?field, "sending completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.cfg.base_url))
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .context("completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("completion endpoint returned {status}: {error_body}");
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to decode completion response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("completion response had no choices"))?;

        Ok(CompletionText { content })
    }
}

impl CompletionBackend for HttpChatClient {
    fn complete<'a>(
        &'a self,
        messages: Vec<ChatTurn>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CompletionText>> + Send + 'a>> {
        Box::pin(async move {
            match self
                .request_once(&messages, TokenLimitField::MaxCompletionTokens)
                .await
            {
                Ok(text) => Ok(text),
                Err(err) if is_token_limit_param_error(&err) => {
                    debug!("retrying with the max_tokens parameter name");
                    self.request_once(&messages, TokenLimitField::MaxTokens)
                        .await
                }
                Err(err) => Err(err),
            }
        })
    }
}

/// LLM-backed strategy: frames the interpreted state as a user turn, queries
/// the backend with the bounded history, and sanitizes the completion into a
/// command.
pub struct LlmStrategy<B> {
    backend: B,
    system_prompt: String,
    history: ConversationHistory,
}

impl<B: CompletionBackend> LlmStrategy<B> {
    pub fn new(backend: B) -> Self {
        Self::with_max_exchanges(backend, DEFAULT_MAX_EXCHANGES)
    }

    pub fn with_max_exchanges(backend: B, max_exchanges: usize) -> Self {
        Self {
            backend,
            system_prompt: prompt::SYSTEM_PROMPT.to_string(),
            history: ConversationHistory::new(max_exchanges),
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    fn build_messages(&self) -> Vec<ChatTurn> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(ChatTurn {
            role: ChatRole::System,
            content: self.system_prompt.clone(),
        });
        messages.extend(self.history.turns().cloned());
        messages
    }
}

impl<B: CompletionBackend> DecisionStrategy for LlmStrategy<B> {
    fn next_command<'a>(
        &'a mut self,
        state: &'a GameState,
        error_mode: bool,
        last_command: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Decision>>> + Send + 'a>> {
        Box::pin(async move {
            let user_message = match (error_mode, last_command) {
                (true, Some(last)) => {
                    prompt::build_error_recovery_message(last, &state.cleaned_text)
                }
                _ => prompt::build_state_message(&state.cleaned_text),
            };
            self.history.push_user(user_message);

            let raw = match self.backend.complete(self.build_messages()).await {
                Ok(text) => text.content,
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "completion failed, falling back");
                    return Ok(Some(Decision {
                        command: FALLBACK_COMMAND.to_string(),
                        rationale: None,
                    }));
                }
            };

            let command = sanitize(&raw);
            self.history.push_assistant(command.clone());
            Ok(Some(Decision {
                command,
                rationale: Some(raw),
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::parser::GameParser;

    #[derive(Default)]
    struct FakeBackend {
        responses: Mutex<VecDeque<anyhow::Result<CompletionText>>>,
        requests: Mutex<Vec<Vec<ChatTurn>>>,
    }

    impl FakeBackend {
        fn push_response(&self, content: impl Into<String>) {
            self.responses.lock().unwrap().push_back(Ok(CompletionText {
                content: content.into(),
            }));
        }

        fn push_error(&self, msg: &str) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(anyhow::anyhow!("{msg}")));
        }
    }

    impl CompletionBackend for &FakeBackend {
        fn complete<'a>(
            &'a self,
            messages: Vec<ChatTurn>,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<CompletionText>> + Send + 'a>> {
            Box::pin(async move {
                self.requests.lock().unwrap().push(messages);
                self.responses
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| anyhow::bail!("no response queued"))
            })
        }
    }

    fn state_for(text: &str) -> crate::parser::GameState {
        GameParser::new().interpret(text)
    }

    #[tokio::test]
    async fn completion_is_sanitized_and_recorded_as_assistant_turn() {
        let backend = FakeBackend::default();
        backend.push_response("Command: open mailbox");
        let mut strategy = LlmStrategy::new(&backend);

        let state = state_for("West of House");
        let decision = strategy
            .next_command(&state, false, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decision.command, "open mailbox");
        assert_eq!(decision.rationale.as_deref(), Some("Command: open mailbox"));

        let turns: Vec<_> = strategy.history().turns().cloned().collect();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, ChatRole::User);
        assert_eq!(turns[1].role, ChatRole::Assistant);
        assert_eq!(turns[1].content, "open mailbox");
    }

    #[tokio::test]
    async fn system_prompt_is_prepended_but_never_stored() {
        let backend = FakeBackend::default();
        backend.push_response("north");
        let mut strategy = LlmStrategy::new(&backend);

        let state = state_for("West of House");
        strategy.next_command(&state, false, None).await.unwrap();

        let requests = backend.requests.lock().unwrap();
        let messages = &requests[0];
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(strategy
            .history()
            .turns()
            .all(|t| t.role != ChatRole::System));
    }

    #[tokio::test]
    async fn error_mode_uses_recovery_framing_with_the_failed_command() {
        let backend = FakeBackend::default();
        backend.push_response("n");
        let mut strategy = LlmStrategy::new(&backend);

        let state = state_for("I don't know the word \"frobnicate\".");
        strategy
            .next_command(&state, true, Some("frobnicate mailbox"))
            .await
            .unwrap();

        let requests = backend.requests.lock().unwrap();
        let user_turn = &requests[0][1];
        assert!(user_turn.content.contains("didn't understand"));
        assert!(user_turn.content.contains("\"frobnicate mailbox\""));
    }

    #[tokio::test]
    async fn backend_failure_falls_back_to_look_without_assistant_turn() {
        let backend = FakeBackend::default();
        backend.push_error("connection refused");
        let mut strategy = LlmStrategy::new(&backend);

        let state = state_for("West of House");
        let decision = strategy
            .next_command(&state, false, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decision.command, FALLBACK_COMMAND);
        assert_eq!(decision.rationale, None);
        // The user turn stays; no assistant turn was appended.
        assert_eq!(strategy.history().len(), 1);
    }

    #[tokio::test]
    async fn history_stays_bounded_over_many_turns() {
        let backend = FakeBackend::default();
        let mut strategy = LlmStrategy::with_max_exchanges(&backend, 2);
        let state = state_for("West of House");
        for _ in 0..10 {
            backend.push_response("north");
            strategy.next_command(&state, false, None).await.unwrap();
            assert!(strategy.history().len() <= 4);
        }
    }

    #[test]
    fn request_serializes_the_selected_token_limit_field() {
        let messages = vec![ChatTurn {
            role: ChatRole::User,
            content: "hi".to_string(),
        }];
        let newer = ChatRequest::new("m", &messages, TokenLimitField::MaxCompletionTokens);
        let json = serde_json::to_value(&newer).unwrap();
        assert_eq!(json["max_completion_tokens"], 50);
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("temperature").is_none());

        let older = ChatRequest::new("m", &messages, TokenLimitField::MaxTokens);
        let json = serde_json::to_value(&older).unwrap();
        assert_eq!(json["max_tokens"], 50);
        assert!(json.get("max_completion_tokens").is_none());
    }

    #[test]
    fn token_limit_errors_are_recognized_by_parameter_name() {
        let err = anyhow::anyhow!("endpoint returned 400: unsupported parameter max_completion_tokens");
        assert!(is_token_limit_param_error(&err));
        let err = anyhow::anyhow!("endpoint returned 500: internal error");
        assert!(!is_token_limit_param_error(&err));
    }
}
