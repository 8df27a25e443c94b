//! Turn-by-turn state of the sidebar conversation.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::AssistantError;
use crate::format::RenderFormat;
use crate::prompt::{first_turn_prompt, follow_up_prompt, system_prompt};
use crate::protocol::{CompletionBody, RelayResponse, WireMessage};
use crate::state::{ChatMessage, ChatRole, ProblemContext};

pub const GENERIC_WELCOME: &str =
    "Hi! I'm here to help you solve this LeetCode problem. What would you like to know?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    NotStarted,
    FirstTurn,
    SubsequentTurns,
}

/// A turn that has been sent and not yet answered.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTurn {
    pub id: u64,
    pub body: CompletionBody,
}

#[derive(Debug, Clone)]
pub struct ConversationEngine {
    state: ConversationState,
    format: RenderFormat,
    model: String,
    /// What the user sees, in order.
    history: Vec<ChatMessage>,
    /// What the model has been sent, in the same order.
    replay: Vec<WireMessage>,
    next_turn: u64,
}

impl ConversationEngine {
    pub fn new(format: RenderFormat, model: impl Into<String>) -> Self {
        Self {
            state: ConversationState::NotStarted,
            format,
            model: model.into(),
            history: Vec::new(),
            replay: Vec::new(),
            next_turn: 1,
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn format(&self) -> RenderFormat {
        self.format
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Start the conversation and return the greeting shown in the sidebar.
    pub fn open(&mut self, context: &ProblemContext) -> String {
        if self.state == ConversationState::NotStarted {
            self.state = ConversationState::FirstTurn;
        }
        if context.title.is_empty() {
            GENERIC_WELCOME.to_string()
        } else {
            format!(
                "Hi! I'm here to help you with \"{}\". What would you like to know?",
                context.title
            )
        }
    }

    /// Record the user's message and build the completion request for it.
    ///
    /// The first turn sends the whole problem; later ones only the code,
    /// which the caller extracts fresh.
    pub fn begin_turn(&mut self, message: &str, context: &ProblemContext) -> PendingTurn {
        self.history.push(ChatMessage::user(message));

        let prompt = match self.state {
            ConversationState::NotStarted | ConversationState::FirstTurn => {
                self.state = ConversationState::SubsequentTurns;
                first_turn_prompt(context, message)
            }
            ConversationState::SubsequentTurns => {
                follow_up_prompt(&context.current_code, message)
            }
        };

        let mut messages = Vec::with_capacity(self.replay.len() + 2);
        messages.push(WireMessage::new(ChatRole::System, system_prompt(self.format)));
        messages.extend(self.replay.iter().cloned());
        messages.push(WireMessage::new(ChatRole::User, prompt.clone()));
        self.replay.push(WireMessage::new(ChatRole::User, prompt));

        let id = self.next_turn;
        self.next_turn += 1;
        debug!(turn = id, messages = messages.len(), "turn started");

        PendingTurn {
            id,
            body: CompletionBody {
                model: self.model.clone(),
                messages,
            },
        }
    }

    /// Record a successful answer.
    pub fn complete_turn(&mut self, answer: &str) {
        self.history.push(ChatMessage::assistant(answer));
        self.replay
            .push(WireMessage::new(ChatRole::Assistant, answer.to_string()));
    }
}

/// Pull the answer out of a relayed completion, or say why there is none.
pub fn interpret(response: &RelayResponse) -> Result<String, AssistantError> {
    let data = &response.data;

    if response.status == 429 {
        warn!(error = ?data.get("error"), "completion API rate limit hit");
        return Err(AssistantError::RateLimited);
    }
    if let Some(Value::String(message)) = data.get("error") {
        warn!(status = response.status, error = %message, "relay transport failure");
        return Err(AssistantError::Transport(message.clone()));
    }
    if let Some(error) = data.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        warn!(status = response.status, ?message, "completion API error");
        return Err(AssistantError::Upstream {
            status: response.status,
            message,
        });
    }
    if !(200..300).contains(&response.status) {
        warn!(status = response.status, "completion API returned an error status");
        return Err(AssistantError::Upstream {
            status: response.status,
            message: None,
        });
    }

    match data
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        Some(content) => Ok(content.to_string()),
        None => {
            warn!(%data, "unexpected completion payload");
            Err(AssistantError::UnexpectedResponse)
        }
    }
}
