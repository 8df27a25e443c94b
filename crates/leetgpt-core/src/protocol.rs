//! Messages exchanged between the page agent, the bridge and the popup.
//!
//! Every context owns an inbox (`Port`). A request that expects an answer
//! carries a oneshot sender; whoever handles it owns that sender until the
//! answer is ready, however much async work that takes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::config::RelayConfig;
use crate::error::AssistantError;
use crate::state::{ChatMessage, ChatRole};

pub type TabId = u64;

/// A message in the completion API's `messages` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: ChatRole,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self::new(msg.role(), msg.content.clone())
    }
}

/// Body of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionBody {
    pub model: String,
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub config: RelayConfig,
    pub body: CompletionBody,
}

/// What the bridge hands back: the HTTP status and the parsed body,
/// uninterpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayResponse {
    pub status: u16,
    pub data: Value,
}

impl RelayResponse {
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            data: serde_json::json!({ "error": message.into() }),
        }
    }
}

/// Every action a context can be asked to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Action {
    #[serde(rename = "callOpenAI")]
    CallOpenAi(RelayRequest),
    #[serde(rename = "getHelp", rename_all = "camelCase")]
    GetHelp {
        message: String,
        #[serde(default)]
        chat_history: Vec<ChatMessage>,
    },
    #[serde(rename = "getProblemInfo")]
    GetProblemInfo,
    #[serde(rename = "toggleLeetCodeGPT")]
    ToggleSidebar,
    #[serde(rename = "clearChat")]
    ClearChat,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::CallOpenAi(_) => "callOpenAI",
            Action::GetHelp { .. } => "getHelp",
            Action::GetProblemInfo => "getProblemInfo",
            Action::ToggleSidebar => "toggleLeetCodeGPT",
            Action::ClearChat => "clearChat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Relay(RelayResponse),
    Help {
        answer: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ProblemInfo {
        title: String,
    },
    Ack {},
}

/// Which context sent an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Tab(TabId),
    Popup,
    Background,
}

#[derive(Debug)]
pub struct Envelope {
    pub action: Action,
    pub origin: Origin,
    pub reply: oneshot::Sender<Reply>,
}

impl Envelope {
    /// Answer the sender, if it is still waiting.
    pub fn respond(self, reply: Reply) {
        let _ = self.reply.send(reply);
    }
}

/// Inbox of a running context.
#[derive(Debug, Clone)]
pub struct Port {
    tx: mpsc::Sender<Envelope>,
}

impl Port {
    pub fn channel(capacity: usize) -> (Port, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Port { tx }, rx)
    }

    /// Send an action and wait for its reply.
    pub async fn request(
        &self,
        origin: Origin,
        action: Action,
        timeout: Duration,
    ) -> Result<Reply, AssistantError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope {
            action,
            origin,
            reply: reply_tx,
        };
        self.tx
            .send(envelope)
            .await
            .map_err(|_| AssistantError::ChannelBroken)?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(AssistantError::ChannelBroken),
            Err(_) => Err(AssistantError::Timeout(timeout.as_secs())),
        }
    }
}
