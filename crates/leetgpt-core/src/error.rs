use thiserror::Error;

const RATE_LIMITED: &str = "You are sending requests too quickly or have hit your usage limit. \
Please wait a moment and try again.";
const CONFIG_MISSING: &str = "API key not configured. \
Set OPENAI_API_KEY or add \"api_key\" to your leetcode-gpt config.json.";

/// Every way a chat turn can fail. Each one resolves to a message shown in
/// the transcript instead of bubbling out of the context that hit it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssistantError {
    #[error("request could not be completed: {0}")]
    Transport(String),

    #[error("upstream rate limit reached")]
    RateLimited,

    #[error("upstream error: {}", .message.as_deref().unwrap_or("unknown"))]
    Upstream { status: u16, message: Option<String> },

    #[error("unexpected completion payload")]
    UnexpectedResponse,

    #[error("API key or endpoint is not configured")]
    ConfigMissing,

    #[error("receiving context no longer exists")]
    ChannelBroken,

    #[error("no reply after {0} seconds")]
    Timeout(u64),
}

impl AssistantError {
    /// Text displayed to the user in place of an answer.
    pub fn user_message(&self) -> String {
        match self {
            AssistantError::Transport(_) => {
                "Sorry, I encountered an error. Please try again.".to_string()
            }
            AssistantError::RateLimited => RATE_LIMITED.to_string(),
            AssistantError::Upstream { message, .. } => format!(
                "OpenAI API error: {}",
                message.as_deref().unwrap_or("Unknown error.")
            ),
            AssistantError::UnexpectedResponse => "Unexpected API response format".to_string(),
            AssistantError::ConfigMissing => CONFIG_MISSING.to_string(),
            AssistantError::ChannelBroken => {
                "Please refresh the LeetCode page and try again.".to_string()
            }
            AssistantError::Timeout(_) => {
                "The assistant took too long to respond. Please try again.".to_string()
            }
        }
    }

    /// Short machine-readable tag, carried in failed `getHelp` replies.
    pub fn kind(&self) -> &'static str {
        match self {
            AssistantError::Transport(_) => "transport",
            AssistantError::RateLimited => "rate_limited",
            AssistantError::Upstream { .. } => "upstream",
            AssistantError::UnexpectedResponse => "unexpected_response",
            AssistantError::ConfigMissing => "config_missing",
            AssistantError::ChannelBroken => "channel_broken",
            AssistantError::Timeout(_) => "timeout",
        }
    }
}
