use anyhow::Result;
use tracing::{debug, warn};

use crate::error::AssistantError;
use crate::format::RenderFormat;
use crate::host::ExtensionHost;
use crate::page::extract::is_problem_page;
use crate::protocol::{Action, Origin, Reply, TabId};
use crate::render::{escape_text, render_assistant};
use crate::state::ChatMessage;

pub const WELCOME: &str =
    "Hi! I'm here to help you solve this LeetCode problem. What would you like to know?";
pub const NOT_A_PROBLEM_PAGE: &str =
    "Please navigate to a LeetCode problem page to use this extension.";
pub const GENERIC_FAILURE: &str = "Sorry, I encountered an error. Please try again.";

/// One rendered line of the popup transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupLine {
    pub is_user: bool,
    pub html: String,
}

/// The toolbar popup: a second chat front-end with its own per-tab history.
pub struct Popup {
    host: ExtensionHost,
    format: RenderFormat,
    tab: Option<TabId>,
    history: Vec<ChatMessage>,
    lines: Vec<PopupLine>,
}

impl Popup {
    /// Show the active tab's stored conversation under the welcome line.
    pub async fn open(host: ExtensionHost) -> Result<Self> {
        let tab = host.active_tab();
        let history = match tab {
            Some(tab) => host.sessions().load(tab).await?,
            None => Vec::new(),
        };
        debug!(?tab, messages = history.len(), "popup opened");

        let mut popup = Self {
            format: host.config().format,
            host,
            tab,
            history,
            lines: Vec::new(),
        };
        popup.render_history();
        Ok(popup)
    }

    pub fn lines(&self) -> &[PopupLine] {
        &self.lines
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Ask the active tab's page agent. Failures end up as a line in the
    /// transcript; only store errors are returned.
    pub async fn send(&mut self, message: &str) -> Result<()> {
        let message = message.trim();
        if message.is_empty() {
            return Ok(());
        }

        let Some(tab) = self.host.active_tab() else {
            self.notice(NOT_A_PROBLEM_PAGE);
            return Ok(());
        };
        let on_problem = self
            .host
            .tab_url(tab)
            .await
            .is_some_and(|url| is_problem_page(&url));
        if !on_problem {
            self.notice(NOT_A_PROBLEM_PAGE);
            return Ok(());
        }
        if self.tab != Some(tab) {
            self.tab = Some(tab);
            self.history = self.host.sessions().load(tab).await?;
        }

        if let Err(e) = self.host.inject(tab).await {
            debug!(tab, error = %e, "page agent injection failed");
        }

        self.history.push(ChatMessage::user(message));
        self.host.sessions().save(tab, &self.history).await?;
        self.render_history();

        let action = Action::GetHelp {
            message: message.to_string(),
            chat_history: self.history.clone(),
        };
        match self.host.send_to_tab(tab, Origin::Popup, action).await {
            Ok(Reply::Help { answer, error: None }) if !answer.is_empty() => {
                self.history.push(ChatMessage::assistant(answer));
                self.host.sessions().save(tab, &self.history).await?;
                self.render_history();
            }
            Ok(Reply::Help { answer, error: Some(error) }) if !answer.is_empty() => {
                warn!(tab, %error, "page agent could not answer");
                self.notice(&answer);
            }
            Ok(other) => {
                warn!(tab, ?other, "unusable answer from page agent");
                self.notice(GENERIC_FAILURE);
            }
            Err(AssistantError::ChannelBroken) => {
                self.notice(&AssistantError::ChannelBroken.user_message());
            }
            Err(e) => {
                warn!(tab, error = %e, "getHelp failed");
                self.notice(GENERIC_FAILURE);
            }
        }
        Ok(())
    }

    /// Title of the problem in the active tab.
    pub async fn problem_title(&self) -> Result<String, AssistantError> {
        let tab = self.host.active_tab().ok_or(AssistantError::ChannelBroken)?;
        match self
            .host
            .send_to_tab(tab, Origin::Popup, Action::GetProblemInfo)
            .await?
        {
            Reply::ProblemInfo { title } => Ok(title),
            _ => Err(AssistantError::UnexpectedResponse),
        }
    }

    fn render_history(&mut self) {
        self.lines.clear();
        self.lines.push(PopupLine {
            is_user: false,
            html: escape_text(WELCOME),
        });
        for msg in &self.history {
            let html = if msg.is_user {
                escape_text(&msg.content)
            } else {
                render_assistant(&msg.content, self.format)
            };
            self.lines.push(PopupLine {
                is_user: msg.is_user,
                html,
            });
        }
    }

    /// Shown until the next re-render; never stored.
    fn notice(&mut self, text: &str) {
        self.lines.push(PopupLine {
            is_user: false,
            html: escape_text(text),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::popup::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const URL: &str = "https://leetcode.com/problems/two-sum/";
    const PAGE: &str = r#"<html><body><div class="text-title-large">1. Two Sum</div></body></html>"#;

    async fn host_with(response: ResponseTemplate) -> (ExtensionHost, MockServer) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(response)
            .mount(&server)
            .await;
        let mut config = Config::new();
        config.endpoint = Some(server.uri());
        config.api_key = Some("sk-test".to_string());
        config.reply_timeout_secs = 5;
        (ExtensionHost::new(config, Arc::new(MemoryStore::new())), server)
    }

    fn answer(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    #[tokio::test]
    async fn test_open_shows_welcome_then_history() {
        let (host, _server) = host_with(answer("unused")).await;
        let tab = host.open_tab(URL, PAGE).await;
        host.sessions()
            .save(tab, &[ChatMessage::user("<hi>"), ChatMessage::assistant("<p>Hello</p>")])
            .await
            .unwrap();

        let popup = Popup::open(host).await.unwrap();
        let lines: Vec<_> = popup.lines().iter().map(|l| l.html.as_str()).collect();
        assert_eq!(lines, vec![escape_text(WELCOME).as_str(), "&lt;hi&gt;", "<p>Hello</p>"]);
    }

    #[tokio::test]
    async fn test_send_persists_answer() {
        let (host, _server) = host_with(answer("<p>Use a map.</p>")).await;
        let tab = host.open_tab(URL, PAGE).await;

        let mut popup = Popup::open(host.clone()).await.unwrap();
        popup.send("  How do I start?  ").await.unwrap();

        assert_eq!(
            host.sessions().load(tab).await.unwrap(),
            vec![
                ChatMessage::user("How do I start?"),
                ChatMessage::assistant("<p>Use a map.</p>")
            ]
        );
        assert_eq!(popup.lines().len(), 3);
        assert_eq!(popup.problem_title().await.unwrap(), "1. Two Sum");
    }

    #[tokio::test]
    async fn test_rejects_non_problem_pages() {
        let (host, _server) = host_with(answer("unused")).await;
        let tab = host.open_tab("https://leetcode.com/problemset/", "<html></html>").await;

        let mut popup = Popup::open(host.clone()).await.unwrap();
        popup.send("hello").await.unwrap();

        assert_eq!(popup.lines().last().unwrap().html, escape_text(NOT_A_PROBLEM_PAGE));
        assert!(host.sessions().load(tab).await.unwrap().is_empty());
        assert!(host.agent(tab).await.is_none());
    }

    #[tokio::test]
    async fn test_error_answer_is_shown_not_stored() {
        let (host, _server) = host_with(
            ResponseTemplate::new(429).set_body_json(json!({"error": {"message": "slow down"}})),
        )
        .await;
        let tab = host.open_tab(URL, PAGE).await;

        let mut popup = Popup::open(host.clone()).await.unwrap();
        popup.send("How do I start?").await.unwrap();

        let last = popup.lines().last().unwrap();
        assert!(last.html.contains("too quickly"));
        assert_eq!(
            host.sessions().load(tab).await.unwrap(),
            vec![ChatMessage::user("How do I start?")]
        );
    }

    #[tokio::test]
    async fn test_blank_message_is_ignored() {
        let (host, _server) = host_with(answer("unused")).await;
        let tab = host.open_tab(URL, PAGE).await;
        let mut popup = Popup::open(host.clone()).await.unwrap();
        popup.send("   ").await.unwrap();
        assert_eq!(popup.lines().len(), 1);
        assert!(host.sessions().load(tab).await.unwrap().is_empty());
    }
}
