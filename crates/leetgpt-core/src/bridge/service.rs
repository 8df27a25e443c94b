use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::relay::Relay;
use crate::popup::session::SessionManager;
use crate::protocol::{Action, Envelope, Origin, Port, Reply};

const INBOX_CAPACITY: usize = 64;

/// The background context: the only place that talks to the network.
pub struct Bridge {
    relay: Relay,
    sessions: Option<SessionManager>,
}

impl Bridge {
    pub fn new(relay: Relay) -> Self {
        Self {
            relay,
            sessions: None,
        }
    }

    /// Let `clearChat` notifications drop the sender tab's stored transcript.
    pub fn with_sessions(mut self, sessions: SessionManager) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Start the background loop. It runs until every `Port` is dropped.
    pub fn spawn(self) -> (Port, JoinHandle<()>) {
        let (port, inbox) = Port::channel(INBOX_CAPACITY);
        let handle = tokio::spawn(self.run(inbox));
        (port, handle)
    }

    async fn run(self, mut inbox: mpsc::Receiver<Envelope>) {
        info!("bridge started");
        while let Some(envelope) = inbox.recv().await {
            self.dispatch(envelope);
        }
        info!("bridge stopped");
    }

    fn dispatch(&self, envelope: Envelope) {
        match &envelope.action {
            Action::CallOpenAi(request) => {
                let relay = self.relay.clone();
                let request = request.clone();
                debug!(
                    origin = ?envelope.origin,
                    model = %request.body.model,
                    "relaying completion request"
                );
                // The spawned task owns the reply sender until the exchange is done.
                tokio::spawn(async move {
                    let response = relay.relay(request).await;
                    envelope.respond(Reply::Relay(response));
                });
            }
            Action::ClearChat => match (envelope.origin, self.sessions.clone()) {
                (Origin::Tab(tab), Some(sessions)) => {
                    // Acked only once the transcript is gone.
                    tokio::spawn(async move {
                        if let Err(e) = sessions.clear(tab).await {
                            warn!(tab, error = %e, "failed to clear chat history");
                        }
                        envelope.respond(Reply::Ack {});
                    });
                }
                _ => envelope.respond(Reply::Ack {}),
            },
            Action::GetHelp { .. } | Action::GetProblemInfo | Action::ToggleSidebar => {
                warn!(
                    action = envelope.action.name(),
                    "action is handled by the page agent, not the bridge"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::popup::store::MemoryStore;
    use crate::protocol::{CompletionBody, RelayRequest};
    use crate::state::ChatMessage;
    use crate::error::AssistantError;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_bridge_relays_and_replies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let (port, _handle) = Bridge::new(Relay::new()).spawn();
        let action = Action::CallOpenAi(RelayRequest {
            config: RelayConfig {
                endpoint: server.uri(),
                api_key: "sk".to_string(),
            },
            body: CompletionBody {
                model: "gpt-4o".to_string(),
                messages: Vec::new(),
            },
        });
        let reply = port
            .request(Origin::Tab(1), action, Duration::from_secs(5))
            .await
            .unwrap();
        match reply {
            Reply::Relay(resp) => assert_eq!(resp.status, 200),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clear_chat_removes_sender_history() {
        let store = Arc::new(MemoryStore::new());
        let sessions = SessionManager::new(store.clone());
        sessions.save(4, &[ChatMessage::user("stale")]).await.unwrap();
        sessions.save(5, &[ChatMessage::user("other")]).await.unwrap();

        let (port, _handle) = Bridge::new(Relay::new())
            .with_sessions(sessions.clone())
            .spawn();
        let reply = port
            .request(Origin::Tab(4), Action::ClearChat, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, Reply::Ack {});
        assert!(sessions.load(4).await.unwrap().is_empty());
        assert_eq!(sessions.load(5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_page_actions_are_not_answered() {
        let (port, _handle) = Bridge::new(Relay::new()).spawn();
        let err = port
            .request(Origin::Popup, Action::GetProblemInfo, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, AssistantError::ChannelBroken);
    }
}
