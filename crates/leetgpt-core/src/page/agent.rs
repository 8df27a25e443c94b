//! One agent per problem page: owns the sidebar and the conversation, and
//! answers the actions other contexts address to the tab.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AssistantError;
use crate::page::conversation::{interpret, ConversationEngine};
use crate::page::document::{MutationBatch, PageDocument, SharedDocument};
use crate::page::extract::{extract_context, extract_title};
use crate::page::sidebar::{Sidebar, SidebarEntry};
use crate::prompt::help_messages;
use crate::protocol::{
    Action, CompletionBody, Envelope, Origin, Port, RelayRequest, Reply, TabId,
};
use crate::render::render_assistant;
use crate::state::{ChatMessage, ProblemContext};

const INBOX_CAPACITY: usize = 16;
const TICK: Duration = Duration::from_millis(300);

pub struct PageAgent {
    inner: Arc<AgentInner>,
    port: Port,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct AgentInner {
    tab: TabId,
    document: SharedDocument,
    bridge: Port,
    config: Arc<Config>,
    sidebar: Mutex<Sidebar>,
    engine: Mutex<ConversationEngine>,
}

impl PageAgent {
    /// Build the sidebar into `document` and start listening.
    ///
    /// Tells the bridge the page (re)loaded so the tab's stored transcript
    /// starts over.
    pub async fn inject(
        tab: TabId,
        document: SharedDocument,
        bridge: Port,
        config: Arc<Config>,
    ) -> Self {
        let mut engine = ConversationEngine::new(config.format, config.model.clone());

        let (sidebar, mutations) = {
            let mut doc = document.lock();
            let context = extract_context(&doc.parse());
            let mut sidebar = Sidebar::new(&engine.open(&context));
            sidebar.ensure_injected(&mut doc);
            (sidebar, doc.subscribe())
        };
        info!(tab, url = %document.lock().url(), "page agent injected");

        // Wait for the ack so a transcript saved right after this is not
        // wiped by a late clear.
        if let Err(e) = bridge
            .request(Origin::Tab(tab), Action::ClearChat, config.reply_timeout())
            .await
        {
            warn!(tab, error = %e, "could not announce page load");
        }

        let inner = Arc::new(AgentInner {
            tab,
            document,
            bridge,
            config,
            sidebar: Mutex::new(sidebar),
            engine: Mutex::new(engine),
        });

        let (port, inbox) = Port::channel(INBOX_CAPACITY);
        let tasks = vec![
            tokio::spawn(watch(inner.clone(), mutations)),
            tokio::spawn(serve(inner.clone(), inbox)),
        ];

        Self {
            inner,
            port,
            tasks: Mutex::new(tasks),
        }
    }

    pub fn tab(&self) -> TabId {
        self.inner.tab
    }

    /// Inbox for actions addressed to this tab.
    pub fn port(&self) -> Port {
        self.port.clone()
    }

    pub fn document(&self) -> SharedDocument {
        self.inner.document.clone()
    }

    pub fn is_visible(&self) -> bool {
        self.inner.sidebar.lock().is_visible()
    }

    pub fn transcript(&self) -> Vec<SidebarEntry> {
        self.inner.sidebar.lock().entries().to_vec()
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.inner.engine.lock().history().to_vec()
    }

    pub fn toggle(&self) -> bool {
        self.inner.toggle()
    }

    /// Ask a question from the sidebar. The outcome is also written into the
    /// transcript, an error as a notice in place of the answer.
    pub async fn send(&self, message: &str) -> Result<String, AssistantError> {
        self.inner.send(message).await
    }

    /// Stop the agent's tasks. The page keeps whatever it shows.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Stop the agent's tasks and take the sidebar off the page.
    pub fn teardown(&self) {
        self.shutdown();
        let mut doc = self.inner.document.lock();
        self.inner.sidebar.lock().detach(&mut *doc);
        info!(tab = self.inner.tab, "page agent torn down");
    }
}

impl Drop for PageAgent {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl AgentInner {
    fn context(&self) -> ProblemContext {
        extract_context(&self.document.lock().parse())
    }

    /// Document before sidebar, everywhere.
    fn with_sidebar<R>(&self, f: impl FnOnce(&mut Sidebar, &mut PageDocument) -> R) -> R {
        let mut doc = self.document.lock();
        let mut sidebar = self.sidebar.lock();
        f(&mut *sidebar, &mut *doc)
    }

    fn toggle(&self) -> bool {
        let visible = self.with_sidebar(|sidebar, doc| sidebar.toggle(doc));
        debug!(tab = self.tab, visible, "sidebar toggled");
        visible
    }

    async fn send(&self, message: &str) -> Result<String, AssistantError> {
        let context = self.context();
        let turn = self.engine.lock().begin_turn(message, &context);
        self.with_sidebar(|sidebar, doc| {
            sidebar.push_user(message);
            sidebar.push_placeholder(turn.id);
            sidebar.refresh(doc);
        });

        let result = self.complete_with_animation(turn.id, turn.body).await;

        match &result {
            Ok(answer) => {
                let format = {
                    let mut engine = self.engine.lock();
                    engine.complete_turn(answer);
                    engine.format()
                };
                let html = render_assistant(answer, format);
                self.with_sidebar(|sidebar, doc| {
                    sidebar.resolve(turn.id, html);
                    sidebar.refresh(doc);
                });
            }
            Err(e) => {
                warn!(tab = self.tab, turn = turn.id, error = %e, "turn failed");
                let text = e.user_message();
                self.with_sidebar(|sidebar, doc| {
                    sidebar.fail(turn.id, &text);
                    sidebar.refresh(doc);
                });
            }
        }
        result
    }

    async fn complete_with_animation(
        &self,
        turn: u64,
        body: CompletionBody,
    ) -> Result<String, AssistantError> {
        let request = self.complete(body);
        tokio::pin!(request);

        let mut ticker = tokio::time::interval(TICK);
        ticker.tick().await;
        let mut frame = 0usize;

        loop {
            tokio::select! {
                result = &mut request => return result,
                _ = ticker.tick() => {
                    frame += 1;
                    self.with_sidebar(|sidebar, doc| {
                        if sidebar.tick_placeholder(turn, frame) {
                            sidebar.refresh(doc);
                        }
                    });
                }
            }
        }
    }

    /// One round trip through the bridge.
    async fn complete(&self, body: CompletionBody) -> Result<String, AssistantError> {
        let config = self.config.relay_config()?;
        let action = Action::CallOpenAi(RelayRequest { config, body });
        let reply = self
            .bridge
            .request(Origin::Tab(self.tab), action, self.config.reply_timeout())
            .await?;
        match reply {
            Reply::Relay(response) => interpret(&response),
            other => {
                warn!(?other, "bridge answered with the wrong reply");
                Err(AssistantError::UnexpectedResponse)
            }
        }
    }

    /// Answer a `getHelp` from the popup. The popup's transcript is its own;
    /// the sidebar is left alone.
    async fn help(&self, message: String, history: Vec<ChatMessage>) -> Reply {
        let context = self.context();
        let messages = help_messages(self.config.format, &context, &history, &message);
        let body = CompletionBody {
            model: self.config.model.clone(),
            messages,
        };
        match self.complete(body).await {
            Ok(answer) => Reply::Help {
                answer,
                error: None,
            },
            Err(e) => {
                warn!(tab = self.tab, error = %e, "getHelp failed");
                Reply::Help {
                    answer: e.user_message(),
                    error: Some(e.kind().to_string()),
                }
            }
        }
    }

    fn dispatch(self: &Arc<Self>, envelope: Envelope) {
        match &envelope.action {
            Action::GetHelp {
                message,
                chat_history,
            } => {
                let inner = self.clone();
                let message = message.clone();
                let history = chat_history.clone();
                tokio::spawn(async move {
                    let reply = inner.help(message, history).await;
                    envelope.respond(reply);
                });
            }
            Action::GetProblemInfo => {
                let title = extract_title(&self.document.lock().parse());
                envelope.respond(Reply::ProblemInfo { title });
            }
            Action::ToggleSidebar => {
                self.toggle();
                envelope.respond(Reply::Ack {});
            }
            Action::CallOpenAi(_) | Action::ClearChat => {
                warn!(
                    action = envelope.action.name(),
                    "action is handled by the bridge, not the page agent"
                );
            }
        }
    }
}

async fn serve(inner: Arc<AgentInner>, mut inbox: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = inbox.recv().await {
        debug!(tab = inner.tab, action = envelope.action.name(), "page agent received");
        inner.dispatch(envelope);
    }
}

/// Put the sidebar back whenever the page re-renders without it.
async fn watch(
    inner: Arc<AgentInner>,
    mut mutations: broadcast::Receiver<MutationBatch>,
) {
    loop {
        match mutations.recv().await {
            Ok(_) | Err(RecvError::Lagged(_)) => {
                let reinjected = inner.with_sidebar(|sidebar, doc| sidebar.ensure_injected(doc));
                if reinjected {
                    info!(tab = inner.tab, "sidebar re-injected after page update");
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}
