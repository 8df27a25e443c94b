//! The extension platform, in-process: tabs, their pages, and the
//! lifecycle hooks that inject page agents and clear transcripts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::{Bridge, Relay};
use crate::config::Config;
use crate::error::AssistantError;
use crate::page::document::{PageDocument, SharedDocument};
use crate::page::extract::is_problem_page;
use crate::page::PageAgent;
use crate::popup::session::{SessionManager, TabEvent};
use crate::popup::store::ChatStore;
use crate::protocol::{Action, Origin, Port, Reply, TabId};

struct Tab {
    url: String,
    document: SharedDocument,
    agent: Option<Arc<PageAgent>>,
    /// Held while an agent is being built for this tab.
    injecting: Arc<Mutex<()>>,
}

struct HostInner {
    config: Arc<Config>,
    bridge: Port,
    sessions: SessionManager,
    tabs: Mutex<HashMap<TabId, Tab>>,
    active: parking_lot::Mutex<Option<TabId>>,
    next_tab: AtomicU64,
    bridge_task: JoinHandle<()>,
}

impl Drop for HostInner {
    fn drop(&mut self) {
        self.bridge_task.abort();
    }
}

/// Cheap to clone; every clone drives the same set of tabs.
#[derive(Clone)]
pub struct ExtensionHost {
    inner: Arc<HostInner>,
}

impl ExtensionHost {
    /// Start the bridge. Must be called inside a tokio runtime.
    pub fn new(config: Config, store: Arc<dyn ChatStore>) -> Self {
        let sessions = SessionManager::new(store);
        let (bridge, bridge_task) = Bridge::new(Relay::new())
            .with_sessions(sessions.clone())
            .spawn();
        Self {
            inner: Arc::new(HostInner {
                config: Arc::new(config),
                bridge,
                sessions,
                tabs: Mutex::new(HashMap::new()),
                active: parking_lot::Mutex::new(None),
                next_tab: AtomicU64::new(1),
                bridge_task,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    pub fn bridge(&self) -> Port {
        self.inner.bridge.clone()
    }

    /// Open a new tab on `url` and make it active.
    pub async fn open_tab(&self, url: &str, html: &str) -> TabId {
        let tab = self.inner.next_tab.fetch_add(1, Ordering::Relaxed);
        info!(tab, url, "tab opened");
        self.load(tab, url, html).await;
        self.activate(tab);
        tab
    }

    /// Full navigation: the old page and its agent are gone.
    pub async fn navigate(&self, tab: TabId, url: &str, html: &str) -> Result<(), AssistantError> {
        if !self.inner.tabs.lock().await.contains_key(&tab) {
            return Err(AssistantError::ChannelBroken);
        }
        self.load(tab, url, html).await;
        Ok(())
    }

    /// The page re-rendered itself without a navigation.
    pub async fn mutate(&self, tab: TabId, html: &str) -> Result<(), AssistantError> {
        let document = self.document(tab).await.ok_or(AssistantError::ChannelBroken)?;
        document.lock().replace_all(html);
        Ok(())
    }

    pub async fn close_tab(&self, tab: TabId) {
        if let Some(state) = self.inner.tabs.lock().await.remove(&tab) {
            if let Some(agent) = state.agent {
                agent.shutdown();
            }
        }
        {
            let mut active = self.inner.active.lock();
            if *active == Some(tab) {
                *active = None;
            }
        }
        info!(tab, "tab closed");
        self.tab_event(TabEvent::Removed { tab }).await;
    }

    pub fn activate(&self, tab: TabId) {
        *self.inner.active.lock() = Some(tab);
    }

    pub fn active_tab(&self) -> Option<TabId> {
        *self.inner.active.lock()
    }

    pub async fn tab_url(&self, tab: TabId) -> Option<String> {
        self.inner.tabs.lock().await.get(&tab).map(|t| t.url.clone())
    }

    pub async fn document(&self, tab: TabId) -> Option<SharedDocument> {
        self.inner.tabs.lock().await.get(&tab).map(|t| t.document.clone())
    }

    pub async fn agent(&self, tab: TabId) -> Option<Arc<PageAgent>> {
        self.inner.tabs.lock().await.get(&tab).and_then(|t| t.agent.clone())
    }

    /// Make sure `tab` has a page agent. A second call is a no-op.
    ///
    /// The tab table is not held while the agent starts up, so a slow bridge
    /// only stalls this tab.
    pub async fn inject(&self, tab: TabId) -> Result<Arc<PageAgent>, AssistantError> {
        loop {
            let (document, gate) = {
                let tabs = self.inner.tabs.lock().await;
                let state = tabs.get(&tab).ok_or(AssistantError::ChannelBroken)?;
                if let Some(agent) = &state.agent {
                    debug!(tab, "page agent already present");
                    return Ok(agent.clone());
                }
                (state.document.clone(), state.injecting.clone())
            };

            let _building = gate.lock().await;
            if let Some(agent) = self.agent(tab).await {
                return Ok(agent);
            }

            let agent = Arc::new(
                PageAgent::inject(
                    tab,
                    document.clone(),
                    self.inner.bridge.clone(),
                    self.inner.config.clone(),
                )
                .await,
            );

            let mut tabs = self.inner.tabs.lock().await;
            let Some(state) = tabs.get_mut(&tab) else {
                agent.shutdown();
                return Err(AssistantError::ChannelBroken);
            };
            if !Arc::ptr_eq(&state.document, &document) {
                debug!(tab, "page replaced during injection, starting over");
                agent.shutdown();
                continue;
            }
            state.agent = Some(agent.clone());
            return Ok(agent);
        }
    }

    /// Deliver an action to the tab's page agent and wait for the answer.
    /// A tab without an agent has nobody to receive it.
    pub async fn send_to_tab(
        &self,
        tab: TabId,
        origin: Origin,
        action: Action,
    ) -> Result<Reply, AssistantError> {
        let port = self
            .agent(tab)
            .await
            .map(|agent| agent.port())
            .ok_or(AssistantError::ChannelBroken)?;
        port.request(origin, action, self.inner.config.reply_timeout())
            .await
    }

    /// The toolbar button.
    pub async fn click_action(&self, tab: TabId) -> Result<(), AssistantError> {
        self.send_to_tab(tab, Origin::Background, Action::ToggleSidebar)
            .await
            .map(|_| ())
    }

    async fn load(&self, tab: TabId, url: &str, html: &str) {
        self.tab_event(TabEvent::Loading {
            tab,
            url: url.to_string(),
        })
        .await;

        {
            let mut tabs = self.inner.tabs.lock().await;
            let previous = tabs.insert(
                tab,
                Tab {
                    url: url.to_string(),
                    document: PageDocument::shared(url, html),
                    agent: None,
                    injecting: Arc::new(Mutex::new(())),
                },
            );
            if let Some(agent) = previous.and_then(|t| t.agent) {
                agent.shutdown();
            }
        }

        self.tab_event(TabEvent::Complete {
            tab,
            url: url.to_string(),
        })
        .await;
    }

    async fn tab_event(&self, event: TabEvent) {
        if let Err(e) = self.inner.sessions.handle_tab_event(&event).await {
            warn!(tab = event.tab(), error = %e, "tab event handling failed");
        }
        if let TabEvent::Complete { tab, url } = &event {
            if is_problem_page(url) {
                if let Err(e) = self.inject(*tab).await {
                    warn!(tab, error = %e, "failed to inject page agent");
                }
            }
        }
    }
}
