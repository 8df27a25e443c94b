use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::popup::store::ChatStore;
use crate::protocol::TabId;
use crate::state::ChatMessage;

/// Lifecycle notifications for a browser tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabEvent {
    /// A new top-level load started.
    Loading { tab: TabId, url: String },
    /// The load finished.
    Complete { tab: TabId, url: String },
    Removed { tab: TabId },
}

impl TabEvent {
    pub fn tab(&self) -> TabId {
        match self {
            TabEvent::Loading { tab, .. }
            | TabEvent::Complete { tab, .. }
            | TabEvent::Removed { tab } => *tab,
        }
    }
}

/// One chat transcript per tab, stored under `chat_<tabId>`.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn ChatStore>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub fn key(tab: TabId) -> String {
        format!("chat_{}", tab)
    }

    /// A tab that never chatted has an empty history. So does one whose
    /// record can't be decoded; that record is left for the next save.
    pub async fn load(&self, tab: TabId) -> Result<Vec<ChatMessage>> {
        let Some(value) = self.store.get(&Self::key(tab)).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_value(value) {
            Ok(history) => Ok(history),
            Err(e) => {
                warn!(tab, error = %e, "discarding unreadable chat history");
                Ok(Vec::new())
            }
        }
    }

    pub async fn save(&self, tab: TabId, history: &[ChatMessage]) -> Result<()> {
        self.store
            .set(&Self::key(tab), serde_json::to_value(history)?)
            .await
    }

    pub async fn clear(&self, tab: TabId) -> Result<()> {
        debug!(tab, "clearing chat history");
        self.store.remove(&Self::key(tab)).await
    }

    /// Stale context must not leak into a new problem: a tab's transcript
    /// ends when it navigates or closes.
    pub async fn handle_tab_event(&self, event: &TabEvent) -> Result<()> {
        match event {
            TabEvent::Loading { tab, .. } | TabEvent::Removed { tab } => self.clear(*tab).await,
            TabEvent::Complete { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::popup::store::MemoryStore;
    use serde_json::json;

    fn manager() -> (SessionManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (SessionManager::new(store.clone()), store)
    }

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user("How do I start?"),
            ChatMessage::assistant("<p>Think about complements.</p>"),
            ChatMessage::user("What about edge cases?"),
        ]
    }

    #[tokio::test]
    async fn test_save_then_load_keeps_order() {
        let (sessions, _) = manager();
        sessions.save(3, &conversation()).await.unwrap();
        assert_eq!(sessions.load(3).await.unwrap(), conversation());
    }

    #[tokio::test]
    async fn test_unknown_tab_is_empty() {
        let (sessions, _) = manager();
        assert!(sessions.load(42).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tabs_are_disjoint() {
        let (sessions, _) = manager();
        sessions.save(1, &[ChatMessage::user("tab a")]).await.unwrap();
        sessions.save(2, &[ChatMessage::user("tab b")]).await.unwrap();

        assert_eq!(sessions.load(1).await.unwrap(), vec![ChatMessage::user("tab a")]);
        assert_eq!(sessions.load(2).await.unwrap(), vec![ChatMessage::user("tab b")]);
    }

    #[tokio::test]
    async fn test_close_clears_only_that_tab() {
        let (sessions, _) = manager();
        sessions.save(1, &[ChatMessage::user("tab a")]).await.unwrap();
        sessions.save(2, &[ChatMessage::user("tab b")]).await.unwrap();

        sessions.handle_tab_event(&TabEvent::Removed { tab: 1 }).await.unwrap();

        assert!(sessions.load(1).await.unwrap().is_empty());
        assert_eq!(sessions.load(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_navigation_start_clears_but_complete_does_not() {
        let (sessions, _) = manager();
        sessions.save(5, &conversation()).await.unwrap();

        sessions
            .handle_tab_event(&TabEvent::Complete {
                tab: 5,
                url: "https://leetcode.com/problems/two-sum/".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(sessions.load(5).await.unwrap().len(), 3);

        sessions
            .handle_tab_event(&TabEvent::Loading {
                tab: 5,
                url: "https://leetcode.com/problems/3sum/".to_string(),
            })
            .await
            .unwrap();
        assert!(sessions.load(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_record_reads_as_empty() {
        let (sessions, store) = manager();
        store.set("chat_9", json!({"not": "a list"})).await.unwrap();
        assert!(sessions.load(9).await.unwrap().is_empty());
    }
}
