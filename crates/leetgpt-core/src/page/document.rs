//! The live problem page as the agent sees it.
//!
//! The markup is kept as a string and parsed on demand, so the document can
//! be shared between tasks. Every change is published on a broadcast
//! channel, the way a mutation observer would see it.

use parking_lot::Mutex;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

pub type SharedDocument = Arc<Mutex<PageDocument>>;

const MUTATION_CAPACITY: usize = 32;

/// Copy the nodes of an HTML fragment under the node `$parent` of `$doc`.
///
/// A macro so node ids stay inferred from scraper's tree.
macro_rules! graft {
    ($doc:ident, $parent:expr, $fragment:expr) => {{
        let parsed = Html::parse_fragment($fragment);
        let root = parsed.root_element();
        let mut mapped = HashMap::new();
        mapped.insert(root.id(), $parent);
        // Pre-order walk: a parent is always mapped before its children.
        for node in root.descendants().skip(1) {
            let Some(source_parent) = node.parent().map(|p| p.id()) else {
                continue;
            };
            let Some(&target_parent) = mapped.get(&source_parent) else {
                continue;
            };
            if let Some(mut target) = $doc.tree.get_mut(target_parent) {
                let new_id = target.append(node.value().clone()).id();
                mapped.insert(node.id(), new_id);
            }
        }
    }};
}

/// Who changed the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationSource {
    /// The host application re-rendered part of the page.
    Page,
    /// The agent added, replaced or removed its own nodes.
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationBatch {
    pub source: MutationSource,
    pub target: String,
}

/// Space the agent has taken from the host layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reservation {
    pub right_px: u32,
}

pub struct PageDocument {
    url: String,
    html: String,
    reservation: Reservation,
    mutations: broadcast::Sender<MutationBatch>,
}

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(sel) => Some(sel),
        Err(e) => {
            warn!(selector, error = ?e, "invalid selector");
            None
        }
    }
}

impl PageDocument {
    pub fn new(url: &str, html: &str) -> Self {
        let (mutations, _) = broadcast::channel(MUTATION_CAPACITY);
        Self {
            url: url.to_string(),
            html: html.to_string(),
            reservation: Reservation::default(),
            mutations,
        }
    }

    pub fn shared(url: &str, html: &str) -> SharedDocument {
        Arc::new(Mutex::new(Self::new(url, html)))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn parse(&self) -> Html {
        Html::parse_document(&self.html)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MutationBatch> {
        self.mutations.subscribe()
    }

    pub fn reservation(&self) -> Reservation {
        self.reservation
    }

    pub fn reserve_right(&mut self, px: u32) {
        self.reservation.right_px = px;
    }

    pub fn release_reservation(&mut self) {
        self.reservation = Reservation::default();
    }

    pub fn count(&self, selector: &str) -> usize {
        match parse_selector(selector) {
            Some(sel) => self.parse().select(&sel).count(),
            None => 0,
        }
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.count(selector) > 0
    }

    /// Text of the first element matching `selector`.
    pub fn text_of(&self, selector: &str) -> Option<String> {
        let sel = parse_selector(selector)?;
        let doc = self.parse();
        let text = doc.select(&sel).next().map(|el| el.text().collect::<String>());
        text
    }

    /// Replace the whole page, as a single-page app does on client-side
    /// navigation. The agent's nodes go with it.
    pub fn replace_all(&mut self, html: &str) {
        self.html = html.to_string();
        self.publish(MutationSource::Page, "document");
    }

    /// Host-side edit of one element's children (editor contents etc).
    pub fn set_inner_html(&mut self, selector: &str, fragment: &str) -> bool {
        let Some(sel) = parse_selector(selector) else {
            return false;
        };
        let mut doc = self.parse();
        let Some(target) = doc.select(&sel).next().map(|el| el.id()) else {
            return false;
        };

        let children: Vec<_> = match doc.tree.get(target) {
            Some(node) => node.children().map(|c| c.id()).collect(),
            None => return false,
        };
        for child in children {
            if let Some(mut node) = doc.tree.get_mut(child) {
                node.detach();
            }
        }
        graft!(doc, target, fragment);

        self.html = doc.html();
        self.publish(MutationSource::Page, selector);
        true
    }

    /// Append `fragment` as the last children of the first element matching
    /// `parent`.
    pub fn append_html(&mut self, parent: &str, fragment: &str) -> bool {
        let Some(sel) = parse_selector(parent) else {
            return false;
        };
        let mut doc = self.parse();
        let Some(target) = doc.select(&sel).next().map(|el| el.id()) else {
            return false;
        };
        graft!(doc, target, fragment);

        self.html = doc.html();
        self.publish(MutationSource::Agent, parent);
        true
    }

    /// Swap the first element matching `selector` for `fragment`. The new
    /// nodes become the last children of the old element's parent.
    pub fn replace_element(&mut self, selector: &str, fragment: &str) -> bool {
        let Some(sel) = parse_selector(selector) else {
            return false;
        };
        let mut doc = self.parse();
        let Some(target) = doc.select(&sel).next().map(|el| el.id()) else {
            return false;
        };
        let Some(parent) = doc.tree.get(target).and_then(|n| n.parent()).map(|p| p.id()) else {
            return false;
        };
        if let Some(mut node) = doc.tree.get_mut(target) {
            node.detach();
        }
        graft!(doc, parent, fragment);

        self.html = doc.html();
        self.publish(MutationSource::Agent, selector);
        true
    }

    pub fn remove(&mut self, selector: &str) -> bool {
        let Some(sel) = parse_selector(selector) else {
            return false;
        };
        let mut doc = self.parse();
        let ids: Vec<_> = doc.select(&sel).map(|el| el.id()).collect();
        if ids.is_empty() {
            return false;
        }
        for id in ids {
            if let Some(mut node) = doc.tree.get_mut(id) {
                node.detach();
            }
        }

        self.html = doc.html();
        self.publish(MutationSource::Agent, selector);
        true
    }

    fn publish(&self, source: MutationSource, target: &str) {
        // Nobody listening is fine.
        let _ = self.mutations.send(MutationBatch {
            source,
            target: target.to_string(),
        });
    }
}
