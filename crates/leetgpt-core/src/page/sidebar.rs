use tracing::{debug, info};

use crate::page::document::PageDocument;
use crate::render::escape_text;

pub const SIDEBAR_ID: &str = "leetcode-gpt-sidebar";
pub const SIDEBAR_SELECTOR: &str = "#leetcode-gpt-sidebar";
pub const SIDEBAR_WIDTH_PX: u32 = 400;

/// Containers the sidebar docks into, most specific first.
pub const HOST_CONTAINERS: &[&str] = &["#qd-content", r#"[data-layout-path="/"]"#, "#__next main"];

const OVERLAY_PARENT: &str = "body";

const THINKING_FRAMES: [&str; 3] = ["Thinking.", "Thinking..", "Thinking..."];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Inside a host container, sharing its layout.
    Docked(&'static str),
    /// Fixed over the page.
    Overlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    User,
    Assistant,
    Pending,
    Notice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarEntry {
    pub kind: EntryKind,
    pub turn: Option<u64>,
    /// Markup, already escaped or sanitized.
    pub html: String,
}

/// The chat panel's state and markup.
#[derive(Debug, Clone)]
pub struct Sidebar {
    entries: Vec<SidebarEntry>,
    visible: bool,
    placement: Option<Placement>,
}

impl Sidebar {
    pub fn new(welcome: &str) -> Self {
        Self {
            entries: vec![SidebarEntry {
                kind: EntryKind::Assistant,
                turn: None,
                html: escape_text(welcome),
            }],
            visible: true,
            placement: None,
        }
    }

    pub fn entries(&self) -> &[SidebarEntry] {
        &self.entries
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn placement(&self) -> Option<&Placement> {
        self.placement.as_ref()
    }

    /// Build the sidebar into the page unless it is already there.
    /// Returns whether anything was inserted.
    pub fn ensure_injected(&mut self, doc: &mut PageDocument) -> bool {
        if doc.contains(SIDEBAR_SELECTOR) {
            return false;
        }

        let host = HOST_CONTAINERS.iter().copied().find(|sel| doc.contains(sel));
        let placement = match host {
            Some(sel) => Placement::Docked(sel),
            None => Placement::Overlay,
        };
        self.placement = Some(placement);

        let parent = match host {
            Some(sel) => sel,
            None => OVERLAY_PARENT,
        };
        let inserted = doc.append_html(parent, &self.render());
        if inserted {
            info!(placement = ?self.placement, "sidebar injected");
            self.apply_reservation(doc);
        } else {
            debug!(parent, "sidebar host vanished before injection");
        }
        inserted
    }

    /// Flip visibility. Hiding returns any layout space the sidebar held.
    pub fn toggle(&mut self, doc: &mut PageDocument) -> bool {
        self.visible = !self.visible;
        self.apply_reservation(doc);
        self.refresh(doc);
        self.visible
    }

    pub fn push_user(&mut self, text: &str) {
        self.entries.push(SidebarEntry {
            kind: EntryKind::User,
            turn: None,
            html: escape_text(text),
        });
    }

    pub fn push_placeholder(&mut self, turn: u64) {
        self.entries.push(SidebarEntry {
            kind: EntryKind::Pending,
            turn: Some(turn),
            html: THINKING_FRAMES[0].to_string(),
        });
    }

    /// Advance the placeholder animation of `turn`.
    pub fn tick_placeholder(&mut self, turn: u64, frame: usize) -> bool {
        match self.pending_mut(turn) {
            Some(entry) => {
                entry.html = THINKING_FRAMES[frame % THINKING_FRAMES.len()].to_string();
                true
            }
            None => false,
        }
    }

    /// Replace the placeholder of `turn` with the answer.
    pub fn resolve(&mut self, turn: u64, html: String) -> bool {
        self.finish(turn, EntryKind::Assistant, html)
    }

    /// Replace the placeholder of `turn` with an error notice.
    pub fn fail(&mut self, turn: u64, message: &str) -> bool {
        self.finish(turn, EntryKind::Notice, escape_text(message))
    }

    pub fn push_notice(&mut self, message: &str) {
        self.entries.push(SidebarEntry {
            kind: EntryKind::Notice,
            turn: None,
            html: escape_text(message),
        });
    }

    fn finish(&mut self, turn: u64, kind: EntryKind, html: String) -> bool {
        match self.pending_mut(turn) {
            Some(entry) => {
                entry.kind = kind;
                entry.html = html;
                true
            }
            None => false,
        }
    }

    fn pending_mut(&mut self, turn: u64) -> Option<&mut SidebarEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.kind == EntryKind::Pending && e.turn == Some(turn))
    }

    /// Re-render the sidebar node in place, or inject it if the page lost it.
    pub fn refresh(&mut self, doc: &mut PageDocument) {
        if !doc.replace_element(SIDEBAR_SELECTOR, &self.render()) {
            self.ensure_injected(doc);
        }
    }

    /// Drop the sidebar from the page and give back its space.
    pub fn detach(&mut self, doc: &mut PageDocument) {
        doc.remove(SIDEBAR_SELECTOR);
        doc.release_reservation();
    }

    fn apply_reservation(&self, doc: &mut PageDocument) {
        match (&self.placement, self.visible) {
            (Some(Placement::Docked(_)), true) => doc.reserve_right(SIDEBAR_WIDTH_PX),
            _ => doc.release_reservation(),
        }
    }

    pub fn render(&self) -> String {
        let placement_class = match self.placement {
            Some(Placement::Overlay) => "lgpt-overlay",
            _ => "lgpt-docked",
        };
        let style = match (&self.placement, self.visible) {
            (_, false) => "display:none".to_string(),
            (Some(Placement::Overlay), true) => format!(
                "position:fixed;top:0;right:0;height:100vh;width:{}px;z-index:9999",
                SIDEBAR_WIDTH_PX
            ),
            _ => format!("width:{}px", SIDEBAR_WIDTH_PX),
        };

        let mut html = format!(
            r#"<div id="{}" class="{}" data-visible="{}" style="{}">"#,
            SIDEBAR_ID, placement_class, self.visible, style
        );
        html.push_str(r#"<div class="lgpt-header">LeetCode GPT</div><div class="lgpt-messages">"#);
        for entry in &self.entries {
            let class = match entry.kind {
                EntryKind::User => "lgpt-message lgpt-user",
                EntryKind::Assistant => "lgpt-message lgpt-assistant",
                EntryKind::Pending => "lgpt-message lgpt-assistant lgpt-pending",
                EntryKind::Notice => "lgpt-message lgpt-notice",
            };
            match entry.turn {
                Some(turn) => {
                    html.push_str(&format!(r#"<div class="{}" data-turn="{}">"#, class, turn))
                }
                None => html.push_str(&format!(r#"<div class="{}">"#, class)),
            }
            html.push_str(&entry.html);
            html.push_str("</div>");
        }
        html.push_str(
            r#"</div><div class="lgpt-input"><textarea id="lgpt-input" placeholder="Ask for a hint..."></textarea><button id="lgpt-send">Send</button></div></div>"#,
        );
        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCKED_PAGE: &str = r#"<html><body><div id="qd-content"><div class="text-title-large">1. Two Sum</div></div></body></html>"#;
    const BARE_PAGE: &str = r#"<html><body><div class="text-title-large">1. Two Sum</div></body></html>"#;

    fn doc(html: &str) -> PageDocument {
        PageDocument::new("https://leetcode.com/problems/two-sum/", html)
    }

    #[test]
    fn test_injection_is_idempotent() {
        let mut page = doc(DOCKED_PAGE);
        let mut sidebar = Sidebar::new("Hi!");
        assert!(sidebar.ensure_injected(&mut page));
        assert!(!sidebar.ensure_injected(&mut page));
        assert_eq!(page.count(SIDEBAR_SELECTOR), 1);
    }

    #[test]
    fn test_docks_into_host_container() {
        let mut page = doc(DOCKED_PAGE);
        let mut sidebar = Sidebar::new("Hi!");
        sidebar.ensure_injected(&mut page);
        assert_eq!(sidebar.placement(), Some(&Placement::Docked("#qd-content")));
        assert_eq!(page.count("#qd-content #leetcode-gpt-sidebar"), 1);
        assert_eq!(page.reservation().right_px, SIDEBAR_WIDTH_PX);
    }

    #[test]
    fn test_falls_back_to_overlay() {
        let mut page = doc(BARE_PAGE);
        let mut sidebar = Sidebar::new("Hi!");
        sidebar.ensure_injected(&mut page);
        assert_eq!(sidebar.placement(), Some(&Placement::Overlay));
        assert_eq!(page.count("body > #leetcode-gpt-sidebar.lgpt-overlay"), 1);
        assert_eq!(page.reservation().right_px, 0);
    }

    #[test]
    fn test_toggle_returns_reserved_space() {
        let mut page = doc(DOCKED_PAGE);
        let mut sidebar = Sidebar::new("Hi!");
        sidebar.ensure_injected(&mut page);

        assert!(!sidebar.toggle(&mut page));
        assert_eq!(page.reservation().right_px, 0);
        assert_eq!(page.count(r#"#leetcode-gpt-sidebar[data-visible="false"]"#), 1);

        assert!(sidebar.toggle(&mut page));
        assert_eq!(page.reservation().right_px, SIDEBAR_WIDTH_PX);
        assert_eq!(page.count(SIDEBAR_SELECTOR), 1);
    }

    #[test]
    fn test_placeholder_lifecycle() {
        let mut page = doc(DOCKED_PAGE);
        let mut sidebar = Sidebar::new("Hi!");
        sidebar.ensure_injected(&mut page);

        sidebar.push_user("<b>How</b> do I start?");
        sidebar.push_placeholder(1);
        assert!(sidebar.tick_placeholder(1, 2));
        sidebar.refresh(&mut page);
        assert_eq!(page.text_of(".lgpt-pending").as_deref(), Some("Thinking..."));
        assert_eq!(page.text_of(".lgpt-user").as_deref(), Some("<b>How</b> do I start?"));

        assert!(sidebar.resolve(1, "<p>Use a map.</p>".to_string()));
        assert!(!sidebar.tick_placeholder(1, 0));
        sidebar.refresh(&mut page);
        assert_eq!(page.count(".lgpt-pending"), 0);
        assert_eq!(page.count(".lgpt-assistant p"), 1);
        assert_eq!(page.count(SIDEBAR_SELECTOR), 1);
    }

    #[test]
    fn test_placeholder_resolved_only_by_its_turn() {
        let mut sidebar = Sidebar::new("Hi!");
        sidebar.push_placeholder(1);
        sidebar.push_placeholder(2);
        assert!(sidebar.fail(2, "Sorry"));
        assert!(!sidebar.resolve(3, "nope".to_string()));

        let kinds: Vec<_> = sidebar.entries().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EntryKind::Assistant, EntryKind::Pending, EntryKind::Notice]
        );
    }

    #[test]
    fn test_refresh_reinjects_when_page_dropped_it() {
        let mut page = doc(DOCKED_PAGE);
        let mut sidebar = Sidebar::new("Hi!");
        sidebar.ensure_injected(&mut page);
        page.replace_all(DOCKED_PAGE);
        assert_eq!(page.count(SIDEBAR_SELECTOR), 0);

        sidebar.refresh(&mut page);
        assert_eq!(page.count(SIDEBAR_SELECTOR), 1);
    }

    #[test]
    fn test_detach_removes_node_and_space() {
        let mut page = doc(DOCKED_PAGE);
        let mut sidebar = Sidebar::new("Hi!");
        sidebar.ensure_injected(&mut page);
        sidebar.detach(&mut page);
        assert_eq!(page.count(SIDEBAR_SELECTOR), 0);
        assert_eq!(page.reservation().right_px, 0);
    }
}
