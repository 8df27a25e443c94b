pub mod agent;
pub mod conversation;
pub mod document;
pub mod extract;
pub mod sidebar;

pub use agent::PageAgent;
pub use conversation::{ConversationEngine, ConversationState};
pub use document::{PageDocument, SharedDocument};
pub use sidebar::Sidebar;
