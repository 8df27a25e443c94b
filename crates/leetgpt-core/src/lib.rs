pub mod bridge;
pub mod config;
pub mod error;
pub mod format;
pub mod host;
pub mod page;
pub mod popup;
pub mod prompt;
pub mod protocol;
pub mod render;
pub mod state;

// Re-export main types for convenience
pub use bridge::{Bridge, Relay};
pub use config::Config;
pub use error::AssistantError;
pub use format::RenderFormat;
pub use host::ExtensionHost;
pub use page::{PageAgent, PageDocument};
pub use popup::{ChatStore, MemoryStore, Popup, SessionManager, SqliteStore};
pub use protocol::{Action, Port, Reply, TabId};
pub use state::{ChatMessage, ChatRole, ProblemContext};
