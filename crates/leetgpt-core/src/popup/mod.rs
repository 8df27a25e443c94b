pub mod session;
pub mod store;
pub mod view;

pub use session::{SessionManager, TabEvent};
pub use store::{ChatStore, MemoryStore, SqliteStore};
pub use view::Popup;
