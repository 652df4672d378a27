//! chatkeep-core: persisted chat history and saved items
//!
//! Two stores make up the core: [`ConversationStore`] owns conversations and
//! the active-conversation pointer, [`SavedItemsStore`] owns bookmarked
//! messages and the collections grouping them. Both mirror every mutation to
//! a [`storage::StateStorage`] and rehydrate from it on open.

pub mod config;
pub mod conversations;
pub mod error;
pub mod export;
pub mod generate;
pub mod models;
pub mod paths;
pub mod saved;
pub mod search;
pub mod storage;

pub use config::Config;
pub use conversations::ConversationStore;
pub use error::Error;
pub use error::Result;
pub use saved::SavedItemsStore;

/// Application name used for config directories and paths.
pub const APP_NAME: &str = "chatkeep";

/// Returns the environment variable prefix for this application.
pub fn env_prefix() -> String {
    "CHATKEEP".to_string()
}
