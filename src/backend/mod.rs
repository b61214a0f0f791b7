//! The seam to the external chat SDK.
//!
//! A backend owns networking and persistence for one conversation context
//! (a channel, a thread's replies, or a livestream) and keeps its own loaded
//! list of messages. The data sources in [`crate::data_source`] project it
//! into change sets for the engine.

pub mod memory;

use async_trait::async_trait;
use chatwindow_core::{ChangeSet, Message};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub use memory::InMemoryBackend;

/// Metadata for the conversation a backend serves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub name: Option<String>,
    pub unread_count: u32,
    pub last_read_message_id: Option<String>,
    /// Specific unread boundary reported by the server, when it has one.
    pub first_unread_message_id: Option<String>,
    pub reply_count: u32,
}

#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// Incremental change against the backend's loaded list.
    MessagesChanged(ChangeSet),
    /// Full snapshot from backends without change diffing.
    MessagesReplaced(Vec<Message>),
    ConversationChanged(ConversationSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Previous,
    Next,
    Around,
    First,
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PageKind::Previous => "previous",
            PageKind::Next => "next",
            PageKind::Around => "around",
            PageKind::First => "first",
        };
        f.write_str(name)
    }
}

#[async_trait]
pub trait MessageBackend: Send + Sync {
    fn conversation(&self) -> Option<ConversationSummary>;

    /// Loaded messages, newest first.
    fn messages(&self) -> Vec<Message>;

    /// Root message of a thread backend.
    fn root_message(&self) -> Option<Message> {
        None
    }

    fn has_loaded_all_previous(&self) -> bool;

    fn has_loaded_all_next(&self) -> bool;

    /// Looks a message up in the local store, loaded or not.
    fn message(&self, id: &str) -> Option<Message>;

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent>;

    async fn load_previous_messages(
        &self,
        before: Option<String>,
        limit: usize,
    ) -> Result<(), anyhow::Error>;

    async fn load_next_messages(&self, limit: usize) -> Result<(), anyhow::Error>;

    async fn load_page_around(&self, message_id: &str) -> Result<(), anyhow::Error>;

    async fn load_first_page(&self) -> Result<(), anyhow::Error>;

    /// Marks the conversation read. Thread backends mark the thread read.
    async fn mark_read(&self) -> Result<(), anyhow::Error>;

    async fn mark_unread(&self, from_message_id: &str) -> Result<(), anyhow::Error>;
}
