use super::{
    ConversationKind, DataSourceEvent, DataSourceListener, Forwarder, MessageWindowDataSource,
    load_with_changes,
};
use crate::backend::{BackendEvent, ConversationSummary, MessageBackend};
use crate::error::DataSourceError;
use async_trait::async_trait;
use chatwindow_core::{ChangeSet, ListChange, Message};
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

/// Builds the coarse change set a livestream reports: one insert per new
/// message, or one insert per message when nothing new arrived but the list
/// still changed.
pub fn insert_only_changes(previous: &[Message], current: &[Message]) -> ChangeSet {
    let known: HashSet<&str> = previous.iter().map(|m| m.id.as_str()).collect();
    let fresh: ChangeSet = current
        .iter()
        .enumerate()
        .filter(|(_, m)| !known.contains(m.id.as_str()))
        .map(|(index, m)| ListChange::Insert {
            item: m.clone(),
            index,
        })
        .collect();
    if !fresh.is_empty() || previous == current {
        return fresh;
    }
    current
        .iter()
        .enumerate()
        .map(|(index, m)| ListChange::Insert {
            item: m.clone(),
            index,
        })
        .collect()
}

/// Serves a livestream. The backend has no change diffing and no read
/// receipts, so every update is a full snapshot.
pub struct LivestreamDataSource {
    backend: Arc<dyn MessageBackend>,
    forwarder: Forwarder,
}

impl LivestreamDataSource {
    pub fn new(backend: Arc<dyn MessageBackend>) -> Self {
        Self {
            backend,
            forwarder: Forwarder::default(),
        }
    }

    fn snapshot(&self) -> Vec<Message> {
        self.backend.messages()
    }
}

#[async_trait]
impl MessageWindowDataSource for LivestreamDataSource {
    fn kind(&self) -> ConversationKind {
        ConversationKind::Livestream
    }

    fn conversation(&self) -> Option<ConversationSummary> {
        self.backend.conversation()
    }

    fn messages(&self) -> Vec<Message> {
        self.snapshot()
    }

    fn has_loaded_all_previous(&self) -> bool {
        self.backend.has_loaded_all_previous()
    }

    fn has_loaded_all_next(&self) -> bool {
        self.backend.has_loaded_all_next()
    }

    fn first_unread_message_id(&self) -> Option<String> {
        None
    }

    fn message(&self, id: &str) -> Option<Message> {
        self.backend.message(id)
    }

    fn reports_full_snapshots(&self) -> bool {
        true
    }

    fn set_listener(&self, listener: Arc<dyn DataSourceListener>) {
        let backend = Arc::clone(&self.backend);
        let mut last = backend.messages();
        self.forwarder
            .start(&self.backend, listener, move |event| {
                let messages = match event {
                    BackendEvent::MessagesChanged(_) => backend.messages(),
                    BackendEvent::MessagesReplaced(messages) => messages,
                    BackendEvent::ConversationChanged(conversation) => {
                        return Some(DataSourceEvent::ConversationUpdated(conversation));
                    }
                };
                let changes = insert_only_changes(&last, &messages);
                last = messages.clone();
                Some(DataSourceEvent::MessagesUpdated { messages, changes })
            });
    }

    async fn load_previous(
        &self,
        before: Option<String>,
        limit: usize,
    ) -> Result<ChangeSet, DataSourceError> {
        load_with_changes(
            || self.snapshot(),
            self.backend.load_previous_messages(before, limit),
            insert_only_changes,
        )
        .await
    }

    async fn load_next(&self, limit: usize) -> Result<ChangeSet, DataSourceError> {
        load_with_changes(
            || self.snapshot(),
            self.backend.load_next_messages(limit),
            insert_only_changes,
        )
        .await
    }

    async fn load_page_around(&self, message_id: &str) -> Result<ChangeSet, DataSourceError> {
        load_with_changes(
            || self.snapshot(),
            self.backend.load_page_around(message_id),
            insert_only_changes,
        )
        .await
    }

    async fn load_first_page(&self) -> Result<ChangeSet, DataSourceError> {
        load_with_changes(
            || self.snapshot(),
            self.backend.load_first_page(),
            insert_only_changes,
        )
        .await
    }

    async fn mark_read(&self) -> Result<(), DataSourceError> {
        debug!(target: "MessageList/DataSource", "Livestreams have no read state, ignoring mark read");
        Ok(())
    }

    async fn mark_unread(&self, _from_message_id: &str) -> Result<(), DataSourceError> {
        debug!(target: "MessageList/DataSource", "Livestreams have no read state, ignoring mark unread");
        Ok(())
    }
}
