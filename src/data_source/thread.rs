use super::{
    ConversationKind, DataSourceEvent, DataSourceListener, Forwarder, MessageWindowDataSource,
    load_with_changes,
};
use crate::backend::{BackendEvent, ConversationSummary, MessageBackend};
use crate::error::DataSourceError;
use async_trait::async_trait;
use chatwindow_core::change::diff;
use chatwindow_core::{ChangeSet, ListChange, Message};
use std::sync::Arc;

/// Appends the root to a reply list unless it already trails it.
fn with_root(mut replies: Vec<Message>, root: Option<Message>) -> Vec<Message> {
    if let Some(root) = root {
        if replies.last().is_none_or(|last| last.id != root.id) {
            replies.push(root);
        }
    }
    replies
}

/// Serves the replies of one thread, with the root message as the oldest
/// entry of the list.
///
/// Threads carry no read boundary of their own, so
/// [`MessageWindowDataSource::first_unread_message_id`] is always `None`.
pub struct ThreadDataSource {
    backend: Arc<dyn MessageBackend>,
    root_id: String,
    forwarder: Forwarder,
}

impl ThreadDataSource {
    pub fn new(backend: Arc<dyn MessageBackend>, root_id: impl Into<String>) -> Self {
        Self {
            backend,
            root_id: root_id.into(),
            forwarder: Forwarder::default(),
        }
    }

    fn snapshot(&self) -> Vec<Message> {
        with_root(self.backend.messages(), self.backend.root_message())
    }
}

#[async_trait]
impl MessageWindowDataSource for ThreadDataSource {
    fn kind(&self) -> ConversationKind {
        ConversationKind::Thread
    }

    fn conversation(&self) -> Option<ConversationSummary> {
        self.backend.conversation()
    }

    fn thread_root_id(&self) -> Option<String> {
        Some(self.root_id.clone())
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

    fn set_listener(&self, listener: Arc<dyn DataSourceListener>) {
        let backend = Arc::clone(&self.backend);
        let mut root_seen = backend.root_message().is_some();
        let mut last = self.snapshot();
        self.forwarder
            .start(&self.backend, listener, move |event| match event {
                BackendEvent::MessagesChanged(mut changes) => {
                    let root = backend.root_message();
                    let arrived = !root_seen && root.is_some();
                    root_seen |= root.is_some();
                    last = with_root(backend.messages(), root);
                    if arrived {
                        if let Some(root) = last.last() {
                            changes.push(ListChange::Insert {
                                item: root.clone(),
                                index: last.len() - 1,
                            });
                        }
                    }
                    Some(DataSourceEvent::MessagesUpdated {
                        messages: last.clone(),
                        changes,
                    })
                }
                BackendEvent::MessagesReplaced(replies) => {
                    let root = backend.root_message();
                    root_seen |= root.is_some();
                    let messages = with_root(replies, root);
                    let changes = diff(&last, &messages);
                    last = messages.clone();
                    Some(DataSourceEvent::MessagesUpdated { messages, changes })
                }
                BackendEvent::ConversationChanged(conversation) => {
                    Some(DataSourceEvent::ConversationUpdated(conversation))
                }
            });
    }

    async fn load_previous(
        &self,
        before: Option<String>,
        limit: usize,
    ) -> Result<ChangeSet, DataSourceError> {
        // The root never takes part in reply pagination.
        let before = before.filter(|id| *id != self.root_id);
        load_with_changes(
            || self.snapshot(),
            self.backend.load_previous_messages(before, limit),
            diff::<Message>,
        )
        .await
    }

    async fn load_next(&self, limit: usize) -> Result<ChangeSet, DataSourceError> {
        load_with_changes(
            || self.snapshot(),
            self.backend.load_next_messages(limit),
            diff::<Message>,
        )
        .await
    }

    async fn load_page_around(&self, message_id: &str) -> Result<ChangeSet, DataSourceError> {
        if message_id == self.root_id {
            return self.load_first_page().await;
        }
        load_with_changes(
            || self.snapshot(),
            self.backend.load_page_around(message_id),
            diff::<Message>,
        )
        .await
    }

    async fn load_first_page(&self) -> Result<ChangeSet, DataSourceError> {
        load_with_changes(
            || self.snapshot(),
            self.backend.load_first_page(),
            diff::<Message>,
        )
        .await
    }

    /// Marks the thread read.
    async fn mark_read(&self) -> Result<(), DataSourceError> {
        self.backend.mark_read().await?;
        Ok(())
    }

    async fn mark_unread(&self, from_message_id: &str) -> Result<(), DataSourceError> {
        self.backend.mark_unread(from_message_id).await?;
        Ok(())
    }
}
