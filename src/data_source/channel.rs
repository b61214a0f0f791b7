use super::{
    ConversationKind, DataSourceEvent, DataSourceListener, Forwarder, MessageWindowDataSource,
    load_with_changes,
};
use crate::backend::{BackendEvent, ConversationSummary, MessageBackend};
use crate::error::DataSourceError;
use async_trait::async_trait;
use chatwindow_core::{ChangeSet, Message};
use chatwindow_core::change::diff;
use std::sync::Arc;

/// Serves a channel's main timeline.
pub struct ChannelDataSource {
    backend: Arc<dyn MessageBackend>,
    forwarder: Forwarder,
}

impl ChannelDataSource {
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
impl MessageWindowDataSource for ChannelDataSource {
    fn kind(&self) -> ConversationKind {
        ConversationKind::Channel
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

    /// The server's unread boundary, falling back to the oldest loaded
    /// message when the channel is unread without one.
    fn first_unread_message_id(&self) -> Option<String> {
        let conversation = self.backend.conversation()?;
        if let Some(id) = conversation.first_unread_message_id {
            return Some(id);
        }
        if conversation.unread_count == 0 {
            return None;
        }
        self.backend.messages().last().map(|m| m.id.clone())
    }

    fn message(&self, id: &str) -> Option<Message> {
        self.backend.message(id)
    }

    fn set_listener(&self, listener: Arc<dyn DataSourceListener>) {
        let backend = Arc::clone(&self.backend);
        let mut last = backend.messages();
        self.forwarder
            .start(&self.backend, listener, move |event| match event {
                BackendEvent::MessagesChanged(changes) => {
                    last = backend.messages();
                    Some(DataSourceEvent::MessagesUpdated {
                        messages: last.clone(),
                        changes,
                    })
                }
                BackendEvent::MessagesReplaced(messages) => {
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

    async fn mark_read(&self) -> Result<(), DataSourceError> {
        self.backend.mark_read().await?;
        Ok(())
    }

    async fn mark_unread(&self, from_message_id: &str) -> Result<(), DataSourceError> {
        self.backend.mark_unread(from_message_id).await?;
        Ok(())
    }
}
