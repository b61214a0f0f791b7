//! Projects a [`MessageBackend`] into the change sets the engine consumes.
//!
//! Three variants share one contract: [`ChannelDataSource`],
//! [`ThreadDataSource`] and [`LivestreamDataSource`]. The engine only talks
//! to the [`MessageWindowDataSource`] trait and never branches on the
//! variant beyond what [`ConversationKind`] exposes.

pub mod channel;
pub mod livestream;
pub mod thread;

use crate::backend::{BackendEvent, ConversationSummary, MessageBackend};
use crate::error::DataSourceError;
use async_trait::async_trait;
use chatwindow_core::{ChangeSet, Message};
use log::{debug, warn};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub use channel::ChannelDataSource;
pub use livestream::LivestreamDataSource;
pub use thread::ThreadDataSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Channel,
    Thread,
    Livestream,
}

/// Receives upstream batches, once per backend event.
pub trait DataSourceListener: Send + Sync {
    fn did_update_messages(&self, messages: Vec<Message>, changes: ChangeSet);

    /// Metadata-only change (name, read state, reply count) that leaves
    /// message order untouched.
    fn did_update_conversation(&self, conversation: ConversationSummary);
}

#[derive(Debug, Clone)]
pub enum DataSourceEvent {
    MessagesUpdated {
        messages: Vec<Message>,
        changes: ChangeSet,
    },
    ConversationUpdated(ConversationSummary),
}

#[async_trait]
pub trait MessageWindowDataSource: Send + Sync {
    fn kind(&self) -> ConversationKind;

    fn conversation(&self) -> Option<ConversationSummary>;

    /// Root of the thread this source serves, if it serves one.
    fn thread_root_id(&self) -> Option<String> {
        None
    }

    /// Current list, newest first.
    fn messages(&self) -> Vec<Message>;

    fn has_loaded_all_previous(&self) -> bool;

    fn has_loaded_all_next(&self) -> bool;

    fn first_unread_message_id(&self) -> Option<String>;

    fn message(&self, id: &str) -> Option<Message>;

    /// Whether change sets from this source are too coarse to replay and the
    /// window should be replaced by [`Self::messages`] instead.
    fn reports_full_snapshots(&self) -> bool {
        false
    }

    /// Registers the listener for upstream events, replacing any previous one.
    fn set_listener(&self, listener: Arc<dyn DataSourceListener>);

    async fn load_previous(
        &self,
        before: Option<String>,
        limit: usize,
    ) -> Result<ChangeSet, DataSourceError>;

    async fn load_next(&self, limit: usize) -> Result<ChangeSet, DataSourceError>;

    /// Replaces the loaded list with a page centred on `message_id`.
    async fn load_page_around(&self, message_id: &str) -> Result<ChangeSet, DataSourceError>;

    async fn load_first_page(&self) -> Result<ChangeSet, DataSourceError>;

    async fn mark_read(&self) -> Result<(), DataSourceError>;

    async fn mark_unread(&self, from_message_id: &str) -> Result<(), DataSourceError>;
}

/// Runs `load` and reports how the list returned by `snapshot` changed.
pub(crate) async fn load_with_changes<S, F, D>(
    snapshot: S,
    load: F,
    derive: D,
) -> Result<ChangeSet, DataSourceError>
where
    S: Fn() -> Vec<Message>,
    F: Future<Output = Result<(), anyhow::Error>>,
    D: FnOnce(&[Message], &[Message]) -> ChangeSet,
{
    let before = snapshot();
    load.await?;
    let after = snapshot();
    Ok(derive(&before, &after))
}

/// Owns the task that pumps backend events into the registered listener.
#[derive(Default)]
pub(crate) struct Forwarder {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Forwarder {
    /// Subscribes to `backend` and forwards mapped events to `listener`.
    /// The subscription is taken before this returns, so nothing published
    /// afterwards is missed.
    pub(crate) fn start<M>(
        &self,
        backend: &Arc<dyn MessageBackend>,
        listener: Arc<dyn DataSourceListener>,
        mut map: M,
    ) where
        M: FnMut(BackendEvent) -> Option<DataSourceEvent> + Send + 'static,
    {
        let mut events = backend.subscribe();
        let backend = Arc::clone(backend);
        let handle = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "MessageList/DataSource", "Listener lagged by {skipped} events, resyncing from snapshot");
                        BackendEvent::MessagesReplaced(backend.messages())
                    }
                    Err(RecvError::Closed) => {
                        debug!(target: "MessageList/DataSource", "Backend event stream closed");
                        return;
                    }
                };
                match map(event) {
                    Some(DataSourceEvent::MessagesUpdated { messages, changes }) => {
                        listener.did_update_messages(messages, changes)
                    }
                    Some(DataSourceEvent::ConversationUpdated(conversation)) => {
                        listener.did_update_conversation(conversation)
                    }
                    None => {}
                }
            }
        });

        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        if let Some(task) = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}
