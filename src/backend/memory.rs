use super::{BackendEvent, ConversationSummary, MessageBackend, PageKind};
use anyhow::anyhow;
use async_trait::async_trait;
use chatwindow_core::{ChangeSet, ListChange, Message};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 100;

struct MemoryState {
    conversation: Option<ConversationSummary>,
    /// Full history, newest first.
    history: Vec<Message>,
    /// Materialized window is `history[start..end]`.
    start: usize,
    end: usize,
    root: Option<Message>,
    page_size: usize,
    failures: HashSet<PageKind>,
    load_delay: Option<Duration>,
    load_calls: HashMap<PageKind, usize>,
    mark_read_calls: usize,
    mark_unread_calls: Vec<String>,
}

impl MemoryState {
    fn window(&self) -> Vec<Message> {
        self.history[self.start..self.end].to_vec()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.history.iter().position(|m| m.id == id)
    }

    fn take_failure(&mut self, kind: PageKind) -> Result<(), anyhow::Error> {
        *self.load_calls.entry(kind).or_default() += 1;
        if self.failures.remove(&kind) {
            return Err(anyhow!("injected {kind} page failure"));
        }
        Ok(())
    }
}

/// A backend over an in-memory history, for tests and demos.
///
/// Loads move a materialized window over the history. Mutations made through
/// the helper methods are broadcast the way a live connection would deliver
/// them: as incremental change sets, or as full snapshots when the backend
/// was built with [`InMemoryBackend::with_snapshot_events`].
#[derive(Clone)]
pub struct InMemoryBackend {
    state: Arc<RwLock<MemoryState>>,
    events: broadcast::Sender<BackendEvent>,
    snapshot_events: bool,
}

impl InMemoryBackend {
    /// Creates a backend whose window holds the newest page of `history`.
    pub fn new(
        conversation: Option<ConversationSummary>,
        mut history: Vec<Message>,
        page_size: usize,
    ) -> Self {
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let end = page_size.min(history.len());
        Self {
            state: Arc::new(RwLock::new(MemoryState {
                conversation,
                history,
                start: 0,
                end,
                root: None,
                page_size,
                failures: HashSet::new(),
                load_delay: None,
                load_calls: HashMap::new(),
                mark_read_calls: 0,
                mark_unread_calls: Vec::new(),
            })),
            events: broadcast::channel(EVENT_CAPACITY).0,
            snapshot_events: false,
        }
    }

    /// Reports every message mutation as a full snapshot.
    pub fn with_snapshot_events(mut self) -> Self {
        self.snapshot_events = true;
        self
    }

    pub fn with_root(self, root: Message) -> Self {
        self.write().root = Some(root);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_messages(&self, state: &MemoryState, changes: ChangeSet) {
        let event = if self.snapshot_events {
            BackendEvent::MessagesReplaced(state.window())
        } else {
            BackendEvent::MessagesChanged(changes)
        };
        let _ = self.events.send(event);
    }

    fn emit_conversation(&self, state: &MemoryState) {
        if let Some(conversation) = &state.conversation {
            let _ = self
                .events
                .send(BackendEvent::ConversationChanged(conversation.clone()));
        }
    }

    async fn simulate_latency(&self) {
        let delay = self.read().load_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Makes the next load of `kind` fail.
    pub fn fail_next(&self, kind: PageKind) {
        self.write().failures.insert(kind);
    }

    pub fn set_load_delay(&self, delay: Duration) {
        self.write().load_delay = Some(delay);
    }

    pub fn load_calls(&self, kind: PageKind) -> usize {
        self.read().load_calls.get(&kind).copied().unwrap_or(0)
    }

    pub fn mark_read_calls(&self) -> usize {
        self.read().mark_read_calls
    }

    pub fn mark_unread_calls(&self) -> Vec<String> {
        self.read().mark_unread_calls.clone()
    }

    /// Delivers a message written by someone else.
    pub fn receive(&self, message: Message) {
        self.insert(vec![message], true);
    }

    /// Delivers several messages from others as one upstream batch.
    pub fn receive_batch(&self, messages: Vec<Message>) {
        self.insert(messages, true);
    }

    /// Delivers a message written by the current user.
    pub fn send(&self, message: Message) {
        self.insert(vec![message], false);
    }

    fn insert(&self, messages: Vec<Message>, counts_as_unread: bool) {
        let mut state = self.write();
        let mut changes = Vec::new();
        for message in messages {
            let position = state
                .history
                .iter()
                .position(|m| m.created_at <= message.created_at)
                .unwrap_or(state.history.len());
            state.history.insert(position, message.clone());

            let in_window = position >= state.start
                && position <= state.end
                && (position > state.start || state.start == 0);
            if in_window {
                state.end += 1;
                changes.push(ListChange::Insert {
                    item: message,
                    index: position - state.start,
                });
            } else if position <= state.start {
                state.start += 1;
                state.end += 1;
            }

            let is_thread = state.root.is_some();
            if let Some(conversation) = state.conversation.as_mut() {
                if counts_as_unread {
                    conversation.unread_count += 1;
                }
                if is_thread {
                    conversation.reply_count += 1;
                }
            }
        }

        if !changes.is_empty() {
            self.emit_messages(&state, changes);
        }
        self.emit_conversation(&state);
    }

    pub fn update_message(&self, message: Message) {
        let mut state = self.write();
        let Some(position) = state.position(&message.id) else {
            return;
        };
        state.history[position] = message.clone();
        if (state.start..state.end).contains(&position) {
            let index = position - state.start;
            self.emit_messages(
                &state,
                vec![ListChange::Update {
                    item: message,
                    index,
                }],
            );
        }
    }

    pub fn delete_message(&self, id: &str) {
        let mut state = self.write();
        let Some(position) = state.position(id) else {
            return;
        };
        let removed = state.history.remove(position);
        if (state.start..state.end).contains(&position) {
            state.end -= 1;
            let index = position - state.start;
            self.emit_messages(
                &state,
                vec![ListChange::Remove {
                    item: removed,
                    index,
                }],
            );
        } else if position < state.start {
            state.start -= 1;
            state.end -= 1;
        }
    }

    pub fn set_conversation(&self, conversation: ConversationSummary) {
        let mut state = self.write();
        state.conversation = Some(conversation);
        self.emit_conversation(&state);
    }
}

#[async_trait]
impl MessageBackend for InMemoryBackend {
    fn conversation(&self) -> Option<ConversationSummary> {
        self.read().conversation.clone()
    }

    fn messages(&self) -> Vec<Message> {
        self.read().window()
    }

    fn root_message(&self) -> Option<Message> {
        self.read().root.clone()
    }

    fn has_loaded_all_previous(&self) -> bool {
        let state = self.read();
        state.end == state.history.len()
    }

    fn has_loaded_all_next(&self) -> bool {
        self.read().start == 0
    }

    fn message(&self, id: &str) -> Option<Message> {
        let state = self.read();
        state
            .history
            .iter()
            .chain(state.root.iter())
            .find(|m| m.id == id)
            .cloned()
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }

    async fn load_previous_messages(
        &self,
        before: Option<String>,
        limit: usize,
    ) -> Result<(), anyhow::Error> {
        self.simulate_latency().await;
        let mut state = self.write();
        state.take_failure(PageKind::Previous)?;
        let anchor = before
            .as_deref()
            .and_then(|id| state.position(id))
            .map(|p| p + 1)
            .unwrap_or(state.end);
        let len = state.history.len();
        state.end = (anchor + limit).min(len).max(state.end);
        debug!("Loaded previous page, window is now {}..{}", state.start, state.end);
        Ok(())
    }

    async fn load_next_messages(&self, limit: usize) -> Result<(), anyhow::Error> {
        self.simulate_latency().await;
        let mut state = self.write();
        state.take_failure(PageKind::Next)?;
        state.start = state.start.saturating_sub(limit);
        debug!("Loaded next page, window is now {}..{}", state.start, state.end);
        Ok(())
    }

    async fn load_page_around(&self, message_id: &str) -> Result<(), anyhow::Error> {
        self.simulate_latency().await;
        let mut state = self.write();
        state.take_failure(PageKind::Around)?;
        let position = state
            .position(message_id)
            .ok_or_else(|| anyhow!("message {message_id} not found"))?;
        let half = state.page_size / 2;
        state.start = position.saturating_sub(half);
        state.end = (position + half + 1).min(state.history.len());
        Ok(())
    }

    async fn load_first_page(&self) -> Result<(), anyhow::Error> {
        self.simulate_latency().await;
        let mut state = self.write();
        state.take_failure(PageKind::First)?;
        state.start = 0;
        state.end = state.page_size.min(state.history.len());
        Ok(())
    }

    async fn mark_read(&self) -> Result<(), anyhow::Error> {
        let mut state = self.write();
        state.mark_read_calls += 1;
        let newest = state.history.first().map(|m| m.id.clone());
        if let Some(conversation) = state.conversation.as_mut() {
            conversation.unread_count = 0;
            conversation.first_unread_message_id = None;
            conversation.last_read_message_id = newest;
        }
        self.emit_conversation(&state);
        Ok(())
    }

    async fn mark_unread(&self, from_message_id: &str) -> Result<(), anyhow::Error> {
        let mut state = self.write();
        state.mark_unread_calls.push(from_message_id.to_string());
        let position = state
            .position(from_message_id)
            .ok_or_else(|| anyhow!("message {from_message_id} not found"))?;
        let last_read = state.history.get(position + 1).map(|m| m.id.clone());
        if let Some(conversation) = state.conversation.as_mut() {
            conversation.unread_count = (position + 1) as u32;
            conversation.first_unread_message_id = Some(from_message_id.to_string());
            conversation.last_read_message_id = last_read;
        }
        self.emit_conversation(&state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn history(count: i64) -> Vec<Message> {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        (1..=count)
            .map(|n| Message::new(format!("m{n}"), "alice", base + ChronoDuration::minutes(n)))
            .collect()
    }

    fn ids(messages: &[Message]) -> Vec<String> {
        messages.iter().map(|m| m.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_pages_move_the_window() {
        let backend = InMemoryBackend::new(None, history(10), 3);
        assert_eq!(ids(&backend.messages()), vec!["m10", "m9", "m8"]);
        assert!(backend.has_loaded_all_next());

        backend
            .load_previous_messages(Some("m8".into()), 2)
            .await
            .expect("load should succeed");
        assert_eq!(ids(&backend.messages()), vec!["m10", "m9", "m8", "m7", "m6"]);

        backend.load_page_around("m3").await.expect("load should succeed");
        assert_eq!(ids(&backend.messages()), vec!["m4", "m3", "m2"]);
        assert!(!backend.has_loaded_all_next());

        backend.load_next_messages(2).await.expect("load should succeed");
        assert_eq!(ids(&backend.messages()), vec!["m6", "m5", "m4", "m3", "m2"]);
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let backend = InMemoryBackend::new(None, history(5), 2);
        backend.fail_next(PageKind::Previous);

        assert!(backend.load_previous_messages(None, 2).await.is_err());
        assert!(backend.load_previous_messages(None, 2).await.is_ok());
        assert_eq!(backend.load_calls(PageKind::Previous), 2);
    }

    #[tokio::test]
    async fn test_receive_at_tail_emits_insert() {
        let backend = InMemoryBackend::new(Some(ConversationSummary::default()), history(3), 3);
        let mut events = backend.subscribe();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

        backend.receive(Message::new("m4", "bob", base));

        match events.recv().await.expect("event expected") {
            BackendEvent::MessagesChanged(changes) => {
                assert!(matches!(&changes[0], ListChange::Insert { index: 0, .. }));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            events.recv().await.expect("event expected"),
            BackendEvent::ConversationChanged(c) if c.unread_count == 1
        ));
    }
}
