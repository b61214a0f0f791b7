use crate::change::{self, ChangeSet};
use crate::message::{Message, canonical_message_id};
use log::warn;
use std::collections::HashSet;

/// The materialized, newest-first slice of a conversation's history.
///
/// Every mutation leaves the window free of duplicate ids and ordered by
/// descending creation time, ties keeping their arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageWindow {
    messages: Vec<Message>,
    has_loaded_all_previous: bool,
    has_loaded_all_next: bool,
}

impl MessageWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut window = Self {
            messages,
            has_loaded_all_previous: false,
            has_loaded_all_next: true,
        };
        window.normalize();
        window
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn newest(&self) -> Option<&Message> {
        self.messages.first()
    }

    pub fn oldest(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_of(id).is_some()
    }

    /// Finds the window id that refers to `id`, looking through list-identity
    /// decorations such as the deleted-message suffix.
    pub fn resolve_id(&self, id: &str) -> Option<&str> {
        if let Some(index) = self.index_of(id) {
            return Some(self.messages[index].id.as_str());
        }
        let wanted = canonical_message_id(id);
        self.messages
            .iter()
            .find(|m| m.canonical_id() == wanted)
            .map(|m| m.id.as_str())
    }

    pub fn has_loaded_all_previous(&self) -> bool {
        self.has_loaded_all_previous
    }

    /// True when the window reaches the live tail.
    pub fn has_loaded_all_next(&self) -> bool {
        self.has_loaded_all_next
    }

    pub fn set_completion(&mut self, all_previous: bool, all_next: bool) {
        self.has_loaded_all_previous = all_previous;
        self.has_loaded_all_next = all_next;
    }

    /// Replays a change set delivered against this window.
    pub fn apply(&mut self, changes: &ChangeSet) {
        change::apply(&mut self.messages, changes);
        self.normalize();
    }

    /// Discards the current contents in favour of a snapshot.
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.normalize();
    }

    pub fn is_ordered(&self) -> bool {
        self.messages
            .windows(2)
            .all(|pair| pair[0].created_at >= pair[1].created_at)
    }

    fn normalize(&mut self) {
        let mut seen = HashSet::with_capacity(self.messages.len());
        let before = self.messages.len();
        self.messages.retain(|m| seen.insert(m.id.clone()));
        if self.messages.len() != before {
            warn!(
                "Dropped {} duplicate message(s) from window",
                before - self.messages.len()
            );
        }

        if !self.is_ordered() {
            warn!("Window arrived out of order, re-sorting by creation time");
            // Stable sort keeps arrival order for identical timestamps.
            self.messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
    }
}
