use super::{JumpOutcome, ListNotice, MessageListEngine, TimerPurpose, UNKNOWN_MESSAGE_ID};
use crate::backend::PageKind;
use crate::error::JumpError;
use log::{debug, info};

impl MessageListEngine {
    /// Scrolls to `message_id`, loading a page around it when it is not in
    /// the window.
    ///
    /// Only one jump may load at a time. Completion of a loading jump is
    /// published as [`ListNotice::JumpCompleted`] or [`ListNotice::JumpFailed`].
    pub fn jump_to_message(&mut self, message_id: &str) -> Result<JumpOutcome, JumpError> {
        if self.window.newest().is_some_and(|m| m.id == message_id) {
            self.timers.cancel(TimerPurpose::AnchorClear);
            self.scroll_anchor_id = None;
            return Ok(JumpOutcome::Immediate);
        }

        if self.loading_around {
            return Err(JumpError::InProgress);
        }

        if message_id == UNKNOWN_MESSAGE_ID {
            let last_read = match self.read_state.first_unread_message_id() {
                None => self.read_state.last_read_message_id().map(str::to_string),
                Some(_) => None,
            };
            let Some(last_read) = last_read else {
                return Err(JumpError::NoTarget);
            };
            debug!(target: "MessageList/Engine", "Resolving unread placeholder through last read {last_read}");
            self.start_jump_load(last_read);
            return Ok(JumpOutcome::Loading);
        }

        if let Some(resolved) = self.window.resolve_id(message_id).map(str::to_string) {
            self.anchor_with_highlight(resolved);
            return Ok(JumpOutcome::Immediate);
        }

        if let Some(root_id) = self.foreign_thread_root(message_id) {
            info!(target: "MessageList/Engine", "Message {message_id} lives in thread {root_id}");
            self.notify(ListNotice::OpenThread {
                root_id: root_id.clone(),
                message_id: message_id.to_string(),
            });
            return Ok(JumpOutcome::PendingThread { root_id });
        }

        self.start_jump_load(message_id.to_string());
        Ok(JumpOutcome::Loading)
    }

    /// The root of the thread holding `message_id`, when that thread is not
    /// the open context and the reply is not also shown in the channel.
    fn foreign_thread_root(&self, message_id: &str) -> Option<String> {
        let message = self.data_source.message(message_id)?;
        let parent_id = message.parent_id.filter(|_| !message.shown_in_channel)?;
        if self.data_source.thread_root_id().as_deref() == Some(parent_id.as_str()) {
            return None;
        }
        Some(parent_id)
    }

    fn start_jump_load(&mut self, target: String) {
        self.loading_around = true;
        self.pending_jump = Some(target.clone());
        self.spawn_load(PageKind::Around, move |ds| {
            Box::pin(async move { ds.load_page_around(&target).await })
        });
    }

    /// Lands a jump whose page has loaded, looking through id decorations
    /// the page may have applied to the target.
    pub(super) fn finish_jump(&mut self, target: String) {
        match self.window.resolve_id(&target).map(str::to_string) {
            Some(resolved) => {
                self.anchor_with_highlight(resolved.clone());
                self.notify(ListNotice::JumpCompleted {
                    message_id: resolved,
                });
            }
            None => self.notify(ListNotice::JumpFailed {
                message_id: target.clone(),
                error: JumpError::NotFound(target),
            }),
        }
    }

    fn anchor_with_highlight(&mut self, message_id: String) {
        // Clear first so an unchanged target still scrolls.
        self.scroll_anchor_id = None;
        self.set_anchor(message_id.clone());

        self.timers.cancel(TimerPurpose::HighlightClear);
        self.highlighted_message_id = None;
        self.pending_highlight = Some(message_id);
        self.schedule_timer(
            TimerPurpose::HighlightStart,
            self.config.highlight_start_delay(),
        );
    }
}
