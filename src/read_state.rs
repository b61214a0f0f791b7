//! Unread boundary tracking and the throttled mark-read side effect.

use crate::backend::ConversationSummary;
use crate::data_source::{ConversationKind, MessageWindowDataSource};
use crate::throttle::Throttle;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Session state a thread read depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadContext {
    pub app_active: bool,
    pub at_live_tail: bool,
}

pub struct ReadStateTracker {
    kind: ConversationKind,
    first_unread_message_id: Option<String>,
    last_read_message_id: Option<String>,
    unread_count: u32,
    reply_count: u32,
    can_mark_read: bool,
    has_set_initial_can_mark_read: bool,
    has_loaded_metadata: bool,
    user_marked_unread: bool,
    throttle: Throttle<String>,
}

impl ReadStateTracker {
    pub fn new(data_source: Arc<dyn MessageWindowDataSource>, throttle_window: Duration) -> Self {
        let kind = data_source.kind();
        let throttle = Throttle::new(throttle_window, move |message_id: String| {
            let data_source = Arc::clone(&data_source);
            async move {
                debug!(target: "MessageList/ReadState", "Marking read up to {message_id}");
                if let Err(e) = data_source.mark_read().await {
                    warn!(target: "MessageList/ReadState", "Failed to mark conversation read: {e}");
                }
            }
        });
        Self {
            kind,
            first_unread_message_id: None,
            last_read_message_id: None,
            unread_count: 0,
            reply_count: 0,
            can_mark_read: false,
            has_set_initial_can_mark_read: false,
            has_loaded_metadata: false,
            user_marked_unread: false,
            throttle,
        }
    }

    pub fn first_unread_message_id(&self) -> Option<&str> {
        self.first_unread_message_id.as_deref()
    }

    pub fn last_read_message_id(&self) -> Option<&str> {
        self.last_read_message_id.as_deref()
    }

    pub fn unread_count(&self) -> u32 {
        self.unread_count
    }

    pub fn can_mark_read(&self) -> bool {
        self.can_mark_read
    }

    pub fn has_set_initial_can_mark_read(&self) -> bool {
        self.has_set_initial_can_mark_read
    }

    pub fn user_marked_unread(&self) -> bool {
        self.user_marked_unread
    }

    /// Records conversation metadata. The first call seeds the unread
    /// boundary; later calls only refresh counters.
    pub fn on_metadata(
        &mut self,
        conversation: &ConversationSummary,
        first_unread_from_source: Option<String>,
    ) {
        self.unread_count = conversation.unread_count;
        self.reply_count = conversation.reply_count;
        self.last_read_message_id = conversation.last_read_message_id.clone();
        if self.has_loaded_metadata {
            return;
        }
        self.has_loaded_metadata = true;

        if self.kind == ConversationKind::Livestream {
            return;
        }
        if conversation.unread_count > 0 {
            self.first_unread_message_id =
                first_unread_from_source.or_else(|| conversation.last_read_message_id.clone());
            self.can_mark_read = false;
            info!(
                target: "MessageList/ReadState",
                "Conversation has {} unread, boundary at {:?}",
                conversation.unread_count,
                self.first_unread_message_id
            );
        } else {
            self.can_mark_read = true;
        }
    }

    /// Marks the end of the first synchronization pass.
    pub fn complete_initial_sync(&mut self) {
        self.has_set_initial_can_mark_read = true;
    }

    pub fn is_tracking_unread(&self) -> bool {
        self.kind != ConversationKind::Livestream && self.unread_count > 0
    }

    /// Adopts a boundary reported after the initial load, if none is tracked.
    pub fn refresh_first_unread(&mut self, first_unread_from_source: Option<String>) {
        if self.first_unread_message_id.is_none() && !self.user_marked_unread {
            self.first_unread_message_id = first_unread_from_source;
        }
    }

    /// Opens the mark-read gate once the boundary message has been seen after
    /// the first synchronization pass. Returns whether the gate flipped.
    pub fn on_message_visible(&mut self, message_id: &str) -> bool {
        if !self.has_set_initial_can_mark_read || self.can_mark_read || self.user_marked_unread {
            return false;
        }
        if self.first_unread_message_id.as_deref() != Some(message_id) {
            return false;
        }
        debug!(target: "MessageList/ReadState", "Unread boundary {message_id} became visible");
        self.can_mark_read = true;
        true
    }

    /// Requests a throttled mark read. Returns whether a request was queued.
    ///
    /// The boundary itself stays in place until the conversation is reopened.
    pub fn send_read_event_if_needed(&mut self, message_id: &str, context: ReadContext) -> bool {
        if self.user_marked_unread {
            return false;
        }
        let allowed = match self.kind {
            ConversationKind::Channel => self.unread_count > 0,
            ConversationKind::Thread => {
                context.app_active && self.reply_count > 0 && context.at_live_tail
            }
            ConversationKind::Livestream => false,
        };
        if allowed {
            self.throttle.trigger(message_id.to_string());
        }
        allowed
    }

    /// Applies an explicit "mark unread" from the user. Mark read stays
    /// disabled until the conversation is reopened.
    pub fn mark_unread(&mut self, from_message_id: &str) {
        self.first_unread_message_id = Some(from_message_id.to_string());
        self.user_marked_unread = true;
        self.can_mark_read = false;
        self.cancel_pending();
    }

    /// Drops a queued mark read without sending it.
    pub fn cancel_pending(&self) {
        self.throttle.cancel();
    }

    pub fn has_pending_read(&self) -> bool {
        self.throttle.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::data_source::{ChannelDataSource, LivestreamDataSource, ThreadDataSource};
    use chatwindow_core::Message;
    use chrono::{TimeZone, Utc};

    fn unread(count: u32) -> ConversationSummary {
        ConversationSummary {
            id: "general".into(),
            unread_count: count,
            last_read_message_id: Some("m2".into()),
            ..Default::default()
        }
    }

    fn backend(conversation: ConversationSummary) -> Arc<InMemoryBackend> {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let history = (1..=6)
            .map(|n| Message::new(format!("m{n}"), "alice", base + chrono::Duration::minutes(n)))
            .collect();
        Arc::new(InMemoryBackend::new(Some(conversation), history, 10))
    }

    fn channel_tracker(backend: &Arc<InMemoryBackend>) -> ReadStateTracker {
        ReadStateTracker::new(
            Arc::new(ChannelDataSource::new(backend.clone())),
            Duration::from_secs(3),
        )
    }

    const FOREGROUND_TAIL: ReadContext = ReadContext {
        app_active: true,
        at_live_tail: true,
    };

    #[tokio::test]
    async fn test_initial_metadata_prefers_specific_boundary() {
        let backend = backend(unread(2));
        let mut tracker = channel_tracker(&backend);

        tracker.on_metadata(&unread(2), Some("m5".into()));
        assert_eq!(tracker.first_unread_message_id(), Some("m5"));
        assert!(!tracker.can_mark_read());

        tracker.on_metadata(&unread(3), Some("m6".into()));
        assert_eq!(tracker.first_unread_message_id(), Some("m5"));
        assert_eq!(tracker.unread_count(), 3);
    }

    #[tokio::test]
    async fn test_initial_metadata_falls_back_to_last_read() {
        let backend = backend(unread(2));
        let mut tracker = channel_tracker(&backend);

        tracker.on_metadata(&unread(2), None);
        assert_eq!(tracker.first_unread_message_id(), Some("m2"));
    }

    #[tokio::test]
    async fn test_read_conversation_can_mark_immediately() {
        let backend = backend(unread(0));
        let mut tracker = channel_tracker(&backend);

        tracker.on_metadata(&unread(0), None);
        assert!(tracker.can_mark_read());
        assert_eq!(tracker.first_unread_message_id(), None);
    }

    #[tokio::test]
    async fn test_boundary_visibility_flips_gate_once() {
        let backend = backend(unread(2));
        let mut tracker = channel_tracker(&backend);
        tracker.on_metadata(&unread(2), Some("m5".into()));

        assert!(!tracker.on_message_visible("m5"));
        tracker.complete_initial_sync();

        assert!(!tracker.on_message_visible("m4"));
        assert!(tracker.on_message_visible("m5"));
        assert!(tracker.can_mark_read());
        assert!(!tracker.on_message_visible("m5"));
        assert!(tracker.can_mark_read());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_reads_marks_once() {
        let backend = backend(unread(2));
        let mut tracker = channel_tracker(&backend);
        tracker.on_metadata(&unread(2), Some("m5".into()));

        for id in ["m6", "m5", "m6"] {
            assert!(tracker.send_read_event_if_needed(id, FOREGROUND_TAIL));
        }
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert_eq!(backend.mark_read_calls(), 1);
        assert_eq!(tracker.first_unread_message_id(), Some("m5"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_unread_overrides_for_session() {
        let backend = backend(unread(2));
        let mut tracker = channel_tracker(&backend);
        tracker.on_metadata(&unread(2), None);
        tracker.complete_initial_sync();

        tracker.send_read_event_if_needed("m6", FOREGROUND_TAIL);
        assert!(tracker.has_pending_read());
        tracker.mark_unread("m4");
        assert!(!tracker.has_pending_read());
        assert!(!tracker.send_read_event_if_needed("m6", FOREGROUND_TAIL));
        assert!(!tracker.on_message_visible("m4"));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(backend.mark_read_calls(), 0);
        assert_eq!(tracker.first_unread_message_id(), Some("m4"));
    }

    #[tokio::test]
    async fn test_zero_unread_skips_channel_read() {
        let backend = backend(unread(0));
        let mut tracker = channel_tracker(&backend);
        tracker.on_metadata(&unread(0), None);

        assert!(!tracker.send_read_event_if_needed("m6", FOREGROUND_TAIL));
        assert!(!tracker.has_pending_read());
    }

    #[tokio::test]
    async fn test_thread_read_gates() {
        let backend = backend(ConversationSummary {
            reply_count: 2,
            ..Default::default()
        });
        let source = Arc::new(ThreadDataSource::new(backend.clone(), "m1"));
        let mut tracker = ReadStateTracker::new(source, Duration::from_secs(3));
        tracker.on_metadata(
            &ConversationSummary {
                reply_count: 2,
                ..Default::default()
            },
            None,
        );

        let background = ReadContext {
            app_active: false,
            at_live_tail: true,
        };
        let scrolled_back = ReadContext {
            app_active: true,
            at_live_tail: false,
        };
        assert!(!tracker.send_read_event_if_needed("m6", background));
        assert!(!tracker.send_read_event_if_needed("m6", scrolled_back));
        assert!(tracker.send_read_event_if_needed("m6", FOREGROUND_TAIL));

        tracker.on_metadata(&ConversationSummary::default(), None);
        tracker.cancel_pending();
        assert!(!tracker.send_read_event_if_needed("m6", FOREGROUND_TAIL));
    }

    #[tokio::test]
    async fn test_livestream_never_tracks_unread() {
        let backend = backend(unread(4));
        let source = Arc::new(LivestreamDataSource::new(backend.clone()));
        let mut tracker = ReadStateTracker::new(source, Duration::from_secs(3));
        tracker.on_metadata(&unread(4), Some("m3".into()));

        assert_eq!(tracker.first_unread_message_id(), None);
        assert!(!tracker.is_tracking_unread());
        assert!(!tracker.send_read_event_if_needed("m6", FOREGROUND_TAIL));
    }
}
