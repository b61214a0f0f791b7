use crate::backend::{ConversationSummary, PageKind};
use crate::error::{DataSourceError, JumpError};
use chatwindow_core::{ChangeSet, Message};
use std::sync::Arc;

/// Placeholder id deep links use for "the unread marker".
pub const UNKNOWN_MESSAGE_ID: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    /// Towards older messages.
    Up,
    /// Towards the live tail.
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    AnchorClear,
    HighlightStart,
    HighlightClear,
}

/// Work delivered to the engine's inbox from background tasks.
#[derive(Debug)]
pub enum EngineEvent {
    PageLoaded {
        kind: PageKind,
        result: Result<ChangeSet, DataSourceError>,
    },
    MessagesUpdated {
        messages: Vec<Message>,
        changes: ChangeSet,
    },
    ConversationUpdated(ConversationSummary),
    TimerFired {
        purpose: TimerPurpose,
        generation: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JumpOutcome {
    /// The target was already loaded and the anchor has moved.
    Immediate,
    /// A page around the target is loading.
    Loading,
    /// The target lives in another thread; the caller should open it.
    PendingThread { root_id: String },
}

impl JumpOutcome {
    pub fn is_immediate(&self) -> bool {
        matches!(self, JumpOutcome::Immediate)
    }
}

/// Notices published to the rendering layer.
#[derive(Debug, Clone)]
pub enum ListNotice {
    PageLoadFailed {
        kind: PageKind,
        error: Arc<DataSourceError>,
    },
    JumpCompleted {
        message_id: String,
    },
    JumpFailed {
        message_id: String,
        error: JumpError,
    },
    OpenThread {
        root_id: String,
        message_id: String,
    },
}
