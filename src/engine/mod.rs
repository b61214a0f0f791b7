//! The synchronization engine behind one open conversation view.
//!
//! [`MessageListEngine`] owns the window and everything derived from it. It
//! never shares that state: background work (page loads, timers, upstream
//! pushes) reports back through an inbox of [`EngineEvent`]s which the owner
//! drains with [`MessageListEngine::process_next`] or
//! [`MessageListEngine::process_pending`], so every mutation happens on the
//! owner's context in delivery order.

mod events;
mod jump;

pub use events::{
    EngineEvent, JumpOutcome, ListNotice, ScrollDirection, TimerPurpose, UNKNOWN_MESSAGE_ID,
};

use crate::backend::{ConversationSummary, PageKind};
use crate::data_source::{DataSourceListener, MessageWindowDataSource};
use crate::error::{DataSourceError, JumpError};
use crate::read_state::{ReadContext, ReadStateTracker};
use crate::timers::TimerArena;
use chatwindow_core::{
    ChangeSet, GroupingInfo, ListChange, Message, MessageListConfig, MessageWindow,
    group_messages,
};
use futures_util::future::BoxFuture;
use log::{debug, info, warn};
use scopeguard::ScopeGuard;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

// The size of the notice broadcast buffer.
const NOTICE_CAPACITY: usize = 100;

struct InboxListener {
    inbox: mpsc::UnboundedSender<EngineEvent>,
}

impl DataSourceListener for InboxListener {
    fn did_update_messages(&self, messages: Vec<Message>, changes: ChangeSet) {
        let _ = self
            .inbox
            .send(EngineEvent::MessagesUpdated { messages, changes });
    }

    fn did_update_conversation(&self, conversation: ConversationSummary) {
        let _ = self
            .inbox
            .send(EngineEvent::ConversationUpdated(conversation));
    }
}

pub struct MessageListEngine {
    data_source: Arc<dyn MessageWindowDataSource>,
    config: MessageListConfig,
    window: MessageWindow,
    grouping: GroupingInfo,
    read_state: ReadStateTracker,

    loading_previous: bool,
    loading_next: bool,
    loading_around: bool,
    loading_first_page: bool,
    pending_jump: Option<String>,

    scroll_anchor_id: Option<String>,
    anchor_revision: u64,
    highlighted_message_id: Option<String>,
    pending_highlight: Option<String>,
    show_scroll_to_latest: bool,
    viewport_at_latest: bool,
    user_sent_message: bool,

    refresh_epoch: u64,
    reset_threshold: usize,
    last_transition_animated: bool,

    is_active: bool,
    app_active: bool,

    timers: TimerArena<TimerPurpose>,
    inbox_tx: mpsc::UnboundedSender<EngineEvent>,
    inbox_rx: mpsc::UnboundedReceiver<EngineEvent>,
    notices: broadcast::Sender<ListNotice>,
}

impl MessageListEngine {
    pub fn new(data_source: Arc<dyn MessageWindowDataSource>, config: MessageListConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!(target: "MessageList/Engine", "Using message list config with invalid value: {e}");
        }
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let read_state =
            ReadStateTracker::new(Arc::clone(&data_source), config.mark_read_throttle());
        Self {
            data_source,
            reset_threshold: config.reset_threshold,
            config,
            window: MessageWindow::new(),
            grouping: GroupingInfo::default(),
            read_state,
            loading_previous: false,
            loading_next: false,
            loading_around: false,
            loading_first_page: false,
            pending_jump: None,
            scroll_anchor_id: None,
            anchor_revision: 0,
            highlighted_message_id: None,
            pending_highlight: None,
            show_scroll_to_latest: false,
            viewport_at_latest: true,
            user_sent_message: false,
            refresh_epoch: 0,
            last_transition_animated: false,
            is_active: false,
            app_active: true,
            timers: TimerArena::default(),
            inbox_tx,
            inbox_rx,
            notices: broadcast::channel(NOTICE_CAPACITY).0,
        }
    }

    /// Connects to the data source and performs the first synchronization
    /// pass: seeds the window, reads the initial unread state and anchors the
    /// view on the newest message.
    pub fn attach(&mut self) {
        self.data_source.set_listener(Arc::new(InboxListener {
            inbox: self.inbox_tx.clone(),
        }));
        self.is_active = true;
        self.reseed();
        self.anchor_to_newest();
        self.read_state.complete_initial_sync();
        info!(
            target: "MessageList/Engine",
            "Attached to {:?} conversation with {} messages",
            self.data_source.kind(),
            self.window.len()
        );
    }

    fn reseed(&mut self) {
        self.window.replace(self.data_source.messages());
        self.after_window_changed();
        self.refresh_affordance();
        if let Some(conversation) = self.data_source.conversation() {
            self.read_state
                .on_metadata(&conversation, self.data_source.first_unread_message_id());
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ListNotice> {
        self.notices.subscribe()
    }

    fn notify(&self, notice: ListNotice) {
        let _ = self.notices.send(notice);
    }

    pub fn config(&self) -> &MessageListConfig {
        &self.config
    }

    pub fn window(&self) -> &MessageWindow {
        &self.window
    }

    pub fn messages(&self) -> &[Message] {
        self.window.messages()
    }

    pub fn grouping_info(&self) -> &GroupingInfo {
        &self.grouping
    }

    pub fn scroll_anchor_id(&self) -> Option<&str> {
        self.scroll_anchor_id.as_deref()
    }

    /// Bumped every time the anchor is set, so a renderer can scroll again to
    /// an unchanged target.
    pub fn anchor_revision(&self) -> u64 {
        self.anchor_revision
    }

    pub fn highlighted_message_id(&self) -> Option<&str> {
        self.highlighted_message_id.as_deref()
    }

    pub fn show_scroll_to_latest(&self) -> bool {
        self.show_scroll_to_latest
    }

    pub fn first_unread_message_id(&self) -> Option<&str> {
        self.read_state.first_unread_message_id()
    }

    pub fn read_state(&self) -> &ReadStateTracker {
        &self.read_state
    }

    pub fn is_loading_previous(&self) -> bool {
        self.loading_previous
    }

    pub fn is_loading_next(&self) -> bool {
        self.loading_next
    }

    pub fn is_loading_around(&self) -> bool {
        self.loading_around
    }

    pub fn is_loading(&self) -> bool {
        self.loading_previous || self.loading_next || self.loading_around || self.loading_first_page
    }

    /// Incremented whenever the renderer should drop its list identity and
    /// rebuild from scratch.
    pub fn refresh_epoch(&self) -> u64 {
        self.refresh_epoch
    }

    pub fn last_transition_animated(&self) -> bool {
        self.last_transition_animated
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Waits for the next inbox event and applies it.
    pub async fn process_next(&mut self) -> bool {
        match self.inbox_rx.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Applies every event already waiting in the inbox.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.inbox_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::PageLoaded { kind, result } => self.on_page_loaded(kind, result),
            EngineEvent::MessagesUpdated { messages, changes } => {
                self.on_data_source_changed(messages, changes)
            }
            EngineEvent::ConversationUpdated(conversation) => {
                self.on_conversation_changed(conversation)
            }
            EngineEvent::TimerFired {
                purpose,
                generation,
            } => self.on_timer_fired(purpose, generation),
        }
    }

    /// Reacts to the renderer showing the message at `index` while scrolling
    /// in `direction`.
    pub fn on_visibility_changed(&mut self, index: usize, direction: ScrollDirection) {
        if !self.is_active {
            return;
        }
        let Some(message_id) = self.window.get(index).map(|m| m.id.clone()) else {
            return;
        };

        // A jump replaces the window, page loads wait for it.
        if !self.loading_around {
            match direction {
                ScrollDirection::Up => {
                    let near_oldest = index
                        >= self
                            .window
                            .len()
                            .saturating_sub(self.config.previous_prefetch_distance);
                    if near_oldest
                        && !self.loading_previous
                        && !self.window.has_loaded_all_previous()
                    {
                        self.load_previous();
                    }
                }
                ScrollDirection::Down => {
                    if index <= self.config.next_prefetch_distance
                        && !self.loading_next
                        && !self.window.has_loaded_all_next()
                    {
                        self.load_next();
                    }
                }
            }
        }

        self.read_state.on_message_visible(&message_id);
        if index == 0 && self.read_state.can_mark_read() {
            let context = self.read_context();
            self.read_state
                .send_read_event_if_needed(&message_id, context);
        }
    }

    /// Reports whether the renderer's viewport sits on the newest message.
    pub fn on_scroll_position_changed(&mut self, at_latest: bool) {
        self.viewport_at_latest = at_latest;
        self.refresh_affordance();
    }

    /// Hint that the next inserted message was written by the current user.
    pub fn mark_user_sent_message(&mut self) {
        self.user_sent_message = true;
    }

    pub fn scroll_to_latest(&mut self) {
        if self.window.has_loaded_all_next() {
            self.viewport_at_latest = true;
            self.show_scroll_to_latest = false;
            self.anchor_to_newest();
            return;
        }
        if self.loading_first_page {
            return;
        }
        self.loading_first_page = true;
        self.spawn_load(PageKind::First, |ds| {
            Box::pin(async move { ds.load_first_page().await })
        });
    }

    /// Applies an explicit "mark unread" from the user.
    pub fn mark_unread(&mut self, from_message_id: &str) {
        self.read_state.mark_unread(from_message_id);
        let data_source = Arc::clone(&self.data_source);
        let from_message_id = from_message_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = data_source.mark_unread(&from_message_id).await {
                warn!(target: "MessageList/Engine", "Failed to mark unread from {from_message_id}: {e}");
            }
        });
    }

    pub fn on_foreground(&mut self) {
        self.app_active = true;
        self.send_read_for_newest_if_watching();
    }

    pub fn on_background(&mut self) {
        self.app_active = false;
    }

    /// Shrinks an oversized window back to the first page when the user is
    /// parked at the live tail.
    pub fn on_memory_pressure(&mut self) {
        let oversized = self.window.len() > self.config.reset_threshold;
        if !oversized
            || !self.window.has_loaded_all_next()
            || !self.viewport_at_latest
            || self.loading_first_page
        {
            debug!(target: "MessageList/Engine", "Ignoring memory pressure, window has {} messages", self.window.len());
            return;
        }
        info!(target: "MessageList/Engine", "Memory pressure, reloading first page of {} message window", self.window.len());
        self.loading_first_page = true;
        self.spawn_load(PageKind::First, |ds| {
            Box::pin(async move { ds.load_first_page().await })
        });
    }

    /// Marks the view visible or hidden. Upstream changes delivered while
    /// hidden are dropped, so becoming visible re-reads the data source.
    pub fn set_active(&mut self, active: bool) {
        if active == self.is_active {
            return;
        }
        self.is_active = active;
        if active {
            self.reseed();
        }
    }

    /// Tears the view down. Pending directives are cancelled and, if the
    /// window has drifted away from the live tail, the first page is reloaded
    /// so the next open starts fresh.
    pub fn shutdown(&mut self) {
        self.timers.cancel_all();
        self.pending_jump = None;
        self.pending_highlight = None;
        self.is_active = false;

        if self.window.has_loaded_all_next() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(target: "MessageList/Engine", "No runtime available to reset the conversation on shutdown");
            return;
        };
        let data_source = Arc::clone(&self.data_source);
        runtime.spawn(async move {
            if let Err(e) = data_source.load_first_page().await {
                warn!(target: "MessageList/Engine", "Failed to reset to first page on shutdown: {e}");
            }
        });
    }

    fn read_context(&self) -> ReadContext {
        ReadContext {
            app_active: self.app_active,
            at_live_tail: self.window.has_loaded_all_next(),
        }
    }

    fn send_read_for_newest_if_watching(&mut self) {
        if !self.viewport_at_latest
            || self.show_scroll_to_latest
            || !self.read_state.can_mark_read()
        {
            return;
        }
        let Some(newest) = self.window.newest().map(|m| m.id.clone()) else {
            return;
        };
        let context = self.read_context();
        self.read_state.send_read_event_if_needed(&newest, context);
    }

    fn load_previous(&mut self) {
        let before = self.window.oldest().map(|m| m.id.clone());
        let limit = self.config.previous_page_size;
        debug!(target: "MessageList/Engine", "Loading {limit} messages before {before:?}");
        self.loading_previous = true;
        self.spawn_load(PageKind::Previous, move |ds| {
            Box::pin(async move { ds.load_previous(before, limit).await })
        });
    }

    fn load_next(&mut self) {
        let limit = self.config.next_page_size();
        debug!(target: "MessageList/Engine", "Loading {limit} newer messages");
        self.loading_next = true;
        self.spawn_load(PageKind::Next, move |ds| {
            Box::pin(async move { ds.load_next(limit).await })
        });
    }

    /// Runs a load in the background and reports its completion to the
    /// inbox. A load task dropped before finishing reports `Interrupted`, so
    /// the in-flight flag is always cleared.
    fn spawn_load<F>(&self, kind: PageKind, load: F)
    where
        F: FnOnce(
                Arc<dyn MessageWindowDataSource>,
            ) -> BoxFuture<'static, Result<ChangeSet, DataSourceError>>
            + Send
            + 'static,
    {
        let data_source = Arc::clone(&self.data_source);
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let guard = scopeguard::guard(inbox, move |inbox| {
                let _ = inbox.send(EngineEvent::PageLoaded {
                    kind,
                    result: Err(DataSourceError::Interrupted),
                });
            });
            let result = load(data_source).await;
            let inbox = ScopeGuard::into_inner(guard);
            let _ = inbox.send(EngineEvent::PageLoaded { kind, result });
        });
    }

    fn on_page_loaded(&mut self, kind: PageKind, result: Result<ChangeSet, DataSourceError>) {
        match kind {
            PageKind::Previous => self.loading_previous = false,
            PageKind::Next => self.loading_next = false,
            PageKind::Around => self.loading_around = false,
            PageKind::First => self.loading_first_page = false,
        }
        let jump_target = match kind {
            PageKind::Around => self.pending_jump.take(),
            _ => None,
        };

        let changes = match result {
            Ok(changes) => changes,
            Err(error) => {
                warn!(target: "MessageList/Engine", "Failed to load {kind} page: {error}");
                let error = Arc::new(error);
                match jump_target {
                    Some(message_id) => self.notify(ListNotice::JumpFailed {
                        message_id,
                        error: JumpError::Load(error),
                    }),
                    None => self.notify(ListNotice::PageLoadFailed { kind, error }),
                }
                return;
            }
        };

        if !self.is_active {
            debug!(target: "MessageList/Engine", "Dropping {kind} page delivered while inactive");
            return;
        }

        let previous_len = self.window.len();
        let replaces_window = matches!(kind, PageKind::Around | PageKind::First);
        if replaces_window || self.data_source.reports_full_snapshots() {
            self.window.replace(self.data_source.messages());
        } else {
            self.window.apply(&changes);
        }
        self.after_window_changed();
        self.last_transition_animated = false;

        match kind {
            PageKind::Around => {
                self.refresh_affordance();
                if let Some(target) = jump_target {
                    self.finish_jump(target);
                }
            }
            PageKind::First => {
                if self.window.len() < previous_len {
                    self.reset_threshold = self.config.reset_threshold;
                    self.refresh_epoch += 1;
                }
                self.viewport_at_latest = true;
                self.show_scroll_to_latest = false;
                self.anchor_to_newest();
            }
            PageKind::Previous | PageKind::Next => self.refresh_affordance(),
        }
    }

    /// Applies an upstream batch. `messages` is the data source's full list
    /// after the batch and replaces the window.
    fn on_data_source_changed(&mut self, messages: Vec<Message>, changes: ChangeSet) {
        if !self.is_active {
            debug!(target: "MessageList/Engine", "Dropping {} changes delivered while inactive", changes.len());
            return;
        }

        if self.read_state.is_tracking_unread() && self.read_state.first_unread_message_id().is_none()
        {
            self.read_state
                .refresh_first_unread(self.data_source.first_unread_message_id());
        }

        let animate = self.should_animate(&changes);
        self.window.replace(messages);
        self.after_window_changed();
        self.last_transition_animated = animate;

        self.refresh_affordance();

        if self.scroll_anchor_id.is_none() && !self.show_scroll_to_latest && !self.loading_next {
            self.anchor_to_newest();
        }

        if self.user_sent_message && changes.iter().any(ListChange::is_insert) {
            self.user_sent_message = false;
            self.viewport_at_latest = true;
            self.show_scroll_to_latest = false;
            self.anchor_to_newest();
        }

        self.send_read_for_newest_if_watching();
    }

    fn on_conversation_changed(&mut self, conversation: ConversationSummary) {
        if !self.is_active {
            return;
        }
        self.read_state
            .on_metadata(&conversation, self.data_source.first_unread_message_id());
        if self.read_state.is_tracking_unread() && self.read_state.first_unread_message_id().is_none()
        {
            self.read_state
                .refresh_first_unread(self.data_source.first_unread_message_id());
        }
    }

    fn should_animate(&self, changes: &ChangeSet) -> bool {
        if !self.config.animate_changes || self.is_loading() {
            return false;
        }
        if self.data_source.conversation().is_none() {
            return false;
        }
        changes.iter().any(|change| match change {
            ListChange::Insert { .. } | ListChange::Remove { .. } => true,
            ListChange::Move { .. } => false,
            ListChange::Update { item, index } => {
                let Some(current) = self.window.get(*index) else {
                    return true;
                };
                current.id != item.id
                    || item.is_ephemeral()
                    || (self.config.animate_reactions
                        && current.reaction_fingerprint != item.reaction_fingerprint)
                    || (self.config.animate_link_previews
                        && current.link_preview != item.link_preview)
            }
        })
    }

    fn after_window_changed(&mut self) {
        self.window.set_completion(
            self.data_source.has_loaded_all_previous(),
            self.data_source.has_loaded_all_next(),
        );
        self.grouping = group_messages(
            self.window.messages(),
            self.config.max_group_interval(),
            self.config.edited_breaks_group,
        );

        let len = self.window.len();
        if len > self.reset_threshold {
            let step = self.config.reset_step.max(1);
            self.reset_threshold += step * (len - self.reset_threshold).div_ceil(step);
            self.refresh_epoch += 1;
            info!(
                target: "MessageList/Engine",
                "Window grew to {} messages, refresh epoch {}",
                self.window.len(),
                self.refresh_epoch
            );
        }
    }

    fn refresh_affordance(&mut self) {
        self.show_scroll_to_latest = !self.window.has_loaded_all_next() || !self.viewport_at_latest;
    }

    fn set_anchor(&mut self, message_id: String) {
        self.scroll_anchor_id = Some(message_id);
        self.anchor_revision += 1;
        self.schedule_timer(TimerPurpose::AnchorClear, self.config.anchor_clear_delay());
    }

    fn anchor_to_newest(&mut self) {
        if let Some(newest) = self.window.newest().map(|m| m.id.clone()) {
            self.set_anchor(newest);
        }
    }

    fn schedule_timer(&mut self, purpose: TimerPurpose, delay: Duration) {
        let inbox = self.inbox_tx.clone();
        self.timers.schedule(purpose, delay, move |generation| {
            let _ = inbox.send(EngineEvent::TimerFired {
                purpose,
                generation,
            });
        });
    }

    fn on_timer_fired(&mut self, purpose: TimerPurpose, generation: u64) {
        if !self.timers.complete(purpose, generation) {
            return;
        }
        match purpose {
            TimerPurpose::AnchorClear => self.scroll_anchor_id = None,
            TimerPurpose::HighlightStart => {
                self.highlighted_message_id = self.pending_highlight.take();
                if self.highlighted_message_id.is_some() {
                    self.schedule_timer(
                        TimerPurpose::HighlightClear,
                        self.config.highlight_clear_delay(),
                    );
                }
            }
            TimerPurpose::HighlightClear => self.highlighted_message_id = None,
        }
    }
}
