use chatwindow::data_source::DataSourceListener;
use chatwindow::{
    ChangeSet, ChannelDataSource, ConversationSummary, InMemoryBackend, ListChange,
    LivestreamDataSource, Message, MessageBackend, MessageKind, MessageListConfig,
    MessageListEngine, MessageWindowDataSource,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + Duration::minutes(minute)
}

fn history(count: i64) -> Vec<Message> {
    (1..=count)
        .map(|n| Message::new(format!("m{n}"), "alice", at(n)))
        .collect()
}

fn conversation() -> Option<ConversationSummary> {
    Some(ConversationSummary {
        id: "general".to_string(),
        ..Default::default()
    })
}

fn channel_engine(
    backend: &Arc<InMemoryBackend>,
    config: MessageListConfig,
) -> MessageListEngine {
    let source = Arc::new(ChannelDataSource::new(backend.clone()));
    let mut engine = MessageListEngine::new(source, config);
    engine.attach();
    engine
}

/// Lets forwarded backend events reach the inbox and applies them.
async fn drain(engine: &mut MessageListEngine) {
    for _ in 0..5 {
        tokio::task::yield_now().await;
        engine.process_pending();
    }
}

#[tokio::test]
async fn test_self_sent_insert_reanchors_and_hides_affordance() {
    let backend = Arc::new(InMemoryBackend::new(conversation(), history(5), 10));
    let mut engine = channel_engine(&backend, MessageListConfig::default());

    engine.on_scroll_position_changed(false);
    assert!(engine.show_scroll_to_latest());

    engine.mark_user_sent_message();
    backend.send(Message::new("m6", "me", at(6)));
    drain(&mut engine).await;

    assert_eq!(engine.messages()[0].id, "m6");
    assert_eq!(engine.scroll_anchor_id(), Some("m6"));
    assert!(!engine.show_scroll_to_latest());
}

#[tokio::test]
async fn test_incoming_message_while_scrolled_back_keeps_position() {
    let backend = Arc::new(InMemoryBackend::new(conversation(), history(5), 10));
    let mut engine = channel_engine(&backend, MessageListConfig::default());
    engine.on_scroll_position_changed(false);
    let revision = engine.anchor_revision();

    backend.receive(Message::new("m6", "bob", at(6)));
    drain(&mut engine).await;

    assert_eq!(engine.messages()[0].id, "m6");
    assert_ne!(engine.scroll_anchor_id(), Some("m6"));
    assert_eq!(engine.anchor_revision(), revision);
    assert!(engine.show_scroll_to_latest());
}

#[tokio::test(start_paused = true)]
async fn test_incoming_message_at_tail_follows_newest() {
    let backend = Arc::new(InMemoryBackend::new(conversation(), history(5), 10));
    let mut engine = channel_engine(&backend, MessageListConfig::default());

    tokio::time::sleep(StdDuration::from_millis(600)).await;
    engine.process_pending();
    assert_eq!(engine.scroll_anchor_id(), None);

    backend.receive(Message::new("m6", "bob", at(6)));
    drain(&mut engine).await;

    assert_eq!(engine.scroll_anchor_id(), Some("m6"));
    assert!(!engine.show_scroll_to_latest());
}

#[tokio::test]
async fn test_window_not_at_tail_shows_affordance() {
    let backend = Arc::new(InMemoryBackend::new(conversation(), history(40), 10));
    backend
        .load_page_around("m10")
        .await
        .expect("load should succeed");
    let mut engine = channel_engine(&backend, MessageListConfig::default());
    assert!(engine.show_scroll_to_latest());

    backend.update_message(Message::new("m10", "alice", at(10)).with_text("edited"));
    drain(&mut engine).await;
    assert!(engine.show_scroll_to_latest());

    engine.scroll_to_latest();
    while engine.is_loading() {
        engine.process_next().await;
    }
    assert!(!engine.show_scroll_to_latest());
    assert_eq!(engine.scroll_anchor_id(), Some("m40"));
    assert!(engine.window().has_loaded_all_next());
}

#[tokio::test]
async fn test_animation_decisions() {
    let backend = Arc::new(InMemoryBackend::new(conversation(), history(5), 10));
    let mut engine = channel_engine(&backend, MessageListConfig::default());

    backend.receive(Message::new("m6", "bob", at(6)));
    drain(&mut engine).await;
    assert!(engine.last_transition_animated());

    backend.update_message(Message::new("m4", "alice", at(4)).with_text("typo fixed"));
    drain(&mut engine).await;
    assert!(!engine.last_transition_animated());

    let mut reacted = Message::new("m4", "alice", at(4)).with_text("typo fixed");
    reacted.reaction_fingerprint = 7;
    backend.update_message(reacted);
    drain(&mut engine).await;
    assert!(engine.last_transition_animated());

    backend.delete_message("m2");
    drain(&mut engine).await;
    assert!(engine.last_transition_animated());
    assert!(!engine.window().contains("m2"));
}

#[tokio::test]
async fn test_reaction_and_link_animation_are_independent() {
    let backend = Arc::new(InMemoryBackend::new(conversation(), history(5), 10));
    let config = MessageListConfig {
        animate_reactions: false,
        ..Default::default()
    };
    let mut engine = channel_engine(&backend, config);

    let mut reacted = Message::new("m3", "alice", at(3));
    reacted.reaction_fingerprint = 3;
    backend.update_message(reacted.clone());
    drain(&mut engine).await;
    assert!(!engine.last_transition_animated());

    reacted.link_preview = Some("https://example.org".to_string());
    backend.update_message(reacted);
    drain(&mut engine).await;
    assert!(engine.last_transition_animated());
}

#[tokio::test]
async fn test_animation_disabled_globally() {
    let backend = Arc::new(InMemoryBackend::new(conversation(), history(5), 10));
    let config = MessageListConfig {
        animate_changes: false,
        ..Default::default()
    };
    let mut engine = channel_engine(&backend, config);

    backend.receive(Message::new("m6", "bob", at(6)));
    drain(&mut engine).await;
    assert!(!engine.last_transition_animated());
}

#[tokio::test]
async fn test_grouping_follows_window_changes() {
    let backend = Arc::new(InMemoryBackend::new(conversation(), history(3), 10));
    let mut engine = channel_engine(&backend, MessageListConfig::default());
    assert!(engine.grouping_info().is_first_in_group("m3"));
    assert!(!engine.grouping_info().is_first_in_group("m2"));

    backend.receive(
        Message::new("m4", "system", at(3) + Duration::seconds(10)).with_kind(MessageKind::System),
    );
    drain(&mut engine).await;

    let grouping = engine.grouping_info();
    assert!(grouping.is_first_in_group("m4"));
    assert!(grouping.is_last_in_group("m4"));
    assert!(grouping.is_first_in_group("m3"));
    assert!(grouping.is_last_in_group("m1"));
}

#[tokio::test]
async fn test_upstream_changes_dropped_while_inactive() {
    let backend = Arc::new(InMemoryBackend::new(conversation(), history(5), 10));
    let mut engine = channel_engine(&backend, MessageListConfig::default());

    engine.set_active(false);
    backend.receive(Message::new("m6", "bob", at(6)));
    drain(&mut engine).await;
    assert_eq!(engine.messages()[0].id, "m5");

    engine.set_active(true);
    assert_eq!(engine.messages()[0].id, "m6");
}

#[derive(Default)]
struct Recorder {
    batches: Mutex<Vec<ChangeSet>>,
}

impl DataSourceListener for Recorder {
    fn did_update_messages(&self, _messages: Vec<Message>, changes: ChangeSet) {
        self.batches.lock().unwrap().push(changes);
    }

    fn did_update_conversation(&self, _conversation: ConversationSummary) {}
}

#[tokio::test]
async fn test_livestream_push_is_insert_only() {
    let livestream = Some(ConversationSummary {
        id: "live".to_string(),
        unread_count: 4,
        ..Default::default()
    });
    let backend =
        Arc::new(InMemoryBackend::new(livestream, history(3), 50).with_snapshot_events());
    let source = Arc::new(LivestreamDataSource::new(backend.clone()));
    let recorder = Arc::new(Recorder::default());
    source.set_listener(recorder.clone());

    backend.receive_batch(vec![
        Message::new("m4", "bob", at(4)),
        Message::new("m5", "carol", at(5)),
        Message::new("m6", "dave", at(6)),
    ]);
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    let batches = recorder.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    let indices: Vec<usize> = batches[0]
        .iter()
        .map(|change| match change {
            ListChange::Insert { index, .. } => *index,
            other => panic!("livestreams only report inserts, got {other:?}"),
        })
        .collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_livestream_engine_replaces_window() {
    let livestream = Some(ConversationSummary {
        id: "live".to_string(),
        unread_count: 4,
        ..Default::default()
    });
    let backend =
        Arc::new(InMemoryBackend::new(livestream, history(3), 50).with_snapshot_events());
    let source = Arc::new(LivestreamDataSource::new(backend.clone()));
    let mut engine = MessageListEngine::new(source, MessageListConfig::default());
    engine.attach();
    assert_eq!(engine.first_unread_message_id(), None);

    backend.receive_batch(vec![
        Message::new("m4", "bob", at(4)),
        Message::new("m5", "carol", at(5)),
        Message::new("m6", "dave", at(6)),
    ]);
    drain(&mut engine).await;

    let ids: Vec<&str> = engine.messages().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m6", "m5", "m4", "m3", "m2", "m1"]);
    assert_eq!(engine.first_unread_message_id(), None);

    engine.on_visibility_changed(0, chatwindow::ScrollDirection::Down);
    assert!(!engine.read_state().has_pending_read());
}

async fn settle(engine: &mut MessageListEngine) {
    while engine.is_loading() {
        engine.process_next().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_no_animation_while_older_page_loads() {
    let backend = Arc::new(InMemoryBackend::new(conversation(), history(20), 10));
    let mut engine = channel_engine(&backend, MessageListConfig::default());
    backend.set_load_delay(StdDuration::from_secs(60));

    engine.on_visibility_changed(9, chatwindow::ScrollDirection::Up);
    assert!(engine.is_loading_previous());

    backend.receive(Message::new("m21", "bob", at(21)));
    drain(&mut engine).await;
    assert_eq!(engine.messages()[0].id, "m21");
    assert!(!engine.last_transition_animated());

    settle(&mut engine).await;
    backend.receive(Message::new("m22", "bob", at(22)));
    drain(&mut engine).await;
    assert!(engine.last_transition_animated());
}

#[tokio::test(start_paused = true)]
async fn test_no_animation_while_jump_loads() {
    let backend = Arc::new(InMemoryBackend::new(conversation(), history(40), 10));
    let mut engine = channel_engine(&backend, MessageListConfig::default());
    backend.set_load_delay(StdDuration::from_secs(60));

    engine.jump_to_message("m5").expect("jump should start");
    assert!(engine.is_loading_around());

    backend.receive(Message::new("m41", "bob", at(41)));
    drain(&mut engine).await;

    assert_eq!(engine.messages()[0].id, "m41");
    assert!(!engine.last_transition_animated());
}

#[tokio::test(start_paused = true)]
async fn test_change_during_newer_page_load_keeps_anchor() {
    let backend = Arc::new(InMemoryBackend::new(conversation(), history(40), 10));
    backend
        .load_page_around("m30")
        .await
        .expect("load should succeed");
    let mut engine = channel_engine(&backend, MessageListConfig::default());
    assert!(!engine.window().has_loaded_all_next());

    tokio::time::sleep(StdDuration::from_millis(600)).await;
    engine.process_pending();
    assert_eq!(engine.scroll_anchor_id(), None);
    let revision = engine.anchor_revision();

    backend.set_load_delay(StdDuration::from_secs(60));
    engine.on_visibility_changed(0, chatwindow::ScrollDirection::Down);
    assert!(engine.is_loading_next());

    backend.update_message(Message::new("m30", "alice", at(30)).with_text("edited"));
    drain(&mut engine).await;

    assert!(engine.is_loading_next());
    assert_eq!(engine.scroll_anchor_id(), None);
    assert_eq!(engine.anchor_revision(), revision);
    assert!(!engine.last_transition_animated());
}
