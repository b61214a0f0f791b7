use chatwindow::engine::ScrollDirection;
use chatwindow::{
    ChannelDataSource, ConversationSummary, InMemoryBackend, Message, MessageListConfig,
    MessageListEngine,
};
use chrono::{Duration as ChronoDuration, Utc};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

// Walks an engine through a scripted session against an in-memory channel.
//
// Usage:
//   cargo run                          # default settings
//   cargo run -- path/to/config.json   # settings from a JSON document

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Utc::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => match std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| MessageListConfig::from_json(&raw).map_err(anyhow::Error::from))
        {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config from {path}: {e}");
                return;
            }
        },
        None => MessageListConfig::default(),
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    rt.block_on(run(config));
}

async fn run(config: MessageListConfig) {
    let start = Utc::now() - ChronoDuration::hours(2);
    let history: Vec<Message> = (1..=120)
        .map(|n| {
            let author = if n % 7 < 4 { "alice" } else { "bob" };
            Message::new(format!("m{n}"), author, start + ChronoDuration::seconds(n * 45))
                .with_text(format!("message number {n}"))
        })
        .collect();
    let conversation = ConversationSummary {
        id: "general".to_string(),
        name: Some("General".to_string()),
        unread_count: 3,
        last_read_message_id: Some("m117".to_string()),
        ..Default::default()
    };
    let backend = Arc::new(InMemoryBackend::new(
        Some(conversation),
        history,
        config.previous_page_size,
    ));
    let data_source = Arc::new(ChannelDataSource::new(backend.clone()));
    let mut engine = MessageListEngine::new(data_source, config);
    let mut notices = engine.subscribe();

    engine.attach();
    info!(
        "Window holds {} messages, anchored at {:?}, first unread {:?}",
        engine.messages().len(),
        engine.scroll_anchor_id(),
        engine.first_unread_message_id()
    );

    let oldest = engine.messages().len().saturating_sub(1);
    engine.on_visibility_changed(oldest, ScrollDirection::Up);
    while engine.is_loading() {
        engine.process_next().await;
    }
    info!("After scrolling up the window holds {} messages", engine.messages().len());

    match engine.jump_to_message("m10") {
        Ok(outcome) => info!("Jump to m10: {outcome:?}"),
        Err(e) => error!("Jump to m10 rejected: {e}"),
    }
    while engine.is_loading() {
        engine.process_next().await;
    }
    while let Ok(notice) = notices.try_recv() {
        info!("Notice: {notice:?}");
    }
    info!(
        "Anchored at {:?}, scroll-to-latest shown: {}",
        engine.scroll_anchor_id(),
        engine.show_scroll_to_latest()
    );

    engine.scroll_to_latest();
    while engine.is_loading() {
        engine.process_next().await;
    }

    engine.mark_user_sent_message();
    backend.send(Message::new("m121", "me", Utc::now()).with_text("hello from the demo"));
    let deadline = tokio::time::sleep(Duration::from_millis(200));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = engine.process_next() => {}
        }
    }
    info!(
        "Newest is {:?}, anchored at {:?}, epoch {}",
        engine.messages().first().map(|m| m.id.as_str()),
        engine.scroll_anchor_id(),
        engine.refresh_epoch()
    );

    engine.shutdown();
}
