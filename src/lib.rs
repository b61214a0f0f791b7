// Runtime-agnostic types live in the core crate
pub use chatwindow_core::{change, config, grouping, message, window};
pub use chatwindow_core::{
    ChangeSet, GroupTag, GroupingInfo, ListChange, Message, MessageKind, MessageListConfig,
    MessageWindow,
};

pub mod backend;
pub mod data_source;
pub mod engine;
pub mod error;
pub mod read_state;
pub mod throttle;

mod timers;

pub use backend::{ConversationSummary, InMemoryBackend, MessageBackend};
pub use data_source::{
    ChannelDataSource, ConversationKind, LivestreamDataSource, MessageWindowDataSource,
    ThreadDataSource,
};
pub use engine::{JumpOutcome, ListNotice, MessageListEngine, ScrollDirection};
pub use error::{DataSourceError, JumpError};
