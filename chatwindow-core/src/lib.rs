//! Runtime-agnostic building blocks for the message window engine.
//!
//! Nothing in this crate performs I/O or spawns tasks; the platform crate
//! drives these types from its own scheduling context.

pub mod change;
pub mod config;
pub mod grouping;
pub mod message;
pub mod window;

pub use change::{ChangeSet, Identified, ListChange};
pub use config::{ConfigError, MessageListConfig};
pub use grouping::{GroupTag, GroupTags, GroupingInfo, group_messages};
pub use message::{Message, MessageKind};
pub use window::MessageWindow;
