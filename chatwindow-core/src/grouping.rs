//! Message grouping metadata derived from window order.

use crate::message::Message;
use chrono::Duration;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupTag {
    FirstInGroup,
    LastInGroup,
}

/// The set of group tags attached to one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupTags {
    first: bool,
    last: bool,
}

impl GroupTags {
    pub fn insert(&mut self, tag: GroupTag) {
        match tag {
            GroupTag::FirstInGroup => self.first = true,
            GroupTag::LastInGroup => self.last = true,
        }
    }

    pub fn contains(&self, tag: GroupTag) -> bool {
        match tag {
            GroupTag::FirstInGroup => self.first,
            GroupTag::LastInGroup => self.last,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.first && !self.last
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingInfo {
    tags: HashMap<String, GroupTags>,
}

impl GroupingInfo {
    pub fn tags(&self, message_id: &str) -> GroupTags {
        self.tags.get(message_id).copied().unwrap_or_default()
    }

    pub fn is_first_in_group(&self, message_id: &str) -> bool {
        self.tags(message_id).contains(GroupTag::FirstInGroup)
    }

    pub fn is_last_in_group(&self, message_id: &str) -> bool {
        self.tags(message_id).contains(GroupTag::LastInGroup)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    fn tag(&mut self, message_id: &str, tag: GroupTag) {
        self.tags
            .entry(message_id.to_string())
            .or_default()
            .insert(tag);
    }
}

/// Decides whether `newer` and its older neighbour `older` belong to
/// different groups.
fn breaks_between(
    newer: &Message,
    older: &Message,
    max_interval: Duration,
    edited_breaks_group: bool,
) -> bool {
    newer.author_id != older.author_id
        || newer.kind.breaks_group()
        || older.kind.breaks_group()
        || newer.created_at - older.created_at > max_interval
        || (edited_breaks_group && older.is_edited())
}

/// Computes grouping tags over a newest-first window.
///
/// `FirstInGroup` marks the newest message of a run and `LastInGroup` the
/// oldest, so the newest message in the window is always first and the
/// oldest always last. An edited message closes the run below its newer
/// neighbour so its edited label sits at the end of a group.
pub fn group_messages(
    messages: &[Message],
    max_interval: Duration,
    edited_breaks_group: bool,
) -> GroupingInfo {
    let mut info = GroupingInfo::default();
    let (Some(newest), Some(oldest)) = (messages.first(), messages.last()) else {
        return info;
    };

    info.tag(&newest.id, GroupTag::FirstInGroup);
    info.tag(&oldest.id, GroupTag::LastInGroup);

    for pair in messages.windows(2) {
        let (newer, older) = (&pair[0], &pair[1]);
        if breaks_between(newer, older, max_interval, edited_breaks_group) {
            info.tag(&newer.id, GroupTag::LastInGroup);
            info.tag(&older.id, GroupTag::FirstInGroup);
        }
    }

    info
}
