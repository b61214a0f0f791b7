use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Suffix some backends append to the id of a message after it was deleted,
/// so that list identities change while the store keeps the original id.
pub const DELETED_ID_SUFFIX: &str = "$deleted";

/// Strips list-identity decorations from a message id.
pub fn canonical_message_id(id: &str) -> &str {
    id.strip_suffix(DELETED_ID_SUFFIX).unwrap_or(id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Regular,
    Error,
    Ephemeral,
    System,
}

impl MessageKind {
    /// Kinds that never join a group with their neighbours.
    pub fn breaks_group(&self) -> bool {
        matches!(
            self,
            MessageKind::Error | MessageKind::Ephemeral | MessageKind::System
        )
    }
}

/// A chat message as seen by the window engine.
///
/// The engine treats most of this as opaque: only the identity, author,
/// timestamps, kind and thread membership drive its decisions. The reaction
/// fingerprint and link preview are compared for change detection only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub author_id: String,
    #[serde(default)]
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub kind: MessageKind,
    /// Id of the thread root when this message is a reply.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Replies that were also posted to the channel.
    #[serde(default)]
    pub shown_in_channel: bool,
    #[serde(default)]
    pub reaction_fingerprint: u64,
    #[serde(default)]
    pub link_preview: Option<String>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        author_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            author_id: author_id.into(),
            text: String::new(),
            created_at,
            edited_at: None,
            kind: MessageKind::Regular,
            parent_id: None,
            shown_in_channel: false,
            reaction_fingerprint: 0,
            link_preview: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn in_thread(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn edited(mut self, at: DateTime<Utc>) -> Self {
        self.edited_at = Some(at);
        self
    }

    pub fn is_edited(&self) -> bool {
        self.edited_at.is_some()
    }

    pub fn is_ephemeral(&self) -> bool {
        self.kind == MessageKind::Ephemeral
    }

    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn canonical_id(&self) -> &str {
        canonical_message_id(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_canonical_id_strips_deleted_suffix() {
        assert_eq!(canonical_message_id("m1$deleted"), "m1");
        assert_eq!(canonical_message_id("m1"), "m1");
    }

    #[test]
    fn test_breaks_group_kinds() {
        assert!(!MessageKind::Regular.breaks_group());
        assert!(MessageKind::Error.breaks_group());
        assert!(MessageKind::Ephemeral.breaks_group());
        assert!(MessageKind::System.breaks_group());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{"id":"m1","author_id":"alice","created_at":"2024-05-01T10:00:00Z"}"#;
        let message: Message = serde_json::from_str(json).expect("message should parse");
        assert_eq!(message.kind, MessageKind::Regular);
        assert_eq!(
            message.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert!(message.parent_id.is_none());
    }
}
