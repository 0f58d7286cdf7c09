//! Inbound event data model shared by filters and the event processor.

use serde::{Deserialize, Serialize};

use crate::FormattedText;

/// The chat a message was observed in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatInfo {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Platform-level no-forward protection ("restricted saving content").
    #[serde(default)]
    pub protected: bool,
}

/// Reply header of a message; in forum-style chats this doubles as the
/// topic marker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyHeader {
    pub reply_to_id: i64,
    /// Thread root when the reply itself sits inside a thread.
    #[serde(default)]
    pub top_id: Option<i64>,
    /// True when the reply header marks a forum topic rather than a plain
    /// reply.
    #[serde(default)]
    pub forum_topic: bool,
}

/// Opaque reference to a platform-hosted media object. The engine never
/// re-encodes media; it only hands the reference back to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaRef {
    pub file_id: String,
}

impl MediaRef {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
        }
    }
}

/// One inbound message as delivered by the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub chat: ChatInfo,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_username: Option<String>,
    pub content: FormattedText,
    #[serde(default)]
    pub reply: Option<ReplyHeader>,
    #[serde(default)]
    pub media: Option<MediaRef>,
    /// Album group identifier; set on every item of a grouped send.
    #[serde(default)]
    pub grouped_id: Option<i64>,
    /// Set on edit events that carry no visible change (reactions and the
    /// like); callers drop these before reaching the processor.
    #[serde(default)]
    pub edit_hidden: bool,
}

impl Message {
    pub fn is_reply(&self) -> bool {
        self.reply.is_some()
    }
}

/// An ordered group of messages sent together. Filtering decisions treat the
/// album atomically; sending treats items individually.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Album {
    pub grouped_id: i64,
    pub items: Vec<Message>,
}

impl Album {
    pub fn new(grouped_id: i64, items: Vec<Message>) -> Self {
        Self { grouped_id, items }
    }

    /// Index of the item that stands in for the whole album when filtering:
    /// the first item with non-empty text, or item 0 when all are empty.
    pub fn representative_index(&self) -> usize {
        self.items
            .iter()
            .position(|item| !item.content.text.is_empty())
            .unwrap_or(0)
    }

    pub fn first(&self) -> Option<&Message> {
        self.items.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, text: &str) -> Message {
        Message {
            id,
            chat: ChatInfo::default(),
            sender_name: None,
            sender_username: None,
            content: FormattedText::new(text),
            reply: None,
            media: Some(MediaRef::new(format!("file-{id}"))),
            grouped_id: Some(7),
            edit_hidden: false,
        }
    }

    #[test]
    fn unit_representative_index_picks_first_non_empty_item() {
        let album = Album::new(7, vec![item(1, ""), item(2, "caption"), item(3, "tail")]);
        assert_eq!(album.representative_index(), 1);
    }

    #[test]
    fn unit_representative_index_falls_back_to_item_zero() {
        let album = Album::new(7, vec![item(1, ""), item(2, "")]);
        assert_eq!(album.representative_index(), 0);
    }
}
