//! Outbound transport contract.

use async_trait::async_trait;
use relay_message::{FormattedText, MediaRef};
use thiserror::Error;

/// Errors surfaced by a transport implementation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The platform rejected an edit because nothing visibly changed.
    #[error("message was not modified")]
    NotModified,
    #[error("transport error: {0}")]
    Transport(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// One item of an outgoing album send.
#[derive(Debug, Clone)]
pub struct AlbumItem {
    pub content: FormattedText,
    pub media: Option<MediaRef>,
}

/// The send-side operations the engine needs from the messaging platform.
///
/// Implementations wrap a platform session. The engine never retries; a
/// returned error means that one destination is skipped for that event.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Sends a re-authored copy; returns the new message id.
    async fn send_message(
        &self,
        chat_id: i64,
        content: &FormattedText,
        media: Option<&MediaRef>,
        reply_to: Option<i64>,
        topic_id: Option<i64>,
    ) -> ClientResult<i64>;

    /// Sends a grouped album; returns the new ids in item order.
    async fn send_album(
        &self,
        chat_id: i64,
        items: &[AlbumItem],
        reply_to: Option<i64>,
        topic_id: Option<i64>,
    ) -> ClientResult<Vec<i64>>;

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        content: &FormattedText,
        media: Option<&MediaRef>,
    ) -> ClientResult<()>;

    async fn delete_messages(&self, chat_id: i64, message_ids: &[i64]) -> ClientResult<()>;

    /// Native forward keeping the platform's own attribution header.
    async fn forward_messages(
        &self,
        chat_id: i64,
        from_chat_id: i64,
        message_ids: &[i64],
        topic_id: Option<i64>,
    ) -> ClientResult<Vec<i64>>;
}
