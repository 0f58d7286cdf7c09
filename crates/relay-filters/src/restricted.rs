//! Bypass for sources with protected content.

use relay_message::{Album, Message};

use crate::{EventKind, FilterResult, MessageFilter};

/// Makes messages from protected sources mirrorable by dropping the media
/// payload; only the text and its formatting go out.
pub struct RestrictedBypassFilter;

impl MessageFilter for RestrictedBypassFilter {
    fn restricted_content_allowed(&self) -> bool {
        true
    }

    fn process_message(&self, mut message: Message, _kind: EventKind) -> FilterResult<Message> {
        message.media = None;
        FilterResult::continue_with(message)
    }

    // Every item loses its media, not just the representative one.
    fn process_album(&self, mut album: Album, _kind: EventKind) -> FilterResult<Album> {
        for item in &mut album.items {
            item.media = None;
        }
        FilterResult::continue_with(album)
    }
}
