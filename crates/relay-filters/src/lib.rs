//! Composable message filter pipeline.
//!
//! A filter takes an inbound entity (single message or album), optionally
//! rewrites it, and votes on what happens next with a [`FilterAction`].
//! Filters are pure and synchronous; anything that needs IO is resolved at
//! construction time through the traits in [`resolve`]. Chains are built with
//! [`CompositeFilter`], which runs children in order and stops at the first
//! non-[`FilterAction::Continue`] vote.

use std::sync::Arc;

use relay_message::{Album, Message};

pub mod header;
pub mod keyword;
pub mod redact;
pub mod resolve;
pub mod restricted;
pub mod skip;

pub use header::{ForwardHeaderFilter, DEFAULT_HEADER_TEMPLATE};
pub use keyword::KeywordReplaceFilter;
pub use redact::RedactUrlFilter;
pub use resolve::{
    ChatTitleResolver, LinkResolver, MappedNameResolver, NameResolver, PublicLinkResolver,
};
pub use restricted::RestrictedBypassFilter;
pub use skip::{SkipAllFilter, SkipUrlFilter, SkipWithKeywordsFilter};

/// Why a filter is being run. Some filters behave differently on edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NewMessage,
    NewAlbum,
    MessageEdited,
}

/// A filter's vote on the entity it just processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    /// Hand the entity to the next filter in the chain.
    Continue,
    /// Drop the event; nothing is mirrored.
    Discard,
    /// Send the entity as it stands, skipping the rest of the chain.
    ForceSend,
}

/// A processed entity together with the filter's vote on it.
#[derive(Debug, Clone)]
pub struct FilterResult<T> {
    pub action: FilterAction,
    pub entity: T,
}

impl<T> FilterResult<T> {
    pub fn continue_with(entity: T) -> Self {
        Self {
            action: FilterAction::Continue,
            entity,
        }
    }

    pub fn discard(entity: T) -> Self {
        Self {
            action: FilterAction::Discard,
            entity,
        }
    }

    pub fn force_send(entity: T) -> Self {
        Self {
            action: FilterAction::ForceSend,
            entity,
        }
    }
}

/// A single message or an album, as handed to a filter chain.
#[derive(Debug, Clone)]
pub enum FilterEntity {
    Message(Message),
    Album(Album),
}

/// One stage of a filter chain.
///
/// `process_message` is the only required method. Albums are filtered through
/// their representative item by default: the first item with text stands in
/// for the group, its rewrite is written back, and its vote decides the whole
/// album's fate.
pub trait MessageFilter: Send + Sync {
    /// True when this filter makes content from protected sources safe to
    /// mirror (for example by stripping the media payload).
    fn restricted_content_allowed(&self) -> bool {
        false
    }

    fn process_message(&self, message: Message, kind: EventKind) -> FilterResult<Message>;

    fn process_album(&self, mut album: Album, kind: EventKind) -> FilterResult<Album> {
        if album.items.is_empty() {
            return FilterResult::continue_with(album);
        }
        let index = album.representative_index();
        let item = album.items[index].clone();
        let FilterResult { action, entity } = self.process_message(item, kind);
        album.items[index] = entity;
        FilterResult { action, entity: album }
    }

    fn process(&self, entity: FilterEntity, kind: EventKind) -> FilterResult<FilterEntity> {
        match entity {
            FilterEntity::Message(message) => {
                let FilterResult { action, entity } = self.process_message(message, kind);
                FilterResult {
                    action,
                    entity: FilterEntity::Message(entity),
                }
            }
            FilterEntity::Album(album) => {
                let FilterResult { action, entity } = self.process_album(album, kind);
                FilterResult {
                    action,
                    entity: FilterEntity::Album(entity),
                }
            }
        }
    }
}

/// Runs child filters in order, feeding each one's output to the next.
///
/// The first [`FilterAction::Discard`] or [`FilterAction::ForceSend`] vote
/// stops the chain and becomes the chain's result. An empty chain passes
/// entities through unchanged.
pub struct CompositeFilter {
    filters: Vec<Arc<dyn MessageFilter>>,
}

impl CompositeFilter {
    pub fn new(filters: Vec<Arc<dyn MessageFilter>>) -> Self {
        Self { filters }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl MessageFilter for CompositeFilter {
    fn restricted_content_allowed(&self) -> bool {
        self.filters
            .iter()
            .any(|filter| filter.restricted_content_allowed())
    }

    fn process_message(&self, message: Message, kind: EventKind) -> FilterResult<Message> {
        let mut current = message;
        for filter in &self.filters {
            let FilterResult { action, entity } = filter.process_message(current, kind);
            current = entity;
            if action != FilterAction::Continue {
                return FilterResult { action, entity: current };
            }
        }
        FilterResult::continue_with(current)
    }

    fn process_album(&self, album: Album, kind: EventKind) -> FilterResult<Album> {
        let mut current = album;
        for filter in &self.filters {
            let FilterResult { action, entity } = filter.process_album(current, kind);
            current = entity;
            if action != FilterAction::Continue {
                return FilterResult { action, entity: current };
            }
        }
        FilterResult::continue_with(current)
    }
}

/// Accepts everything unchanged. Useful as an explicit "no filtering" chain.
pub struct PassThroughFilter;

impl MessageFilter for PassThroughFilter {
    fn process_message(&self, message: Message, _kind: EventKind) -> FilterResult<Message> {
        FilterResult::continue_with(message)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use relay_message::{ChatInfo, FormattedText};

    use super::*;

    fn message(text: &str) -> Message {
        Message {
            id: 1,
            chat: ChatInfo::default(),
            sender_name: None,
            sender_username: None,
            content: FormattedText::new(text),
            reply: None,
            media: None,
            grouped_id: None,
            edit_hidden: false,
        }
    }

    struct CountingFilter {
        calls: AtomicUsize,
        action: FilterAction,
    }

    impl CountingFilter {
        fn new(action: FilterAction) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                action,
            })
        }
    }

    impl MessageFilter for CountingFilter {
        fn process_message(&self, message: Message, _kind: EventKind) -> FilterResult<Message> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            FilterResult {
                action: self.action,
                entity: message,
            }
        }
    }

    struct UppercaseFilter;

    impl MessageFilter for UppercaseFilter {
        fn process_message(&self, mut message: Message, _kind: EventKind) -> FilterResult<Message> {
            message.content.text = message.content.text.to_uppercase();
            FilterResult::continue_with(message)
        }
    }

    struct RestrictedOk;

    impl MessageFilter for RestrictedOk {
        fn restricted_content_allowed(&self) -> bool {
            true
        }

        fn process_message(&self, message: Message, _kind: EventKind) -> FilterResult<Message> {
            FilterResult::continue_with(message)
        }
    }

    #[test]
    fn unit_empty_chain_passes_message_through_unchanged() {
        let chain = CompositeFilter::new(Vec::new());
        let original = message("untouched");
        let result = chain.process_message(original.clone(), EventKind::NewMessage);
        assert_eq!(result.action, FilterAction::Continue);
        assert_eq!(result.entity, original);
    }

    #[test]
    fn functional_chain_stops_at_first_discard() {
        let before = CountingFilter::new(FilterAction::Continue);
        let gate = CountingFilter::new(FilterAction::Discard);
        let after = CountingFilter::new(FilterAction::Continue);
        let chain = CompositeFilter::new(vec![
            before.clone() as Arc<dyn MessageFilter>,
            gate.clone(),
            after.clone(),
        ]);

        let result = chain.process_message(message("anything"), EventKind::NewMessage);
        assert_eq!(result.action, FilterAction::Discard);
        assert_eq!(before.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gate.calls.load(Ordering::SeqCst), 1);
        assert_eq!(after.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn functional_chain_stops_at_force_send_and_keeps_rewrites_so_far() {
        let force = CountingFilter::new(FilterAction::ForceSend);
        let after = CountingFilter::new(FilterAction::Continue);
        let chain = CompositeFilter::new(vec![
            Arc::new(UppercaseFilter) as Arc<dyn MessageFilter>,
            force.clone(),
            after.clone(),
        ]);

        let result = chain.process_message(message("shout"), EventKind::NewMessage);
        assert_eq!(result.action, FilterAction::ForceSend);
        assert_eq!(result.entity.content.text, "SHOUT");
        assert_eq!(after.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unit_chain_allows_restricted_content_when_any_child_does() {
        let plain = CompositeFilter::new(vec![Arc::new(PassThroughFilter) as Arc<dyn MessageFilter>]);
        assert!(!plain.restricted_content_allowed());

        let mixed = CompositeFilter::new(vec![
            Arc::new(PassThroughFilter) as Arc<dyn MessageFilter>,
            Arc::new(RestrictedOk),
        ]);
        assert!(mixed.restricted_content_allowed());
    }

    #[test]
    fn functional_album_filtering_rewrites_only_the_representative_item() {
        let mut first = message("");
        first.id = 10;
        let mut second = message("caption here");
        second.id = 11;
        let mut third = message("tail");
        third.id = 12;
        let album = Album::new(99, vec![first, second, third]);

        let result = UppercaseFilter.process_album(album, EventKind::NewAlbum);
        assert_eq!(result.action, FilterAction::Continue);
        assert_eq!(result.entity.items[0].content.text, "");
        assert_eq!(result.entity.items[1].content.text, "CAPTION HERE");
        assert_eq!(result.entity.items[2].content.text, "tail");
    }
}
