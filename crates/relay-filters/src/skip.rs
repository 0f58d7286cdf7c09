//! Gate filters that discard whole events.

use anyhow::ensure;
use regex::{Regex, RegexBuilder};
use relay_message::{scan_linkish, scan_mentions, Message, SpanKind};

use crate::{EventKind, FilterResult, MessageFilter};

/// Discards every event. Routing a source through this chain silences it.
pub struct SkipAllFilter;

impl MessageFilter for SkipAllFilter {
    fn process_message(&self, message: Message, _kind: EventKind) -> FilterResult<Message> {
        FilterResult::discard(message)
    }
}

/// Discards messages whose text contains any of the configured keywords,
/// matched case-insensitively on whole words.
pub struct SkipWithKeywordsFilter {
    pattern: Regex,
}

impl SkipWithKeywordsFilter {
    pub fn new<I, S>(keywords: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternatives: Vec<String> = keywords
            .into_iter()
            .map(|keyword| regex::escape(keyword.as_ref()))
            .collect();
        ensure!(!alternatives.is_empty(), "keyword skip list is empty");
        let pattern = RegexBuilder::new(&format!(r"\b(?:{})\b", alternatives.join("|")))
            .case_insensitive(true)
            .build()?;
        Ok(Self { pattern })
    }
}

impl MessageFilter for SkipWithKeywordsFilter {
    fn process_message(&self, message: Message, _kind: EventKind) -> FilterResult<Message> {
        if self.pattern.is_match(&message.content.text) {
            FilterResult::discard(message)
        } else {
            FilterResult::continue_with(message)
        }
    }
}

/// Discards messages carrying any URL, whether as a formatting span, a
/// clickable label, or bare text. Mentions count as links when enabled.
pub struct SkipUrlFilter {
    skip_mentions: bool,
}

impl SkipUrlFilter {
    pub fn new(skip_mentions: bool) -> Self {
        Self { skip_mentions }
    }

    fn has_link(&self, message: &Message) -> bool {
        for span in &message.content.spans {
            match span.kind {
                SpanKind::Url | SpanKind::TextLink { .. } => return true,
                SpanKind::Mention | SpanKind::MentionName { .. } if self.skip_mentions => {
                    return true
                }
                _ => {}
            }
        }
        if !scan_linkish(&message.content.text).is_empty() {
            return true;
        }
        self.skip_mentions && !scan_mentions(&message.content.text).is_empty()
    }
}

impl MessageFilter for SkipUrlFilter {
    fn process_message(&self, message: Message, _kind: EventKind) -> FilterResult<Message> {
        if self.has_link(&message) {
            FilterResult::discard(message)
        } else {
            FilterResult::continue_with(message)
        }
    }
}
