//! URL and mention redaction.

use relay_message::{
    scan_linkish, scan_mentions, FormattedText, Message, SpanKind, SpliceEdit, SpliceKeep,
    UrlMatcher,
};

use crate::{EventKind, FilterResult, MessageFilter};

pub const DEFAULT_PLACEHOLDER: &str = "***";

/// Replaces matching URLs and mentions with a placeholder.
///
/// URLs written out in the text (with or without a formatting span) are
/// replaced textually; clickable labels whose target lives in the span payload
/// keep their text but lose the span. The [`UrlMatcher`] decides which hosts
/// are affected; mentions are redacted unconditionally when enabled.
pub struct RedactUrlFilter {
    matcher: UrlMatcher,
    placeholder: String,
    redact_mentions: bool,
}

impl RedactUrlFilter {
    pub fn new(matcher: UrlMatcher, placeholder: impl Into<String>, redact_mentions: bool) -> Self {
        Self {
            matcher,
            placeholder: placeholder.into(),
            redact_mentions,
        }
    }

    fn redact(&self, content: &FormattedText) -> Option<FormattedText> {
        let mut edits: Vec<SpliceEdit> = Vec::new();
        let mut dropped_spans: Vec<usize> = Vec::new();

        for (index, span) in content.spans.iter().enumerate() {
            let Some(slice) = content.text.get(span.offset..span.end()) else {
                continue;
            };
            match &span.kind {
                SpanKind::Url => {
                    if self.matcher.matches(slice) {
                        edits.push(self.replace_range(span.offset, span.end()));
                    }
                }
                SpanKind::TextLink { url } => {
                    if self.matcher.matches(url) {
                        dropped_spans.push(index);
                    }
                }
                SpanKind::Mention => {
                    if self.redact_mentions {
                        edits.push(self.replace_range(span.offset, span.end()));
                    }
                }
                SpanKind::MentionName { .. } => {
                    if self.redact_mentions {
                        dropped_spans.push(index);
                    }
                }
                _ => {}
            }
        }

        // Bare text can carry URLs and handles no span points at. Only the
        // kinds the entity pass handles claim their ranges; styling spans
        // over the same text must not shield it from the rescan.
        let covered: Vec<(usize, usize)> = content
            .spans
            .iter()
            .filter(|span| {
                matches!(
                    span.kind,
                    SpanKind::Url
                        | SpanKind::TextLink { .. }
                        | SpanKind::Mention
                        | SpanKind::MentionName { .. }
                )
            })
            .map(|span| (span.offset, span.end()))
            .collect();
        let overlaps_span =
            |start: usize, end: usize| covered.iter().any(|&(a, b)| start < b && a < end);

        for found in scan_linkish(&content.text) {
            if !overlaps_span(found.start, found.end) && self.matcher.matches(&found.text) {
                edits.push(self.replace_range(found.start, found.end));
            }
        }
        if self.redact_mentions {
            for found in scan_mentions(&content.text) {
                if !overlaps_span(found.start, found.end) {
                    edits.push(self.replace_range(found.start, found.end));
                }
            }
        }

        if edits.is_empty() && dropped_spans.is_empty() {
            return None;
        }

        let mut pruned = content.clone();
        if !dropped_spans.is_empty() {
            pruned.spans = pruned
                .spans
                .into_iter()
                .enumerate()
                .filter(|(index, _)| !dropped_spans.contains(index))
                .map(|(_, span)| span)
                .collect();
        }

        // Ranges are text-derived and deduplicated, so the splice holds.
        let edits = drop_overlapping(edits);
        match pruned.splice_all(&edits, SpliceKeep::Drop) {
            Ok(next) => Some(next),
            Err(_) => Some(pruned),
        }
    }

    fn replace_range(&self, start: usize, end: usize) -> SpliceEdit {
        SpliceEdit {
            start,
            end,
            replacement: self.placeholder.clone(),
        }
    }
}

/// Keeps the leftmost of any pair of overlapping ranges. Overlaps happen when
/// the link and mention scanners claim intersecting text, for example inside
/// `user@host.test`.
fn drop_overlapping(mut edits: Vec<SpliceEdit>) -> Vec<SpliceEdit> {
    edits.sort_by_key(|edit| (edit.start, edit.end));
    let mut kept: Vec<SpliceEdit> = Vec::with_capacity(edits.len());
    for edit in edits {
        if kept.last().map_or(true, |previous| edit.start >= previous.end) {
            kept.push(edit);
        }
    }
    kept
}

impl MessageFilter for RedactUrlFilter {
    fn process_message(&self, mut message: Message, _kind: EventKind) -> FilterResult<Message> {
        if let Some(content) = self.redact(&message.content) {
            message.content = content;
        }
        FilterResult::continue_with(message)
    }
}
