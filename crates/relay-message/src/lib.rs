//! Message text model with typed formatting spans.
//!
//! A message is plain UTF-8 text plus a set of formatting spans addressed by
//! byte offset and length. [`FormattedText::splice`] rewrites a byte range and
//! repositions every span so formatting survives arbitrary substring
//! substitutions; [`FormattedText::splice_all`] applies a batch of
//! non-overlapping edits left-to-right with cumulative offset correction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod event;
mod url_match;

pub use event::{Album, ChatInfo, MediaRef, Message, ReplyHeader};
pub use url_match::{scan_linkish, scan_mentions, LinkMatch, UrlMatcher};

/// Formatting span kinds carried by the mirroring platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpanKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
    /// A URL written out in the text itself.
    Url,
    /// A clickable label whose target lives in the payload, not the text.
    TextLink { url: String },
    /// An `@handle` mention written out in the text.
    Mention,
    /// A mention of a user by id; the text carries only the display name.
    MentionName { user_id: i64 },
}

/// One formatting annotation over a byte range of the message text.
///
/// Invariant: `offset + length <= text.len()` and both ends fall on UTF-8
/// character boundaries. Spans need not be disjoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub length: usize,
    pub kind: SpanKind,
}

impl Span {
    pub fn new(offset: usize, length: usize, kind: SpanKind) -> Self {
        Self {
            offset,
            length,
            kind,
        }
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Plain text plus its formatting spans.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormattedText {
    pub text: String,
    pub spans: Vec<Span>,
}

/// What happens to a span that lies fully inside a spliced range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceKeep {
    /// Collapse the span to the replacement's bounds.
    Collapse,
    /// Drop the span; the replacement carries no formatting.
    Drop,
}

/// One pending edit for [`FormattedText::splice_all`], addressed in the
/// coordinates of the unedited text.
#[derive(Debug, Clone)]
pub struct SpliceEdit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpliceError {
    #[error("splice range {start}..{end} out of bounds for text of {len} bytes")]
    OutOfBounds { start: usize, end: usize, len: usize },
    #[error("splice range {start}..{end} does not fall on character boundaries")]
    NotCharBoundary { start: usize, end: usize },
    #[error("splice edits overlap at byte {at}")]
    OverlappingEdits { at: usize },
}

impl FormattedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            spans: Vec::new(),
        }
    }

    pub fn with_spans(text: impl Into<String>, spans: Vec<Span>) -> Self {
        Self {
            text: text.into(),
            spans,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Replaces `[start, end)` with `replacement`, repositioning every span.
    ///
    /// Each span falls into exactly one of five cases: shifted when fully
    /// after the range, grown when the range sits fully inside the span,
    /// truncated on the left edge, trimmed to the surviving tail on the
    /// right edge, or, when fully inside the range, collapsed to the
    /// replacement bounds or dropped per `keep`. Spans fully before the
    /// range are untouched.
    pub fn splice(
        &self,
        start: usize,
        end: usize,
        replacement: &str,
        keep: SpliceKeep,
    ) -> Result<FormattedText, SpliceError> {
        if start > end || end > self.text.len() {
            return Err(SpliceError::OutOfBounds {
                start,
                end,
                len: self.text.len(),
            });
        }
        if !self.text.is_char_boundary(start) || !self.text.is_char_boundary(end) {
            return Err(SpliceError::NotCharBoundary { start, end });
        }

        let mut text = String::with_capacity(self.text.len() + replacement.len());
        text.push_str(&self.text[..start]);
        text.push_str(replacement);
        text.push_str(&self.text[end..]);

        let delta = replacement.len() as isize - (end - start) as isize;
        let mut spans = Vec::with_capacity(self.spans.len());
        for span in &self.spans {
            let span_end = span.end();
            if span_end <= start {
                // Fully before the mutated range.
                spans.push(span.clone());
            } else if span.offset >= end {
                spans.push(Span::new(
                    offset_by(span.offset, delta),
                    span.length,
                    span.kind.clone(),
                ));
            } else if start <= span.offset && span_end <= end {
                if keep == SpliceKeep::Collapse && !replacement.is_empty() {
                    spans.push(Span::new(start, replacement.len(), span.kind.clone()));
                }
            } else if span.offset <= start && span_end >= end {
                spans.push(Span::new(
                    span.offset,
                    offset_by(span.length, delta),
                    span.kind.clone(),
                ));
            } else if span.offset < start {
                // Overlaps the left edge only.
                spans.push(Span::new(span.offset, start - span.offset, span.kind.clone()));
            } else {
                // Overlaps the right edge only; keep the surviving tail.
                spans.push(Span::new(
                    offset_by(end, delta),
                    span_end - end,
                    span.kind.clone(),
                ));
            }
        }

        Ok(FormattedText { text, spans })
    }

    /// Applies non-overlapping edits left-to-right, correcting each edit's
    /// position by the accumulated length delta of the edits before it.
    pub fn splice_all(
        &self,
        edits: &[SpliceEdit],
        keep: SpliceKeep,
    ) -> Result<FormattedText, SpliceError> {
        let mut ordered: Vec<&SpliceEdit> = edits.iter().collect();
        ordered.sort_by_key(|edit| edit.start);
        for pair in ordered.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(SpliceError::OverlappingEdits { at: pair[1].start });
            }
        }

        let mut current = self.clone();
        let mut delta = 0isize;
        for edit in ordered {
            let start = offset_by(edit.start, delta);
            let end = offset_by(edit.end, delta);
            current = current.splice(start, end, &edit.replacement, keep)?;
            delta += edit.replacement.len() as isize - (edit.end - edit.start) as isize;
        }
        Ok(current)
    }

    /// Shifts every span right by `amount` bytes.
    pub fn shift_spans(&mut self, amount: usize) {
        for span in &mut self.spans {
            span.offset += amount;
        }
    }
}

fn offset_by(value: usize, delta: isize) -> usize {
    if delta >= 0 {
        value + delta as usize
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_span(offset: usize, length: usize) -> Span {
        Span::new(offset, length, SpanKind::Url)
    }

    fn bold(offset: usize, length: usize) -> Span {
        Span::new(offset, length, SpanKind::Bold)
    }

    #[test]
    fn unit_splice_shifts_span_after_mutated_range() {
        let source = FormattedText::with_spans("aa bbbb cc", vec![bold(8, 2)]);
        let result = source.splice(3, 7, "x", SpliceKeep::Collapse).expect("splice");
        assert_eq!(result.text, "aa x cc");
        assert_eq!(result.spans, vec![bold(5, 2)]);
    }

    #[test]
    fn unit_splice_grows_span_containing_mutated_range() {
        let source = FormattedText::with_spans("hello world", vec![bold(0, 11)]);
        let result = source
            .splice(6, 11, "universe", SpliceKeep::Collapse)
            .expect("splice");
        assert_eq!(result.text, "hello universe");
        assert_eq!(result.spans, vec![bold(0, 14)]);
    }

    #[test]
    fn unit_splice_truncates_span_overlapping_left_edge() {
        let source = FormattedText::with_spans("abcdefgh", vec![bold(1, 4)]);
        // Span covers b..e, mutated range d..g.
        let result = source.splice(3, 7, "Z", SpliceKeep::Collapse).expect("splice");
        assert_eq!(result.text, "abcZh");
        assert_eq!(result.spans, vec![bold(1, 2)]);
    }

    #[test]
    fn unit_splice_keeps_surviving_tail_on_right_edge_overlap() {
        let source = FormattedText::with_spans("abcdefgh", vec![bold(3, 5)]);
        // Span covers d..h, mutated range b..f replaced by two bytes.
        let result = source.splice(1, 6, "XY", SpliceKeep::Collapse).expect("splice");
        assert_eq!(result.text, "aXYgh");
        assert_eq!(result.spans, vec![bold(3, 2)]);
    }

    #[test]
    fn unit_splice_drops_span_fully_inside_mutated_range() {
        let source = FormattedText::with_spans("see http://x.test now", vec![url_span(4, 14)]);
        let result = source.splice(4, 18, "***", SpliceKeep::Drop).expect("splice");
        assert_eq!(result.text, "see *** now");
        assert!(result.spans.is_empty());
    }

    #[test]
    fn unit_splice_collapses_inner_span_to_replacement_bounds() {
        let source = FormattedText::with_spans("pay 100 EUR", vec![bold(4, 3)]);
        let result = source.splice(4, 7, "99", SpliceKeep::Collapse).expect("splice");
        assert_eq!(result.text, "pay 99 EUR");
        assert_eq!(result.spans, vec![bold(4, 2)]);
    }

    #[test]
    fn unit_splice_leaves_span_before_mutated_range_untouched() {
        let source = FormattedText::with_spans("aa bb cc", vec![bold(0, 2)]);
        let result = source.splice(3, 5, "xxx", SpliceKeep::Collapse).expect("splice");
        assert_eq!(result.text, "aa xxx cc");
        assert_eq!(result.spans, vec![bold(0, 2)]);
    }

    #[test]
    fn unit_splice_rejects_out_of_bounds_range() {
        let source = FormattedText::new("short");
        let error = source.splice(2, 9, "", SpliceKeep::Drop).expect_err("bounds");
        assert_eq!(
            error,
            SpliceError::OutOfBounds {
                start: 2,
                end: 9,
                len: 5
            }
        );
    }

    #[test]
    fn unit_splice_rejects_non_character_boundary() {
        let source = FormattedText::new("héllo");
        let error = source.splice(1, 2, "", SpliceKeep::Drop).expect_err("boundary");
        assert!(matches!(error, SpliceError::NotCharBoundary { .. }));
    }

    #[test]
    fn functional_splice_all_applies_cumulative_offset_correction() {
        // Two disjoint replacements of different length deltas; the trailing
        // span must end up at its original offset plus the sum of deltas.
        let source = FormattedText::with_spans(
            "foo and bar stay bold",
            vec![bold(17, 4)],
        );
        let edits = vec![
            SpliceEdit {
                start: 0,
                end: 3,
                replacement: "foobar".to_string(), // +3
            },
            SpliceEdit {
                start: 8,
                end: 11,
                replacement: "b".to_string(), // -2
            },
        ];
        let result = source.splice_all(&edits, SpliceKeep::Collapse).expect("splice all");
        assert_eq!(result.text, "foobar and b stay bold");
        assert_eq!(result.spans, vec![bold(18, 4)]);
    }

    #[test]
    fn functional_splice_all_accepts_unsorted_edits() {
        let source = FormattedText::new("one two three");
        let edits = vec![
            SpliceEdit {
                start: 8,
                end: 13,
                replacement: "3".to_string(),
            },
            SpliceEdit {
                start: 0,
                end: 3,
                replacement: "1".to_string(),
            },
        ];
        let result = source.splice_all(&edits, SpliceKeep::Drop).expect("splice all");
        assert_eq!(result.text, "1 two 3");
    }

    #[test]
    fn regression_splice_all_rejects_overlapping_edits() {
        let source = FormattedText::new("abcdef");
        let edits = vec![
            SpliceEdit {
                start: 0,
                end: 4,
                replacement: "x".to_string(),
            },
            SpliceEdit {
                start: 3,
                end: 6,
                replacement: "y".to_string(),
            },
        ];
        let error = source
            .splice_all(&edits, SpliceKeep::Drop)
            .expect_err("overlap should fail");
        assert_eq!(error, SpliceError::OverlappingEdits { at: 3 });
    }

    #[test]
    fn regression_insertion_at_span_boundary_shifts_following_span() {
        // Pure insertion (start == end) before a span must shift it, not
        // swallow it.
        let source = FormattedText::with_spans("world", vec![bold(0, 5)]);
        let result = source.splice(0, 0, ">> ", SpliceKeep::Collapse).expect("splice");
        assert_eq!(result.text, ">> world");
        assert_eq!(result.spans, vec![bold(3, 5)]);
    }
}
