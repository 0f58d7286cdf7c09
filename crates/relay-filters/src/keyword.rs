//! Keyword replacement.

use std::collections::BTreeMap;

use anyhow::Context as _;
use regex::{Regex, RegexBuilder};
use relay_message::{Message, SpliceEdit, SpliceKeep};

use crate::{EventKind, FilterResult, MessageFilter};

struct ReplaceRule {
    pattern: Regex,
    replacement: String,
}

/// Replaces configured keywords, preserving the matched text's case style.
///
/// Keywords match case-insensitively on whole words; with `raw_patterns` the
/// keys are taken as regular expressions instead. Formatting spans over the
/// replaced range collapse onto the replacement.
pub struct KeywordReplaceFilter {
    rules: Vec<ReplaceRule>,
}

impl KeywordReplaceFilter {
    pub fn new(keywords: &BTreeMap<String, String>, raw_patterns: bool) -> anyhow::Result<Self> {
        let mut rules = Vec::with_capacity(keywords.len());
        for (keyword, replacement) in keywords {
            let source = if raw_patterns {
                keyword.clone()
            } else {
                format!(r"\b{}\b", regex::escape(keyword))
            };
            let pattern = RegexBuilder::new(&source)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("invalid keyword pattern {source:?}"))?;
            rules.push(ReplaceRule {
                pattern,
                replacement: replacement.clone(),
            });
        }
        Ok(Self { rules })
    }
}

impl MessageFilter for KeywordReplaceFilter {
    fn process_message(&self, mut message: Message, _kind: EventKind) -> FilterResult<Message> {
        let mut content = message.content;
        for rule in &self.rules {
            let edits: Vec<SpliceEdit> = rule
                .pattern
                .find_iter(&content.text)
                .map(|found| SpliceEdit {
                    start: found.start(),
                    end: found.end(),
                    replacement: style_replacement(found.as_str(), &rule.replacement),
                })
                .collect();
            if edits.is_empty() {
                continue;
            }
            // Matches of one pattern never overlap; the splice holds.
            content = match content.splice_all(&edits, SpliceKeep::Collapse) {
                Ok(next) => next,
                Err(_) => content,
            };
        }
        message.content = content;
        FilterResult::continue_with(message)
    }
}

/// Carries the matched text's case style over to the replacement: all-caps
/// matches uppercase it, capitalized matches capitalize it.
fn style_replacement(matched: &str, replacement: &str) -> String {
    let has_lower = matched.chars().any(char::is_lowercase);
    let has_upper = matched.chars().any(char::is_uppercase);
    if has_upper && !has_lower {
        return replacement.to_uppercase();
    }
    if matched.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = replacement.chars();
        if let Some(first) = chars.next() {
            let mut styled: String = first.to_uppercase().collect();
            styled.push_str(chars.as_str());
            return styled;
        }
    }
    replacement.to_string()
}
