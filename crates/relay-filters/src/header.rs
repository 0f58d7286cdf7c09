//! Attribution header injection.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use relay_message::{FormattedText, Message, Span, SpanKind, SpliceKeep};

use crate::resolve::{LinkResolver, NameResolver};
use crate::{EventKind, FilterResult, MessageFilter};

pub const DEFAULT_HEADER_TEMPLATE: &str =
    "{message_text}\n\nForwarded from [{channel_name}]({message_link})";

const BODY_PLACEHOLDER: &str = "{message_text}";

/// Wraps the message body in an attribution template.
///
/// The template may use `{message_text}`, `{channel_name}`, `{message_link}`,
/// `{sender_name}` and `{sender_username}`, plus markdown-style `[label](url)`
/// links which become clickable spans. When the chat name or message link
/// cannot be resolved the message passes through unchanged.
pub struct ForwardHeaderFilter {
    template: String,
    names: Arc<dyn NameResolver>,
    links: Arc<dyn LinkResolver>,
}

impl ForwardHeaderFilter {
    pub fn new(
        template: impl Into<String>,
        names: Arc<dyn NameResolver>,
        links: Arc<dyn LinkResolver>,
    ) -> Self {
        Self {
            template: template.into(),
            names,
            links,
        }
    }

    fn render(&self, message: &Message) -> Option<FormattedText> {
        let channel_name = self.names.channel_name(message)?;
        let message_link = self.links.message_link(message)?;
        let filled = self
            .template
            .replace("{channel_name}", &channel_name)
            .replace("{message_link}", &message_link)
            .replace("{sender_name}", message.sender_name.as_deref().unwrap_or(""))
            .replace(
                "{sender_username}",
                message.sender_username.as_deref().unwrap_or(""),
            );

        let frame = parse_markdown_links(&filled);
        let body_start = frame.text.find(BODY_PLACEHOLDER)?;
        let body_end = body_start + BODY_PLACEHOLDER.len();
        let mut rendered = frame
            .splice(body_start, body_end, &message.content.text, SpliceKeep::Drop)
            .ok()?;
        for span in &message.content.spans {
            rendered.spans.push(Span::new(
                span.offset + body_start,
                span.length,
                span.kind.clone(),
            ));
        }
        Some(rendered)
    }
}

impl MessageFilter for ForwardHeaderFilter {
    fn process_message(&self, mut message: Message, _kind: EventKind) -> FilterResult<Message> {
        if let Some(content) = self.render(&message) {
            message.content = content;
        }
        FilterResult::continue_with(message)
    }
}

fn markdown_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("link pattern is valid"))
}

/// Turns `[label](url)` occurrences into text-link spans over the label.
fn parse_markdown_links(template: &str) -> FormattedText {
    let mut text = String::with_capacity(template.len());
    let mut spans = Vec::new();
    let mut cursor = 0;
    for captures in markdown_link_regex().captures_iter(template) {
        let (Some(whole), Some(label), Some(url)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };
        text.push_str(&template[cursor..whole.start()]);
        spans.push(Span::new(
            text.len(),
            label.as_str().len(),
            SpanKind::TextLink {
                url: url.as_str().to_string(),
            },
        ));
        text.push_str(label.as_str());
        cursor = whole.end();
    }
    text.push_str(&template[cursor..]);
    FormattedText::with_spans(text, spans)
}
