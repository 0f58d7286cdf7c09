//! Name and link resolution used by header-injecting filters.
//!
//! Resolution is a constructor-time dependency: filters hold a resolver and
//! never reach out to the transport while processing.

use std::collections::HashMap;

use relay_message::Message;

/// Resolves the display name of the chat a message came from.
pub trait NameResolver: Send + Sync {
    fn channel_name(&self, message: &Message) -> Option<String>;
}

/// Resolves a public link pointing at the original message.
pub trait LinkResolver: Send + Sync {
    fn message_link(&self, message: &Message) -> Option<String>;
}

/// Uses the chat title as delivered with the event.
pub struct ChatTitleResolver;

impl NameResolver for ChatTitleResolver {
    fn channel_name(&self, message: &Message) -> Option<String> {
        if message.chat.title.is_empty() {
            None
        } else {
            Some(message.chat.title.clone())
        }
    }
}

/// Overrides chat titles with configured display names, falling back to the
/// delivered title for chats without an override.
pub struct MappedNameResolver {
    names: HashMap<i64, String>,
}

impl MappedNameResolver {
    pub fn new(names: HashMap<i64, String>) -> Self {
        Self { names }
    }
}

impl NameResolver for MappedNameResolver {
    fn channel_name(&self, message: &Message) -> Option<String> {
        if let Some(name) = self.names.get(&message.chat.id) {
            return Some(name.clone());
        }
        ChatTitleResolver.channel_name(message)
    }
}

/// Builds `t.me` links from the chat's public username, or the `t.me/c/...`
/// form for private channels. Messages from user peers have no link.
pub struct PublicLinkResolver;

impl LinkResolver for PublicLinkResolver {
    fn message_link(&self, message: &Message) -> Option<String> {
        if let Some(username) = message.chat.username.as_deref().filter(|u| !u.is_empty()) {
            return Some(format!("https://t.me/{username}/{}", message.id));
        }
        if message.chat.id >= 0 {
            return None;
        }
        // Channel ids carry a -100 marker prefix that links omit.
        let digits = message.chat.id.unsigned_abs().to_string();
        let bare = digits.strip_prefix("100").unwrap_or(&digits);
        Some(format!("https://t.me/c/{bare}/{}", message.id))
    }
}
