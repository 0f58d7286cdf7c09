//! Source-to-destination routing.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use relay_filters::MessageFilter;
use serde::Deserialize;

/// How a mirrored copy is produced at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// Re-author the (filtered) content as a fresh message.
    Copy,
    /// Native forward. The chain still gates delivery, but content rewrites
    /// are not carried; the original goes out untouched.
    Forward,
}

/// One mirroring edge from a source chat to a destination chat.
pub struct Direction {
    pub source_chat: i64,
    /// Restricts the edge to one forum topic of the source; `None` mirrors
    /// the whole chat.
    pub source_topic: Option<i64>,
    pub dest_chat: i64,
    pub dest_topic: Option<i64>,
    pub mode: SendMode,
    pub filters: Arc<dyn MessageFilter>,
    pub allow_edit: bool,
    pub allow_delete: bool,
}

impl Direction {
    pub fn restricted_content_allowed(&self) -> bool {
        self.filters.restricted_content_allowed()
    }

    pub fn matches_topic(&self, topic: i64) -> bool {
        self.source_topic.map_or(true, |scoped| scoped == topic)
    }
}

/// All configured directions, grouped by source chat.
pub struct RoutingTable {
    directions: HashMap<i64, Vec<Arc<Direction>>>,
}

impl RoutingTable {
    pub fn new(directions: Vec<Direction>) -> Self {
        let mut grouped: HashMap<i64, Vec<Arc<Direction>>> = HashMap::new();
        for direction in directions {
            grouped
                .entry(direction.source_chat)
                .or_default()
                .push(Arc::new(direction));
        }
        Self { directions: grouped }
    }

    pub fn directions_for(&self, source_chat: i64) -> &[Arc<Direction>] {
        self.directions
            .get(&source_chat)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Directions linking one source chat to one destination chat, used when
    /// resolving edits and deletes back to the edge that produced a copy.
    pub fn directions_between(
        &self,
        source_chat: i64,
        dest_chat: i64,
    ) -> impl Iterator<Item = &Arc<Direction>> {
        self.directions_for(source_chat)
            .iter()
            .filter(move |direction| direction.dest_chat == dest_chat)
    }

    /// Chats the engine has to watch.
    pub fn source_chats(&self) -> Vec<i64> {
        let mut chats: Vec<i64> = self.directions.keys().copied().collect();
        chats.sort_unstable();
        chats
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    /// Human-readable routing summary for startup logging.
    pub fn stringify(&self) -> String {
        let mut out = String::new();
        for source in self.source_chats() {
            let _ = write!(out, "{source} ->");
            for direction in self.directions_for(source) {
                let mode = match direction.mode {
                    SendMode::Copy => "copy",
                    SendMode::Forward => "forward",
                };
                match direction.dest_topic {
                    Some(topic) => {
                        let _ = write!(out, " {}#{topic} ({mode})", direction.dest_chat);
                    }
                    None => {
                        let _ = write!(out, " {} ({mode})", direction.dest_chat);
                    }
                }
            }
            out.push('\n');
        }
        out
    }
}
