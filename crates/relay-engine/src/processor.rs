//! Per-event mirroring orchestration.
//!
//! Each handler fans one inbound event out to every matching direction.
//! Transport failures are isolated per destination: one failing mirror is
//! logged and skipped while the others proceed. Index failures abort the
//! handler, since losing identity records would silently break later edits
//! and deletes.

use std::collections::HashMap;
use std::sync::Arc;

use relay_filters::{EventKind, FilterAction, FilterResult, MessageFilter};
use relay_index::{MirrorIndex, MirrorRecord};
use relay_message::{Album, Message};

use crate::client::{AlbumItem, ClientError, MessagingClient};
use crate::routing::{Direction, RoutingTable, SendMode};

/// Topic id of a forum chat's default topic. Messages outside any explicit
/// topic belong to it.
pub const GENERAL_TOPIC_ID: i64 = 1;

pub struct EventProcessor {
    routing: RoutingTable,
    index: Arc<dyn MirrorIndex>,
    client: Arc<dyn MessagingClient>,
}

impl EventProcessor {
    pub fn new(
        routing: RoutingTable,
        index: Arc<dyn MirrorIndex>,
        client: Arc<dyn MessagingClient>,
    ) -> Self {
        Self {
            routing,
            index,
            client,
        }
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    /// Mirrors a fresh single message to every matching destination.
    pub async fn new_message(&self, message: Message) -> anyhow::Result<()> {
        let topic = event_topic(&message);
        let directions: Vec<Arc<Direction>> = self
            .routing
            .directions_for(message.chat.id)
            .iter()
            .filter(|direction| direction.matches_topic(topic))
            .cloned()
            .collect();
        if directions.is_empty() {
            tracing::warn!(
                source = message.chat.id,
                topic,
                "no direction routes this message"
            );
            return Ok(());
        }

        let reply_copies = match reply_target(&message) {
            Some(reply_id) => self.index.find(reply_id, message.chat.id).await?,
            None => Vec::new(),
        };

        let mut minted = Vec::new();
        for direction in directions {
            if refuses_protected(&message, &direction) {
                continue;
            }
            // The chain gates both modes; only a copy carries its rewrites.
            let FilterResult { action, entity } = direction
                .filters
                .process_message(message.clone(), EventKind::NewMessage);
            if action == FilterAction::Discard {
                tracing::info!(
                    source = message.chat.id,
                    dest = direction.dest_chat,
                    message_id = message.id,
                    "message discarded by filter chain"
                );
                continue;
            }
            match direction.mode {
                SendMode::Forward => {
                    match self
                        .client
                        .forward_messages(
                            direction.dest_chat,
                            message.chat.id,
                            &[message.id],
                            direction.dest_topic,
                        )
                        .await
                    {
                        Ok(ids) => {
                            minted.extend(ids.into_iter().map(|mirror_id| MirrorRecord {
                                original_id: message.id,
                                original_channel: message.chat.id,
                                mirror_id,
                                mirror_channel: direction.dest_chat,
                            }));
                        }
                        Err(error) => {
                            tracing::error!(
                                source = message.chat.id,
                                dest = direction.dest_chat,
                                %error,
                                "forward failed"
                            );
                        }
                    }
                }
                SendMode::Copy => {
                    let reply_to = reply_copies
                        .iter()
                        .find(|copy| copy.mirror_channel == direction.dest_chat)
                        .map(|copy| copy.mirror_id);
                    match self
                        .client
                        .send_message(
                            direction.dest_chat,
                            &entity.content,
                            entity.media.as_ref(),
                            reply_to,
                            direction.dest_topic,
                        )
                        .await
                    {
                        Ok(mirror_id) => minted.push(MirrorRecord {
                            original_id: message.id,
                            original_channel: message.chat.id,
                            mirror_id,
                            mirror_channel: direction.dest_chat,
                        }),
                        Err(error) => {
                            tracing::error!(
                                source = message.chat.id,
                                dest = direction.dest_chat,
                                %error,
                                "mirror send failed"
                            );
                        }
                    }
                }
            }
        }

        if !minted.is_empty() {
            self.index.insert_batch(minted).await?;
        }
        Ok(())
    }

    /// Mirrors a grouped album atomically: one filter verdict, one send per
    /// destination, one identity record per item.
    pub async fn new_album(&self, album: Album) -> anyhow::Result<()> {
        let Some(first) = album.first() else {
            return Ok(());
        };
        let source_chat = first.chat.id;
        let topic = event_topic(first);
        let directions: Vec<Arc<Direction>> = self
            .routing
            .directions_for(source_chat)
            .iter()
            .filter(|direction| direction.matches_topic(topic))
            .cloned()
            .collect();
        if directions.is_empty() {
            tracing::warn!(source = source_chat, topic, "no direction routes this album");
            return Ok(());
        }

        let reply_copies = match reply_target(first) {
            Some(reply_id) => self.index.find(reply_id, source_chat).await?,
            None => Vec::new(),
        };

        let mut minted = Vec::new();
        for direction in directions {
            if refuses_protected(first, &direction) {
                continue;
            }
            let FilterResult { action, entity } = direction
                .filters
                .process_album(album.clone(), EventKind::NewAlbum);
            if action == FilterAction::Discard {
                tracing::info!(
                    source = source_chat,
                    dest = direction.dest_chat,
                    grouped_id = album.grouped_id,
                    "album discarded by filter chain"
                );
                continue;
            }
            match direction.mode {
                SendMode::Forward => {
                    let ids: Vec<i64> = album.items.iter().map(|item| item.id).collect();
                    match self
                        .client
                        .forward_messages(direction.dest_chat, source_chat, &ids, direction.dest_topic)
                        .await
                    {
                        Ok(mirror_ids) => {
                            minted.extend(album.items.iter().zip(mirror_ids).map(
                                |(item, mirror_id)| MirrorRecord {
                                    original_id: item.id,
                                    original_channel: source_chat,
                                    mirror_id,
                                    mirror_channel: direction.dest_chat,
                                },
                            ));
                        }
                        Err(error) => {
                            tracing::error!(
                                source = source_chat,
                                dest = direction.dest_chat,
                                %error,
                                "album forward failed"
                            );
                        }
                    }
                }
                SendMode::Copy => {
                    let items: Vec<AlbumItem> = entity
                        .items
                        .iter()
                        .map(|item| AlbumItem {
                            content: item.content.clone(),
                            media: item.media.clone(),
                        })
                        .collect();
                    let reply_to = reply_copies
                        .iter()
                        .find(|copy| copy.mirror_channel == direction.dest_chat)
                        .map(|copy| copy.mirror_id);
                    match self
                        .client
                        .send_album(direction.dest_chat, &items, reply_to, direction.dest_topic)
                        .await
                    {
                        Ok(mirror_ids) => {
                            minted.extend(entity.items.iter().zip(mirror_ids).map(
                                |(item, mirror_id)| MirrorRecord {
                                    original_id: item.id,
                                    original_channel: source_chat,
                                    mirror_id,
                                    mirror_channel: direction.dest_chat,
                                },
                            ));
                        }
                        Err(error) => {
                            tracing::error!(
                                source = source_chat,
                                dest = direction.dest_chat,
                                %error,
                                "album send failed"
                            );
                        }
                    }
                }
            }
        }

        if !minted.is_empty() {
            self.index.insert_batch(minted).await?;
        }
        Ok(())
    }

    /// Propagates an edit to every known copy of the edited message.
    pub async fn edit_message(&self, message: Message) -> anyhow::Result<()> {
        if message.edit_hidden {
            tracing::debug!(
                source = message.chat.id,
                message_id = message.id,
                "edit carries no visible change"
            );
            return Ok(());
        }
        let copies = self.index.find(message.id, message.chat.id).await?;
        if copies.is_empty() {
            tracing::debug!(
                source = message.chat.id,
                message_id = message.id,
                "edited message has no known copies"
            );
            return Ok(());
        }

        let topic = event_topic(&message);
        for copy in copies {
            let Some(direction) = self
                .routing
                .directions_between(message.chat.id, copy.mirror_channel)
                .find(|direction| direction.matches_topic(topic))
            else {
                continue;
            };
            if !direction.allow_edit || direction.mode == SendMode::Forward {
                continue;
            }

            // Album items whose caption did not change arrive with empty
            // text; rewriting those through the chain would inject content
            // the original never had.
            let entity = if message.grouped_id.is_some() && message.content.is_empty() {
                message.clone()
            } else {
                let FilterResult { action, entity } = direction
                    .filters
                    .process_message(message.clone(), EventKind::MessageEdited);
                if action == FilterAction::Discard {
                    tracing::info!(
                        source = message.chat.id,
                        dest = direction.dest_chat,
                        message_id = message.id,
                        "edit discarded by filter chain"
                    );
                    continue;
                }
                entity
            };

            match self
                .client
                .edit_message(
                    copy.mirror_channel,
                    copy.mirror_id,
                    &entity.content,
                    entity.media.as_ref(),
                )
                .await
            {
                Ok(()) => {}
                Err(ClientError::NotModified) => {
                    tracing::debug!(
                        dest = copy.mirror_channel,
                        mirror_id = copy.mirror_id,
                        "edit produced no change on the mirror"
                    );
                }
                Err(error) => {
                    tracing::error!(
                        dest = copy.mirror_channel,
                        mirror_id = copy.mirror_id,
                        %error,
                        "edit propagation failed"
                    );
                }
            }
        }
        Ok(())
    }

    /// Deletes every known copy of the given originals, then forgets them.
    /// Identity records are removed even when a remote delete fails; a copy
    /// that outlives its original is better than edits landing on reused ids.
    pub async fn delete_messages(&self, chat_id: i64, message_ids: &[i64]) -> anyhow::Result<()> {
        let copies = self.index.find_batch(message_ids, chat_id).await?;

        let mut grouped: HashMap<i64, Vec<i64>> = HashMap::new();
        for copy in &copies {
            grouped
                .entry(copy.mirror_channel)
                .or_default()
                .push(copy.mirror_id);
        }

        for (mirror_channel, mirror_ids) in grouped {
            let allowed = self
                .routing
                .directions_between(chat_id, mirror_channel)
                .any(|direction| direction.allow_delete);
            if !allowed {
                tracing::debug!(
                    source = chat_id,
                    dest = mirror_channel,
                    "deletes are disabled for this direction"
                );
                continue;
            }
            if let Err(error) = self.client.delete_messages(mirror_channel, &mirror_ids).await {
                tracing::error!(
                    dest = mirror_channel,
                    %error,
                    "delete propagation failed"
                );
            }
        }

        self.index.delete_batch(message_ids, chat_id).await?;
        Ok(())
    }
}

/// Forum topic an event belongs to. Without a forum marker the event sits in
/// the default topic.
fn event_topic(message: &Message) -> i64 {
    match &message.reply {
        Some(reply) if reply.forum_topic => reply.top_id.unwrap_or(reply.reply_to_id),
        _ => GENERAL_TOPIC_ID,
    }
}

/// Message id this event replies to, if the reply header points at an actual
/// message rather than just marking a topic.
fn reply_target(message: &Message) -> Option<i64> {
    match &message.reply {
        Some(reply) if !reply.forum_topic => Some(reply.reply_to_id),
        Some(reply) if reply.top_id.is_some() => Some(reply.reply_to_id),
        _ => None,
    }
}

/// Protected sources can only be mirrored through a chain that strips what
/// makes them protected, and never by native forwarding.
fn refuses_protected(message: &Message, direction: &Direction) -> bool {
    if !message.chat.protected {
        return false;
    }
    if direction.mode == SendMode::Forward || !direction.restricted_content_allowed() {
        tracing::warn!(
            source = message.chat.id,
            dest = direction.dest_chat,
            "source has protected content; direction cannot mirror it"
        );
        return true;
    }
    false
}
