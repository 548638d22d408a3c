use std::{borrow::Cow, sync::Arc};

use anyhow::Context as _;
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use serenity::{
    builder::CreateEmbed,
    cache::Cache,
    client::Context,
    http::Http,
    model::{
        channel::{AttachmentType, GuildChannel, MessageFlags},
        id::{ChannelId, GuildId, MessageId},
        Permissions,
    },
};

use super::branding::{EmbedImage, ReplacementEmbed};

/// Permissions the bot needs in a channel before it touches a message there.
pub const REQUIRED_PERMISSIONS: Permissions = Permissions::SEND_MESSAGES
    .union(Permissions::MANAGE_MESSAGES)
    .union(Permissions::EMBED_LINKS)
    .union(Permissions::READ_MESSAGE_HISTORY);

/// Generated image uploaded along with the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub file_name: String,
    pub data: Bytes,
}

/// Chat operations the reply flow depends on.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn has_permissions(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        required: Permissions,
    ) -> bool;

    /// Posts a reply to `source` that never pings anyone.
    async fn create_reply(
        &self,
        channel_id: ChannelId,
        source: MessageId,
        embeds: &[ReplacementEmbed],
        thumbnails: Vec<Thumbnail>,
    ) -> anyhow::Result<MessageId>;

    /// Adds the suppress embeds bit on top of `current_flags`.
    async fn suppress_embeds(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        current_flags: MessageFlags,
    ) -> anyhow::Result<()>;

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId)
        -> anyhow::Result<()>;
}

pub fn create_embed(embed: &ReplacementEmbed) -> CreateEmbed {
    let mut e = CreateEmbed::default();
    e.title(&embed.title);
    if let Some(author) = &embed.author {
        e.author(|a| {
            a.name(&author.name);
            if let Some(url) = &author.url {
                a.url(url);
            }
            a
        });
    }
    if let Some(url) = &embed.url {
        e.url(url);
    }
    if let Some(colour) = embed.colour {
        e.colour(colour);
    }
    if let Some(footer) = &embed.footer {
        e.footer(|f| f.text(footer));
    }
    match &embed.image {
        EmbedImage::None => {}
        EmbedImage::Url(url) => {
            e.image(url);
        }
        EmbedImage::Attachment(file_name) => {
            e.attachment(file_name);
        }
    }

    e
}

pub struct SerenityPlatform {
    cache: Arc<Cache>,
    http: Arc<Http>,
}

impl SerenityPlatform {
    pub fn new(context: &Context) -> Self {
        Self {
            cache: context.cache.clone(),
            http: context.http.clone(),
        }
    }

    /// Channel whose permissions apply to messages in `channel_id`.
    fn permission_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Option<GuildChannel> {
        if let Some(channel) = self.cache.guild_channel(channel_id) {
            return Some(channel);
        }

        // threads are cached on the guild and inherit from their parent
        let parent = self
            .cache
            .guild_field(guild_id, |guild| {
                thread_parent(
                    guild.threads.iter().map(|thread| (thread.id, thread.parent_id)),
                    channel_id,
                )
            })
            .flatten()?;
        self.cache.guild_channel(parent)
    }
}

fn thread_parent(
    threads: impl IntoIterator<Item = (ChannelId, Option<ChannelId>)>,
    channel_id: ChannelId,
) -> Option<ChannelId> {
    threads
        .into_iter()
        .find(|(thread_id, _)| *thread_id == channel_id)
        .and_then(|(_, parent_id)| parent_id)
}

#[async_trait]
impl ChatPlatform for SerenityPlatform {
    async fn has_permissions(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        required: Permissions,
    ) -> bool {
        let Some(channel) = self.permission_channel(guild_id, channel_id) else {
            debug!("channel {channel_id} of guild {guild_id} is missing in cache");
            return false;
        };

        match channel.permissions_for_user(&self.cache, self.cache.current_user_id()) {
            Ok(permissions) => permissions.contains(required),
            Err(e) => {
                debug!("Failed to resolve permissions in {channel_id} - {e:?}");
                false
            }
        }
    }

    async fn create_reply(
        &self,
        channel_id: ChannelId,
        source: MessageId,
        embeds: &[ReplacementEmbed],
        thumbnails: Vec<Thumbnail>,
    ) -> anyhow::Result<MessageId> {
        let reply = channel_id
            .send_message(&self.http, |m| {
                m.reference_message((channel_id, source))
                    .allowed_mentions(|am| am.empty_parse().replied_user(false))
                    .set_embeds(embeds.iter().map(create_embed).collect());
                for thumbnail in thumbnails {
                    m.add_file(AttachmentType::Bytes {
                        data: Cow::Owned(thumbnail.data.to_vec()),
                        filename: thumbnail.file_name,
                    });
                }
                m
            })
            .await
            .context("Failed to send reply")?;

        Ok(reply.id)
    }

    async fn suppress_embeds(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        current_flags: MessageFlags,
    ) -> anyhow::Result<()> {
        let flags = current_flags | MessageFlags::SUPPRESS_EMBEDS;
        channel_id
            .edit_message(&self.http, message_id, |m| {
                // EditMessage::suppress_embeds would drop the other bits
                m.0.insert("flags", serde_json::json!(flags.bits()));
                m
            })
            .await
            .context("Failed to suppress embeds")?;

        Ok(())
    }

    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> anyhow::Result<()> {
        channel_id
            .delete_message(&self.http, message_id)
            .await
            .context("Failed to delete message")
    }
}
