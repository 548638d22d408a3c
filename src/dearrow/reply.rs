use std::collections::HashSet;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use log::{debug, error};
use serenity::model::{
    channel::{Message, MessageFlags},
    id::{ChannelId, GuildId, MessageId},
};

use super::{
    branding::{
        thumbnail_file_name, ReplacementDecision, ReplacementEmbed, SourceEmbed,
        ThumbnailReplacement,
    },
    client::{self, BrandingSource},
    guild::{GuildConfig, GuildSettings},
    platform::{ChatPlatform, Thumbnail, REQUIRED_PERMISSIONS},
    tracker::{is_stale_edit, ReplyTracker},
    video::video_id_from_embed,
};

/// Thumbnail requests in flight for a single message.
const MAX_CONCURRENT_THUMBNAILS: usize = 4;

/// Resolves the settings of a guild; defaults when nothing is stored.
#[async_trait]
pub trait GuildConfigSource: Send + Sync {
    async fn guild_config(&self, guild_id: GuildId) -> anyhow::Result<GuildConfig>;
}

#[async_trait]
impl GuildConfigSource for GuildSettings {
    async fn guild_config(&self, guild_id: GuildId) -> anyhow::Result<GuildConfig> {
        self.get(guild_id).await
    }
}

/// Guild message as seen by the reply flow.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub guild_id: GuildId,
    pub author_is_bot: bool,
    pub flags: MessageFlags,
    pub embeds: Vec<SourceEmbed>,
}

impl IncomingMessage {
    /// `None` for direct messages.
    pub fn from_message(message: &Message) -> Option<Self> {
        Some(Self {
            id: message.id,
            channel_id: message.channel_id,
            guild_id: message.guild_id?,
            author_is_bot: message.author.bot,
            flags: message.flags.unwrap_or_else(MessageFlags::empty),
            embeds: message.embeds.iter().map(SourceEmbed::from).collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// No embeds, a bot author, an already answered message or a stale edit.
    Ignored,
    MissingPermissions,
    NothingToReplace,
    Replied(MessageId),
}

/// Decisions for every distinct video of `embeds`, in the order they appear.
///
/// Fails as a whole when any branding request fails.
pub async fn collect_decisions(
    branding: &dyn BrandingSource,
    config: &GuildConfig,
    embeds: &[SourceEmbed],
) -> client::Result<Vec<ReplacementDecision>> {
    let mut seen = HashSet::new();
    let mut decisions = Vec::new();
    for embed in embeds {
        let Some(video_id) = video_id_from_embed(embed) else {
            continue;
        };
        if !seen.insert(video_id.clone()) {
            continue;
        }

        let response = branding.fetch_branding(&video_id).await?;
        if let Some(decision) = response.replacement(&video_id, config, embed) {
            decisions.push(decision);
        }
    }

    Ok(decisions)
}

/// Fetches every thumbnail the decisions point at. Fails as a whole on the first error.
pub async fn fetch_thumbnails(
    branding: &dyn BrandingSource,
    decisions: &[ReplacementDecision],
) -> client::Result<Vec<Thumbnail>> {
    let wanted: Vec<(String, f64)> = decisions
        .iter()
        .filter_map(|decision| match decision.thumbnail {
            ThumbnailReplacement::At(timestamp) => Some((decision.video_id.clone(), timestamp)),
            ThumbnailReplacement::NoChange | ThumbnailReplacement::Blank => None,
        })
        .collect();

    stream::iter(wanted)
        .map(|(video_id, timestamp)| async move {
            let data = branding.fetch_thumbnail(&video_id, timestamp).await?;
            Ok::<_, client::Error>(Thumbnail {
                file_name: thumbnail_file_name(&video_id),
                data,
            })
        })
        .buffered(MAX_CONCURRENT_THUMBNAILS)
        .try_collect()
        .await
}

pub struct ReplyAssembler<'a> {
    pub branding: &'a dyn BrandingSource,
    pub guilds: &'a dyn GuildConfigSource,
    pub platform: &'a dyn ChatPlatform,
    pub tracker: &'a ReplyTracker,
}

impl ReplyAssembler<'_> {
    /// Replies to `message` with rewritten previews and hides its own previews.
    pub async fn handle(&self, message: &IncomingMessage) -> anyhow::Result<ReplyOutcome> {
        if message.embeds.is_empty()
            || message.author_is_bot
            || !self.tracker.try_claim(message.id)
        {
            return Ok(ReplyOutcome::Ignored);
        }

        let outcome = self.reply(message).await;
        if !matches!(outcome, Ok(ReplyOutcome::Replied(_))) {
            self.tracker.release(message.id);
        }

        outcome
    }

    async fn reply(&self, message: &IncomingMessage) -> anyhow::Result<ReplyOutcome> {
        if !self
            .platform
            .has_permissions(message.guild_id, message.channel_id, REQUIRED_PERMISSIONS)
            .await
        {
            debug!(
                "ignoring message {} due to missing permissions in {}",
                message.id, message.channel_id
            );
            return Ok(ReplyOutcome::MissingPermissions);
        }

        let config = self
            .guilds
            .guild_config(message.guild_id)
            .await
            .with_context(|| format!("Failed to get config of guild {}", message.guild_id))?;

        let decisions = collect_decisions(self.branding, &config, &message.embeds)
            .await
            .with_context(|| format!("Failed to fetch branding for message {}", message.id))?;
        if decisions.is_empty() {
            return Ok(ReplyOutcome::NothingToReplace);
        }

        let thumbnails = fetch_thumbnails(self.branding, &decisions)
            .await
            .with_context(|| format!("Failed to fetch thumbnails for message {}", message.id))?;

        let embeds: Vec<ReplacementEmbed> = decisions
            .into_iter()
            .map(|decision| decision.embed)
            .collect();
        let reply_id = self
            .platform
            .create_reply(message.channel_id, message.id, &embeds, thumbnails)
            .await?;
        self.tracker.track(message.id, reply_id);

        if let Err(e) = self
            .platform
            .suppress_embeds(message.channel_id, message.id, message.flags)
            .await
        {
            error!(
                "Failed to suppress embeds of {} in {} - {e:?}",
                message.id, message.channel_id
            );
        }

        Ok(ReplyOutcome::Replied(reply_id))
    }

    /// Same as [`Self::handle`], except edits of old messages are dropped.
    pub async fn handle_edit(
        &self,
        message: &IncomingMessage,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ReplyOutcome> {
        if is_stale_edit(message.id, now) {
            return Ok(ReplyOutcome::Ignored);
        }

        self.handle(message).await
    }

    /// Deletes the reply of a deleted message, if there is one.
    pub async fn retract(&self, channel_id: ChannelId, source: MessageId) -> Option<MessageId> {
        let reply = self.tracker.untrack(source)?;
        if let Err(e) = self.platform.delete_message(channel_id, reply).await {
            error!("Failed to delete reply {reply} of {source} in {channel_id} - {e:?}");
        }

        Some(reply)
    }
}
