use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info};
use serde::Deserialize;
use serenity::{
    client::Context,
    model::{
        channel::{Message, MessageFlags},
        event::MessageUpdateEvent,
        id::{ChannelId, MessageId},
        prelude::{interaction::application_command::ApplicationCommandInteraction, Ready},
    },
};
use sqlx::SqlitePool;

use self::{
    branding::SourceEmbed,
    client::BrandingClient,
    guild::GuildSettings,
    platform::SerenityPlatform,
    reply::{IncomingMessage, ReplyAssembler, ReplyOutcome},
    tracker::ReplyTracker,
};
use crate::discord::SubApplication;

pub mod branding;
pub mod client;
pub mod commands;
pub mod guild;
pub mod platform;
pub mod reply;
pub mod tracker;
pub mod video;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    branding_url: String,
    thumbnail_url: String,
    branding_timeout_secs: u64,
    thumbnail_timeout_secs: u64,
    /// Sent as `Authorization` to the thumbnail generator.
    priority_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            branding_url: "https://sponsor.ajay.app/api/branding".to_string(),
            thumbnail_url: "https://dearrow-thumb.ajay.app/api/v1/getThumbnail".to_string(),
            branding_timeout_secs: 2,
            thumbnail_timeout_secs: 30,
            priority_key: None,
        }
    }
}

pub(crate) struct DiscordHandler {
    client: BrandingClient,
    settings: GuildSettings,
    tracker: Arc<ReplyTracker>,
}

impl DiscordHandler {
    pub fn new(
        db_pool: SqlitePool,
        config: &crate::Config,
        tracker: Arc<ReplyTracker>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: BrandingClient::new(&config.dearrow)?,
            settings: GuildSettings::new(db_pool),
            tracker,
        })
    }

    fn assembler<'a>(&'a self, platform: &'a SerenityPlatform) -> ReplyAssembler<'a> {
        ReplyAssembler {
            branding: &self.client,
            guilds: &self.settings,
            platform,
            tracker: self.tracker.as_ref(),
        }
    }

    fn log_outcome(message: &IncomingMessage, outcome: anyhow::Result<ReplyOutcome>) {
        match outcome {
            Ok(ReplyOutcome::Replied(reply_id)) => {
                debug!("replied to {} with {reply_id}", message.id)
            }
            Ok(_) => {}
            Err(e) => error!(
                "Failed to reply to {} in {} - {e:?}",
                message.id, message.channel_id
            ),
        }
    }
}

/// Builds the message view out of an update event when the cache has no copy of it.
///
/// `None` without an author, since bot replies must not be answered.
fn incoming_from_update(event: &MessageUpdateEvent) -> Option<IncomingMessage> {
    Some(IncomingMessage {
        id: event.id,
        channel_id: event.channel_id,
        guild_id: event.guild_id?,
        author_is_bot: event.author.as_ref()?.bot,
        flags: event.flags.unwrap_or_else(MessageFlags::empty),
        embeds: event
            .embeds
            .as_ref()?
            .iter()
            .map(SourceEmbed::from)
            .collect(),
    })
}

#[async_trait]
impl SubApplication for DiscordHandler {
    async fn ready(&self, context: &Context, _ready: &Ready) {
        for command in commands::definitions() {
            let name = command.name;
            let command = match serde_json::to_value(command) {
                Ok(command) => command,
                Err(e) => {
                    error!("Failed to serialize command {name} - {e:?}");
                    continue;
                }
            };
            if let Err(e) = context
                .http
                .create_global_application_command(&command)
                .await
            {
                error!("Failed to register command {name} - {e:?}");
            }
        }

        info!("commands registered");
    }

    async fn message(&self, context: &Context, message: &Message) {
        let Some(incoming) = IncomingMessage::from_message(message) else {
            return;
        };

        let platform = SerenityPlatform::new(context);
        let outcome = self.assembler(&platform).handle(&incoming).await;
        Self::log_outcome(&incoming, outcome);
    }

    async fn message_update(
        &self,
        context: &Context,
        new: Option<&Message>,
        event: &MessageUpdateEvent,
    ) {
        let incoming = match new {
            Some(message) => IncomingMessage::from_message(message),
            None => match incoming_from_update(event) {
                Some(incoming) => Some(incoming),
                None if event.guild_id.is_some() && event.embeds.is_some() => {
                    match event.channel_id.message(&context.http, event.id).await {
                        Ok(mut message) => {
                            // fetched messages carry no guild id
                            message.guild_id = message.guild_id.or(event.guild_id);
                            IncomingMessage::from_message(&message)
                        }
                        Err(e) => {
                            error!(
                                "Failed to fetch updated message {} in {} - {e:?}",
                                event.id, event.channel_id
                            );
                            None
                        }
                    }
                }
                None => None,
            },
        };
        let Some(incoming) = incoming else {
            return;
        };

        let platform = SerenityPlatform::new(context);
        let outcome = self
            .assembler(&platform)
            .handle_edit(&incoming, Utc::now())
            .await;
        Self::log_outcome(&incoming, outcome);
    }

    async fn message_delete(&self, context: &Context, channel_id: ChannelId, message_id: MessageId) {
        let platform = SerenityPlatform::new(context);
        if let Some(reply_id) = self
            .assembler(&platform)
            .retract(channel_id, message_id)
            .await
        {
            debug!("retracted reply {reply_id} of deleted message {message_id}");
        }
    }

    async fn application_command_interaction_create(
        &self,
        context: &Context,
        interaction: &ApplicationCommandInteraction,
    ) -> bool {
        let result = match interaction.data.name.as_str() {
            commands::CONFIGURE_COMMAND => {
                commands::handle_configure(&self.settings, context, interaction).await
            }
            commands::BRANDING_COMMAND | commands::FETCH_BRANDING_COMMAND => {
                commands::handle_branding_lookup(&self.client, context, interaction).await
            }
            commands::DELETE_EMBEDS_COMMAND => {
                commands::handle_delete_embeds(&self.tracker, context, interaction).await
            }
            _ => return false,
        };

        if let Err(e) = result {
            error!(
                "Failed to handle command {} - {e:?}",
                interaction.data.name
            );
        }

        true
    }
}
