use anyhow::Context as _;
use log::error;
use reqwest::StatusCode;
use serenity::{
    client::Context,
    model::{
        application::interaction::{
            application_command::ApplicationCommandInteraction, InteractionResponseType,
        },
        id::{GuildId, MessageId, UserId},
        Permissions,
    },
};

use super::{
    branding::SourceEmbed,
    client::{self, BrandingClient, RawBranding},
    guild::{GuildSettings, OriginalTitleMode, ThumbnailMode},
    tracker::ReplyTracker,
    video::{find_video_id, video_id_from_embed},
};
use crate::discord::{application_command::*, CommandDataOptionHelper, CommandHelper};

pub const CONFIGURE_COMMAND: &str = "configure";
pub const BRANDING_COMMAND: &str = "branding";
pub const FETCH_BRANDING_COMMAND: &str = "Fetch branding";
pub const DELETE_EMBEDS_COMMAND: &str = "Delete embeds";

/// Longest embed description Discord accepts.
const LENGTH_LIMIT: usize = 4096;
const BRANDING_COLOUR: u32 = 0x001BFF;

fn mode_option<'a>(choices: Vec<ApplicationCommandOptionChoice<'a>>) -> ApplicationCommandOption<'a> {
    ApplicationCommandOption {
        kind: ApplicationCommandOptionType::Integer,
        name: "mode",
        description: "The new mode",
        required: Some(true),
        choices,
        ..Default::default()
    }
}

fn settings_group<'a>(
    name: &'a str,
    description: &'a str,
    choices: Vec<ApplicationCommandOptionChoice<'a>>,
) -> ApplicationCommandOption<'a> {
    ApplicationCommandOption {
        kind: ApplicationCommandOptionType::SubCommandGroup,
        name,
        description,
        options: vec![
            ApplicationCommandOption {
                kind: ApplicationCommandOptionType::SubCommand,
                name: "current",
                description: "Show the current mode",
                ..Default::default()
            },
            ApplicationCommandOption {
                kind: ApplicationCommandOptionType::SubCommand,
                name: "set",
                description: "Change the mode",
                options: vec![mode_option(choices)],
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

/// Every command the bot registers.
pub fn definitions() -> Vec<ApplicationCommand<'static>> {
    let thumbnail_choices = ThumbnailMode::ALL
        .into_iter()
        .map(|mode| ApplicationCommandOptionChoice {
            name: mode.name(),
            value: serde_json::json!(mode.as_i64()),
        })
        .collect();
    let title_choices = OriginalTitleMode::ALL
        .into_iter()
        .map(|mode| ApplicationCommandOptionChoice {
            name: mode.name(),
            value: serde_json::json!(mode.as_i64()),
        })
        .collect();

    vec![
        ApplicationCommand {
            name: CONFIGURE_COMMAND,
            description: "Configure the bot for this server",
            options: vec![
                settings_group(
                    "thumbnails",
                    "What to show when a video has no submitted thumbnail",
                    thumbnail_choices,
                ),
                settings_group(
                    "titles",
                    "Whether to show the original title under replaced ones",
                    title_choices,
                ),
            ],
            default_member_permissions: Some(Permissions::MANAGE_GUILD.bits().to_string()),
            dm_permission: Some(false),
            ..Default::default()
        },
        ApplicationCommand {
            name: BRANDING_COMMAND,
            description: "Show the DeArrow branding data of a video",
            options: vec![
                ApplicationCommandOption {
                    kind: ApplicationCommandOptionType::String,
                    name: "video",
                    description: "Video ID or link",
                    required: Some(true),
                    ..Default::default()
                },
                ApplicationCommandOption {
                    kind: ApplicationCommandOptionType::Boolean,
                    name: "hide",
                    description: "Only show the response to you (default: true)",
                    required: Some(false),
                    ..Default::default()
                },
            ],
            ..Default::default()
        },
        ApplicationCommand {
            kind: ApplicationCommandType::Message,
            name: FETCH_BRANDING_COMMAND,
            ..Default::default()
        },
        ApplicationCommand {
            kind: ApplicationCommandType::Message,
            name: DELETE_EMBEDS_COMMAND,
            dm_permission: Some(false),
            ..Default::default()
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureRequest {
    CurrentThumbnailMode,
    CurrentTitleMode,
    SetThumbnailMode(ThumbnailMode),
    SetTitleMode(OriginalTitleMode),
}

impl ConfigureRequest {
    pub fn parse(group: &str, subcommand: &str, mode: Option<i64>) -> Option<Self> {
        Some(match (group, subcommand) {
            ("thumbnails", "current") => Self::CurrentThumbnailMode,
            ("titles", "current") => Self::CurrentTitleMode,
            ("thumbnails", "set") => Self::SetThumbnailMode(ThumbnailMode::from_i64(mode?)?),
            ("titles", "set") => Self::SetTitleMode(OriginalTitleMode::from_i64(mode?)?),
            _ => return None,
        })
    }

    async fn run(self, settings: &GuildSettings, guild_id: GuildId) -> String {
        match self {
            Self::CurrentThumbnailMode | Self::CurrentTitleMode => {
                match settings.get(guild_id).await {
                    Ok(config) => format!(
                        "Current mode is set to **{}**.",
                        if self == Self::CurrentThumbnailMode {
                            config.thumbnail_mode.name()
                        } else {
                            config.title_mode.name()
                        }
                    ),
                    Err(e) => {
                        error!("Failed to get config of guild {guild_id} - {e:?}");
                        "There was an error while getting the guild configuration.".to_string()
                    }
                }
            }
            Self::SetThumbnailMode(mode) => {
                match settings.set_thumbnail_mode(guild_id, mode).await {
                    Ok(()) => format!("Mode has been set to **{mode}**."),
                    Err(e) => {
                        error!("Failed to update thumbnail mode of guild {guild_id} to {mode:?} - {e:?}");
                        "There was an error while updating the thumbnail mode.".to_string()
                    }
                }
            }
            Self::SetTitleMode(mode) => match settings.set_title_mode(guild_id, mode).await {
                Ok(()) => format!("Mode has been set to **{mode}**."),
                Err(e) => {
                    error!("Failed to update title mode of guild {guild_id} to {mode:?} - {e:?}");
                    "There was an error while updating the title mode.".to_string()
                }
            },
        }
    }
}

/// Video id of a message targeted by the context menu command.
pub fn message_video_id(embeds: &[SourceEmbed], content: &str) -> Option<String> {
    embeds
        .first()
        .and_then(video_id_from_embed)
        .or_else(|| find_video_id(content).map(str::to_string))
}

#[derive(Debug, PartialEq, Eq)]
pub enum LookupReply {
    Message(String),
    /// Embed description; visibility follows the caller's choice.
    Embed(String),
}

/// Turns a raw branding lookup into what the invoker gets to see.
pub fn lookup_reply(
    result: client::Result<RawBranding>,
    timeout_secs: u64,
) -> anyhow::Result<LookupReply> {
    let raw = match result {
        Ok(raw) => raw,
        Err(e) if e.is_timeout() => {
            return Ok(LookupReply::Message(format!(
                "DeArrow API failed to respond within {timeout_secs} seconds."
            )))
        }
        Err(e) => return Err(e).context("Failed to fetch branding"),
    };

    if raw.status != StatusCode::OK && raw.status != StatusCode::NOT_FOUND {
        return Ok(LookupReply::Message(format!(
            "DeArrow API returned a non-OK code: **{}**",
            raw.status.as_u16()
        )));
    }

    let body: serde_json::Value =
        serde_json::from_slice(&raw.body).context("Branding response is not JSON")?;
    let content = format!("```json\n{}\n```", serde_json::to_string_pretty(&body)?);
    let length = content.chars().count();
    if length > LENGTH_LIMIT {
        return Ok(LookupReply::Message(format!(
            "Response is longer than **{LENGTH_LIMIT}** chars (**{length}**). See the full response [here]({}).",
            raw.url
        )));
    }

    Ok(LookupReply::Embed(content))
}

/// Parent message of a bot reply, or the reason it can't be removed.
pub fn reply_parent(
    author: UserId,
    reference: Option<MessageId>,
    bot: UserId,
) -> Result<MessageId, &'static str> {
    let parent = reference.ok_or("Message is not a reply.")?;
    if author != bot {
        return Err("Message is not a DeArrow reply.");
    }

    Ok(parent)
}

async fn respond(
    context: &Context,
    interaction: &ApplicationCommandInteraction,
    content: impl ToString,
) -> serenity::Result<()> {
    interaction
        .create_interaction_response(context, |r| {
            r.kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|d| d.content(content).ephemeral(true))
        })
        .await
}

pub async fn handle_configure(
    settings: &GuildSettings,
    context: &Context,
    interaction: &ApplicationCommandInteraction,
) -> serenity::Result<()> {
    let Some(guild_id) = interaction.guild_id else {
        return respond(context, interaction, "This command can only be used in servers.").await;
    };

    let Some((group, subcommand)) = interaction
        .data
        .options
        .first()
        .and_then(|group| Some((group, group.options.first()?)))
    else {
        return respond(context, interaction, "Unknown command.").await;
    };
    let [mode] = subcommand.options.get_options(&["mode"]);

    let Some(request) = ConfigureRequest::parse(&group.name, &subcommand.name, mode.as_i64())
    else {
        return respond(context, interaction, "Unknown mode.").await;
    };
    let content = request.run(settings, guild_id).await;

    respond(context, interaction, content).await
}

pub async fn handle_branding_lookup(
    client: &BrandingClient,
    context: &Context,
    interaction: &ApplicationCommandInteraction,
) -> serenity::Result<()> {
    let (video_id, hide) = if interaction.data.name == BRANDING_COMMAND {
        let [video, hide] = interaction.data.options.get_options(&["video", "hide"]);
        (
            video.as_str().and_then(find_video_id).map(str::to_string),
            hide.as_bool().unwrap_or(true),
        )
    } else {
        let video_id = interaction
            .data
            .resolved
            .messages
            .values()
            .next()
            .and_then(|message| {
                let embeds: Vec<SourceEmbed> = message.embeds.iter().map(SourceEmbed::from).collect();
                message_video_id(&embeds, &message.content)
            });
        (video_id, true)
    };

    let Some(video_id) = video_id else {
        return respond(context, interaction, "Cannot extract video ID from input.").await;
    };

    let result = client.fetch_branding_raw(&video_id, true).await;
    match lookup_reply(result, client.branding_timeout().as_secs()) {
        Ok(LookupReply::Message(content)) => respond(context, interaction, content).await,
        Ok(LookupReply::Embed(content)) => {
            interaction
                .create_interaction_response(context, |r| {
                    r.kind(InteractionResponseType::ChannelMessageWithSource)
                        .interaction_response_data(|d| {
                            d.embed(|e| e.colour(BRANDING_COLOUR).description(content))
                                .ephemeral(hide)
                        })
                })
                .await
        }
        Err(e) => {
            error!("Failed to look up branding of {video_id} - {e:?}");
            respond(
                context,
                interaction,
                format!("There was an error while handling the command: {e}"),
            )
            .await
        }
    }
}

pub async fn handle_delete_embeds(
    tracker: &ReplyTracker,
    context: &Context,
    interaction: &ApplicationCommandInteraction,
) -> serenity::Result<()> {
    let Some(target) = interaction.data.resolved.messages.values().next() else {
        return respond(context, interaction, "Message is not a reply.").await;
    };
    let reference = target
        .message_reference
        .as_ref()
        .and_then(|reference| reference.message_id);
    let parent_id = match reply_parent(target.author.id, reference, context.cache.current_user_id())
    {
        Ok(parent_id) => parent_id,
        Err(reason) => return respond(context, interaction, reason).await,
    };

    let parent = match interaction.channel_id.message(context, parent_id).await {
        Ok(parent) => parent,
        Err(e) => {
            error!("Failed to fetch parent {parent_id} of {} - {e:?}", target.id);
            return respond(context, interaction, "Failed to fetch the parent message.").await;
        }
    };
    if parent.author.id != interaction.user.id {
        return respond(
            context,
            interaction,
            "Only the message author can delete DeArrow embeds.",
        )
        .await;
    }

    respond(context, interaction, "Deleting DeArrow embeds.").await?;
    tracker.untrack(parent_id);
    interaction
        .channel_id
        .delete_message(context, target.id)
        .await
}
