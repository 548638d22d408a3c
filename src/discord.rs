use chrono::{DateTime, Duration, TimeZone, Utc};

use async_trait::async_trait;
use log::{error, info};
use serde::Deserialize;
use serenity::{
    client::{Context, EventHandler},
    model::{
        application::interaction::{Interaction, InteractionType},
        channel::Message,
        event::MessageUpdateEvent,
        gateway::GatewayIntents,
        id::{ChannelId, GuildId, MessageId},
        prelude::{
            interaction::application_command::{ApplicationCommandInteraction, CommandDataOption},
            Ready, ResumedEvent,
        },
    },
    Client,
};

pub mod application_command;

#[async_trait]
pub trait SubApplication {
    async fn ready(&self, _context: &Context, _ready: &Ready) {}
    async fn resume(&self, _context: &Context) {}
    async fn message(&self, _context: &Context, _message: &Message) {}
    /// `new` is only available when the message was cached.
    async fn message_update(
        &self,
        _context: &Context,
        _new: Option<&Message>,
        _event: &MessageUpdateEvent,
    ) {
    }
    async fn message_delete(
        &self,
        _context: &Context,
        _channel_id: ChannelId,
        _message_id: MessageId,
    ) {
    }
    async fn application_command_interaction_create(
        &self,
        _context: &Context,
        _interaction: &ApplicationCommandInteraction,
    ) -> bool {
        false
    }
}

struct Handler {
    applications: Vec<Box<dyn SubApplication + Send + Sync>>,
}

pub trait IntoSnowflakes {
    fn into_snowflakes(self) -> i64;
}

const DISCORD_EPOCH_MILLIS: i64 = 1420070400000;

impl<TZ: TimeZone> IntoSnowflakes for DateTime<TZ> {
    // See https://discord.com/developers/docs/reference#snowflakes
    fn into_snowflakes(self) -> i64 {
        let ts = self.with_timezone(&Utc).timestamp_millis();

        (ts - DISCORD_EPOCH_MILLIS) << 22
    }
}

impl IntoSnowflakes for Duration {
    fn into_snowflakes(self) -> i64 {
        self.num_milliseconds() << 22
    }
}

pub fn from_snowflakes<TZ: TimeZone>(tz: &TZ, snowflakes: i64) -> DateTime<TZ> {
    let millis = (snowflakes >> 22) + DISCORD_EPOCH_MILLIS;
    DateTime::from_timestamp_millis(millis)
        .unwrap_or_default()
        .with_timezone(tz)
}

pub trait CommandHelper {
    fn get_options<const N: usize>(&self, names: &[&str; N]) -> [Option<&CommandDataOption>; N];
}

impl CommandHelper for CommandDataOption {
    fn get_options<const N: usize>(&self, names: &[&str; N]) -> [Option<&CommandDataOption>; N] {
        self.options.get_options(names)
    }
}

impl CommandHelper for Vec<CommandDataOption> {
    fn get_options<const N: usize>(&self, names: &[&str; N]) -> [Option<&CommandDataOption>; N] {
        let mut ret = [None; N];
        for option in self.iter() {
            if let Some(pos) = names.iter().position(|name| name == &option.name) {
                ret[pos] = Some(option);
            }
        }

        ret
    }
}

pub trait CommandDataOptionHelper {
    fn as_str(&self) -> Option<&str>;
    fn as_i64(&self) -> Option<i64>;
    fn as_bool(&self) -> Option<bool>;
}

impl CommandDataOptionHelper for CommandDataOption {
    fn as_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(|v| v.as_str())
    }

    fn as_i64(&self) -> Option<i64> {
        self.value.as_ref().and_then(|v| v.as_i64())
    }

    fn as_bool(&self) -> Option<bool> {
        self.value.as_ref().and_then(|v| v.as_bool())
    }
}

impl<T: CommandDataOptionHelper> CommandDataOptionHelper for Option<&T> {
    fn as_str(&self) -> Option<&str> {
        self.and_then(|o| o.as_str())
    }

    fn as_i64(&self) -> Option<i64> {
        self.and_then(|o| o.as_i64())
    }

    fn as_bool(&self) -> Option<bool> {
        self.and_then(|o| o.as_bool())
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn resume(&self, context: Context, _: ResumedEvent) {
        for app in &self.applications {
            app.resume(&context).await;
        }
    }

    // on connected to discord
    async fn ready(&self, ctx: Context, ready: Ready) {
        for app in &self.applications {
            app.ready(&ctx, &ready).await;
        }

        info!("ready as {} in {} guilds", ready.user.name, ready.guilds.len());
    }

    // run on any message event
    async fn message(&self, ctx: Context, message: Message) {
        if message.guild_id.is_none() {
            return;
        }

        for app in &self.applications {
            app.message(&ctx, &message).await;
        }
    }

    async fn message_update(
        &self,
        ctx: Context,
        _old_if_available: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        if event.guild_id.is_none() {
            return;
        }

        for app in &self.applications {
            app.message_update(&ctx, new.as_ref(), &event).await;
        }
    }

    async fn message_delete(
        &self,
        ctx: Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        if guild_id.is_none() {
            return;
        }

        for app in &self.applications {
            app.message_delete(&ctx, channel_id, deleted_message_id)
                .await;
        }
    }

    // run on firing slash command
    async fn interaction_create(&self, context: Context, interaction: Interaction) {
        if interaction.kind() != InteractionType::ApplicationCommand {
            return;
        }
        let Some(interaction) = interaction.application_command() else {
            return;
        };

        for app in &self.applications {
            if app
                .application_command_interaction_create(&context, &interaction)
                .await
            {
                return;
            }
        }

        error!("Unhandled command {}", interaction.data.name);
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Config {
    token: String,
    application_id: u64,
}

pub(crate) async fn start(
    config: &super::Config,
    sub_applications: Vec<Box<dyn SubApplication + Send + Sync>>,
    mut stop_signal: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let token = &config.discord.token;
    let application_id = config.discord.application_id;

    // prepare serenity(discord api framework)
    let mut client = Client::builder(
        token,
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT,
    )
    .application_id(application_id)
    .event_handler(Handler {
        applications: sub_applications,
    })
    .await?;

    let shard_manager = client.shard_manager.clone();

    // stop the bot when SIGINT occurred.
    tokio::spawn(async move {
        if let Err(e) = stop_signal.recv().await {
            error!("Stop signal is broken - {e:?}");
        }
        info!("stop discord");
        shard_manager.lock().await.shutdown_all().await;
        info!("discord closed");
    });

    client.start().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowflakes_round_trip_to_the_millisecond() {
        let at = Utc.with_ymd_and_hms(2024, 10, 18, 12, 34, 56).unwrap();
        let snowflakes = at.into_snowflakes();

        assert_eq!(from_snowflakes(&Utc, snowflakes), at);
        // worker, process and increment bits don't move the time
        assert_eq!(from_snowflakes(&Utc, snowflakes | 0x3F_FFFF), at);
    }

    #[test]
    fn known_snowflake() {
        // Discord's documentation example
        let created_at = from_snowflakes(&Utc, 175928847299117063);
        assert_eq!(created_at.timestamp_millis(), 1462015105796);
    }
}
