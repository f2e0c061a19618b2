use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use serde_json::Value;

use crate::{
    discord::{Command, Context, Data, Error},
    extensions::{Extension, ExtensionKind},
    guild_config::{ConfigOption, LogsFlags, OptionKind, ServerConfig},
    settings::Settings,
};

pub const NAME: &str = "modlogs";
const CHANNELS: &str = "modlogs_channels";
const FLAGS: &str = "modlogs_flags";

const JOIN_COLOUR: u32 = 0x2ECC71;
const LEAVE_COLOUR: u32 = 0xE67E22;
const DELETE_COLOUR: u32 = 0xE74C3C;

/// Posts moderation events of a guild to its log channels.
pub struct Modlogs;

#[async_trait]
impl Extension for Modlogs {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Plugin
    }

    fn icon(&self) -> &'static str {
        "📜"
    }

    fn commands(&self) -> Vec<Command> {
        vec![modlogs()]
    }

    fn declare_options(&self, _settings: &Settings) -> Vec<(String, ConfigOption)> {
        vec![
            (
                CHANNELS.to_string(),
                ConfigOption::new(OptionKind::Channels, Value::Array(Vec::new())),
            ),
            (
                FLAGS.to_string(),
                ConfigOption::new(OptionKind::ModlogsFlags, 0),
            ),
        ]
    }

    async fn on_event(
        &self,
        ctx: &serenity::Context,
        event: &serenity::FullEvent,
        data: &Data,
    ) -> Result<(), Error> {
        match event {
            serenity::FullEvent::GuildMemberAddition { new_member } => {
                let guild = new_member.guild_id.get();
                let args = [
                    ("user", new_member.user.tag()),
                    ("id", new_member.user.id.to_string()),
                ];
                let text = data.tr_guild(guild, "modlogs.member-join", &args).await;
                post(ctx, data, guild, "joins", text, JOIN_COLOUR).await
            }
            serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
                let guild = guild_id.get();
                let args = [("user", user.tag()), ("id", user.id.to_string())];
                let text = data.tr_guild(guild, "modlogs.member-leave", &args).await;
                post(ctx, data, guild, "members", text, LEAVE_COLOUR).await
            }
            serenity::FullEvent::MessageDelete {
                channel_id,
                deleted_message_id,
                guild_id: Some(guild_id),
            } => {
                let guild = guild_id.get();
                let args = [
                    ("channel", format!("<#{}>", channel_id)),
                    ("id", deleted_message_id.to_string()),
                ];
                let text = data.tr_guild(guild, "modlogs.message-delete", &args).await;
                post(ctx, data, guild, "messages", text, DELETE_COLOUR).await
            }
            _ => Ok(()),
        }
    }
}

/// Channels an event of kind `flag` goes to, none when the guild
/// didn't enable that kind.
fn targets(config: &ServerConfig, flag: &str) -> Vec<u64> {
    let bits = config
        .get(FLAGS)
        .ok()
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if !LogsFlags::from_bits(bits).contains(flag) {
        return Vec::new();
    }
    config.ids(CHANNELS).unwrap_or_default()
}

async fn post(
    ctx: &serenity::Context,
    data: &Data,
    guild: u64,
    flag: &str,
    text: String,
    colour: u32,
) -> Result<(), Error> {
    let config = data.guild_configs.lock().await.get(guild).await?;
    for channel in targets(&config, flag) {
        let embed = serenity::CreateEmbed::new()
            .description(&text)
            .colour(colour)
            .timestamp(serenity::Timestamp::now());
        if let Err(e) = serenity::ChannelId::new(channel)
            .send_message(ctx, serenity::CreateMessage::new().embed(embed))
            .await
        {
            log::warn!("Failed to post modlog in channel {}: {}", channel, e);
        }
    }
    Ok(())
}

/// Choose which events end up in the modlogs.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_server_manager",
    subcommands("enable", "disable", "list")
)]
pub async fn modlogs(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Log more kinds of events.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_server_manager"
)]
pub async fn enable(
    ctx: Context<'_>,
    #[description = "kinds of events, e.g. joins members"]
    #[rest]
    flags: String,
) -> Result<(), Error> {
    update_flags(ctx, &flags, true).await
}

/// Log fewer kinds of events.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_server_manager"
)]
pub async fn disable(
    ctx: Context<'_>,
    #[description = "kinds of events, e.g. joins members"]
    #[rest]
    flags: String,
) -> Result<(), Error> {
    update_flags(ctx, &flags, false).await
}

/// Show which kinds of events are logged.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_server_manager"
)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild = guild_id(ctx)?;
    let data = ctx.data();
    let config = data.guild_configs.lock().await.get(guild).await?;
    let enabled = LogsFlags::from_bits(config.get(FLAGS)?.as_u64().unwrap_or(0));

    let mut response = serenity::MessageBuilder::new();
    for name in LogsFlags::all_names() {
        let mark = if enabled.contains(name) { "✅" } else { "❌" };
        response.push(format!("{} ", mark)).push_mono_line(*name);
    }
    let title = data.tr(ctx, "modlogs.flags-list", &[]).await;
    ctx.say(format!("**{}**\n{}", title, response.build()))
        .await?;
    Ok(())
}

fn guild_id(ctx: Context<'_>) -> Result<u64, Error> {
    ctx.guild_id()
        .map(|guild| guild.get())
        .ok_or_else(|| anyhow::anyhow!("Not in a guild"))
}

/// Bits of `current` with `names` switched on or off.
fn apply_flags(current: u64, names: &str, enable: bool) -> Result<u64, String> {
    let changed = LogsFlags::flags_to_int(
        names
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|name| !name.is_empty()),
    )?;
    Ok(if enable {
        current | changed
    } else {
        current & !changed
    })
}

async fn update_flags(ctx: Context<'_>, names: &str, enable: bool) -> Result<(), Error> {
    let guild = guild_id(ctx)?;
    let data = ctx.data();

    let reply = {
        let mut configs = data.guild_configs.lock().await;
        let current = configs.get(guild).await?.get(FLAGS)?.as_u64().unwrap_or(0);
        match apply_flags(current, names, enable) {
            Ok(bits) => {
                configs.set_option(guild, FLAGS, Value::from(bits)).await?;
                Ok(LogsFlags::from_bits(bits).to_string())
            }
            Err(reason) => Err(reason),
        }
    };

    let reply = match reply {
        Ok(flags) => {
            data.tr(ctx, "modlogs.flags-updated", &[("flags", flags)])
                .await
        }
        Err(reason) => {
            data.tr(
                ctx,
                "sconfig.invalid-value",
                &[("opt", FLAGS.to_string()), ("reason", reason)],
            )
            .await
        }
    };
    ctx.say(reply).await?;
    Ok(())
}
