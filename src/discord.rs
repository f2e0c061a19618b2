use anyhow::Result;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{
    builtins::{language, server_config::OptionIndex},
    extensions::{Catalog, Descriptor, ExtensionKind, ExtensionManager, LoadContext},
    guild_config::ConfigManager,
    i18n::{self, Translator},
    settings::Settings,
};

pub type Error = anyhow::Error;
pub type Context<'a> = poise::Context<'a, Data, Error>;
pub type Command = poise::Command<Data, Error>;

/// Guilds are only listed by name below this count.
const MAX_LISTED_GUILDS: usize = 20;

pub struct Data {
    pub settings: Arc<Settings>,
    pub guild_configs: Mutex<ConfigManager>,
    pub translator: Arc<Translator>,
    pub extensions: Arc<ExtensionManager>,
    /// Every compiled extension, to load them on demand.
    pub catalog: Arc<Catalog>,
    /// Extension directories found at startup.
    pub descriptors: Vec<Descriptor>,
    /// Extensions whose guild options can be edited.
    pub option_index: Arc<OptionIndex>,
}

impl Data {
    /// Translates for the invoking guild's language, else the user's locale.
    pub async fn tr(&self, ctx: Context<'_>, key: &str, args: &[(&str, String)]) -> String {
        let locale = match ctx.guild_id() {
            Some(guild) => self.guild_language(guild.get()).await,
            None => i18n::locale_of(&ctx),
        };
        self.translator.tr_locale(&locale, key, args)
    }

    /// Translates for a guild's language.
    pub async fn tr_guild(&self, guild: u64, key: &str, args: &[(&str, String)]) -> String {
        let locale = self.guild_language(guild).await;
        self.translator.tr_locale(&locale, key, args)
    }

    /// Language picked by a guild, the default one while the language
    /// builtin is not loaded.
    pub async fn guild_language(&self, guild: u64) -> String {
        if !self.extensions.is_loaded(language::NAME).await {
            return self.settings.core.default_language.clone();
        }
        language::guild_language(self, guild).await
    }

    pub fn load_context(
        &self,
        http: Arc<serenity::Http>,
        shard_manager: Arc<serenity::ShardManager>,
    ) -> LoadContext {
        LoadContext::new(Arc::clone(&self.settings), Some(http)).with_shard_manager(shard_manager)
    }
}

/// Sends an unexpected error to the configured error channel, if any.
pub async fn report_error(http: &serenity::Http, settings: &Settings, message: &str) {
    let channel = match settings.core.error_channel {
        Some(channel) => serenity::ChannelId::new(channel),
        None => return,
    };
    let mut content = serenity::MessageBuilder::new();
    content.push_codeblock_safe(message, None);
    if let Err(e) = channel.say(http, content.build()).await {
        log::warn!("Failed to report error to channel {}: {}", channel, e);
    }
}

pub async fn run(
    settings: Arc<Settings>,
    descriptors: Vec<Descriptor>,
    catalog: Arc<Catalog>,
    translator: Arc<Translator>,
    guild_configs: ConfigManager,
    option_index: Arc<OptionIndex>,
) -> Result<()> {
    if serenity::validate_token(&settings.core.token).is_err() {
        log::error!("Invalid token");
        anyhow::bail!("Invalid token");
    }

    let mut commands = crate::commands::list();
    commands.extend(catalog.commands());

    let extensions = Arc::new(ExtensionManager::new());
    let data = Data {
        settings: Arc::clone(&settings),
        guild_configs: Mutex::new(guild_configs),
        translator,
        extensions: Arc::clone(&extensions),
        catalog,
        descriptors,
        option_index,
    };

    let options = poise::FrameworkOptions {
        commands,
        prefix_options: poise::PrefixFrameworkOptions {
            prefix: Some(settings.core.default_prefix.clone()),
            mention_as_prefix: true,
            case_insensitive_commands: true,
            ..Default::default()
        },
        allowed_mentions: Some(
            serenity::CreateAllowedMentions::new()
                .everyone(false)
                .all_roles(false)
                .all_users(true)
                .replied_user(true),
        ),
        command_check: Some(|ctx| Box::pin(extension_enabled(ctx))),
        pre_command: |ctx| {
            Box::pin(async move {
                log::info!(
                    "Got command '{}' by user '{}'",
                    ctx.invocation_string(),
                    ctx.author().tag()
                );
            })
        },
        on_error: |error| Box::pin(on_error(error)),
        event_handler: |ctx, event, framework, data| {
            Box::pin(event_handler(ctx, event, framework, data))
        },
        ..Default::default()
    };

    let framework = poise::Framework::builder()
        .options(options)
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                log_ready(ctx, ready);

                let load_ctx =
                    data.load_context(Arc::clone(&ctx.http), Arc::clone(framework.shard_manager()));
                let mut failed = Vec::new();
                for kind in [ExtensionKind::Builtin, ExtensionKind::Plugin] {
                    let report = data
                        .extensions
                        .load_all(kind, &data.descriptors, &data.catalog, &load_ctx)
                        .await;
                    failed.extend(report.failed_names);
                }
                if !failed.is_empty() {
                    let message = format!("Extensions failed to load: {}", failed.join(", "));
                    report_error(&ctx.http, &data.settings, &message).await;
                }

                if let Err(e) =
                    poise::builtins::register_globally(ctx, &framework.options().commands).await
                {
                    log::error!("Failed to sync application commands: {}", e);
                }

                ctx.set_presence(None, serenity::OnlineStatus::Online);
                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let mut client = serenity::ClientBuilder::new(&settings.core.token, intents)
        .framework(framework)
        .status(serenity::OnlineStatus::DoNotDisturb)
        .await?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Shutting down...");
            shard_manager.shutdown_all().await;
        }
    });

    let result = client.start().await;
    extensions.remove_all().await;

    match result {
        Err(serenity::Error::Gateway(serenity::GatewayError::InvalidAuthentication)) => {
            log::error!("Invalid token");
            anyhow::bail!("Invalid token")
        }
        other => Ok(other?),
    }
}

fn log_ready(ctx: &serenity::Context, ready: &serenity::Ready) {
    log::info!("Connected as {} ({})", ready.user.name, ready.user.id);

    let guilds = &ready.guilds;
    if guilds.len() < MAX_LISTED_GUILDS {
        let names: Vec<String> = guilds
            .iter()
            .map(|guild| {
                ctx.cache
                    .guild(guild.id)
                    .map(|g| g.name.clone())
                    .unwrap_or_else(|| guild.id.to_string())
            })
            .collect();
        log::info!("Connected on {} guilds: {}", guilds.len(), names.join(", "));
    } else {
        log::info!("Connected on {} guilds", guilds.len());
    }
}

/// Refuses commands whose extension isn't loaded. Core commands carry no
/// category and are always enabled.
async fn extension_enabled(ctx: Context<'_>) -> Result<bool, Error> {
    let owner = match &ctx.command().category {
        Some(owner) => owner.clone(),
        None => return Ok(true),
    };
    if ctx.data().extensions.is_loaded(&owner).await {
        return Ok(true);
    }

    let name = ctx.data().extensions.display_name_with_icon(&owner).await;
    let reply = ctx
        .data()
        .tr(ctx, "checks.disabled", &[("extension", name)])
        .await;
    ctx.say(reply).await?;
    Ok(false)
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            log::error!("Failed to start the bot: {:?}", error)
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            log::error!(
                "Error in command '{}': {:?}",
                ctx.command().qualified_name,
                error
            );
            let data = ctx.data();
            report_error(
                ctx.http(),
                &data.settings,
                &format!("{}: {:#}", ctx.invocation_string(), error),
            )
            .await;
            let reply = data.tr(ctx, "errors.unknown", &[]).await;
            let _ = ctx.say(reply).await;
        }
        // Checks answer by themselves
        poise::FrameworkError::CommandCheckFailed { error: None, .. } => {}
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                log::error!("Error while handling error: {}", e)
            }
        }
    }
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::GuildDelete { incomplete, .. } if !incomplete.unavailable => {
            log::info!("Left guild {}, removing its config", incomplete.id);
            data.guild_configs
                .lock()
                .await
                .remove(incomplete.id.get())
                .await?;
        }
        serenity::FullEvent::Resume { .. } => {
            log::info!("Connection to discord resumed.");
        }
        _ => {}
    }

    for ext in data.extensions.in_load_order().await {
        if let Err(e) = ext.on_event(ctx, event, data).await {
            log::error!("'{}' failed to handle an event: {:#}", ext.name(), e);
        }
    }

    Ok(())
}
