use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use serde_json::Value;
use std::{collections::BTreeSet, sync::Arc, sync::RwLock};

use crate::{
    discord::{Command, Context, Error},
    extensions::{Extension, ExtensionKind, LoadContext},
    guild_config::{
        format::{format_value, render_sections, Section, EMBEDS_PER_MESSAGE},
        ConfigError, ConfigOption, OptionKind,
    },
    settings::Settings,
};

pub const NAME: &str = "server_config";
const EMBED_COLOUR: u32 = 0x2F3136;

/// Extensions whose options are currently editable, by name.
#[derive(Debug, Default)]
pub struct OptionIndex {
    owners: RwLock<BTreeSet<String>>,
}

impl OptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, owner: &str) {
        if let Ok(mut owners) = self.owners.write() {
            owners.insert(owner.to_string());
        }
    }

    pub fn remove(&self, owner: &str) {
        if let Ok(mut owners) = self.owners.write() {
            owners.remove(owner);
        }
    }

    pub fn contains(&self, owner: &str) -> bool {
        self.owners
            .read()
            .map(|owners| owners.contains(owner))
            .unwrap_or(false)
    }

    /// Sorted owners
    pub fn owners(&self) -> Vec<String> {
        self.owners
            .read()
            .map(|owners| owners.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Lets guild admins view and edit their guild's options.
pub struct ServerConfig {
    index: Arc<OptionIndex>,
}

impl ServerConfig {
    pub fn new(index: Arc<OptionIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Extension for ServerConfig {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Builtin
    }

    fn icon(&self) -> &'static str {
        "⚙️"
    }

    fn commands(&self) -> Vec<Command> {
        vec![config()]
    }

    fn declare_options(&self, _settings: &Settings) -> Vec<(String, ConfigOption)> {
        vec![(
            "admin_roles".to_string(),
            ConfigOption::new(OptionKind::Roles, Value::Array(Vec::new())),
        )]
    }

    async fn on_load(&self, ctx: &LoadContext) -> Result<(), Error> {
        for owner in &ctx.loaded {
            self.index.insert(owner);
        }
        self.index.insert(NAME);
        Ok(())
    }

    async fn on_unload(&self) -> Result<(), Error> {
        for owner in self.index.owners() {
            self.index.remove(&owner);
        }
        Ok(())
    }

    async fn on_any_load(&self, other: &dyn Extension) -> Result<(), Error> {
        self.index.insert(other.name());
        Ok(())
    }

    async fn on_any_unload(&self, name: &str) -> Result<(), Error> {
        self.index.remove(name);
        Ok(())
    }
}

/// Edit your server configuration.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin",
    subcommands("show", "set", "reset")
)]
pub async fn config(ctx: Context<'_>) -> Result<(), Error> {
    // Slash commands can't invoke the root, `!config` alone shows everything.
    show_config(ctx).await
}

/// Show the configuration of this server.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn show(ctx: Context<'_>) -> Result<(), Error> {
    show_config(ctx).await
}

/// Change an option.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn set(
    ctx: Context<'_>,
    #[description = "option to edit"] option: String,
    #[description = "new value"]
    #[rest]
    value: String,
) -> Result<(), Error> {
    let guild = guild_id(ctx)?;
    let data = ctx.data();

    let kind = match editable_option(ctx, &option).await {
        Some(option) => option.kind,
        None => {
            let reply = data
                .tr(ctx, "sconfig.option-notfound", &[("opt", option)])
                .await;
            ctx.say(reply).await?;
            return Ok(());
        }
    };
    if kind == OptionKind::Roles && !crate::checks::is_roles_manager(ctx).await? {
        return Ok(());
    }

    let value = match kind.parse_input(&value) {
        Ok(value) => value,
        Err(reason) => {
            let reply = data
                .tr(
                    ctx,
                    "sconfig.invalid-value",
                    &[("opt", option), ("reason", reason)],
                )
                .await;
            ctx.say(reply).await?;
            return Ok(());
        }
    };

    let reply = edit_config(ctx, guild, &option, Some(value)).await?;
    ctx.say(reply).await?;
    Ok(())
}

/// Reset an option to its default value.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn reset(
    ctx: Context<'_>,
    #[description = "option to reset"] option: String,
) -> Result<(), Error> {
    let guild = guild_id(ctx)?;

    let reply = if editable_option(ctx, &option).await.is_some() {
        edit_config(ctx, guild, &option, None).await?
    } else {
        ctx.data()
            .tr(ctx, "sconfig.option-notfound", &[("opt", option)])
            .await
    };
    ctx.say(reply).await?;
    Ok(())
}

fn guild_id(ctx: Context<'_>) -> Result<u64, Error> {
    ctx.guild_id()
        .map(|guild| guild.get())
        .ok_or_else(|| anyhow::anyhow!("Not in a guild"))
}

/// An option of a loaded extension.
async fn editable_option(ctx: Context<'_>, key: &str) -> Option<ConfigOption> {
    let data = ctx.data();
    let option = data.guild_configs.lock().await.schema().get(key).cloned()?;
    if data.option_index.contains(&option.owner) {
        Some(option)
    } else {
        None
    }
}

/// Sets or, without value, resets an option. Returns the reply.
async fn edit_config(
    ctx: Context<'_>,
    guild: u64,
    key: &str,
    value: Option<Value>,
) -> Result<String, Error> {
    let data = ctx.data();
    let opt = ("opt", key.to_string());
    let resetting = value.is_none();

    let result = {
        let mut configs = data.guild_configs.lock().await;
        match value {
            Some(value) => configs.set_option(guild, key, value).await,
            None => configs.reset_option(guild, key).await,
        }
    };

    let reply = match result {
        Ok(_) if resetting => {
            log::info!("Guild {} reset '{}'", guild, key);
            data.tr(ctx, "sconfig.option-reset", &[opt]).await
        }
        Ok(_) => {
            log::info!("Guild {} edited '{}'", guild, key);
            data.tr(ctx, "sconfig.option-edited", &[opt]).await
        }
        Err(ConfigError::UnknownOption(_)) => {
            data.tr(ctx, "sconfig.option-notfound", &[opt]).await
        }
        Err(ConfigError::InvalidValue { reason, .. }) => {
            data.tr(ctx, "sconfig.invalid-value", &[opt, ("reason", reason)])
                .await
        }
        Err(e) => return Err(e.into()),
    };
    Ok(reply)
}

async fn show_config(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let data = ctx.data();

    let (config, schema) = {
        let mut configs = data.guild_configs.lock().await;
        (configs.get(guild_id).await?, Arc::clone(configs.schema()))
    };
    let guild = ctx
        .guild()
        .map(|guild| (*guild).clone())
        .ok_or_else(|| anyhow::anyhow!("Guild {} is not cached", guild_id))?;

    let mut sections = Vec::new();
    for owner in data.option_index.owners() {
        let lines = schema
            .options_owned_by(&owner)
            .into_iter()
            .filter_map(|key| {
                let kind = schema.get(&key)?.kind;
                let value = config.get(&key).ok()?;
                let shown = format_value(kind, value, &guild, false);
                Some((key, shown))
            })
            .collect();
        sections.push(Section {
            title: data.extensions.display_name_with_icon(&owner).await,
            lines,
        });
    }

    let rendered = render_sections(&sections);
    if rendered.is_empty() {
        let reply = data.tr(ctx, "sconfig.empty", &[]).await;
        ctx.say(reply).await?;
        return Ok(());
    }

    for chunk in rendered.chunks(EMBEDS_PER_MESSAGE) {
        let mut reply = poise::CreateReply::default();
        for (title, body) in chunk {
            reply = reply.embed(
                serenity::CreateEmbed::new()
                    .title(title)
                    .description(body)
                    .colour(EMBED_COLOUR),
            );
        }
        ctx.send(reply).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::tests::Dummy;

    #[tokio::test]
    async fn index_follows_lifecycle() {
        let index = Arc::new(OptionIndex::new());
        let ext = ServerConfig::new(Arc::clone(&index));
        let mut ctx = LoadContext::new(Arc::new(Settings::default()), None);
        ctx.loaded = vec!["language".to_string()];

        ext.on_load(&ctx).await.unwrap();
        assert_eq!(index.owners(), vec!["language", "server_config"]);

        ext.on_any_load(Dummy::builtin("modlogs").as_ref())
            .await
            .unwrap();
        assert!(index.contains("modlogs"));

        ext.on_any_unload("language").await.unwrap();
        assert_eq!(index.owners(), vec!["modlogs", "server_config"]);

        ext.on_unload().await.unwrap();
        assert!(index.owners().is_empty());
    }

    #[test]
    fn declares_admin_roles() {
        let index = Arc::new(OptionIndex::new());
        let options = ServerConfig::new(index).declare_options(&Settings::default());
        assert_eq!(options[0].0, "admin_roles");
        assert_eq!(options[0].1.kind, OptionKind::Roles);
    }
}
