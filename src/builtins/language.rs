use async_trait::async_trait;
use serde_json::Value;

use crate::{
    discord::{Command, Context, Data, Error},
    extensions::{Extension, ExtensionKind},
    guild_config::{ConfigOption, OptionKind},
    settings::{CoreSettings, Settings},
};

pub const NAME: &str = "language";
const OPTION: &str = "language";

/// Lets guilds pick the language the bot answers in.
pub struct Language;

#[async_trait]
impl Extension for Language {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Builtin
    }

    fn icon(&self) -> &'static str {
        "🌐"
    }

    fn config_subcommands(&self) -> Vec<Command> {
        vec![language()]
    }

    fn declare_options(&self, settings: &Settings) -> Vec<(String, ConfigOption)> {
        vec![(
            OPTION.to_string(),
            ConfigOption::new(OptionKind::Text, settings.core.default_language.as_str())
                .with_command("language"),
        )]
    }
}

/// Change the language of the bot in this server.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn language(
    ctx: Context<'_>,
    #[description = "language code, e.g. en"] language: String,
) -> Result<(), Error> {
    let guild = ctx
        .guild_id()
        .ok_or_else(|| anyhow::anyhow!("Not in a guild"))?;
    let data = ctx.data();
    let languages = &data.settings.core.languages;
    let language = language.trim().to_lowercase();

    if !languages.contains(&language) {
        let reply = data
            .tr(
                ctx,
                "language.unknown",
                &[("languages", languages.join(", "))],
            )
            .await;
        ctx.say(reply).await?;
        return Ok(());
    }

    data.guild_configs
        .lock()
        .await
        .set_option(guild.get(), OPTION, Value::from(language.as_str()))
        .await?;
    log::info!("Guild {} now speaks '{}'", guild, language);

    // Answer in the new language already
    let reply = data
        .tr(ctx, "language.edited", &[("language", language)])
        .await;
    ctx.say(reply).await?;
    Ok(())
}

/// The language of a guild, the default one when unset or unknown.
pub async fn guild_language(data: &Data, guild: u64) -> String {
    let value = match data.guild_configs.lock().await.get(guild).await {
        Ok(config) => config.get(OPTION).ok().cloned(),
        Err(e) => {
            log::warn!("Failed to read config of guild {}: {}", guild, e);
            None
        }
    };
    resolve(value.as_ref(), &data.settings.core)
}

/// Older configs store an index into the language list instead of a code.
fn resolve(value: Option<&Value>, core: &CoreSettings) -> String {
    let language = match value {
        Some(Value::String(code)) => Some(code.clone()),
        Some(Value::Number(index)) => index
            .as_u64()
            .and_then(|index| core.languages.get(index as usize))
            .cloned(),
        _ => None,
    };

    language
        .filter(|code| core.languages.contains(code))
        .unwrap_or_else(|| core.default_language.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn codes_and_legacy_indexes() {
        let core = CoreSettings::default();
        assert_eq!(resolve(Some(&json!("fr")), &core), "fr");
        assert_eq!(resolve(Some(&json!(1)), &core), "fr");
        assert_eq!(resolve(Some(&json!(0)), &core), "en");
    }

    #[test]
    fn unknown_values_use_default() {
        let core = CoreSettings {
            default_language: "fr".to_string(),
            ..CoreSettings::default()
        };
        assert_eq!(resolve(Some(&json!("tlh")), &core), "fr");
        assert_eq!(resolve(Some(&json!(12)), &core), "fr");
        assert_eq!(resolve(Some(&json!(null)), &core), "fr");
        assert_eq!(resolve(None, &core), "fr");
    }

    #[test]
    fn option_defaults_to_configured_language() {
        let mut settings = Settings::default();
        settings.core.default_language = "fr".to_string();
        let options = Language.declare_options(&settings);

        assert_eq!(options.len(), 1);
        assert_eq!(options[0].0, "language");
        assert_eq!(options[0].1.default, json!("fr"));
        assert_eq!(options[0].1.command.as_deref(), Some("language"));
    }
}
