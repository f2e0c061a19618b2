/// Extensions shipped with the bot
mod builtins;
/// checks for permission to execute a specific command
pub mod checks;
/// Commands available regardless of the loaded extensions
mod commands;
/// discord setup
mod discord;
/// Extension registry and lifecycle
mod extensions;
/// Per guild options
mod guild_config;
/// Translations
mod i18n;
mod logger;
/// Optional extensions
mod plugins;
/// Bot Settings
mod settings;
mod task;

use anyhow::{Context, Result};
use std::sync::Arc;

use builtins::server_config::OptionIndex;
use extensions::{registry, Catalog};
use guild_config::{ConfigManager, ConfigSchema};
use i18n::Translator;
use settings::Settings;

const FALLBACK_LANGUAGE: &str = "en";

#[tokio::main]
async fn main() -> Result<()> {
    logger::init()?;

    let descriptors = registry::discover_all().context("Failed to discover extensions.")?;

    if !Settings::exists() && !Settings::token_from_env() {
        Settings::template(&descriptors)?
            .save()
            .await
            .context("Failed to save default config.")?;
        println!("Created default settings. Please fill out. Exiting...");
        std::process::exit(0);
    }
    let settings = Arc::new(Settings::new(&descriptors).context("Failed to load settings.")?);

    tokio::fs::create_dir_all(&settings.core.config_folder)
        .await
        .context("Failed to create the guild configs folder.")?;

    let option_index = Arc::new(OptionIndex::new());
    let catalog = Arc::new(Catalog::new(
        builtins::available(&option_index)
            .into_iter()
            .chain(plugins::available()),
    ));

    let mut schema = ConfigSchema::new();
    for ext in catalog.iter() {
        schema.declare(ext.name(), ext.declare_options(&settings));
    }
    log::info!("{} guild options declared", schema.len());

    let mut lang_paths = vec![settings.core.langs_path.clone()];
    lang_paths.extend(descriptors.iter().map(|d| d.langs_dir()));
    let translator = Translator::load(&lang_paths, FALLBACK_LANGUAGE)
        .context("Failed to load translations.")?;

    let guild_configs = ConfigManager::new(settings.core.config_folder.clone(), Arc::new(schema));

    discord::run(
        settings,
        descriptors,
        catalog,
        Arc::new(translator),
        guild_configs,
        option_index,
    )
    .await
    .context("Failed to start discord.")
}
