use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::extensions::registry::{Descriptor, ExtensionKind};

const FILENAME: &str = "settings.yaml";
const ENV_PREFIX: &str = "BOT";
/// Setting the token through the environment skips the first-run setup.
const TOKEN_VAR: &str = "BOT_CORE__TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub core: CoreSettings,
    /// Sections contributed by the `config.yaml` of each builtin.
    pub builtins: BTreeMap<String, Value>,
    /// Sections contributed by the `config.yaml` of each plugin.
    pub plugins: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    /// Discord's bot token
    pub token: String,
    /// Command prefix, the bot's mention always works too.
    pub default_prefix: String,
    /// Language of guilds which never picked one.
    pub default_language: String,
    /// Languages guilds can pick from.
    pub languages: Vec<String>,
    /// Discord accounts allowed to manage the bot itself.
    pub admins: Vec<u64>,
    /// Channel receiving unexpected errors.
    pub error_channel: Option<u64>,
    /// Folder holding one json file per guild.
    pub config_folder: PathBuf,
    /// Translations shipped with the core.
    pub langs_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            core: CoreSettings::default(),
            builtins: BTreeMap::new(),
            plugins: BTreeMap::new(),
        }
    }
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            token: String::from("DISCORD_BOT_TOKEN_HERE"),
            default_prefix: String::from("!"),
            default_language: String::from("en"),
            languages: vec![String::from("en"), String::from("fr")],
            admins: Vec::new(),
            error_channel: None,
            config_folder: PathBuf::from("configs"),
            langs_path: PathBuf::from("langs"),
        }
    }
}

impl CoreSettings {
    pub fn is_bot_admin(&self, user_id: u64) -> bool {
        self.admins.contains(&user_id)
    }
}

impl Settings {
    /// Loads the settings file (`BOT_SETTINGS`, defaults to `settings.yaml`)
    /// on top of the defaults and the templates of the discovered extensions.
    /// Environment variables prefixed with `BOT_` win over everything,
    /// e.g. `BOT_CORE__TOKEN` or `BOT_CORE__ADMINS=1,2`.
    pub fn new(descriptors: &[Descriptor]) -> Result<Self> {
        Self::build(
            Some(&settings_path()),
            descriptors,
            Some(environment()),
        )
    }

    /// Defaults merged with the extension templates, without user input.
    pub fn template(descriptors: &[Descriptor]) -> Result<Self> {
        Self::build(None, descriptors, None)
    }

    fn build(
        path: Option<&Path>,
        descriptors: &[Descriptor],
        environment: Option<Environment>,
    ) -> Result<Self> {
        let defaults =
            serde_yaml::to_string(&Settings::default()).context("Failed to serialize defaults")?;
        let mut builder = Config::builder().add_source(File::from_str(&defaults, FileFormat::Yaml));

        for descriptor in descriptors {
            if let Some(template) = template_source(descriptor)? {
                builder = builder.add_source(File::from_str(&template, FileFormat::Yaml));
            }
        }

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(false));
        }
        if let Some(environment) = environment {
            builder = builder.add_source(environment);
        }

        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .context("Failed to load settings")
    }

    /// Whether a settings file is present on disk.
    pub fn exists() -> bool {
        settings_path().is_file()
    }

    /// Whether the token is provided by the environment.
    pub fn token_from_env() -> bool {
        std::env::var(TOKEN_VAR).is_ok()
    }

    /// Resolves a dotted path such as `core.default_language`.
    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let mut value = serde_yaml::to_value(self).context("Failed to serialize settings")?;
        for key in path.split('.') {
            value = match value {
                Value::Mapping(mut map) => map
                    .remove(key)
                    .with_context(|| format!("Unknown setting '{}'", path))?,
                _ => anyhow::bail!("Unknown setting '{}'", path),
            };
        }
        serde_yaml::from_value(value).with_context(|| format!("Invalid setting '{}'", path))
    }

    /// The typed section of an extension. A missing section deserializes
    /// from an empty map, so `#[serde(default)]` sections get their defaults.
    pub fn extension<T: DeserializeOwned>(&self, kind: ExtensionKind, name: &str) -> Result<T> {
        let sections = match kind {
            ExtensionKind::Builtin => &self.builtins,
            ExtensionKind::Plugin => &self.plugins,
        };
        let value = sections
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::Mapping(Mapping::new()));
        serde_yaml::from_value(value)
            .with_context(|| format!("Invalid settings for {} '{}'", kind, name))
    }

    pub async fn save(&self) -> Result<()> {
        self.save_to(&settings_path()).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(
            serde_yaml::to_string(&self)
                .context("Failed to serialize settings")?
                .as_bytes(),
        )
        .await?;
        file.sync_all().await?;
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("core.admins")
        .with_list_parse_key("core.languages")
}

fn settings_path() -> PathBuf {
    PathBuf::from(std::env::var("BOT_SETTINGS").unwrap_or_else(|_| FILENAME.to_string()))
}

/// Wraps an extension's `config.yaml` under `<builtins|plugins>.<name>`.
fn template_source(descriptor: &Descriptor) -> Result<Option<String>> {
    let path = descriptor.config_template();
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let template: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let mut extension = Mapping::new();
    extension.insert(Value::from(descriptor.name.as_str()), template);
    let mut root = Mapping::new();
    root.insert(
        Value::from(descriptor.kind.section()),
        Value::Mapping(extension),
    );

    Ok(Some(serde_yaml::to_string(&root)?))
}
