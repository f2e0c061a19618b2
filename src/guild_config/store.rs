use serde_json::Value;
use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{ConfigError, ConfigSchema, Record};

/// Reads and writes guild configs, caching what it has seen.
///
/// A guild without a file gets the defaults. Nothing is written until an
/// option is changed.
#[derive(Debug)]
pub struct ConfigManager {
    folder: PathBuf,
    schema: Arc<ConfigSchema>,
    cache: HashMap<u64, Record>,
}

impl ConfigManager {
    pub fn new(folder: impl Into<PathBuf>, schema: Arc<ConfigSchema>) -> Self {
        Self {
            folder: folder.into(),
            schema,
            cache: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<ConfigSchema> {
        &self.schema
    }

    fn path(&self, guild: u64) -> PathBuf {
        self.folder.join(format!("{}.json", guild))
    }

    /// Guild ids given as text must be numeric.
    pub fn parse_guild_key(key: &str) -> Result<u64, ConfigError> {
        if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::InvalidGuildKey(key.to_string()));
        }
        key.parse()
            .map_err(|_| ConfigError::InvalidGuildKey(key.to_string()))
    }

    /// The config of a guild, defaults filled in.
    pub async fn get(&mut self, guild: u64) -> Result<ServerConfig, ConfigError> {
        if !self.cache.contains_key(&guild) {
            let record = match tokio::fs::read_to_string(self.path(guild)).await {
                Ok(content) => serde_json::from_str(&content)?,
                Err(e) if e.kind() == ErrorKind::NotFound => self.schema.template(),
                Err(e) => return Err(e.into()),
            };
            self.cache.insert(guild, record);
        }

        let mut values = self.schema.template();
        if let Some(cached) = self.cache.get(&guild) {
            for (key, value) in cached {
                if let Some(slot) = values.get_mut(key) {
                    *slot = value.clone();
                }
            }
        }

        Ok(ServerConfig {
            guild_id: guild,
            values,
            schema: Arc::clone(&self.schema),
        })
    }

    /// Replaces the config of a guild. Unknown options are dropped.
    pub async fn set(&mut self, guild: u64, record: Record) -> Result<(), ConfigError> {
        let record: Record = record
            .into_iter()
            .filter(|(key, _)| self.schema.contains(key))
            .collect();

        tokio::fs::create_dir_all(&self.folder).await?;
        let content = serde_json::to_string_pretty(&record)?;
        write_file(&self.path(guild), content.as_bytes()).await?;
        self.cache.insert(guild, record);
        Ok(())
    }

    pub async fn save(&mut self, config: &ServerConfig) -> Result<(), ConfigError> {
        self.set(config.guild_id, config.values.clone()).await
    }

    pub async fn set_option(
        &mut self,
        guild: u64,
        key: &str,
        value: Value,
    ) -> Result<ServerConfig, ConfigError> {
        let mut config = self.get(guild).await?;
        config.set(key, value)?;
        self.save(&config).await?;
        Ok(config)
    }

    pub async fn reset_option(&mut self, guild: u64, key: &str) -> Result<ServerConfig, ConfigError> {
        let mut config = self.get(guild).await?;
        config.reset(key)?;
        self.save(&config).await?;
        Ok(config)
    }

    /// Forgets a guild. A guild without file is fine.
    pub async fn remove(&mut self, guild: u64) -> Result<(), ConfigError> {
        self.cache.remove(&guild);
        match tokio::fs::remove_file(self.path(guild)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a guild has a config on disk.
    pub async fn has(&self, guild: u64) -> bool {
        tokio::fs::metadata(self.path(guild)).await.is_ok()
    }

    /// Guilds with a config on disk, sorted.
    pub async fn guild_ids(&self) -> Result<Vec<u64>, ConfigError> {
        let mut entries = match tokio::fs::read_dir(&self.folder).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| Self::parse_guild_key(stem).ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    pub async fn len(&self) -> Result<usize, ConfigError> {
        Ok(self.guild_ids().await?.len())
    }

    pub async fn update(
        &mut self,
        configs: impl IntoIterator<Item = (u64, Record)>,
    ) -> Result<(), ConfigError> {
        for (guild, record) in configs {
            self.set(guild, record).await?;
        }
        Ok(())
    }
}

async fn write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(content).await?;
    file.sync_all().await
}

/// Config of one guild. Changes only persist through
/// [`ConfigManager::save`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    guild_id: u64,
    values: Record,
    schema: Arc<ConfigSchema>,
}

impl ServerConfig {
    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }

    pub fn get(&self, key: &str) -> Result<&Value, ConfigError> {
        self.values
            .get(key)
            .or_else(|| self.schema.get(key).map(|option| &option.default))
            .ok_or_else(|| ConfigError::UnknownOption(key.to_string()))
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        let option = self
            .schema
            .get(key)
            .ok_or_else(|| ConfigError::UnknownOption(key.to_string()))?;
        if !option.kind.accepts(&value) {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("expected {}", option.kind),
            });
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    /// Back to the default value.
    pub fn reset(&mut self, key: &str) -> Result<(), ConfigError> {
        let default = self
            .schema
            .get(key)
            .map(|option| option.default.clone())
            .ok_or_else(|| ConfigError::UnknownOption(key.to_string()))?;
        self.values.insert(key.to_string(), default);
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Ids stored in a roles, channels or categories option.
    pub fn ids(&self, key: &str) -> Result<Vec<u64>, ConfigError> {
        Ok(self
            .get(key)?
            .as_array()
            .map(|ids| ids.iter().filter_map(Value::as_u64).collect())
            .unwrap_or_default())
    }

    pub fn text(&self, key: &str) -> Result<Option<&str>, ConfigError> {
        Ok(self.get(key)?.as_str())
    }

    pub fn int(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        Ok(self.get(key)?.as_i64())
    }
}
