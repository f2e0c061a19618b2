//! Extensions bundle commands, event listeners and guild options.
//!
//! Every extension is compiled in. The directories under `builtins/` and
//! `plugins/` decide which of them get loaded at startup and provide their
//! translations and settings templates.

pub mod manager;
pub mod registry;

use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;

use crate::{
    discord::{Command, Data, Error},
    guild_config::ConfigOption,
    settings::Settings,
};
pub use manager::ExtensionManager;
pub use registry::{Descriptor, ExtensionKind};

#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("Extension '{0}' is already loaded.")]
    AlreadyLoaded(String),
    #[error("Extension '{0}' is not loaded.")]
    NotLoaded(String),
    #[error("No {kind} named '{name}' is compiled in.")]
    Unknown { kind: ExtensionKind, name: String },
    #[error("Extension '{name}' failed: {error:#}")]
    Hook { name: String, error: Error },
}

/// What an extension gets to see while loading.
#[derive(Clone)]
pub struct LoadContext {
    pub settings: Arc<Settings>,
    /// Absent until connected to discord.
    pub http: Option<Arc<serenity::Http>>,
    /// Absent until connected to discord.
    pub shard_manager: Option<Arc<serenity::ShardManager>>,
    /// Names of the extensions loaded before this one.
    pub loaded: Vec<String>,
}

impl LoadContext {
    pub fn new(settings: Arc<Settings>, http: Option<Arc<serenity::Http>>) -> Self {
        Self {
            settings,
            http,
            shard_manager: None,
            loaded: Vec::new(),
        }
    }

    pub fn with_shard_manager(mut self, shard_manager: Arc<serenity::ShardManager>) -> Self {
        self.shard_manager = Some(shard_manager);
        self
    }
}

#[async_trait]
pub trait Extension: Send + Sync {
    /// Unique name, identical to the extension's directory name.
    fn name(&self) -> &'static str;

    fn kind(&self) -> ExtensionKind;

    fn display_name(&self) -> String {
        self.name().replace('_', " ")
    }

    fn icon(&self) -> &'static str {
        "🧩"
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Top level commands, enabled while the extension is loaded.
    fn commands(&self) -> Vec<Command> {
        Vec::new()
    }

    /// Commands appended below `/config`.
    fn config_subcommands(&self) -> Vec<Command> {
        Vec::new()
    }

    /// Guild options owned by the extension.
    fn declare_options(&self, _settings: &Settings) -> Vec<(String, ConfigOption)> {
        Vec::new()
    }

    async fn on_load(&self, _ctx: &LoadContext) -> Result<(), Error> {
        Ok(())
    }

    async fn on_unload(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Another extension got loaded.
    async fn on_any_load(&self, _other: &dyn Extension) -> Result<(), Error> {
        Ok(())
    }

    /// Another extension got unloaded.
    async fn on_any_unload(&self, _name: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn on_event(
        &self,
        _ctx: &serenity::Context,
        _event: &serenity::FullEvent,
        _data: &Data,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// Every compiled extension, loaded or not.
#[derive(Default)]
pub struct Catalog {
    extensions: BTreeMap<(ExtensionKind, &'static str), Arc<dyn Extension>>,
}

impl Catalog {
    pub fn new(extensions: impl IntoIterator<Item = Arc<dyn Extension>>) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ((ext.kind(), ext.name()), ext))
                .collect(),
        }
    }

    pub fn get(&self, kind: ExtensionKind, name: &str) -> Option<Arc<dyn Extension>> {
        self.extensions
            .iter()
            .find(|((k, n), _)| *k == kind && *n == name)
            .map(|(_, ext)| Arc::clone(ext))
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Extension>> {
        self.extensions.values()
    }

    /// Commands of every extension, tagged with the extension's name so
    /// they can be turned off while it isn't loaded. Config subcommands
    /// are attached to the `config` command.
    pub fn commands(&self) -> Vec<Command> {
        let mut commands = Vec::new();
        let mut config_subcommands = Vec::new();

        for ext in self.iter() {
            for mut command in ext.commands() {
                tag(&mut command, ext.name());
                commands.push(command);
            }
            for mut command in ext.config_subcommands() {
                tag(&mut command, ext.name());
                config_subcommands.push(command);
            }
        }

        match commands.iter_mut().find(|c| c.name == "config") {
            Some(config) => config.subcommands.extend(config_subcommands),
            None if !config_subcommands.is_empty() => {
                log::warn!(
                    "{} config subcommands dropped, no extension provides /config",
                    config_subcommands.len()
                );
            }
            None => {}
        }

        commands
    }
}

fn tag(command: &mut Command, owner: &str) {
    command.category = Some(owner.to_string());
    for sub in &mut command.subcommands {
        tag(sub, owner);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub struct Dummy {
        pub name: &'static str,
        pub kind: ExtensionKind,
    }

    impl Dummy {
        pub fn builtin(name: &'static str) -> Arc<dyn Extension> {
            Arc::new(Self {
                name,
                kind: ExtensionKind::Builtin,
            })
        }
    }

    #[async_trait]
    impl Extension for Dummy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn kind(&self) -> ExtensionKind {
            self.kind
        }
    }

    #[test]
    fn catalog_lookup_respects_kind() {
        let catalog = Catalog::new(vec![Dummy::builtin("language")]);

        assert!(catalog.get(ExtensionKind::Builtin, "language").is_some());
        assert!(catalog.get(ExtensionKind::Plugin, "language").is_none());
        assert!(catalog.get(ExtensionKind::Builtin, "missing").is_none());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn display_name_from_name() {
        let ext = Dummy::builtin("server_config");
        assert_eq!(ext.display_name(), "server config");
    }
}
