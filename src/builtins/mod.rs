//! Extensions shipped with the bot, loaded before any plugin.

pub mod language;
pub mod monitoring;
pub mod server_config;

use std::sync::Arc;

use crate::extensions::Extension;
use server_config::OptionIndex;

/// Every compiled builtin.
pub fn available(option_index: &Arc<OptionIndex>) -> Vec<Arc<dyn Extension>> {
    vec![
        Arc::new(server_config::ServerConfig::new(Arc::clone(option_index))),
        Arc::new(language::Language),
        Arc::new(monitoring::Monitoring::new()),
    ]
}
