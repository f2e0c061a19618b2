use std::sync::Arc;

use crate::extensions::Extension;

pub mod modlogs;

/// Every plugin compiled into the bot.
pub fn available() -> Vec<Arc<dyn Extension>> {
    vec![Arc::new(modlogs::Modlogs)]
}
