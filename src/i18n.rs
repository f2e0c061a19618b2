//! Translations, loaded once from `{locale}.yaml` files.

use anyhow::{Context as _, Result};
use poise::serenity_prelude as serenity;
use serde_yaml::Value;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::discord::Context;

/// Locale of contexts which don't carry one.
pub const DEFAULT_LOCALE: &str = "en-US";
/// Highest count using the `few` plural form.
const PLURAL_FEW: i64 = 5;

/// Anything a locale can be read from.
pub trait HasLocale {
    fn locale(&self) -> Option<String>;
}

impl HasLocale for str {
    fn locale(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl HasLocale for String {
    fn locale(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl HasLocale for serenity::User {
    fn locale(&self) -> Option<String> {
        self.locale.clone()
    }
}

impl HasLocale for serenity::Guild {
    fn locale(&self) -> Option<String> {
        Some(self.preferred_locale.clone())
    }
}

impl HasLocale for serenity::PartialGuild {
    fn locale(&self) -> Option<String> {
        Some(self.preferred_locale.clone())
    }
}

/// A channel speaks the preferred locale of its guild, looked up in the cache.
impl HasLocale for (&serenity::Cache, &serenity::GuildChannel) {
    fn locale(&self) -> Option<String> {
        let (cache, channel) = *self;
        cached_guild_locale(cache, channel.guild_id)
    }
}

fn cached_guild_locale(cache: &serenity::Cache, guild: serenity::GuildId) -> Option<String> {
    cache
        .guild(guild)
        .map(|guild| guild.preferred_locale.clone())
}

impl HasLocale for serenity::CommandInteraction {
    fn locale(&self) -> Option<String> {
        Some(self.locale.clone())
    }
}

impl HasLocale for Context<'_> {
    /// The invoking user's locale for slash commands, else the guild's.
    fn locale(&self) -> Option<String> {
        if let Some(locale) = Context::locale(*self) {
            return Some(locale.to_string());
        }
        self.guild().map(|guild| guild.preferred_locale.clone())
    }
}

/// Locale of `ctx`, `en-US` when it has none.
pub fn locale_of<T: HasLocale + ?Sized>(ctx: &T) -> String {
    ctx.locale()
        .filter(|locale| !locale.is_empty())
        .unwrap_or_else(|| DEFAULT_LOCALE.to_string())
}

#[derive(Debug, Default)]
pub struct Translator {
    /// locale -> dotted key -> template
    catalogs: HashMap<String, HashMap<String, String>>,
    fallback: String,
}

impl Translator {
    /// Reads every `{locale}.yaml` of each path, later paths overriding
    /// earlier ones. Missing paths are skipped.
    pub fn load(paths: &[PathBuf], fallback: &str) -> Result<Self> {
        let mut translator = Self {
            catalogs: HashMap::new(),
            fallback: fallback.to_string(),
        };

        for path in paths {
            if !path.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(path)
                .with_context(|| format!("Failed to read '{}'", path.display()))?
            {
                let file = entry?.path();
                let is_yaml = matches!(
                    file.extension().and_then(|ext| ext.to_str()),
                    Some("yaml") | Some("yml")
                );
                if is_yaml {
                    translator.load_file(&file)?;
                }
            }
        }

        log::debug!(
            "Loaded translations for {} locales",
            translator.catalogs.len()
        );
        Ok(translator)
    }

    fn load_file(&mut self, file: &Path) -> Result<()> {
        let locale = match file.file_stem().and_then(|stem| stem.to_str()) {
            Some(locale) => locale.to_string(),
            None => return Ok(()),
        };
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read '{}'", file.display()))?;
        let document: Value = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse '{}'", file.display()))?;

        // The locale is the root key, files without it are taken as is.
        let root = match document.get(locale.as_str()) {
            Some(root) => root.clone(),
            None => document,
        };

        let catalog = self.catalogs.entry(locale).or_default();
        flatten(String::new(), &root, catalog);
        Ok(())
    }

    pub fn insert(&mut self, locale: &str, key: &str, template: &str) {
        self.catalogs
            .entry(locale.to_string())
            .or_default()
            .insert(key.to_string(), template.to_string());
    }

    /// Locales with at least one translation, sorted.
    pub fn locales(&self) -> Vec<&str> {
        let mut locales: Vec<_> = self.catalogs.keys().map(String::as_str).collect();
        locales.sort_unstable();
        locales
    }

    /// Translates `key` for the locale of `ctx`.
    pub fn tr<T: HasLocale + ?Sized>(&self, ctx: &T, key: &str, args: &[(&str, String)]) -> String {
        self.tr_locale(&locale_of(ctx), key, args)
    }

    /// Looks `key` up in `locale`, its primary language and the fallback, in
    /// that order. `%{name}` is replaced by the matching argument. With a
    /// `count` argument the plural form wins over `key`: `zero`, `one`, `few`
    /// up to five, `many` when the exact form is missing.
    /// Unknown keys come back as is.
    pub fn tr_locale(&self, locale: &str, key: &str, args: &[(&str, String)]) -> String {
        let count = args
            .iter()
            .find(|(name, _)| *name == "count")
            .and_then(|(_, value)| value.parse::<i64>().ok());

        let mut candidates = Vec::with_capacity(3);
        if let Some(count) = count {
            let plural = match count {
                0 => Some("zero"),
                1 => Some("one"),
                c if c <= PLURAL_FEW => Some("few"),
                _ => None,
            };
            if let Some(plural) = plural {
                candidates.push(format!("{}.{}", key, plural));
            }
            candidates.push(format!("{}.many", key));
        }
        candidates.push(key.to_string());

        let template = self.chain(locale).into_iter().find_map(|catalog| {
            candidates
                .iter()
                .find_map(|candidate| catalog.get(candidate))
        });

        match template {
            Some(template) => substitute(template, args),
            None => key.to_string(),
        }
    }

    fn chain(&self, locale: &str) -> Vec<&HashMap<String, String>> {
        let mut locales = vec![locale];
        if let Some((primary, _)) = locale.split_once(|c| c == '-' || c == '_') {
            locales.push(primary);
        }
        locales.push(&self.fallback);

        let mut chain: Vec<&HashMap<String, String>> = Vec::new();
        for locale in locales {
            if let Some(catalog) = self.catalogs.get(locale) {
                if !chain.iter().any(|known| std::ptr::eq(*known, catalog)) {
                    chain.push(catalog);
                }
            }
        }
        chain
    }
}

fn flatten(prefix: String, value: &Value, out: &mut HashMap<String, String>) {
    match value {
        Value::Mapping(map) => {
            for (key, value) in map {
                let key = match key {
                    Value::String(key) => key.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                let path = if prefix.is_empty() {
                    key
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(path, value, out);
            }
        }
        Value::String(text) => {
            out.insert(prefix, text.clone());
        }
        Value::Number(n) => {
            out.insert(prefix, n.to_string());
        }
        Value::Bool(b) => {
            out.insert(prefix, b.to_string());
        }
        _ => {}
    }
}

fn substitute(template: &str, args: &[(&str, String)]) -> String {
    let mut result = template.to_string();
    for (name, value) in args {
        result = result.replace(&format!("%{{{}}}", name), value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> Translator {
        let dir = tempfile::tempdir().unwrap();
        let core = dir.path().join("core");
        let plugin = dir.path().join("plugin");
        std::fs::create_dir_all(&core).unwrap();
        std::fs::create_dir_all(&plugin).unwrap();
        std::fs::write(
            core.join("en.yaml"),
            "en:\n  greet: Hello %{name}!\n  apples:\n    zero: no apple\n    one: one apple\n    many: \"%{count} apples\"\n  only-en: English\n",
        )
        .unwrap();
        std::fs::write(core.join("fr.yaml"), "fr:\n  greet: Bonjour %{name} !\n").unwrap();
        std::fs::write(
            plugin.join("en.yml"),
            "en:\n  sconfig:\n    option-edited: Option %{opt} edited\n  greet: Hi %{name}!\n",
        )
        .unwrap();

        Translator::load(&[core, plugin, dir.path().join("missing")], "en").unwrap()
    }

    #[test]
    fn nested_keys_and_overrides() {
        let t = translator();
        assert_eq!(
            t.tr_locale("en", "sconfig.option-edited", &[("opt", "language".to_string())]),
            "Option language edited"
        );
        assert_eq!(t.tr_locale("en", "greet", &[("name", "Sam".to_string())]), "Hi Sam!");
        assert_eq!(t.locales(), vec!["en", "fr"]);
    }

    #[test]
    fn locale_fallbacks() {
        let t = translator();
        let args = [("name", "Sam".to_string())];
        assert_eq!(t.tr_locale("fr", "greet", &args), "Bonjour Sam !");
        assert_eq!(t.tr_locale("fr-FR", "greet", &args), "Bonjour Sam !");
        assert_eq!(t.tr_locale("fr", "only-en", &[]), "English");
        assert_eq!(t.tr_locale("de", "greet", &args), "Hi Sam!");
        assert_eq!(t.tr("en-US", "only-en", &[]), "English");
    }

    #[test]
    fn missing_key_is_returned() {
        let t = translator();
        assert_eq!(t.tr_locale("en", "nothing.here", &[]), "nothing.here");
    }

    #[test]
    fn plurals() {
        let t = translator();
        let count = |n: i64| [("count", n.to_string())];
        assert_eq!(t.tr_locale("en", "apples", &count(0)), "no apple");
        assert_eq!(t.tr_locale("en", "apples", &count(1)), "one apple");
        assert_eq!(t.tr_locale("en", "apples", &count(7)), "7 apples");
    }

    #[test]
    fn plurals_fall_back_to_many() {
        let mut t = Translator::default();
        t.insert("en", "pears.one", "one pear");
        t.insert("en", "pears.few", "a few pears");
        t.insert("en", "pears.many", "%{count} pears");
        t.insert("en", "plums.one", "one plum");
        t.insert("en", "plums.many", "%{count} plums");

        let count = |n: i64| [("count", n.to_string())];
        assert_eq!(t.tr_locale("en", "pears", &count(3)), "a few pears");
        assert_eq!(t.tr_locale("en", "pears", &count(5)), "a few pears");
        assert_eq!(t.tr_locale("en", "pears", &count(6)), "6 pears");
        assert_eq!(t.tr_locale("en", "pears", &count(0)), "0 pears");
        assert_eq!(t.tr_locale("en", "plums", &count(0)), "0 plums");
        assert_eq!(t.tr_locale("en", "plums", &count(2)), "2 plums");
        assert_eq!(t.tr_locale("en", "plums", &count(1)), "one plum");
    }

    #[test]
    fn default_locale() {
        assert_eq!(locale_of(""), DEFAULT_LOCALE);
        assert_eq!(locale_of("fr"), "fr");
    }

    #[test]
    fn channel_of_uncached_guild_uses_default() {
        let cache = serenity::Cache::new();
        assert_eq!(cached_guild_locale(&cache, serenity::GuildId::new(7)), None);
    }

    fn resolves_locale<T: HasLocale + ?Sized>() {}

    #[test]
    fn command_context_has_locale() {
        resolves_locale::<Context<'static>>();
        resolves_locale::<(&serenity::Cache, &serenity::GuildChannel)>();
    }
}
