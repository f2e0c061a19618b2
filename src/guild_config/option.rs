use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use super::{flags::LogsFlags, Record};

/// What kind of value an option holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    Roles,
    Channels,
    Categories,
    Text,
    Emojis,
    ModlogsFlags,
    Int,
}

impl Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Roles => "roles",
                Self::Channels => "channels",
                Self::Categories => "categories",
                Self::Text => "text",
                Self::Emojis => "emojis",
                Self::ModlogsFlags => "modlogs_flags",
                Self::Int => "int",
            }
        )
    }
}

impl FromStr for OptionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "roles" => Ok(Self::Roles),
            "channels" => Ok(Self::Channels),
            "categories" => Ok(Self::Categories),
            "text" => Ok(Self::Text),
            "emojis" => Ok(Self::Emojis),
            "modlogs_flags" => Ok(Self::ModlogsFlags),
            "int" => Ok(Self::Int),
            _ => Err(format!("unknown option kind '{}'", s)),
        }
    }
}

impl OptionKind {
    /// Whether a stored value has the right shape for this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Roles | Self::Channels | Self::Categories => value
                .as_array()
                .map_or(false, |ids| ids.iter().all(Value::is_u64)),
            Self::Emojis => value
                .as_array()
                .map_or(false, |emojis| emojis.iter().all(Value::is_string)),
            Self::Text => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::ModlogsFlags => value.as_u64().map_or(false, LogsFlags::is_valid),
        }
    }

    /// Turns what a user typed into a storable value.
    ///
    /// Lists are separated by spaces or commas. Roles and channels may be
    /// mentions or raw ids, custom emojis are reduced to their id.
    pub fn parse_input(&self, input: &str) -> Result<Value, String> {
        let input = input.trim();
        match self {
            Self::Roles => parse_ids(input, "<@&"),
            Self::Channels | Self::Categories => parse_ids(input, "<#"),
            Self::Emojis => Ok(Value::from(
                tokens(input).map(parse_emoji).collect::<Vec<_>>(),
            )),
            Self::Text => {
                if input.is_empty() {
                    Err("the value can't be empty".to_string())
                } else {
                    Ok(Value::from(input))
                }
            }
            Self::Int => input
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("'{}' is not a number", input)),
            Self::ModlogsFlags => match input.parse::<u64>() {
                Ok(bits) if LogsFlags::is_valid(bits) => Ok(Value::from(bits)),
                Ok(bits) => Err(format!("{} contains unknown flags", bits)),
                Err(_) => LogsFlags::flags_to_int(tokens(input)).map(Value::from),
            },
        }
    }
}

fn tokens(input: &str) -> impl Iterator<Item = &str> {
    input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
}

fn parse_ids(input: &str, mention_prefix: &str) -> Result<Value, String> {
    tokens(input)
        .map(|token| {
            let raw = token
                .strip_prefix(mention_prefix)
                .and_then(|rest| rest.strip_suffix('>'))
                .unwrap_or(token);
            raw.parse::<u64>()
                .map(Value::from)
                .map_err(|_| format!("'{}' is neither a mention nor an id", token))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::from)
}

/// `<:name:id>` and `<a:name:id>` become `id`, anything else is kept as is.
fn parse_emoji(token: &str) -> String {
    token
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .and_then(|inner| inner.rsplit(':').next())
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(token)
        .to_string()
}

/// A guild option declared by an extension.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigOption {
    pub default: Value,
    pub kind: OptionKind,
    /// Name of the `/config` subcommand editing the option, if it has one.
    pub command: Option<String>,
    /// Extension declaring the option.
    pub owner: String,
}

impl ConfigOption {
    pub fn new(kind: OptionKind, default: impl Into<Value>) -> Self {
        Self {
            default: default.into(),
            kind,
            command: None,
            owner: String::new(),
        }
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.command = Some(command.to_string());
        self
    }
}

/// Every option known to the bot.
#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    options: BTreeMap<String, ConfigOption>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the options of `owner`. An option declared twice keeps its
    /// first declaration.
    pub fn declare(&mut self, owner: &str, options: Vec<(String, ConfigOption)>) {
        for (name, mut option) in options {
            if let Some(existing) = self.options.get(&name) {
                log::warn!(
                    "Option '{}' of '{}' is already declared by '{}'",
                    name,
                    owner,
                    existing.owner
                );
                continue;
            }
            if !option.kind.accepts(&option.default) {
                log::warn!(
                    "Default of option '{}' doesn't fit kind {}",
                    name,
                    option.kind
                );
            }
            option.owner = owner.to_string();
            self.options.insert(name, option);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ConfigOption> {
        self.options.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.options.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.options.keys()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// Default value of every option.
    pub fn template(&self) -> Record {
        self.options
            .iter()
            .map(|(name, option)| (name.clone(), option.default.clone()))
            .collect()
    }

    /// Sorted names of the options declared by `owner`.
    pub fn options_owned_by(&self, owner: &str) -> Vec<String> {
        self.options
            .iter()
            .filter(|(_, option)| option.owner == owner)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_from_mentions_and_raw() {
        assert_eq!(
            OptionKind::Roles.parse_input("<@&123> 456,789").unwrap(),
            json!([123, 456, 789])
        );
        assert_eq!(
            OptionKind::Channels.parse_input("<#42>").unwrap(),
            json!([42])
        );
        assert_eq!(OptionKind::Categories.parse_input("").unwrap(), json!([]));
        assert!(OptionKind::Roles.parse_input("<#42>").is_err());
        assert!(OptionKind::Channels.parse_input("general").is_err());
    }

    #[test]
    fn emojis_keep_unicode_and_reduce_custom() {
        assert_eq!(
            OptionKind::Emojis
                .parse_input("👍 <:allay:1234> <a:dance:99>")
                .unwrap(),
            json!(["👍", "1234", "99"])
        );
    }

    #[test]
    fn flags_by_name_or_bits() {
        assert_eq!(
            OptionKind::ModlogsFlags.parse_input("joins, members").unwrap(),
            json!(130)
        );
        assert_eq!(OptionKind::ModlogsFlags.parse_input("3").unwrap(), json!(3));
        assert!(OptionKind::ModlogsFlags.parse_input("1024").is_err());
        assert!(OptionKind::ModlogsFlags.parse_input("weather").is_err());
    }

    #[test]
    fn scalars() {
        assert_eq!(OptionKind::Int.parse_input(" -4 ").unwrap(), json!(-4));
        assert!(OptionKind::Int.parse_input("four").is_err());
        assert_eq!(OptionKind::Text.parse_input(" fr ").unwrap(), json!("fr"));
        assert!(OptionKind::Text.parse_input("  ").is_err());
    }

    #[test]
    fn accepts_by_shape() {
        assert!(OptionKind::Roles.accepts(&json!([1, 2])));
        assert!(!OptionKind::Roles.accepts(&json!(["1"])));
        assert!(!OptionKind::Channels.accepts(&json!(null)));
        assert!(OptionKind::Emojis.accepts(&json!(["👍"])));
        assert!(OptionKind::Text.accepts(&json!("en")));
        assert!(!OptionKind::Text.accepts(&json!(1)));
        assert!(OptionKind::Int.accepts(&json!(-1)));
        assert!(OptionKind::ModlogsFlags.accepts(&json!(511)));
        assert!(!OptionKind::ModlogsFlags.accepts(&json!(512)));
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in &[
            OptionKind::Roles,
            OptionKind::ModlogsFlags,
            OptionKind::Int,
        ] {
            assert_eq!(kind.to_string().parse::<OptionKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn schema_keeps_first_declaration() {
        let mut schema = ConfigSchema::new();
        schema.declare(
            "server_config",
            vec![("admin_roles".to_string(), ConfigOption::new(OptionKind::Roles, json!([])))],
        );
        schema.declare(
            "intruder",
            vec![
                ("admin_roles".to_string(), ConfigOption::new(OptionKind::Int, 0)),
                ("volume".to_string(), ConfigOption::new(OptionKind::Int, 5)),
            ],
        );

        assert_eq!(schema.len(), 2);
        assert_eq!(schema.get("admin_roles").unwrap().owner, "server_config");
        assert_eq!(schema.options_owned_by("intruder"), vec!["volume"]);
        assert_eq!(schema.template().get("volume"), Some(&json!(5)));
    }
}
