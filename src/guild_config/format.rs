use poise::serenity_prelude as serenity;
use serde_json::Value;

use super::{LogsFlags, OptionKind};

/// Discord embeds a single message can carry.
pub const EMBEDS_PER_MESSAGE: usize = 10;

/// Resolves ids to names for display.
pub trait NameLookup {
    fn role_name(&self, id: u64) -> Option<String>;
    fn channel_name(&self, id: u64) -> Option<String>;
    fn emoji_name(&self, id: u64) -> Option<String>;
}

impl NameLookup for serenity::Guild {
    fn role_name(&self, id: u64) -> Option<String> {
        self.roles
            .get(&serenity::RoleId::new(id))
            .map(|role| role.name.clone())
    }

    fn channel_name(&self, id: u64) -> Option<String> {
        self.channels
            .get(&serenity::ChannelId::new(id))
            .map(|channel| channel.name.clone())
    }

    fn emoji_name(&self, id: u64) -> Option<String> {
        self.emojis
            .get(&serenity::EmojiId::new(id))
            .map(|emoji| emoji.name.clone())
    }
}

/// Human readable value of an option.
///
/// With `mention` set, roles and channels are rendered as discord mentions,
/// otherwise by name. Ids that no longer resolve are left out.
pub fn format_value(kind: OptionKind, value: &Value, guild: &dyn NameLookup, mention: bool) -> String {
    let ids = || -> Vec<u64> {
        value
            .as_array()
            .map(|ids| ids.iter().filter_map(Value::as_u64).collect())
            .unwrap_or_default()
    };
    let separator = if mention { " " } else { " | " };

    match kind {
        OptionKind::Roles => ids()
            .into_iter()
            .filter_map(|id| {
                let name = guild.role_name(id)?;
                Some(if mention { format!("<@&{}>", id) } else { name })
            })
            .collect::<Vec<_>>()
            .join(separator),
        OptionKind::Channels => ids()
            .into_iter()
            .filter_map(|id| {
                let name = guild.channel_name(id)?;
                Some(if mention { format!("<#{}>", id) } else { name })
            })
            .collect::<Vec<_>>()
            .join(separator),
        OptionKind::Categories => ids()
            .into_iter()
            .filter_map(|id| guild.channel_name(id))
            .collect::<Vec<_>>()
            .join(" | "),
        OptionKind::Emojis => value
            .as_array()
            .map(|emojis| {
                emojis
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|emoji| match emoji.parse::<u64>() {
                        Ok(id) => guild
                            .emoji_name(id)
                            .map(|name| format!(":{}:", name))
                            .unwrap_or_else(|| ":deleted_emoji:".to_string()),
                        Err(_) => emoji.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default(),
        OptionKind::ModlogsFlags => value
            .as_u64()
            .map(|bits| LogsFlags::from_bits(bits).to_string())
            .unwrap_or_default(),
        OptionKind::Int | OptionKind::Text => match value {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        },
    }
}

/// Options of one extension, ready to display.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub lines: Vec<(String, String)>,
}

/// Renders every section as an aligned `key: value` code block. Columns are
/// shared by all sections so they line up across embeds.
pub fn render_sections(sections: &[Section]) -> Vec<(String, String)> {
    let lines = || sections.iter().flat_map(|section| section.lines.iter());
    let key_width = lines().map(|(k, _)| k.chars().count()).max().unwrap_or(0) + 3;
    let value_width = lines().map(|(_, v)| v.chars().count()).max().unwrap_or(0) + 1;

    sections
        .iter()
        .filter(|section| !section.lines.is_empty())
        .map(|section| {
            let body: String = section
                .lines
                .iter()
                .map(|(key, value)| {
                    format!(
                        "{:<kw$}{:<vw$}\n",
                        format!("{}:", key),
                        format!(" {}", value),
                        kw = key_width,
                        vw = value_width
                    )
                })
                .collect();
            (section.title.clone(), format!("```yml\n{}```", body))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Names;

    impl NameLookup for Names {
        fn role_name(&self, id: u64) -> Option<String> {
            match id {
                1 => Some("mods".to_string()),
                2 => Some("admins".to_string()),
                _ => None,
            }
        }

        fn channel_name(&self, id: u64) -> Option<String> {
            match id {
                10 => Some("general".to_string()),
                11 => Some("logs".to_string()),
                _ => None,
            }
        }

        fn emoji_name(&self, id: u64) -> Option<String> {
            match id {
                100 => Some("allay".to_string()),
                _ => None,
            }
        }
    }

    #[test]
    fn roles_and_channels() {
        let roles = json!([1, 2, 3]);
        assert_eq!(format_value(OptionKind::Roles, &roles, &Names, false), "mods | admins");
        assert_eq!(format_value(OptionKind::Roles, &roles, &Names, true), "<@&1> <@&2>");
        assert_eq!(
            format_value(OptionKind::Channels, &json!([11]), &Names, true),
            "<#11>"
        );
        assert_eq!(
            format_value(OptionKind::Categories, &json!([10, 11]), &Names, true),
            "general | logs"
        );
        assert_eq!(format_value(OptionKind::Roles, &json!([]), &Names, false), "");
    }

    #[test]
    fn emojis_flags_and_scalars() {
        assert_eq!(
            format_value(OptionKind::Emojis, &json!(["👍", "100", "5"]), &Names, false),
            "👍 :allay: :deleted_emoji:"
        );
        assert_eq!(
            format_value(OptionKind::ModlogsFlags, &json!(3), &Names, false),
            "messages, joins"
        );
        assert_eq!(format_value(OptionKind::Int, &json!(42), &Names, false), "42");
        assert_eq!(format_value(OptionKind::Text, &json!("fr"), &Names, false), "fr");
    }

    #[test]
    fn sections_share_alignment() {
        let sections = vec![
            Section {
                title: "server config".to_string(),
                lines: vec![("admin_roles".to_string(), "mods".to_string())],
            },
            Section {
                title: "empty".to_string(),
                lines: Vec::new(),
            },
            Section {
                title: "language".to_string(),
                lines: vec![("language".to_string(), "fr".to_string())],
            },
        ];

        let rendered = render_sections(&sections);
        assert_eq!(rendered.len(), 2);
        // longest key is 11 wide, longest value 4 wide
        assert_eq!(rendered[0].1, "```yml\nadmin_roles:   mods\n```");
        assert_eq!(rendered[1].1, "```yml\nlanguage:      fr  \n```");
    }
}
