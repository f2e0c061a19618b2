use std::fmt::Display;

/// Names of the modlogs categories, the index being the bit.
const FLAGS: [&str; 9] = [
    "messages",
    "joins",
    "invites",
    "voice",
    "moderation",
    "boosts",
    "roles",
    "members",
    "emojis",
];

/// Which kinds of events a guild wants in its modlogs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LogsFlags(u32);

impl LogsFlags {
    pub fn all_names() -> &'static [&'static str] {
        &FLAGS
    }

    /// Bits above the known flags are dropped.
    pub fn from_bits(bits: u64) -> Self {
        Self((bits & Self::mask()) as u32)
    }

    pub fn bits(&self) -> u64 {
        u64::from(self.0)
    }

    fn mask() -> u64 {
        (1 << FLAGS.len()) - 1
    }

    /// Whether `bits` only uses known flags.
    pub fn is_valid(bits: u64) -> bool {
        bits & !Self::mask() == 0
    }

    pub fn flags_to_int<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<u64, String> {
        let mut bits = 0;
        for name in names {
            let index = FLAGS
                .iter()
                .position(|flag| flag.eq_ignore_ascii_case(name))
                .ok_or_else(|| format!("unknown flag '{}'", name))?;
            bits |= 1 << index;
        }
        Ok(bits)
    }

    pub fn int_to_flags(bits: u64) -> Vec<&'static str> {
        FLAGS
            .iter()
            .enumerate()
            .filter(|(index, _)| bits & (1 << index) != 0)
            .map(|(_, name)| *name)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        Self::flags_to_int(std::iter::once(name))
            .map(|bit| self.bits() & bit != 0)
            .unwrap_or(false)
    }

    pub fn names(&self) -> Vec<&'static str> {
        Self::int_to_flags(self.bits())
    }
}

impl Display for LogsFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.names().join(", "))
    }
}
