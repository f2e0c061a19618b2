use anyhow::{Context, Result};
use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

const BUILTINS_ROOT: &str = "builtins";
const PLUGINS_ROOT: &str = "plugins";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtensionKind {
    /// Shipped with the bot, loaded first.
    Builtin,
    /// Optional, loaded after every builtin.
    Plugin,
}

impl ExtensionKind {
    /// Key of the kind in the settings file and in log messages.
    pub fn section(&self) -> &'static str {
        match self {
            Self::Builtin => BUILTINS_ROOT,
            Self::Plugin => PLUGINS_ROOT,
        }
    }

    /// Environment variable relocating the root of this kind. Kept apart
    /// from the `builtins`/`plugins` settings sections.
    pub fn root_var(&self) -> &'static str {
        match self {
            Self::Builtin => "BOT_BUILTINS_DIR",
            Self::Plugin => "BOT_PLUGINS_DIR",
        }
    }

    /// Directory scanned for extensions of this kind.
    pub fn root(&self) -> PathBuf {
        PathBuf::from(std::env::var(self.root_var()).unwrap_or_else(|_| self.section().to_string()))
    }
}

impl Display for ExtensionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Builtin => "builtin",
                Self::Plugin => "plugin",
            }
        )
    }
}

/// An extension directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub kind: ExtensionKind,
    pub name: String,
    pub path: PathBuf,
}

impl Descriptor {
    /// Translations of the extension, if any.
    pub fn langs_dir(&self) -> PathBuf {
        self.path.join("langs")
    }

    /// Settings template merged under `<kind>.<name>`, if any.
    pub fn config_template(&self) -> PathBuf {
        self.path.join("config.yaml")
    }
}

/// Lists the extension directories directly under `root`, sorted by name.
///
/// Entries which aren't directories or whose name starts with `_` or `.`
/// are skipped. A missing root only yields a warning.
pub fn discover(kind: ExtensionKind, root: &Path) -> Result<Vec<Descriptor>> {
    if !root.is_dir() {
        log::warn!(
            "No {} directory found at '{}'",
            kind.section(),
            root.display()
        );
        return Ok(Vec::new());
    }

    let mut descriptors = Vec::new();
    for entry in std::fs::read_dir(root)
        .with_context(|| format!("Failed to read '{}'", root.display()))?
    {
        let entry = entry?;
        // Follows symlinks, linked extension directories count.
        if !entry.path().is_dir() {
            continue;
        }
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(name) => {
                log::warn!("Skipping non UTF-8 {} directory {:?}", kind, name);
                continue;
            }
        };
        if name.starts_with('_') || name.starts_with('.') {
            continue;
        }
        descriptors.push(Descriptor {
            kind,
            name,
            path: entry.path(),
        });
    }
    descriptors.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(descriptors)
}

/// Builtins then plugins, from their default roots.
pub fn discover_all() -> Result<Vec<Descriptor>> {
    let mut descriptors = discover(ExtensionKind::Builtin, &ExtensionKind::Builtin.root())?;
    descriptors.extend(discover(ExtensionKind::Plugin, &ExtensionKind::Plugin.root())?);
    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_private_entries_and_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in &["zeta", "alpha", "_private", ".hidden", "__pycache__"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "not an extension").unwrap();

        let names: Vec<_> = discover(ExtensionKind::Plugin, dir.path())
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[cfg(unix)]
    #[test]
    fn follows_symlinked_directories() {
        let dir = tempfile::tempdir().unwrap();
        let installed = dir.path().join("store").join("modlogs");
        std::fs::create_dir_all(&installed).unwrap();
        let root = dir.path().join("plugins");
        std::fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink(&installed, root.join("modlogs")).unwrap();

        let names: Vec<_> = discover(ExtensionKind::Plugin, &root)
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["modlogs"]);
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let found = discover(ExtensionKind::Builtin, &dir.path().join("nope")).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn descriptor_paths() {
        let descriptor = Descriptor {
            kind: ExtensionKind::Builtin,
            name: "monitoring".to_string(),
            path: PathBuf::from("builtins/monitoring"),
        };
        assert_eq!(
            descriptor.langs_dir(),
            PathBuf::from("builtins/monitoring/langs")
        );
        assert_eq!(
            descriptor.config_template(),
            PathBuf::from("builtins/monitoring/config.yaml")
        );
        assert_eq!(descriptor.kind.section(), "builtins");
        assert_eq!(descriptor.kind.to_string(), "builtin");
    }
}
