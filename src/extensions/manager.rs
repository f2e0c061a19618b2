use linked_hash_set::LinkedHashSet;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use tokio::sync::{Mutex, RwLock};

use super::{Catalog, Descriptor, Extension, ExtensionError, ExtensionKind, LoadContext};

/// Outcome of loading every extension of a kind.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub failed: usize,
    pub failed_names: Vec<String>,
}

#[derive(Default)]
struct Loaded {
    /// Load order
    order: LinkedHashSet<String>,
    extensions: HashMap<String, Arc<dyn Extension>>,
}

/// Loaded extensions and their lifecycle.
#[derive(Default)]
pub struct ExtensionManager {
    loaded: RwLock<Loaded>,
    /// Extensions which failed to load and haven't been loaded since.
    failed: RwLock<BTreeSet<String>>,
    /// Serializes loads and unloads.
    lifecycle: Mutex<()>,
}

impl ExtensionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every descriptor of `kind` in order. Failures are logged and
    /// don't stop the remaining ones.
    pub async fn load_all(
        &self,
        kind: ExtensionKind,
        descriptors: &[Descriptor],
        catalog: &Catalog,
        ctx: &LoadContext,
    ) -> LoadReport {
        let mut report = LoadReport::default();

        for descriptor in descriptors.iter().filter(|d| d.kind == kind) {
            let result = match catalog.get(kind, &descriptor.name) {
                Some(ext) => self.add(ext, ctx).await,
                None => Err(ExtensionError::Unknown {
                    kind,
                    name: descriptor.name.clone(),
                }),
            };

            match result {
                Ok(()) => report.loaded += 1,
                Err(e) => {
                    log::error!("Failed to load extension: {}", descriptor.name);
                    log::error!("{}", e);
                    report.failed += 1;
                    report.failed_names.push(descriptor.name.clone());
                    self.failed.write().await.insert(descriptor.name.clone());
                }
            }
        }

        log::info!(
            "{} {} loaded, {} {} failed",
            report.loaded,
            kind.section(),
            report.failed,
            kind.section()
        );
        report
    }

    /// Loads an extension then tells every other loaded extension about it.
    pub async fn add(
        &self,
        ext: Arc<dyn Extension>,
        ctx: &LoadContext,
    ) -> Result<(), ExtensionError> {
        let _lifecycle = self.lifecycle.lock().await;
        let name = ext.name().to_string();

        if self.is_loaded(&name).await {
            return Err(ExtensionError::AlreadyLoaded(name));
        }

        let ctx = LoadContext {
            loaded: self.loaded().await,
            ..ctx.clone()
        };
        ext.on_load(&ctx)
            .await
            .map_err(|error| ExtensionError::Hook {
                name: name.clone(),
                error,
            })?;

        let others = {
            let mut loaded = self.loaded.write().await;
            let others: Vec<_> = loaded.extensions.values().cloned().collect();
            loaded.order.insert(name.clone());
            loaded.extensions.insert(name.clone(), Arc::clone(&ext));
            others
        };
        self.failed.write().await.remove(&name);
        log::info!("Loaded {} '{}'", ext.kind(), name);

        for other in others {
            if let Err(e) = other.on_any_load(ext.as_ref()).await {
                log::error!(
                    "'{}' failed to handle the load of '{}': {:#}",
                    other.name(),
                    name,
                    e
                );
            }
        }

        Ok(())
    }

    /// Unloads an extension then tells the remaining ones about it.
    pub async fn remove(&self, name: &str) -> Result<(), ExtensionError> {
        let _lifecycle = self.lifecycle.lock().await;

        let (ext, remaining) = {
            let mut loaded = self.loaded.write().await;
            let ext = loaded
                .extensions
                .remove(name)
                .ok_or_else(|| ExtensionError::NotLoaded(name.to_string()))?;
            loaded.order.remove(name);
            let remaining: Vec<_> = loaded.extensions.values().cloned().collect();
            (ext, remaining)
        };

        if let Err(e) = ext.on_unload().await {
            log::error!("'{}' failed to unload cleanly: {:#}", name, e);
        }
        log::info!("Unloaded {} '{}'", ext.kind(), name);

        for other in remaining {
            if let Err(e) = other.on_any_unload(name).await {
                log::error!(
                    "'{}' failed to handle the unload of '{}': {:#}",
                    other.name(),
                    name,
                    e
                );
            }
        }

        Ok(())
    }

    /// Unloads everything, most recently loaded first.
    pub async fn remove_all(&self) {
        let names: Vec<String> = {
            let loaded = self.loaded.read().await;
            loaded.order.iter().rev().cloned().collect()
        };
        for name in names {
            if let Err(e) = self.remove(&name).await {
                log::warn!("{}", e);
            }
        }
    }

    pub async fn is_loaded(&self, name: &str) -> bool {
        self.loaded.read().await.extensions.contains_key(name)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Extension>> {
        self.loaded.read().await.extensions.get(name).cloned()
    }

    /// Names of the loaded extensions, sorted.
    pub async fn loaded(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .loaded
            .read()
            .await
            .extensions
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Extensions which failed to load, sorted.
    pub async fn failed(&self) -> Vec<String> {
        self.failed.read().await.iter().cloned().collect()
    }

    /// Loaded extensions in load order.
    pub async fn in_load_order(&self) -> Vec<Arc<dyn Extension>> {
        let loaded = self.loaded.read().await;
        loaded
            .order
            .iter()
            .filter_map(|name| loaded.extensions.get(name).cloned())
            .collect()
    }

    /// e.g. `⚙️ server config`, or the bare name when it isn't loaded.
    pub async fn display_name_with_icon(&self, name: &str) -> String {
        match self.get(name).await {
            Some(ext) => format!("{} {}", ext.icon(), ext.display_name()),
            None => name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{discord::Error, settings::Settings};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Records every hook call into a shared journal.
    struct Recorder {
        name: &'static str,
        kind: ExtensionKind,
        fail_load: bool,
        fail_notifications: bool,
        journal: Arc<StdMutex<Vec<String>>>,
    }

    impl Recorder {
        fn new(name: &'static str, journal: &Arc<StdMutex<Vec<String>>>) -> Self {
            Self {
                name,
                kind: ExtensionKind::Builtin,
                fail_load: false,
                fail_notifications: false,
                journal: Arc::clone(journal),
            }
        }

        fn record(&self, entry: String) {
            self.journal.lock().unwrap().push(entry);
        }
    }

    #[async_trait]
    impl Extension for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn kind(&self) -> ExtensionKind {
            self.kind
        }

        async fn on_load(&self, ctx: &LoadContext) -> Result<(), Error> {
            self.record(format!("{} load after {:?}", self.name, ctx.loaded));
            if self.fail_load {
                anyhow::bail!("broken");
            }
            Ok(())
        }

        async fn on_unload(&self) -> Result<(), Error> {
            self.record(format!("{} unload", self.name));
            Ok(())
        }

        async fn on_any_load(&self, other: &dyn Extension) -> Result<(), Error> {
            self.record(format!("{} saw load of {}", self.name, other.name()));
            if self.fail_notifications {
                anyhow::bail!("notification failure");
            }
            Ok(())
        }

        async fn on_any_unload(&self, name: &str) -> Result<(), Error> {
            self.record(format!("{} saw unload of {}", self.name, name));
            Ok(())
        }
    }

    fn ctx() -> LoadContext {
        LoadContext::new(Arc::new(Settings::default()), None)
    }

    fn journal() -> Arc<StdMutex<Vec<String>>> {
        Arc::new(StdMutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn add_notifies_only_others() {
        let journal = journal();
        let manager = ExtensionManager::new();

        manager
            .add(Arc::new(Recorder::new("a", &journal)), &ctx())
            .await
            .unwrap();
        manager
            .add(Arc::new(Recorder::new("b", &journal)), &ctx())
            .await
            .unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            vec![
                "a load after []",
                "b load after [\"a\"]",
                "a saw load of b",
            ]
        );
        assert_eq!(manager.loaded().await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn duplicates_are_refused() {
        let journal = journal();
        let manager = ExtensionManager::new();
        manager
            .add(Arc::new(Recorder::new("a", &journal)), &ctx())
            .await
            .unwrap();

        let err = manager
            .add(Arc::new(Recorder::new("a", &journal)), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtensionError::AlreadyLoaded(name) if name == "a"));
        assert_eq!(journal.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_notification_does_not_abort_load() {
        let journal = journal();
        let manager = ExtensionManager::new();
        let mut noisy = Recorder::new("noisy", &journal);
        noisy.fail_notifications = true;
        manager.add(Arc::new(noisy), &ctx()).await.unwrap();

        manager
            .add(Arc::new(Recorder::new("quiet", &journal)), &ctx())
            .await
            .unwrap();
        assert!(manager.is_loaded("quiet").await);
    }

    #[tokio::test]
    async fn remove_notifies_remaining() {
        let journal = journal();
        let manager = ExtensionManager::new();
        for name in &["a", "b", "c"] {
            manager
                .add(Arc::new(Recorder::new(name, &journal)), &ctx())
                .await
                .unwrap();
        }
        journal.lock().unwrap().clear();

        manager.remove("b").await.unwrap();

        let mut entries = journal.lock().unwrap().clone();
        assert_eq!(entries.remove(0), "b unload");
        entries.sort();
        assert_eq!(entries, vec!["a saw unload of b", "c saw unload of b"]);
        assert!(!manager.is_loaded("b").await);

        let err = manager.remove("b").await.unwrap_err();
        assert!(matches!(err, ExtensionError::NotLoaded(_)));
    }

    #[tokio::test]
    async fn load_all_tolerates_failures() {
        let journal = journal();
        let mut broken = Recorder::new("broken", &journal);
        broken.fail_load = true;
        let catalog = Catalog::new(vec![
            Arc::new(Recorder::new("good", &journal)) as Arc<dyn Extension>,
            Arc::new(broken),
        ]);
        let descriptors: Vec<_> = ["broken", "good", "not_compiled"]
            .iter()
            .map(|name| Descriptor {
                kind: ExtensionKind::Builtin,
                name: name.to_string(),
                path: std::path::PathBuf::from("builtins").join(name),
            })
            .collect();

        let manager = ExtensionManager::new();
        let report = manager
            .load_all(ExtensionKind::Builtin, &descriptors, &catalog, &ctx())
            .await;

        assert_eq!(report.loaded, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.failed_names, vec!["broken", "not_compiled"]);
        assert_eq!(manager.loaded().await, vec!["good"]);
        assert_eq!(manager.failed().await, vec!["broken", "not_compiled"]);

        let plugins = manager
            .load_all(ExtensionKind::Plugin, &descriptors, &catalog, &ctx())
            .await;
        assert_eq!(plugins, LoadReport::default());
    }

    #[tokio::test]
    async fn later_load_clears_failure() {
        let journal = journal();
        let descriptors = vec![Descriptor {
            kind: ExtensionKind::Plugin,
            name: "late".to_string(),
            path: std::path::PathBuf::from("plugins/late"),
        }];
        let manager = ExtensionManager::new();
        manager
            .load_all(ExtensionKind::Plugin, &descriptors, &Catalog::default(), &ctx())
            .await;
        assert_eq!(manager.failed().await, vec!["late"]);

        manager
            .add(Arc::new(Recorder::new("late", &journal)), &ctx())
            .await
            .unwrap();
        assert!(manager.failed().await.is_empty());
    }

    #[tokio::test]
    async fn remove_all_reverses_load_order() {
        let journal = journal();
        let manager = ExtensionManager::new();
        for name in &["first", "second"] {
            manager
                .add(Arc::new(Recorder::new(name, &journal)), &ctx())
                .await
                .unwrap();
        }
        journal.lock().unwrap().clear();

        manager.remove_all().await;

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["second unload", "first saw unload of second", "first unload"]
        );
        assert!(manager.loaded().await.is_empty());
    }

    #[tokio::test]
    async fn display_name_with_icon() {
        let manager = ExtensionManager::new();
        manager
            .add(crate::extensions::tests::Dummy::builtin("server_config"), &ctx())
            .await
            .unwrap();

        assert_eq!(
            manager.display_name_with_icon("server_config").await,
            "🧩 server config"
        );
        assert_eq!(manager.display_name_with_icon("absent").await, "absent");
    }
}
