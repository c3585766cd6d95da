use std::collections::HashMap;

use super::{defaults::default_catalog, BlockableApp};

/// Source of truth for which packages count as blocked.
///
/// Exact package ids resolve through a hash index. Family patterns
/// (`com.games.*`) are few, so they are scanned after the exact lookup misses.
#[derive(Debug, Clone, Default)]
pub struct BlockListStore {
    apps: Vec<BlockableApp>,
    index: HashMap<String, usize>,
    families: Vec<usize>,
}

impl BlockListStore {
    /// Builds a store in the given display order. Later duplicates of an id are dropped.
    pub fn from_apps(apps: Vec<BlockableApp>) -> Self {
        let mut store = Self::default();
        for app in apps {
            if store.index.contains_key(&app.id) {
                log::warn!("Duplicate catalog entry {} ignored", app.id);
                continue;
            }
            let position = store.apps.len();
            if app.family_prefix().is_some() {
                store.families.push(position);
            }
            store.index.insert(app.id.clone(), position);
            store.apps.push(app);
        }
        store
    }

    pub fn with_default_catalog() -> Self {
        Self::from_apps(default_catalog())
    }

    pub fn get_all(&self) -> &[BlockableApp] {
        &self.apps
    }

    pub fn get(&self, app_id: &str) -> Option<&BlockableApp> {
        self.index.get(app_id).map(|&i| &self.apps[i])
    }

    /// Maps a foreground package to the catalog entry governing it.
    pub fn resolve(&self, package: &str) -> Option<&BlockableApp> {
        self.resolve_position(package).map(|i| &self.apps[i])
    }

    pub fn is_blocked(&self, package: &str) -> bool {
        self.resolve(package).is_some_and(|app| app.is_blocked)
    }

    pub fn set_blocked(&mut self, app_id: &str, blocked: bool) {
        if let Some(&i) = self.index.get(app_id) {
            self.apps[i].is_blocked = blocked;
        }
    }

    pub fn set_all_blocked(&mut self, blocked: bool) {
        for app in &mut self.apps {
            app.is_blocked = blocked;
        }
    }

    pub fn blocked_count(&self) -> usize {
        self.apps.iter().filter(|app| app.is_blocked).count()
    }

    pub fn reset_attempts(&mut self) {
        for app in &mut self.apps {
            app.attempt_count = 0;
        }
    }

    /// Bumps the attempt counter of a catalog entry and returns the new count.
    pub fn record_attempt(&mut self, app_id: &str) -> Option<u32> {
        let &i = self.index.get(app_id)?;
        let app = &mut self.apps[i];
        app.attempt_count = app.attempt_count.saturating_add(1);
        Some(app.attempt_count)
    }

    fn resolve_position(&self, package: &str) -> Option<usize> {
        if let Some(&i) = self.index.get(package) {
            return Some(i);
        }
        self.families.iter().copied().find(|&i| {
            self.apps[i]
                .family_prefix()
                .is_some_and(|prefix| package.starts_with(prefix))
        })
    }
}
