//! Persists and reads the small per-platform `prepare-info` record. Implements §4.5.
//!
//! Grounded on `tracking.rs::Config::load_or_default`/`save`'s JSON-file-in-a-well-known-
//! location pattern (there: `.adevice_tracking.json` next to the product-out tree; here:
//! `.nsprepareinfo` next to the platform's native project).
use crate::file_store::FileStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PrepareInfo {
    pub time: String,
    pub bundle: bool,
    pub release: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeFlags {
    pub app_files_changed: bool,
    pub app_resources_changed: bool,
    pub modules_changed: bool,
    pub config_changed: bool,
    pub package_changed: bool,
    pub native_changed: bool,
}

impl ChangeFlags {
    pub fn any(&self) -> bool {
        self.app_files_changed
            || self.app_resources_changed
            || self.modules_changed
            || self.config_changed
            || self.package_changed
            || self.native_changed
    }

    fn all_true() -> ChangeFlags {
        ChangeFlags {
            app_files_changed: true,
            app_resources_changed: true,
            modules_changed: true,
            config_changed: true,
            package_changed: true,
            native_changed: true,
        }
    }
}

pub struct PrepareOptions {
    pub bundle: bool,
    pub release: bool,
}

pub fn path(platform_root: &Path) -> PathBuf {
    platform_root.join(".nsprepareinfo")
}

pub fn load_or_default(store: &FileStore, platform_root: &Path) -> Result<PrepareInfo> {
    let p = path(platform_root);
    if !store.exists(&p) {
        return Ok(PrepareInfo::default());
    }
    store.read_json(&p)
}

pub fn save(store: &FileStore, platform_root: &Path, info: &PrepareInfo) -> Result<()> {
    store.write_json(&path(platform_root), info)
}

/// Reconciles the stored record against `options` and `flags`, rewriting `.nsprepareinfo` iff
/// at least one change flag is set afterward. Returns the (possibly updated) record.
pub fn reconcile(
    store: &FileStore,
    platform_root: &Path,
    options: &PrepareOptions,
    flags: ChangeFlags,
) -> Result<PrepareInfo> {
    let mut info = load_or_default(store, platform_root)?;
    let mut flags = flags;

    if options.bundle != info.bundle || options.release != info.release {
        flags = ChangeFlags::all_true();
        info.bundle = options.bundle;
        info.release = options.release;
    }

    if flags.any() {
        info.time = now_stamp();
        save(store, platform_root, &info)?;
    }

    Ok(info)
}

fn now_stamp() -> String {
    let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    since_epoch.as_millis().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let info = load_or_default(&FileStore::new(), dir.path()).unwrap();
        assert_eq!(PrepareInfo::default(), info);
    }

    #[test]
    fn reconcile_forces_all_flags_on_option_change() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();
        let options = PrepareOptions { bundle: true, release: false };
        let info = reconcile(&store, dir.path(), &options, ChangeFlags::default()).unwrap();
        assert!(!info.time.is_empty());
        assert!(info.bundle);
    }

    #[test]
    fn reconcile_skips_rewrite_when_nothing_changed() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();
        let options = PrepareOptions { bundle: false, release: false };
        let first = reconcile(&store, dir.path(), &options, ChangeFlags::default()).unwrap();
        assert!(first.time.is_empty());
        assert!(!store.exists(&path(dir.path())));
    }

    #[test]
    fn reconcile_refreshes_time_when_a_flag_fires() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();
        let options = PrepareOptions { bundle: false, release: false };
        let flags = ChangeFlags { app_files_changed: true, ..Default::default() };
        let info = reconcile(&store, dir.path(), &options, flags).unwrap();
        assert!(!info.time.is_empty());
        let reloaded = load_or_default(&store, dir.path()).unwrap();
        assert_eq!(info, reloaded);
    }
}
