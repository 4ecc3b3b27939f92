//! Two independent predicates deciding whether an edit requires a rebuild. Implements §4.4.
//!
//! Shaped like `restart_chooser.rs`: a small lookup built once from `module-info.json`-style
//! manifests, queried per file, repurposed here from "which restart level" to "does this edit
//! require a rebuild".
use crate::file_store::FileStore;
use crate::package_graph::Manifest;
use anyhow::{Context, Result};
use std::path::{Component, Path};

/// `fileChangeRequiresBuild` from §4.4.
pub fn file_change_requires_build(store: &FileStore, file: &Path, project_dir: &Path) -> Result<bool> {
    if file.file_name().map(|n| n == "package.json").unwrap_or(false) {
        return Ok(true);
    }

    let rel = file.strip_prefix(project_dir).unwrap_or(file);
    let components: Vec<&str> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();

    let node_modules_index = match components.iter().position(|c| *c == "node_modules") {
        Some(i) => i,
        None => return Ok(false),
    };
    if components.get(node_modules_index + 1) == Some(&"tns-core-modules") {
        return Ok(false);
    }

    // Walk upward from the deepest ancestor to the immediate node_modules/<pkg> boundary,
    // checking each ancestor's manifest for a framework marker whose platforms subtree the
    // file actually lives under.
    for depth in (node_modules_index + 1..components.len()).rev() {
        let ancestor_rel: std::path::PathBuf = components[..=depth].iter().collect();
        let ancestor_abs = project_dir.join(&ancestor_rel);
        let manifest_path = ancestor_abs.join("package.json");
        if !store.exists(&manifest_path) {
            continue;
        }
        let manifest: Manifest = store
            .read_json(&manifest_path)
            .with_context(|| format!("Parsing manifest at {}", manifest_path.display()))?;
        if manifest.nativescript.is_some() {
            let under_platforms = components[depth + 1..].first() == Some(&"platforms");
            if under_platforms {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// `shouldBuildWhenLivesyncing` from §4.4.
pub fn should_build_when_livesyncing(
    prepare_time: &str,
    latest_build_time: &str,
    live_sync_stamp: Option<&str>,
    changes_summary_requires_build: bool,
) -> bool {
    if prepare_time == latest_build_time {
        return false;
    }
    match live_sync_stamp {
        Some(stamp) => prepare_time != stamp && changes_summary_requires_build,
        None => changes_summary_requires_build,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn package_json_always_requires_build() {
        let project = TempDir::new().unwrap();
        let store = FileStore::new();
        assert!(file_change_requires_build(&store, &project.path().join("package.json"), project.path()).unwrap());
    }

    #[test]
    fn tns_core_modules_never_requires_build() {
        let project = TempDir::new().unwrap();
        let file = project.path().join("node_modules/tns-core-modules/platforms/android/x.so");
        let store = FileStore::new();
        assert!(!file_change_requires_build(&store, &file, project.path()).unwrap());
    }

    #[test]
    fn s5_native_platform_file_requires_build() {
        let project = TempDir::new().unwrap();
        write(
            &project.path().join("node_modules/nat/package.json"),
            r#"{"version": "1.0.0", "dependencies": {}, "nativescript": {"id": "nat", "platforms": {"android": "1.0.0"}}}"#,
        );
        let file = project.path().join("node_modules/nat/platforms/android/libfoo.so");
        let store = FileStore::new();
        assert!(file_change_requires_build(&store, &file, project.path()).unwrap());
    }

    #[test]
    fn non_platform_file_in_framework_package_does_not_require_build() {
        let project = TempDir::new().unwrap();
        write(
            &project.path().join("node_modules/nat/package.json"),
            r#"{"version": "1.0.0", "dependencies": {}, "nativescript": {"id": "nat", "platforms": {"android": "1.0.0"}}}"#,
        );
        let file = project.path().join("node_modules/nat/index.js");
        let store = FileStore::new();
        assert!(!file_change_requires_build(&store, &file, project.path()).unwrap());
    }

    #[test]
    fn livesync_build_suppressed_when_prepare_matches_build() {
        assert!(!should_build_when_livesyncing("t1", "t1", None, true));
    }

    #[test]
    fn livesync_build_required_when_stamp_stale_and_summary_says_so() {
        assert!(should_build_when_livesyncing("t2", "t1", Some("t1"), true));
        assert!(!should_build_when_livesyncing("t2", "t1", Some("t2"), true));
        assert!(!should_build_when_livesyncing("t2", "t1", Some("t1"), false));
    }

    #[test]
    fn livesync_relies_on_summary_without_stamp() {
        assert!(should_build_when_livesyncing("t2", "t1", None, true));
        assert!(!should_build_when_livesyncing("t2", "t1", None, false));
    }
}
