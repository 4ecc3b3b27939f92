//! Computes where each script file should land and diffs the desired state against what is
//! already on disk. Implements §4.3: `build_delta` (desired state), `rebuild_delta` (reality
//! diff), `apply` (ordered execution).
//!
//! Generalizes `fingerprint.rs::diff`'s two-set comparison into the four-set `{mkdir, copy,
//! rmfile, rmdir}` model, and carries `device.rs::mkdir_comes_first_rm_dfs`'s apply-ordering
//! rule over to a plain directory tree instead of adb push/rm commands.
use crate::file_store::{EntryKind, FileStore};
use crate::package_graph::PackageGraph;
use crate::path_util::{self, OutputLayout, Platform};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delta {
    /// Each entry is an absolute path ending in `/`.
    pub mkdir: BTreeSet<String>,
    /// Absolute target path -> absolute source path.
    pub copy: BTreeMap<String, PathBuf>,
    pub rmfile: BTreeSet<String>,
    pub rmdir: BTreeSet<String>,
}

impl Delta {
    pub fn changed_scripts(&self) -> bool {
        !self.copy.is_empty() || !self.rmfile.is_empty()
    }
}

/// Desired-state pass: walks the inventory, never touches disk.
pub fn build_delta(graph: &PackageGraph, output: &OutputLayout, platform: Platform) -> Delta {
    let mut delta = Delta::default();

    for dir in &graph.app.directories {
        let full = output.app.join(dir.trim_end_matches('/'));
        delta.mkdir.insert(with_sep(&full));
    }
    for file in &graph.app.script_files {
        let target = output.app.join(&file.path);
        insert_copy(&mut delta, &target, &file.absolute_path);
    }

    for name in graph.dependencies.keys() {
        let pack = match graph.resolve(name) {
            Some(p) if p.is_available() => p,
            _ => continue,
        };

        let mut acc = output.modules.clone();
        for segment in pack.name.split('/') {
            acc = acc.join(segment);
            delta.mkdir.insert(with_sep(&acc));
        }
        for dir in &pack.directories {
            let full = output.modules.join(&pack.name).join(dir.trim_end_matches('/'));
            delta.mkdir.insert(with_sep(&full));
        }

        for file in &pack.script_files {
            if path_util::has_other_platform_suffix(&file.name, platform) {
                continue;
            }
            let stripped_name = path_util::strip_current_platform_suffix(&file.name, platform);
            let target_rel = match file.path.parent() {
                Some(p) if p != Path::new("") => p.join(&stripped_name),
                _ => PathBuf::from(&stripped_name),
            };
            let target = output.modules.join(&pack.name).join(target_rel);
            insert_copy(&mut delta, &target, &file.absolute_path);
        }
    }

    delta
}

fn insert_copy(delta: &mut Delta, target: &Path, source: &Path) {
    let key = plain(target);
    if delta.copy.contains_key(&key) {
        log::warn!("Duplicate copy target {}, last writer wins", key);
    }
    delta.copy.insert(key, source.to_path_buf());
}

/// Reality-diff pass: scans `output.app`/`output.modules` and reconciles against `build_delta`'s
/// result. Implements §4.3's `rebuildDelta`.
pub fn rebuild_delta(
    store: &FileStore,
    graph: &PackageGraph,
    output: &OutputLayout,
    platform: Platform,
) -> Result<Delta> {
    let mut delta = build_delta(graph, output, platform);

    let mut roots = vec![output.app.clone()];
    if !output.modules.starts_with(&output.app) {
        roots.push(output.modules.clone());
    }

    for root in roots {
        if !store.exists(&root) {
            continue;
        }
        for entry in store.walk(&root) {
            if entry == root {
                continue;
            }
            let stat = match store.stat(&entry)? {
                Some(s) => s,
                None => continue,
            };
            if stat.kind == EntryKind::Directory {
                let key = with_sep(&entry);
                if !delta.mkdir.remove(&key) {
                    delta.rmdir.insert(plain(&entry));
                }
            } else {
                let key = plain(&entry);
                match delta.copy.get(&key).cloned() {
                    Some(source) => {
                        let source_mtime = store.stat(&source)?.map(|s| s.mtime_ms).unwrap_or(0);
                        if stat.mtime_ms >= source_mtime {
                            delta.copy.remove(&key);
                        }
                    }
                    None => {
                        delta.rmfile.insert(key);
                    }
                }
            }
        }
    }

    Ok(delta)
}

/// Applies `delta` to disk in the only correctness-critical order: mkdir ascending, copy,
/// rmfile, rmdir descending.
pub fn apply(store: &FileStore, delta: &Delta) -> Result<()> {
    for dir in &delta.mkdir {
        store.create_dir(Path::new(dir.trim_end_matches('/')))?;
    }
    for (target, source) in &delta.copy {
        store.copy(source, Path::new(target))?;
    }
    for file in &delta.rmfile {
        store.remove_file(Path::new(file))?;
    }
    for dir in delta.rmdir.iter().rev() {
        store.remove_empty_dir(Path::new(dir.trim_end_matches('/')))?;
    }
    Ok(())
}

fn plain(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn with_sep(path: &Path) -> String {
    let mut s = plain(path);
    if !s.ends_with('/') {
        s.push('/');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{file_inventory, package_graph};
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn build_graph(project: &Path, store: &FileStore) -> PackageGraph {
        let mut graph = package_graph::build(store, project).unwrap();
        file_inventory::build(store, project, &mut graph, &[Platform::Ios, Platform::Android]).unwrap();
        graph
    }

    #[test]
    fn s1_first_rebuild_empty_output() {
        let project = TempDir::new().unwrap();
        write(
            &project.path().join("package.json"),
            r#"{"version": "1.0.0", "dependencies": {"foo": "^1.0.0"}}"#,
        );
        write(&project.path().join("app/main.js"), "x");
        write(
            &project.path().join("node_modules/foo/package.json"),
            r#"{"version": "1.0.0", "dependencies": {}}"#,
        );
        write(&project.path().join("node_modules/foo/index.js"), "y");

        let store = FileStore::new();
        let graph = build_graph(project.path(), &store);
        let output = OutputLayout::for_platform(Platform::Ios, project.path());
        let delta = rebuild_delta(&store, &graph, &output, Platform::Ios).unwrap();

        assert!(delta.rmfile.is_empty());
        assert!(delta.rmdir.is_empty());
        assert!(delta.copy.keys().any(|k| k.ends_with("app/main.js")));
        assert!(delta.copy.keys().any(|k| k.ends_with("tns_modules/foo/index.js")));
    }

    #[test]
    fn s3_platform_suffix_strip() {
        let project = TempDir::new().unwrap();
        write(
            &project.path().join("package.json"),
            r#"{"version": "1.0.0", "dependencies": {"foo": "^1.0.0"}}"#,
        );
        write(
            &project.path().join("node_modules/foo/package.json"),
            r#"{"version": "1.0.0", "dependencies": {}}"#,
        );
        write(&project.path().join("node_modules/foo/x.ios.js"), "ios");
        write(&project.path().join("node_modules/foo/x.android.js"), "android");

        let store = FileStore::new();
        let graph = build_graph(project.path(), &store);
        let output = OutputLayout::for_platform(Platform::Ios, project.path());
        let delta = build_delta(&graph, &output, Platform::Ios);

        assert!(delta.copy.keys().any(|k| k.ends_with("tns_modules/foo/x.js")));
        assert!(!delta.copy.keys().any(|k| k.contains("android")));
    }

    #[test]
    fn idempotent_after_apply() {
        let project = TempDir::new().unwrap();
        write(&project.path().join("package.json"), r#"{"version": "1.0.0", "dependencies": {}}"#);
        write(&project.path().join("app/main.js"), "x");

        let store = FileStore::new();
        let graph = build_graph(project.path(), &store);
        let output = OutputLayout::for_platform(Platform::Ios, project.path());
        let first = rebuild_delta(&store, &graph, &output, Platform::Ios).unwrap();
        apply(&store, &first).unwrap();

        let second = rebuild_delta(&store, &graph, &output, Platform::Ios).unwrap();
        assert!(second.copy.is_empty());
        assert!(second.rmfile.is_empty());
    }
}
