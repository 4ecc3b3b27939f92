//! Enumerates application script files, per-platform native resources, and per-package
//! script/native files, recording modification times. Implements §4.2.
//!
//! Adapted from `fingerprint.rs::fingerprint_partitions`'s `WalkDir`-based recursive
//! enumeration: that scan is flat (one partition, one ignore rule for special files), this one
//! carries a *scope* that can change mid-walk whenever a nested `package.json` is found, so the
//! traversal is hand-rolled instead of delegated to `WalkDir`.
use crate::file_store::{EntryKind, FileStore};
use crate::package_graph::{Availability, Manifest, Package, PackageGraph, PackageKind};
use crate::path_util::Platform;
use anyhow::{Context, Result};
use rayon::prelude::*;
use semver::Version;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct File {
    /// Relative to the enclosing package (or app) scope.
    pub path: PathBuf,
    pub absolute_path: PathBuf,
    pub name: String,
    pub extension: String,
    pub mtime: i64,
}

/// Populates `graph.app` and every Available dependency's `script_files`/`native_files`/
/// `directories` from the project tree on disk.
pub fn build(
    store: &FileStore,
    project_root: &Path,
    graph: &mut PackageGraph,
    platforms: &[Platform],
) -> Result<()> {
    inventory_app(store, project_root, graph)?;
    inventory_app_native(store, project_root, graph, platforms)?;

    let names: Vec<String> = graph.dependencies.keys().cloned().collect();
    for name in names {
        let locator = match graph.locator_of(&name) {
            Some(l) => l,
            None => continue,
        };
        if !graph.node_at(&locator).is_available() {
            continue;
        }
        let pkg_path = graph.node_at(&locator).path.clone();
        let skip_platforms = !graph.node_at(&locator).declared_platforms().is_empty();
        scan_package_dir(store, project_root, graph, &locator, &pkg_path, &pkg_path, skip_platforms)?;
        scan_native(store, project_root, graph, &locator, platforms)?;
    }
    Ok(())
}

/// Content-hashes every file in `files`, digesting in parallel. Grounded on
/// `fingerprint.rs::fingerprint_partitions`'s per-file digest pass, parallelized with `rayon`
/// for large file sets the same way `fingerprint_partitions` does for a whole partition tree.
pub fn hash_all(store: &FileStore, files: &[File]) -> Result<Vec<(PathBuf, String)>> {
    files
        .par_iter()
        .map(|f| store.hash(&f.absolute_path).map(|digest| (f.absolute_path.clone(), digest)))
        .collect()
}

fn inventory_app(store: &FileStore, project_root: &Path, graph: &mut PackageGraph) -> Result<()> {
    let app_root_rel = PathBuf::from("app");
    if !store.exists(&project_root.join(&app_root_rel)) {
        return Ok(());
    }
    scan_app_dir(store, project_root, graph, &app_root_rel, &app_root_rel)
}

fn scan_app_dir(
    store: &FileStore,
    project_root: &Path,
    graph: &mut PackageGraph,
    scope_root_rel: &Path,
    current_dir_rel: &Path,
) -> Result<()> {
    let current_abs = project_root.join(current_dir_rel);
    let mut entries = store.list_dir(&current_abs)?;
    entries.sort();
    for entry_abs in entries {
        let file_name = match entry_abs.file_name() {
            Some(n) => n.to_string_lossy().to_string(),
            None => continue,
        };
        if current_dir_rel == scope_root_rel && file_name == "App_Resources" {
            continue;
        }
        let entry_rel = current_dir_rel.join(&file_name);
        let stat = match store.stat(&entry_abs)? {
            Some(s) => s,
            None => continue,
        };
        if stat.kind == EntryKind::Directory {
            let rel = rel_to(&entry_rel, scope_root_rel);
            graph.app.directories.push(with_trailing_sep(&rel));
            scan_app_dir(store, project_root, graph, scope_root_rel, &entry_rel)?;
        } else {
            let rel = rel_to(&entry_rel, scope_root_rel);
            graph.app.script_files.push(make_file(&entry_abs, &rel, &file_name, stat.mtime_ms));
        }
    }
    Ok(())
}

fn inventory_app_native(
    store: &FileStore,
    project_root: &Path,
    graph: &mut PackageGraph,
    platforms: &[Platform],
) -> Result<()> {
    for platform in platforms {
        let rel = PathBuf::from("app/App_Resources").join(platform.as_str());
        if !store.exists(&project_root.join(&rel)) {
            continue;
        }
        let files = collect_flat_files(store, project_root, &rel)?;
        graph.app.native_files.insert(*platform, files);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn scan_package_dir(
    store: &FileStore,
    project_root: &Path,
    graph: &mut PackageGraph,
    owner_locator: &[usize],
    scope_root_rel: &Path,
    current_dir_rel: &Path,
    skip_platforms: bool,
) -> Result<()> {
    let current_abs = project_root.join(current_dir_rel);
    let mut entries = store.list_dir(&current_abs)?;
    entries.sort();
    for entry_abs in entries {
        let file_name = match entry_abs.file_name() {
            Some(n) => n.to_string_lossy().to_string(),
            None => continue,
        };
        if file_name == "node_modules" {
            continue;
        }
        if current_dir_rel == scope_root_rel && skip_platforms && file_name == "platforms" {
            continue;
        }
        let entry_rel = current_dir_rel.join(&file_name);
        let stat = match store.stat(&entry_abs)? {
            Some(s) => s,
            None => continue,
        };
        if stat.kind != EntryKind::Directory {
            let rel = rel_to(&entry_rel, scope_root_rel);
            graph.node_at_mut(owner_locator).script_files.push(make_file(
                &entry_abs,
                &rel,
                &file_name,
                stat.mtime_ms,
            ));
            continue;
        }

        let nested_manifest = entry_abs.join("package.json");
        if store.exists(&nested_manifest) {
            spawn_nested(store, project_root, graph, owner_locator, &entry_rel, &nested_manifest)?;
            continue;
        }

        let rel = rel_to(&entry_rel, scope_root_rel);
        graph.node_at_mut(owner_locator).directories.push(with_trailing_sep(&rel));
        scan_package_dir(
            store,
            project_root,
            graph,
            owner_locator,
            scope_root_rel,
            &entry_rel,
            skip_platforms,
        )?;
    }
    Ok(())
}

/// Spawns a `Nested` package at `entry_rel` and continues enumeration under its own scope.
/// If `name` collides with an already-Available entry, the *scope owner* (not the nested node)
/// is demoted to `ShadowedByDiverged` per §4.2, and the nested scope itself is left unvisited —
/// a demoted package contributes zero files regardless, so there is nothing further to record.
fn spawn_nested(
    store: &FileStore,
    project_root: &Path,
    graph: &mut PackageGraph,
    owner_locator: &[usize],
    entry_rel: &Path,
    nested_manifest_path: &Path,
) -> Result<()> {
    let manifest: Manifest = store
        .read_json(nested_manifest_path)
        .with_context(|| format!("Parsing nested manifest at {}", nested_manifest_path.display()))?;
    let version = match &manifest.version {
        Some(v) => Version::parse(v.trim_start_matches('v'))
            .with_context(|| format!("Parsing version in {}", nested_manifest_path.display()))?,
        None => Version::new(0, 0, 0),
    };
    let name = manifest.name.clone().unwrap_or_else(|| {
        entry_rel.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
    });

    if graph.dependencies.contains_key(&name) {
        graph.node_at_mut(owner_locator).availability = Availability::ShadowedByDiverged;
        return Ok(());
    }

    let nested_locator = {
        let owner = graph.node_at_mut(owner_locator);
        let locator_index = owner.children.len();
        owner.children.push(Package {
            kind: PackageKind::Nested,
            name: name.clone(),
            path: entry_rel.to_path_buf(),
            manifest: Some(manifest),
            version: Some(version),
            required_version: String::new(),
            resolved_at_parent: HashSet::new(),
            resolved_at_grandparent: HashSet::new(),
            children: Vec::new(),
            script_files: Vec::new(),
            native_files: Default::default(),
            directories: Vec::new(),
            availability: Availability::Available,
        });
        let mut full_locator = owner_locator.to_vec();
        full_locator.push(locator_index);
        full_locator
    };
    graph.dependencies.insert(name, nested_locator.clone());

    let skip_platforms = !graph.node_at(&nested_locator).declared_platforms().is_empty();
    scan_package_dir(store, project_root, graph, &nested_locator, entry_rel, entry_rel, skip_platforms)?;
    scan_native(store, project_root, graph, &nested_locator, &[Platform::Ios, Platform::Android])?;
    Ok(())
}

fn scan_native(
    store: &FileStore,
    project_root: &Path,
    graph: &mut PackageGraph,
    locator: &[usize],
    platforms: &[Platform],
) -> Result<()> {
    let declared = graph.node_at(locator).declared_platforms();
    let pkg_path = graph.node_at(locator).path.clone();
    for platform in platforms {
        if !declared.iter().any(|d| d.eq_ignore_ascii_case(platform.as_str())) {
            continue;
        }
        let rel = pkg_path.join("platforms").join(platform.as_str());
        if !store.exists(&project_root.join(&rel)) {
            continue;
        }
        let files = collect_flat_files(store, project_root, &rel)?;
        graph.node_at_mut(locator).native_files.insert(*platform, files);
    }
    Ok(())
}

fn collect_flat_files(store: &FileStore, project_root: &Path, root_rel: &Path) -> Result<Vec<File>> {
    let mut files = Vec::new();
    collect_flat_files_into(store, project_root, root_rel, root_rel, &mut files)?;
    Ok(files)
}

fn collect_flat_files_into(
    store: &FileStore,
    project_root: &Path,
    root_rel: &Path,
    current_rel: &Path,
    files: &mut Vec<File>,
) -> Result<()> {
    let current_abs = project_root.join(current_rel);
    let mut entries = store.list_dir(&current_abs)?;
    entries.sort();
    for entry_abs in entries {
        let file_name = match entry_abs.file_name() {
            Some(n) => n.to_string_lossy().to_string(),
            None => continue,
        };
        let entry_rel = current_rel.join(&file_name);
        let stat = match store.stat(&entry_abs)? {
            Some(s) => s,
            None => continue,
        };
        if stat.kind == EntryKind::Directory {
            collect_flat_files_into(store, project_root, root_rel, &entry_rel, files)?;
        } else {
            let rel = rel_to(&entry_rel, root_rel);
            files.push(make_file(&entry_abs, &rel, &file_name, stat.mtime_ms));
        }
    }
    Ok(())
}

fn make_file(absolute_path: &Path, rel_path: &Path, name: &str, mtime: i64) -> File {
    let extension = Path::new(name).extension().map(|e| e.to_string_lossy().to_string()).unwrap_or_default();
    File { path: rel_path.to_path_buf(), absolute_path: absolute_path.to_path_buf(), name: name.to_string(), extension, mtime }
}

fn rel_to(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base).map(|p| p.to_path_buf()).unwrap_or_else(|_| path.to_path_buf())
}

fn with_trailing_sep(path: &Path) -> String {
    let mut s = path.to_string_lossy().replace('\\', "/");
    if !s.ends_with('/') {
        s.push('/');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package_graph;
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn app_resources_excluded_from_app_scan() {
        let project = TempDir::new().unwrap();
        write(&project.path().join("package.json"), r#"{"version": "1.0.0", "dependencies": {}}"#);
        write(&project.path().join("app/main.js"), "console.log(1)");
        write(&project.path().join("app/App_Resources/ios/Info.plist"), "x");

        let store = FileStore::new();
        let mut graph = package_graph::build(&store, project.path()).unwrap();
        build(&store, project.path(), &mut graph, &[Platform::Ios, Platform::Android]).unwrap();

        assert_eq!(1, graph.app.script_files.len());
        assert_eq!(PathBuf::from("main.js"), graph.app.script_files[0].path);
        assert!(graph.app.native_files.get(&Platform::Ios).is_some());
    }

    #[test]
    fn platform_suffixed_files_are_enumerated_for_later_filtering() {
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
        let mut graph = package_graph::build(&store, project.path()).unwrap();
        build(&store, project.path(), &mut graph, &[Platform::Ios, Platform::Android]).unwrap();

        let foo = graph.resolve("foo").unwrap();
        assert_eq!(2, foo.script_files.len());
    }

    #[test]
    fn nested_package_spawns_own_scope() {
        let project = TempDir::new().unwrap();
        write(
            &project.path().join("package.json"),
            r#"{"version": "1.0.0", "dependencies": {"foo": "^1.0.0"}}"#,
        );
        write(
            &project.path().join("node_modules/foo/package.json"),
            r#"{"version": "1.0.0", "dependencies": {}}"#,
        );
        write(&project.path().join("node_modules/foo/lib/a.js"), "a");
        write(
            &project.path().join("node_modules/foo/vendor/bar/package.json"),
            r#"{"name": "bar", "version": "2.0.0", "dependencies": {}}"#,
        );
        write(&project.path().join("node_modules/foo/vendor/bar/index.js"), "b");

        let store = FileStore::new();
        let mut graph = package_graph::build(&store, project.path()).unwrap();
        build(&store, project.path(), &mut graph, &[Platform::Ios, Platform::Android]).unwrap();

        let foo = graph.resolve("foo").unwrap();
        assert_eq!(1, foo.script_files.len());
        assert_eq!(PathBuf::from("lib/a.js"), foo.script_files[0].path);

        let bar = graph.resolve("bar").unwrap();
        assert_eq!(1, bar.script_files.len());
        assert_eq!(PathBuf::from("index.js"), bar.script_files[0].path);
    }

    #[test]
    fn hash_all_digests_every_file_exactly_once() {
        let project = TempDir::new().unwrap();
        write(&project.path().join("package.json"), r#"{"version": "1.0.0", "dependencies": {}}"#);
        write(&project.path().join("app/main.js"), "one");
        write(&project.path().join("app/app.css"), "two");

        let store = FileStore::new();
        let mut graph = package_graph::build(&store, project.path()).unwrap();
        build(&store, project.path(), &mut graph, &[Platform::Ios, Platform::Android]).unwrap();

        let hashes = hash_all(&store, &graph.app.script_files).unwrap();
        assert_eq!(2, hashes.len());
        assert!(hashes.iter().all(|(_, digest)| !digest.is_empty()));
        let unique: HashSet<&String> = hashes.iter().map(|(_, d)| d).collect();
        assert_eq!(2, unique.len());
    }
}
