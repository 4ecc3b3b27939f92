//! Flattens a nested installed-package tree into a single logical module namespace.
//!
//! Ownership stays tree-shaped: `Package` holds its children and two carried-down ancestor
//! name sets, never a parent back-reference (see `adevice.rs`'s `parents()` for the same
//! habit of walking paths rather than holding pointers to ancestors). Cross-branch version
//! conflicts can't be resolved by mutating an ancestor in place mid-traversal without such a
//! back-reference, so resolution runs in two passes: the DFS below records every competing
//! candidate's tree location (`locator`, a child-index path from `app`), then a finalize step
//! picks winners by version and writes `Availability` back into the tree by locator. The result
//! is identical to resolving node-by-node during the walk; only the mechanism differs.
use crate::file_inventory::File;
use crate::file_store::FileStore;
use crate::path_util::Platform;
use anyhow::{Context, Result};
use semver::Version;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    App,
    Package,
    Nested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    NotInstalled,
    ShadowedByAncestor,
    ShadowedByDiverged,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FrameworkBlock {
    pub id: Option<String>,
    #[serde(default)]
    pub platforms: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Manifest {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    pub nativescript: Option<FrameworkBlock>,
}

#[derive(Debug, Clone)]
pub struct Package {
    pub kind: PackageKind,
    pub name: String,
    /// Relative to the project root.
    pub path: PathBuf,
    pub manifest: Option<Manifest>,
    pub version: Option<Version>,
    pub required_version: String,
    pub resolved_at_parent: HashSet<String>,
    pub resolved_at_grandparent: HashSet<String>,
    pub children: Vec<Package>,
    pub script_files: Vec<File>,
    pub native_files: HashMap<Platform, Vec<File>>,
    /// Relative directory paths, each ending in `/` per §4.2.
    pub directories: Vec<String>,
    pub availability: Availability,
}

impl Package {
    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }

    /// Files + subdirectories declared by the manifest's `nativescript.platforms`, if any.
    pub fn declared_platforms(&self) -> Vec<String> {
        self.manifest
            .as_ref()
            .and_then(|m| m.nativescript.as_ref())
            .map(|f| f.platforms.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct PackageGraph {
    pub app: Package,
    /// name -> child-index path from `app` identifying the winning node.
    pub dependencies: HashMap<String, Vec<usize>>,
}

impl PackageGraph {
    pub fn resolve(&self, name: &str) -> Option<&Package> {
        self.dependencies.get(name).map(|locator| locate(&self.app, locator))
    }

    pub fn resolve_mut(&mut self, name: &str) -> Option<&mut Package> {
        let locator = self.dependencies.get(name).cloned()?;
        Some(locate_mut(&mut self.app, &locator))
    }

    pub fn locator_of(&self, name: &str) -> Option<Vec<usize>> {
        self.dependencies.get(name).cloned()
    }

    pub fn node_at(&self, locator: &[usize]) -> &Package {
        locate(&self.app, locator)
    }

    pub fn node_at_mut(&mut self, locator: &[usize]) -> &mut Package {
        locate_mut(&mut self.app, locator)
    }

}

fn locate<'a>(app: &'a Package, locator: &[usize]) -> &'a Package {
    let mut node = app;
    for &i in locator {
        node = &node.children[i];
    }
    node
}

fn locate_mut<'a>(app: &'a mut Package, locator: &[usize]) -> &'a mut Package {
    let mut node = app;
    for &i in locator {
        node = &mut node.children[i];
    }
    node
}

#[derive(Clone)]
struct Candidate {
    name: String,
    locator: Vec<usize>,
    version: Version,
}

/// Walks the nested installed tree rooted at `project_root` and returns the flattened graph.
/// Implements §4.1 steps 1-7.
pub fn build(store: &FileStore, project_root: &Path) -> Result<PackageGraph> {
    let mut candidates = Vec::new();
    let base_name = project_root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "app".to_string());

    let app = visit(
        store,
        project_root,
        PathBuf::new(),
        PackageKind::App,
        base_name,
        String::new(),
        HashSet::new(),
        HashSet::new(),
        Vec::new(),
        &mut candidates,
    )?;

    let mut app = app;
    let mut winners: HashMap<String, Candidate> = HashMap::new();
    for c in &candidates {
        match winners.get(&c.name) {
            Some(existing) if c.version <= existing.version => {}
            _ => {
                winners.insert(c.name.clone(), c.clone());
            }
        }
    }

    for c in &candidates {
        let is_winner = winners.get(&c.name).map(|w| w.locator == c.locator).unwrap_or(false);
        locate_mut(&mut app, &c.locator).availability = if is_winner {
            Availability::Available
        } else {
            Availability::ShadowedByDiverged
        };
    }

    let dependencies = winners.into_iter().map(|(name, c)| (name, c.locator)).collect();
    Ok(PackageGraph { app, dependencies })
}

#[allow(clippy::too_many_arguments)]
fn visit(
    store: &FileStore,
    project_root: &Path,
    path: PathBuf,
    kind: PackageKind,
    declared_name: String,
    required_version: String,
    resolved_at_parent: HashSet<String>,
    resolved_at_grandparent: HashSet<String>,
    locator: Vec<usize>,
    candidates: &mut Vec<Candidate>,
) -> Result<Package> {
    let manifest_path = project_root.join(&path).join("package.json");

    if !store.exists(&manifest_path) {
        return Ok(empty_package(
            kind,
            declared_name,
            path,
            required_version,
            resolved_at_parent,
            resolved_at_grandparent,
            Availability::NotInstalled,
        ));
    }

    if kind != PackageKind::App && resolved_at_grandparent.contains(&declared_name) {
        return Ok(empty_package(
            kind,
            declared_name,
            path,
            required_version,
            resolved_at_parent,
            resolved_at_grandparent,
            Availability::ShadowedByAncestor,
        ));
    }

    let manifest: Manifest = store
        .read_json(&manifest_path)
        .with_context(|| format!("Parsing manifest at {}", manifest_path.display()))?;

    let version = match &manifest.version {
        Some(v) => Version::parse(v.trim_start_matches('v'))
            .with_context(|| format!("Parsing version {:?} in {}", v, manifest_path.display()))?,
        None => Version::new(0, 0, 0),
    };

    let mut name = declared_name;
    if kind == PackageKind::App {
        if let Some(id) = manifest.nativescript.as_ref().and_then(|f| f.id.as_ref()) {
            name = id.clone();
        }
    } else {
        candidates.push(Candidate { name: name.clone(), locator: locator.clone(), version: version.clone() });
    }

    let mut resolved = resolved_at_parent.clone();
    resolved.extend(manifest.dependencies.keys().cloned());

    let mut children = Vec::with_capacity(manifest.dependencies.len());
    for (index, (dep_name, dep_version)) in manifest.dependencies.iter().enumerate() {
        let child_path = path.join("node_modules").join(dep_name);
        let mut child_locator = locator.clone();
        child_locator.push(index);
        let child = visit(
            store,
            project_root,
            child_path,
            PackageKind::Package,
            dep_name.clone(),
            dep_version.clone(),
            resolved.clone(),
            resolved_at_parent.clone(),
            child_locator,
            candidates,
        )?;
        children.push(child);
    }

    Ok(Package {
        kind,
        name,
        path,
        manifest: Some(manifest),
        version: Some(version),
        required_version,
        resolved_at_parent,
        resolved_at_grandparent,
        children,
        script_files: Vec::new(),
        native_files: HashMap::new(),
        directories: Vec::new(),
        availability: Availability::Available,
    })
}

#[allow(clippy::too_many_arguments)]
fn empty_package(
    kind: PackageKind,
    name: String,
    path: PathBuf,
    required_version: String,
    resolved_at_parent: HashSet<String>,
    resolved_at_grandparent: HashSet<String>,
    availability: Availability,
) -> Package {
    Package {
        kind,
        name,
        path,
        manifest: None,
        version: None,
        required_version,
        resolved_at_parent,
        resolved_at_grandparent,
        children: Vec::new(),
        script_files: Vec::new(),
        native_files: HashMap::new(),
        directories: Vec::new(),
        availability,
    }
}
