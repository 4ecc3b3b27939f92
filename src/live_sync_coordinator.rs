//! Orchestrates full and partial syncs against one or more devices. Implements §4.7.
//!
//! Grounded on `device.rs::update()`'s orchestration (prep -> push commands sorted by
//! `mkdir_comes_first_rm_dfs` -> restart -> wait) and `adevice.rs`'s top-level retry-after-flash
//! loop, generalized from one Android device to a `DeviceLiveSync` trait with Android/iOS
//! strategies (§9's re-architecture note: dependency-injection containers become
//! constructor-passed `&dyn`/`Arc<dyn>` collaborators).
use crate::change_classifier;
use crate::delta_planner;
use crate::file_inventory;
use crate::file_store::FileStore;
use crate::ios_debugger::{self, ReadWrite};
use crate::package_graph;
use crate::path_util::{OutputLayout, Platform};
use crate::prepare_info_store;
use crate::sync_batch::{self, SyncBatch};
use anyhow::{Context, Result};
use itertools::Itertools;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const FAST_SYNC_EXTENSIONS: &[&str] = &["js", "json", "css"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEvent {
    Add,
    Change,
    Unlink,
}

/// A platform-specific device strategy. Object-safe so the coordinator can hold one per
/// connected device behind `Arc<dyn DeviceLiveSync + Send + Sync>`.
pub trait DeviceLiveSync {
    fn identifier(&self) -> &str;
    fn platform(&self) -> Platform;
    fn is_emulator(&self) -> bool;
    fn is_simulator(&self) -> bool;
    fn app_identifier(&self) -> &str;
    /// Root of the app's script tree on the device, e.g. `/data/local/tmp/app` or a simulator
    /// container path.
    fn device_app_root(&self) -> String;
    /// Host-side directory used to key this device's `.nslivesyncinfo` stamp.
    fn build_output_path(&self) -> PathBuf;

    fn stop_and_uninstall(&self, app_identifier: &str) -> Result<()>;
    fn install(&self, package_path: &Path) -> Result<()>;
    fn remount_and_reboot(&self) -> Result<()>;
    fn transfer_directory(&self, local_root: &Path, device_root: &str) -> Result<()>;
    fn transfer_file(&self, local_path: &Path, device_path: &str) -> Result<()>;
    fn remove_device_files(&self, device_paths: &[String]) -> Result<()>;
    fn refresh_application(&self) -> Result<()>;
    fn restart_application(&self) -> Result<()>;
    /// Only meaningful for iOS; Android strategies can return an error, never called there.
    fn open_debugger(&self) -> Result<Box<dyn ReadWrite>>;
}

pub struct FullSyncOptions {
    pub bundle: bool,
    pub release: bool,
    pub live_edit: bool,
    pub sync_all_files: bool,
}

pub struct LiveSyncCoordinator {
    store: FileStore,
    project_root: PathBuf,
    file_hashes: Arc<Mutex<HashMap<PathBuf, String>>>,
    excluded_patterns: Vec<Regex>,
    live_edit: bool,
    batches: Mutex<HashMap<Platform, SyncBatch>>,
    devices: Arc<Mutex<Vec<Arc<dyn DeviceLiveSync + Send + Sync>>>>,
}

impl LiveSyncCoordinator {
    pub fn new(
        store: FileStore,
        project_root: PathBuf,
        excluded_patterns: &[String],
        live_edit: bool,
    ) -> Result<LiveSyncCoordinator> {
        let excluded = excluded_patterns.iter().map(|p| glob_to_regex(p)).collect::<Result<Vec<_>>>()?;
        Ok(LiveSyncCoordinator {
            store,
            project_root,
            file_hashes: Arc::new(Mutex::new(HashMap::new())),
            excluded_patterns: excluded,
            live_edit,
            batches: Mutex::new(HashMap::new()),
            devices: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn add_device(&self, device: Arc<dyn DeviceLiveSync + Send + Sync>) {
        self.devices.lock().unwrap().push(device);
    }

    fn is_excluded(&self, rel_path: &str) -> bool {
        self.excluded_patterns.iter().any(|re| re.is_match(rel_path))
    }

    /// §4.7 "Full sync (per device)".
    pub fn full_sync(
        &self,
        platform: Platform,
        device: &dyn DeviceLiveSync,
        options: &FullSyncOptions,
        package_path: &Path,
    ) -> Result<()> {
        let output = OutputLayout::for_platform(platform, &self.project_root);

        let prepare = prepare_info_store::load_or_default(&self.store, &output.root)?;
        let live_sync_stamp = read_live_sync_stamp(&self.store, &device.build_output_path());
        let needs_rebuild = options.sync_all_files || live_sync_stamp.as_deref() != Some(prepare.time.as_str());
        if needs_rebuild {
            self.rebuild(platform, options.bundle, options.release)?;
        }

        tracing::info!("Installing...");
        device.stop_and_uninstall(device.app_identifier())?;
        install_with_retry(device, package_path)?;

        tracing::info!("Transferring project files...");
        if platform == Platform::Android || device.is_simulator() {
            device.transfer_directory(&output.app, &device.device_app_root())?;
        } else {
            for file in self.store.walk(&output.app) {
                if matches!(self.store.stat(&file)?, Some(s) if s.kind == crate::file_store::EntryKind::Directory) {
                    continue;
                }
                let rel = file.strip_prefix(&output.app).unwrap_or(&file);
                let device_path = format!("{}/{}", device.device_app_root(), rel.display());
                device.transfer_file(&file, &device_path)?;
            }
        }

        device.refresh_application()?;
        let prepare = prepare_info_store::load_or_default(&self.store, &output.root)?;
        write_live_sync_stamp(&self.store, &device.build_output_path(), &prepare.time)?;
        tracing::info!(
            "Successfully synced application {} on device {}",
            device.app_identifier(),
            device.identifier()
        );
        Ok(())
    }

    fn rebuild(&self, platform: Platform, bundle: bool, release: bool) -> Result<()> {
        let output = OutputLayout::for_platform(platform, &self.project_root);
        let mut graph = package_graph::build(&self.store, &self.project_root)?;
        file_inventory::build(&self.store, &self.project_root, &mut graph, &[Platform::Ios, Platform::Android])?;
        let delta = delta_planner::rebuild_delta(&self.store, &graph, &output, platform)?;
        delta_planner::apply(&self.store, &delta)?;

        let options = prepare_info_store::PrepareOptions { bundle, release };
        let flags = prepare_info_store::ChangeFlags {
            app_files_changed: delta.changed_scripts(),
            modules_changed: delta.changed_scripts(),
            ..Default::default()
        };
        prepare_info_store::reconcile(&self.store, &output.root, &options, flags)?;
        Ok(())
    }

    /// §4.7 "Partial sync (per event)".
    pub fn partial_sync(&self, event: FsEvent, abs_path: PathBuf) -> Result<()> {
        let rel_path = abs_path.strip_prefix(&self.project_root).unwrap_or(&abs_path).to_path_buf();

        if rel_path.components().any(|c| c.as_os_str() == "App_Resources") {
            tracing::warn!("Change under App_Resources requires a full build: {}", rel_path.display());
            return Ok(());
        }
        if self.is_excluded(&rel_path.to_string_lossy()) {
            return Ok(());
        }

        match event {
            FsEvent::Unlink => {
                self.file_hashes.lock().unwrap().remove(&rel_path);
                self.remove_on_devices(&rel_path)?;
            }
            FsEvent::Add | FsEvent::Change => {
                if !self.store.exists(&abs_path) {
                    return Ok(());
                }
                let digest = content_sha1(&abs_path)?;
                {
                    let mut hashes = self.file_hashes.lock().unwrap();
                    if hashes.get(&rel_path) == Some(&digest) {
                        return Ok(());
                    }
                    hashes.insert(rel_path.clone(), digest);
                }
                self.enqueue(abs_path);
            }
        }
        Ok(())
    }

    fn enqueue(&self, abs_path: PathBuf) {
        let platforms_with_devices: Vec<Platform> = {
            let devices = self.devices.lock().unwrap();
            [Platform::Ios, Platform::Android]
                .into_iter()
                .filter(|p| devices.iter().any(|d| d.platform() == *p))
                .collect()
        };

        let mut batches = self.batches.lock().unwrap();
        for platform in platforms_with_devices {
            let store = self.store;
            let project_root = self.project_root.clone();
            let devices = Arc::clone(&self.devices);
            let live_edit = self.live_edit;
            let batch = batches
                .entry(platform)
                .or_insert_with(|| {
                    SyncBatch::new(sync_batch::DEFAULT_QUIET_INTERVAL, move |changed| {
                        if let Err(e) = flush(&store, &project_root, platform, &devices, live_edit, changed) {
                            tracing::error!("sync batch flush failed: {:#}", e);
                        }
                    })
                });
            batch.add_file(abs_path.clone());
        }
    }

    fn remove_on_devices(&self, rel_path: &Path) -> Result<()> {
        let devices = self.devices.lock().unwrap();
        for device in devices.iter() {
            let device_path = format!("{}/{}", device.device_app_root(), rel_path.display());
            device.remove_device_files(&[device_path])?;
        }
        Ok(())
    }
}

fn install_with_retry(device: &dyn DeviceLiveSync, package_path: &Path) -> Result<()> {
    match device.install(package_path) {
        Ok(()) => Ok(()),
        Err(e) if format!("{:#}", e).contains("Read-only file system") => {
            tracing::warn!("Install hit a read-only file system, remounting and retrying once");
            device.remount_and_reboot()?;
            device.install(package_path).context("Retrying install after remount failed")
        }
        Err(e) => Err(e),
    }
}

/// §4.7 "Per-flush action", run on the `SyncBatch`'s background thread.
fn flush(
    store: &FileStore,
    project_root: &Path,
    platform: Platform,
    devices: &Arc<Mutex<Vec<Arc<dyn DeviceLiveSync + Send + Sync>>>>,
    live_edit: bool,
    changed: HashSet<PathBuf>,
) -> Result<()> {
    let matching: Vec<Arc<dyn DeviceLiveSync + Send + Sync>> =
        devices.lock().unwrap().iter().filter(|d| d.platform() == platform).cloned().collect();
    if matching.is_empty() {
        return Ok(());
    }

    let mut requires_build = false;
    for path in &changed {
        if change_classifier::file_change_requires_build(store, path, project_root)? {
            requires_build = true;
            break;
        }
    }

    let output = OutputLayout::for_platform(platform, project_root);

    if requires_build {
        tracing::info!("Change requires a rebuild, deploying...");
        let mut graph = package_graph::build(store, project_root)?;
        file_inventory::build(store, project_root, &mut graph, &[Platform::Ios, Platform::Android])?;
        let delta = delta_planner::rebuild_delta(store, &graph, &output, platform)?;
        delta_planner::apply(store, &delta)?;

        let flags = prepare_info_store::ChangeFlags {
            app_files_changed: delta.changed_scripts(),
            modules_changed: delta.changed_scripts(),
            ..Default::default()
        };
        let existing = prepare_info_store::load_or_default(store, &output.root)?;
        let options = prepare_info_store::PrepareOptions { bundle: existing.bundle, release: existing.release };
        prepare_info_store::reconcile(store, &output.root, &options, flags)?;

        for device in &matching {
            device.refresh_application()?;
        }
        return Ok(());
    }

    for device in &matching {
        // `changed` is a HashSet; transfer in a stable order so logs and retries are
        // reproducible, matched to `device.rs`'s `.sorted_by(&mkdir_comes_first_rm_dfs)`.
        for path in changed.iter().sorted() {
            let rel = path
                .strip_prefix(&output.app)
                .or_else(|_| path.strip_prefix(&output.modules))
                .unwrap_or(path);
            let device_path = format!("{}/{}", device.device_app_root(), rel.display());
            device.transfer_file(path, &device_path)?;
        }

        match platform {
            Platform::Android => device.refresh_application()?,
            Platform::Ios => refresh_ios(store, &output, device.as_ref(), &changed, live_edit)?,
        }

        let prepare = prepare_info_store::load_or_default(store, &output.root)?;
        write_live_sync_stamp(store, &device.build_output_path(), &prepare.time)?;
    }
    Ok(())
}

/// §4.7 "Device refresh strategies" / iOS branch.
pub fn refresh_ios(
    store: &FileStore,
    output: &OutputLayout,
    device: &dyn DeviceLiveSync,
    changed: &HashSet<PathBuf>,
    live_edit: bool,
) -> Result<()> {
    let mut scripts = Vec::new();
    let mut force_restart = false;
    for path in changed {
        let ext = path.extension().map(|e| e.to_string_lossy().to_string()).unwrap_or_default();
        if ext == "js" {
            scripts.push(path.clone());
        } else if !FAST_SYNC_EXTENSIONS.contains(&ext.as_str()) {
            force_restart = true;
        }
    }

    if force_restart {
        return device.restart_application();
    }

    if live_edit && !scripts.is_empty() {
        let stream = match device.open_debugger() {
            Ok(stream) => stream,
            Err(e) => {
                tracing::trace!("debugger socket unavailable, falling back to restart: {:#}", e);
                return device.restart_application();
            }
        };
        let mut conn = ios_debugger::DebuggerConnection::new(stream);
        for script in &scripts {
            let source = store.read_text(script)?;
            let url = script.strip_prefix(&output.app).unwrap_or(script).to_string_lossy().to_string();
            conn.set_script_source(&url, &source)?;
        }
        conn.reload()
    } else {
        device.refresh_application()
    }
}

fn write_live_sync_stamp(store: &FileStore, build_output_dir: &Path, time: &str) -> Result<()> {
    store.write_text(&build_output_dir.join(".nslivesyncinfo"), time)
}

fn read_live_sync_stamp(store: &FileStore, build_output_dir: &Path) -> Option<String> {
    let path = build_output_dir.join(".nslivesyncinfo");
    if !store.exists(&path) {
        return None;
    }
    store.read_text(&path).ok()
}

fn content_sha1(path: &Path) -> Result<String> {
    use ring::digest::{Context as DigestContext, SHA1_FOR_LEGACY_USE_ONLY};
    let mut file = std::fs::File::open(path).with_context(|| format!("Opening {}", path.display()))?;
    let mut ctx = DigestContext::new(&SHA1_FOR_LEGACY_USE_ONLY);
    let mut buf = [0u8; 4096];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        ctx.update(&buf[..n]);
    }
    Ok(hex::encode(ctx.finish().as_ref()))
}

fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::from("(?i)");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                re.push('\\');
                re.push(ch);
            }
            other => re.push(other),
        }
    }
    Regex::new(&re).with_context(|| format!("Compiling exclude pattern {:?}", pattern))
}
