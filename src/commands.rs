//! Wires the CLI subcommands to the library. Not itself part of the tested core surface
//! (§6.4); grounded on `adevice.rs::adevice`'s top-level dispatch shape.
use crate::change_classifier;
use crate::cli::{Commands, PrepareArgs, SyncArgs};
use crate::delta_planner;
use crate::devices::{RealAndroidDevice, RealIosSimulator};
use crate::file_inventory;
use crate::file_store::FileStore;
use crate::live_sync_coordinator::{FsEvent, FullSyncOptions, LiveSyncCoordinator};
use crate::package_graph;
use crate::path_util::{OutputLayout, Platform};
use crate::prepare_info_store::{self, ChangeFlags, PrepareOptions};
use crate::progress;
use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

pub fn run(command: Commands, project_path: PathBuf) -> Result<()> {
    match command {
        Commands::Status => status(&project_path),
        Commands::Prepare(args) => prepare(&project_path, &args),
        Commands::Sync(args) => sync(&project_path, &args),
        Commands::Watch(args) => watch(&project_path, &args),
    }
}

fn build_graph_and_inventory(
    project_path: &PathBuf,
) -> Result<(FileStore, package_graph::PackageGraph)> {
    let store = FileStore::new();
    let mut graph = package_graph::build(&store, project_path).context("Building package graph")?;
    file_inventory::build(&store, project_path, &mut graph, &[Platform::Ios, Platform::Android])
        .context("Enumerating project files")?;
    Ok((store, graph))
}

fn status(project_path: &PathBuf) -> Result<()> {
    let (store, graph) = build_graph_and_inventory(project_path)?;

    let mut tracked_files = graph.app.script_files.clone();
    for name in graph.dependencies.keys() {
        if let Some(pkg) = graph.resolve(name) {
            tracked_files.extend(pkg.script_files.iter().cloned());
        }
    }
    let hashes = file_inventory::hash_all(&store, &tracked_files)?;
    log::debug!("Hashed {} tracked files", hashes.len());

    for platform in [Platform::Ios, Platform::Android] {
        let output = OutputLayout::for_platform(platform, project_path);
        let delta = delta_planner::rebuild_delta(&store, &graph, &output, platform)?;
        println!("== {} ==", platform.as_str());
        for dir in &delta.mkdir {
            println!("  mkdir  {dir}");
        }
        for target in delta.copy.keys() {
            println!("  copy   {target}");
        }
        for file in &delta.rmfile {
            println!("  rmfile {file}");
        }
        for dir in &delta.rmdir {
            println!("  rmdir  {dir}");
        }
    }
    Ok(())
}

fn prepare(project_path: &PathBuf, args: &PrepareArgs) -> Result<()> {
    let platform: Platform = args.platform.into();
    let (store, graph) = build_graph_and_inventory(project_path)?;
    let output = OutputLayout::for_platform(platform, project_path);

    progress::start("Computing delta");
    let delta = delta_planner::rebuild_delta(&store, &graph, &output, platform)?;
    progress::update("Applying delta");
    delta_planner::apply(&store, &delta)?;
    progress::stop();

    let options = PrepareOptions { bundle: args.bundle, release: args.release };
    let flags = ChangeFlags {
        app_files_changed: delta.changed_scripts(),
        app_resources_changed: false,
        modules_changed: delta.changed_scripts(),
        config_changed: false,
        package_changed: false,
        native_changed: false,
    };
    let info = prepare_info_store::reconcile(&store, &output.root, &options, flags)?;
    log::info!("Prepared {} at {}", platform.as_str(), info.time);
    Ok(())
}

fn sync(project_path: &PathBuf, args: &SyncArgs) -> Result<()> {
    let platform: Platform = args.platform.into();
    let store = FileStore::new();
    let output = OutputLayout::for_platform(platform, project_path);
    let coordinator = LiveSyncCoordinator::new(store, project_path.clone(), &[], args.live_edit)?;

    let device = make_device(platform, args.device.clone(), &output)?;
    let options = FullSyncOptions {
        bundle: false,
        release: false,
        live_edit: args.live_edit,
        sync_all_files: args.sync_all_files,
    };
    let package_path = output.root.join("app.package");
    coordinator.full_sync(platform, device.as_ref(), &options, &package_path)
}

fn watch(project_path: &PathBuf, args: &SyncArgs) -> Result<()> {
    let platform: Platform = args.platform.into();
    let store = FileStore::new();
    let output = OutputLayout::for_platform(platform, project_path);
    let coordinator = Arc::new(LiveSyncCoordinator::new(store, project_path.clone(), &[], args.live_edit)?);

    let device = make_device(platform, args.device.clone(), &output)?;
    coordinator.add_device(Arc::from(device));

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Reading watch event from stdin")?;
        let mut parts = line.splitn(2, '\t');
        let event = match parts.next() {
            Some("add") => FsEvent::Add,
            Some("change") => FsEvent::Change,
            Some("unlink") => FsEvent::Unlink,
            Some(other) => {
                log::warn!("Ignoring unknown watch event {other:?}");
                continue;
            }
            None => continue,
        };
        let path = match parts.next() {
            Some(p) => PathBuf::from(p),
            None => continue,
        };
        coordinator.partial_sync(event, path)?;
    }
    Ok(())
}

fn make_device(
    platform: Platform,
    device_id: Option<String>,
    output: &OutputLayout,
) -> Result<Box<dyn crate::live_sync_coordinator::DeviceLiveSync + Send + Sync>> {
    match platform {
        Platform::Android => {
            Ok(Box::new(RealAndroidDevice::new(device_id, "org.nativescript.app".to_string(), output.root.clone())))
        }
        Platform::Ios => {
            let udid = device_id.context("--device <udid> is required for iOS syncs")?;
            Ok(Box::new(RealIosSimulator::new(udid, "org.nativescript.app".to_string(), output.root.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_change_classifier_is_reexported_for_dispatch_use() {
        // Smoke test: this module's dispatch code compiles against change_classifier's public
        // surface without needing its own predicate logic.
        let _ = change_classifier::should_build_when_livesyncing;
    }
}
