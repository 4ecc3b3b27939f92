//! Concrete `DeviceLiveSync` strategies that shell out to platform tooling. Grounded on
//! `device.rs::RealDevice`'s `run_raw_adb_command` (process::Command, stderr/stdout-aware error
//! reporting) generalized to two platforms: `adb` for Android, `xcrun simctl` for the iOS
//! Simulator. The Android strategy's `transfer_directory` issues its pushes through
//! `device_commands::compose` rather than a single bulk `adb push`, so a full sync gets the
//! same mkdir/push ordering as every other `adb`-shaped transfer in this crate.
use crate::delta_planner::Delta;
use crate::device_commands;
use crate::ios_debugger::{self, ReadWrite};
use crate::live_sync_coordinator::DeviceLiveSync;
use crate::path_util::Platform;
use anyhow::{anyhow, Context, Result};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

pub struct RealAndroidDevice {
    serial: Option<String>,
    app_identifier: String,
    device_app_root: String,
    build_output: PathBuf,
}

impl RealAndroidDevice {
    pub fn new(serial: Option<String>, app_identifier: String, build_output: PathBuf) -> RealAndroidDevice {
        RealAndroidDevice {
            serial,
            device_app_root: format!("/data/local/tmp/{}", app_identifier),
            app_identifier,
            build_output,
        }
    }

    fn adjust(&self, args: &[&str]) -> Vec<String> {
        match &self.serial {
            Some(serial) => {
                let mut full = vec!["-s".to_string(), serial.clone()];
                full.extend(args.iter().map(|s| s.to_string()));
                full
            }
            None => args.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let adjusted = self.adjust(args);
        tracing::info!("adb {:?}", adjusted);
        let output = Command::new("adb").args(&adjusted).output().context("Running adb")?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).to_string());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        Err(anyhow!("adb error: {stdout} {stderr}"))
    }
}

impl DeviceLiveSync for RealAndroidDevice {
    fn identifier(&self) -> &str {
        self.serial.as_deref().unwrap_or("default")
    }
    fn platform(&self) -> Platform {
        Platform::Android
    }
    fn is_emulator(&self) -> bool {
        self.serial.as_deref().map(|s| s.starts_with("emulator-")).unwrap_or(false)
    }
    fn is_simulator(&self) -> bool {
        false
    }
    fn app_identifier(&self) -> &str {
        &self.app_identifier
    }
    fn device_app_root(&self) -> String {
        self.device_app_root.clone()
    }
    fn build_output_path(&self) -> PathBuf {
        self.build_output.clone()
    }

    fn stop_and_uninstall(&self, app_identifier: &str) -> Result<()> {
        let _ = self.run(&["shell", "am", "force-stop", app_identifier]);
        let _ = self.run(&["uninstall", app_identifier]);
        Ok(())
    }

    fn install(&self, package_path: &Path) -> Result<()> {
        let path_str = package_path.to_string_lossy();
        self.run(&["install", "-r", &path_str]).map(|_| ())
    }

    fn remount_and_reboot(&self) -> Result<()> {
        let _ = self.run(&["root"]);
        let _ = self.run(&["remount", "-R"]);
        self.run(&["wait-for-device"]).map(|_| ())
    }

    fn transfer_directory(&self, local_root: &Path, device_root: &str) -> Result<()> {
        if !local_root.exists() {
            return Ok(());
        }
        let delta = push_delta(local_root);
        for command in device_commands::compose(&delta, local_root, device_root) {
            let args: Vec<&str> = command.iter().map(String::as_str).collect();
            self.run(&args)?;
        }
        Ok(())
    }

    fn transfer_file(&self, local_path: &Path, device_path: &str) -> Result<()> {
        let local = local_path.to_string_lossy();
        self.run(&["push", &local, device_path]).map(|_| ())
    }

    fn remove_device_files(&self, device_paths: &[String]) -> Result<()> {
        for path in device_paths {
            self.run(&["shell", "rm", "-f", path])?;
        }
        Ok(())
    }

    fn refresh_application(&self) -> Result<()> {
        self.run(&["shell", "am", "start", "-S", &self.app_identifier]).map(|_| ())
    }

    fn restart_application(&self) -> Result<()> {
        self.refresh_application()
    }

    fn open_debugger(&self) -> Result<Box<dyn ReadWrite>> {
        Err(anyhow!("debugger socket is iOS-only"))
    }
}

/// Builds a push-only `Delta` (`mkdir` + `copy`, no removals) from everything under
/// `local_root`. A full sync installs into a freshly reinstalled app's private directory, so
/// there is nothing stale on the device side to reconcile away.
fn push_delta(local_root: &Path) -> Delta {
    let mut delta = Delta::default();
    for entry in WalkDir::new(local_root).follow_links(false).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path == local_root {
            continue;
        }
        let path_str = path.to_string_lossy().replace('\\', "/");
        if entry.file_type().is_dir() {
            delta.mkdir.insert(format!("{path_str}/"));
        } else if entry.file_type().is_file() {
            delta.copy.insert(path_str, path.to_path_buf());
        }
    }
    delta
}

pub struct RealIosSimulator {
    udid: String,
    app_identifier: String,
    build_output: PathBuf,
}

impl RealIosSimulator {
    pub fn new(udid: String, app_identifier: String, build_output: PathBuf) -> RealIosSimulator {
        RealIosSimulator { udid, app_identifier, build_output }
    }

    fn simctl(&self, args: &[&str]) -> Result<String> {
        tracing::info!("xcrun simctl {:?}", args);
        let output = Command::new("xcrun").arg("simctl").args(args).output().context("Running xcrun simctl")?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).to_string());
        }
        Err(anyhow!("simctl error: {}", String::from_utf8_lossy(&output.stderr)))
    }
}

impl DeviceLiveSync for RealIosSimulator {
    fn identifier(&self) -> &str {
        &self.udid
    }
    fn platform(&self) -> Platform {
        Platform::Ios
    }
    fn is_emulator(&self) -> bool {
        false
    }
    fn is_simulator(&self) -> bool {
        true
    }
    fn app_identifier(&self) -> &str {
        &self.app_identifier
    }
    fn device_app_root(&self) -> String {
        format!("Containers/Data/Application/{}", self.app_identifier)
    }
    fn build_output_path(&self) -> PathBuf {
        self.build_output.clone()
    }

    fn stop_and_uninstall(&self, app_identifier: &str) -> Result<()> {
        let _ = self.simctl(&["terminate", &self.udid, app_identifier]);
        let _ = self.simctl(&["uninstall", &self.udid, app_identifier]);
        Ok(())
    }

    fn install(&self, package_path: &Path) -> Result<()> {
        let path_str = package_path.to_string_lossy();
        self.simctl(&["install", &self.udid, &path_str]).map(|_| ())
    }

    fn remount_and_reboot(&self) -> Result<()> {
        self.simctl(&["shutdown", &self.udid]).ok();
        self.simctl(&["boot", &self.udid]).map(|_| ())
    }

    fn transfer_directory(&self, _local_root: &Path, _device_root: &str) -> Result<()> {
        Err(anyhow!("simulator sync transfers files individually"))
    }

    fn transfer_file(&self, _local_path: &Path, _device_path: &str) -> Result<()> {
        Ok(())
    }

    fn remove_device_files(&self, _device_paths: &[String]) -> Result<()> {
        Ok(())
    }

    fn refresh_application(&self) -> Result<()> {
        self.simctl(&["launch", &self.udid, &self.app_identifier]).map(|_| ())
    }

    fn restart_application(&self) -> Result<()> {
        let _ = self.simctl(&["terminate", &self.udid, &self.app_identifier]);
        self.refresh_application()
    }

    fn open_debugger(&self) -> Result<Box<dyn ReadWrite>> {
        let stream = TcpStream::connect(("127.0.0.1", ios_debugger::DEBUGGER_PORT))
            .context("Connecting to the iOS debugger socket")?;
        Ok(Box::new(stream))
    }
}
