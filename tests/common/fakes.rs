//! Fake `DeviceLiveSync` for whole-program/partial-program integration tests. Grounded on
//! `adevice`'s `tests/common/fakes.rs::FakeDevice` (a recording stand-in for the real adb
//! device), adapted from "record adb commands" to "record live-sync calls" since this crate's
//! `DeviceLiveSync` trait has no adb-specific vocabulary.
use livesync::ios_debugger::ReadWrite;
use livesync::live_sync_coordinator::DeviceLiveSync;
use livesync::path_util::Platform;
use anyhow::Result;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct FakeDevice {
    identifier: String,
    platform: Platform,
    app_identifier: String,
    device_app_root: String,
    build_output_path: PathBuf,
    transferred_files: Mutex<Vec<PathBuf>>,
    calls: Mutex<Vec<String>>,
}

impl FakeDevice {
    pub fn new(platform: Platform, build_output_path: PathBuf) -> FakeDevice {
        FakeDevice {
            identifier: "fake-device".to_string(),
            platform,
            app_identifier: "org.example.app".to_string(),
            device_app_root: "/data/local/tmp/app".to_string(),
            build_output_path,
            transferred_files: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn transferred_files(&self) -> Vec<PathBuf> {
        self.transferred_files.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

impl DeviceLiveSync for FakeDevice {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn is_emulator(&self) -> bool {
        false
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
        self.build_output_path.clone()
    }

    fn stop_and_uninstall(&self, _app_identifier: &str) -> Result<()> {
        self.record("stop_and_uninstall");
        Ok(())
    }

    fn install(&self, _package_path: &Path) -> Result<()> {
        self.record("install");
        Ok(())
    }

    fn remount_and_reboot(&self) -> Result<()> {
        self.record("remount_and_reboot");
        Ok(())
    }

    fn transfer_directory(&self, _local_root: &Path, _device_root: &str) -> Result<()> {
        self.record("transfer_directory");
        Ok(())
    }

    fn transfer_file(&self, local_path: &Path, _device_path: &str) -> Result<()> {
        self.record("transfer_file");
        self.transferred_files.lock().unwrap().push(local_path.to_path_buf());
        Ok(())
    }

    fn remove_device_files(&self, _device_paths: &[String]) -> Result<()> {
        self.record("remove_device_files");
        Ok(())
    }

    fn refresh_application(&self) -> Result<()> {
        self.record("refresh_application");
        Ok(())
    }

    fn restart_application(&self) -> Result<()> {
        self.record("restart_application");
        Ok(())
    }

    fn open_debugger(&self) -> Result<Box<dyn ReadWrite>> {
        self.record("open_debugger");
        Ok(Box::new(Cursor::new(Vec::new())))
    }
}
