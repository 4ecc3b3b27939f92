//! Translates a `Delta` into the shell-out commands the Android transport strategy issues
//! against a device. Grounded on `commands.rs::compose`/`command_args`'s diff-to-adb-args shape
//! and `device.rs::mkdir_comes_first_rm_dfs`'s apply-ordering rule, carried over verbatim: mkdir
//! ascending, then push, then rm file, then rm dir descending.
use crate::delta_planner::Delta;
use std::path::Path;

pub type AdbCommand = Vec<String>;

/// `local_root` is the host directory the delta's paths are rooted under (an `OutputLayout`
/// root); `device_root` is where that tree is mirrored on the device.
pub fn compose(delta: &Delta, local_root: &Path, device_root: &str) -> Vec<AdbCommand> {
    let mut commands = Vec::new();

    for dir in &delta.mkdir {
        commands.push(vec![
            "shell".to_string(),
            "mkdir".to_string(),
            "-p".to_string(),
            to_device_path(dir, local_root, device_root),
        ]);
    }
    for (target, source) in &delta.copy {
        commands.push(vec![
            "push".to_string(),
            source.display().to_string(),
            to_device_path(target, local_root, device_root),
        ]);
    }
    for file in &delta.rmfile {
        commands.push(vec!["shell".to_string(), "rm".to_string(), to_device_path(file, local_root, device_root)]);
    }
    for dir in delta.rmdir.iter().rev() {
        commands.push(vec![
            "shell".to_string(),
            "rm".to_string(),
            "-rf".to_string(),
            to_device_path(dir, local_root, device_root),
        ]);
    }

    commands
}

fn to_device_path(local_path: &str, local_root: &Path, device_root: &str) -> String {
    let trimmed = local_path.trim_end_matches('/');
    let rel = Path::new(trimmed)
        .strip_prefix(local_root)
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|_| trimmed.to_string());
    format!("{}/{}", device_root.trim_end_matches('/'), rel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta_planner::Delta;
    use std::path::PathBuf;

    #[test]
    fn commands_follow_mkdir_push_rmfile_rmdir_order() {
        let mut delta = Delta::default();
        delta.mkdir.insert("/proj/out/app/a/".to_string());
        delta.mkdir.insert("/proj/out/app/".to_string());
        delta.copy.insert("/proj/out/app/main.js".to_string(), PathBuf::from("/proj/app/main.js"));
        delta.rmfile.insert("/proj/out/app/old.js".to_string());
        delta.rmdir.insert("/proj/out/app/stale/".to_string());
        delta.rmdir.insert("/proj/out/app/stale/nested/".to_string());

        let commands = compose(&delta, Path::new("/proj/out"), "/sdcard/app");

        assert_eq!(commands[0], vec!["shell", "mkdir", "-p", "/sdcard/app/app"]);
        assert_eq!(commands[1], vec!["shell", "mkdir", "-p", "/sdcard/app/app/a"]);
        assert_eq!(commands[2], vec!["push", "/proj/app/main.js", "/sdcard/app/app/main.js"]);
        assert_eq!(commands[3], vec!["shell", "rm", "/sdcard/app/app/old.js"]);
        assert_eq!(commands[4], vec!["shell", "rm", "-rf", "/sdcard/app/app/stale/nested"]);
        assert_eq!(commands[5], vec!["shell", "rm", "-rf", "/sdcard/app/app/stale"]);
    }
}
