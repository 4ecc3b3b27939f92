//! Base-directory enumeration and path joining helpers shared by the rest of the crate.
use std::path::{Path, PathBuf};

/// The two platforms the output layout is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }

    pub fn from_str(s: &str) -> Option<Platform> {
        match s {
            "ios" => Some(Platform::Ios),
            "android" => Some(Platform::Android),
            _ => None,
        }
    }
}

/// The per-target output directory layout described in spec §6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    /// Root of the platform's native project, e.g. `platforms/ios`.
    pub root: PathBuf,
    /// Where the application's own script tree lands.
    pub app: PathBuf,
    /// Where each dependency's scripts land, under `<modules>/<pkg-name>/...`.
    pub modules: PathBuf,
}

impl OutputLayout {
    /// `project_path` is the project root; returned paths are rooted under it.
    pub fn for_platform(platform: Platform, project_path: &Path) -> OutputLayout {
        let base_name = project_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "app".to_string());
        match platform {
            Platform::Ios => {
                let root = project_path.join("platforms/ios");
                let app = root.join(&base_name).join("app");
                let modules = app.join("tns_modules");
                OutputLayout { root, app, modules }
            }
            Platform::Android => {
                let root = project_path.join("platforms/android");
                let app = root.join("src/main/assets/app");
                let modules = app.join("tns_modules");
                OutputLayout { root, app, modules }
            }
        }
    }
}

/// Return all path components of `file_path`, from the file up to (but excluding) `stop_at`.
/// Given `a/b/c/file` and `stop_at = a`, returns `[a/b/c/file, a/b/c, a/b]`.
pub fn ancestors_until(file_path: &Path, stop_at: &Path) -> Vec<PathBuf> {
    file_path
        .ancestors()
        .map(|p| p.to_path_buf())
        .take_while(|p| p != stop_at)
        .collect()
}

/// True if `name` contains the platform-suffix infix `.ios.` / `.android.` etc for some
/// platform other than `current`.
pub fn has_other_platform_suffix(name: &str, current: Platform) -> bool {
    for p in [Platform::Ios, Platform::Android] {
        if p == current {
            continue;
        }
        if name.contains(&format!(".{}.", p.as_str())) {
            return true;
        }
    }
    false
}

/// Replace the current platform's suffix infix with a single `.`, e.g.
/// `x.ios.js` -> `x.js` when `current == Ios`.
pub fn strip_current_platform_suffix(name: &str, current: Platform) -> String {
    name.replace(&format!(".{}.", current.as_str()), ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ios_layout() {
        let layout = OutputLayout::for_platform(Platform::Ios, Path::new("/home/me/MyApp"));
        assert_eq!(PathBuf::from("/home/me/MyApp/platforms/ios"), layout.root);
        assert_eq!(PathBuf::from("/home/me/MyApp/platforms/ios/MyApp/app"), layout.app);
        assert_eq!(
            PathBuf::from("/home/me/MyApp/platforms/ios/MyApp/app/tns_modules"),
            layout.modules
        );
    }

    #[test]
    fn android_layout() {
        let layout = OutputLayout::for_platform(Platform::Android, Path::new("/home/me/MyApp"));
        assert_eq!(PathBuf::from("/home/me/MyApp/platforms/android"), layout.root);
        assert_eq!(
            PathBuf::from("/home/me/MyApp/platforms/android/src/main/assets/app"),
            layout.app
        );
        assert_eq!(
            PathBuf::from("/home/me/MyApp/platforms/android/src/main/assets/app/tns_modules"),
            layout.modules
        );
    }

    #[test]
    fn test_ancestors_stop_at_root() {
        assert_eq!(
            vec![PathBuf::from("some/long/path/file"), PathBuf::from("some/long/path"),],
            ancestors_until(Path::new("some/long/path/file"), Path::new("some/long"))
        );
    }

    #[test]
    fn other_platform_suffix_detection() {
        assert!(has_other_platform_suffix("x.android.js", Platform::Ios));
        assert!(!has_other_platform_suffix("x.ios.js", Platform::Ios));
        assert!(!has_other_platform_suffix("x.js", Platform::Ios));
    }

    #[test]
    fn current_platform_suffix_stripped() {
        assert_eq!("x.js", strip_current_platform_suffix("x.ios.js", Platform::Ios));
        assert_eq!("x.android.js", strip_current_platform_suffix("x.android.js", Platform::Ios));
    }
}
