//! Abstraction over the filesystem surface the rest of the crate needs.
//! Blocking calls only, matching the direct `std::fs`/`walkdir` use in
//! `fingerprint.rs` and `tracking.rs` -- there is exactly one implementation (`FileStore`)
//! rather than a trait, since nothing here needs to be faked in isolation; callers needing a
//! fake filesystem use a real `tempfile::TempDir` instead, the same way those modules' own tests do.
use anyhow::{Context, Result};
use hex::encode;
use ring::digest::{Context as DigestContext, SHA256};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub kind: EntryKind,
    /// Milliseconds since the Unix epoch.
    pub mtime_ms: i64,
}

#[derive(Default, Clone, Copy)]
pub struct FileStore;

impl FileStore {
    pub fn new() -> FileStore {
        FileStore
    }

    pub fn read_text(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))
    }

    pub fn write_text(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating parent dir for {}", path.display()))?;
        }
        fs::write(path, contents).with_context(|| format!("Writing {}", path.display()))
    }

    /// Parses `path` as JSON, tolerating a leading UTF-8 BOM the way the package manifest
    /// reader in `PackageGraph` needs to (spec §4.1 step 3).
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let raw = fs::read(path).with_context(|| format!("Reading {}", path.display()))?;
        let text = strip_bom(&raw)
            .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Parsing JSON {}", path.display()))
    }

    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating parent dir for {}", path.display()))?;
        }
        let file = fs::File::create(path)
            .with_context(|| format!("Creating {}", path.display()))?;
        serde_json::to_writer_pretty(file, value)
            .with_context(|| format!("Writing JSON {}", path.display()))
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    pub fn stat(&self, path: &Path) -> Result<Option<Stat>> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Stat {}", path.display())),
        };
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else if metadata.file_type().is_symlink() {
            EntryKind::Symlink
        } else {
            EntryKind::File
        };
        let mtime_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Ok(Some(Stat { kind, mtime_ms }))
    }

    /// Non-recursive listing of direct children, relative names only.
    pub fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in
            fs::read_dir(path).with_context(|| format!("Listing {}", path.display()))?
        {
            entries.push(entry?.path());
        }
        Ok(entries)
    }

    /// Recursive listing of every file and directory under `root`, following no symlinks,
    /// grounded on `fingerprint.rs::fingerprint_partitions`'s use of `WalkDir`.
    pub fn walk(&self, root: &Path) -> Vec<PathBuf> {
        if !root.exists() {
            return Vec::new();
        }
        WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.path().to_path_buf())
            .collect()
    }

    pub fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating parent dir for {}", to.display()))?;
        }
        fs::copy(from, to)
            .with_context(|| format!("Copying {} -> {}", from.display(), to.display()))?;
        Ok(())
    }

    pub fn create_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("Creating dir {}", path.display()))
    }

    /// Non-recursive directory removal; fails if non-empty. Used by `DeltaPlanner::apply`,
    /// which only ever queues a directory for removal after its contents were already queued.
    pub fn remove_empty_dir(&self, path: &Path) -> Result<()> {
        match fs::remove_dir(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Removing dir {}", path.display())),
        }
    }

    pub fn remove_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Removing file {}", path.display())),
        }
    }

    /// Sha256 of file contents, lowercase hex. Used for delta source identity, not the
    /// sha1-based change-suppression hash used by `LiveSyncCoordinator` (see that module).
    pub fn hash(&self, path: &Path) -> Result<String> {
        let input = fs::File::open(path).with_context(|| format!("Opening {}", path.display()))?;
        let mut reader = io::BufReader::new(input);
        let mut context = DigestContext::new(&SHA256);
        let mut buffer = [0; 4096];
        loop {
            let num_bytes_read = reader.read(&mut buffer)?;
            if num_bytes_read == 0 {
                break;
            }
            context.update(&buffer[..num_bytes_read]);
        }
        Ok(encode(context.finish().as_ref()))
    }

    /// A temp file name under `dir` that does not currently exist, for atomic-write staging.
    pub fn unique_temp_name(&self, dir: &Path, prefix: &str) -> Result<PathBuf> {
        let tmp = tempfile::Builder::new()
            .prefix(prefix)
            .tempfile_in(dir)
            .with_context(|| format!("Creating temp file under {}", dir.display()))?;
        let (_, path) = tmp.keep().context("Persisting temp file path")?;
        Ok(path)
    }
}

fn strip_bom(raw: &[u8]) -> Result<String, std::string::FromUtf8Error> {
    const BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
    if raw.starts_with(&BOM) {
        String::from_utf8(raw[3..].to_vec())
    } else {
        String::from_utf8(raw.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_json_tolerates_bom() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("package.json");
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(br#"{"version": "1.0.0"}"#);
        fs::write(&path, bytes).unwrap();

        #[derive(serde::Deserialize)]
        struct Manifest {
            version: String,
        }
        let manifest: Manifest = FileStore::new().read_json(&path).unwrap();
        assert_eq!("1.0.0", manifest.version);
    }

    #[test]
    fn write_then_read_json_roundtrips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/prepareinfo.json");
        let store = FileStore::new();
        store.write_json(&path, &serde_json::json!({"time": "123", "bundle": false})).unwrap();
        let value: serde_json::Value = store.read_json(&path).unwrap();
        assert_eq!("123", value["time"]);
    }

    #[test]
    fn stat_distinguishes_kinds() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, "hi").unwrap();
        let store = FileStore::new();
        assert_eq!(EntryKind::File, store.stat(&file).unwrap().unwrap().kind);
        assert_eq!(EntryKind::Directory, store.stat(dir.path()).unwrap().unwrap().kind);
        assert_eq!(None, store.stat(&dir.path().join("missing")).unwrap());
    }

    #[test]
    fn hash_is_stable_sha256() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, "This is a test\nof a small file.\n").unwrap();
        assert_eq!(
            "a519d054afdf2abfbdd90a738d248f606685d6c187e96390bde22e958240449e",
            FileStore::new().hash(&file).unwrap()
        );
    }

    #[test]
    fn copy_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("src");
        fs::write(&from, "data").unwrap();
        let to = dir.path().join("a/b/c/dest");
        FileStore::new().copy(&from, &to).unwrap();
        assert_eq!("data", fs::read_to_string(&to).unwrap());
    }
}
