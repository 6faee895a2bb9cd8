//! File Materializer
//!
//! Produces an exclusive on-disk snapshot of one branch and filters a caller-selected
//! path list down to regular, non-binary files that really live inside the snapshot.
//! Paths that escape the snapshot root are dropped and reported on the `security`
//! log target; they never reach the caller.

use crate::fs::FileSystem;
use crate::source::{RepoCoordinates, SourceError, SourceHost};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Bytes inspected when sniffing for binary content
const SNIFF_LEN: usize = 8000;

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("failed to create snapshot directory: {0}")]
    Workdir(#[source] std::io::Error),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("snapshot root {path} is not accessible: {message}")]
    Root { path: PathBuf, message: String },

    #[error("none of the {requested} selected files could be read")]
    NoValidFiles { requested: usize },
}

/// One readable file of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the snapshot root, `/`-separated
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Exclusive snapshot directory, removed when dropped
#[derive(Debug)]
pub struct Snapshot {
    dir: TempDir,
}

impl Snapshot {
    /// Creates a fresh, uniquely named directory under `workdir` (system temp if `None`)
    pub fn create(workdir: Option<&Path>) -> Result<Self, MaterializeError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("repoaudit-");
        let dir = match workdir {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(MaterializeError::Workdir)?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(MaterializeError::Workdir)?;

        debug!(path = %dir.path().display(), "Created snapshot directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        debug!(path = %self.dir.path().display(), "Releasing snapshot directory");
    }
}

/// Content sniffing: NUL bytes or invalid UTF-8 in the leading sample mean binary
pub fn is_binary(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(SNIFF_LEN)];
    if sample.contains(&0) {
        return true;
    }
    match std::str::from_utf8(sample) {
        Ok(_) => false,
        // A multi-byte character cut by the sample boundary is still text
        Err(e) => e.error_len().is_some(),
    }
}

/// Filters selected relative paths down to safe, readable text files
pub struct FileSelector {
    fs: Arc<dyn FileSystem>,
    max_file_size: u64,
}

impl FileSelector {
    pub fn new(fs: Arc<dyn FileSystem>, max_file_size: u64) -> Self {
        Self { fs, max_file_size }
    }

    pub fn read_selected(
        &self,
        base: &Path,
        selected: &[String],
    ) -> Result<Vec<SourceFile>, MaterializeError> {
        let root = self
            .fs
            .canonicalize(base)
            .map_err(|e| MaterializeError::Root {
                path: base.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for requested in selected {
            let Some(relative) = self.resolve_inside(&root, requested) else {
                continue;
            };
            if !seen.insert(relative.clone()) {
                continue;
            }
            if let Some(file) = self.read_text(&root.join(&relative), relative) {
                files.push(file);
            }
        }

        if files.is_empty() {
            return Err(MaterializeError::NoValidFiles {
                requested: selected.len(),
            });
        }

        info!(
            requested = selected.len(),
            accepted = files.len(),
            "Read selected files"
        );
        Ok(files)
    }

    /// Resolves `requested` against `root`; returns the normalized relative path only
    /// if the real location stays inside `root`.
    fn resolve_inside(&self, root: &Path, requested: &str) -> Option<String> {
        let trimmed = requested.trim();
        if trimmed.is_empty() {
            return None;
        }

        let candidate = Path::new(trimmed);
        if candidate.has_root()
            || candidate
                .components()
                .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
        {
            warn!(target: "security", path = %trimmed, "Rejected absolute path in file selection");
            return None;
        }

        let resolved = match self.fs.canonicalize(&root.join(candidate)) {
            Ok(resolved) => resolved,
            Err(_) => {
                // `..` may point outside even when the target does not exist
                if candidate.components().any(|c| c == Component::ParentDir) {
                    warn!(target: "security", path = %trimmed, "Rejected path traversal in file selection");
                } else {
                    debug!(path = %trimmed, "Selected file does not exist in snapshot");
                }
                return None;
            }
        };

        let Ok(relative) = resolved.strip_prefix(root) else {
            warn!(
                target: "security",
                path = %trimmed,
                resolved = %resolved.display(),
                "Rejected file selection escaping the snapshot root"
            );
            return None;
        };

        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() || parts[0] == ".git" {
            return None;
        }
        Some(parts.join("/"))
    }

    fn read_text(&self, path: &Path, relative: String) -> Option<SourceFile> {
        let metadata = self.fs.metadata(path).ok()?;
        if !metadata.is_file() {
            debug!(path = %relative, "Skipping non-regular file");
            return None;
        }
        if metadata.len() > self.max_file_size {
            debug!(path = %relative, size = metadata.len(), "Skipping oversized file");
            return None;
        }

        let head = match self.fs.read_bytes(path, SNIFF_LEN) {
            Ok(head) => head,
            Err(e) => {
                warn!(path = %relative, "Failed to read selected file: {}", e);
                return None;
            }
        };
        if is_binary(&head) {
            debug!(path = %relative, "Skipping binary file");
            return None;
        }

        let bytes = match self.fs.read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %relative, "Failed to read selected file: {}", e);
                return None;
            }
        };

        match String::from_utf8(bytes) {
            Ok(content) => Some(SourceFile::new(relative, content)),
            Err(_) => {
                debug!(path = %relative, "Skipping file with invalid UTF-8");
                None
            }
        }
    }
}

/// Snapshot acquisition plus file selection
pub struct Materializer {
    source: Arc<dyn SourceHost>,
    selector: FileSelector,
    workdir: Option<PathBuf>,
}

impl Materializer {
    pub fn new(
        source: Arc<dyn SourceHost>,
        fs: Arc<dyn FileSystem>,
        max_file_size: u64,
        workdir: Option<PathBuf>,
    ) -> Self {
        Self {
            source,
            selector: FileSelector::new(fs, max_file_size),
            workdir,
        }
    }

    /// Checks out `commit_sha` into a fresh snapshot, so the files read are exactly the
    /// ones the recorded commit names. The directory is removed if cloning fails.
    pub async fn materialize(
        &self,
        repo: &RepoCoordinates,
        token: Option<&str>,
        commit_sha: &str,
    ) -> Result<Snapshot, MaterializeError> {
        let snapshot = Snapshot::create(self.workdir.as_deref())?;
        self.source
            .clone_commit(repo, commit_sha, token, snapshot.path())
            .await?;
        Ok(snapshot)
    }

    pub fn read_selected(
        &self,
        base: &Path,
        selected: &[String],
    ) -> Result<Vec<SourceFile>, MaterializeError> {
        self.selector.read_selected(base, selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RealFileSystem;
    use std::fs;

    fn selector() -> FileSelector {
        FileSelector::new(Arc::new(RealFileSystem), 1024 * 1024)
    }

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_binary_sniffing() {
        assert!(!is_binary(b"fn main() {}\n"));
        assert!(is_binary(b"PNG\x00\x01\x02"));
        assert!(is_binary(&[0xff, 0xfe, 0x41]));
        assert!(!is_binary("héllo".as_bytes()));

        // A multi-byte char split exactly at the sniff boundary
        let mut text = "a".repeat(SNIFF_LEN - 1).into_bytes();
        text.extend_from_slice("é".as_bytes());
        assert!(!is_binary(&text));
    }

    #[test]
    fn test_escaping_paths_are_dropped() {
        let outer = TempDir::new().unwrap();
        let root = outer.path().join("repo");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("main.rs"), "fn main() {}").unwrap();
        fs::write(outer.path().join("secret.txt"), "hunter2").unwrap();

        let selected = paths(&[
            "main.rs",
            "../secret.txt",
            "../../etc/passwd",
            "/etc/passwd",
            outer.path().join("secret.txt").to_str().unwrap(),
        ]);
        let files = selector().read_selected(&root, &selected).unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "main.rs");
        assert!(files.iter().all(|f| !f.content.contains("hunter2")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_dropped() {
        let outer = TempDir::new().unwrap();
        let root = outer.path().join("repo");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("ok.txt"), "fine").unwrap();
        fs::write(outer.path().join("secret.txt"), "hunter2").unwrap();
        std::os::unix::fs::symlink(outer.path().join("secret.txt"), root.join("link.txt"))
            .unwrap();

        let files = selector()
            .read_selected(&root, &paths(&["ok.txt", "link.txt"]))
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "ok.txt");
    }

    #[test]
    fn test_directories_binaries_and_duplicates() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("src")).unwrap();
        fs::write(root.path().join("src/lib.rs"), "pub fn x() {}").unwrap();
        fs::write(root.path().join("logo.png"), [0x89u8, 0x50, 0x00, 0x47]).unwrap();

        let files = selector()
            .read_selected(
                root.path(),
                &paths(&["src", "logo.png", "src/lib.rs", "./src/lib.rs", "missing.rs"]),
            )
            .unwrap();

        assert_eq!(files, vec![SourceFile::new("src/lib.rs", "pub fn x() {}")]);
    }

    /// Counts whole-file reads on top of the real file system
    #[derive(Default)]
    struct CountingFs {
        full_reads: std::sync::Mutex<Vec<PathBuf>>,
    }

    impl FileSystem for CountingFs {
        fn metadata(&self, path: &Path) -> anyhow::Result<crate::fs::FileMetadata> {
            RealFileSystem.metadata(path)
        }

        fn read(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
            self.full_reads.lock().unwrap().push(path.to_path_buf());
            RealFileSystem.read(path)
        }

        fn read_bytes(&self, path: &Path, max_bytes: usize) -> anyhow::Result<Vec<u8>> {
            RealFileSystem.read_bytes(path, max_bytes)
        }

        fn canonicalize(&self, path: &Path) -> anyhow::Result<PathBuf> {
            RealFileSystem.canonicalize(path)
        }
    }

    #[test]
    fn test_binary_files_are_rejected_from_their_head() {
        let root = TempDir::new().unwrap();
        let mut blob = vec![0x89u8, 0x50, 0x00, 0x47];
        blob.extend(std::iter::repeat(b'x').take(64 * 1024));
        fs::write(root.path().join("blob.bin"), &blob).unwrap();
        fs::write(root.path().join("lib.rs"), "pub fn x() {}").unwrap();

        let counting = Arc::new(CountingFs::default());
        let files = FileSelector::new(counting.clone(), 1024 * 1024)
            .read_selected(root.path(), &paths(&["blob.bin", "lib.rs"]))
            .unwrap();

        assert_eq!(files.len(), 1);
        let full_reads = counting.full_reads.lock().unwrap();
        assert_eq!(full_reads.len(), 1);
        assert!(full_reads[0].ends_with("lib.rs"));
    }

    #[test]
    fn test_oversized_files_are_skipped() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("big.txt"), "x".repeat(200)).unwrap();
        fs::write(root.path().join("small.txt"), "x").unwrap();

        let files = FileSelector::new(Arc::new(RealFileSystem), 100)
            .read_selected(root.path(), &paths(&["big.txt", "small.txt"]))
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "small.txt");
    }

    #[test]
    fn test_no_valid_files() {
        let root = TempDir::new().unwrap();
        let err = selector()
            .read_selected(root.path(), &paths(&["../x", "nope.rs"]))
            .unwrap_err();
        assert!(matches!(err, MaterializeError::NoValidFiles { requested: 2 }));
    }

    #[test]
    fn test_snapshot_is_removed_on_drop() {
        let workdir = TempDir::new().unwrap();
        let path = {
            let snapshot = Snapshot::create(Some(workdir.path())).unwrap();
            fs::write(snapshot.path().join("f.txt"), "x").unwrap();
            assert!(snapshot
                .path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("repoaudit-"));
            snapshot.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_snapshots_are_distinct() {
        let workdir = TempDir::new().unwrap();
        let a = Snapshot::create(Some(workdir.path())).unwrap();
        let b = Snapshot::create(Some(workdir.path())).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
