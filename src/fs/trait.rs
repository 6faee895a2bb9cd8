//! FileSystem trait definition

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Metadata about a file
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub file_type: FileType,
}

/// Type of file system entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Symlink,
    /// Sockets, fifos, devices
    Other,
}

impl FileMetadata {
    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Abstraction over file system operations for testability
pub trait FileSystem: Send + Sync {
    /// Metadata of the entry itself (symlinks are not followed)
    fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Read the whole file
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Read first N bytes of file (for binary detection)
    fn read_bytes(&self, path: &Path, max_bytes: usize) -> Result<Vec<u8>>;

    /// Resolve symlinks and `..` components into an absolute path
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;
}
