use super::r#trait::{FileMetadata, FileSystem, FileType};
use anyhow::{Context, Result};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// FileSystem backed by `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let meta = fs::symlink_metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        let file_type = meta.file_type();
        let file_type = if file_type.is_symlink() {
            FileType::Symlink
        } else if file_type.is_dir() {
            FileType::Directory
        } else if file_type.is_file() {
            FileType::File
        } else {
            FileType::Other
        };

        Ok(FileMetadata {
            size: meta.len(),
            file_type,
        })
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
    }

    fn read_bytes(&self, path: &Path, max_bytes: usize) -> Result<Vec<u8>> {
        let file =
            fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let mut buffer = Vec::with_capacity(max_bytes.min(64 * 1024));
        file.take(max_bytes as u64)
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(buffer)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path)
            .with_context(|| format!("Failed to canonicalize {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_metadata_and_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "hello world").unwrap();

        let fs = RealFileSystem;
        assert!(fs.metadata(&path).unwrap().is_file());
        assert!(fs.metadata(dir.path()).unwrap().is_dir());
        assert_eq!(fs.read(&path).unwrap(), b"hello world");
        assert_eq!(fs.read_bytes(&path, 5).unwrap(), b"hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_is_not_followed_by_metadata() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target.txt");
        let link = dir.path().join("link.txt");
        fs::write(&target, "x").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let fs = RealFileSystem;
        assert_eq!(fs.metadata(&link).unwrap().file_type, FileType::Symlink);
        assert_eq!(
            fs.canonicalize(&link).unwrap(),
            fs.canonicalize(&target).unwrap()
        );
    }

    #[test]
    fn test_missing_file_errors() {
        let fs = RealFileSystem;
        assert!(fs.metadata(Path::new("/definitely/not/here")).is_err());
    }
}
