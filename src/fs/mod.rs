//! File system abstraction used by the materializer

mod real;
mod r#trait;

pub use real::RealFileSystem;
pub use r#trait::{FileMetadata, FileSystem, FileType};
