//! Filesystem backends.
//!
//! Each backend implements [`FileSystem`](crate::FileSystem) and hands out its
//! own [`File`](crate::File) handles.

mod local;
mod memory;

pub use local::{LocalFile, LocalFileSystem};
pub use memory::{AccessPolicy, MemoryFile, MemoryFileSystem};
