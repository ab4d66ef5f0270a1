//! Virtual file contract and host-path shadow adapter.
//!
//! Key components:
//!
//! - [`File`] / [`FileSystem`] - the capability contract every backend
//!   implements
//! - [`MemoryFileSystem`] - in-memory tree with per-principal access policy
//! - [`LocalFileSystem`] - a host directory exposed as a virtual tree
//! - [`ShadowFile`] - a virtual node exposed through a real local path
//! - [`Scratch`] - owns shadow copies and sweeps orphans
//!
//! ## Design Decisions
//!
//! - **Backend is authoritative**: shadows are copies made at bind time and
//!   never written back.
//! - **Synchronous**: every call blocks on backend I/O.
//! - **Two error kinds**: [`VfsError::Io`] for everything a backend can hit,
//!   [`VfsError::AccessDenied`] for principal rebinding.
//! - **RAII cleanup**: dropping a [`ShadowFile`] removes its shadow.

pub mod backends;
mod config;
mod error;
mod event;
mod features;
mod file;
pub mod path;
pub mod shadow;
mod types;

pub use backends::{AccessPolicy, LocalFile, LocalFileSystem, MemoryFile, MemoryFileSystem};
pub use config::{ConfigError, DEFAULT_COPY_BUFFER_SIZE, ShadowConfig};
pub use error::{VfsError, VfsResult};
pub use event::{Event, EventLog, EventSink, EventType, NullSink};
pub use features::Reasoned;
pub use file::{Children, File, FileHandle, FileSystem, UNKNOWN_SIZE};
pub use shadow::{MirrorWriter, MoveTarget, Scratch, ScratchStats, ShadowFile, ShadowPath};
pub use types::{
    DEFAULT_CONTENT_TYPE, DIRECTORY_CONTENT_TYPE, FileInfo, FileKind, content_type_for,
};

pub use kagami_types::{Principal, PrincipalId};
