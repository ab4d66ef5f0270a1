//! The file capability contract.
//!
//! [`FileSystem`] resolves paths into [`File`] handles; a `File` is a node in
//! the hierarchy that can be queried, read, written and managed without
//! knowing which backend holds it.
//!
//! Everything here is synchronous: any call may block on backend I/O.

use std::any::Any;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

use kagami_types::Principal;

use crate::error::VfsResult;
use crate::event::EventSink;
use crate::features::Reasoned;
use crate::path;

/// Size reported when it cannot be determined (including missing nodes).
pub const UNKNOWN_SIZE: i64 = -1;

/// Shared handle to a resolved node.
pub type FileHandle = Arc<dyn File>;

/// One traversal over a node's direct children.
///
/// Finite and lazy. Calling [`File::children`] again starts a fresh read of
/// the backend. An `Err` item ends the traversal as a failure.
pub type Children = Box<dyn Iterator<Item = VfsResult<FileHandle>> + Send>;

/// A node in a virtual hierarchy.
///
/// Handles are cheap views: they carry a path and (optionally) a principal, and
/// ask the backend on every query. A handle does not hold its parent; the
/// parent is resolved on demand.
pub trait File: Send + Sync + fmt::Debug {
    // ========================================================================
    // State
    // ========================================================================

    /// Whether the node exists in the backend.
    fn exists(&self) -> VfsResult<bool>;

    /// Whether the node contains other nodes.
    fn is_directory(&self) -> VfsResult<bool>;

    /// Whether the node holds content.
    fn is_file(&self) -> VfsResult<bool>;

    /// Whether the bound principal may read the node.
    fn is_readable(&self) -> VfsResult<bool>;

    /// Whether the bound principal may change the node.
    fn is_writable(&self) -> VfsResult<bool>;

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Resolve a relative or absolute path against this node.
    ///
    /// Absolute paths are anchored at the filesystem root. The result inherits
    /// this node's principal.
    fn resolve(&self, path: &str) -> VfsResult<FileHandle>;

    /// The filesystem that owns this node.
    fn file_system(&self) -> Arc<dyn FileSystem>;

    /// The parent node.
    ///
    /// `None` for the root *and* for a node that does not exist; tell them
    /// apart with [`File::exists`].
    fn parent(&self) -> VfsResult<Option<FileHandle>>;

    /// Absolute path; the root is `"/"`.
    fn path(&self) -> &str;

    /// Last path segment; `None` only for the root.
    fn name(&self) -> Option<&str> {
        path::name(self.path())
    }

    /// Direct children, re-read from the backend on every call.
    fn children(&self) -> VfsResult<Children>;

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Content length in bytes, or [`UNKNOWN_SIZE`].
    fn size(&self) -> VfsResult<i64>;

    /// Content type. Directories have one too.
    fn content_type(&self) -> VfsResult<String>;

    /// Last modification time, `None` when unknown or missing.
    fn last_modified(&self) -> VfsResult<Option<SystemTime>>;

    // ========================================================================
    // Content
    // ========================================================================

    /// Open the content for reading. The node must hold content.
    fn reader(&self) -> VfsResult<Box<dyn Read + Send>>;

    /// Open the content for writing, creating the node if it is missing.
    fn writer(&self) -> VfsResult<Box<dyn Write + Send>>;

    // ========================================================================
    // Management
    // ========================================================================

    /// Create this node as a directory, along with any missing ancestors.
    ///
    /// Fails if the node already exists.
    fn mkdir(&self) -> VfsResult<()>;

    /// Remove this node.
    fn delete(&self) -> VfsResult<()>;

    /// Relocate this node onto `target`.
    ///
    /// The principal bound to `self` is not carried over: `target` may live
    /// in another filesystem altogether.
    fn move_to(&self, target: &dyn File) -> VfsResult<()>;

    // ========================================================================
    // Identity
    // ========================================================================

    /// The principal this handle acts as.
    fn principal(&self) -> Option<&Principal>;

    /// A handle on the same node acting as `principal`.
    ///
    /// Fails with [`VfsError::AccessDenied`](crate::VfsError::AccessDenied)
    /// if the backend rejects the principal.
    fn clone_for(&self, principal: Option<Principal>) -> VfsResult<FileHandle>;

    /// The optional [`Reasoned`] capability.
    fn reasoned(&self) -> Option<&dyn Reasoned> {
        None
    }

    /// Downcast support so backends can recognise their own targets.
    fn as_any(&self) -> &dyn Any;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Read the entire content.
    fn read_all(&self) -> VfsResult<Vec<u8>> {
        let mut reader = self.reader()?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Replace the entire content, creating the node if needed.
    fn write_all(&self, data: &[u8]) -> VfsResult<()> {
        let mut writer = self.writer()?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }
}

/// Resolves paths into [`File`] handles.
///
/// The filesystem does not remember a principal: every resolution names its
/// own. After [`FileSystem::close`] every operation fails.
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Resolve a path against the root as `principal`.
    ///
    /// Relative paths are still evaluated against the root. The principal may
    /// change what the caller sees.
    fn resolve_as(&self, path: &str, principal: Option<&Principal>) -> VfsResult<FileHandle>;

    /// Resolve a path against the root with no principal.
    fn resolve(&self, path: &str) -> VfsResult<FileHandle> {
        self.resolve_as(path, None)
    }

    /// Sink receiving change notifications.
    fn events(&self) -> Arc<dyn EventSink>;

    /// Release backend resources. Closing twice is a no-op.
    fn close(&self) -> VfsResult<()>;

    /// Whether [`FileSystem::close`] has been called.
    fn is_closed(&self) -> bool;
}
