use std::fmt;
use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{VfsError, VfsResult};
use crate::file::{FileHandle, UNKNOWN_SIZE};
use crate::path;
use crate::shadow::scratch::{Scratch, ShadowPath};
use crate::shadow::writer::MirrorWriter;

/// Destination of [`ShadowFile::rename_to`].
#[derive(Debug, Clone, Copy)]
pub enum MoveTarget<'a> {
    /// Another adapter: the backend moves the virtual node.
    Shadow(&'a ShadowFile),
    /// A plain host path: only the local shadow moves.
    Local(&'a Path),
}

impl<'a> From<&'a ShadowFile> for MoveTarget<'a> {
    fn from(target: &'a ShadowFile) -> Self {
        MoveTarget::Shadow(target)
    }
}

impl<'a> From<&'a Path> for MoveTarget<'a> {
    fn from(target: &'a Path) -> Self {
        MoveTarget::Local(target)
    }
}

impl<'a> From<&'a PathBuf> for MoveTarget<'a> {
    fn from(target: &'a PathBuf) -> Self {
        MoveTarget::Local(target.as_path())
    }
}

enum ListFilter<'f> {
    All,
    Name(&'f mut dyn FnMut(&Path, &str) -> bool),
    Attributes(&'f mut dyn FnMut(&ShadowFile) -> bool),
}

/// A virtual node exposed through a local host path.
///
/// The backend stays authoritative: queries and mutations go to the virtual
/// node, and the shadow copy only exists so host tools have a real path to
/// open. The shadow is removed when the adapter is dropped.
pub struct ShadowFile {
    file: FileHandle,
    shadow: ShadowPath,
}

impl fmt::Debug for ShadowFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowFile")
            .field("path", &self.file.path())
            .field("shadow", &self.shadow.as_path())
            .finish()
    }
}

impl ShadowFile {
    /// Bind `file` to a fresh shadow path and materialize it.
    ///
    /// A plain file is copied in full; a directory gets an empty placeholder;
    /// a missing node gets nothing.
    pub fn bind(file: FileHandle, scratch: &Arc<Scratch>) -> VfsResult<Self> {
        let shadow = scratch.allocate()?;
        let bound = Self { file, shadow };
        bound.materialize()?;
        Ok(bound)
    }

    fn materialize(&self) -> VfsResult<()> {
        let target = self.shadow.as_path();
        let _span = tracing::debug_span!(
            "materialize",
            path = %self.file.path(),
            shadow = %target.display()
        )
        .entered();

        if !self.file.exists()? {
            return Ok(());
        }
        if self.file.is_directory()? {
            return match fs::create_dir(target) {
                Err(e) if e.kind() != io::ErrorKind::AlreadyExists => Err(e.into()),
                _ => Ok(()),
            };
        }

        let copied = match self.copy_content() {
            Ok(n) => n,
            Err(e) => {
                if let Err(rm) = self.shadow.remove() {
                    tracing::warn!(error = %rm, "failed to remove partial shadow");
                }
                return Err(e);
            }
        };
        self.shadow.scratch().record_materialization(copied);
        tracing::debug!(bytes = copied, "materialized");
        Ok(())
    }

    fn copy_content(&self) -> VfsResult<u64> {
        let capacity = self.shadow.scratch().copy_buffer_size();
        let mut reader = BufReader::with_capacity(capacity, self.file.reader()?);
        let mut out = BufWriter::with_capacity(capacity, fs::File::create(self.shadow.as_path())?);
        let copied = io::copy(&mut reader, &mut out)?;
        out.flush()?;
        Ok(copied)
    }

    /// Re-copy the backend content into the shadow.
    pub fn refresh(&self) -> VfsResult<()> {
        self.shadow.remove()?;
        self.materialize()
    }

    /// The virtual node.
    pub fn file(&self) -> &FileHandle {
        &self.file
    }

    /// The local host path of the shadow.
    pub fn local_path(&self) -> &Path {
        self.shadow.as_path()
    }

    /// Virtual path of the node.
    pub fn path(&self) -> &str {
        self.file.path()
    }

    /// Log a backend error and fall back to a host-style answer.
    fn or_host<T>(&self, op: &'static str, result: VfsResult<T>, fallback: T) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(op, path = %self.file.path(), error = %e, "backend call failed");
                fallback
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn exists(&self) -> bool {
        self.or_host("exists", self.file.exists(), false)
    }

    pub fn is_dir(&self) -> bool {
        self.or_host("is_dir", self.file.is_directory(), false)
    }

    pub fn is_file(&self) -> bool {
        self.or_host("is_file", self.file.is_file(), false)
    }

    pub fn can_read(&self) -> bool {
        self.or_host("can_read", self.file.is_readable(), false)
    }

    pub fn can_write(&self) -> bool {
        self.or_host("can_write", self.file.is_writable(), false)
    }

    /// Dot-files are hidden.
    pub fn is_hidden(&self) -> bool {
        self.name().is_some_and(|n| n.starts_with('.'))
    }

    /// Content length, or [`UNKNOWN_SIZE`].
    pub fn size(&self) -> i64 {
        self.or_host("size", self.file.size(), UNKNOWN_SIZE)
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.or_host("modified", self.file.last_modified(), None)
    }

    pub fn name(&self) -> Option<&str> {
        self.file.name()
    }

    pub fn content_type(&self) -> Option<String> {
        self.or_host("content_type", self.file.content_type().map(Some), None)
    }

    /// Adapter over the parent node; `None` for the root, a missing node, or
    /// on error.
    pub fn parent(&self) -> Option<ShadowFile> {
        let parent = self.or_host("parent", self.file.parent(), None)?;
        let bound = ShadowFile::bind(parent, self.shadow.scratch());
        self.or_host("parent", bound.map(Some), None)
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Reader over the backend content.
    pub fn open_read(&self) -> VfsResult<Box<dyn Read + Send>> {
        self.file.reader()
    }

    /// Writer to the backend that also replaces the shadow content.
    ///
    /// The shadow is opened before the backend writer, which truncates the
    /// node, so a failure here never costs backend content. A refused backend
    /// leaves the shadow untouched.
    pub fn open_write(&self) -> VfsResult<MirrorWriter> {
        if self.shadow.scratch().is_closed() {
            return Err(VfsError::other("scratch area is closed"));
        }
        let target = self.shadow.as_path();
        let had_shadow = target.exists();
        let shadow = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(target)?;
        let backend = match self.file.writer() {
            Ok(w) => w,
            Err(e) => {
                if !had_shadow && let Err(rm) = self.shadow.remove() {
                    tracing::warn!(error = %rm, "failed to remove unused shadow");
                }
                return Err(e);
            }
        };
        if let Err(e) = shadow.set_len(0) {
            tracing::warn!(path = %self.file.path(), error = %e, "failed to truncate shadow");
        }
        Ok(MirrorWriter::new(
            backend,
            shadow,
            self.shadow.scratch().copy_buffer_size(),
        ))
    }

    // ========================================================================
    // Management
    // ========================================================================

    /// Delete the backend node, then the shadow.
    ///
    /// On backend failure the shadow is left alone.
    pub fn delete(&self) -> bool {
        let deleted = self.or_host("delete", self.file.delete().map(|()| true), false);
        if deleted && let Err(e) = self.shadow.remove() {
            tracing::warn!(path = %self.file.path(), error = %e, "failed to remove shadow after delete");
        }
        deleted
    }

    /// Create an empty node. Only valid when the node is missing and its
    /// parent is an existing directory. No shadow content is produced.
    pub fn create_new_file(&self) -> bool {
        let result = self.try_create_new_file();
        self.or_host("create_new_file", result, false)
    }

    fn try_create_new_file(&self) -> VfsResult<bool> {
        if self.file.exists()? {
            return Ok(false);
        }
        let Some(parent) = path::parent(self.file.path()) else {
            return Ok(false);
        };
        if !self.file.resolve(parent)?.is_directory()? {
            return Ok(false);
        }
        drop(self.file.writer()?);
        Ok(true)
    }

    /// Create this node as a directory, along with missing ancestors.
    pub fn mkdir(&self) -> bool {
        self.or_host("mkdir", self.file.mkdir().map(|()| true), false)
    }

    /// Same as [`mkdir`](Self::mkdir): the backend already creates ancestors.
    pub fn mkdirs(&self) -> bool {
        self.or_host("mkdirs", self.file.mkdir().map(|()| true), false)
    }

    /// Move the node.
    ///
    /// Onto another adapter the backend moves the virtual node and no local
    /// file moves. Onto a host path only the shadow moves.
    pub fn rename_to<'a>(&self, dest: impl Into<MoveTarget<'a>>) -> bool {
        match dest.into() {
            MoveTarget::Shadow(target) => self.or_host(
                "rename_to",
                self.file.move_to(&**target.file()).map(|()| true),
                false,
            ),
            MoveTarget::Local(target) => {
                let moved: VfsResult<()> = fs::rename(self.shadow.as_path(), target).map_err(Into::into);
                self.or_host("rename_to", moved.map(|()| true), false)
            }
        }
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// Adapters over every current child.
    pub fn list_files(&self) -> VfsResult<Vec<ShadowFile>> {
        self.list(ListFilter::All)
    }

    /// Adapters over children whose name passes `filter`.
    ///
    /// The filter sees the parent's local path and the child's name, and runs
    /// before anything is copied.
    pub fn list_files_by_name(
        &self,
        mut filter: impl FnMut(&Path, &str) -> bool,
    ) -> VfsResult<Vec<ShadowFile>> {
        self.list(ListFilter::Name(&mut filter))
    }

    /// Adapters over children that pass `filter`.
    ///
    /// Each candidate is materialized before the filter sees it; rejected
    /// candidates are dropped again.
    pub fn list_files_by(
        &self,
        mut filter: impl FnMut(&ShadowFile) -> bool,
    ) -> VfsResult<Vec<ShadowFile>> {
        self.list(ListFilter::Attributes(&mut filter))
    }

    fn list(&self, mut filter: ListFilter<'_>) -> VfsResult<Vec<ShadowFile>> {
        let scratch = self.shadow.scratch();
        let local = self.shadow.as_path();
        let mut out = Vec::new();

        for child in self.file.children()? {
            let child = child?;
            if let ListFilter::Name(accept) = &mut filter
                && !accept(local, child.name().unwrap_or_default())
            {
                continue;
            }
            let bound = ShadowFile::bind(child, scratch)?;
            if let ListFilter::Attributes(accept) = &mut filter
                && !accept(&bound)
            {
                continue;
            }
            out.push(bound);
        }

        tracing::debug!(path = %self.file.path(), count = out.len(), "listed children");
        Ok(out)
    }
}
