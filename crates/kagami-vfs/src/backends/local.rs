//! Local filesystem backend.
//!
//! Exposes a host directory as a virtual hierarchy. Virtual paths never leave
//! the root: `..` is clamped during normalization, and symlinks that point
//! outside the root are refused.

use std::any::Any;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use kagami_types::Principal;

use crate::error::{VfsError, VfsResult};
use crate::event::{Event, EventSink, EventType, NullSink, bracket};
use crate::file::{Children, File, FileHandle, FileSystem, UNKNOWN_SIZE};
use crate::path::{self, ROOT};
use crate::types::{DIRECTORY_CONTENT_TYPE, content_type_for};

/// Symlink hops followed before a path is treated as escaping.
const MAX_LINK_HOPS: usize = 40;

struct Inner {
    root: PathBuf,
    read_only: bool,
    events: Arc<dyn EventSink>,
    closed: AtomicBool,
}

/// Local filesystem backend.
///
/// All paths are relative to `root`. If `root` is `/home/amy/project`, then
/// `/src/main.rs` maps to `/home/amy/project/src/main.rs`.
#[derive(Clone)]
pub struct LocalFileSystem {
    inner: Arc<Inner>,
}

impl fmt::Debug for LocalFileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFileSystem")
            .field("root", &self.inner.root)
            .field("read_only", &self.inner.read_only)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LocalFileSystem {
    /// Expose `root` read-write.
    pub fn new(root: impl AsRef<Path>) -> VfsResult<Self> {
        Self::with_options(root, false, Arc::new(NullSink))
    }

    /// Expose `root` read-only.
    pub fn read_only(root: impl AsRef<Path>) -> VfsResult<Self> {
        Self::with_options(root, true, Arc::new(NullSink))
    }

    /// Expose `root` with explicit options.
    ///
    /// The root is canonicalized up front so symlinked roots (macOS `/tmp`)
    /// compare correctly, and must be an existing directory.
    pub fn with_options(
        root: impl AsRef<Path>,
        read_only: bool,
        events: Arc<dyn EventSink>,
    ) -> VfsResult<Self> {
        let root = root.as_ref();
        let root = dunce::canonicalize(root)
            .map_err(|e| VfsError::other(format!("cannot open root {}: {e}", root.display())))?;
        if !root.is_dir() {
            return Err(VfsError::not_a_directory(root.display().to_string()));
        }
        tracing::debug!(root = %root.display(), read_only, "opened local file system");

        Ok(Self {
            inner: Arc::new(Inner {
                root,
                read_only,
                events,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// The canonical host root.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    fn ensure_open(&self) -> VfsResult<()> {
        if self.is_closed() {
            Err(VfsError::closed())
        } else {
            Ok(())
        }
    }

    /// Map a normalized virtual path onto the host.
    ///
    /// The deepest existing ancestor is canonicalized so a symlink cannot
    /// lead outside the root.
    fn host_path(&self, vpath: &str) -> VfsResult<PathBuf> {
        let rel = path::relative(vpath);
        let full = if rel.is_empty() {
            self.inner.root.clone()
        } else {
            self.inner.root.join(rel)
        };

        if !self.stays_inside(&full) {
            return Err(VfsError::permission_denied(format!(
                "{vpath} escapes {}",
                self.inner.root.display()
            )));
        }
        Ok(full)
    }

    /// Whether `full` resolves inside the root.
    ///
    /// Dangling symlinks are followed by hand, since canonicalization cannot
    /// see through them but a later create would.
    fn stays_inside(&self, full: &Path) -> bool {
        let mut current = full.to_path_buf();
        for _ in 0..MAX_LINK_HOPS {
            let mut anchor = current.as_path();
            while anchor.symlink_metadata().is_err() {
                match anchor.parent() {
                    Some(p) => anchor = p,
                    None => break,
                }
            }
            let next = match dunce::canonicalize(anchor) {
                Ok(canonical) => return canonical.starts_with(&self.inner.root),
                Err(_) => {
                    let Ok(target) = fs::read_link(anchor) else {
                        return false;
                    };
                    let base = anchor.parent().unwrap_or(anchor);
                    let resolved = base.join(target);
                    match current.strip_prefix(anchor) {
                        Ok(rest) if !rest.as_os_str().is_empty() => resolved.join(rest),
                        _ => resolved,
                    }
                }
            };
            current = next;
        }
        false
    }

    fn file(&self, path: String, principal: Option<Principal>) -> LocalFile {
        LocalFile {
            fs: self.clone(),
            path,
            principal,
        }
    }
}

impl FileSystem for LocalFileSystem {
    fn resolve_as(&self, path: &str, principal: Option<&Principal>) -> VfsResult<FileHandle> {
        self.ensure_open()?;
        let path = path::normalize(path)?;
        Ok(Arc::new(self.file(path, principal.cloned())))
    }

    fn events(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.inner.events)
    }

    fn close(&self) -> VfsResult<()> {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(root = %self.inner.root.display(), "closing local file system");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// A node in a [`LocalFileSystem`].
pub struct LocalFile {
    fs: LocalFileSystem,
    path: String,
    principal: Option<Principal>,
}

impl fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFile")
            .field("path", &self.path)
            .field("principal", &self.principal.as_ref().map(|p| &p.username))
            .finish()
    }
}

impl LocalFile {
    fn sibling(&self, path: String) -> LocalFile {
        self.fs.file(path, self.principal.clone())
    }

    fn handle(&self) -> FileHandle {
        Arc::new(self.sibling(self.path.clone()))
    }

    fn host(&self) -> VfsResult<PathBuf> {
        self.fs.ensure_open()?;
        self.fs.host_path(&self.path)
    }

    fn metadata(&self) -> VfsResult<Option<fs::Metadata>> {
        let host = self.host()?;
        match fs::metadata(&host) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn check_writable(&self) -> VfsResult<()> {
        self.fs.ensure_open()?;
        if self.fs.inner.read_only {
            Err(VfsError::permission_denied(format!("{} (read-only)", self.path)))
        } else {
            Ok(())
        }
    }
}

impl File for LocalFile {
    fn exists(&self) -> VfsResult<bool> {
        Ok(self.metadata()?.is_some())
    }

    fn is_directory(&self) -> VfsResult<bool> {
        Ok(self.metadata()?.is_some_and(|m| m.is_dir()))
    }

    fn is_file(&self) -> VfsResult<bool> {
        Ok(self.metadata()?.is_some_and(|m| m.is_file()))
    }

    fn is_readable(&self) -> VfsResult<bool> {
        let host = self.host()?;
        Ok(match self.metadata()? {
            Some(m) if m.is_dir() => fs::read_dir(&host).is_ok(),
            Some(_) => fs::File::open(&host).is_ok(),
            None => false,
        })
    }

    fn is_writable(&self) -> VfsResult<bool> {
        if self.fs.inner.read_only {
            return Ok(false);
        }
        Ok(self
            .metadata()?
            .is_some_and(|m| !m.permissions().readonly()))
    }

    fn resolve(&self, path: &str) -> VfsResult<FileHandle> {
        self.fs.ensure_open()?;
        let path = path::join(&self.path, path)?;
        Ok(Arc::new(self.sibling(path)))
    }

    fn file_system(&self) -> Arc<dyn FileSystem> {
        Arc::new(self.fs.clone())
    }

    fn parent(&self) -> VfsResult<Option<FileHandle>> {
        let Some(parent) = path::parent(&self.path) else {
            return Ok(None);
        };
        if !self.exists()? {
            return Ok(None);
        }
        Ok(Some(Arc::new(self.sibling(parent.to_string()))))
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn children(&self) -> VfsResult<Children> {
        let host = self.host()?;
        if !host.is_dir() {
            return Err(VfsError::not_a_directory(&self.path));
        }

        let mut names = fs::read_dir(&host)?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<io::Result<Vec<OsString>>>()?;
        names.sort();

        let fs = self.fs.clone();
        let base = self.path.clone();
        let principal = self.principal.clone();
        Ok(Box::new(names.into_iter().map(move |name| -> VfsResult<FileHandle> {
            fs.ensure_open()?;
            let name = name.into_string().map_err(|raw| {
                VfsError::invalid_path(format!("{base}/{}", raw.to_string_lossy()))
            })?;
            let path = path::join(&base, &name)?;
            Ok(Arc::new(fs.file(path, principal.clone())) as FileHandle)
        })))
    }

    fn size(&self) -> VfsResult<i64> {
        Ok(match self.metadata()? {
            Some(m) if m.is_file() => m.len() as i64,
            _ => UNKNOWN_SIZE,
        })
    }

    fn content_type(&self) -> VfsResult<String> {
        Ok(match self.metadata()? {
            Some(m) if m.is_dir() => DIRECTORY_CONTENT_TYPE.to_string(),
            _ => content_type_for(self.name().unwrap_or_default()).to_string(),
        })
    }

    fn last_modified(&self) -> VfsResult<Option<SystemTime>> {
        Ok(self.metadata()?.and_then(|m| m.modified().ok()))
    }

    fn reader(&self) -> VfsResult<Box<dyn Read + Send>> {
        let host = self.host()?;
        if host.is_dir() {
            return Err(VfsError::is_a_directory(&self.path));
        }
        let file = fs::File::open(&host).map_err(|e| match e.kind() {
            ErrorKind::NotFound => VfsError::not_found(&self.path),
            _ => e.into(),
        })?;
        Ok(Box::new(file))
    }

    fn writer(&self) -> VfsResult<Box<dyn Write + Send>> {
        let _span = tracing::debug_span!("local_fs", op = "write", path = %self.path).entered();
        self.check_writable()?;
        let host = self.host()?;
        let existed = match self.metadata()? {
            Some(m) if m.is_dir() => return Err(VfsError::is_a_directory(&self.path)),
            Some(_) => true,
            None => false,
        };

        let events = self.fs.events();
        let file = if existed {
            events.publish(Event::started(EventType::Modified, self.handle()));
            fs::File::create(&host)?
        } else {
            bracket(&*events, EventType::Created, self.handle(), || {
                if let Some(parent) = host.parent() {
                    fs::create_dir_all(parent)?;
                }
                Ok(fs::File::create(&host)?)
            })?
        };

        Ok(Box::new(LocalWriter {
            file,
            finished: existed.then(|| (events, self.handle())),
        }))
    }

    fn mkdir(&self) -> VfsResult<()> {
        let _span = tracing::debug_span!("local_fs", op = "mkdir", path = %self.path).entered();
        self.check_writable()?;
        if self.exists()? {
            return Err(VfsError::already_exists(&self.path));
        }
        let host = self.host()?;
        bracket(&*self.fs.events(), EventType::Created, self.handle(), || {
            fs::create_dir_all(&host)?;
            Ok(())
        })
    }

    fn delete(&self) -> VfsResult<()> {
        let _span = tracing::debug_span!("local_fs", op = "delete", path = %self.path).entered();
        if self.path == ROOT {
            return Err(VfsError::permission_denied("cannot remove root"));
        }
        self.check_writable()?;
        let host = self.host()?;
        bracket(&*self.fs.events(), EventType::Deleted, self.handle(), || {
            let meta = fs::symlink_metadata(&host).map_err(|e| match e.kind() {
                ErrorKind::NotFound => VfsError::not_found(&self.path),
                _ => e.into(),
            })?;
            if meta.is_dir() {
                fs::remove_dir(&host).map_err(|e| match e.kind() {
                    ErrorKind::DirectoryNotEmpty => VfsError::directory_not_empty(&self.path),
                    _ => e.into(),
                })?;
            } else {
                fs::remove_file(&host)?;
            }
            Ok(())
        })
    }

    fn move_to(&self, target: &dyn File) -> VfsResult<()> {
        let _span = tracing::debug_span!("local_fs", op = "move", path = %self.path).entered();
        let target = target
            .as_any()
            .downcast_ref::<LocalFile>()
            .ok_or_else(|| VfsError::other(format!("cannot move {} to a foreign backend", self.path)))?;
        self.check_writable()?;
        target.check_writable()?;

        let src = self.host()?;
        let dst = target.host()?;
        if dst.starts_with(&src) {
            return Err(VfsError::invalid_path(format!(
                "cannot move {} into {}",
                self.path, target.path
            )));
        }
        if target.exists()? {
            return Err(VfsError::already_exists(&target.path));
        }

        bracket(&*self.fs.events(), EventType::Moved, self.handle(), || {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&src, &dst).map_err(|e| match e.kind() {
                ErrorKind::NotFound => VfsError::not_found(&self.path),
                _ => e.into(),
            })
        })
    }

    fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    fn clone_for(&self, principal: Option<Principal>) -> VfsResult<FileHandle> {
        self.fs.ensure_open()?;
        Ok(Arc::new(self.fs.file(self.path.clone(), principal)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Host file writer that reports the end of a modification when dropped.
struct LocalWriter {
    file: fs::File,
    finished: Option<(Arc<dyn EventSink>, FileHandle)>,
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Drop for LocalWriter {
    fn drop(&mut self) {
        if let Some((events, file)) = self.finished.take() {
            events.publish(Event::finished(EventType::Modified, file));
        }
    }
}
