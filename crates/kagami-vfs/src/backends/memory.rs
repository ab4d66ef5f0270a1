//! In-memory filesystem backend.
//!
//! Used for scratch trees and testing. All data is ephemeral and dropped on
//! [`FileSystem::close`].

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use kagami_types::{Principal, PrincipalId};
use parking_lot::{Mutex, RwLock};

use crate::error::{VfsError, VfsResult};
use crate::event::{Event, EventSink, EventType, NullSink, bracket};
use crate::features::Reasoned;
use crate::file::{Children, File, FileHandle, FileSystem, UNKNOWN_SIZE};
use crate::path::{self, ROOT};
use crate::types::{DIRECTORY_CONTENT_TYPE, content_type_for};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Node {
    File { data: Arc<[u8]>, modified: SystemTime },
    Directory { modified: SystemTime },
}

impl Node {
    fn directory() -> Self {
        Node::Directory {
            modified: SystemTime::now(),
        }
    }

    fn file(data: &[u8]) -> Self {
        Node::File {
            data: Arc::from(data),
            modified: SystemTime::now(),
        }
    }

    fn modified(&self) -> SystemTime {
        match self {
            Node::File { modified, .. } => *modified,
            Node::Directory { modified } => *modified,
        }
    }
}

/// Which principals may use the filesystem, and which of them may change it.
///
/// With no allow list every principal (and the anonymous caller) is admitted.
/// Once a principal is allowed, only allowed principals are admitted.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    allowed: Option<HashSet<PrincipalId>>,
    read_only: HashSet<PrincipalId>,
}

impl AccessPolicy {
    /// Admit everyone with full access.
    pub fn open() -> Self {
        Self::default()
    }

    /// Add a principal to the allow list.
    pub fn allow(mut self, id: PrincipalId) -> Self {
        self.allowed.get_or_insert_with(HashSet::new).insert(id);
        self
    }

    /// Restrict a principal to reading.
    pub fn read_only(mut self, id: PrincipalId) -> Self {
        self.read_only.insert(id);
        self
    }

    /// Whether `principal` may see the filesystem at all.
    pub fn admits(&self, principal: Option<&Principal>) -> bool {
        match &self.allowed {
            None => true,
            Some(ids) => principal.is_some_and(|p| ids.contains(&p.id)),
        }
    }

    /// Whether `principal` may change nodes.
    pub fn can_write(&self, principal: Option<&Principal>) -> bool {
        self.admits(principal) && !principal.is_some_and(|p| self.read_only.contains(&p.id))
    }
}

struct Inner {
    nodes: RwLock<BTreeMap<String, Node>>,
    policy: AccessPolicy,
    events: Arc<dyn EventSink>,
    closed: AtomicBool,
}

/// In-memory filesystem backend.
///
/// Cheap to clone; clones share the same tree.
#[derive(Clone)]
pub struct MemoryFileSystem {
    inner: Arc<Inner>,
}

impl fmt::Debug for MemoryFileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryFileSystem")
            .field("policy", &self.inner.policy)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileSystem {
    /// Create an empty filesystem open to everyone.
    pub fn new() -> Self {
        Self::with_options(AccessPolicy::open(), Arc::new(NullSink))
    }

    /// Create an empty filesystem with an access policy and an event sink.
    pub fn with_options(policy: AccessPolicy, events: Arc<dyn EventSink>) -> Self {
        let mut nodes = BTreeMap::new();
        // Root directory always exists
        nodes.insert(ROOT.to_string(), Node::directory());
        Self {
            inner: Arc::new(Inner {
                nodes: RwLock::new(nodes),
                policy,
                events,
                closed: AtomicBool::new(false),
            }),
        }
    }

    fn ensure_open(&self) -> VfsResult<()> {
        if self.is_closed() {
            Err(VfsError::closed())
        } else {
            Ok(())
        }
    }

    fn file(&self, path: String, principal: Option<Principal>) -> MemoryFile {
        MemoryFile {
            fs: self.clone(),
            path,
            principal,
            reason: Mutex::new(None),
        }
    }
}

impl FileSystem for MemoryFileSystem {
    fn resolve_as(&self, path: &str, principal: Option<&Principal>) -> VfsResult<FileHandle> {
        self.ensure_open()?;
        let path = path::normalize(path)?;
        if !self.inner.policy.admits(principal) {
            return Err(VfsError::permission_denied(path));
        }
        Ok(Arc::new(self.file(path, principal.cloned())))
    }

    fn events(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.inner.events)
    }

    fn close(&self) -> VfsResult<()> {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            let mut nodes = self.inner.nodes.write();
            tracing::debug!(nodes = nodes.len(), "closing memory file system");
            nodes.clear();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Create every missing ancestor of `path` as a directory.
fn create_ancestors(nodes: &mut BTreeMap<String, Node>, path: &str) -> VfsResult<()> {
    let mut missing = Vec::new();
    let mut current = path::parent(path);
    while let Some(p) = current {
        match nodes.get(p) {
            Some(Node::Directory { .. }) => break,
            Some(Node::File { .. }) => return Err(VfsError::not_a_directory(p)),
            None => missing.push(p.to_string()),
        }
        current = path::parent(p);
    }
    for p in missing {
        nodes.insert(p, Node::directory());
    }
    Ok(())
}

fn subtree_prefix(path: &str) -> String {
    if path == ROOT {
        ROOT.to_string()
    } else {
        format!("{path}/")
    }
}

fn has_children(nodes: &BTreeMap<String, Node>, path: &str) -> bool {
    let prefix = subtree_prefix(path);
    nodes
        .range(prefix.clone()..)
        .find(|(k, _)| k.as_str() != path)
        .is_some_and(|(k, _)| k.starts_with(&prefix))
}

/// A node in a [`MemoryFileSystem`].
pub struct MemoryFile {
    fs: MemoryFileSystem,
    path: String,
    principal: Option<Principal>,
    reason: Mutex<Option<String>>,
}

impl fmt::Debug for MemoryFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryFile")
            .field("path", &self.path)
            .field("principal", &self.principal.as_ref().map(|p| &p.username))
            .finish()
    }
}

impl MemoryFile {
    fn sibling(&self, path: String) -> MemoryFile {
        self.fs.file(path, self.principal.clone())
    }

    /// A fresh handle on this node, for event payloads.
    fn handle(&self) -> FileHandle {
        Arc::new(self.sibling(self.path.clone()))
    }

    fn node(&self) -> VfsResult<Option<Node>> {
        self.fs.ensure_open()?;
        Ok(self.fs.inner.nodes.read().get(&self.path).cloned())
    }

    fn check_readable(&self) -> VfsResult<()> {
        self.fs.ensure_open()?;
        if self.fs.inner.policy.admits(self.principal.as_ref()) {
            Ok(())
        } else {
            Err(VfsError::permission_denied(&self.path))
        }
    }

    fn check_writable(&self) -> VfsResult<()> {
        self.fs.ensure_open()?;
        if self.fs.inner.policy.can_write(self.principal.as_ref()) {
            Ok(())
        } else {
            Err(VfsError::permission_denied(&self.path))
        }
    }

    fn span(&self, op: &'static str) -> tracing::Span {
        let reason = self.reason.lock().clone();
        tracing::debug_span!("memory_fs", op = op, path = %self.path, reason = ?reason)
    }
}

impl File for MemoryFile {
    fn exists(&self) -> VfsResult<bool> {
        Ok(self.node()?.is_some())
    }

    fn is_directory(&self) -> VfsResult<bool> {
        Ok(matches!(self.node()?, Some(Node::Directory { .. })))
    }

    fn is_file(&self) -> VfsResult<bool> {
        Ok(matches!(self.node()?, Some(Node::File { .. })))
    }

    fn is_readable(&self) -> VfsResult<bool> {
        Ok(self.exists()? && self.fs.inner.policy.admits(self.principal.as_ref()))
    }

    fn is_writable(&self) -> VfsResult<bool> {
        Ok(self.exists()? && self.fs.inner.policy.can_write(self.principal.as_ref()))
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
        self.check_readable()?;
        let names: Vec<String> = {
            let nodes = self.fs.inner.nodes.read();
            match nodes.get(&self.path) {
                Some(Node::Directory { .. }) => {}
                Some(Node::File { .. }) => return Err(VfsError::not_a_directory(&self.path)),
                None => return Err(VfsError::not_found(&self.path)),
            }

            let prefix = subtree_prefix(&self.path);
            nodes
                .range(prefix.clone()..)
                .map(|(k, _)| k)
                .take_while(|k| k.starts_with(&prefix))
                .filter(|k| k.len() > prefix.len() && !k[prefix.len()..].contains('/'))
                .cloned()
                .collect()
        };

        let fs = self.fs.clone();
        let principal = self.principal.clone();
        Ok(Box::new(names.into_iter().map(move |path| -> VfsResult<FileHandle> {
            fs.ensure_open()?;
            Ok(Arc::new(fs.file(path, principal.clone())) as FileHandle)
        })))
    }

    fn size(&self) -> VfsResult<i64> {
        Ok(match self.node()? {
            Some(Node::File { data, .. }) => data.len() as i64,
            _ => UNKNOWN_SIZE,
        })
    }

    fn content_type(&self) -> VfsResult<String> {
        Ok(match self.node()? {
            Some(Node::Directory { .. }) => DIRECTORY_CONTENT_TYPE.to_string(),
            _ => content_type_for(self.name().unwrap_or_default()).to_string(),
        })
    }

    fn last_modified(&self) -> VfsResult<Option<SystemTime>> {
        Ok(self.node()?.map(|n| n.modified()))
    }

    fn reader(&self) -> VfsResult<Box<dyn Read + Send>> {
        self.check_readable()?;
        match self.node()? {
            Some(Node::File { data, .. }) => Ok(Box::new(Cursor::new(data))),
            Some(Node::Directory { .. }) => Err(VfsError::is_a_directory(&self.path)),
            None => Err(VfsError::not_found(&self.path)),
        }
    }

    fn writer(&self) -> VfsResult<Box<dyn Write + Send>> {
        let _span = self.span("write").entered();
        self.check_writable()?;

        let existed = match self.node()? {
            Some(Node::Directory { .. }) => return Err(VfsError::is_a_directory(&self.path)),
            Some(Node::File { .. }) => true,
            None => false,
        };

        let events = self.fs.events();
        if existed {
            events.publish(Event::started(EventType::Modified, self.handle()));
            self.fs
                .inner
                .nodes
                .write()
                .insert(self.path.clone(), Node::file(&[]));
        } else {
            bracket(&*events, EventType::Created, self.handle(), || {
                let mut nodes = self.fs.inner.nodes.write();
                create_ancestors(&mut nodes, &self.path)?;
                nodes.insert(self.path.clone(), Node::file(&[]));
                Ok(())
            })?;
        }

        Ok(Box::new(MemoryWriter {
            fs: self.fs.clone(),
            path: self.path.clone(),
            file: self.handle(),
            buf: Vec::new(),
            notify: existed,
        }))
    }

    fn mkdir(&self) -> VfsResult<()> {
        let _span = self.span("mkdir").entered();
        self.check_writable()?;
        if self.node()?.is_some() {
            return Err(VfsError::already_exists(&self.path));
        }

        bracket(&*self.fs.events(), EventType::Created, self.handle(), || {
            let mut nodes = self.fs.inner.nodes.write();
            if nodes.contains_key(&self.path) {
                return Err(VfsError::already_exists(&self.path));
            }
            create_ancestors(&mut nodes, &self.path)?;
            nodes.insert(self.path.clone(), Node::directory());
            Ok(())
        })
    }

    fn delete(&self) -> VfsResult<()> {
        let _span = self.span("delete").entered();
        if self.path == ROOT {
            return Err(VfsError::permission_denied("cannot remove root"));
        }
        self.check_writable()?;

        bracket(&*self.fs.events(), EventType::Deleted, self.handle(), || {
            let mut nodes = self.fs.inner.nodes.write();
            match nodes.get(&self.path) {
                None => return Err(VfsError::not_found(&self.path)),
                Some(Node::Directory { .. }) if has_children(&nodes, &self.path) => {
                    return Err(VfsError::directory_not_empty(&self.path));
                }
                Some(_) => {}
            }
            nodes.remove(&self.path);
            Ok(())
        })
    }

    fn move_to(&self, target: &dyn File) -> VfsResult<()> {
        let _span = self.span("move").entered();
        let target = target
            .as_any()
            .downcast_ref::<MemoryFile>()
            .ok_or_else(|| VfsError::other(format!("cannot move {} to a foreign backend", self.path)))?;
        if !Arc::ptr_eq(&self.fs.inner, &target.fs.inner) {
            return Err(VfsError::other(format!(
                "cannot move {} across memory file systems",
                self.path
            )));
        }
        self.check_writable()?;
        target.check_writable()?;
        if path::is_within(&self.path, &target.path) {
            return Err(VfsError::invalid_path(format!(
                "cannot move {} into {}",
                self.path, target.path
            )));
        }

        bracket(&*self.fs.events(), EventType::Moved, self.handle(), || {
            let mut nodes = self.fs.inner.nodes.write();
            if !nodes.contains_key(&self.path) {
                return Err(VfsError::not_found(&self.path));
            }
            if nodes.contains_key(&target.path) {
                return Err(VfsError::already_exists(&target.path));
            }
            create_ancestors(&mut nodes, &target.path)?;

            let prefix = subtree_prefix(&self.path);
            let mut moved = vec![self.path.clone()];
            moved.extend(
                nodes
                    .range(prefix.clone()..)
                    .map(|(k, _)| k)
                    .take_while(|k| k.starts_with(&prefix))
                    .cloned(),
            );

            for old in moved {
                if let Some(node) = nodes.remove(&old) {
                    let new = format!("{}{}", target.path, &old[self.path.len()..]);
                    nodes.insert(new, node);
                }
            }
            Ok(())
        })
    }

    fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    fn clone_for(&self, principal: Option<Principal>) -> VfsResult<FileHandle> {
        self.fs.ensure_open()?;
        if !self.fs.inner.policy.admits(principal.as_ref()) {
            let who = principal
                .as_ref()
                .map(|p| p.username.as_str())
                .unwrap_or("anonymous");
            return Err(VfsError::access_denied(format!(
                "{who} may not access {}",
                self.path
            )));
        }
        Ok(Arc::new(self.fs.file(self.path.clone(), principal)))
    }

    fn reasoned(&self) -> Option<&dyn Reasoned> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Reasoned for MemoryFile {
    fn set_reason(&self, reason: Option<String>) {
        *self.reason.lock() = reason;
    }

    fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }
}

/// Buffers writes and commits the whole buffer as the node's content on
/// every flush and on drop.
struct MemoryWriter {
    fs: MemoryFileSystem,
    path: String,
    file: FileHandle,
    buf: Vec<u8>,
    notify: bool,
}

impl MemoryWriter {
    fn commit(&self) -> VfsResult<()> {
        self.fs.ensure_open()?;
        let mut nodes = self.fs.inner.nodes.write();
        if let Some(Node::Directory { .. }) = nodes.get(&self.path) {
            return Err(VfsError::is_a_directory(&self.path));
        }
        create_ancestors(&mut nodes, &self.path)?;
        nodes.insert(self.path.clone(), Node::file(&self.buf));
        Ok(())
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit().map_err(io::Error::from)
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        if let Err(e) = self.commit() {
            tracing::warn!(path = %self.path, error = %e, "failed to commit memory writer");
            return;
        }
        if self.notify {
            self.fs
                .events()
                .publish(Event::finished(EventType::Modified, Arc::clone(&self.file)));
        }
    }
}
