//! Scratch area holding shadow copies.
//!
//! Every shadow gets a fresh UUID-named entry directly under the scratch
//! root. The scratch area remembers which entries are owned by a live
//! [`ShadowPath`], so leftovers from crashed processes can be told apart and
//! reaped.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashSet;
use parking_lot::Mutex;
use serde::Serialize;
use tempfile::TempDir;
use uuid::Uuid;

use crate::config::ShadowConfig;
use crate::error::{VfsError, VfsResult};

/// Counters describing a scratch area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScratchStats {
    /// Shadow paths currently owned by an adapter.
    pub live: usize,
    /// Files whose content was copied into a shadow.
    pub materialized_files: u64,
    /// Bytes copied into shadows.
    pub materialized_bytes: u64,
}

/// Directory that owns shadow copies.
pub struct Scratch {
    root: PathBuf,
    /// Set when the root is a temporary directory we created.
    owned: Mutex<Option<TempDir>>,
    live: DashSet<PathBuf>,
    materialized_files: AtomicU64,
    materialized_bytes: AtomicU64,
    copy_buffer_size: usize,
    closed: AtomicBool,
}

impl fmt::Debug for Scratch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scratch")
            .field("root", &self.root)
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Scratch {
    /// A scratch area in a fresh temporary directory with default settings.
    pub fn temp() -> VfsResult<Arc<Self>> {
        Self::open(&ShadowConfig::default())
    }

    /// Open the scratch area described by `config`.
    pub fn open(config: &ShadowConfig) -> VfsResult<Arc<Self>> {
        let (root, owned) = match &config.scratch_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                (dunce::canonicalize(dir)?, None)
            }
            None => {
                let tmp = tempfile::Builder::new()
                    .prefix("kagami-shadow-")
                    .tempdir()?;
                (dunce::canonicalize(tmp.path())?, Some(tmp))
            }
        };
        tracing::debug!(root = %root.display(), "opened scratch area");

        let scratch = Arc::new(Self {
            root,
            owned: Mutex::new(owned),
            live: DashSet::new(),
            materialized_files: AtomicU64::new(0),
            materialized_bytes: AtomicU64::new(0),
            copy_buffer_size: config.copy_buffer_size.max(1),
            closed: AtomicBool::new(false),
        });

        if config.reap_on_open && config.scratch_dir.is_some() {
            scratch.reap()?;
        }
        Ok(scratch)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn copy_buffer_size(&self) -> usize {
        self.copy_buffer_size
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Reserve a fresh shadow path. Nothing is created on disk.
    pub fn allocate(self: &Arc<Self>) -> VfsResult<ShadowPath> {
        if self.is_closed() {
            return Err(VfsError::other("scratch area is closed"));
        }
        let path = self.root.join(Uuid::new_v4().to_string());
        self.live.insert(path.clone());
        Ok(ShadowPath {
            path,
            scratch: Arc::clone(self),
        })
    }

    /// Remove every entry under the root that no live adapter owns.
    ///
    /// Returns how many entries were removed. Entries that cannot be removed
    /// are logged and skipped.
    pub fn reap(&self) -> VfsResult<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if self.live.contains(&path) {
                continue;
            }
            match remove_path(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to reap shadow")
                }
            }
        }
        tracing::info!(root = %self.root.display(), removed, "reaped orphaned shadows");
        Ok(removed)
    }

    /// Sweep the whole scratch area. Closing twice is a no-op.
    ///
    /// Adapters that outlive the sweep find their shadow already gone.
    /// Entries that cannot be removed are logged and skipped; the first such
    /// failure is returned once the sweep has finished.
    pub fn close(&self) -> VfsResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut swept = 0;
        let mut first_error: Option<io::Error> = None;
        match fs::read_dir(&self.root) {
            Ok(entries) => {
                for entry in entries {
                    let result = entry.and_then(|e| remove_path(&e.path()));
                    match result {
                        Ok(()) => swept += 1,
                        Err(e) => {
                            tracing::warn!(root = %self.root.display(), error = %e, "failed to sweep shadow");
                            first_error.get_or_insert(e);
                        }
                    }
                }
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
        self.live.clear();
        if let Some(tmp) = self.owned.lock().take()
            && let Err(e) = tmp.close()
        {
            first_error.get_or_insert(e);
        }
        tracing::info!(root = %self.root.display(), swept, "closed scratch area");
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> ScratchStats {
        ScratchStats {
            live: self.live.len(),
            materialized_files: self.materialized_files.load(Ordering::Relaxed),
            materialized_bytes: self.materialized_bytes.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_materialization(&self, bytes: u64) {
        self.materialized_files.fetch_add(1, Ordering::Relaxed);
        self.materialized_bytes.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// Owns one shadow path for as long as it lives.
///
/// Dropping the guard removes whatever sits at the path and releases it from
/// the scratch area.
pub struct ShadowPath {
    path: PathBuf,
    scratch: Arc<Scratch>,
}

impl fmt::Debug for ShadowPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ShadowPath").field(&self.path).finish()
    }
}

impl ShadowPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn scratch(&self) -> &Arc<Scratch> {
        &self.scratch
    }

    /// Remove the shadow content. Already-absent is fine.
    pub fn remove(&self) -> io::Result<()> {
        remove_path(&self.path)
    }
}

impl Drop for ShadowPath {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove shadow");
        }
        self.scratch.live.remove(&self.path);
    }
}

fn remove_path(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
