//! Shadow adapter behaviour against the reference backends.

use std::any::Any;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

use kagami_vfs::{
    AccessPolicy, Children, File, FileHandle, FileSystem, LocalFileSystem, MemoryFileSystem,
    NullSink, Principal, Scratch, ShadowConfig, ShadowFile, UNKNOWN_SIZE, VfsError, VfsResult,
};
use tempfile::TempDir;

// ============================================================================
// Shared test setup
// ============================================================================

fn populated() -> MemoryFileSystem {
    let fs = MemoryFileSystem::new();
    for (path, content) in [
        ("/docs/alpha.txt", "alpha"),
        ("/docs/apple.md", "apple pie"),
        ("/docs/beta.txt", "b"),
        ("/docs/gamma.txt", "gamma rays"),
        ("/docs/.hidden", "shh"),
    ] {
        fs.resolve(path).unwrap().write_all(content.as_bytes()).unwrap();
    }
    fs.resolve("/docs/nested").unwrap().mkdir().unwrap();
    fs
}

fn bind(fs: &MemoryFileSystem, path: &str, scratch: &Arc<Scratch>) -> ShadowFile {
    ShadowFile::bind(fs.resolve(path).unwrap(), scratch).unwrap()
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    /// Listing fails after the first child.
    Listing,
    /// Reading fails after this many bytes.
    ReadAfter(usize),
}

/// Wraps a node and injects one failure.
#[derive(Debug)]
struct Flaky {
    inner: FileHandle,
    fault: Fault,
}

/// Reader that hands out `remaining` bytes, then errors.
struct BrokenReader {
    inner: Box<dyn Read + Send>,
    remaining: usize,
}

impl Read for BrokenReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.remaining == 0 {
            return Err(std::io::Error::other("connection reset"));
        }
        let len = buf.len().min(self.remaining);
        let n = self.inner.read(&mut buf[..len])?;
        self.remaining -= n;
        Ok(n)
    }
}

impl File for Flaky {
    fn exists(&self) -> VfsResult<bool> {
        self.inner.exists()
    }
    fn is_directory(&self) -> VfsResult<bool> {
        self.inner.is_directory()
    }
    fn is_file(&self) -> VfsResult<bool> {
        self.inner.is_file()
    }
    fn is_readable(&self) -> VfsResult<bool> {
        self.inner.is_readable()
    }
    fn is_writable(&self) -> VfsResult<bool> {
        self.inner.is_writable()
    }
    fn resolve(&self, path: &str) -> VfsResult<FileHandle> {
        self.inner.resolve(path)
    }
    fn file_system(&self) -> Arc<dyn FileSystem> {
        self.inner.file_system()
    }
    fn parent(&self) -> VfsResult<Option<FileHandle>> {
        self.inner.parent()
    }
    fn path(&self) -> &str {
        self.inner.path()
    }
    fn children(&self) -> VfsResult<Children> {
        if !matches!(self.fault, Fault::Listing) {
            return self.inner.children();
        }
        let first = self.inner.children()?.take(1);
        let failure = std::iter::once(Err(VfsError::other("backend went away")));
        Ok(Box::new(first.chain(failure)))
    }
    fn size(&self) -> VfsResult<i64> {
        self.inner.size()
    }
    fn content_type(&self) -> VfsResult<String> {
        self.inner.content_type()
    }
    fn last_modified(&self) -> VfsResult<Option<SystemTime>> {
        self.inner.last_modified()
    }
    fn reader(&self) -> VfsResult<Box<dyn Read + Send>> {
        let inner = self.inner.reader()?;
        Ok(match self.fault {
            Fault::ReadAfter(remaining) => Box::new(BrokenReader { inner, remaining }),
            Fault::Listing => inner,
        })
    }
    fn writer(&self) -> VfsResult<Box<dyn Write + Send>> {
        self.inner.writer()
    }
    fn mkdir(&self) -> VfsResult<()> {
        self.inner.mkdir()
    }
    fn delete(&self) -> VfsResult<()> {
        self.inner.delete()
    }
    fn move_to(&self, target: &dyn File) -> VfsResult<()> {
        self.inner.move_to(target)
    }
    fn principal(&self) -> Option<&Principal> {
        self.inner.principal()
    }
    fn clone_for(&self, principal: Option<Principal>) -> VfsResult<FileHandle> {
        self.inner.clone_for(principal)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Materialization
// ============================================================================

#[test]
fn test_bind_copies_file_content() {
    let fs = MemoryFileSystem::new();
    let content: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
    fs.resolve("/big.bin").unwrap().write_all(&content).unwrap();

    let scratch = Scratch::temp().unwrap();
    let shadow = bind(&fs, "/big.bin", &scratch);

    assert_eq!(std::fs::read(shadow.local_path()).unwrap(), content);
    assert_eq!(shadow.size(), content.len() as i64);
    assert_eq!(scratch.stats().materialized_files, 1);
    assert_eq!(scratch.stats().materialized_bytes, content.len() as u64);
}

#[test]
fn test_small_copy_buffer() {
    let fs = MemoryFileSystem::new();
    fs.resolve("/f.txt").unwrap().write_all(b"0123456789abcdef").unwrap();

    let scratch = Scratch::open(&ShadowConfig::default().with_copy_buffer_size(3)).unwrap();
    let shadow = bind(&fs, "/f.txt", &scratch);
    assert_eq!(std::fs::read(shadow.local_path()).unwrap(), b"0123456789abcdef");
}

#[test]
fn test_bind_directory_creates_empty_placeholder() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let docs = bind(&fs, "/docs", &scratch);

    assert!(docs.local_path().is_dir());
    assert_eq!(std::fs::read_dir(docs.local_path()).unwrap().count(), 0);
    assert_eq!(scratch.stats().materialized_files, 0);
}

#[test]
fn test_bind_missing_node_creates_nothing() {
    let fs = MemoryFileSystem::new();
    let scratch = Scratch::temp().unwrap();
    let ghost = bind(&fs, "/ghost", &scratch);

    assert!(!ghost.exists());
    assert!(!ghost.local_path().exists());
    assert_eq!(ghost.size(), UNKNOWN_SIZE);
    assert_eq!(ghost.modified(), None);
}

#[test]
fn test_bind_local_backend() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("hello.txt"), b"hi there").unwrap();
    let fs = LocalFileSystem::new(root.path()).unwrap();

    let scratch = Scratch::temp().unwrap();
    let shadow = ShadowFile::bind(fs.resolve("/hello.txt").unwrap(), &scratch).unwrap();
    assert_ne!(shadow.local_path(), root.path().join("hello.txt"));
    assert_eq!(std::fs::read(shadow.local_path()).unwrap(), b"hi there");
}

#[test]
fn test_failed_copy_leaves_no_shadow() {
    let fs = MemoryFileSystem::new();
    fs.resolve("/big.bin").unwrap().write_all(&[7u8; 4096]).unwrap();
    let flaky: FileHandle = Arc::new(Flaky {
        inner: fs.resolve("/big.bin").unwrap(),
        fault: Fault::ReadAfter(1000),
    });

    let scratch = Scratch::open(&ShadowConfig::default().with_copy_buffer_size(256)).unwrap();
    assert!(ShadowFile::bind(flaky, &scratch).is_err());
    assert_eq!(std::fs::read_dir(scratch.root()).unwrap().count(), 0);
    assert_eq!(scratch.stats().live, 0);
    assert_eq!(scratch.stats().materialized_files, 0);
}

#[test]
fn test_refresh_picks_up_backend_changes() {
    let fs = MemoryFileSystem::new();
    let file = fs.resolve("/f.txt").unwrap();
    file.write_all(b"old").unwrap();

    let scratch = Scratch::temp().unwrap();
    let shadow = ShadowFile::bind(file.clone(), &scratch).unwrap();
    file.write_all(b"new content").unwrap();
    assert_eq!(std::fs::read(shadow.local_path()).unwrap(), b"old");

    shadow.refresh().unwrap();
    assert_eq!(std::fs::read(shadow.local_path()).unwrap(), b"new content");
}

// ============================================================================
// Listing
// ============================================================================

#[test]
fn test_list_files_in_backend_order() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let docs = bind(&fs, "/docs", &scratch);

    let names: Vec<String> = docs
        .list_files()
        .unwrap()
        .iter()
        .map(|f| f.name().unwrap().to_string())
        .collect();
    assert_eq!(
        names,
        vec![".hidden", "alpha.txt", "apple.md", "beta.txt", "gamma.txt", "nested"]
    );
}

#[test]
fn test_name_filter_materializes_only_accepted() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let docs = bind(&fs, "/docs", &scratch);
    let before = scratch.stats().materialized_files;

    let mut seen_parent = None;
    let picked = docs
        .list_files_by_name(|parent, name| {
            seen_parent = Some(parent.to_path_buf());
            name.starts_with('a')
        })
        .unwrap();

    assert_eq!(picked.len(), 2);
    assert_eq!(scratch.stats().materialized_files - before, 2);
    assert_eq!(seen_parent.as_deref(), Some(docs.local_path()));
    assert_eq!(std::fs::read(picked[1].local_path()).unwrap(), b"apple pie");
}

#[test]
fn test_attribute_filter_drops_rejected_shadows() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let docs = bind(&fs, "/docs", &scratch);

    let big = docs.list_files_by(|f| f.is_file() && f.size() > 5).unwrap();
    let names: Vec<&str> = big.iter().map(|f| f.name().unwrap()).collect();
    assert_eq!(names, vec!["apple.md", "gamma.txt"]);

    // Every candidate was copied, but only the accepted ones stay live.
    assert_eq!(scratch.stats().materialized_files, 5);
    assert_eq!(scratch.stats().live, 1 + big.len());
}

#[test]
fn test_listing_rereads_backend() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let docs = bind(&fs, "/docs", &scratch);
    let first = docs.list_files().unwrap().len();

    fs.resolve("/docs/zeta.txt").unwrap().write_all(b"z").unwrap();
    assert_eq!(docs.list_files().unwrap().len(), first + 1);
}

#[test]
fn test_listing_failure_is_not_truncated() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let flaky: FileHandle = Arc::new(Flaky {
        inner: fs.resolve("/docs").unwrap(),
        fault: Fault::Listing,
    });
    let docs = ShadowFile::bind(flaky, &scratch).unwrap();

    assert!(docs.list_files().is_err());
    assert_eq!(scratch.stats().live, 1, "partial results are released");
}

#[test]
fn test_listing_a_file_fails() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let file = bind(&fs, "/docs/alpha.txt", &scratch);
    assert!(file.list_files().is_err());
}

// ============================================================================
// Management
// ============================================================================

#[test]
fn test_delete_removes_node_and_shadow() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let file = bind(&fs, "/docs/alpha.txt", &scratch);
    assert!(file.local_path().exists());

    assert!(file.delete());
    assert!(!file.exists());
    assert!(!file.local_path().exists());
}

#[test]
fn test_failed_delete_keeps_shadow() {
    let viewer = Principal::new("viewer", "Viewer");
    let fs = MemoryFileSystem::with_options(AccessPolicy::open().read_only(viewer.id), Arc::new(NullSink));
    fs.resolve("/f.txt").unwrap().write_all(b"keep me").unwrap();

    let scratch = Scratch::temp().unwrap();
    let file = ShadowFile::bind(fs.resolve_as("/f.txt", Some(&viewer)).unwrap(), &scratch).unwrap();

    assert!(!file.can_write());
    assert!(!file.delete());
    assert!(file.exists());
    assert_eq!(std::fs::read(file.local_path()).unwrap(), b"keep me");
}

#[test]
fn test_rename_onto_adapter_moves_backend_only() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let a = bind(&fs, "/docs/alpha.txt", &scratch);
    let b = bind(&fs, "/archive/alpha.txt", &scratch);
    let a_local = a.local_path().to_path_buf();

    assert!(a.rename_to(&b));
    assert!(!a.exists());
    assert!(b.exists());
    assert_eq!(fs.resolve("/archive/alpha.txt").unwrap().read_all().unwrap(), b"alpha");
    assert_eq!(std::fs::read(&a_local).unwrap(), b"alpha", "local shadow untouched");
    assert!(!b.local_path().exists(), "no local move happened");
}

#[test]
fn test_rename_onto_existing_adapter_fails() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let a = bind(&fs, "/docs/alpha.txt", &scratch);
    let b = bind(&fs, "/docs/beta.txt", &scratch);
    assert!(!a.rename_to(&b));
    assert!(a.exists());
}

#[test]
fn test_rename_to_host_path_moves_shadow_only() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("exported.txt");

    let a = bind(&fs, "/docs/alpha.txt", &scratch);
    assert!(a.rename_to(&dest));
    assert_eq!(std::fs::read(&dest).unwrap(), b"alpha");
    assert!(!a.local_path().exists());
    assert!(a.exists(), "virtual node untouched");

    drop(a);
    assert!(dest.exists(), "foreign path is not cleaned up");
}

#[test]
fn test_create_new_file() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();

    let fresh = bind(&fs, "/docs/fresh.txt", &scratch);
    assert!(fresh.create_new_file());
    assert!(fresh.is_file());
    assert_eq!(fresh.size(), 0);
    assert!(!fresh.local_path().exists(), "no shadow content is produced");

    assert!(!fresh.create_new_file(), "already exists");
    assert!(!bind(&fs, "/missing/dir/f.txt", &scratch).create_new_file());
    assert!(!bind(&fs, "/", &scratch).create_new_file());
}

#[test]
fn test_mkdir_and_mkdirs() {
    let fs = MemoryFileSystem::new();
    let scratch = Scratch::temp().unwrap();

    let deep = bind(&fs, "/a/b/c", &scratch);
    assert!(deep.mkdir(), "backend creates missing ancestors");
    assert!(deep.is_dir());
    assert!(fs.resolve("/a/b").unwrap().is_directory().unwrap());
    assert!(!deep.local_path().exists(), "no local mirroring");
    assert!(!deep.mkdir(), "already exists");

    let other = bind(&fs, "/x/y", &scratch);
    assert!(other.mkdirs());
    assert!(!other.mkdirs(), "already exists");
}

// ============================================================================
// Content channels
// ============================================================================

#[test]
fn test_open_write_mirrors_into_shadow() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let file = bind(&fs, "/docs/alpha.txt", &scratch);

    let mut writer = file.open_write().unwrap();
    writer.write_all(b"rewritten ").unwrap();
    writer.write_all(b"twice").unwrap();
    writer.finish().unwrap();

    assert_eq!(fs.resolve("/docs/alpha.txt").unwrap().read_all().unwrap(), b"rewritten twice");
    assert_eq!(std::fs::read(file.local_path()).unwrap(), b"rewritten twice");
}

#[test]
fn test_open_write_after_close_keeps_backend_content() {
    let fs = MemoryFileSystem::new();
    fs.resolve("/f.txt").unwrap().write_all(b"precious data").unwrap();
    let dir = TempDir::new().unwrap();
    let scratch = Scratch::open(&ShadowConfig::default().with_scratch_dir(dir.path())).unwrap();
    let file = bind(&fs, "/f.txt", &scratch);

    scratch.close().unwrap();
    assert!(file.open_write().is_err());
    assert_eq!(fs.resolve("/f.txt").unwrap().read_all().unwrap(), b"precious data");
    assert!(!file.local_path().exists());
}

#[test]
fn test_refused_write_keeps_shadow() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("notes.txt"), b"original").unwrap();
    let fs = LocalFileSystem::read_only(root.path()).unwrap();
    let scratch = Scratch::temp().unwrap();

    let file = ShadowFile::bind(fs.resolve("/notes.txt").unwrap(), &scratch).unwrap();
    assert!(file.open_write().is_err());
    assert_eq!(std::fs::read(file.local_path()).unwrap(), b"original");
    assert_eq!(std::fs::read(root.path().join("notes.txt")).unwrap(), b"original");

    let ghost = ShadowFile::bind(fs.resolve("/ghost.txt").unwrap(), &scratch).unwrap();
    assert!(ghost.open_write().is_err());
    assert!(!ghost.local_path().exists());
}

#[test]
fn test_open_read_uses_backend() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let file = bind(&fs, "/docs/alpha.txt", &scratch);
    std::fs::write(file.local_path(), b"local edit").unwrap();

    let mut content = String::new();
    file.open_read().unwrap().read_to_string(&mut content).unwrap();
    assert_eq!(content, "alpha");
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_queries_delegate_to_backend() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let file = bind(&fs, "/docs/apple.md", &scratch);

    assert!(file.exists());
    assert!(file.is_file());
    assert!(!file.is_dir());
    assert!(file.can_read());
    assert!(file.can_write());
    assert!(!file.is_hidden());
    assert_eq!(file.name(), Some("apple.md"));
    assert_eq!(file.content_type().as_deref(), Some("text/markdown"));
    assert!(file.modified().is_some());

    assert!(bind(&fs, "/docs/.hidden", &scratch).is_hidden());
}

#[test]
fn test_queries_fall_back_after_close() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let file = bind(&fs, "/docs/alpha.txt", &scratch);
    fs.close().unwrap();

    assert!(!file.exists());
    assert!(!file.is_file());
    assert_eq!(file.size(), UNKNOWN_SIZE);
    assert_eq!(file.content_type(), None);
    assert!(!file.delete());
    assert!(file.list_files().is_err());
}

#[test]
fn test_parent() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let file = bind(&fs, "/docs/alpha.txt", &scratch);

    let parent = file.parent().expect("existing file has a parent");
    assert_eq!(parent.path(), "/docs");
    assert!(parent.local_path().is_dir());

    assert!(bind(&fs, "/", &scratch).parent().is_none());
    assert!(bind(&fs, "/docs/missing", &scratch).parent().is_none());
}

// ============================================================================
// Cleanup
// ============================================================================

#[test]
fn test_drop_removes_shadow() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let file = bind(&fs, "/docs/alpha.txt", &scratch);
    let dir = bind(&fs, "/docs", &scratch);
    let (file_local, dir_local) = (file.local_path().to_path_buf(), dir.local_path().to_path_buf());

    drop(file);
    drop(dir);
    assert!(!file_local.exists());
    assert!(!dir_local.exists());
    assert_eq!(scratch.stats().live, 0);
}

#[test]
fn test_reap_removes_orphans_only() {
    let fs = populated();
    let dir = TempDir::new().unwrap();
    let scratch = Scratch::open(&ShadowConfig::default().with_scratch_dir(dir.path())).unwrap();
    let live = bind(&fs, "/docs/alpha.txt", &scratch);
    std::fs::write(dir.path().join("crashed-session"), b"stale").unwrap();

    assert_eq!(scratch.reap().unwrap(), 1);
    assert!(live.local_path().exists());
    assert!(!dir.path().join("crashed-session").exists());
}

#[test]
fn test_close_sweeps_live_shadows() {
    let fs = populated();
    let scratch = Scratch::temp().unwrap();
    let file = bind(&fs, "/docs/alpha.txt", &scratch);
    let docs = bind(&fs, "/docs", &scratch);

    scratch.close().unwrap();
    assert!(!file.local_path().exists());
    assert!(!docs.local_path().exists());
    assert!(ShadowFile::bind(fs.resolve("/docs/beta.txt").unwrap(), &scratch).is_err());

    drop(file);
    drop(docs);
}
