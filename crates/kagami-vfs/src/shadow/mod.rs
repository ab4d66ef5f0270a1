//! Host-path shadows of virtual nodes.
//!
//! Host APIs that insist on a real local path get a [`ShadowFile`]: a virtual
//! node bound to a uniquely named copy inside a [`Scratch`] area. The copy is
//! made once, at bind time, and only for that node. Children are bound lazily
//! as they are listed.
//!
//! ```no_run
//! use kagami_vfs::{FileSystem, MemoryFileSystem, Scratch, ShadowFile};
//!
//! # fn main() -> kagami_vfs::VfsResult<()> {
//! let fs = MemoryFileSystem::new();
//! fs.resolve("/docs/readme.txt")?.write_all(b"hello")?;
//!
//! let scratch = Scratch::temp()?;
//! let docs = ShadowFile::bind(fs.resolve("/docs")?, &scratch)?;
//! for child in docs.list_files_by_name(|_, name| name.ends_with(".txt"))? {
//!     println!("{} -> {}", child.path(), child.local_path().display());
//! }
//! # Ok(())
//! # }
//! ```

mod adapter;
mod scratch;
mod writer;

pub use adapter::{MoveTarget, ShadowFile};
pub use scratch::{Scratch, ScratchStats, ShadowPath};
pub use writer::MirrorWriter;
