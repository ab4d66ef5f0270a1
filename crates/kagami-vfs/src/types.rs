//! Shared VFS types.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::VfsResult;
use crate::file::{File, UNKNOWN_SIZE};

/// Content type reported by directories.
pub const DIRECTORY_CONTENT_TYPE: &str = "application/directory";

/// Content type for files whose extension is not recognised.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Guess a content type from a file name's extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return DEFAULT_CONTENT_TYPE,
    };
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "json" => "application/json",
        "js" => "application/javascript",
        "toml" => "application/toml",
        "ron" => "application/ron",
        "yaml" | "yml" => "application/yaml",
        "rs" => "text/x-rust",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    File,
    Directory,
}

impl FileKind {
    pub fn is_file(&self) -> bool {
        matches!(self, FileKind::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileKind::Directory)
    }
}

/// Point-in-time metadata of a node, gathered through the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub name: Option<String>,
    /// `None` when the node does not exist.
    pub kind: Option<FileKind>,
    pub size: i64,
    pub content_type: String,
    /// Milliseconds since the Unix epoch.
    pub modified_ms: Option<u64>,
}

impl FileInfo {
    /// Query every attribute of `file` from its backend.
    pub fn snapshot(file: &dyn File) -> VfsResult<Self> {
        let kind = if !file.exists()? {
            None
        } else if file.is_directory()? {
            Some(FileKind::Directory)
        } else {
            Some(FileKind::File)
        };

        let (size, modified_ms) = match kind {
            Some(_) => (file.size()?, file.last_modified()?.map(to_millis)),
            None => (UNKNOWN_SIZE, None),
        };

        Ok(Self {
            path: file.path().to_string(),
            name: file.name().map(str::to_string),
            kind,
            size,
            content_type: file.content_type()?,
            modified_ms,
        })
    }
}

fn to_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
