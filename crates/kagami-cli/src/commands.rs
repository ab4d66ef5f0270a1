//! Subcommand implementations. Output goes to the writer the caller passes.

use std::io::{self, BufRead, Read, Write};

use anyhow::{Context, Result, bail};
use kagami_vfs::{
    Event, FileHandle, FileInfo, FileKind, FileSystem, Principal, Scratch, ShadowConfig,
    ShadowFile,
};
use regex::Regex;

fn compile(pattern: Option<&str>) -> Result<Option<Regex>> {
    pattern
        .map(Regex::new)
        .transpose()
        .context("invalid --match pattern")
}

fn open_dir(fs: &dyn FileSystem, principal: Option<&Principal>, path: &str) -> Result<FileHandle> {
    let dir = fs.resolve_as(path, principal)?;
    if !dir.is_directory()? {
        bail!("{} is not a directory", dir.path());
    }
    Ok(dir)
}

fn format_entry(info: &FileInfo) -> String {
    let name = info.name.as_deref().unwrap_or("/");
    match info.kind {
        Some(FileKind::Directory) => format!("d {:>10}  {name}/", "-"),
        _ => format!("- {:>10}  {name}", info.size),
    }
}

/// List the direct children of `path`.
pub fn ls(
    fs: &dyn FileSystem,
    principal: Option<&Principal>,
    path: &str,
    json: bool,
    pattern: Option<&str>,
    out: &mut dyn Write,
) -> Result<()> {
    let pattern = compile(pattern)?;
    let dir = open_dir(fs, principal, path)?;

    for child in dir.children()? {
        let child = child?;
        if let Some(re) = &pattern
            && !re.is_match(child.name().unwrap_or_default())
        {
            continue;
        }
        let info = FileInfo::snapshot(&*child)?;
        if json {
            writeln!(out, "{}", serde_json::to_string(&info)?)?;
        } else {
            writeln!(out, "{}", format_entry(&info))?;
        }
    }
    Ok(())
}

/// Copy the content of `path` to `out`.
pub fn cat(
    fs: &dyn FileSystem,
    principal: Option<&Principal>,
    path: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let file = fs.resolve_as(path, principal)?;
    let mut reader = file
        .reader()
        .with_context(|| format!("opening {}", file.path()))?;
    io::copy(&mut reader, out)?;
    Ok(())
}

/// Options for [`shadow`].
#[derive(Debug, Default)]
pub struct ShadowOptions<'a> {
    /// Also bind the children, filtered by name
    pub children: bool,
    pub pattern: Option<&'a str>,
    /// Keep the shadows until a line arrives on the input
    pub hold: bool,
}

/// Bind a shadow for `path` and print where it lives.
pub fn shadow(
    fs: &dyn FileSystem,
    principal: Option<&Principal>,
    path: &str,
    config: &ShadowConfig,
    options: ShadowOptions<'_>,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> Result<()> {
    let pattern = compile(options.pattern)?;
    let scratch = Scratch::open(config).context("opening scratch area")?;
    let file = fs.resolve_as(path, principal)?;
    let bound = ShadowFile::bind(file, &scratch)?;
    writeln!(out, "{}\t{}\t{}", bound.path(), bound.local_path().display(), bound.size())?;

    let children = if options.children {
        bound.list_files_by_name(|_, name| pattern.as_ref().is_none_or(|re| re.is_match(name)))?
    } else {
        Vec::new()
    };
    for child in &children {
        writeln!(out, "{}\t{}\t{}", child.path(), child.local_path().display(), child.size())?;
    }

    let stats = scratch.stats();
    tracing::info!(
        live = stats.live,
        files = stats.materialized_files,
        bytes = stats.materialized_bytes,
        "shadows bound"
    );

    if options.hold {
        writeln!(out, "holding shadows; press Enter to release")?;
        out.flush()?;
        let mut line = String::new();
        input.read_line(&mut line)?;
    }
    Ok(())
}

/// Replace the content of `path` with `input`, mirrored into a shadow.
pub fn put(
    fs: &dyn FileSystem,
    principal: Option<&Principal>,
    path: &str,
    config: &ShadowConfig,
    input: &mut dyn Read,
    out: &mut dyn Write,
) -> Result<()> {
    let scratch = Scratch::open(config).context("opening scratch area")?;
    let file = fs.resolve_as(path, principal)?;
    let bound = ShadowFile::bind(file, &scratch)?;
    let mut writer = bound
        .open_write()
        .with_context(|| format!("opening {} for writing", bound.path()))?;
    let written = io::copy(input, &mut writer)?;
    writer.finish()?;
    writeln!(out, "wrote {written} byte(s) to {}", bound.path())?;
    Ok(())
}

/// Print recorded events, one per line.
pub fn trace_events(events: &[Event], out: &mut dyn Write) -> Result<()> {
    for event in events {
        let phase = if event.is_done() { "finished" } else { "started" };
        writeln!(out, "{}\t{}\t{phase}", event.event_type(), event.file().path())?;
    }
    Ok(())
}

/// Remove orphaned shadows from the configured scratch directory.
pub fn reap(config: &ShadowConfig, out: &mut dyn Write) -> Result<()> {
    let Some(dir) = &config.scratch_dir else {
        bail!("reap needs shadow.scratch_dir in the config");
    };
    let scratch = Scratch::open(&config.clone().with_reap_on_open(false))
        .with_context(|| format!("opening scratch area {}", dir.display()))?;
    let removed = scratch.reap()?;
    writeln!(out, "removed {removed} orphaned shadow(s) from {}", scratch.root().display())?;
    Ok(())
}
