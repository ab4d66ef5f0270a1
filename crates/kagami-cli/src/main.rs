//! kagami - browse a directory through the virtual file contract and expose
//! its nodes as local shadow paths.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kagami_vfs::{EventLog, EventSink, FileSystem, LocalFileSystem, NullSink, Principal};

mod commands;
mod config;

use commands::ShadowOptions;
use config::KagamiConfig;

#[derive(Parser, Debug)]
#[command(name = "kagami")]
#[command(about = "Virtual files with local shadow paths")]
struct Args {
    /// Directory exposed as the virtual root
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// RON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Act as this user
    #[arg(long = "as", value_name = "USER")]
    as_user: Option<String>,

    /// Refuse every mutation
    #[arg(long)]
    read_only: bool,

    /// Print the backend's change events after the command
    #[arg(long)]
    trace_events: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,

        /// One JSON object per entry
        #[arg(long)]
        json: bool,

        /// Only names matching this regex
        #[arg(long = "match", value_name = "REGEX")]
        pattern: Option<String>,
    },

    /// Print a file's content
    Cat { path: String },

    /// Bind a shadow copy and print its local path
    Shadow {
        path: String,

        /// Also bind the directory's children
        #[arg(long)]
        children: bool,

        /// Only children whose names match this regex
        #[arg(long = "match", value_name = "REGEX")]
        pattern: Option<String>,

        /// Keep the shadows until Enter is pressed
        #[arg(long)]
        hold: bool,
    },

    /// Write stdin to a file through a shadow
    Put { path: String },

    /// Remove orphaned shadows from the configured scratch directory
    Reap,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => KagamiConfig::load(path)?,
        None => KagamiConfig::default(),
    };
    let _log_guard = kagami_telemetry::init_tracing(&config.log);

    let mut stdout = io::stdout().lock();
    if let Command::Reap = args.command {
        return commands::reap(&config.shadow, &mut stdout);
    }

    let events = Arc::new(EventLog::new());
    let sink: Arc<dyn EventSink> = if args.trace_events {
        events.clone()
    } else {
        Arc::new(NullSink)
    };
    let fs = LocalFileSystem::with_options(&args.root, args.read_only, sink)
        .with_context(|| format!("opening {}", args.root.display()))?;
    let principal = args.as_user.as_deref().map(Principal::named);
    tracing::debug!(root = %fs.root().display(), user = ?args.as_user, "opened root");

    let result = match &args.command {
        Command::Ls {
            path,
            json,
            pattern,
        } => commands::ls(&fs, principal.as_ref(), path, *json, pattern.as_deref(), &mut stdout),
        Command::Cat { path } => commands::cat(&fs, principal.as_ref(), path, &mut stdout),
        Command::Shadow {
            path,
            children,
            pattern,
            hold,
        } => commands::shadow(
            &fs,
            principal.as_ref(),
            path,
            &config.shadow,
            ShadowOptions {
                children: *children,
                pattern: pattern.as_deref(),
                hold: *hold,
            },
            &mut io::stdin().lock(),
            &mut stdout,
        ),
        Command::Put { path } => commands::put(
            &fs,
            principal.as_ref(),
            path,
            &config.shadow,
            &mut io::stdin().lock(),
            &mut stdout,
        ),
        Command::Reap => Ok(()),
    };

    if args.trace_events {
        commands::trace_events(&events.take(), &mut stdout)?;
    }
    fs.close()?;
    result
}
