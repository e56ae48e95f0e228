//! globwatch - print file system events for paths matching a glob

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use watcher::{WatchOptions, Watcher};

mod logging;
mod output;

use output::Format;

/// Watch files and directories matching a glob pattern
#[derive(Parser, Debug)]
#[command(name = "globwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Glob pattern relative to the working directory (e.g. "**/*.rs")
    pattern: String,

    /// Directory the pattern is resolved against (default: current directory)
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Close the watcher as soon as its handle goes away
    #[arg(long)]
    no_persistent: bool,

    /// Quiet period before a burst of changes is reported (default: 50)
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Maximum directory depth below the working directory
    #[arg(long)]
    depth: Option<usize>,

    /// Exclude paths matching a gitignore-style pattern (repeatable)
    #[arg(long = "ignore", value_name = "PATTERN")]
    ignore: Vec<String>,

    /// Also honour the working directory's .gitignore
    #[arg(long)]
    gitignore: bool,

    /// Re-list every watched directory on this interval
    #[arg(long = "rescan-ms", value_name = "MS")]
    rescan_ms: Option<u64>,

    /// Load options from a TOML file; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print one JSON object per event
    #[arg(long)]
    json: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> Result<WatchOptions> {
        let mut options = match &self.config {
            Some(path) => WatchOptions::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => WatchOptions::default(),
        };

        if let Some(cwd) = &self.cwd {
            options.cwd = Some(cwd.clone());
        }
        if self.no_persistent {
            options.persistent = false;
        }
        if let Some(debounce_ms) = self.debounce_ms {
            options.debounce_ms = debounce_ms;
        }
        if let Some(depth) = self.depth {
            options.depth = Some(depth);
        }
        if self.gitignore {
            options.ignore.use_gitignore = true;
        }
        if let Some(rescan_ms) = self.rescan_ms {
            options.rescan_interval_ms = Some(rescan_ms);
        }
        options.ignore.patterns.extend(self.ignore.iter().cloned());

        Ok(options)
    }

    fn format(&self) -> Format {
        if self.json {
            Format::Json
        } else {
            Format::Plain
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let options = cli.options()?;
    let (mut watcher, mut events) =
        Watcher::spawn(cli.pattern.clone(), options).context("Failed to start watcher")?;
    let format = cli.format();
    info!(pattern = %cli.pattern, "watcher started");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => println!("{}", output::render(&event, format)),
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    watcher.close().await.context("Failed to close watcher")?;
    info!(pattern = %cli.pattern, "watcher closed");
    Ok(())
}
