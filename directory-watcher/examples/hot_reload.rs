//! Poll a directory once per tick and dispatch reload handlers.
//!
//! Usage: cargo run --example hot_reload -- <directory> [extension ...]

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use engine_directory_watcher::{DirectoryWatcher, FileAction, FileChange, WatchConfig};

type Handler = fn(&FileChange);

fn reload(change: &FileChange) {
    println!("reloading {}", change.path);
}

fn unload(change: &FileChange) {
    println!("unloading {}", change.path);
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let directory = args.next().context("usage: hot_reload <directory> [extension ...]")?;
    let config = WatchConfig::new().with_extensions(args);

    let watcher = DirectoryWatcher::try_open(&directory, &config)
        .with_context(|| format!("failed to watch {directory}"))?;
    println!(
        "watching {} for {:?}",
        watcher.directory().display(),
        watcher.applicable_extensions()
    );

    let handlers: HashMap<FileAction, Handler> = HashMap::from([
        (FileAction::Added, reload as Handler),
        (FileAction::Modified, reload as Handler),
        (FileAction::Removed, unload as Handler),
    ]);

    let mut changes = Vec::new();
    loop {
        if watcher.retrieve_changes_into(&mut changes) {
            for change in changes.drain(..) {
                if let Some(handler) = handlers.get(&change.action) {
                    handler(&change);
                }
            }
        }
        std::thread::sleep(Duration::from_millis(16));
    }
}
