//! Native notification sources.
//!
//! A backend registers a watch with some event source and hands batches of
//! platform-neutral [`RawEvent`]s to an [`EventSink`]. Classification happens
//! once, in the engine, regardless of which backend produced the batch.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, trace, warn};
use walkdir::WalkDir;

use crate::config::WatchConfig;
use crate::error::Result;
use crate::event::{EntryKind, RawEvent};

/// Receives batches of notifications from a backend thread.
pub type EventSink = Arc<dyn Fn(&[RawEvent]) + Send + Sync>;

/// Upper bound on how long the coalescing thread sleeps before rechecking
/// its stop flag.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A source of filesystem notifications for one directory.
pub trait WatchBackend: Send {
    /// Register the watch and start delivering batches to `sink`.
    ///
    /// On error the backend must not hold any native resource.
    fn start(&mut self, root: &Path, config: &WatchConfig, sink: EventSink) -> Result<()>;

    /// Stop delivery and release the native watch. Must be idempotent.
    fn stop(&mut self);
}

/// Backend built on the platform's recommended `notify` watcher
/// (FSEvents, inotify or ReadDirectoryChangesW).
///
/// Native events are coalesced per path over the configured latency window
/// before being delivered, so a burst of writes to one file arrives as a
/// single notification with all of its flags set.
#[derive(Default)]
pub struct NotifyBackend {
    watcher: Option<RecommendedWatcher>,
    coalescer: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl NotifyBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatchBackend for NotifyBackend {
    fn start(&mut self, root: &Path, config: &WatchConfig, sink: EventSink) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                // The receiver only goes away during teardown.
                let _ = tx.send(res);
            })?;

        let mode = if config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        // Dropping `watcher` on the error path releases the native handle.
        watcher.watch(root, mode)?;

        let translator = Translator::seeded(root, config.recursive);
        let latency = config.latency();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let coalescer = thread::Builder::new()
            .name("directory-watcher".to_string())
            .spawn(move || run_coalescer(rx, latency, translator, thread_stop, sink))?;

        debug!("Registered native watch on {}", root.display());
        self.watcher = Some(watcher);
        self.coalescer = Some(coalescer);
        self.stop = stop;
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);

        // Stop native delivery first, then wait for the coalescer to exit.
        drop(self.watcher.take());
        if let Some(handle) = self.coalescer.take() {
            if handle.join().is_err() {
                error!("Coalescing thread panicked");
            }
        }
    }
}

impl Drop for NotifyBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_coalescer(
    rx: Receiver<notify::Result<notify::Event>>,
    latency: Duration,
    mut translator: Translator,
    stop: Arc<AtomicBool>,
    sink: EventSink,
) {
    let mut pending: IndexMap<PathBuf, RawEvent> = IndexMap::new();
    let mut deadline: Option<Instant> = None;

    while !stop.load(Ordering::SeqCst) {
        let wait = deadline
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(STOP_POLL_INTERVAL)
            .min(STOP_POLL_INTERVAL);

        match rx.recv_timeout(wait) {
            Ok(Ok(event)) => {
                if event.need_rescan() {
                    warn!("Native event queue overflowed; some changes were lost");
                }
                for raw in translator.translate(&event) {
                    match pending.get_mut(&raw.path) {
                        Some(existing) => existing.merge(&raw),
                        None => {
                            pending.insert(raw.path.clone(), raw);
                        }
                    }
                }
                if deadline.is_none() && !pending.is_empty() {
                    deadline = Some(Instant::now() + latency);
                }
            }
            Ok(Err(err)) => warn!("Watch error: {err}"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if deadline.is_some_and(|at| Instant::now() >= at) {
            deadline = None;
            let batch: Vec<RawEvent> = pending.drain(..).map(|(_, raw)| raw).collect();
            if !stop.load(Ordering::SeqCst) {
                trace!("Delivering {} coalesced events", batch.len());
                sink(&batch);
            }
        }
    }
}

/// Converts `notify` events into [`RawEvent`]s.
///
/// Keeps the set of directories seen under the root so that a directory
/// which has already vanished is still reported as one.
///
/// In recursive mode a directory that appears is walked on arrival: the
/// native watch on it is only registered after its own event, so entries
/// created inside it before then would otherwise never be reported.
#[derive(Debug, Default)]
pub(crate) struct Translator {
    known_dirs: HashSet<PathBuf>,
    recursive: bool,
}

impl Translator {
    pub(crate) fn seeded(root: &Path, recursive: bool) -> Self {
        let max_depth = if recursive { usize::MAX } else { 1 };
        let known_dirs = WalkDir::new(root)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .map(walkdir::DirEntry::into_path)
            .collect();
        Self {
            known_dirs,
            recursive,
        }
    }

    pub(crate) fn translate(&mut self, event: &notify::Event) -> Vec<RawEvent> {
        let mut template = RawEvent::default();
        let hint = match event.kind {
            EventKind::Create(kind) => {
                template.created = true;
                match kind {
                    CreateKind::File => Some(EntryKind::File),
                    CreateKind::Folder => Some(EntryKind::Directory),
                    _ => None,
                }
            }
            EventKind::Remove(kind) => {
                template.removed = true;
                match kind {
                    RemoveKind::File => Some(EntryKind::File),
                    RemoveKind::Folder => Some(EntryKind::Directory),
                    _ => None,
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                template.renamed = true;
                None
            }
            EventKind::Modify(ModifyKind::Metadata(_)) => None,
            EventKind::Modify(_) => {
                template.modified = true;
                None
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
        };

        let mut raws = Vec::with_capacity(event.paths.len());
        for path in &event.paths {
            let kind = self.entry_kind(path, hint);
            self.track(path, kind, &template);
            raws.push(RawEvent {
                path: path.clone(),
                kind,
                ..template.clone()
            });

            let appeared = template.created || template.renamed;
            if self.recursive && appeared && kind == EntryKind::Directory && path.is_dir() {
                raws.extend(self.walk_new_directory(path));
            }
        }
        raws
    }

    /// Report everything already inside a directory that just appeared.
    fn walk_new_directory(&mut self, dir: &Path) -> Vec<RawEvent> {
        let mut raws = Vec::new();
        let entries = WalkDir::new(dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok());
        for entry in entries {
            let file_type = entry.file_type();
            let kind = if file_type.is_dir() {
                self.known_dirs.insert(entry.path().to_path_buf());
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            raws.push(RawEvent::new(entry.into_path(), kind).created());
        }
        if !raws.is_empty() {
            trace!("Found {} entries inside new directory {}", raws.len(), dir.display());
        }
        raws
    }

    fn entry_kind(&self, path: &Path, hint: Option<EntryKind>) -> EntryKind {
        match path.symlink_metadata() {
            Ok(meta) if meta.is_dir() => EntryKind::Directory,
            Ok(meta) if meta.is_file() => EntryKind::File,
            Ok(_) => EntryKind::Other,
            Err(_) => match hint {
                Some(kind) => kind,
                None if self.known_dirs.contains(path) => EntryKind::Directory,
                None => EntryKind::File,
            },
        }
    }

    fn track(&mut self, path: &Path, kind: EntryKind, flags: &RawEvent) {
        if kind != EntryKind::Directory {
            return;
        }
        if path.is_dir() {
            self.known_dirs.insert(path.to_path_buf());
        } else if flags.removed || flags.renamed {
            self.known_dirs.retain(|dir| !dir.starts_with(path));
        }
    }
}

/// Backend fed by hand through an [`EventInjector`].
///
/// Useful for tools that replay recorded notifications and for exercising
/// the engine without depending on OS timing.
#[derive(Default)]
pub struct ManualBackend {
    slot: Arc<Mutex<Option<EventSink>>>,
    fail_start: bool,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose registration always fails.
    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    /// Handle for pushing batches into the watch once started.
    pub fn injector(&self) -> EventInjector {
        EventInjector {
            slot: self.slot.clone(),
        }
    }
}

impl WatchBackend for ManualBackend {
    fn start(&mut self, root: &Path, _config: &WatchConfig, sink: EventSink) -> Result<()> {
        if self.fail_start {
            return Err(notify::Error::generic("manual backend refused registration")
                .add_path(root.to_path_buf())
                .into());
        }
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Pushes synthetic batches into a [`ManualBackend`].
#[derive(Clone)]
pub struct EventInjector {
    slot: Arc<Mutex<Option<EventSink>>>,
}

impl EventInjector {
    /// Deliver a batch as if it came from the OS. Returns `false` once the
    /// backend has been stopped or before it was started.
    pub fn inject(&self, batch: &[RawEvent]) -> bool {
        let sink = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match sink {
            Some(sink) => {
                sink(batch);
                true
            }
            None => false,
        }
    }
}
