//! The watch engine: owns the native watch and the pending-change queue.

use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, trace};

use crate::backend::{EventSink, NotifyBackend, WatchBackend};
use crate::classify::Classifier;
use crate::config::WatchConfig;
use crate::error::{Result, WatcherError};
use crate::event::{FileChange, RawEvent};
use crate::filter::ExtensionFilter;

/// Lifecycle of a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No watch has been started.
    Uninitialized,

    /// Native notifications are being delivered.
    Watching,

    /// The watch was torn down. Terminal.
    Stopped,
}

/// Counters describing what a watch has seen so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WatcherStats {
    /// Raw notifications delivered by the backend.
    pub events_received: u64,

    /// Changes appended to the queue.
    pub changes_queued: u64,

    /// Notifications dropped by classification or filtering.
    pub events_dropped: u64,

    /// Changes waiting to be retrieved.
    pub pending: usize,

    /// When the watch started.
    pub started_at: Option<DateTime<Utc>>,
}

/// State shared between the engine and the backend callback.
struct Shared {
    queue: Mutex<Vec<FileChange>>,
    aborted: AtomicBool,
    classifier: Classifier,
    events_received: AtomicU64,
    changes_queued: AtomicU64,
    events_dropped: AtomicU64,
}

impl Shared {
    fn new(classifier: Classifier) -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            aborted: AtomicBool::new(false),
            classifier,
            events_received: AtomicU64::new(0),
            changes_queued: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, Vec<FileChange>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Backend callback. Returns without touching the queue once teardown
    /// has begun.
    fn deliver(&self, batch: &[RawEvent]) {
        if self.is_aborted() {
            return;
        }

        let changes: Vec<FileChange> = self.classifier.classify_batch(batch).collect();

        let mut queue = self.lock_queue();
        if self.is_aborted() {
            return;
        }
        let total = batch.len() as u64;
        let kept = changes.len() as u64;
        self.events_received.fetch_add(total, Ordering::Relaxed);
        self.changes_queued.fetch_add(kept, Ordering::Relaxed);
        self.events_dropped.fetch_add(total - kept, Ordering::Relaxed);
        queue.extend(changes);
        trace!("Queued {kept} of {total} events");
    }
}

/// A running watch on one directory.
///
/// Dropping the engine tears the watch down: the abort flag is raised before
/// the backend is stopped, so a batch still in flight on the notification
/// thread never mutates the queue afterwards.
pub struct WatchEngine {
    directory: String,
    shared: Arc<Shared>,
    backend: Box<dyn WatchBackend>,
    state: EngineState,
    started_at: DateTime<Utc>,
}

impl WatchEngine {
    /// Start watching `directory` with the platform's native backend.
    pub fn start(directory: &Path, config: &WatchConfig) -> Result<Self> {
        Self::start_with_backend(directory, config, Box::new(NotifyBackend::new()))
    }

    /// Start watching `directory` with the given backend.
    pub fn start_with_backend(
        directory: &Path,
        config: &WatchConfig,
        mut backend: Box<dyn WatchBackend>,
    ) -> Result<Self> {
        let root = match resolve_directory(directory) {
            Ok(root) => root,
            Err(err) => {
                error!("Cannot watch {}: {err}", directory.display());
                return Err(err);
            }
        };

        let filter = ExtensionFilter::new(&config.extensions);
        let shared = Arc::new(Shared::new(Classifier::new(filter, config.report_unknown)));

        let callback_state = shared.clone();
        let sink: EventSink = Arc::new(move |batch: &[RawEvent]| callback_state.deliver(batch));

        if let Err(err) = backend.start(&root, config, sink) {
            backend.stop();
            error!("Failed to register watch on {}: {err}", root.display());
            return Err(err);
        }

        let mut directory = root.to_string_lossy().into_owned();
        if !directory.ends_with(MAIN_SEPARATOR) {
            directory.push(MAIN_SEPARATOR);
        }
        info!(
            "Watching {directory} (extensions: {:?}, latency: {}ms)",
            shared.classifier.filter().extensions(),
            config.latency_ms
        );

        Ok(Self {
            directory,
            shared,
            backend,
            state: EngineState::Watching,
            started_at: Utc::now(),
        })
    }

    /// Tear the watch down. Does nothing if already stopped.
    pub fn stop(&mut self) {
        if self.state != EngineState::Watching {
            return;
        }

        self.shared.aborted.store(true, Ordering::SeqCst);
        // Any batch that passed the abort check holds the lock; wait it out.
        drop(self.shared.lock_queue());

        self.backend.stop();
        self.state = EngineState::Stopped;
        info!("Stopped watching {}", self.directory);
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_watching(&self) -> bool {
        self.state == EngineState::Watching
    }

    /// Absolute watched directory, ending with a separator.
    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Sorted, lower-cased extensions changes are reported for.
    pub fn applicable_extensions(&self) -> Vec<String> {
        self.shared.classifier.filter().extensions()
    }

    /// Take every pending change, leaving the queue empty.
    pub fn drain(&self) -> Vec<FileChange> {
        let changes = std::mem::take(&mut *self.shared.lock_queue());
        if !changes.is_empty() {
            debug!("Drained {} changes from {}", changes.len(), self.directory);
        }
        changes
    }

    /// Move every pending change onto the end of `out`.
    pub fn drain_into(&self, out: &mut Vec<FileChange>) -> bool {
        let mut changes = self.drain();
        let any = !changes.is_empty();
        out.append(&mut changes);
        any
    }

    /// Discard every pending change.
    pub fn clear(&self) {
        self.shared.lock_queue().clear();
    }

    pub fn stats(&self) -> WatcherStats {
        WatcherStats {
            events_received: self.shared.events_received.load(Ordering::Relaxed),
            changes_queued: self.shared.changes_queued.load(Ordering::Relaxed),
            events_dropped: self.shared.events_dropped.load(Ordering::Relaxed),
            pending: self.shared.lock_queue().len(),
            started_at: Some(self.started_at),
        }
    }
}

impl Drop for WatchEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn resolve_directory(directory: &Path) -> Result<PathBuf> {
    if !directory.exists() {
        return Err(WatcherError::DirectoryNotFound(
            directory.display().to_string(),
        ));
    }
    if !directory.is_dir() {
        return Err(WatcherError::NotADirectory(directory.display().to_string()));
    }
    Ok(dunce::canonicalize(directory)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EventInjector, ManualBackend};
    use crate::event::FileAction;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn manual_engine(dir: &TempDir, config: &WatchConfig) -> (WatchEngine, EventInjector) {
        let backend = ManualBackend::new();
        let injector = backend.injector();
        let engine =
            WatchEngine::start_with_backend(dir.path(), config, Box::new(backend)).unwrap();
        (engine, injector)
    }

    #[test]
    fn test_start_rejects_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = WatchEngine::start_with_backend(
            &temp_dir.path().join("missing"),
            &WatchConfig::default(),
            Box::new(ManualBackend::new()),
        );
        assert!(matches!(result, Err(WatcherError::DirectoryNotFound(_))));
    }

    #[test]
    fn test_start_rejects_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();

        let result = WatchEngine::start_with_backend(
            &file,
            &WatchConfig::default(),
            Box::new(ManualBackend::new()),
        );
        assert!(matches!(result, Err(WatcherError::NotADirectory(_))));
    }

    #[test]
    fn test_start_reports_backend_failure() {
        let temp_dir = TempDir::new().unwrap();
        let result = WatchEngine::start_with_backend(
            temp_dir.path(),
            &WatchConfig::default(),
            Box::new(ManualBackend::failing()),
        );
        assert!(matches!(result, Err(WatcherError::Notify(_))));
    }

    #[test]
    fn test_directory_is_normalized() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = manual_engine(&temp_dir, &WatchConfig::default());

        let expected = format!(
            "{}{MAIN_SEPARATOR}",
            dunce::canonicalize(temp_dir.path()).unwrap().display()
        );
        assert_eq!(engine.directory(), expected);
        assert_eq!(engine.state(), EngineState::Watching);
    }

    #[test]
    fn test_drain_empties_queue() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, injector) = manual_engine(&temp_dir, &WatchConfig::default());
        let path = temp_dir.path().join("gone.txt");

        assert!(injector.inject(&[RawEvent::file(&path).removed()]));
        let changes = engine.drain();
        assert_eq!(
            changes,
            vec![FileChange::new(path.to_string_lossy(), FileAction::Removed)]
        );
        assert!(engine.drain().is_empty());
    }

    #[test]
    fn test_stats_count_drops() {
        let temp_dir = TempDir::new().unwrap();
        let config = WatchConfig::new().with_extensions(["png"]);
        let (engine, injector) = manual_engine(&temp_dir, &config);

        injector.inject(&[
            RawEvent::file(temp_dir.path().join("a.png")).removed(),
            RawEvent::file(temp_dir.path().join("a.jpg")).removed(),
            RawEvent::file(temp_dir.path().join("b.png")),
        ]);

        let stats = engine.stats();
        assert_eq!(stats.events_received, 3);
        assert_eq!(stats.changes_queued, 1);
        assert_eq!(stats.events_dropped, 2);
        assert_eq!(stats.pending, 1);
        assert!(stats.started_at.is_some());
    }

    #[test]
    fn test_stop_blocks_further_delivery() {
        let temp_dir = TempDir::new().unwrap();
        let (mut engine, injector) = manual_engine(&temp_dir, &WatchConfig::default());

        engine.stop();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(!injector.inject(&[RawEvent::file("/x").removed()]));

        // Stopping twice is harmless.
        engine.stop();
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[test]
    fn test_abort_flag_checked_before_queue() {
        let shared = Shared::new(Classifier::new(ExtensionFilter::default(), false));
        shared.aborted.store(true, Ordering::SeqCst);
        shared.deliver(&[RawEvent::file("/x").removed()]);

        assert!(shared.lock_queue().is_empty());
        assert_eq!(shared.events_received.load(Ordering::Relaxed), 0);
    }
}
