//! Polling facade over a [`WatchEngine`].

use std::path::Path;

use crate::backend::WatchBackend;
use crate::config::WatchConfig;
use crate::engine::{EngineState, WatchEngine, WatcherStats};
use crate::error::Result;
use crate::event::FileChange;

/// Watches one directory and collects changes until they are polled.
///
/// Intended to be polled once per update tick:
///
/// ```no_run
/// use engine_directory_watcher::{DirectoryWatcher, FileAction};
///
/// let watcher = DirectoryWatcher::open("assets", ["png", "glsl"]);
/// for change in watcher.retrieve_changes() {
///     match change.action {
///         FileAction::Added | FileAction::Modified => println!("reload {}", change.path),
///         FileAction::Removed => println!("unload {}", change.path),
///         FileAction::Unknown => {}
///     }
/// }
/// ```
///
/// A watcher that failed to open stays inactive: every query returns its
/// default and polling yields nothing.
#[derive(Default)]
pub struct DirectoryWatcher {
    engine: Option<WatchEngine>,
}

impl DirectoryWatcher {
    /// Create an inactive watcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch `directory`, reporting file changes only for `extensions`
    /// (all files when empty). Failure leaves the watcher inactive.
    pub fn open<I, S>(directory: impl AsRef<Path>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_config(directory, WatchConfig::new().with_extensions(extensions))
    }

    /// Watch `directory` with a full config. Failure leaves the watcher
    /// inactive.
    pub fn with_config(directory: impl AsRef<Path>, config: WatchConfig) -> Self {
        Self::try_open(directory, &config).unwrap_or_default()
    }

    /// Watch `directory` through a caller-supplied backend. Failure leaves
    /// the watcher inactive.
    pub fn with_backend(
        directory: impl AsRef<Path>,
        config: WatchConfig,
        backend: Box<dyn WatchBackend>,
    ) -> Self {
        WatchEngine::start_with_backend(directory.as_ref(), &config, backend)
            .map(Self::from)
            .unwrap_or_default()
    }

    /// Watch `directory`, returning the reason on failure.
    pub fn try_open(directory: impl AsRef<Path>, config: &WatchConfig) -> Result<Self> {
        WatchEngine::start(directory.as_ref(), config).map(Self::from)
    }

    /// Whether the underlying watch is running.
    pub fn is_open(&self) -> bool {
        self.engine.as_ref().is_some_and(WatchEngine::is_watching)
    }

    pub fn state(&self) -> EngineState {
        self.engine
            .as_ref()
            .map_or(EngineState::Uninitialized, WatchEngine::state)
    }

    /// Absolute watched directory ending with a separator, or an empty path
    /// when inactive.
    pub fn directory(&self) -> &Path {
        Path::new(self.engine.as_ref().map_or("", WatchEngine::directory))
    }

    /// Sorted, lower-cased extensions changes are reported for. Empty means
    /// every file, or an inactive watcher.
    pub fn applicable_extensions(&self) -> Vec<String> {
        self.engine
            .as_ref()
            .map(WatchEngine::applicable_extensions)
            .unwrap_or_default()
    }

    /// Take every change recorded since the last poll.
    pub fn retrieve_changes(&self) -> Vec<FileChange> {
        self.engine
            .as_ref()
            .map(WatchEngine::drain)
            .unwrap_or_default()
    }

    /// Append every change recorded since the last poll to `out`. Returns
    /// whether anything was appended.
    pub fn retrieve_changes_into(&self, out: &mut Vec<FileChange>) -> bool {
        self.engine
            .as_ref()
            .is_some_and(|engine| engine.drain_into(out))
    }

    /// Discard every change recorded since the last poll.
    pub fn clear_changes(&self) {
        if let Some(engine) = &self.engine {
            engine.clear();
        }
    }

    pub fn stats(&self) -> WatcherStats {
        self.engine
            .as_ref()
            .map(WatchEngine::stats)
            .unwrap_or_default()
    }

    /// Stop watching. Changes already recorded can still be retrieved.
    pub fn close(&mut self) {
        if let Some(engine) = &mut self.engine {
            engine.stop();
        }
    }
}

impl From<WatchEngine> for DirectoryWatcher {
    fn from(engine: WatchEngine) -> Self {
        Self {
            engine: Some(engine),
        }
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("directory", &self.directory())
            .field("state", &self.state())
            .field("extensions", &self.applicable_extensions())
            .finish()
    }
}
