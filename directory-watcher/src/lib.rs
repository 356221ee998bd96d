//! # Directory Watcher
//!
//! Change notification for a watched directory, built for asset
//! hot-reloading. Native notifications arrive on a background thread; the
//! application polls the collected changes once per update tick.
//!
//! ## Features
//!
//! - **Native backends**: FSEvents, inotify or ReadDirectoryChangesW through `notify`
//! - **Coalescing**: bursts of changes to one path are merged over a latency window
//! - **Ambiguity resolution**: coalesced flags are settled against the disk when needed
//! - **Extension filtering**: case-insensitive allow-list for file changes
//! - **Race-free shutdown**: in-flight batches never touch the queue after teardown starts
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Directory Watcher                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  WatchBackend ──► RawEvent ──► Classifier ──► queue ──► poll    │
//! │       │                            │                            │
//! │       ▼                            ▼                            │
//! │  notify / manual            ExtensionFilter                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
pub mod watcher;

pub use backend::{EventInjector, EventSink, ManualBackend, NotifyBackend, WatchBackend};
pub use classify::{Classifier, DiskCheck, ExistenceCheck};
pub use config::WatchConfig;
pub use engine::{EngineState, WatchEngine, WatcherStats};
pub use error::{Result, WatcherError};
pub use event::{EntryKind, FileAction, FileChange, RawEvent};
pub use filter::ExtensionFilter;
pub use watcher::DirectoryWatcher;
