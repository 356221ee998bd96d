//! Change records produced by the watcher and the raw notifications they are
//! resolved from.

use std::fmt;
use std::path::{MAIN_SEPARATOR, PathBuf};

use serde::{Deserialize, Serialize};

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    /// The notification could not be resolved to a transition.
    #[default]
    Unknown,

    /// The path was created or moved into the watched tree.
    Added,

    /// The path was deleted or moved out of the watched tree.
    Removed,

    /// The contents of the path changed.
    Modified,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Modified => "modified",
        };
        f.write_str(name)
    }
}

/// A resolved change under the watched directory.
///
/// `path` is absolute. Directory paths end with the platform separator and
/// file paths never do, so the two can be told apart after the entry is gone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileChange {
    /// Absolute, normalized path of the affected entry.
    pub path: String,

    /// What happened to it.
    pub action: FileAction,
}

impl FileChange {
    /// Create a new change record.
    pub fn new(path: impl Into<String>, action: FileAction) -> Self {
        Self {
            path: path.into(),
            action,
        }
    }

    /// Whether the change refers to a directory.
    pub fn is_directory(&self) -> bool {
        self.path.ends_with(MAIN_SEPARATOR)
    }
}

impl fmt::Display for FileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.path)
    }
}

/// Kind of filesystem entry a notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryKind {
    /// A regular file.
    #[default]
    File,

    /// A directory.
    Directory,

    /// Anything else (symlinks, sockets, fifos, ...). Never reported.
    Other,
}

/// A platform-neutral notification as delivered by a backend.
///
/// The flags are independent: a coalesced notification may carry both
/// `created` and `removed` when an entry appeared and vanished inside one
/// latency window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawEvent {
    /// Absolute path of the entry.
    pub path: PathBuf,

    /// The entry was created.
    pub created: bool,

    /// The entry was removed.
    pub removed: bool,

    /// The entry's contents were modified.
    pub modified: bool,

    /// The entry was renamed (either side of the rename).
    pub renamed: bool,

    /// What the entry is.
    pub kind: EntryKind,
}

impl RawEvent {
    /// Create an event with no flags set.
    pub fn new(path: impl Into<PathBuf>, kind: EntryKind) -> Self {
        Self {
            path: path.into(),
            kind,
            ..Default::default()
        }
    }

    /// Shorthand for a file event.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(path, EntryKind::File)
    }

    /// Shorthand for a directory event.
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::new(path, EntryKind::Directory)
    }

    pub fn created(mut self) -> Self {
        self.created = true;
        self
    }

    pub fn removed(mut self) -> Self {
        self.removed = true;
        self
    }

    pub fn modified(mut self) -> Self {
        self.modified = true;
        self
    }

    pub fn renamed(mut self) -> Self {
        self.renamed = true;
        self
    }

    /// Fold a later notification for the same path into this one.
    pub fn merge(&mut self, other: &RawEvent) {
        self.created |= other.created;
        self.removed |= other.removed;
        self.modified |= other.modified;
        self.renamed |= other.renamed;
        // An entry once seen as a directory stays one; a later stat of a
        // vanished path cannot tell us otherwise.
        if self.kind != EntryKind::Directory {
            self.kind = other.kind;
        }
    }
}
