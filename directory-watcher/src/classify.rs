//! Resolution of raw notifications into `FileChange` records.
//!
//! Flag combinations delivered by the OS are ambiguous once several changes
//! have been coalesced. The rules below pick an action by priority and fall
//! back to an existence check only where the flags cannot decide on their
//! own.

use std::path::{MAIN_SEPARATOR, Path};

use crate::event::{EntryKind, FileAction, FileChange, RawEvent};
use crate::filter::ExtensionFilter;

/// Point-in-time filesystem queries used to settle ambiguous notifications.
pub trait ExistenceCheck: Send + Sync {
    /// Whether the path currently exists.
    fn exists(&self, path: &Path) -> bool;
}

/// Existence check backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskCheck;

impl ExistenceCheck for DiskCheck {
    fn exists(&self, path: &Path) -> bool {
        // Dangling symlinks still count as present entries.
        path.symlink_metadata().is_ok()
    }
}

/// Action implied by the flags, and whether it must be checked against disk.
fn action_for(event: &RawEvent) -> Option<(FileAction, bool)> {
    if event.modified {
        Some((FileAction::Modified, true))
    } else if event.renamed {
        // The old name of a rename arrives as its own event and resolves to
        // Removed through the recheck.
        Some((FileAction::Added, true))
    } else if event.created {
        Some((FileAction::Added, event.removed))
    } else if event.removed {
        Some((FileAction::Removed, false))
    } else {
        None
    }
}

/// Append the separator to directory paths.
pub fn normalize_path(path: &Path, kind: EntryKind) -> String {
    let mut normalized = path.to_string_lossy().into_owned();
    match kind {
        EntryKind::Directory => {
            if !normalized.ends_with(MAIN_SEPARATOR) {
                normalized.push(MAIN_SEPARATOR);
            }
        }
        EntryKind::File | EntryKind::Other => {
            while normalized.len() > 1 && normalized.ends_with(MAIN_SEPARATOR) {
                normalized.pop();
            }
        }
    }
    normalized
}

/// Turns raw notifications into changes for one watch.
pub struct Classifier {
    filter: ExtensionFilter,
    report_unknown: bool,
    checker: Box<dyn ExistenceCheck>,
}

impl Classifier {
    /// Create a classifier that rechecks against the real filesystem.
    pub fn new(filter: ExtensionFilter, report_unknown: bool) -> Self {
        Self::with_checker(filter, report_unknown, Box::new(DiskCheck))
    }

    /// Create a classifier with a custom existence check.
    pub fn with_checker(
        filter: ExtensionFilter,
        report_unknown: bool,
        checker: Box<dyn ExistenceCheck>,
    ) -> Self {
        Self {
            filter,
            report_unknown,
            checker,
        }
    }

    /// The extension filter this classifier applies.
    pub fn filter(&self) -> &ExtensionFilter {
        &self.filter
    }

    /// Resolve a single notification. `None` means the event is dropped.
    pub fn classify(&self, event: &RawEvent) -> Option<FileChange> {
        if event.kind == EntryKind::Other {
            return None;
        }

        let flagged = action_for(event);
        if flagged.is_none() && !self.report_unknown {
            return None;
        }

        if event.kind == EntryKind::File && !self.filter.allows(&event.path) {
            return None;
        }

        let action = match flagged {
            Some((_, true)) if !self.checker.exists(&event.path) => FileAction::Removed,
            Some((action, _)) => action,
            None => FileAction::Unknown,
        };

        Some(FileChange::new(
            normalize_path(&event.path, event.kind),
            action,
        ))
    }

    /// Resolve a batch, preserving delivery order.
    pub fn classify_batch<'a>(
        &'a self,
        events: &'a [RawEvent],
    ) -> impl Iterator<Item = FileChange> + 'a {
        events.iter().filter_map(|event| self.classify(event))
    }
}
