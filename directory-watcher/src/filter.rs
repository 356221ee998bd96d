//! Extension allow-list applied to file changes.

use std::collections::BTreeSet;
use std::path::Path;

/// A case-insensitive set of file extensions.
///
/// An empty filter is inactive and lets every file through. Directories are
/// never subject to the filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: BTreeSet<String>,
}

impl ExtensionFilter {
    /// Build a filter from a list of extensions. Leading dots are ignored and
    /// blank entries are skipped.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .filter_map(|ext| normalize(ext.as_ref()))
            .collect();
        Self { extensions }
    }

    /// Whether the filter restricts anything.
    pub fn is_active(&self) -> bool {
        !self.extensions.is_empty()
    }

    /// Whether a file with the given path passes the filter.
    pub fn allows(&self, path: &Path) -> bool {
        if !self.is_active() {
            return true;
        }

        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }

    /// The extensions in the filter, sorted and lower-cased.
    pub fn extensions(&self) -> Vec<String> {
        self.extensions.iter().cloned().collect()
    }
}

fn normalize(ext: &str) -> Option<String> {
    let ext = ext.trim().trim_start_matches('.');
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_filter_allows_everything() {
        let filter = ExtensionFilter::default();
        assert!(!filter.is_active());
        assert!(filter.allows(Path::new("/a/b.jpg")));
        assert!(filter.allows(Path::new("/a/Makefile")));
    }

    #[test]
    fn test_case_insensitive_membership() {
        let filter = ExtensionFilter::new(["png", "TXT"]);
        assert!(filter.allows(Path::new("/a.PNG")));
        assert!(filter.allows(Path::new("/a.txt")));
        assert!(!filter.allows(Path::new("/a.jpg")));
        assert!(!filter.allows(Path::new("/Makefile")));
    }

    #[test]
    fn test_normalizes_and_sorts() {
        let filter = ExtensionFilter::new([".TXT", "png", " ", "Png"]);
        assert_eq!(filter.extensions(), vec!["png".to_string(), "txt".to_string()]);
    }

    #[test]
    fn test_only_last_extension_counts() {
        let filter = ExtensionFilter::new(["gz"]);
        assert!(filter.allows(Path::new("/bundle.tar.gz")));
        assert!(!filter.allows(Path::new("/bundle.gz.tar")));
    }
}
