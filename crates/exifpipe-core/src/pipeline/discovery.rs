//! File discovery under the configured input roots.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::InputConfig;
use crate::pattern::wildcard_match;

/// Walks input roots and keeps files matching the extension and MIME
/// filters. An empty filter list accepts everything.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    exts: Vec<String>,
    mime_types: Vec<String>,
}

impl FileDiscovery {
    pub fn new(config: &InputConfig) -> Self {
        Self {
            exts: config
                .file_exts
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            mime_types: config.mime_types.iter().map(|m| m.to_lowercase()).collect(),
        }
    }

    /// Discover matching files at a path.
    ///
    /// If path is a file, returns it if supported.
    /// If path is a directory, recursively finds all supported files.
    pub fn discover(&self, path: &Path) -> Vec<PathBuf> {
        if path.is_file() {
            return if self.is_supported(path) {
                vec![path.to_path_buf()]
            } else {
                vec![]
            };
        }
        if !path.exists() {
            tracing::warn!("Input path {:?} does not exist", path);
            return vec![];
        }

        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!("Skipping unreadable entry: {}", err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && self.is_supported(entry.path()))
            .map(|entry| entry.into_path())
            .collect();

        // Sort by path for deterministic ordering
        files.sort();
        files
    }

    /// Discover across several roots, in root order.
    pub fn discover_all(&self, roots: &[PathBuf]) -> Vec<PathBuf> {
        roots.iter().flat_map(|root| self.discover(root)).collect()
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.ext_matches(path) && self.mime_matches(path)
    }

    fn ext_matches(&self, path: &Path) -> bool {
        if self.exts.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext_lower = ext.to_lowercase();
                self.exts.iter().any(|e| *e == ext_lower)
            })
            .unwrap_or(false)
    }

    fn mime_matches(&self, path: &Path) -> bool {
        if self.mime_types.is_empty() {
            return true;
        }
        mime_guess::from_path(path)
            .iter_raw()
            .any(|mime| self.mime_types.iter().any(|p| wildcard_match(p, mime)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery(exts: &[&str], mimes: &[&str]) -> FileDiscovery {
        FileDiscovery::new(&InputConfig {
            file_exts: exts.iter().map(|s| s.to_string()).collect(),
            mime_types: mimes.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
    }

    #[test]
    fn test_is_supported_by_extension() {
        let d = discovery(&["jpg", ".JPEG", "png"], &[]);
        assert!(d.is_supported(Path::new("test.jpg")));
        assert!(d.is_supported(Path::new("test.JPG")));
        assert!(d.is_supported(Path::new("test.jpeg")));
        assert!(d.is_supported(Path::new("test.png")));
        assert!(!d.is_supported(Path::new("test.txt")));
        assert!(!d.is_supported(Path::new("noext")));
    }

    #[test]
    fn test_is_supported_by_mime_pattern() {
        let d = discovery(&[], &["image/*"]);
        assert!(d.is_supported(Path::new("a.JPG")));
        assert!(d.is_supported(Path::new("a.tiff")));
        assert!(d.is_supported(Path::new("a.png")));
        assert!(!d.is_supported(Path::new("a.mp4")));
        assert!(!d.is_supported(Path::new("a.unknown")));
        assert!(!d.is_supported(Path::new("noext")));
    }

    #[test]
    fn test_empty_filters_accept_everything() {
        let d = discovery(&[], &[]);
        assert!(d.is_supported(Path::new("anything.xyz")));
        assert!(d.is_supported(Path::new("noext")));
    }

    #[test]
    fn test_discover_walks_sorted_and_accepts_file_roots() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        for name in ["b.jpg", "a.jpg", "notes.txt", "sub/c.JPG"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let d = discovery(&["jpg"], &[]);
        let found = d.discover(dir.path());
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.jpg"),
                PathBuf::from("b.jpg"),
                PathBuf::from("sub/c.JPG")
            ]
        );

        let single = d.discover(&dir.path().join("a.jpg"));
        assert_eq!(single.len(), 1);
        assert!(d.discover(&dir.path().join("notes.txt")).is_empty());
        assert!(d.discover(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_exact_mime_types_match() {
        let d = discovery(&[], &["video/quicktime", "image/jpeg"]);
        assert!(d.is_supported(Path::new("clip.MOV")));
        assert!(d.is_supported(Path::new("x.jpeg")));
        assert!(!d.is_supported(Path::new("x.png")));
    }
}
