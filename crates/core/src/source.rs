//! Source provider abstraction for filesystem-independent content loading.
//!
//! The [`SourceProvider`] trait abstracts file I/O so chunking and include
//! resolution can run against the real filesystem or an in-memory map.
//! Handles are opened and closed inside each call; nothing is held open
//! between calls.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::mime::{ExtensionMimeResolver, MimeResolver};

/// Trait that abstracts file I/O for chunking and inclusion.
///
/// The default [`FileSystemProvider`] delegates to `std::fs`;
/// [`InMemoryProvider`] enables testing without filesystem access.
pub trait SourceProvider: Send + Sync {
    /// Whether `path` names a file that can be opened for reading.
    fn is_readable(&self, path: &Path) -> bool;

    /// Read the raw bytes of `path`.
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, std::io::Error>;

    /// Read `path` as UTF-8 text.
    fn read_text(&self, path: &Path) -> Result<String, std::io::Error> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Default filesystem-backed source provider.
pub struct FileSystemProvider;

impl SourceProvider for FileSystemProvider {
    fn is_readable(&self, path: &Path) -> bool {
        // Opening (and immediately dropping) the handle is the only portable
        // readability check; metadata alone says nothing about permissions.
        path.is_file() && std::fs::File::open(path).is_ok()
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, std::io::Error> {
        std::fs::read(path)
    }

    fn read_text(&self, path: &Path) -> Result<String, std::io::Error> {
        std::fs::read_to_string(path)
    }
}

/// In-memory source provider for testing.
///
/// Maps normalized paths to file contents.
pub struct InMemoryProvider {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl InMemoryProvider {
    /// Create a new in-memory provider from a map of paths to contents.
    pub fn new(files: HashMap<PathBuf, Vec<u8>>) -> Self {
        let files = files
            .into_iter()
            .map(|(path, data)| (normalize_path(&path), data))
            .collect();
        Self { files }
    }

    /// Build a provider from `(path, text)` pairs.
    pub fn from_texts<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::new(
            entries
                .into_iter()
                .map(|(path, text)| (PathBuf::from(path), text.as_bytes().to_vec()))
                .collect(),
        )
    }

    /// Add or replace a file.
    pub fn insert(&mut self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) {
        self.files.insert(normalize_path(path.as_ref()), data.into());
    }
}

impl SourceProvider for InMemoryProvider {
    fn is_readable(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize_path(path))
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, std::io::Error> {
        let normalized = normalize_path(path);
        self.files.get(&normalized).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found in memory: {}", normalized.display()),
            )
        })
    }
}

/// Normalize a path by resolving `.` and `..` components without touching
/// the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                // `..` directly under the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => components.push(component),
            },
            other => components.push(other),
        }
    }
    if components.is_empty() {
        return PathBuf::from(".");
    }
    components.iter().collect()
}

/// Join `relative` onto `base` and normalize the result. Absolute
/// `relative` paths ignore `base`.
pub fn resolve_path(base: &Path, relative: &str) -> PathBuf {
    normalize_path(&base.join(relative))
}

/// The collaborators every file-touching component needs: a source
/// provider and a MIME resolver.
///
/// Constructed once by the host and cloned cheaply into parsers and
/// evaluation environments.
#[derive(Clone)]
pub struct FileAccess {
    pub provider: Arc<dyn SourceProvider>,
    pub mime: Arc<dyn MimeResolver>,
}

impl FileAccess {
    pub fn new(provider: Arc<dyn SourceProvider>, mime: Arc<dyn MimeResolver>) -> Self {
        Self { provider, mime }
    }

    /// Filesystem provider with extension-based MIME detection.
    pub fn filesystem() -> Self {
        Self::new(Arc::new(FileSystemProvider), Arc::new(ExtensionMimeResolver))
    }

    /// In-memory provider with extension-based MIME detection.
    pub fn in_memory(provider: InMemoryProvider) -> Self {
        Self::new(Arc::new(provider), Arc::new(ExtensionMimeResolver))
    }
}

impl std::fmt::Debug for FileAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAccess").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_resolves_dot_and_dotdot() {
        let p = Path::new("/a/b/../c/./d");
        assert_eq!(normalize_path(p), PathBuf::from("/a/c/d"));
    }

    #[test]
    fn normalize_path_keeps_leading_parent_of_relative_path() {
        assert_eq!(
            normalize_path(Path::new("../x/./y")),
            PathBuf::from("../x/y")
        );
        assert_eq!(normalize_path(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn normalize_path_does_not_climb_above_root() {
        assert_eq!(normalize_path(Path::new("/../a")), PathBuf::from("/a"));
    }

    #[test]
    fn resolve_path_joins_relative_fragment() {
        let resolved = resolve_path(Path::new("/docs/chat"), "../assets/./logo.png");
        assert_eq!(resolved, PathBuf::from("/docs/assets/logo.png"));
    }

    #[test]
    fn resolve_path_absolute_fragment_ignores_base() {
        let resolved = resolve_path(Path::new("/docs"), "/etc/notes.txt");
        assert_eq!(resolved, PathBuf::from("/etc/notes.txt"));
    }

    #[test]
    fn in_memory_read_found() {
        let provider = InMemoryProvider::from_texts([("/notes.txt", "hello")]);
        assert!(provider.is_readable(Path::new("/notes.txt")));
        let content = provider.read_text(Path::new("/x/../notes.txt")).unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    fn in_memory_read_not_found() {
        let provider = InMemoryProvider::new(HashMap::new());
        assert!(!provider.is_readable(Path::new("/missing.txt")));
        let err = provider.read_bytes(Path::new("/missing.txt")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn in_memory_read_text_rejects_invalid_utf8() {
        let mut provider = InMemoryProvider::new(HashMap::new());
        provider.insert("/blob.bin", vec![0xff, 0xfe, 0x00]);
        let err = provider.read_text(Path::new("/blob.bin")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn filesystem_provider_reads_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "X").unwrap();
        let provider = FileSystemProvider;
        assert!(provider.is_readable(&path));
        assert!(!provider.is_readable(dir.path()));
        assert_eq!(provider.read_bytes(&path).unwrap(), b"X");
    }
}
