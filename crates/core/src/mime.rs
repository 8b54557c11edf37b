//! MIME type resolution for referenced and included files.
//!
//! Detection itself is pluggable through [`MimeResolver`]. Two resolvers are
//! provided: a pure extension table and one that shells out to `file(1)`.
//! Whichever is used, [`resolve_mime`] applies the same fallback order:
//! explicit override, live detection, extension table.

use std::path::Path;
use std::process::Command;

use tracing::debug;

/// Failure to determine a MIME type through live detection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MimeError {
    /// The detection tool is not installed or could not be started.
    #[error("MIME detection tool unavailable: {0}")]
    Unavailable(String),
    /// The detection tool ran but reported a failure.
    #[error("MIME detection failed for {path}: {message}")]
    Detection { path: String, message: String },
    /// Nothing in the extension table matched.
    #[error("unknown file extension: {0}")]
    UnknownExtension(String),
}

/// Resolves a MIME type for a file on disk.
pub trait MimeResolver: Send + Sync {
    /// Live detection for `path`.
    fn resolve(&self, path: &Path) -> Result<String, MimeError>;

    /// Pure static lookup by file extension.
    fn resolve_by_extension(&self, path: &Path) -> Option<String> {
        extension_mime(path)
    }
}

/// Static extension lookup backed by `mime_guess`.
pub fn extension_mime(path: &Path) -> Option<String> {
    mime_guess::from_path(path).first_raw().map(str::to_owned)
}

/// Resolver that only consults the extension table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionMimeResolver;

impl MimeResolver for ExtensionMimeResolver {
    fn resolve(&self, path: &Path) -> Result<String, MimeError> {
        extension_mime(path).ok_or_else(|| MimeError::UnknownExtension(path.display().to_string()))
    }
}

/// Resolver that runs `file --mime-type -b <path>`.
///
/// Availability of the tool is probed once, when the resolver is built.
#[derive(Debug, Clone)]
pub struct FileCommandMimeResolver {
    program: String,
    available: bool,
}

impl FileCommandMimeResolver {
    /// Probe the system `file` command.
    pub fn new() -> Self {
        Self::with_program("file")
    }

    /// Probe an alternative `file`-compatible program.
    pub fn with_program(program: impl Into<String>) -> Self {
        let program = program.into();
        let available = Command::new(&program)
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false);
        debug!(program = %program, available, "probed MIME detection tool");
        Self { program, available }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }
}

impl Default for FileCommandMimeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MimeResolver for FileCommandMimeResolver {
    fn resolve(&self, path: &Path) -> Result<String, MimeError> {
        if !self.available {
            return Err(MimeError::Unavailable(self.program.clone()));
        }
        let output = Command::new(&self.program)
            .arg("--mime-type")
            .arg("-b")
            .arg(path)
            .output()
            .map_err(|e| MimeError::Unavailable(format!("{}: {}", self.program, e)))?;
        if !output.status.success() {
            return Err(MimeError::Detection {
                path: path.display().to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let mime = String::from_utf8_lossy(&output.stdout).trim().to_string();
        // `file` reports unreadable paths on stdout with a zero exit status
        if mime.is_empty() || !mime.contains('/') {
            return Err(MimeError::Detection {
                path: path.display().to_string(),
                message: if mime.is_empty() {
                    "empty output".to_string()
                } else {
                    mime
                },
            });
        }
        Ok(mime)
    }
}

/// Resolve the MIME type of `path`: explicit override, then live detection,
/// then the extension table. `None` means nothing matched.
pub fn resolve_mime(
    resolver: &dyn MimeResolver,
    path: &Path,
    override_mime: Option<&str>,
) -> Option<String> {
    if let Some(mime) = override_mime.map(str::trim).filter(|m| !m.is_empty()) {
        return Some(mime.to_string());
    }
    match resolver.resolve(path) {
        Ok(mime) => Some(mime),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "live MIME detection failed, trying extension");
            resolver.resolve_by_extension(path)
        }
    }
}

/// The media type without parameters, lowercased (`"Text/Plain; charset=x"`
/// becomes `"text/plain"`).
pub fn essence(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}
