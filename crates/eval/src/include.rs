//! The `include()` capability.
//!
//! `include(path)` reads a text file, evaluates its `{{ }}` expressions in a
//! fresh child environment and returns the pieces as a composite part.
//! `include(path, #{ binary: true })` returns the raw bytes with a MIME type
//! instead and never recurses. Text includes track the active chain in an
//! [`IncludeStack`] and refuse to re-enter a file already on it.

use std::path::{Path, PathBuf};

use parley_core::{
    resolve_mime, resolve_path, BinaryIncludePart, CompositeIncludePart, EmitValue, FileAccess,
    IncludeChild, IncludePart,
};
use rhai::{Dynamic, EvalAltResult};
use tracing::debug;

use crate::env::{Environment, IncludeStack};
use crate::error::EvalError;
use crate::evaluate::{eval_expression, to_emit_value};
use crate::segment::{segment, Segment};

/// Options accepted as the second argument of `include()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeOptions {
    pub binary: bool,
    /// MIME type to use instead of detection (binary mode only).
    pub mime: Option<String>,
}

impl IncludeOptions {
    pub fn binary() -> Self {
        IncludeOptions {
            binary: true,
            mime: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Read options from a script map such as `#{ binary: true, mime: "image/png" }`.
    pub(crate) fn from_map(map: &rhai::Map) -> Result<Self, Box<EvalAltResult>> {
        let binary = match map.get("binary") {
            None => false,
            Some(value) if value.is_unit() => false,
            Some(value) => value
                .as_bool()
                .map_err(|actual| format!("include(): `binary` must be a boolean, got {}", actual))?,
        };
        let mime = match map.get("mime") {
            None => None,
            Some(value) if value.is_unit() => None,
            Some(value) => Some(
                value
                    .clone()
                    .into_string()
                    .map_err(|actual| format!("include(): `mime` must be a string, got {}", actual))?,
            ),
        };
        Ok(IncludeOptions { binary, mime })
    }
}

/// `include()` bound to one environment's directory and include chain.
#[derive(Clone)]
pub struct IncludeResolver {
    dir: Option<PathBuf>,
    stack: IncludeStack,
    files: FileAccess,
}

impl IncludeResolver {
    pub fn new(dir: Option<PathBuf>, stack: IncludeStack, files: FileAccess) -> Self {
        IncludeResolver { dir, stack, files }
    }

    pub fn stack(&self) -> &IncludeStack {
        &self.stack
    }

    /// Resolve `relative_path` against the current directory, if any.
    pub fn resolve_path(&self, relative_path: &str) -> PathBuf {
        match &self.dir {
            Some(dir) => resolve_path(dir, relative_path),
            None => PathBuf::from(relative_path),
        }
    }

    /// Perform one `include()` call.
    pub fn include(&self, relative_path: &str, options: &IncludeOptions) -> Result<IncludePart, EvalError> {
        let path = self.resolve_path(relative_path);
        if !self.files.provider.is_readable(&path) {
            return Err(EvalError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        if options.binary {
            self.include_binary(relative_path, &path, options.mime.as_deref())
        } else {
            self.include_text(&path)
        }
    }

    fn include_binary(
        &self,
        relative_path: &str,
        path: &Path,
        mime_override: Option<&str>,
    ) -> Result<IncludePart, EvalError> {
        let mime_type = resolve_mime(self.files.mime.as_ref(), path, mime_override).ok_or_else(|| {
            EvalError::MimeUndetermined {
                path: path.display().to_string(),
            }
        })?;
        let data = self
            .files
            .provider
            .read_bytes(path)
            .map_err(|e| EvalError::ReadFailure {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        debug!(path = %path.display(), mime = %mime_type, bytes = data.len(), "binary include");
        Ok(IncludePart::Binary(BinaryIncludePart {
            filename: relative_path.to_string(),
            mime_type,
            data,
        }))
    }

    fn include_text(&self, path: &Path) -> Result<IncludePart, EvalError> {
        if self.stack.contains(path) {
            return Err(EvalError::CircularInclude {
                chain: self.stack.chain_with(path),
            });
        }
        let text = self
            .files
            .provider
            .read_text(path)
            .map_err(|e| EvalError::ReadFailure {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        debug!(path = %path.display(), depth = self.stack.len() + 1, "text include");

        let mut child = Environment::child(
            path.to_path_buf(),
            self.stack.extended(path.to_path_buf()),
            self.files.clone(),
        );

        let mut children = Vec::new();
        for seg in segment(&text) {
            match seg {
                Segment::Text(literal) => children.push(IncludeChild::Text(literal.to_string())),
                Segment::Expression { code, .. } => {
                    let value = eval_expression(code, &mut child)?;
                    children.push(match to_emit_value(value) {
                        EmitValue::Include(part) => IncludeChild::Part(part),
                        EmitValue::Text(text) => IncludeChild::Text(text),
                        EmitValue::Absent => IncludeChild::Text(String::new()),
                    });
                }
            }
        }
        Ok(IncludePart::Composite(CompositeIncludePart::new(children)))
    }

    /// Entry point for the script engine.
    pub(crate) fn call(&self, relative_path: &str, options: IncludeOptions) -> Result<Dynamic, Box<EvalAltResult>> {
        self.include(relative_path, &options)
            .map(Dynamic::from)
            .map_err(EvalError::into_script_error)
    }
}

impl std::fmt::Debug for IncludeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncludeResolver")
            .field("dir", &self.dir)
            .field("stack", &self.stack)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::InMemoryProvider;

    fn resolver(entries: &[(&str, &str)], stack: IncludeStack) -> IncludeResolver {
        let files = FileAccess::in_memory(InMemoryProvider::from_texts(entries.iter().copied()));
        IncludeResolver::new(Some(PathBuf::from("/docs")), stack, files)
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let r = resolver(&[], IncludeStack::new());
        let err = r.include("nope.txt", &IncludeOptions::default()).unwrap_err();
        assert_eq!(
            err,
            EvalError::FileNotFound {
                path: "/docs/nope.txt".into()
            }
        );
    }

    #[test]
    fn binary_include_reads_bytes_and_mime() {
        let r = resolver(&[("/docs/img/logo.png", "PNG")], IncludeStack::new());
        let part = r.include("./img/logo.png", &IncludeOptions::binary()).unwrap();
        assert_eq!(
            part,
            IncludePart::Binary(BinaryIncludePart {
                filename: "./img/logo.png".into(),
                mime_type: "image/png".into(),
                data: b"PNG".to_vec(),
            })
        );
    }

    #[test]
    fn binary_include_mime_override_and_failure() {
        let r = resolver(&[("/docs/blob", "?")], IncludeStack::new());
        let err = r.include("blob", &IncludeOptions::binary()).unwrap_err();
        assert!(matches!(err, EvalError::MimeUndetermined { .. }));

        let part = r
            .include("blob", &IncludeOptions::binary().with_mime("application/octet-stream"))
            .unwrap();
        assert!(matches!(part, IncludePart::Binary(b) if b.mime_type == "application/octet-stream"));
    }

    #[test]
    fn binary_include_ignores_the_stack() {
        let stack = IncludeStack::seeded(Some(Path::new("/docs/a.png")));
        let r = resolver(&[("/docs/a.png", "PNG")], stack);
        assert!(r.include("a.png", &IncludeOptions::binary()).is_ok());
    }

    #[test]
    fn text_include_on_stack_is_circular() {
        let stack = IncludeStack::seeded(Some(Path::new("/docs/a.md")));
        let r = resolver(&[("/docs/a.md", "A")], stack);
        let err = r.include("./a.md", &IncludeOptions::default()).unwrap_err();
        assert_eq!(
            err,
            EvalError::CircularInclude {
                chain: vec!["/docs/a.md".into(), "/docs/a.md".into()]
            }
        );
    }

    #[test]
    fn text_include_evaluates_expressions() {
        let r = resolver(&[("/docs/t.md", "1 + 1 = {{ 1 + 1 }}{{ () }}!")], IncludeStack::new());
        let part = r.include("t.md", &IncludeOptions::default()).unwrap();
        assert_eq!(
            part,
            IncludePart::Composite(CompositeIncludePart::new(vec![
                IncludeChild::Text("1 + 1 = ".into()),
                IncludeChild::Text("2".into()),
                IncludeChild::Text(String::new()),
                IncludeChild::Text("!".into()),
            ]))
        );
    }

    #[test]
    fn options_from_map() {
        let mut map = rhai::Map::new();
        map.insert("binary".into(), Dynamic::from(true));
        map.insert("mime".into(), Dynamic::from("image/webp"));
        let options = IncludeOptions::from_map(&map).unwrap();
        assert_eq!(options, IncludeOptions::binary().with_mime("image/webp"));

        let mut bad = rhai::Map::new();
        bad.insert("binary".into(), Dynamic::from("yes"));
        assert!(IncludeOptions::from_map(&bad).is_err());
    }
}
