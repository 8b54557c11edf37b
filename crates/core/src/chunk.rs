//! Lazy tokenizer for message content containing `@./file` references.
//!
//! [`ChunkParser`] is a pull-based iterator: every call to `next()` scans
//! only as far as needed to produce one [`Chunk`]. Files are opened, read and
//! released inside that call, so a consumer may drop the parser at any point
//! without cleanup.
//!
//! Reference syntax: `@` followed by `./` or `../`, any run of `.`/`/`
//! characters, then non-whitespace, optionally followed by `;type=<mime>`.
//! A `;` inside the path is kept unless it starts the `;type=` suffix.
//! Trailing ASCII punctuation is not part of the reference and stays in the
//! surrounding text.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Diagnostic, DiagnosticKind};
use crate::mime::resolve_mime;
use crate::source::{resolve_path, FileAccess};

static FILE_REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(\.\.?/[./]*[^\s;]+(?:;[^\s;]+)*)").expect("valid regex")
});

const TYPE_PREFIX: &str = ";type=";

/// One unit produced while tokenizing message content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chunk {
    /// A run of plain text between references.
    Text { value: String },
    /// A file reference, readable or not.
    File(FileChunk),
    /// Every warning collected while parsing. Emitted at most once, after
    /// all text and file chunks.
    Warnings { entries: Vec<FileWarning> },
}

/// A resolved (or failed) `@./file` reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileChunk {
    /// Decoded path as written in the reference (`./notes.txt`).
    pub filename: String,
    /// The reference text exactly as it appeared, `@` included.
    pub raw_filename: String,
    /// Raw file bytes; present only for readable files.
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
    pub mime_type: Option<String>,
    pub readable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileChunk {
    fn unreadable(filename: String, raw_filename: String, error: String) -> Self {
        FileChunk {
            filename,
            raw_filename,
            content: None,
            mime_type: None,
            readable: false,
            error: Some(error),
        }
    }
}

/// A file reference that could not be loaded, keyed by its original text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileWarning {
    pub raw: String,
    pub error: String,
}

impl std::fmt::Display for FileWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.raw, self.error)
    }
}

impl FileWarning {
    /// As a diagnostic against the document `filename`.
    pub fn to_diagnostic(&self, filename: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::FileReference, filename, &self.raw, self.error.clone())
    }
}

/// Tokenize `content` into text, file and warning chunks.
///
/// Convenience wrapper over [`ChunkParser::new`]; references resolve
/// relative to `base_dir` when given, otherwise as written.
pub fn parse<'a>(content: &'a str, files: &FileAccess, base_dir: Option<&Path>) -> ChunkParser<'a> {
    let parser = ChunkParser::new(content, files.clone());
    match base_dir {
        Some(dir) => parser.with_base_dir(dir),
        None => parser,
    }
}

/// Single-use, pull-based chunk producer. See the module docs.
pub struct ChunkParser<'a> {
    content: &'a str,
    files: FileAccess,
    base_dir: Option<PathBuf>,
    /// Start of text not yet emitted.
    text_start: usize,
    /// Where the next reference search begins.
    cursor: usize,
    pending: VecDeque<Chunk>,
    warnings: Vec<FileWarning>,
    finished: bool,
}

/// A reference located in the content, before any file access.
struct Reference {
    start: usize,
    end: usize,
    path: String,
    mime_override: Option<String>,
}

impl<'a> ChunkParser<'a> {
    pub fn new(content: &'a str, files: FileAccess) -> Self {
        ChunkParser {
            content,
            files,
            base_dir: None,
            text_start: 0,
            cursor: 0,
            pending: VecDeque::new(),
            warnings: Vec::new(),
            finished: false,
        }
    }

    /// Resolve references relative to `dir` instead of the process
    /// working directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Scan forward until at least one chunk is queued or the content is
    /// exhausted.
    fn advance(&mut self) {
        while self.pending.is_empty() && !self.finished {
            match self.next_reference() {
                Some(reference) => {
                    self.push_text(self.text_start, reference.start);
                    let chunk = self.load(&reference);
                    self.pending.push_back(Chunk::File(chunk));
                    self.text_start = reference.end;
                    self.cursor = reference.end;
                }
                None => {
                    self.push_text(self.text_start, self.content.len());
                    self.text_start = self.content.len();
                    if !self.warnings.is_empty() {
                        let entries = std::mem::take(&mut self.warnings);
                        self.pending.push_back(Chunk::Warnings { entries });
                    }
                    self.finished = true;
                }
            }
        }
    }

    fn push_text(&mut self, from: usize, to: usize) {
        if from < to {
            self.pending.push_back(Chunk::Text {
                value: self.content[from..to].to_string(),
            });
        }
    }

    /// Find the next usable reference at or after the cursor. Matches that
    /// reduce to nothing once punctuation is stripped are left as text.
    fn next_reference(&mut self) -> Option<Reference> {
        let content = self.content;
        while self.cursor < content.len() {
            let offset = self.cursor;
            let caps = FILE_REFERENCE_RE.captures(&content[offset..])?;
            let whole = caps.get(0)?;
            let body = caps.get(1)?;
            let start = offset + whole.start();
            let path_start = offset + body.start();

            let (path_text, mime_text) = match body.as_str().find(TYPE_PREFIX) {
                Some(at) => (&body.as_str()[..at], Some(&body.as_str()[at + TYPE_PREFIX.len()..])),
                None => (body.as_str(), None),
            };
            let with_mime = mime_text.and_then(|m| {
                let m = m.split_once(';').map_or(m, |(head, _)| head);
                let (mime, _) = split_trailing_punctuation(m);
                let end = path_start + path_text.len() + TYPE_PREFIX.len() + mime.len();
                (!mime.is_empty()).then(|| (mime.to_string(), end))
            });

            let reference = match with_mime {
                Some((mime, end)) => Reference {
                    start,
                    end,
                    path: path_text.to_string(),
                    mime_override: Some(mime),
                },
                None => {
                    let (path, _) = split_trailing_punctuation(path_text);
                    Reference {
                        start,
                        end: path_start + path.len(),
                        path: path.to_string(),
                        mime_override: None,
                    }
                }
            };

            if is_bare_prefix(&reference.path) {
                self.cursor = offset + whole.end();
                continue;
            }
            return Some(reference);
        }
        None
    }

    fn load(&mut self, reference: &Reference) -> FileChunk {
        let raw = self.content[reference.start..reference.end].to_string();
        let filename = decode_reference_path(&reference.path);
        let resolved = match &self.base_dir {
            Some(dir) => resolve_path(dir, &filename),
            None => PathBuf::from(&filename),
        };
        debug!(reference = %raw, path = %resolved.display(), "resolving file reference");

        match self.read_reference(&resolved, reference.mime_override.as_deref()) {
            Ok((content, mime_type)) => FileChunk {
                filename,
                raw_filename: raw,
                content: Some(content),
                mime_type: Some(mime_type),
                readable: true,
                error: None,
            },
            Err(error) => {
                warn!(reference = %raw, error = %error, "file reference could not be loaded");
                self.warnings.push(FileWarning {
                    raw: raw.clone(),
                    error: error.clone(),
                });
                FileChunk::unreadable(filename, raw, error)
            }
        }
    }

    fn read_reference(&self, path: &Path, mime_override: Option<&str>) -> Result<(Vec<u8>, String), String> {
        if !self.files.provider.is_readable(path) {
            return Err(format!("file not readable: {}", path.display()));
        }
        let mime = resolve_mime(self.files.mime.as_ref(), path, mime_override)
            .ok_or_else(|| format!("could not determine MIME type of {}", path.display()))?;
        let content = self
            .files
            .provider
            .read_bytes(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        Ok((content, mime))
    }
}

impl Iterator for ChunkParser<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.pending.is_empty() {
            self.advance();
        }
        self.pending.pop_front()
    }
}

/// Split `s` into its body and the run of trailing ASCII punctuation.
fn split_trailing_punctuation(s: &str) -> (&str, &str) {
    let body = s.trim_end_matches(|c: char| c.is_ascii_punctuation());
    (body, &s[body.len()..])
}

/// `./`, `../` and friends with nothing after them do not name a file.
fn is_bare_prefix(path: &str) -> bool {
    path.chars().all(|c| c == '.' || c == '/')
}

/// Percent-decode a reference path: `+` becomes a space, `%XX` a byte.
pub fn decode_reference_path(path: &str) -> String {
    let spaced = path.replace('+', " ");
    let bytes = urlencoding::decode_binary(spaced.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}
