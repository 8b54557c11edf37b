//! Structured diagnostics shared by the chunker, the evaluator and the CLI.
//!
//! A [`Diagnostic`] renders as one text line or as a JSON object with
//! `type`, `filename`, `raw`, `error` and an optional `position`.

use serde::{Deserialize, Serialize};

/// What a [`Diagnostic`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// An `@./file` reference in message content could not be loaded.
    FileReference,
    /// An `include()` call failed.
    Include,
    /// A frontmatter block failed to compile or run.
    Frontmatter,
    /// A `{{ }}` expression failed.
    Expression,
    /// A file was loaded but its type cannot be sent to a provider.
    UnsupportedFile,
}

/// Line/column location inside a source file, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

impl SourcePosition {
    pub fn new(line: u32, column: u32) -> Self {
        SourcePosition { line, column }
    }

    /// Position of byte `offset` within `src`.
    pub fn at_offset(src: &str, offset: usize) -> Self {
        let before = &src[..offset.min(src.len())];
        let line = before.matches('\n').count() as u32 + 1;
        let column = match before.rfind('\n') {
            Some(nl) => before[nl + 1..].chars().count(),
            None => before.chars().count(),
        } as u32
            + 1;
        SourcePosition { line, column }
    }
}

/// A structured failure record.
///
/// Callers render these for users; evaluation errors convert into them so a
/// batch of problems can be reported together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    #[serde(rename = "type")]
    pub kind: DiagnosticKind,
    pub filename: String,
    /// The offending source text (reference, expression, or file path).
    pub raw: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<SourcePosition>,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        filename: &str,
        raw: &str,
        error: impl Into<String>,
    ) -> Self {
        Diagnostic {
            kind,
            filename: filename.to_owned(),
            raw: raw.to_owned(),
            error: error.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: SourcePosition) -> Self {
        self.position = Some(position);
        self
    }

    /// Serialize to JSON with every field present (null when missing).
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "type":     self.kind,
            "filename": self.filename,
            "raw":      self.raw,
            "error":    self.error,
            "position": self.position,
        })
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.position {
            Some(pos) => write!(
                f,
                "{}:{}:{}: {} ({})",
                self.filename, pos.line, pos.column, self.error, self.raw
            ),
            None => write!(f, "{}: {} ({})", self.filename, self.error, self.raw),
        }
    }
}
