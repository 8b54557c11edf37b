use parley_core::{Diagnostic, DiagnosticKind, SourcePosition};
use rhai::{Dynamic, EvalAltResult, Position};

/// Every way script evaluation and `include()` can fail.
///
/// The first four variants are raised by `include()` and pass through
/// enclosing evaluators unchanged; the rest wrap ordinary script faults.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// The resolved include path does not name a readable file.
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// No override, detector, or extension yielded a MIME type.
    #[error("could not determine MIME type of {path}")]
    MimeUndetermined { path: String },

    /// The file exists but reading it failed.
    #[error("failed to read {path}: {message}")]
    ReadFailure { path: String, message: String },

    /// A text include re-entered a file already being included. `chain`
    /// is the active stack followed by the path that closed the cycle.
    #[error("circular include detected: {}", .chain.join(" \u{2192} "))]
    CircularInclude { chain: Vec<String> },

    /// A script block failed to compile.
    #[error("failed to load script in {file}: {message}")]
    Load { file: String, message: String },

    /// A script block failed while running.
    #[error("script in {file} failed: {message}")]
    Execution { file: String, message: String },

    /// A single expression failed.
    #[error("failed to evaluate `{expression}` in {file}: {message}")]
    Evaluation {
        file: String,
        expression: String,
        message: String,
    },
}

impl EvalError {
    /// Whether this failure came from a file reference (`include()`), as
    /// opposed to ordinary script logic.
    pub fn is_include_fault(&self) -> bool {
        matches!(
            self,
            EvalError::FileNotFound { .. }
                | EvalError::MimeUndetermined { .. }
                | EvalError::ReadFailure { .. }
                | EvalError::CircularInclude { .. }
        )
    }

    /// Render as a structured diagnostic.
    pub fn to_diagnostic(&self, position: Option<SourcePosition>) -> Diagnostic {
        let diagnostic = match self {
            EvalError::FileNotFound { path }
            | EvalError::MimeUndetermined { path }
            | EvalError::ReadFailure { path, .. } => {
                Diagnostic::new(DiagnosticKind::Include, path, path, self.to_string())
            }
            EvalError::CircularInclude { chain } => {
                let closing = chain.last().map(String::as_str).unwrap_or_default();
                let first = chain.first().map(String::as_str).unwrap_or_default();
                Diagnostic::new(DiagnosticKind::Include, first, closing, self.to_string())
            }
            EvalError::Load { file, message } | EvalError::Execution { file, message } => {
                Diagnostic::new(DiagnosticKind::Frontmatter, file, file, message.clone())
            }
            EvalError::Evaluation {
                file,
                expression,
                message,
            } => Diagnostic::new(DiagnosticKind::Expression, file, expression, message.clone()),
        };
        match position {
            Some(pos) => diagnostic.at(pos),
            None => diagnostic,
        }
    }

    /// Wrap as a script-engine runtime error so it can cross a native
    /// function boundary. Recovered with [`EvalError::from_script_error`].
    pub(crate) fn into_script_error(self) -> Box<EvalAltResult> {
        Box::new(EvalAltResult::ErrorRuntime(Dynamic::from(self), Position::NONE))
    }

    /// Recover an `EvalError` carried inside a script-engine error, looking
    /// through function-call and module wrappers.
    pub(crate) fn from_script_error(err: &EvalAltResult) -> Option<EvalError> {
        match err {
            EvalAltResult::ErrorRuntime(payload, _) => payload.clone().try_cast::<EvalError>(),
            EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => Self::from_script_error(inner),
            EvalAltResult::ErrorInModule(_, inner, _) => Self::from_script_error(inner),
            _ => None,
        }
    }
}
