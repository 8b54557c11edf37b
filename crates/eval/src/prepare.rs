//! Whole-document preparation: transcript in, provider parts out.
//!
//! The frontmatter block runs once; its bindings and functions seed a fresh
//! environment for every message, so messages never observe each other's state.
//! `{{ }}` expressions in system and user messages are evaluated in order
//! and emitted through an [`EmitBuilder`]; literal user text goes through
//! the chunk parser so `@./file` references become file parts.

use std::path::Path;

use parley_core::{
    classify, classify_emitted, parse, parse_transcript, Diagnostic, DiagnosticKind, EmitBuilder,
    EmittedPart, FileAccess, FileWarning, Message, Part, Role, SourcePosition, Transcript,
    TranscriptError,
};
use rhai::AST;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::env::Environment;
use crate::error::EvalError;
use crate::evaluate::{eval_expression, execute, to_emit_value, Bindings};
use crate::segment::{segment, Segment};

/// Frontmatter language this crate can run.
pub const SCRIPT_LANGUAGE: &str = "rhai";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedMessage {
    pub role: Role,
    pub line: u32,
    pub parts: Vec<Part>,
}

/// Result of [`prepare_document`].
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Prepared {
    pub messages: Vec<PreparedMessage>,
    /// Every file reference that failed to load, in document order.
    pub warnings: Vec<FileWarning>,
    /// Non-fatal problems collected while emitting, e.g. unsupported files.
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    #[error("{file}: {source}")]
    Transcript {
        file: String,
        #[source]
        source: TranscriptError,
    },

    #[error("{file}: unsupported frontmatter language `{language}` (expected `rhai`)")]
    UnsupportedLanguage { file: String, language: String },

    #[error("{file}: frontmatter failed: {source}")]
    Frontmatter {
        file: String,
        #[source]
        source: EvalError,
    },

    #[error("{file}:{}:{}: {}", .position.line, .position.column, expression_message(.expression, .source))]
    Expression {
        file: String,
        expression: String,
        position: SourcePosition,
        #[source]
        source: EvalError,
    },
}

impl PrepareError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            PrepareError::Transcript { file, source } => {
                Diagnostic::new(DiagnosticKind::Frontmatter, file, file, source.to_string())
            }
            PrepareError::UnsupportedLanguage { file, language } => Diagnostic::new(
                DiagnosticKind::Frontmatter,
                file,
                language,
                format!("unsupported frontmatter language `{language}`"),
            ),
            PrepareError::Frontmatter { source, .. } => source.to_diagnostic(None),
            PrepareError::Expression {
                file,
                expression,
                position,
                source,
            } => {
                if source.is_include_fault() {
                    let mut d = source.to_diagnostic(Some(*position));
                    d.filename = file.clone();
                    d
                } else {
                    Diagnostic::new(DiagnosticKind::Expression, file, expression, source.to_string())
                        .at(*position)
                }
            }
        }
    }
}

fn expression_message(expression: &str, source: &EvalError) -> String {
    if source.is_include_fault() {
        format!("failed to evaluate `{expression}`: {source}")
    } else {
        source.to_string()
    }
}

/// Parse and evaluate the document at `path` whose text is `source`.
///
/// Fails fast on the first script error. File references that cannot be
/// loaded do not fail preparation; they become unsupported parts and are
/// reported together in [`Prepared::warnings`].
pub fn prepare_document(path: &Path, source: &str, files: &FileAccess) -> Result<Prepared, PrepareError> {
    let file = path.display().to_string();
    let transcript = parse_transcript(source).map_err(|source| PrepareError::Transcript {
        file: file.clone(),
        source,
    })?;

    let mut doc_env = Environment::for_file(path, files.clone());
    let doc_dir = doc_env.dir().map(Path::to_path_buf);
    let bindings = run_frontmatter(&file, &transcript, &mut doc_env)?;
    let functions = doc_env.functions().clone_functions_only();

    let mut prepared = Prepared::default();
    let preparer = MessagePreparer {
        path,
        file: &file,
        files,
        doc_dir: doc_dir.as_deref(),
        bindings: &bindings,
        functions: &functions,
    };
    for message in &transcript.messages {
        let parts = preparer.prepare(message, &mut prepared)?;
        prepared.messages.push(PreparedMessage {
            role: message.role,
            line: message.line,
            parts,
        });
    }

    if !prepared.warnings.is_empty() {
        warn!(file = %file, count = prepared.warnings.len(), "unreadable file references");
    }
    info!(
        file = %file,
        messages = prepared.messages.len(),
        diagnostics = prepared.diagnostics.len(),
        "document prepared"
    );
    Ok(prepared)
}

/// An environment for the document at `path` with its frontmatter already
/// run, for evaluating further expressions against the document's
/// bindings.
pub fn document_environment(path: &Path, source: &str, files: &FileAccess) -> Result<Environment, PrepareError> {
    let file = path.display().to_string();
    let transcript = parse_transcript(source).map_err(|source| PrepareError::Transcript {
        file: file.clone(),
        source,
    })?;
    let mut env = Environment::for_file(path, files.clone());
    run_frontmatter(&file, &transcript, &mut env)?;
    Ok(env)
}

fn run_frontmatter(file: &str, transcript: &Transcript, env: &mut Environment) -> Result<Bindings, PrepareError> {
    let Some(frontmatter) = &transcript.frontmatter else {
        return Ok(Bindings::new());
    };
    if frontmatter.language != SCRIPT_LANGUAGE {
        return Err(PrepareError::UnsupportedLanguage {
            file: file.to_string(),
            language: frontmatter.language.clone(),
        });
    }
    execute(&frontmatter.code, env).map_err(|source| PrepareError::Frontmatter {
        file: file.to_string(),
        source,
    })
}

struct MessagePreparer<'a> {
    path: &'a Path,
    file: &'a str,
    files: &'a FileAccess,
    doc_dir: Option<&'a Path>,
    bindings: &'a Bindings,
    functions: &'a AST,
}

impl MessagePreparer<'_> {
    fn prepare(&self, message: &Message, prepared: &mut Prepared) -> Result<Vec<Part>, PrepareError> {
        debug!(role = message.role.as_str(), line = message.line, "preparing message");
        if message.role == Role::Assistant {
            return Ok(if message.content.is_empty() {
                Vec::new()
            } else {
                vec![Part::text(message.content.clone())]
            });
        }

        let mut env = Environment::for_file(self.path, self.files.clone());
        env.seed(self.bindings);
        env.seed_functions(self.functions);
        let mut builder = EmitBuilder::with_diagnostics();
        let mut parts = Vec::new();
        let mut emitted_seen = 0usize;

        for seg in segment(&message.content) {
            match seg {
                Segment::Text(literal) => self.push_literal(message.role, literal, &mut parts, prepared),
                Segment::Expression { code, offset, .. } => {
                    let position = document_position(message, offset);
                    builder.set_position(Some(position));
                    let value = eval_expression(code, &mut env).map_err(|source| {
                        PrepareError::Expression {
                            file: self.file.to_string(),
                            expression: code.trim().to_string(),
                            position,
                            source,
                        }
                    })?;
                    builder.emit(&to_emit_value(value));
                    emitted_seen = self.drain_emitted(&mut builder, emitted_seen, &mut parts);
                }
            }
        }

        let (_, diagnostics) = builder.finish();
        prepared.diagnostics.extend(diagnostics);
        Ok(parts)
    }

    fn push_literal(&self, role: Role, literal: &str, parts: &mut Vec<Part>, prepared: &mut Prepared) {
        if role == Role::System {
            if !literal.is_empty() {
                parts.push(Part::text(literal));
            }
            return;
        }
        let (chunk_parts, warnings) = classify(parse(literal, self.files, self.doc_dir));
        parts.extend(chunk_parts);
        prepared.warnings.extend(warnings);
    }

    /// Classify parts the builder gained since `seen`; returns the new
    /// count.
    fn drain_emitted(&self, builder: &mut EmitBuilder, seen: usize, parts: &mut Vec<Part>) -> usize {
        let fresh: Vec<(Part, Option<Diagnostic>)> = builder.parts()[seen..]
            .iter()
            .map(|emitted| {
                let part = classify_emitted(emitted);
                let diagnostic = match (emitted, &part) {
                    (
                        EmittedPart::File {
                            filename,
                            mime_type,
                            position,
                            ..
                        },
                        Part::UnsupportedFile { .. },
                    ) => {
                        let d = Diagnostic::new(
                            DiagnosticKind::UnsupportedFile,
                            self.file,
                            filename,
                            format!("unsupported file type: {mime_type}"),
                        );
                        Some(match position {
                            Some(pos) => d.at(*pos),
                            None => d,
                        })
                    }
                    _ => None,
                };
                (part, diagnostic)
            })
            .collect();

        let total = builder.parts().len();
        for (part, diagnostic) in fresh {
            if let Some(d) = diagnostic {
                builder.push_diagnostic(d);
            }
            parts.push(part);
        }
        total
    }
}

/// Position of byte `offset` of a message's content within the document.
fn document_position(message: &Message, offset: usize) -> SourcePosition {
    let local = SourcePosition::at_offset(&message.content, offset);
    if local.line == 1 {
        SourcePosition::new(message.content_line, message.content_column + local.column - 1)
    } else {
        SourcePosition::new(message.content_line + local.line - 1, local.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::InMemoryProvider;

    fn files(entries: &[(&str, &str)]) -> FileAccess {
        FileAccess::in_memory(InMemoryProvider::from_texts(entries.iter().copied()))
    }

    fn texts(parts: &[Part]) -> Vec<&str> {
        parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn frontmatter_bindings_reach_every_message() {
        let doc = "```rhai\nlet name = \"parley\";\n```\n@System: Hi {{ name }}\n@You: About {{ name }}\n";
        let out = prepare_document(Path::new("/docs/chat.md"), doc, &files(&[])).unwrap();
        assert_eq!(out.messages.len(), 2);
        assert_eq!(texts(&out.messages[0].parts), vec!["Hi ", "parley"]);
        assert_eq!(texts(&out.messages[1].parts), vec!["About ", "parley"]);
    }

    #[test]
    fn undefined_name_fails_fast() {
        let doc = "@You: {{ x }}\n";
        let err = prepare_document(Path::new("/docs/chat.md"), doc, &files(&[])).unwrap_err();
        match err {
            PrepareError::Expression {
                expression,
                position,
                ..
            } => {
                assert_eq!(expression, "x");
                assert_eq!(position.line, 1);
            }
            other => panic!("expected expression error, got {:?}", other),
        }
    }

    #[test]
    fn frontmatter_functions_are_callable_in_messages() {
        let doc = "```rhai\nfn greet(n) { \"hi \" + n }\n```\n@System: {{ greet(\"sys\") }}\n@You: {{ greet(\"bob\") }}\n";
        let out = prepare_document(Path::new("/docs/chat.md"), doc, &files(&[])).unwrap();
        assert_eq!(texts(&out.messages[0].parts), vec!["hi sys"]);
        assert_eq!(texts(&out.messages[1].parts), vec!["hi bob"]);
    }

    #[test]
    fn positions_account_for_trimmed_content() {
        let err = prepare_document(Path::new("/docs/chat.md"), "@You:\n\nhello\n{{ nope }}\n", &files(&[]))
            .unwrap_err();
        match &err {
            PrepareError::Expression { position, .. } => assert_eq!(*position, SourcePosition::new(4, 1)),
            other => panic!("expected expression error, got {:?}", other),
        }

        let err = prepare_document(Path::new("/docs/chat.md"), "@You:  a {{ nope }}", &files(&[])).unwrap_err();
        match &err {
            PrepareError::Expression { position, .. } => assert_eq!(*position, SourcePosition::new(1, 10)),
            other => panic!("expected expression error, got {:?}", other),
        }
    }

    #[test]
    fn expression_failure_message_names_expression_once() {
        let err = prepare_document(Path::new("/docs/chat.md"), "@You: {{ nope }}", &files(&[])).unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("/docs/chat.md:1:7: failed to evaluate `nope` in /docs/chat.md:"));
        assert_eq!(text.matches("`nope`").count(), 1);
    }

    #[test]
    fn user_references_become_file_parts() {
        let fs = files(&[("/docs/notes.txt", "remember")]);
        let doc = "@You: read @./notes.txt and @./gone.txt\n@Assistant: ok";
        let out = prepare_document(Path::new("/docs/chat.md"), doc, &fs).unwrap();
        let parts = &out.messages[0].parts;
        assert!(matches!(&parts[1], Part::TextFile { text, .. } if text == "remember"));
        assert!(matches!(&parts[3], Part::UnsupportedFile { raw_filename } if raw_filename == "@./gone.txt"));
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.messages[1].parts, vec![Part::text("ok")]);
    }

    #[test]
    fn system_text_is_not_chunked() {
        let fs = files(&[("/docs/notes.txt", "remember")]);
        let out = prepare_document(Path::new("/docs/chat.md"), "@System: see @./notes.txt", &fs).unwrap();
        assert_eq!(out.messages[0].parts, vec![Part::text("see @./notes.txt")]);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn unsupported_binary_include_adds_diagnostic() {
        let fs = files(&[("/docs/data.bin", "\u{0}\u{1}")]);
        let doc = "@You: {{ include(\"data.bin\", #{ binary: true, mime: \"application/zip\" }) }}";
        let out = prepare_document(Path::new("/docs/chat.md"), doc, &fs).unwrap();
        assert_eq!(
            out.messages[0].parts,
            vec![Part::UnsupportedFile {
                raw_filename: "data.bin".into()
            }]
        );
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::UnsupportedFile);
        assert_eq!(out.diagnostics[0].position, Some(SourcePosition::new(1, 7)));
    }

    #[test]
    fn frontmatter_language_must_be_rhai() {
        let doc = "```python\nx = 1\n```\n@You: hi";
        let err = prepare_document(Path::new("/docs/chat.md"), doc, &files(&[])).unwrap_err();
        assert!(matches!(err, PrepareError::UnsupportedLanguage { ref language, .. } if language == "python"));
    }

    #[test]
    fn frontmatter_failure_is_reported() {
        let doc = "```rhai\nlet y = nope;\n```\n@You: hi";
        let err = prepare_document(Path::new("/docs/chat.md"), doc, &files(&[])).unwrap_err();
        assert!(matches!(err, PrepareError::Frontmatter { source: EvalError::Execution { .. }, .. }));
        assert_eq!(err.to_diagnostic().kind, DiagnosticKind::Frontmatter);
    }

    #[test]
    fn include_fault_in_expression_keeps_its_kind() {
        let doc = "@You: {{ include(\"missing.md\") }}";
        let err = prepare_document(Path::new("/docs/chat.md"), doc, &files(&[])).unwrap_err();
        let d = err.to_diagnostic();
        assert_eq!(d.kind, DiagnosticKind::Include);
        assert_eq!(d.filename, "/docs/chat.md");
        assert!(err.to_string().contains("include(\"missing.md\")"));
    }

    #[test]
    fn document_environment_carries_frontmatter_bindings() {
        let doc = "```rhai\nlet greeting = \"hi\";\n```\n@You: {{ greeting }}";
        let mut env = document_environment(Path::new("/docs/chat.md"), doc, &files(&[])).unwrap();
        let value = eval_expression("greeting + \"!\"", &mut env).unwrap();
        assert_eq!(crate::evaluate::stringify(value), "hi!");
    }
}
