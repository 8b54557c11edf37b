//! parley-core: turning chat transcript content into provider-agnostic parts.
//!
//! - [`chunk`] -- lazy tokenizer for `@./file` references in message content
//! - [`classify`] -- chunks and emitted parts to [`Part`]s
//! - [`emit`] -- ordered part accumulation and the values `include()` returns
//! - [`mime`] -- MIME type resolution with an extension-table fallback
//! - [`source`] -- filesystem abstraction and path normalization
//! - [`transcript`] -- frontmatter and role-tagged messages
//! - [`error`] -- structured [`Diagnostic`] records

pub mod chunk;
pub mod classify;
pub mod emit;
pub mod error;
pub mod mime;
pub mod source;
pub mod transcript;

// ── Convenience re-exports ───────────────────────────────────────────

pub use chunk::{parse, Chunk, ChunkParser, FileChunk, FileWarning};
pub use classify::{classify, classify_emitted, classify_file, Part};
pub use emit::{
    BinaryIncludePart, CompositeIncludePart, EmitBuilder, EmitValue, Emittable, EmittedPart,
    IncludeChild, IncludePart,
};
pub use error::{Diagnostic, DiagnosticKind, SourcePosition};
pub use mime::{
    resolve_mime, ExtensionMimeResolver, FileCommandMimeResolver, MimeError, MimeResolver,
};
pub use source::{
    normalize_path, resolve_path, FileAccess, FileSystemProvider, InMemoryProvider,
    SourceProvider,
};
pub use transcript::{parse_transcript, Frontmatter, Message, Role, Transcript, TranscriptError};
