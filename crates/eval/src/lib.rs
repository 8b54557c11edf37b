//! parley-eval: sandboxed evaluation for parley documents.
//!
//! Frontmatter blocks and `{{ }}` expressions run in an [`Environment`]
//! backed by an embedded rhai engine with no host access beyond the
//! `include()` capability. `include()` pulls text files in recursively
//! (with cycle detection) or binary files verbatim, and its results feed
//! the core crate's emit builder.
//!
//! [`prepare_document`] ties everything together for a whole transcript.

pub mod env;
pub mod error;
pub mod evaluate;
pub mod include;
pub mod prepare;
pub mod segment;

pub use env::{create_environment, Environment, IncludeStack, DIRNAME_BINDING, FILENAME_BINDING};
pub use error::EvalError;
pub use evaluate::{eval_expression, execute, stringify, to_emit_value, Bindings};
pub use include::{IncludeOptions, IncludeResolver};
pub use prepare::{
    document_environment, prepare_document, PrepareError, Prepared, PreparedMessage, SCRIPT_LANGUAGE,
};
pub use segment::{segment, Segment};
