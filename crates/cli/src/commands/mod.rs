//! Subcommand implementations. Each prints its result to stdout and exits
//! with status 1 on failure.

pub(crate) mod chunks;
pub(crate) mod eval;
pub(crate) mod parts;

use std::path::Path;
use std::process;

use parley_core::Part;

use crate::{report_error, OutputFormat};

/// Longest text preview shown in text output.
const PREVIEW_CHARS: usize = 60;

/// Read a UTF-8 input file or exit.
pub(crate) fn read_source(path: &Path, output: OutputFormat, quiet: bool) -> String {
    match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("serialization error: {}", e));
    println!("{}", pretty);
}

/// One-line description of a part.
pub(crate) fn summarize(part: &Part) -> String {
    match part {
        Part::Text { text } => format!("text        {}", preview(text)),
        Part::Image {
            mime_type,
            data,
            filename,
            ..
        } => format!("image       {} ({}, {} base64 bytes)", filename, mime_type, data.len()),
        Part::Pdf {
            mime_type,
            data,
            filename,
            ..
        } => format!("pdf         {} ({}, {} base64 bytes)", filename, mime_type, data.len()),
        Part::TextFile {
            mime_type,
            text,
            filename,
        } => format!("text_file   {} ({}, {} chars)", filename, mime_type, text.chars().count()),
        Part::UnsupportedFile { raw_filename } => format!("unsupported {}", raw_filename),
    }
}

/// Quoted, escaped, and truncated text.
pub(crate) fn preview(text: &str) -> String {
    let mut shown: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        shown.push_str("...");
    }
    format!("{:?}", shown)
}
