use std::path::Path;

use parley_core::{parse, Chunk, Diagnostic, FileAccess};

use super::{preview, print_json, read_source};
use crate::{report_diagnostics, OutputFormat};

pub(crate) fn cmd_chunks(file: &Path, files: &FileAccess, output: OutputFormat, quiet: bool) {
    let content = read_source(file, output, quiet);
    let chunks: Vec<Chunk> = parse(&content, files, file.parent()).collect();

    if output == OutputFormat::Json {
        print_json(&chunks);
        return;
    }

    let name = file.display().to_string();
    let mut warnings: Vec<Diagnostic> = Vec::new();
    for chunk in &chunks {
        match chunk {
            Chunk::Text { value } => println!("text  {}", preview(value)),
            Chunk::File(f) => match (&f.mime_type, &f.error) {
                (Some(mime), _) if f.readable => {
                    println!("file  {} -> {} ({})", f.raw_filename, f.filename, mime)
                }
                (_, error) => println!(
                    "file  {} -> {} (unreadable: {})",
                    f.raw_filename,
                    f.filename,
                    error.as_deref().unwrap_or("unknown error")
                ),
            },
            Chunk::Warnings { entries } => {
                warnings.extend(entries.iter().map(|w| w.to_diagnostic(&name)));
            }
        }
    }
    report_diagnostics("file references could not be loaded", &warnings, output, quiet);
}
