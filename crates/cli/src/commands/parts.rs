use std::path::Path;
use std::process;

use parley_core::{Diagnostic, FileAccess};
use parley_eval::prepare_document;

use super::{print_json, read_source, summarize};
use crate::{report_diagnostics, report_failure, OutputFormat};

pub(crate) fn cmd_parts(document: &Path, files: &FileAccess, output: OutputFormat, quiet: bool) {
    let source = read_source(document, output, quiet);

    let prepared = match prepare_document(document, &source, files) {
        Ok(prepared) => prepared,
        Err(e) => {
            report_failure(&e.to_string(), &e.to_diagnostic(), output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => print_json(&prepared),
        OutputFormat::Text => {
            for message in &prepared.messages {
                println!("[{}] line {}", message.role.as_str(), message.line);
                for part in &message.parts {
                    println!("  {}", summarize(part));
                }
            }
        }
    }

    let file = document.display().to_string();
    let warnings: Vec<Diagnostic> = prepared
        .warnings
        .iter()
        .map(|w| w.to_diagnostic(&file))
        .collect();
    report_diagnostics("file references could not be loaded", &warnings, output, quiet);
    report_diagnostics("unsupported content", &prepared.diagnostics, output, quiet);
}
