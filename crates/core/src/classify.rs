//! Conversion of chunks and emitted parts into provider-agnostic [`Part`]s.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;
use tracing::debug;

use crate::chunk::{Chunk, FileChunk, FileWarning};
use crate::emit::EmittedPart;
use crate::mime::essence;

const IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];
const PDF_TYPE: &str = "application/pdf";

/// One unit of the final content sequence sent to a model provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    Image {
        mime_type: String,
        /// Base64 payload without the data-URL prefix.
        data: String,
        data_url: String,
        filename: String,
    },
    Pdf {
        mime_type: String,
        data: String,
        data_url: String,
        filename: String,
    },
    TextFile {
        mime_type: String,
        text: String,
        filename: String,
    },
    /// A reference that could not be turned into content; the original
    /// reference text is kept so it can be shown verbatim.
    UnsupportedFile {
        raw_filename: String,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Part::UnsupportedFile { .. })
    }
}

/// Build a `data:` URL from a media type and base64 payload.
pub fn build_data_url(mime_type: &str, data: &str) -> String {
    format!("data:{mime_type};base64,{data}")
}

/// Classify loaded file content by MIME type. `raw_filename` is what an
/// unsupported file falls back to.
pub fn classify_file(filename: &str, raw_filename: &str, mime_type: &str, data: &[u8]) -> Part {
    let mime = essence(mime_type);
    if IMAGE_TYPES.contains(&mime.as_str()) {
        let encoded = BASE64.encode(data);
        return Part::Image {
            data_url: build_data_url(&mime, &encoded),
            mime_type: mime,
            data: encoded,
            filename: filename.to_string(),
        };
    }
    if mime == PDF_TYPE {
        let encoded = BASE64.encode(data);
        return Part::Pdf {
            data_url: build_data_url(&mime, &encoded),
            mime_type: mime,
            data: encoded,
            filename: filename.to_string(),
        };
    }
    if mime.starts_with("text/") {
        if let Ok(text) = std::str::from_utf8(data) {
            return Part::TextFile {
                mime_type: mime,
                text: text.to_string(),
                filename: filename.to_string(),
            };
        }
        debug!(filename, "text file is not valid UTF-8");
    }
    Part::UnsupportedFile {
        raw_filename: raw_filename.to_string(),
    }
}

fn classify_file_chunk(chunk: &FileChunk) -> Part {
    match (chunk.readable, &chunk.content, &chunk.mime_type) {
        (true, Some(content), Some(mime)) => {
            classify_file(&chunk.filename, &chunk.raw_filename, mime, content)
        }
        _ => Part::UnsupportedFile {
            raw_filename: chunk.raw_filename.clone(),
        },
    }
}

/// Convert a builder's output: text stays text, files are classified like
/// readable file chunks (their filename doubles as the fallback text).
pub fn classify_emitted(part: &EmittedPart) -> Part {
    match part {
        EmittedPart::Text { text } => Part::text(text.clone()),
        EmittedPart::File {
            filename,
            mime_type,
            data,
            ..
        } => classify_file(filename, filename, mime_type, data),
    }
}

/// Drain a chunk stream into parts plus the warnings it reported.
///
/// Part order follows chunk order exactly. Warning chunks contribute no
/// part.
pub fn classify(chunks: impl IntoIterator<Item = Chunk>) -> (Vec<Part>, Vec<FileWarning>) {
    let mut parts = Vec::new();
    let mut warnings = Vec::new();
    for chunk in chunks {
        match chunk {
            Chunk::Text { value } => {
                if !value.is_empty() {
                    parts.push(Part::Text { text: value });
                }
            }
            Chunk::File(file) => parts.push(classify_file_chunk(&file)),
            Chunk::Warnings { entries } => warnings.extend(entries),
        }
    }
    (parts, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readable(filename: &str, mime: &str, data: &[u8]) -> Chunk {
        Chunk::File(FileChunk {
            filename: filename.to_string(),
            raw_filename: format!("@{}", filename),
            content: Some(data.to_vec()),
            mime_type: Some(mime.to_string()),
            readable: true,
            error: None,
        })
    }

    #[test]
    fn images_are_base64_with_data_url() {
        let (parts, _) = classify(vec![readable("./a.png", "image/png", b"abc")]);
        match &parts[0] {
            Part::Image {
                mime_type,
                data,
                data_url,
                filename,
            } => {
                assert_eq!(mime_type, "image/png");
                assert_eq!(data, "YWJj");
                assert_eq!(data_url, "data:image/png;base64,YWJj");
                assert_eq!(filename, "./a.png");
            }
            other => panic!("expected image, got {:?}", other),
        }
    }

    #[test]
    fn pdf_and_text_files() {
        let (parts, _) = classify(vec![
            readable("./doc.pdf", "application/pdf", b"%PDF"),
            readable("./notes.md", "text/markdown; charset=utf-8", b"# hi"),
        ]);
        assert!(matches!(&parts[0], Part::Pdf { data_url, .. } if data_url.starts_with("data:application/pdf;base64,")));
        assert_eq!(
            parts[1],
            Part::TextFile {
                mime_type: "text/markdown".into(),
                text: "# hi".into(),
                filename: "./notes.md".into(),
            }
        );
    }

    #[test]
    fn other_types_and_unreadable_files_are_unsupported() {
        let unreadable = Chunk::File(FileChunk {
            filename: "./gone.txt".into(),
            raw_filename: "@./gone.txt".into(),
            content: None,
            mime_type: None,
            readable: false,
            error: Some("file not readable".into()),
        });
        let (parts, _) = classify(vec![
            readable("./a.zip", "application/zip", b"PK"),
            readable("./bad.txt", "text/plain", &[0xff, 0xfe]),
            readable("./anim.svg", "image/svg+xml", b"<svg/>"),
            unreadable,
        ]);
        let raws: Vec<&str> = parts
            .iter()
            .map(|p| match p {
                Part::UnsupportedFile { raw_filename } => raw_filename.as_str(),
                other => panic!("expected unsupported, got {:?}", other),
            })
            .collect();
        assert_eq!(raws, vec!["@./a.zip", "@./bad.txt", "@./anim.svg", "@./gone.txt"]);
    }

    #[test]
    fn order_is_preserved_and_warnings_are_collected() {
        let chunks = vec![
            Chunk::Text { value: "a ".into() },
            readable("./x.txt", "text/plain", b"x"),
            Chunk::Text { value: " b".into() },
            Chunk::Warnings {
                entries: vec![FileWarning {
                    raw: "@./y".into(),
                    error: "missing".into(),
                }],
            },
        ];
        let (parts, warnings) = classify(chunks);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], Part::text("a "));
        assert!(matches!(parts[1], Part::TextFile { .. }));
        assert_eq!(parts[2], Part::text(" b"));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn emitted_file_parts_are_classified() {
        let part = classify_emitted(&EmittedPart::File {
            filename: "chart.gif".into(),
            mime_type: "image/gif".into(),
            data: vec![0],
            position: None,
        });
        assert!(matches!(part, Part::Image { .. }));
        let unsupported = classify_emitted(&EmittedPart::File {
            filename: "archive.tar".into(),
            mime_type: "application/x-tar".into(),
            data: vec![0],
            position: None,
        });
        assert_eq!(
            unsupported,
            Part::UnsupportedFile {
                raw_filename: "archive.tar".into()
            }
        );
    }

    #[test]
    fn part_serializes_with_type_tag() {
        let json = serde_json::to_value(Part::text("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "text", "text": "hi" }));
    }
}
