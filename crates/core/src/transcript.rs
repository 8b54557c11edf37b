//! Chat transcript documents: optional fenced frontmatter followed by
//! role-tagged messages.
//!
//! ~~~text
//! ```rhai
//! let project = "parley";
//! ```
//! @System: You review {{ project }} code.
//! @You: Please look at @./src/lib.rs
//! @Assistant: Looks fine.
//! ~~~

use serde::Serialize;

/// Who a message is from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    You,
    Assistant,
}

impl Role {
    fn from_marker(line: &str) -> Option<(Role, &str)> {
        [
            ("@System:", Role::System),
            ("@You:", Role::You),
            ("@Assistant:", Role::Assistant),
        ]
        .into_iter()
        .find_map(|(marker, role)| line.strip_prefix(marker).map(|rest| (role, rest)))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::You => "you",
            Role::Assistant => "assistant",
        }
    }
}

/// The fenced script block at the top of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frontmatter {
    /// Language tag after the opening fence.
    pub language: String,
    pub code: String,
    /// Line of the opening fence (1-based).
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    /// Message text with surrounding whitespace removed.
    pub content: String,
    /// Line of the role marker, or of the first preamble line (1-based).
    pub line: u32,
    /// Line and column where `content` begins in the document (1-based).
    pub content_line: u32,
    pub content_column: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Transcript {
    pub frontmatter: Option<Frontmatter>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptError {
    #[error("line {line}: frontmatter block is never closed")]
    UnterminatedFrontmatter { line: u32 },
}

/// Parse a transcript document.
pub fn parse_transcript(src: &str) -> Result<Transcript, TranscriptError> {
    let lines: Vec<&str> = src.split_inclusive('\n').collect();
    let mut idx = 0usize;
    let mut transcript = Transcript::default();

    if let Some(language) = lines.first().and_then(|l| opening_fence(l)) {
        let mut code = String::new();
        let mut closed = false;
        idx = 1;
        while idx < lines.len() {
            let line = lines[idx];
            idx += 1;
            if line.trim_end() == "```" {
                closed = true;
                break;
            }
            code.push_str(line);
        }
        if !closed {
            return Err(TranscriptError::UnterminatedFrontmatter { line: 1 });
        }
        transcript.frontmatter = Some(Frontmatter {
            language: language.to_string(),
            code,
            line: 1,
        });
    }

    let mut current: Option<Pending> = None;
    let mut preamble = String::new();
    let preamble_line = idx as u32 + 1;

    for (offset, line) in lines[idx..].iter().enumerate() {
        let line_no = (idx + offset) as u32 + 1;
        if let Some((role, rest)) = Role::from_marker(line) {
            if let Some(done) = current.take() {
                push_message(&mut transcript.messages, done);
            } else if !preamble.trim().is_empty() {
                push_message(
                    &mut transcript.messages,
                    (Role::You, std::mem::take(&mut preamble), preamble_line, 1),
                );
            }
            let column = (line.len() - rest.len()) as u32 + 1;
            current = Some((role, rest.to_string(), line_no, column));
            continue;
        }
        match &mut current {
            Some((_, content, _, _)) => content.push_str(line),
            None => preamble.push_str(line),
        }
    }

    match current {
        Some(done) => push_message(&mut transcript.messages, done),
        None if !preamble.trim().is_empty() => {
            push_message(&mut transcript.messages, (Role::You, preamble, preamble_line, 1))
        }
        None => {}
    }

    Ok(transcript)
}

fn opening_fence(line: &str) -> Option<&str> {
    let language = line.trim_end().strip_prefix("```")?.trim();
    (!language.is_empty()).then_some(language)
}

/// Role, raw content, start line and start column of a message being read.
type Pending = (Role, String, u32, u32);

fn push_message(messages: &mut Vec<Message>, (role, raw, line, column): Pending) {
    let content = raw.trim();
    let skipped = &raw[..raw.len() - raw.trim_start().len()];
    let (content_line, content_column) = match skipped.rfind('\n') {
        Some(nl) => (
            line + skipped.matches('\n').count() as u32,
            skipped[nl + 1..].chars().count() as u32 + 1,
        ),
        None => (line, column + skipped.chars().count() as u32),
    };
    messages.push(Message {
        role,
        content: content.to_string(),
        line,
        content_line,
        content_column,
    });
}
