//! Ordered accumulation of output parts from emittable values.
//!
//! [`EmitBuilder`] collects [`EmittedPart`]s. Values produced by `include()`
//! implement [`Emittable`] and push their parts into the same builder, so
//! arbitrarily nested composites flatten into one list in construction order.

use std::fmt;

use crate::error::{Diagnostic, SourcePosition};

/// A part accumulated by an [`EmitBuilder`], before provider classification.
#[derive(Debug, Clone, PartialEq)]
pub enum EmittedPart {
    Text {
        text: String,
    },
    File {
        filename: String,
        mime_type: String,
        data: Vec<u8>,
        /// Where the emitting expression sits in its source, when known.
        position: Option<SourcePosition>,
    },
}

/// A value that can contribute parts to a builder.
pub trait Emittable {
    fn emit(&self, builder: &mut EmitBuilder);
}

/// Anything an expression may hand to [`EmitBuilder::emit`].
#[derive(Debug, Clone, PartialEq)]
pub enum EmitValue {
    Absent,
    Text(String),
    Include(IncludePart),
}

impl From<&str> for EmitValue {
    fn from(s: &str) -> Self {
        EmitValue::Text(s.to_string())
    }
}

impl From<String> for EmitValue {
    fn from(s: String) -> Self {
        EmitValue::Text(s)
    }
}

impl From<IncludePart> for EmitValue {
    fn from(part: IncludePart) -> Self {
        EmitValue::Include(part)
    }
}

impl<T: Into<EmitValue>> From<Option<T>> for EmitValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(EmitValue::Absent, Into::into)
    }
}

/// Accumulates parts in order, optionally collecting diagnostics on the side.
#[derive(Debug, Default)]
pub struct EmitBuilder {
    parts: Vec<EmittedPart>,
    position: Option<SourcePosition>,
    diagnostics: Option<Vec<Diagnostic>>,
}

impl EmitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder that also accepts diagnostics through [`push_diagnostic`].
    ///
    /// [`push_diagnostic`]: EmitBuilder::push_diagnostic
    pub fn with_diagnostics() -> Self {
        EmitBuilder {
            diagnostics: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Position attached to file parts appended from now on.
    pub fn set_position(&mut self, position: Option<SourcePosition>) {
        self.position = position;
    }

    pub fn position(&self) -> Option<SourcePosition> {
        self.position
    }

    /// Append a text part. Empty text is ignored.
    pub fn append_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.parts.push(EmittedPart::Text {
            text: text.to_string(),
        });
    }

    /// Append a file part tagged with the current position.
    pub fn append_file(&mut self, filename: &str, mime_type: &str, data: &[u8]) {
        self.parts.push(EmittedPart::File {
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            data: data.to_vec(),
            position: self.position,
        });
    }

    /// Emit a value: emittables recurse into this builder, absent values are
    /// skipped, everything else is appended as text.
    pub fn emit(&mut self, value: &EmitValue) {
        match value {
            EmitValue::Absent => {}
            EmitValue::Text(text) => self.append_text(text),
            EmitValue::Include(part) => part.emit(self),
        }
    }

    /// Record a diagnostic without interrupting the build. Returns `false`
    /// when the builder has no diagnostics sink.
    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) -> bool {
        match &mut self.diagnostics {
            Some(sink) => {
                sink.push(diagnostic);
                true
            }
            None => false,
        }
    }

    pub fn parts(&self) -> &[EmittedPart] {
        &self.parts
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.as_deref().unwrap_or(&[])
    }

    /// Consume the builder, returning parts and any collected diagnostics.
    pub fn finish(self) -> (Vec<EmittedPart>, Vec<Diagnostic>) {
        (self.parts, self.diagnostics.unwrap_or_default())
    }
}

/// Raw bytes pulled in by `include(path, #{ binary: true })`.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryIncludePart {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Emittable for BinaryIncludePart {
    fn emit(&self, builder: &mut EmitBuilder) {
        builder.append_file(&self.filename, &self.mime_type, &self.data);
    }
}

/// One element of a text include: literal text or a nested emittable.
#[derive(Debug, Clone, PartialEq)]
pub enum IncludeChild {
    Text(String),
    Part(IncludePart),
}

/// A text include: its literal text and expression results, in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompositeIncludePart {
    pub children: Vec<IncludeChild>,
}

impl CompositeIncludePart {
    pub fn new(children: Vec<IncludeChild>) -> Self {
        CompositeIncludePart { children }
    }
}

impl Emittable for CompositeIncludePart {
    fn emit(&self, builder: &mut EmitBuilder) {
        for child in &self.children {
            match child {
                IncludeChild::Text(text) => builder.emit(&EmitValue::Text(text.clone())),
                IncludeChild::Part(part) => part.emit(builder),
            }
        }
    }
}

/// The value returned by `include()`.
#[derive(Debug, Clone, PartialEq)]
pub enum IncludePart {
    Binary(BinaryIncludePart),
    Composite(CompositeIncludePart),
}

impl Emittable for IncludePart {
    fn emit(&self, builder: &mut EmitBuilder) {
        match self {
            IncludePart::Binary(part) => part.emit(builder),
            IncludePart::Composite(part) => part.emit(builder),
        }
    }
}

/// Text rendering used when a script stringifies an include: literal text
/// verbatim, binary parts as their filename.
impl fmt::Display for IncludePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncludePart::Binary(part) => write!(f, "{}", part.filename),
            IncludePart::Composite(part) => {
                for child in &part.children {
                    match child {
                        IncludeChild::Text(text) => f.write_str(text)?,
                        IncludeChild::Part(nested) => write!(f, "{}", nested)?,
                    }
                }
                Ok(())
            }
        }
    }
}
