//! Splits included text and message templates into literal text and
//! `{{ expression }}` segments.
//!
//! This segmenter knows nothing about `@./file` references; those belong to
//! top-level message content and are handled by the chunk parser.

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Expression {
        /// Source between the delimiters.
        code: &'a str,
        /// The full `{{ ... }}` text.
        raw: &'a str,
        /// Byte offset of the opening delimiter.
        offset: usize,
    },
}

/// Split `src` into segments, in order. An unterminated `{{` and
/// everything after it is literal text.
pub fn segment(src: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut pos = 0usize;

    while pos < src.len() {
        let Some(open) = src[pos..].find(OPEN).map(|i| pos + i) else {
            break;
        };
        let code_start = open + OPEN.len();
        let Some(close) = src[code_start..].find(CLOSE).map(|i| code_start + i) else {
            break;
        };
        if open > pos {
            segments.push(Segment::Text(&src[pos..open]));
        }
        let end = close + CLOSE.len();
        segments.push(Segment::Expression {
            code: &src[code_start..close],
            raw: &src[open..end],
            offset: open,
        });
        pos = end;
    }

    if pos < src.len() {
        segments.push(Segment::Text(&src[pos..]));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text() {
        assert_eq!(segment("hello"), vec![Segment::Text("hello")]);
        assert!(segment("").is_empty());
    }

    #[test]
    fn text_and_expressions_interleave() {
        let segs = segment("a {{ x }} b {{y}}");
        assert_eq!(
            segs,
            vec![
                Segment::Text("a "),
                Segment::Expression {
                    code: " x ",
                    raw: "{{ x }}",
                    offset: 2
                },
                Segment::Text(" b "),
                Segment::Expression {
                    code: "y",
                    raw: "{{y}}",
                    offset: 12
                },
            ]
        );
    }

    #[test]
    fn unterminated_expression_is_text() {
        assert_eq!(segment("a {{ b } c"), vec![Segment::Text("a {{ b } c")]);
    }

    #[test]
    fn map_literal_inside_expression() {
        let segs = segment(r#"{{ include("a.png", #{ binary: true }) }}"#);
        assert_eq!(segs.len(), 1);
        match &segs[0] {
            Segment::Expression { code, .. } => {
                assert_eq!(*code, r#" include("a.png", #{ binary: true }) "#)
            }
            other => panic!("expected expression, got {:?}", other),
        }
    }

    #[test]
    fn file_references_are_not_recognized() {
        assert_eq!(segment("see @./a.txt"), vec![Segment::Text("see @./a.txt")]);
    }
}
