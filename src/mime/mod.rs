//! MIME structure produced by the upstream analyzer.
//!
//! The analyzer parses the message as it streams in and publishes an
//! ordered list of [`MimePart`]s through the envelope. This crate only
//! reads it.

use std::collections::HashMap;

/// Header fields of a part, keyed by field name. A field may repeat.
pub type Headers = HashMap<String, Vec<String>>;

/// One structural unit of a message: a header block and its body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimePart {
    /// Position in the MIME tree, e.g. `"1"` or `"1.2"`.
    pub node: String,

    /// Header fields of this part.
    pub headers: Headers,

    /// Stream offset of the first byte of the part.
    pub starting_pos: u64,

    /// Stream offset of the first body byte, i.e. the end of the header
    /// block. Zero while the analyzer has not found it.
    pub starting_pos_body: u64,
}

impl MimePart {
    /// Creates a part with no headers.
    pub fn new(node: impl Into<String>, starting_pos: u64, starting_pos_body: u64) -> Self {
        Self {
            node: node.into(),
            headers: Headers::new(),
            starting_pos,
            starting_pos_body,
        }
    }

    /// Adds a header value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Returns the first value of a header field, matching the name
    /// case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    /// Returns the `Content-Type` header, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_ignores_case() {
        let part = MimePart::new("1", 0, 20).with_header("Subject", "hello");
        assert_eq!(part.header("subject"), Some("hello"));
        assert_eq!(part.header("SUBJECT"), Some("hello"));
        assert_eq!(part.header("To"), None);
    }

    #[test]
    fn test_first_value_wins() {
        let part = MimePart::new("1", 0, 0)
            .with_header("Received", "first")
            .with_header("Received", "second");
        assert_eq!(part.header("Received"), Some("first"));
    }

    #[test]
    fn test_content_type() {
        let part = MimePart::new("1.1", 10, 40).with_header("content-type", "text/plain");
        assert_eq!(part.content_type(), Some("text/plain"));
    }
}
