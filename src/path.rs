//! Key path tokenizer.
//!
//! Turns one flat form key such as `person[address][city]`, `items[]` or
//! `arr[2]` into the ordered list of steps the tree builder walks.
//!
//! Lexing is permissive: fragments that match no token are skipped, so a
//! malformed key yields a shorter path rather than an error. Keys that are
//! blank or start with `[` have no root field and yield an empty path.
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::node::Shape;

/// Letters (BMP only, no surrogates or noncharacters), digits, `_` and `.`;
/// a name never starts with a digit or a dot.
const NAME: &str = r"[_a-zA-Z\x{A0}-\x{D7FF}\x{F900}-\x{FDCF}\x{FDF0}-\x{FFEF}][_a-zA-Z0-9\x{A0}-\x{D7FF}\x{F900}-\x{FDCF}\x{FDF0}-\x{FFEF}.]*";

static KEY_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"{NAME}|\[{NAME}\]|\[[0-9]+\]|\[\]")).expect("key token grammar compiles")
});

// ------------------------------- Segments --------------------------------- //

/// One step of a key path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A named member of a mapping (`name` or `[name]`).
    Field(String),
    /// A fixed position in a sequence (`[3]`).
    Index(usize),
    /// The next free position in a sequence (`[]`).
    Append,
}

impl Segment {
    pub fn field(name: impl Into<String>) -> Self {
        Segment::Field(name.into())
    }

    /// Shape of the container a segment of this kind is looked up in.
    ///
    /// This is also the shape an intermediate node gets when this segment
    /// is the one that follows it.
    pub fn container_shape(&self) -> Shape {
        match self {
            Segment::Field(_) => Shape::Map,
            Segment::Index(_) | Segment::Append => Shape::List,
        }
    }

    fn from_token(token: &str) -> Self {
        let Some(inner) = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) else {
            return Segment::Field(token.to_string());
        };
        if inner.is_empty() {
            Segment::Append
        } else if inner.bytes().all(|b| b.is_ascii_digit()) {
            // overflow saturates; the builder rejects usize::MAX with or without a limit
            Segment::Index(inner.parse().unwrap_or(usize::MAX))
        } else {
            Segment::Field(inner.to_string())
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => write!(f, "[{name}]"),
            Segment::Index(n) => write!(f, "[{n}]"),
            Segment::Append => f.write_str("[]"),
        }
    }
}

/// Split a key into path segments. Returns an empty vector for keys with no root field.
pub fn tokenize(key: &str) -> Vec<Segment> {
    let key = key.trim();
    if key.is_empty() || key.starts_with('[') {
        return Vec::new();
    }
    KEY_TOKEN
        .find_iter(key)
        .map(|m| Segment::from_token(m.as_str()))
        .collect()
}

// ------------------------------- Key paths -------------------------------- //

/// A tokenized key, keeping the source key around for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    key: String,
    segments: Vec<Segment>,
}

impl KeyPath {
    pub fn parse(key: &str) -> Self {
        KeyPath {
            key: key.trim().to_string(),
            segments: tokenize(key),
        }
    }

    /// Build a path directly. The source key is the canonical rendering.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        let key = render(&segments);
        KeyPath { key, segments }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn root_field(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Field(name)) => Some(name),
            _ => None,
        }
    }

    /// Canonical rendering of the first `n` segments.
    pub(crate) fn render_prefix(&self, n: usize) -> String {
        render(&self.segments[..n.min(self.segments.len())])
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(&self.segments))
    }
}

fn render(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Field(name) if i == 0 => out.push_str(name),
            other => out.push_str(&other.to_string()),
        }
    }
    out
}

// ------------------------------- Tests ------------------------------------ //
