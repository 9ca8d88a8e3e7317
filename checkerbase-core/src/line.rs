use std::ops::Deref;

/// A single record extracted from the input file: UTF-8 text between `\n`
/// delimiters, with a trailing `\r` stripped and a leading BOM (on the very
/// first line only) removed upstream by the reader.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Line(pub String);

impl Line {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for Line {
    fn from(s: String) -> Self {
        Line(s)
    }
}

impl Deref for Line {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which sink an [`OutputEntry`] is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Success,
    Failed,
    Ignored,
}

/// A named key/value extracted by a checker from a successful process,
/// attached to the emitted output. Capture values are plain strings: the
/// writer's formatter needs no dynamic dispatch over capture payloads.
pub type Capture = (String, String);

/// One record bound for a writer sink.
#[derive(Debug, Clone)]
pub struct OutputEntry {
    pub kind: OutputKind,
    pub original_line: Line,
    pub captures: Vec<Capture>,
}

impl OutputEntry {
    pub fn new(kind: OutputKind, original_line: Line, captures: Vec<Capture>) -> Self {
        Self {
            kind,
            original_line,
            captures,
        }
    }
}
