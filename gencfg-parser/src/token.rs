//! Tokens, locations and the kind registry.
//!
//! A token is a whitespace-separated lexeme annotated with where it came from
//! and its indentation level. Levels are absolute: each leading space counts
//! one unit and each leading tab eight, accumulated on top of the file's base
//! level. Only the first lexeme of a physical line carries the line's level;
//! every further lexeme on the same line carries [`CONTINUATION`].
//!
//! Kinds are the classified categories of lexemes (keyword names and token
//! pattern names). Within one compile session every kind name maps to a small
//! stable integer: re-enumerating after more grammar units load only appends
//! new ids, it never reassigns existing ones.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexSet;

/// Level carried by every lexeme after the first one of a physical line.
pub const CONTINUATION: i32 = -1;

/// A `file:line` input position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: Arc<PathBuf>,
    pub line: u32,
}

impl Location {
    pub fn new(file: Arc<PathBuf>, line: u32) -> Self {
        Location { file, line }
    }

    /// Position for constructs that have no input text, e.g. the tree root.
    pub fn builtin() -> Self {
        Location {
            file: Arc::new(PathBuf::from("<builtin>")),
            line: 0,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// Session-stable identifier of a token kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KindId(pub u16);

/// A single lexeme read from the input stream.
#[derive(Debug, Clone)]
pub struct Token {
    pub text: String,
    /// Unset until classified; cleared again on pushback so the token is
    /// re-classified in whatever context pulls it next.
    pub kind: Option<KindId>,
    pub location: Location,
    pub level: i32,
}

impl Token {
    pub fn new(text: impl Into<String>, location: Location, level: i32) -> Self {
        Token {
            text: text.into(),
            kind: None,
            location,
            level,
        }
    }

    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.text, self.level)
    }
}

/// Kind name to id mapping, append-only for the life of a session.
#[derive(Debug, Default)]
pub struct KindRegistry {
    names: IndexSet<String>,
}

impl KindRegistry {
    pub fn new() -> Self {
        KindRegistry::default()
    }

    /// Return the id for `name`, assigning the next free one if unseen.
    pub fn intern(&mut self, name: &str) -> KindId {
        let (index, _) = self.names.insert_full(name.to_string());
        KindId(index as u16)
    }

    pub fn id(&self, name: &str) -> Option<KindId> {
        self.names.get_index_of(name).map(|i| KindId(i as u16))
    }

    pub fn name(&self, id: KindId) -> Option<&str> {
        self.names.get_index(id.0 as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
