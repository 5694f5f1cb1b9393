//! Compile-session errors.
//!
//! Every error aborts the whole compile; there is no recovery past the first
//! failure. Input-level errors carry a `file:line` location so the offending
//! construct can be found and fixed before re-running.

use std::fmt;
use std::path::PathBuf;

use gencfg_fs::FsError;

use crate::token::Location;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// An input file could not be opened or read.
    Read { path: PathBuf, message: String },
    /// A file included itself, directly or through other includes.
    Cycle {
        path: PathBuf,
        includer: Option<PathBuf>,
    },
    /// A defective rule pattern in a grammar unit.
    Grammar { pattern: String, message: String },
    /// A rule names a callback its node type does not define.
    Callback {
        node_type: String,
        callback: String,
    },
    /// A demand-loaded grammar unit was found in no namespace.
    UnitNotFound {
        name: String,
        namespaces: Vec<String>,
        location: Option<Location>,
    },
    /// No rule matched and the leading token is not a node-type name.
    Syntax { location: Location, message: String },
    /// A node failed its own validation during finalize.
    Semantic { location: Location, message: String },
    /// The output sink rejected a generation request.
    Sink(FsError),
}

impl Error {
    pub fn syntax(location: &Location, message: impl Into<String>) -> Error {
        Error::Syntax {
            location: location.clone(),
            message: message.into(),
        }
    }

    pub fn semantic(location: &Location, message: impl Into<String>) -> Error {
        Error::Semantic {
            location: location.clone(),
            message: message.into(),
        }
    }

    pub fn grammar(pattern: &str, message: impl Into<String>) -> Error {
        Error::Grammar {
            pattern: pattern.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Read { path, message } => {
                write!(f, "cannot read {}: {}", path.display(), message)
            }
            Error::Cycle { path, includer } => {
                write!(f, "recursive inclusion of {}", path.display())?;
                if let Some(includer) = includer {
                    write!(f, " (included from {})", includer.display())?;
                }
                Ok(())
            }
            Error::Grammar { pattern, message } => {
                write!(f, "invalid rule pattern `{}`: {}", pattern, message)
            }
            Error::Callback {
                node_type,
                callback,
            } => {
                write!(f, "node type `{}` has no callback `{}`", node_type, callback)
            }
            Error::UnitNotFound {
                name,
                namespaces,
                location,
            } => {
                if let Some(location) = location {
                    write!(f, "{}: ", location)?;
                }
                write!(
                    f,
                    "unit `{}` not found in any profile (searched: {})",
                    name,
                    namespaces.join(", ")
                )
            }
            Error::Syntax { location, message } => write!(f, "{}: {}", location, message),
            Error::Semantic { location, message } => write!(f, "{}: {}", location, message),
            Error::Sink(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Sink(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FsError> for Error {
    fn from(err: FsError) -> Self {
        Error::Sink(err)
    }
}
