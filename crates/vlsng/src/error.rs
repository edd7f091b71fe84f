//! The single error taxonomy shared by the lexer, parser, value model,
//! procedure library, and graph runtime.
//!
//! Every fallible operation in the crate returns [`RunResult`]. Errors carry
//! the source line where one is known; the top-level entry points render them
//! to the log sink before handing them back to the caller.

use std::fmt;

use strum::{Display, IntoStaticStr};

/// Result type alias for operations that can produce an interpreter error.
pub type RunResult<T> = Result<T, Error>;

/// Error categories, one per failure class of the language and runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum ErrorKind {
    /// Unclosed string, unknown character.
    #[strum(serialize = "lexical")]
    Lexical,
    /// Unexpected token kind.
    #[strum(serialize = "syntax")]
    Syntax,
    /// Unknown identifier, redeclaration, unknown object type or directive,
    /// sub-graph not found.
    #[strum(serialize = "semantic")]
    Semantic,
    /// Arithmetic on non-numeric values, arity mismatch, sequence length or
    /// index violations, port indices out of range.
    #[strum(serialize = "type")]
    Type,
    /// File or library not found, unwritable output.
    #[strum(serialize = "I/O")]
    Io,
}

/// An interpreter error with optional source-line context.
///
/// NaN and Inf are deliberately not represented here; non-finite numbers
/// propagate through arithmetic instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub line: Option<u32>,
    pub message: String,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            line: None,
            message: message.into(),
        }
    }

    pub(crate) fn lexical(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Lexical, message)
    }

    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub(crate) fn semantic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Semantic, message)
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub(crate) fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    /// Attaches a source line unless a more precise one is already recorded.
    #[must_use]
    pub(crate) fn at_line(mut self, line: u32) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {} error: {}", self.kind, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Error {}
