//! Error types.
//!
//! - `EngineError`: everything the library can report. Variants are grouped into
//!   a small taxonomy (`ErrorKind`) so batch callers can decide whether to skip a
//!   template or abort a whole spectrum.
//! - `AppError`: what the `zpdf` binary prints, with its process exit code.

use thiserror::Error;

/// Coarse classification of an `EngineError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Length mismatches, empty required inputs, out-of-range indices.
    InvalidArgument,
    /// Filesystem failures (text / JSON persistence only).
    Io,
    /// Malformed persisted content.
    Parse,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Length mismatch for {what}: expected {expected}, got {found}.")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Empty input: {0}.")]
    EmptyInput(&'static str),

    #[error("Index {index} is out of range for {what} of length {len}.")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Redshift grid must be finite and strictly increasing (violated at index {0}).")]
    UnorderedGrid(usize),

    #[error("Invalid range: begin={begin}, end={end} (must be finite and begin <= end).")]
    InvalidRange { begin: f64, end: f64 },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    #[error("{0} was already set and is immutable.")]
    AlreadySet(&'static str),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in '{path}': {message}")]
    Parse { path: String, message: String },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Io { .. } => ErrorKind::Io,
            EngineError::Parse { .. } => ErrorKind::Parse,
            _ => ErrorKind::InvalidArgument,
        }
    }

    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        EngineError::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let exit_code = match err.kind() {
            ErrorKind::InvalidArgument => 2,
            ErrorKind::Io => 3,
            ErrorKind::Parse => 4,
        };
        AppError::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
