/// sqlbridge Error Module
///
/// This module defines the structured error type returned by every
/// fallible operation in the crate. Engine-reported failures always keep
/// the native extended result code so callers can branch on it without
/// string matching.
use std::fmt;

use rusqlite::ffi;
use thiserror::Error;

/// Extended SQLite result code.
///
/// The low byte is the primary code; the remaining bits refine it
/// (for example `SQLITE_CONSTRAINT_UNIQUE` is `SQLITE_CONSTRAINT | 8 << 8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub i32);

impl ResultCode {
    pub const OK: ResultCode = ResultCode(ffi::SQLITE_OK as i32);
    pub const ERROR: ResultCode = ResultCode(ffi::SQLITE_ERROR as i32);
    pub const BUSY: ResultCode = ResultCode(ffi::SQLITE_BUSY as i32);
    pub const LOCKED: ResultCode = ResultCode(ffi::SQLITE_LOCKED as i32);
    pub const READONLY: ResultCode = ResultCode(ffi::SQLITE_READONLY as i32);
    pub const INTERRUPT: ResultCode = ResultCode(ffi::SQLITE_INTERRUPT as i32);
    pub const NOTFOUND: ResultCode = ResultCode(ffi::SQLITE_NOTFOUND as i32);
    pub const CANTOPEN: ResultCode = ResultCode(ffi::SQLITE_CANTOPEN as i32);
    pub const SCHEMA: ResultCode = ResultCode(ffi::SQLITE_SCHEMA as i32);
    pub const TOOBIG: ResultCode = ResultCode(ffi::SQLITE_TOOBIG as i32);
    pub const CONSTRAINT: ResultCode = ResultCode(ffi::SQLITE_CONSTRAINT as i32);
    pub const MISUSE: ResultCode = ResultCode(ffi::SQLITE_MISUSE as i32);
    pub const RANGE: ResultCode = ResultCode(ffi::SQLITE_RANGE as i32);
    pub const NOTADB: ResultCode = ResultCode(ffi::SQLITE_NOTADB as i32);
    pub const DONE: ResultCode = ResultCode(ffi::SQLITE_DONE as i32);

    /// The primary result code (low byte).
    pub fn primary(self) -> ResultCode {
        ResultCode(self.0 & 0xff)
    }

    /// Whether this code carries extended information beyond the primary code.
    pub fn is_extended(self) -> bool {
        self.0 != self.primary().0
    }

    fn primary_name(self) -> Option<&'static str> {
        let name = match self.primary().0 {
            0 => "SQLITE_OK",
            1 => "SQLITE_ERROR",
            2 => "SQLITE_INTERNAL",
            3 => "SQLITE_PERM",
            4 => "SQLITE_ABORT",
            5 => "SQLITE_BUSY",
            6 => "SQLITE_LOCKED",
            7 => "SQLITE_NOMEM",
            8 => "SQLITE_READONLY",
            9 => "SQLITE_INTERRUPT",
            10 => "SQLITE_IOERR",
            11 => "SQLITE_CORRUPT",
            12 => "SQLITE_NOTFOUND",
            13 => "SQLITE_FULL",
            14 => "SQLITE_CANTOPEN",
            15 => "SQLITE_PROTOCOL",
            16 => "SQLITE_EMPTY",
            17 => "SQLITE_SCHEMA",
            18 => "SQLITE_TOOBIG",
            19 => "SQLITE_CONSTRAINT",
            20 => "SQLITE_MISMATCH",
            21 => "SQLITE_MISUSE",
            22 => "SQLITE_NOLFS",
            23 => "SQLITE_AUTH",
            24 => "SQLITE_FORMAT",
            25 => "SQLITE_RANGE",
            26 => "SQLITE_NOTADB",
            27 => "SQLITE_NOTICE",
            28 => "SQLITE_WARNING",
            100 => "SQLITE_ROW",
            101 => "SQLITE_DONE",
            _ => return None,
        };
        Some(name)
    }

    fn extended_suffix(self) -> Option<&'static str> {
        let suffix = match (self.primary().0, self.0 >> 8) {
            (5, 1) => "RECOVERY",
            (5, 2) => "SNAPSHOT",
            (5, 3) => "TIMEOUT",
            (6, 1) => "SHAREDCACHE",
            (8, 4) => "DBMOVED",
            (14, 2) => "ISDIR",
            (14, 3) => "FULLPATH",
            (19, 1) => "CHECK",
            (19, 3) => "FOREIGNKEY",
            (19, 4) => "FUNCTION",
            (19, 5) => "NOTNULL",
            (19, 6) => "PRIMARYKEY",
            (19, 7) => "TRIGGER",
            (19, 8) => "UNIQUE",
            (19, 10) => "ROWID",
            _ => return None,
        };
        Some(suffix)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.primary_name(), self.extended_suffix()) {
            (Some(name), Some(suffix)) => write!(f, "{}_{}", name, suffix),
            (Some(name), None) if self.is_extended() => write!(f, "{}[{}]", name, self.0),
            (Some(name), None) => f.write_str(name),
            (None, _) => write!(f, "SQLITE_UNKNOWN[{}]", self.0),
        }
    }
}

/// Diagnostic reported by the engine (or synthesized by the binding in the
/// engine's vocabulary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    /// Extended result code.
    pub code: ResultCode,
    /// Human-readable message, usually `sqlite3_errmsg`.
    pub message: String,
}

impl EngineError {
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        EngineError {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Error type for every sqlbridge operation.
///
/// Variants mirror the failure classes callers typically branch on:
/// - open-time failures (bad path, permissions, not a database)
/// - prepare-time failures (syntax vs. unknown schema objects)
/// - step-time failures (constraints, contention, cancellation)
/// - misuse of indices, rows and blob ranges
///
/// Contract violations such as using a finalized statement are not
/// represented here; they panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The database could not be opened
    #[error("open failed: {0}")]
    Open(EngineError),

    /// SQL text failed to compile
    #[error("syntax error: {0}")]
    Syntax(EngineError),

    /// SQL referenced a table, column or function that does not exist
    #[error("schema error: {0}")]
    Schema(EngineError),

    /// A constraint was violated while stepping
    #[error("constraint failed: {0}")]
    Constraint(EngineError),

    /// The database file is locked by another connection
    #[error("database busy: {0}")]
    Busy(EngineError),

    /// A table is locked within the same connection or shared cache
    #[error("database table locked: {0}")]
    Locked(EngineError),

    /// Parameter index, parameter name or blob offset out of range
    #[error("out of range: {0}")]
    Range(EngineError),

    /// A row, column or table addressed by the caller does not exist
    #[error("not found: {0}")]
    NotFound(EngineError),

    /// The operation observed an interrupt signal
    #[error("interrupted: {0}")]
    Interrupted(EngineError),

    /// Any other engine failure
    #[error("engine error: {0}")]
    Engine(EngineError),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Where an engine failure was observed; drives classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Open,
    Prepare,
    BlobOpen,
    Other,
}

impl Error {
    /// Classifies an engine diagnostic into the matching variant.
    pub(crate) fn classify(phase: Phase, err: EngineError) -> Error {
        let primary = err.code.primary();
        match phase {
            Phase::Open => return Error::Open(err),
            Phase::Prepare if primary == ResultCode::SCHEMA || err.message.starts_with("no such") => {
                return Error::Schema(err)
            }
            Phase::Prepare if primary == ResultCode::ERROR => return Error::Syntax(err),
            Phase::BlobOpen if primary == ResultCode::ERROR => return Error::NotFound(err),
            _ => {}
        }
        match primary {
            ResultCode::BUSY => Error::Busy(err),
            ResultCode::LOCKED => Error::Locked(err),
            ResultCode::CONSTRAINT => Error::Constraint(err),
            ResultCode::INTERRUPT => Error::Interrupted(err),
            ResultCode::RANGE => Error::Range(err),
            ResultCode::NOTFOUND => Error::NotFound(err),
            ResultCode::SCHEMA => Error::Schema(err),
            _ => Error::Engine(err),
        }
    }

    pub(crate) fn range(message: impl Into<String>) -> Error {
        Error::Range(EngineError::new(ResultCode::RANGE, message))
    }

    pub(crate) fn busy(message: impl Into<String>) -> Error {
        Error::Busy(EngineError::new(ResultCode::BUSY, message))
    }

    pub(crate) fn interrupted() -> Error {
        Error::Interrupted(EngineError::new(ResultCode::INTERRUPT, "interrupted"))
    }

    /// The engine payload, if this is an engine-reported error.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Error::Open(e)
            | Error::Syntax(e)
            | Error::Schema(e)
            | Error::Constraint(e)
            | Error::Busy(e)
            | Error::Locked(e)
            | Error::Range(e)
            | Error::NotFound(e)
            | Error::Interrupted(e)
            | Error::Engine(e) => Some(e),
            Error::Config(_) => None,
        }
    }

    /// Extended result code. Configuration errors report `SQLITE_ERROR`.
    pub fn code(&self) -> ResultCode {
        self.engine_error()
            .map(|e| e.code)
            .unwrap_or(ResultCode::ERROR)
    }

    /// Message without the classification prefix.
    pub fn message(&self) -> &str {
        match self {
            Error::Config(msg) => msg,
            other => other
                .engine_error()
                .map(|e| e.message.as_str())
                .unwrap_or_default(),
        }
    }

    /// Busy and locked conditions may succeed if retried after a backoff.
    /// The binding itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Busy(_) | Error::Locked(_))
    }
}

/// Type alias for Result to use sqlbridge's Error as the error type.
pub type Result<T> = std::result::Result<T, Error>;
