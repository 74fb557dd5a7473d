//! sqlbridge: ownership-respecting bindings over the SQLite C API.
//!
//! The crate wraps one engine handle per [`Connection`] and derives
//! [`Statement`]s and [`Blob`] streams from it. User-defined functions are
//! registered through [`FunctionImpl`], and long-running statements can be
//! cancelled from another thread with an [`InterruptSignal`].
//!
//! ```
//! use sqlbridge::{Connection, OpenMode};
//!
//! let conn = Connection::open(":memory:", OpenMode::ReadWriteCreate)?;
//! sqlbridge::exec::exec_script(&conn, "CREATE TABLE t (x); INSERT INTO t VALUES (42);")?;
//!
//! let mut stmt = conn.prepare("SELECT x FROM t WHERE x = ?1")?;
//! stmt.bind_int64(1, 42)?;
//! assert!(stmt.step()?);
//! assert_eq!(stmt.column_int64(0), 42);
//! # Ok::<_, sqlbridge::Error>(())
//! ```
//!
//! ## Errors and contract violations
//!
//! Every failure the engine reports comes back as an [`Error`] carrying the
//! extended result code. Misuse of the API is not an error value; it
//! panics. This covers:
//!
//! - using a statement after [`Statement::finalize`]
//! - reading a column before the first row, after the last row or past
//!   the last column
//! - using a statement or blob whose connection was dropped while they
//!   were alive
//! - reading or writing a closed [`Blob`]
//!
//! ## Resource lifetimes
//!
//! [`Connection::close`] refuses with [`Error::Busy`] while any statement
//! or blob created from the connection is still open. Dropping a
//! connection with live dependents releases the handle once the last
//! dependent is gone.
//!
//! ## Threads
//!
//! Connections, statements and blobs are `!Send`; each connection is
//! driven from the thread that opened it. Use one connection per thread.

// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod config;
pub mod exec;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::core::db::{
    initialize, version, AggregateFunction, Arity, BindIndex, Blob, CallbackResult, ColumnType, Connection,
    Context, FunctionBody, FunctionImpl, InterruptSignal, OpenMode, OpenOptions, Statement, StatementKind,
    StatementState, Value, ValueRef, WindowFunction,
};
pub use crate::core::error::{EngineError, Error, Result, ResultCode};
