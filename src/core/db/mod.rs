/// Database Module
///
/// This module binds the SQLite C API, organized into one submodule per
/// component.
///
/// ## Architecture
///
/// - **Connection Management** (`connection.rs`): Opens and closes handles, tracks live dependents
/// - **Prepared Statements** (`statement.rs`): Binding, stepping and column access
/// - **Value Bridge** (`value.rs`): Owned and borrowed engine values
/// - **Blob Streams** (`blob.rs`): Offset-addressed I/O on a single cell
/// - **Function Registry** (`function.rs`): Scalar, aggregate and window callbacks
/// - **Interrupt Channel** (`interrupt.rs`): Cross-thread cancellation latch
/// - **Raw Handles** (`raw.rs`): The unsafe layer the others are built on
///
/// ## Error Handling
///
/// All fallible operations return the crate's `Error`, which always keeps
/// the engine's extended result code.
pub mod blob;
pub mod connection;
pub mod function;
pub mod interrupt;
pub(crate) mod raw;
pub mod statement;
pub mod value;

pub use blob::Blob;
pub use connection::{initialize, version, Connection, OpenMode, OpenOptions, DEFAULT_INTERRUPT_CHECK_OPS};
pub use function::{AggregateFunction, Arity, CallbackResult, Context, FunctionBody, FunctionImpl, WindowFunction};
pub use interrupt::InterruptSignal;
pub use statement::{BindIndex, Statement, StatementKind, StatementState};
pub use value::{ColumnType, Value, ValueRef};
