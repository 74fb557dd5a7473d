/// Connection Management Module
///
/// This module owns the native database handle and everything tied to its
/// lifetime: open options, the statement cache, the installed interrupt
/// signal and the bookkeeping that keeps statements and blobs from
/// outliving their connection.
use std::cell::{Cell, RefCell};
use std::collections::hash_map::{Entry, HashMap};
use std::fmt;
use std::os::raw::{c_int, c_uint};
use std::rc::Rc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use rusqlite::ffi;
use serde::Deserialize;
use tracing::{debug, warn};

use super::blob::Blob;
use super::function::{self, FunctionImpl};
use super::interrupt::{progress_checkpoint, InterruptSignal};
use super::raw::{self, ProgressFn, RawDb};
use super::statement::{Statement, StatementKind};
use crate::core::error::{EngineError, Error, Phase, Result, ResultCode};

/// Outcome of the process-wide engine initialization.
static ENGINE_INIT: OnceCell<c_int> = OnceCell::new();

/// Initializes the engine once per process.
///
/// Safe to call any number of times from any thread; every open calls it.
/// The first outcome is cached and replayed to later callers.
pub fn initialize() -> Result<()> {
    let rc = *ENGINE_INIT.get_or_init(raw::initialize);
    if rc == ffi::SQLITE_OK as c_int {
        Ok(())
    } else {
        Err(Error::Engine(EngineError::new(ResultCode(rc), raw::errstr(rc))))
    }
}

/// Version string of the linked engine (e.g. `"3.41.2"`).
pub fn version() -> &'static str {
    raw::libversion()
}

/// How the database file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    #[default]
    ReadWriteCreate,
}

impl OpenMode {
    fn flags(self) -> c_int {
        let flags = match self {
            OpenMode::ReadOnly => ffi::SQLITE_OPEN_READONLY,
            OpenMode::ReadWrite => ffi::SQLITE_OPEN_READWRITE,
            OpenMode::ReadWriteCreate => ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE,
        };
        flags as c_int
    }
}

/// Default number of virtual machine instructions between interrupt polls.
pub const DEFAULT_INTERRUPT_CHECK_OPS: u32 = 100;

/// Builder for opening a [`Connection`].
#[derive(Debug, Clone)]
pub struct OpenOptions {
    mode: OpenMode,
    uri: bool,
    wal: bool,
    foreign_keys: Option<bool>,
    busy_timeout: Option<Duration>,
    interrupt_check_ops: u32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            mode: OpenMode::default(),
            uri: false,
            wal: false,
            foreign_keys: None,
            busy_timeout: None,
            interrupt_check_ops: DEFAULT_INTERRUPT_CHECK_OPS,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&mut self, mode: OpenMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Interpret the path as a `file:` URI.
    pub fn uri(&mut self, uri: bool) -> &mut Self {
        self.uri = uri;
        self
    }

    /// Switch the database to write-ahead logging after opening.
    pub fn wal(&mut self, wal: bool) -> &mut Self {
        self.wal = wal;
        self
    }

    pub fn foreign_keys(&mut self, enabled: bool) -> &mut Self {
        self.foreign_keys = Some(enabled);
        self
    }

    pub fn busy_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// How many VM instructions run between interrupt checkpoints.
    pub fn interrupt_check_ops(&mut self, ops: u32) -> &mut Self {
        self.interrupt_check_ops = ops.max(1);
        self
    }

    /// Opens the database at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the database file, `":memory:"` for a private
    ///   in-memory database, or a `file:` URI when [`OpenOptions::uri`] is set
    ///
    /// # Returns
    ///
    /// The open connection, or `Error::Open` if the path cannot be opened,
    /// permissions are insufficient, or the file is not a database.
    pub fn open(&self, path: &str) -> Result<Connection> {
        initialize()?;
        let opening = |err| Error::classify(Phase::Open, err);
        let c_path = raw::to_cstring("database path", path).map_err(opening)?;
        let mut flags = self.mode.flags() | ffi::SQLITE_OPEN_NOMUTEX as c_int;
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI as c_int;
        }

        let db = RawDb::open(&c_path, flags).map_err(opening)?;
        db.enable_extended_codes();
        if let Err(err) = self.configure(db) {
            db.close_deferred();
            return Err(opening(err));
        }

        debug!(path, mode = ?self.mode, "opened database");
        Ok(Connection {
            inner: Rc::new(ConnInner {
                db,
                path: path.to_string(),
                closed: Cell::new(false),
                live_statements: Cell::new(0),
                live_blobs: Cell::new(0),
                interrupt: RefCell::new(None),
                interrupt_check_ops: c_int::try_from(self.interrupt_check_ops).unwrap_or(c_int::MAX),
            }),
            cache: HashMap::new(),
        })
    }

    fn configure(&self, db: RawDb) -> std::result::Result<(), EngineError> {
        if let Some(timeout) = self.busy_timeout {
            db.busy_timeout(duration_to_ms(timeout));
        }
        // Reading the schema version forces the header to be read, so
        // corrupt or non-database files fail here rather than on first use.
        let mut pragmas = vec!["PRAGMA schema_version;"];
        if self.wal && self.mode != OpenMode::ReadOnly {
            pragmas.push("PRAGMA journal_mode = WAL;");
        }
        match self.foreign_keys {
            Some(true) => pragmas.push("PRAGMA foreign_keys = ON;"),
            Some(false) => pragmas.push("PRAGMA foreign_keys = OFF;"),
            None => {}
        }
        for pragma in pragmas {
            db.exec(&raw::to_cstring("pragma", pragma)?)?;
        }
        Ok(())
    }
}

fn duration_to_ms(timeout: Duration) -> c_int {
    c_int::try_from(timeout.as_millis()).unwrap_or(c_int::MAX)
}

/// State shared between a connection and the statements and blobs derived
/// from it. Dependents hold an `Rc` to this and check `closed` on entry.
#[derive(Debug)]
pub(crate) struct ConnInner {
    db: RawDb,
    path: String,
    closed: Cell<bool>,
    live_statements: Cell<usize>,
    live_blobs: Cell<usize>,
    interrupt: RefCell<Option<InterruptSignal>>,
    interrupt_check_ops: c_int,
}

impl ConnInner {
    /// The native handle; panics if the connection has been closed.
    pub(crate) fn db(&self) -> RawDb {
        self.assert_open();
        self.db
    }

    pub(crate) fn assert_open(&self) {
        if self.closed.get() {
            panic!("sqlbridge: connection to {:?} used after close", self.path);
        }
    }

    /// Interrupt checkpoint: fails if the installed signal has fired.
    pub(crate) fn checkpoint(&self) -> Result<()> {
        match self.interrupt.borrow().as_ref() {
            Some(signal) if signal.is_triggered() => Err(Error::interrupted()),
            _ => Ok(()),
        }
    }

    pub(crate) fn statement_opened(&self) {
        self.live_statements.set(self.live_statements.get() + 1);
    }

    pub(crate) fn statement_closed(&self) {
        self.live_statements.set(self.live_statements.get().saturating_sub(1));
    }

    pub(crate) fn blob_opened(&self) {
        self.live_blobs.set(self.live_blobs.get() + 1);
    }

    pub(crate) fn blob_closed(&self) {
        self.live_blobs.set(self.live_blobs.get().saturating_sub(1));
    }
}

/// An open database connection.
///
/// A connection exclusively owns one native handle. Statements and blobs
/// created from it share its bookkeeping and must be finalized/closed
/// before [`Connection::close`] succeeds.
///
/// Connections are neither `Send` nor `Sync`: one connection is driven
/// from one thread. Open one connection per thread to scale out; the only
/// cross-thread primitive is the [`InterruptSignal`].
pub struct Connection {
    inner: Rc<ConnInner>,
    cache: HashMap<String, Statement>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.inner.path)
            .field("closed", &self.inner.closed.get())
            .field("open_statements", &self.open_statements())
            .field("open_blobs", &self.open_blobs())
            .field("cached_statements", &self.cache.len())
            .finish()
    }
}

impl Connection {
    /// Opens a database with the given mode and default options.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlbridge::{Connection, OpenMode};
    ///
    /// let conn = Connection::open(":memory:", OpenMode::ReadWrite)?;
    /// # Ok::<_, sqlbridge::Error>(())
    /// ```
    pub fn open(path: &str, mode: OpenMode) -> Result<Connection> {
        OpenOptions::new().mode(mode).open(path)
    }

    pub fn open_in_memory() -> Result<Connection> {
        Self::open(":memory:", OpenMode::ReadWriteCreate)
    }

    /// Path the connection was opened with.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Statements created by `prepare*` that have not been finalized.
    /// Cached statements from [`Connection::prep`] are not counted.
    pub fn open_statements(&self) -> usize {
        self.inner
            .live_statements
            .get()
            .saturating_sub(self.cache.values().filter(|s| !s.is_finalized()).count())
    }

    pub fn open_blobs(&self) -> usize {
        self.inner.live_blobs.get()
    }

    /// Prepares a persistent statement.
    ///
    /// # Arguments
    ///
    /// * `sql` - Exactly one SQL statement; trailing whitespace and a final
    ///   `;` are accepted
    ///
    /// # Errors
    ///
    /// `Error::Syntax` or `Error::Schema` with the engine's diagnostic, or
    /// `Error::Syntax` if the text holds more than one statement.
    pub fn prepare(&self, sql: &str) -> Result<Statement> {
        let (stmt, trailing) = self.prepare_with(sql, StatementKind::Persistent)?;
        reject_trailing(sql, trailing)?;
        Ok(stmt)
    }

    /// Prepares a transient statement, finalized automatically after its
    /// single run. Returns the statement and the number of trailing bytes
    /// of `sql` left uncompiled.
    pub fn prepare_transient(&self, sql: &str) -> Result<(Statement, usize)> {
        self.prepare_with(sql, StatementKind::Transient)
    }

    /// Compiles the first statement of `sql`; the caller decides whether
    /// the reported trailing bytes are an error.
    pub fn prepare_with(&self, sql: &str, kind: StatementKind) -> Result<(Statement, usize)> {
        match compile(&self.inner, sql, kind)? {
            (Some(stmt), consumed) => Ok((stmt, sql.len() - consumed)),
            (None, _) => Err(Error::Syntax(EngineError::new(
                ResultCode::ERROR,
                "SQL text contains no statement",
            ))),
        }
    }

    /// Like [`Connection::prepare_with`], but text without any statement
    /// yields `None` instead of an error.
    pub(crate) fn compile(&self, sql: &str, kind: StatementKind) -> Result<(Option<Statement>, usize)> {
        compile(&self.inner, sql, kind)
    }

    /// Returns a cached persistent statement for `sql`, preparing it on
    /// first use. The statement is reset and its bindings cleared.
    /// Like [`Connection::prepare`], `sql` must hold a single statement.
    ///
    /// Cached statements belong to the connection: they are finalized by
    /// [`Connection::close`] and never block it.
    pub fn prep(&mut self, sql: &str) -> Result<&mut Statement> {
        if self.cache.get(sql).is_some_and(Statement::is_finalized) {
            self.cache.remove(sql);
        }
        match self.cache.entry(sql.to_string()) {
            Entry::Occupied(entry) => {
                let stmt = entry.into_mut();
                stmt.reset();
                stmt.clear_bindings();
                Ok(stmt)
            }
            Entry::Vacant(entry) => match compile(&self.inner, sql, StatementKind::Persistent)? {
                (Some(stmt), consumed) => {
                    reject_trailing(sql, sql.len() - consumed)?;
                    Ok(entry.insert(stmt))
                }
                (None, _) => Err(Error::Syntax(EngineError::new(
                    ResultCode::ERROR,
                    "SQL text contains no statement",
                ))),
            },
        }
    }

    /// Installs `signal` as this connection's interrupt signal, replacing
    /// (and returning) the previous one. `None` disables interruption.
    ///
    /// A statement currently stepping observes the change at its next
    /// checkpoint.
    pub fn set_interrupt(&self, signal: Option<InterruptSignal>) -> Option<InterruptSignal> {
        let db = self.inner.db();
        let mut slot = self.inner.interrupt.borrow_mut();
        let handler = signal
            .as_ref()
            .map(|s| (progress_checkpoint as ProgressFn, s.as_handler_arg()));
        // The handler argument points into `signal`, which the slot keeps alive.
        unsafe { db.progress_handler(self.inner.interrupt_check_ops, handler) };
        std::mem::replace(&mut *slot, signal)
    }

    /// The currently installed interrupt signal, if any.
    pub fn interrupt(&self) -> Option<InterruptSignal> {
        self.inner.interrupt.borrow().clone()
    }

    /// Registers a user-defined SQL function.
    ///
    /// Registering an existing name/arity pair replaces it, unless a
    /// statement on this connection is currently running, in which case
    /// the engine refuses with `Error::Busy`.
    pub fn create_function(&self, name: &str, function: FunctionImpl) -> Result<()> {
        let db = self.inner.db();
        function::register(db, name, function)?;
        debug!(name, "registered function");
        Ok(())
    }

    /// Opens a blob stream on `table.column` of the row `rowid`.
    ///
    /// # Arguments
    ///
    /// * `db` - Schema name (`"main"`, `"temp"` or an attached name); an
    ///   empty string means `"main"`
    /// * `writable` - Open for writing as well as reading
    ///
    /// # Errors
    ///
    /// `Error::NotFound` if the table, column or row does not exist or the
    /// cell does not hold a blob or text value.
    pub fn open_blob(&self, db: &str, table: &str, column: &str, rowid: i64, writable: bool) -> Result<Blob> {
        Blob::open(&self.inner, db, table, column, rowid, writable)
    }

    pub fn set_busy_timeout(&self, timeout: Duration) {
        self.inner.db().busy_timeout(duration_to_ms(timeout));
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.inner.db().last_insert_rowid()
    }

    /// Rows modified by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> i64 {
        self.inner.db().changes()
    }

    pub fn is_autocommit(&self) -> bool {
        self.inner.db().autocommit()
    }

    /// Closes the connection.
    ///
    /// Cached statements are finalized first. If any statement or blob
    /// created from this connection is still open, the close fails with
    /// `Error::Busy` and the connection stays open and usable. Closing an
    /// already closed connection is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.inner.closed.get() {
            return Ok(());
        }
        self.cache.clear();

        let statements = self.inner.live_statements.get();
        let blobs = self.inner.live_blobs.get();
        if statements > 0 || blobs > 0 {
            return Err(Error::busy(format!(
                "unable to close {:?}: {} statement(s) and {} blob(s) still open",
                self.inner.path, statements, blobs
            )));
        }

        self.inner
            .db
            .close()
            .map_err(|e| Error::classify(Phase::Other, e))?;
        self.inner.closed.set(true);
        self.inner.interrupt.borrow_mut().take();
        debug!(path = %self.inner.path, "closed database");
        Ok(())
    }
}

/// Fails with `Error::Syntax` when the last `trailing` bytes of `sql`
/// hold more than whitespace.
pub(crate) fn reject_trailing(sql: &str, trailing: usize) -> Result<()> {
    let rest = sql[sql.len() - trailing..].trim();
    if rest.is_empty() {
        return Ok(());
    }
    Err(Error::Syntax(EngineError::new(
        ResultCode::ERROR,
        format!("multiple statements in SQL text; unparsed remainder: {:?}", rest),
    )))
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.inner.closed.get() {
            return;
        }
        self.cache.clear();
        let statements = self.inner.live_statements.get();
        let blobs = self.inner.live_blobs.get();
        if statements > 0 || blobs > 0 {
            warn!(
                path = %self.inner.path,
                statements,
                blobs,
                "connection dropped with open dependents; deferring handle release"
            );
        }
        let rc = self.inner.db.close_deferred();
        if rc != ffi::SQLITE_OK as c_int {
            warn!(path = %self.inner.path, code = %ResultCode(rc), "failed to close database");
        }
        self.inner.closed.set(true);
    }
}

fn compile(inner: &Rc<ConnInner>, sql: &str, kind: StatementKind) -> Result<(Option<Statement>, usize)> {
    let db = inner.db();
    let flags: c_uint = match kind {
        StatementKind::Persistent => ffi::SQLITE_PREPARE_PERSISTENT as c_uint,
        StatementKind::Transient => 0,
    };
    let (raw, consumed) = db
        .prepare(sql, flags)
        .map_err(|e| Error::classify(Phase::Prepare, e))?;
    let stmt = raw.map(|raw| {
        debug!(sql = sql[..consumed].trim(), ?kind, "prepared statement");
        Statement::new(Rc::clone(inner), raw, sql[..consumed].trim(), kind)
    });
    Ok((stmt, consumed))
}
