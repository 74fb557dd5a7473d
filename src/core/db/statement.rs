/// Prepared Statement Module
///
/// A [`Statement`] owns one prepared-statement handle and tracks where it
/// is in its lifecycle:
///
/// ```text
/// Ready --bind*--> Ready --step--> Row --step--> ... --> Done
///                                   \--------------------> Failed
/// ```
///
/// `Done` and `Failed` are terminal until [`Statement::reset`]. Binding in
/// any state other than `Ready` resets the statement first.
///
/// Parameters are 1-based (matching `?1` in SQL); columns are 0-based.
use std::borrow::Cow;
use std::fmt;
use std::os::raw::c_int;
use std::rc::Rc;

use rusqlite::ffi;
use tracing::{debug, trace, warn};

use super::connection::ConnInner;
use super::raw::{self, RawStmt};
use super::value::{ColumnType, Value, ValueRef};
use crate::core::error::{Error, Phase, Result};

/// Whether a statement is kept by the caller or released after one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Caller-managed; survives `Done` and errors and can be reset and
    /// re-run until finalized or dropped.
    Persistent,
    /// Single use; finalized as soon as it reaches `Done` or fails, and on
    /// drop along every other exit path.
    Transient,
}

/// Row state of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// Not yet stepped since preparation or the last reset
    Ready,
    /// Positioned on a row; columns are readable
    Row,
    /// All rows consumed
    Done,
    /// The last step failed
    Failed,
}

/// Anything that can address a statement parameter.
pub trait BindIndex {
    /// Resolves to a 1-based parameter index.
    fn resolve(&self, stmt: &Statement) -> Result<usize>;
}

impl BindIndex for usize {
    fn resolve(&self, stmt: &Statement) -> Result<usize> {
        let count = stmt.bind_parameter_count();
        if *self == 0 || *self > count {
            return Err(Error::range(format!(
                "parameter index {} out of range (statement has {} parameters)",
                self, count
            )));
        }
        Ok(*self)
    }
}

impl BindIndex for &str {
    fn resolve(&self, stmt: &Statement) -> Result<usize> {
        stmt.bind_parameter_index(self)
            .ok_or_else(|| Error::range(format!("unknown parameter name {:?}", self)))
    }
}

impl BindIndex for String {
    fn resolve(&self, stmt: &Statement) -> Result<usize> {
        self.as_str().resolve(stmt)
    }
}

/// A prepared statement.
///
/// Created by [`Connection::prepare`](super::Connection::prepare) and
/// friends. Holds a non-owning reference to its connection; the
/// connection refuses to close while the statement is alive.
pub struct Statement {
    conn: Rc<ConnInner>,
    raw: Option<RawStmt>,
    sql: String,
    kind: StatementKind,
    state: StatementState,
    last_error: Option<Error>,
    columns: Vec<String>,
    param_count: usize,
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("finalized", &self.raw.is_none())
            .finish()
    }
}

impl Statement {
    pub(crate) fn new(conn: Rc<ConnInner>, raw: RawStmt, sql: &str, kind: StatementKind) -> Self {
        conn.statement_opened();
        let columns = column_names_of(raw);
        Statement {
            conn,
            raw: Some(raw),
            sql: sql.to_string(),
            kind,
            state: StatementState::Ready,
            last_error: None,
            columns,
            param_count: raw.parameter_count(),
        }
    }

    /// The live handle. Panics on a finalized statement or a statement
    /// whose connection was closed.
    fn raw(&self) -> RawStmt {
        match self.raw {
            Some(raw) => {
                self.conn.assert_open();
                raw
            }
            None => panic!("sqlbridge: statement {:?} used after finalize", self.sql),
        }
    }

    /// The handle positioned on a row, for column `index`.
    fn row(&self, index: usize) -> RawStmt {
        let raw = self.raw();
        if self.state != StatementState::Row {
            panic!(
                "sqlbridge: column {} read from statement {:?} in state {:?}",
                index, self.sql, self.state
            );
        }
        if index >= self.columns.len() {
            panic!(
                "sqlbridge: column index {} out of range for statement {:?} ({} columns)",
                index,
                self.sql,
                self.columns.len()
            );
        }
        raw
    }

    /// SQL text this statement was compiled from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    pub fn is_finalized(&self) -> bool {
        self.raw.is_none()
    }

    /// Whether the statement makes no direct changes to the database.
    pub fn is_readonly(&self) -> bool {
        self.raw().readonly()
    }

    // ----- parameters -----

    pub fn bind_parameter_count(&self) -> usize {
        self.param_count
    }

    /// 1-based index of a named parameter.
    ///
    /// The name may include its prefix (`:id`, `@id`, `$id`); without one,
    /// each prefix is tried in that order.
    pub fn bind_parameter_index(&self, name: &str) -> Option<usize> {
        let raw = self.raw();
        let lookup = |candidate: &str| {
            raw::to_cstring("parameter name", candidate)
                .ok()
                .map(|c| raw.parameter_index(&c))
                .filter(|&index| index > 0)
        };
        if name.starts_with([':', '@', '$', '?']) {
            return lookup(name);
        }
        [":", "@", "$"]
            .iter()
            .find_map(|prefix| lookup(&format!("{}{}", prefix, name)))
    }

    /// Name of the 1-based parameter, including its prefix.
    pub fn bind_parameter_name(&self, index: usize) -> Option<String> {
        self.raw().parameter_name(index)
    }

    /// Handle ready for binding; implicitly resets a stepped statement.
    fn bind_target(&mut self) -> RawStmt {
        let raw = self.raw();
        if self.state != StatementState::Ready {
            raw.reset();
            self.state = StatementState::Ready;
            self.last_error = None;
        }
        raw
    }

    /// Binds one parameter.
    ///
    /// # Arguments
    ///
    /// * `param` - 1-based index or parameter name
    /// * `value` - Anything convertible to a [`ValueRef`]; text and blob
    ///   bytes are copied by the engine
    ///
    /// # Errors
    ///
    /// `Error::Range` if the index or name is unknown.
    pub fn bind<'v, P: BindIndex>(&mut self, param: P, value: impl Into<ValueRef<'v>>) -> Result<()> {
        let raw = self.bind_target();
        let index = param.resolve(self)?;
        let outcome = match value.into() {
            ValueRef::Null => raw.bind_null(index),
            ValueRef::Integer(i) => raw.bind_int64(index, i),
            ValueRef::Float(f) => raw.bind_double(index, f),
            ValueRef::Text(t) => raw.bind_text(index, t),
            ValueRef::Blob(b) => raw.bind_blob(index, b),
        };
        outcome.map_err(|e| Error::classify(Phase::Other, e))
    }

    pub fn bind_int64<P: BindIndex>(&mut self, param: P, value: i64) -> Result<()> {
        self.bind(param, value)
    }

    pub fn bind_bool<P: BindIndex>(&mut self, param: P, value: bool) -> Result<()> {
        self.bind(param, value)
    }

    pub fn bind_float<P: BindIndex>(&mut self, param: P, value: f64) -> Result<()> {
        self.bind(param, value)
    }

    pub fn bind_text<P: BindIndex>(&mut self, param: P, value: &str) -> Result<()> {
        self.bind(param, value)
    }

    pub fn bind_bytes<P: BindIndex>(&mut self, param: P, value: &[u8]) -> Result<()> {
        self.bind(param, value)
    }

    pub fn bind_null<P: BindIndex>(&mut self, param: P) -> Result<()> {
        self.bind(param, ValueRef::Null)
    }

    /// Binds a blob of `len` zero bytes, typically to reserve space for a
    /// later [`Blob`](super::Blob) write.
    pub fn bind_zeroblob<P: BindIndex>(&mut self, param: P, len: usize) -> Result<()> {
        let raw = self.bind_target();
        let index = param.resolve(self)?;
        raw.bind_zeroblob(index, len)
            .map_err(|e| Error::classify(Phase::Other, e))
    }

    /// Binds `values` to parameters 1..=values.len().
    pub fn bind_values(&mut self, values: &[Value]) -> Result<()> {
        for (i, value) in values.iter().enumerate() {
            self.bind(i + 1, value)?;
        }
        Ok(())
    }

    /// Sets every parameter back to NULL.
    pub fn clear_bindings(&mut self) {
        self.bind_target().clear_bindings();
    }

    // ----- execution -----

    /// Advances to the next row.
    ///
    /// Returns `Ok(true)` when a row is available and `Ok(false)` once the
    /// statement is done. The connection's interrupt signal is checked
    /// before the engine is entered and periodically while it runs; an
    /// observed interrupt fails the step with `Error::Interrupted`.
    ///
    /// After `Done`, further steps keep returning `Ok(false)`; after a
    /// failure, further steps return the same error, until [`Statement::reset`].
    pub fn step(&mut self) -> Result<bool> {
        match self.state {
            StatementState::Done => return Ok(false),
            StatementState::Failed => {
                if let Some(err) = &self.last_error {
                    return Err(err.clone());
                }
            }
            _ => {}
        }

        let raw = self.raw();
        if let Err(err) = self.conn.checkpoint() {
            return Err(self.fail(err));
        }

        let first_row = self.state == StatementState::Ready;
        match raw.step() {
            ffi::SQLITE_ROW => {
                // A schema change recompiles the statement inside step,
                // which can change the result columns.
                if first_row {
                    self.columns = column_names_of(raw);
                }
                self.state = StatementState::Row;
                Ok(true)
            }
            ffi::SQLITE_DONE => {
                trace!(sql = %self.sql, "statement done");
                self.state = StatementState::Done;
                if self.kind == StatementKind::Transient {
                    self.release();
                }
                Ok(false)
            }
            rc => {
                let err = Error::classify(Phase::Other, raw.db().error_for(rc));
                Err(self.fail(err))
            }
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        trace!(sql = %self.sql, error = %err, "statement failed");
        self.state = StatementState::Failed;
        self.last_error = Some(err.clone());
        if self.kind == StatementKind::Transient {
            self.release();
        }
        err
    }

    /// Returns the statement to `Ready`, keeping bound parameters and
    /// clearing any error state.
    pub fn reset(&mut self) {
        // sqlite3_reset repeats the last step's error code, which has
        // already been reported.
        self.raw().reset();
        self.state = StatementState::Ready;
        self.last_error = None;
    }

    /// Releases the native handle. Idempotent; any other use afterwards
    /// is a contract violation and panics.
    pub fn finalize(&mut self) -> Result<()> {
        let Some(raw) = self.raw.take() else {
            return Ok(());
        };
        let db = raw.db();
        let rc = raw.finalize();
        self.conn.statement_closed();
        debug!(sql = %self.sql, "finalized statement");
        // A failed step makes finalize repeat that step's error.
        if rc != ffi::SQLITE_OK as c_int && self.state != StatementState::Failed {
            return Err(Error::classify(Phase::Other, db.error_for(rc)));
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Err(err) = self.finalize() {
            warn!(sql = %self.sql, error = %err, "failed to finalize transient statement");
        }
    }

    // ----- columns -----

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_name(&self, index: usize) -> &str {
        &self.columns[index]
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// 0-based index of the result column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_type(&self, index: usize) -> ColumnType {
        ColumnType::from_code(self.row(index).column_type(index))
    }

    /// Zero-copy view of the column value, valid until the next step.
    pub fn column_value(&self, index: usize) -> ValueRef<'_> {
        let raw = self.row(index);
        match ColumnType::from_code(raw.column_type(index)) {
            ColumnType::Integer => ValueRef::Integer(raw.column_int64(index)),
            ColumnType::Float => ValueRef::Float(raw.column_double(index)),
            // Borrow tied to &self; stepping needs &mut self.
            ColumnType::Text => ValueRef::Text(unsafe { raw.column_text(index) }),
            ColumnType::Blob => ValueRef::Blob(unsafe { raw.column_blob(index) }),
            ColumnType::Null => ValueRef::Null,
        }
    }

    pub fn column_int64(&self, index: usize) -> i64 {
        self.row(index).column_int64(index)
    }

    pub fn column_int(&self, index: usize) -> i32 {
        self.column_int64(index) as i32
    }

    pub fn column_bool(&self, index: usize) -> bool {
        self.column_int64(index) != 0
    }

    pub fn column_float(&self, index: usize) -> f64 {
        self.row(index).column_double(index)
    }

    /// Column as text; borrowed unless invalid UTF-8 had to be replaced.
    /// NULL reads as the empty string.
    pub fn column_text(&self, index: usize) -> Cow<'_, str> {
        String::from_utf8_lossy(self.column_text_bytes(index))
    }

    /// Column as raw text bytes, full byte length, embedded NULs included.
    /// BLOB values are returned as stored.
    pub fn column_text_bytes(&self, index: usize) -> &[u8] {
        let raw = self.row(index);
        // Text access on a BLOB may move its buffer to append a NUL, which
        // would invalidate slices already handed out by column_blob.
        match ColumnType::from_code(raw.column_type(index)) {
            ColumnType::Blob => unsafe { raw.column_blob(index) },
            _ => unsafe { raw.column_text(index) },
        }
    }

    /// Column as a blob. NULL reads as an empty slice.
    pub fn column_blob(&self, index: usize) -> &[u8] {
        let raw = self.row(index);
        unsafe { raw.column_blob(index) }
    }

    /// Copies the column's bytes into `buf`, returning how many were copied.
    pub fn column_bytes(&self, index: usize, buf: &mut [u8]) -> usize {
        let data = self.column_blob(index);
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        n
    }

    /// Byte length of the current value (text or blob representation).
    pub fn column_len(&self, index: usize) -> usize {
        match self.column_type(index) {
            ColumnType::Null => 0,
            ColumnType::Blob => self.column_blob(index).len(),
            _ => self.column_text_bytes(index).len(),
        }
    }

    /// Value of the column called `name`, if the result has one.
    pub fn get_value(&self, name: &str) -> Option<ValueRef<'_>> {
        self.column_index(name).map(|i| self.column_value(i))
    }
}

fn column_names_of(raw: RawStmt) -> Vec<String> {
    (0..raw.column_count()).map(|i| raw.column_name(i)).collect()
}

impl Drop for Statement {
    fn drop(&mut self) {
        if let Err(err) = self.finalize() {
            warn!(sql = %self.sql, error = %err, "failed to finalize statement on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ResultCode;
    use crate::test_utils::{memory_connection, setup_test_table};

    #[test]
    fn test_step_yields_rows_in_order() {
        let conn = memory_connection();
        setup_test_table(&conn);

        let mut stmt = conn.prepare("SELECT id, name, value FROM test ORDER BY id").unwrap();
        assert_eq!(stmt.column_names(), ["id", "name", "value"]);

        let mut names = Vec::new();
        while stmt.step().unwrap() {
            names.push(stmt.column_value(1).to_value());
        }
        assert_eq!(
            names,
            vec![Value::from("Alice"), Value::from("Bob"), Value::Null]
        );
        assert_eq!(stmt.state(), StatementState::Done);
        // Done is sticky until reset.
        assert!(!stmt.step().unwrap());
    }

    #[test]
    fn test_reset_reproduces_rows() {
        let conn = memory_connection();
        setup_test_table(&conn);

        let mut stmt = conn.prepare("SELECT name FROM test WHERE value > ?1 ORDER BY id").unwrap();
        stmt.bind_float(1, 100.0).unwrap();

        let collect = |stmt: &mut Statement| {
            let mut rows = Vec::new();
            while stmt.step().unwrap() {
                rows.push(stmt.column_text(0).into_owned());
            }
            rows
        };
        let first = collect(&mut stmt);
        stmt.reset();
        let second = collect(&mut stmt);
        assert_eq!(first, vec!["Alice", "Bob"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_bind_by_name_with_and_without_prefix() {
        let conn = memory_connection();
        let mut stmt = conn.prepare("SELECT :a + @b").unwrap();
        assert_eq!(stmt.bind_parameter_count(), 2);
        assert_eq!(stmt.bind_parameter_name(1).as_deref(), Some(":a"));

        stmt.bind_int64(":a", 40).unwrap();
        stmt.bind_int64("b", 2).unwrap();
        assert!(stmt.step().unwrap());
        assert_eq!(stmt.column_int64(0), 42);
    }

    #[test]
    fn test_bind_unknown_parameter_is_range_error() {
        let conn = memory_connection();
        let mut stmt = conn.prepare("SELECT ?1").unwrap();

        let err = stmt.bind_int64(2, 1).unwrap_err();
        assert!(matches!(err, Error::Range(_)));
        assert_eq!(err.code(), ResultCode::RANGE);

        assert!(matches!(stmt.bind_int64(0, 1), Err(Error::Range(_))));
        assert!(matches!(stmt.bind_text(":missing", "x"), Err(Error::Range(_))));
    }

    #[test]
    fn test_bind_while_on_row_resets() {
        let conn = memory_connection();
        let mut stmt = conn.prepare("SELECT ?1").unwrap();
        stmt.bind_int64(1, 1).unwrap();
        assert!(stmt.step().unwrap());
        assert_eq!(stmt.state(), StatementState::Row);

        stmt.bind_int64(1, 2).unwrap();
        assert_eq!(stmt.state(), StatementState::Ready);
        assert!(stmt.step().unwrap());
        assert_eq!(stmt.column_int64(0), 2);
    }

    #[test]
    fn test_text_keeps_embedded_nul_and_length() {
        let conn = memory_connection();
        let mut stmt = conn.prepare("SELECT ?1, ?2").unwrap();
        stmt.bind_text(1, "a\0bc").unwrap();
        stmt.bind_bytes(2, &[]).unwrap();
        assert!(stmt.step().unwrap());

        assert_eq!(stmt.column_len(0), 4);
        assert_eq!(stmt.column_text_bytes(0), b"a\0bc");
        assert_eq!(stmt.column_type(1), ColumnType::Blob);
        assert_eq!(stmt.column_len(1), 0);
    }

    #[test]
    fn test_null_is_not_zero() {
        let conn = memory_connection();
        let mut stmt = conn.prepare("SELECT NULL, 0, ''").unwrap();
        assert!(stmt.step().unwrap());
        assert_eq!(stmt.column_type(0), ColumnType::Null);
        assert_eq!(stmt.column_type(1), ColumnType::Integer);
        assert_eq!(stmt.column_type(2), ColumnType::Text);
        assert_eq!(stmt.column_len(0), 0);
    }

    #[test]
    fn test_column_bytes_copies_prefix() {
        let conn = memory_connection();
        let mut stmt = conn.prepare("SELECT X'0102030405'").unwrap();
        assert!(stmt.step().unwrap());
        let mut buf = [0u8; 3];
        assert_eq!(stmt.column_bytes(0, &mut buf), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(stmt.column_len(0), 5);
    }

    #[test]
    fn test_get_value_by_name() {
        let conn = memory_connection();
        let mut stmt = conn.prepare("SELECT 1 AS one, 'two' AS two").unwrap();
        assert!(stmt.step().unwrap());
        assert_eq!(stmt.get_value("two").and_then(|v| v.as_str()), Some("two"));
        assert!(stmt.get_value("three").is_none());
    }

    #[test]
    fn test_constraint_error_is_sticky_until_reset() {
        let conn = memory_connection();
        crate::exec::exec_script(&conn, "CREATE TABLE u (id INTEGER PRIMARY KEY, k TEXT UNIQUE); INSERT INTO u (k) VALUES ('a');").unwrap();

        let mut stmt = conn.prepare("INSERT INTO u (k) VALUES (?1)").unwrap();
        stmt.bind_text(1, "a").unwrap();
        let err = stmt.step().unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
        assert_eq!(err.code().primary(), ResultCode::CONSTRAINT);
        assert!(err.code().is_extended());
        assert_eq!(stmt.state(), StatementState::Failed);
        assert_eq!(stmt.step().unwrap_err(), err);

        stmt.reset();
        stmt.bind_text(1, "b").unwrap();
        assert!(!stmt.step().unwrap());
        assert_eq!(conn.changes(), 1);
    }

    #[test]
    fn test_transient_finalizes_on_done() {
        let conn = memory_connection();
        let (mut stmt, _) = conn.prepare_transient("SELECT 1").unwrap();
        assert_eq!(conn.open_statements(), 1);
        assert!(stmt.step().unwrap());
        assert!(!stmt.step().unwrap());
        assert!(stmt.is_finalized());
        assert_eq!(conn.open_statements(), 0);
        // Still reports Done without touching the released handle.
        assert!(!stmt.step().unwrap());
    }

    #[test]
    fn test_transient_finalizes_on_error() {
        let conn = memory_connection();
        let (mut stmt, _) = conn.prepare_transient("SELECT abs(-9223372036854775807 - 1)").unwrap();
        assert!(stmt.step().is_err());
        assert!(stmt.is_finalized());
        assert_eq!(conn.open_statements(), 0);
    }

    #[test]
    fn test_transient_finalizes_on_early_return() {
        fn first_value(conn: &crate::Connection) -> Result<i64> {
            let (mut stmt, _) = conn.prepare_transient("SELECT 5 UNION ALL SELECT 6")?;
            stmt.step()?;
            // Leave without consuming the remaining row.
            Ok(stmt.column_int64(0))
        }

        let conn = memory_connection();
        assert_eq!(first_value(&conn).unwrap(), 5);
        assert_eq!(conn.open_statements(), 0);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let conn = memory_connection();
        let mut stmt = conn.prepare("SELECT 1").unwrap();
        stmt.finalize().unwrap();
        stmt.finalize().unwrap();
        assert!(stmt.is_finalized());
    }

    #[test]
    #[should_panic(expected = "used after finalize")]
    fn test_use_after_finalize_panics() {
        let conn = memory_connection();
        let mut stmt = conn.prepare("SELECT 1").unwrap();
        stmt.finalize().unwrap();
        stmt.reset();
    }

    #[test]
    #[should_panic(expected = "in state Ready")]
    fn test_column_before_step_panics() {
        let conn = memory_connection();
        let stmt = conn.prepare("SELECT 1").unwrap();
        stmt.column_int64(0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_column_past_end_panics() {
        let conn = memory_connection();
        let mut stmt = conn.prepare("SELECT 1").unwrap();
        assert!(stmt.step().unwrap());
        stmt.column_int64(1);
    }

    #[test]
    fn test_blob_slice_stays_valid_across_text_reads() {
        let conn = memory_connection();
        let mut stmt = conn.prepare("SELECT randomblob(64)").unwrap();
        assert!(stmt.step().unwrap());
        assert_eq!(stmt.column_type(0), ColumnType::Blob);

        let blob = stmt.column_blob(0);
        let text = stmt.column_text_bytes(0);
        assert_eq!(text.as_ptr(), blob.as_ptr());
        let _ = stmt.column_text(0);
        let _ = stmt.column_len(0);

        assert_eq!(stmt.column_blob(0).as_ptr(), blob.as_ptr());
        assert_eq!(blob.len(), 64);
        assert_eq!(blob, text);
    }

    #[test]
    fn test_columns_follow_schema_change_before_step() {
        let conn = memory_connection();
        crate::exec::exec_script(&conn, "CREATE TABLE t (a); INSERT INTO t VALUES (1);").unwrap();

        let mut stmt = conn.prepare("SELECT * FROM t").unwrap();
        assert_eq!(stmt.column_count(), 1);
        crate::exec::exec_script(&conn, "ALTER TABLE t ADD COLUMN b DEFAULT 7").unwrap();

        assert!(stmt.step().unwrap());
        assert_eq!(stmt.column_count(), 2);
        assert_eq!(stmt.column_names(), ["a", "b"]);
        assert_eq!(stmt.column_int64(1), 7);
        assert_eq!(stmt.get_value("b").map(|v| v.to_value()), Some(Value::from(7)));
    }
}
