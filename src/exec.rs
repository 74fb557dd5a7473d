/// Statement Execution Helpers
///
/// Thin conveniences over [`Statement`] for the common patterns: run a
/// query once and visit its rows, run a cached query, run a script, or
/// fetch a single value. Every helper releases or resets the statements it
/// uses on all exit paths, including errors returned by the row callback.
use tracing::debug;

use crate::core::db::connection::reject_trailing;
use crate::core::db::{Connection, Statement, StatementKind, Value};
use crate::core::{EngineError, Error, Result, ResultCode};

/// Prepares `sql` as a transient statement, binds `params` to ?1..?N, and
/// calls `on_row` for every result row.
///
/// The statement is finalized when this returns, whatever the outcome.
/// Text after the first statement is rejected.
///
/// # Examples
///
/// ```
/// use sqlbridge::{exec::exec_transient, Connection};
///
/// let conn = Connection::open_in_memory()?;
/// let mut greetings = Vec::new();
/// exec_transient(&conn, "SELECT 'hello, world'", &[], |stmt| {
///     greetings.push(stmt.column_text(0).into_owned());
///     Ok(())
/// })?;
/// assert_eq!(greetings, ["hello, world"]);
/// # Ok::<_, sqlbridge::Error>(())
/// ```
pub fn exec_transient<F>(conn: &Connection, sql: &str, params: &[Value], on_row: F) -> Result<()>
where
    F: FnMut(&Statement) -> Result<()>,
{
    let (mut stmt, trailing) = conn.prepare_with(sql, StatementKind::Transient)?;
    reject_trailing(sql, trailing)?;
    run(&mut stmt, params, on_row)
}

/// Like [`exec_transient`], but uses the connection's statement cache so
/// repeated calls with the same SQL skip compilation. The cached statement
/// is reset before returning.
pub fn exec<F>(conn: &mut Connection, sql: &str, params: &[Value], on_row: F) -> Result<()>
where
    F: FnMut(&Statement) -> Result<()>,
{
    let stmt = conn.prep(sql)?;
    let outcome = run(stmt, params, on_row);
    stmt.reset();
    outcome
}

fn run<F>(stmt: &mut Statement, params: &[Value], mut on_row: F) -> Result<()>
where
    F: FnMut(&Statement) -> Result<()>,
{
    stmt.bind_values(params)?;
    while stmt.step()? {
        on_row(&*stmt)?;
    }
    Ok(())
}

/// Runs every statement in `script` in order, each as a transient
/// statement, discarding result rows. Stops at the first failure; the
/// statements before it stay applied.
pub fn exec_script(conn: &Connection, script: &str) -> Result<()> {
    let mut rest = script;
    let mut count = 0usize;
    loop {
        let (stmt, consumed) = conn.compile(rest, StatementKind::Transient)?;
        let Some(mut stmt) = stmt else {
            break;
        };
        while stmt.step()? {}
        count += 1;
        rest = &rest[consumed..];
    }
    debug!(statements = count, "executed script");
    Ok(())
}

/// Runs `sql` and returns the single row's statement, positioned on it.
fn single_row(conn: &Connection, sql: &str, params: &[Value]) -> Result<Statement> {
    let (mut stmt, _) = conn.prepare_with(sql, StatementKind::Transient)?;
    stmt.bind_values(params)?;
    if !stmt.step()? {
        return Err(Error::NotFound(EngineError::new(
            ResultCode::NOTFOUND,
            format!("no rows returned by {:?}", stmt.sql()),
        )));
    }
    Ok(stmt)
}

/// Checks that `stmt` has no row after the current one.
fn ensure_last(stmt: &mut Statement) -> Result<()> {
    if stmt.step()? {
        return Err(Error::Engine(EngineError::new(
            ResultCode::ERROR,
            format!("more than one row returned by {:?}", stmt.sql()),
        )));
    }
    Ok(())
}

/// Runs a query expected to return exactly one row and returns its first
/// column as an integer.
///
/// # Errors
///
/// `Error::NotFound` when there is no row, `Error::Engine` when there is
/// more than one, or any error from preparing or stepping.
pub fn result_int64(conn: &Connection, sql: &str, params: &[Value]) -> Result<i64> {
    let mut stmt = single_row(conn, sql, params)?;
    let value = stmt.column_int64(0);
    ensure_last(&mut stmt)?;
    Ok(value)
}

pub fn result_bool(conn: &Connection, sql: &str, params: &[Value]) -> Result<bool> {
    result_int64(conn, sql, params).map(|v| v != 0)
}

pub fn result_float(conn: &Connection, sql: &str, params: &[Value]) -> Result<f64> {
    let mut stmt = single_row(conn, sql, params)?;
    let value = stmt.column_float(0);
    ensure_last(&mut stmt)?;
    Ok(value)
}

pub fn result_text(conn: &Connection, sql: &str, params: &[Value]) -> Result<String> {
    let mut stmt = single_row(conn, sql, params)?;
    let value = stmt.column_text(0).into_owned();
    ensure_last(&mut stmt)?;
    Ok(value)
}
