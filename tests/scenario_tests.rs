//! End-to-end scenarios exercising the public API the way an application
//! would: one-shot queries, user functions, blob streaming, cancellation
//! and connection lifecycle.

use std::io::Write;
use std::thread;
use std::time::Duration;

use regex::Regex;
use tempfile::TempDir;

use sqlbridge::exec::{exec_script, exec_transient, result_bool};
use sqlbridge::{Connection, Error, FunctionImpl, InterruptSignal, OpenMode, OpenOptions, StatementState, Value};

fn temp_db(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_str().unwrap().to_string()
}

#[test]
fn test_hello_world_transient() {
    let conn = Connection::open(":memory:", OpenMode::ReadWrite).unwrap();

    let mut lines = Vec::new();
    exec_transient(&conn, "SELECT 'hello, world';", &[], |stmt| {
        lines.push(stmt.column_text(0).into_owned());
        Ok(())
    })
    .unwrap();
    assert_eq!(lines, ["hello, world"]);

    let (mut stmt, _) = conn.prepare_transient("SELECT 'hello, world';").unwrap();
    let mut raw_lines = Vec::new();
    while stmt.step().unwrap() {
        raw_lines.push(stmt.column_text(0).into_owned());
    }
    assert_eq!(raw_lines, lines);
    assert!(stmt.is_finalized());
}

#[test]
fn test_regexp_function() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.create_function(
        "regexp",
        FunctionImpl::scalar(2, |ctx, args| {
            if ctx.aux_data::<Regex>(0).is_none() {
                let pattern = args[0].text_lossy();
                let re = Regex::new(&pattern).map_err(|e| format!("regexp: {}", e))?;
                ctx.set_aux_data(0, re);
            }
            let matched = match ctx.aux_data::<Regex>(0) {
                Some(re) => re.is_match(&args[1].text_lossy()),
                None => false,
            };
            Ok(Value::from(matched))
        })
        .deterministic(),
    )
    .unwrap();

    assert!(result_bool(&conn, "SELECT regexp('fo+', 'foo');", &[]).unwrap());
    assert!(!result_bool(&conn, "SELECT regexp('fo+', 'bar');", &[]).unwrap());
    // The infix operator maps onto the same function.
    assert!(result_bool(&conn, "SELECT 'foooo' REGEXP '^fo+$'", &[]).unwrap());

    let err = result_bool(&conn, "SELECT regexp('(', 'x')", &[]).unwrap_err();
    assert!(matches!(err, Error::Engine(_)));
    assert!(err.message().starts_with("regexp: "));

    // Cached statements go through the same function.
    let stmt = conn.prep("SELECT regexp(?1, ?2)").unwrap();
    stmt.bind_text(1, "^[0-9]+$").unwrap();
    stmt.bind_text(2, "12345").unwrap();
    assert!(stmt.step().unwrap());
    assert!(stmt.column_bool(0));
}

#[test]
fn test_blob_round_trip() {
    let conn = Connection::open(":memory:", OpenMode::ReadWrite).unwrap();
    exec_script(&conn, "CREATE TABLE blobs (myblob blob);").unwrap();

    let data = "Hello, World!";
    exec_transient(
        &conn,
        "INSERT INTO blobs (myblob) VALUES (zeroblob(?));",
        &[Value::from(data.len() as i64)],
        |_| Ok(()),
    )
    .unwrap();

    let mut blob = conn
        .open_blob("", "blobs", "myblob", conn.last_insert_rowid(), true)
        .unwrap();
    let written = blob.write(data.as_bytes()).unwrap();
    assert_eq!(written, data.len());
    blob.close().unwrap();

    let mut read = Vec::new();
    exec_transient(&conn, "SELECT myblob FROM blobs;", &[], |stmt| {
        let mut buf = vec![0u8; stmt.column_len(0)];
        stmt.column_bytes(0, &mut buf);
        read = buf;
        Ok(())
    })
    .unwrap();
    assert_eq!(read, data.as_bytes());
}

#[test]
fn test_interrupted_step_stays_failed_until_reset() {
    let conn = Connection::open_in_memory().unwrap();
    let signal = InterruptSignal::new();
    conn.set_interrupt(Some(signal.clone()));

    let worker = {
        let signal = signal.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(25));
            signal.trigger();
        })
    };

    let mut stmt = conn
        .prepare("WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT max(x) FROM c")
        .unwrap();
    let err = stmt.step().unwrap_err();
    worker.join().unwrap();

    assert!(matches!(err, Error::Interrupted(_)));
    assert_eq!(stmt.state(), StatementState::Failed);
    assert_eq!(stmt.step().unwrap_err(), err);

    // Replacing the signal takes effect at the next checkpoint.
    let previous = conn.set_interrupt(Some(InterruptSignal::new()));
    assert!(previous.map(|p| p.same_as(&signal)).unwrap_or(false));
    stmt.finalize().unwrap();

    let mut quick = conn.prepare("SELECT 1").unwrap();
    assert!(quick.step().unwrap());
}

#[test]
fn test_close_policy_is_uniform() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_db(&dir, "close.db");
    let mut conn = Connection::open(&path, OpenMode::ReadWriteCreate).unwrap();
    exec_script(&conn, "CREATE TABLE t (b BLOB); INSERT INTO t VALUES (zeroblob(4));").unwrap();

    let stmt = conn.prepare("SELECT b FROM t").unwrap();
    assert!(matches!(conn.close(), Err(Error::Busy(_))));
    drop(stmt);

    let mut blob = conn.open_blob("main", "t", "b", 1, false).unwrap();
    assert!(matches!(conn.close(), Err(Error::Busy(_))));
    blob.close().unwrap();

    conn.close().unwrap();
    conn.close().unwrap();
}

#[test]
fn test_connections_per_thread() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_db(&dir, "threads.db");
    {
        let conn = OpenOptions::new().wal(true).open(&path).unwrap();
        exec_script(&conn, "CREATE TABLE hits (worker INTEGER, n INTEGER);").unwrap();
    }

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let path = path.clone();
            thread::spawn(move || {
                let conn = OpenOptions::new()
                    .busy_timeout(Duration::from_secs(5))
                    .open(&path)
                    .unwrap();
                let mut insert = conn.prepare("INSERT INTO hits VALUES (?1, ?2)").unwrap();
                for n in 0..25 {
                    insert.bind_int64(1, worker).unwrap();
                    insert.bind_int64(2, n).unwrap();
                    assert!(!insert.step().unwrap());
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let oracle = rusqlite::Connection::open(&path).unwrap();
    let count: i64 = oracle.query_row("SELECT count(*) FROM hits", [], |row| row.get(0)).unwrap();
    assert_eq!(count, 100);
}

#[test]
fn test_read_only_connection_rejects_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_db(&dir, "ro.db");
    rusqlite::Connection::open(&path)
        .unwrap()
        .execute_batch("CREATE TABLE t (x); INSERT INTO t VALUES (X'00');")
        .unwrap();

    let conn = Connection::open(&path, OpenMode::ReadOnly).unwrap();
    let err = exec_script(&conn, "INSERT INTO t VALUES (2)").unwrap_err();
    assert_eq!(err.code().primary(), sqlbridge::ResultCode::READONLY);

    let mut blob = conn.open_blob("main", "t", "x", 1, false).unwrap();
    assert!(blob.write_all(b"x").is_err());
}
