/// # Test Utilities Module
///
/// Shared fixtures for the unit tests:
/// - one-time tracing setup routed through the test writer
/// - in-memory and file-backed database fixtures
/// - a `rusqlite` oracle connection for checking what actually reached disk
use std::path::PathBuf;
use std::sync::Once;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::core::db::{Connection, OpenMode};
use crate::exec::exec_script;

static TRACING: Once = Once::new();

/// Installs a `tracing` subscriber that writes through the test harness, so
/// log output only shows for failing tests. Safe to call from every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Opens a fresh private in-memory database.
pub fn memory_connection() -> Connection {
    init_tracing();
    Connection::open_in_memory().expect("Failed to open in-memory database")
}

/// Creates the `test` table used across the statement and exec tests:
///
/// | id | name  | value |
/// |----|-------|-------|
/// | 1  | Alice | 150.5 |
/// | 2  | Bob   | 200.0 |
/// | 3  | NULL  | 50.0  |
pub fn setup_test_table(conn: &Connection) {
    exec_script(
        conn,
        "CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT, value REAL);
         INSERT INTO test (id, name, value) VALUES (1, 'Alice', 150.5);
         INSERT INTO test (id, name, value) VALUES (2, 'Bob', 200.0);
         INSERT INTO test (id, name, value) VALUES (3, NULL, 50.0);",
    )
    .expect("Failed to create test table");
}

/// A database file in its own temporary directory, removed on drop.
pub struct TestDatabase {
    _dir: TempDir,
    pub path: PathBuf,
}

impl TestDatabase {
    pub fn new(name: &str) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join(format!("{}.db", name));
        TestDatabase { _dir: dir, path }
    }

    pub fn path_str(&self) -> &str {
        self.path.to_str().expect("temp path is not UTF-8")
    }

    pub fn open(&self) -> Connection {
        Connection::open(self.path_str(), OpenMode::ReadWriteCreate).expect("Failed to open test database")
    }

    /// An independent `rusqlite` connection on the same file.
    pub fn oracle(&self) -> rusqlite::Connection {
        rusqlite::Connection::open(&self.path).expect("Failed to open oracle connection")
    }
}

/// Measures how long `f` takes.
pub fn measure_execution<F, R>(f: F) -> (R, Duration)
where
    F: FnOnce() -> R,
{
    let start = Instant::now();
    let result = f();
    (result, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_fixture() {
        let conn = memory_connection();
        setup_test_table(&conn);
        assert_eq!(
            crate::exec::result_int64(&conn, "SELECT count(*) FROM test", &[]).unwrap(),
            3
        );
    }

    #[test]
    fn test_file_fixture_is_visible_to_oracle() {
        let db = TestDatabase::new("fixture");
        let conn = db.open();
        setup_test_table(&conn);

        let oracle = db.oracle();
        let name: String = oracle
            .query_row("SELECT name FROM test WHERE id = 2", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "Bob");
    }
}
