//! Property-based tests for the value bridge and statement lifecycle
//!
//! These tests verify through property-based testing that:
//! - Every value kind survives a bind / `SELECT ?` round trip unchanged,
//!   with integers and floats keeping their exact bit patterns
//! - Resetting a statement and stepping it again reproduces the same rows
//! - Blob writes outside the cell never modify it

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rusqlite::Connection as Oracle;
    use tempfile::NamedTempFile;

    use sqlbridge::exec::exec_script;
    use sqlbridge::{ColumnType, Connection, Error, OpenMode, Value};

    // Test infrastructure

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<i64>().prop_map(Value::Integer),
            prop_oneof![Just(i64::MIN), Just(i64::MAX), Just(0), Just(-1)].prop_map(Value::Integer),
            // NaN is stored by the engine as NULL.
            any::<f64>().prop_filter("NaN reads back as NULL", |f| !f.is_nan()).prop_map(Value::Float),
            prop_oneof![Just(f64::MIN_POSITIVE), Just(-0.0), Just(f64::INFINITY), Just(f64::MAX)]
                .prop_map(Value::Float),
            any::<String>().prop_map(Value::Text),
            "[a-z]{0,4}\\x00[a-z]{0,4}".prop_map(Value::Text),
            proptest::collection::vec(any::<u8>(), 0..256).prop_map(Value::Blob),
        ]
    }

    fn same_bits(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
            _ => a == b,
        }
    }

    proptest! {
        #[test]
        fn prop_bind_select_round_trip(value in arb_value()) {
            let conn = Connection::open_in_memory().unwrap();
            let mut stmt = conn.prepare("SELECT ?1").unwrap();
            stmt.bind(1, &value).unwrap();
            prop_assert!(stmt.step().unwrap());

            let read = stmt.column_value(0).to_value();
            prop_assert!(same_bits(&value, &read), "bound {:?}, read {:?}", value, read);
            prop_assert_eq!(stmt.column_type(0), value.column_type());
            if let Value::Text(s) = &value {
                prop_assert_eq!(stmt.column_len(0), s.len());
            }
            if let Value::Blob(b) = &value {
                prop_assert_eq!(stmt.column_len(0), b.len());
            }
            prop_assert!(!stmt.step().unwrap());
        }

        #[test]
        fn prop_reset_reproduces_rows(rows in proptest::collection::vec(any::<i64>(), 0..20), threshold in any::<i64>()) {
            let conn = Connection::open_in_memory().unwrap();
            exec_script(&conn, "CREATE TABLE t (seq INTEGER PRIMARY KEY, v INTEGER)").unwrap();
            let mut insert = conn.prepare("INSERT INTO t (v) VALUES (?1)").unwrap();
            for v in &rows {
                insert.bind_int64(1, *v).unwrap();
                prop_assert!(!insert.step().unwrap());
                insert.reset();
            }

            let mut query = conn.prepare("SELECT v FROM t WHERE v >= ?1").unwrap();
            query.bind_int64(1, threshold).unwrap();
            let mut collect = || {
                let mut out = Vec::new();
                while query.step().unwrap() {
                    out.push(query.column_int64(0));
                }
                query.reset();
                out
            };
            let first = collect();
            let second = collect();
            let expected: Vec<i64> = rows.iter().copied().filter(|v| *v >= threshold).collect();
            prop_assert_eq!(&first, &expected);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_blob_range_checks(len in 0usize..64, offset in 0usize..96, write_len in 0usize..96) {
            let file = NamedTempFile::new().unwrap();
            let path = file.path().to_str().unwrap().to_string();
            let mut conn = Connection::open(&path, OpenMode::ReadWriteCreate).unwrap();
            exec_script(&conn, &format!("CREATE TABLE b (data BLOB); INSERT INTO b VALUES (zeroblob({}));", len)).unwrap();

            let mut blob = conn.open_blob("main", "b", "data", 1, true).unwrap();
            let payload = vec![0xabu8; write_len];
            let result = blob.write_at(&payload, offset);
            let fits = offset + write_len <= len;
            if fits {
                prop_assert!(result.is_ok());
            } else {
                prop_assert!(matches!(result, Err(Error::Range(_))));
            }
            blob.close().unwrap();
            conn.close().unwrap();

            let stored: Vec<u8> = Oracle::open(&path)
                .unwrap()
                .query_row("SELECT data FROM b", [], |row| row.get(0))
                .unwrap();
            let mut expected = vec![0u8; len];
            if fits {
                expected[offset..offset + write_len].fill(0xab);
            }
            prop_assert_eq!(stored, expected);
        }
    }

    #[test]
    fn test_boundary_values_keep_bits() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?1, ?2, ?3").unwrap();
        stmt.bind_int64(1, i64::MIN).unwrap();
        stmt.bind_float(2, -0.0).unwrap();
        stmt.bind_float(3, f64::from_bits(1)).unwrap();
        assert!(stmt.step().unwrap());

        assert_eq!(stmt.column_int64(0), i64::MIN);
        assert_eq!(stmt.column_float(1).to_bits(), (-0.0f64).to_bits());
        assert_eq!(stmt.column_float(2).to_bits(), 1);
    }

    #[test]
    fn test_nan_becomes_null() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?1").unwrap();
        stmt.bind_float(1, f64::NAN).unwrap();
        assert!(stmt.step().unwrap());
        assert_eq!(stmt.column_type(0), ColumnType::Null);
    }
}
