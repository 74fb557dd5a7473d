//! Thin wrappers over the SQLite C handles.
//!
//! This is the only module that dereferences database, statement and blob
//! handles. Every wrapper is a `Copy` newtype around a non-null pointer;
//! ownership and lifecycle are enforced one layer up by `Connection`,
//! `Statement` and `Blob`. Functions that hand out borrowed engine memory
//! are `unsafe` because the borrow is only valid until the next call that
//! may change the underlying value.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::ptr::{self, NonNull};
use std::slice;

use rusqlite::ffi;

use crate::core::error::{EngineError, ResultCode};

/// Signature of a progress handler installed on a database handle.
pub(crate) type ProgressFn = unsafe extern "C" fn(*mut c_void) -> c_int;

/// Runs `sqlite3_initialize` and returns its result code.
pub(crate) fn initialize() -> c_int {
    unsafe { ffi::sqlite3_initialize() }
}

/// Version string of the linked engine.
pub(crate) fn libversion() -> &'static str {
    // sqlite3_libversion returns a pointer to a static string.
    unsafe { CStr::from_ptr(ffi::sqlite3_libversion()) }
        .to_str()
        .unwrap_or("unknown")
}

/// Generic description of a result code (`sqlite3_errstr`).
pub(crate) fn errstr(rc: c_int) -> String {
    let msg = unsafe { ffi::sqlite3_errstr(rc) };
    if msg.is_null() {
        return format!("result code {}", rc);
    }
    unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
}

/// Converts a host string to a C string, refusing interior NULs.
pub(crate) fn to_cstring(what: &str, value: &str) -> Result<CString, EngineError> {
    CString::new(value).map_err(|_| {
        EngineError::new(
            ResultCode::MISUSE,
            format!("{} contains an interior NUL byte: {:?}", what, value),
        )
    })
}

pub(crate) fn len_to_c_int(what: &str, len: usize) -> Result<c_int, EngineError> {
    c_int::try_from(len).map_err(|_| {
        EngineError::new(
            ResultCode::TOOBIG,
            format!("{} of {} bytes exceeds the engine limit", what, len),
        )
    })
}

/// Builds a byte slice from an engine pointer, tolerating the NULL pointer
/// the engine returns for zero-length values.
pub(crate) unsafe fn bytes_from<'a>(ptr: *const c_void, len: c_int) -> &'a [u8] {
    if ptr.is_null() || len <= 0 {
        &[]
    } else {
        slice::from_raw_parts(ptr as *const u8, len as usize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawDb(NonNull<ffi::sqlite3>);

impl RawDb {
    /// Opens a database handle. On failure the partially opened handle is
    /// released before returning the diagnostic.
    pub(crate) fn open(path: &CStr, flags: c_int) -> Result<RawDb, EngineError> {
        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let rc = unsafe { ffi::sqlite3_open_v2(path.as_ptr(), &mut db, flags, ptr::null()) };
        match NonNull::new(db) {
            Some(handle) if rc == ffi::SQLITE_OK as c_int => Ok(RawDb(handle)),
            Some(handle) => {
                let raw = RawDb(handle);
                let err = raw.error_for(rc);
                unsafe { ffi::sqlite3_close(handle.as_ptr()) };
                Err(err)
            }
            None => Err(EngineError::new(ResultCode(rc), errstr(rc))),
        }
    }

    pub(crate) fn as_ptr(self) -> *mut ffi::sqlite3 {
        self.0.as_ptr()
    }

    /// Diagnostic for `rc` using the handle's current error message.
    pub(crate) fn error_for(self, rc: c_int) -> EngineError {
        let extended = unsafe { ffi::sqlite3_extended_errcode(self.as_ptr()) };
        // Prefer the extended code when it refines the returned primary code.
        let code = if extended & 0xff == rc & 0xff { extended } else { rc };
        let msg = unsafe { ffi::sqlite3_errmsg(self.as_ptr()) };
        let message = if msg.is_null() {
            errstr(code)
        } else {
            unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
        };
        EngineError::new(ResultCode(code), message)
    }

    fn check(self, rc: c_int) -> Result<(), EngineError> {
        if rc == ffi::SQLITE_OK as c_int {
            Ok(())
        } else {
            Err(self.error_for(rc))
        }
    }

    pub(crate) fn enable_extended_codes(self) {
        unsafe { ffi::sqlite3_extended_result_codes(self.as_ptr(), 1) };
    }

    /// Runs SQL text without producing rows (used for open-time pragmas).
    pub(crate) fn exec(self, sql: &CStr) -> Result<(), EngineError> {
        let rc = unsafe {
            ffi::sqlite3_exec(self.as_ptr(), sql.as_ptr(), None, ptr::null_mut(), ptr::null_mut())
        };
        self.check(rc)
    }

    pub(crate) fn busy_timeout(self, ms: c_int) {
        unsafe { ffi::sqlite3_busy_timeout(self.as_ptr(), ms) };
    }

    /// Installs (or with `None` removes) the progress handler.
    ///
    /// # Safety
    ///
    /// `arg` must stay valid for as long as the handler is installed.
    pub(crate) unsafe fn progress_handler(self, ops: c_int, handler: Option<(ProgressFn, *mut c_void)>) {
        match handler {
            Some((callback, arg)) => {
                ffi::sqlite3_progress_handler(self.as_ptr(), ops, Some(callback), arg)
            }
            None => ffi::sqlite3_progress_handler(self.as_ptr(), 0, None, ptr::null_mut()),
        }
    }

    /// Compiles the first statement of `sql`.
    ///
    /// Returns `None` when the text holds no statement (only whitespace or
    /// comments), together with the number of bytes consumed.
    pub(crate) fn prepare(self, sql: &str, flags: c_uint) -> Result<(Option<RawStmt>, usize), EngineError> {
        let len = len_to_c_int("SQL text", sql.len())?;
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();
        let rc = unsafe {
            ffi::sqlite3_prepare_v3(
                self.as_ptr(),
                sql.as_ptr() as *const c_char,
                len,
                flags,
                &mut stmt,
                &mut tail,
            )
        };
        self.check(rc)?;
        let consumed = if tail.is_null() {
            sql.len()
        } else {
            (tail as usize).saturating_sub(sql.as_ptr() as usize).min(sql.len())
        };
        Ok((NonNull::new(stmt).map(RawStmt), consumed))
    }

    pub(crate) fn blob_open(
        self,
        db: &CStr,
        table: &CStr,
        column: &CStr,
        rowid: i64,
        writable: bool,
    ) -> Result<RawBlob, EngineError> {
        let mut blob: *mut ffi::sqlite3_blob = ptr::null_mut();
        let rc = unsafe {
            ffi::sqlite3_blob_open(
                self.as_ptr(),
                db.as_ptr(),
                table.as_ptr(),
                column.as_ptr(),
                rowid,
                writable as c_int,
                &mut blob,
            )
        };
        self.check(rc)?;
        NonNull::new(blob)
            .map(RawBlob)
            .ok_or_else(|| EngineError::new(ResultCode::ERROR, "engine returned no blob handle"))
    }

    pub(crate) fn last_insert_rowid(self) -> i64 {
        unsafe { ffi::sqlite3_last_insert_rowid(self.as_ptr()) }
    }

    pub(crate) fn changes(self) -> i64 {
        unsafe { ffi::sqlite3_changes(self.as_ptr()) as i64 }
    }

    pub(crate) fn autocommit(self) -> bool {
        unsafe { ffi::sqlite3_get_autocommit(self.as_ptr()) != 0 }
    }

    /// Closes the handle; fails if statements or blobs are still open.
    pub(crate) fn close(self) -> Result<(), EngineError> {
        let rc = unsafe { ffi::sqlite3_close(self.as_ptr()) };
        self.check(rc)
    }

    /// Closes the handle, deferring the release until every statement and
    /// blob derived from it has been finalized.
    pub(crate) fn close_deferred(self) -> c_int {
        unsafe { ffi::sqlite3_close_v2(self.as_ptr()) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawStmt(NonNull<ffi::sqlite3_stmt>);

impl RawStmt {
    fn as_ptr(self) -> *mut ffi::sqlite3_stmt {
        self.0.as_ptr()
    }

    pub(crate) fn db(self) -> RawDb {
        // A prepared statement always belongs to a live (or zombie) handle.
        let db = unsafe { ffi::sqlite3_db_handle(self.as_ptr()) };
        RawDb(NonNull::new(db).expect("statement without a database handle"))
    }

    fn check(self, rc: c_int) -> Result<(), EngineError> {
        if rc == ffi::SQLITE_OK as c_int {
            Ok(())
        } else {
            Err(self.db().error_for(rc))
        }
    }

    pub(crate) fn step(self) -> c_int {
        unsafe { ffi::sqlite3_step(self.as_ptr()) }
    }

    pub(crate) fn reset(self) -> c_int {
        unsafe { ffi::sqlite3_reset(self.as_ptr()) }
    }

    pub(crate) fn clear_bindings(self) {
        unsafe { ffi::sqlite3_clear_bindings(self.as_ptr()) };
    }

    pub(crate) fn finalize(self) -> c_int {
        unsafe { ffi::sqlite3_finalize(self.as_ptr()) }
    }

    pub(crate) fn readonly(self) -> bool {
        unsafe { ffi::sqlite3_stmt_readonly(self.as_ptr()) != 0 }
    }

    pub(crate) fn parameter_count(self) -> usize {
        unsafe { ffi::sqlite3_bind_parameter_count(self.as_ptr()) as usize }
    }

    /// 1-based index of a named parameter, 0 if unknown.
    pub(crate) fn parameter_index(self, name: &CStr) -> usize {
        unsafe { ffi::sqlite3_bind_parameter_index(self.as_ptr(), name.as_ptr()) as usize }
    }

    pub(crate) fn parameter_name(self, index: usize) -> Option<String> {
        let name = unsafe { ffi::sqlite3_bind_parameter_name(self.as_ptr(), index as c_int) };
        if name.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
        }
    }

    pub(crate) fn bind_int64(self, index: usize, value: i64) -> Result<(), EngineError> {
        let rc = unsafe { ffi::sqlite3_bind_int64(self.as_ptr(), index as c_int, value) };
        self.check(rc)
    }

    pub(crate) fn bind_double(self, index: usize, value: f64) -> Result<(), EngineError> {
        let rc = unsafe { ffi::sqlite3_bind_double(self.as_ptr(), index as c_int, value) };
        self.check(rc)
    }

    pub(crate) fn bind_null(self, index: usize) -> Result<(), EngineError> {
        let rc = unsafe { ffi::sqlite3_bind_null(self.as_ptr(), index as c_int) };
        self.check(rc)
    }

    /// Binds text by explicit byte length; embedded NULs are preserved.
    pub(crate) fn bind_text(self, index: usize, value: &[u8]) -> Result<(), EngineError> {
        let len = len_to_c_int("text", value.len())?;
        let rc = unsafe {
            ffi::sqlite3_bind_text(
                self.as_ptr(),
                index as c_int,
                value.as_ptr() as *const c_char,
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        };
        self.check(rc)
    }

    pub(crate) fn bind_blob(self, index: usize, value: &[u8]) -> Result<(), EngineError> {
        if value.is_empty() {
            // A NULL data pointer would bind SQL NULL instead of an empty blob.
            return self.bind_zeroblob(index, 0);
        }
        let len = len_to_c_int("blob", value.len())?;
        let rc = unsafe {
            ffi::sqlite3_bind_blob(
                self.as_ptr(),
                index as c_int,
                value.as_ptr() as *const c_void,
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        };
        self.check(rc)
    }

    pub(crate) fn bind_zeroblob(self, index: usize, len: usize) -> Result<(), EngineError> {
        let len = len_to_c_int("zeroblob", len)?;
        let rc = unsafe { ffi::sqlite3_bind_zeroblob(self.as_ptr(), index as c_int, len) };
        self.check(rc)
    }

    pub(crate) fn column_count(self) -> usize {
        unsafe { ffi::sqlite3_column_count(self.as_ptr()) as usize }
    }

    pub(crate) fn column_name(self, index: usize) -> String {
        let name = unsafe { ffi::sqlite3_column_name(self.as_ptr(), index as c_int) };
        if name.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
        }
    }

    pub(crate) fn column_type(self, index: usize) -> c_int {
        unsafe { ffi::sqlite3_column_type(self.as_ptr(), index as c_int) }
    }

    pub(crate) fn column_int64(self, index: usize) -> i64 {
        unsafe { ffi::sqlite3_column_int64(self.as_ptr(), index as c_int) }
    }

    pub(crate) fn column_double(self, index: usize) -> f64 {
        unsafe { ffi::sqlite3_column_double(self.as_ptr(), index as c_int) }
    }

    /// Text of a column as raw bytes, with the full byte length honored.
    ///
    /// # Safety
    ///
    /// The slice is valid until the statement is stepped, reset, finalized
    /// or the column is converted to another representation.
    pub(crate) unsafe fn column_text<'a>(self, index: usize) -> &'a [u8] {
        // The pointer must be fetched before the length.
        let data = ffi::sqlite3_column_text(self.as_ptr(), index as c_int);
        let len = ffi::sqlite3_column_bytes(self.as_ptr(), index as c_int);
        bytes_from(data as *const c_void, len)
    }

    /// Blob of a column.
    ///
    /// # Safety
    ///
    /// Same validity window as [`RawStmt::column_text`].
    pub(crate) unsafe fn column_blob<'a>(self, index: usize) -> &'a [u8] {
        let data = ffi::sqlite3_column_blob(self.as_ptr(), index as c_int);
        let len = ffi::sqlite3_column_bytes(self.as_ptr(), index as c_int);
        bytes_from(data, len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawBlob(NonNull<ffi::sqlite3_blob>);

impl RawBlob {
    fn as_ptr(self) -> *mut ffi::sqlite3_blob {
        self.0.as_ptr()
    }

    pub(crate) fn bytes(self) -> usize {
        unsafe { ffi::sqlite3_blob_bytes(self.as_ptr()) as usize }
    }

    /// Reads `buf.len()` bytes at `offset`. Returns the engine result code.
    pub(crate) fn read(self, buf: &mut [u8], offset: usize) -> c_int {
        unsafe {
            ffi::sqlite3_blob_read(
                self.as_ptr(),
                buf.as_mut_ptr() as *mut c_void,
                buf.len() as c_int,
                offset as c_int,
            )
        }
    }

    /// Writes `buf` at `offset`. Returns the engine result code.
    pub(crate) fn write(self, buf: &[u8], offset: usize) -> c_int {
        unsafe {
            ffi::sqlite3_blob_write(
                self.as_ptr(),
                buf.as_ptr() as *const c_void,
                buf.len() as c_int,
                offset as c_int,
            )
        }
    }

    pub(crate) fn reopen(self, rowid: i64) -> c_int {
        unsafe { ffi::sqlite3_blob_reopen(self.as_ptr(), rowid) }
    }

    pub(crate) fn close(self) -> c_int {
        unsafe { ffi::sqlite3_blob_close(self.as_ptr()) }
    }
}
