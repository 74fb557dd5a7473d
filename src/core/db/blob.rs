/// Incremental Blob I/O
///
/// A [`Blob`] is a fixed-size window onto one cell. It can read and
/// overwrite bytes in place but never change the cell's length; size the
/// cell beforehand (for example with `zeroblob(n)`).
use std::fmt;
use std::io;
use std::rc::Rc;

use rusqlite::ffi;
use tracing::{debug, warn};

use super::connection::ConnInner;
use super::raw::{self, RawBlob};
use crate::core::error::{EngineError, Error, Phase, Result, ResultCode};

/// An open blob stream.
///
/// Besides the offset-based [`Blob::read_at`] and [`Blob::write_at`], a
/// blob implements [`io::Read`], [`io::Write`] and [`io::Seek`] over an
/// internal cursor starting at 0.
pub struct Blob {
    conn: Rc<ConnInner>,
    raw: Option<RawBlob>,
    table: String,
    column: String,
    rowid: i64,
    writable: bool,
    size: usize,
    pos: usize,
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("table", &self.table)
            .field("column", &self.column)
            .field("rowid", &self.rowid)
            .field("writable", &self.writable)
            .field("size", &self.size)
            .field("closed", &self.raw.is_none())
            .finish()
    }
}

impl Blob {
    pub(crate) fn open(
        conn: &Rc<ConnInner>,
        db: &str,
        table: &str,
        column: &str,
        rowid: i64,
        writable: bool,
    ) -> Result<Blob> {
        let handle = conn.db();
        conn.checkpoint()?;
        let schema = if db.is_empty() { "main" } else { db };
        let cstr = |what: &str, value: &str| raw::to_cstring(what, value).map_err(|e| Error::classify(Phase::Other, e));
        let raw = handle
            .blob_open(
                &cstr("schema name", schema)?,
                &cstr("table name", table)?,
                &cstr("column name", column)?,
                rowid,
                writable,
            )
            .map_err(|e| Error::classify(Phase::BlobOpen, e))?;

        conn.blob_opened();
        let size = raw.bytes();
        debug!(table, column, rowid, writable, size, "opened blob");
        Ok(Blob {
            conn: Rc::clone(conn),
            raw: Some(raw),
            table: table.to_string(),
            column: column.to_string(),
            rowid,
            writable,
            size,
            pos: 0,
        })
    }

    fn raw(&self) -> RawBlob {
        match self.raw {
            Some(raw) => {
                self.conn.assert_open();
                raw
            }
            None => panic!(
                "sqlbridge: blob {}.{} (rowid {}) used after close",
                self.table, self.column, self.rowid
            ),
        }
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::range(format!(
                "blob range {}..{} exceeds size {}",
                offset,
                offset.saturating_add(len),
                self.size
            ))),
        }
    }

    fn engine_error(&self, rc: std::os::raw::c_int) -> Error {
        Error::classify(Phase::Other, self.conn.db().error_for(rc))
    }

    /// Size of the cell in bytes, fixed for the life of the handle.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn rowid(&self) -> i64 {
        self.rowid
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_closed(&self) -> bool {
        self.raw.is_none()
    }

    /// Fills `buf` with the bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// `Error::Range` if `offset + buf.len()` exceeds [`Blob::len`]; nothing
    /// is read in that case.
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> Result<()> {
        let raw = self.raw();
        self.check_range(offset, buf.len())?;
        if buf.is_empty() {
            return Ok(());
        }
        match raw.read(buf, offset) {
            ffi::SQLITE_OK => Ok(()),
            rc => Err(self.engine_error(rc)),
        }
    }

    /// Overwrites bytes starting at `offset` with `buf`.
    ///
    /// # Errors
    ///
    /// `Error::Range` if the write would extend past the end of the cell;
    /// the cell is left untouched. Writing through a read-only handle fails
    /// with the engine's `SQLITE_READONLY`.
    pub fn write_at(&self, buf: &[u8], offset: usize) -> Result<()> {
        let raw = self.raw();
        self.check_range(offset, buf.len())?;
        if buf.is_empty() {
            return Ok(());
        }
        match raw.write(buf, offset) {
            ffi::SQLITE_OK => Ok(()),
            rc => Err(self.engine_error(rc)),
        }
    }

    /// Points the handle at the same column of another row and rewinds the
    /// cursor. A failed reopen leaves the handle unusable for I/O; it must
    /// still be closed.
    pub fn reopen(&mut self, rowid: i64) -> Result<()> {
        let raw = self.raw();
        match raw.reopen(rowid) {
            ffi::SQLITE_OK => {
                self.rowid = rowid;
                self.size = raw.bytes();
                self.pos = 0;
                Ok(())
            }
            rc => {
                self.size = 0;
                Err(Error::classify(Phase::BlobOpen, self.conn.db().error_for(rc)))
            }
        }
    }

    /// Releases the handle. Idempotent.
    ///
    /// An error reports a failure of the final commit for a write made
    /// outside an explicit transaction; the handle is released regardless.
    pub fn close(&mut self) -> Result<()> {
        let Some(raw) = self.raw.take() else {
            return Ok(());
        };
        let rc = raw.close();
        self.conn.blob_closed();
        debug!(table = %self.table, rowid = self.rowid, "closed blob");
        if rc != ffi::SQLITE_OK {
            // The connection may already be closed here, so report the
            // code without consulting the handle.
            return Err(Error::classify(
                Phase::Other,
                EngineError::new(ResultCode(rc), raw::errstr(rc)),
            ));
        }
        Ok(())
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(table = %self.table, rowid = self.rowid, error = %err, "failed to close blob on drop");
        }
    }
}

impl io::Read for Blob {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.size.saturating_sub(self.pos));
        self.read_at(&mut buf[..n], self.pos)?;
        self.pos += n;
        Ok(n)
    }
}

impl io::Write for Blob {
    /// Writes as much of `buf` as fits before the end of the cell. At the
    /// end, returns `Ok(0)`, which `write_all` reports as `WriteZero`.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.size.saturating_sub(self.pos));
        self.write_at(&buf[..n], self.pos)?;
        self.pos += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for Blob {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(offset) => i128::from(offset),
            io::SeekFrom::End(delta) => self.size as i128 + i128::from(delta),
            io::SeekFrom::Current(delta) => self.pos as i128 + i128::from(delta),
        };
        if target < 0 || target > self.size as i128 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek to {} outside blob of size {}", target, self.size),
            ));
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        let kind = match &err {
            Error::Range(_) => io::ErrorKind::InvalidInput,
            Error::NotFound(_) => io::ErrorKind::NotFound,
            Error::Busy(_) | Error::Locked(_) => io::ErrorKind::WouldBlock,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
