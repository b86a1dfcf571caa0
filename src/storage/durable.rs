//! Durable append buffer
//!
//! A plain text log with one sample per line that survives a crash of the
//! rest of the application. Every append is written, flushed and synced to
//! disk before it returns, so once [`DurableBuffer::append`] reports a row as
//! written the row is on disk.
//!
//! # Format
//!
//! ```text
//! #, elapsed_s, value, wallclock
//! 1,0.0000,5.000123456,14:03:07.250
//! 2,0.5003,4.999871002,14:03:07.750
//! ```
//!
//! # Degraded Mode
//!
//! The first failed write returns the error once and switches the buffer to
//! degraded mode. Every later append is skipped and reports
//! [`AppendStatus::Degraded`], so the sampler keeps its cadence without
//! flooding the log.

use crate::error::{MeterLogError, Result};
use crate::types::{DurableRow, Sample};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// First line of every buffer file
pub const BUFFER_HEADER: &str = "#, elapsed_s, value, wallclock";

/// File extension of buffer files
pub const BUFFER_EXTENSION: &str = "csv";

/// Result of a single append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendStatus {
    /// The row is on disk with this index
    Written(u64),
    /// A previous write failed; persistence is off for this run
    Degraded,
    /// The buffer was closed for finalization
    Closed,
}

#[derive(Debug)]
struct Inner {
    writer: Option<BufWriter<File>>,
    next_index: u64,
    degraded: bool,
}

/// Append-only, flush-on-write sample log
#[derive(Debug)]
pub struct DurableBuffer {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl DurableBuffer {
    /// Create a new buffer file and write its header
    ///
    /// Fails if the file already exists: an existing buffer may hold a run
    /// whose finalization failed and must not be overwritten.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let to_error = |source| MeterLogError::DurableWrite {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(to_error)?;

        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", BUFFER_HEADER).map_err(to_error)?;
        writer.flush().map_err(to_error)?;
        writer.get_ref().sync_all().map_err(to_error)?;

        tracing::debug!("Opened durable buffer {:?}", path);

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                writer: Some(writer),
                next_index: 1,
                degraded: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffer over an existing file opened read-only, so every write fails
    #[cfg(test)]
    pub(crate) fn read_only(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                writer: Some(BufWriter::new(file)),
                next_index: 1,
                degraded: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a sample stamped with the current local time
    pub fn append(&self, sample: &Sample) -> Result<AppendStatus> {
        let wallclock = chrono::Local::now().format("%H:%M:%S%.3f").to_string();
        self.append_with_wallclock(sample, &wallclock)
    }

    /// Append a sample with an explicit wall clock string
    pub fn append_with_wallclock(&self, sample: &Sample, wallclock: &str) -> Result<AppendStatus> {
        let mut inner = self.lock();
        if inner.degraded {
            return Ok(AppendStatus::Degraded);
        }

        let index = inner.next_index;
        let Some(writer) = inner.writer.as_mut() else {
            return Ok(AppendStatus::Closed);
        };

        let line = format_row(index, sample, wallclock);
        let written = writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush())
            .and_then(|_| writer.get_ref().sync_data());

        match written {
            Ok(()) => {
                inner.next_index += 1;
                Ok(AppendStatus::Written(index))
            }
            Err(source) => {
                inner.degraded = true;
                inner.writer = None;
                Err(MeterLogError::DurableWrite {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }

    /// Stop accepting rows and release the file handle
    pub fn close(&self) -> Result<()> {
        let mut inner = self.lock();
        if let Some(mut writer) = inner.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
            tracing::debug!(
                "Closed durable buffer {:?} after {} rows",
                self.path,
                inner.next_index - 1
            );
        }
        Ok(())
    }

    /// Number of rows successfully written
    pub fn rows_written(&self) -> u64 {
        self.lock().next_index - 1
    }

    pub fn is_degraded(&self) -> bool {
        self.lock().degraded
    }

    pub fn is_closed(&self) -> bool {
        self.lock().writer.is_none()
    }

    /// Read back every row, holding the lock so no append interleaves
    pub fn read_rows(&self) -> Result<Vec<DurableRow>> {
        let mut inner = self.lock();
        if let Some(writer) = inner.writer.as_mut() {
            writer.flush()?;
        }
        read_rows(&self.path)
    }
}

/// Format one buffer line including the trailing newline
pub fn format_row(index: u64, sample: &Sample, wallclock: &str) -> String {
    format!(
        "{},{:.4},{:.9},{}\n",
        index, sample.elapsed, sample.value, wallclock
    )
}

/// Parse one buffer line
pub fn parse_row(line: &str) -> Result<DurableRow> {
    let invalid = || MeterLogError::Finalization(format!("malformed buffer row '{}'", line));

    let mut fields = line.split(',').map(str::trim);
    let index = fields.next().and_then(|f| f.parse().ok()).ok_or_else(invalid)?;
    let elapsed = fields.next().and_then(|f| f.parse().ok()).ok_or_else(invalid)?;
    let value = fields.next().and_then(|f| f.parse().ok()).ok_or_else(invalid)?;
    let wallclock = fields.next().ok_or_else(invalid)?.to_string();
    if fields.next().is_some() {
        return Err(invalid());
    }

    Ok(DurableRow {
        index,
        elapsed,
        value,
        wallclock,
    })
}

/// Read every complete row of a buffer file in index order
///
/// A final line without its newline was never acknowledged by an append
/// (the process died mid-write) and is dropped.
pub fn read_rows(path: impl AsRef<Path>) -> Result<Vec<DurableRow>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        MeterLogError::Finalization(format!("failed to read buffer {:?}: {}", path, e))
    })?;

    let mut lines: Vec<&str> = content.split('\n').collect();
    // split leaves either "" after the last newline or the unterminated tail
    if let Some(tail) = lines.pop() {
        if !tail.trim().is_empty() {
            tracing::warn!("Dropping unterminated last line of {:?}: '{}'", path, tail);
        }
    }

    let mut rows = Vec::with_capacity(lines.len());
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        rows.push(parse_row(line)?);
    }

    rows.sort_by_key(|row| row.index);

    let contiguous = rows
        .iter()
        .enumerate()
        .all(|(i, row)| row.index == i as u64 + 1);
    if !contiguous {
        tracing::warn!("Buffer {:?} has gaps or duplicate indices", path);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let buffer = DurableBuffer::open(&path).unwrap();

        for i in 0..3 {
            let status = buffer
                .append_with_wallclock(&Sample::new(i as f64 * 0.5, i as f64), "10:00:00.000")
                .unwrap();
            assert_eq!(status, AppendStatus::Written(i + 1));
        }
        assert_eq!(buffer.rows_written(), 3);

        let rows = buffer.read_rows().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].index, 3);
        assert_eq!(rows[2].elapsed, 1.0);
        assert_eq!(rows[2].value, 2.0);
        assert_eq!(rows[2].wallclock, "10:00:00.000");
    }

    #[test]
    fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let buffer = DurableBuffer::open(&path).unwrap();
        buffer
            .append_with_wallclock(&Sample::new(1.23456, 0.1234567891), "08:15:00.042")
            .unwrap();

        // Visible on disk without closing
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "#, elapsed_s, value, wallclock\n1,1.2346,0.123456789,08:15:00.042\n"
        );
    }

    #[test]
    fn test_nan_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let buffer = DurableBuffer::open(&path).unwrap();
        buffer.append(&Sample::new(0.0, f64::NAN)).unwrap();
        let rows = buffer.read_rows().unwrap();
        assert!(rows[0].value.is_nan());
    }

    #[test]
    fn test_open_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        std::fs::write(&path, "precious").unwrap();

        let err = DurableBuffer::open(&path).unwrap_err();
        assert!(matches!(err, MeterLogError::DurableWrite { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "precious");
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("run.csv");
        assert!(matches!(
            DurableBuffer::open(&path),
            Err(MeterLogError::DurableWrite { .. })
        ));
    }

    #[test]
    fn test_write_failure_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        std::fs::write(&path, format!("{}\n", BUFFER_HEADER)).unwrap();
        let buffer = DurableBuffer::read_only(&path).unwrap();

        let first = buffer.append(&Sample::new(0.0, 1.0));
        assert!(matches!(first, Err(MeterLogError::DurableWrite { .. })));
        assert!(buffer.is_degraded());

        for i in 1..4 {
            assert_eq!(
                buffer.append(&Sample::new(i as f64, 1.0)).unwrap(),
                AppendStatus::Degraded
            );
        }
        assert!(buffer.is_degraded());
        assert_eq!(buffer.rows_written(), 0);
        assert!(read_rows(&path).unwrap().is_empty());
    }

    #[test]
    fn test_closed_buffer_rejects_rows() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = DurableBuffer::open(dir.path().join("run.csv")).unwrap();
        buffer.append(&Sample::new(0.0, 1.0)).unwrap();
        buffer.close().unwrap();
        assert!(buffer.is_closed());
        assert_eq!(
            buffer.append(&Sample::new(0.5, 2.0)).unwrap(),
            AppendStatus::Closed
        );
        assert_eq!(buffer.read_rows().unwrap().len(), 1);
    }

    #[test]
    fn test_truncated_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crash.csv");
        std::fs::write(
            &path,
            "#, elapsed_s, value, wallclock\n1,0.0000,1.000000000,10:00:00.000\n2,0.5000,2.0",
        )
        .unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].index, 1);
    }

    #[test]
    fn test_malformed_row_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(
            &path,
            "#, elapsed_s, value, wallclock\n1,0.0000,oops,10:00:00.000\n",
        )
        .unwrap();

        assert!(matches!(
            read_rows(&path),
            Err(MeterLogError::Finalization(_))
        ));
    }

    #[test]
    fn test_rows_sorted_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order.csv");
        std::fs::write(
            &path,
            "#, elapsed_s, value, wallclock\n2,0.5000,2.000000000,a\n1,0.0000,1.000000000,b\n",
        )
        .unwrap();
        let rows = read_rows(&path).unwrap();
        assert_eq!(rows[0].index, 1);
        assert_eq!(rows[1].index, 2);
    }
}
