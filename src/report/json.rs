//! JSON encoding of report workbooks

use super::{ReportWriter, Workbook};
use crate::error::{MeterLogError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes workbooks as pretty-printed JSON
///
/// The workbook is written to `<path>.tmp` first and renamed into place, so
/// a failed write never leaves a truncated report behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWorkbookWriter;

impl JsonWorkbookWriter {
    pub fn new() -> Self {
        Self
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

impl ReportWriter for JsonWorkbookWriter {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn write(&self, workbook: &Workbook, path: &Path) -> Result<()> {
        let tmp = temp_path(path);

        let written = (|| -> Result<()> {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, workbook)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            std::fs::rename(&tmp, path)?;
            Ok(())
        })();

        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(MeterLogError::Finalization(format!(
                "failed to write report {:?}: {}",
                path, e
            )));
        }

        tracing::debug!("Wrote report {:?}", path);
        Ok(())
    }
}

/// Read a report written by [`JsonWorkbookWriter`]
pub fn read_workbook(path: impl AsRef<Path>) -> Result<Workbook> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        MeterLogError::Serialization(format!("failed to read report {:?}: {}", path, e))
    })?;
    Ok(serde_json::from_str(&content)?)
}
