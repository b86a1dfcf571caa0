//! Final report
//!
//! A report is a logical workbook with two sheets:
//!
//! - `data` - header, one row per sample and an optional statistics block
//!   starting two rows below the last data row
//! - `chart` - elapsed time re-based to zero next to the value, plus a line
//!   chart referencing that range
//!
//! How the workbook is encoded on disk is up to the [`ReportWriter`]. The
//! shipped writer is [`JsonWorkbookWriter`].

pub mod json;

pub use json::{read_workbook, JsonWorkbookWriter};

use crate::config::ReportOptions;
use crate::device::DeviceParams;
use crate::error::{MeterLogError, Result};
use crate::types::{DurableRow, SummaryStats};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the data sheet
pub const DATA_SHEET: &str = "data";

/// Name of the chart sheet
pub const CHART_SHEET: &str = "chart";

/// Labels of the statistics block, in order
pub const STATS_LABELS: [&str; 6] = ["count", "mean", "std", "min", "max", "peak_peak"];

/// Writes a [`Workbook`] to a file
pub trait ReportWriter: Send + Sync {
    /// File extension without the dot
    fn extension(&self) -> &'static str;

    /// Write the whole workbook; on error no partial file is left at `path`
    fn write(&self, workbook: &Workbook, path: &Path) -> Result<()>;
}

/// One cell of a sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Empty,
    Int(i64),
    Number(f64),
    Text(String),
}

impl Cell {
    /// A numeric cell; non-finite values become text so every encoding can hold them
    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            Cell::Number(value)
        } else {
            Cell::Text(value.to_string())
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// Numeric value of the cell, parsing `NaN` and `inf` text back
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::Number(v) => Some(*v),
            Cell::Text(s) => s.parse().ok(),
            Cell::Empty => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Kind of an embedded chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartKind {
    Line,
}

/// Chart embedded in a sheet, referencing ranges of that sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    /// Range of the x values, e.g. `A2:A101`
    pub x_range: String,
    /// Range of the y values, e.g. `B2:B101`
    pub y_range: String,
    /// Top-left cell the chart is anchored at
    pub anchor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
    #[serde(default)]
    pub chart: Option<ChartSpec>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            chart: None,
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row)?.get(col)
    }
}

/// Header block describing the measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub title: String,
    /// `YYYY-MM-DD HH:MM:SS` local time the run started
    pub created: String,
    /// Function label, e.g. `DC voltage`
    pub function: String,
    pub unit: String,
    pub range: String,
    pub resolution: String,
    pub interval_ms: u64,
    /// Number of data rows, filled in when the report is built
    pub points: usize,
}

impl Default for ReportMetadata {
    fn default() -> Self {
        Self {
            title: "34401A measurement".to_string(),
            created: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            function: "Value".to_string(),
            unit: String::new(),
            range: String::new(),
            resolution: String::new(),
            interval_ms: 0,
            points: 0,
        }
    }
}

impl ReportMetadata {
    /// Metadata for a run started at `started`
    pub fn for_run(
        identity: &str,
        setup: &DeviceParams,
        interval_ms: u64,
        started: DateTime<Local>,
    ) -> Self {
        Self {
            title: format!("{} measurement", identity),
            created: started.format("%Y-%m-%d %H:%M:%S").to_string(),
            function: setup.function.label().to_string(),
            unit: setup.function.unit().to_string(),
            range: setup.range.clone(),
            resolution: setup.resolution.label().to_string(),
            interval_ms,
            points: 0,
        }
    }

    /// Metadata for a buffer found on disk without its run settings
    pub fn recovered(buffer: &Path) -> Self {
        let name = buffer
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            title: format!("Recovered measurement {}", name),
            ..Self::default()
        }
    }

    /// Column label of the value column, e.g. `DC voltage (V)`
    pub fn value_label(&self) -> String {
        if self.unit.is_empty() {
            self.function.clone()
        } else {
            format!("{} ({})", self.function, self.unit)
        }
    }
}

/// A complete report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    pub metadata: ReportMetadata,
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Parse the data rows of the `data` sheet back into buffer rows
    pub fn data_rows(&self) -> Result<Vec<DurableRow>> {
        let sheet = self
            .sheet(DATA_SHEET)
            .ok_or_else(|| MeterLogError::Serialization("report has no data sheet".to_string()))?;

        let invalid =
            |row: usize| MeterLogError::Serialization(format!("malformed data row {}", row + 1));

        let mut rows = Vec::with_capacity(self.metadata.points);
        for (i, row) in sheet.rows.iter().enumerate().skip(1) {
            // Data ends at the first empty row
            if row.is_empty() || matches!(row[0], Cell::Empty) {
                break;
            }
            let index = match row.first() {
                Some(Cell::Int(v)) => u64::try_from(*v).map_err(|_| invalid(i))?,
                _ => return Err(invalid(i)),
            };
            let elapsed = row.get(1).and_then(Cell::as_f64).ok_or_else(|| invalid(i))?;
            let value = row.get(2).and_then(Cell::as_f64).ok_or_else(|| invalid(i))?;
            let wallclock = row
                .get(3)
                .and_then(Cell::as_text)
                .unwrap_or_default()
                .to_string();
            rows.push(DurableRow {
                index,
                elapsed,
                value,
                wallclock,
            });
        }
        Ok(rows)
    }

    /// Value of a statistics entry in the `data` sheet
    pub fn stat(&self, label: &str) -> Option<f64> {
        self.sheet(DATA_SHEET)?
            .rows
            .iter()
            .find(|row| row.first().and_then(Cell::as_text) == Some(label))
            .and_then(|row| row.get(1))
            .and_then(Cell::as_f64)
    }
}

/// Build the report for a finished run
///
/// `rows` must be in index order, as returned by
/// [`read_rows`](crate::storage::read_rows).
pub fn build_report(
    rows: &[DurableRow],
    options: &ReportOptions,
    metadata: &ReportMetadata,
) -> Workbook {
    let mut metadata = metadata.clone();
    metadata.points = rows.len();

    let mut sheets = vec![data_sheet(rows, options, &metadata)];
    if options.include_chart && !rows.is_empty() {
        sheets.push(chart_sheet(rows, &metadata));
    }

    Workbook { metadata, sheets }
}

fn data_sheet(rows: &[DurableRow], options: &ReportOptions, metadata: &ReportMetadata) -> Sheet {
    let mut sheet = Sheet::new(DATA_SHEET);
    sheet.push_row(vec![
        Cell::text("#"),
        Cell::text("elapsed_s"),
        Cell::text(metadata.value_label()),
        Cell::text("wallclock"),
    ]);

    for row in rows {
        sheet.push_row(vec![
            Cell::Int(i64::try_from(row.index).unwrap_or(i64::MAX)),
            Cell::number(row.elapsed),
            Cell::number(row.value),
            Cell::text(row.wallclock.clone()),
        ]);
    }

    if options.include_stats {
        // One blank row, so the block starts two rows below the last data row
        sheet.push_row(Vec::new());

        let stats = SummaryStats::from_values(rows.iter().map(|r| r.value));
        let values = match stats {
            Some(s) => [s.mean, s.std, s.min, s.max, s.peak_peak()],
            None => [f64::NAN; 5],
        };
        let count = stats.map_or(0, |s| s.count);

        sheet.push_row(vec![
            Cell::text(STATS_LABELS[0]),
            Cell::Int(i64::try_from(count).unwrap_or(i64::MAX)),
        ]);
        for (label, value) in STATS_LABELS[1..].iter().zip(values) {
            sheet.push_row(vec![Cell::text(*label), Cell::number(value)]);
        }
    }

    sheet
}

fn chart_sheet(rows: &[DurableRow], metadata: &ReportMetadata) -> Sheet {
    let mut sheet = Sheet::new(CHART_SHEET);
    sheet.push_row(vec![Cell::text("elapsed_s"), Cell::text("value")]);

    let first = rows.first().map_or(0.0, |r| r.elapsed);
    for row in rows {
        sheet.push_row(vec![
            Cell::number(round_to(row.elapsed - first, 4)),
            Cell::number(row.value),
        ]);
    }

    let last = rows.len() + 1;
    sheet.chart = Some(ChartSpec {
        kind: ChartKind::Line,
        title: format!("{} trend", metadata.function),
        x_title: "elapsed_s".to_string(),
        y_title: metadata.value_label(),
        x_range: format!("A2:A{}", last),
        y_range: format!("B2:B{}", last),
        anchor: "D2".to_string(),
    });

    sheet
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
