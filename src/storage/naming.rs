//! File naming for buffers and reports
//!
//! Names follow `<prefix>_<suffix>.<ext>` where the suffix is either a
//! `YYYYMMDD_HHMMSS` timestamp or a counter zero-padded to 4 digits. The
//! counter continues past the highest one already present in the output
//! directory, so restarting the application never reuses a name.

use crate::config::{FileSuffix, OutputConfig};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::durable::{BUFFER_EXTENSION, BUFFER_HEADER};

/// Generates file stems for runs
#[derive(Debug)]
pub struct FileNamer {
    directory: PathBuf,
    prefix: String,
    suffix: FileSuffix,
    /// Last counter handed out, guards against names issued before files exist
    last_counter: Mutex<Option<u32>>,
}

impl FileNamer {
    pub fn new(output: &OutputConfig) -> Self {
        Self {
            directory: output.directory.clone(),
            prefix: output.prefix.clone(),
            suffix: output.suffix,
            last_counter: Mutex::new(None),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Next file stem (name without extension)
    pub fn next_stem(&self, now: DateTime<Local>) -> String {
        match self.suffix {
            FileSuffix::Timestamp => {
                let base = format!("{}_{}", self.prefix, now.format("%Y%m%d_%H%M%S"));
                if !self.stem_taken(&base) {
                    return base;
                }
                // Second run within the same second
                (2..)
                    .map(|n| format!("{}_{}", base, n))
                    .find(|stem| !self.stem_taken(stem))
                    .unwrap_or(base)
            }
            FileSuffix::Counter => {
                let mut last = self.last_counter.lock().unwrap_or_else(PoisonError::into_inner);
                let on_disk = highest_counter(&self.directory, &self.prefix);
                let next = (*last).max(on_disk).map_or(1, |n| n + 1);
                *last = Some(next);
                format!("{}_{:04}", self.prefix, next)
            }
        }
    }

    /// Whether any file named `<stem>.<ext>` already exists
    fn stem_taken(&self, stem: &str) -> bool {
        let Ok(entries) = std::fs::read_dir(&self.directory) else {
            return false;
        };
        entries.filter_map(|entry| entry.ok()).any(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.split_once('.'))
                .is_some_and(|(name_stem, _)| name_stem == stem)
        })
    }

    pub fn path_for(&self, stem: &str, extension: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", stem, extension))
    }

    pub fn buffer_path(&self, stem: &str) -> PathBuf {
        self.path_for(stem, BUFFER_EXTENSION)
    }
}

/// Highest `<prefix>_NNNN` counter among the files in `directory`
///
/// Counters past 9999 widen to five or more digits and are still matched.
fn highest_counter(directory: &Path, prefix: &str) -> Option<u32> {
    let entries = std::fs::read_dir(directory).ok()?;
    let lead = format!("{}_", prefix);

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            let rest = name.strip_prefix(&lead)?;
            let (digits, _ext) = rest.split_once('.')?;
            if digits.len() >= 4 && digits.chars().all(|c| c.is_ascii_digit()) {
                digits.parse().ok()
            } else {
                None
            }
        })
        .max()
}

/// Buffer files left behind by crashed runs or failed finalizations
///
/// Only files that start with the buffer header are reported.
pub fn find_orphaned_buffers(directory: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(directory) else {
        return Vec::new();
    };
    let lead = format!("{}_", prefix);

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().and_then(|e| e.to_str()) == Some(BUFFER_EXTENSION)
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&lead))
        })
        .filter(|path| has_buffer_header(path))
        .collect();

    found.sort();
    found
}

fn has_buffer_header(path: &Path) -> bool {
    use std::io::{BufRead, BufReader};

    let Ok(file) = std::fs::File::open(path) else {
        return false;
    };
    let mut first = String::new();
    BufReader::new(file).read_line(&mut first).is_ok() && first.trim_end() == BUFFER_HEADER
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn output(dir: &Path, suffix: FileSuffix) -> OutputConfig {
        OutputConfig::new(dir).with_prefix("run").with_suffix(suffix)
    }

    #[test]
    fn test_timestamp_stem() {
        let dir = tempfile::tempdir().unwrap();
        let namer = FileNamer::new(&output(dir.path(), FileSuffix::Timestamp));
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(namer.next_stem(now), "run_20240309_070501");
    }

    #[test]
    fn test_timestamp_collision_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("run_20240309_070501.csv"), "").unwrap();
        let namer = FileNamer::new(&output(dir.path(), FileSuffix::Timestamp));
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(namer.next_stem(now), "run_20240309_070501_2");
    }

    #[test]
    fn test_counter_starts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let namer = FileNamer::new(&output(dir.path(), FileSuffix::Counter));
        assert_eq!(namer.next_stem(Local::now()), "run_0001");
        assert_eq!(namer.next_stem(Local::now()), "run_0002");
    }

    #[test]
    fn test_counter_continues_after_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("run_0007.json"), "{}").unwrap();
        std::fs::write(dir.path().join("run_0003.csv"), "").unwrap();
        std::fs::write(dir.path().join("other_0042.json"), "{}").unwrap();

        let namer = FileNamer::new(&output(dir.path(), FileSuffix::Counter));
        assert_eq!(namer.next_stem(Local::now()), "run_0008");
    }

    #[test]
    fn test_counter_continues_past_four_digits() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("run_9999.json"), "{}").unwrap();
        let namer = FileNamer::new(&output(dir.path(), FileSuffix::Counter));
        assert_eq!(namer.next_stem(Local::now()), "run_10000");

        std::fs::write(dir.path().join("run_10000.json"), "{}").unwrap();
        // A fresh namer, as after a restart, sees the wider counter on disk
        let restarted = FileNamer::new(&output(dir.path(), FileSuffix::Counter));
        assert_eq!(restarted.next_stem(Local::now()), "run_10001");
    }

    #[test]
    fn test_paths() {
        let dir = tempfile::tempdir().unwrap();
        let namer = FileNamer::new(&output(dir.path(), FileSuffix::Counter));
        assert_eq!(namer.buffer_path("run_0001"), dir.path().join("run_0001.csv"));
        assert_eq!(
            namer.path_for("run_0001", "json"),
            dir.path().join("run_0001.json")
        );
    }

    #[test]
    fn test_find_orphaned_buffers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("run_0002.csv"),
            format!("{}\n1,0.0000,1.000000000,10:00:00.000\n", BUFFER_HEADER),
        )
        .unwrap();
        std::fs::write(dir.path().join("run_0001.csv"), format!("{}\n", BUFFER_HEADER)).unwrap();
        std::fs::write(dir.path().join("run_0003.csv"), "a,b,c\n").unwrap();
        std::fs::write(dir.path().join("run_0004.json"), "{}").unwrap();

        let found = find_orphaned_buffers(dir.path(), "run");
        assert_eq!(
            found,
            vec![dir.path().join("run_0001.csv"), dir.path().join("run_0002.csv")]
        );
    }
}
