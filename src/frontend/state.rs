//! Frontend state types
//!
//! Panels never touch the session directly. They return [`AppAction`]s that
//! the app applies after the frame is laid out.

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::acquisition::RunEvent;
use crate::config::AppConfig;
use crate::error::MeterLogError;
use crate::view::{ViewBounds, ViewMode};

/// Number of status messages kept
pub const STATUS_HISTORY: usize = 200;

/// Actions any panel can emit
#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    Start,
    Stop,
    Clear,
    SaveVisible,
    SetViewMode(ViewMode),
    SetManualBounds(ViewBounds),
    ShowStatistics(bool),
    ApplyConfig(Box<AppConfig>),
    RetryFinalization(PathBuf),
    RecoverOrphans,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub time: DateTime<Local>,
    pub severity: Severity,
    pub text: String,
}

/// Rolling log of user-facing messages
#[derive(Debug, Default)]
pub struct StatusLog {
    messages: VecDeque<StatusMessage>,
}

impl StatusLog {
    pub fn push(&mut self, severity: Severity, text: impl Into<String>) {
        if self.messages.len() >= STATUS_HISTORY {
            self.messages.pop_front();
        }
        self.messages.push_back(StatusMessage {
            time: Local::now(),
            severity,
            text: text.into(),
        });
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.push(Severity::Info, text);
    }

    pub fn warn(&mut self, text: impl Into<String>) {
        self.push(Severity::Warning, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(Severity::Error, text);
    }

    pub fn latest(&self) -> Option<&StatusMessage> {
        self.messages.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &StatusMessage> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Record a failed operation, as a warning when the operation can carry on
    pub fn report(&mut self, what: &str, error: &MeterLogError) {
        let text = format!("{}: {}", what, error);
        if error.is_fatal() {
            tracing::error!("{}", text);
            self.error(text);
        } else {
            tracing::warn!("{}", text);
            self.warn(text);
        }
    }

    /// Record a controller event
    pub fn record(&mut self, event: &RunEvent) {
        match event {
            RunEvent::Started { stem, buffer } => match buffer {
                Some(path) => self.info(format!("Run {} started, buffering to {}", stem, path.display())),
                None => self.info(format!("Run {} started without persistence", stem)),
            },
            RunEvent::PersistenceDegraded(message) => {
                self.warn(format!("Persistence lost, run continues in memory: {}", message))
            }
            RunEvent::Stopped { reason, samples } => {
                self.info(format!("Run stopped ({:?}) after {} samples", reason, samples))
            }
            RunEvent::FinalizationStarted { buffer } => {
                self.info(format!("Writing report for {}", buffer.display()))
            }
            RunEvent::Finalized { report, rows, .. } => {
                self.info(format!("Report saved to {} ({} rows)", report.display(), rows))
            }
            RunEvent::FinalizationFailed { buffer, error } => self.error(format!(
                "Report failed, buffer kept at {}: {}",
                buffer.display(),
                error
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use crate::types::StopReason;

    #[test]
    fn test_history_is_capped() {
        let mut log = StatusLog::default();
        for i in 0..(STATUS_HISTORY + 5) {
            log.info(format!("message {}", i));
        }
        assert_eq!(log.len(), STATUS_HISTORY);
        assert_eq!(
            log.latest().map(|m| m.text.as_str()),
            Some(format!("message {}", STATUS_HISTORY + 4).as_str())
        );
    }

    #[test]
    fn test_report_severity_follows_error_kind() {
        let mut log = StatusLog::default();
        log.report(
            "Reading failed",
            &MeterLogError::Measurement(DeviceError::ReadFailure("timeout".to_string())),
        );
        assert_eq!(log.latest().map(|m| m.severity), Some(Severity::Warning));

        log.report("Start failed", &MeterLogError::FinalizationInProgress);
        assert_eq!(log.latest().map(|m| m.severity), Some(Severity::Error));
        assert!(log
            .latest()
            .is_some_and(|m| m.text.starts_with("Start failed: ")));
    }

    #[test]
    fn test_failure_is_an_error() {
        let mut log = StatusLog::default();
        log.record(&RunEvent::Stopped {
            reason: StopReason::User,
            samples: 3,
        });
        log.record(&RunEvent::FinalizationFailed {
            buffer: PathBuf::from("m_0001.csv"),
            error: "disk full".to_string(),
        });
        assert_eq!(log.latest().map(|m| m.severity), Some(Severity::Error));
        assert!(log.latest().is_some_and(|m| m.text.contains("disk full")));
    }
}
