use chrono::NaiveDateTime;
use log::{error, warn};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::data_sources::forecast_payload::TIMESTAMP_FORMAT;

/// Append-only text log of the events that stopped a run.
pub struct DiagnosticsLog {
    path: PathBuf,
}

impl DiagnosticsLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn record_rejection(&self, region: u32, code: &str, message: &str, at: NaiveDateTime) {
        self.append(&format!(
            "Region {}, error code {}: message {} time {}",
            region,
            code,
            message,
            at.format(TIMESTAMP_FORMAT)
        ));
    }

    pub fn record_exhausted(&self, region: u32, attempts: u32, at: NaiveDateTime) {
        self.append(&format!(
            "Region {}, server is not responding after {} attempts. Time: {}",
            region,
            attempts,
            at.format(TIMESTAMP_FORMAT)
        ));
    }

    pub fn record_storage_failure(
        &self,
        region: u32,
        err: &dyn std::fmt::Display,
        at: NaiveDateTime,
    ) {
        self.append(&format!(
            "Region {}, storage failure: {} time {}",
            region,
            err,
            at.format(TIMESTAMP_FORMAT)
        ));
    }

    fn append(&self, line: &str) {
        warn!("DIAGNOSTIC: {}", line);
        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", line) {
                    error!("Error writing to {}: {}", self.path.display(), e);
                }
            }
            Err(e) => error!("Error opening {}: {}", self.path.display(), e),
        }
    }
}
