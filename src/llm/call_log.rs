// JSON-lines log of every model attempt made by the executor
use super::executor::AttemptRecord;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

#[derive(Serialize)]
struct CallLogEntry<'a> {
    analysis_id: &'a str,
    stage: &'a str,
    #[serde(flatten)]
    attempt: &'a AttemptRecord,
    timestamp: String,
}

pub struct CallLogger {
    writer: Option<Mutex<BufWriter<File>>>,
}

impl CallLogger {
    pub fn new(log_file: Option<PathBuf>) -> Self {
        let writer = log_file.and_then(|path| {
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => Some(Mutex::new(BufWriter::new(file))),
                Err(e) => {
                    warn!("Failed to open call log file {:?}: {}", path, e);
                    None
                }
            }
        });

        Self { writer }
    }

    pub fn disabled() -> Self {
        Self { writer: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    pub fn record(&self, analysis_id: &str, stage: &str, attempt: &AttemptRecord) {
        let Some(writer) = &self.writer else {
            return;
        };

        let entry = CallLogEntry {
            analysis_id,
            stage,
            attempt,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize call log entry for stage {}: {}", stage, e);
                return;
            }
        };

        if let Ok(mut writer) = writer.lock() {
            if let Err(e) = writeln!(writer, "{}", json) {
                warn!("Failed to write call log entry: {}", e);
            }
            if let Err(e) = writer.flush() {
                warn!("Failed to flush call log: {}", e);
            }
        }
    }
}

impl Default for CallLogger {
    fn default() -> Self {
        Self::disabled()
    }
}
