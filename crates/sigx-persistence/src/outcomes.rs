//! Daily JSON Lines writer for execution outcomes.
//!
//! Outcomes are buffered and flushed once `max_buffer_size` records are
//! pending. Files rotate on the outcome's completion date:
//! `outcomes_YYYY-MM-DD.jsonl`. Files are opened in append mode so a
//! restart never truncates earlier records.

use chrono::{TimeZone, Utc};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use sigx_core::ExecutionOutcome;

use crate::error::PersistenceResult;

/// Active writer state for daily file.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

pub struct OutcomeWriter {
    base_dir: PathBuf,
    buffer: Vec<ExecutionOutcome>,
    max_buffer_size: usize,
    active_writer: Option<ActiveWriter>,
}

fn date_for(ms: u64) -> String {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}

impl OutcomeWriter {
    pub fn new(base_dir: impl AsRef<Path>, max_buffer_size: usize) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        if let Err(e) = std::fs::create_dir_all(&base_dir) {
            warn!(?e, dir = %base_dir.display(), "Failed to create outcome directory");
        }

        Self {
            base_dir,
            buffer: Vec::with_capacity(max_buffer_size),
            max_buffer_size: max_buffer_size.max(1),
            active_writer: None,
        }
    }

    /// Path of the file holding outcomes completed on `date` (YYYY-MM-DD).
    #[must_use]
    pub fn file_for(&self, date: &str) -> PathBuf {
        self.base_dir.join(format!("outcomes_{}.jsonl", date))
    }

    pub fn record(&mut self, outcome: ExecutionOutcome) -> PersistenceResult<()> {
        self.buffer.push(outcome);
        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn close_active_writer(&mut self) {
        if let Some(mut active) = self.active_writer.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush outcome writer on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed outcome writer"
            );
        }
    }

    fn writer_for(&mut self, date: &str) -> PersistenceResult<&mut ActiveWriter> {
        if self.active_writer.as_ref().is_some_and(|w| w.date != date) {
            self.close_active_writer();
        }
        if self.active_writer.is_none() {
            let path = self.file_for(date);
            info!(path = %path.display(), "Opening outcome writer (append mode)");
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.active_writer = Some(ActiveWriter {
                writer: BufWriter::new(file),
                date: date.to_string(),
                records_written: 0,
            });
        }
        match self.active_writer.as_mut() {
            Some(active) => Ok(active),
            None => Err(std::io::Error::other("outcome writer not open").into()),
        }
    }

    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let pending = std::mem::take(&mut self.buffer);
        let count = pending.len();
        for (idx, outcome) in pending.iter().enumerate() {
            let date = date_for(outcome.completed_at_ms);
            let json = serde_json::to_string(outcome)?;
            let written = self.writer_for(&date).and_then(|active| {
                writeln!(active.writer, "{}", json)?;
                active.records_written += 1;
                Ok(())
            });
            if let Err(e) = written {
                // Keep what was not written for the next flush
                self.buffer.extend(pending[idx..].iter().cloned());
                return Err(e);
            }
        }

        if let Some(active) = self.active_writer.as_mut() {
            active.writer.flush()?;
        }
        debug!(records = count, "Flushed outcomes to JSON Lines");
        Ok(())
    }

    pub fn close(&mut self) -> PersistenceResult<()> {
        self.flush()?;
        self.close_active_writer();
        Ok(())
    }
}

impl Drop for OutcomeWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush outcomes on drop");
        }
        self.close_active_writer();
    }
}
