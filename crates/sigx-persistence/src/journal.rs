//! Append-only signal journal.
//!
//! Every queue mutation appends the full record as one JSON line and is
//! flushed before `put` returns. A purged record is appended as a tombstone
//! line. Loading replays the file, keeps the last line per signal id and
//! drops tombstoned ids; a torn or corrupt line only loses that one write.
//! `compact` rewrites the file with one line per live record, and runs on its
//! own once dead lines outnumber live ones past a threshold.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use sigx_core::{Signal, SignalId};
use sigx_queue::{QueueResult, SignalStore};

use crate::error::PersistenceResult;

const JOURNAL_FILE: &str = "signals.jsonl";

/// Dead lines tolerated before a purge triggers compaction.
pub const DEFAULT_COMPACT_THRESHOLD: usize = 1_000;

/// Marks a signal id as purged.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Tombstone {
    purged: SignalId,
}

struct JournalWriter {
    writer: BufWriter<File>,
    lines: usize,
    live: HashSet<SignalId>,
}

impl JournalWriter {
    fn dead_lines(&self) -> usize {
        self.lines.saturating_sub(self.live.len())
    }
}

pub struct SignalJournal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    compact_threshold: usize,
}

impl SignalJournal {
    /// Open (or create) `signals.jsonl` under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> PersistenceResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(JOURNAL_FILE);

        let (latest, lines) = if path.exists() {
            read_journal(&path)?
        } else {
            (HashMap::new(), 0)
        };
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(
            path = %path.display(),
            lines,
            live = latest.len(),
            "Opened signal journal (append mode)"
        );

        Ok(Self {
            path,
            writer: Mutex::new(JournalWriter {
                writer: BufWriter::new(file),
                lines,
                live: latest.into_keys().collect(),
            }),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
        })
    }

    /// Dead lines tolerated before a purge compacts the journal.
    #[must_use]
    pub fn with_compact_threshold(mut self, threshold: usize) -> Self {
        self.compact_threshold = threshold;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines currently in the journal, superseded versions and tombstones
    /// included.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.writer.lock().lines
    }

    fn append(&self, signal: &Signal) -> PersistenceResult<()> {
        let json = serde_json::to_string(signal)?;
        let mut active = self.writer.lock();
        writeln!(active.writer, "{}", json)?;
        active.writer.flush()?;
        active.lines += 1;
        active.live.insert(signal.id.clone());
        Ok(())
    }

    fn purge(&self, ids: &[SignalId]) -> PersistenceResult<()> {
        let compact = {
            let mut active = self.writer.lock();
            for id in ids {
                let json = serde_json::to_string(&Tombstone { purged: id.clone() })?;
                writeln!(active.writer, "{}", json)?;
                active.lines += 1;
                active.live.remove(id);
            }
            active.writer.flush()?;

            let dead = active.dead_lines();
            dead >= self.compact_threshold && dead > active.live.len()
        };
        if compact {
            self.compact()?;
        }
        Ok(())
    }

    /// Replay the journal, keeping the latest version of each live record.
    pub fn replay(&self) -> PersistenceResult<Vec<Signal>> {
        // Push any buffered bytes before reading back
        self.writer.lock().writer.flush()?;

        let (latest, _) = read_journal(&self.path)?;
        let mut records: Vec<Signal> = latest.into_values().collect();
        records.sort_by(|a, b| a.queued_at_ms.cmp(&b.queued_at_ms).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    /// Rewrite the journal with one line per live record.
    ///
    /// Writes a sibling temp file and renames it over the journal, so a crash
    /// mid-compaction leaves the old journal intact.
    pub fn compact(&self) -> PersistenceResult<usize> {
        let records = self.replay()?;
        let tmp = self.path.with_extension("jsonl.tmp");

        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for record in &records {
                writeln!(out, "{}", serde_json::to_string(record)?)?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }

        let mut active = self.writer.lock();
        fs::rename(&tmp, &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let before = active.lines;
        *active = JournalWriter {
            writer: BufWriter::new(file),
            lines: records.len(),
            live: records.iter().map(|r| r.id.clone()).collect(),
        };

        info!(before, after = records.len(), "Compacted signal journal");
        Ok(records.len())
    }
}

/// Read every line, applying record versions and tombstones in order.
/// Returns the live records and the total line count.
fn read_journal(path: &Path) -> PersistenceResult<(HashMap<SignalId, Signal>, usize)> {
    let reader = BufReader::new(File::open(path)?);
    let mut latest: HashMap<SignalId, Signal> = HashMap::new();
    let mut lines = 0usize;
    let mut corrupt = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        lines += 1;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(tombstone) = serde_json::from_str::<Tombstone>(&line) {
            latest.remove(&tombstone.purged);
            continue;
        }
        match serde_json::from_str::<Signal>(&line) {
            Ok(signal) => {
                latest.insert(signal.id.clone(), signal);
            }
            Err(e) => {
                corrupt += 1;
                warn!(line = idx + 1, error = %e, "Skipping corrupt journal line");
            }
        }
    }

    debug!(records = latest.len(), lines, corrupt, "Read signal journal");
    Ok((latest, lines))
}

impl SignalStore for SignalJournal {
    fn put(&self, signal: &Signal) -> QueueResult<()> {
        Ok(self.append(signal)?)
    }

    fn load_all(&self) -> QueueResult<Vec<Signal>> {
        Ok(self.replay()?)
    }

    fn remove(&self, ids: &[SignalId]) -> QueueResult<()> {
        Ok(self.purge(ids)?)
    }
}

impl Drop for SignalJournal {
    fn drop(&mut self) {
        if let Err(e) = self.writer.lock().writer.flush() {
            warn!(?e, "Failed to flush signal journal on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sigx_core::{AccountId, IncomingSignal, ManualClock, Price, Side, SignalStatus};
    use sigx_queue::{QueueConfig, SignalQueue};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn incoming(id: &str, priority: i32) -> IncomingSignal {
        IncomingSignal {
            id: Some(id.into()),
            account_id: None,
            symbol: "AAPL".to_string(),
            timestamp_ms: 0,
            action: Side::Buy,
            confidence: dec!(75),
            entry_price: Price::new(dec!(100)),
            stop_price: None,
            target_price: None,
            regime: None,
            priority,
            expires_at_ms: None,
        }
    }

    fn signal(id: &str) -> Signal {
        Signal::from_incoming(incoming(id, 0), &AccountId::from("a"), 1_000, 60_000).unwrap()
    }

    #[test]
    fn test_replay_keeps_latest_version() {
        let dir = TempDir::new().unwrap();
        let journal = SignalJournal::open(dir.path()).unwrap();

        let mut s = signal("s1");
        journal.put(&s).unwrap();
        s.status = SignalStatus::Executing;
        journal.put(&s).unwrap();
        journal.put(&signal("s2")).unwrap();

        let records = journal.load_all().unwrap();
        assert_eq!(records.len(), 2);
        let s1 = records.iter().find(|r| r.id.as_str() == "s1").unwrap();
        assert_eq!(s1.status, SignalStatus::Executing);
        assert_eq!(journal.line_count(), 3);
    }

    #[test]
    fn test_corrupt_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        {
            let journal = SignalJournal::open(dir.path()).unwrap();
            journal.put(&signal("s1")).unwrap();
        }
        let path = dir.path().join(JOURNAL_FILE);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{\"id\":\"s2\",\"trunc").unwrap();

        let journal = SignalJournal::open(dir.path()).unwrap();
        journal.put(&signal("s3")).unwrap();
        let ids: Vec<String> = journal
            .load_all()
            .unwrap()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["s1", "s3"]);
    }

    #[test]
    fn test_compact() {
        let dir = TempDir::new().unwrap();
        let journal = SignalJournal::open(dir.path()).unwrap();
        let mut s = signal("s1");
        for status in [SignalStatus::Ready, SignalStatus::Executing, SignalStatus::Executed] {
            s.status = status;
            journal.put(&s).unwrap();
        }
        assert_eq!(journal.line_count(), 3);

        assert_eq!(journal.compact().unwrap(), 1);
        assert_eq!(journal.line_count(), 1);

        journal.put(&signal("s2")).unwrap();
        let records = journal.load_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, SignalStatus::Executed);
    }

    #[test]
    fn test_purged_records_stay_gone_after_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let journal = SignalJournal::open(dir.path()).unwrap();
            journal.put(&signal("s1")).unwrap();
            journal.put(&signal("s2")).unwrap();
            journal.remove(&[SignalId::from("s1")]).unwrap();
            assert_eq!(journal.line_count(), 3);
        }

        let journal = SignalJournal::open(dir.path()).unwrap();
        let ids: Vec<String> = journal
            .load_all()
            .unwrap()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["s2"]);

        // A purged id may come back as a new record
        journal.put(&signal("s1")).unwrap();
        assert_eq!(journal.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_purge_compacts_past_threshold() {
        let dir = TempDir::new().unwrap();
        let journal = SignalJournal::open(dir.path()).unwrap().with_compact_threshold(4);

        let mut s = signal("s1");
        for status in [SignalStatus::Ready, SignalStatus::Executing, SignalStatus::Executed] {
            s.status = status;
            journal.put(&s).unwrap();
        }
        journal.put(&signal("s2")).unwrap();
        journal.put(&signal("s3")).unwrap();

        // 6 lines with 2 live leaves 4 dead
        journal.remove(&[SignalId::from("s1")]).unwrap();
        assert_eq!(journal.line_count(), 2);

        let contents = fs::read_to_string(journal.path()).unwrap();
        assert!(!contents.contains("purged"));
        assert!(!contents.contains("\"s1\""));
        assert_eq!(journal.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_purge_below_threshold_appends_only() {
        let dir = TempDir::new().unwrap();
        let journal = SignalJournal::open(dir.path()).unwrap();
        journal.put(&signal("s1")).unwrap();
        journal.remove(&[SignalId::from("s1"), SignalId::from("unknown")]).unwrap();

        assert_eq!(journal.line_count(), 3);
        assert!(journal.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_queue_survives_restart() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));

        let claimed_id = {
            let journal = Arc::new(SignalJournal::open(dir.path()).unwrap());
            let queue =
                SignalQueue::open(journal, QueueConfig::default(), clock.clone()).unwrap();
            queue.enqueue(incoming("low", 1)).unwrap();
            queue.enqueue(incoming("high", 9)).unwrap();
            let claimed = queue.dequeue_ready(1, None).unwrap();
            assert_eq!(claimed.len(), 1);
            claimed[0].id.clone()
        };
        assert_eq!(claimed_id.as_str(), "high");

        clock.advance(5_000);
        let journal = Arc::new(SignalJournal::open(dir.path()).unwrap());
        let queue = SignalQueue::open(journal, QueueConfig::default(), clock.clone()).unwrap();

        let recovered = queue.get(&claimed_id).unwrap();
        assert_eq!(recovered.status, SignalStatus::Pending);
        assert!(recovered.needs_reconcile);
        assert_eq!(queue.len(), 2);
    }
}
