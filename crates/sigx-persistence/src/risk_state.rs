//! Risk state file.
//!
//! All accounts live in one `risk_state.json` map. Each save rewrites the
//! map through a temp file and rename so a crash never leaves a half
//! written file behind.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use sigx_core::AccountId;
use sigx_risk::{RiskResult, RiskStateRecord, RiskStateStore};

use crate::error::PersistenceResult;

const STATE_FILE: &str = "risk_state.json";

pub struct RiskStateFile {
    path: PathBuf,
    records: Mutex<BTreeMap<String, RiskStateRecord>>,
}

impl RiskStateFile {
    pub fn open(dir: impl AsRef<Path>) -> PersistenceResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(STATE_FILE);

        let records: BTreeMap<String, RiskStateRecord> = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            BTreeMap::new()
        };
        info!(path = %path.display(), accounts = records.len(), "Loaded risk state");

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    fn write(&self, records: &BTreeMap<String, RiskStateRecord>) -> PersistenceResult<()> {
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut out, records)?;
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl RiskStateStore for RiskStateFile {
    fn load(&self, account: &AccountId) -> RiskResult<Option<RiskStateRecord>> {
        Ok(self.records.lock().get(account.as_str()).cloned())
    }

    fn save(&self, record: &RiskStateRecord) -> RiskResult<()> {
        let mut records = self.records.lock();
        records.insert(record.account_id.to_string(), record.clone());
        self.write(&records)?;
        debug!(
            account = %record.account_id,
            halted = record.halted,
            peak_equity = %record.peak_equity,
            "Risk state saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn record(account: &str, halted: bool) -> RiskStateRecord {
        RiskStateRecord {
            account_id: AccountId::from(account),
            peak_equity: dec!(105000),
            halted,
            halt_reason: halted.then(|| "daily loss".to_string()),
            daily_pnl_reset_at_ms: 86_400_000,
            session_start_equity: dec!(100000),
            resume_levels: None,
        }
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        {
            let store = RiskStateFile::open(dir.path()).unwrap();
            store.save(&record("a", true)).unwrap();
            store.save(&record("b", false)).unwrap();
        }

        let store = RiskStateFile::open(dir.path()).unwrap();
        let a = store.load(&AccountId::from("a")).unwrap().unwrap();
        assert!(a.halted);
        assert_eq!(a.peak_equity, dec!(105000));
        assert!(!store.load(&AccountId::from("b")).unwrap().unwrap().halted);
        assert!(store.load(&AccountId::from("c")).unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites_account() {
        let dir = TempDir::new().unwrap();
        let store = RiskStateFile::open(dir.path()).unwrap();
        store.save(&record("a", true)).unwrap();
        store.save(&record("a", false)).unwrap();

        let reopened = RiskStateFile::open(dir.path()).unwrap();
        assert!(!reopened.load(&AccountId::from("a")).unwrap().unwrap().halted);
        assert!(!dir.path().join("risk_state.json.tmp").exists());
    }
}
