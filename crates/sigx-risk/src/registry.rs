//! One risk gate per account.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use sigx_core::{AccountId, AccountSnapshot, Clock};

use crate::alert::AlertSink;
use crate::error::RiskResult;
use crate::gate::RiskGate;
use crate::limits::RiskConfig;
use crate::state::RiskStateStore;

/// Lazily creates and hands out per-account gates. Gates lock independently.
pub struct RiskGateRegistry {
    gates: DashMap<AccountId, Arc<RiskGate>>,
    config: RiskConfig,
    store: Arc<dyn RiskStateStore>,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
}

impl RiskGateRegistry {
    pub fn new(
        config: RiskConfig,
        store: Arc<dyn RiskStateStore>,
        alerts: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
    ) -> RiskResult<Self> {
        config.validate()?;
        Ok(Self {
            gates: DashMap::new(),
            config,
            store,
            alerts,
            clock,
        })
    }

    /// Existing gate for `account`, or a new one seeded from `snapshot`.
    pub fn get_or_create(
        &self,
        account: &AccountId,
        snapshot: AccountSnapshot,
    ) -> RiskResult<Arc<RiskGate>> {
        if let Some(gate) = self.gates.get(account) {
            return Ok(Arc::clone(gate.value()));
        }
        match self.gates.entry(account.clone()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let gate = Arc::new(RiskGate::open(
                    account.clone(),
                    &self.config,
                    snapshot,
                    Arc::clone(&self.store),
                    Arc::clone(&self.alerts),
                    Arc::clone(&self.clock),
                )?);
                info!(account = %account, equity = %snapshot.equity, "Risk gate created");
                entry.insert(Arc::clone(&gate));
                Ok(gate)
            }
        }
    }

    #[must_use]
    pub fn get(&self, account: &AccountId) -> Option<Arc<RiskGate>> {
        self.gates.get(account).map(|g| Arc::clone(g.value()))
    }

    #[must_use]
    pub fn accounts(&self) -> Vec<AccountId> {
        self.gates.iter().map(|e| e.key().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    #[must_use]
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::LogAlertSink;
    use crate::state::MemoryRiskStateStore;
    use rust_decimal_macros::dec;
    use sigx_core::{ManualClock, PositionDelta};

    fn registry() -> RiskGateRegistry {
        RiskGateRegistry::new(
            RiskConfig::default(),
            Arc::new(MemoryRiskStateStore::new()),
            Arc::new(LogAlertSink),
            Arc::new(ManualClock::new(1_700_000_000_000)),
        )
        .unwrap()
    }

    #[test]
    fn test_get_or_create_reuses_gate() {
        let reg = registry();
        let a = AccountId::from("a");
        let first = reg.get_or_create(&a, AccountSnapshot::flat(dec!(1000))).unwrap();
        let second = reg.get_or_create(&a, AccountSnapshot::flat(dec!(5))).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.view().equity, dec!(1000));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_accounts_are_independent() {
        let reg = registry();
        let a = reg
            .get_or_create(&AccountId::from("a"), AccountSnapshot::flat(dec!(1000)))
            .unwrap();
        let b = reg
            .get_or_create(&AccountId::from("b"), AccountSnapshot::flat(dec!(1000)))
            .unwrap();

        a.apply_fill(&PositionDelta {
            symbol: "X".to_string(),
            realized_pnl: dec!(-100),
            position_after: None,
        });
        assert!(a.is_halted());
        assert!(!b.is_halted());
        assert!(reg.get(&AccountId::from("b")).is_some());
        assert!(reg.get(&AccountId::from("c")).is_none());
    }
}
