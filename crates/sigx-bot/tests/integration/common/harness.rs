//! Application harness backed by a scripted paper brokerage and a manual
//! clock.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use sigx_bot::{AppConfig, Application};
use sigx_core::{AccountId, IncomingSignal, ManualClock, Price, Side, SignalId};
use sigx_executor::{DynBrokerage, ExitPolicy, MockBrokerage, PaperBrokerage};
use sigx_risk::MemoryAlertSink;

/// 2024-03-05 15:00:00 UTC
pub const START_MS: u64 = 1_709_650_800_000;
pub const DAY_MS: u64 = 86_400_000;
pub const ACCOUNT: &str = "acct";

pub const BASE_CONFIG: &str = r#"
[queue]
default_account = "acct"
visibility_timeout_ms = 60000

[risk]
min_confidence = 60
max_position_size_pct = 10
max_positions = 100
daily_loss_limit_pct = 5
max_drawdown_pct = 20

[executor]
broker_timeout_ms = 50
min_holding_bars = 3

[[instruments.symbols]]
symbol = "BTC-USD"
asset_class = "crypto"
lot_size = 0.0001

[persistence]
enabled = false

[[accounts]]
id = "acct"
workers = 4
starting_cash = 100000
"#;

pub struct Harness {
    pub app: Application,
    pub clock: Arc<ManualClock>,
    pub broker: Arc<MockBrokerage>,
    pub alerts: Arc<MemoryAlertSink>,
}

impl Harness {
    /// In-memory application from `BASE_CONFIG`.
    pub async fn start() -> Self {
        Self::start_with(AppConfig::from_toml(BASE_CONFIG).unwrap()).await
    }

    /// Application persisting to `dir`.
    pub async fn start_in(dir: &Path, clock: Arc<ManualClock>) -> Self {
        let mut config = AppConfig::from_toml(BASE_CONFIG).unwrap();
        config.persistence.enabled = true;
        config.persistence.data_dir = dir.to_path_buf();
        Self::build(config, clock, dec!(100000)).await
    }

    pub async fn start_with(config: AppConfig) -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));
        Self::build(config, clock, dec!(100000)).await
    }

    async fn build(config: AppConfig, clock: Arc<ManualClock>, cash: Decimal) -> Self {
        let exit_policy = ExitPolicy::new(config.executor.min_holding_bars);
        let broker = Arc::new(MockBrokerage::new(PaperBrokerage::new(
            cash,
            exit_policy,
            clock.clone(),
        )));
        let alerts = Arc::new(MemoryAlertSink::new());
        let brokers: HashMap<AccountId, DynBrokerage> =
            HashMap::from([(AccountId::from(ACCOUNT), broker.clone() as DynBrokerage)]);

        let app = Application::init_with(config, clock.clone(), brokers, alerts.clone())
            .await
            .unwrap();
        Self {
            app,
            clock,
            broker,
            alerts,
        }
    }

    pub fn enqueue(&self, signal: IncomingSignal) -> SignalId {
        self.app.enqueue(signal).unwrap()
    }

    pub fn status(&self, id: &SignalId) -> sigx_core::SignalStatus {
        self.app.queue().get(id).unwrap().status
    }
}

/// Signal builder with sensible defaults.
pub struct SignalBuilder {
    inner: IncomingSignal,
}

impl SignalBuilder {
    pub fn new(id: &str, symbol: &str, action: Side, entry: Decimal) -> Self {
        Self {
            inner: IncomingSignal {
                id: Some(id.into()),
                account_id: None,
                symbol: symbol.to_string(),
                timestamp_ms: START_MS,
                action,
                confidence: dec!(80),
                entry_price: Price::new(entry),
                stop_price: None,
                target_price: None,
                regime: None,
                priority: 0,
                expires_at_ms: None,
            },
        }
    }

    pub fn confidence(mut self, confidence: Decimal) -> Self {
        self.inner.confidence = confidence;
        self
    }

    pub fn bracket(mut self, stop: Decimal, target: Decimal) -> Self {
        self.inner.stop_price = Some(Price::new(stop));
        self.inner.target_price = Some(Price::new(target));
        self
    }

    pub fn account(mut self, account: &str) -> Self {
        self.inner.account_id = Some(AccountId::from(account));
        self
    }

    pub fn build(self) -> IncomingSignal {
        self.inner
    }
}
