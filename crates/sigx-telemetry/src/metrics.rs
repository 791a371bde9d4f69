//! Prometheus metrics for sigx.
//!
//! Covers the signal queue, risk gate decisions and halts, brokerage calls
//! and alert tiers.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means a duplicate metric
//! name, which is a programming error and aborts at first use.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram, register_int_counter,
    register_int_gauge, CounterVec, Encoder, GaugeVec, Histogram, IntCounter, IntGauge,
    TextEncoder,
};

use crate::error::TelemetryResult;

/// Signals accepted by the queue.
pub static SIGNALS_ENQUEUED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sigx_signals_enqueued_total",
        "Total signals accepted by the queue"
    )
    .unwrap()
});

/// Signals claimed by workers.
pub static SIGNALS_CLAIMED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sigx_signals_claimed_total",
        "Total signals claimed for execution"
    )
    .unwrap()
});

/// Open (PENDING + READY + EXECUTING) signals, sampled by the sweeper.
pub static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("sigx_queue_depth", "Open signals in the queue").unwrap()
});

/// Status transitions.
/// Labels: to (PENDING/READY/EXECUTING/EXECUTED/CANCELLED/EXPIRED/FAILED)
pub static SIGNAL_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigx_signal_transitions_total",
        "Total signal status transitions",
        &["to"]
    )
    .unwrap()
});

/// Risk gate decisions.
/// Labels: decision (allow/block/halt)
pub static GATE_DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigx_gate_decisions_total",
        "Total risk gate admission decisions",
        &["decision"]
    )
    .unwrap()
});

/// Circuit breaker state per account (1 = halted).
pub static GATE_HALTED: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sigx_gate_halted",
        "Risk gate halt state (1=halted)",
        &["account"]
    )
    .unwrap()
});

/// Current drawdown from peak equity, in percent.
pub static DRAWDOWN_PCT: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sigx_drawdown_pct",
        "Drawdown from session peak equity in percent",
        &["account"]
    )
    .unwrap()
});

/// Brokerage calls.
/// Labels: result (ok/transient/terminal/timeout)
pub static BROKER_CALLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigx_broker_calls_total",
        "Total brokerage calls by result",
        &["result"]
    )
    .unwrap()
});

/// Brokerage call latency in milliseconds.
pub static BROKER_LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "sigx_broker_latency_ms",
        "Brokerage call latency in milliseconds",
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Alerts emitted.
/// Labels: severity (info/warning/critical/breach)
pub static ALERTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigx_alerts_total",
        "Total risk alerts emitted",
        &["severity"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn signal_enqueued() {
        SIGNALS_ENQUEUED_TOTAL.inc();
    }

    pub fn signal_claimed() {
        SIGNALS_CLAIMED_TOTAL.inc();
    }

    pub fn queue_depth(open: usize) {
        QUEUE_DEPTH.set(open as i64);
    }

    /// Record a status transition into `to`.
    pub fn signal_transition(to: &str) {
        SIGNAL_TRANSITIONS_TOTAL.with_label_values(&[to]).inc();
    }

    /// Record a gate decision (allow/block/halt).
    pub fn gate_decision(decision: &str) {
        GATE_DECISIONS_TOTAL.with_label_values(&[decision]).inc();
    }

    pub fn gate_halted(account: &str, halted: bool) {
        GATE_HALTED
            .with_label_values(&[account])
            .set(if halted { 1.0 } else { 0.0 });
    }

    pub fn drawdown_pct(account: &str, pct: f64) {
        DRAWDOWN_PCT.with_label_values(&[account]).set(pct);
    }

    /// Record a brokerage call result and its latency.
    pub fn broker_call(result: &str, latency_ms: f64) {
        BROKER_CALLS_TOTAL.with_label_values(&[result]).inc();
        BROKER_LATENCY_MS.observe(latency_ms);
    }

    pub fn alert(severity: &str) {
        ALERTS_TOTAL.with_label_values(&[severity]).inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_metrics() {
        Metrics::signal_enqueued();
        Metrics::gate_decision("halt");
        Metrics::gate_halted("acct-test", true);

        let text = Metrics::render().unwrap();
        assert!(text.contains("sigx_signals_enqueued_total"));
        assert!(text.contains("sigx_gate_decisions_total{decision=\"halt\"}"));
        assert!(text.contains("sigx_gate_halted{account=\"acct-test\"} 1"));
    }
}
