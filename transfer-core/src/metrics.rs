//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the transfer
//! engine. All metrics live in an engine-owned registry so several engines
//! (tests, embedded use) can coexist in one process.
//!
//! # Metrics
//!
//! - `transfers_completed_total` - Transfers committed
//! - `transfers_replayed_total` - Idempotent replays served
//! - `transfers_rejected_total` - Transfers rejected before or during commit
//! - `ledger_entries_total` - Ledger entries written
//! - `transfer_duration_seconds` - Histogram of end-to-end transfer latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Transfers committed
    pub transfers_completed: IntCounter,

    /// Idempotent replays served
    pub transfers_replayed: IntCounter,

    /// Transfers rejected
    pub transfers_rejected: IntCounter,

    /// Ledger entries written
    pub entries_total: IntCounter,

    /// Transfer duration histogram
    pub transfer_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transfers_completed = IntCounter::with_opts(Opts::new(
            "transfers_completed_total",
            "Transfers committed",
        ))?;
        registry.register(Box::new(transfers_completed.clone()))?;

        let transfers_replayed = IntCounter::with_opts(Opts::new(
            "transfers_replayed_total",
            "Idempotent replays served",
        ))?;
        registry.register(Box::new(transfers_replayed.clone()))?;

        let transfers_rejected = IntCounter::with_opts(Opts::new(
            "transfers_rejected_total",
            "Transfers rejected before or during commit",
        ))?;
        registry.register(Box::new(transfers_rejected.clone()))?;

        let entries_total = IntCounter::with_opts(Opts::new(
            "ledger_entries_total",
            "Ledger entries written",
        ))?;
        registry.register(Box::new(entries_total.clone()))?;

        let transfer_duration = Histogram::with_opts(
            HistogramOpts::new(
                "transfer_duration_seconds",
                "Histogram of end-to-end transfer latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(transfer_duration.clone()))?;

        Ok(Self {
            transfers_completed,
            transfers_replayed,
            transfers_rejected,
            entries_total,
            transfer_duration,
            registry,
        })
    }

    /// Record a committed transfer and its entry pair
    pub fn record_completed(&self) {
        self.transfers_completed.inc();
        self.entries_total.inc_by(2);
    }

    /// Record an idempotent replay
    pub fn record_replayed(&self) {
        self.transfers_replayed.inc();
    }

    /// Record a rejected transfer
    pub fn record_rejected(&self) {
        self.transfers_rejected.inc();
    }

    /// Record end-to-end transfer duration
    pub fn record_duration(&self, duration_seconds: f64) {
        self.transfer_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
