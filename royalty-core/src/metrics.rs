//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the royalty ledger.
//!
//! # Metrics
//!
//! - `royalty_streams_reported_total` - Playback attempts recorded
//! - `royalty_streams_settled_total` - Qualifying streams settled
//! - `royalty_entries_total` - Ledger entries appended
//! - `royalty_withdrawals_initiated_total` - Withdrawals committed
//! - `royalty_withdrawals_resolved_total` - Pending withdrawals resolved
//! - `royalty_consistency_faults_total` - External orders with no local record
//! - `royalty_settle_duration_seconds` - Settlement latency histogram

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Playback attempts recorded (qualifying or not)
    pub streams_reported: IntCounter,

    /// Qualifying streams settled into the ledger
    pub streams_settled: IntCounter,

    /// Ledger entries appended
    pub entries_total: IntCounter,

    /// Withdrawals committed against the balance
    pub withdrawals_initiated: IntCounter,

    /// Pending withdrawals resolved by reconciliation
    pub withdrawals_resolved: IntCounter,

    /// Money in flight with no local record: must page a human
    pub consistency_faults: IntCounter,

    /// Settlement latency histogram
    pub settle_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let streams_reported = IntCounter::with_opts(Opts::new(
            "royalty_streams_reported_total",
            "Playback attempts recorded",
        ))?;
        registry.register(Box::new(streams_reported.clone()))?;

        let streams_settled = IntCounter::with_opts(Opts::new(
            "royalty_streams_settled_total",
            "Qualifying streams settled",
        ))?;
        registry.register(Box::new(streams_settled.clone()))?;

        let entries_total = IntCounter::with_opts(Opts::new(
            "royalty_entries_total",
            "Ledger entries appended",
        ))?;
        registry.register(Box::new(entries_total.clone()))?;

        let withdrawals_initiated = IntCounter::with_opts(Opts::new(
            "royalty_withdrawals_initiated_total",
            "Withdrawals committed against the balance",
        ))?;
        registry.register(Box::new(withdrawals_initiated.clone()))?;

        let withdrawals_resolved = IntCounter::with_opts(Opts::new(
            "royalty_withdrawals_resolved_total",
            "Pending withdrawals resolved",
        ))?;
        registry.register(Box::new(withdrawals_resolved.clone()))?;

        let consistency_faults = IntCounter::with_opts(Opts::new(
            "royalty_consistency_faults_total",
            "External orders created with no matching local record",
        ))?;
        registry.register(Box::new(consistency_faults.clone()))?;

        let settle_duration = Histogram::with_opts(
            HistogramOpts::new(
                "royalty_settle_duration_seconds",
                "Histogram of settlement latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(settle_duration.clone()))?;

        Ok(Self {
            streams_reported,
            streams_settled,
            entries_total,
            withdrawals_initiated,
            withdrawals_resolved,
            consistency_faults,
            settle_duration,
            registry,
        })
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
