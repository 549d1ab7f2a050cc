//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `hub_sync_ticks_total` - Reconciliation ticks started
//! - `hub_sync_tick_failures_total` - Ticks abandoned on daemon failure
//! - `hub_sync_errors_total{severity}` - Failures by severity
//! - `hub_sync_transitions_total{kind}` - Channel outcomes (`good`, `skipped`, `refresh`)
//! - `hub_sync_backfill_failures_total` - Explorer lookups that left a field lost
//! - `hub_sync_tick_duration_seconds` - Tick latency histogram

use crate::error::Severity;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::fmt;
use std::sync::Arc;

/// Kind of per-channel outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Single observed step
    Good,
    /// Intermediate phases were synthesized
    Skipped,
    /// Same phase, mutable fields refreshed
    Refresh,
}

impl TransitionKind {
    fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Good => "good",
            TransitionKind::Skipped => "skipped",
            TransitionKind::Refresh => "refresh",
        }
    }
}

/// Metrics collector, owns its registry
#[derive(Clone)]
pub struct SyncMetrics {
    /// Ticks started
    pub ticks_total: IntCounter,

    /// Ticks abandoned
    pub tick_failures_total: IntCounter,

    /// Failures by severity
    pub errors_total: IntCounterVec,

    /// Channel outcomes by kind
    pub transitions_total: IntCounterVec,

    /// Lost fields caused by explorer failures
    pub backfill_failures_total: IntCounter,

    /// Tick latency
    pub tick_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl SyncMetrics {
    /// Create and register every collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let ticks_total = IntCounter::new("hub_sync_ticks_total", "Reconciliation ticks started")?;
        registry.register(Box::new(ticks_total.clone()))?;

        let tick_failures_total = IntCounter::new(
            "hub_sync_tick_failures_total",
            "Ticks abandoned on daemon failure",
        )?;
        registry.register(Box::new(tick_failures_total.clone()))?;

        let errors_total = IntCounterVec::new(
            Opts::new("hub_sync_errors_total", "Failures by severity"),
            &["severity"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let transitions_total = IntCounterVec::new(
            Opts::new("hub_sync_transitions_total", "Channel outcomes by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(transitions_total.clone()))?;

        let backfill_failures_total = IntCounter::new(
            "hub_sync_backfill_failures_total",
            "Explorer lookups that left a field lost",
        )?;
        registry.register(Box::new(backfill_failures_total.clone()))?;

        let tick_duration = Histogram::with_opts(
            HistogramOpts::new("hub_sync_tick_duration_seconds", "Tick latency").buckets(vec![
                0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ]),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        Ok(Self {
            ticks_total,
            tick_failures_total,
            errors_total,
            transitions_total,
            backfill_failures_total,
            tick_duration,
            registry,
        })
    }

    /// Count a failure
    pub fn record_error(&self, severity: Severity) {
        self.errors_total
            .with_label_values(&[severity.as_str()])
            .inc();
    }

    /// Count a channel outcome
    pub fn record_transition(&self, kind: TransitionKind) {
        self.transitions_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Failures recorded so far at `severity`
    pub fn errors(&self, severity: Severity) -> u64 {
        self.errors_total
            .with_label_values(&[severity.as_str()])
            .get()
    }

    /// Outcomes recorded so far of `kind`
    pub fn transitions(&self, kind: TransitionKind) -> u64 {
        self.transitions_total
            .with_label_values(&[kind.as_str()])
            .get()
    }

    /// Text exposition of every collector
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl fmt::Debug for SyncMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncMetrics")
            .field("ticks_total", &self.ticks_total.get())
            .field("tick_failures_total", &self.tick_failures_total.get())
            .finish()
    }
}
