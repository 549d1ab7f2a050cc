//! Per-tick outcome aggregation

use crate::error::Severity;
use crate::transition::{Category, ImpossibleTransition};
use channel_core::ChannelId;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Why one channel was not reconciled this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Observation implies moving backwards; state left untouched
    ImpossibleTransition(ImpossibleTransition),
    /// Storage kept failing after retries; channel skipped
    Storage(String),
    /// State persisted, short channel id index not written
    Index(String),
    /// Channel state machine refused a step
    Transition(String),
}

/// One channel-level failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFailure {
    /// Affected channel
    pub channel_id: ChannelId,
    /// List the channel was observed in
    pub category: Category,
    /// What went wrong
    pub kind: FailureKind,
}

impl ChannelFailure {
    /// Reporting severity
    pub fn severity(&self) -> Severity {
        match self.kind {
            FailureKind::Index(_) => Severity::Medium,
            FailureKind::ImpossibleTransition(_)
            | FailureKind::Storage(_)
            | FailureKind::Transition(_) => Severity::High,
        }
    }
}

impl fmt::Display for ChannelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FailureKind::ImpossibleTransition(transition) => {
                write!(f, "impossible transition {}", transition)
            }
            FailureKind::Storage(err) => write!(f, "storage: {}", err),
            FailureKind::Index(err) => write!(f, "index: {}", err),
            FailureKind::Transition(err) => write!(f, "transition: {}", err),
        }
    }
}

/// Summary of one reconciliation tick
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Tick identifier
    pub run_id: Uuid,
    /// Tick start
    pub started_at: DateTime<Utc>,
    /// Entries across all daemon lists
    pub observed: usize,
    /// Channels that moved to a new state
    pub transitions: usize,
    /// Of those, channels with synthesized phases
    pub skipped: usize,
    /// Same-phase observations that changed stored fields
    pub refreshed: usize,
    /// Cached channels missing from every list for the first time
    pub absent: usize,
    /// Cached channels missing two ticks in a row, driven to Closed
    pub vanished: usize,
    /// Events published
    pub events: usize,
    /// Explorer lookups that left a field lost
    pub backfill_failures: u64,
    /// Channels not (fully) reconciled
    pub failures: Vec<ChannelFailure>,
}

impl SyncReport {
    pub(crate) fn new() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            observed: 0,
            transitions: 0,
            skipped: 0,
            refreshed: 0,
            absent: 0,
            vanished: 0,
            events: 0,
            backfill_failures: 0,
            failures: Vec::new(),
        }
    }

    /// Observations that implied moving backwards
    pub fn impossible_transitions(&self) -> impl Iterator<Item = &ChannelFailure> {
        self.failures
            .iter()
            .filter(|failure| matches!(failure.kind, FailureKind::ImpossibleTransition(_)))
    }

    /// Nothing failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
