//! Reconciliation engine
//!
//! One tick:
//!
//! 1. **Fetch**: open, pending and closed lists from the daemon. Any failure
//!    abandons the tick with the cache untouched.
//! 2. **Reconcile**: per entry, plan the move from the cached state, fill the
//!    AdditionalInfo sections (explorer backfill for skipped phases), apply
//!    the Channel mutators, persist, index, then publish the events.
//! 3. **Vanished**: cached channels absent from every list in two consecutive
//!    ticks progress to Closed. The lists come from separate daemon calls, so
//!    a single absence can be a channel moving between lists mid-fetch.
//!
//! The engine is the only writer of channels and AdditionalInfo. Ticks and
//! manual update steps are serialised by one async lock.

use crate::{
    backfill::{self, Backfill},
    config::SyncConfig,
    daemon::DaemonClient,
    error::Severity,
    explorer::Explorer,
    metrics::{SyncMetrics, TransitionKind},
    observation::Observation,
    report::{ChannelFailure, FailureKind, SyncReport},
    transition::{self, Category, Plan},
    Error, Result,
};
use channel_core::{
    types::is_null_txid, AdditionalInfo, Amount, Channel, ChannelId, ChannelStateName,
    ChannelUpdate, Storage,
};
use chrono::{DateTime, Utc};
use hub_broadcast::{Broadcaster, Receiver};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

/// Per-channel result of a tick
enum Outcome {
    /// Nothing to write
    Unchanged,
    /// Stored fields changed, no lifecycle move
    Refreshed,
    /// Lifecycle moved and events were published
    Transitioned { skipped: bool, events: usize },
}

/// Channel reconciliation engine
pub struct SyncEngine {
    config: SyncConfig,
    daemon: Arc<dyn DaemonClient>,
    explorer: Arc<dyn Explorer>,
    storage: Arc<dyn Storage>,
    updates: Broadcaster<ChannelUpdate>,
    metrics: SyncMetrics,
    channels: RwLock<HashMap<ChannelId, Channel>>,
    /// Cached channels missing from every list on the previous tick
    absent: parking_lot::Mutex<HashSet<ChannelId>>,
    run_lock: Mutex<()>,
}

impl SyncEngine {
    /// Create the engine and restore the live channel set from storage
    pub fn new(
        config: SyncConfig,
        daemon: Arc<dyn DaemonClient>,
        explorer: Arc<dyn Explorer>,
        storage: Arc<dyn Storage>,
        updates: Broadcaster<ChannelUpdate>,
        metrics: SyncMetrics,
    ) -> Result<Self> {
        let channels: HashMap<_, _> = storage
            .channels()?
            .into_iter()
            .map(|channel| (channel.channel_id.clone(), channel))
            .collect();

        info!(channels = channels.len(), "Restored live channel set");

        Ok(Self {
            config,
            daemon,
            explorer,
            storage,
            updates,
            metrics,
            channels: RwLock::new(channels),
            absent: parking_lot::Mutex::new(HashSet::new()),
            run_lock: Mutex::new(()),
        })
    }

    /// Receive every lifecycle event published from now on
    pub fn subscribe(&self) -> Receiver<ChannelUpdate> {
        self.updates.subscribe()
    }

    /// Snapshot of the live channel set
    pub fn channels(&self) -> Vec<Channel> {
        self.channels.read().values().cloned().collect()
    }

    /// Snapshot of one channel
    pub fn channel(&self, channel_id: &ChannelId) -> Option<Channel> {
        self.channels.read().get(channel_id).cloned()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    /// Loop configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Stop publishing; subscribers drain and reach end-of-stream
    pub async fn close(&self) {
        self.updates.stop().await;
    }

    /// Run one reconciliation tick
    pub async fn sync_channels(&self) -> Result<SyncReport> {
        let _guard = self.run_lock.lock().await;
        let timer = self.metrics.tick_duration.start_timer();
        self.metrics.ticks_total.inc();
        let mut report = SyncReport::new();

        let (observations, ignored) = match self.fetch_observations().await {
            Ok(fetched) => fetched,
            Err(err) => {
                self.metrics.tick_failures_total.inc();
                self.metrics.record_error(Severity::High);
                error!(run_id = %report.run_id, error = %err, "Daemon listing failed, tick abandoned");
                return Err(err);
            }
        };
        report.observed = observations.len();

        let mut backfill = Backfill::new(self.explorer.as_ref(), self.config.explorer_timeout());
        let mut seen: HashSet<ChannelId> = ignored.into_iter().collect();

        for observation in &observations {
            seen.insert(observation.channel_id.clone());
            self.reconcile(observation, &mut backfill, &mut report).await;
        }

        match self
            .with_retry("list channel info", || self.storage.infos())
            .await
        {
            Ok(infos) => {
                let missing = infos.into_iter().filter(|info| {
                    info.state != ChannelStateName::Closed && !seen.contains(&info.channel_id)
                });
                let vanished = self.confirm_absence(missing);
                report.absent = self.absent.lock().len();

                for info in &vanished {
                    report.vanished += 1;
                    let observation = Observation::vanished(info);
                    self.reconcile(&observation, &mut backfill, &mut report).await;
                }
            }
            Err(err) => {
                self.metrics.record_error(Severity::High);
                error!(run_id = %report.run_id, error = %err, "Cannot list cached channels, vanished check skipped");
            }
        }

        report.backfill_failures = backfill.failures();
        self.metrics
            .backfill_failures_total
            .inc_by(report.backfill_failures);
        timer.observe_duration();

        info!(
            run_id = %report.run_id,
            observed = report.observed,
            transitions = report.transitions,
            skipped = report.skipped,
            refreshed = report.refreshed,
            absent = report.absent,
            vanished = report.vanished,
            events = report.events,
            backfill_failures = report.backfill_failures,
            failures = report.failures.len(),
            "Channel sync tick finished"
        );

        Ok(report)
    }

    /// Opened → Updating, on request of whoever initiated the update
    pub async fn begin_channel_update(
        &self,
        channel_id: &ChannelId,
        fee: Amount,
    ) -> Result<ChannelUpdate> {
        self.manual_step(channel_id, |channel, at| channel.set_updating_state(at, fee))
            .await
    }

    /// Updating → Opened
    pub async fn finish_channel_update(
        &self,
        channel_id: &ChannelId,
        fee: Amount,
    ) -> Result<ChannelUpdate> {
        self.manual_step(channel_id, |channel, at| channel.set_updated_state(at, fee))
            .await
    }

    async fn manual_step<F>(&self, channel_id: &ChannelId, apply: F) -> Result<ChannelUpdate>
    where
        F: FnOnce(&mut Channel, DateTime<Utc>) -> channel_core::Result<ChannelUpdate>,
    {
        let _guard = self.run_lock.lock().await;

        let mut channel = self
            .channel(channel_id)
            .ok_or_else(|| Error::UnknownChannel(channel_id.clone()))?;
        let mut info = self
            .with_retry("load channel info", || self.storage.get_info(channel_id))
            .await?;

        let update = apply(&mut channel, Utc::now())?;
        info.state = update.state();

        self.with_retry("store channel", || self.storage.upsert_channel(&channel))
            .await?;
        self.with_retry("store channel info", || self.storage.upsert_info(&info))
            .await?;
        self.channels.write().insert(channel_id.clone(), channel);

        info!(channel_id = %channel_id, state = %info.state, fee = %update.details().fee, "Channel update step applied");
        self.updates.write(update.clone());
        Ok(update)
    }

    /// Channels missing now and on the previous tick. First-time absences
    /// are remembered; anything seen again is forgotten.
    fn confirm_absence(
        &self,
        missing: impl Iterator<Item = AdditionalInfo>,
    ) -> Vec<AdditionalInfo> {
        let mut absent = self.absent.lock();
        let previous = std::mem::take(&mut *absent);

        let mut confirmed = Vec::new();
        for info in missing {
            if previous.contains(&info.channel_id) {
                confirmed.push(info);
            } else {
                debug!(channel_id = %info.channel_id, state = %info.state, "Channel missing from every list, waiting for next tick");
                absent.insert(info.channel_id.clone());
            }
        }
        confirmed
    }

    async fn fetch_observations(&self) -> Result<(Vec<Observation>, Vec<ChannelId>)> {
        let open = self
            .daemon_call("list open channels", self.daemon.list_open_channels())
            .await?;
        let pending = self
            .daemon_call("list pending channels", self.daemon.list_pending_channels())
            .await?;
        let closed = self
            .daemon_call("list closed channels", self.daemon.list_closed_channels())
            .await?;

        let mut observations = Vec::new();
        observations.extend(pending.pending_open.iter().map(Observation::from));
        observations.extend(open.iter().map(Observation::from));
        observations.extend(pending.waiting_close.iter().map(Observation::from));
        observations.extend(pending.pending_closing.iter().map(Observation::from));
        observations.extend(pending.pending_force_closing.iter().map(Observation::from));

        let mut ignored = Vec::new();
        for entry in &closed {
            if is_null_txid(&entry.closing_txid) {
                debug!(channel_id = %entry.channel_id, "Ignoring closed channel with null closing transaction");
                ignored.push(entry.channel_id.clone());
                continue;
            }
            observations.push(Observation::from(entry));
        }

        Ok((observations, ignored))
    }

    async fn daemon_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let after = self.config.daemon_timeout();
        tokio::time::timeout(after, call)
            .await
            .map_err(|_| Error::Timeout { operation, after })?
    }

    async fn reconcile(
        &self,
        observation: &Observation,
        backfill: &mut Backfill<'_>,
        report: &mut SyncReport,
    ) {
        match self.reconcile_channel(observation, backfill).await {
            Ok(Outcome::Unchanged) => {
                trace!(channel_id = %observation.channel_id, "Channel unchanged");
            }
            Ok(Outcome::Refreshed) => {
                report.refreshed += 1;
                self.metrics.record_transition(TransitionKind::Refresh);
            }
            Ok(Outcome::Transitioned { skipped, events }) => {
                report.transitions += 1;
                report.events += events;
                if skipped {
                    report.skipped += 1;
                    self.metrics.record_transition(TransitionKind::Skipped);
                } else {
                    self.metrics.record_transition(TransitionKind::Good);
                }
            }
            Err(failure) => {
                self.record_failure(failure, report);
                return;
            }
        }

        if let Err(failure) = self.write_index(observation).await {
            self.record_failure(failure, report);
        }
    }

    async fn reconcile_channel(
        &self,
        observation: &Observation,
        backfill: &mut Backfill<'_>,
    ) -> std::result::Result<Outcome, ChannelFailure> {
        let channel_id = &observation.channel_id;
        let fail = |kind| ChannelFailure {
            channel_id: channel_id.clone(),
            category: observation.category,
            kind,
        };

        let previous = self
            .with_retry("load channel info", || self.storage.find_info(channel_id))
            .await
            .map_err(|err| fail(FailureKind::Storage(err.to_string())))?;
        let cached = previous.as_ref().map(|info| info.state);

        let plan = transition::plan(cached, observation.category.target())
            .map_err(|impossible| fail(FailureKind::ImpossibleTransition(impossible)))?;
        let skipped = plan.is_skip();

        let existing = self.channel(channel_id);
        let mut channel = existing
            .clone()
            .unwrap_or_else(|| Channel::new(channel_id.clone(), observation.node_id.clone()));
        let mut info = previous.clone().unwrap_or_else(|| {
            AdditionalInfo::new(
                channel_id.clone(),
                observation.node_id.clone(),
                ChannelStateName::Opening,
            )
        });

        let now = Utc::now();
        if let Some(cached) = cached {
            catch_up(&mut channel, cached, now)
                .map_err(|err| fail(FailureKind::Transition(err.to_string())))?;
        }
        // Closed channels are final; late closed-list values are ignored.
        if cached != Some(ChannelStateName::Closed) {
            observation.apply_to(&mut channel);
        }

        let mut events = Vec::new();
        match plan {
            Plan::Refresh => backfill::refresh(&mut info, observation),
            Plan::Advance(steps) => {
                let last = steps.len().saturating_sub(1);
                for (position, state) in steps.into_iter().enumerate() {
                    let observed = position == last;
                    let recorded = cached.map_or(false, |cached| cached.phase() >= state.phase());
                    if !recorded {
                        backfill
                            .fill(&mut info, observation, state, observed, now.timestamp())
                            .await;
                    }
                    info.state = state;
                    sync_fees(&mut channel, &info);

                    if channel.has_reached(state) {
                        continue;
                    }
                    let update = step(&mut channel, state, now)
                        .map_err(|err| fail(FailureKind::Transition(err.to_string())))?;
                    // A closed entry still names its close transaction.
                    let evidenced = observed
                        || (state == ChannelStateName::Closing
                            && observation.closing_txid.is_some());
                    events.push(if evidenced { update } else { update.synthesized() });
                }
            }
        }
        sync_fees(&mut channel, &info);

        if previous.as_ref() == Some(&info) && existing.as_ref() == Some(&channel) {
            return Ok(Outcome::Unchanged);
        }

        self.with_retry("store channel", || self.storage.upsert_channel(&channel))
            .await
            .map_err(|err| fail(FailureKind::Storage(err.to_string())))?;
        self.with_retry("store channel info", || self.storage.upsert_info(&info))
            .await
            .map_err(|err| fail(FailureKind::Storage(err.to_string())))?;
        self.channels.write().insert(channel_id.clone(), channel);

        if events.is_empty() {
            debug!(channel_id = %channel_id, state = %info.state, category = %observation.category, "Channel refreshed");
            return Ok(Outcome::Refreshed);
        }

        let from = cached.map_or("none", |state| state.as_str());
        if skipped {
            warn!(
                channel_id = %channel_id,
                from,
                to = %info.state,
                category = %observation.category,
                synthesized = events.len() - 1,
                lost_opening = info.lost_opening_fields(),
                "Channel skipped lifecycle phases, missing sections marked lost"
            );
        } else {
            info!(channel_id = %channel_id, from, to = %info.state, category = %observation.category, "Channel transitioned");
        }

        for update in &events {
            self.updates.write(update.clone());
        }

        Ok(Outcome::Transitioned {
            skipped,
            events: events.len(),
        })
    }

    /// Short channel id lookups for open channels; idempotent
    async fn write_index(&self, observation: &Observation) -> std::result::Result<(), ChannelFailure> {
        let short_id = match (observation.category, observation.short_channel_id) {
            (Category::Open, Some(short_id)) => short_id,
            _ => return Ok(()),
        };

        self.with_retry("write short id index", || {
            self.storage
                .add_channel_index(&observation.channel_id, short_id)?;
            self.storage.add_user_index(&observation.node_id, short_id)
        })
        .await
        .map_err(|err| ChannelFailure {
            channel_id: observation.channel_id.clone(),
            category: observation.category,
            kind: FailureKind::Index(err.to_string()),
        })
    }

    fn record_failure(&self, failure: ChannelFailure, report: &mut SyncReport) {
        let severity = failure.severity();
        self.metrics.record_error(severity);

        match &failure.kind {
            FailureKind::ImpossibleTransition(transition) => error!(
                channel_id = %failure.channel_id,
                category = %failure.category,
                from = %transition.from,
                to = %transition.to,
                "Impossible channel transition, state left untouched"
            ),
            _ if severity == Severity::High => error!(
                channel_id = %failure.channel_id,
                category = %failure.category,
                failure = %failure,
                "Channel not reconciled this tick"
            ),
            _ => warn!(
                channel_id = %failure.channel_id,
                category = %failure.category,
                failure = %failure,
                "Channel partially reconciled"
            ),
        }

        report.failures.push(failure);
    }

    /// Bounded retry of transient storage failures
    async fn with_retry<T, F>(&self, operation: &'static str, mut op: F) -> channel_core::Result<T>
    where
        F: FnMut() -> channel_core::Result<T>,
    {
        backoff::future::retry(self.config.retry.backoff(), || {
            let attempt = op().map_err(|err| {
                if err.is_transient() {
                    debug!(operation, error = %err, "Storage operation failed, retrying");
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            });
            async move { attempt }
        })
        .await
    }
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("channels", &self.channels.read().len())
            .finish()
    }
}

/// Apply one lifecycle step through the matching mutator
fn step(
    channel: &mut Channel,
    state: ChannelStateName,
    at: DateTime<Utc>,
) -> channel_core::Result<ChannelUpdate> {
    match state {
        ChannelStateName::Opening => channel.set_opening_state(at),
        ChannelStateName::Opened if channel.state_name() == Some(ChannelStateName::Updating) => {
            channel.set_updated_state(at, Amount::ZERO)
        }
        ChannelStateName::Opened => channel.set_opened_state(at),
        ChannelStateName::Updating => channel.set_updating_state(at, Amount::ZERO),
        ChannelStateName::Closing => channel.set_closing_state(at),
        ChannelStateName::Closed => channel.set_closed_state(at),
    }
}

/// Bring a channel whose stored history lags its AdditionalInfo up to
/// `cached` without publishing anything
fn catch_up(
    channel: &mut Channel,
    cached: ChannelStateName,
    at: DateTime<Utc>,
) -> channel_core::Result<()> {
    if channel.has_reached(cached) {
        return Ok(());
    }

    if let Ok(Plan::Advance(steps)) = transition::plan(channel.state_name(), cached) {
        for state in steps {
            step(channel, state, at)?;
        }
    }
    if cached == ChannelStateName::Updating
        && channel.state_name() == Some(ChannelStateName::Opened)
    {
        channel.set_updating_state(at, Amount::ZERO)?;
    }
    Ok(())
}

/// Mirror recovered fees onto the live channel
fn sync_fees(channel: &mut Channel, info: &AdditionalInfo) {
    if let Some(fee) = info.opening_fee.value() {
        channel.open_fee = fee;
    }
    if let Some(initiator) = info.opening_initiator.value() {
        channel.initiator = Some(initiator);
    }
    if let Some(fee) = info.closing_fee.value() {
        channel.close_fee = fee;
    }
}
