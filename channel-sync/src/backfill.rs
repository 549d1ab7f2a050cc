//! Filling AdditionalInfo phase sections from observations and the explorer
//!
//! Observed phases take their values from the daemon entry. Synthesized
//! phases only get what the explorer can recover from the chain; everything
//! else is marked [`Recorded::Lost`]. An explorer failure degrades a single
//! field and never aborts the channel.

use crate::explorer::Explorer;
use crate::observation::Observation;
use crate::transition::Category;
use crate::{Error, Result};
use channel_core::{
    AdditionalInfo, Amount, ChannelId, ChannelStateName, Initiator, Recorded, ShortChannelId,
};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub(crate) struct Backfill<'a> {
    explorer: &'a dyn Explorer,
    timeout: Duration,
    failures: u64,
}

impl<'a> Backfill<'a> {
    pub fn new(explorer: &'a dyn Explorer, timeout: Duration) -> Self {
        Self {
            explorer,
            timeout,
            failures: 0,
        }
    }

    /// Explorer lookups that failed so far
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Fill the section of `state`
    pub async fn fill(
        &mut self,
        info: &mut AdditionalInfo,
        observation: &Observation,
        state: ChannelStateName,
        observed: bool,
        now: i64,
    ) {
        match state {
            ChannelStateName::Opening => self.fill_opening(info, observation, observed).await,
            ChannelStateName::Opened => self.fill_opened(info, observation, observed, now).await,
            ChannelStateName::Closing => self.fill_closing(info, observation, observed).await,
            ChannelStateName::Closed => info.close_time = Recorded::Known(now),
            // Update detours are driven from outside and carry no section.
            ChannelStateName::Updating => {}
        }
    }

    async fn fill_opening(
        &mut self,
        info: &mut AdditionalInfo,
        observation: &Observation,
        observed: bool,
    ) {
        let (time, fee) = self.funding_tx(&observation.channel_id).await;
        info.opening_time = time;
        info.opening_fee = fee;

        if observed {
            info.opening_initiator = Recorded::from_option(
                observation
                    .local_balance
                    .map(Initiator::from_local_balance),
            );
            info.opening_commit_fee = Recorded::from_option(observation.commit_fee);
            info.opening_local_balance = Recorded::from_option(observation.local_balance);
            info.opening_remote_balance = Recorded::from_option(observation.remote_balance);
        } else {
            info.opening_initiator = Recorded::Lost;
            info.opening_commit_fee = Recorded::Lost;
            info.opening_local_balance = Recorded::Lost;
            info.opening_remote_balance = Recorded::Lost;
        }
    }

    async fn fill_opened(
        &mut self,
        info: &mut AdditionalInfo,
        observation: &Observation,
        observed: bool,
        now: i64,
    ) {
        if observed {
            info.open_time = Recorded::Known(now);
            info.open_commit_fee = Recorded::from_option(observation.commit_fee);
            info.open_local_balance = Recorded::from_option(observation.local_balance);
            info.open_remote_balance = Recorded::from_option(observation.remote_balance);
            info.open_stuck_balance = Recorded::from_option(observation.stuck_balance);
        } else {
            info.open_time = Recorded::Lost;
            info.open_commit_fee = Recorded::Lost;
            info.open_local_balance = Recorded::Lost;
            info.open_remote_balance = Recorded::Lost;
            info.open_stuck_balance = Recorded::Lost;
        }

        info.short_channel_id = match observation.short_channel_id {
            Some(short_id) => Recorded::Known(short_id),
            None => self.short_channel_id(&observation.channel_id).await,
        };
    }

    async fn fill_closing(
        &mut self,
        info: &mut AdditionalInfo,
        observation: &Observation,
        observed: bool,
    ) {
        let (time, fee) = match observation.closing_txid.as_deref() {
            Some(txid) => self.tx_time_and_fee(txid).await,
            None => (Recorded::Lost, Recorded::Lost),
        };
        info.closing_time = time;
        info.closing_fee = fee;

        if observed {
            info.closing_local_balance = Recorded::from_option(observation.local_balance);
            info.closing_remote_balance = Recorded::from_option(observation.remote_balance);
            info.closing_limbo_balance = Recorded::from_option(observation.limbo_balance);
            info.swipe_fee = if observation.force_close {
                self.swipe_fee(&observation.outgoing_sweeps).await
            } else {
                Recorded::Known(Amount::ZERO)
            };
        } else {
            info.closing_local_balance = Recorded::Lost;
            info.closing_remote_balance = Recorded::Lost;
            info.closing_limbo_balance = Recorded::Lost;
            info.swipe_fee = Recorded::Lost;
        }
    }

    async fn funding_tx(&mut self, channel_id: &ChannelId) -> (Recorded<i64>, Recorded<Amount>) {
        match channel_id.channel_point() {
            Ok(point) => self.tx_time_and_fee(&point.txid).await,
            Err(err) => {
                self.note_failure("funding tx", channel_id.as_str(), &err.into());
                (Recorded::Lost, Recorded::Lost)
            }
        }
    }

    async fn tx_time_and_fee(&mut self, txid: &str) -> (Recorded<i64>, Recorded<Amount>) {
        let explorer = self.explorer;
        let time = self
            .fetch("tx time", txid, explorer.fetch_tx_time(txid))
            .await;
        let fee = self.fetch("tx fee", txid, explorer.fetch_tx_fee(txid)).await;
        (time, fee)
    }

    /// Rebuild the short channel id from the funding tx position on chain
    async fn short_channel_id(&mut self, channel_id: &ChannelId) -> Recorded<ShortChannelId> {
        let point = match channel_id.channel_point() {
            Ok(point) => point,
            Err(err) => {
                self.note_failure("short channel id", channel_id.as_str(), &err.into());
                return Recorded::Lost;
            }
        };

        let explorer = self.explorer;
        let height = self
            .fetch("tx height", &point.txid, explorer.fetch_tx_height(&point.txid))
            .await;
        let index = self
            .fetch(
                "tx index",
                &point.txid,
                explorer.fetch_tx_index_in_block(&point.txid),
            )
            .await;

        match (height, index) {
            (Recorded::Known(height), Recorded::Known(index)) => {
                Recorded::Known(ShortChannelId::new(height, index, point.output_index))
            }
            _ => Recorded::Lost,
        }
    }

    /// Sum of sweep fees; one failed lookup loses the whole sum
    async fn swipe_fee(&mut self, sweeps: &[String]) -> Recorded<Amount> {
        let explorer = self.explorer;
        let mut total = Amount::ZERO;

        for txid in sweeps {
            match self.fetch("sweep fee", txid, explorer.fetch_tx_fee(txid)).await {
                Recorded::Known(fee) => total += fee,
                _ => return Recorded::Lost,
            }
        }
        Recorded::Known(total)
    }

    async fn fetch<T, F>(&mut self, what: &'static str, txid: &str, call: F) -> Recorded<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Recorded::Known(value),
            Ok(Err(err)) => {
                self.note_failure(what, txid, &err);
                Recorded::Lost
            }
            Err(_) => {
                let err = Error::Timeout {
                    operation: what,
                    after: self.timeout,
                };
                self.note_failure(what, txid, &err);
                Recorded::Lost
            }
        }
    }

    fn note_failure(&mut self, what: &'static str, subject: &str, err: &Error) {
        self.failures += 1;
        warn!(lookup = what, subject, error = %err, "Explorer backfill failed, field marked lost");
    }
}

/// Same-phase re-observation: update the mutable fields of the current section
pub(crate) fn refresh(info: &mut AdditionalInfo, observation: &Observation) {
    fn update(field: &mut Recorded<Amount>, value: Option<Amount>) {
        if let Some(value) = value {
            *field = Recorded::Known(value);
        }
    }

    match observation.category {
        Category::Open => {
            update(&mut info.open_commit_fee, observation.commit_fee);
            update(&mut info.open_local_balance, observation.local_balance);
            update(&mut info.open_remote_balance, observation.remote_balance);
            update(&mut info.open_stuck_balance, observation.stuck_balance);
            if let Some(short_id) = observation.short_channel_id {
                info.short_channel_id = Recorded::Known(short_id);
            }
        }
        Category::WaitingClose => {
            update(&mut info.open_local_balance, observation.local_balance);
            update(&mut info.open_remote_balance, observation.remote_balance);
        }
        Category::PendingClosing | Category::ForceClosing => {
            update(&mut info.closing_local_balance, observation.local_balance);
            update(&mut info.closing_remote_balance, observation.remote_balance);
            update(&mut info.closing_limbo_balance, observation.limbo_balance);
        }
        Category::PendingOpen | Category::Closed | Category::Vanished => {}
    }
}
