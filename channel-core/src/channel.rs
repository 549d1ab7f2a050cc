//! Channel lifecycle state machine
//!
//! ```text
//! Opening ──▶ Opened ──▶ Closing ──▶ Closed
//!               ▲  │
//!               │  ▼
//!             Updating
//! ```
//!
//! Mutators are pure: they append a [`ChannelState`] and return the event to
//! publish. Persisting the channel and publishing the event is the caller's job.

use crate::error::{Error, Result};
use crate::types::{Amount, ChannelId, Initiator, NodeId};
use crate::update::{ChannelUpdate, TransitionDetails};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle state name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelStateName {
    /// Funding broadcast, awaiting confirmation
    Opening,
    /// Usable
    Opened,
    /// Capacity change in progress
    Updating,
    /// Close broadcast, awaiting confirmation
    Closing,
    /// Fully closed
    Closed,
}

impl ChannelStateName {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStateName::Opening => "opening",
            ChannelStateName::Opened => "opened",
            ChannelStateName::Updating => "updating",
            ChannelStateName::Closing => "closing",
            ChannelStateName::Closed => "closed",
        }
    }

    /// Position along the lifecycle. Updating shares the Opened phase.
    pub fn phase(&self) -> u8 {
        match self {
            ChannelStateName::Opening => 0,
            ChannelStateName::Opened | ChannelStateName::Updating => 1,
            ChannelStateName::Closing => 2,
            ChannelStateName::Closed => 3,
        }
    }

    /// Opening, Updating and Closing wait on chain confirmation
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ChannelStateName::Opening | ChannelStateName::Updating | ChannelStateName::Closing
        )
    }

    /// Whether `next` may directly follow `prev` (`None` = no state yet)
    pub fn can_follow(prev: Option<ChannelStateName>, next: ChannelStateName) -> bool {
        use ChannelStateName::*;

        matches!(
            (prev, next),
            (None, Opening)
                | (Some(Opening), Opened)
                | (Some(Opened), Updating)
                | (Some(Updating), Opened)
                | (Some(Opened), Closing)
                | (Some(Closing), Closed)
        )
    }
}

impl fmt::Display for ChannelStateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a channel's state history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    /// When the channel entered the state
    pub time: DateTime<Utc>,
    /// State entered
    pub name: ChannelStateName,
}

/// Live view of one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Funding channel point
    pub channel_id: ChannelId,
    /// Counterparty
    pub node_id: NodeId,
    /// Channel capacity
    pub funding_amount: Amount,
    /// Hub side balance
    pub local_balance: Amount,
    /// Counterparty side balance
    pub remote_balance: Amount,
    /// On-chain fee of the funding transaction
    pub open_fee: Amount,
    /// Commit fee while open, close transaction fee once closing
    pub close_fee: Amount,
    /// Who funded the channel, when known
    pub initiator: Option<Initiator>,
    /// Counterparty connected and channel enabled
    pub is_user_connected: bool,
    states: Vec<ChannelState>,
}

impl Channel {
    /// Channel with an empty history
    pub fn new(channel_id: ChannelId, node_id: NodeId) -> Self {
        Self {
            channel_id,
            node_id,
            funding_amount: Amount::ZERO,
            local_balance: Amount::ZERO,
            remote_balance: Amount::ZERO,
            open_fee: Amount::ZERO,
            close_fee: Amount::ZERO,
            initiator: None,
            is_user_connected: false,
            states: Vec::new(),
        }
    }

    /// Full history, oldest first
    pub fn states(&self) -> &[ChannelState] {
        &self.states
    }

    /// Latest state, `None` before the first transition
    pub fn current_state(&self) -> Option<&ChannelState> {
        self.states.last()
    }

    /// Latest state name
    pub fn state_name(&self) -> Option<ChannelStateName> {
        self.current_state().map(|state| state.name)
    }

    /// Waiting on a chain confirmation
    pub fn is_pending(&self) -> bool {
        self.state_name().map_or(false, |name| name.is_pending())
    }

    /// Usable for payments right now
    pub fn is_active(&self) -> bool {
        self.is_user_connected && !self.is_pending()
    }

    /// Funding fee paid by the hub: zero when the peer opened
    pub fn funding_fee(&self) -> Amount {
        match self.initiator {
            Some(Initiator::Local) => self.open_fee,
            _ => Amount::ZERO,
        }
    }

    /// Already at `name` or past its phase
    pub fn has_reached(&self, name: ChannelStateName) -> bool {
        self.state_name()
            .map_or(false, |current| current == name || current.phase() > name.phase())
    }

    /// Enter Opening
    pub fn set_opening_state(&mut self, at: DateTime<Utc>) -> Result<ChannelUpdate> {
        self.advance(ChannelStateName::Opening, at)?;
        Ok(ChannelUpdate::ChannelOpening {
            details: self.details(self.funding_fee()),
        })
    }

    /// Opening → Opened
    pub fn set_opened_state(&mut self, at: DateTime<Utc>) -> Result<ChannelUpdate> {
        self.expect_state(ChannelStateName::Opening, ChannelStateName::Opened)?;
        let duration = self.advance(ChannelStateName::Opened, at)?;
        Ok(ChannelUpdate::ChannelOpened {
            details: self.details(self.funding_fee()),
            duration,
        })
    }

    /// Opened → Updating
    pub fn set_updating_state(&mut self, at: DateTime<Utc>, fee: Amount) -> Result<ChannelUpdate> {
        self.advance(ChannelStateName::Updating, at)?;
        Ok(ChannelUpdate::ChannelUpdating {
            details: self.details(fee),
        })
    }

    /// Updating → Opened
    pub fn set_updated_state(&mut self, at: DateTime<Utc>, fee: Amount) -> Result<ChannelUpdate> {
        self.expect_state(ChannelStateName::Updating, ChannelStateName::Opened)?;
        let duration = self.advance(ChannelStateName::Opened, at)?;
        Ok(ChannelUpdate::ChannelUpdated {
            details: self.details(fee),
            duration,
        })
    }

    /// Opened → Closing
    pub fn set_closing_state(&mut self, at: DateTime<Utc>) -> Result<ChannelUpdate> {
        self.advance(ChannelStateName::Closing, at)?;
        Ok(ChannelUpdate::ChannelClosing {
            details: self.details(self.close_fee),
        })
    }

    /// Closing → Closed
    pub fn set_closed_state(&mut self, at: DateTime<Utc>) -> Result<ChannelUpdate> {
        let duration = self.advance(ChannelStateName::Closed, at)?;
        Ok(ChannelUpdate::ChannelClosed {
            details: self.details(self.close_fee),
            duration,
        })
    }

    fn expect_state(&self, expected: ChannelStateName, to: ChannelStateName) -> Result<()> {
        if self.state_name() == Some(expected) {
            Ok(())
        } else {
            Err(self.invalid(to))
        }
    }

    /// Append `name`, returning the time spent in the previous state
    fn advance(&mut self, name: ChannelStateName, at: DateTime<Utc>) -> Result<Duration> {
        if !ChannelStateName::can_follow(self.state_name(), name) {
            return Err(self.invalid(name));
        }

        let duration = self
            .current_state()
            .and_then(|previous| (at - previous.time).to_std().ok())
            .unwrap_or_default();

        self.states.push(ChannelState { time: at, name });
        Ok(duration)
    }

    fn invalid(&self, to: ChannelStateName) -> Error {
        Error::InvalidTransition {
            channel_id: self.channel_id.clone(),
            from: self
                .state_name()
                .map_or_else(|| "none".to_string(), |name| name.to_string()),
            to: to.to_string(),
        }
    }

    fn details(&self, fee: Amount) -> TransitionDetails {
        TransitionDetails {
            channel_id: self.channel_id.clone(),
            node_id: self.node_id.clone(),
            local_balance: self.local_balance,
            remote_balance: self.remote_balance,
            fee,
            synthesized: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn channel() -> Channel {
        let mut channel = Channel::new(ChannelId::from("ff:1"), NodeId::from("03aa"));
        channel.local_balance = Amount::sat(600_000);
        channel.remote_balance = Amount::sat(400_000);
        channel.open_fee = Amount::sat(1_500);
        channel.close_fee = Amount::sat(900);
        channel
    }

    #[test]
    fn test_full_lifecycle() {
        let t0 = Utc::now();
        let mut channel = channel();
        channel.initiator = Some(Initiator::Local);

        let opening = channel.set_opening_state(t0).unwrap();
        assert_eq!(opening.details().fee, Amount::sat(1_500));
        assert!(channel.is_pending());

        let opened = channel
            .set_opened_state(t0 + ChronoDuration::seconds(600))
            .unwrap();
        assert_eq!(opened.duration(), Some(Duration::from_secs(600)));
        assert!(!channel.is_pending());

        channel.set_updating_state(t0 + ChronoDuration::seconds(700), Amount::sat(300)).unwrap();
        assert!(channel.is_pending());
        let updated = channel
            .set_updated_state(t0 + ChronoDuration::seconds(760), Amount::sat(300))
            .unwrap();
        assert_eq!(updated.duration(), Some(Duration::from_secs(60)));
        assert_eq!(updated.details().fee, Amount::sat(300));

        let closing = channel.set_closing_state(t0 + ChronoDuration::seconds(800)).unwrap();
        assert_eq!(closing.details().fee, Amount::sat(900));

        let closed = channel.set_closed_state(t0 + ChronoDuration::seconds(1_000)).unwrap();
        assert_eq!(closed.duration(), Some(Duration::from_secs(200)));

        let names: Vec<_> = channel.states().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                ChannelStateName::Opening,
                ChannelStateName::Opened,
                ChannelStateName::Updating,
                ChannelStateName::Opened,
                ChannelStateName::Closing,
                ChannelStateName::Closed,
            ]
        );
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let now = Utc::now();
        let mut channel = channel();

        assert!(channel.set_opened_state(now).is_err());
        assert!(channel.set_closed_state(now).is_err());

        channel.set_opening_state(now).unwrap();
        assert!(channel.set_opening_state(now).is_err());
        assert!(channel.set_closing_state(now).is_err());
        assert!(channel.set_updated_state(now, Amount::ZERO).is_err());

        channel.set_opened_state(now).unwrap();
        channel.set_closing_state(now).unwrap();
        channel.set_closed_state(now).unwrap();

        let err = channel.set_opening_state(now).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(channel.states().len(), 4);
    }

    #[test]
    fn test_funding_fee_only_for_local_initiator() {
        let mut channel = channel();
        assert_eq!(channel.funding_fee(), Amount::ZERO);

        channel.initiator = Some(Initiator::Remote);
        assert_eq!(channel.funding_fee(), Amount::ZERO);

        channel.initiator = Some(Initiator::Local);
        assert_eq!(channel.funding_fee(), Amount::sat(1_500));
    }

    #[test]
    fn test_is_active_requires_connection_and_settled_state() {
        let now = Utc::now();
        let mut channel = channel();
        channel.is_user_connected = true;

        channel.set_opening_state(now).unwrap();
        assert!(!channel.is_active());

        channel.set_opened_state(now).unwrap();
        assert!(channel.is_active());

        channel.is_user_connected = false;
        assert!(!channel.is_active());
    }

    #[test]
    fn test_has_reached() {
        let now = Utc::now();
        let mut channel = channel();
        assert!(!channel.has_reached(ChannelStateName::Opening));

        channel.set_opening_state(now).unwrap();
        channel.set_opened_state(now).unwrap();
        channel.set_updating_state(now, Amount::ZERO).unwrap();

        assert!(channel.has_reached(ChannelStateName::Opening));
        assert!(channel.has_reached(ChannelStateName::Updating));
        assert!(!channel.has_reached(ChannelStateName::Opened));
        assert!(!channel.has_reached(ChannelStateName::Closing));
    }

    #[test]
    fn test_clock_skew_yields_zero_duration() {
        let now = Utc::now();
        let mut channel = channel();
        channel.set_opening_state(now).unwrap();

        let opened = channel
            .set_opened_state(now - ChronoDuration::seconds(5))
            .unwrap();
        assert_eq!(opened.duration(), Some(Duration::ZERO));
    }
}
