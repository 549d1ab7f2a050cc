//! Per-channel financial snapshot, one section per lifecycle phase
//!
//! Phase fields use [`Recorded`] so that "phase not reached yet" and "phase
//! happened but the value could not be recovered" never collapse into a
//! plausible-looking zero.

use crate::channel::ChannelStateName;
use crate::types::{Amount, ChannelId, Initiator, NodeId, ShortChannelId};
use serde::{Deserialize, Serialize};

/// A phase field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recorded<T> {
    /// Phase not reached
    Unset,
    /// Observed or recovered value
    Known(T),
    /// Phase skipped or value unrecoverable
    Lost,
}

impl<T> Default for Recorded<T> {
    fn default() -> Self {
        Recorded::Unset
    }
}

impl<T> Recorded<T> {
    /// `Known` when present, `Lost` otherwise
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(value) => Recorded::Known(value),
            None => Recorded::Lost,
        }
    }

    /// Borrow the value if known
    pub fn as_known(&self) -> Option<&T> {
        match self {
            Recorded::Known(value) => Some(value),
            _ => None,
        }
    }

    /// Has a value
    pub fn is_known(&self) -> bool {
        matches!(self, Recorded::Known(_))
    }

    /// Marked unrecoverable
    pub fn is_lost(&self) -> bool {
        matches!(self, Recorded::Lost)
    }

    /// Phase not reached
    pub fn is_unset(&self) -> bool {
        matches!(self, Recorded::Unset)
    }
}

impl<T: Copy> Recorded<T> {
    /// Copy the value out if known
    pub fn value(&self) -> Option<T> {
        self.as_known().copied()
    }
}

/// Financial snapshot of one channel across its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalInfo {
    /// Funding channel point
    pub channel_id: ChannelId,
    /// Counterparty
    pub node_id: NodeId,
    /// Compact funding locator, known once the channel confirmed
    pub short_channel_id: Recorded<ShortChannelId>,

    /// When the funding transaction appeared
    pub opening_time: Recorded<i64>,
    /// Who funded the channel
    pub opening_initiator: Recorded<Initiator>,
    /// Commit fee while opening
    pub opening_commit_fee: Recorded<Amount>,
    /// On-chain fee of the funding transaction
    pub opening_fee: Recorded<Amount>,
    /// Counterparty balance while opening
    pub opening_remote_balance: Recorded<Amount>,
    /// Hub balance while opening
    pub opening_local_balance: Recorded<Amount>,

    /// When the channel was seen open
    pub open_time: Recorded<i64>,
    /// Current commit fee
    pub open_commit_fee: Recorded<Amount>,
    /// Current counterparty balance
    pub open_remote_balance: Recorded<Amount>,
    /// Current hub balance
    pub open_local_balance: Recorded<Amount>,
    /// Sum of pending HTLC amounts
    pub open_stuck_balance: Recorded<Amount>,

    /// When the close transaction appeared
    pub closing_time: Recorded<i64>,
    /// On-chain fee of the close transaction
    pub closing_fee: Recorded<Amount>,
    /// Counterparty balance at close
    pub closing_remote_balance: Recorded<Amount>,
    /// Hub balance at close
    pub closing_local_balance: Recorded<Amount>,
    /// Funds locked until a force-close is swept
    pub closing_limbo_balance: Recorded<Amount>,
    /// Fees paid sweeping outgoing HTLCs after a force-close
    pub swipe_fee: Recorded<Amount>,

    /// When the channel was seen closed
    pub close_time: Recorded<i64>,

    /// Last synced lifecycle state
    pub state: ChannelStateName,
}

impl AdditionalInfo {
    /// Fresh snapshot with every phase field unset
    pub fn new(channel_id: ChannelId, node_id: NodeId, state: ChannelStateName) -> Self {
        Self {
            channel_id,
            node_id,
            short_channel_id: Recorded::Unset,
            opening_time: Recorded::Unset,
            opening_initiator: Recorded::Unset,
            opening_commit_fee: Recorded::Unset,
            opening_fee: Recorded::Unset,
            opening_remote_balance: Recorded::Unset,
            opening_local_balance: Recorded::Unset,
            open_time: Recorded::Unset,
            open_commit_fee: Recorded::Unset,
            open_remote_balance: Recorded::Unset,
            open_local_balance: Recorded::Unset,
            open_stuck_balance: Recorded::Unset,
            closing_time: Recorded::Unset,
            closing_fee: Recorded::Unset,
            closing_remote_balance: Recorded::Unset,
            closing_local_balance: Recorded::Unset,
            closing_limbo_balance: Recorded::Unset,
            swipe_fee: Recorded::Unset,
            close_time: Recorded::Unset,
            state,
        }
    }

    /// Opening section fields that are lost
    pub fn lost_opening_fields(&self) -> usize {
        [
            self.opening_commit_fee.is_lost(),
            self.opening_fee.is_lost(),
            self.opening_remote_balance.is_lost(),
            self.opening_local_balance.is_lost(),
            self.opening_initiator.is_lost(),
            self.opening_time.is_lost(),
        ]
        .iter()
        .filter(|lost| **lost)
        .count()
    }
}
