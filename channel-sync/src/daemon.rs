//! Lightning daemon collaborator
//!
//! The daemon reports channels in six lists. Each entry type carries only
//! what the daemon knows about channels in that category.

use crate::Result;
use async_trait::async_trait;
use channel_core::{Amount, ChannelId, NodeId, ShortChannelId};

/// Fields every daemon list entry shares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSnapshot {
    /// Funding channel point
    pub channel_id: ChannelId,
    /// Counterparty
    pub node_id: NodeId,
    /// Channel capacity
    pub capacity: Amount,
    /// Hub side balance
    pub local_balance: Amount,
    /// Counterparty side balance
    pub remote_balance: Amount,
    /// Commitment transaction fee, when the daemon reports it
    pub commit_fee: Option<Amount>,
}

/// In-flight HTLC on a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Htlc {
    /// HTLC amount
    pub amount: Amount,
    /// Offered to us rather than by us
    pub incoming: bool,
    /// Transaction that sweeps (or will sweep) the HTLC output
    pub sweep_txid: String,
}

/// Funding broadcast, not yet confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOpenChannel {
    /// Shared fields
    pub channel: ChannelSnapshot,
}

/// Confirmed and usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenChannel {
    /// Shared fields
    pub channel: ChannelSnapshot,
    /// Compact funding locator
    pub short_channel_id: ShortChannelId,
    /// Peer connected and channel enabled
    pub active: bool,
    /// HTLCs awaiting settlement
    pub pending_htlcs: Vec<Htlc>,
}

/// Close negotiated, close transaction not broadcast yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingCloseChannel {
    /// Shared fields
    pub channel: ChannelSnapshot,
    /// Funds locked until the close confirms
    pub limbo_balance: Amount,
}

/// Cooperative close broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCloseChannel {
    /// Shared fields
    pub channel: ChannelSnapshot,
    /// Close transaction
    pub closing_txid: String,
}

/// Unilateral close broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceClosingChannel {
    /// Shared fields
    pub channel: ChannelSnapshot,
    /// Commitment transaction that closed the channel
    pub closing_txid: String,
    /// Funds locked until the timelocks expire
    pub limbo_balance: Amount,
    /// HTLCs still to be swept
    pub pending_htlcs: Vec<Htlc>,
}

/// Fully closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedChannel {
    /// Funding channel point
    pub channel_id: ChannelId,
    /// Counterparty
    pub node_id: NodeId,
    /// Channel capacity
    pub capacity: Amount,
    /// Close transaction
    pub closing_txid: String,
    /// Hub side balance paid out by the close
    pub settled_balance: Amount,
    /// Compact funding locator, when the daemon still knows it
    pub short_channel_id: Option<ShortChannelId>,
}

/// The four pending lists, returned by one daemon call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChannels {
    /// Opening
    pub pending_open: Vec<PendingOpenChannel>,
    /// Waiting for the close transaction
    pub waiting_close: Vec<WaitingCloseChannel>,
    /// Cooperative close in flight
    pub pending_closing: Vec<PendingCloseChannel>,
    /// Force close in flight
    pub pending_force_closing: Vec<ForceClosingChannel>,
}

/// Channel listing calls of the lightning daemon
#[async_trait]
pub trait DaemonClient: Send + Sync {
    /// Confirmed channels
    async fn list_open_channels(&self) -> Result<Vec<OpenChannel>>;

    /// Channels waiting on a chain confirmation
    async fn list_pending_channels(&self) -> Result<PendingChannels>;

    /// Closed channels
    async fn list_closed_channels(&self) -> Result<Vec<ClosedChannel>>;
}
