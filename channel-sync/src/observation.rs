//! One channel as seen in one daemon list, normalised across categories

use crate::daemon::{
    ClosedChannel, ForceClosingChannel, OpenChannel, PendingCloseChannel, PendingOpenChannel,
    WaitingCloseChannel,
};
use crate::transition::Category;
use channel_core::{AdditionalInfo, Amount, Channel, ChannelId, NodeId, ShortChannelId};

#[derive(Debug, Clone)]
pub(crate) struct Observation {
    pub category: Category,
    pub channel_id: ChannelId,
    pub node_id: NodeId,
    pub capacity: Option<Amount>,
    pub local_balance: Option<Amount>,
    pub remote_balance: Option<Amount>,
    pub commit_fee: Option<Amount>,
    pub short_channel_id: Option<ShortChannelId>,
    pub active: bool,
    pub stuck_balance: Option<Amount>,
    pub limbo_balance: Option<Amount>,
    pub closing_txid: Option<String>,
    pub force_close: bool,
    /// Sweep transactions of outgoing HTLCs after a force close
    pub outgoing_sweeps: Vec<String>,
}

impl Observation {
    fn new(category: Category, channel_id: ChannelId, node_id: NodeId) -> Self {
        Self {
            category,
            channel_id,
            node_id,
            capacity: None,
            local_balance: None,
            remote_balance: None,
            commit_fee: None,
            short_channel_id: None,
            active: false,
            stuck_balance: None,
            limbo_balance: None,
            closing_txid: None,
            force_close: false,
            outgoing_sweeps: Vec::new(),
        }
    }

    fn with_snapshot(category: Category, snapshot: &crate::daemon::ChannelSnapshot) -> Self {
        let mut observation = Self::new(
            category,
            snapshot.channel_id.clone(),
            snapshot.node_id.clone(),
        );
        observation.capacity = Some(snapshot.capacity);
        observation.local_balance = Some(snapshot.local_balance);
        observation.remote_balance = Some(snapshot.remote_balance);
        observation.commit_fee = snapshot.commit_fee;
        observation
    }

    /// Cached channel missing from every list this tick
    pub fn vanished(info: &AdditionalInfo) -> Self {
        Self::new(
            Category::Vanished,
            info.channel_id.clone(),
            info.node_id.clone(),
        )
    }

    /// Copy current daemon values onto the live channel
    pub fn apply_to(&self, channel: &mut Channel) {
        if let Some(capacity) = self.capacity {
            channel.funding_amount = capacity;
        }
        if let Some(local) = self.local_balance {
            channel.local_balance = local;
        }
        if let Some(remote) = self.remote_balance {
            channel.remote_balance = remote;
        }
        if self.category == Category::Open {
            if let Some(commit_fee) = self.commit_fee {
                channel.close_fee = commit_fee;
            }
        }
        channel.is_user_connected = self.active;
    }
}

impl From<&PendingOpenChannel> for Observation {
    fn from(entry: &PendingOpenChannel) -> Self {
        Self::with_snapshot(Category::PendingOpen, &entry.channel)
    }
}

impl From<&OpenChannel> for Observation {
    fn from(entry: &OpenChannel) -> Self {
        let mut observation = Self::with_snapshot(Category::Open, &entry.channel);
        observation.short_channel_id = Some(entry.short_channel_id);
        observation.active = entry.active;
        observation.stuck_balance = Some(entry.pending_htlcs.iter().map(|htlc| htlc.amount).sum());
        observation
    }
}

impl From<&WaitingCloseChannel> for Observation {
    fn from(entry: &WaitingCloseChannel) -> Self {
        let mut observation = Self::with_snapshot(Category::WaitingClose, &entry.channel);
        observation.limbo_balance = Some(entry.limbo_balance);
        observation
    }
}

impl From<&PendingCloseChannel> for Observation {
    fn from(entry: &PendingCloseChannel) -> Self {
        let mut observation = Self::with_snapshot(Category::PendingClosing, &entry.channel);
        observation.closing_txid = Some(entry.closing_txid.clone());
        observation
    }
}

impl From<&ForceClosingChannel> for Observation {
    fn from(entry: &ForceClosingChannel) -> Self {
        let mut observation = Self::with_snapshot(Category::ForceClosing, &entry.channel);
        observation.closing_txid = Some(entry.closing_txid.clone());
        observation.limbo_balance = Some(entry.limbo_balance);
        observation.force_close = true;
        observation.outgoing_sweeps = entry
            .pending_htlcs
            .iter()
            .filter(|htlc| !htlc.incoming)
            .map(|htlc| htlc.sweep_txid.clone())
            .collect();
        observation
    }
}

impl From<&ClosedChannel> for Observation {
    fn from(entry: &ClosedChannel) -> Self {
        let mut observation = Self::new(
            Category::Closed,
            entry.channel_id.clone(),
            entry.node_id.clone(),
        );
        observation.capacity = Some(entry.capacity);
        observation.local_balance = Some(entry.settled_balance);
        observation.short_channel_id = entry.short_channel_id;
        observation.closing_txid = Some(entry.closing_txid.clone());
        observation
    }
}
