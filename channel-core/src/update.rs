//! Lifecycle events published on every channel transition

use crate::channel::ChannelStateName;
use crate::types::{Amount, ChannelId, NodeId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Payload common to every lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDetails {
    /// Channel that moved
    pub channel_id: ChannelId,
    /// Counterparty
    pub node_id: NodeId,
    /// Hub side balance at transition time
    pub local_balance: Amount,
    /// Counterparty side balance at transition time
    pub remote_balance: Amount,
    /// Fee attached to the phase (funding, update or close fee)
    pub fee: Amount,
    /// Inferred by reconciliation instead of observed
    pub synthesized: bool,
}

/// Channel lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelUpdate {
    /// Funding transaction broadcast, not yet confirmed
    ChannelOpening {
        /// Event payload
        #[serde(flatten)]
        details: TransitionDetails,
    },

    /// Funding confirmed, channel usable
    ChannelOpened {
        /// Event payload
        #[serde(flatten)]
        details: TransitionDetails,
        /// Time spent opening
        duration: Duration,
    },

    /// Capacity change in progress
    ChannelUpdating {
        /// Event payload
        #[serde(flatten)]
        details: TransitionDetails,
    },

    /// Capacity change finished
    ChannelUpdated {
        /// Event payload
        #[serde(flatten)]
        details: TransitionDetails,
        /// Time spent updating
        duration: Duration,
    },

    /// Close transaction broadcast
    ChannelClosing {
        /// Event payload
        #[serde(flatten)]
        details: TransitionDetails,
    },

    /// Channel fully closed
    ChannelClosed {
        /// Event payload
        #[serde(flatten)]
        details: TransitionDetails,
        /// Time spent closing
        duration: Duration,
    },
}

impl ChannelUpdate {
    /// Shared payload
    pub fn details(&self) -> &TransitionDetails {
        match self {
            ChannelUpdate::ChannelOpening { details }
            | ChannelUpdate::ChannelOpened { details, .. }
            | ChannelUpdate::ChannelUpdating { details }
            | ChannelUpdate::ChannelUpdated { details, .. }
            | ChannelUpdate::ChannelClosing { details }
            | ChannelUpdate::ChannelClosed { details, .. } => details,
        }
    }

    fn details_mut(&mut self) -> &mut TransitionDetails {
        match self {
            ChannelUpdate::ChannelOpening { details }
            | ChannelUpdate::ChannelOpened { details, .. }
            | ChannelUpdate::ChannelUpdating { details }
            | ChannelUpdate::ChannelUpdated { details, .. }
            | ChannelUpdate::ChannelClosing { details }
            | ChannelUpdate::ChannelClosed { details, .. } => details,
        }
    }

    /// Channel the event is about
    pub fn channel_id(&self) -> &ChannelId {
        &self.details().channel_id
    }

    /// State the channel entered
    pub fn state(&self) -> ChannelStateName {
        match self {
            ChannelUpdate::ChannelOpening { .. } => ChannelStateName::Opening,
            ChannelUpdate::ChannelOpened { .. } | ChannelUpdate::ChannelUpdated { .. } => {
                ChannelStateName::Opened
            }
            ChannelUpdate::ChannelUpdating { .. } => ChannelStateName::Updating,
            ChannelUpdate::ChannelClosing { .. } => ChannelStateName::Closing,
            ChannelUpdate::ChannelClosed { .. } => ChannelStateName::Closed,
        }
    }

    /// Time spent in the previous state, when the event carries it
    pub fn duration(&self) -> Option<Duration> {
        match self {
            ChannelUpdate::ChannelOpened { duration, .. }
            | ChannelUpdate::ChannelUpdated { duration, .. }
            | ChannelUpdate::ChannelClosed { duration, .. } => Some(*duration),
            _ => None,
        }
    }

    /// Mark as inferred rather than observed
    pub fn synthesized(mut self) -> Self {
        self.details_mut().synthesized = true;
        self
    }

    /// Whether the transition was inferred
    pub fn is_synthesized(&self) -> bool {
        self.details().synthesized
    }
}
