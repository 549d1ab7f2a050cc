//! Persistence seams
//!
//! Three narrow traits, one per concern:
//! - [`InfoStorage`] - AdditionalInfo by channel id or short channel id
//! - [`IndexStorage`] - short channel id ↔ channel id / node id lookups
//! - [`ChannelStorage`] - live channels with their state history
//!
//! Every write is an idempotent upsert. Backends must tolerate concurrent
//! readers alongside the single reconciliation writer.

use crate::channel::Channel;
use crate::error::Result;
use crate::info::AdditionalInfo;
use crate::types::{ChannelId, NodeId, ShortChannelId};

mod memory;
#[cfg(feature = "rocks")]
mod rocks;

pub use memory::MemoryStorage;
#[cfg(feature = "rocks")]
pub use rocks::RocksStorage;

/// AdditionalInfo store
pub trait InfoStorage: Send + Sync {
    /// Fetch by channel id; `Error::InfoNotFound` when absent
    fn get_info(&self, channel_id: &ChannelId) -> Result<AdditionalInfo>;

    /// Fetch by short channel id; `Error::ShortIdNotFound` when absent
    fn get_info_by_short_id(&self, short_id: ShortChannelId) -> Result<AdditionalInfo>;

    /// Insert or replace
    fn upsert_info(&self, info: &AdditionalInfo) -> Result<()>;

    /// Every stored snapshot
    fn infos(&self) -> Result<Vec<AdditionalInfo>>;

    /// `get_info` with the miss folded into `None`
    fn find_info(&self, channel_id: &ChannelId) -> Result<Option<AdditionalInfo>> {
        match self.get_info(channel_id) {
            Ok(info) => Ok(Some(info)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Short channel id lookups
pub trait IndexStorage: Send + Sync {
    /// Record channel id ↔ short channel id
    fn add_channel_index(&self, channel_id: &ChannelId, short_id: ShortChannelId) -> Result<()>;

    /// Record node id ↔ short channel id
    fn add_user_index(&self, node_id: &NodeId, short_id: ShortChannelId) -> Result<()>;

    /// Channel funded at `short_id`
    fn channel_id_by_short_id(&self, short_id: ShortChannelId) -> Result<ChannelId>;

    /// Counterparty of the channel at `short_id`
    fn node_id_by_short_id(&self, short_id: ShortChannelId) -> Result<NodeId>;

    /// Short channel id of `channel_id`
    fn short_id_by_channel_id(&self, channel_id: &ChannelId) -> Result<ShortChannelId>;
}

/// Live channel store
pub trait ChannelStorage: Send + Sync {
    /// Insert or replace
    fn upsert_channel(&self, channel: &Channel) -> Result<()>;

    /// Every stored channel
    fn channels(&self) -> Result<Vec<Channel>>;
}

/// Everything reconciliation needs from a backend
pub trait Storage: InfoStorage + IndexStorage + ChannelStorage {}

impl<S> Storage for S where S: InfoStorage + IndexStorage + ChannelStorage {}
