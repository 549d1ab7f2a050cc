//! In-process backend, used by tests and single-node setups without a disk

use super::{ChannelStorage, IndexStorage, InfoStorage};
use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::info::{AdditionalInfo, Recorded};
use crate::types::{ChannelId, NodeId, ShortChannelId};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct Tables {
    infos: BTreeMap<ChannelId, AdditionalInfo>,
    channels: BTreeMap<ChannelId, Channel>,
    short_id_channel: BTreeMap<ShortChannelId, ChannelId>,
    short_id_node: BTreeMap<ShortChannelId, NodeId>,
    channel_short_id: BTreeMap<ChannelId, ShortChannelId>,
}

/// Map-backed storage behind a single reader-writer lock
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl InfoStorage for MemoryStorage {
    fn get_info(&self, channel_id: &ChannelId) -> Result<AdditionalInfo> {
        self.tables
            .read()
            .infos
            .get(channel_id)
            .cloned()
            .ok_or_else(|| Error::InfoNotFound(channel_id.clone()))
    }

    fn get_info_by_short_id(&self, short_id: ShortChannelId) -> Result<AdditionalInfo> {
        let tables = self.tables.read();

        if let Some(channel_id) = tables.short_id_channel.get(&short_id) {
            if let Some(info) = tables.infos.get(channel_id) {
                return Ok(info.clone());
            }
        }

        tables
            .infos
            .values()
            .find(|info| info.short_channel_id == Recorded::Known(short_id))
            .cloned()
            .ok_or(Error::ShortIdNotFound(short_id))
    }

    fn upsert_info(&self, info: &AdditionalInfo) -> Result<()> {
        self.tables
            .write()
            .infos
            .insert(info.channel_id.clone(), info.clone());
        Ok(())
    }

    fn infos(&self) -> Result<Vec<AdditionalInfo>> {
        Ok(self.tables.read().infos.values().cloned().collect())
    }
}

impl IndexStorage for MemoryStorage {
    fn add_channel_index(&self, channel_id: &ChannelId, short_id: ShortChannelId) -> Result<()> {
        let mut tables = self.tables.write();
        tables.short_id_channel.insert(short_id, channel_id.clone());
        tables.channel_short_id.insert(channel_id.clone(), short_id);
        Ok(())
    }

    fn add_user_index(&self, node_id: &NodeId, short_id: ShortChannelId) -> Result<()> {
        self.tables
            .write()
            .short_id_node
            .insert(short_id, node_id.clone());
        Ok(())
    }

    fn channel_id_by_short_id(&self, short_id: ShortChannelId) -> Result<ChannelId> {
        self.tables
            .read()
            .short_id_channel
            .get(&short_id)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound(format!("channel for {}", short_id)))
    }

    fn node_id_by_short_id(&self, short_id: ShortChannelId) -> Result<NodeId> {
        self.tables
            .read()
            .short_id_node
            .get(&short_id)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound(format!("node for {}", short_id)))
    }

    fn short_id_by_channel_id(&self, channel_id: &ChannelId) -> Result<ShortChannelId> {
        self.tables
            .read()
            .channel_short_id
            .get(channel_id)
            .copied()
            .ok_or_else(|| Error::IndexNotFound(format!("short id for {}", channel_id)))
    }
}

impl ChannelStorage for MemoryStorage {
    fn upsert_channel(&self, channel: &Channel) -> Result<()> {
        self.tables
            .write()
            .channels
            .insert(channel.channel_id.clone(), channel.clone());
        Ok(())
    }

    fn channels(&self) -> Result<Vec<Channel>> {
        Ok(self.tables.read().channels.values().cloned().collect())
    }
}
