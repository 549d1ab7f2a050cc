//! RocksDB backend
//!
//! # Column Families
//!
//! - `channel_info` - AdditionalInfo (key: channel id)
//! - `channels` - live channels with history (key: channel id)
//! - `short_id_channel` - short channel id → channel id (key: u64 BE)
//! - `short_id_node` - short channel id → node id (key: u64 BE)
//! - `channel_short_id` - channel id → short channel id

use super::{ChannelStorage, IndexStorage, InfoStorage};
use crate::channel::Channel;
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::info::AdditionalInfo;
use crate::types::{ChannelId, NodeId, ShortChannelId};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, DB};
use serde::de::DeserializeOwned;
use std::fmt;

const CF_CHANNEL_INFO: &str = "channel_info";
const CF_CHANNELS: &str = "channels";
const CF_SHORT_ID_CHANNEL: &str = "short_id_channel";
const CF_SHORT_ID_NODE: &str = "short_id_node";
const CF_CHANNEL_SHORT_ID: &str = "channel_short_id";

const COLUMN_FAMILIES: [&str; 5] = [
    CF_CHANNEL_INFO,
    CF_CHANNELS,
    CF_SHORT_ID_CHANNEL,
    CF_SHORT_ID_NODE,
    CF_CHANNEL_SHORT_ID,
];

/// Persistent storage on RocksDB
pub struct RocksStorage {
    db: DB,
}

impl RocksStorage {
    /// Open or create the database under `config.data_dir`
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let path = &config.data_dir;
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name)))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened channel store");

        Ok(Self { db })
    }

    fn cf_options(name: &str) -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        if name != CF_CHANNEL_INFO && name != CF_CHANNELS {
            // Point lookups only
            let mut block_opts = rocksdb::BlockBasedOptions::default();
            block_opts.set_bloom_filter(10.0, false);
            opts.set_block_based_table_factory(&block_opts);
        }
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn short_id_key(short_id: ShortChannelId) -> [u8; 8] {
        short_id.as_u64().to_be_bytes()
    }

    fn get_value<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf_handle(cf)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let cf = self.cf_handle(cf)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            values.push(bincode::deserialize(&value)?);
        }
        Ok(values)
    }
}

impl fmt::Debug for RocksStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RocksStorage")
            .field("path", &self.db.path())
            .finish()
    }
}

impl InfoStorage for RocksStorage {
    fn get_info(&self, channel_id: &ChannelId) -> Result<AdditionalInfo> {
        self.get_value(CF_CHANNEL_INFO, channel_id.as_str().as_bytes())?
            .ok_or_else(|| Error::InfoNotFound(channel_id.clone()))
    }

    fn get_info_by_short_id(&self, short_id: ShortChannelId) -> Result<AdditionalInfo> {
        let channel_id: Option<ChannelId> =
            self.get_value(CF_SHORT_ID_CHANNEL, &Self::short_id_key(short_id))?;

        if let Some(channel_id) = channel_id {
            if let Some(info) = self.get_value(CF_CHANNEL_INFO, channel_id.as_str().as_bytes())? {
                return Ok(info);
            }
        }

        self.infos()?
            .into_iter()
            .find(|info| info.short_channel_id.value() == Some(short_id))
            .ok_or(Error::ShortIdNotFound(short_id))
    }

    fn upsert_info(&self, info: &AdditionalInfo) -> Result<()> {
        let cf = self.cf_handle(CF_CHANNEL_INFO)?;
        let value = bincode::serialize(info)?;
        self.db.put_cf(cf, info.channel_id.as_str().as_bytes(), value)?;

        tracing::trace!(channel_id = %info.channel_id, state = %info.state, "Channel info stored");
        Ok(())
    }

    fn infos(&self) -> Result<Vec<AdditionalInfo>> {
        self.scan(CF_CHANNEL_INFO)
    }
}

impl IndexStorage for RocksStorage {
    fn add_channel_index(&self, channel_id: &ChannelId, short_id: ShortChannelId) -> Result<()> {
        let forward = self.cf_handle(CF_SHORT_ID_CHANNEL)?;
        let reverse = self.cf_handle(CF_CHANNEL_SHORT_ID)?;

        let mut batch = rocksdb::WriteBatch::default();
        batch.put_cf(forward, Self::short_id_key(short_id), bincode::serialize(channel_id)?);
        batch.put_cf(
            reverse,
            channel_id.as_str().as_bytes(),
            bincode::serialize(&short_id)?,
        );
        self.db.write(batch)?;
        Ok(())
    }

    fn add_user_index(&self, node_id: &NodeId, short_id: ShortChannelId) -> Result<()> {
        let cf = self.cf_handle(CF_SHORT_ID_NODE)?;
        self.db
            .put_cf(cf, Self::short_id_key(short_id), bincode::serialize(node_id)?)?;
        Ok(())
    }

    fn channel_id_by_short_id(&self, short_id: ShortChannelId) -> Result<ChannelId> {
        self.get_value(CF_SHORT_ID_CHANNEL, &Self::short_id_key(short_id))?
            .ok_or_else(|| Error::IndexNotFound(format!("channel for {}", short_id)))
    }

    fn node_id_by_short_id(&self, short_id: ShortChannelId) -> Result<NodeId> {
        self.get_value(CF_SHORT_ID_NODE, &Self::short_id_key(short_id))?
            .ok_or_else(|| Error::IndexNotFound(format!("node for {}", short_id)))
    }

    fn short_id_by_channel_id(&self, channel_id: &ChannelId) -> Result<ShortChannelId> {
        self.get_value(CF_CHANNEL_SHORT_ID, channel_id.as_str().as_bytes())?
            .ok_or_else(|| Error::IndexNotFound(format!("short id for {}", channel_id)))
    }
}

impl ChannelStorage for RocksStorage {
    fn upsert_channel(&self, channel: &Channel) -> Result<()> {
        let cf = self.cf_handle(CF_CHANNELS)?;
        let value = bincode::serialize(channel)?;
        self.db
            .put_cf(cf, channel.channel_id.as_str().as_bytes(), value)?;
        Ok(())
    }

    fn channels(&self) -> Result<Vec<Channel>> {
        self.scan(CF_CHANNELS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelStateName;
    use crate::info::Recorded;
    use crate::types::Amount;
    use chrono::Utc;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> RocksStorage {
        RocksStorage::open(&StorageConfig::with_data_dir(dir.path())).unwrap()
    }

    #[test]
    fn test_info_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let mut info = AdditionalInfo::new(
            ChannelId::from("aa:0"),
            NodeId::from("02ab"),
            ChannelStateName::Closed,
        );
        info.opening_fee = Recorded::Lost;
        info.closing_fee = Recorded::Known(Amount::sat(420));

        {
            let storage = open(&dir);
            storage.upsert_info(&info).unwrap();
        }

        let storage = open(&dir);
        assert_eq!(storage.get_info(&info.channel_id).unwrap(), info);
        assert_eq!(storage.infos().unwrap().len(), 1);
        assert!(storage
            .get_info(&ChannelId::from("zz:9"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_indices() {
        let dir = TempDir::new().unwrap();
        let storage = open(&dir);
        let short_id = ShortChannelId::new(700_000, 12, 1);
        let channel_id = ChannelId::from("bb:1");
        let node_id = NodeId::from("03cd");

        let mut info = AdditionalInfo::new(
            channel_id.clone(),
            node_id.clone(),
            ChannelStateName::Opened,
        );
        info.short_channel_id = Recorded::Known(short_id);
        storage.upsert_info(&info).unwrap();

        storage.add_channel_index(&channel_id, short_id).unwrap();
        storage.add_channel_index(&channel_id, short_id).unwrap();
        storage.add_user_index(&node_id, short_id).unwrap();

        assert_eq!(storage.channel_id_by_short_id(short_id).unwrap(), channel_id);
        assert_eq!(storage.node_id_by_short_id(short_id).unwrap(), node_id);
        assert_eq!(storage.short_id_by_channel_id(&channel_id).unwrap(), short_id);
        assert_eq!(storage.get_info_by_short_id(short_id).unwrap(), info);
    }

    #[test]
    fn test_channel_history_persisted() {
        let dir = TempDir::new().unwrap();
        let storage = open(&dir);

        let mut channel = Channel::new(ChannelId::from("cc:0"), NodeId::from("02ee"));
        channel.set_opening_state(Utc::now()).unwrap();
        channel.set_opened_state(Utc::now()).unwrap();
        storage.upsert_channel(&channel).unwrap();

        let stored = storage.channels().unwrap();
        assert_eq!(stored, vec![channel]);
        assert_eq!(stored[0].states().len(), 2);
    }
}
