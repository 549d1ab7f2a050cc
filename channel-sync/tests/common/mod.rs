//! Shared fakes for the engine tests
#![allow(dead_code)]

use async_trait::async_trait;
use channel_core::{
    AdditionalInfo, Amount, Channel, ChannelId, ChannelStorage, ChannelUpdate, IndexStorage,
    InfoStorage, MemoryStorage, NodeId, ShortChannelId,
};
use channel_sync::daemon::{
    ChannelSnapshot, ClosedChannel, ForceClosingChannel, Htlc, OpenChannel, PendingChannels,
    PendingCloseChannel, PendingOpenChannel, WaitingCloseChannel,
};
use channel_sync::{DaemonClient, Error, Explorer, RetryConfig, SyncConfig, SyncEngine, SyncMetrics};
use hub_broadcast::{Broadcaster, Receiver};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const NODE: &str = "02c0ffee";
pub const TX_TIME: i64 = 1_600_000_000;
pub const TX_FEE: i64 = 500;
pub const TX_HEIGHT: u32 = 700_000;
pub const TX_INDEX: u32 = 42;

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

#[derive(Default, Clone)]
struct DaemonLists {
    open: Vec<OpenChannel>,
    pending: PendingChannels,
    closed: Vec<ClosedChannel>,
}

/// Scriptable daemon: tests replace the lists between ticks
#[derive(Default)]
pub struct FakeDaemon {
    lists: Mutex<DaemonLists>,
    after_open_listing: Mutex<Option<DaemonLists>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeDaemon {
    pub fn clear(&self) {
        *self.lists.lock() = DaemonLists::default();
    }

    pub fn set_open(&self, open: Vec<OpenChannel>) {
        self.lists.lock().open = open;
    }

    pub fn set_pending(&self, pending: PendingChannels) {
        self.lists.lock().pending = pending;
    }

    pub fn set_closed(&self, closed: Vec<ClosedChannel>) {
        self.lists.lock().closed = closed;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Replace the open and pending lists right after the next open listing
    /// returns, as if channels moved between lists mid-fetch
    pub fn move_after_open_listing(&self, open: Vec<OpenChannel>, pending: PendingChannels) {
        let mut next = self.lists.lock().clone();
        next.open = open;
        next.pending = pending;
        *self.after_open_listing.lock() = Some(next);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> channel_sync::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Daemon("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DaemonClient for FakeDaemon {
    async fn list_open_channels(&self) -> channel_sync::Result<Vec<OpenChannel>> {
        self.check()?;
        let open = self.lists.lock().open.clone();
        if let Some(next) = self.after_open_listing.lock().take() {
            *self.lists.lock() = next;
        }
        Ok(open)
    }

    async fn list_pending_channels(&self) -> channel_sync::Result<PendingChannels> {
        self.check()?;
        Ok(self.lists.lock().pending.clone())
    }

    async fn list_closed_channels(&self) -> channel_sync::Result<Vec<ClosedChannel>> {
        self.check()?;
        Ok(self.lists.lock().closed.clone())
    }
}

// ---------------------------------------------------------------------------
// Explorer
// ---------------------------------------------------------------------------

/// Explorer that knows every transaction, with per-tx fee overrides
#[derive(Default)]
pub struct FakeExplorer {
    fees: Mutex<HashMap<String, Amount>>,
    failing: AtomicBool,
}

impl FakeExplorer {
    pub fn set_fee(&self, txid: &str, fee: Amount) {
        self.fees.lock().insert(txid.to_string(), fee);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> channel_sync::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Explorer("503 service unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Explorer for FakeExplorer {
    async fn fetch_tx_fee(&self, txid: &str) -> channel_sync::Result<Amount> {
        self.check()?;
        Ok(self
            .fees
            .lock()
            .get(txid)
            .copied()
            .unwrap_or(Amount::sat(TX_FEE)))
    }

    async fn fetch_tx_time(&self, _txid: &str) -> channel_sync::Result<i64> {
        self.check()?;
        Ok(TX_TIME)
    }

    async fn fetch_tx_height(&self, _txid: &str) -> channel_sync::Result<u32> {
        self.check()?;
        Ok(TX_HEIGHT)
    }

    async fn fetch_tx_index_in_block(&self, _txid: &str) -> channel_sync::Result<u32> {
        self.check()?;
        Ok(TX_INDEX)
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// MemoryStorage with injectable write failures
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    broken_channels: Mutex<HashSet<ChannelId>>,
    broken_index: AtomicBool,
    info_writes: AtomicUsize,
}

impl FlakyStorage {
    /// Every info write for `channel_id` fails
    pub fn break_channel(&self, channel_id: &ChannelId) {
        self.broken_channels.lock().insert(channel_id.clone());
    }

    pub fn break_index(&self, broken: bool) {
        self.broken_index.store(broken, Ordering::SeqCst);
    }

    pub fn info_writes(&self) -> usize {
        self.info_writes.load(Ordering::SeqCst)
    }

    fn unavailable() -> channel_core::Error {
        channel_core::Error::Storage("disk unavailable".to_string())
    }

    fn index_check(&self) -> channel_core::Result<()> {
        if self.broken_index.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(())
    }
}

impl InfoStorage for FlakyStorage {
    fn get_info(&self, channel_id: &ChannelId) -> channel_core::Result<AdditionalInfo> {
        self.inner.get_info(channel_id)
    }

    fn get_info_by_short_id(&self, short_id: ShortChannelId) -> channel_core::Result<AdditionalInfo> {
        self.inner.get_info_by_short_id(short_id)
    }

    fn upsert_info(&self, info: &AdditionalInfo) -> channel_core::Result<()> {
        if self.broken_channels.lock().contains(&info.channel_id) {
            return Err(Self::unavailable());
        }
        self.info_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_info(info)
    }

    fn infos(&self) -> channel_core::Result<Vec<AdditionalInfo>> {
        self.inner.infos()
    }
}

impl IndexStorage for FlakyStorage {
    fn add_channel_index(
        &self,
        channel_id: &ChannelId,
        short_id: ShortChannelId,
    ) -> channel_core::Result<()> {
        self.index_check()?;
        self.inner.add_channel_index(channel_id, short_id)
    }

    fn add_user_index(&self, node_id: &NodeId, short_id: ShortChannelId) -> channel_core::Result<()> {
        self.index_check()?;
        self.inner.add_user_index(node_id, short_id)
    }

    fn channel_id_by_short_id(&self, short_id: ShortChannelId) -> channel_core::Result<ChannelId> {
        self.inner.channel_id_by_short_id(short_id)
    }

    fn node_id_by_short_id(&self, short_id: ShortChannelId) -> channel_core::Result<NodeId> {
        self.inner.node_id_by_short_id(short_id)
    }

    fn short_id_by_channel_id(&self, channel_id: &ChannelId) -> channel_core::Result<ShortChannelId> {
        self.inner.short_id_by_channel_id(channel_id)
    }
}

impl ChannelStorage for FlakyStorage {
    fn upsert_channel(&self, channel: &Channel) -> channel_core::Result<()> {
        if self.broken_channels.lock().contains(&channel.channel_id) {
            return Err(Self::unavailable());
        }
        self.inner.upsert_channel(channel)
    }

    fn channels(&self) -> channel_core::Result<Vec<Channel>> {
        self.inner.channels()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Short deadlines and a retry budget of a few milliseconds
pub fn sync_config() -> SyncConfig {
    SyncConfig {
        interval_ms: 50,
        daemon_timeout_ms: 1_000,
        explorer_timeout_ms: 200,
        retry: RetryConfig {
            initial_interval_ms: 1,
            max_interval_ms: 2,
            max_elapsed_ms: 10,
        },
    }
}

pub struct Harness {
    pub daemon: Arc<FakeDaemon>,
    pub explorer: Arc<FakeExplorer>,
    pub storage: Arc<FlakyStorage>,
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    pub fn new() -> Self {
        let daemon = Arc::new(FakeDaemon::default());
        let explorer = Arc::new(FakeExplorer::default());
        let storage = Arc::new(FlakyStorage::default());
        let engine = Self::engine(&daemon, &explorer, &storage);

        Self {
            daemon,
            explorer,
            storage,
            engine,
        }
    }

    /// Fresh engine over the same collaborators and storage
    pub fn restart(&self) -> Arc<SyncEngine> {
        Self::engine(&self.daemon, &self.explorer, &self.storage)
    }

    fn engine(
        daemon: &Arc<FakeDaemon>,
        explorer: &Arc<FakeExplorer>,
        storage: &Arc<FlakyStorage>,
    ) -> Arc<SyncEngine> {
        let engine = SyncEngine::new(
            sync_config(),
            daemon.clone(),
            explorer.clone(),
            storage.clone(),
            Broadcaster::new(),
            SyncMetrics::new().unwrap(),
        )
        .unwrap();
        Arc::new(engine)
    }

    pub fn info(&self, channel_id: &ChannelId) -> AdditionalInfo {
        self.storage.get_info(channel_id).unwrap()
    }
}

/// Everything published so far, waiting briefly for stragglers
pub async fn drain(receiver: &mut Receiver<ChannelUpdate>) -> Vec<ChannelUpdate> {
    let mut updates = Vec::new();
    while let Ok(Some(update)) = tokio::time::timeout(Duration::from_millis(100), receiver.read()).await {
        updates.push(update);
    }
    updates
}

// ---------------------------------------------------------------------------
// Daemon entries
// ---------------------------------------------------------------------------

pub fn channel_id(n: u8) -> ChannelId {
    ChannelId::new(format!("{:02x}{}:0", n, "f".repeat(62)))
}

pub fn snapshot(channel_id: &ChannelId, local: i64, remote: i64) -> ChannelSnapshot {
    ChannelSnapshot {
        channel_id: channel_id.clone(),
        node_id: NodeId::from(NODE),
        capacity: Amount::sat(local + remote + 10_000),
        local_balance: Amount::sat(local),
        remote_balance: Amount::sat(remote),
        commit_fee: Some(Amount::sat(2_500)),
    }
}

pub fn pending_open(channel_id: &ChannelId) -> PendingOpenChannel {
    PendingOpenChannel {
        channel: snapshot(channel_id, 1_000_000, 0),
    }
}

pub fn open(channel_id: &ChannelId, short_id: ShortChannelId) -> OpenChannel {
    OpenChannel {
        channel: snapshot(channel_id, 900_000, 100_000),
        short_channel_id: short_id,
        active: true,
        pending_htlcs: Vec::new(),
    }
}

pub fn waiting_close(channel_id: &ChannelId) -> WaitingCloseChannel {
    WaitingCloseChannel {
        channel: snapshot(channel_id, 900_000, 100_000),
        limbo_balance: Amount::sat(900_000),
    }
}

pub fn pending_close(channel_id: &ChannelId, closing_txid: &str) -> PendingCloseChannel {
    PendingCloseChannel {
        channel: snapshot(channel_id, 900_000, 100_000),
        closing_txid: closing_txid.to_string(),
    }
}

pub fn force_closing(channel_id: &ChannelId, closing_txid: &str, sweeps: &[&str]) -> ForceClosingChannel {
    ForceClosingChannel {
        channel: snapshot(channel_id, 900_000, 100_000),
        closing_txid: closing_txid.to_string(),
        limbo_balance: Amount::sat(900_000),
        pending_htlcs: sweeps
            .iter()
            .map(|txid| Htlc {
                amount: Amount::sat(1_000),
                incoming: false,
                sweep_txid: txid.to_string(),
            })
            .collect(),
    }
}

pub fn closed(channel_id: &ChannelId, closing_txid: &str) -> ClosedChannel {
    ClosedChannel {
        channel_id: channel_id.clone(),
        node_id: NodeId::from(NODE),
        capacity: Amount::sat(1_010_000),
        closing_txid: closing_txid.to_string(),
        settled_balance: Amount::sat(897_000),
        short_channel_id: None,
    }
}

pub fn pending(
    pending_open: Vec<PendingOpenChannel>,
    pending_closing: Vec<PendingCloseChannel>,
) -> PendingChannels {
    PendingChannels {
        pending_open,
        pending_closing,
        ..PendingChannels::default()
    }
}
