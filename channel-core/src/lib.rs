//! Hub channel core
//!
//! Data model and persistence for the hub's payment channels.
//!
//! # Architecture
//!
//! - **Channel**: live view with an append-only state history, mutated only
//!   through pure transition methods that return the event to publish
//! - **AdditionalInfo**: per-phase financial snapshot that tells "not reached"
//!   apart from "lost"
//! - **Storage**: narrow traits with an in-memory and a RocksDB backend
//!
//! # Invariants
//!
//! - Lifecycle: Opening → Opened → (Updating → Opened)* → Closing → Closed
//! - No backward transitions, no re-opening of a closed channel
//! - Records are upserted, never deleted

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod channel;
pub mod config;
pub mod error;
pub mod info;
pub mod storage;
pub mod types;
pub mod update;

// Re-exports
pub use channel::{Channel, ChannelState, ChannelStateName};
pub use config::StorageConfig;
pub use error::{Error, Result};
pub use info::{AdditionalInfo, Recorded};
pub use storage::{ChannelStorage, IndexStorage, InfoStorage, MemoryStorage, Storage};
pub use types::{Amount, ChannelId, ChannelPoint, Initiator, NodeId, ShortChannelId};
pub use update::{ChannelUpdate, TransitionDetails};

#[cfg(feature = "rocks")]
pub use storage::RocksStorage;
