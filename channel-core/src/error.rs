//! Error types for channel bookkeeping

use crate::types::{ChannelId, ShortChannelId};
use thiserror::Error;

/// Result type for channel-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Channel-core errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// No AdditionalInfo stored for the channel
    #[error("Channel info not found: {0}")]
    InfoNotFound(ChannelId),

    /// No AdditionalInfo indexed under the short channel id
    #[error("Short channel id not found: {0}")]
    ShortIdNotFound(ShortChannelId),

    /// Index lookup miss
    #[error("Index entry not found: {0}")]
    IndexNotFound(String),

    /// Lifecycle transition outside the allowed graph
    #[error("Invalid transition for channel {channel_id}: {from} -> {to}")]
    InvalidTransition {
        /// Channel being mutated
        channel_id: ChannelId,
        /// Current state, `none` before the first transition
        from: String,
        /// Requested state
        to: String,
    },

    /// Malformed `"<txid>:<output>"` channel point
    #[error("Invalid channel point: {0}")]
    InvalidChannelPoint(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Lookup misses, which callers usually treat as "absent"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::InfoNotFound(_) | Error::ShortIdNotFound(_) | Error::IndexNotFound(_)
        )
    }

    /// Failures worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Io(_))
    }
}

#[cfg(feature = "rocks")]
impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
