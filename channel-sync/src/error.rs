//! Error types for channel reconciliation

use channel_core::ChannelId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum Error {
    /// Channel-core error (storage, transition, parsing)
    #[error("Channel core error: {0}")]
    Core(#[from] channel_core::Error),

    /// Lightning daemon call failed
    #[error("Daemon error: {0}")]
    Daemon(String),

    /// Blockchain explorer call failed
    #[error("Explorer error: {0}")]
    Explorer(String),

    /// External call exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being called
        operation: &'static str,
        /// Configured deadline
        after: Duration,
    },

    /// Channel not present in the live set
    #[error("Unknown channel: {0}")]
    UnknownChannel(ChannelId),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// How loudly the failure is reported
    pub fn severity(&self) -> Severity {
        match self {
            Error::Explorer(_) => Severity::Low,
            Error::Timeout { .. } | Error::UnknownChannel(_) => Severity::Medium,
            Error::Core(_) | Error::Daemon(_) | Error::Config(_) | Error::Io(_) => Severity::High,
        }
    }
}

/// Failure severity, used as a metrics label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Degraded data, processing continues
    Low,
    /// Partial failure, retried next tick
    Medium,
    /// Data integrity at risk or tick lost
    High,
}

impl Severity {
    /// Metrics label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
