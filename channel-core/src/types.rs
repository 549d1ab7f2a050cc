//! Identifiers and amounts shared by every hub component

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

/// Channel identifier: the funding channel point `"<txid>:<output>"`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Wrap a channel point string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into funding txid and output index
    pub fn channel_point(&self) -> Result<ChannelPoint> {
        ChannelPoint::parse(&self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Counterparty node public key (hex)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap a hex public key
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Compact on-chain locator of a channel funding output.
///
/// Layout: 24 bits block height, 24 bits transaction index, 16 bits output index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortChannelId(u64);

impl ShortChannelId {
    /// Pack block height, transaction index within the block and output index
    pub fn new(block_height: u32, tx_index: u32, output_index: u16) -> Self {
        let height = u64::from(block_height & 0x00FF_FFFF);
        let index = u64::from(tx_index & 0x00FF_FFFF);
        Self(height << 40 | index << 16 | u64::from(output_index))
    }

    /// From the packed integer form used by the daemon
    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    /// Packed integer form
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Funding block height
    pub fn block_height(&self) -> u32 {
        (self.0 >> 40) as u32
    }

    /// Funding transaction position in its block
    pub fn tx_index(&self) -> u32 {
        ((self.0 >> 16) & 0x00FF_FFFF) as u32
    }

    /// Funding output index
    pub fn output_index(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl fmt::Display for ShortChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{}",
            self.block_height(),
            self.tx_index(),
            self.output_index()
        )
    }
}

/// Funding outpoint parsed from a [`ChannelId`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPoint {
    /// Funding transaction id
    pub txid: String,
    /// Funding output index
    pub output_index: u16,
}

impl ChannelPoint {
    /// Parse `"<txid>:<output>"`
    pub fn parse(raw: &str) -> Result<Self> {
        let (txid, index) = raw
            .split_once(':')
            .ok_or_else(|| Error::InvalidChannelPoint(raw.to_string()))?;

        if txid.is_empty() || index.contains(':') {
            return Err(Error::InvalidChannelPoint(raw.to_string()));
        }

        let output_index = index
            .parse::<u16>()
            .map_err(|_| Error::InvalidChannelPoint(raw.to_string()))?;

        Ok(Self {
            txid: txid.to_string(),
            output_index,
        })
    }
}

/// True for an all-zero transaction hash
pub fn is_null_txid(txid: &str) -> bool {
    !txid.is_empty() && txid.bytes().all(|b| b == b'0')
}

/// Amount in satoshis. Signed so that fee deltas can be expressed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    /// Zero satoshis
    pub const ZERO: Amount = Amount(0);

    /// From satoshis
    pub const fn sat(sat: i64) -> Self {
        Self(sat)
    }

    /// Satoshi value
    pub fn as_sat(&self) -> i64 {
        self.0
    }

    /// Whether the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat", self.0)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        *self = *self + rhs;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Add::add)
    }
}

/// Which side opened the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Initiator {
    /// The hub funded the channel
    Local,
    /// The counterparty funded the channel
    Remote,
}

impl Initiator {
    /// A pending channel with nothing on our side was funded by the peer
    pub fn from_local_balance(local_balance: Amount) -> Self {
        if local_balance.is_zero() {
            Initiator::Remote
        } else {
            Initiator::Local
        }
    }
}

impl fmt::Display for Initiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Initiator::Local => f.write_str("local"),
            Initiator::Remote => f.write_str("remote"),
        }
    }
}
