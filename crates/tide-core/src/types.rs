//! Core protocol types: accounts, receiver ids, epochs and call context.
//!
//! All token amounts are `u128` with 18 decimals.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::constants::WEEK_SECONDS;
use crate::error::AddressError;

/// Sequential receiver identifier. Id 0 is reserved.
pub type ReceiverId = u32;

/// Emission epoch (week) index counted from the vault start timestamp.
pub type Epoch = u64;

/// A 20-byte account or token address.
///
/// Serialized as a `0x`-prefixed hex string so config files stay readable.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Build an address whose low eight bytes hold `n` (big-endian).
    ///
    /// Convenient for tests and simulations where accounts are numbered.
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|_| AddressError::InvalidHex)?;
        let arr: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity and wall-clock time of the caller of a vault operation.
///
/// Every entry point receives one; the epoch is derived from `timestamp`
/// on each call and never cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    /// Unix seconds.
    pub timestamp: u64,
}

impl CallContext {
    pub fn new(caller: Address, timestamp: u64) -> Self {
        Self { caller, timestamp }
    }

    /// Same timestamp, different caller.
    pub fn as_caller(&self, caller: Address) -> Self {
        Self { caller, ..*self }
    }
}

/// Maps wall-clock timestamps to epoch indices.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct EpochClock {
    /// Unix timestamp at which epoch 0 begins.
    pub start_timestamp: u64,
    /// Epoch length in seconds. Must be non-zero.
    pub week_seconds: u64,
}

impl EpochClock {
    pub fn new(start_timestamp: u64, week_seconds: u64) -> Self {
        Self {
            start_timestamp,
            week_seconds: week_seconds.max(1),
        }
    }

    /// `floor((now - start) / week_seconds)`, saturating at 0 before start.
    pub fn epoch_at(&self, timestamp: u64) -> Epoch {
        timestamp.saturating_sub(self.start_timestamp) / self.week_seconds.max(1)
    }

    /// First timestamp of `epoch`.
    pub fn epoch_start(&self, epoch: Epoch) -> u64 {
        self.start_timestamp
            .saturating_add(epoch.saturating_mul(self.week_seconds))
    }
}

impl Default for EpochClock {
    fn default() -> Self {
        Self::new(0, WEEK_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_zero_before_start() {
        let clock = EpochClock::new(1_000, WEEK_SECONDS);
        assert_eq!(clock.epoch_at(0), 0);
        assert_eq!(clock.epoch_at(999), 0);
    }

    #[test]
    fn epoch_boundaries() {
        let clock = EpochClock::new(1_000, WEEK_SECONDS);
        assert_eq!(clock.epoch_at(1_000), 0);
        assert_eq!(clock.epoch_at(1_000 + WEEK_SECONDS - 1), 0);
        assert_eq!(clock.epoch_at(1_000 + WEEK_SECONDS), 1);
        assert_eq!(clock.epoch_at(clock.epoch_start(7)), 7);
    }

    #[test]
    fn zero_week_length_is_clamped() {
        let clock = EpochClock::new(0, 0);
        assert_eq!(clock.week_seconds, 1);
        assert_eq!(clock.epoch_at(5), 5);
    }

    #[test]
    fn address_display_roundtrip() {
        let a = Address::from_low_u64(0xdead_beef);
        let s = a.to_string();
        assert!(s.starts_with("0x"));
        assert_eq!(s.len(), 42);
        assert_eq!(s.parse::<Address>().unwrap(), a);
    }

    #[test]
    fn address_parse_rejects_bad_input() {
        assert_eq!("0xzz".parse::<Address>(), Err(AddressError::InvalidHex));
        assert_eq!("0x0102".parse::<Address>(), Err(AddressError::InvalidLength(2)));
    }

    #[test]
    fn address_serde_as_hex_string() {
        let a = Address::from_low_u64(42);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"{a}\""));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn call_context_as_caller_keeps_time() {
        let ctx = CallContext::new(Address::from_low_u64(1), 99);
        let other = ctx.as_caller(Address::from_low_u64(2));
        assert_eq!(other.timestamp, 99);
        assert_eq!(other.caller, Address::from_low_u64(2));
    }
}
