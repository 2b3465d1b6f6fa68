//! Protocol constants. All token amounts are 18-decimal fixed point.

/// One whole governance token.
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// Length of an emission epoch in seconds.
pub const WEEK_SECONDS: u64 = 604_800;

/// Denominator for percentages expressed in basis points.
pub const BPS_PRECISION: u32 = 10_000;

/// Denominator of a receiver's weekly percentage.
///
/// A receiver percentage is `weekly_pct_bps * vote_pct_bps`, so one full
/// unit is `BPS_PRECISION * BPS_PRECISION`.
pub const RECEIVER_PCT_PRECISION: u128 = 100_000_000;

/// Fixed-point denominator of a boost factor (1.0 == `BOOST_PRECISION`).
pub const BOOST_PRECISION: u128 = 1_000_000_000;

/// Tokens per unit of locked weight.
///
/// Also the minimum accrued delegation fee that can be claimed.
pub const LOCK_TO_TOKEN_RATIO: u128 = PRECISION;

/// Maximum weekly emission percentage in basis points (100%).
pub const MAX_PCT_BPS: u32 = BPS_PRECISION;

/// Receiver id 0 is reserved and never assigned.
pub const UNSET_RECEIVER_ID: u32 = 0;

/// Version tag written at the head of vault snapshot files.
pub const SNAPSHOT_VERSION: u16 = 2;
