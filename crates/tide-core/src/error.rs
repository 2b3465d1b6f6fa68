//! Error types for the Tide emission vault.
use thiserror::Error;

use crate::types::{Address, Epoch, ReceiverId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid hex")] InvalidHex,
    #[error("invalid length: {0} bytes")] InvalidLength(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("insufficient balance for {account}: have {have}, need {need}")] InsufficientBalance { account: Address, have: u128, need: u128 },
    #[error("balance overflow")] Overflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("caller {0} is not the schedule manager")] Unauthorized(Address),
    #[error("epoch {epoch} already started (current epoch {current})")] EpochAlreadyStarted { epoch: Epoch, current: Epoch },
    #[error("invalid weekly percentage: {0} bps")] InvalidPct(u32),
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoostError {
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("receiver hook failed: {0}")]
pub struct HookError(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("caller {0} lacks the required role")] Unauthorized(Address),
    #[error("unknown receiver: {0}")] UnknownReceiver(ReceiverId),
    #[error("receiver not registered: {0}")] ReceiverNotRegistered(ReceiverId),
    #[error("receiver {0} already has an account")] AlreadyRegistered(ReceiverId),
    #[error("account {account} is already bound to receiver {id}")] AccountAlreadyBound { account: Address, id: ReceiverId },
    #[error("vault cannot transfer to itself")] SelfTransferDenied,
    #[error("invalid max fee pct: {0}")] InvalidMaxFeePct(u32),
    #[error("invalid fee pct: {0}")] InvalidFeePct(u32),
    #[error("{claimer} may not claim with the boost of {delegate}")] DelegationNotAllowed { delegate: Address, claimer: Address },
    #[error("delegate fee {fee} bps exceeds max {max} bps")] DelegateFeeTooHigh { fee: u32, max: u32 },
    #[error("arithmetic underflow: have {have}, need {need}")] ArithmeticUnderflow { have: u128, need: u128 },
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("nothing to claim")] NothingToClaim,
    #[error("schedule: {0}")] Schedule(#[from] ScheduleError),
    #[error("boost: {0}")] Boost(#[from] BoostError),
    #[error("token: {0}")] Token(#[from] TokenError),
}

#[derive(Error, Debug)]
pub enum TideError {
    #[error(transparent)] Vault(#[from] VaultError),
    #[error(transparent)] Schedule(#[from] ScheduleError),
    #[error(transparent)] Boost(#[from] BoostError),
    #[error(transparent)] Token(#[from] TokenError),
    #[error("snapshot: {0}")] Snapshot(String),
    #[error("config: {0}")] Config(String),
}
