//! In-memory implementations of the external collaborators.
//!
//! Used by the `tide-sim` simulator and the test suites. The vote and lock
//! tables sit behind `RwLock` so they can be shared with the schedule and the
//! boost calculator through `Arc` while a driver keeps mutating them.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TokenError;
use crate::traits::{LockerProvider, TokenLedger, VotingProvider};
use crate::types::{Address, Epoch, ReceiverId};

/// Token balances in a hash map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenLedger {
    balances: HashMap<(Address, Address), u128>,
}

impl InMemoryTokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total of all balances held in `token`.
    pub fn total_supply(&self, token: &Address) -> u128 {
        self.balances
            .iter()
            .filter(|((t, _), _)| t == token)
            .map(|(_, v)| *v)
            .sum()
    }
}

impl TokenLedger for InMemoryTokenLedger {
    fn balance_of(&self, token: &Address, account: &Address) -> u128 {
        self.balances.get(&(*token, *account)).copied().unwrap_or(0)
    }

    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TokenError> {
        let have = self.balance_of(token, from);
        if have < amount {
            return Err(TokenError::InsufficientBalance {
                account: *from,
                have,
                need: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let to_balance = self
            .balance_of(token, to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;
        self.balances.insert((*token, *from), have - amount);
        self.balances.insert((*token, *to), to_balance);
        debug!(%token, %from, %to, amount, "token transfer");
        Ok(())
    }

    fn mint(&mut self, token: &Address, to: &Address, amount: u128) -> Result<(), TokenError> {
        let balance = self
            .balance_of(token, to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;
        self.balances.insert((*token, *to), balance);
        Ok(())
    }
}

/// Vote percentages per receiver.
///
/// A vote recorded at epoch `e` stays in force for later epochs until a new
/// vote is recorded.
#[derive(Debug, Default)]
pub struct VoteTable {
    votes: RwLock<BTreeMap<ReceiverId, BTreeMap<Epoch, u32>>>,
}

impl VoteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `pct_bps` for `receiver` from `epoch` onward.
    pub fn set_vote(&self, receiver: ReceiverId, epoch: Epoch, pct_bps: u32) {
        self.votes
            .write()
            .entry(receiver)
            .or_default()
            .insert(epoch, pct_bps);
    }
}

impl VotingProvider for VoteTable {
    fn receiver_vote_pct(&self, receiver: ReceiverId, epoch: Epoch) -> u32 {
        self.votes
            .read()
            .get(&receiver)
            .and_then(|by_epoch| by_epoch.range(..=epoch).next_back())
            .map(|(_, pct)| *pct)
            .unwrap_or(0)
    }
}

/// A single lock: `amount` weight units locked at `start_epoch` for `weeks`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPosition {
    pub user: Address,
    pub start_epoch: Epoch,
    pub amount: u64,
    pub weeks: u64,
}

impl LockPosition {
    /// Weight at `epoch`: `amount * remaining_weeks`, zero outside the lock.
    pub fn weight_at(&self, epoch: Epoch) -> u64 {
        let end = self.start_epoch.saturating_add(self.weeks);
        if epoch < self.start_epoch || epoch >= end {
            return 0;
        }
        self.amount.saturating_mul(end - epoch)
    }
}

/// Linear-decay lock positions.
#[derive(Debug, Default)]
pub struct LockTable {
    positions: RwLock<Vec<LockPosition>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self, user: Address, start_epoch: Epoch, amount: u64, weeks: u64) {
        self.positions.write().push(LockPosition {
            user,
            start_epoch,
            amount,
            weeks,
        });
    }
}

impl LockerProvider for LockTable {
    fn user_weight_at(&self, user: &Address, epoch: Epoch) -> u64 {
        self.positions
            .read()
            .iter()
            .filter(|p| &p.user == user)
            .fold(0u64, |acc, p| acc.saturating_add(p.weight_at(epoch)))
    }

    fn total_weight_at(&self, epoch: Epoch) -> u64 {
        self.positions
            .read()
            .iter()
            .fold(0u64, |acc, p| acc.saturating_add(p.weight_at(epoch)))
    }

    fn first_lock_epoch(&self, user: &Address) -> Option<Epoch> {
        self.positions
            .read()
            .iter()
            .filter(|p| &p.user == user)
            .map(|p| p.start_epoch)
            .min()
    }
}
