//! Trait interfaces for the Tide emission vault.
//!
//! These traits define the contracts between crates and the external
//! collaborators:
//! - [`VotingProvider`] - per-receiver vote share (external governance)
//! - [`LockerProvider`] - locked weight history (external token locker)
//! - [`TokenLedger`] - fungible token transfers (host ledger)
//! - [`EmissionSource`] - weekly release percentages (tide-schedule implements)
//! - [`BoostSource`] - boost math (tide-boost implements)
//! - [`RewardReceiver`] - receiver capability (tide-vault receivers implement)

use std::collections::BTreeMap;

use crate::constants::RECEIVER_PCT_PRECISION;
use crate::error::{BoostError, HookError, ScheduleError, TokenError, VaultError};
use crate::types::{Address, Epoch, ReceiverId};

/// Per-receiver vote percentages from the governance collaborator.
///
/// Values for past epochs are final; the current epoch may still move.
pub trait VotingProvider: Send + Sync {
    /// Share of the weekly emissions voted to `receiver` in `epoch`, in bps.
    fn receiver_vote_pct(&self, receiver: ReceiverId, epoch: Epoch) -> u32;
}

/// Read-only view of the token locker.
///
/// Invariant: `user_weight_at(u, e) <= total_weight_at(e)` for all users.
pub trait LockerProvider: Send + Sync {
    /// Locked weight of `user` at `epoch`.
    fn user_weight_at(&self, user: &Address, epoch: Epoch) -> u64;

    /// Total locked weight across all users at `epoch`.
    fn total_weight_at(&self, epoch: Epoch) -> u64;

    /// First epoch in which `user` held a lock, if ever.
    fn first_lock_epoch(&self, user: &Address) -> Option<Epoch>;
}

/// Fungible token balances keyed by `(token, account)`.
///
/// Implementations must leave balances untouched when returning an error.
pub trait TokenLedger {
    fn balance_of(&self, token: &Address, account: &Address) -> u128;

    /// Move `amount` of `token` from `from` to `to`.
    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TokenError>;

    /// Create `amount` of `token` in `to`'s balance.
    fn mint(&mut self, token: &Address, to: &Address, amount: u128) -> Result<(), TokenError>;
}

/// Weekly release schedule consumed by the vault.
pub trait EmissionSource: Send + Sync {
    /// Percentage of the unallocated supply released in `epoch`, in bps.
    fn weekly_pct(&self, epoch: Epoch) -> u32;

    /// Percentage of the unallocated supply `receiver` may pull in `epoch`,
    /// scaled by [`RECEIVER_PCT_PRECISION`].
    fn receiver_weekly_pct(&self, receiver: ReceiverId, epoch: Epoch) -> Result<u64, ScheduleError>;

    /// Write `pcts[i]` as the override of epoch `i`. Bootstrap only.
    fn seed_fixed_schedule(&self, pcts: &[u32]) -> Result<(), ScheduleError>;

    /// Per-epoch percentage overrides (bps) to persist with the vault.
    fn override_table(&self) -> BTreeMap<Epoch, u32> {
        BTreeMap::new()
    }

    /// Tokens `receiver` pulls in `epoch` when `unallocated` remain.
    ///
    /// Default implementation: `unallocated * receiver_weekly_pct / RECEIVER_PCT_PRECISION`.
    fn receiver_weekly_emissions(
        &self,
        receiver: ReceiverId,
        epoch: Epoch,
        unallocated: u128,
    ) -> Result<u128, ScheduleError> {
        let pct = self.receiver_weekly_pct(receiver, epoch)?;
        unallocated
            .checked_mul(pct as u128)
            .map(|v| v / RECEIVER_PCT_PRECISION)
            .ok_or(ScheduleError::ArithmeticOverflow)
    }
}

/// Boost math consumed by the vault at claim time.
pub trait BoostSource: Send + Sync {
    /// Apply mode: boosted amount for a claim of `raw` in `epoch`.
    ///
    /// May record a weight snapshot for `(user, epoch)`; never returns more
    /// than `raw`.
    fn boosted_amount(
        &self,
        user: &Address,
        receiver: ReceiverId,
        raw: u128,
        epoch: Epoch,
    ) -> Result<u128, BoostError>;

    /// Preview mode: same math as [`boosted_amount`](Self::boosted_amount)
    /// without writing anything.
    fn claimable_with_boost(
        &self,
        user: &Address,
        receiver: ReceiverId,
        raw: u128,
        epoch: Epoch,
    ) -> Result<u128, BoostError>;

    /// Freeze the weights `user`'s claims in `epoch` were priced at.
    ///
    /// Called once a claim priced through
    /// [`claimable_with_boost`](Self::claimable_with_boost) has settled.
    fn commit_snapshot(&self, user: &Address, epoch: Epoch);
}

/// Capability interface the vault uses to talk to a registered receiver.
pub trait RewardReceiver {
    /// Account the receiver is bound to in the vault.
    fn account(&self) -> Address;

    /// Notification that the vault assigned `id`. Failures are ignored by
    /// the vault.
    fn on_receiver_id_set(&mut self, id: ReceiverId) -> Result<(), HookError>;

    /// Newly allocated emissions for the receiver, resolved up to `epoch`.
    fn on_allocation(&mut self, epoch: Epoch, amount: u128);

    /// Raw (pre-boost) reward `user` could claim right now.
    fn claimable_reward(&self, user: &Address) -> Result<u128, VaultError>;

    /// Settle and return `user`'s raw reward. Must equal
    /// [`claimable_reward`](Self::claimable_reward) called immediately before.
    fn vault_claim_reward(&mut self, user: &Address) -> Result<u128, VaultError>;
}
