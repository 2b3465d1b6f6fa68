//! Built-in reward receivers and the directory the vault calls them through.
//!
//! A receiver pulls its allocation from the vault and splits it among its
//! own users. The vault never owns receivers: callers hand it a
//! [`ReceiverDirectory`] for the duration of an operation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tide_core::error::{HookError, VaultError};
use tide_core::traits::{RewardReceiver, TokenLedger};
use tide_core::types::{Address, CallContext, Epoch, ReceiverId};

use crate::vault::EmissionVault;

/// Fixed-point scale of the per-debt reward integral.
const INTEGRAL_PRECISION: u128 = 1_000_000_000;

fn mul_div(a: u128, b: u128, d: u128) -> Option<u128> {
    if d == 0 {
        return None;
    }
    a.checked_mul(b).map(|v| v / d)
}

fn set_once(slot: &mut Option<ReceiverId>, id: ReceiverId) -> Result<(), HookError> {
    match slot {
        Some(existing) => Err(HookError(format!("receiver id already set to {existing}"))),
        None => {
            *slot = Some(id);
            Ok(())
        }
    }
}

/// Distributes emissions pro rata to outstanding debt.
///
/// Emissions that arrive while no debt is open are held back and folded
/// into the next distribution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TroveManagerReceiver {
    account: Address,
    receiver_id: Option<ReceiverId>,
    total_debt: u128,
    debts: BTreeMap<Address, u128>,
    reward_integral: u128,
    user_integral: BTreeMap<Address, u128>,
    pending: BTreeMap<Address, u128>,
    undistributed: u128,
    last_epoch: Epoch,
}

impl TroveManagerReceiver {
    pub fn new(account: Address) -> Self {
        Self {
            account,
            receiver_id: None,
            total_debt: 0,
            debts: BTreeMap::new(),
            reward_integral: 0,
            user_integral: BTreeMap::new(),
            pending: BTreeMap::new(),
            undistributed: 0,
            last_epoch: 0,
        }
    }

    pub fn receiver_id(&self) -> Option<ReceiverId> {
        self.receiver_id
    }

    pub fn total_debt(&self) -> u128 {
        self.total_debt
    }

    pub fn debt_of(&self, user: &Address) -> u128 {
        self.debts.get(user).copied().unwrap_or(0)
    }

    /// Emissions received but not yet assigned to any debt.
    pub fn undistributed(&self) -> u128 {
        self.undistributed
    }

    /// Epoch of the most recent allocation.
    pub fn last_epoch(&self) -> Epoch {
        self.last_epoch
    }

    fn accrued(&self, user: &Address) -> Result<u128, VaultError> {
        let debt = self.debt_of(user);
        let paid = self.user_integral.get(user).copied().unwrap_or(0);
        let delta = self.reward_integral.saturating_sub(paid);
        mul_div(debt, delta, INTEGRAL_PRECISION).ok_or(VaultError::ArithmeticOverflow)
    }

    /// Pending plus accrued reward of `user`.
    fn owed(&self, user: &Address) -> Result<u128, VaultError> {
        self.pending
            .get(user)
            .copied()
            .unwrap_or(0)
            .checked_add(self.accrued(user)?)
            .ok_or(VaultError::ArithmeticOverflow)
    }

    fn settle(&mut self, user: &Address) -> Result<(), VaultError> {
        let owed = self.owed(user)?;
        if owed > 0 {
            self.pending.insert(*user, owed);
        }
        self.user_integral.insert(*user, self.reward_integral);
        Ok(())
    }

    /// Set `user`'s outstanding debt, settling rewards earned at the old debt.
    ///
    /// Pull pending emissions first so they are split at the old weights.
    pub fn set_debt(&mut self, user: Address, debt: u128) -> Result<(), VaultError> {
        let old = self.debt_of(&user);
        let total = self
            .total_debt
            .checked_sub(old)
            .and_then(|t| t.checked_add(debt))
            .ok_or(VaultError::ArithmeticOverflow)?;
        self.settle(&user)?;
        self.total_debt = total;
        if debt == 0 {
            self.debts.remove(&user);
        } else {
            self.debts.insert(user, debt);
        }
        debug!(%user, old, debt, total, "debt updated");
        Ok(())
    }

    fn distribute(&mut self, amount: u128) {
        let amount = self.undistributed.saturating_add(amount);
        if self.total_debt == 0 {
            self.undistributed = amount;
            return;
        }
        let Some(step) = mul_div(amount, INTEGRAL_PRECISION, self.total_debt) else {
            self.undistributed = amount;
            return;
        };
        // Dust lost to rounding waits for the next distribution.
        let assigned = mul_div(step, self.total_debt, INTEGRAL_PRECISION).unwrap_or(amount);
        self.reward_integral = self.reward_integral.saturating_add(step);
        self.undistributed = amount - assigned.min(amount);
    }
}

impl RewardReceiver for TroveManagerReceiver {
    fn account(&self) -> Address {
        self.account
    }

    fn on_receiver_id_set(&mut self, id: ReceiverId) -> Result<(), HookError> {
        set_once(&mut self.receiver_id, id)
    }

    fn on_allocation(&mut self, epoch: Epoch, amount: u128) {
        self.last_epoch = epoch;
        self.distribute(amount);
    }

    fn claimable_reward(&self, user: &Address) -> Result<u128, VaultError> {
        self.owed(user)
    }

    fn vault_claim_reward(&mut self, user: &Address) -> Result<u128, VaultError> {
        self.settle(user)?;
        Ok(self.pending.remove(user).unwrap_or(0))
    }
}

/// Pool-based receiver: an operator credits users out of what the receiver
/// has been allocated.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct IncentiveReceiver {
    account: Address,
    operator: Address,
    receiver_id: Option<ReceiverId>,
    pool: u128,
    credits: BTreeMap<Address, u128>,
}

impl IncentiveReceiver {
    pub fn new(account: Address, operator: Address) -> Self {
        Self {
            account,
            operator,
            receiver_id: None,
            pool: 0,
            credits: BTreeMap::new(),
        }
    }

    pub fn receiver_id(&self) -> Option<ReceiverId> {
        self.receiver_id
    }

    pub fn operator(&self) -> Address {
        self.operator
    }

    /// Allocated emissions not yet credited to anyone.
    pub fn pool(&self) -> u128 {
        self.pool
    }

    /// Move `amount` from the pool to `user`. Operator only.
    pub fn credit(&mut self, ctx: &CallContext, user: Address, amount: u128) -> Result<(), VaultError> {
        if ctx.caller != self.operator {
            return Err(VaultError::Unauthorized(ctx.caller));
        }
        let pool = self
            .pool
            .checked_sub(amount)
            .ok_or(VaultError::ArithmeticUnderflow { have: self.pool, need: amount })?;
        let credit = self
            .credits
            .get(&user)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticOverflow)?;
        self.pool = pool;
        self.credits.insert(user, credit);
        debug!(%user, amount, pool, "incentive credited");
        Ok(())
    }
}

impl RewardReceiver for IncentiveReceiver {
    fn account(&self) -> Address {
        self.account
    }

    fn on_receiver_id_set(&mut self, id: ReceiverId) -> Result<(), HookError> {
        set_once(&mut self.receiver_id, id)
    }

    fn on_allocation(&mut self, _epoch: Epoch, amount: u128) {
        self.pool = self.pool.saturating_add(amount);
    }

    fn claimable_reward(&self, user: &Address) -> Result<u128, VaultError> {
        Ok(self.credits.get(user).copied().unwrap_or(0))
    }

    fn vault_claim_reward(&mut self, user: &Address) -> Result<u128, VaultError> {
        Ok(self.credits.remove(user).unwrap_or(0))
    }
}

/// The receiver variants the vault knows how to drive.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverKind {
    TroveManager(TroveManagerReceiver),
    Incentive(IncentiveReceiver),
}

impl ReceiverKind {
    pub fn receiver_id(&self) -> Option<ReceiverId> {
        match self {
            Self::TroveManager(r) => r.receiver_id(),
            Self::Incentive(r) => r.receiver_id(),
        }
    }

    fn inner(&self) -> &dyn RewardReceiver {
        match self {
            Self::TroveManager(r) => r,
            Self::Incentive(r) => r,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn RewardReceiver {
        match self {
            Self::TroveManager(r) => r,
            Self::Incentive(r) => r,
        }
    }
}

impl RewardReceiver for ReceiverKind {
    fn account(&self) -> Address {
        self.inner().account()
    }

    fn on_receiver_id_set(&mut self, id: ReceiverId) -> Result<(), HookError> {
        self.inner_mut().on_receiver_id_set(id)
    }

    fn on_allocation(&mut self, epoch: Epoch, amount: u128) {
        self.inner_mut().on_allocation(epoch, amount)
    }

    fn claimable_reward(&self, user: &Address) -> Result<u128, VaultError> {
        self.inner().claimable_reward(user)
    }

    fn vault_claim_reward(&mut self, user: &Address) -> Result<u128, VaultError> {
        self.inner_mut().vault_claim_reward(user)
    }
}

/// Receivers keyed by their vault account.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReceiverDirectory {
    receivers: BTreeMap<Address, ReceiverKind>,
}

impl ReceiverDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a receiver under its own account, replacing any previous one.
    pub fn insert(&mut self, receiver: ReceiverKind) -> Option<ReceiverKind> {
        self.receivers.insert(receiver.account(), receiver)
    }

    pub fn get(&self, account: &Address) -> Option<&ReceiverKind> {
        self.receivers.get(account)
    }

    pub fn get_mut(&mut self, account: &Address) -> Option<&mut ReceiverKind> {
        self.receivers.get_mut(account)
    }

    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &ReceiverKind)> {
        self.receivers.iter()
    }

    /// Run the id-assignment hook of the receiver at `account`.
    ///
    /// Accounts with no receiver in the directory have no hook.
    pub fn notify_id_set(&mut self, account: &Address, id: ReceiverId) -> Result<(), HookError> {
        match self.receivers.get_mut(account) {
            Some(receiver) => receiver.on_receiver_id_set(id),
            None => {
                debug!(%account, id, "no receiver to notify");
                Ok(())
            }
        }
    }

    /// Raw reward of `user` at the receiver bound to `account`, or `None`
    /// when no receiver lives there.
    pub fn claimable_reward(&self, account: &Address, user: &Address) -> Option<Result<u128, VaultError>> {
        self.receivers.get(account).map(|r| r.claimable_reward(user))
    }

    /// Settle and return `user`'s raw reward at the receiver bound to `account`.
    pub fn vault_claim_reward(&mut self, account: &Address, user: &Address) -> Option<Result<u128, VaultError>> {
        self.receivers.get_mut(account).map(|r| r.vault_claim_reward(user))
    }

    /// Pull the receiver's pending emissions from `vault` and hand them to
    /// the receiver. `ctx.caller` is replaced by the receiver's account.
    pub fn fetch_emissions<T: TokenLedger>(
        &mut self,
        account: &Address,
        vault: &mut EmissionVault<T>,
        ctx: &CallContext,
    ) -> Result<u128, VaultError> {
        let receiver = self
            .receivers
            .get_mut(account)
            .ok_or(VaultError::ReceiverNotRegistered(tide_core::constants::UNSET_RECEIVER_ID))?;
        let id = receiver
            .receiver_id()
            .ok_or(VaultError::ReceiverNotRegistered(tide_core::constants::UNSET_RECEIVER_ID))?;
        let amount = vault.allocate_new_emissions(&ctx.as_caller(*account), id)?;
        if amount > 0 {
            let epoch = vault.current_epoch(ctx.timestamp);
            receiver.on_allocation(epoch, amount);
            info!(%account, id, epoch, amount, "emissions fetched");
        }
        Ok(amount)
    }
}
