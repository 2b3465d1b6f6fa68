//! Durable vault ledger.
//!
//! Everything the vault persists lives in [`VaultState`]; there are no
//! derived copies elsewhere.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use tide_core::constants::UNSET_RECEIVER_ID;
use tide_core::types::{Address, Epoch, ReceiverId};

/// One entry of the receiver arena.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct ReceiverRecord {
    pub id: ReceiverId,
    /// Bound account. `None` for a reserved placeholder id.
    pub account: Option<Address>,
    pub is_active: bool,
    /// Most recent epoch this receiver has resolved.
    pub last_updated_epoch: Epoch,
    /// Amount allocated per resolved epoch.
    pub ledger: BTreeMap<Epoch, u128>,
}

impl ReceiverRecord {
    pub fn is_bound(&self) -> bool {
        self.account.is_some()
    }

    /// Sum of every amount this receiver has been allocated.
    pub fn total_allocated(&self) -> u128 {
        self.ledger.values().fold(0u128, |acc, v| acc.saturating_add(*v))
    }
}

/// Who may claim with a user's boost.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub enum AllowedClaimers {
    Any,
    Only(BTreeSet<Address>),
}

impl AllowedClaimers {
    pub fn allows(&self, claimer: &Address) -> bool {
        match self {
            Self::Any => true,
            Self::Only(set) => set.contains(claimer),
        }
    }
}

/// Boost delegation settings of one user.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct DelegationParams {
    pub enabled: bool,
    /// Fee charged on delegated claims, in bps of the boosted amount.
    pub fee_pct: u32,
    pub allowed_claimers: AllowedClaimers,
}

/// The complete vault ledger.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct VaultState {
    /// Governance tokens held by the vault and not earmarked for anyone.
    pub unallocated_supply: u128,
    pub receivers: BTreeMap<ReceiverId, ReceiverRecord>,
    /// Id handed out by the next registration.
    pub next_receiver_id: ReceiverId,
    /// Allocated-but-unclaimed balance per receiver account.
    pub allocated: BTreeMap<Address, u128>,
    pub delegation: BTreeMap<Address, DelegationParams>,
    /// Accrued delegation fees per delegate.
    pub delegation_fees: BTreeMap<Address, u128>,
    /// Weeks claimed rewards are meant to be locked for in the locker.
    pub lock_weeks: u64,
    /// Whether the one-time supply seed and allowances have been applied.
    pub initial_parameters_set: bool,
}

impl Default for VaultState {
    fn default() -> Self {
        Self {
            unallocated_supply: 0,
            receivers: BTreeMap::new(),
            next_receiver_id: UNSET_RECEIVER_ID + 1,
            allocated: BTreeMap::new(),
            delegation: BTreeMap::new(),
            delegation_fees: BTreeMap::new(),
            lock_weeks: 0,
            initial_parameters_set: false,
        }
    }
}

impl VaultState {
    /// Id of the receiver bound to `account`, if any.
    pub fn receiver_id_of(&self, account: &Address) -> Option<ReceiverId> {
        self.receivers
            .values()
            .find(|r| r.account.as_ref() == Some(account))
            .map(|r| r.id)
    }

    /// Governance tokens the vault must hold to cover its ledger:
    /// unallocated + allocated + accrued fees.
    pub fn accounted_total(&self) -> u128 {
        let allocated = self.allocated.values().fold(0u128, |a, v| a.saturating_add(*v));
        let fees = self.delegation_fees.values().fold(0u128, |a, v| a.saturating_add(*v));
        self.unallocated_supply
            .saturating_add(allocated)
            .saturating_add(fees)
    }
}
