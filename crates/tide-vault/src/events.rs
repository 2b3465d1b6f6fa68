//! Events recorded by the vault on every state transition.

use serde::{Deserialize, Serialize};

use tide_core::types::{Address, Epoch, ReceiverId};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VaultEvent {
    ReceiverRegistered {
        id: ReceiverId,
        account: Option<Address>,
    },
    ReceiverActivityChanged {
        id: ReceiverId,
        is_active: bool,
    },
    InitialParametersSet {
        total_supply: u128,
        unallocated: u128,
        lock_weeks: u64,
        seeded: bool,
    },
    EmissionScheduleSet {
        is_set: bool,
    },
    BoostCalculatorSet {
        is_set: bool,
    },
    UnallocatedSupplyIncreased {
        from: Address,
        amount: u128,
        unallocated: u128,
    },
    UnallocatedSupplyReduced {
        amount: u128,
        unallocated: u128,
    },
    TokensTransferred {
        token: Address,
        to: Address,
        amount: u128,
    },
    EmissionsAllocated {
        id: ReceiverId,
        account: Address,
        from_epoch: Epoch,
        to_epoch: Epoch,
        amount: u128,
    },
    AllocatedTokensTransferred {
        receiver: Address,
        claimant: Address,
        recipient: Address,
        amount: u128,
    },
    RewardsClaimed {
        owner: Address,
        claimant: Address,
        delegate: Option<Address>,
        raw: u128,
        boosted: u128,
        fee: u128,
        net: u128,
        lock_weeks: u64,
    },
    BoostDelegationSet {
        user: Address,
        enabled: bool,
        fee_pct: u32,
    },
    DelegationFeesClaimed {
        delegate: Address,
        amount: u128,
    },
}
