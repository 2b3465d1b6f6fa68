//! Scenario files replayed by the simulator.
//!
//! Accounts are small integers mapped with [`Address::from_low_u64`]; token
//! amounts are whole tokens and scaled by `PRECISION` on use.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use tide_core::constants::PRECISION;
use tide_core::types::{Address, Epoch, ReceiverId};

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    /// Governance tokens minted to the vault at bootstrap.
    pub supply_tokens: u64,
    #[serde(default)]
    pub fixed_weekly_pct: Vec<u32>,
    #[serde(default)]
    pub initial_lock_weeks: u64,
    #[serde(default)]
    pub allowances: Vec<Allowance>,
    #[serde(default)]
    pub receivers: Vec<ReceiverSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Allowance {
    pub account: u64,
    pub tokens: u64,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverType {
    TroveManager,
    Incentive,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReceiverSpec {
    pub account: u64,
    #[serde(rename = "type")]
    pub kind: ReceiverType,
    /// Operator of an incentive receiver; defaults to the receiver account.
    #[serde(default)]
    pub operator: Option<u64>,
    /// Register the receiver at bootstrap. When false only an id is reserved
    /// and a later `bind` step completes the registration.
    #[serde(default = "default_true")]
    pub register: bool,
}

fn default_true() -> bool {
    true
}

/// One replayed action. Every step runs at the start of `epoch`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Vote {
        epoch: Epoch,
        receiver: ReceiverId,
        pct_bps: u32,
    },
    Lock {
        epoch: Epoch,
        user: u64,
        amount: u64,
        weeks: u64,
    },
    SetWeeklyPct {
        epoch: Epoch,
        target_epoch: Epoch,
        pct_bps: u32,
    },
    Bind {
        epoch: Epoch,
        receiver: u64,
    },
    SetActive {
        epoch: Epoch,
        receiver: u64,
        active: bool,
    },
    Fetch {
        epoch: Epoch,
        receiver: u64,
    },
    SetDebt {
        epoch: Epoch,
        receiver: u64,
        user: u64,
        tokens: u64,
    },
    Credit {
        epoch: Epoch,
        receiver: u64,
        user: u64,
        tokens: u64,
    },
    Delegate {
        epoch: Epoch,
        user: u64,
        enabled: bool,
        fee_pct: u32,
    },
    Claim {
        epoch: Epoch,
        user: u64,
        #[serde(default)]
        delegate: Option<u64>,
        receivers: Vec<ReceiverId>,
        #[serde(default)]
        max_fee_pct: u32,
    },
    ClaimFees {
        epoch: Epoch,
        delegate: u64,
    },
}

impl Step {
    pub fn epoch(&self) -> Epoch {
        match self {
            Step::Vote { epoch, .. }
            | Step::Lock { epoch, .. }
            | Step::SetWeeklyPct { epoch, .. }
            | Step::Bind { epoch, .. }
            | Step::SetActive { epoch, .. }
            | Step::Fetch { epoch, .. }
            | Step::SetDebt { epoch, .. }
            | Step::Credit { epoch, .. }
            | Step::Delegate { epoch, .. }
            | Step::Claim { epoch, .. }
            | Step::ClaimFees { epoch, .. } => *epoch,
        }
    }
}

pub fn account(n: u64) -> Address {
    Address::from_low_u64(n)
}

pub fn tokens(n: u64) -> u128 {
    n as u128 * PRECISION
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid scenario JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json(&text)
    }

    /// The two-epoch single-receiver run used when no scenario is given.
    pub fn demo() -> Self {
        Self {
            supply_tokens: 10_000,
            fixed_weekly_pct: vec![1_000; 4],
            initial_lock_weeks: 13,
            allowances: Vec::new(),
            receivers: vec![ReceiverSpec {
                account: 500,
                kind: ReceiverType::Incentive,
                operator: None,
                register: true,
            }],
            steps: vec![
                Step::Vote { epoch: 0, receiver: 1, pct_bps: 10_000 },
                Step::Fetch { epoch: 2, receiver: 500 },
            ],
        }
    }
}
