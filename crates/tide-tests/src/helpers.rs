//! Shared helpers for the E2E and property tests.

use std::sync::Arc;

use tide_boost::{BoostCalculator, BoostParams};
use tide_core::constants::PRECISION;
use tide_core::memory::{InMemoryTokenLedger, LockTable, VoteTable};
use tide_core::traits::TokenLedger;
use tide_core::types::{Address, CallContext, Epoch, ReceiverId};
use tide_schedule::EmissionSchedule;
use tide_vault::{
    EmissionVault, IncentiveReceiver, InitialParameters, ReceiverDirectory, ReceiverKind,
    TroveManagerReceiver, VaultConfig,
};

/// Address from a small integer.
pub fn addr(n: u64) -> Address {
    Address::from_low_u64(n)
}

/// `n` whole tokens.
pub fn tokens(n: u64) -> u128 {
    n as u128 * PRECISION
}

/// A vault wired to in-memory votes, locks and token balances.
pub struct Harness {
    pub config: VaultConfig,
    pub vault: EmissionVault<InMemoryTokenLedger>,
    pub directory: ReceiverDirectory,
    pub votes: Arc<VoteTable>,
    pub locks: Arc<LockTable>,
    pub schedule: Arc<EmissionSchedule>,
    pub boost: Arc<BoostCalculator>,
}

impl Harness {
    /// Fresh vault with no parameters set.
    pub fn new() -> Self {
        Self::with_boost(BoostParams::default())
    }

    pub fn with_boost(params: BoostParams) -> Self {
        let config = VaultConfig::default();
        let votes = Arc::new(VoteTable::new());
        let locks = Arc::new(LockTable::new());
        let schedule = Arc::new(
            EmissionSchedule::new(votes.clone(), config.clock(), config.schedule_manager, config.schedule)
                .unwrap(),
        );
        let boost = Arc::new(BoostCalculator::new(locks.clone(), params));
        Self {
            vault: EmissionVault::new(config.clone(), InMemoryTokenLedger::new()),
            config,
            directory: ReceiverDirectory::new(),
            votes,
            locks,
            schedule,
            boost,
        }
    }

    /// Context for `caller` at the start of `epoch`.
    pub fn at(&self, caller: Address, epoch: Epoch) -> CallContext {
        CallContext::new(caller, self.config.clock().epoch_start(epoch))
    }

    pub fn owner(&self, epoch: Epoch) -> CallContext {
        self.at(self.config.owner, epoch)
    }

    /// Seed `supply` tokens with the given fixed weekly percentages.
    pub fn bootstrap(&mut self, supply: u128, fixed_weekly_pct: Vec<u32>) {
        let ctx = self.at(self.config.deployment_manager, 0);
        self.vault
            .set_initial_parameters(
                &ctx,
                InitialParameters {
                    schedule: Some(self.schedule.clone()),
                    boost: Some(self.boost.clone()),
                    total_supply: supply,
                    initial_lock_weeks: 13,
                    fixed_weekly_pct,
                    initial_allowances: Vec::new(),
                },
            )
            .unwrap();
    }

    /// Register an incentive receiver operated by its own account.
    pub fn add_incentive(&mut self, account: Address, epoch: Epoch) -> ReceiverId {
        self.directory
            .insert(ReceiverKind::Incentive(IncentiveReceiver::new(account, account)));
        let ctx = self.owner(epoch);
        self.vault
            .register_receiver(&ctx, &mut self.directory, account, None)
            .unwrap()
    }

    pub fn add_trove_manager(&mut self, account: Address, epoch: Epoch) -> ReceiverId {
        self.directory
            .insert(ReceiverKind::TroveManager(TroveManagerReceiver::new(account)));
        let ctx = self.owner(epoch);
        self.vault
            .register_receiver(&ctx, &mut self.directory, account, None)
            .unwrap()
    }

    pub fn fetch(&mut self, account: Address, epoch: Epoch) -> u128 {
        let ctx = self.at(account, epoch);
        self.directory
            .fetch_emissions(&account, &mut self.vault, &ctx)
            .unwrap()
    }

    pub fn credit(&mut self, receiver: Address, user: Address, amount: u128, epoch: Epoch) {
        let ctx = self.at(receiver, epoch);
        match self.directory.get_mut(&receiver) {
            Some(ReceiverKind::Incentive(r)) => r.credit(&ctx, user, amount).unwrap(),
            other => panic!("not an incentive receiver: {other:?}"),
        }
    }

    pub fn set_debt(&mut self, receiver: Address, user: Address, debt: u128) {
        match self.directory.get_mut(&receiver) {
            Some(ReceiverKind::TroveManager(r)) => r.set_debt(user, debt).unwrap(),
            other => panic!("not a trove manager: {other:?}"),
        }
    }

    pub fn balance(&self, who: Address) -> u128 {
        self.vault
            .tokens()
            .balance_of(&self.config.governance_token, &who)
    }

    /// The vault holds exactly what its ledger accounts for.
    pub fn assert_balanced(&self) {
        assert_eq!(
            self.vault.state().accounted_total(),
            self.vault.token_balance(),
            "vault ledger diverged from token balance"
        );
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
