//! Replays a [`Scenario`] against a vault wired to in-memory collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use tide_boost::BoostCalculator;
use tide_core::memory::{InMemoryTokenLedger, LockTable, VoteTable};
use tide_core::traits::TokenLedger;
use tide_core::types::{Address, CallContext, Epoch, EpochClock, ReceiverId};
use tide_schedule::EmissionSchedule;
use tide_vault::{
    AllowedClaimers, EmissionVault, IncentiveReceiver, InitialParameters, ReceiverDirectory,
    ReceiverKind, TroveManagerReceiver, VaultConfig, VaultEvent, VaultState,
};

use crate::scenario::{account, tokens, ReceiverType, Scenario, Step};

/// Outcome of a replay, printed as JSON.
#[derive(Serialize, Debug)]
pub struct Report {
    pub final_epoch: Epoch,
    pub unallocated_supply: u128,
    pub vault_balance: u128,
    /// Whether the vault's token balance covers its ledger exactly.
    pub balanced: bool,
    pub balances: BTreeMap<Address, u128>,
    pub state: VaultState,
    pub events: Vec<VaultEvent>,
}

pub struct Simulation {
    config: VaultConfig,
    clock: EpochClock,
    vault: EmissionVault<InMemoryTokenLedger>,
    directory: ReceiverDirectory,
    votes: Arc<VoteTable>,
    locks: Arc<LockTable>,
    schedule: Arc<EmissionSchedule>,
    reserved: BTreeMap<u64, ReceiverId>,
    touched: Vec<Address>,
    events: Vec<VaultEvent>,
    epoch: Epoch,
}

impl Simulation {
    /// Bootstrap the vault and the scenario's receivers at epoch 0.
    pub fn new(config: VaultConfig, scenario: &Scenario) -> Result<Self> {
        let clock = config.clock();
        let votes = Arc::new(VoteTable::new());
        let locks = Arc::new(LockTable::new());
        let schedule = Arc::new(
            EmissionSchedule::new(votes.clone(), clock, config.schedule_manager, config.schedule)
                .context("invalid schedule parameters")?,
        );
        let boost = Arc::new(BoostCalculator::new(locks.clone(), config.boost));

        let mut sim = Self {
            vault: EmissionVault::new(config.clone(), InMemoryTokenLedger::new()),
            config,
            clock,
            directory: ReceiverDirectory::new(),
            votes,
            locks,
            schedule: schedule.clone(),
            reserved: BTreeMap::new(),
            touched: Vec::new(),
            events: Vec::new(),
            epoch: 0,
        };

        let bootstrap = sim.ctx(sim.config.deployment_manager);
        sim.vault
            .set_initial_parameters(
                &bootstrap,
                InitialParameters {
                    schedule: Some(schedule),
                    boost: Some(boost),
                    total_supply: tokens(scenario.supply_tokens),
                    initial_lock_weeks: scenario.initial_lock_weeks,
                    fixed_weekly_pct: scenario.fixed_weekly_pct.clone(),
                    initial_allowances: scenario
                        .allowances
                        .iter()
                        .map(|a| (account(a.account), tokens(a.tokens)))
                        .collect(),
                },
            )
            .context("bootstrap failed")?;
        for a in &scenario.allowances {
            sim.touch(account(a.account));
        }

        for spec in &scenario.receivers {
            let addr = account(spec.account);
            let receiver = match spec.kind {
                ReceiverType::TroveManager => ReceiverKind::TroveManager(TroveManagerReceiver::new(addr)),
                ReceiverType::Incentive => {
                    ReceiverKind::Incentive(IncentiveReceiver::new(addr, account(spec.operator.unwrap_or(spec.account))))
                }
            };
            sim.directory.insert(receiver);
            if spec.register {
                let owner = sim.ctx(sim.config.owner);
                let id = sim.vault.register_receiver(&owner, &mut sim.directory, addr, None)?;
                info!(account = spec.account, id, "receiver registered");
            } else {
                let ctx = sim.ctx(addr);
                let id = sim.vault.register_new_receiver(&ctx)?;
                sim.reserved.insert(spec.account, id);
                info!(account = spec.account, id, "receiver id reserved");
            }
        }
        sim.drain();
        Ok(sim)
    }

    fn ctx(&self, caller: Address) -> CallContext {
        CallContext::new(caller, self.clock.epoch_start(self.epoch))
    }

    fn touch(&mut self, who: Address) {
        if !self.touched.contains(&who) {
            self.touched.push(who);
        }
    }

    fn drain(&mut self) {
        let events = self.vault.take_events();
        self.events.extend(events);
    }

    fn bound_id(&self, receiver: u64) -> Result<ReceiverId> {
        self.vault
            .state()
            .receiver_id_of(&account(receiver))
            .with_context(|| format!("receiver {receiver} is not registered"))
    }

    /// Apply one step. Steps must be given in non-decreasing epoch order.
    pub fn apply(&mut self, step: &Step) -> Result<()> {
        if step.epoch() < self.epoch {
            bail!("step at epoch {} follows epoch {}", step.epoch(), self.epoch);
        }
        self.epoch = step.epoch();

        match step {
            Step::Vote { receiver, pct_bps, .. } => {
                self.votes.set_vote(*receiver, self.epoch, *pct_bps);
            }
            Step::Lock { user, amount, weeks, .. } => {
                self.locks.lock(account(*user), self.epoch, *amount, *weeks);
            }
            Step::SetWeeklyPct { target_epoch, pct_bps, .. } => {
                let ctx = self.ctx(self.config.schedule_manager);
                self.schedule.set_weekly_pct_schedule(&ctx, *target_epoch, *pct_bps)?;
            }
            Step::Bind { receiver, .. } => {
                let id = self
                    .reserved
                    .remove(receiver)
                    .with_context(|| format!("receiver {receiver} has no reserved id"))?;
                let ctx = self.ctx(self.config.owner);
                self.vault
                    .register_receiver(&ctx, &mut self.directory, account(*receiver), Some(id))?;
            }
            Step::SetActive { receiver, active, .. } => {
                let id = self.bound_id(*receiver)?;
                let ctx = self.ctx(self.config.owner);
                self.vault.set_receiver_is_active(&ctx, id, *active)?;
            }
            Step::Fetch { receiver, .. } => {
                let ctx = self.ctx(account(*receiver));
                let amount = self
                    .directory
                    .fetch_emissions(&account(*receiver), &mut self.vault, &ctx)?;
                info!(receiver, epoch = self.epoch, amount, "fetched");
            }
            Step::SetDebt { receiver, user, tokens: debt, .. } => match self.directory.get_mut(&account(*receiver)) {
                Some(ReceiverKind::TroveManager(r)) => r.set_debt(account(*user), tokens(*debt))?,
                _ => bail!("receiver {receiver} is not a trove manager"),
            },
            Step::Credit { receiver, user, tokens: amount, .. } => {
                let ctx_time = self.clock.epoch_start(self.epoch);
                match self.directory.get_mut(&account(*receiver)) {
                    Some(ReceiverKind::Incentive(r)) => {
                        let ctx = CallContext::new(r.operator(), ctx_time);
                        r.credit(&ctx, account(*user), tokens(*amount))?
                    }
                    _ => bail!("receiver {receiver} is not an incentive receiver"),
                }
            }
            Step::Delegate { user, enabled, fee_pct, .. } => {
                let ctx = self.ctx(account(*user));
                self.vault
                    .set_boost_delegation_params(&ctx, *enabled, *fee_pct, AllowedClaimers::Any)?;
            }
            Step::Claim { user, delegate, receivers, max_fee_pct, .. } => {
                let owner = account(*user);
                let ctx = self.ctx(owner);
                let delegate = delegate.map(account).unwrap_or(owner);
                let plan = self.vault.batch_claim_rewards(
                    &ctx,
                    &mut self.directory,
                    owner,
                    delegate,
                    receivers,
                    *max_fee_pct,
                )?;
                self.touch(owner);
                info!(user, raw = plan.raw, net = plan.net, fee = plan.fee, "claimed");
            }
            Step::ClaimFees { delegate, .. } => {
                let who = account(*delegate);
                let ctx = self.ctx(who);
                self.vault.claim_boost_delegation_fees(&ctx, who)?;
                self.touch(who);
            }
        }
        self.drain();
        Ok(())
    }

    /// Apply every step in order.
    pub fn run(&mut self, steps: &[Step]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            self.apply(step)
                .with_context(|| format!("step {i} ({step:?}) failed"))?;
        }
        Ok(())
    }

    pub fn vault(&self) -> &EmissionVault<InMemoryTokenLedger> {
        &self.vault
    }

    pub fn directory(&self) -> &ReceiverDirectory {
        &self.directory
    }

    pub fn report(&self) -> Report {
        let vault_balance = self.vault.token_balance();
        let balanced = self.vault.state().accounted_total() == vault_balance;
        if !balanced {
            warn!(
                vault_balance,
                accounted = self.vault.state().accounted_total(),
                "vault ledger does not match token balance"
            );
        }
        let token = self.config.governance_token;
        let balances = self
            .touched
            .iter()
            .map(|who| (*who, self.vault.tokens().balance_of(&token, who)))
            .collect();
        Report {
            final_epoch: self.epoch,
            unallocated_supply: self.vault.unallocated_supply(),
            vault_balance,
            balanced,
            balances,
            state: self.vault.state().clone(),
            events: self.events.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tide_core::constants::PRECISION;
    use tide_core::traits::RewardReceiver;

    #[test]
    fn demo_allocates_two_epochs() {
        let scenario = Scenario::demo();
        let mut sim = Simulation::new(VaultConfig::default(), &scenario).unwrap();
        sim.run(&scenario.steps).unwrap();
        let report = sim.report();
        assert_eq!(report.unallocated_supply, 8_100 * PRECISION);
        assert_eq!(sim.vault().allocated_of(&account(500)), 1_900 * PRECISION);
        assert!(report.balanced);
        assert_eq!(report.final_epoch, 2);
    }

    #[test]
    fn trove_claim_flow() {
        let scenario = Scenario::from_json(
            r#"{
                "supply_tokens": 10000,
                "fixed_weekly_pct": [1000, 1000],
                "receivers": [{ "account": 7, "type": "trove_manager" }],
                "steps": [
                    { "action": "vote", "epoch": 0, "receiver": 1, "pct_bps": 10000 },
                    { "action": "lock", "epoch": 0, "user": 10, "amount": 100, "weeks": 52 },
                    { "action": "set_debt", "epoch": 0, "receiver": 7, "user": 10, "tokens": 50 },
                    { "action": "fetch", "epoch": 1, "receiver": 7 },
                    { "action": "claim", "epoch": 1, "user": 10, "receivers": [1] }
                ]
            }"#,
        )
        .unwrap();
        let mut sim = Simulation::new(VaultConfig::default(), &scenario).unwrap();
        sim.run(&scenario.steps).unwrap();
        let report = sim.report();
        assert!(report.balanced);
        assert_eq!(report.balances[&account(10)], 1_000 * PRECISION);
        assert_eq!(
            sim.directory().get(&account(7)).unwrap().claimable_reward(&account(10)),
            Ok(0)
        );
    }

    #[test]
    fn reserved_receiver_binds_later() {
        let scenario = Scenario::from_json(
            r#"{
                "supply_tokens": 100,
                "receivers": [{ "account": 7, "type": "incentive", "register": false }],
                "steps": [ { "action": "bind", "epoch": 1, "receiver": 7 } ]
            }"#,
        )
        .unwrap();
        let mut sim = Simulation::new(VaultConfig::default(), &scenario).unwrap();
        assert!(sim.vault().receiver(1).unwrap().account.is_none());
        sim.run(&scenario.steps).unwrap();
        assert_eq!(sim.vault().receiver(1).unwrap().account, Some(account(7)));
        assert_eq!(sim.directory().get(&account(7)).unwrap().receiver_id(), Some(1));
    }

    #[test]
    fn out_of_order_steps_rejected() {
        let scenario = Scenario::demo();
        let mut sim = Simulation::new(VaultConfig::default(), &scenario).unwrap();
        let steps = vec![
            Step::Vote { epoch: 3, receiver: 1, pct_bps: 1 },
            Step::Vote { epoch: 2, receiver: 1, pct_bps: 1 },
        ];
        let err = sim.run(&steps).unwrap_err();
        assert!(format!("{err:#}").contains("follows epoch 3"));
    }
}
