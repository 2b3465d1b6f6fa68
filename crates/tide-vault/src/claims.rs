//! Boosted reward claims and boost delegation.
//!
//! A claim is planned first, with every receiver's raw reward boosted and
//! split into net payout and delegate fee. The preview and the applied claim
//! share that planning code, which writes nothing. The applied claim then
//! commits the plan and only afterwards asks the boost calculator to freeze
//! the weights it was priced at.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tide_core::constants::{BPS_PRECISION, LOCK_TO_TOKEN_RATIO, MAX_PCT_BPS};
use tide_core::error::VaultError;
use tide_core::traits::TokenLedger;
use tide_core::types::{Address, CallContext, Epoch, ReceiverId};

use crate::events::VaultEvent;
use crate::receivers::ReceiverDirectory;
use crate::state::{AllowedClaimers, DelegationParams};
use crate::vault::EmissionVault;

/// One receiver's share of a claim.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ClaimItem {
    pub receiver_id: ReceiverId,
    pub account: Address,
    pub raw: u128,
    pub boosted: u128,
}

/// A fully computed batch claim.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ClaimPlan {
    pub epoch: Epoch,
    /// The account whose rewards are claimed.
    pub owner: Address,
    /// Recipient of the net payout.
    pub claimant: Address,
    /// Account whose locked weight sets the boost.
    pub weight_owner: Address,
    /// Set when the boost of another account is used.
    pub delegate: Option<Address>,
    pub fee_pct: u32,
    pub items: Vec<ClaimItem>,
    pub raw: u128,
    pub boosted: u128,
    pub fee: u128,
    pub net: u128,
}

impl<T: TokenLedger> EmissionVault<T> {
    pub fn delegation_params(&self, user: &Address) -> Option<&DelegationParams> {
        self.state.delegation.get(user)
    }

    pub fn claimable_boost_delegation_fees(&self, delegate: &Address) -> u128 {
        self.state.delegation_fees.get(delegate).copied().unwrap_or(0)
    }

    /// Configure who may claim with the caller's boost and at what fee.
    pub fn set_boost_delegation_params(
        &mut self,
        ctx: &CallContext,
        enabled: bool,
        fee_pct: u32,
        allowed_claimers: AllowedClaimers,
    ) -> Result<(), VaultError> {
        if fee_pct > MAX_PCT_BPS {
            return Err(VaultError::InvalidFeePct(fee_pct));
        }
        self.state.delegation.insert(
            ctx.caller,
            DelegationParams { enabled, fee_pct, allowed_claimers },
        );
        info!(user = %ctx.caller, enabled, fee_pct, "boost delegation set");
        self.emit(VaultEvent::BoostDelegationSet { user: ctx.caller, enabled, fee_pct });
        Ok(())
    }

    /// Read-only preview of [`batch_claim_rewards`](Self::batch_claim_rewards).
    pub fn claimable_rewards(
        &self,
        ctx: &CallContext,
        directory: &ReceiverDirectory,
        claimant: Address,
        boost_delegate: Address,
        receiver_ids: &[ReceiverId],
        max_fee_pct: u32,
    ) -> Result<ClaimPlan, VaultError> {
        self.plan_claim(ctx, directory, claimant, boost_delegate, receiver_ids, max_fee_pct)
    }

    /// Claim the caller's rewards from `receiver_ids` in one payout to
    /// `claimant`, boosted by `boost_delegate`'s locked weight.
    ///
    /// The shortfall between raw and boosted amounts goes back to the
    /// unallocated supply. Either every receiver settles or none does.
    pub fn batch_claim_rewards(
        &mut self,
        ctx: &CallContext,
        directory: &mut ReceiverDirectory,
        claimant: Address,
        boost_delegate: Address,
        receiver_ids: &[ReceiverId],
        max_fee_pct: u32,
    ) -> Result<ClaimPlan, VaultError> {
        let plan = self.plan_claim(ctx, directory, claimant, boost_delegate, receiver_ids, max_fee_pct)?;
        if plan.items.is_empty() {
            debug!(owner = %plan.owner, "nothing to claim");
            return Ok(plan);
        }

        let mut allocated = BTreeMap::new();
        for item in &plan.items {
            let have = allocated
                .get(&item.account)
                .copied()
                .unwrap_or_else(|| self.allocated_of(&item.account));
            allocated.insert(item.account, have - item.raw);
        }
        let returned = plan.raw - plan.boosted;
        let unallocated = self
            .state
            .unallocated_supply
            .checked_add(returned)
            .ok_or(VaultError::ArithmeticOverflow)?;
        let fees = match plan.delegate {
            Some(delegate) => Some((
                delegate,
                self.claimable_boost_delegation_fees(&delegate)
                    .checked_add(plan.fee)
                    .ok_or(VaultError::ArithmeticOverflow)?,
            )),
            None => None,
        };

        let token = self.config().governance_token;
        let vault = self.config().vault_address;
        self.tokens.transfer(&token, &vault, &claimant, plan.net)?;

        for item in &plan.items {
            match directory.vault_claim_reward(&item.account, &plan.owner) {
                Some(Ok(paid)) if paid == item.raw => {}
                settled => warn!(
                    receiver = item.receiver_id,
                    account = %item.account,
                    planned = item.raw,
                    ?settled,
                    "receiver settled a different amount than planned"
                ),
            }
        }
        self.state.allocated.extend(allocated);
        self.state.unallocated_supply = unallocated;
        if let Some((delegate, total)) = fees {
            self.state.delegation_fees.insert(delegate, total);
        }
        if let Some(boost) = &self.boost {
            boost.commit_snapshot(&plan.weight_owner, plan.epoch);
        }

        info!(
            owner = %plan.owner,
            %claimant,
            receivers = plan.items.len(),
            raw = plan.raw,
            boosted = plan.boosted,
            fee = plan.fee,
            net = plan.net,
            "rewards claimed"
        );
        self.emit(VaultEvent::RewardsClaimed {
            owner: plan.owner,
            claimant,
            delegate: plan.delegate,
            raw: plan.raw,
            boosted: plan.boosted,
            fee: plan.fee,
            net: plan.net,
            lock_weeks: self.state.lock_weeks,
        });
        Ok(plan)
    }

    /// Pay out the caller's accrued delegation fees.
    pub fn claim_boost_delegation_fees(&mut self, ctx: &CallContext, recipient: Address) -> Result<u128, VaultError> {
        let amount = self.claimable_boost_delegation_fees(&ctx.caller);
        if amount < LOCK_TO_TOKEN_RATIO {
            return Err(VaultError::NothingToClaim);
        }
        let token = self.config().governance_token;
        let vault = self.config().vault_address;
        self.tokens.transfer(&token, &vault, &recipient, amount)?;
        self.state.delegation_fees.remove(&ctx.caller);
        info!(delegate = %ctx.caller, %recipient, amount, "delegation fees claimed");
        self.emit(VaultEvent::DelegationFeesClaimed { delegate: ctx.caller, amount });
        Ok(amount)
    }

    /// Price a claim without writing anything. Ids are taken once each, and
    /// an account reached through more than one id is only paid once.
    fn plan_claim(
        &self,
        ctx: &CallContext,
        directory: &ReceiverDirectory,
        claimant: Address,
        boost_delegate: Address,
        receiver_ids: &[ReceiverId],
        max_fee_pct: u32,
    ) -> Result<ClaimPlan, VaultError> {
        if max_fee_pct > MAX_PCT_BPS {
            return Err(VaultError::InvalidMaxFeePct(max_fee_pct));
        }
        let owner = ctx.caller;
        let epoch = self.current_epoch(ctx.timestamp);

        let (delegate, fee_pct) = if boost_delegate == owner {
            (None, 0)
        } else {
            let params = self
                .state
                .delegation
                .get(&boost_delegate)
                .filter(|p| p.enabled && p.allowed_claimers.allows(&owner))
                .ok_or(VaultError::DelegationNotAllowed { delegate: boost_delegate, claimer: owner })?;
            if params.fee_pct > max_fee_pct {
                return Err(VaultError::DelegateFeeTooHigh { fee: params.fee_pct, max: max_fee_pct });
            }
            (Some(boost_delegate), params.fee_pct)
        };

        let mut plan = ClaimPlan {
            epoch,
            owner,
            claimant,
            weight_owner: boost_delegate,
            delegate,
            fee_pct,
            items: Vec::new(),
            raw: 0,
            boosted: 0,
            fee: 0,
            net: 0,
        };

        let mut seen_ids = BTreeSet::new();
        let mut seen_accounts = BTreeSet::new();
        for &id in receiver_ids {
            if !seen_ids.insert(id) {
                continue;
            }
            let account = self
                .receiver(id)
                .and_then(|r| r.account)
                .ok_or(VaultError::ReceiverNotRegistered(id))?;
            if !seen_accounts.insert(account) {
                debug!(id, %account, "receiver account already in claim");
                continue;
            }
            let raw = directory
                .claimable_reward(&account, &owner)
                .transpose()?
                .ok_or(VaultError::ReceiverNotRegistered(id))?;
            if raw == 0 {
                continue;
            }
            let have = self.allocated_of(&account);
            if raw > have {
                return Err(VaultError::ArithmeticUnderflow { have, need: raw });
            }

            let boosted = match &self.boost {
                Some(boost) => boost.claimable_with_boost(&boost_delegate, id, raw, epoch)?,
                None => raw,
            }
            .min(raw);
            debug!(id, %account, raw, boosted, "claim item");

            plan.raw = plan.raw.checked_add(raw).ok_or(VaultError::ArithmeticOverflow)?;
            plan.boosted = plan.boosted.checked_add(boosted).ok_or(VaultError::ArithmeticOverflow)?;
            plan.items.push(ClaimItem { receiver_id: id, account, raw, boosted });
        }

        plan.fee = plan
            .boosted
            .checked_mul(fee_pct as u128)
            .ok_or(VaultError::ArithmeticOverflow)?
            / BPS_PRECISION as u128;
        plan.net = plan.boosted - plan.fee;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tide_boost::{BoostCalculator, BoostParams};
    use tide_core::constants::{PRECISION, WEEK_SECONDS};
    use tide_core::memory::{InMemoryTokenLedger, LockTable, VoteTable};
    use tide_core::traits::{BoostSource, RewardReceiver};
    use tide_schedule::EmissionSchedule;

    use crate::config::VaultConfig;
    use crate::receivers::{IncentiveReceiver, ReceiverKind};
    use crate::vault::InitialParameters;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn at(caller: Address, epoch: Epoch) -> CallContext {
        CallContext::new(caller, epoch * WEEK_SECONDS)
    }

    const RECEIVER: u64 = 500;
    const OPERATOR: u64 = 501;
    const ALICE: u64 = 10;
    const BOB: u64 = 11;

    struct Fixture {
        vault: EmissionVault<InMemoryTokenLedger>,
        dir: ReceiverDirectory,
        locks: Arc<LockTable>,
        boost: Arc<BoostCalculator>,
        id: ReceiverId,
    }

    /// One incentive receiver holding 1,000 allocated tokens, with 100
    /// credited to Alice and 100 to Bob.
    fn fixture(with_boost: bool) -> Fixture {
        let cfg = VaultConfig::default();
        let mut vault = EmissionVault::new(cfg.clone(), InMemoryTokenLedger::new());
        let votes = Arc::new(VoteTable::new());
        let locks = Arc::new(LockTable::new());
        let schedule = Arc::new(
            EmissionSchedule::new(votes.clone(), cfg.clock(), cfg.schedule_manager, cfg.schedule).unwrap(),
        );
        let boost = Arc::new(BoostCalculator::new(
            locks.clone(),
            BoostParams { grace_weeks: 0, boost_factor_scale_bps: 20_000 },
        ));
        vault
            .set_initial_parameters(
                &at(cfg.deployment_manager, 0),
                InitialParameters {
                    schedule: Some(schedule),
                    boost: with_boost.then(|| boost.clone() as Arc<dyn BoostSource>),
                    total_supply: 10_000 * PRECISION,
                    initial_lock_weeks: 13,
                    fixed_weekly_pct: vec![1_000; 4],
                    ..InitialParameters::default()
                },
            )
            .unwrap();
        let mut dir = ReceiverDirectory::new();
        dir.insert(ReceiverKind::Incentive(IncentiveReceiver::new(addr(RECEIVER), addr(OPERATOR))));
        let id = vault.register_receiver(&at(cfg.owner, 0), &mut dir, addr(RECEIVER), None).unwrap();
        votes.set_vote(id, 0, 10_000);
        dir.fetch_emissions(&addr(RECEIVER), &mut vault, &at(addr(RECEIVER), 1)).unwrap();

        let ReceiverKind::Incentive(incentive) = dir.get_mut(&addr(RECEIVER)).unwrap() else {
            unreachable!()
        };
        incentive.credit(&at(addr(OPERATOR), 1), addr(ALICE), 100 * PRECISION).unwrap();
        incentive.credit(&at(addr(OPERATOR), 1), addr(BOB), 100 * PRECISION).unwrap();
        Fixture { vault, dir, locks, boost, id }
    }

    fn balance(f: &Fixture, who: u64) -> u128 {
        let token = f.vault.config().governance_token;
        f.vault.tokens().balance_of(&token, &addr(who))
    }

    #[test]
    fn unboosted_claim_pays_raw() {
        let mut f = fixture(false);
        let plan = f
            .vault
            .batch_claim_rewards(&at(addr(ALICE), 1), &mut f.dir, addr(ALICE), addr(ALICE), &[f.id], 0)
            .unwrap();
        assert_eq!(plan.net, 100 * PRECISION);
        assert_eq!(balance(&f, ALICE), 100 * PRECISION);
        assert_eq!(f.vault.allocated_of(&addr(RECEIVER)), 900 * PRECISION);
        assert_eq!(f.dir.claimable_reward(&addr(RECEIVER), &addr(ALICE)), Some(Ok(0)));
        assert_eq!(f.vault.state().accounted_total(), f.vault.token_balance());
    }

    #[test]
    fn boost_penalty_returns_to_unallocated() {
        let mut f = fixture(true);
        // Alice holds 25% of the weight; scale 2x gives a 0.5 factor.
        f.locks.lock(addr(ALICE), 0, 25, 52);
        f.locks.lock(addr(BOB), 0, 75, 52);
        let before = f.vault.unallocated_supply();
        let plan = f
            .vault
            .batch_claim_rewards(&at(addr(ALICE), 1), &mut f.dir, addr(ALICE), addr(ALICE), &[f.id], 0)
            .unwrap();
        assert_eq!(plan.boosted, 50 * PRECISION);
        assert_eq!(f.vault.unallocated_supply(), before + 50 * PRECISION);
        assert_eq!(balance(&f, ALICE), 50 * PRECISION);
        assert_eq!(f.vault.state().accounted_total(), f.vault.token_balance());
    }

    #[test]
    fn preview_matches_claim_and_writes_nothing() {
        let mut f = fixture(true);
        f.locks.lock(addr(ALICE), 0, 10, 52);
        f.locks.lock(addr(BOB), 0, 90, 52);
        let ctx = at(addr(ALICE), 1);
        let before = f.vault.state().clone();
        let preview = f
            .vault
            .claimable_rewards(&ctx, &f.dir, addr(ALICE), addr(ALICE), &[f.id], 0)
            .unwrap();
        assert_eq!(f.vault.state(), &before);
        let applied = f
            .vault
            .batch_claim_rewards(&ctx, &mut f.dir, addr(ALICE), addr(ALICE), &[f.id], 0)
            .unwrap();
        assert_eq!(preview, applied);
    }

    #[test]
    fn max_fee_pct_above_bps_rejected() {
        let mut f = fixture(false);
        assert_eq!(
            f.vault
                .batch_claim_rewards(&at(addr(ALICE), 1), &mut f.dir, addr(ALICE), addr(ALICE), &[f.id], 10_001),
            Err(VaultError::InvalidMaxFeePct(10_001))
        );
    }

    #[test]
    fn delegated_claim_splits_fee() {
        let mut f = fixture(true);
        f.locks.lock(addr(BOB), 0, 100, 52);
        f.vault
            .set_boost_delegation_params(&at(addr(BOB), 1), true, 1_000, AllowedClaimers::Any)
            .unwrap();
        let plan = f
            .vault
            .batch_claim_rewards(&at(addr(ALICE), 1), &mut f.dir, addr(ALICE), addr(BOB), &[f.id], 1_000)
            .unwrap();
        assert_eq!(plan.boosted, 100 * PRECISION);
        assert_eq!(plan.fee, 10 * PRECISION);
        assert_eq!(plan.net + plan.fee, plan.boosted);
        assert_eq!(plan.delegate, Some(addr(BOB)));
        assert_eq!(f.vault.claimable_boost_delegation_fees(&addr(BOB)), 10 * PRECISION);
        assert_eq!(f.vault.state().accounted_total(), f.vault.token_balance());

        let paid = f.vault.claim_boost_delegation_fees(&at(addr(BOB), 1), addr(BOB)).unwrap();
        assert_eq!(paid, 10 * PRECISION);
        assert_eq!(f.vault.claimable_boost_delegation_fees(&addr(BOB)), 0);
        assert_eq!(
            f.vault.claim_boost_delegation_fees(&at(addr(BOB), 1), addr(BOB)),
            Err(VaultError::NothingToClaim)
        );
    }

    #[test]
    fn delegation_errors() {
        let mut f = fixture(true);
        let ctx = at(addr(ALICE), 1);
        assert_eq!(
            f.vault.batch_claim_rewards(&ctx, &mut f.dir, addr(ALICE), addr(BOB), &[f.id], 0),
            Err(VaultError::DelegationNotAllowed { delegate: addr(BOB), claimer: addr(ALICE) })
        );
        f.vault
            .set_boost_delegation_params(&at(addr(BOB), 1), true, 500, AllowedClaimers::Only([addr(99)].into_iter().collect()))
            .unwrap();
        assert_eq!(
            f.vault.batch_claim_rewards(&ctx, &mut f.dir, addr(ALICE), addr(BOB), &[f.id], 0),
            Err(VaultError::DelegationNotAllowed { delegate: addr(BOB), claimer: addr(ALICE) })
        );
        f.vault
            .set_boost_delegation_params(&at(addr(BOB), 1), true, 500, AllowedClaimers::Any)
            .unwrap();
        assert_eq!(
            f.vault.batch_claim_rewards(&ctx, &mut f.dir, addr(ALICE), addr(BOB), &[f.id], 499),
            Err(VaultError::DelegateFeeTooHigh { fee: 500, max: 499 })
        );
        assert_eq!(
            f.vault.set_boost_delegation_params(&at(addr(BOB), 1), true, 10_001, AllowedClaimers::Any),
            Err(VaultError::InvalidFeePct(10_001))
        );
    }

    #[test]
    fn disabled_delegation_rejected() {
        let mut f = fixture(true);
        f.vault
            .set_boost_delegation_params(&at(addr(BOB), 1), false, 0, AllowedClaimers::Any)
            .unwrap();
        assert!(matches!(
            f.vault
                .batch_claim_rewards(&at(addr(ALICE), 1), &mut f.dir, addr(ALICE), addr(BOB), &[f.id], 0),
            Err(VaultError::DelegationNotAllowed { .. })
        ));
    }

    #[test]
    fn duplicate_and_unknown_ids() {
        let mut f = fixture(false);
        let ctx = at(addr(ALICE), 1);
        let plan = f
            .vault
            .batch_claim_rewards(&ctx, &mut f.dir, addr(ALICE), addr(ALICE), &[f.id, f.id], 0)
            .unwrap();
        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.raw, 100 * PRECISION);
        assert_eq!(
            f.vault.batch_claim_rewards(&ctx, &mut f.dir, addr(ALICE), addr(ALICE), &[42], 0),
            Err(VaultError::ReceiverNotRegistered(42))
        );
    }

    #[test]
    fn zero_claim_is_a_no_op() {
        let mut f = fixture(false);
        let plan = f
            .vault
            .batch_claim_rewards(&at(addr(77), 1), &mut f.dir, addr(77), addr(77), &[f.id], 0)
            .unwrap();
        assert!(plan.items.is_empty());
        assert_eq!(plan.net, 0);
    }

    #[test]
    fn claim_above_allocation_reverts_batch() {
        let mut f = fixture(false);
        // Over-credit the receiver beyond what the vault allocated to it.
        if let Some(ReceiverKind::Incentive(r)) = f.dir.get_mut(&addr(RECEIVER)) {
            r.on_allocation(1, 5_000 * PRECISION);
            r.credit(&at(addr(OPERATOR), 1), addr(ALICE), 2_000 * PRECISION).unwrap();
        }
        let before = f.vault.state().clone();
        assert_eq!(
            f.vault
                .batch_claim_rewards(&at(addr(ALICE), 1), &mut f.dir, addr(ALICE), addr(ALICE), &[f.id], 0),
            Err(VaultError::ArithmeticUnderflow { have: 1_000 * PRECISION, need: 2_100 * PRECISION })
        );
        assert_eq!(f.vault.state(), &before);
        assert_eq!(f.dir.get(&addr(RECEIVER)).unwrap().claimable_reward(&addr(ALICE)), Ok(2_100 * PRECISION));
    }

    #[test]
    fn account_behind_two_ids_is_paid_once() {
        let mut f = fixture(false);
        let second = f.vault.register_new_receiver(&at(addr(9), 1)).unwrap();
        // Only a hand-edited ledger can point two ids at one account.
        if let Some(record) = f.vault.state.receivers.get_mut(&second) {
            record.account = Some(addr(RECEIVER));
        }
        let plan = f
            .vault
            .batch_claim_rewards(&at(addr(ALICE), 1), &mut f.dir, addr(ALICE), addr(ALICE), &[f.id, second], 0)
            .unwrap();
        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.raw, 100 * PRECISION);
        assert_eq!(balance(&f, ALICE), 100 * PRECISION);
        assert_eq!(f.vault.allocated_of(&addr(RECEIVER)), 900 * PRECISION);
        assert_eq!(f.vault.state().accounted_total(), f.vault.token_balance());
    }

    #[test]
    fn failed_claim_leaves_boost_weights_unfrozen() {
        let mut f = fixture(true);
        f.locks.lock(addr(ALICE), 0, 10, 52);
        f.locks.lock(addr(BOB), 0, 90, 52);

        // A second receiver that owes Alice more than it was ever allocated.
        let owner = at(f.vault.config().owner, 1);
        f.dir.insert(ReceiverKind::Incentive(IncentiveReceiver::new(addr(600), addr(OPERATOR))));
        let second = f.vault.register_receiver(&owner, &mut f.dir, addr(600), None).unwrap();
        if let Some(ReceiverKind::Incentive(r)) = f.dir.get_mut(&addr(600)) {
            r.on_allocation(1, 50 * PRECISION);
            r.credit(&at(addr(OPERATOR), 1), addr(ALICE), 50 * PRECISION).unwrap();
        }

        let ctx = at(addr(ALICE), 1);
        let before = f.vault.state().clone();
        assert_eq!(
            f.vault.batch_claim_rewards(&ctx, &mut f.dir, addr(ALICE), addr(ALICE), &[f.id, second], 0),
            Err(VaultError::ArithmeticUnderflow { have: 0, need: 50 * PRECISION })
        );
        assert_eq!(f.vault.state(), &before);
        assert_eq!(f.boost.snapshot(&addr(ALICE), 1), None);
        assert_eq!(balance(&f, ALICE), 0);

        f.vault
            .batch_claim_rewards(&ctx, &mut f.dir, addr(ALICE), addr(ALICE), &[f.id], 0)
            .unwrap();
        assert!(f.boost.snapshot(&addr(ALICE), 1).is_some());
    }
}
