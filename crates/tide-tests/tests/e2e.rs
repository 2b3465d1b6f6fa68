//! End-to-end tests for the emission vault.
//!
//! Each test bootstraps a vault, registers receivers, advances epochs and
//! checks allocation, claims and persistence across the whole stack.

use tide_boost::BoostParams;
use tide_core::error::VaultError;
use tide_core::traits::{EmissionSource, RewardReceiver, TokenLedger};
use tide_tests::helpers::*;
use tide_vault::{snapshot, AllowedClaimers, EmissionVault, VaultEvent};

const SUPPLY: u64 = 10_000;

fn ten_pct_harness() -> Harness {
    let mut h = Harness::new();
    h.bootstrap(tokens(SUPPLY), vec![1_000; 8]);
    h
}

#[test]
fn two_epoch_gap_allocates_compounded() {
    let mut h = ten_pct_harness();
    let id = h.add_incentive(addr(500), 0);
    h.votes.set_vote(id, 0, 10_000);

    let delta = h.fetch(addr(500), 2);
    assert_eq!(delta, tokens(1_900));
    assert_eq!(h.vault.unallocated_supply(), tokens(8_100));
    assert_eq!(h.vault.allocated_of(&addr(500)), tokens(1_900));
    h.assert_balanced();
}

#[test]
fn gap_matches_stepwise() {
    let mut gap = ten_pct_harness();
    let mut step = ten_pct_harness();
    for h in [&mut gap, &mut step] {
        let id = h.add_incentive(addr(500), 0);
        h.votes.set_vote(id, 0, 6_000);
    }

    gap.fetch(addr(500), 3);
    for epoch in 1..=3 {
        step.fetch(addr(500), epoch);
    }
    assert_eq!(gap.vault.unallocated_supply(), step.vault.unallocated_supply());
    assert_eq!(gap.vault.receiver_ledger(1), step.vault.receiver_ledger(1));
}

#[test]
fn receivers_split_by_vote() {
    let mut h = ten_pct_harness();
    let a = h.add_incentive(addr(500), 0);
    let b = h.add_incentive(addr(501), 0);
    h.votes.set_vote(a, 0, 7_500);
    h.votes.set_vote(b, 0, 2_500);

    assert_eq!(h.fetch(addr(500), 1), tokens(750));
    // The second receiver sees the supply already reduced by the first.
    assert_eq!(h.fetch(addr(501), 1), tokens(9_250) / 40);
    h.assert_balanced();
}

#[test]
fn manager_override_changes_future_epoch() {
    let mut h = ten_pct_harness();
    let id = h.add_incentive(addr(500), 0);
    h.votes.set_vote(id, 0, 10_000);
    let manager = h.at(h.config.schedule_manager, 0);
    h.schedule.set_weekly_pct_schedule(&manager, 1, 500).unwrap();

    assert_eq!(h.fetch(addr(500), 1), tokens(500));
}

#[test]
fn receiver_reserved_then_bound() {
    let mut h = ten_pct_harness();
    let ctx = h.at(addr(500), 0);
    let id = h.vault.register_new_receiver(&ctx).unwrap();
    h.votes.set_vote(id, 0, 10_000);

    // Unbound ids cannot pull emissions.
    let early = h.at(addr(500), 1);
    assert_eq!(
        h.vault.allocate_new_emissions(&early, id),
        Err(VaultError::ReceiverNotRegistered(id))
    );

    h.directory.insert(tide_vault::ReceiverKind::Incentive(
        tide_vault::IncentiveReceiver::new(addr(500), addr(500)),
    ));
    let owner = h.owner(2);
    h.vault
        .register_receiver(&owner, &mut h.directory, addr(500), Some(id))
        .unwrap();
    // The cursor starts at the binding epoch.
    assert_eq!(h.fetch(addr(500), 3), tokens(1_000));
}

#[test]
fn deactivated_receiver_keeps_balance_and_skips_epochs() {
    let mut h = ten_pct_harness();
    let id = h.add_incentive(addr(500), 0);
    h.votes.set_vote(id, 0, 10_000);
    h.fetch(addr(500), 1);

    let owner = h.owner(1);
    h.vault.set_receiver_is_active(&owner, id, false).unwrap();
    assert_eq!(h.fetch(addr(500), 3), 0);
    assert_eq!(h.vault.allocated_of(&addr(500)), tokens(1_000));
    assert_eq!(h.vault.unallocated_supply(), tokens(9_000));

    let owner = h.owner(3);
    h.vault.set_receiver_is_active(&owner, id, true).unwrap();
    assert_eq!(h.fetch(addr(500), 4), tokens(900));
}

#[test]
fn trove_debt_holders_claim_with_boost() {
    let mut h = Harness::with_boost(BoostParams { grace_weeks: 0, boost_factor_scale_bps: 10_000 });
    h.bootstrap(tokens(SUPPLY), vec![1_000; 4]);
    let id = h.add_trove_manager(addr(600), 0);
    h.votes.set_vote(id, 0, 10_000);
    h.set_debt(addr(600), addr(10), tokens(30));
    h.set_debt(addr(600), addr(11), tokens(10));
    h.locks.lock(addr(10), 0, 50, 52);
    h.locks.lock(addr(11), 0, 50, 52);

    h.fetch(addr(600), 1);
    let ctx = h.at(addr(10), 1);
    let plan = h
        .vault
        .batch_claim_rewards(&ctx, &mut h.directory, addr(10), addr(10), &[id], 0)
        .unwrap();
    assert_eq!(plan.raw, tokens(750));
    // Half the lock weight at a 1x scale halves the payout.
    assert_eq!(plan.boosted, tokens(375));
    assert_eq!(h.balance(addr(10)), tokens(375));
    assert_eq!(h.vault.unallocated_supply(), tokens(9_000) + tokens(375));
    h.assert_balanced();
}

#[test]
fn delegated_claim_accrues_and_pays_fees() {
    let mut h = ten_pct_harness();
    let id = h.add_incentive(addr(500), 0);
    h.votes.set_vote(id, 0, 10_000);
    h.locks.lock(addr(20), 0, 1_000, 52);
    h.fetch(addr(500), 1);
    h.credit(addr(500), addr(10), tokens(100), 1);

    let delegate_ctx = h.at(addr(20), 1);
    h.vault
        .set_boost_delegation_params(&delegate_ctx, true, 2_000, AllowedClaimers::Any)
        .unwrap();

    let claimer = h.at(addr(10), 1);
    let preview = h
        .vault
        .claimable_rewards(&claimer, &h.directory, addr(30), addr(20), &[id], 2_000)
        .unwrap();
    let plan = h
        .vault
        .batch_claim_rewards(&claimer, &mut h.directory, addr(30), addr(20), &[id], 2_000)
        .unwrap();
    assert_eq!(preview, plan);
    assert_eq!(plan.fee, tokens(20));
    assert_eq!(plan.net + plan.fee, plan.boosted);
    assert_eq!(h.balance(addr(30)), tokens(80));
    h.assert_balanced();

    let fee_ctx = h.at(addr(20), 2);
    assert_eq!(h.vault.claim_boost_delegation_fees(&fee_ctx, addr(20)).unwrap(), tokens(20));
    assert_eq!(h.balance(addr(20)), tokens(20));
    h.assert_balanced();
}

#[test]
fn increase_then_transfer_supply() {
    let mut h = ten_pct_harness();
    let token = h.config.governance_token;
    h.vault.tokens_mut().mint(&token, &addr(40), tokens(500)).unwrap();
    let ctx = h.at(addr(40), 0);
    h.vault.increase_unallocated_supply(&ctx, tokens(500)).unwrap();
    assert_eq!(h.vault.unallocated_supply(), tokens(10_500));

    let owner = h.owner(0);
    h.vault.transfer_tokens(&owner, token, addr(41), tokens(1_500)).unwrap();
    assert_eq!(h.vault.unallocated_supply(), tokens(9_000));
    assert_eq!(h.balance(addr(41)), tokens(1_500));
    h.assert_balanced();

    let events = h.vault.take_events();
    assert!(events.iter().any(|e| matches!(e, VaultEvent::UnallocatedSupplyReduced { .. })));
}

#[test]
fn snapshot_restores_vault() {
    let mut h = ten_pct_harness();
    let id = h.add_incentive(addr(500), 0);
    h.votes.set_vote(id, 0, 10_000);
    h.fetch(addr(500), 2);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.snapshot");
    snapshot::save(&path, &h.vault.snapshot()).unwrap();
    let file = snapshot::load(&path).unwrap();

    // A fresh schedule only knows the default curve until the overrides
    // come back from the snapshot.
    let mut restored = Harness::new();
    assert_ne!(restored.schedule.weekly_pct(3), 1_000);
    restored.schedule.restore_overrides(&file.schedule_overrides).unwrap();
    assert_eq!(restored.schedule.weekly_pct(3), 1_000);

    restored.vault = EmissionVault::from_state(h.config.clone(), h.vault.tokens().clone(), file.state);
    let owner = restored.owner(2);
    let schedule = restored.schedule.clone();
    restored.vault.set_emission_schedule(&owner, Some(schedule)).unwrap();
    restored.directory = h.directory.clone();
    restored.votes.set_vote(id, 0, 10_000);
    assert_eq!(restored.vault.state(), h.vault.state());
    assert_eq!(restored.vault.unallocated_supply(), tokens(8_100));
    assert_eq!(restored.vault.receiver(id).unwrap().last_updated_epoch, 2);

    // Both vaults resolve the next epoch identically.
    assert_eq!(restored.fetch(addr(500), 3), tokens(810));
    assert_eq!(h.fetch(addr(500), 3), tokens(810));
}

#[test]
fn receiver_claim_matches_directory_preview() {
    let mut h = ten_pct_harness();
    let id = h.add_incentive(addr(500), 0);
    h.votes.set_vote(id, 0, 10_000);
    h.fetch(addr(500), 1);
    h.credit(addr(500), addr(10), tokens(10), 1);
    let receiver = h.directory.get(&addr(500)).unwrap();
    assert_eq!(receiver.claimable_reward(&addr(10)), Ok(tokens(10)));
}
