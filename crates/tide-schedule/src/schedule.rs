//! Emission schedule implementing the [`EmissionSource`] trait.
//!
//! The weekly percentage follows a hold-then-linear-decay curve. The receiver
//! percentage multiplies it by the receiver's vote share, giving a value on
//! the [`RECEIVER_PCT_PRECISION`] scale.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tide_core::constants::{BPS_PRECISION, MAX_PCT_BPS, RECEIVER_PCT_PRECISION};
use tide_core::error::ScheduleError;
use tide_core::traits::{EmissionSource, VotingProvider};
use tide_core::types::{Address, CallContext, Epoch, EpochClock, ReceiverId};

/// Shape of the decay curve.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleParams {
    /// Weekly percentage during the hold window, in bps.
    pub initial_weekly_pct_bps: u32,
    /// Weekly percentage once decay completes, in bps.
    pub floor_weekly_pct_bps: u32,
    /// Epochs during which the initial percentage holds.
    pub initial_lock_weeks: u64,
    /// Epochs over which the percentage falls to the floor.
    pub lock_decay_weeks: u64,
}

impl Default for ScheduleParams {
    fn default() -> Self {
        Self {
            initial_weekly_pct_bps: 100,
            floor_weekly_pct_bps: 25,
            initial_lock_weeks: 26,
            lock_decay_weeks: 52,
        }
    }
}

/// The production emission schedule.
pub struct EmissionSchedule {
    voting: Arc<dyn VotingProvider>,
    clock: EpochClock,
    manager: Address,
    params: ScheduleParams,
    /// Per-epoch percentage overrides in bps.
    overrides: RwLock<BTreeMap<Epoch, u32>>,
}

impl std::fmt::Debug for EmissionSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmissionSchedule")
            .field("clock", &self.clock)
            .field("manager", &self.manager)
            .field("params", &self.params)
            .field("overrides", &*self.overrides.read())
            .finish()
    }
}

impl EmissionSchedule {
    /// Create a schedule. Fails with [`ScheduleError::InvalidPct`] if either
    /// percentage exceeds 100% or the floor is above the initial percentage.
    pub fn new(
        voting: Arc<dyn VotingProvider>,
        clock: EpochClock,
        manager: Address,
        params: ScheduleParams,
    ) -> Result<Self, ScheduleError> {
        if params.initial_weekly_pct_bps > MAX_PCT_BPS {
            return Err(ScheduleError::InvalidPct(params.initial_weekly_pct_bps));
        }
        if params.floor_weekly_pct_bps > params.initial_weekly_pct_bps {
            return Err(ScheduleError::InvalidPct(params.floor_weekly_pct_bps));
        }
        Ok(Self {
            voting,
            clock,
            manager,
            params,
            overrides: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn manager(&self) -> Address {
        self.manager
    }

    pub fn params(&self) -> &ScheduleParams {
        &self.params
    }

    /// The curve value for `epoch`, ignoring overrides.
    pub fn scheduled_pct(&self, epoch: Epoch) -> u32 {
        let p = &self.params;
        if epoch < p.initial_lock_weeks {
            return p.initial_weekly_pct_bps;
        }
        let elapsed = epoch - p.initial_lock_weeks;
        if p.lock_decay_weeks == 0 || elapsed >= p.lock_decay_weeks {
            return p.floor_weekly_pct_bps;
        }
        // Linear interpolation; elapsed < decay_weeks so this stays above the floor.
        let span = (p.initial_weekly_pct_bps - p.floor_weekly_pct_bps) as u64;
        let drop = span * elapsed / p.lock_decay_weeks;
        p.initial_weekly_pct_bps - drop as u32
    }

    /// Manager-only override of the weekly percentage for a future epoch.
    ///
    /// Epochs that have started (including the current one) cannot be changed.
    pub fn set_weekly_pct_schedule(
        &self,
        ctx: &CallContext,
        epoch: Epoch,
        pct_bps: u32,
    ) -> Result<(), ScheduleError> {
        if ctx.caller != self.manager {
            return Err(ScheduleError::Unauthorized(ctx.caller));
        }
        let current = self.clock.epoch_at(ctx.timestamp);
        if epoch <= current {
            return Err(ScheduleError::EpochAlreadyStarted { epoch, current });
        }
        if pct_bps > MAX_PCT_BPS {
            return Err(ScheduleError::InvalidPct(pct_bps));
        }
        self.overrides.write().insert(epoch, pct_bps);
        info!(epoch, pct_bps, "weekly pct override set");
        Ok(())
    }

    /// Copy of the override table.
    pub fn overrides(&self) -> BTreeMap<Epoch, u32> {
        self.overrides.read().clone()
    }

    /// Replace the override table with one loaded from a snapshot.
    pub fn restore_overrides(&self, overrides: &BTreeMap<Epoch, u32>) -> Result<(), ScheduleError> {
        if let Some(bad) = overrides.values().find(|p| **p > MAX_PCT_BPS) {
            return Err(ScheduleError::InvalidPct(*bad));
        }
        *self.overrides.write() = overrides.clone();
        info!(epochs = overrides.len(), "weekly pct overrides restored");
        Ok(())
    }
}

impl EmissionSource for EmissionSchedule {
    fn weekly_pct(&self, epoch: Epoch) -> u32 {
        match self.overrides.read().get(&epoch) {
            Some(pct) => *pct,
            None => self.scheduled_pct(epoch),
        }
    }

    fn receiver_weekly_pct(&self, receiver: ReceiverId, epoch: Epoch) -> Result<u64, ScheduleError> {
        let weekly = self.weekly_pct(epoch) as u64;
        let vote = self.voting.receiver_vote_pct(receiver, epoch).min(BPS_PRECISION) as u64;
        let pct = weekly
            .checked_mul(vote)
            .ok_or(ScheduleError::ArithmeticOverflow)?;
        debug_assert!(pct as u128 <= RECEIVER_PCT_PRECISION);
        debug!(receiver, epoch, weekly, vote, pct, "receiver weekly pct");
        Ok(pct)
    }

    fn seed_fixed_schedule(&self, pcts: &[u32]) -> Result<(), ScheduleError> {
        if let Some(bad) = pcts.iter().find(|p| **p > MAX_PCT_BPS) {
            return Err(ScheduleError::InvalidPct(*bad));
        }
        let mut overrides = self.overrides.write();
        for (epoch, pct) in pcts.iter().enumerate() {
            overrides.insert(epoch as Epoch, *pct);
        }
        info!(epochs = pcts.len(), "fixed weekly schedule seeded");
        Ok(())
    }

    fn override_table(&self) -> BTreeMap<Epoch, u32> {
        self.overrides()
    }
}
