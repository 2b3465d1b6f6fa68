//! Boost calculator implementing the [`BoostSource`] trait.
//!
//! The factor is a fixed-point value on the [`BOOST_PRECISION`] scale with
//! u128 intermediates for overflow safety.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tide_core::constants::{BOOST_PRECISION, BPS_PRECISION};
use tide_core::error::BoostError;
use tide_core::traits::{BoostSource, LockerProvider};
use tide_core::types::{Address, Epoch, ReceiverId};

/// Boost curve parameters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoostParams {
    /// Epochs after a user's first lock during which the factor is 1.
    pub grace_weeks: u64,
    /// Multiplier applied to the user's weight share, in bps.
    ///
    /// `100_000` means a user holding 10% of the total weight reaches full
    /// boost.
    pub boost_factor_scale_bps: u32,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            grace_weeks: 4,
            boost_factor_scale_bps: 100_000,
        }
    }
}

/// User and total locked weight frozen for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightSnapshot {
    pub user_weight: u64,
    pub total_weight: u64,
}

/// `min(1, user_weight * scale / total_weight)` on the [`BOOST_PRECISION`] scale.
///
/// A zero total weight yields 0.
pub fn boost_factor(user_weight: u64, total_weight: u64, scale_bps: u32) -> Result<u128, BoostError> {
    if total_weight == 0 || user_weight == 0 {
        return Ok(0);
    }
    let numerator = (user_weight as u128)
        .checked_mul(scale_bps as u128)
        .and_then(|v| v.checked_mul(BOOST_PRECISION))
        .ok_or(BoostError::ArithmeticOverflow)?;
    let denominator = (total_weight as u128) * BPS_PRECISION as u128;
    Ok((numerator / denominator).min(BOOST_PRECISION))
}

/// The production boost calculator.
pub struct BoostCalculator {
    locker: Arc<dyn LockerProvider>,
    params: BoostParams,
    snapshots: RwLock<HashMap<(Address, Epoch), WeightSnapshot>>,
}

impl std::fmt::Debug for BoostCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoostCalculator")
            .field("params", &self.params)
            .field("snapshots", &self.snapshots.read().len())
            .finish()
    }
}

impl BoostCalculator {
    pub fn new(locker: Arc<dyn LockerProvider>, params: BoostParams) -> Self {
        Self {
            locker,
            params,
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    pub fn params(&self) -> &BoostParams {
        &self.params
    }

    /// Whether `epoch` falls in the grace window of `user`'s first lock.
    pub fn in_grace_window(&self, user: &Address, epoch: Epoch) -> bool {
        match self.locker.first_lock_epoch(user) {
            Some(first) => epoch >= first && epoch - first < self.params.grace_weeks,
            None => false,
        }
    }

    /// Frozen snapshot for `(user, epoch)`, if the apply path recorded one.
    pub fn snapshot(&self, user: &Address, epoch: Epoch) -> Option<WeightSnapshot> {
        self.snapshots.read().get(&(*user, epoch)).copied()
    }

    fn weights(&self, user: &Address, epoch: Epoch, record: bool) -> WeightSnapshot {
        if let Some(snap) = self.snapshot(user, epoch) {
            return snap;
        }
        let snap = WeightSnapshot {
            user_weight: self.locker.user_weight_at(user, epoch),
            total_weight: self.locker.total_weight_at(epoch),
        };
        if record {
            // Another writer may have raced us; keep whichever landed first.
            *self.snapshots.write().entry((*user, epoch)).or_insert(snap)
        } else {
            snap
        }
    }

    /// Boost factor for `user` in `epoch` without recording a snapshot.
    pub fn factor(&self, user: &Address, epoch: Epoch) -> Result<u128, BoostError> {
        self.factor_inner(user, epoch, false)
    }

    fn factor_inner(&self, user: &Address, epoch: Epoch, record: bool) -> Result<u128, BoostError> {
        if self.in_grace_window(user, epoch) {
            return Ok(BOOST_PRECISION);
        }
        let w = self.weights(user, epoch, record);
        boost_factor(w.user_weight, w.total_weight, self.params.boost_factor_scale_bps)
    }

    fn scaled(&self, user: &Address, receiver: ReceiverId, raw: u128, epoch: Epoch, record: bool) -> Result<u128, BoostError> {
        if raw == 0 {
            return Ok(0);
        }
        let factor = self.factor_inner(user, epoch, record)?;
        let boosted = raw
            .checked_mul(factor)
            .ok_or(BoostError::ArithmeticOverflow)?
            / BOOST_PRECISION;
        debug!(%user, receiver, epoch, raw, factor, boosted, record, "boosted amount");
        Ok(boosted.min(raw))
    }
}

impl BoostSource for BoostCalculator {
    fn boosted_amount(&self, user: &Address, receiver: ReceiverId, raw: u128, epoch: Epoch) -> Result<u128, BoostError> {
        self.scaled(user, receiver, raw, epoch, true)
    }

    fn claimable_with_boost(&self, user: &Address, receiver: ReceiverId, raw: u128, epoch: Epoch) -> Result<u128, BoostError> {
        self.scaled(user, receiver, raw, epoch, false)
    }

    fn commit_snapshot(&self, user: &Address, epoch: Epoch) {
        let snap = self.weights(user, epoch, true);
        debug!(%user, epoch, user_weight = snap.user_weight, total_weight = snap.total_weight, "weights frozen");
    }
}
