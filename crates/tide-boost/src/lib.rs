//! # tide-boost - Lock-weight boost calculator.
//!
//! All calculations use integer arithmetic only for determinism.
//!
//! A claim of `raw` tokens is scaled by a factor in `[0, 1]`:
//! - **Weight share**: `user_weight * scale / total_weight`, capped at 1.
//! - **Grace window**: for `grace_weeks` epochs after a user's first lock the
//!   factor is held at 1.
//! - **Snapshots**: the apply path freezes a user's weights for the epoch on
//!   first use; the preview path reads them without writing.

pub mod calculator;

pub use calculator::{boost_factor, BoostCalculator, BoostParams, WeightSnapshot};
