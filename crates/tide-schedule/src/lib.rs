//! # tide-schedule - Weekly emission schedule.
//!
//! Maps an epoch to the percentage of the unallocated supply released that
//! week, then splits it across receivers by their vote share:
//! - **Hold**: the initial percentage applies for `initial_lock_weeks` epochs.
//! - **Decay**: the percentage falls linearly to the floor across
//!   `lock_decay_weeks` epochs and stays there.
//! - **Overrides**: a manager-set percentage for a specific future epoch
//!   takes precedence unconditionally.
//!
//! All calculations use integer arithmetic.

pub mod schedule;

pub use schedule::{EmissionSchedule, ScheduleParams};
