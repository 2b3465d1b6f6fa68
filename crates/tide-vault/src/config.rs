//! Vault configuration.
//!
//! Provides [`VaultConfig`] with defaults for roles, addresses, epoch timing
//! and the schedule and boost curves. A config can be built programmatically
//! or loaded from a TOML file layered under `TIDE_*` environment variables.

use std::path::Path;

use serde::{Deserialize, Serialize};

use tide_boost::BoostParams;
use tide_core::constants::WEEK_SECONDS;
use tide_core::error::TideError;
use tide_core::types::{Address, EpochClock};
use tide_schedule::ScheduleParams;

/// Configuration for a vault instance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// Unix timestamp at which epoch 0 begins.
    pub start_timestamp: u64,
    /// Epoch length in seconds.
    pub week_seconds: u64,
    /// Owner role: registry and treasury operations.
    pub owner: Address,
    /// One-time bootstrap role for `set_initial_parameters`.
    pub deployment_manager: Address,
    /// Manager role for weekly percentage overrides.
    pub schedule_manager: Address,
    /// The vault's own account in the token ledger.
    pub vault_address: Address,
    /// The governance token distributed by the vault.
    pub governance_token: Address,
    #[serde(default)]
    pub schedule: ScheduleParams,
    #[serde(default)]
    pub boost: BoostParams,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            start_timestamp: 0,
            week_seconds: WEEK_SECONDS,
            owner: Address::from_low_u64(1),
            deployment_manager: Address::from_low_u64(2),
            schedule_manager: Address::from_low_u64(3),
            vault_address: Address::from_low_u64(0x7661_756c_74),
            governance_token: Address::from_low_u64(0x746f_6b65_6e),
            schedule: ScheduleParams::default(),
            boost: BoostParams::default(),
        }
    }
}

impl VaultConfig {
    /// Load defaults, then `path` (if given), then `TIDE_*` environment
    /// variables. Nested keys use `__`, e.g. `TIDE_SCHEDULE__FLOOR_WEEKLY_PCT_BPS`.
    pub fn load(path: Option<&Path>) -> Result<Self, TideError> {
        let defaults = config::Config::try_from(&Self::default())
            .map_err(|e| TideError::Config(e.to_string()))?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(
                config::Environment::with_prefix("TIDE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TideError::Config(e.to_string()))
    }

    pub fn clock(&self) -> EpochClock {
        EpochClock::new(self.start_timestamp, self.week_seconds)
    }
}
