//! Versioned on-disk snapshots of [`VaultState`] and the emission
//! schedule's override table.
//!
//! The binary format is a bincode-encoded [`SnapshotFile`] (standard config).
//! A JSON rendering of the state is available for inspection but is not
//! read back.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::info;

use tide_core::constants::SNAPSHOT_VERSION;
use tide_core::error::TideError;
use tide_core::traits::TokenLedger;
use tide_core::types::Epoch;

use crate::state::VaultState;
use crate::vault::EmissionVault;

#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct SnapshotFile {
    pub version: u16,
    pub state: VaultState,
    /// Weekly percentage overrides (bps) of the wired schedule. Restore with
    /// `EmissionSchedule::restore_overrides` before re-wiring.
    pub schedule_overrides: BTreeMap<Epoch, u32>,
}

impl SnapshotFile {
    pub fn new(state: VaultState, schedule_overrides: BTreeMap<Epoch, u32>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            state,
            schedule_overrides,
        }
    }
}

impl<T: TokenLedger> EmissionVault<T> {
    /// Everything needed to resume this vault. No schedule means no
    /// overrides.
    pub fn snapshot(&self) -> SnapshotFile {
        let overrides = self
            .schedule
            .as_ref()
            .map(|s| s.override_table())
            .unwrap_or_default();
        SnapshotFile::new(self.state.clone(), overrides)
    }
}

pub fn encode(file: &SnapshotFile) -> Result<Vec<u8>, TideError> {
    bincode::encode_to_vec(file, bincode::config::standard())
        .map_err(|e| TideError::Snapshot(e.to_string()))
}

pub fn decode(bytes: &[u8]) -> Result<SnapshotFile, TideError> {
    let (file, _): (SnapshotFile, usize) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| TideError::Snapshot(e.to_string()))?;
    if file.version != SNAPSHOT_VERSION {
        return Err(TideError::Snapshot(format!(
            "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
            file.version
        )));
    }
    Ok(file)
}

/// Write `file` to `path`, replacing any existing file.
pub fn save(path: &Path, file: &SnapshotFile) -> Result<(), TideError> {
    let bytes = encode(file)?;
    fs::write(path, &bytes).map_err(|e| TideError::Snapshot(format!("{}: {e}", path.display())))?;
    info!(path = %path.display(), bytes = bytes.len(), "snapshot saved");
    Ok(())
}

pub fn load(path: &Path) -> Result<SnapshotFile, TideError> {
    let bytes = fs::read(path).map_err(|e| TideError::Snapshot(format!("{}: {e}", path.display())))?;
    let file = decode(&bytes)?;
    info!(
        path = %path.display(),
        receivers = file.state.receivers.len(),
        overrides = file.schedule_overrides.len(),
        "snapshot loaded"
    );
    Ok(file)
}

/// Pretty-printed JSON rendering of `state`.
pub fn to_json(state: &VaultState) -> Result<String, TideError> {
    serde_json::to_string_pretty(state).map_err(|e| TideError::Snapshot(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tide_core::types::Address;

    use crate::state::{AllowedClaimers, DelegationParams, ReceiverRecord};

    fn sample() -> VaultState {
        let mut state = VaultState {
            unallocated_supply: 8_100,
            next_receiver_id: 3,
            lock_weeks: 13,
            initial_parameters_set: true,
            ..VaultState::default()
        };
        state.receivers.insert(
            1,
            ReceiverRecord {
                id: 1,
                account: Some(Address::from_low_u64(500)),
                is_active: true,
                last_updated_epoch: 2,
                ledger: BTreeMap::from([(1, 1_000), (2, 900)]),
            },
        );
        state.receivers.insert(
            2,
            ReceiverRecord {
                id: 2,
                account: None,
                is_active: false,
                last_updated_epoch: 0,
                ledger: BTreeMap::new(),
            },
        );
        state.allocated.insert(Address::from_low_u64(500), 1_900);
        state.delegation.insert(
            Address::from_low_u64(11),
            DelegationParams {
                enabled: true,
                fee_pct: 500,
                allowed_claimers: AllowedClaimers::Only([Address::from_low_u64(10)].into_iter().collect()),
            },
        );
        state
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.snapshot");
        let file = SnapshotFile::new(sample(), BTreeMap::from([(0, 1_000), (1, 1_000), (9, 40)]));
        save(&path, &file).unwrap();
        assert_eq!(load(&path).unwrap(), file);
    }

    #[test]
    fn vault_snapshot_carries_schedule_overrides() {
        use std::sync::Arc;

        use tide_core::memory::{InMemoryTokenLedger, VoteTable};
        use tide_core::types::CallContext;
        use tide_schedule::EmissionSchedule;

        use crate::config::VaultConfig;
        use crate::vault::InitialParameters;

        let cfg = VaultConfig::default();
        let mut vault = EmissionVault::new(cfg.clone(), InMemoryTokenLedger::new());
        assert!(vault.snapshot().schedule_overrides.is_empty());

        let schedule = Arc::new(
            EmissionSchedule::new(Arc::new(VoteTable::new()), cfg.clock(), cfg.schedule_manager, cfg.schedule).unwrap(),
        );
        vault
            .set_initial_parameters(
                &CallContext::new(cfg.deployment_manager, 0),
                InitialParameters {
                    schedule: Some(schedule),
                    total_supply: 100,
                    fixed_weekly_pct: vec![1_000, 500],
                    ..InitialParameters::default()
                },
            )
            .unwrap();
        let file = vault.snapshot();
        assert_eq!(file.version, SNAPSHOT_VERSION);
        assert_eq!(file.state, *vault.state());
        assert_eq!(file.schedule_overrides, BTreeMap::from([(0, 1_000), (1, 500)]));
    }

    #[test]
    fn rejects_unknown_version() {
        let file = SnapshotFile {
            version: SNAPSHOT_VERSION + 1,
            ..SnapshotFile::new(sample(), BTreeMap::new())
        };
        let bytes = bincode::encode_to_vec(&file, bincode::config::standard()).unwrap();
        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported snapshot version"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode(&[0xff, 0xff, 0xff]), Err(TideError::Snapshot(_))));
    }

    #[test]
    fn missing_file_is_snapshot_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load(&dir.path().join("absent")), Err(TideError::Snapshot(_))));
    }

    #[test]
    fn json_uses_hex_addresses() {
        let json = to_json(&sample()).unwrap();
        assert!(json.contains("\"unallocated_supply\": 8100"));
        assert!(json.contains(&Address::from_low_u64(500).to_string()));
    }
}
