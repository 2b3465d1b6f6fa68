//! # tide-vault - Emission vault.
//!
//! The [`EmissionVault`] owns the unallocated supply, the receiver registry
//! and the per-receiver epoch ledger. It pulls weekly percentages from an
//! [`EmissionSource`](tide_core::traits::EmissionSource) and scales claims
//! with a [`BoostSource`](tide_core::traits::BoostSource). Receiver logic
//! lives in a separate [`ReceiverDirectory`] that is handed to the vault on
//! calls that need it.

pub mod claims;
pub mod config;
pub mod events;
pub mod receivers;
pub mod snapshot;
pub mod state;
pub mod vault;

pub use claims::{ClaimItem, ClaimPlan};
pub use config::VaultConfig;
pub use events::VaultEvent;
pub use receivers::{IncentiveReceiver, ReceiverDirectory, ReceiverKind, TroveManagerReceiver};
pub use state::{AllowedClaimers, DelegationParams, ReceiverRecord, VaultState};
pub use vault::{EmissionVault, InitialParameters};
