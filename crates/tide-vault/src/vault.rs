//! The emission vault: supply ledger, receiver registry and epoch allocation.
//!
//! Every entry point takes a [`CallContext`]. The epoch is derived from the
//! context timestamp on each call. Operations validate and stage their
//! changes first, perform the token transfer (the only fallible side effect)
//! next, and commit the ledger last, so a failed call leaves no trace.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use tide_core::constants::MAX_PCT_BPS;
use tide_core::error::{ScheduleError, VaultError};
use tide_core::traits::{BoostSource, EmissionSource, TokenLedger};
use tide_core::types::{Address, CallContext, Epoch, EpochClock, ReceiverId};

use crate::config::VaultConfig;
use crate::events::VaultEvent;
use crate::receivers::ReceiverDirectory;
use crate::state::{ReceiverRecord, VaultState};

/// Arguments of the one-time bootstrap call.
#[derive(Clone, Default)]
pub struct InitialParameters {
    pub schedule: Option<Arc<dyn EmissionSource>>,
    pub boost: Option<Arc<dyn BoostSource>>,
    /// Governance tokens minted to the vault on the first call.
    pub total_supply: u128,
    pub initial_lock_weeks: u64,
    /// Weekly percentage overrides (bps) for epochs `0..n`.
    pub fixed_weekly_pct: Vec<u32>,
    /// Amounts sent straight to the given accounts on the first call.
    pub initial_allowances: Vec<(Address, u128)>,
}

/// The emission vault.
pub struct EmissionVault<T: TokenLedger> {
    config: VaultConfig,
    clock: EpochClock,
    pub(crate) state: VaultState,
    pub(crate) schedule: Option<Arc<dyn EmissionSource>>,
    pub(crate) boost: Option<Arc<dyn BoostSource>>,
    pub(crate) tokens: T,
    events: Vec<VaultEvent>,
}

impl<T: TokenLedger> EmissionVault<T> {
    /// Create an empty vault with no schedule or boost calculator.
    pub fn new(config: VaultConfig, tokens: T) -> Self {
        Self::from_state(config, tokens, VaultState::default())
    }

    /// Resume a vault from a persisted ledger.
    pub fn from_state(config: VaultConfig, tokens: T, state: VaultState) -> Self {
        let clock = config.clock();
        Self {
            config,
            clock,
            state,
            schedule: None,
            boost: None,
            tokens,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    pub fn tokens(&self) -> &T {
        &self.tokens
    }

    /// Mutable access to the host token ledger (funding accounts in tests
    /// and simulations).
    pub fn tokens_mut(&mut self) -> &mut T {
        &mut self.tokens
    }

    pub fn current_epoch(&self, timestamp: u64) -> Epoch {
        self.clock.epoch_at(timestamp)
    }

    pub fn unallocated_supply(&self) -> u128 {
        self.state.unallocated_supply
    }

    pub fn allocated_of(&self, account: &Address) -> u128 {
        self.state.allocated.get(account).copied().unwrap_or(0)
    }

    pub fn receiver(&self, id: ReceiverId) -> Option<&ReceiverRecord> {
        self.state.receivers.get(&id)
    }

    /// Per-epoch allocation history of a receiver.
    pub fn receiver_ledger(&self, id: ReceiverId) -> Option<&BTreeMap<Epoch, u128>> {
        self.state.receivers.get(&id).map(|r| &r.ledger)
    }

    pub fn lock_weeks(&self) -> u64 {
        self.state.lock_weeks
    }

    pub fn has_schedule(&self) -> bool {
        self.schedule.is_some()
    }

    pub fn has_boost_calculator(&self) -> bool {
        self.boost.is_some()
    }

    /// Governance tokens the vault holds in the token ledger.
    pub fn token_balance(&self) -> u128 {
        self.tokens
            .balance_of(&self.config.governance_token, &self.config.vault_address)
    }

    /// Drain the recorded events.
    pub fn take_events(&mut self) -> Vec<VaultEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn emit(&mut self, event: VaultEvent) {
        debug!(?event, "vault event");
        self.events.push(event);
    }

    pub(crate) fn require_owner(&self, ctx: &CallContext) -> Result<(), VaultError> {
        if ctx.caller != self.config.owner {
            return Err(VaultError::Unauthorized(ctx.caller));
        }
        Ok(())
    }

    fn next_id(&self) -> Result<ReceiverId, VaultError> {
        let id = self.state.next_receiver_id;
        id.checked_add(1).ok_or(VaultError::ArithmeticOverflow)?;
        Ok(id)
    }

    fn insert_receiver(&mut self, id: ReceiverId, account: Option<Address>, is_active: bool, epoch: Epoch) {
        self.state.next_receiver_id = id + 1;
        self.state.receivers.insert(
            id,
            ReceiverRecord {
                id,
                account,
                is_active,
                last_updated_epoch: epoch,
                ledger: BTreeMap::new(),
            },
        );
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Reserve the next receiver id with no account bound.
    ///
    /// Open to any caller so a receiver can obtain its id before its own
    /// account is known. Ids are never reused.
    pub fn register_new_receiver(&mut self, ctx: &CallContext) -> Result<ReceiverId, VaultError> {
        let id = self.next_id()?;
        let epoch = self.current_epoch(ctx.timestamp);
        self.insert_receiver(id, None, false, epoch);
        info!(id, reserved_by = %ctx.caller, "receiver id reserved");
        self.emit(VaultEvent::ReceiverRegistered { id, account: None });
        Ok(id)
    }

    /// Bind `account` to a reserved id, or to a fresh id when
    /// `assignment` is `None`. Owner only. An account is bound to at most
    /// one id.
    ///
    /// The receiver's notification hook is called afterwards; a failing hook
    /// is logged and does not affect the registration.
    pub fn register_receiver(
        &mut self,
        ctx: &CallContext,
        directory: &mut ReceiverDirectory,
        account: Address,
        assignment: Option<ReceiverId>,
    ) -> Result<ReceiverId, VaultError> {
        self.require_owner(ctx)?;
        if let Some(id) = self.state.receiver_id_of(&account) {
            return Err(VaultError::AccountAlreadyBound { account, id });
        }
        let epoch = self.current_epoch(ctx.timestamp);
        let id = match assignment {
            Some(id) => {
                let record = self
                    .state
                    .receivers
                    .get_mut(&id)
                    .ok_or(VaultError::UnknownReceiver(id))?;
                if record.account.is_some() {
                    return Err(VaultError::AlreadyRegistered(id));
                }
                record.account = Some(account);
                record.is_active = true;
                record.last_updated_epoch = epoch;
                id
            }
            None => {
                let id = self.next_id()?;
                self.insert_receiver(id, Some(account), true, epoch);
                id
            }
        };
        info!(id, %account, epoch, "receiver registered");
        self.emit(VaultEvent::ReceiverRegistered { id, account: Some(account) });

        if let Err(e) = directory.notify_id_set(&account, id) {
            warn!(id, %account, error = %e, "receiver notification failed");
        }
        Ok(id)
    }

    /// Owner only. Deactivation keeps the allocated balance and only stops
    /// new pulls.
    pub fn set_receiver_is_active(
        &mut self,
        ctx: &CallContext,
        id: ReceiverId,
        is_active: bool,
    ) -> Result<(), VaultError> {
        self.require_owner(ctx)?;
        let record = self
            .state
            .receivers
            .get_mut(&id)
            .filter(|r| r.is_bound())
            .ok_or(VaultError::UnknownReceiver(id))?;
        record.is_active = is_active;
        info!(id, is_active, "receiver activity changed");
        self.emit(VaultEvent::ReceiverActivityChanged { id, is_active });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    /// Deployment-manager bootstrap.
    ///
    /// Sets the schedule, boost calculator and lock weeks on every call. The
    /// supply mint, the initial allowances and the fixed weekly schedule only
    /// happen on the first call.
    pub fn set_initial_parameters(
        &mut self,
        ctx: &CallContext,
        params: InitialParameters,
    ) -> Result<(), VaultError> {
        if ctx.caller != self.config.deployment_manager {
            return Err(VaultError::Unauthorized(ctx.caller));
        }
        let seed = !self.state.initial_parameters_set;

        let mut unallocated = self.state.unallocated_supply;
        if seed {
            let allowances = params
                .initial_allowances
                .iter()
                .try_fold(0u128, |acc, (_, amount)| acc.checked_add(*amount))
                .ok_or(VaultError::ArithmeticOverflow)?;
            let remaining = params
                .total_supply
                .checked_sub(allowances)
                .ok_or(VaultError::ArithmeticUnderflow {
                    have: params.total_supply,
                    need: allowances,
                })?;
            unallocated = unallocated
                .checked_add(remaining)
                .ok_or(VaultError::ArithmeticOverflow)?;
        }

        let fixed = match (seed, &params.schedule, params.fixed_weekly_pct.is_empty()) {
            (_, _, true) => None,
            (false, _, false) => {
                warn!("fixed weekly schedule ignored: initial parameters already set");
                None
            }
            (true, None, false) => {
                warn!("fixed weekly schedule ignored: no emission schedule given");
                None
            }
            (true, Some(schedule), false) => {
                if let Some(bad) = params.fixed_weekly_pct.iter().find(|p| **p > MAX_PCT_BPS) {
                    return Err(ScheduleError::InvalidPct(*bad).into());
                }
                Some(schedule)
            }
        };

        if seed {
            let token = self.config.governance_token;
            let vault = self.config.vault_address;
            self.tokens.mint(&token, &vault, params.total_supply)?;
            for (account, amount) in &params.initial_allowances {
                self.tokens.transfer(&token, &vault, account, *amount)?;
                info!(%account, amount, "initial allowance transferred");
            }
            if let Some(schedule) = fixed {
                schedule.seed_fixed_schedule(&params.fixed_weekly_pct)?;
            }
            self.state.unallocated_supply = unallocated;
            self.state.initial_parameters_set = true;
        }

        self.schedule = params.schedule;
        self.boost = params.boost;
        self.state.lock_weeks = params.initial_lock_weeks;

        info!(
            seeded = seed,
            total_supply = params.total_supply,
            unallocated = self.state.unallocated_supply,
            lock_weeks = params.initial_lock_weeks,
            "initial parameters set"
        );
        self.emit(VaultEvent::InitialParametersSet {
            total_supply: params.total_supply,
            unallocated: self.state.unallocated_supply,
            lock_weeks: params.initial_lock_weeks,
            seeded: seed,
        });
        Ok(())
    }

    /// Owner only. Already resolved epochs are not recomputed.
    pub fn set_emission_schedule(
        &mut self,
        ctx: &CallContext,
        schedule: Option<Arc<dyn EmissionSource>>,
    ) -> Result<(), VaultError> {
        self.require_owner(ctx)?;
        self.schedule = schedule;
        info!(is_set = self.schedule.is_some(), "emission schedule set");
        self.emit(VaultEvent::EmissionScheduleSet { is_set: self.schedule.is_some() });
        Ok(())
    }

    /// Owner only.
    pub fn set_boost_calculator(
        &mut self,
        ctx: &CallContext,
        boost: Option<Arc<dyn BoostSource>>,
    ) -> Result<(), VaultError> {
        self.require_owner(ctx)?;
        self.boost = boost;
        info!(is_set = self.boost.is_some(), "boost calculator set");
        self.emit(VaultEvent::BoostCalculatorSet { is_set: self.boost.is_some() });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Supply
    // ------------------------------------------------------------------

    /// Owner-only treasury transfer of any token held by the vault.
    ///
    /// Moving the governance token also reduces the unallocated supply.
    pub fn transfer_tokens(
        &mut self,
        ctx: &CallContext,
        token: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), VaultError> {
        self.require_owner(ctx)?;
        if to == self.config.vault_address {
            return Err(VaultError::SelfTransferDenied);
        }
        let is_governance = token == self.config.governance_token;
        let unallocated = if is_governance {
            self.state
                .unallocated_supply
                .checked_sub(amount)
                .ok_or(VaultError::ArithmeticUnderflow {
                    have: self.state.unallocated_supply,
                    need: amount,
                })?
        } else {
            self.state.unallocated_supply
        };

        let vault = self.config.vault_address;
        self.tokens.transfer(&token, &vault, &to, amount)?;

        self.state.unallocated_supply = unallocated;
        info!(%token, %to, amount, "tokens transferred");
        self.emit(VaultEvent::TokensTransferred { token, to, amount });
        if is_governance {
            self.emit(VaultEvent::UnallocatedSupplyReduced { amount, unallocated });
        }
        Ok(())
    }

    /// Pull `amount` governance tokens from the caller into the unallocated
    /// supply.
    pub fn increase_unallocated_supply(&mut self, ctx: &CallContext, amount: u128) -> Result<(), VaultError> {
        let unallocated = self
            .state
            .unallocated_supply
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticOverflow)?;
        let token = self.config.governance_token;
        let vault = self.config.vault_address;
        self.tokens.transfer(&token, &ctx.caller, &vault, amount)?;

        self.state.unallocated_supply = unallocated;
        info!(from = %ctx.caller, amount, unallocated, "unallocated supply increased");
        self.emit(VaultEvent::UnallocatedSupplyIncreased {
            from: ctx.caller,
            amount,
            unallocated,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    /// Resolve every epoch after the receiver's cursor up to the current one.
    ///
    /// Each epoch takes its percentage of the supply left after the previous
    /// epoch. Returns the amount moved to the caller's allocated balance.
    /// Returns 0 when the epoch is already resolved, no schedule is set or
    /// the receiver is inactive; in the last two cases the cursor still
    /// advances and the supply stays unallocated.
    pub fn allocate_new_emissions(&mut self, ctx: &CallContext, id: ReceiverId) -> Result<u128, VaultError> {
        let current = self.current_epoch(ctx.timestamp);
        let record = self
            .state
            .receivers
            .get(&id)
            .ok_or(VaultError::ReceiverNotRegistered(id))?;
        let account = match record.account {
            Some(account) if account == ctx.caller => account,
            _ => return Err(VaultError::ReceiverNotRegistered(id)),
        };
        let from = record.last_updated_epoch;
        if from >= current {
            return Ok(0);
        }

        let schedule = match (&self.schedule, record.is_active) {
            (Some(schedule), true) => Arc::clone(schedule),
            (schedule, is_active) => {
                debug!(id, from, current, has_schedule = schedule.is_some(), is_active, "allocation skipped");
                if let Some(record) = self.state.receivers.get_mut(&id) {
                    record.last_updated_epoch = current;
                }
                return Ok(0);
            }
        };

        let mut unallocated = self.state.unallocated_supply;
        let mut delta: u128 = 0;
        let mut entries = Vec::new();
        for epoch in from + 1..=current {
            let amount = schedule.receiver_weekly_emissions(id, epoch, unallocated)?;
            unallocated = unallocated
                .checked_sub(amount)
                .ok_or(VaultError::ArithmeticUnderflow { have: unallocated, need: amount })?;
            delta = delta.checked_add(amount).ok_or(VaultError::ArithmeticOverflow)?;
            debug!(id, epoch, amount, unallocated, "epoch resolved");
            entries.push((epoch, amount));
        }
        let allocated = self
            .allocated_of(&account)
            .checked_add(delta)
            .ok_or(VaultError::ArithmeticOverflow)?;

        self.state.unallocated_supply = unallocated;
        self.state.allocated.insert(account, allocated);
        if let Some(record) = self.state.receivers.get_mut(&id) {
            record.ledger.extend(entries);
            record.last_updated_epoch = current;
        }

        info!(id, %account, from, current, amount = delta, unallocated, "emissions allocated");
        self.emit(VaultEvent::EmissionsAllocated {
            id,
            account,
            from_epoch: from + 1,
            to_epoch: current,
            amount: delta,
        });
        Ok(delta)
    }

    /// Receiver-initiated payout from the caller's allocated balance.
    ///
    /// Fails with [`VaultError::ArithmeticUnderflow`] when `amount` exceeds
    /// the balance; callers must check
    /// [`allocated_of`](Self::allocated_of) first.
    pub fn transfer_allocated_tokens(
        &mut self,
        ctx: &CallContext,
        claimant: Address,
        recipient: Address,
        amount: u128,
    ) -> Result<(), VaultError> {
        let receiver_id = self
            .state
            .receiver_id_of(&ctx.caller)
            .ok_or(VaultError::ReceiverNotRegistered(tide_core::constants::UNSET_RECEIVER_ID))?;
        let have = self.allocated_of(&ctx.caller);
        let remaining = have
            .checked_sub(amount)
            .ok_or(VaultError::ArithmeticUnderflow { have, need: amount })?;

        let token = self.config.governance_token;
        let vault = self.config.vault_address;
        self.tokens.transfer(&token, &vault, &recipient, amount)?;

        self.state.allocated.insert(ctx.caller, remaining);
        info!(receiver_id, %claimant, %recipient, amount, "allocated tokens transferred");
        self.emit(VaultEvent::AllocatedTokensTransferred {
            receiver: ctx.caller,
            claimant,
            recipient,
            amount,
        });
        Ok(())
    }
}
