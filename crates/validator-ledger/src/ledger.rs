//! Ledger - the single context object owning every pool and the top set
//!
//! Nothing here is global: each operation takes the ledger explicitly. Every
//! mutating entry point runs through [`Ledger::transact`], which applies the
//! operation to a draft copy and swaps it in only on success, so a failed call
//! is never observable.

use crate::config::{InitArgs, LedgerParams};
use crate::error::{LedgerError, Result};
use crate::fixed_point;
use crate::pool::{PendingFeeShare, Redemption, ValidatorPool};
use crate::top_set::TopValidatorSet;
use crate::types::{Address, Amount, Ballots, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Ledger-wide singleton state, present once `initialize` has run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalState {
    pub admin: Address,
    pub ledger_address: Address,
    pub punish_authority: Address,
    pub proposal: Address,
    pub reserve_pool: Address,
    pub max_validator_count: usize,
    pub max_punishment_amount: Amount,
    /// Undistributed round-off carried across distributions
    pub rewards_left: Amount,
    pub redeem_lock_duration: Timestamp,
    pub fee_change_lock_duration: Timestamp,
    pub min_self_ballots: Ballots,
    pub ballot_unit: Amount,
    /// Native funds held by the ledger
    pub custody: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub(crate) global: Option<GlobalState>,
    pub(crate) pools: BTreeMap<Address, ValidatorPool>,
    pub(crate) top: TopValidatorSet,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Uninitialized ledger; every operation except `initialize` fails until it runs
    pub fn new() -> Self {
        Self {
            global: None,
            pools: BTreeMap::new(),
            top: TopValidatorSet::new(0),
        }
    }

    /// Run `op` against a draft and commit it only if it succeeds
    pub(crate) fn transact<T>(&mut self, op: impl FnOnce(&mut Ledger) -> Result<T>) -> Result<T> {
        let mut draft = self.clone();
        let out = op(&mut draft)?;
        *self = draft;
        Ok(out)
    }

    /// One-time setup: a pool per validator, all active, in the given order
    pub fn initialize(&mut self, args: InitArgs, params: LedgerParams) -> Result<()> {
        if self.global.is_some() {
            return Err(LedgerError::AlreadyInitialized);
        }
        args.validate()?;
        params.validate()?;

        self.transact(|ledger| {
            ledger.top = TopValidatorSet::new(args.max_validator_count);
            let deposit = fixed_point::mul(params.min_self_ballots, params.ballot_unit)?;
            let mut custody: Amount = 0;

            for ((validator, owner), fee_share_bps) in args
                .validators
                .iter()
                .zip(&args.managers)
                .zip(&args.fee_shares)
            {
                ledger.create_pool(
                    *validator,
                    *owner,
                    *fee_share_bps,
                    params.min_self_ballots,
                    params.min_self_ballots,
                    deposit,
                )?;
                ledger.top.insert(*validator)?;
                custody = fixed_point::add(custody, deposit)?;
            }

            ledger.global = Some(GlobalState {
                admin: args.admin,
                ledger_address: args.ledger_address,
                punish_authority: args.punish_authority,
                proposal: args.proposal,
                reserve_pool: args.reserve_pool,
                max_validator_count: args.max_validator_count,
                max_punishment_amount: params.max_punishment_amount,
                rewards_left: 0,
                redeem_lock_duration: params.redeem_lock_duration,
                fee_change_lock_duration: params.fee_change_lock_duration,
                min_self_ballots: params.min_self_ballots,
                ballot_unit: params.ballot_unit,
                custody,
            });

            info!(
                validators = args.validators.len(),
                max_validators = args.max_validator_count,
                custody = %custody,
                "ledger initialized"
            );
            Ok(())
        })
    }

    fn create_pool(
        &mut self,
        validator: Address,
        owner: Address,
        fee_share_bps: u16,
        self_ballots: Ballots,
        min_self_ballots: Ballots,
        deposit: Amount,
    ) -> Result<()> {
        if self.pools.contains_key(&validator) {
            return Err(LedgerError::invalid(format!("pool {} already exists", validator)));
        }
        if self_ballots < min_self_ballots {
            return Err(LedgerError::invalid(format!(
                "self ballots {} below minimum {}",
                self_ballots, min_self_ballots
            )));
        }

        let pool = ValidatorPool::new(validator, owner, fee_share_bps, self_ballots, deposit)?;
        self.pools.insert(validator, pool);
        debug!(%validator, %owner, fee_share_bps, "pool created");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Views
    // ---------------------------------------------------------------

    pub fn is_initialized(&self) -> bool {
        self.global.is_some()
    }

    pub fn global(&self) -> Result<&GlobalState> {
        self.global.as_ref().ok_or(LedgerError::NotInitialized)
    }

    pub(crate) fn global_mut(&mut self) -> Result<&mut GlobalState> {
        self.global.as_mut().ok_or(LedgerError::NotInitialized)
    }

    pub fn pool(&self, validator: &Address) -> Result<&ValidatorPool> {
        self.global()?;
        self.pools
            .get(validator)
            .ok_or(LedgerError::PoolNotFound(*validator))
    }

    pub(crate) fn pool_mut(&mut self, validator: &Address) -> Result<&mut ValidatorPool> {
        self.pools
            .get_mut(validator)
            .ok_or(LedgerError::PoolNotFound(*validator))
    }

    pub fn pools(&self) -> impl Iterator<Item = &ValidatorPool> + '_ {
        self.pools.values()
    }

    pub fn top_set(&self) -> &TopValidatorSet {
        &self.top
    }

    /// Active validators in top set order
    pub fn top_validators(&self) -> Vec<Address> {
        self.top.members().copied().collect()
    }

    pub fn rewards_left(&self) -> Result<Amount> {
        Ok(self.global()?.rewards_left)
    }

    pub fn max_punishment_amount(&self) -> Result<Amount> {
        Ok(self.global()?.max_punishment_amount)
    }

    pub fn custody(&self) -> Result<Amount> {
        Ok(self.global()?.custody)
    }

    pub fn self_ballots(&self, validator: &Address) -> Result<Ballots> {
        Ok(self.pool(validator)?.self_ballots())
    }

    pub fn supplied_ballots(&self, validator: &Address) -> Result<Ballots> {
        Ok(self.pool(validator)?.supplied_ballots())
    }

    pub fn pending_fee(&self, validator: &Address) -> Result<Amount> {
        Ok(self.pool(validator)?.pending_fee())
    }

    pub fn acc_reward_per_share(&self, validator: &Address) -> Result<u128> {
        Ok(self.pool(validator)?.acc_reward_per_share())
    }

    pub fn self_reward_debt(&self, validator: &Address) -> Result<u128> {
        Ok(self.pool(validator)?.self_reward_debt())
    }

    pub fn voter_reward_debt(&self, validator: &Address, voter: &Address) -> Result<u128> {
        Ok(self
            .pool(validator)?
            .voter(voter)
            .map_or(0, |v| v.reward_debt))
    }

    pub fn pool_balance(&self, validator: &Address) -> Result<Amount> {
        Ok(self.pool(validator)?.balance)
    }

    /// Owner funds a punishment can take from the pool
    pub fn punishable_amount(&self, validator: &Address) -> Result<Amount> {
        let unit = self.global()?.ballot_unit;
        self.pool(validator)?.own_funds(unit)
    }

    // ---------------------------------------------------------------
    // Stake
    // ---------------------------------------------------------------

    fn ballots_for(&self, amount: Amount) -> Result<Ballots> {
        let unit = self.global()?.ballot_unit;
        if amount < unit || amount % unit != 0 {
            return Err(LedgerError::invalid(format!(
                "stake {} is not a positive multiple of the ballot unit {}",
                amount, unit
            )));
        }
        Ok(amount / unit)
    }

    /// Delegate `amount` native units to a validator's pool
    pub fn vote(&mut self, voter: Address, validator: Address, amount: Amount) -> Result<Ballots> {
        let ballots = self.ballots_for(amount)?;

        self.transact(|ledger| {
            let pool = ledger.pool_mut(&validator)?;
            if !pool.is_active() {
                return Err(LedgerError::invalid(format!(
                    "pool {} is jailed and takes no new stake",
                    validator
                )));
            }
            pool.settle_voter(voter)?;

            let account = pool.voters.entry(voter).or_default();
            account.ballots = fixed_point::add(account.ballots, ballots)?;
            pool.supplied_ballots = fixed_point::add(pool.supplied_ballots, ballots)?;
            pool.deposit(amount)?;

            let global = ledger.global_mut()?;
            global.custody = fixed_point::add(global.custody, amount)?;

            debug!(%voter, %validator, ballots = %ballots, "vote");
            Ok(ballots)
        })
    }

    /// Owner adds to the pool's self stake
    pub fn deposit_margin(
        &mut self,
        caller: Address,
        validator: Address,
        amount: Amount,
    ) -> Result<Ballots> {
        let ballots = self.ballots_for(amount)?;

        self.transact(|ledger| {
            let pool = ledger.pool_mut(&validator)?;
            if pool.owner != caller {
                return Err(LedgerError::Unauthorized(caller));
            }
            if !pool.is_active() {
                return Err(LedgerError::invalid(format!(
                    "pool {} is jailed and takes no new stake",
                    validator
                )));
            }

            pool.settle_self()?;
            pool.self_stake.ballots = fixed_point::add(pool.self_stake.ballots, ballots)?;
            pool.supplied_ballots = fixed_point::add(pool.supplied_ballots, ballots)?;
            pool.deposit(amount)?;

            let global = ledger.global_mut()?;
            global.custody = fixed_point::add(global.custody, amount)?;

            debug!(%validator, ballots = %ballots, "margin deposited");
            Ok(ballots)
        })
    }

    /// Withdraw delegated ballots; funds unlock after the redeem lock
    pub fn revoke_vote(
        &mut self,
        voter: Address,
        validator: Address,
        ballots: Ballots,
        now: Timestamp,
    ) -> Result<Redemption> {
        if ballots == 0 {
            return Err(LedgerError::invalid("cannot revoke zero ballots"));
        }

        self.transact(|ledger| {
            let global = ledger.global()?;
            let amount = fixed_point::mul(ballots, global.ballot_unit)?;
            let unlock_at = now
                .checked_add(global.redeem_lock_duration)
                .ok_or(LedgerError::ArithmeticOverflow)?;

            let pool = ledger.pool_mut(&validator)?;
            let held = pool.voter_ballots(&voter);
            if held < ballots {
                return Err(LedgerError::invalid(format!(
                    "revoking {} ballots, only {} voted",
                    ballots, held
                )));
            }

            pool.settle_voter(voter)?;
            if let Some(account) = pool.voters.get_mut(&voter) {
                account.ballots -= ballots;
            }
            pool.supplied_ballots = fixed_point::sub(pool.supplied_ballots, ballots)?;

            let redemption = Redemption { amount, unlock_at };
            pool.redemptions.entry(voter).or_default().push(redemption);

            debug!(%voter, %validator, ballots = %ballots, unlock_at, "vote revoked");
            Ok(redemption)
        })
    }

    /// Pay out every redemption whose lock has elapsed
    pub fn withdraw_redeemed(
        &mut self,
        voter: Address,
        validator: Address,
        now: Timestamp,
    ) -> Result<Amount> {
        self.transact(|ledger| {
            ledger.global()?;
            let pool = ledger.pool_mut(&validator)?;

            let queue = pool.redemptions.remove(&voter).unwrap_or_default();
            let (matured, locked): (Vec<_>, Vec<_>) =
                queue.into_iter().partition(|r| r.unlock_at <= now);
            if !locked.is_empty() {
                pool.redemptions.insert(voter, locked);
            }

            let amount = matured
                .iter()
                .try_fold(0u128, |acc, r| fixed_point::add(acc, r.amount))?;
            if amount == 0 {
                return Err(LedgerError::NothingToWithdraw);
            }

            ledger.pay_out(&validator, amount)?;
            debug!(%voter, %validator, amount = %amount, "redemption withdrawn");
            Ok(amount)
        })
    }

    /// Pay a voter's settled yield
    pub fn claim_reward(&mut self, voter: Address, validator: Address) -> Result<Amount> {
        self.transact(|ledger| {
            ledger.global()?;
            let pool = ledger.pool_mut(&validator)?;
            if !pool.voters.contains_key(&voter) {
                return Err(LedgerError::NothingToWithdraw);
            }
            pool.settle_voter(voter)?;

            let amount = pool
                .voters
                .get_mut(&voter)
                .map_or(0, |account| std::mem::take(&mut account.claimable));
            if amount == 0 {
                return Err(LedgerError::NothingToWithdraw);
            }

            ledger.pay_out(&validator, amount)?;
            Ok(amount)
        })
    }

    /// Pay the owner's self stake yield
    pub fn claim_self_reward(&mut self, caller: Address, validator: Address) -> Result<Amount> {
        self.transact(|ledger| {
            ledger.global()?;
            let pool = ledger.pool_mut(&validator)?;
            if pool.owner != caller {
                return Err(LedgerError::Unauthorized(caller));
            }
            pool.settle_self()?;

            let amount = std::mem::take(&mut pool.self_stake.claimable);
            if amount == 0 {
                return Err(LedgerError::NothingToWithdraw);
            }

            ledger.pay_out(&validator, amount)?;
            Ok(amount)
        })
    }

    /// Pay the owner's accumulated commission
    pub fn claim_fee(&mut self, caller: Address, validator: Address) -> Result<Amount> {
        self.transact(|ledger| {
            ledger.global()?;
            let pool = ledger.pool_mut(&validator)?;
            if pool.owner != caller {
                return Err(LedgerError::Unauthorized(caller));
            }

            let amount = std::mem::take(&mut pool.pending_fee);
            if amount == 0 {
                return Err(LedgerError::NothingToWithdraw);
            }

            ledger.pay_out(&validator, amount)?;
            Ok(amount)
        })
    }

    /// Move `amount` out of a pool and out of the ledger's custody
    fn pay_out(&mut self, validator: &Address, amount: Amount) -> Result<()> {
        self.pool_mut(validator)?.debit(amount)?;
        let global = self.global_mut()?;
        global.custody = fixed_point::sub(global.custody, amount)?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Commission
    // ---------------------------------------------------------------

    /// Stage a new commission rate; it takes effect after the fee change lock
    pub fn propose_fee_share(
        &mut self,
        caller: Address,
        validator: Address,
        fee_share_bps: u16,
        now: Timestamp,
    ) -> Result<PendingFeeShare> {
        self.transact(|ledger| {
            let lock = ledger.global()?.fee_change_lock_duration;
            let pool = ledger.pool_mut(&validator)?;
            if pool.owner != caller {
                return Err(LedgerError::Unauthorized(caller));
            }
            let pending = pool.propose_fee_share(fee_share_bps, now, lock)?;
            info!(%validator, fee_share_bps, effective_at = pending.effective_at, "fee share change proposed");
            Ok(pending)
        })
    }

    /// Apply a staged commission rate once its lock has elapsed
    pub fn commit_fee_share(
        &mut self,
        caller: Address,
        validator: Address,
        now: Timestamp,
    ) -> Result<u16> {
        self.transact(|ledger| {
            ledger.global()?;
            let pool = ledger.pool_mut(&validator)?;
            if pool.owner != caller {
                return Err(LedgerError::Unauthorized(caller));
            }
            let bps = pool.commit_fee_share(now)?;
            info!(%validator, fee_share_bps = bps, "fee share committed");
            Ok(bps)
        })
    }

    // ---------------------------------------------------------------
    // Admin
    // ---------------------------------------------------------------

    pub fn set_max_punishment_amount(&mut self, caller: Address, amount: Amount) -> Result<()> {
        self.transact(|ledger| {
            let global = ledger.global_mut()?;
            if caller != global.admin {
                return Err(LedgerError::Unauthorized(caller));
            }
            global.max_punishment_amount = amount;
            info!(amount = %amount, "max punishment amount updated");
            Ok(())
        })
    }

    // ---------------------------------------------------------------
    // Integrity
    // ---------------------------------------------------------------

    /// Verify the ledger-wide invariants
    pub fn check_invariants(&self) -> Result<()> {
        let global = self.global()?;
        let violation = |msg: String| Err(LedgerError::InvariantViolation(msg));

        let mut balances: Amount = 0;
        for pool in self.pools.values() {
            balances = fixed_point::add(balances, pool.balance)?;

            if pool.self_ballots() > pool.supplied_ballots {
                return violation(format!("{}: self ballots exceed supplied", pool.validator));
            }

            let delegated = pool
                .voters
                .values()
                .try_fold(0u128, |acc, v| fixed_point::add(acc, v.ballots))?;
            if fixed_point::add(pool.self_ballots(), delegated)? != pool.supplied_ballots {
                return violation(format!("{}: supplied ballots out of sync", pool.validator));
            }

            // errors out if the pool cannot cover what it owes
            pool.own_funds(global.ballot_unit)?;

            if pool.is_active() != self.top.contains(&pool.validator) {
                return violation(format!(
                    "{}: active flag disagrees with top set",
                    pool.validator
                ));
            }
        }

        if self.top.len() > self.top.capacity() {
            return violation("top set above capacity".into());
        }
        if let Some(orphan) = self.top.members().find(|v| !self.pools.contains_key(*v)) {
            return violation(format!("{}: in top set without a pool", orphan));
        }

        if fixed_point::add(balances, global.rewards_left)? != global.custody {
            return violation(format!(
                "custody {} != pool balances {} + rewards left {}",
                global.custody, balances, global.rewards_left
            ));
        }

        Ok(())
    }

    /// sha256 commitment to the full ledger state
    pub fn state_root(&self) -> Result<[u8; 32]> {
        let global = self.global()?;
        let mut hasher = Sha256::new();

        hasher.update(global.admin.as_bytes());
        hasher.update(global.ledger_address.as_bytes());
        hasher.update(global.punish_authority.as_bytes());
        hasher.update(global.proposal.as_bytes());
        hasher.update(global.reserve_pool.as_bytes());
        hasher.update((global.max_validator_count as u64).to_le_bytes());
        hasher.update(global.max_punishment_amount.to_le_bytes());
        hasher.update(global.rewards_left.to_le_bytes());
        hasher.update(global.custody.to_le_bytes());

        // BTreeMap iteration is ordered by validator address
        for pool in self.pools.values() {
            hasher.update(pool.validator.as_bytes());
            hasher.update(pool.owner.as_bytes());
            hasher.update(pool.fee_share_bps.to_le_bytes());
            hasher.update(pool.self_stake.ballots.to_le_bytes());
            hasher.update(pool.self_stake.reward_debt.to_le_bytes());
            hasher.update(pool.self_stake.claimable.to_le_bytes());
            hasher.update(pool.supplied_ballots.to_le_bytes());
            hasher.update(pool.acc_reward_per_share.to_le_bytes());
            hasher.update(pool.pending_fee.to_le_bytes());
            hasher.update(pool.balance.to_le_bytes());
            hasher.update([pool.is_active() as u8]);
            for (voter, account) in &pool.voters {
                hasher.update(voter.as_bytes());
                hasher.update(account.ballots.to_le_bytes());
                hasher.update(account.reward_debt.to_le_bytes());
                hasher.update(account.claimable.to_le_bytes());
            }
        }

        for member in self.top.members() {
            hasher.update(member.as_bytes());
        }

        Ok(hasher.finalize().into())
    }
}
