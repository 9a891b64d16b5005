//! Validator pools
//!
//! ## Design:
//!
//! One pool per validator. The pool aggregates:
//!
//! - **Self stake**: ballots contributed by the pool owner, at least
//!   `min_self_ballots` for activation
//! - **Delegated stake**: ballots cast by voters through `vote`
//! - **Commission**: `fee_share_bps` of every pool reward goes to `pending_fee`
//! - **Yield**: the rest raises `acc_reward_per_share`, shared pro rata by all
//!   ballots backing the pool
//! - **Balance**: native funds held on behalf of the pool (stake deposits plus
//!   credited rewards, minus payouts and penalties)
//! - **Own funds**: balance minus everything owed to voters and the owner;
//!   the only part a punishment can take
//!
//! ## Reward flow:
//!
//! ```text
//! pool_reward ──┬── fee (bps/10000) ──► pending_fee ──► claim_fee
//!               │
//!               └── yield ──► acc_reward_per_share += yield * 1e12 / supplied
//!                                   │
//!                                   └── settle(stake) ──► claimable ──► claim
//! ```

use crate::error::{LedgerError, Result};
use crate::fixed_point::{self, Settlement};
use crate::types::{Address, Amount, Ballots, Timestamp, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Membership state of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolStatus {
    /// In the top validator set, earns rewards, can be punished
    Active,
    /// Evicted by punishment. There is no way back to `Active`.
    Jailed,
}

/// Ballots held by one staker plus its reward-per-share bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeAccount {
    pub ballots: Ballots,
    /// `acc_reward_per_share` at the last settlement
    pub reward_debt: u128,
    /// Settled yield not yet paid out
    pub claimable: Amount,
}

impl StakeAccount {
    /// Move yield accrued since the last settlement into `claimable`
    pub fn settle(&mut self, acc_reward_per_share: u128) -> Result<Settlement> {
        let s = fixed_point::settle(self.ballots, acc_reward_per_share, self.reward_debt)?;
        self.claimable = fixed_point::add(self.claimable, s.pending)?;
        self.reward_debt = s.new_debt;
        Ok(s)
    }
}

/// Commission change waiting for its time-lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFeeShare {
    pub fee_share_bps: u16,
    pub effective_at: Timestamp,
}

/// Stake withdrawal waiting for the redeem lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub amount: Amount,
    pub unlock_at: Timestamp,
}

/// Per-validator economic state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorPool {
    pub validator: Address,
    pub owner: Address,
    pub fee_share_bps: u16,
    pub pending_fee_share: Option<PendingFeeShare>,
    pub self_stake: StakeAccount,
    /// Self ballots plus all delegated ballots
    pub supplied_ballots: Ballots,
    /// Cumulative yield per ballot, scaled by 1e12
    pub acc_reward_per_share: u128,
    /// Commission owed to the owner
    pub pending_fee: Amount,
    pub voters: BTreeMap<Address, StakeAccount>,
    pub redemptions: BTreeMap<Address, Vec<Redemption>>,
    pub balance: Amount,
    pub status: PoolStatus,
}

impl ValidatorPool {
    /// Genesis pool; `deposit` is the native value already in custody for the self stake
    pub fn new(
        validator: Address,
        owner: Address,
        fee_share_bps: u16,
        self_ballots: Ballots,
        deposit: Amount,
    ) -> Result<Self> {
        if u128::from(fee_share_bps) > BPS_DENOMINATOR {
            return Err(LedgerError::invalid(format!(
                "fee share {} bps > 10000",
                fee_share_bps
            )));
        }

        Ok(Self {
            validator,
            owner,
            fee_share_bps,
            pending_fee_share: None,
            self_stake: StakeAccount {
                ballots: self_ballots,
                ..Default::default()
            },
            supplied_ballots: self_ballots,
            acc_reward_per_share: 0,
            pending_fee: 0,
            voters: BTreeMap::new(),
            redemptions: BTreeMap::new(),
            balance: deposit,
            status: PoolStatus::Active,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == PoolStatus::Active
    }

    pub fn self_ballots(&self) -> Ballots {
        self.self_stake.ballots
    }

    pub fn supplied_ballots(&self) -> Ballots {
        self.supplied_ballots
    }

    pub fn pending_fee(&self) -> Amount {
        self.pending_fee
    }

    pub fn acc_reward_per_share(&self) -> u128 {
        self.acc_reward_per_share
    }

    pub fn self_reward_debt(&self) -> u128 {
        self.self_stake.reward_debt
    }

    pub fn voter(&self, voter: &Address) -> Option<&StakeAccount> {
        self.voters.get(voter)
    }

    /// Ballots a voter has delegated to this pool
    pub fn voter_ballots(&self, voter: &Address) -> Ballots {
        self.voters.get(voter).map_or(0, |v| v.ballots)
    }

    /// Yield the owner could claim right now (settled plus accrued)
    pub fn pending_self_reward(&self) -> Result<Amount> {
        let s = fixed_point::settle(
            self.self_stake.ballots,
            self.acc_reward_per_share,
            self.self_stake.reward_debt,
        )?;
        fixed_point::add(self.self_stake.claimable, s.pending)
    }

    /// Yield a voter could claim right now (settled plus accrued)
    pub fn pending_voter_reward(&self, voter: &Address) -> Result<Amount> {
        match self.voters.get(voter) {
            None => Ok(0),
            Some(account) => {
                let s = fixed_point::settle(
                    account.ballots,
                    self.acc_reward_per_share,
                    account.reward_debt,
                )?;
                fixed_point::add(account.claimable, s.pending)
            }
        }
    }

    /// Funds the pool must be able to pay out: voter principal, queued
    /// redemptions, all earned yield and the owner's commission
    pub fn liabilities(&self, ballot_unit: Amount) -> Result<Amount> {
        let mut owed = fixed_point::add(self.pending_fee, self.pending_self_reward()?)?;

        for (voter, account) in &self.voters {
            owed = fixed_point::add(owed, fixed_point::mul(account.ballots, ballot_unit)?)?;
            owed = fixed_point::add(owed, self.pending_voter_reward(voter)?)?;
        }
        for redemption in self.redemptions.values().flatten() {
            owed = fixed_point::add(owed, redemption.amount)?;
        }
        Ok(owed)
    }

    /// Part of the balance that belongs to the owner's stake and can be punished
    pub fn own_funds(&self, ballot_unit: Amount) -> Result<Amount> {
        let owed = self.liabilities(ballot_unit)?;
        self.balance.checked_sub(owed).ok_or_else(|| {
            LedgerError::InvariantViolation(format!(
                "{}: balance {} below liabilities {}",
                self.validator, self.balance, owed
            ))
        })
    }

    /// Settle the owner's self stake
    pub fn settle_self(&mut self) -> Result<Settlement> {
        self.self_stake.settle(self.acc_reward_per_share)
    }

    /// Settle a voter, creating an empty account on first contact
    pub fn settle_voter(&mut self, voter: Address) -> Result<Settlement> {
        let acc = self.acc_reward_per_share;
        self.voters
            .entry(voter)
            .or_insert_with(|| StakeAccount {
                reward_debt: acc,
                ..Default::default()
            })
            .settle(acc)
    }

    /// Credit one distribution share: yield to the accumulator, fee to the owner
    ///
    /// The accumulator is spread over `supplied_ballots`, which includes the
    /// self ballots, so self stake and delegated stake earn the same per ballot.
    pub fn credit_reward(&mut self, yield_amount: Amount, fee_amount: Amount) -> Result<()> {
        if self.supplied_ballots == 0 {
            return Err(LedgerError::ZeroStake(self.validator));
        }

        let increment = fixed_point::acc_increment(yield_amount, self.supplied_ballots)?;
        self.acc_reward_per_share = fixed_point::add(self.acc_reward_per_share, increment)?;
        self.pending_fee = fixed_point::add(self.pending_fee, fee_amount)?;
        self.balance = fixed_point::add(
            self.balance,
            fixed_point::add(yield_amount, fee_amount)?,
        )?;
        Ok(())
    }

    /// Remove `amount` from the pool's backing balance
    pub fn debit(&mut self, amount: Amount) -> Result<()> {
        if self.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                requested: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(())
    }

    /// Add native funds to the pool's backing balance
    pub fn deposit(&mut self, amount: Amount) -> Result<()> {
        self.balance = fixed_point::add(self.balance, amount)?;
        Ok(())
    }

    /// Stage a commission change; it can be committed once the lock elapses
    pub fn propose_fee_share(
        &mut self,
        fee_share_bps: u16,
        now: Timestamp,
        lock: Timestamp,
    ) -> Result<PendingFeeShare> {
        if u128::from(fee_share_bps) > BPS_DENOMINATOR {
            return Err(LedgerError::invalid(format!(
                "fee share {} bps > 10000",
                fee_share_bps
            )));
        }

        let pending = PendingFeeShare {
            fee_share_bps,
            effective_at: now
                .checked_add(lock)
                .ok_or(LedgerError::ArithmeticOverflow)?,
        };
        self.pending_fee_share = Some(pending);
        Ok(pending)
    }

    /// Apply the staged commission if its lock has elapsed
    pub fn commit_fee_share(&mut self, now: Timestamp) -> Result<u16> {
        let pending = self
            .pending_fee_share
            .ok_or(LedgerError::NoPendingFeeChange(self.validator))?;

        if now < pending.effective_at {
            return Err(LedgerError::FeeChangeLocked {
                effective_at: pending.effective_at,
            });
        }

        self.fee_share_bps = pending.fee_share_bps;
        self.pending_fee_share = None;
        Ok(self.fee_share_bps)
    }

    /// Split a pool reward into (fee, yield)
    pub fn split_reward(&self, pool_reward: Amount) -> Result<(Amount, Amount)> {
        let fee = fixed_point::mul_div(
            pool_reward,
            u128::from(self.fee_share_bps),
            BPS_DENOMINATOR,
        )?;
        Ok((fee, pool_reward - fee))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_point::ACC_PRECISION;
    use crate::types::COIN;

    fn pool() -> ValidatorPool {
        ValidatorPool::new(
            Address::repeat(1),
            Address::repeat(1),
            2000,
            10_000,
            10_000 * COIN,
        )
        .unwrap()
    }

    #[test]
    fn test_new_pool_rejects_bad_fee_share() {
        let err = ValidatorPool::new(Address::repeat(1), Address::repeat(1), 10_001, 10_000, 0);
        assert!(matches!(err, Err(LedgerError::InvalidParameter(_))));
    }

    #[test]
    fn test_split_reward() {
        let p = pool();
        assert_eq!(p.split_reward(COIN).unwrap(), (COIN / 5, COIN * 4 / 5));
        // fee floors, yield takes the remainder
        assert_eq!(p.split_reward(7).unwrap(), (1, 6));
        assert_eq!(p.split_reward(0).unwrap(), (0, 0));
    }

    #[test]
    fn test_credit_reward_raises_accumulator() {
        let mut p = pool();
        p.credit_reward(800_000, 200_000).unwrap();

        assert_eq!(p.acc_reward_per_share(), 800_000 * ACC_PRECISION / 10_000);
        assert_eq!(p.pending_fee(), 200_000);
        assert_eq!(p.balance, 10_000 * COIN + 1_000_000);
        assert_eq!(p.pending_self_reward().unwrap(), 800_000);
    }

    #[test]
    fn test_credit_reward_zero_stake_is_fatal() {
        let mut p = pool();
        p.supplied_ballots = 0;
        assert_eq!(
            p.credit_reward(1, 0),
            Err(LedgerError::ZeroStake(Address::repeat(1)))
        );
    }

    #[test]
    fn test_settle_voter_first_contact_owes_nothing() {
        let mut p = pool();
        p.credit_reward(1_000, 0).unwrap();

        let s = p.settle_voter(Address::repeat(9)).unwrap();
        assert_eq!(s.pending, 0);
        assert_eq!(p.voter(&Address::repeat(9)).unwrap().reward_debt, p.acc_reward_per_share());
    }

    #[test]
    fn test_settle_self_is_idempotent() {
        let mut p = pool();
        p.credit_reward(10_000, 0).unwrap();

        let first = p.settle_self().unwrap();
        let second = p.settle_self().unwrap();
        assert_eq!(first.pending, 10_000);
        assert_eq!(second.pending, 0);
        assert_eq!(p.self_stake.claimable, 10_000);
    }

    #[test]
    fn test_debit() {
        let mut p = pool();
        p.debit(COIN).unwrap();
        assert_eq!(p.balance, 9_999 * COIN);

        let err = p.debit(10_000 * COIN).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                requested: 10_000 * COIN,
                available: 9_999 * COIN,
            }
        );
        assert_eq!(p.balance, 9_999 * COIN);
    }

    #[test]
    fn test_own_funds_exclude_what_is_owed() {
        let mut p = pool();
        let voter = Address::repeat(9);
        assert_eq!(p.own_funds(COIN).unwrap(), 10_000 * COIN);

        p.settle_voter(voter).unwrap();
        p.voters.get_mut(&voter).unwrap().ballots = 10_000;
        p.supplied_ballots += 10_000;
        p.deposit(10_000 * COIN).unwrap();
        p.redemptions.entry(voter).or_default().push(Redemption {
            amount: 3 * COIN,
            unlock_at: 0,
        });
        p.deposit(3 * COIN).unwrap();
        p.credit_reward(2 * COIN, COIN).unwrap();

        // 2 coins of yield split evenly between owner and voter
        assert_eq!(p.pending_self_reward().unwrap(), COIN);
        assert_eq!(p.pending_voter_reward(&voter).unwrap(), COIN);
        assert_eq!(
            p.liabilities(COIN).unwrap(),
            10_000 * COIN + 3 * COIN + 2 * COIN + COIN
        );
        assert_eq!(p.own_funds(COIN).unwrap(), 10_000 * COIN);
    }

    #[test]
    fn test_own_funds_reports_shortfall() {
        let mut p = pool();
        p.credit_reward(0, COIN).unwrap();
        p.balance = 0;
        assert!(matches!(
            p.own_funds(COIN),
            Err(LedgerError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_fee_share_time_lock() {
        let mut p = pool();
        assert_eq!(
            p.commit_fee_share(0),
            Err(LedgerError::NoPendingFeeChange(Address::repeat(1)))
        );

        p.propose_fee_share(500, 1_000, 86_400).unwrap();
        assert_eq!(
            p.commit_fee_share(1_000 + 86_399),
            Err(LedgerError::FeeChangeLocked { effective_at: 87_400 })
        );
        assert_eq!(p.fee_share_bps, 2000);

        assert_eq!(p.commit_fee_share(87_400).unwrap(), 500);
        assert_eq!(p.fee_share_bps, 500);
        assert!(p.pending_fee_share.is_none());
    }
}
