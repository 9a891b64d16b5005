//! Block reward distribution
//!
//! ## How it works:
//!
//! ```text
//! reserve ──► block_reward
//!                 │
//!                 │ reward_per_ballot = block_reward / Σ supplied_ballots (top set)
//!                 ▼
//!    for each pool in the top set:
//!       pool_reward = reward_per_ballot * supplied_ballots
//!       fee         = pool_reward * fee_share_bps / 10000   ──► pending_fee
//!       yield       = pool_reward - fee                     ──► acc_reward_per_share
//!
//!    rewards_left += block_reward - Σ pool_reward           (floor remainder)
//! ```
//!
//! Nothing is created or destroyed: `Σ fee + Σ yield + Δ rewards_left` always
//! equals the amount received from the reserve. `rewards_left` is never paid
//! back out by the engine.

use crate::error::{LedgerError, Result};
use crate::fixed_point;
use crate::ledger::Ledger;
use crate::reserve::ReservePool;
use crate::types::{Address, Amount, Ballots};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// What one pool received in a distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAllocation {
    pub validator: Address,
    pub ballots: Ballots,
    pub pool_reward: Amount,
    pub fee: Amount,
    pub yield_amount: Amount,
}

/// Outcome of one `distribute_block_reward` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionReport {
    /// Amount actually released by the reserve
    pub received: Amount,
    pub total_ballots: Ballots,
    pub reward_per_ballot: Amount,
    pub allocations: Vec<PoolAllocation>,
    /// Added to `rewards_left` by this call
    pub rewards_left_delta: Amount,
}

impl DistributionReport {
    pub fn total_fee(&self) -> Amount {
        self.allocations.iter().map(|a| a.fee).sum()
    }

    pub fn total_yield(&self) -> Amount {
        self.allocations.iter().map(|a| a.yield_amount).sum()
    }

    /// Σ pool_reward
    pub fn distributed(&self) -> Amount {
        self.allocations.iter().map(|a| a.pool_reward).sum()
    }
}

impl Ledger {
    /// Pull this block's reward from the reserve and allocate it across the top set
    ///
    /// Callable by anyone. Receiving less than the configured reward, or nothing
    /// at all, is fine. If allocation fails the received funds go back to the
    /// reserve and the ledger is unchanged.
    pub fn distribute_block_reward<R>(&mut self, reserve: &mut R) -> Result<DistributionReport>
    where
        R: ReservePool + ?Sized,
    {
        let expected = self.global()?.reserve_pool;
        if reserve.address() != expected {
            return Err(LedgerError::Reserve(format!(
                "expected reserve {}, got {}",
                expected,
                reserve.address()
            )));
        }

        let received = reserve.release_block_reward()?;
        if received == 0 {
            warn!("reserve released no block reward");
        }

        match self.transact(|ledger| ledger.allocate(received)) {
            Ok(report) => Ok(report),
            Err(e) => {
                if let Err(refund) = reserve.receive(received) {
                    error!(amount = %received, error = %refund, "failed to refund block reward");
                }
                Err(e)
            }
        }
    }

    fn allocate(&mut self, received: Amount) -> Result<DistributionReport> {
        let global = self.global_mut()?;
        global.custody = fixed_point::add(global.custody, received)?;

        let members = self.top_validators();
        let mut total_ballots: Ballots = 0;
        for validator in &members {
            let pool = self.pool(validator)?;
            total_ballots = fixed_point::add(total_ballots, pool.supplied_ballots())?;
        }

        let mut report = DistributionReport {
            received,
            total_ballots,
            ..Default::default()
        };

        if total_ballots == 0 {
            let global = self.global_mut()?;
            global.rewards_left = fixed_point::add(global.rewards_left, received)?;
            report.rewards_left_delta = received;
            warn!(amount = %received, "no stake in top set, block reward deferred");
            return Ok(report);
        }

        let reward_per_ballot = received / total_ballots;
        report.reward_per_ballot = reward_per_ballot;

        let mut distributed: Amount = 0;
        for validator in &members {
            let pool = self.pool_mut(validator)?;
            let ballots = pool.supplied_ballots();
            if ballots == 0 {
                continue;
            }

            let pool_reward = fixed_point::mul(reward_per_ballot, ballots)?;
            let (fee, yield_amount) = pool.split_reward(pool_reward)?;
            pool.credit_reward(yield_amount, fee)?;
            distributed = fixed_point::add(distributed, pool_reward)?;

            debug!(
                %validator,
                pool_reward = %pool_reward,
                fee = %fee,
                yield_amount = %yield_amount,
                "pool credited"
            );
            report.allocations.push(PoolAllocation {
                validator: *validator,
                ballots,
                pool_reward,
                fee,
                yield_amount,
            });
        }

        let leftover = fixed_point::sub(received, distributed)?;
        let global = self.global_mut()?;
        global.rewards_left = fixed_point::add(global.rewards_left, leftover)?;
        report.rewards_left_delta = leftover;

        debug!(
            received = %received,
            reward_per_ballot = %reward_per_ballot,
            rewards_left = %global.rewards_left,
            "block reward distributed"
        );
        Ok(report)
    }
}
