//! Reward-per-share fixed point arithmetic
//!
//! Every pool keeps `acc_reward_per_share`, the cumulative yield earned by one
//! ballot, scaled by [`ACC_PRECISION`]. A staker's reward debt is the value of
//! that accumulator at the staker's last settlement, so the yield owed since then
//! is
//!
//! ```text
//! pending = stake * (acc_reward_per_share - reward_debt) / 1e12
//! ```
//!
//! Crediting a pool is O(1) regardless of how many stakers back it. The price is
//! that every stake-changing mutation must settle first.
//!
//! All helpers are checked: overflow is an error, never a wrap.

use crate::error::{LedgerError, Result};

/// Scale factor of `acc_reward_per_share`
pub const ACC_PRECISION: u128 = 1_000_000_000_000;

pub fn add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(LedgerError::ArithmeticOverflow)
}

pub fn sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(LedgerError::ArithmeticOverflow)
}

pub fn mul(a: u128, b: u128) -> Result<u128> {
    a.checked_mul(b).ok_or(LedgerError::ArithmeticOverflow)
}

/// `a * b / d`, floor. A zero divisor is reported as overflow.
pub fn mul_div(a: u128, b: u128, d: u128) -> Result<u128> {
    mul(a, b)?
        .checked_div(d)
        .ok_or(LedgerError::ArithmeticOverflow)
}

/// Result of settling one stake account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    /// Yield accrued since the last settlement
    pub pending: u128,
    /// Reward debt to store after settlement
    pub new_debt: u128,
}

/// Settle a stake against the pool accumulator
pub fn settle(stake: u128, acc_per_share: u128, reward_debt: u128) -> Result<Settlement> {
    let delta = sub(acc_per_share, reward_debt)?;
    Ok(Settlement {
        pending: mul_div(stake, delta, ACC_PRECISION)?,
        new_debt: acc_per_share,
    })
}

/// Accumulator increment for crediting `yield_amount` across `share_base` ballots
pub fn acc_increment(yield_amount: u128, share_base: u128) -> Result<u128> {
    mul_div(yield_amount, ACC_PRECISION, share_base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_fresh_stake_owes_nothing() {
        let s = settle(10_000, 5 * ACC_PRECISION, 5 * ACC_PRECISION).unwrap();
        assert_eq!(s.pending, 0);
        assert_eq!(s.new_debt, 5 * ACC_PRECISION);
    }

    #[test]
    fn test_settle_accrued_yield() {
        // 800 units credited over 10_000 ballots, fully held by one staker
        let acc = acc_increment(800, 10_000).unwrap();
        let s = settle(10_000, acc, 0).unwrap();
        assert_eq!(s.pending, 800);
        assert_eq!(s.new_debt, acc);
    }

    #[test]
    fn test_settle_floors_dust() {
        // 1 unit over 3 ballots: each ballot earns 1/3, a single ballot gets 0
        let acc = acc_increment(1, 3).unwrap();
        assert_eq!(acc, 333_333_333_333);
        assert_eq!(settle(1, acc, 0).unwrap().pending, 0);
        assert_eq!(settle(3, acc, 0).unwrap().pending, 0);
        assert_eq!(settle(3, 3 * acc, 0).unwrap().pending, 2);
    }

    #[test]
    fn test_settle_rejects_debt_above_accumulator() {
        assert_eq!(settle(1, 1, 2), Err(LedgerError::ArithmeticOverflow));
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert_eq!(mul(u128::MAX, 2), Err(LedgerError::ArithmeticOverflow));
        assert_eq!(add(u128::MAX, 1), Err(LedgerError::ArithmeticOverflow));
        assert_eq!(acc_increment(u128::MAX / 2, 1), Err(LedgerError::ArithmeticOverflow));
    }
}
