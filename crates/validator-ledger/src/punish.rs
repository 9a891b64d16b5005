//! Punishment of misbehaving validators
//!
//! ## Design:
//!
//! Only the punish authority may call [`Ledger::punish`]. A punishment:
//!
//! 1. settles the owner's self stake, so yield earned before the offence is
//!    kept in `claimable`
//! 2. debits `min(own funds, max_punishment_amount)` from the pool
//! 3. optionally evicts the validator from the top set and jails the pool
//! 4. forwards the penalty to the reserve
//!
//! Own funds are the pool balance minus everything the pool owes: voter
//! principal, queued redemptions, settled and accrued yield, and
//! `pending_fee`. In practice that is the owner's self stake, so a penalty
//! never leaves a voter withdrawal or a claim unbacked.
//!
//! The penalty stands even when eviction is a no-op because the validator was
//! already out of the top set. If the reserve refuses the funds the whole
//! punishment is rolled back. `pending_fee` and `acc_reward_per_share` are not
//! touched.

use crate::error::{LedgerError, Result};
use crate::fixed_point;
use crate::ledger::Ledger;
use crate::pool::PoolStatus;
use crate::reserve::ReservePool;
use crate::types::{Address, Amount};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunishmentReport {
    pub validator: Address,
    /// Configured cap at the time of punishment
    pub requested: Amount,
    /// Amount actually moved to the reserve
    pub penalty: Amount,
    /// Self stake yield settled before the debit
    pub settled_yield: Amount,
    pub removed: bool,
}

impl Ledger {
    /// Penalize `validator` and optionally remove it from the top set
    ///
    /// The penalty is capped by the owner's own funds in the pool, see
    /// [`ValidatorPool::own_funds`](crate::pool::ValidatorPool::own_funds).
    ///
    /// Asking to remove a validator that is no longer in the top set does not
    /// fail the call: the penalty is still taken, a warning is logged and the
    /// report carries `removed == false`. Callers that need the strict form
    /// check `report.removed`.
    pub fn punish<R>(
        &mut self,
        caller: Address,
        validator: Address,
        remove: bool,
        reserve: &mut R,
    ) -> Result<PunishmentReport>
    where
        R: ReservePool + ?Sized,
    {
        let global = self.global()?;
        if caller != global.punish_authority {
            return Err(LedgerError::Unauthorized(caller));
        }
        if reserve.address() != global.reserve_pool {
            return Err(LedgerError::Reserve(format!(
                "expected reserve {}, got {}",
                global.reserve_pool,
                reserve.address()
            )));
        }

        self.transact(|ledger| {
            let global = ledger.global()?;
            let requested = global.max_punishment_amount;
            let unit = global.ballot_unit;
            let pool = ledger.pool_mut(&validator)?;

            let settled_yield = pool.settle_self()?.pending;
            let penalty = requested.min(pool.own_funds(unit)?);
            if penalty < requested {
                warn!(
                    %validator,
                    requested = %requested,
                    penalty = %penalty,
                    "own funds below punishment cap"
                );
            }
            pool.debit(penalty)?;

            let global = ledger.global_mut()?;
            global.custody = fixed_point::sub(global.custody, penalty)?;

            let removed = remove && ledger.evict(&validator)?;

            // must stay the last fallible step
            reserve.receive(penalty)?;

            info!(%validator, penalty = %penalty, removed, "validator punished");
            Ok(PunishmentReport {
                validator,
                requested,
                penalty,
                settled_yield,
                removed,
            })
        })
    }

    /// Drop `validator` from the top set and jail its pool. Returns false if it
    /// was not a member.
    fn evict(&mut self, validator: &Address) -> Result<bool> {
        match self.top.remove(validator) {
            Ok(()) => {
                self.pool_mut(validator)?.status = PoolStatus::Jailed;
                info!(%validator, "validator jailed");
                Ok(true)
            }
            Err(LedgerError::NotAMember(_)) => {
                warn!(%validator, "punished validator already out of the top set");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InitArgs, LedgerParams};
    use crate::reserve::MemoryReserve;
    use crate::types::COIN;

    const PUNISHER: Address = Address::repeat(0xee);
    const RESERVE: Address = Address::repeat(0xaa);

    fn setup(n: u8, max_punishment: Amount) -> Ledger {
        let validators: Vec<Address> = (1..=n).map(Address::repeat).collect();
        let mut ledger = Ledger::new();
        ledger
            .initialize(
                InitArgs {
                    managers: validators.clone(),
                    fee_shares: vec![2000; n as usize],
                    validators,
                    admin: Address::repeat(0xad),
                    ledger_address: Address::repeat(0xf3),
                    punish_authority: PUNISHER,
                    proposal: Address::ZERO,
                    reserve_pool: RESERVE,
                    max_validator_count: 100,
                },
                LedgerParams {
                    max_punishment_amount: max_punishment,
                    ..Default::default()
                },
            )
            .unwrap();
        ledger
    }

    /// Reserve that refuses every transfer
    struct ClosedReserve;

    impl ReservePool for ClosedReserve {
        fn address(&self) -> Address {
            RESERVE
        }

        fn release_block_reward(&mut self) -> Result<Amount> {
            Ok(0)
        }

        fn receive(&mut self, _amount: Amount) -> Result<()> {
            Err(LedgerError::Reserve("closed".into()))
        }
    }

    #[test]
    fn test_punish_without_removal() {
        let mut ledger = setup(3, COIN);
        let mut reserve = MemoryReserve::new(RESERVE, 0, 0);
        let v = Address::repeat(2);

        let report = ledger.punish(PUNISHER, v, false, &mut reserve).unwrap();

        assert_eq!(report.penalty, COIN);
        assert!(!report.removed);
        assert_eq!(reserve.balance, COIN);
        assert_eq!(ledger.pool_balance(&v).unwrap(), 10_000 * COIN - COIN);
        assert_eq!(ledger.custody().unwrap(), 3 * 10_000 * COIN - COIN);
        assert!(ledger.top_set().contains(&v));
        assert!(ledger.check_invariants().is_ok());
    }

    #[test]
    fn test_punish_with_removal_jails_pool() {
        let mut ledger = setup(4, COIN);
        let mut reserve = MemoryReserve::new(RESERVE, 0, 0);
        let v = Address::repeat(2);

        ledger.punish(PUNISHER, v, true, &mut reserve).unwrap();

        assert_eq!(
            ledger.top_validators(),
            vec![Address::repeat(1), Address::repeat(3), Address::repeat(4)]
        );
        assert_eq!(ledger.pool(&v).unwrap().status, PoolStatus::Jailed);
        assert!(ledger.check_invariants().is_ok());
    }

    #[test]
    fn test_only_punish_authority() {
        let mut ledger = setup(1, COIN);
        let mut reserve = MemoryReserve::new(RESERVE, 0, 0);
        let intruder = Address::repeat(0x42);

        assert_eq!(
            ledger.punish(intruder, Address::repeat(1), true, &mut reserve),
            Err(LedgerError::Unauthorized(intruder))
        );
        assert_eq!(reserve.balance, 0);
    }

    #[test]
    fn test_penalty_spares_voters_and_commission() {
        let mut ledger = setup(1, 1_000_000 * COIN);
        let v = Address::repeat(1);
        let voter = Address::repeat(0x77);
        let mut reserve = MemoryReserve::new(RESERVE, 10 * COIN, 10 * COIN);

        ledger.vote(voter, v, 10_000 * COIN).unwrap();
        ledger.distribute_block_reward(&mut reserve).unwrap();

        let report = ledger.punish(PUNISHER, v, false, &mut reserve).unwrap();
        assert_eq!(report.penalty, 10_000 * COIN);
        assert_eq!(ledger.punishable_amount(&v).unwrap(), 0);
        assert!(ledger.check_invariants().is_ok());

        // 2 coins commission, 8 coins yield split between owner and voter
        assert_eq!(ledger.claim_fee(v, v).unwrap(), 2 * COIN);
        assert_eq!(ledger.claim_self_reward(v, v).unwrap(), 4 * COIN);
        assert_eq!(ledger.claim_reward(voter, v).unwrap(), 4 * COIN);
        ledger.revoke_vote(voter, v, 10_000, 0).unwrap();
        assert_eq!(
            ledger.withdraw_redeemed(voter, v, 3 * 24 * 60 * 60).unwrap(),
            10_000 * COIN
        );
        assert_eq!(ledger.pool_balance(&v).unwrap(), 0);
        assert!(ledger.check_invariants().is_ok());
    }

    #[test]
    fn test_penalty_capped_by_balance() {
        let mut ledger = setup(1, 20_000 * COIN);
        let mut reserve = MemoryReserve::new(RESERVE, 0, 0);
        let v = Address::repeat(1);

        let report = ledger.punish(PUNISHER, v, false, &mut reserve).unwrap();
        assert_eq!(report.requested, 20_000 * COIN);
        assert_eq!(report.penalty, 10_000 * COIN);
        assert_eq!(ledger.pool_balance(&v).unwrap(), 0);

        // empty pool: punishment still succeeds with nothing to take
        let report = ledger.punish(PUNISHER, v, false, &mut reserve).unwrap();
        assert_eq!(report.penalty, 0);
        assert_eq!(reserve.balance, 10_000 * COIN);
    }

    #[test]
    fn test_removing_non_member_still_penalizes() {
        let mut ledger = setup(2, COIN);
        let mut reserve = MemoryReserve::new(RESERVE, 0, 0);
        let v = Address::repeat(1);
        ledger.punish(PUNISHER, v, true, &mut reserve).unwrap();

        let report = ledger.punish(PUNISHER, v, true, &mut reserve).unwrap();
        assert!(!report.removed);
        assert_eq!(report.penalty, COIN);
        assert_eq!(reserve.balance, 2 * COIN);
        assert_eq!(ledger.pool(&v).unwrap().status, PoolStatus::Jailed);
        assert_eq!(ledger.top_validators(), vec![Address::repeat(2)]);
        assert!(ledger.check_invariants().is_ok());
    }

    #[test]
    fn test_reserve_failure_rolls_back() {
        let mut ledger = setup(2, COIN);
        let before = ledger.clone();

        assert!(matches!(
            ledger.punish(PUNISHER, Address::repeat(1), true, &mut ClosedReserve),
            Err(LedgerError::Reserve(_))
        ));
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_punish_settles_self_yield_first() {
        let mut ledger = setup(1, COIN);
        let v = Address::repeat(1);
        let mut reserve = MemoryReserve::new(RESERVE, 10 * COIN, COIN);
        ledger.distribute_block_reward(&mut reserve).unwrap();

        let acc = ledger.acc_reward_per_share(&v).unwrap();
        let fee = ledger.pending_fee(&v).unwrap();
        let report = ledger.punish(PUNISHER, v, false, &mut reserve).unwrap();

        assert_eq!(report.settled_yield, COIN * 4 / 5);
        assert_eq!(ledger.self_reward_debt(&v).unwrap(), acc);
        assert_eq!(ledger.acc_reward_per_share(&v).unwrap(), acc);
        assert_eq!(ledger.pending_fee(&v).unwrap(), fee);
        assert_eq!(ledger.pool(&v).unwrap().self_stake.claimable, COIN * 4 / 5);
    }

    #[test]
    fn test_unknown_validator() {
        let mut ledger = setup(1, COIN);
        let mut reserve = MemoryReserve::new(RESERVE, 0, 0);
        assert_eq!(
            ledger.punish(PUNISHER, Address::repeat(9), false, &mut reserve),
            Err(LedgerError::PoolNotFound(Address::repeat(9)))
        );
    }
}
