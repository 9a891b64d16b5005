//! thread-safe handle around a [`Ledger`]
//!
//! every mutating call holds the write lock for its full duration, so calls
//! are serialized and each one observes the state left by the previous one.

use std::sync::{Arc, RwLock};

use crate::distribution::DistributionReport;
use crate::error::{LedgerError, Result};
use crate::ledger::Ledger;
use crate::punish::PunishmentReport;
use crate::reserve::ReservePool;
use crate::types::{Address, Amount, Ballots};

#[derive(Debug, Clone, Default)]
pub struct SharedLedger {
    inner: Arc<RwLock<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ledger)),
        }
    }

    /// run `f` with exclusive access
    pub fn write<T>(&self, f: impl FnOnce(&mut Ledger) -> Result<T>) -> Result<T> {
        let mut ledger = self
            .inner
            .write()
            .map_err(|e| LedgerError::LockPoisoned(e.to_string()))?;
        f(&mut ledger)
    }

    /// run `f` with shared access
    pub fn read<T>(&self, f: impl FnOnce(&Ledger) -> Result<T>) -> Result<T> {
        let ledger = self
            .inner
            .read()
            .map_err(|e| LedgerError::LockPoisoned(e.to_string()))?;
        f(&ledger)
    }

    /// copy of the current state
    pub fn snapshot(&self) -> Result<Ledger> {
        self.read(|ledger| Ok(ledger.clone()))
    }

    pub fn distribute_block_reward<R>(&self, reserve: &mut R) -> Result<DistributionReport>
    where
        R: ReservePool + ?Sized,
    {
        self.write(|ledger| ledger.distribute_block_reward(reserve))
    }

    pub fn punish<R>(
        &self,
        caller: Address,
        validator: Address,
        remove: bool,
        reserve: &mut R,
    ) -> Result<PunishmentReport>
    where
        R: ReservePool + ?Sized,
    {
        self.write(|ledger| ledger.punish(caller, validator, remove, reserve))
    }

    pub fn vote(&self, voter: Address, validator: Address, amount: Amount) -> Result<Ballots> {
        self.write(|ledger| ledger.vote(voter, validator, amount))
    }

    pub fn top_validators(&self) -> Result<Vec<Address>> {
        self.read(|ledger| Ok(ledger.top_validators()))
    }

    pub fn rewards_left(&self) -> Result<Amount> {
        self.read(|ledger| ledger.rewards_left())
    }
}
