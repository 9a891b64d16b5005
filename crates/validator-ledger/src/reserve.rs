//! Reserve pool collaborator
//!
//! The reserve funds block rewards and receives punishment penalties. Its own
//! accounting lives outside this crate; the ledger only talks to it through
//! [`ReservePool`].

use crate::error::{LedgerError, Result};
use crate::types::{Address, Amount};
use serde::{Deserialize, Serialize};

pub trait ReservePool {
    /// Address the ledger expects the reserve to live at
    fn address(&self) -> Address;

    /// Transfer this block's reward into the ledger's custody.
    ///
    /// May release less than the configured reward (including zero) when the
    /// reserve is short on funds.
    fn release_block_reward(&mut self) -> Result<Amount>;

    /// Accept funds transferred out of the ledger
    fn receive(&mut self, amount: Amount) -> Result<()>;
}

/// In-memory reserve with a fixed per-block reward
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryReserve {
    pub address: Address,
    pub balance: Amount,
    pub block_reward: Amount,
}

impl MemoryReserve {
    pub fn new(address: Address, balance: Amount, block_reward: Amount) -> Self {
        Self {
            address,
            balance,
            block_reward,
        }
    }

    pub fn set_block_reward(&mut self, block_reward: Amount) {
        self.block_reward = block_reward;
    }
}

impl ReservePool for MemoryReserve {
    fn address(&self) -> Address {
        self.address
    }

    fn release_block_reward(&mut self) -> Result<Amount> {
        let amount = self.block_reward.min(self.balance);
        self.balance -= amount;
        Ok(amount)
    }

    fn receive(&mut self, amount: Amount) -> Result<()> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Reserve("balance overflow".into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_capped_by_balance() {
        let mut reserve = MemoryReserve::new(Address::repeat(0xaa), 5, 7);
        assert_eq!(reserve.release_block_reward().unwrap(), 5);
        assert_eq!(reserve.balance, 0);
        assert_eq!(reserve.release_block_reward().unwrap(), 0);
    }

    #[test]
    fn test_receive() {
        let mut reserve = MemoryReserve::new(Address::repeat(0xaa), 0, 0);
        reserve.receive(42).unwrap();
        assert_eq!(reserve.balance, 42);
        assert!(reserve.receive(u128::MAX).is_err());
    }
}
