//! Top validator set: the bounded, ordered collection of reward-eligible validators

use crate::error::{LedgerError, Result};
use crate::types::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopValidatorSet {
    members: Vec<Address>,
    capacity: usize,
}

impl TopValidatorSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            members: Vec::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append at the end of the order
    pub fn insert(&mut self, validator: Address) -> Result<()> {
        if self.contains(&validator) {
            return Err(LedgerError::invalid(format!(
                "{} already in top validator set",
                validator
            )));
        }
        if self.members.len() >= self.capacity {
            return Err(LedgerError::SetFull {
                capacity: self.capacity,
            });
        }
        self.members.push(validator);
        Ok(())
    }

    /// Remove in place; remaining members keep their relative order
    pub fn remove(&mut self, validator: &Address) -> Result<()> {
        let index = self
            .members
            .iter()
            .position(|m| m == validator)
            .ok_or(LedgerError::NotAMember(*validator))?;
        self.members.remove(index);
        Ok(())
    }

    pub fn contains(&self, validator: &Address) -> bool {
        self.members.contains(validator)
    }

    /// Current members in order
    pub fn members(&self) -> impl Iterator<Item = &Address> + '_ {
        self.members.iter()
    }

    pub fn as_slice(&self) -> &[Address] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
