//! error types for the validator ledger

use crate::types::{Address, Amount, Timestamp};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Every variant aborts the whole call; a failed call leaves no trace in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("unauthorized: {0} lacks the required privilege")]
    Unauthorized(Address),

    #[error("ledger already initialized")]
    AlreadyInitialized,

    #[error("ledger not initialized")]
    NotInitialized,

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Amount, available: Amount },

    #[error("top validator set full (capacity {capacity})")]
    SetFull { capacity: usize },

    #[error("{0} is not a member of the top validator set")]
    NotAMember(Address),

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("no pool for validator {0}")]
    PoolNotFound(Address),

    #[error("pool {0} has zero stake")]
    ZeroStake(Address),

    #[error("fee share change locked until {effective_at}")]
    FeeChangeLocked { effective_at: Timestamp },

    #[error("no pending fee share change for {0}")]
    NoPendingFeeChange(Address),

    #[error("nothing to withdraw")]
    NothingToWithdraw,

    #[error("reserve pool error: {0}")]
    Reserve(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("ledger lock poisoned: {0}")]
    LockPoisoned(String),
}

impl LedgerError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        LedgerError::InvalidParameter(msg.into())
    }
}
