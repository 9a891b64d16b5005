//! Ledger parameters and genesis arguments

use crate::error::{LedgerError, Result};
use crate::types::{Address, Amount, Ballots, Timestamp, BPS_DENOMINATOR, COIN};
use serde::{Deserialize, Serialize};

/// Minimum self ballots a validator must hold to be activated
pub const MIN_SELF_BALLOTS: Ballots = 10_000;

/// Stake withdrawal lock: 3 days
pub const REDEEM_LOCK_DURATION: Timestamp = 3 * 24 * 60 * 60;

/// Commission change lock: 1 day
pub const FEE_CHANGE_LOCK_DURATION: Timestamp = 24 * 60 * 60;

/// Default penalty per punishment event: 100 coins
pub const MAX_PUNISHMENT_AMOUNT: Amount = 100 * COIN;

/// Tunable ledger parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerParams {
    /// Self ballots required for activation
    pub min_self_ballots: Ballots,

    /// Native units per ballot
    pub ballot_unit: Amount,

    /// Penalty deducted per punishment event (capped by pool balance)
    pub max_punishment_amount: Amount,

    /// Seconds between revoking a vote and withdrawing its funds
    pub redeem_lock_duration: Timestamp,

    /// Seconds between proposing and committing a fee share change
    pub fee_change_lock_duration: Timestamp,
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            min_self_ballots: MIN_SELF_BALLOTS,
            ballot_unit: COIN,
            max_punishment_amount: MAX_PUNISHMENT_AMOUNT,
            redeem_lock_duration: REDEEM_LOCK_DURATION,
            fee_change_lock_duration: FEE_CHANGE_LOCK_DURATION,
        }
    }
}

impl LedgerParams {
    pub fn validate(&self) -> Result<()> {
        if self.ballot_unit == 0 {
            return Err(LedgerError::invalid("ballot unit must be non-zero"));
        }
        if self.min_self_ballots == 0 {
            return Err(LedgerError::invalid("minimum self ballots must be non-zero"));
        }
        Ok(())
    }
}

/// Arguments of the one-time `initialize` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitArgs {
    /// Initial validators, in top set order
    pub validators: Vec<Address>,
    /// Pool owner (manager) of each validator
    pub managers: Vec<Address>,
    /// Commission of each validator in basis points
    pub fee_shares: Vec<u16>,
    pub admin: Address,
    /// Address of the ledger itself
    pub ledger_address: Address,
    pub punish_authority: Address,
    pub proposal: Address,
    pub reserve_pool: Address,
    pub max_validator_count: usize,
}

impl InitArgs {
    /// Reject mismatched list lengths and out of range commissions
    pub fn validate(&self) -> Result<()> {
        let n = self.validators.len();
        if self.managers.len() != n || self.fee_shares.len() != n {
            return Err(LedgerError::invalid(format!(
                "list length mismatch: {} validators, {} managers, {} fee shares",
                n,
                self.managers.len(),
                self.fee_shares.len()
            )));
        }

        if let Some(bps) = self
            .fee_shares
            .iter()
            .find(|bps| u128::from(**bps) > BPS_DENOMINATOR)
        {
            return Err(LedgerError::invalid(format!("fee share {} bps > 10000", bps)));
        }

        if self.max_validator_count == 0 {
            return Err(LedgerError::invalid("max validator count must be non-zero"));
        }

        Ok(())
    }
}

/// Genesis file: init arguments plus parameter overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genesis {
    pub init: InitArgs,
    #[serde(default)]
    pub params: LedgerParams,
}
