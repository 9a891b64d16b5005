//! Validator registry and reward/punishment ledger for a proof-of-stake chain
//!
//! Tracks a pool per validator, the bounded top validator set, block reward
//! distribution with an owner commission, and punishment of misbehaving
//! validators.
//!
//! ## Features
//!
//! - **Pools**: self stake, delegated stake, commission, reward-per-share yield
//! - **Top set**: ordered, bounded, order preserved on removal
//! - **Distribution**: per-ballot split of each block reward, remainder kept
//!   in `rewards_left`
//! - **Punishment**: capped penalty forwarded to the reserve, optional eviction
//! - **Atomicity**: every operation commits fully or not at all
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   block reward  │ ReservePool  │◄───────── penalty
//!        ┌────────┤ (external)   │              │
//!        │        └──────────────┘              │
//!        ▼                                      │
//! ┌─────────────────────────────────────────────┴──────┐
//! │ Ledger                                             │
//! │  global: admin, punish authority, rewards_left...  │
//! │  top:    [v1, v2, v3, ...]   (max_validator_count) │
//! │  pools:  v -> ValidatorPool                        │
//! │            ├ self stake / voters                   │
//! │            ├ acc_reward_per_share                  │
//! │            └ pending_fee                           │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! All amounts are integers in native units (1 coin = 1e18). Arithmetic is
//! checked; overflow aborts the operation.

pub mod config;
pub mod distribution;
pub mod error;
pub mod fixed_point;
pub mod ledger;
pub mod pool;
pub mod punish;
pub mod reserve;
pub mod shared;
pub mod top_set;
pub mod types;

pub use config::{
    Genesis, InitArgs, LedgerParams, FEE_CHANGE_LOCK_DURATION, MAX_PUNISHMENT_AMOUNT,
    MIN_SELF_BALLOTS, REDEEM_LOCK_DURATION,
};
pub use distribution::{DistributionReport, PoolAllocation};
pub use error::{LedgerError, Result};
pub use fixed_point::ACC_PRECISION;
pub use ledger::{GlobalState, Ledger};
pub use pool::{PendingFeeShare, PoolStatus, Redemption, StakeAccount, ValidatorPool};
pub use punish::PunishmentReport;
pub use reserve::{MemoryReserve, ReservePool};
pub use shared::SharedLedger;
pub use top_set::TopValidatorSet;
pub use types::{Address, AddressParseError, Amount, Ballots, Timestamp, BPS_DENOMINATOR, COIN};
