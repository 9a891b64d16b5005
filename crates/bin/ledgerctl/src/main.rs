//! ledgerctl - drive a validator ledger snapshot from the command line
//!
//! The ledger and its reserve live in a single JSON state file. Every command
//! loads it, applies one operation and writes it back only if the operation
//! succeeded.
//!
//! ## Usage
//!
//! ```bash
//! # create the state file from a genesis description
//! ledgerctl init --genesis genesis.json --reserve-balance 1000000000000000000000 \
//!     --block-reward 7000000000000000000
//!
//! # distribute ten blocks
//! ledgerctl distribute --blocks 10
//!
//! # punish and evict a validator
//! ledgerctl punish --caller 0xee.. --validator 0x01.. --remove
//!
//! # print the state
//! ledgerctl show
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use validator_ledger::{Address, Amount, Ballots, Genesis, Ledger, MemoryReserve, Timestamp};

#[derive(Parser)]
#[command(name = "ledgerctl")]
#[command(about = "Validator registry and reward ledger operator tool")]
struct Cli {
    /// State file holding the ledger and reserve
    #[arg(short, long, global = true, default_value = "ledger.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a fresh state file from a genesis description
    Init {
        /// Genesis JSON: {"init": {...}, "params": {...}}
        #[arg(short, long)]
        genesis: PathBuf,

        /// Initial reserve balance in native units
        #[arg(long, default_value = "0")]
        reserve_balance: Amount,

        /// Reward released per block in native units
        #[arg(long, default_value = "0")]
        block_reward: Amount,

        /// Overwrite an existing state file
        #[arg(long)]
        force: bool,
    },

    /// Distribute block rewards
    Distribute {
        #[arg(short, long, default_value = "1")]
        blocks: u64,
    },

    /// Delegate stake to a validator
    Vote {
        #[arg(long)]
        voter: Address,
        #[arg(long)]
        validator: Address,
        /// Native units, a multiple of the ballot unit
        #[arg(long)]
        amount: Amount,
    },

    /// Revoke delegated ballots
    Revoke {
        #[arg(long)]
        voter: Address,
        #[arg(long)]
        validator: Address,
        #[arg(long)]
        ballots: Ballots,
        /// Current unix time
        #[arg(long)]
        now: Timestamp,
    },

    /// Withdraw revoked stake whose lock has elapsed
    Withdraw {
        #[arg(long)]
        voter: Address,
        #[arg(long)]
        validator: Address,
        #[arg(long)]
        now: Timestamp,
    },

    /// Claim rewards
    Claim {
        #[arg(long)]
        caller: Address,
        #[arg(long)]
        validator: Address,
        #[arg(long, value_enum, default_value = "vote")]
        kind: ClaimKind,
    },

    /// Punish a validator (punish authority only)
    Punish {
        #[arg(long)]
        caller: Address,
        #[arg(long)]
        validator: Address,
        /// Also evict from the top validator set
        #[arg(long)]
        remove: bool,
    },

    /// Propose or commit a commission change (pool owner only)
    FeeShare {
        #[arg(long)]
        caller: Address,
        #[arg(long)]
        validator: Address,
        /// New rate in basis points; omit to commit the pending change
        #[arg(long)]
        bps: Option<u16>,
        #[arg(long)]
        now: Timestamp,
    },

    /// Set the per-event punishment cap (admin only)
    SetMaxPunishment {
        #[arg(long)]
        caller: Address,
        #[arg(long)]
        amount: Amount,
    },

    /// Print the ledger
    Show {
        /// Only this validator's pool
        #[arg(long)]
        validator: Option<Address>,
    },

    /// Print the state root and check invariants
    Root,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ClaimKind {
    /// Voter yield
    Vote,
    /// Owner self stake yield
    SelfStake,
    /// Owner commission
    Fee,
}

#[derive(Serialize, Deserialize)]
struct StateFile {
    ledger: Ledger,
    reserve: MemoryReserve,
}

fn load(path: &Path) -> Result<StateFile> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading state file {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing state file {}", path.display()))
}

fn store(path: &Path, state: &StateFile) -> Result<()> {
    let data = serde_json::to_string_pretty(state)?;
    fs::write(path, data).with_context(|| format!("writing state file {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ledgerctl=info,validator_ledger=info")),
        )
        .init();

    let cli = Cli::parse();
    let path = cli.state.as_path();

    match cli.command {
        Commands::Init {
            genesis,
            reserve_balance,
            block_reward,
            force,
        } => run_init(path, &genesis, reserve_balance, block_reward, force),

        Commands::Distribute { blocks } => with_state(path, |ledger, reserve| {
            for block in 0..blocks {
                let report = ledger.distribute_block_reward(reserve)?;
                info!(
                    block,
                    received = %report.received,
                    fee = %report.total_fee(),
                    yield_amount = %report.total_yield(),
                    rewards_left_delta = %report.rewards_left_delta,
                    "distributed"
                );
            }
            println!("rewards left: {}", ledger.rewards_left()?);
            Ok(())
        }),

        Commands::Vote {
            voter,
            validator,
            amount,
        } => with_state(path, |ledger, _| {
            let ballots = ledger.vote(voter, validator, amount)?;
            println!("{} ballots cast for {}", ballots, validator);
            Ok(())
        }),

        Commands::Revoke {
            voter,
            validator,
            ballots,
            now,
        } => with_state(path, |ledger, _| {
            let redemption = ledger.revoke_vote(voter, validator, ballots, now)?;
            println!("{} redeemable at {}", redemption.amount, redemption.unlock_at);
            Ok(())
        }),

        Commands::Withdraw {
            voter,
            validator,
            now,
        } => with_state(path, |ledger, _| {
            let amount = ledger.withdraw_redeemed(voter, validator, now)?;
            println!("withdrew {}", amount);
            Ok(())
        }),

        Commands::Claim {
            caller,
            validator,
            kind,
        } => with_state(path, |ledger, _| {
            let amount = match kind {
                ClaimKind::Vote => ledger.claim_reward(caller, validator)?,
                ClaimKind::SelfStake => ledger.claim_self_reward(caller, validator)?,
                ClaimKind::Fee => ledger.claim_fee(caller, validator)?,
            };
            println!("claimed {}", amount);
            Ok(())
        }),

        Commands::Punish {
            caller,
            validator,
            remove,
        } => with_state(path, |ledger, reserve| {
            let report = ledger.punish(caller, validator, remove, reserve)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }),

        Commands::FeeShare {
            caller,
            validator,
            bps,
            now,
        } => with_state(path, |ledger, _| {
            match bps {
                Some(bps) => {
                    let pending = ledger.propose_fee_share(caller, validator, bps, now)?;
                    println!(
                        "{} bps proposed, effective at {}",
                        pending.fee_share_bps, pending.effective_at
                    );
                }
                None => {
                    let bps = ledger.commit_fee_share(caller, validator, now)?;
                    println!("fee share now {} bps", bps);
                }
            }
            Ok(())
        }),

        Commands::SetMaxPunishment { caller, amount } => with_state(path, |ledger, _| {
            ledger.set_max_punishment_amount(caller, amount)?;
            Ok(())
        }),

        Commands::Show { validator } => run_show(path, validator),
        Commands::Root => run_root(path),
    }
}

fn run_init(
    state_path: &Path,
    genesis_path: &Path,
    reserve_balance: Amount,
    block_reward: Amount,
    force: bool,
) -> Result<()> {
    if state_path.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite",
            state_path.display()
        );
    }

    let data = fs::read_to_string(genesis_path)
        .with_context(|| format!("reading genesis {}", genesis_path.display()))?;
    let genesis: Genesis = serde_json::from_str(&data).context("parsing genesis")?;

    let reserve = MemoryReserve::new(genesis.init.reserve_pool, reserve_balance, block_reward);
    let mut ledger = Ledger::new();
    ledger.initialize(genesis.init, genesis.params)?;

    info!(
        validators = ledger.top_validators().len(),
        state = %state_path.display(),
        "state file created"
    );
    store(state_path, &StateFile { ledger, reserve })
}

/// Load, apply `op`, check invariants, store
fn with_state(
    state_path: &Path,
    op: impl FnOnce(&mut Ledger, &mut MemoryReserve) -> Result<()>,
) -> Result<()> {
    let mut state = load(state_path)?;
    op(&mut state.ledger, &mut state.reserve)?;
    state.ledger.check_invariants()?;
    store(state_path, &state)
}

fn run_show(state_path: &Path, validator: Option<Address>) -> Result<()> {
    let state = load(state_path)?;
    let ledger = &state.ledger;

    match validator {
        Some(v) => {
            println!("{}", serde_json::to_string_pretty(ledger.pool(&v)?)?);
        }
        None => {
            let global = ledger.global()?;
            println!("=== Ledger ===");
            println!("Custody:          {}", global.custody);
            println!("Rewards left:     {}", global.rewards_left);
            println!("Max punishment:   {}", global.max_punishment_amount);
            println!("Reserve balance:  {}", state.reserve.balance);
            println!(
                "Top validators:   {}/{}",
                ledger.top_set().len(),
                ledger.top_set().capacity()
            );
            println!();
            for pool in ledger.pools() {
                println!(
                    "{} {:?} fee={}bps self={} supplied={} pending_fee={} acc={} balance={} own={}",
                    pool.validator,
                    pool.status,
                    pool.fee_share_bps,
                    pool.self_ballots(),
                    pool.supplied_ballots(),
                    pool.pending_fee(),
                    pool.acc_reward_per_share(),
                    pool.balance,
                    pool.own_funds(global.ballot_unit)?,
                );
            }
        }
    }
    Ok(())
}

fn run_root(state_path: &Path) -> Result<()> {
    let state = load(state_path)?;
    let root = state.ledger.state_root()?;
    println!("0x{}", hex::encode(root));

    match state.ledger.check_invariants() {
        Ok(()) => println!("invariants ok"),
        Err(e) => bail!("invariants violated: {}", e),
    }
    Ok(())
}
