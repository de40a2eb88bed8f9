//! TuneRail Royalty Core
//!
//! Append-only earnings ledger with materialized per-artist balances.
//!
//! # Architecture
//!
//! - **Ledger as source of truth**: every balance-affecting event is an
//!   immutable `LedgerEntry`; artist counters are a materialized view
//!   maintained in the same atomic write
//! - **Single Writer**: one actor serializes all balance-affecting
//!   commands, eliminating lost updates between concurrent settlements
//!   and withdrawals
//! - **Withdrawal holds**: a balance is reserved before the external
//!   exchange order is placed and debited only after it succeeds
//!
//! # Invariants
//!
//! - `available_balance == Σ(signed amounts of non-failed entries)`
//! - `total_earnings == Σ(amounts of non-failed earning entries)`
//! - `withdrawn_amount == Σ(|amounts| of non-failed withdrawal entries)`
//! - Entries are never mutated after creation, except the status
//!   transition of a pending withdrawal

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::RoyaltyLedger;
pub use types::{
    ArtistAccount, AuditReport, BalanceSummary, EntryKind, EntryStatus, LedgerEntry,
    StreamEvent, StreamReceipt, StreamReport, Track, WalletAddress, WithdrawalOutcome,
    QUALIFYING_STREAM_SECS,
};
