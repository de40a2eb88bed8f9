//! Core types for the royalty ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money, never floats)
//! - Append-only history (entries immutable after creation)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Seconds a completed playback must reach to qualify for a payout.
///
/// Fixed policy constant, not configurable per track.
pub const QUALIFYING_STREAM_SECS: u32 = 30;

/// Default per-stream rate in the settlement currency: $0.001 USDC.
pub fn default_price_per_stream() -> Decimal {
    Decimal::new(1, 3)
}

/// Artist wallet address (lowercased hex string)
///
/// The unique key of an artist account. Constructors normalize to
/// lowercase so lookups are case-insensitive, matching wallet-connect
/// clients that report mixed-case addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Create a new wallet address, normalizing to lowercase
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into().trim().to_lowercase())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the address carries no content
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of balance-affecting event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Qualifying playback settled at the artist's per-stream rate
    Stream,
    /// Direct listener tip
    Tip,
    /// Sale of a track NFT
    NftSale,
    /// Balance debit converted through the exchange gateway
    Withdrawal,
}

impl EntryKind {
    /// Earning kinds carry positive amounts; withdrawals are negative
    pub fn is_earning(&self) -> bool {
        !matches!(self, EntryKind::Withdrawal)
    }

    /// Stable string code for logs and API payloads
    pub fn code(&self) -> &'static str {
        match self {
            EntryKind::Stream => "stream",
            EntryKind::Tip => "tip",
            EntryKind::NftSale => "nft_sale",
            EntryKind::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Entry lifecycle status
///
/// Earnings are created `Completed`. Withdrawals are created `Pending`
/// and transition exactly once, when the external order resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Awaiting external resolution (withdrawals only)
    Pending,
    /// Final, counted toward the balance
    Completed,
    /// Final, excluded from all sums
    Failed,
}

/// One immutable record of a balance-affecting event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub entry_id: Uuid,

    /// Owning artist
    pub wallet: WalletAddress,

    /// Signed amount: positive for earnings, negative for withdrawals
    pub amount: Decimal,

    /// Kind of event
    pub kind: EntryKind,

    /// Lifecycle status
    pub status: EntryStatus,

    /// Track that produced the earning (stream entries)
    pub track_id: Option<Uuid>,

    /// Destination address (withdrawal entries)
    pub withdrawal_address: Option<String>,

    /// Token the artist chose to receive (withdrawal entries)
    pub withdrawal_token: Option<String>,

    /// External exchange order backing this withdrawal
    pub external_order_id: Option<String>,

    /// Free-text note
    pub note: Option<String>,

    /// Entry timestamp (nanoseconds since Unix epoch)
    pub timestamp_nanos: i64,
}

impl LedgerEntry {
    /// Failed entries are excluded from every balance sum
    pub fn counts_toward_balance(&self) -> bool {
        self.status != EntryStatus::Failed
    }
}

/// Artist account: aggregate root for money
///
/// Counters are a materialized view over the entry log, updated in the
/// same atomic batch that appends the entry. `audit`/`repair` recompute
/// them from the log when drift is suspected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistAccount {
    /// Unique wallet address
    pub wallet: WalletAddress,

    /// Display name
    pub artist_name: String,

    /// Flat rate earned per qualifying stream
    pub price_per_stream: Decimal,

    /// Number of qualifying streams settled
    pub total_streams: u64,

    /// Gross earnings: sum of non-failed earning entries
    pub total_earnings: Decimal,

    /// Withdrawable balance: signed sum of non-failed entries
    pub available_balance: Decimal,

    /// Sum of non-failed withdrawal amounts (pending included)
    pub withdrawn_amount: Decimal,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl ArtistAccount {
    /// Create a fresh account with zeroed counters
    pub fn new(wallet: WalletAddress, artist_name: impl Into<String>, price_per_stream: Decimal) -> Self {
        let now = Utc::now();
        Self {
            wallet,
            artist_name: artist_name.into(),
            price_per_stream,
            total_streams: 0,
            total_earnings: Decimal::ZERO,
            available_balance: Decimal::ZERO,
            withdrawn_amount: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One playback attempt, qualifying or not
///
/// Reporting data only: the balance invariant runs off `LedgerEntry`,
/// never off stream events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Unique event ID
    pub event_id: Uuid,

    /// Track that was played
    pub track_id: Uuid,

    /// Owning artist
    pub wallet: WalletAddress,

    /// Listener wallet (need not be registered)
    pub listener_wallet: WalletAddress,

    /// Seconds of playback reported
    pub duration_secs: u32,

    /// Client-reported completion flag
    pub completed: bool,

    /// Amount earned by this event (zero if not qualifying)
    pub earned_amount: Decimal,

    /// Event timestamp (nanoseconds since Unix epoch)
    pub timestamp_nanos: i64,
}

/// Minimal track record: the resolve-and-increment collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Unique track ID
    pub track_id: Uuid,

    /// Owning artist
    pub wallet: WalletAddress,

    /// Track title
    pub title: String,

    /// Qualifying plays settled against this track
    pub play_count: u64,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl Track {
    /// Create a track with a fresh ID and zero plays
    pub fn new(wallet: WalletAddress, title: impl Into<String>) -> Self {
        Self {
            track_id: Uuid::new_v4(),
            wallet,
            title: title.into(),
            play_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// A playback-completion report submitted for settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamReport {
    /// Track that was played
    pub track_id: Uuid,

    /// Listener wallet address
    pub listener_wallet: WalletAddress,

    /// Seconds of playback
    pub duration_secs: u32,

    /// Whether the client reports the playback as completed
    pub completed: bool,

    /// Server-issued playback-session nonce, consumed exactly once.
    /// Reports without one are settled trustingly (legacy clients).
    pub session_id: Option<Uuid>,
}

/// Outcome of a stream settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamReceipt {
    /// Track play count after settlement
    pub play_count: u64,

    /// Amount credited to the artist (zero if not qualifying)
    pub earned_amount: Decimal,

    /// Whether the playback qualified for a payout
    pub qualified: bool,

    /// Ledger entry created, when qualifying
    pub entry_id: Option<Uuid>,
}

/// Terminal resolution of a pending withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalOutcome {
    /// External order settled; the debit stands
    Completed,
    /// External order failed, refunded or expired; credit the balance back
    Failed,
}

/// Materialized balance view read straight from the account counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSummary {
    /// Gross earnings
    pub total_earnings: Decimal,
    /// Withdrawable balance
    pub available_balance: Decimal,
    /// Total withdrawn (pending included)
    pub withdrawn_amount: Decimal,
    /// Qualifying streams settled
    pub total_streams: u64,
    /// Current per-stream rate
    pub price_per_stream: Decimal,
}

impl From<&ArtistAccount> for BalanceSummary {
    fn from(account: &ArtistAccount) -> Self {
        Self {
            total_earnings: account.total_earnings,
            available_balance: account.available_balance,
            withdrawn_amount: account.withdrawn_amount,
            total_streams: account.total_streams,
            price_per_stream: account.price_per_stream,
        }
    }
}

/// Counter values, either stored or recomputed from the entry log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Gross earnings
    pub total_earnings: Decimal,
    /// Withdrawable balance
    pub available_balance: Decimal,
    /// Total withdrawn
    pub withdrawn_amount: Decimal,
    /// Qualifying streams
    pub total_streams: u64,
}

/// Result of auditing stored counters against the entry log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    /// Audited artist
    pub wallet: WalletAddress,
    /// Counters as stored on the account record
    pub stored: CounterSnapshot,
    /// Counters recomputed from the ledger
    pub recomputed: CounterSnapshot,
    /// True when the two match exactly
    pub consistent: bool,
}
