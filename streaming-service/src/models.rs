use chrono::{DateTime, Utc};
use exchange_gateway::Order;
use royalty_core::{ArtistAccount, BalanceSummary, LedgerEntry, Track};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Artist registration request
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct RegisterArtistRequest {
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: String,
    #[validate(length(min = 1, max = 256))]
    pub artist_name: String,
    pub price_per_stream: Option<Decimal>,
}

/// Track registration request
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct RegisterTrackRequest {
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: String,
    #[validate(length(min = 1, max = 512))]
    pub title: String,
}

/// Playback-completion report
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct RecordStreamRequest {
    pub track_id: Uuid,
    /// Listener wallet
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: String,
    pub duration_secs: u32,
    pub completed: bool,
    /// Server-issued playback-session nonce
    pub session_id: Option<Uuid>,
}

/// Stream settlement response
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamResponse {
    pub success: bool,
    pub qualified: bool,
    pub play_count: u64,
    pub earned_amount: Decimal,
    pub entry_id: Option<Uuid>,
}

/// Withdrawal request
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct WithdrawRequest {
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: String,
    pub amount: Decimal,
    /// Token the artist wants to receive, e.g. "btc"
    #[validate(length(min = 1, max = 16))]
    pub withdrawal_token: String,
    #[validate(length(min = 1, max = 256))]
    pub withdrawal_address: String,
}

/// Withdrawal response: the local debit plus the external order
#[derive(Debug, Serialize)]
pub struct WithdrawResponse {
    pub withdrawal: LedgerEntry,
    pub order: Order,
    pub message: String,
}

/// Query for the earnings view. `before` and `before_id` together name
/// the previous page's oldest entry; the next page resumes strictly
/// after it, so entries sharing a timestamp are never skipped.
#[derive(Debug, Deserialize)]
pub struct EarningsQuery {
    pub wallet: String,
    pub limit: Option<usize>,
    /// Timestamp of the previous page's oldest entry (nanoseconds)
    pub before: Option<i64>,
    /// Entry id of the previous page's oldest entry
    pub before_id: Option<Uuid>,
}

/// Balance summary plus a page of ledger entries
#[derive(Debug, Serialize)]
pub struct EarningsResponse {
    pub wallet: String,
    pub balance: BalanceSummary,
    pub entries: Vec<LedgerEntry>,
}

/// Query for withdrawal history or external order status
#[derive(Debug, Deserialize)]
pub struct WithdrawalsQuery {
    pub wallet: Option<String>,
    pub order_id: Option<String>,
}

/// Query for the analytics view
#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub wallet: Option<String>,
    /// Reporting window in days, default 30
    pub period: Option<u32>,
}

/// Per-day stream and earning aggregates
#[derive(Debug, Serialize)]
pub struct DailyStat {
    pub date: String,
    pub streams: u64,
    pub qualified_streams: u64,
    pub earnings: Decimal,
}

/// Track row in the analytics top list
#[derive(Debug, Serialize)]
pub struct TrackStat {
    pub track_id: Uuid,
    pub title: String,
    pub play_count: u64,
}

/// Artist-scoped analytics over a reporting window
#[derive(Debug, Serialize)]
pub struct ArtistAnalytics {
    pub wallet: String,
    pub period_days: u32,
    pub balance: BalanceSummary,
    pub period_streams: u64,
    pub period_qualified_streams: u64,
    pub period_earnings: Decimal,
    pub daily: Vec<DailyStat>,
    pub top_tracks: Vec<TrackStat>,
}

/// Analytics view: artist-scoped when a wallet is given, platform totals
/// otherwise
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AnalyticsView {
    Artist(ArtistAnalytics),
    Platform(PlatformAnalytics),
}

/// Platform-wide totals when no wallet is given
#[derive(Debug, Serialize)]
pub struct PlatformAnalytics {
    pub total_artists: u64,
    pub total_tracks: u64,
    pub total_entries: u64,
    pub total_stream_events: u64,
    pub generated_at: DateTime<Utc>,
}

/// Artist registration response
#[derive(Debug, Serialize)]
pub struct ArtistResponse {
    pub wallet_address: String,
    pub artist_name: String,
    pub price_per_stream: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<ArtistAccount> for ArtistResponse {
    fn from(account: ArtistAccount) -> Self {
        Self {
            wallet_address: account.wallet.to_string(),
            artist_name: account.artist_name,
            price_per_stream: account.price_per_stream,
            created_at: account.created_at,
        }
    }
}

/// Track registration response
#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub track_id: Uuid,
    pub wallet_address: String,
    pub title: String,
    pub play_count: u64,
}

impl From<Track> for TrackResponse {
    fn from(track: Track) -> Self {
        Self {
            track_id: track.track_id,
            wallet_address: track.wallet.to_string(),
            title: track.title,
            play_count: track.play_count,
        }
    }
}
