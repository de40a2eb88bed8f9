//! Actor-based concurrency for the royalty ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One logical writer task serializes every balance-affecting command,
//!   so concurrent settlements and withdrawals for the same artist can
//!   never interleave their read-modify-write of the counters
//! - Withdrawal holds reserve balance between the precondition check and
//!   the external order's commit point
//! - Async message passing with backpressure (bounded mailbox)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              HTTP handlers (streaming-service)        │
//! │                 Many concurrent requests              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               RoyaltyHandle (Clone)                   │
//! │          Sends commands to the actor mailbox          │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │             RoyaltyActor (Single Task)                │
//! │   holds: reserved withdrawal amounts per artist       │
//! │                       │                               │
//! │                       ▼                               │
//! │        Storage::apply_* (atomic WriteBatch)           │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::metrics::Metrics;
use crate::storage::Storage;
use crate::types::{
    default_price_per_stream, ArtistAccount, AuditReport, BalanceSummary, CounterSnapshot,
    EntryKind, EntryStatus, LedgerEntry, StreamEvent, StreamReceipt, StreamReport, Track,
    WalletAddress, WithdrawalOutcome, QUALIFYING_STREAM_SECS,
};
use crate::{Error, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Command sent to the royalty actor
pub enum RoyaltyCommand {
    /// Register a new artist account
    RegisterArtist {
        /// Unique wallet address
        wallet: WalletAddress,
        /// Display name
        artist_name: String,
        /// Per-stream rate; defaults to $0.001 when absent
        price_per_stream: Option<Decimal>,
        /// Reply channel
        response: oneshot::Sender<Result<ArtistAccount>>,
    },

    /// Register a track for an existing artist
    RegisterTrack {
        /// Owning artist
        wallet: WalletAddress,
        /// Track title
        title: String,
        /// Reply channel
        response: oneshot::Sender<Result<Track>>,
    },

    /// Settle a playback-completion report
    SettleStream {
        /// The report
        report: StreamReport,
        /// Reply channel
        response: oneshot::Sender<Result<StreamReceipt>>,
    },

    /// Reserve balance ahead of an external exchange order
    BeginWithdrawal {
        /// Artist to debit
        wallet: WalletAddress,
        /// Amount to reserve
        amount: Decimal,
        /// Reply channel
        response: oneshot::Sender<Result<Uuid>>,
    },

    /// Debit the reserved balance after the external order succeeded
    CommitWithdrawal {
        /// Hold returned by `BeginWithdrawal`
        hold_id: Uuid,
        /// External exchange order id
        order_id: String,
        /// Token the artist chose
        withdrawal_token: String,
        /// Destination address
        withdrawal_address: String,
        /// Reply channel
        response: oneshot::Sender<Result<LedgerEntry>>,
    },

    /// Drop a hold without debiting (external order failed)
    ReleaseHold {
        /// Hold to drop
        hold_id: Uuid,
        /// Reply channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Transition a pending withdrawal to its terminal status
    ResolveWithdrawal {
        /// Pending withdrawal entry
        entry_id: Uuid,
        /// Terminal outcome
        outcome: WithdrawalOutcome,
        /// Reply channel
        response: oneshot::Sender<Result<LedgerEntry>>,
    },

    /// Read the materialized balance counters
    GetBalance {
        /// Artist wallet
        wallet: WalletAddress,
        /// Reply channel
        response: oneshot::Sender<Result<BalanceSummary>>,
    },

    /// Ledger entries, most recent first
    ListEntries {
        /// Artist wallet
        wallet: WalletAddress,
        /// Page size
        limit: usize,
        /// Resume strictly after this `(timestamp_nanos, entry_id)` pair
        before: Option<(i64, Uuid)>,
        /// Reply channel
        response: oneshot::Sender<Result<Vec<LedgerEntry>>>,
    },

    /// Stream events for an artist, most recent first
    ListStreamEvents {
        /// Artist wallet
        wallet: WalletAddress,
        /// Page size
        limit: usize,
        /// Resume strictly after this `(timestamp_nanos, event_id)` pair
        before: Option<(i64, Uuid)>,
        /// Reply channel
        response: oneshot::Sender<Result<Vec<StreamEvent>>>,
    },

    /// Stream events for a track, most recent first
    ListTrackStreamEvents {
        /// Track id
        track_id: Uuid,
        /// Page size
        limit: usize,
        /// Resume strictly after this `(timestamp_nanos, event_id)` pair
        before: Option<(i64, Uuid)>,
        /// Reply channel
        response: oneshot::Sender<Result<Vec<StreamEvent>>>,
    },

    /// Tracks owned by an artist
    ListTracks {
        /// Artist wallet
        wallet: WalletAddress,
        /// Reply channel
        response: oneshot::Sender<Result<Vec<Track>>>,
    },

    /// Withdrawal entries awaiting external resolution
    PendingWithdrawals {
        /// Reply channel
        response: oneshot::Sender<Result<Vec<LedgerEntry>>>,
    },

    /// Compare stored counters against the entry log
    Audit {
        /// Artist wallet
        wallet: WalletAddress,
        /// Reply channel
        response: oneshot::Sender<Result<AuditReport>>,
    },

    /// Rewrite counters from the entry log
    Repair {
        /// Artist wallet
        wallet: WalletAddress,
        /// Reply channel
        response: oneshot::Sender<Result<AuditReport>>,
    },

    /// Shutdown actor
    Shutdown,
}

impl std::fmt::Debug for RoyaltyCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RoyaltyCommand::RegisterArtist { .. } => "RegisterArtist",
            RoyaltyCommand::RegisterTrack { .. } => "RegisterTrack",
            RoyaltyCommand::SettleStream { .. } => "SettleStream",
            RoyaltyCommand::BeginWithdrawal { .. } => "BeginWithdrawal",
            RoyaltyCommand::CommitWithdrawal { .. } => "CommitWithdrawal",
            RoyaltyCommand::ReleaseHold { .. } => "ReleaseHold",
            RoyaltyCommand::ResolveWithdrawal { .. } => "ResolveWithdrawal",
            RoyaltyCommand::GetBalance { .. } => "GetBalance",
            RoyaltyCommand::ListEntries { .. } => "ListEntries",
            RoyaltyCommand::ListStreamEvents { .. } => "ListStreamEvents",
            RoyaltyCommand::ListTrackStreamEvents { .. } => "ListTrackStreamEvents",
            RoyaltyCommand::ListTracks { .. } => "ListTracks",
            RoyaltyCommand::PendingWithdrawals { .. } => "PendingWithdrawals",
            RoyaltyCommand::Audit { .. } => "Audit",
            RoyaltyCommand::Repair { .. } => "Repair",
            RoyaltyCommand::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

/// An active balance reservation
#[derive(Debug, Clone)]
struct Hold {
    wallet: WalletAddress,
    amount: Decimal,
    created_at: Instant,
}

impl Hold {
    fn expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

/// Actor that processes royalty commands
pub struct RoyaltyActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming commands
    mailbox: mpsc::Receiver<RoyaltyCommand>,

    /// Active withdrawal holds. In-memory only: until commit no money has
    /// moved, so a restart merely forgets reservations.
    holds: HashMap<Uuid, Hold>,

    /// Holds older than this are dropped. Covers callers that vanish
    /// between begin and commit/release, e.g. a client disconnect while
    /// the external order is in flight. Must exceed the gateway timeout
    /// so a live withdrawal never loses its hold mid-commit.
    hold_ttl: Duration,

    /// Metrics collector
    metrics: Metrics,
}

impl std::fmt::Debug for RoyaltyActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoyaltyActor")
            .field("active_holds", &self.holds.len())
            .finish_non_exhaustive()
    }
}

impl RoyaltyActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        mailbox: mpsc::Receiver<RoyaltyCommand>,
        metrics: Metrics,
        hold_ttl: Duration,
    ) -> Self {
        Self {
            storage,
            mailbox,
            holds: HashMap::new(),
            hold_ttl,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(cmd) = self.mailbox.recv().await {
            match cmd {
                RoyaltyCommand::Shutdown => break,
                cmd => self.handle_command(cmd),
            }
        }
    }

    /// Handle a single command
    fn handle_command(&mut self, cmd: RoyaltyCommand) {
        match cmd {
            RoyaltyCommand::RegisterArtist {
                wallet,
                artist_name,
                price_per_stream,
                response,
            } => {
                let _ = response.send(self.register_artist(wallet, artist_name, price_per_stream));
            }

            RoyaltyCommand::RegisterTrack {
                wallet,
                title,
                response,
            } => {
                let _ = response.send(self.register_track(wallet, title));
            }

            RoyaltyCommand::SettleStream { report, response } => {
                let timer = std::time::Instant::now();
                let result = self.settle_stream(report);
                self.metrics.settle_duration.observe(timer.elapsed().as_secs_f64());
                let _ = response.send(result);
            }

            RoyaltyCommand::BeginWithdrawal {
                wallet,
                amount,
                response,
            } => {
                let _ = response.send(self.begin_withdrawal(wallet, amount));
            }

            RoyaltyCommand::CommitWithdrawal {
                hold_id,
                order_id,
                withdrawal_token,
                withdrawal_address,
                response,
            } => {
                let _ = response.send(self.commit_withdrawal(
                    hold_id,
                    order_id,
                    withdrawal_token,
                    withdrawal_address,
                ));
            }

            RoyaltyCommand::ReleaseHold { hold_id, response } => {
                // Idempotent: releasing an unknown hold is a no-op
                self.holds.remove(&hold_id);
                let _ = response.send(Ok(()));
            }

            RoyaltyCommand::ResolveWithdrawal {
                entry_id,
                outcome,
                response,
            } => {
                let _ = response.send(self.resolve_withdrawal(entry_id, outcome));
            }

            RoyaltyCommand::GetBalance { wallet, response } => {
                let result = self
                    .storage
                    .get_account(&wallet)
                    .map(|account| BalanceSummary::from(&account));
                let _ = response.send(result);
            }

            RoyaltyCommand::ListEntries {
                wallet,
                limit,
                before,
                response,
            } => {
                let _ = response.send(self.storage.entries_for(&wallet, limit, before));
            }

            RoyaltyCommand::ListStreamEvents {
                wallet,
                limit,
                before,
                response,
            } => {
                let _ = response.send(self.storage.stream_events_for(&wallet, limit, before));
            }

            RoyaltyCommand::ListTrackStreamEvents {
                track_id,
                limit,
                before,
                response,
            } => {
                let _ = response.send(self.storage.stream_events_for_track(track_id, limit, before));
            }

            RoyaltyCommand::ListTracks { wallet, response } => {
                let _ = response.send(self.storage.tracks_for(&wallet));
            }

            RoyaltyCommand::PendingWithdrawals { response } => {
                let _ = response.send(self.storage.pending_withdrawals());
            }

            RoyaltyCommand::Audit { wallet, response } => {
                let _ = response.send(self.audit(&wallet));
            }

            RoyaltyCommand::Repair { wallet, response } => {
                let _ = response.send(self.repair(&wallet));
            }

            RoyaltyCommand::Shutdown => {
                // Handled in main loop
            }
        }
    }

    fn register_artist(
        &self,
        wallet: WalletAddress,
        artist_name: String,
        price_per_stream: Option<Decimal>,
    ) -> Result<ArtistAccount> {
        if wallet.is_empty() {
            return Err(Error::InvalidInput("Wallet address required".to_string()));
        }
        if artist_name.trim().is_empty() {
            return Err(Error::InvalidInput("Artist name required".to_string()));
        }

        let price = price_per_stream.unwrap_or_else(default_price_per_stream);
        if price <= Decimal::ZERO {
            return Err(Error::InvalidInput(
                "Price per stream must be positive".to_string(),
            ));
        }

        if self.storage.account_exists(&wallet)? {
            return Err(Error::InvalidInput(format!(
                "Artist already registered: {}",
                wallet
            )));
        }

        let account = ArtistAccount::new(wallet, artist_name, price);
        self.storage.put_account(&account)?;

        tracing::info!(artist = %account.wallet, "Artist registered");

        Ok(account)
    }

    fn register_track(&self, wallet: WalletAddress, title: String) -> Result<Track> {
        if title.trim().is_empty() {
            return Err(Error::InvalidInput("Track title required".to_string()));
        }
        if !self.storage.account_exists(&wallet)? {
            return Err(Error::ArtistNotFound(wallet.to_string()));
        }

        let track = Track::new(wallet, title);
        self.storage.put_track(&track)?;
        Ok(track)
    }

    /// Decide qualification and apply the settlement atomically.
    ///
    /// Qualifying: `completed && duration_secs >= QUALIFYING_STREAM_SECS`.
    /// Earns the artist's flat per-stream rate; not duration-weighted.
    fn settle_stream(&self, report: StreamReport) -> Result<StreamReceipt> {
        if report.listener_wallet.is_empty() {
            return Err(Error::InvalidInput("Wallet address required".to_string()));
        }

        let mut track = self.storage.get_track(report.track_id)?;
        let mut account = self.storage.get_account(&track.wallet)?;

        if let Some(session_id) = report.session_id {
            if self.storage.session_consumed(session_id)? {
                return Err(Error::DuplicateSession(session_id.to_string()));
            }
        }

        let qualified = report.completed && report.duration_secs >= QUALIFYING_STREAM_SECS;
        let earned = if qualified {
            account.price_per_stream
        } else {
            Decimal::ZERO
        };

        let now = Utc::now();
        let now_nanos = now.timestamp_nanos_opt().unwrap_or(0);

        let event = StreamEvent {
            event_id: Uuid::new_v4(),
            track_id: track.track_id,
            wallet: track.wallet.clone(),
            listener_wallet: report.listener_wallet,
            duration_secs: report.duration_secs,
            completed: report.completed,
            earned_amount: earned,
            timestamp_nanos: now_nanos,
        };

        self.metrics.streams_reported.inc();

        if !qualified {
            // The attempt is still recorded for reporting
            self.storage.append_stream_event(&event, report.session_id)?;
            return Ok(StreamReceipt {
                play_count: track.play_count,
                earned_amount: Decimal::ZERO,
                qualified: false,
                entry_id: None,
            });
        }

        track.play_count += 1;
        account.total_streams += 1;
        account.total_earnings += earned;
        account.available_balance += earned;
        account.updated_at = now;

        let entry = LedgerEntry {
            entry_id: Uuid::now_v7(),
            wallet: track.wallet.clone(),
            amount: earned,
            kind: EntryKind::Stream,
            status: EntryStatus::Completed,
            track_id: Some(track.track_id),
            withdrawal_address: None,
            withdrawal_token: None,
            external_order_id: None,
            note: None,
            timestamp_nanos: now_nanos,
        };

        self.storage
            .apply_settlement(&account, &track, &entry, &event, report.session_id)?;

        self.metrics.streams_settled.inc();
        self.metrics.entries_total.inc();

        Ok(StreamReceipt {
            play_count: track.play_count,
            earned_amount: earned,
            qualified: true,
            entry_id: Some(entry.entry_id),
        })
    }

    fn held_for(&self, wallet: &WalletAddress) -> Decimal {
        self.holds
            .values()
            .filter(|h| &h.wallet == wallet && !h.expired(self.hold_ttl))
            .map(|h| h.amount)
            .sum()
    }

    fn purge_expired_holds(&mut self) {
        let ttl = self.hold_ttl;
        self.holds.retain(|hold_id, hold| {
            if hold.expired(ttl) {
                tracing::warn!(
                    hold_id = %hold_id,
                    artist = %hold.wallet,
                    amount = %hold.amount,
                    "Dropping expired withdrawal hold"
                );
                false
            } else {
                true
            }
        });
    }

    fn begin_withdrawal(&mut self, wallet: WalletAddress, amount: Decimal) -> Result<Uuid> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidInput(
                "Withdrawal amount must be positive".to_string(),
            ));
        }

        self.purge_expired_holds();

        let account = self.storage.get_account(&wallet)?;
        let available = account.available_balance - self.held_for(&wallet);

        if available < amount {
            return Err(Error::InsufficientBalance {
                requested: amount.to_string(),
                available: available.to_string(),
            });
        }

        let hold_id = Uuid::new_v4();
        self.holds.insert(
            hold_id,
            Hold {
                wallet,
                amount,
                created_at: Instant::now(),
            },
        );
        Ok(hold_id)
    }

    fn commit_withdrawal(
        &mut self,
        hold_id: Uuid,
        order_id: String,
        withdrawal_token: String,
        withdrawal_address: String,
    ) -> Result<LedgerEntry> {
        self.purge_expired_holds();

        let hold = self
            .holds
            .remove(&hold_id)
            .ok_or_else(|| Error::HoldNotFound(hold_id.to_string()))?;

        let mut account = self.storage.get_account(&hold.wallet)?;

        let now = Utc::now();
        account.available_balance -= hold.amount;
        account.withdrawn_amount += hold.amount;
        account.updated_at = now;

        let entry = LedgerEntry {
            entry_id: Uuid::now_v7(),
            wallet: hold.wallet.clone(),
            amount: -hold.amount,
            kind: EntryKind::Withdrawal,
            status: EntryStatus::Pending,
            track_id: None,
            withdrawal_address: Some(withdrawal_address),
            withdrawal_token: Some(withdrawal_token.clone()),
            external_order_id: Some(order_id),
            note: Some(format!("Withdrawal to {}", withdrawal_token.to_uppercase())),
            timestamp_nanos: now.timestamp_nanos_opt().unwrap_or(0),
        };

        self.storage.apply_withdrawal(&account, &entry)?;

        self.metrics.withdrawals_initiated.inc();
        self.metrics.entries_total.inc();

        Ok(entry)
    }

    fn resolve_withdrawal(
        &mut self,
        entry_id: Uuid,
        outcome: WithdrawalOutcome,
    ) -> Result<LedgerEntry> {
        let mut entry = self.storage.get_entry(entry_id)?;

        if entry.kind != EntryKind::Withdrawal || entry.status != EntryStatus::Pending {
            return Err(Error::InvalidInput(format!(
                "Entry {} is not a pending withdrawal",
                entry_id
            )));
        }

        match outcome {
            WithdrawalOutcome::Completed => {
                entry.status = EntryStatus::Completed;
                self.storage.apply_resolution(None, &entry)?;
            }
            WithdrawalOutcome::Failed => {
                // Credit the balance back; the entry drops out of all sums
                let mut account = self.storage.get_account(&entry.wallet)?;
                let credit = -entry.amount;
                account.available_balance += credit;
                account.withdrawn_amount -= credit;
                account.updated_at = Utc::now();

                entry.status = EntryStatus::Failed;
                self.storage.apply_resolution(Some(&account), &entry)?;
            }
        }

        self.metrics.withdrawals_resolved.inc();

        tracing::info!(
            entry_id = %entry.entry_id,
            artist = %entry.wallet,
            outcome = ?outcome,
            "Withdrawal resolved"
        );

        Ok(entry)
    }

    fn audit(&self, wallet: &WalletAddress) -> Result<AuditReport> {
        let account = self.storage.get_account(wallet)?;
        let stored = CounterSnapshot {
            total_earnings: account.total_earnings,
            available_balance: account.available_balance,
            withdrawn_amount: account.withdrawn_amount,
            total_streams: account.total_streams,
        };
        let recomputed = self.storage.recompute_counters(wallet)?;
        let consistent = stored == recomputed;

        if !consistent {
            tracing::error!(
                artist = %wallet,
                ?stored,
                ?recomputed,
                "Counter drift detected: counters diverge from the entry log"
            );
        }

        Ok(AuditReport {
            wallet: wallet.clone(),
            stored,
            recomputed,
            consistent,
        })
    }

    fn repair(&self, wallet: &WalletAddress) -> Result<AuditReport> {
        let report = self.audit(wallet)?;

        if !report.consistent {
            let mut account = self.storage.get_account(wallet)?;
            account.total_earnings = report.recomputed.total_earnings;
            account.available_balance = report.recomputed.available_balance;
            account.withdrawn_amount = report.recomputed.withdrawn_amount;
            account.total_streams = report.recomputed.total_streams;
            account.updated_at = Utc::now();
            self.storage.put_account(&account)?;

            tracing::warn!(artist = %wallet, "Counters rewritten from the entry log");
        }

        Ok(report)
    }
}

/// Handle for sending commands to the actor
#[derive(Debug, Clone)]
pub struct RoyaltyHandle {
    sender: mpsc::Sender<RoyaltyCommand>,
}

impl RoyaltyHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<RoyaltyCommand>) -> Self {
        Self { sender }
    }

    async fn send<T>(
        &self,
        cmd: RoyaltyCommand,
        rx: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Register a new artist account
    pub async fn register_artist(
        &self,
        wallet: WalletAddress,
        artist_name: String,
        price_per_stream: Option<Decimal>,
    ) -> Result<ArtistAccount> {
        let (tx, rx) = oneshot::channel();
        self.send(
            RoyaltyCommand::RegisterArtist {
                wallet,
                artist_name,
                price_per_stream,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Register a track for an existing artist
    pub async fn register_track(&self, wallet: WalletAddress, title: String) -> Result<Track> {
        let (tx, rx) = oneshot::channel();
        self.send(
            RoyaltyCommand::RegisterTrack {
                wallet,
                title,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Settle a playback-completion report
    pub async fn settle_stream(&self, report: StreamReport) -> Result<StreamReceipt> {
        let (tx, rx) = oneshot::channel();
        self.send(RoyaltyCommand::SettleStream { report, response: tx }, rx)
            .await
    }

    /// Reserve balance ahead of an external exchange order
    pub async fn begin_withdrawal(&self, wallet: WalletAddress, amount: Decimal) -> Result<Uuid> {
        let (tx, rx) = oneshot::channel();
        self.send(
            RoyaltyCommand::BeginWithdrawal {
                wallet,
                amount,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Debit the reserved balance after the external order succeeded
    pub async fn commit_withdrawal(
        &self,
        hold_id: Uuid,
        order_id: String,
        withdrawal_token: String,
        withdrawal_address: String,
    ) -> Result<LedgerEntry> {
        let (tx, rx) = oneshot::channel();
        self.send(
            RoyaltyCommand::CommitWithdrawal {
                hold_id,
                order_id,
                withdrawal_token,
                withdrawal_address,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Drop a hold without debiting
    pub async fn release_hold(&self, hold_id: Uuid) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(RoyaltyCommand::ReleaseHold { hold_id, response: tx }, rx)
            .await
    }

    /// Transition a pending withdrawal to its terminal status
    pub async fn resolve_withdrawal(
        &self,
        entry_id: Uuid,
        outcome: WithdrawalOutcome,
    ) -> Result<LedgerEntry> {
        let (tx, rx) = oneshot::channel();
        self.send(
            RoyaltyCommand::ResolveWithdrawal {
                entry_id,
                outcome,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Read the materialized balance counters
    pub async fn balance(&self, wallet: WalletAddress) -> Result<BalanceSummary> {
        let (tx, rx) = oneshot::channel();
        self.send(RoyaltyCommand::GetBalance { wallet, response: tx }, rx)
            .await
    }

    /// Ledger entries, most recent first
    pub async fn entries(
        &self,
        wallet: WalletAddress,
        limit: usize,
        before: Option<(i64, Uuid)>,
    ) -> Result<Vec<LedgerEntry>> {
        let (tx, rx) = oneshot::channel();
        self.send(
            RoyaltyCommand::ListEntries {
                wallet,
                limit,
                before,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Stream events for an artist, most recent first
    pub async fn stream_events(
        &self,
        wallet: WalletAddress,
        limit: usize,
        before: Option<(i64, Uuid)>,
    ) -> Result<Vec<StreamEvent>> {
        let (tx, rx) = oneshot::channel();
        self.send(
            RoyaltyCommand::ListStreamEvents {
                wallet,
                limit,
                before,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Stream events for a track, most recent first
    pub async fn track_stream_events(
        &self,
        track_id: Uuid,
        limit: usize,
        before: Option<(i64, Uuid)>,
    ) -> Result<Vec<StreamEvent>> {
        let (tx, rx) = oneshot::channel();
        self.send(
            RoyaltyCommand::ListTrackStreamEvents {
                track_id,
                limit,
                before,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Tracks owned by an artist
    pub async fn tracks(&self, wallet: WalletAddress) -> Result<Vec<Track>> {
        let (tx, rx) = oneshot::channel();
        self.send(RoyaltyCommand::ListTracks { wallet, response: tx }, rx)
            .await
    }

    /// Withdrawal entries awaiting external resolution
    pub async fn pending_withdrawals(&self) -> Result<Vec<LedgerEntry>> {
        let (tx, rx) = oneshot::channel();
        self.send(RoyaltyCommand::PendingWithdrawals { response: tx }, rx)
            .await
    }

    /// Compare stored counters against the entry log
    pub async fn audit(&self, wallet: WalletAddress) -> Result<AuditReport> {
        let (tx, rx) = oneshot::channel();
        self.send(RoyaltyCommand::Audit { wallet, response: tx }, rx)
            .await
    }

    /// Rewrite counters from the entry log
    pub async fn repair(&self, wallet: WalletAddress) -> Result<AuditReport> {
        let (tx, rx) = oneshot::channel();
        self.send(RoyaltyCommand::Repair { wallet, response: tx }, rx)
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(RoyaltyCommand::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the royalty actor
pub fn spawn_royalty_actor(
    storage: Arc<Storage>,
    metrics: Metrics,
    mailbox_capacity: usize,
    hold_ttl: Duration,
) -> RoyaltyHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity);
    let actor = RoyaltyActor::new(storage, rx, metrics, hold_ttl);

    tokio::spawn(async move {
        actor.run().await;
    });

    RoyaltyHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use rust_decimal_macros::dec;

    async fn spawn_actor_with_ttl(hold_ttl: Duration) -> (RoyaltyHandle, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let storage = Arc::new(Storage::open(&config).unwrap());
        let handle = spawn_royalty_actor(storage, Metrics::new().unwrap(), 100, hold_ttl);
        (handle, temp_dir)
    }

    async fn spawn_test_actor() -> (RoyaltyHandle, tempfile::TempDir) {
        spawn_actor_with_ttl(Duration::from_secs(60)).await
    }

    async fn onboard(handle: &RoyaltyHandle) -> (WalletAddress, Track) {
        let wallet = WalletAddress::new("0xartist");
        handle
            .register_artist(wallet.clone(), "artist".to_string(), None)
            .await
            .unwrap();
        let track = handle
            .register_track(wallet.clone(), "song".to_string())
            .await
            .unwrap();
        (wallet, track)
    }

    fn report(track_id: Uuid, duration_secs: u32, completed: bool) -> StreamReport {
        StreamReport {
            track_id,
            listener_wallet: WalletAddress::new("0xlistener"),
            duration_secs,
            completed,
            session_id: None,
        }
    }

    #[tokio::test]
    async fn test_qualifying_stream_earns_flat_rate() {
        let (handle, _temp) = spawn_test_actor().await;
        let (wallet, track) = onboard(&handle).await;

        let receipt = handle
            .settle_stream(report(track.track_id, 30, true))
            .await
            .unwrap();
        assert!(receipt.qualified);
        assert_eq!(receipt.earned_amount, dec!(0.001));
        assert_eq!(receipt.play_count, 1);

        let balance = handle.balance(wallet).await.unwrap();
        assert_eq!(balance.available_balance, dec!(0.001));
        assert_eq!(balance.total_streams, 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_short_stream_earns_nothing() {
        let (handle, _temp) = spawn_test_actor().await;
        let (wallet, track) = onboard(&handle).await;

        let receipt = handle
            .settle_stream(report(track.track_id, 29, true))
            .await
            .unwrap();
        assert!(!receipt.qualified);
        assert_eq!(receipt.earned_amount, Decimal::ZERO);
        assert_eq!(receipt.play_count, 0);

        let balance = handle.balance(wallet.clone()).await.unwrap();
        assert_eq!(balance.available_balance, Decimal::ZERO);

        // The attempt is still visible to reporting
        let events = handle.stream_events(wallet, 10, None).await.unwrap();
        assert_eq!(events.len(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_incomplete_stream_earns_nothing_even_when_long() {
        let (handle, _temp) = spawn_test_actor().await;
        let (wallet, track) = onboard(&handle).await;

        let receipt = handle
            .settle_stream(report(track.track_id, 3600, false))
            .await
            .unwrap();
        assert!(!receipt.qualified);

        let balance = handle.balance(wallet).await.unwrap();
        assert_eq!(balance.total_streams, 0);
        assert_eq!(balance.total_earnings, Decimal::ZERO);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_track_rejected() {
        let (handle, _temp) = spawn_test_actor().await;
        onboard(&handle).await;

        let result = handle.settle_stream(report(Uuid::new_v4(), 45, true)).await;
        assert!(matches!(result, Err(Error::TrackNotFound(_))));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_listener_wallet_rejected() {
        let (handle, _temp) = spawn_test_actor().await;
        let (_, track) = onboard(&handle).await;

        let mut bad = report(track.track_id, 45, true);
        bad.listener_wallet = WalletAddress::new("");
        let result = handle.settle_stream(bad).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_session_settles_once() {
        let (handle, _temp) = spawn_test_actor().await;
        let (wallet, track) = onboard(&handle).await;

        let session = Uuid::new_v4();
        let mut first = report(track.track_id, 45, true);
        first.session_id = Some(session);
        handle.settle_stream(first.clone()).await.unwrap();

        let result = handle.settle_stream(first).await;
        assert!(matches!(result, Err(Error::DuplicateSession(_))));

        let balance = handle.balance(wallet).await.unwrap();
        assert_eq!(balance.total_earnings, dec!(0.001));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_settlements_never_lose_updates() {
        let (handle, _temp) = spawn_test_actor().await;
        let (wallet, track) = onboard(&handle).await;

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let handle = handle.clone();
            let track_id = track.track_id;
            tasks.push(tokio::spawn(async move {
                handle.settle_stream(report(track_id, 45, true)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let balance = handle.balance(wallet).await.unwrap();
        assert_eq!(balance.total_streams, 50);
        assert_eq!(balance.total_earnings, dec!(0.050));
        assert_eq!(balance.available_balance, dec!(0.050));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_withdrawal_hold_protocol() {
        let (handle, _temp) = spawn_test_actor().await;
        let (wallet, track) = onboard(&handle).await;

        for _ in 0..3000 {
            handle
                .settle_stream(report(track.track_id, 45, true))
                .await
                .unwrap();
        }

        // balance: 3.000
        let hold = handle
            .begin_withdrawal(wallet.clone(), dec!(2))
            .await
            .unwrap();

        // The reservation guards against a concurrent second withdrawal
        let second = handle.begin_withdrawal(wallet.clone(), dec!(2)).await;
        assert!(matches!(second, Err(Error::InsufficientBalance { .. })));

        let entry = handle
            .commit_withdrawal(
                hold,
                "ord-123".to_string(),
                "btc".to_string(),
                "bc1qdest".to_string(),
            )
            .await
            .unwrap();
        assert_eq!(entry.amount, dec!(-2));
        assert_eq!(entry.status, EntryStatus::Pending);

        let balance = handle.balance(wallet).await.unwrap();
        assert_eq!(balance.available_balance, dec!(1));
        assert_eq!(balance.withdrawn_amount, dec!(2));
        assert_eq!(balance.total_earnings, dec!(3));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_released_hold_restores_capacity() {
        let (handle, _temp) = spawn_test_actor().await;
        let (wallet, track) = onboard(&handle).await;

        for _ in 0..2000 {
            handle
                .settle_stream(report(track.track_id, 45, true))
                .await
                .unwrap();
        }

        let hold = handle
            .begin_withdrawal(wallet.clone(), dec!(2))
            .await
            .unwrap();
        handle.release_hold(hold).await.unwrap();

        // Nothing moved, and the full balance is reservable again
        let balance = handle.balance(wallet.clone()).await.unwrap();
        assert_eq!(balance.available_balance, dec!(2));
        handle.begin_withdrawal(wallet, dec!(2)).await.unwrap();

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_hold_expires_and_frees_balance() {
        // A caller that begins a withdrawal and then disappears (say the
        // connection dropped mid-order) must not pin the balance forever.
        let (handle, _temp) = spawn_actor_with_ttl(Duration::from_millis(20)).await;
        let (wallet, track) = onboard(&handle).await;

        for _ in 0..2000 {
            handle
                .settle_stream(report(track.track_id, 45, true))
                .await
                .unwrap();
        }

        let stale = handle
            .begin_withdrawal(wallet.clone(), dec!(2))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The lapsed reservation no longer counts against the balance
        let hold = handle
            .begin_withdrawal(wallet.clone(), dec!(2))
            .await
            .unwrap();

        // And the stale hold can no longer be committed
        let result = handle
            .commit_withdrawal(
                stale,
                "ord-stale".to_string(),
                "btc".to_string(),
                "bc1qdest".to_string(),
            )
            .await;
        assert!(matches!(result, Err(Error::HoldNotFound(_))));

        handle
            .commit_withdrawal(
                hold,
                "ord-fresh".to_string(),
                "btc".to_string(),
                "bc1qdest".to_string(),
            )
            .await
            .unwrap();

        let balance = handle.balance(wallet).await.unwrap();
        assert_eq!(balance.available_balance, Decimal::ZERO);
        assert_eq!(balance.withdrawn_amount, dec!(2));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_withdrawal_credits_balance_back() {
        let (handle, _temp) = spawn_test_actor().await;
        let (wallet, track) = onboard(&handle).await;

        for _ in 0..2000 {
            handle
                .settle_stream(report(track.track_id, 45, true))
                .await
                .unwrap();
        }

        let hold = handle
            .begin_withdrawal(wallet.clone(), dec!(1.5))
            .await
            .unwrap();
        let entry = handle
            .commit_withdrawal(hold, "ord-9".to_string(), "eth".to_string(), "0xdest".to_string())
            .await
            .unwrap();

        let resolved = handle
            .resolve_withdrawal(entry.entry_id, WithdrawalOutcome::Failed)
            .await
            .unwrap();
        assert_eq!(resolved.status, EntryStatus::Failed);

        let balance = handle.balance(wallet.clone()).await.unwrap();
        assert_eq!(balance.available_balance, dec!(2));
        assert_eq!(balance.withdrawn_amount, Decimal::ZERO);

        // Counters still match the entry log
        let report = handle.audit(wallet).await.unwrap();
        assert!(report.consistent);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_is_single_shot() {
        let (handle, _temp) = spawn_test_actor().await;
        let (wallet, track) = onboard(&handle).await;

        for _ in 0..1000 {
            handle
                .settle_stream(report(track.track_id, 45, true))
                .await
                .unwrap();
        }

        let hold = handle.begin_withdrawal(wallet, dec!(1)).await.unwrap();
        let entry = handle
            .commit_withdrawal(hold, "ord-1".to_string(), "btc".to_string(), "dest".to_string())
            .await
            .unwrap();

        handle
            .resolve_withdrawal(entry.entry_id, WithdrawalOutcome::Completed)
            .await
            .unwrap();
        let again = handle
            .resolve_withdrawal(entry.entry_id, WithdrawalOutcome::Failed)
            .await;
        assert!(matches!(again, Err(Error::InvalidInput(_))));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_audit_detects_and_repair_fixes_drift() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Arc::new(Storage::open(&config).unwrap());
        let handle = spawn_royalty_actor(
            storage.clone(),
            Metrics::new().unwrap(),
            100,
            Duration::from_secs(60),
        );

        let (wallet, track) = onboard(&handle).await;
        handle
            .settle_stream(report(track.track_id, 45, true))
            .await
            .unwrap();

        // Corrupt the materialized view behind the actor's back
        let mut account = storage.get_account(&wallet).unwrap();
        account.available_balance = dec!(999);
        storage.put_account(&account).unwrap();

        let audit = handle.audit(wallet.clone()).await.unwrap();
        assert!(!audit.consistent);
        assert_eq!(audit.recomputed.available_balance, dec!(0.001));

        handle.repair(wallet.clone()).await.unwrap();
        let audit = handle.audit(wallet).await.unwrap();
        assert!(audit.consistent);

        handle.shutdown().await.unwrap();
    }
}
