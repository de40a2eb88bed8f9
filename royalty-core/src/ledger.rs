//! High-level royalty ledger API
//!
//! `RoyaltyLedger` wires the storage backend, the single-writer actor and
//! the metrics collector together and exposes the async operations the
//! service layer builds on.

use crate::actor::{spawn_royalty_actor, RoyaltyHandle};
use crate::config::Config;
use crate::metrics::Metrics;
use crate::storage::{Storage, StorageStats};
use crate::types::{
    ArtistAccount, AuditReport, BalanceSummary, LedgerEntry, StreamEvent, StreamReceipt,
    StreamReport, Track, WalletAddress, WithdrawalOutcome,
};
use crate::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// The royalty ledger
#[derive(Debug, Clone)]
pub struct RoyaltyLedger {
    storage: Arc<Storage>,
    actor: RoyaltyHandle,
    metrics: Metrics,
}

impl RoyaltyLedger {
    /// Open the ledger and spawn its writer actor.
    ///
    /// Must run inside a Tokio runtime.
    pub fn open(config: &Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(config)?);
        let metrics = Metrics::new()
            .map_err(|e| crate::Error::Config(format!("Failed to register metrics: {}", e)))?;
        let actor = spawn_royalty_actor(
            storage.clone(),
            metrics.clone(),
            config.mailbox_capacity,
            std::time::Duration::from_secs(config.hold_ttl_secs),
        );

        tracing::info!(data_dir = %config.data_dir.display(), "Royalty ledger opened");

        Ok(Self {
            storage,
            actor,
            metrics,
        })
    }

    /// Register a new artist account
    pub async fn register_artist(
        &self,
        wallet: WalletAddress,
        artist_name: String,
        price_per_stream: Option<Decimal>,
    ) -> Result<ArtistAccount> {
        self.actor
            .register_artist(wallet, artist_name, price_per_stream)
            .await
    }

    /// Register a track for an existing artist
    pub async fn register_track(&self, wallet: WalletAddress, title: String) -> Result<Track> {
        self.actor.register_track(wallet, title).await
    }

    /// Fetch an artist account
    pub fn artist(&self, wallet: &WalletAddress) -> Result<ArtistAccount> {
        self.storage.get_account(wallet)
    }

    /// Settle a playback-completion report
    pub async fn settle_stream(&self, report: StreamReport) -> Result<StreamReceipt> {
        self.actor.settle_stream(report).await
    }

    /// Reserve balance ahead of an external exchange order
    pub async fn begin_withdrawal(&self, wallet: WalletAddress, amount: Decimal) -> Result<Uuid> {
        self.actor.begin_withdrawal(wallet, amount).await
    }

    /// Debit the reserved balance after the external order succeeded
    pub async fn commit_withdrawal(
        &self,
        hold_id: Uuid,
        order_id: String,
        withdrawal_token: String,
        withdrawal_address: String,
    ) -> Result<LedgerEntry> {
        self.actor
            .commit_withdrawal(hold_id, order_id, withdrawal_token, withdrawal_address)
            .await
    }

    /// Drop a hold without debiting (external order failed)
    pub async fn release_hold(&self, hold_id: Uuid) -> Result<()> {
        self.actor.release_hold(hold_id).await
    }

    /// Transition a pending withdrawal to its terminal status
    pub async fn resolve_withdrawal(
        &self,
        entry_id: Uuid,
        outcome: WithdrawalOutcome,
    ) -> Result<LedgerEntry> {
        self.actor.resolve_withdrawal(entry_id, outcome).await
    }

    /// Read the materialized balance counters
    pub async fn balance(&self, wallet: WalletAddress) -> Result<BalanceSummary> {
        self.actor.balance(wallet).await
    }

    /// Ledger entries for an artist, most recent first. `before` resumes
    /// strictly after a previous page's oldest entry, identified by its
    /// `(timestamp_nanos, entry_id)` pair.
    pub async fn entries(
        &self,
        wallet: WalletAddress,
        limit: usize,
        before: Option<(i64, Uuid)>,
    ) -> Result<Vec<LedgerEntry>> {
        self.actor.entries(wallet, limit, before).await
    }

    /// Stream events for an artist, most recent first
    pub async fn stream_events(
        &self,
        wallet: WalletAddress,
        limit: usize,
        before: Option<(i64, Uuid)>,
    ) -> Result<Vec<StreamEvent>> {
        self.actor.stream_events(wallet, limit, before).await
    }

    /// Stream events for a track, most recent first
    pub async fn track_stream_events(
        &self,
        track_id: Uuid,
        limit: usize,
        before: Option<(i64, Uuid)>,
    ) -> Result<Vec<StreamEvent>> {
        self.actor.track_stream_events(track_id, limit, before).await
    }

    /// Tracks owned by an artist
    pub async fn tracks(&self, wallet: WalletAddress) -> Result<Vec<Track>> {
        self.actor.tracks(wallet).await
    }

    /// Withdrawal entries awaiting external resolution
    pub async fn pending_withdrawals(&self) -> Result<Vec<LedgerEntry>> {
        self.actor.pending_withdrawals().await
    }

    /// Compare stored counters against the entry log
    pub async fn audit_artist(&self, wallet: WalletAddress) -> Result<AuditReport> {
        self.actor.audit(wallet).await
    }

    /// Rewrite counters from the entry log
    pub async fn repair_artist(&self, wallet: WalletAddress) -> Result<AuditReport> {
        self.actor.repair(wallet).await
    }

    /// Approximate platform-wide record counts
    pub fn platform_stats(&self) -> Result<StorageStats> {
        self.storage.stats()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Shut the writer actor down
    pub async fn shutdown(&self) -> Result<()> {
        self.actor.shutdown().await
    }
}
