//! Service layer: orchestrates the ledger and the exchange gateway

use crate::errors::{Result, StreamingError};
use crate::models::{
    AnalyticsQuery, AnalyticsView, ArtistAnalytics, DailyStat, PlatformAnalytics,
    RecordStreamRequest, RegisterArtistRequest, RegisterTrackRequest, TrackStat, WithdrawRequest,
    WithdrawResponse,
};
use chrono::{DateTime, Utc};
use exchange_gateway::{ExchangeGateway, Order, OrderParams};
use royalty_core::{
    ArtistAccount, AuditReport, BalanceSummary, EntryKind, LedgerEntry, RoyaltyLedger,
    StreamEvent, StreamReceipt, StreamReport, Track, WalletAddress,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

/// Smallest withdrawable amount in the settlement currency
pub fn min_withdrawal() -> Decimal {
    dec!(1)
}

/// The currency artist balances are denominated in
pub const SETTLEMENT_COIN: &str = "usdc";

/// Longest playback duration a client may report (24 hours)
const MAX_STREAM_DURATION_SECS: u32 = 86_400;

/// Default reporting window for analytics
const DEFAULT_PERIOD_DAYS: u32 = 30;

/// Orchestrates settlements and withdrawals
pub struct RoyaltyService {
    ledger: RoyaltyLedger,
    gateway: Arc<dyn ExchangeGateway>,
    gateway_timeout: Duration,
}

impl std::fmt::Debug for RoyaltyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoyaltyService")
            .field("gateway_timeout", &self.gateway_timeout)
            .finish_non_exhaustive()
    }
}

impl RoyaltyService {
    pub fn new(
        ledger: RoyaltyLedger,
        gateway: Arc<dyn ExchangeGateway>,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            gateway,
            gateway_timeout,
        }
    }

    pub fn ledger(&self) -> &RoyaltyLedger {
        &self.ledger
    }

    pub async fn register_artist(&self, request: RegisterArtistRequest) -> Result<ArtistAccount> {
        request
            .validate()
            .map_err(|e| StreamingError::Validation(e.to_string()))?;

        let account = self
            .ledger
            .register_artist(
                WalletAddress::new(request.wallet_address),
                request.artist_name,
                request.price_per_stream,
            )
            .await?;
        Ok(account)
    }

    pub async fn register_track(&self, request: RegisterTrackRequest) -> Result<Track> {
        request
            .validate()
            .map_err(|e| StreamingError::Validation(e.to_string()))?;

        let track = self
            .ledger
            .register_track(WalletAddress::new(request.wallet_address), request.title)
            .await?;
        Ok(track)
    }

    /// Settle one playback-completion report
    pub async fn record_stream(&self, request: RecordStreamRequest) -> Result<StreamReceipt> {
        request
            .validate()
            .map_err(|e| StreamingError::Validation(e.to_string()))?;

        if request.duration_secs > MAX_STREAM_DURATION_SECS {
            return Err(StreamingError::Validation(format!(
                "Duration {}s exceeds the maximum of {}s",
                request.duration_secs, MAX_STREAM_DURATION_SECS
            )));
        }

        let receipt = self
            .ledger
            .settle_stream(StreamReport {
                track_id: request.track_id,
                listener_wallet: WalletAddress::new(request.wallet_address),
                duration_secs: request.duration_secs,
                completed: request.completed,
                session_id: request.session_id,
            })
            .await?;
        Ok(receipt)
    }

    /// Withdraw balance through the exchange gateway.
    ///
    /// Preconditions check in order, first failure wins: minimum amount,
    /// then balance. The debit is only committed after the external order
    /// is accepted; a gateway failure releases the hold and leaves the
    /// ledger untouched.
    pub async fn withdraw(&self, request: WithdrawRequest) -> Result<WithdrawResponse> {
        request
            .validate()
            .map_err(|e| StreamingError::Validation(e.to_string()))?;

        if request.amount < min_withdrawal() {
            return Err(StreamingError::Validation(format!(
                "Minimum withdrawal is {} {}",
                min_withdrawal(),
                SETTLEMENT_COIN.to_uppercase()
            )));
        }

        let wallet = WalletAddress::new(&request.wallet_address);
        let hold_id = self
            .ledger
            .begin_withdrawal(wallet.clone(), request.amount)
            .await?;

        let params = OrderParams {
            quote_id: None,
            deposit_coin: SETTLEMENT_COIN.to_string(),
            settle_coin: request.withdrawal_token.to_lowercase(),
            settle_amount: request.amount,
            settle_address: request.withdrawal_address.clone(),
        };

        let order = match tokio::time::timeout(
            self.gateway_timeout,
            self.gateway.create_order(&params),
        )
        .await
        {
            Ok(Ok(order)) => order,
            Ok(Err(e)) => {
                warn!(artist = %wallet, error = %e, "Exchange rejected withdrawal order");
                self.release_hold_best_effort(hold_id, &wallet).await;
                return Err(e.into());
            }
            Err(_) => {
                warn!(artist = %wallet, "Exchange order timed out");
                self.release_hold_best_effort(hold_id, &wallet).await;
                return Err(exchange_gateway::GatewayError::Timeout.into());
            }
        };

        let entry = match self
            .ledger
            .commit_withdrawal(
                hold_id,
                order.id.clone(),
                request.withdrawal_token.to_lowercase(),
                request.withdrawal_address,
            )
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                // The external order exists but the ledger has no record of
                // it. Nothing here can compensate automatically; surface it
                // and let an operator follow the order id.
                self.ledger.metrics().consistency_faults.inc();
                error!(
                    artist = %wallet,
                    order_id = %order.id,
                    error = %e,
                    "Consistency fault: external order created but local debit failed"
                );
                return Err(StreamingError::ConsistencyFault(format!(
                    "External order {} created but local debit failed: {}",
                    order.id, e
                )));
            }
        };

        info!(
            artist = %wallet,
            amount = %request.amount,
            order_id = %order.id,
            "Withdrawal committed"
        );

        Ok(WithdrawResponse {
            withdrawal: entry,
            order,
            message: "Withdrawal accepted; conversion in progress".to_string(),
        })
    }

    /// The caller is already returning a gateway error; a release failure
    /// must not replace it. The hold expires on its own if this fails.
    async fn release_hold_best_effort(&self, hold_id: Uuid, wallet: &WalletAddress) {
        if let Err(e) = self.ledger.release_hold(hold_id).await {
            warn!(
                artist = %wallet,
                hold_id = %hold_id,
                error = %e,
                "Failed to release withdrawal hold"
            );
        }
    }

    /// Passthrough status query. Entry transitions stay with the reconciler.
    pub async fn withdrawal_status(&self, order_id: &str) -> Result<Order> {
        let order = self.gateway.order_status(order_id).await?;
        Ok(order)
    }

    /// Withdrawal entries for an artist, most recent first
    pub async fn withdrawals(&self, wallet: &str, limit: usize) -> Result<Vec<LedgerEntry>> {
        let entries = self
            .ledger
            .entries(WalletAddress::new(wallet), limit, None)
            .await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.kind == EntryKind::Withdrawal)
            .collect())
    }

    pub async fn balance(&self, wallet: &str) -> Result<BalanceSummary> {
        let balance = self.ledger.balance(WalletAddress::new(wallet)).await?;
        Ok(balance)
    }

    /// Balance summary plus a page of ledger entries. `before` resumes
    /// strictly after the previous page's oldest entry.
    pub async fn earnings(
        &self,
        wallet: &str,
        limit: usize,
        before: Option<(i64, Uuid)>,
    ) -> Result<(BalanceSummary, Vec<LedgerEntry>)> {
        let wallet = WalletAddress::new(wallet);
        let balance = self.ledger.balance(wallet.clone()).await?;
        let entries = self.ledger.entries(wallet, limit, before).await?;
        Ok((balance, entries))
    }

    pub async fn audit(&self, wallet: &str) -> Result<AuditReport> {
        let report = self.ledger.audit_artist(WalletAddress::new(wallet)).await?;
        Ok(report)
    }

    /// Artist-scoped reporting over a window, or platform totals
    pub async fn analytics(&self, query: AnalyticsQuery) -> Result<AnalyticsView> {
        let period_days = query.period.unwrap_or(DEFAULT_PERIOD_DAYS).max(1);

        let Some(wallet) = query.wallet else {
            let stats = self.ledger.platform_stats()?;
            return Ok(AnalyticsView::Platform(PlatformAnalytics {
                total_artists: stats.total_artists,
                total_tracks: stats.total_tracks,
                total_entries: stats.total_entries,
                total_stream_events: stats.total_stream_events,
                generated_at: Utc::now(),
            }));
        };

        let wallet = WalletAddress::new(wallet);
        let balance = self.ledger.balance(wallet.clone()).await?;

        let cutoff = Utc::now() - chrono::Duration::days(i64::from(period_days));
        let cutoff_nanos = cutoff.timestamp_nanos_opt().unwrap_or(i64::MIN);

        // Events come back most recent first, so stop at the cutoff
        let events: Vec<StreamEvent> = self
            .ledger
            .stream_events(wallet.clone(), ANALYTICS_EVENT_CAP, None)
            .await?
            .into_iter()
            .take_while(|e| e.timestamp_nanos >= cutoff_nanos)
            .collect();

        let mut daily: std::collections::BTreeMap<String, DailyStat> = Default::default();
        let mut period_earnings = Decimal::ZERO;
        let mut period_qualified = 0u64;

        for event in &events {
            let date = DateTime::<Utc>::from_timestamp_nanos(event.timestamp_nanos)
                .format("%Y-%m-%d")
                .to_string();
            let stat = daily.entry(date.clone()).or_insert_with(|| DailyStat {
                date,
                streams: 0,
                qualified_streams: 0,
                earnings: Decimal::ZERO,
            });
            stat.streams += 1;
            if event.earned_amount > Decimal::ZERO {
                stat.qualified_streams += 1;
                stat.earnings += event.earned_amount;
                period_qualified += 1;
                period_earnings += event.earned_amount;
            }
        }

        let mut tracks = self.ledger.tracks(wallet.clone()).await?;
        tracks.sort_by(|a, b| b.play_count.cmp(&a.play_count));
        let top_tracks = tracks
            .into_iter()
            .take(5)
            .map(|t| TrackStat {
                track_id: t.track_id,
                title: t.title,
                play_count: t.play_count,
            })
            .collect();

        Ok(AnalyticsView::Artist(ArtistAnalytics {
            wallet: wallet.to_string(),
            period_days,
            balance,
            period_streams: events.len() as u64,
            period_qualified_streams: period_qualified,
            period_earnings,
            daily: daily.into_values().collect(),
            top_tracks,
        }))
    }
}

/// Upper bound on events pulled into one analytics aggregation
const ANALYTICS_EVENT_CAP: usize = 10_000;

#[cfg(test)]
mod tests {
    use super::*;
    use exchange_gateway::MockExchangeGateway;
    use royalty_core::Config;

    async fn test_service() -> (Arc<RoyaltyService>, Arc<MockExchangeGateway>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let ledger = RoyaltyLedger::open(&config).unwrap();
        let gateway = Arc::new(MockExchangeGateway::deterministic());
        let service = Arc::new(RoyaltyService::new(
            ledger,
            gateway.clone(),
            Duration::from_secs(5),
        ));
        (service, gateway, temp_dir)
    }

    async fn onboard(service: &RoyaltyService) -> (String, Uuid) {
        service
            .register_artist(RegisterArtistRequest {
                wallet_address: "0xartist".to_string(),
                artist_name: "artist".to_string(),
                price_per_stream: None,
            })
            .await
            .unwrap();
        let track = service
            .register_track(RegisterTrackRequest {
                wallet_address: "0xartist".to_string(),
                title: "song".to_string(),
            })
            .await
            .unwrap();
        ("0xartist".to_string(), track.track_id)
    }

    async fn stream_n(service: &RoyaltyService, track_id: Uuid, n: usize) {
        for _ in 0..n {
            service
                .record_stream(RecordStreamRequest {
                    track_id,
                    wallet_address: "0xlistener".to_string(),
                    duration_secs: 45,
                    completed: true,
                    session_id: None,
                })
                .await
                .unwrap();
        }
    }

    fn withdraw_request(amount: Decimal) -> WithdrawRequest {
        WithdrawRequest {
            wallet_address: "0xartist".to_string(),
            amount,
            withdrawal_token: "BTC".to_string(),
            withdrawal_address: "bc1qdest".to_string(),
        }
    }

    #[tokio::test]
    async fn test_below_minimum_rejected_before_balance_check() {
        let (service, _gateway, _temp) = test_service().await;
        let (_wallet, track_id) = onboard(&service).await;
        stream_n(&service, track_id, 10).await;

        // 0.010 available: both preconditions fail, the minimum wins
        let result = service.withdraw(withdraw_request(dec!(0.001))).await;
        assert!(matches!(result, Err(StreamingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_insufficient_balance_leaves_ledger_untouched() {
        let (service, _gateway, _temp) = test_service().await;
        let (wallet, track_id) = onboard(&service).await;
        stream_n(&service, track_id, 10).await;

        let result = service.withdraw(withdraw_request(dec!(1))).await;
        assert!(matches!(
            result,
            Err(StreamingError::InsufficientBalance { .. })
        ));

        let (balance, entries) = service.earnings(&wallet, 100, None).await.unwrap();
        assert_eq!(balance.available_balance, dec!(0.010));
        assert_eq!(entries.len(), 10);
        assert!(entries.iter().all(|e| e.kind == EntryKind::Stream));
    }

    #[tokio::test]
    async fn test_gateway_failure_releases_hold() {
        let (service, gateway, _temp) = test_service().await;
        let (wallet, track_id) = onboard(&service).await;
        stream_n(&service, track_id, 2000).await;

        gateway.fail_next();
        let result = service.withdraw(withdraw_request(dec!(1.5))).await;
        assert!(matches!(result, Err(StreamingError::Exchange(_))));

        // No debit, no entry, and the balance is fully reservable again
        let (balance, entries) = service.earnings(&wallet, 5000, None).await.unwrap();
        assert_eq!(balance.available_balance, dec!(2));
        assert_eq!(entries.len(), 2000);

        let retry = service.withdraw(withdraw_request(dec!(2))).await;
        assert!(retry.is_ok());
    }

    #[tokio::test]
    async fn test_successful_withdrawal_records_pending_entry() {
        let (service, _gateway, _temp) = test_service().await;
        let (wallet, track_id) = onboard(&service).await;
        stream_n(&service, track_id, 2000).await;

        let response = service.withdraw(withdraw_request(dec!(1.5))).await.unwrap();
        assert_eq!(response.withdrawal.amount, dec!(-1.5));
        assert_eq!(
            response.withdrawal.external_order_id.as_deref(),
            Some(response.order.id.as_str())
        );

        let withdrawals = service.withdrawals(&wallet, 100).await.unwrap();
        assert_eq!(withdrawals.len(), 1);

        let balance = service.balance(&wallet).await.unwrap();
        assert_eq!(balance.available_balance, dec!(0.5));
        assert_eq!(balance.withdrawn_amount, dec!(1.5));
    }

    #[tokio::test]
    async fn test_analytics_aggregates_period() {
        let (service, _gateway, _temp) = test_service().await;
        let (wallet, track_id) = onboard(&service).await;
        stream_n(&service, track_id, 5).await;

        // One non-qualifying attempt on top
        service
            .record_stream(RecordStreamRequest {
                track_id,
                wallet_address: "0xlistener".to_string(),
                duration_secs: 10,
                completed: true,
                session_id: None,
            })
            .await
            .unwrap();

        let view = service
            .analytics(AnalyticsQuery {
                wallet: Some(wallet),
                period: Some(7),
            })
            .await
            .unwrap();
        let AnalyticsView::Artist(analytics) = view else {
            panic!("expected artist analytics");
        };

        assert_eq!(analytics.period_streams, 6);
        assert_eq!(analytics.period_qualified_streams, 5);
        assert_eq!(analytics.period_earnings, dec!(0.005));
        assert_eq!(analytics.top_tracks.len(), 1);
        assert_eq!(analytics.top_tracks[0].play_count, 5);
        assert_eq!(analytics.daily.len(), 1);
    }

    #[tokio::test]
    async fn test_platform_analytics_without_wallet() {
        let (service, _gateway, _temp) = test_service().await;
        onboard(&service).await;

        let view = service
            .analytics(AnalyticsQuery {
                wallet: None,
                period: None,
            })
            .await
            .unwrap();
        assert!(matches!(view, AnalyticsView::Platform(_)));
    }

    #[tokio::test]
    async fn test_overlong_duration_rejected() {
        let (service, _gateway, _temp) = test_service().await;
        let (_wallet, track_id) = onboard(&service).await;

        let result = service
            .record_stream(RecordStreamRequest {
                track_id,
                wallet_address: "0xlistener".to_string(),
                duration_secs: 90_000,
                completed: true,
                session_id: None,
            })
            .await;
        assert!(matches!(result, Err(StreamingError::Validation(_))));
    }
}
