//! Background reconciliation of pending withdrawals
//!
//! A committed withdrawal stays `Pending` until the exchange reports a
//! terminal state for its order. This task polls the gateway and applies
//! the transition: `Settled` completes the entry, any failing terminal
//! state fails it and credits the balance back.

use exchange_gateway::ExchangeGateway;
use royalty_core::{RoyaltyLedger, WithdrawalOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct WithdrawalReconciler {
    ledger: RoyaltyLedger,
    gateway: Arc<dyn ExchangeGateway>,
    interval: Duration,
}

impl std::fmt::Debug for WithdrawalReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WithdrawalReconciler")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl WithdrawalReconciler {
    pub fn new(
        ledger: RoyaltyLedger,
        gateway: Arc<dyn ExchangeGateway>,
        interval: Duration,
    ) -> Self {
        Self {
            ledger,
            gateway,
            interval,
        }
    }

    /// Run the reconciliation loop forever
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "Withdrawal reconciler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match self.reconcile_once().await {
                Ok(0) => {}
                Ok(resolved) => info!(resolved, "Reconciliation pass resolved withdrawals"),
                Err(e) => warn!(error = %e, "Reconciliation pass failed"),
            }
        }
    }

    /// One reconciliation pass. Returns the number of entries resolved.
    pub async fn reconcile_once(&self) -> royalty_core::Result<usize> {
        let pending = self.ledger.pending_withdrawals().await?;
        let mut resolved = 0;

        for entry in pending {
            let Some(order_id) = entry.external_order_id.as_deref() else {
                warn!(entry_id = %entry.entry_id, "Pending withdrawal has no order id");
                continue;
            };

            let order = match self.gateway.order_status(order_id).await {
                Ok(order) => order,
                Err(e) => {
                    // Transient gateway trouble; the next pass retries
                    warn!(entry_id = %entry.entry_id, %order_id, error = %e, "Order status query failed");
                    continue;
                }
            };

            let outcome = if order.status.is_success() {
                WithdrawalOutcome::Completed
            } else if order.status.is_failure() {
                WithdrawalOutcome::Failed
            } else {
                continue;
            };

            self.ledger
                .resolve_withdrawal(entry.entry_id, outcome)
                .await?;
            resolved += 1;

            info!(
                entry_id = %entry.entry_id,
                %order_id,
                status = %order.status,
                "Pending withdrawal reconciled"
            );
        }

        Ok(resolved)
    }
}
