//! Mock gateway for tests and local development

use crate::error::{GatewayError, Result};
use crate::{ExchangeGateway, Order, OrderParams, OrderStatus, Quote};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// In-memory gateway that simulates the conversion service
pub struct MockExchangeGateway {
    latency_ms: u64,
    success_rate: f64,
    fail_next: AtomicBool,
    orders: Arc<RwLock<HashMap<String, Order>>>,
}

impl std::fmt::Debug for MockExchangeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockExchangeGateway")
            .field("latency_ms", &self.latency_ms)
            .field("success_rate", &self.success_rate)
            .finish_non_exhaustive()
    }
}

impl MockExchangeGateway {
    pub fn new(latency_ms: u64, success_rate: f64) -> Self {
        Self {
            latency_ms,
            success_rate,
            fail_next: AtomicBool::new(false),
            orders: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Zero latency, never fails randomly. The default for tests.
    pub fn deterministic() -> Self {
        Self::new(0, 1.0)
    }

    /// Make exactly the next `create_order` call fail
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Force an order into a given status (drives reconciliation tests)
    pub async fn resolve(&self, order_id: &str, status: OrderStatus) {
        let mut orders = self.orders.write().await;
        if let Some(order) = orders.get_mut(order_id) {
            order.status = status;
            info!(%order_id, %status, "Mock order resolved");
        }
    }

    fn should_succeed(&self) -> bool {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return false;
        }
        if self.success_rate >= 1.0 {
            return true;
        }
        let mut rng = rand::thread_rng();
        rng.gen::<f64>() <= self.success_rate
    }
}

#[async_trait]
impl ExchangeGateway for MockExchangeGateway {
    async fn quote(
        &self,
        deposit_coin: &str,
        settle_coin: &str,
        settle_amount: Decimal,
    ) -> Result<Quote> {
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;

        // Flat 1:1 rate, good enough for anything the tests assert on
        Ok(Quote {
            id: format!("QUOTE-{}", Uuid::new_v4()),
            deposit_coin: deposit_coin.to_string(),
            settle_coin: settle_coin.to_string(),
            rate: Decimal::ONE,
            deposit_amount: settle_amount,
            settle_amount,
            expires_at: Utc::now() + chrono::Duration::minutes(15),
        })
    }

    async fn create_order(&self, params: &OrderParams) -> Result<Order> {
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;

        if !self.should_succeed() {
            warn!("Mock exchange: simulated order rejection");
            return Err(GatewayError::Rejected(
                "Simulated exchange rejection".to_string(),
            ));
        }

        let order = Order {
            id: format!("MOCK-{}", Uuid::new_v4()),
            deposit_address: format!("mockdeposit{}", Uuid::new_v4().simple()),
            settle_address: params.settle_address.clone(),
            deposit_coin: params.deposit_coin.clone(),
            settle_coin: params.settle_coin.clone(),
            status: OrderStatus::Processing,
            created_at: Utc::now(),
        };

        self.orders
            .write()
            .await
            .insert(order.id.clone(), order.clone());

        info!(order_id = %order.id, "Mock exchange: order created");

        Ok(order)
    }

    async fn order_status(&self, order_id: &str) -> Result<Order> {
        tokio::time::sleep(Duration::from_millis(self.latency_ms / 2)).await;

        let orders = self.orders.read().await;
        orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| GatewayError::OrderNotFound(order_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params() -> OrderParams {
        OrderParams {
            quote_id: None,
            deposit_coin: "usdc".to_string(),
            settle_coin: "btc".to_string(),
            settle_amount: dec!(25),
            settle_address: "bc1qdest".to_string(),
        }
    }

    #[tokio::test]
    async fn test_order_lifecycle() {
        let gateway = MockExchangeGateway::deterministic();

        let order = gateway.create_order(&params()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert!(order.id.starts_with("MOCK-"));

        let fetched = gateway.order_status(&order.id).await.unwrap();
        assert_eq!(fetched.id, order.id);

        gateway.resolve(&order.id, OrderStatus::Settled).await;
        let settled = gateway.order_status(&order.id).await.unwrap();
        assert!(settled.status.is_success());
    }

    #[tokio::test]
    async fn test_fail_next_fails_exactly_once() {
        let gateway = MockExchangeGateway::deterministic();
        gateway.fail_next();

        let first = gateway.create_order(&params()).await;
        assert!(matches!(first, Err(GatewayError::Rejected(_))));

        let second = gateway.create_order(&params()).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let gateway = MockExchangeGateway::deterministic();
        let result = gateway.order_status("MOCK-nope").await;
        assert!(matches!(result, Err(GatewayError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn test_quote_is_one_to_one() {
        let gateway = MockExchangeGateway::deterministic();
        let quote = gateway.quote("usdc", "eth", dec!(10)).await.unwrap();
        assert_eq!(quote.deposit_amount, dec!(10));
        assert_eq!(quote.rate, Decimal::ONE);
    }
}
