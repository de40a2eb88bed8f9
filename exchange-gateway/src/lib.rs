//! TuneRail Exchange Gateway
//!
//! Client for the external conversion service that turns an artist's
//! settlement-currency balance into the token they asked to be paid in.
//! A withdrawal places a fixed-rate order here; the ledger only debits
//! the balance after the order is accepted.
//!
//! `ExchangeGateway` is the seam: `HttpExchangeGateway` speaks the real
//! REST API, `MockExchangeGateway` backs tests and local development.

pub mod error;
pub mod http;
pub mod mock;

pub use error::{GatewayError, Result};
pub use http::{GatewayConfig, HttpExchangeGateway};
pub use mock::MockExchangeGateway;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed-rate quote, valid until `expires_at`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: String,
    pub deposit_coin: String,
    pub settle_coin: String,
    pub rate: Decimal,
    pub deposit_amount: Decimal,
    pub settle_amount: Decimal,
    pub expires_at: DateTime<Utc>,
}

/// Parameters for creating a conversion order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderParams {
    /// Quote to lock the rate against, when one was requested first
    pub quote_id: Option<String>,
    pub deposit_coin: String,
    pub settle_coin: String,
    /// Amount the recipient must receive, in `settle_coin`
    pub settle_amount: Decimal,
    /// Destination address for the converted funds
    pub settle_address: String,
}

/// A conversion order as the exchange reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Address the platform deposits the settlement currency to
    pub deposit_address: String,
    pub settle_address: String,
    pub deposit_coin: String,
    pub settle_coin: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Exchange-side order lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Waiting,
    Processing,
    Settled,
    Failed,
    Refunded,
    Expired,
    /// Statuses the API added after this client shipped
    #[serde(other)]
    Other,
}

impl OrderStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Settled | OrderStatus::Failed | OrderStatus::Refunded | OrderStatus::Expired
        )
    }

    /// The conversion completed and the funds were delivered
    pub fn is_success(&self) -> bool {
        matches!(self, OrderStatus::Settled)
    }

    /// Terminal without delivering: the debit must be credited back
    pub fn is_failure(&self) -> bool {
        self.is_terminal() && !self.is_success()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Waiting => "waiting",
            OrderStatus::Processing => "processing",
            OrderStatus::Settled => "settled",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Expired => "expired",
            OrderStatus::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// The external currency-conversion collaborator
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Request a fixed-rate quote
    async fn quote(
        &self,
        deposit_coin: &str,
        settle_coin: &str,
        settle_amount: Decimal,
    ) -> Result<Quote>;

    /// Create a conversion order
    async fn create_order(&self, params: &OrderParams) -> Result<Order>;

    /// Query an existing order
    async fn order_status(&self, order_id: &str) -> Result<Order>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Settled.is_terminal());
        assert!(OrderStatus::Settled.is_success());
        assert!(!OrderStatus::Settled.is_failure());

        for status in [OrderStatus::Failed, OrderStatus::Refunded, OrderStatus::Expired] {
            assert!(status.is_terminal());
            assert!(status.is_failure());
        }

        for status in [OrderStatus::Waiting, OrderStatus::Processing, OrderStatus::Other] {
            assert!(!status.is_terminal());
            assert!(!status.is_failure());
        }
    }

    #[test]
    fn test_unknown_status_deserializes_to_other() {
        let status: OrderStatus = serde_json::from_str("\"review\"").unwrap();
        assert_eq!(status, OrderStatus::Other);
    }
}
