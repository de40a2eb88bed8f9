//! HTTP client for the conversion service REST API

use crate::error::{GatewayError, Result};
use crate::{ExchangeGateway, Order, OrderParams, OrderStatus, Quote};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Gateway connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// API base URL, e.g. `https://api.exchange.example/v2`
    pub api_base: String,

    /// Private API secret, sent on every request when set
    pub api_secret: Option<String>,

    /// Affiliate id the platform earns commission under
    pub affiliate_id: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_secret: None,
            affiliate_id: None,
            timeout_secs: 30,
        }
    }
}

/// REST client for the conversion service
pub struct HttpExchangeGateway {
    config: GatewayConfig,
    http_client: Client,
}

impl std::fmt::Debug for HttpExchangeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExchangeGateway")
            .field("api_base", &self.config.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRequest<'a> {
    deposit_coin: &'a str,
    settle_coin: &'a str,
    settle_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    affiliate_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    id: String,
    deposit_coin: String,
    settle_coin: String,
    rate: Decimal,
    deposit_amount: Decimal,
    settle_amount: Decimal,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FixedOrderRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    quote_id: Option<&'a str>,
    deposit_coin: &'a str,
    settle_coin: &'a str,
    settle_amount: Decimal,
    settle_address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    affiliate_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    id: String,
    deposit_address: String,
    settle_address: String,
    deposit_coin: String,
    settle_coin: String,
    status: OrderStatus,
    created_at: DateTime<Utc>,
}

impl From<OrderResponse> for Order {
    fn from(r: OrderResponse) -> Self {
        Order {
            id: r.id,
            deposit_address: r.deposit_address,
            settle_address: r.settle_address,
            deposit_coin: r.deposit_coin,
            settle_coin: r.settle_coin,
            status: r.status,
            created_at: r.created_at,
        }
    }
}

impl HttpExchangeGateway {
    /// Build a client with the configured per-request timeout
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("Content-Type", "application/json");
        match &self.config.api_secret {
            Some(secret) => builder.header("x-api-secret", secret),
            None => builder,
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, %body, "Exchange returned an error");

        if status == reqwest::StatusCode::NOT_FOUND {
            Err(GatewayError::OrderNotFound(body))
        } else {
            Err(GatewayError::Rejected(format!("{}: {}", status, body)))
        }
    }
}

#[async_trait]
impl ExchangeGateway for HttpExchangeGateway {
    async fn quote(
        &self,
        deposit_coin: &str,
        settle_coin: &str,
        settle_amount: Decimal,
    ) -> Result<Quote> {
        let url = format!("{}/quotes", self.config.api_base);
        let request = QuoteRequest {
            deposit_coin,
            settle_coin,
            settle_amount,
            affiliate_id: self.config.affiliate_id.as_deref(),
        };

        let response = self
            .request(self.http_client.post(&url))
            .json(&request)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let quote: QuoteResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(Quote {
            id: quote.id,
            deposit_coin: quote.deposit_coin,
            settle_coin: quote.settle_coin,
            rate: quote.rate,
            deposit_amount: quote.deposit_amount,
            settle_amount: quote.settle_amount,
            expires_at: quote.expires_at,
        })
    }

    async fn create_order(&self, params: &OrderParams) -> Result<Order> {
        let url = format!("{}/shifts/fixed", self.config.api_base);
        let request = FixedOrderRequest {
            quote_id: params.quote_id.as_deref(),
            deposit_coin: &params.deposit_coin,
            settle_coin: &params.settle_coin,
            settle_amount: params.settle_amount,
            settle_address: &params.settle_address,
            affiliate_id: self.config.affiliate_id.as_deref(),
        };

        let response = self
            .request(self.http_client.post(&url))
            .json(&request)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        info!(order_id = %order.id, settle_coin = %order.settle_coin, "Conversion order created");

        Ok(order.into())
    }

    async fn order_status(&self, order_id: &str) -> Result<Order> {
        let url = format!("{}/shifts/{}", self.config.api_base, order_id);

        let response = self.request(self.http_client.get(&url)).send().await?;
        let response = Self::check_status(response).await?;
        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(order.into())
    }
}
