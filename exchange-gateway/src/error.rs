//! Gateway error types

use thiserror::Error;

/// Errors the conversion service can produce
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Exchange request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(reqwest::Error),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Invalid response from exchange: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
