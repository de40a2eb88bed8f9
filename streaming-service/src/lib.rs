//! TuneRail Streaming Service
//!
//! HTTP surface over the royalty ledger: stream settlement, earnings
//! queries, withdrawals through the exchange gateway and the background
//! reconciler that resolves pending withdrawals.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod reconciler;
pub mod service;

pub use config::ServiceConfig;
pub use errors::StreamingError;
pub use reconciler::WithdrawalReconciler;
pub use service::RoyaltyService;
