use crate::errors::StreamingError;
use crate::models::{
    AnalyticsQuery, EarningsQuery, EarningsResponse, RecordStreamRequest, RegisterArtistRequest,
    RegisterTrackRequest, StreamResponse, WithdrawRequest, WithdrawalsQuery,
};
use crate::service::RoyaltyService;
use actix_web::{web, HttpResponse};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "streaming-service",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Register artist endpoint
pub async fn register_artist(
    service: web::Data<Arc<RoyaltyService>>,
    request: web::Json<RegisterArtistRequest>,
) -> Result<HttpResponse, StreamingError> {
    let account = service.register_artist(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(crate::models::ArtistResponse::from(account)))
}

/// Register track endpoint
pub async fn register_track(
    service: web::Data<Arc<RoyaltyService>>,
    request: web::Json<RegisterTrackRequest>,
) -> Result<HttpResponse, StreamingError> {
    let track = service.register_track(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(crate::models::TrackResponse::from(track)))
}

/// Record stream endpoint
pub async fn record_stream(
    service: web::Data<Arc<RoyaltyService>>,
    request: web::Json<RecordStreamRequest>,
) -> Result<HttpResponse, StreamingError> {
    let receipt = service.record_stream(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(StreamResponse {
        success: true,
        qualified: receipt.qualified,
        play_count: receipt.play_count,
        earned_amount: receipt.earned_amount,
        entry_id: receipt.entry_id,
    }))
}

/// Earnings endpoint: balance summary plus a page of ledger entries
pub async fn get_earnings(
    service: web::Data<Arc<RoyaltyService>>,
    query: web::Query<EarningsQuery>,
) -> Result<HttpResponse, StreamingError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);
    let before = match (query.before, query.before_id) {
        (Some(ts), Some(id)) => Some((ts, id)),
        (None, None) => None,
        _ => {
            return Err(StreamingError::Validation(
                "before and before_id must be supplied together".to_string(),
            ))
        }
    };
    let (balance, entries) = service.earnings(&query.wallet, limit, before).await?;

    Ok(HttpResponse::Ok().json(EarningsResponse {
        wallet: query.wallet.clone(),
        balance,
        entries,
    }))
}

/// Withdraw endpoint
pub async fn withdraw(
    service: web::Data<Arc<RoyaltyService>>,
    request: web::Json<WithdrawRequest>,
) -> Result<HttpResponse, StreamingError> {
    let response = service.withdraw(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Withdrawal history, or external order status when `order_id` is given
pub async fn get_withdrawals(
    service: web::Data<Arc<RoyaltyService>>,
    query: web::Query<WithdrawalsQuery>,
) -> Result<HttpResponse, StreamingError> {
    if let Some(order_id) = &query.order_id {
        let order = service.withdrawal_status(order_id).await?;
        return Ok(HttpResponse::Ok().json(json!({ "order": order })));
    }

    let Some(wallet) = &query.wallet else {
        return Err(StreamingError::Validation(
            "Either wallet or order_id is required".to_string(),
        ));
    };

    let withdrawals = service.withdrawals(wallet, MAX_PAGE_SIZE).await?;
    Ok(HttpResponse::Ok().json(json!({
        "wallet": wallet,
        "withdrawals": withdrawals
    })))
}

/// Analytics endpoint
pub async fn get_analytics(
    service: web::Data<Arc<RoyaltyService>>,
    query: web::Query<AnalyticsQuery>,
) -> Result<HttpResponse, StreamingError> {
    let view = service.analytics(query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Counter-vs-ledger audit endpoint
pub async fn audit_artist(
    service: web::Data<Arc<RoyaltyService>>,
    wallet: web::Path<String>,
) -> Result<HttpResponse, StreamingError> {
    let report = service.audit(&wallet).await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint(service: web::Data<Arc<RoyaltyService>>) -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = service.ledger().metrics().registry().gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Failed to gather metrics",
            "details": e.to_string()
        })),
    }
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/artists", web::post().to(register_artist))
            .route("/artists/{wallet}/audit", web::get().to(audit_artist))
            .route("/tracks", web::post().to(register_track))
            .route("/streams", web::post().to(record_stream))
            .route("/earnings", web::get().to(get_earnings))
            .route("/withdrawals", web::post().to(withdraw))
            .route("/withdrawals", web::get().to(get_withdrawals))
            .route("/analytics", web::get().to(get_analytics)),
    )
    .route("/metrics", web::get().to(metrics_endpoint))
    .route("/health", web::get().to(health_check));
}
