use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenv::dotenv;
use exchange_gateway::{ExchangeGateway, HttpExchangeGateway, MockExchangeGateway};
use royalty_core::RoyaltyLedger;
use std::sync::Arc;
use std::time::Duration;
use streaming_service::{handlers, RoyaltyService, ServiceConfig, WithdrawalReconciler};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env().expect("Failed to load configuration");
    config.validate().expect("Invalid configuration");

    info!("Starting Streaming Service on port {}", config.port);

    let mut ledger_config = royalty_core::Config::default();
    ledger_config.data_dir = config.data_dir.clone();
    ledger_config.mailbox_capacity = config.mailbox_capacity;
    // A hold must outlive the slowest gateway order it guards
    ledger_config.hold_ttl_secs = ledger_config
        .hold_ttl_secs
        .max(config.gateway_timeout_secs * 2);

    let ledger = RoyaltyLedger::open(&ledger_config).expect("Failed to open royalty ledger");

    let gateway: Arc<dyn ExchangeGateway> = if config.use_mock_gateway() {
        warn!("No exchange API base configured, using the mock gateway");
        Arc::new(MockExchangeGateway::new(50, 1.0))
    } else {
        Arc::new(
            HttpExchangeGateway::new(config.gateway.clone())
                .expect("Failed to build exchange gateway client"),
        )
    };

    let reconciler = WithdrawalReconciler::new(
        ledger.clone(),
        gateway.clone(),
        Duration::from_secs(config.reconcile_interval_secs),
    );
    tokio::spawn(reconciler.run());

    let service = Arc::new(RoyaltyService::new(
        ledger,
        gateway,
        Duration::from_secs(config.gateway_timeout_secs),
    ));

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .app_data(web::Data::new(service.clone()))
            .configure(handlers::configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
