use rental_subscription_rules::adapter::driven::{
    InMemoryEventBus, MySqlConfigReader, MySqlOrderRepository, MySqlProductRepository,
    MySqlSubscriptionRepository, TracingLogger,
};
use rental_subscription_rules::adapter::{DatabaseConfig, DatabaseMigration, EngineConfig};
use rental_subscription_rules::domain::handler::{
    OrderTaggingHandler, OrderTransactionHandler, RenewalHistoryHandler,
    RenewalStockRefillHandler, StockBorrowing, SubscriptionActivationHandler,
};
use rental_subscription_rules::domain::port::{
    ConfigReader, EventBus, Logger, OrderRepository, ProductRepository, SubscriptionRepository,
};
use rental_subscription_rules::domain::serialization::EventSerializer;

use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .envファイルから環境変数を読み込む
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rental_subscription_rules=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = DatabaseConfig::from_env()?;
    let engine_config = EngineConfig::from_env()?;
    tracing::info!(host = %config.host, port = config.port, "Database configuration loaded");

    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.connection_string())
        .await?;

    DatabaseMigration::new(pool.clone()).run().await?;

    let logger: Arc<dyn Logger> = Arc::new(TracingLogger::new());
    let order_repository: Arc<dyn OrderRepository> =
        Arc::new(MySqlOrderRepository::new(pool.clone()));
    let product_repository: Arc<dyn ProductRepository> =
        Arc::new(MySqlProductRepository::new(pool.clone()));
    let subscription_repository: Arc<dyn SubscriptionRepository> =
        Arc::new(MySqlSubscriptionRepository::new(pool.clone()));
    let config_reader: Arc<dyn ConfigReader> = Arc::new(MySqlConfigReader::new(
        pool.clone(),
        engine_config.config_namespace.clone(),
    ));

    let event_bus = InMemoryEventBus::new(engine_config.to_event_bus_config(), logger.clone());

    let stock_borrowing = StockBorrowing::new(
        order_repository.clone(),
        product_repository.clone(),
        logger.clone(),
    );

    event_bus
        .subscribe_order_written(OrderTaggingHandler::new(
            order_repository.clone(),
            subscription_repository.clone(),
            config_reader.clone(),
            stock_borrowing.clone(),
            logger.clone(),
        ))
        .await?;
    event_bus
        .subscribe_order_transaction_written(OrderTransactionHandler::new(
            order_repository.clone(),
            product_repository.clone(),
            stock_borrowing,
            logger.clone(),
        ))
        .await?;
    event_bus
        .subscribe_order_converted(RenewalStockRefillHandler::new(
            order_repository.clone(),
            product_repository.clone(),
            subscription_repository.clone(),
            config_reader.clone(),
            logger.clone(),
        ))
        .await?;
    event_bus
        .subscribe_subscription_history_written(RenewalHistoryHandler::new(
            order_repository.clone(),
            product_repository.clone(),
            logger.clone(),
        ))
        .await?;
    event_bus
        .subscribe_subscription_written(SubscriptionActivationHandler::new(
            subscription_repository.clone(),
            logger.clone(),
        ))
        .await?;

    tracing::info!("Event handlers registered, reading events from stdin");

    // 1行に1イベントのJSONエンベロープ
    let serializer = EventSerializer::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut relayed: u64 = 0;
    let mut skipped: u64 = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serializer.deserialize_event(&line) {
            Ok(event) => {
                event_bus.publish(event).await?;
                relayed += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed event line");
                skipped += 1;
            }
        }
    }

    let failed = event_bus.failed_events().await.len();
    tracing::info!(relayed, skipped, failed, "Input closed, shutting down");

    Ok(())
}
