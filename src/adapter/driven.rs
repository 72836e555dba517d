// 駆動される側アダプター（リポジトリ実装など）

mod event_bus;
mod mysql_config_reader;
mod mysql_order_repository;
mod mysql_product_repository;
mod mysql_subscription_repository;
mod tracing_logger;

pub use event_bus::{EventBusConfig, FailedEvent, InMemoryEventBus};
pub use mysql_config_reader::MySqlConfigReader;
pub use mysql_order_repository::MySqlOrderRepository;
pub use mysql_product_repository::MySqlProductRepository;
pub use mysql_subscription_repository::MySqlSubscriptionRepository;
pub use tracing_logger::TracingLogger;
