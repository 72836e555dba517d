// ドメインモデル（エンティティと値オブジェクト）

mod value_objects;
mod custom_state;
mod order;
mod product;
mod settings;
mod subscription;

pub use value_objects::{
    OrderId, LineItemId, ProductId, SubscriptionId, SalesChannelId,
    Currency, Money,
    DiscountPercentage,
    OrderType,
    OrderState, DeliveryState, TransactionState,
    LineItemKind,
    RentalMarker,
};

pub use custom_state::{BorrowAudit, OrderCustomState};
pub use order::{LineItem, Order, ResidualMarker};
pub use product::{BorrowRelation, Product, StockLevels, StockSnapshot, StockUpdate};
pub use settings::{
    setting_keys, ConfigValue, DiscountTable, RentalSettings, ResidualPurchaseSettings,
};
pub use subscription::{
    HistoryComment, Subscription, SubscriptionHistoryEntry, SubscriptionMetadata,
    RESIDUAL_PURCHASE_STATUS,
};
