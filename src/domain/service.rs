// ドメインサービス
// 判定ロジックは純粋関数として実装し、入出力はすべて引数と戻り値で受け渡す

pub mod availability;
pub mod discount_calculator;
pub mod fulfillment;
pub mod order_classifier;
pub mod renewal_stock;
pub mod residual_purchase;
pub mod settings_loader;
pub mod stock_reconciler;

pub use availability::{
    borrowable_availability, notification_change, Availability, AvailabilityKind,
};
pub use discount_calculator::{
    compute_discount_percentage, rental_discount_definition, PercentageDiscount,
};
pub use fulfillment::{plan_completion, CompletionPlan, Transition};
pub use order_classifier::{
    classify, is_repeat_delivery, residual_subscription_id, tag_order, TagOutcome,
};
pub use renewal_stock::{plan_renewal_restock, plan_stock_refill};
pub use residual_purchase::{
    quote_residual_purchase, ResidualBuyLine, ResidualPurchaseError, ResidualPurchaseQuote,
};
pub use settings_loader::load_rental_settings;
pub use stock_reconciler::{
    plan_borrow, reconcile, reconcile_order, return_borrowed_stock, BorrowPlan, BorrowRejection,
    OrderReconciliation, ReconciliationItem, ReconciliationResult, StockReturn,
};
