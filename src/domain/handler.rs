use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::event::{
    EventMetadata, OrderConverted, OrderTransactionWritten, OrderWritten,
    SubscriptionHistoryWritten, SubscriptionWritten,
};
use crate::domain::event_bus::{EventHandler, HandlerError};
use crate::domain::model::{
    HistoryComment, Order, OrderId, OrderType, Product, ProductId, RentalSettings, StockSnapshot,
    StockUpdate, SubscriptionId,
};
use crate::domain::port::{
    ConfigReader, Logger, OrderRepository, ProductRepository, SubscriptionRepository,
};
use crate::domain::service::{
    is_repeat_delivery, load_rental_settings, plan_completion, plan_renewal_restock,
    plan_stock_refill, reconcile_order, residual_subscription_id, return_borrowed_stock,
    tag_order, OrderReconciliation, ReconciliationItem, StockReturn, TagOutcome,
};

/// 処理済みイベントを追跡する
/// ホストがイベントIDを付けた場合のみ使われる（プロセス内のみ保持）
/// 上限を超えたら古いIDから忘れる
#[derive(Clone)]
pub struct ProcessedEventTracker {
    processed_events: Arc<Mutex<ProcessedEvents>>,
    capacity: usize,
}

#[derive(Default)]
struct ProcessedEvents {
    ids: HashSet<Uuid>,
    order: VecDeque<Uuid>,
}

impl Default for ProcessedEventTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessedEventTracker {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            processed_events: Arc::new(Mutex::new(ProcessedEvents::default())),
            capacity: capacity.max(1),
        }
    }

    /// イベントが既に処理済みかチェック
    pub async fn is_processed(&self, event_id: Option<Uuid>) -> bool {
        let Some(event_id) = event_id else {
            return false;
        };
        let processed = self.processed_events.lock().await;
        processed.ids.contains(&event_id)
    }

    /// イベントを処理済みとしてマーク
    pub async fn mark_processed(&self, event_id: Option<Uuid>) {
        let Some(event_id) = event_id else {
            return;
        };
        let mut processed = self.processed_events.lock().await;
        if !processed.ids.insert(event_id) {
            return;
        }
        processed.order.push_back(event_id);
        while processed.order.len() > self.capacity {
            if let Some(oldest) = processed.order.pop_front() {
                processed.ids.remove(&oldest);
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.processed_events.lock().await.order.len()
    }
}

fn context<const N: usize>(pairs: [(&str, String); N]) -> Option<HashMap<String, String>> {
    Some(
        pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    )
}

fn stock_context(updates: &[StockUpdate]) -> String {
    updates
        .iter()
        .map(|u| {
            format!(
                "{}:{}/{}",
                u.product_id, u.levels.stock, u.levels.available_stock
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// フラグを保存した後の在庫書き込み
///
/// 別タスクで実行するので、ハンドラーがタイムアウトで中断されても書き込みは最後まで行われ、
/// 失敗はその場でログに残る。
async fn write_flagged_stock(
    product_repository: Arc<dyn ProductRepository>,
    logger: Arc<dyn Logger>,
    component: &'static str,
    order_id: OrderId,
    updates: Vec<StockUpdate>,
    correlation_id: Uuid,
) -> Result<(), HandlerError> {
    let task = tokio::spawn(async move {
        let result = product_repository.save_stock_levels(&updates).await;
        if let Err(e) = &result {
            logger.error(
                component,
                "Order flag saved but stock write failed",
                Some(correlation_id),
                context([
                    ("order_id", order_id.to_string()),
                    ("updates", stock_context(&updates)),
                    ("error", e.to_string()),
                ]),
            );
        }
        result
    });

    match task.await {
        Ok(result) => result.map_err(HandlerError::from),
        Err(e) => Err(HandlerError::ProcessingFailed(format!(
            "Stock write task failed: {}",
            e
        ))),
    }
}

/// 初回注文の在庫貸借
/// 注文書き込みと決済更新の両方から呼ばれる
#[derive(Clone)]
pub struct StockBorrowing {
    order_repository: Arc<dyn OrderRepository>,
    product_repository: Arc<dyn ProductRepository>,
    logger: Arc<dyn Logger>,
}

impl StockBorrowing {
    const COMPONENT: &'static str = "StockBorrowing";

    pub fn new(
        order_repository: Arc<dyn OrderRepository>,
        product_repository: Arc<dyn ProductRepository>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            order_repository,
            product_repository,
            logger,
        }
    }

    /// 決済済みの初回（または未分類の）注文について在庫を借りる
    ///
    /// カスタム状態を条件付きで保存できた場合のみ在庫を書き込む。
    /// 戻り値は在庫を書き込んだかどうか。
    pub async fn borrow_for_order(
        &self,
        order: &Order,
        correlation_id: Uuid,
    ) -> Result<bool, HandlerError> {
        if !order.transaction_state().is_settled() {
            self.logger.debug(
                Self::COMPONENT,
                "Order not paid yet, skipping stock borrowing",
                Some(correlation_id),
                context([
                    ("order_id", order.id().to_string()),
                    ("transaction_state", order.transaction_state().as_str().to_string()),
                ]),
            );
            return Ok(false);
        }

        if !matches!(
            order.custom_state().order_type(),
            None | Some(OrderType::Initial)
        ) {
            return Ok(false);
        }

        let items = self.reconciliation_items(order).await?;
        let result = reconcile_order(order.custom_state(), &items, Utc::now())?;

        let (state, updates) = match result {
            OrderReconciliation::AlreadyReconciled => {
                self.logger.debug(
                    Self::COMPONENT,
                    "Stock was already reconciled",
                    Some(correlation_id),
                    context([("order_id", order.id().to_string())]),
                );
                return Ok(false);
            }
            OrderReconciliation::Rejected {
                line_item_id,
                reason,
            } => {
                self.logger.warn(
                    Self::COMPONENT,
                    "Stock borrowing rejected, order left untouched",
                    Some(correlation_id),
                    context([
                        ("order_id", order.id().to_string()),
                        ("line_item_id", line_item_id.to_string()),
                        ("reason", format!("{:?}", reason)),
                    ]),
                );
                return Ok(false);
            }
            OrderReconciliation::NothingToBorrow { state } => (state, Vec::new()),
            OrderReconciliation::Borrowed { state, updates } => (state, updates),
        };

        let saved = self
            .order_repository
            .save_custom_state(order.id(), &state, order.revision())
            .await?;
        if !saved {
            self.logger.warn(
                Self::COMPONENT,
                "Order was modified concurrently, stock left untouched",
                Some(correlation_id),
                context([
                    ("order_id", order.id().to_string()),
                    ("expected_revision", order.revision().to_string()),
                ]),
            );
            return Ok(false);
        }

        if updates.is_empty() {
            self.logger.info(
                Self::COMPONENT,
                "No stock borrowing needed",
                Some(correlation_id),
                context([("order_id", order.id().to_string())]),
            );
            return Ok(false);
        }

        write_flagged_stock(
            self.product_repository.clone(),
            self.logger.clone(),
            Self::COMPONENT,
            order.id(),
            updates.clone(),
            correlation_id,
        )
        .await?;

        self.logger.info(
            Self::COMPONENT,
            "Stock borrowed from buy variants",
            Some(correlation_id),
            context([
                ("order_id", order.id().to_string()),
                ("borrowed_lines", state.borrow_audit().len().to_string()),
                ("updates", stock_context(&updates)),
            ]),
        );

        Ok(true)
    }

    /// サブスクリプション商品の明細ごとに判定対象を作る
    /// 通常商品の明細と商品が見つからない明細は対象外
    async fn reconciliation_items(
        &self,
        order: &Order,
    ) -> Result<Vec<ReconciliationItem>, HandlerError> {
        let products = self
            .product_repository
            .find_by_ids(&order.product_ids())
            .await?;

        let donor_ids: Vec<ProductId> = products
            .iter()
            .filter_map(|p| p.borrow_relation())
            .map(|relation| relation.borrow_from_product_id)
            .collect();
        let donors = if donor_ids.is_empty() {
            Vec::new()
        } else {
            self.product_repository.find_by_ids(&donor_ids).await?
        };

        let find = |list: &[Product], id: ProductId| list.iter().find(|p| p.id() == id).cloned();

        Ok(order
            .product_line_items()
            .filter_map(|item| {
                let recipient = find(&products, item.product_id()?)?;
                if !recipient.is_subscription_enabled() {
                    return None;
                }
                let donor = recipient
                    .borrow_relation()
                    .and_then(|relation| find(&donors, relation.borrow_from_product_id));
                Some(ReconciliationItem {
                    snapshot: StockSnapshot::capture(item, &recipient),
                    recipient,
                    donor,
                })
            })
            .collect())
    }
}

/// 注文タグ付けハンドラー
/// OrderWrittenイベントを受信して注文種別を記録し、残価買取ならサブスクリプションを解約する
pub struct OrderTaggingHandler {
    order_repository: Arc<dyn OrderRepository>,
    subscription_repository: Arc<dyn SubscriptionRepository>,
    config_reader: Arc<dyn ConfigReader>,
    stock_borrowing: StockBorrowing,
    processed_events: ProcessedEventTracker,
    logger: Arc<dyn Logger>,
}

impl OrderTaggingHandler {
    const COMPONENT: &'static str = "OrderTaggingHandler";

    pub fn new(
        order_repository: Arc<dyn OrderRepository>,
        subscription_repository: Arc<dyn SubscriptionRepository>,
        config_reader: Arc<dyn ConfigReader>,
        stock_borrowing: StockBorrowing,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            order_repository,
            subscription_repository,
            config_reader,
            stock_borrowing,
            processed_events: ProcessedEventTracker::new(),
            logger,
        }
    }

    async fn tag(
        &self,
        order: &Order,
        settings: &RentalSettings,
        correlation_id: Uuid,
    ) -> Result<(), HandlerError> {
        let has_residual = order.line_items().iter().any(|item| item.is_residual());
        let count = match order.subscription_id() {
            Some(subscription_id) => {
                self.order_repository
                    .count_by_subscription_id(subscription_id)
                    .await?
            }
            None if has_residual => 0,
            None => {
                self.logger.debug(
                    Self::COMPONENT,
                    "Order has no subscription, skipping tagging",
                    Some(correlation_id),
                    context([("order_id", order.id().to_string())]),
                );
                return Ok(());
            }
        };

        match tag_order(order, count, &settings.rental_marker) {
            TagOutcome::Tagged {
                order_type,
                subscription_id,
                state,
            } => {
                let saved = self
                    .order_repository
                    .save_custom_state(order.id(), &state, order.revision())
                    .await?;
                let message = if saved {
                    "Order tagged"
                } else {
                    "Order was modified concurrently, tag not written"
                };
                self.logger.info(
                    Self::COMPONENT,
                    message,
                    Some(correlation_id),
                    context([
                        ("order_id", order.id().to_string()),
                        ("order_type", order_type.to_string()),
                        (
                            "subscription_id",
                            subscription_id.map(|id| id.to_string()).unwrap_or_default(),
                        ),
                        ("existing_order_count", count.to_string()),
                    ]),
                );
            }
            TagOutcome::AlreadyTagged(order_type) => {
                self.logger.debug(
                    Self::COMPONENT,
                    "Order already tagged",
                    Some(correlation_id),
                    context([
                        ("order_id", order.id().to_string()),
                        ("order_type", order_type.to_string()),
                    ]),
                );
            }
            TagOutcome::NotApplicable => {}
        }

        Ok(())
    }

    /// 残価買取の注文なら元のサブスクリプションを解約して印を付ける
    async fn cancel_residual_subscription(
        &self,
        order: &Order,
        correlation_id: Uuid,
    ) -> Result<(), HandlerError> {
        if !order.line_items().iter().any(|item| item.is_residual()) {
            return Ok(());
        }

        let Some(subscription_id) = residual_subscription_id(order) else {
            self.logger.warn(
                Self::COMPONENT,
                "Residual order does not reference a subscription",
                Some(correlation_id),
                context([("order_id", order.id().to_string())]),
            );
            return Ok(());
        };

        let Some(mut subscription) = self
            .subscription_repository
            .find_by_id(subscription_id)
            .await?
        else {
            self.logger.warn(
                Self::COMPONENT,
                "Subscription for residual order not found",
                Some(correlation_id),
                context([
                    ("order_id", order.id().to_string()),
                    ("subscription_id", subscription_id.to_string()),
                ]),
            );
            return Ok(());
        };

        if !subscription.is_cancelable() {
            return Ok(());
        }

        self.subscription_repository.cancel(subscription_id).await?;
        if subscription.metadata_mut().stamp_residual_purchase(Utc::now()) {
            self.subscription_repository
                .save_metadata(subscription_id, subscription.metadata())
                .await?;
        }

        self.logger.info(
            Self::COMPONENT,
            "Subscription cancelled after residual purchase",
            Some(correlation_id),
            context([
                ("order_id", order.id().to_string()),
                ("subscription_id", subscription_id.to_string()),
            ]),
        );

        Ok(())
    }
}

#[async_trait]
impl EventHandler<OrderWritten> for OrderTaggingHandler {
    async fn handle(&self, event: OrderWritten) -> Result<(), HandlerError> {
        let EventMetadata {
            event_id,
            correlation_id,
            ..
        } = event.metadata;

        if self.processed_events.is_processed(event_id).await {
            self.logger.debug(
                Self::COMPONENT,
                "Event already processed, skipping",
                Some(correlation_id),
                context([("order_id", event.order_id.to_string())]),
            );
            return Ok(());
        }

        let Some(order) = self.order_repository.find_by_id(event.order_id).await? else {
            self.logger.warn(
                Self::COMPONENT,
                "Order not found",
                Some(correlation_id),
                context([("order_id", event.order_id.to_string())]),
            );
            return Ok(());
        };

        let settings = load_rental_settings(
            self.config_reader.as_ref(),
            order.sales_channel_id(),
            self.logger.as_ref(),
        )
        .await?;

        self.tag(&order, &settings, correlation_id).await?;
        self.cancel_residual_subscription(&order, correlation_id)
            .await?;

        // タグ付けでリビジョンが変わるため読み直す
        if let Some(order) = self.order_repository.find_by_id(event.order_id).await? {
            self.stock_borrowing
                .borrow_for_order(&order, correlation_id)
                .await?;
        }

        self.processed_events.mark_processed(event_id).await;
        Ok(())
    }
}

/// 決済更新ハンドラー
/// 初回注文は在庫を借り、更新・残価買取注文は完了まで状態を進める
pub struct OrderTransactionHandler {
    order_repository: Arc<dyn OrderRepository>,
    product_repository: Arc<dyn ProductRepository>,
    stock_borrowing: StockBorrowing,
    processed_events: ProcessedEventTracker,
    logger: Arc<dyn Logger>,
}

impl OrderTransactionHandler {
    const COMPONENT: &'static str = "OrderTransactionHandler";

    pub fn new(
        order_repository: Arc<dyn OrderRepository>,
        product_repository: Arc<dyn ProductRepository>,
        stock_borrowing: StockBorrowing,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            order_repository,
            product_repository,
            stock_borrowing,
            processed_events: ProcessedEventTracker::new(),
            logger,
        }
    }

    async fn complete(&self, order: &Order, correlation_id: Uuid) -> Result<(), HandlerError> {
        let plan = plan_completion(order.state(), order.delivery_state());
        if plan.is_empty() {
            return Ok(());
        }

        self.order_repository
            .save_states(order.id(), plan.final_order_state, plan.final_delivery_state)
            .await?;

        self.logger.info(
            Self::COMPONENT,
            "Order completed",
            Some(correlation_id),
            context([
                ("order_id", order.id().to_string()),
                ("transitions", format!("{:?}", plan.transitions)),
            ]),
        );

        if plan.crosses_completion_edge {
            self.return_stock(order.id(), correlation_id).await?;
        }

        Ok(())
    }

    async fn return_stock(&self, order_id: OrderId, correlation_id: Uuid) -> Result<(), HandlerError> {
        let Some(order) = self.order_repository.find_by_id(order_id).await? else {
            return Ok(());
        };
        let products = self
            .product_repository
            .find_by_ids(&order.product_ids())
            .await?;

        let StockReturn::Return { state, updates } =
            return_borrowed_stock(&order, &products, Utc::now())?
        else {
            self.logger.debug(
                Self::COMPONENT,
                "Stock already returned",
                Some(correlation_id),
                context([("order_id", order_id.to_string())]),
            );
            return Ok(());
        };

        let saved = self
            .order_repository
            .save_custom_state(order_id, &state, order.revision())
            .await?;
        if !saved {
            self.logger.warn(
                Self::COMPONENT,
                "Order was modified concurrently, stock return skipped",
                Some(correlation_id),
                context([("order_id", order_id.to_string())]),
            );
            return Ok(());
        }

        if !updates.is_empty() {
            write_flagged_stock(
                self.product_repository.clone(),
                self.logger.clone(),
                Self::COMPONENT,
                order_id,
                updates.clone(),
                correlation_id,
            )
            .await?;
        }

        self.logger.info(
            Self::COMPONENT,
            "Available stock returned",
            Some(correlation_id),
            context([
                ("order_id", order_id.to_string()),
                ("updates", stock_context(&updates)),
            ]),
        );

        Ok(())
    }
}

#[async_trait]
impl EventHandler<OrderTransactionWritten> for OrderTransactionHandler {
    async fn handle(&self, event: OrderTransactionWritten) -> Result<(), HandlerError> {
        let EventMetadata {
            event_id,
            correlation_id,
            ..
        } = event.metadata;
        let start_time = std::time::Instant::now();

        if self.processed_events.is_processed(event_id).await {
            return Ok(());
        }

        // ペイロードの状態は信用せず注文を読み直す
        let Some(order) = self.order_repository.find_by_id(event.order_id).await? else {
            self.logger.warn(
                Self::COMPONENT,
                "Order not found",
                Some(correlation_id),
                context([("order_id", event.order_id.to_string())]),
            );
            return Ok(());
        };

        if !order.transaction_state().is_settled() {
            self.logger.debug(
                Self::COMPONENT,
                "Transaction not settled, skipping",
                Some(correlation_id),
                context([
                    ("order_id", order.id().to_string()),
                    ("transaction_state", order.transaction_state().as_str().to_string()),
                    (
                        "reported_state",
                        event
                            .reported_state
                            .map(|s| s.as_str().to_string())
                            .unwrap_or_default(),
                    ),
                ]),
            );
            return Ok(());
        }

        match order.custom_state().order_type() {
            None | Some(OrderType::Initial) => {
                self.stock_borrowing
                    .borrow_for_order(&order, correlation_id)
                    .await?;
            }
            Some(OrderType::Renewal) | Some(OrderType::Residual) => {
                self.complete(&order, correlation_id).await?;
            }
        }

        self.processed_events.mark_processed(event_id).await;

        self.logger.debug(
            Self::COMPONENT,
            "OrderTransactionWritten event processed",
            Some(correlation_id),
            context([
                ("order_id", order.id().to_string()),
                (
                    "execution_time_ms",
                    start_time.elapsed().as_millis().to_string(),
                ),
            ]),
        );
        Ok(())
    }
}

/// サブスクリプションの初回注文（作成日時が最も古い注文）を取得する
async fn initial_order(
    order_repository: &dyn OrderRepository,
    subscription_id: SubscriptionId,
) -> Result<Option<Order>, HandlerError> {
    Ok(order_repository
        .find_by_subscription_id(subscription_id)
        .await?
        .into_iter()
        .next())
}

/// 更新注文の在庫補充ハンドラー
/// OrderConvertedイベントを受信し、決済プロバイダーが明細を落とさないよう在庫を補充する
pub struct RenewalStockRefillHandler {
    order_repository: Arc<dyn OrderRepository>,
    product_repository: Arc<dyn ProductRepository>,
    subscription_repository: Arc<dyn SubscriptionRepository>,
    config_reader: Arc<dyn ConfigReader>,
    processed_events: ProcessedEventTracker,
    logger: Arc<dyn Logger>,
}

impl RenewalStockRefillHandler {
    const COMPONENT: &'static str = "RenewalStockRefillHandler";

    pub fn new(
        order_repository: Arc<dyn OrderRepository>,
        product_repository: Arc<dyn ProductRepository>,
        subscription_repository: Arc<dyn SubscriptionRepository>,
        config_reader: Arc<dyn ConfigReader>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            order_repository,
            product_repository,
            subscription_repository,
            config_reader,
            processed_events: ProcessedEventTracker::new(),
            logger,
        }
    }
}

#[async_trait]
impl EventHandler<OrderConverted> for RenewalStockRefillHandler {
    async fn handle(&self, event: OrderConverted) -> Result<(), HandlerError> {
        let EventMetadata {
            event_id,
            correlation_id,
            ..
        } = event.metadata;

        let Some(subscription_id) = event.subscription_id else {
            return Ok(());
        };

        if self.processed_events.is_processed(event_id).await {
            return Ok(());
        }

        let Some(initial) = initial_order(self.order_repository.as_ref(), subscription_id).await?
        else {
            self.logger.warn(
                Self::COMPONENT,
                "Initial order not found",
                Some(correlation_id),
                context([("subscription_id", subscription_id.to_string())]),
            );
            return Ok(());
        };

        let settings = load_rental_settings(
            self.config_reader.as_ref(),
            initial.sales_channel_id(),
            self.logger.as_ref(),
        )
        .await?;

        let latest = self
            .subscription_repository
            .latest_history_entry(subscription_id)
            .await?;
        if is_repeat_delivery(
            latest.as_ref(),
            Utc::now(),
            settings.duplicate_event_threshold(),
        ) {
            self.logger.debug(
                Self::COMPONENT,
                "Repeat delivery detected, skipping stock refill",
                Some(correlation_id),
                context([("subscription_id", subscription_id.to_string())]),
            );
            self.processed_events.mark_processed(event_id).await;
            return Ok(());
        }

        let products = self
            .product_repository
            .find_by_ids(&initial.product_ids())
            .await?;
        let updates = plan_stock_refill(&initial, &products);
        if updates.is_empty() {
            self.processed_events.mark_processed(event_id).await;
            return Ok(());
        }

        let mut state = initial.custom_state().clone();
        state.set_stock_increased(true);
        let saved = self
            .order_repository
            .save_custom_state(initial.id(), &state, initial.revision())
            .await?;
        if !saved {
            self.logger.warn(
                Self::COMPONENT,
                "Initial order was modified concurrently, stock refill skipped",
                Some(correlation_id),
                context([("order_id", initial.id().to_string())]),
            );
            return Ok(());
        }

        write_flagged_stock(
            self.product_repository.clone(),
            self.logger.clone(),
            Self::COMPONENT,
            initial.id(),
            updates.clone(),
            correlation_id,
        )
        .await?;
        self.processed_events.mark_processed(event_id).await;

        self.logger.info(
            Self::COMPONENT,
            "Stock refilled for renewal",
            Some(correlation_id),
            context([
                ("order_id", initial.id().to_string()),
                ("subscription_id", subscription_id.to_string()),
                ("updates", stock_context(&updates)),
            ]),
        );
        Ok(())
    }
}

/// 更新履歴ハンドラー
/// 更新（renewed）の履歴が書かれたとき、更新注文で減った在庫を戻す
pub struct RenewalHistoryHandler {
    order_repository: Arc<dyn OrderRepository>,
    product_repository: Arc<dyn ProductRepository>,
    processed_events: ProcessedEventTracker,
    logger: Arc<dyn Logger>,
}

impl RenewalHistoryHandler {
    const COMPONENT: &'static str = "RenewalHistoryHandler";

    pub fn new(
        order_repository: Arc<dyn OrderRepository>,
        product_repository: Arc<dyn ProductRepository>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            order_repository,
            product_repository,
            processed_events: ProcessedEventTracker::new(),
            logger,
        }
    }
}

#[async_trait]
impl EventHandler<SubscriptionHistoryWritten> for RenewalHistoryHandler {
    async fn handle(&self, event: SubscriptionHistoryWritten) -> Result<(), HandlerError> {
        let EventMetadata {
            event_id,
            correlation_id,
            ..
        } = event.metadata;

        if HistoryComment::from_comment(&event.comment) != HistoryComment::Renewed {
            return Ok(());
        }
        if self.processed_events.is_processed(event_id).await {
            return Ok(());
        }

        let Some(initial) =
            initial_order(self.order_repository.as_ref(), event.subscription_id).await?
        else {
            return Ok(());
        };

        if initial.custom_state().is_renewal_handled(event.history_id) {
            self.logger.debug(
                Self::COMPONENT,
                "Renewal history already handled",
                Some(correlation_id),
                context([
                    ("order_id", initial.id().to_string()),
                    ("history_id", event.history_id.to_string()),
                ]),
            );
            self.processed_events.mark_processed(event_id).await;
            return Ok(());
        }

        let mut state = initial.custom_state().clone();
        state.record_renewal_handled(event.history_id)?;

        // 補充済みの在庫がそのまま更新注文に使われた場合は戻さない
        let refilled = initial.custom_state().stock_increased();
        let updates = if refilled {
            state.set_stock_increased(false);
            Vec::new()
        } else {
            let products = self
                .product_repository
                .find_by_ids(&initial.product_ids())
                .await?;
            plan_renewal_restock(&initial, &products)
        };

        let saved = self
            .order_repository
            .save_custom_state(initial.id(), &state, initial.revision())
            .await?;
        if !saved {
            self.logger.warn(
                Self::COMPONENT,
                "Initial order was modified concurrently, renewal not handled",
                Some(correlation_id),
                context([
                    ("order_id", initial.id().to_string()),
                    ("history_id", event.history_id.to_string()),
                ]),
            );
            return Ok(());
        }

        if !updates.is_empty() {
            write_flagged_stock(
                self.product_repository.clone(),
                self.logger.clone(),
                Self::COMPONENT,
                initial.id(),
                updates.clone(),
                correlation_id,
            )
            .await?;
        }
        self.processed_events.mark_processed(event_id).await;

        self.logger.info(
            Self::COMPONENT,
            if refilled {
                "Stock was refilled before renewal, flag reset"
            } else {
                "Stock restored after renewal"
            },
            Some(correlation_id),
            context([
                ("order_id", initial.id().to_string()),
                ("subscription_id", event.subscription_id.to_string()),
                ("history_id", event.history_id.to_string()),
                ("updates", stock_context(&updates)),
            ]),
        );
        Ok(())
    }
}

/// サブスクリプション有効化ハンドラー
/// 新規作成されたサブスクリプションのメタデータにactiveを設定する
pub struct SubscriptionActivationHandler {
    subscription_repository: Arc<dyn SubscriptionRepository>,
    logger: Arc<dyn Logger>,
}

impl SubscriptionActivationHandler {
    const COMPONENT: &'static str = "SubscriptionActivationHandler";

    pub fn new(
        subscription_repository: Arc<dyn SubscriptionRepository>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            subscription_repository,
            logger,
        }
    }
}

#[async_trait]
impl EventHandler<SubscriptionWritten> for SubscriptionActivationHandler {
    async fn handle(&self, event: SubscriptionWritten) -> Result<(), HandlerError> {
        if !event.created {
            return Ok(());
        }

        let Some(mut subscription) = self
            .subscription_repository
            .find_by_id(event.subscription_id)
            .await?
        else {
            return Ok(());
        };

        if subscription.metadata_mut().activate_if_unset() {
            self.subscription_repository
                .save_metadata(subscription.id(), subscription.metadata())
                .await?;
            self.logger.info(
                Self::COMPONENT,
                "Subscription activated",
                Some(event.metadata.correlation_id),
                context([("subscription_id", event.subscription_id.to_string())]),
            );
        }

        Ok(())
    }
}
