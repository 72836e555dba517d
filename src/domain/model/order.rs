use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::model::{
    DeliveryState, LineItemId, LineItemKind, Money, OrderCustomState, OrderId, OrderState,
    ProductId, RentalMarker, SalesChannelId, SubscriptionId, TransactionState,
};

/// 残価買取明細の目印
/// 買取対象のサブスクリプションIDを保持する（ペイロードに無い場合もある）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidualMarker {
    pub subscription_id: Option<SubscriptionId>,
}

/// 注文明細
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    id: LineItemId,
    kind: LineItemKind,
    product_id: Option<ProductId>,
    quantity: i64,
    /// 商品オプションの値（例: "Mieten"）
    options: Vec<String>,
    /// 注文作成時点の在庫数
    recorded_stock: Option<i64>,
    residual_marker: Option<ResidualMarker>,
}

impl LineItem {
    /// 商品明細を作成
    pub fn product(id: LineItemId, product_id: ProductId, quantity: i64) -> Self {
        Self {
            id,
            kind: LineItemKind::Product,
            product_id: Some(product_id),
            quantity,
            options: Vec::new(),
            recorded_stock: None,
            residual_marker: None,
        }
    }

    /// 種別を指定して明細を作成
    pub fn with_kind(id: LineItemId, kind: LineItemKind, quantity: i64) -> Self {
        Self {
            id,
            kind,
            product_id: None,
            quantity,
            options: Vec::new(),
            recorded_stock: None,
            residual_marker: None,
        }
    }

    pub fn with_product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_recorded_stock(mut self, stock: Option<i64>) -> Self {
        self.recorded_stock = stock;
        self
    }

    pub fn with_residual_marker(mut self, marker: ResidualMarker) -> Self {
        self.residual_marker = Some(marker);
        self
    }

    pub fn id(&self) -> LineItemId {
        self.id
    }

    pub fn kind(&self) -> &LineItemKind {
        &self.kind
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn recorded_stock(&self) -> Option<i64> {
        self.recorded_stock
    }

    pub fn residual_marker(&self) -> Option<&ResidualMarker> {
        self.residual_marker.as_ref()
    }

    /// 残価買取明細かどうか
    /// ペイロードの目印、またはホストの明細タイプで判定する
    pub fn is_residual(&self) -> bool {
        self.residual_marker.is_some() || self.kind == LineItemKind::Residual
    }

    /// レンタル明細かどうか
    /// オプションが空でなく、すべてがレンタルオプション名と一致する商品明細
    pub fn is_rental(&self, marker: &RentalMarker) -> bool {
        self.kind == LineItemKind::Product
            && !self.options.is_empty()
            && self.options.iter().all(|option| marker.matches(option))
    }
}

/// 注文ビュー
/// ホストの注文から判定に必要な部分だけを取り出したもの
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    sales_channel_id: Option<SalesChannelId>,
    /// 決済プロバイダー側で紐付いたサブスクリプションID
    subscription_id: Option<SubscriptionId>,
    created_at: DateTime<Utc>,
    state: OrderState,
    delivery_state: Option<DeliveryState>,
    transaction_state: TransactionState,
    line_items: Vec<LineItem>,
    amount_net: Money,
    custom_state: OrderCustomState,
    revision: u32,
}

impl Order {
    /// 新しい注文ビューを作成
    /// 初期ステータスはOpen、決済はOpen
    pub fn new(id: OrderId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            sales_channel_id: None,
            subscription_id: None,
            created_at,
            state: OrderState::Open,
            delivery_state: Some(DeliveryState::Open),
            transaction_state: TransactionState::Open,
            line_items: Vec::new(),
            amount_net: Money::eur(0),
            custom_state: OrderCustomState::default(),
            revision: 0,
        }
    }

    pub fn with_sales_channel(mut self, sales_channel_id: SalesChannelId) -> Self {
        self.sales_channel_id = Some(sales_channel_id);
        self
    }

    pub fn with_subscription(mut self, subscription_id: SubscriptionId) -> Self {
        self.subscription_id = Some(subscription_id);
        self
    }

    pub fn with_line_item(mut self, line_item: LineItem) -> Self {
        self.line_items.push(line_item);
        self
    }

    pub fn with_states(
        mut self,
        state: OrderState,
        delivery_state: Option<DeliveryState>,
        transaction_state: TransactionState,
    ) -> Self {
        self.state = state;
        self.delivery_state = delivery_state;
        self.transaction_state = transaction_state;
        self
    }

    pub fn with_amount_net(mut self, amount_net: Money) -> Self {
        self.amount_net = amount_net;
        self
    }

    /// 永続化済みのカスタム状態とリビジョンを設定
    pub fn with_custom_state(mut self, custom_state: OrderCustomState, revision: u32) -> Self {
        self.custom_state = custom_state;
        self.revision = revision;
        self
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn sales_channel_id(&self) -> Option<SalesChannelId> {
        self.sales_channel_id
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn delivery_state(&self) -> Option<DeliveryState> {
        self.delivery_state
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transaction_state
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn amount_net(&self) -> Money {
        self.amount_net
    }

    pub fn custom_state(&self) -> &OrderCustomState {
        &self.custom_state
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// 商品に紐付く明細のみ
    pub fn product_line_items(&self) -> impl Iterator<Item = &LineItem> {
        self.line_items
            .iter()
            .filter(|item| item.kind() == &LineItemKind::Product && item.product_id().is_some())
    }

    /// 明細が参照する商品IDの一覧（重複なし、出現順）
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids = Vec::new();
        for id in self.line_items.iter().filter_map(LineItem::product_id) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}
