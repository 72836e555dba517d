use serde::{Deserialize, Serialize};

use crate::domain::model::{LineItem, LineItemId, ProductId};

/// 在庫数の組（物理在庫と販売可能在庫）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub stock: i64,
    pub available_stock: i64,
}

impl StockLevels {
    pub fn new(stock: i64, available_stock: i64) -> Self {
        Self {
            stock,
            available_stock,
        }
    }
}

/// 商品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    stock: i64,
    available_stock: i64,
    /// サブスクリプション（レンタル）商品かどうか
    subscription_enabled: bool,
    /// 在庫を借りる先の購入用バリアント
    buy_variant_id: Option<ProductId>,
    /// 入荷通知フォームを隠すフラグ（未設定ならNone）
    stock_notification_inactive: Option<bool>,
}

impl Product {
    /// 通常商品を作成
    pub fn new(id: ProductId, stock: i64, available_stock: i64) -> Self {
        Self {
            id,
            stock,
            available_stock,
            subscription_enabled: false,
            buy_variant_id: None,
            stock_notification_inactive: None,
        }
    }

    /// サブスクリプション商品として設定
    pub fn with_subscription(mut self, buy_variant_id: Option<ProductId>) -> Self {
        self.subscription_enabled = true;
        self.buy_variant_id = buy_variant_id;
        self
    }

    pub fn with_stock_notification(mut self, inactive: Option<bool>) -> Self {
        self.stock_notification_inactive = inactive;
        self
    }

    pub fn id(&self) -> ProductId {
        self.id
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn available_stock(&self) -> i64 {
        self.available_stock
    }

    pub fn is_subscription_enabled(&self) -> bool {
        self.subscription_enabled
    }

    pub fn buy_variant_id(&self) -> Option<ProductId> {
        self.buy_variant_id
    }

    pub fn stock_notification_inactive(&self) -> Option<bool> {
        self.stock_notification_inactive
    }

    pub fn levels(&self) -> StockLevels {
        StockLevels::new(self.stock, self.available_stock)
    }

    /// 在庫数を上書き
    pub fn apply_levels(&mut self, levels: StockLevels) {
        self.stock = levels.stock;
        self.available_stock = levels.available_stock;
    }

    /// 購入用バリアントとの貸借関係
    /// サブスクリプション商品でない、またはバリアントが自分自身を指す場合はNone
    pub fn borrow_relation(&self) -> Option<BorrowRelation> {
        if !self.subscription_enabled {
            return None;
        }
        self.buy_variant_id
            .and_then(|donor| BorrowRelation::new(self.id, donor))
    }
}

/// サブスクリプション商品と購入用バリアントの貸借関係
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRelation {
    pub subscription_product_id: ProductId,
    pub borrow_from_product_id: ProductId,
}

impl BorrowRelation {
    pub fn new(
        subscription_product_id: ProductId,
        borrow_from_product_id: ProductId,
    ) -> Option<Self> {
        if subscription_product_id == borrow_from_product_id {
            return None;
        }
        Some(Self {
            subscription_product_id,
            borrow_from_product_id,
        })
    }
}

/// 明細ごとの在庫スナップショット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub line_item_id: LineItemId,
    pub product_id: ProductId,
    /// 注文作成時点の在庫数
    pub recorded_stock: i64,
    pub quantity: i64,
}

impl StockSnapshot {
    pub fn new(
        line_item_id: LineItemId,
        product_id: ProductId,
        recorded_stock: i64,
        quantity: i64,
    ) -> Self {
        Self {
            line_item_id,
            product_id,
            recorded_stock,
            quantity,
        }
    }

    /// 明細と現在の商品からスナップショットを作る
    /// ペイロードに在庫数が無い場合のみ現在の在庫数を使う
    pub fn capture(line_item: &LineItem, product: &Product) -> Self {
        Self {
            line_item_id: line_item.id(),
            product_id: product.id(),
            recorded_stock: line_item.recorded_stock().unwrap_or(product.stock()),
            quantity: line_item.quantity(),
        }
    }
}

/// 保存する在庫数の更新
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdate {
    pub product_id: ProductId,
    pub levels: StockLevels,
}

impl StockUpdate {
    pub fn new(product_id: ProductId, levels: StockLevels) -> Self {
        Self { product_id, levels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_referencing_relation_is_rejected() {
        let id = ProductId::new();
        assert!(BorrowRelation::new(id, id).is_none());

        let product = Product::new(id, 1, 1).with_subscription(Some(id));
        assert!(product.borrow_relation().is_none());
    }

    #[test]
    fn test_relation_requires_subscription_product() {
        let donor = ProductId::new();
        let mut plain = Product::new(ProductId::new(), 1, 1);
        assert!(plain.borrow_relation().is_none());

        plain = plain.with_subscription(Some(donor));
        let relation = plain.borrow_relation().unwrap();
        assert_eq!(relation.borrow_from_product_id, donor);
    }

    #[test]
    fn test_snapshot_falls_back_to_live_stock_only_when_missing() {
        let product = Product::new(ProductId::new(), 7, 7);
        let missing = LineItem::product(LineItemId::new(), product.id(), 2);
        assert_eq!(StockSnapshot::capture(&missing, &product).recorded_stock, 7);

        let explicit_zero = missing.clone().with_recorded_stock(Some(0));
        assert_eq!(StockSnapshot::capture(&explicit_zero, &product).recorded_stock, 0);
    }
}
