use crate::application::ApplicationError;
use crate::domain::model::{
    LineItem, OrderId, Product, ProductId, SalesChannelId, SubscriptionId,
};
use crate::domain::port::{ConfigReader, Logger, OrderRepository, ProductRepository};
use crate::domain::service::{
    borrowable_availability, compute_discount_percentage, load_rental_settings,
    notification_change, quote_residual_purchase, rental_discount_definition, Availability,
    PercentageDiscount, ResidualPurchaseQuote,
};
use std::collections::HashMap;
use std::sync::Arc;

/// 更新注文の割引
#[derive(Debug, Clone, PartialEq)]
pub struct RenewalDiscount {
    /// 何回目の注文か（価格計算中の注文を含む）
    pub interval: i64,
    pub percentage: f64,
}

/// レンタル割引アプリケーションサービス
/// 決済プロバイダーが複製した更新注文のカート計算から呼ばれる
pub struct RentalDiscountService {
    order_repository: Arc<dyn OrderRepository>,
    config_reader: Arc<dyn ConfigReader>,
    logger: Arc<dyn Logger>,
}

impl RentalDiscountService {
    pub fn new(
        order_repository: Arc<dyn OrderRepository>,
        config_reader: Arc<dyn ConfigReader>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            order_repository,
            config_reader,
            logger,
        }
    }

    /// 複製元の注文から更新注文の割引率を求める
    ///
    /// # Arguments
    /// * `original_order_id` - 複製元の注文ID
    ///
    /// # Returns
    /// * `Ok(RenewalDiscount)` - 割引（設定が無ければ0.0）
    /// * `Err(ApplicationError)` - 複製元の注文が見つからない、または読み出し失敗
    pub async fn discount_for_renewal(
        &self,
        original_order_id: OrderId,
    ) -> Result<RenewalDiscount, ApplicationError> {
        let original = self
            .order_repository
            .find_by_id(original_order_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("order {}", original_order_id)))?;

        let settings = load_rental_settings(
            self.config_reader.as_ref(),
            original.sales_channel_id(),
            self.logger.as_ref(),
        )
        .await?;

        let existing = match original.subscription_id() {
            Some(subscription_id) => {
                self.order_repository
                    .count_by_subscription_id(subscription_id)
                    .await?
            }
            None => 0,
        };
        let interval = i64::try_from(existing).unwrap_or(i64::MAX).saturating_add(1);
        let percentage =
            compute_discount_percentage(interval, &settings.discount_table, settings.max_intervals);

        self.logger.debug(
            "RentalDiscountService",
            "Renewal discount computed",
            None,
            Some(HashMap::from([
                ("original_order_id".to_string(), original_order_id.to_string()),
                ("interval".to_string(), interval.to_string()),
                ("percentage".to_string(), percentage.to_string()),
            ])),
        );

        Ok(RenewalDiscount {
            interval,
            percentage,
        })
    }

    /// カートに加える値引き定義を作る
    /// 複製元が無い（店頭での初回注文）場合は値引きなし
    pub async fn discount_definition(
        &self,
        original_order_id: Option<OrderId>,
        cart_line_items: &[LineItem],
        sales_channel_id: Option<SalesChannelId>,
    ) -> Result<Option<PercentageDiscount>, ApplicationError> {
        let Some(original_order_id) = original_order_id else {
            return Ok(None);
        };

        let discount = self.discount_for_renewal(original_order_id).await?;
        let settings = load_rental_settings(
            self.config_reader.as_ref(),
            sales_channel_id,
            self.logger.as_ref(),
        )
        .await?;

        Ok(rental_discount_definition(
            cart_line_items,
            discount.percentage,
            &settings.rental_marker,
        ))
    }
}

/// 残価買取アプリケーションサービス
pub struct ResidualPurchaseService {
    order_repository: Arc<dyn OrderRepository>,
    product_repository: Arc<dyn ProductRepository>,
    config_reader: Arc<dyn ConfigReader>,
    logger: Arc<dyn Logger>,
}

impl ResidualPurchaseService {
    pub fn new(
        order_repository: Arc<dyn OrderRepository>,
        product_repository: Arc<dyn ProductRepository>,
        config_reader: Arc<dyn ConfigReader>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            order_repository,
            product_repository,
            config_reader,
            logger,
        }
    }

    /// サブスクリプションの残価買取を見積もる
    ///
    /// # Returns
    /// * `Ok(ResidualPurchaseQuote)` - カートに入れる明細と値引き
    /// * `Err(ApplicationError::ResidualPurchase)` - 買取を受け付けられない
    pub async fn quote(
        &self,
        subscription_id: SubscriptionId,
        sales_channel_id: Option<SalesChannelId>,
    ) -> Result<ResidualPurchaseQuote, ApplicationError> {
        let settings = load_rental_settings(
            self.config_reader.as_ref(),
            sales_channel_id,
            self.logger.as_ref(),
        )
        .await?;

        let orders = self
            .order_repository
            .find_by_subscription_id(subscription_id)
            .await?;
        let product_ids = orders
            .first()
            .map(|initial| initial.product_ids())
            .unwrap_or_default();
        let products = if product_ids.is_empty() {
            Vec::new()
        } else {
            self.product_repository.find_by_ids(&product_ids).await?
        };

        quote_residual_purchase(&orders, &products, &settings).map_err(|e| {
            self.logger.error(
                "ResidualPurchaseService",
                &format!("Residual purchase rejected: {}", e),
                None,
                Some(HashMap::from([
                    ("subscription_id".to_string(), subscription_id.to_string()),
                    ("order_count".to_string(), orders.len().to_string()),
                ])),
            );
            ApplicationError::from(e)
        })
    }
}

/// 貸借を考慮した商品の販売可否サービス
/// 商品ページと一覧・検索結果の表示前に呼ばれる
pub struct ProductAvailabilityService {
    product_repository: Arc<dyn ProductRepository>,
    logger: Arc<dyn Logger>,
}

impl ProductAvailabilityService {
    pub fn new(product_repository: Arc<dyn ProductRepository>, logger: Arc<dyn Logger>) -> Self {
        Self {
            product_repository,
            logger,
        }
    }

    /// 商品ページ用の販売可否
    ///
    /// # Returns
    /// * `Ok(Availability)` - 購入上限と入荷通知フラグ
    /// * `Err(ApplicationError::NotFound)` - 商品が見つからない
    pub async fn product_page(&self, product_id: ProductId) -> Result<Availability, ApplicationError> {
        let product = self
            .product_repository
            .find_by_id(product_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("product {}", product_id)))?;

        let mut results = self.evaluate(vec![product]).await?;
        results
            .pop()
            .map(|(_, availability)| availability)
            .ok_or_else(|| ApplicationError::NotFound(format!("product {}", product_id)))
    }

    /// 一覧・検索結果用の販売可否
    /// 見つからない商品は結果に含まれない
    pub async fn listing(
        &self,
        product_ids: &[ProductId],
    ) -> Result<Vec<(ProductId, Availability)>, ApplicationError> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }
        let products = self.product_repository.find_by_ids(product_ids).await?;
        self.evaluate(products).await
    }

    async fn evaluate(
        &self,
        products: Vec<Product>,
    ) -> Result<Vec<(ProductId, Availability)>, ApplicationError> {
        // 販売可能在庫が尽きた商品の貸出元だけをまとめて読む
        let mut donor_ids: Vec<ProductId> = Vec::new();
        for product in &products {
            if product.available_stock() > 0 {
                continue;
            }
            if let Some(relation) = product.borrow_relation() {
                if !donor_ids.contains(&relation.borrow_from_product_id) {
                    donor_ids.push(relation.borrow_from_product_id);
                }
            }
        }
        let donors = if donor_ids.is_empty() {
            Vec::new()
        } else {
            self.product_repository.find_by_ids(&donor_ids).await?
        };

        let mut results = Vec::with_capacity(products.len());
        for product in products {
            let donor = product
                .borrow_relation()
                .and_then(|r| donors.iter().find(|d| d.id() == r.borrow_from_product_id));
            let availability = borrowable_availability(&product, donor);

            if let Some(inactive) = notification_change(&product, &availability) {
                self.product_repository
                    .save_stock_notification(product.id(), inactive)
                    .await?;
                self.logger.debug(
                    "ProductAvailabilityService",
                    "Stock notification flag updated",
                    None,
                    Some(HashMap::from([
                        ("product_id".to_string(), product.id().to_string()),
                        ("inactive".to_string(), inactive.to_string()),
                    ])),
                );
            }

            results.push((product.id(), availability));
        }

        Ok(results)
    }
}
