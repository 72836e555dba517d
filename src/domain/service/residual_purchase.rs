use thiserror::Error;

use crate::domain::error::DomainError;
use crate::domain::model::{LineItemId, Money, Order, Product, ProductId, RentalSettings};

/// 残価買取の見積もりエラー
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResidualPurchaseError {
    #[error("Residual purchase is disabled")]
    Disabled,
    #[error("No orders found for subscription")]
    SubscriptionNotFound,
    #[error("Order count {count} exceeds residual purchase limit {max}")]
    IntervalExceeded { count: u64, max: u32 },
    #[error("Product {0} has no buy variant")]
    BuyVariantMissing(ProductId),
    #[error("Product {0} not found")]
    ProductNotFound(ProductId),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// 買取時にカートへ入れる購入用バリアントの明細
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidualBuyLine {
    /// 元になったレンタル明細
    pub source_line_item_id: LineItemId,
    pub product_id: ProductId,
    pub quantity: i64,
}

/// 残価買取の見積もり
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualPurchaseQuote {
    pub buy_lines: Vec<ResidualBuyLine>,
    /// 支払い済み金額に基づく値引き（負の値）
    pub discount: Money,
}

/// 残価買取の見積もりを作る
///
/// # Arguments
/// * `orders` - サブスクリプションの注文（作成日時の昇順、先頭が初回注文）
/// * `products` - 初回注文のレンタル明細に対応する商品
/// * `settings` - 販売チャネルの設定
pub fn quote_residual_purchase(
    orders: &[Order],
    products: &[Product],
    settings: &RentalSettings,
) -> Result<ResidualPurchaseQuote, ResidualPurchaseError> {
    if !settings.residual.active {
        return Err(ResidualPurchaseError::Disabled);
    }

    let Some(initial) = orders.first() else {
        return Err(ResidualPurchaseError::SubscriptionNotFound);
    };

    let count = orders.len() as u64;
    if count > u64::from(settings.residual.valid_until_interval) {
        return Err(ResidualPurchaseError::IntervalExceeded {
            count,
            max: settings.residual.valid_until_interval,
        });
    }

    let mut buy_lines = Vec::new();
    for item in initial
        .product_line_items()
        .filter(|item| item.is_rental(&settings.rental_marker))
    {
        let Some(product_id) = item.product_id() else {
            continue;
        };
        let product = products
            .iter()
            .find(|p| p.id() == product_id)
            .ok_or(ResidualPurchaseError::ProductNotFound(product_id))?;
        let buy_variant = product
            .buy_variant_id()
            .ok_or(ResidualPurchaseError::BuyVariantMissing(product_id))?;

        buy_lines.push(ResidualBuyLine {
            source_line_item_id: item.id(),
            product_id: buy_variant,
            quantity: item.quantity(),
        });
    }

    let mut paid = Money::eur(0);
    for order in orders {
        paid = paid.add(&order.amount_net())?;
    }

    let discount = paid
        .percentage(settings.residual.acknowledged_payment_percentage.value())
        .negate();

    Ok(ResidualPurchaseQuote {
        buy_lines,
        discount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        DiscountPercentage, LineItem, OrderId, ResidualPurchaseSettings, SubscriptionId,
    };
    use chrono::Utc;

    fn settings(active: bool, valid_until: u32, percentage: f64) -> RentalSettings {
        RentalSettings {
            residual: ResidualPurchaseSettings {
                active,
                valid_until_interval: valid_until,
                acknowledged_payment_percentage: DiscountPercentage::new(percentage).unwrap(),
            },
            ..RentalSettings::default()
        }
    }

    fn orders(rental: &Product, count: usize, amount: i64) -> Vec<Order> {
        let subscription_id = SubscriptionId::new();
        (0..count)
            .map(|_| {
                Order::new(OrderId::new(), Utc::now())
                    .with_subscription(subscription_id)
                    .with_amount_net(Money::eur(amount))
                    .with_line_item(
                        LineItem::product(LineItemId::new(), rental.id(), 2)
                            .with_options(vec!["Mieten"]),
                    )
            })
            .collect()
    }

    #[test]
    fn test_quote_builds_buy_lines_and_discount() {
        let buy = ProductId::new();
        let rental = Product::new(ProductId::new(), 0, 0).with_subscription(Some(buy));
        let orders = orders(&rental, 3, 2_000);

        let quote =
            quote_residual_purchase(&orders, &[rental.clone()], &settings(true, 6, 50.0)).unwrap();
        assert_eq!(quote.buy_lines.len(), 1);
        assert_eq!(quote.buy_lines[0].product_id, buy);
        assert_eq!(quote.buy_lines[0].quantity, 2);
        assert_eq!(quote.discount, Money::eur(-3_000));
    }

    #[test]
    fn test_quote_rejects_when_disabled() {
        let rental = Product::new(ProductId::new(), 0, 0).with_subscription(Some(ProductId::new()));
        assert_eq!(
            quote_residual_purchase(&orders(&rental, 1, 100), &[rental], &settings(false, 6, 50.0)),
            Err(ResidualPurchaseError::Disabled)
        );
    }

    #[test]
    fn test_quote_rejects_without_orders() {
        assert_eq!(
            quote_residual_purchase(&[], &[], &settings(true, 6, 50.0)),
            Err(ResidualPurchaseError::SubscriptionNotFound)
        );
    }

    #[test]
    fn test_quote_rejects_after_valid_interval() {
        let rental = Product::new(ProductId::new(), 0, 0).with_subscription(Some(ProductId::new()));
        assert_eq!(
            quote_residual_purchase(&orders(&rental, 4, 100), &[rental], &settings(true, 3, 50.0)),
            Err(ResidualPurchaseError::IntervalExceeded { count: 4, max: 3 })
        );
    }

    #[test]
    fn test_quote_requires_buy_variant() {
        let rental = Product::new(ProductId::new(), 0, 0).with_subscription(None);
        assert_eq!(
            quote_residual_purchase(
                &orders(&rental, 1, 100),
                &[rental.clone()],
                &settings(true, 3, 50.0)
            ),
            Err(ResidualPurchaseError::BuyVariantMissing(rental.id()))
        );
    }
}
