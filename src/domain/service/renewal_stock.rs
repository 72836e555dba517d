use std::collections::HashMap;

use crate::domain::model::{Order, Product, ProductId, StockLevels, StockUpdate};

/// 更新注文の作成前に在庫を補充する
///
/// 決済プロバイダーは在庫が数量未満の明細を複製しないため、
/// 数量が現在の在庫を超える商品明細は在庫を数量まで引き上げる。
/// 販売可能在庫は変更しない。商品が見つからない明細は対象外。
pub fn plan_stock_refill(order: &Order, products: &[Product]) -> Vec<StockUpdate> {
    let mut working: Vec<Product> = Vec::new();

    for item in order.product_line_items() {
        let Some(product_id) = item.product_id() else {
            continue;
        };
        let Some(product) = current(&working, products, product_id) else {
            continue;
        };

        if item.quantity() <= product.stock() {
            continue;
        }

        let mut refilled = product.clone();
        refilled.apply_levels(StockLevels::new(item.quantity(), product.available_stock()));
        upsert(&mut working, refilled);
    }

    to_updates(&working)
}

/// 更新時に在庫を元に戻す
/// 更新注文は在庫を消費しないため、サブスクリプション商品の明細数量を在庫と販売可能在庫に加算する
pub fn plan_renewal_restock(order: &Order, products: &[Product]) -> Vec<StockUpdate> {
    let mut quantities: HashMap<ProductId, i64> = HashMap::new();
    let mut ordered: Vec<ProductId> = Vec::new();

    for item in order.product_line_items() {
        let Some(product_id) = item.product_id() else {
            continue;
        };
        if !products
            .iter()
            .any(|p| p.id() == product_id && p.is_subscription_enabled())
        {
            continue;
        }
        if !quantities.contains_key(&product_id) {
            ordered.push(product_id);
        }
        *quantities.entry(product_id).or_insert(0) += item.quantity();
    }

    ordered
        .into_iter()
        .filter_map(|id| {
            let product = products.iter().find(|p| p.id() == id)?;
            let quantity = quantities.get(&id).copied().unwrap_or(0);
            Some(StockUpdate::new(
                id,
                StockLevels::new(
                    product.stock() + quantity,
                    product.available_stock() + quantity,
                ),
            ))
        })
        .collect()
}

fn current<'a>(
    working: &'a [Product],
    products: &'a [Product],
    product_id: ProductId,
) -> Option<&'a Product> {
    working
        .iter()
        .find(|p| p.id() == product_id)
        .or_else(|| products.iter().find(|p| p.id() == product_id))
}

fn upsert(working: &mut Vec<Product>, product: Product) {
    match working.iter_mut().find(|p| p.id() == product.id()) {
        Some(existing) => *existing = product,
        None => working.push(product),
    }
}

fn to_updates(working: &[Product]) -> Vec<StockUpdate> {
    working
        .iter()
        .map(|p| StockUpdate::new(p.id(), p.levels()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{LineItem, LineItemId, LineItemKind, OrderId};
    use chrono::Utc;

    #[test]
    fn test_refill_raises_stock_to_quantity() {
        let empty = Product::new(ProductId::new(), 0, 0);
        let stocked = Product::new(ProductId::new(), 10, 10);
        let order = Order::new(OrderId::new(), Utc::now())
            .with_line_item(LineItem::product(LineItemId::new(), empty.id(), 2))
            .with_line_item(LineItem::product(LineItemId::new(), stocked.id(), 2));

        let updates = plan_stock_refill(&order, &[empty.clone(), stocked]);
        assert_eq!(updates, vec![StockUpdate::new(empty.id(), StockLevels::new(2, 0))]);
    }

    #[test]
    fn test_refill_lifts_negative_stock() {
        let product = Product::new(ProductId::new(), -3, 0);
        let order = Order::new(OrderId::new(), Utc::now())
            .with_line_item(LineItem::product(LineItemId::new(), product.id(), 1));

        let updates = plan_stock_refill(&order, &[product.clone()]);
        assert_eq!(updates, vec![StockUpdate::new(product.id(), StockLevels::new(1, 0))]);
    }

    #[test]
    fn test_refill_skips_non_product_lines() {
        let product = Product::new(ProductId::new(), 0, 0);
        let order = Order::new(OrderId::new(), Utc::now())
            .with_line_item(LineItem::with_kind(
                LineItemId::new(),
                LineItemKind::SubscriptionDiscount,
                1,
            ))
            .with_line_item(LineItem::product(LineItemId::new(), product.id(), 1));

        assert_eq!(plan_stock_refill(&order, &[product]).len(), 1);
    }

    #[test]
    fn test_restock_adds_quantity_to_subscription_products() {
        let rental = Product::new(ProductId::new(), 4, 1).with_subscription(None);
        let plain = Product::new(ProductId::new(), 4, 4);
        let order = Order::new(OrderId::new(), Utc::now())
            .with_line_item(LineItem::product(LineItemId::new(), rental.id(), 2))
            .with_line_item(LineItem::product(LineItemId::new(), rental.id(), 1))
            .with_line_item(LineItem::product(LineItemId::new(), plain.id(), 5));

        let updates = plan_renewal_restock(&order, &[rental.clone(), plain]);
        assert_eq!(updates, vec![StockUpdate::new(rental.id(), StockLevels::new(7, 4))]);
    }
}
