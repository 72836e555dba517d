use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::error::DomainError;
use crate::domain::model::{
    BorrowAudit, BorrowRelation, LineItemId, Order, OrderCustomState, Product, ProductId,
    StockLevels, StockSnapshot, StockUpdate,
};

/// 貸借を拒否した理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowRejection {
    /// 購入用バリアントが設定されていない
    NoBorrowRelation,
    /// 購入用バリアントが存在しない
    DonorMissing,
    /// 購入用バリアントの販売可能在庫が足りない
    InsufficientDonorStock { required: i64, available: i64 },
}

/// 明細単位の判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationResult {
    NoActionNeeded,
    BorrowRejected { reason: BorrowRejection },
    Borrowed { amount: i64 },
}

/// 明細単位で在庫を借りる必要があるか判定する
///
/// 1. 不足数 = 数量 - 注文時在庫。0以下なら何もしない
/// 2. 貸借関係・貸出元が無い、または販売可能在庫が不足数未満なら拒否
/// 3. それ以外は不足数を借りる
pub fn reconcile(
    snapshot: &StockSnapshot,
    relation: Option<&BorrowRelation>,
    donor_available: Option<i64>,
) -> ReconciliationResult {
    let deficit = snapshot.quantity - snapshot.recorded_stock;
    if deficit <= 0 {
        return ReconciliationResult::NoActionNeeded;
    }

    if relation.is_none() {
        return ReconciliationResult::BorrowRejected {
            reason: BorrowRejection::NoBorrowRelation,
        };
    }

    let Some(available) = donor_available else {
        return ReconciliationResult::BorrowRejected {
            reason: BorrowRejection::DonorMissing,
        };
    };

    if available < deficit {
        return ReconciliationResult::BorrowRejected {
            reason: BorrowRejection::InsufficientDonorStock {
                required: deficit,
                available,
            },
        };
    }

    ReconciliationResult::Borrowed { amount: deficit }
}

/// 貸借で書き込む在庫数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowPlan {
    pub donor: StockUpdate,
    pub recipient: StockUpdate,
    pub audit: BorrowAudit,
}

/// 貸借後の在庫数を計算する
///
/// 貸出元: 販売可能在庫と物理在庫から不足数を引く（物理在庫は0未満にしない）
/// 借り手: 物理在庫から数量を引き（0未満にしない）、販売可能在庫は0に固定する
pub fn plan_borrow(
    snapshot: &StockSnapshot,
    recipient: &Product,
    donor: &Product,
    now: DateTime<Utc>,
) -> Result<BorrowPlan, DomainError> {
    let deficit = snapshot.quantity - snapshot.recorded_stock;
    if deficit <= 0 {
        return Err(DomainError::InvalidQuantity(deficit));
    }
    if donor.available_stock() < deficit {
        return Err(DomainError::InsufficientDonorStock {
            required: deficit,
            available: donor.available_stock(),
        });
    }

    let donor_after = StockLevels::new(
        (donor.stock() - deficit).max(0),
        donor.available_stock() - deficit,
    );
    let recipient_after = StockLevels::new((recipient.stock() - snapshot.quantity).max(0), 0);

    Ok(BorrowPlan {
        donor: StockUpdate::new(donor.id(), donor_after),
        recipient: StockUpdate::new(recipient.id(), recipient_after),
        audit: BorrowAudit {
            line_item_id: snapshot.line_item_id,
            donor_id: donor.id(),
            recipient_id: recipient.id(),
            amount: deficit,
            donor_before: donor.levels(),
            donor_after,
            recipient_before: recipient.levels(),
            recipient_after,
            recorded_at: now,
        },
    })
}

/// 注文単位の判定対象（明細1件分）
#[derive(Debug, Clone)]
pub struct ReconciliationItem {
    pub snapshot: StockSnapshot,
    pub recipient: Product,
    pub donor: Option<Product>,
}

/// 注文単位の判定結果
#[derive(Debug, Clone, PartialEq)]
pub enum OrderReconciliation {
    /// 既に判定済み
    AlreadyReconciled,
    /// 拒否された明細があるため何も変更しない
    Rejected {
        line_item_id: LineItemId,
        reason: BorrowRejection,
    },
    /// 借りる必要がない（stock_borrowed = false）
    NothingToBorrow { state: OrderCustomState },
    /// すべての明細の貸借を反映する（stock_borrowed = true）
    Borrowed {
        state: OrderCustomState,
        updates: Vec<StockUpdate>,
    },
}

/// 注文全体の貸借を判定する
///
/// 同じ商品が複数の明細に現れる場合に備え、前の明細の結果を反映した在庫で次の明細を判定する。
/// 1件でも拒否されれば全体を取りやめる。
pub fn reconcile_order(
    state: &OrderCustomState,
    items: &[ReconciliationItem],
    now: DateTime<Utc>,
) -> Result<OrderReconciliation, DomainError> {
    if state.stock_borrowed().is_some() {
        return Ok(OrderReconciliation::AlreadyReconciled);
    }

    let mut working: HashMap<ProductId, Product> = HashMap::new();
    let mut touched: Vec<ProductId> = Vec::new();
    let mut audits = Vec::new();

    for item in items {
        let recipient = working
            .get(&item.recipient.id())
            .cloned()
            .unwrap_or_else(|| item.recipient.clone());
        let relation = recipient.borrow_relation();
        let donor = item
            .donor
            .as_ref()
            .filter(|donor| relation.is_some_and(|r| r.borrow_from_product_id == donor.id()))
            .map(|donor| working.get(&donor.id()).cloned().unwrap_or_else(|| donor.clone()));

        let result = reconcile(
            &item.snapshot,
            relation.as_ref(),
            donor.as_ref().map(Product::available_stock),
        );

        match result {
            ReconciliationResult::NoActionNeeded => {}
            ReconciliationResult::BorrowRejected { reason } => {
                return Ok(OrderReconciliation::Rejected {
                    line_item_id: item.snapshot.line_item_id,
                    reason,
                });
            }
            ReconciliationResult::Borrowed { .. } => {
                let Some(donor) = donor else {
                    return Ok(OrderReconciliation::Rejected {
                        line_item_id: item.snapshot.line_item_id,
                        reason: BorrowRejection::DonorMissing,
                    });
                };
                let plan = plan_borrow(&item.snapshot, &recipient, &donor, now)?;

                for update in [plan.donor, plan.recipient] {
                    let mut product = if update.product_id == donor.id() {
                        donor.clone()
                    } else {
                        recipient.clone()
                    };
                    product.apply_levels(update.levels);
                    working.insert(update.product_id, product);
                    if !touched.contains(&update.product_id) {
                        touched.push(update.product_id);
                    }
                }
                audits.push(plan.audit);
            }
        }
    }

    let mut next_state = state.clone();
    if audits.is_empty() {
        next_state.record_stock_borrowed(false, Vec::new())?;
        return Ok(OrderReconciliation::NothingToBorrow { state: next_state });
    }

    let updates = touched
        .iter()
        .filter_map(|id| working.get(id))
        .map(|product| StockUpdate::new(product.id(), product.levels()))
        .collect();
    next_state.record_stock_borrowed(true, audits)?;

    Ok(OrderReconciliation::Borrowed {
        state: next_state,
        updates,
    })
}

/// 在庫返却の判定結果
#[derive(Debug, Clone, PartialEq)]
pub enum StockReturn {
    /// 既に返却済み
    AlreadyReturned,
    /// 返却する
    Return {
        state: OrderCustomState,
        updates: Vec<StockUpdate>,
    },
}

/// 注文完了時に販売可能在庫を戻す
/// サブスクリプション商品の明細ごとに数量を販売可能在庫へ加算する
pub fn return_borrowed_stock(
    order: &Order,
    products: &[Product],
    now: DateTime<Utc>,
) -> Result<StockReturn, DomainError> {
    if order.custom_state().stock_returned_at().is_some() {
        return Ok(StockReturn::AlreadyReturned);
    }

    let mut working: Vec<Product> = Vec::new();
    for item in order.product_line_items() {
        let Some(product_id) = item.product_id() else {
            continue;
        };
        let Some(product) = products
            .iter()
            .find(|p| p.id() == product_id && p.is_subscription_enabled())
        else {
            continue;
        };

        let position = match working.iter().position(|p| p.id() == product_id) {
            Some(position) => position,
            None => {
                working.push(product.clone());
                working.len() - 1
            }
        };
        let current = working[position].levels();
        working[position].apply_levels(StockLevels::new(
            current.stock,
            current.available_stock + item.quantity(),
        ));
    }

    let mut state = order.custom_state().clone();
    state.record_stock_returned(now)?;

    Ok(StockReturn::Return {
        state,
        updates: working
            .iter()
            .map(|product| StockUpdate::new(product.id(), product.levels()))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{LineItem, OrderId};

    fn snapshot(quantity: i64, recorded_stock: i64) -> StockSnapshot {
        StockSnapshot::new(LineItemId::new(), ProductId::new(), recorded_stock, quantity)
    }

    fn relation() -> BorrowRelation {
        BorrowRelation::new(ProductId::new(), ProductId::new()).unwrap()
    }

    #[test]
    fn test_enough_stock_needs_no_action() {
        assert_eq!(
            reconcile(&snapshot(3, 5), None, None),
            ReconciliationResult::NoActionNeeded
        );
        assert_eq!(
            reconcile(&snapshot(5, 5), None, None),
            ReconciliationResult::NoActionNeeded
        );
    }

    #[test]
    fn test_insufficient_donor_is_rejected() {
        assert_eq!(
            reconcile(&snapshot(5, 2), Some(&relation()), Some(2)),
            ReconciliationResult::BorrowRejected {
                reason: BorrowRejection::InsufficientDonorStock {
                    required: 3,
                    available: 2
                }
            }
        );
    }

    #[test]
    fn test_missing_relation_or_donor_is_rejected() {
        assert_eq!(
            reconcile(&snapshot(5, 2), None, Some(10)),
            ReconciliationResult::BorrowRejected {
                reason: BorrowRejection::NoBorrowRelation
            }
        );
        assert_eq!(
            reconcile(&snapshot(5, 2), Some(&relation()), None),
            ReconciliationResult::BorrowRejected {
                reason: BorrowRejection::DonorMissing
            }
        );
    }

    #[test]
    fn test_borrow_deficit() {
        assert_eq!(
            reconcile(&snapshot(5, 2), Some(&relation()), Some(10)),
            ReconciliationResult::Borrowed { amount: 3 }
        );
    }

    #[test]
    fn test_plan_borrow_levels() {
        let donor = Product::new(ProductId::new(), 10, 10);
        let recipient = Product::new(ProductId::new(), 2, 2).with_subscription(Some(donor.id()));
        let snapshot = StockSnapshot::new(LineItemId::new(), recipient.id(), 2, 5);

        let plan = plan_borrow(&snapshot, &recipient, &donor, Utc::now()).unwrap();
        assert_eq!(plan.donor.levels, StockLevels::new(7, 7));
        assert_eq!(plan.recipient.levels, StockLevels::new(0, 0));
        assert_eq!(plan.audit.amount, 3);
        assert_eq!(plan.audit.donor_before, StockLevels::new(10, 10));
    }

    #[test]
    fn test_plan_borrow_floors_donor_stock() {
        let donor = Product::new(ProductId::new(), 1, 5);
        let recipient = Product::new(ProductId::new(), 0, 0).with_subscription(Some(donor.id()));
        let snapshot = StockSnapshot::new(LineItemId::new(), recipient.id(), 0, 3);

        let plan = plan_borrow(&snapshot, &recipient, &donor, Utc::now()).unwrap();
        assert_eq!(plan.donor.levels, StockLevels::new(0, 2));
    }

    #[test]
    fn test_plan_borrow_rejects_without_deficit() {
        let donor = Product::new(ProductId::new(), 1, 5);
        let recipient = Product::new(ProductId::new(), 9, 9);
        let snapshot = StockSnapshot::new(LineItemId::new(), recipient.id(), 9, 3);
        assert!(plan_borrow(&snapshot, &recipient, &donor, Utc::now()).is_err());
    }

    fn item(recipient: &Product, donor: Option<&Product>, recorded: i64, qty: i64) -> ReconciliationItem {
        ReconciliationItem {
            snapshot: StockSnapshot::new(LineItemId::new(), recipient.id(), recorded, qty),
            recipient: recipient.clone(),
            donor: donor.cloned(),
        }
    }

    #[test]
    fn test_order_level_borrow_sets_flag() {
        let donor = Product::new(ProductId::new(), 10, 10);
        let recipient = Product::new(ProductId::new(), 2, 2).with_subscription(Some(donor.id()));

        let result = reconcile_order(
            &OrderCustomState::default(),
            &[item(&recipient, Some(&donor), 2, 5)],
            Utc::now(),
        )
        .unwrap();

        match result {
            OrderReconciliation::Borrowed { state, updates } => {
                assert_eq!(state.stock_borrowed(), Some(true));
                assert_eq!(state.borrow_audit().len(), 1);
                assert!(updates.contains(&StockUpdate::new(donor.id(), StockLevels::new(7, 7))));
                assert!(updates.contains(&StockUpdate::new(recipient.id(), StockLevels::new(0, 0))));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_order_level_nothing_to_borrow() {
        let recipient = Product::new(ProductId::new(), 5, 5).with_subscription(None);
        let result = reconcile_order(
            &OrderCustomState::default(),
            &[item(&recipient, None, 5, 3)],
            Utc::now(),
        )
        .unwrap();

        match result {
            OrderReconciliation::NothingToBorrow { state } => {
                assert_eq!(state.stock_borrowed(), Some(false))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_order_level_rejection_is_all_or_nothing() {
        let donor = Product::new(ProductId::new(), 10, 10);
        let ok = Product::new(ProductId::new(), 0, 0).with_subscription(Some(donor.id()));
        let orphan = Product::new(ProductId::new(), 0, 0).with_subscription(None);

        let result = reconcile_order(
            &OrderCustomState::default(),
            &[item(&ok, Some(&donor), 0, 2), item(&orphan, None, 0, 1)],
            Utc::now(),
        )
        .unwrap();

        assert!(matches!(
            result,
            OrderReconciliation::Rejected {
                reason: BorrowRejection::NoBorrowRelation,
                ..
            }
        ));
    }

    #[test]
    fn test_order_level_shared_donor_is_consumed_sequentially() {
        let donor = Product::new(ProductId::new(), 4, 4);
        let first = Product::new(ProductId::new(), 0, 0).with_subscription(Some(donor.id()));
        let second = Product::new(ProductId::new(), 0, 0).with_subscription(Some(donor.id()));

        let result = reconcile_order(
            &OrderCustomState::default(),
            &[item(&first, Some(&donor), 0, 3), item(&second, Some(&donor), 0, 3)],
            Utc::now(),
        )
        .unwrap();

        assert!(matches!(
            result,
            OrderReconciliation::Rejected {
                reason: BorrowRejection::InsufficientDonorStock {
                    required: 3,
                    available: 1
                },
                ..
            }
        ));
    }

    #[test]
    fn test_order_level_is_noop_once_flag_set() {
        let mut state = OrderCustomState::default();
        state.record_stock_borrowed(false, Vec::new()).unwrap();
        let recipient = Product::new(ProductId::new(), 0, 0).with_subscription(None);

        assert_eq!(
            reconcile_order(&state, &[item(&recipient, None, 0, 5)], Utc::now()).unwrap(),
            OrderReconciliation::AlreadyReconciled
        );
    }

    #[test]
    fn test_return_credits_subscription_products_once() {
        let rental = Product::new(ProductId::new(), 3, 0).with_subscription(None);
        let plain = Product::new(ProductId::new(), 3, 3);
        let order = Order::new(OrderId::new(), Utc::now())
            .with_line_item(LineItem::product(LineItemId::new(), rental.id(), 2))
            .with_line_item(LineItem::product(LineItemId::new(), plain.id(), 1));

        let products = vec![rental.clone(), plain];
        let now = Utc::now();
        let StockReturn::Return { state, updates } =
            return_borrowed_stock(&order, &products, now).unwrap()
        else {
            panic!("expected stock return");
        };
        assert_eq!(updates, vec![StockUpdate::new(rental.id(), StockLevels::new(3, 2))]);
        assert_eq!(state.stock_returned_at(), Some(now));

        let returned = order.clone().with_custom_state(state, 1);
        assert_eq!(
            return_borrowed_stock(&returned, &products, now).unwrap(),
            StockReturn::AlreadyReturned
        );
    }
}
