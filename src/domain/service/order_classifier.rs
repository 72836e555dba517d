use chrono::{DateTime, Duration, Utc};

use crate::domain::model::{
    HistoryComment, Order, OrderCustomState, OrderType, RentalMarker, SubscriptionHistoryEntry,
    SubscriptionId,
};

/// 注文種別を判定する
///
/// 残価買取明細が1つでもあればResidual（最優先）。
/// それ以外でレンタル明細を含む場合、同じサブスクリプションの注文数が
/// 1より多ければRenewal、そうでなければInitial。
/// どちらにも当てはまらない場合はNone（タグ付けしない）。
///
/// # Arguments
/// * `order` - 判定対象の注文
/// * `existing_order_count` - 同じサブスクリプションIDを持つ注文数（この注文を含む）
/// * `marker` - レンタルオプション名
pub fn classify(
    order: &Order,
    existing_order_count: u64,
    marker: &RentalMarker,
) -> Option<OrderType> {
    if order.line_items().iter().any(|item| item.is_residual()) {
        return Some(OrderType::Residual);
    }

    if !order.line_items().iter().any(|item| item.is_rental(marker)) {
        return None;
    }

    if existing_order_count > 1 {
        Some(OrderType::Renewal)
    } else {
        Some(OrderType::Initial)
    }
}

/// タグ付けの結果
#[derive(Debug, Clone, PartialEq)]
pub enum TagOutcome {
    /// 新たにタグを付けた（保存が必要）
    Tagged {
        order_type: OrderType,
        subscription_id: Option<SubscriptionId>,
        state: OrderCustomState,
    },
    /// 既にタグ付け済み
    AlreadyTagged(OrderType),
    /// 対象外の注文
    NotApplicable,
}

/// 注文種別をカスタム状態に記録する
/// 既に種別が設定されている場合は何もしない
///
/// レンタル注文は注文のサブスクリプションIDを、
/// 残価買取注文は残価明細の目印に含まれる最初のサブスクリプションIDを記録する
pub fn tag_order(order: &Order, existing_order_count: u64, marker: &RentalMarker) -> TagOutcome {
    if let Some(existing) = order.custom_state().order_type() {
        return TagOutcome::AlreadyTagged(existing);
    }

    let Some(order_type) = classify(order, existing_order_count, marker) else {
        return TagOutcome::NotApplicable;
    };

    let subscription_id = match order_type {
        OrderType::Residual => residual_subscription_id(order),
        OrderType::Initial | OrderType::Renewal => order.subscription_id(),
    };

    let mut state = order.custom_state().clone();
    state.assign_order_type(order_type, subscription_id);

    TagOutcome::Tagged {
        order_type,
        subscription_id,
        state,
    }
}

/// 残価明細から買取対象のサブスクリプションIDを探す
pub fn residual_subscription_id(order: &Order) -> Option<SubscriptionId> {
    order
        .line_items()
        .iter()
        .filter(|item| item.is_residual())
        .filter_map(|item| item.residual_marker())
        .find_map(|marker| marker.subscription_id)
}

/// 重複配信かどうかを判定する
///
/// 履歴が無ければfalse。最新の履歴が作成（初回購入）ならtrue。
/// それ以外は最新履歴からの経過時間が閾値未満ならtrue。
pub fn is_repeat_delivery(
    latest_history: Option<&SubscriptionHistoryEntry>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> bool {
    let Some(entry) = latest_history else {
        return false;
    };

    if entry.comment == HistoryComment::Created {
        return true;
    }

    now - entry.created_at < threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        LineItem, LineItemId, LineItemKind, OrderId, ProductId, ResidualMarker,
    };

    fn rental_order() -> Order {
        Order::new(OrderId::new(), Utc::now())
            .with_subscription(SubscriptionId::new())
            .with_line_item(
                LineItem::product(LineItemId::new(), ProductId::new(), 1)
                    .with_options(vec!["Mieten"]),
            )
    }

    #[test]
    fn test_fresh_subscription_is_initial() {
        let marker = RentalMarker::default();
        assert_eq!(classify(&rental_order(), 1, &marker), Some(OrderType::Initial));
        assert_eq!(classify(&rental_order(), 0, &marker), Some(OrderType::Initial));
    }

    #[test]
    fn test_second_order_is_renewal() {
        let marker = RentalMarker::default();
        assert_eq!(classify(&rental_order(), 2, &marker), Some(OrderType::Renewal));
    }

    #[test]
    fn test_residual_has_priority() {
        let order = rental_order().with_line_item(LineItem::with_kind(
            LineItemId::new(),
            LineItemKind::Residual,
            1,
        ));
        assert_eq!(
            classify(&order, 5, &RentalMarker::default()),
            Some(OrderType::Residual)
        );
    }

    #[test]
    fn test_plain_purchase_is_not_classified() {
        let order = Order::new(OrderId::new(), Utc::now())
            .with_line_item(LineItem::product(LineItemId::new(), ProductId::new(), 1));
        assert_eq!(classify(&order, 1, &RentalMarker::default()), None);
        assert_eq!(
            tag_order(&order, 1, &RentalMarker::default()),
            TagOutcome::NotApplicable
        );
    }

    #[test]
    fn test_tag_records_subscription_id() {
        let order = rental_order();
        match tag_order(&order, 1, &RentalMarker::default()) {
            TagOutcome::Tagged {
                order_type,
                subscription_id,
                state,
            } => {
                assert_eq!(order_type, OrderType::Initial);
                assert_eq!(subscription_id, order.subscription_id());
                assert_eq!(state.order_type(), Some(OrderType::Initial));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_residual_tag_uses_marker_subscription() {
        let target = SubscriptionId::new();
        let order = Order::new(OrderId::new(), Utc::now())
            .with_line_item(
                LineItem::with_kind(LineItemId::new(), LineItemKind::Residual, 1)
                    .with_residual_marker(ResidualMarker {
                        subscription_id: None,
                    }),
            )
            .with_line_item(
                LineItem::with_kind(LineItemId::new(), LineItemKind::Residual, 1)
                    .with_residual_marker(ResidualMarker {
                        subscription_id: Some(target),
                    }),
            );

        match tag_order(&order, 0, &RentalMarker::default()) {
            TagOutcome::Tagged {
                subscription_id, ..
            } => assert_eq!(subscription_id, Some(target)),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_tag_is_noop_when_already_tagged() {
        let mut state = OrderCustomState::default();
        state.assign_order_type(OrderType::Renewal, None);
        let order = rental_order().with_custom_state(state, 3);

        assert_eq!(
            tag_order(&order, 1, &RentalMarker::default()),
            TagOutcome::AlreadyTagged(OrderType::Renewal)
        );
    }

    #[test]
    fn test_repeat_delivery_guard() {
        let now = Utc::now();
        let threshold = Duration::seconds(30);
        let entry = |comment: HistoryComment, age: i64| SubscriptionHistoryEntry {
            subscription_id: SubscriptionId::new(),
            comment,
            created_at: now - Duration::seconds(age),
        };

        assert!(!is_repeat_delivery(None, now, threshold));
        assert!(is_repeat_delivery(
            Some(&entry(HistoryComment::Created, 3600)),
            now,
            threshold
        ));
        assert!(is_repeat_delivery(
            Some(&entry(HistoryComment::Renewed, 10)),
            now,
            threshold
        ));
        assert!(!is_repeat_delivery(
            Some(&entry(HistoryComment::Renewed, 30)),
            now,
            threshold
        ));
    }
}
