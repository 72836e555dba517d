use serde::{Deserialize, Serialize};

use crate::domain::model::{DiscountTable, LineItem, LineItemId, LineItemKind, RentalMarker};

/// 更新回数から割引率を求める
///
/// # Arguments
/// * `interval_index` - 何回目の注文か（1始まり、0以下は1として扱う）
/// * `table` - 回数ごとの割引率
/// * `max_intervals` - 割引テーブルの最大回数（これを超えた回数は最大回数の値を使う）
///
/// # Returns
/// * 割引率（テーブルに値が無い場合は0.0）
pub fn compute_discount_percentage(
    interval_index: i64,
    table: &DiscountTable,
    max_intervals: u32,
) -> f64 {
    let index = interval_index.max(1);
    let effective = index.min(i64::from(max_intervals));

    u32::try_from(effective)
        .ok()
        .and_then(|interval| table.get(interval))
        .map(|percentage| percentage.value())
        .unwrap_or(0.0)
}

/// カート計算に渡すパーセント値引きの定義
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentageDiscount {
    pub key: String,
    pub kind: LineItemKind,
    /// 負の値（例: -20.0）
    pub percentage: f64,
    /// 値引き対象の明細
    pub applies_to: Vec<LineItemId>,
}

impl PercentageDiscount {
    pub const KEY: &'static str = "rental-discount";
}

/// レンタル明細に対する値引き定義を作る
/// 割引率が0（初回注文など）またはレンタル明細が無い場合はNone
pub fn rental_discount_definition(
    line_items: &[LineItem],
    percentage: f64,
    marker: &RentalMarker,
) -> Option<PercentageDiscount> {
    if percentage == 0.0 {
        return None;
    }

    let rental_ids: Vec<LineItemId> = line_items
        .iter()
        .filter(|item| item.is_rental(marker))
        .map(LineItem::id)
        .collect();

    if rental_ids.is_empty() {
        return None;
    }

    Some(PercentageDiscount {
        key: PercentageDiscount::KEY.to_string(),
        kind: LineItemKind::SubscriptionDiscount,
        percentage: -percentage,
        applies_to: rental_ids,
    })
}
