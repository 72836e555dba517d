use crate::domain::model::{Product, StockLevels};

/// 貸借を考慮した販売可否
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityKind {
    /// 自分の在庫で販売できる、または貸借の対象外
    OwnStock,
    /// 購入用バリアントの在庫を借りて販売できる
    Borrowable,
    /// 購入用バリアントにも在庫が無い
    SoldOut,
}

/// 商品ページと一覧に反映する販売可否
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub kind: AvailabilityKind,
    /// 商品ページの購入上限（Noneはホストの既定値のまま）
    pub max_purchase: Option<i64>,
    /// 一覧・検索に表示する在庫（Noneは実在庫のまま）
    pub listed_stock: Option<StockLevels>,
    /// 入荷通知フォームを隠すか（Noneは変更しない）
    pub notification_inactive: Option<bool>,
}

impl Availability {
    fn own_stock() -> Self {
        Self {
            kind: AvailabilityKind::OwnStock,
            max_purchase: None,
            listed_stock: None,
            notification_inactive: None,
        }
    }

    pub fn is_purchasable(&self, product: &Product) -> bool {
        match self.kind {
            AvailabilityKind::OwnStock => product.available_stock() > 0,
            AvailabilityKind::Borrowable => true,
            AvailabilityKind::SoldOut => false,
        }
    }
}

/// 販売可能在庫が尽きたサブスクリプション商品を、購入用バリアントの在庫で販売できるか判定する
///
/// 購入上限は自分と貸出元の販売可能在庫の合計、一覧には在庫1として表示する。
/// `donor`が貸借関係の相手でなければ見つからなかったものとして扱う。
pub fn borrowable_availability(product: &Product, donor: Option<&Product>) -> Availability {
    if product.available_stock() > 0 {
        return Availability::own_stock();
    }
    let Some(relation) = product.borrow_relation() else {
        return Availability::own_stock();
    };

    let own = product.available_stock().max(0);
    let donor_available = donor
        .filter(|d| d.id() == relation.borrow_from_product_id)
        .map(|d| d.available_stock())
        .filter(|available| *available > 0);

    match donor_available {
        Some(available) => Availability {
            kind: AvailabilityKind::Borrowable,
            max_purchase: Some(own + available),
            listed_stock: Some(StockLevels::new(1, 1)),
            notification_inactive: Some(true),
        },
        None => Availability {
            kind: AvailabilityKind::SoldOut,
            max_purchase: Some(own),
            listed_stock: None,
            notification_inactive: Some(false),
        },
    }
}

/// 入荷通知フラグの書き込みが必要なら新しい値を返す
/// 未設定の商品には無効化（true）だけを書き込む
pub fn notification_change(product: &Product, availability: &Availability) -> Option<bool> {
    let desired = availability.notification_inactive?;
    match product.stock_notification_inactive() {
        Some(current) if current == desired => None,
        None if !desired => None,
        _ => Some(desired),
    }
}
