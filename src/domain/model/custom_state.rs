use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::model::{LineItemId, OrderType, ProductId, StockLevels, SubscriptionId};

/// 在庫貸借の監査記録（明細ごと）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowAudit {
    pub line_item_id: LineItemId,
    /// 貸出元（購入用バリアント）
    pub donor_id: ProductId,
    /// 借り手（サブスクリプション商品）
    pub recipient_id: ProductId,
    pub amount: i64,
    pub donor_before: StockLevels,
    pub donor_after: StockLevels,
    pub recipient_before: StockLevels,
    pub recipient_after: StockLevels,
    pub recorded_at: DateTime<Utc>,
}

/// 注文に保存するカスタム状態
/// 一度立てたフラグは再処理を防ぐために使われる
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCustomState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    order_type: Option<OrderType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subscription_id: Option<SubscriptionId>,
    #[serde(default)]
    stock_increased: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stock_borrowed: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    borrow_audit: Vec<BorrowAudit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stock_returned_at: Option<DateTime<Utc>>,
    /// 処理済みの更新履歴
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    handled_renewals: Vec<Uuid>,
}

impl OrderCustomState {
    pub fn order_type(&self) -> Option<OrderType> {
        self.order_type
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription_id
    }

    pub fn stock_increased(&self) -> bool {
        self.stock_increased
    }

    /// 未設定ならNone、貸借不要ならSome(false)
    pub fn stock_borrowed(&self) -> Option<bool> {
        self.stock_borrowed
    }

    pub fn borrow_audit(&self) -> &[BorrowAudit] {
        &self.borrow_audit
    }

    pub fn stock_returned_at(&self) -> Option<DateTime<Utc>> {
        self.stock_returned_at
    }

    pub fn is_renewal_handled(&self, history_id: Uuid) -> bool {
        self.handled_renewals.contains(&history_id)
    }

    /// 注文種別を設定
    /// 既に設定済みの場合は何もせずfalseを返す
    pub fn assign_order_type(
        &mut self,
        order_type: OrderType,
        subscription_id: Option<SubscriptionId>,
    ) -> bool {
        if self.order_type.is_some() {
            return false;
        }
        self.order_type = Some(order_type);
        self.subscription_id = subscription_id;
        true
    }

    /// 在庫貸借の結果を記録
    pub fn record_stock_borrowed(
        &mut self,
        borrowed: bool,
        audits: Vec<BorrowAudit>,
    ) -> Result<(), DomainError> {
        if self.stock_borrowed.is_some() {
            return Err(DomainError::InvalidStateTransition(
                "在庫貸借は既に記録されています".to_string(),
            ));
        }
        self.stock_borrowed = Some(borrowed);
        self.borrow_audit = audits;
        Ok(())
    }

    pub fn set_stock_increased(&mut self, increased: bool) {
        self.stock_increased = increased;
    }

    /// 在庫返却を記録
    pub fn record_stock_returned(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.stock_returned_at.is_some() {
            return Err(DomainError::InvalidStateTransition(
                "在庫返却は既に記録されています".to_string(),
            ));
        }
        self.stock_returned_at = Some(at);
        Ok(())
    }

    /// 更新履歴の処理を記録
    pub fn record_renewal_handled(&mut self, history_id: Uuid) -> Result<(), DomainError> {
        if self.is_renewal_handled(history_id) {
            return Err(DomainError::InvalidStateTransition(format!(
                "更新履歴は既に処理されています: {}",
                history_id
            )));
        }
        self.handled_renewals.push(history_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_type_is_set_once() {
        let mut state = OrderCustomState::default();
        let subscription_id = SubscriptionId::new();

        assert!(state.assign_order_type(OrderType::Initial, Some(subscription_id)));
        assert!(!state.assign_order_type(OrderType::Renewal, None));
        assert_eq!(state.order_type(), Some(OrderType::Initial));
        assert_eq!(state.subscription_id(), Some(subscription_id));
    }

    #[test]
    fn test_stock_borrowed_is_recorded_once() {
        let mut state = OrderCustomState::default();
        state.record_stock_borrowed(false, Vec::new()).unwrap();
        assert!(state.record_stock_borrowed(true, Vec::new()).is_err());
        assert_eq!(state.stock_borrowed(), Some(false));
    }

    #[test]
    fn test_renewal_is_recorded_once() {
        let mut state = OrderCustomState::default();
        let history_id = Uuid::new_v4();

        assert!(!state.is_renewal_handled(history_id));
        state.record_renewal_handled(history_id).unwrap();
        assert!(state.is_renewal_handled(history_id));
        assert!(state.record_renewal_handled(history_id).is_err());

        let json = serde_json::to_string(&state).unwrap();
        let restored: OrderCustomState = serde_json::from_str(&json).unwrap();
        assert!(restored.is_renewal_handled(history_id));
    }

    #[test]
    fn test_stock_returned_is_recorded_once() {
        let mut state = OrderCustomState::default();
        let now = Utc::now();
        state.record_stock_returned(now).unwrap();
        assert!(state.record_stock_returned(now).is_err());
    }

    #[test]
    fn test_json_omits_unset_fields() {
        let json = serde_json::to_value(OrderCustomState::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "stock_increased": false }));

        let parsed: OrderCustomState =
            serde_json::from_str(r#"{"order_type":"renewal","stock_borrowed":false}"#).unwrap();
        assert_eq!(parsed.order_type(), Some(OrderType::Renewal));
        assert_eq!(parsed.stock_borrowed(), Some(false));
        assert!(!parsed.stock_increased());
    }
}
