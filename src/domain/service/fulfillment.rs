use crate::domain::model::{DeliveryState, OrderState};

/// 注文・配送の状態遷移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// 配送: open -> shipped
    ShipDelivery,
    /// 注文: open -> in_progress
    Process,
    /// 注文: in_progress -> completed
    Complete,
}

/// 注文を完了させるための遷移計画
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionPlan {
    pub transitions: Vec<Transition>,
    pub final_order_state: OrderState,
    pub final_delivery_state: Option<DeliveryState>,
    /// in_progress -> completed を通過するか（在庫返却のきっかけ）
    pub crosses_completion_edge: bool,
}

impl CompletionPlan {
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// 決済済みの更新・残価買取注文を完了させる遷移を計画する
///
/// 配送がopenなら発送し、注文がopenなら処理中にしてから完了にする。
/// 完了済み・キャンセル済みの注文は空の計画になる。
pub fn plan_completion(
    order_state: OrderState,
    delivery_state: Option<DeliveryState>,
) -> CompletionPlan {
    let mut transitions = Vec::new();
    let mut final_delivery_state = delivery_state;

    if matches!(order_state, OrderState::Completed | OrderState::Cancelled) {
        return CompletionPlan {
            transitions,
            final_order_state: order_state,
            final_delivery_state,
            crosses_completion_edge: false,
        };
    }

    if delivery_state == Some(DeliveryState::Open) {
        transitions.push(Transition::ShipDelivery);
        final_delivery_state = Some(DeliveryState::Shipped);
    }

    if order_state == OrderState::Open {
        transitions.push(Transition::Process);
    }
    transitions.push(Transition::Complete);

    CompletionPlan {
        transitions,
        final_order_state: OrderState::Completed,
        final_delivery_state,
        crosses_completion_edge: true,
    }
}
