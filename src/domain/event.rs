use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::model::{OrderId, SubscriptionId, TransactionState};

/// イベントメタデータ
/// ホストがイベントIDを付けない場合もあるため、event_idは任意
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default)]
    pub event_id: Option<Uuid>,
    #[serde(default = "Uuid::new_v4")]
    pub correlation_id: Uuid,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    /// 新しいメタデータを作成
    pub fn new(event_id: Option<Uuid>) -> Self {
        Self {
            event_id,
            correlation_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new(None)
    }
}

/// ホストイベント列挙型
/// ホストのエンティティ書き込みなどを型付きで表現する
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "event_data")]
pub enum HostEvent {
    /// 注文が書き込まれた
    OrderWritten(OrderWritten),
    /// 注文の決済が更新された
    OrderTransactionWritten(OrderTransactionWritten),
    /// サブスクリプションが書き込まれた
    SubscriptionWritten(SubscriptionWritten),
    /// サブスクリプション履歴が書き込まれた
    SubscriptionHistoryWritten(SubscriptionHistoryWritten),
    /// 更新注文がカートから変換された
    OrderConverted(OrderConverted),
}

impl HostEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            HostEvent::OrderWritten(_) => "OrderWritten",
            HostEvent::OrderTransactionWritten(_) => "OrderTransactionWritten",
            HostEvent::SubscriptionWritten(_) => "SubscriptionWritten",
            HostEvent::SubscriptionHistoryWritten(_) => "SubscriptionHistoryWritten",
            HostEvent::OrderConverted(_) => "OrderConverted",
        }
    }

    pub fn metadata(&self) -> &EventMetadata {
        match self {
            HostEvent::OrderWritten(e) => &e.metadata,
            HostEvent::OrderTransactionWritten(e) => &e.metadata,
            HostEvent::SubscriptionWritten(e) => &e.metadata,
            HostEvent::SubscriptionHistoryWritten(e) => &e.metadata,
            HostEvent::OrderConverted(e) => &e.metadata,
        }
    }
}

/// 注文書き込みイベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderWritten {
    #[serde(default)]
    pub metadata: EventMetadata,
    pub order_id: OrderId,
}

impl OrderWritten {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            metadata: EventMetadata::default(),
            order_id,
        }
    }
}

/// 決済更新イベント
/// 更新操作のみを対象とし、状態はペイロードの値ではなく再取得した注文の値を使う
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTransactionWritten {
    #[serde(default)]
    pub metadata: EventMetadata,
    pub order_id: OrderId,
    /// ペイロードに含まれていた決済状態（ログ用）
    #[serde(default)]
    pub reported_state: Option<TransactionState>,
}

impl OrderTransactionWritten {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            metadata: EventMetadata::default(),
            order_id,
            reported_state: None,
        }
    }
}

/// サブスクリプション書き込みイベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionWritten {
    #[serde(default)]
    pub metadata: EventMetadata,
    pub subscription_id: SubscriptionId,
    /// 新規作成かどうか
    #[serde(default)]
    pub created: bool,
}

impl SubscriptionWritten {
    pub fn new(subscription_id: SubscriptionId, created: bool) -> Self {
        Self {
            metadata: EventMetadata::default(),
            subscription_id,
            created,
        }
    }
}

/// サブスクリプション履歴書き込みイベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionHistoryWritten {
    #[serde(default)]
    pub metadata: EventMetadata,
    pub subscription_id: SubscriptionId,
    /// 書き込まれた履歴のID
    pub history_id: Uuid,
    /// 履歴コメント（"created"、"renewed" など）
    pub comment: String,
}

impl SubscriptionHistoryWritten {
    pub fn new(
        subscription_id: SubscriptionId,
        history_id: Uuid,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            metadata: EventMetadata::default(),
            subscription_id,
            history_id,
            comment: comment.into(),
        }
    }
}

/// 注文変換イベント
/// 決済プロバイダーが初回注文を元に更新注文を作るときに発生する
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConverted {
    #[serde(default)]
    pub metadata: EventMetadata,
    /// 変換元の注文に紐付くサブスクリプションID
    #[serde(default)]
    pub subscription_id: Option<SubscriptionId>,
}

impl OrderConverted {
    pub fn new(subscription_id: Option<SubscriptionId>) -> Self {
        Self {
            metadata: EventMetadata::default(),
            subscription_id,
        }
    }
}
