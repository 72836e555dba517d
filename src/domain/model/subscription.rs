use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::model::SubscriptionId;

/// 残価買取時に設定するステータス
pub const RESIDUAL_PURCHASE_STATUS: &str = "residual_purchase";

/// サブスクリプションのメタデータ
/// 未知のキーは保持したまま書き戻す
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residually_purchased_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SubscriptionMetadata {
    /// activeが未設定ならtrueにする
    /// 変更があった場合はtrueを返す
    pub fn activate_if_unset(&mut self) -> bool {
        if self.active.is_some() {
            return false;
        }
        self.active = Some(true);
        true
    }

    /// 残価買取の印を付ける（未設定の項目のみ）
    pub fn stamp_residual_purchase(&mut self, at: DateTime<Utc>) -> bool {
        let mut changed = false;
        if self.residually_purchased_at.is_none() {
            self.residually_purchased_at = Some(at);
            changed = true;
        }
        if self.status.is_none() {
            self.status = Some(RESIDUAL_PURCHASE_STATUS.to_string());
            changed = true;
        }
        changed
    }
}

/// サブスクリプション
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    id: SubscriptionId,
    metadata: SubscriptionMetadata,
    /// 決済プロバイダー側で解約可能か
    cancelable: bool,
}

impl Subscription {
    pub fn new(id: SubscriptionId, metadata: SubscriptionMetadata, cancelable: bool) -> Self {
        Self {
            id,
            metadata,
            cancelable,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn metadata(&self) -> &SubscriptionMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut SubscriptionMetadata {
        &mut self.metadata
    }

    pub fn is_cancelable(&self) -> bool {
        self.cancelable
    }
}

/// 履歴コメント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryComment {
    Created,
    Renewed,
    Other(String),
}

impl HistoryComment {
    pub fn from_comment(comment: &str) -> Self {
        match comment {
            "created" => HistoryComment::Created,
            "renewed" => HistoryComment::Renewed,
            other => HistoryComment::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HistoryComment::Created => "created",
            HistoryComment::Renewed => "renewed",
            HistoryComment::Other(s) => s.as_str(),
        }
    }
}

/// サブスクリプション履歴の1件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionHistoryEntry {
    pub subscription_id: SubscriptionId,
    pub comment: HistoryComment,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activate_only_when_unset() {
        let mut metadata = SubscriptionMetadata::default();
        assert!(metadata.activate_if_unset());
        assert!(!metadata.activate_if_unset());

        let mut inactive = SubscriptionMetadata {
            active: Some(false),
            ..Default::default()
        };
        assert!(!inactive.activate_if_unset());
        assert_eq!(inactive.active, Some(false));
    }

    #[test]
    fn test_residual_stamp_keeps_existing_values() {
        let earlier = Utc::now() - chrono::Duration::days(1);
        let mut metadata = SubscriptionMetadata {
            status: Some("paused".to_string()),
            residually_purchased_at: Some(earlier),
            ..Default::default()
        };

        assert!(!metadata.stamp_residual_purchase(Utc::now()));
        assert_eq!(metadata.status.as_deref(), Some("paused"));
        assert_eq!(metadata.residually_purchased_at, Some(earlier));

        let mut fresh = SubscriptionMetadata::default();
        assert!(fresh.stamp_residual_purchase(Utc::now()));
        assert_eq!(fresh.status.as_deref(), Some(RESIDUAL_PURCHASE_STATUS));
    }

    #[test]
    fn test_unknown_metadata_keys_survive() {
        let json = r#"{"active":true,"nextPaymentAt":"2024-01-01"}"#;
        let metadata: SubscriptionMetadata = serde_json::from_str(json).unwrap();
        let back = serde_json::to_value(&metadata).unwrap();
        assert_eq!(back["nextPaymentAt"], "2024-01-01");
        assert_eq!(back["active"], true);
    }

    #[test]
    fn test_history_comment_mapping() {
        assert_eq!(HistoryComment::from_comment("created"), HistoryComment::Created);
        assert_eq!(HistoryComment::from_comment("renewed"), HistoryComment::Renewed);
        assert_eq!(
            HistoryComment::from_comment("canceled"),
            HistoryComment::Other("canceled".to_string())
        );
    }
}
