use crate::adapter::database_error::DatabaseError;
use crate::domain::model::{
    HistoryComment, Subscription, SubscriptionHistoryEntry, SubscriptionId, SubscriptionMetadata,
};
use crate::domain::port::{RepositoryError, SubscriptionRepository};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{MySql, Pool, Row};

/// 決済プロバイダー側で解約できる状態
const CANCELABLE_STATUS: &str = "active";
const CANCELED_STATUS: &str = "canceled";

fn query_err(what: &str, e: sqlx::Error) -> RepositoryError {
    DatabaseError::QueryError(format!("{}: {}", what, e)).into()
}

fn decode_err(what: &str, e: impl std::fmt::Display) -> RepositoryError {
    DatabaseError::DecodeError(format!("{}: {}", what, e)).into()
}

/// MySQLサブスクリプションリポジトリ
/// 解約はローカルのステータス更新のみ（プロバイダーAPIは呼ばない）
#[derive(Clone)]
pub struct MySqlSubscriptionRepository {
    pool: Pool<MySql>,
}

impl MySqlSubscriptionRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for MySqlSubscriptionRepository {
    async fn find_by_id(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query(
            "SELECT CAST(metadata AS CHAR) AS metadata, status FROM subscriptions WHERE id = ?",
        )
        .bind(subscription_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_err("サブスクリプションの取得に失敗しました", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let metadata: Option<String> = row
            .try_get("metadata")
            .map_err(|e| decode_err("metadata", e))?;
        let metadata = match metadata {
            Some(raw) if !raw.is_empty() && raw != "null" => {
                serde_json::from_str::<SubscriptionMetadata>(&raw)
                    .map_err(|e| decode_err("metadata", e))?
            }
            _ => SubscriptionMetadata::default(),
        };
        let status: String = row.try_get("status").map_err(|e| decode_err("status", e))?;

        Ok(Some(Subscription::new(
            subscription_id,
            metadata,
            status == CANCELABLE_STATUS,
        )))
    }

    async fn latest_history_entry(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<SubscriptionHistoryEntry>, RepositoryError> {
        let row = sqlx::query(
            "SELECT comment, created_at FROM subscription_histories \
             WHERE subscription_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(subscription_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_err("履歴の取得に失敗しました", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let comment: String = row
            .try_get("comment")
            .map_err(|e| decode_err("comment", e))?;
        let created_at: NaiveDateTime = row
            .try_get("created_at")
            .map_err(|e| decode_err("created_at", e))?;

        Ok(Some(SubscriptionHistoryEntry {
            subscription_id,
            comment: HistoryComment::from_comment(&comment),
            created_at: DateTime::<Utc>::from_naive_utc_and_offset(created_at, Utc),
        }))
    }

    async fn save_metadata(
        &self,
        subscription_id: SubscriptionId,
        metadata: &SubscriptionMetadata,
    ) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(metadata)
            .map_err(|e| RepositoryError::OperationFailed(format!("metadata: {}", e)))?;

        sqlx::query("UPDATE subscriptions SET metadata = ? WHERE id = ?")
            .bind(json)
            .bind(subscription_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| query_err("メタデータの保存に失敗しました", e))?;

        Ok(())
    }

    async fn cancel(&self, subscription_id: SubscriptionId) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE subscriptions SET status = ?, canceled_at = ? WHERE id = ? AND status = ?",
        )
        .bind(CANCELED_STATUS)
        .bind(Utc::now().naive_utc())
        .bind(subscription_id.to_string())
        .bind(CANCELABLE_STATUS)
        .execute(&self.pool)
        .await
        .map_err(|e| query_err("サブスクリプションの解約に失敗しました", e))?;

        Ok(())
    }
}
