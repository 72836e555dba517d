use crate::adapter::database_error::DatabaseError;
use crate::domain::model::{ConfigValue, SalesChannelId};
use crate::domain::port::{ConfigReader, RepositoryError};
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::{MySql, Pool, Row};

/// 保存形式 {"_value": ...}
#[derive(Debug, Deserialize)]
struct StoredValue {
    #[serde(rename = "_value")]
    value: Option<ConfigValue>,
}

/// MySQL設定リーダー
/// キーは名前空間付きで保存されている（例: "RentalSubscriptions.config.numberOfDiscounts"）
#[derive(Clone)]
pub struct MySqlConfigReader {
    pool: Pool<MySql>,
    namespace: String,
}

impl MySqlConfigReader {
    pub fn new(pool: Pool<MySql>, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}.{}", self.namespace, key)
    }

    fn decode(raw: &str) -> Result<Option<ConfigValue>, RepositoryError> {
        let stored: StoredValue = serde_json::from_str(raw).map_err(|e| {
            RepositoryError::from(DatabaseError::DecodeError(format!(
                "設定値の解析に失敗しました: {}",
                e
            )))
        })?;
        Ok(stored.value)
    }

    async fn fetch(
        &self,
        key: &str,
        sales_channel_id: Option<SalesChannelId>,
    ) -> Result<Option<String>, RepositoryError> {
        let query = match sales_channel_id {
            Some(channel) => sqlx::query(
                "SELECT CAST(configuration_value AS CHAR) AS configuration_value \
                 FROM system_config WHERE configuration_key = ? AND sales_channel_id = ?",
            )
            .bind(key.to_string())
            .bind(channel.to_string()),
            None => sqlx::query(
                "SELECT CAST(configuration_value AS CHAR) AS configuration_value \
                 FROM system_config WHERE configuration_key = ? AND sales_channel_id IS NULL",
            )
            .bind(key.to_string()),
        };

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("設定の取得に失敗しました: {}", e)))
            .map_err(RepositoryError::from)?;

        row.map(|row| {
            row.try_get::<String, _>("configuration_value").map_err(|e| {
                DatabaseError::DecodeError(format!("設定値の取得に失敗しました: {}", e)).into()
            })
        })
        .transpose()
    }
}

#[async_trait]
impl ConfigReader for MySqlConfigReader {
    async fn get(
        &self,
        key: &str,
        sales_channel_id: Option<SalesChannelId>,
    ) -> Result<Option<ConfigValue>, RepositoryError> {
        let full_key = self.full_key(key);

        if sales_channel_id.is_some() {
            if let Some(raw) = self.fetch(&full_key, sales_channel_id).await? {
                if let Some(value) = Self::decode(&raw)? {
                    return Ok(Some(value));
                }
            }
        }

        match self.fetch(&full_key, None).await? {
            Some(raw) => Self::decode(&raw),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_stored_values() {
        assert_eq!(
            MySqlConfigReader::decode(r#"{"_value": 12}"#).unwrap(),
            Some(ConfigValue::Int(12))
        );
        assert_eq!(
            MySqlConfigReader::decode(r#"{"_value": "Mieten"}"#).unwrap(),
            Some(ConfigValue::Text("Mieten".to_string()))
        );
        assert_eq!(
            MySqlConfigReader::decode(r#"{"_value": true}"#).unwrap(),
            Some(ConfigValue::Bool(true))
        );
        assert_eq!(MySqlConfigReader::decode(r#"{"_value": null}"#).unwrap(), None);
        assert!(MySqlConfigReader::decode("not json").is_err());
    }
}
