use std::collections::HashMap;

use crate::domain::model::{
    setting_keys, ConfigValue, DiscountPercentage, RentalMarker, RentalSettings,
    ResidualPurchaseSettings, SalesChannelId,
};
use crate::domain::port::{ConfigReader, Logger, RepositoryError};

const COMPONENT: &str = "SettingsLoader";

/// 販売チャネルの設定を読み出してスナップショットを作る
///
/// 値が無い・型が合わない項目は既定値を使う。
/// 範囲外の割引率はテーブルに入れず警告を出す。
pub async fn load_rental_settings(
    reader: &dyn ConfigReader,
    sales_channel_id: Option<SalesChannelId>,
    logger: &dyn Logger,
) -> Result<RentalSettings, RepositoryError> {
    let mut settings = RentalSettings::default();

    let max_intervals = reader
        .get(setting_keys::NUMBER_OF_DISCOUNTS, sales_channel_id)
        .await?
        .and_then(|value| value.as_u32())
        .unwrap_or(0);
    settings.max_intervals = max_intervals;

    for interval in 1..=max_intervals {
        let key = setting_keys::discount_at_interval(interval);
        let Some(value) = reader.get(&key, sales_channel_id).await? else {
            continue;
        };

        match value.as_f64().map(DiscountPercentage::new) {
            Some(Ok(percentage)) => settings.discount_table.insert(interval, percentage),
            Some(Err(e)) => warn_invalid(logger, &key, &value, &e.to_string()),
            None => warn_invalid(logger, &key, &value, "not a number"),
        }
    }

    if let Some(value) = reader.get(setting_keys::RENTAL_OPTION_NAME, sales_channel_id).await? {
        match value.as_str().map(RentalMarker::new) {
            Some(Ok(marker)) => settings.rental_marker = marker,
            Some(Err(e)) => warn_invalid(logger, setting_keys::RENTAL_OPTION_NAME, &value, &e.to_string()),
            None => warn_invalid(logger, setting_keys::RENTAL_OPTION_NAME, &value, "not a string"),
        }
    }

    if let Some(seconds) = reader
        .get(setting_keys::DUPLICATE_EVENT_THRESHOLD_SECONDS, sales_channel_id)
        .await?
        .and_then(|value| value.as_u32())
    {
        settings.duplicate_event_threshold_seconds = i64::from(seconds);
    }

    settings.residual = load_residual_settings(reader, sales_channel_id, logger).await?;

    logger.debug(
        COMPONENT,
        "Rental settings loaded",
        None,
        Some(HashMap::from([
            ("max_intervals".to_string(), settings.max_intervals.to_string()),
            (
                "discount_entries".to_string(),
                settings.discount_table.len().to_string(),
            ),
            (
                "rental_marker".to_string(),
                settings.rental_marker.as_str().to_string(),
            ),
        ])),
    );

    Ok(settings)
}

async fn load_residual_settings(
    reader: &dyn ConfigReader,
    sales_channel_id: Option<SalesChannelId>,
    logger: &dyn Logger,
) -> Result<ResidualPurchaseSettings, RepositoryError> {
    let mut residual = ResidualPurchaseSettings::default();

    if let Some(active) = reader
        .get(setting_keys::RESIDUAL_PURCHASE_ACTIVE, sales_channel_id)
        .await?
        .and_then(|value| value.as_bool())
    {
        residual.active = active;
    }

    if let Some(interval) = reader
        .get(setting_keys::RESIDUAL_PURCHASE_VALID_UNTIL_INTERVAL, sales_channel_id)
        .await?
        .and_then(|value| value.as_u32())
    {
        residual.valid_until_interval = interval;
    }

    let key = setting_keys::RESIDUAL_PURCHASE_ACKNOWLEDGED_PAYMENT_PERCENTAGE;
    if let Some(value) = reader.get(key, sales_channel_id).await? {
        match value.as_f64().map(DiscountPercentage::new) {
            Some(Ok(percentage)) => residual.acknowledged_payment_percentage = percentage,
            Some(Err(e)) => warn_invalid(logger, key, &value, &e.to_string()),
            None => warn_invalid(logger, key, &value, "not a number"),
        }
    }

    Ok(residual)
}

fn warn_invalid(logger: &dyn Logger, key: &str, value: &ConfigValue, reason: &str) {
    logger.warn(
        COMPONENT,
        "Ignoring invalid configuration value",
        None,
        Some(HashMap::from([
            ("key".to_string(), key.to_string()),
            ("value".to_string(), format!("{:?}", value)),
            ("reason".to_string(), reason.to_string()),
        ])),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct MapReader(HashMap<String, ConfigValue>);

    #[async_trait]
    impl ConfigReader for MapReader {
        async fn get(
            &self,
            key: &str,
            _sales_channel_id: Option<SalesChannelId>,
        ) -> Result<Option<ConfigValue>, RepositoryError> {
            Ok(self.0.get(key).cloned())
        }
    }

    #[derive(Default)]
    struct RecordingLogger {
        warnings: Mutex<Vec<String>>,
    }

    impl Logger for RecordingLogger {
        fn debug(&self, _: &str, _: &str, _: Option<Uuid>, _: Option<HashMap<String, String>>) {}
        fn info(&self, _: &str, _: &str, _: Option<Uuid>, _: Option<HashMap<String, String>>) {}
        fn warn(
            &self,
            _: &str,
            _: &str,
            _: Option<Uuid>,
            context: Option<HashMap<String, String>>,
        ) {
            let key = context
                .and_then(|c| c.get("key").cloned())
                .unwrap_or_default();
            self.warnings.lock().unwrap().push(key);
        }
        fn error(&self, _: &str, _: &str, _: Option<Uuid>, _: Option<HashMap<String, String>>) {}
    }

    #[tokio::test]
    async fn test_loads_discount_table_and_skips_invalid_entries() {
        let reader = MapReader(HashMap::from([
            (setting_keys::NUMBER_OF_DISCOUNTS.to_string(), ConfigValue::Int(3)),
            (setting_keys::discount_at_interval(1), ConfigValue::Int(0)),
            (setting_keys::discount_at_interval(2), ConfigValue::Float(10.0)),
            (setting_keys::discount_at_interval(3), ConfigValue::Int(250)),
            (
                setting_keys::RENTAL_OPTION_NAME.to_string(),
                ConfigValue::Text("Rent".to_string()),
            ),
        ]));
        let logger = RecordingLogger::default();

        let settings = load_rental_settings(&reader, None, &logger).await.unwrap();
        assert_eq!(settings.max_intervals, 3);
        assert_eq!(settings.discount_table.len(), 2);
        assert_eq!(settings.discount_table.get(2).map(|p| p.value()), Some(10.0));
        assert_eq!(settings.rental_marker.as_str(), "Rent");
        assert_eq!(
            *logger.warnings.lock().unwrap(),
            vec![setting_keys::discount_at_interval(3)]
        );
    }

    #[tokio::test]
    async fn test_missing_configuration_uses_defaults() {
        let reader = MapReader(HashMap::new());
        let settings = load_rental_settings(&reader, None, &RecordingLogger::default())
            .await
            .unwrap();
        assert_eq!(settings, RentalSettings::default());
    }

    #[tokio::test]
    async fn test_loads_residual_settings() {
        let reader = MapReader(HashMap::from([
            (
                setting_keys::RESIDUAL_PURCHASE_ACTIVE.to_string(),
                ConfigValue::Bool(true),
            ),
            (
                setting_keys::RESIDUAL_PURCHASE_VALID_UNTIL_INTERVAL.to_string(),
                ConfigValue::Text("6".to_string()),
            ),
            (
                setting_keys::RESIDUAL_PURCHASE_ACKNOWLEDGED_PAYMENT_PERCENTAGE.to_string(),
                ConfigValue::Float(75.0),
            ),
            (
                setting_keys::DUPLICATE_EVENT_THRESHOLD_SECONDS.to_string(),
                ConfigValue::Int(45),
            ),
        ]));
        let settings = load_rental_settings(&reader, None, &RecordingLogger::default())
            .await
            .unwrap();
        assert!(settings.residual.active);
        assert_eq!(settings.residual.valid_until_interval, 6);
        assert_eq!(settings.residual.acknowledged_payment_percentage.value(), 75.0);
        assert_eq!(settings.duplicate_event_threshold_seconds, 45);
    }
}
