use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::error::DomainError;
use crate::domain::model::{DiscountPercentage, RentalMarker};

/// 販売チャネル設定のキー名
pub mod setting_keys {
    pub const NUMBER_OF_DISCOUNTS: &str = "numberOfDiscounts";
    pub const RENTAL_OPTION_NAME: &str = "rentalOptionName";
    pub const DUPLICATE_EVENT_THRESHOLD_SECONDS: &str = "duplicateEventThresholdSeconds";
    pub const RESIDUAL_PURCHASE_ACTIVE: &str = "residualPurchaseActive";
    pub const RESIDUAL_PURCHASE_VALID_UNTIL_INTERVAL: &str = "residualPurchaseValidUntilInterval";
    pub const RESIDUAL_PURCHASE_ACKNOWLEDGED_PAYMENT_PERCENTAGE: &str =
        "residualPurchaseAcknowledgedPaymentPercentage";

    /// 指定回目の割引率キー
    pub fn discount_at_interval(interval: u32) -> String {
        format!("rentDiscountPercentageAtInterval{}", interval)
    }
}

/// 設定値
/// ホストの設定はJSONで保存されているため、型は読み出し側で解釈する
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ConfigValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Int(v) => Some(*v as f64),
            ConfigValue::Float(v) => Some(*v),
            ConfigValue::Text(s) => s.trim().parse().ok(),
            ConfigValue::Bool(_) => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            ConfigValue::Int(v) => u32::try_from(*v).ok(),
            ConfigValue::Float(v) if v.fract() == 0.0 && *v >= 0.0 => Some(*v as u32),
            ConfigValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            ConfigValue::Int(v) => Some(*v != 0),
            ConfigValue::Text(s) => match s.as_str() {
                "true" | "1" => Some(true),
                "false" | "0" | "" => Some(false),
                _ => None,
            },
            ConfigValue::Float(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// 更新回数ごとの割引率テーブル（1始まり）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscountTable(BTreeMap<u32, DiscountPercentage>);

impl DiscountTable {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// (回数, 割引率) の組から作成
    /// 範囲外の割引率が含まれる場合はエラー
    pub fn from_pairs<I>(pairs: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = (u32, f64)>,
    {
        let mut table = Self::new();
        for (interval, percentage) in pairs {
            table.insert(interval, DiscountPercentage::new(percentage)?);
        }
        Ok(table)
    }

    pub fn insert(&mut self, interval: u32, percentage: DiscountPercentage) {
        self.0.insert(interval, percentage);
    }

    pub fn get(&self, interval: u32) -> Option<DiscountPercentage> {
        self.0.get(&interval).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 残価買取の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualPurchaseSettings {
    pub active: bool,
    /// 何回目の注文まで買取を受け付けるか
    pub valid_until_interval: u32,
    /// 支払済み金額のうち買取価格から差し引く割合
    pub acknowledged_payment_percentage: DiscountPercentage,
}

impl Default for ResidualPurchaseSettings {
    fn default() -> Self {
        Self {
            active: false,
            valid_until_interval: 0,
            acknowledged_payment_percentage: DiscountPercentage::zero(),
        }
    }
}

/// 販売チャネル単位の設定スナップショット
/// 判定関数にはこれを渡し、設定の読み出しは境界で一度だけ行う
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalSettings {
    pub discount_table: DiscountTable,
    pub max_intervals: u32,
    pub rental_marker: RentalMarker,
    pub duplicate_event_threshold_seconds: i64,
    pub residual: ResidualPurchaseSettings,
}

impl RentalSettings {
    pub const DEFAULT_DUPLICATE_EVENT_THRESHOLD_SECONDS: i64 = 30;

    pub fn duplicate_event_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.duplicate_event_threshold_seconds)
    }
}

impl Default for RentalSettings {
    fn default() -> Self {
        Self {
            discount_table: DiscountTable::new(),
            max_intervals: 0,
            rental_marker: RentalMarker::default(),
            duplicate_event_threshold_seconds: Self::DEFAULT_DUPLICATE_EVENT_THRESHOLD_SECONDS,
            residual: ResidualPurchaseSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_value_parsing() {
        assert_eq!(ConfigValue::Text("12".to_string()).as_u32(), Some(12));
        assert_eq!(ConfigValue::Float(12.0).as_u32(), Some(12));
        assert_eq!(ConfigValue::Int(-1).as_u32(), None);
        assert_eq!(ConfigValue::Int(10).as_f64(), Some(10.0));
        assert_eq!(ConfigValue::Text("true".to_string()).as_bool(), Some(true));
        assert_eq!(ConfigValue::Bool(true).as_f64(), None);
    }

    #[test]
    fn test_config_value_from_json() {
        let value: ConfigValue = serde_json::from_str("20.5").unwrap();
        assert_eq!(value, ConfigValue::Float(20.5));
        let value: ConfigValue = serde_json::from_str("\"Mieten\"").unwrap();
        assert_eq!(value.as_str(), Some("Mieten"));
    }

    #[test]
    fn test_discount_table_rejects_out_of_range() {
        assert!(DiscountTable::from_pairs([(1, 0.0), (2, 150.0)]).is_err());
        let table = DiscountTable::from_pairs([(1, 0.0), (2, 10.0)]).unwrap();
        assert_eq!(table.get(2).map(|p| p.value()), Some(10.0));
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn test_discount_key_format() {
        assert_eq!(
            setting_keys::discount_at_interval(4),
            "rentDiscountPercentageAtInterval4"
        );
    }
}
