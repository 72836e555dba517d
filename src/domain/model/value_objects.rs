use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

/// UUIDをラップする識別子型を定義する
/// ホスト側の主キーはすべてUUIDなので、型だけを分けて取り違えを防ぐ
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// 新しい一意の識別子を生成
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// UUIDから識別子を作成
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// 文字列から識別子を作成
            /// ハイフンなしの16進表記も受け付ける
            pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
                let uuid = Uuid::parse_str(s)?;
                Ok(Self(uuid))
            }

            /// 内部のUUIDを取得
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

uuid_identifier!(
    /// 注文の一意識別子
    OrderId
);
uuid_identifier!(
    /// 注文明細の一意識別子
    LineItemId
);
uuid_identifier!(
    /// 商品の一意識別子
    ProductId
);
uuid_identifier!(
    /// サブスクリプションの一意識別子
    SubscriptionId
);
uuid_identifier!(
    /// 販売チャネルの一意識別子
    SalesChannelId
);

/// 通貨
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    /// ユーロ
    #[allow(clippy::upper_case_acronyms)]
    EUR,
}

/// 金額を表す値オブジェクト
/// 最小通貨単位（セント）で保持する
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: i64,
    currency: Currency,
}

impl Money {
    /// 金額と通貨から作成
    pub fn new(amount: i64, currency: String) -> Result<Self, DomainError> {
        let currency = match currency.as_str() {
            "EUR" => Currency::EUR,
            _ => {
                return Err(DomainError::InvalidValue(format!(
                    "サポートされていない通貨: {}",
                    currency
                )))
            }
        };
        Ok(Self { amount, currency })
    }

    /// ユーロの金額を作成（セント単位）
    pub fn eur(amount: i64) -> Self {
        Self {
            amount,
            currency: Currency::EUR,
        }
    }

    /// 金額を取得
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// 通貨を文字列として取得
    pub fn currency(&self) -> String {
        match self.currency {
            Currency::EUR => "EUR".to_string(),
        }
    }

    /// 金額を加算
    pub fn add(&self, other: &Money) -> Result<Money, DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch);
        }
        Ok(Money {
            amount: self.amount + other.amount,
            currency: self.currency,
        })
    }

    /// 符号を反転（値引き明細用）
    pub fn negate(&self) -> Money {
        Money {
            amount: -self.amount,
            currency: self.currency,
        }
    }

    /// 指定パーセントの金額を計算
    /// 最小通貨単位に四捨五入する
    pub fn percentage(&self, percent: f64) -> Money {
        let raw = self.amount as f64 * percent / 100.0;
        Money {
            amount: raw.round() as i64,
            currency: self.currency,
        }
    }
}

/// 割引率（0〜100%）
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct DiscountPercentage(f64);

impl DiscountPercentage {
    /// 割引率を作成
    /// 0〜100の有限値のみ受け付ける
    pub fn new(value: f64) -> Result<Self, DomainError> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(DomainError::InvalidValue(format!(
                "割引率は0〜100の範囲で指定してください: {}",
                value
            )));
        }
        Ok(Self(value))
    }

    /// 割引なし
    pub fn zero() -> Self {
        Self(0.0)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for DiscountPercentage {
    type Error = DomainError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DiscountPercentage> for f64 {
    fn from(value: DiscountPercentage) -> Self {
        value.0
    }
}

/// 注文種別
/// サブスクリプション内での注文の位置付けを表す
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// 初回注文
    Initial,
    /// 更新注文（2回目以降の定期課金）
    Renewal,
    /// 残価買取注文
    Residual,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Initial => "initial",
            OrderType::Renewal => "renewal",
            OrderType::Residual => "residual",
        }
    }

    /// 文字列からOrderTypeを作成
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "initial" => Ok(OrderType::Initial),
            "renewal" => Ok(OrderType::Renewal),
            "residual" => Ok(OrderType::Residual),
            _ => Err(DomainError::InvalidValue(format!("無効な注文種別: {}", s))),
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 注文ステータス（ホストのステートマシンの技術名に対応）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    /// 受付済み
    Open,
    /// 処理中
    InProgress,
    /// 完了
    Completed,
    /// キャンセル済み
    Cancelled,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Open => "open",
            OrderState::InProgress => "in_progress",
            OrderState::Completed => "completed",
            OrderState::Cancelled => "cancelled",
        }
    }

    /// 技術名からOrderStateを作成
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "open" => Ok(OrderState::Open),
            "in_progress" => Ok(OrderState::InProgress),
            "completed" => Ok(OrderState::Completed),
            "cancelled" => Ok(OrderState::Cancelled),
            _ => Err(DomainError::InvalidValue(format!(
                "無効な注文ステータス: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 配送ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Open,
    Shipped,
    Cancelled,
    Returned,
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::Open => "open",
            DeliveryState::Shipped => "shipped",
            DeliveryState::Cancelled => "cancelled",
            DeliveryState::Returned => "returned",
        }
    }

    /// 技術名からDeliveryStateを作成
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "open" => Ok(DeliveryState::Open),
            "shipped" => Ok(DeliveryState::Shipped),
            "cancelled" => Ok(DeliveryState::Cancelled),
            "returned" => Ok(DeliveryState::Returned),
            _ => Err(DomainError::InvalidValue(format!(
                "無効な配送ステータス: {}",
                s
            ))),
        }
    }
}

/// 決済ステータス
/// ホストには多数の状態があるため、判定に使わないものはOtherにまとめる
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Open,
    Paid,
    PartiallyPaid,
    Authorized,
    Cancelled,
    Failed,
    Refunded,
    Other,
}

impl TransactionState {
    /// 技術名からTransactionStateを作成
    pub fn from_string(s: &str) -> Self {
        match s {
            "open" => TransactionState::Open,
            "paid" => TransactionState::Paid,
            "paid_partially" => TransactionState::PartiallyPaid,
            "authorized" => TransactionState::Authorized,
            "cancelled" => TransactionState::Cancelled,
            "failed" => TransactionState::Failed,
            "refunded" => TransactionState::Refunded,
            _ => TransactionState::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Open => "open",
            TransactionState::Paid => "paid",
            TransactionState::PartiallyPaid => "paid_partially",
            TransactionState::Authorized => "authorized",
            TransactionState::Cancelled => "cancelled",
            TransactionState::Failed => "failed",
            TransactionState::Refunded => "refunded",
            TransactionState::Other => "other",
        }
    }

    /// 在庫処理を開始してよい決済状態か
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            TransactionState::Paid | TransactionState::PartiallyPaid | TransactionState::Authorized
        )
    }
}

/// 注文明細の種別（ホストの明細タイプ文字列に対応）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineItemKind {
    /// 通常の商品明細
    Product,
    /// 残価買取の商品明細
    Residual,
    /// 残価買取の値引き明細
    ResidualDiscount,
    /// レンタル更新時の値引き明細
    SubscriptionDiscount,
    /// その他（プロモーションなど）
    Other(String),
}

impl LineItemKind {
    pub fn from_type(s: &str) -> Self {
        match s {
            "product" => LineItemKind::Product,
            "residual" => LineItemKind::Residual,
            "residual-discount" => LineItemKind::ResidualDiscount,
            "rent_interval_discount" => LineItemKind::SubscriptionDiscount,
            other => LineItemKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LineItemKind::Product => "product",
            LineItemKind::Residual => "residual",
            LineItemKind::ResidualDiscount => "residual-discount",
            LineItemKind::SubscriptionDiscount => "rent_interval_discount",
            LineItemKind::Other(s) => s.as_str(),
        }
    }
}

/// レンタルを示すオプション値
/// 商品オプションの値がすべてこの値と一致する明細をレンタル明細とみなす
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalMarker(String);

impl RentalMarker {
    pub const DEFAULT: &'static str = "Mieten";

    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::InvalidValue(
                "レンタルオプション名が空です".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, option: &str) -> bool {
        self.0 == option
    }
}

impl Default for RentalMarker {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}
