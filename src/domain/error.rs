use thiserror::Error;

/// ドメイン層のエラー型
/// ビジネスルール違反を表現する
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// 無効な状態遷移（例: 完了済みの注文を再度処理しようとした）
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
    /// 貸出元の在庫不足
    #[error("Insufficient donor stock: required {required}, available {available}")]
    InsufficientDonorStock { required: i64, available: i64 },
    /// 無効な数量（例: 0以下の数量）
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),
    /// 通貨の不一致
    #[error("Currency mismatch")]
    CurrencyMismatch,
    /// 無効な値
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
