use crate::domain::error::DomainError;
use crate::domain::port::RepositoryError;
use crate::domain::service::ResidualPurchaseError;
use thiserror::Error;

/// アプリケーション層のエラー型
/// ドメインエラー、リポジトリエラー、残価買取の拒否理由をラップする
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// ドメインエラー（ビジネスルール違反）
    #[error("Domain error: {0}")]
    DomainError(#[from] DomainError),
    /// リポジトリエラー（永続化の失敗）
    #[error("Repository error: {0}")]
    RepositoryError(#[from] RepositoryError),
    /// 残価買取を受け付けられない
    #[error("Residual purchase rejected: {0}")]
    ResidualPurchase(#[from] ResidualPurchaseError),
    /// エンティティが見つからない
    #[error("Not found: {0}")]
    NotFound(String),
}
