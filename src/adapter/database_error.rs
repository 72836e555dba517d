use crate::domain::port::RepositoryError;
use thiserror::Error;

/// データベースエラー型
/// データベース操作で発生するエラーを表現する
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatabaseError {
    /// データベース接続エラー
    #[error("Database connection error: {0}")]
    ConnectionError(String),
    /// SQLクエリエラー
    #[error("Database query error: {0}")]
    QueryError(String),
    /// マイグレーションエラー
    #[error("Migration error: {0}")]
    MigrationError(String),
    /// 保存されている値を読めない
    #[error("Invalid stored value: {0}")]
    DecodeError(String),
}

impl From<DatabaseError> for RepositoryError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ConnectionError(msg) => RepositoryError::ConnectionFailed(msg),
            DatabaseError::QueryError(msg) => RepositoryError::OperationFailed(msg),
            DatabaseError::MigrationError(msg) => RepositoryError::OperationFailed(msg),
            DatabaseError::DecodeError(msg) => RepositoryError::FetchFailed(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_to_repository_error() {
        assert_eq!(
            RepositoryError::from(DatabaseError::ConnectionError("down".to_string())),
            RepositoryError::ConnectionFailed("down".to_string())
        );
        assert_eq!(
            RepositoryError::from(DatabaseError::DecodeError("bad uuid".to_string())),
            RepositoryError::FetchFailed("bad uuid".to_string())
        );
    }
}
