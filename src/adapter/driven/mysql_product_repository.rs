use crate::adapter::database_error::DatabaseError;
use crate::domain::model::{Product, ProductId, StockUpdate};
use crate::domain::port::{ProductRepository, RepositoryError};
use async_trait::async_trait;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, Pool, Row};

/// MySQL商品リポジトリ
#[derive(Clone)]
pub struct MySqlProductRepository {
    pool: Pool<MySql>,
}

impl MySqlProductRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    fn product_from_row(row: &MySqlRow) -> Result<Product, RepositoryError> {
        let decode = |e: sqlx::Error| -> RepositoryError {
            DatabaseError::DecodeError(format!("商品の解析に失敗しました: {}", e)).into()
        };
        let parse_id = |raw: &str| -> Result<ProductId, RepositoryError> {
            ProductId::from_string(raw).map_err(|e| {
                DatabaseError::DecodeError(format!("商品IDの解析に失敗しました: {}", e)).into()
            })
        };

        let id: String = row.try_get("id").map_err(decode)?;
        let stock: i64 = row.try_get("stock").map_err(decode)?;
        let available_stock: i64 = row.try_get("available_stock").map_err(decode)?;
        let subscription_enabled: bool = row.try_get("subscription_enabled").map_err(decode)?;
        let buy_variant_id: Option<String> = row.try_get("buy_variant_id").map_err(decode)?;
        let stock_notification_inactive: Option<bool> = row
            .try_get("stock_notification_inactive")
            .map_err(decode)?;

        let product = Product::new(parse_id(&id)?, stock, available_stock)
            .with_stock_notification(stock_notification_inactive);
        if !subscription_enabled {
            return Ok(product);
        }
        let buy_variant_id = buy_variant_id
            .filter(|s| !s.is_empty())
            .map(|s| parse_id(&s))
            .transpose()?;
        Ok(product.with_subscription(buy_variant_id))
    }
}

#[async_trait]
impl ProductRepository for MySqlProductRepository {
    async fn find_by_id(&self, product_id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, stock, available_stock, subscription_enabled, buy_variant_id, \
             stock_notification_inactive \
             FROM products WHERE id = ?",
        )
        .bind(product_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("商品の取得に失敗しました: {}", e)))
        .map_err(RepositoryError::from)?;

        row.as_ref().map(Self::product_from_row).transpose()
    }

    async fn find_by_ids(&self, product_ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; product_ids.len()].join(", ");
        let sql = format!(
            "SELECT id, stock, available_stock, subscription_enabled, buy_variant_id, \
             stock_notification_inactive \
             FROM products WHERE id IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in product_ids {
            query = query.bind(id.to_string());
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("商品一覧の取得に失敗しました: {}", e)))
            .map_err(RepositoryError::from)?;

        rows.iter().map(Self::product_from_row).collect()
    }

    async fn save_stock_levels(&self, updates: &[StockUpdate]) -> Result<(), RepositoryError> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| {
                DatabaseError::ConnectionError(format!("トランザクション開始に失敗しました: {}", e))
            })
            .map_err(RepositoryError::from)?;

        for update in updates {
            let result = sqlx::query(
                "UPDATE products SET stock = ?, available_stock = ? WHERE id = ?",
            )
            .bind(update.levels.stock)
            .bind(update.levels.available_stock)
            .bind(update.product_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("在庫の保存に失敗しました: {}", e)))
            .map_err(RepositoryError::from)?;

            // 値が同じ場合もrows_affectedは0になるので、存在を確かめてから失敗にする
            if result.rows_affected() == 0 {
                let exists = sqlx::query("SELECT 1 FROM products WHERE id = ?")
                    .bind(update.product_id.to_string())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| {
                        DatabaseError::QueryError(format!("商品の確認に失敗しました: {}", e))
                    })
                    .map_err(RepositoryError::from)?;
                if exists.is_none() {
                    return Err(RepositoryError::OperationFailed(format!(
                        "商品が見つかりません: {}",
                        update.product_id
                    )));
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::QueryError(format!("コミットに失敗しました: {}", e)))
            .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn save_stock_notification(
        &self,
        product_id: ProductId,
        inactive: bool,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE products SET stock_notification_inactive = ? WHERE id = ?")
            .bind(inactive)
            .bind(product_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DatabaseError::QueryError(format!("入荷通知フラグの保存に失敗しました: {}", e))
            })
            .map_err(RepositoryError::from)?;

        Ok(())
    }
}
