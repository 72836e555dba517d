use crate::adapter::database_error::DatabaseError;
use crate::domain::model::{
    DeliveryState, LineItem, LineItemId, LineItemKind, Money, Order, OrderCustomState, OrderId,
    OrderState, ProductId, ResidualMarker, SalesChannelId, SubscriptionId, TransactionState,
};
use crate::domain::port::{OrderRepository, RepositoryError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, Pool, Row};
use std::collections::HashMap;

const ORDER_COLUMNS: &str = r#"
    id, sales_channel_id, subscription_id, state, delivery_state, transaction_state,
    amount_net, currency, CAST(custom_state AS CHAR) AS custom_state, revision, created_at
"#;

/// 明細ペイロードのうち判定に使う部分
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineItemPayload {
    /// nullや欠落は空として扱う
    #[serde(default)]
    options: Option<Vec<PayloadOption>>,
    #[serde(default)]
    stock: Option<i64>,
    /// true、またはサブスクリプションIDを持つオブジェクト
    #[serde(default)]
    residual_purchase: Option<serde_json::Value>,
    #[serde(default)]
    subscription_id: Option<String>,
    /// 残価明細に付く買取対象のサブスクリプションID
    #[serde(default)]
    mollie_subscription_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PayloadOption {
    #[serde(default)]
    option: Option<serde_json::Value>,
}

impl LineItemPayload {
    /// 文字列の値を持つオプションだけを返す
    fn option_values(&self) -> Vec<String> {
        self.options
            .iter()
            .flatten()
            .filter_map(|o| o.option.as_ref()?.as_str().map(str::to_string))
            .collect()
    }

    /// 残価明細の目印を組み立てる
    /// residual種別の明細はフラグが無くても残価明細とみなす
    fn residual_marker(&self, kind: &LineItemKind) -> Option<ResidualMarker> {
        let flagged = !matches!(
            self.residual_purchase,
            None | Some(serde_json::Value::Null) | Some(serde_json::Value::Bool(false))
        );
        if !flagged && *kind != LineItemKind::Residual {
            return None;
        }

        let nested_id = self
            .residual_purchase
            .as_ref()
            .and_then(|v| v.get("subscriptionId"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let subscription_id = nested_id
            .or_else(|| self.mollie_subscription_id.clone())
            .or_else(|| self.subscription_id.clone())
            .and_then(|raw| SubscriptionId::from_string(&raw).ok());
        Some(ResidualMarker { subscription_id })
    }
}

fn decode_err(what: &str, e: impl std::fmt::Display) -> RepositoryError {
    DatabaseError::DecodeError(format!("{}: {}", what, e)).into()
}

fn query_err(what: &str, e: sqlx::Error) -> RepositoryError {
    DatabaseError::QueryError(format!("{}: {}", what, e)).into()
}

fn parse_optional_id<T>(
    raw: Option<String>,
    parse: impl Fn(&str) -> Result<T, uuid::Error>,
    what: &str,
) -> Result<Option<T>, RepositoryError> {
    raw.filter(|s| !s.is_empty())
        .map(|s| parse(&s).map_err(|e| decode_err(what, e)))
        .transpose()
}

/// MySQL注文リポジトリ
/// カスタム状態はJSON列に保存し、revision列で楽観的に排他する
#[derive(Clone)]
pub struct MySqlOrderRepository {
    pool: Pool<MySql>,
}

impl MySqlOrderRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    fn order_from_row(row: &MySqlRow) -> Result<Order, RepositoryError> {
        let id: String = row.try_get("id").map_err(|e| decode_err("id", e))?;
        let id = OrderId::from_string(&id).map_err(|e| decode_err("order id", e))?;

        let created_at: NaiveDateTime = row
            .try_get("created_at")
            .map_err(|e| decode_err("created_at", e))?;
        let created_at = DateTime::<Utc>::from_naive_utc_and_offset(created_at, Utc);

        let state: String = row.try_get("state").map_err(|e| decode_err("state", e))?;
        let state = OrderState::from_string(&state).map_err(|e| decode_err("state", e))?;
        let delivery_state: Option<String> = row
            .try_get("delivery_state")
            .map_err(|e| decode_err("delivery_state", e))?;
        let delivery_state = delivery_state
            .map(|s| DeliveryState::from_string(&s))
            .transpose()
            .map_err(|e| decode_err("delivery_state", e))?;
        let transaction_state: String = row
            .try_get("transaction_state")
            .map_err(|e| decode_err("transaction_state", e))?;

        let amount: i64 = row
            .try_get("amount_net")
            .map_err(|e| decode_err("amount_net", e))?;
        let currency: String = row
            .try_get("currency")
            .map_err(|e| decode_err("currency", e))?;
        let amount_net = Money::new(amount, currency).map_err(|e| decode_err("amount_net", e))?;

        let custom_state: Option<String> = row
            .try_get("custom_state")
            .map_err(|e| decode_err("custom_state", e))?;
        let custom_state = match custom_state {
            Some(raw) if !raw.is_empty() && raw != "null" => {
                serde_json::from_str::<OrderCustomState>(&raw)
                    .map_err(|e| decode_err("custom_state", e))?
            }
            _ => OrderCustomState::default(),
        };
        let revision: u32 = row
            .try_get("revision")
            .map_err(|e| decode_err("revision", e))?;

        let mut order = Order::new(id, created_at)
            .with_states(
                state,
                delivery_state,
                TransactionState::from_string(&transaction_state),
            )
            .with_amount_net(amount_net)
            .with_custom_state(custom_state, revision);

        let sales_channel_id: Option<String> = row
            .try_get("sales_channel_id")
            .map_err(|e| decode_err("sales_channel_id", e))?;
        if let Some(channel) =
            parse_optional_id(sales_channel_id, SalesChannelId::from_string, "sales channel id")?
        {
            order = order.with_sales_channel(channel);
        }
        let subscription_id: Option<String> = row
            .try_get("subscription_id")
            .map_err(|e| decode_err("subscription_id", e))?;
        if let Some(subscription) =
            parse_optional_id(subscription_id, SubscriptionId::from_string, "subscription id")?
        {
            order = order.with_subscription(subscription);
        }

        Ok(order)
    }

    fn line_item_from_row(row: &MySqlRow) -> Result<(OrderId, LineItem), RepositoryError> {
        let order_id: String = row
            .try_get("order_id")
            .map_err(|e| decode_err("order_id", e))?;
        let order_id = OrderId::from_string(&order_id).map_err(|e| decode_err("order id", e))?;
        let id: String = row.try_get("id").map_err(|e| decode_err("id", e))?;
        let id = LineItemId::from_string(&id).map_err(|e| decode_err("line item id", e))?;
        let kind: String = row.try_get("type").map_err(|e| decode_err("type", e))?;
        let quantity: i64 = row
            .try_get("quantity")
            .map_err(|e| decode_err("quantity", e))?;
        let product_id: Option<String> = row
            .try_get("product_id")
            .map_err(|e| decode_err("product_id", e))?;
        let payload: Option<String> = row
            .try_get("payload")
            .map_err(|e| decode_err("payload", e))?;
        let payload = match payload {
            Some(raw) if !raw.is_empty() && raw != "null" => {
                serde_json::from_str::<LineItemPayload>(&raw)
                    .map_err(|e| decode_err("payload", e))?
            }
            _ => LineItemPayload::default(),
        };

        let kind = LineItemKind::from_type(&kind);
        let marker = payload.residual_marker(&kind);
        let mut item = LineItem::with_kind(id, kind, quantity)
            .with_options(payload.option_values())
            .with_recorded_stock(payload.stock);
        if let Some(product_id) =
            parse_optional_id(product_id, ProductId::from_string, "product id")?
        {
            item = item.with_product(product_id);
        }
        if let Some(marker) = marker {
            item = item.with_residual_marker(marker);
        }

        Ok((order_id, item))
    }

    /// 注文行と明細行から注文ビューを組み立てる（行の順序を保つ）
    async fn load_orders(&self, rows: Vec<MySqlRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let orders = rows
            .iter()
            .map(Self::order_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let placeholders = vec!["?"; orders.len()].join(", ");
        let sql = format!(
            "SELECT id, order_id, type, product_id, quantity, CAST(payload AS CHAR) AS payload \
             FROM order_line_items WHERE order_id IN ({}) ORDER BY position ASC",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for order in &orders {
            query = query.bind(order.id().to_string());
        }
        let item_rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_err("注文明細の取得に失敗しました", e))?;

        let mut items: HashMap<OrderId, Vec<LineItem>> = HashMap::new();
        for row in &item_rows {
            let (order_id, item) = Self::line_item_from_row(row)?;
            items.entry(order_id).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let line_items = items.remove(&order.id()).unwrap_or_default();
                line_items.into_iter().fold(order, Order::with_line_item)
            })
            .collect())
    }
}

#[async_trait]
impl OrderRepository for MySqlOrderRepository {
    async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(order_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_err("注文の取得に失敗しました", e))?;

        Ok(self.load_orders(rows).await?.into_iter().next())
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM orders WHERE subscription_id = ? ORDER BY created_at ASC",
            ORDER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(subscription_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_err("サブスクリプションの注文取得に失敗しました", e))?;

        self.load_orders(rows).await
    }

    async fn count_by_subscription_id(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS order_count FROM orders WHERE subscription_id = ?")
            .bind(subscription_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_err("注文件数の取得に失敗しました", e))?;

        let count: i64 = row
            .try_get("order_count")
            .map_err(|e| decode_err("order_count", e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn save_custom_state(
        &self,
        order_id: OrderId,
        state: &OrderCustomState,
        expected_revision: u32,
    ) -> Result<bool, RepositoryError> {
        let json = serde_json::to_string(state)
            .map_err(|e| RepositoryError::OperationFailed(format!("custom_state: {}", e)))?;

        let result = sqlx::query(
            "UPDATE orders SET custom_state = ?, revision = revision + 1 \
             WHERE id = ? AND revision = ?",
        )
        .bind(json)
        .bind(order_id.to_string())
        .bind(expected_revision)
        .execute(&self.pool)
        .await
        .map_err(|e| query_err("カスタム状態の保存に失敗しました", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn save_states(
        &self,
        order_id: OrderId,
        order_state: OrderState,
        delivery_state: Option<DeliveryState>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE orders SET state = ?, delivery_state = ? WHERE id = ?")
            .bind(order_state.as_str())
            .bind(delivery_state.map(|s| s.as_str()))
            .bind(order_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| query_err("注文ステータスの保存に失敗しました", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> LineItemPayload {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_payload_with_options_and_stock() {
        let payload = parse(r#"{"options":[{"group":"Art","option":"Mieten"}],"stock":4}"#);
        assert_eq!(payload.option_values(), vec!["Mieten".to_string()]);
        assert_eq!(payload.stock, Some(4));
        assert!(payload.residual_marker(&LineItemKind::Product).is_none());
    }

    #[test]
    fn test_null_or_missing_options_are_empty() {
        let payload = parse(r#"{"options":null,"stock":3}"#);
        assert!(payload.option_values().is_empty());
        assert_eq!(payload.stock, Some(3));

        assert!(parse(r#"{"stock":3}"#).option_values().is_empty());
    }

    #[test]
    fn test_options_without_string_value_are_skipped() {
        let payload = parse(
            r#"{"options":[{"group":"Art"},{"option":null},{"option":7},{"option":"Mieten"}]}"#,
        );
        assert_eq!(payload.option_values(), vec!["Mieten".to_string()]);
    }

    #[test]
    fn test_residual_line_takes_mollie_subscription_id() {
        let subscription_id = SubscriptionId::new();
        let payload = parse(&format!(
            r#"{{"productNumber":"SW10001","mollieSubscriptionId":"{}"}}"#,
            subscription_id
        ));

        assert_eq!(
            payload.residual_marker(&LineItemKind::Residual),
            Some(ResidualMarker {
                subscription_id: Some(subscription_id)
            })
        );
        // 残価フラグの無い商品明細は残価扱いにしない
        assert!(payload.residual_marker(&LineItemKind::Product).is_none());
    }

    #[test]
    fn test_residual_line_without_id_still_has_marker() {
        let payload = parse(r#"{"options":[]}"#);
        assert_eq!(
            payload.residual_marker(&LineItemKind::Residual),
            Some(ResidualMarker {
                subscription_id: None
            })
        );
    }

    #[test]
    fn test_residual_flag_takes_subscription_id_from_payload() {
        let subscription_id = SubscriptionId::new();
        let payload = parse(&format!(
            r#"{{"residualPurchase":true,"subscriptionId":"{}"}}"#,
            subscription_id
        ));
        assert_eq!(
            payload.residual_marker(&LineItemKind::Product),
            Some(ResidualMarker {
                subscription_id: Some(subscription_id)
            })
        );
    }

    #[test]
    fn test_residual_object_and_false_flag() {
        let subscription_id = SubscriptionId::new();
        let nested = parse(&format!(
            r#"{{"residualPurchase":{{"subscriptionId":"{}"}}}}"#,
            subscription_id
        ));
        assert_eq!(
            nested
                .residual_marker(&LineItemKind::Product)
                .and_then(|m| m.subscription_id),
            Some(subscription_id)
        );

        let disabled = parse(r#"{"residualPurchase":false}"#);
        assert!(disabled.residual_marker(&LineItemKind::Product).is_none());
    }

    #[test]
    fn test_unparseable_subscription_id_keeps_marker() {
        let payload = parse(r#"{"residualPurchase":true,"subscriptionId":"sub_123"}"#);
        assert_eq!(
            payload.residual_marker(&LineItemKind::Product),
            Some(ResidualMarker {
                subscription_id: None
            })
        );
    }
}
