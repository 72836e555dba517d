// 出力ポート
// ドメイン層が外部に依存する機能をトレイトとして定義
// アダプター層でこれらのトレイトを実装する

use crate::domain::event::HostEvent;
use crate::domain::model::{
    ConfigValue, Order, OrderCustomState, OrderId, OrderState, DeliveryState, Product, ProductId,
    SalesChannelId, StockUpdate, Subscription, SubscriptionHistoryEntry, SubscriptionId,
    SubscriptionMetadata,
};
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

/// ログレベル
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// ロガートレイト
/// ログ出力を抽象化するポート
pub trait Logger: Send + Sync {
    /// デバッグレベルのログを出力
    fn debug(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );

    /// 情報レベルのログを出力
    fn info(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );

    /// 警告レベルのログを出力
    fn warn(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );

    /// エラーレベルのログを出力
    fn error(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );
}

/// リポジトリエラー型
/// リポジトリ操作で発生するエラーを表現する
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum RepositoryError {
    /// データベース接続に失敗
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// 操作に失敗
    #[error("Operation failed: {0}")]
    OperationFailed(String),
    /// データの取得に失敗
    #[error("Fetch failed: {0}")]
    FetchFailed(String),
}

/// 注文リポジトリトレイト
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// 注文IDで注文を検索する
    ///
    /// # Returns
    /// * `Ok(Some(Order))` - 注文が見つかった
    /// * `Ok(None)` - 注文が見つからなかった
    /// * `Err(RepositoryError)` - 検索失敗
    async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// サブスクリプションに紐付く注文を作成日時の昇順で取得する
    /// 先頭が初回注文になる
    async fn find_by_subscription_id(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Order>, RepositoryError>;

    /// サブスクリプションに紐付く注文の件数（判定対象の注文自身を含む）
    async fn count_by_subscription_id(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<u64, RepositoryError>;

    /// カスタム状態を条件付きで保存する
    ///
    /// # Arguments
    /// * `order_id` - 注文ID
    /// * `state` - 保存するカスタム状態
    /// * `expected_revision` - 読み出し時のリビジョン
    ///
    /// # Returns
    /// * `Ok(true)` - 保存成功（リビジョンは1増える）
    /// * `Ok(false)` - 他の処理が先に書き込んだため保存しなかった
    /// * `Err(RepositoryError)` - 保存失敗
    async fn save_custom_state(
        &self,
        order_id: OrderId,
        state: &OrderCustomState,
        expected_revision: u32,
    ) -> Result<bool, RepositoryError>;

    /// 注文と配送のステータスを保存する
    async fn save_states(
        &self,
        order_id: OrderId,
        order_state: OrderState,
        delivery_state: Option<DeliveryState>,
    ) -> Result<(), RepositoryError>;
}

/// 商品リポジトリトレイト
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_id(&self, product_id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// 複数の商品をまとめて取得する
    /// 見つからないIDは結果に含まれない
    async fn find_by_ids(&self, product_ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    /// 在庫数をまとめて保存する
    /// すべて反映されるか、何も反映されないかのどちらか
    async fn save_stock_levels(&self, updates: &[StockUpdate]) -> Result<(), RepositoryError>;

    /// 入荷通知フォームを隠すフラグを保存する
    async fn save_stock_notification(
        &self,
        product_id: ProductId,
        inactive: bool,
    ) -> Result<(), RepositoryError>;
}

/// サブスクリプションリポジトリトレイト
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find_by_id(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<Subscription>, RepositoryError>;

    /// 最新の履歴エントリを取得する
    async fn latest_history_entry(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<SubscriptionHistoryEntry>, RepositoryError>;

    async fn save_metadata(
        &self,
        subscription_id: SubscriptionId,
        metadata: &SubscriptionMetadata,
    ) -> Result<(), RepositoryError>;

    /// サブスクリプションを解約する
    async fn cancel(&self, subscription_id: SubscriptionId) -> Result<(), RepositoryError>;
}

/// 設定読み出しトレイト
/// 販売チャネル指定の値が無い場合は全体設定を返す
#[async_trait]
pub trait ConfigReader: Send + Sync {
    async fn get(
        &self,
        key: &str,
        sales_channel_id: Option<SalesChannelId>,
    ) -> Result<Option<ConfigValue>, RepositoryError>;
}

/// イベントバスエラー
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event publishing failed: {0}")]
    PublishingFailed(String),
}

/// イベントバストレイト
/// イベントの発行と配信を管理するポート
#[async_trait]
pub trait EventBus: Send + Sync {
    /// イベントを発行し、登録されたハンドラーに配信
    async fn publish(&self, event: HostEvent) -> Result<(), EventBusError>;
}
