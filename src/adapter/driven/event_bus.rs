use crate::domain::event::HostEvent;
use crate::domain::event_bus::{
    DynEventHandler, EventHandler, HandlerError, OrderConvertedHandlerWrapper,
    OrderTransactionWrittenHandlerWrapper, OrderWrittenHandlerWrapper,
    SubscriptionHistoryWrittenHandlerWrapper, SubscriptionWrittenHandlerWrapper,
};
use crate::domain::event::{
    OrderConverted, OrderTransactionWritten, OrderWritten, SubscriptionHistoryWritten,
    SubscriptionWritten,
};
use crate::domain::port::{EventBus, EventBusError, Logger};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// 失敗したイベント処理の記録
/// 再実行はしない（ホストの再配信とフラグによる冪等性に任せる）
#[derive(Debug, Clone)]
pub struct FailedEvent {
    pub event: HostEvent,
    pub handler_name: String,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// イベントバス設定
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// 失敗記録の最大件数（超えたら古いものから捨てる）
    pub failed_event_log_size: usize,
    /// ハンドラータイムアウト
    pub handler_timeout: Duration,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            failed_event_log_size: 1000,
            handler_timeout: Duration::from_secs(30),
        }
    }
}

/// インメモリイベントバス実装
/// 登録順にハンドラーを呼び、失敗はログに出して記録するだけで呼び出し元には返さない
pub struct InMemoryEventBus {
    handlers: Arc<RwLock<Vec<Box<dyn DynEventHandler>>>>,
    failed_events: Arc<Mutex<VecDeque<FailedEvent>>>,
    config: EventBusConfig,
    logger: Arc<dyn Logger>,
}

impl InMemoryEventBus {
    pub fn new(config: EventBusConfig, logger: Arc<dyn Logger>) -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            failed_events: Arc::new(Mutex::new(VecDeque::new())),
            config,
            logger,
        }
    }

    /// タイムアウト付きでハンドラーを実行
    async fn execute_handler(
        &self,
        handler: &dyn DynEventHandler,
        event: &HostEvent,
    ) -> Result<(), HandlerError> {
        match tokio::time::timeout(self.config.handler_timeout, handler.handle_event(event)).await {
            Ok(result) => result,
            Err(_) => Err(HandlerError::ProcessingFailed(format!(
                "Handler timed out after {}ms",
                self.config.handler_timeout.as_millis()
            ))),
        }
    }

    async fn record_failure(&self, event: &HostEvent, handler_name: &str, error: &HandlerError) {
        self.logger.error(
            "InMemoryEventBus",
            &format!("Handler {} failed: {}", handler_name, error),
            Some(event.metadata().correlation_id),
            Some(HashMap::from([
                ("event_type".to_string(), event.event_type().to_string()),
                ("handler".to_string(), handler_name.to_string()),
                (
                    "event_id".to_string(),
                    event
                        .metadata()
                        .event_id
                        .map(|id| id.to_string())
                        .unwrap_or_default(),
                ),
            ])),
        );

        let mut failed = self.failed_events.lock().await;
        if failed.len() >= self.config.failed_event_log_size {
            failed.pop_front();
        }
        failed.push_back(FailedEvent {
            event: event.clone(),
            handler_name: handler_name.to_string(),
            error: error.to_string(),
            failed_at: Utc::now(),
        });
    }

    /// 記録された失敗を取得（古い順）
    pub async fn failed_events(&self) -> Vec<FailedEvent> {
        self.failed_events.lock().await.iter().cloned().collect()
    }

    async fn subscribe(&self, handler: Box<dyn DynEventHandler>) -> Result<(), EventBusError> {
        let mut handlers = self.handlers.write().await;
        if handlers
            .iter()
            .any(|h| h.handler_name() == handler.handler_name())
        {
            return Err(EventBusError::PublishingFailed(format!(
                "Handler {} is already registered",
                handler.handler_name()
            )));
        }
        handlers.push(handler);
        Ok(())
    }

    /// OrderWrittenハンドラーを登録
    pub async fn subscribe_order_written<H>(&self, handler: H) -> Result<(), EventBusError>
    where
        H: EventHandler<OrderWritten> + 'static,
    {
        self.subscribe(Box::new(OrderWrittenHandlerWrapper::new(handler)))
            .await
    }

    /// OrderTransactionWrittenハンドラーを登録
    pub async fn subscribe_order_transaction_written<H>(
        &self,
        handler: H,
    ) -> Result<(), EventBusError>
    where
        H: EventHandler<OrderTransactionWritten> + 'static,
    {
        self.subscribe(Box::new(OrderTransactionWrittenHandlerWrapper::new(handler)))
            .await
    }

    /// SubscriptionWrittenハンドラーを登録
    pub async fn subscribe_subscription_written<H>(&self, handler: H) -> Result<(), EventBusError>
    where
        H: EventHandler<SubscriptionWritten> + 'static,
    {
        self.subscribe(Box::new(SubscriptionWrittenHandlerWrapper::new(handler)))
            .await
    }

    /// SubscriptionHistoryWrittenハンドラーを登録
    pub async fn subscribe_subscription_history_written<H>(
        &self,
        handler: H,
    ) -> Result<(), EventBusError>
    where
        H: EventHandler<SubscriptionHistoryWritten> + 'static,
    {
        self.subscribe(Box::new(SubscriptionHistoryWrittenHandlerWrapper::new(
            handler,
        )))
        .await
    }

    /// OrderConvertedハンドラーを登録
    pub async fn subscribe_order_converted<H>(&self, handler: H) -> Result<(), EventBusError>
    where
        H: EventHandler<OrderConverted> + 'static,
    {
        self.subscribe(Box::new(OrderConvertedHandlerWrapper::new(handler)))
            .await
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: HostEvent) -> Result<(), EventBusError> {
        let handlers = self.handlers.read().await;

        for handler in handlers.iter().filter(|h| h.can_handle(&event)) {
            if let Err(error) = self.execute_handler(handler.as_ref(), &event).await {
                self.record_failure(&event, handler.handler_name(), &error)
                    .await;
            }
        }

        Ok(())
    }
}

impl Clone for InMemoryEventBus {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
            failed_events: self.failed_events.clone(),
            config: self.config.clone(),
            logger: self.logger.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::driven::TracingLogger;
    use crate::domain::model::OrderId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing;

    #[async_trait]
    impl EventHandler<OrderWritten> for Failing {
        async fn handle(&self, _event: OrderWritten) -> Result<(), HandlerError> {
            Err(HandlerError::ProcessingFailed("boom".to_string()))
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler<OrderTransactionWritten> for Counting {
        async fn handle(&self, _event: OrderTransactionWritten) -> Result<(), HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Slow;

    #[async_trait]
    impl EventHandler<OrderConverted> for Slow {
        async fn handle(&self, _event: OrderConverted) -> Result<(), HandlerError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        }
    }

    fn bus(config: EventBusConfig) -> InMemoryEventBus {
        InMemoryEventBus::new(config, Arc::new(TracingLogger::new()))
    }

    #[tokio::test]
    async fn test_failures_are_recorded_not_returned() {
        let bus = bus(EventBusConfig::default());
        bus.subscribe_order_written(Failing).await.unwrap();

        let result = bus
            .publish(HostEvent::OrderWritten(OrderWritten::new(OrderId::new())))
            .await;
        assert!(result.is_ok());

        let failed = bus.failed_events().await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].handler_name, "OrderWrittenHandler");
        assert!(failed[0].error.contains("boom"));
    }

    #[tokio::test]
    async fn test_only_matching_handlers_run() {
        let bus = bus(EventBusConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        bus.subscribe_order_transaction_written(Counting(calls.clone()))
            .await
            .unwrap();
        bus.subscribe_order_written(Failing).await.unwrap();

        bus.publish(HostEvent::OrderTransactionWritten(
            OrderTransactionWritten::new(OrderId::new()),
        ))
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(bus.failed_events().await.is_empty());
    }

    #[tokio::test]
    async fn test_handler_timeout_is_recorded() {
        let bus = bus(EventBusConfig {
            handler_timeout: Duration::from_millis(20),
            ..EventBusConfig::default()
        });
        bus.subscribe_order_converted(Slow).await.unwrap();

        bus.publish(HostEvent::OrderConverted(OrderConverted::new(None)))
            .await
            .unwrap();

        let failed = bus.failed_events().await;
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error.contains("timed out"));
    }

    #[tokio::test]
    async fn test_failed_event_log_is_bounded() {
        let bus = bus(EventBusConfig {
            failed_event_log_size: 2,
            ..EventBusConfig::default()
        });
        bus.subscribe_order_written(Failing).await.unwrap();

        for _ in 0..3 {
            bus.publish(HostEvent::OrderWritten(OrderWritten::new(OrderId::new())))
                .await
                .unwrap();
        }

        assert_eq!(bus.failed_events().await.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let bus = bus(EventBusConfig::default());
        bus.subscribe_order_written(Failing).await.unwrap();
        assert!(bus.subscribe_order_written(Failing).await.is_err());
    }
}
