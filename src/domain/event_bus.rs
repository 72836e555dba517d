use crate::domain::event::HostEvent;
use crate::domain::port::RepositoryError;
use async_trait::async_trait;

/// イベントハンドラーエラー
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    #[error("Handler processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Repository error: {0}")]
    RepositoryError(String),
    #[error("Domain error: {0}")]
    DomainError(String),
}

impl From<RepositoryError> for HandlerError {
    fn from(err: RepositoryError) -> Self {
        HandlerError::RepositoryError(err.to_string())
    }
}

impl From<crate::domain::error::DomainError> for HandlerError {
    fn from(err: crate::domain::error::DomainError) -> Self {
        HandlerError::DomainError(err.to_string())
    }
}

/// イベントハンドラートレイト
/// 特定のイベントタイプを処理するハンドラーを定義
#[async_trait]
pub trait EventHandler<E>: Send + Sync {
    async fn handle(&self, event: E) -> Result<(), HandlerError>;
}

/// 型消去されたイベントハンドラー
/// 異なるイベントタイプのハンドラーを統一的に扱うため
#[async_trait]
pub trait DynEventHandler: Send + Sync {
    async fn handle_event(&self, event: &HostEvent) -> Result<(), HandlerError>;
    fn can_handle(&self, event: &HostEvent) -> bool;
    fn handler_name(&self) -> &str;
}

/// イベント種別ごとのハンドラーラッパーを定義する
macro_rules! handler_wrapper {
    ($(#[$meta:meta])* $wrapper:ident, $variant:ident, $default_name:literal) => {
        $(#[$meta])*
        pub struct $wrapper<H>
        where
            H: EventHandler<crate::domain::event::$variant>,
        {
            handler: H,
            name: String,
        }

        impl<H> $wrapper<H>
        where
            H: EventHandler<crate::domain::event::$variant>,
        {
            pub fn new(handler: H) -> Self {
                Self {
                    handler,
                    name: $default_name.to_string(),
                }
            }

            pub fn with_name(handler: H, name: String) -> Self {
                Self { handler, name }
            }
        }

        #[async_trait]
        impl<H> DynEventHandler for $wrapper<H>
        where
            H: EventHandler<crate::domain::event::$variant>,
        {
            async fn handle_event(&self, event: &HostEvent) -> Result<(), HandlerError> {
                match event {
                    HostEvent::$variant(e) => self.handler.handle(e.clone()).await,
                    _ => Err(HandlerError::ProcessingFailed(
                        "Event type mismatch".to_string(),
                    )),
                }
            }

            fn can_handle(&self, event: &HostEvent) -> bool {
                matches!(event, HostEvent::$variant(_))
            }

            fn handler_name(&self) -> &str {
                &self.name
            }
        }
    };
}

handler_wrapper!(
    /// OrderWritten用のハンドラーラッパー
    OrderWrittenHandlerWrapper,
    OrderWritten,
    "OrderWrittenHandler"
);
handler_wrapper!(
    /// OrderTransactionWritten用のハンドラーラッパー
    OrderTransactionWrittenHandlerWrapper,
    OrderTransactionWritten,
    "OrderTransactionWrittenHandler"
);
handler_wrapper!(
    /// SubscriptionWritten用のハンドラーラッパー
    SubscriptionWrittenHandlerWrapper,
    SubscriptionWritten,
    "SubscriptionWrittenHandler"
);
handler_wrapper!(
    /// SubscriptionHistoryWritten用のハンドラーラッパー
    SubscriptionHistoryWrittenHandlerWrapper,
    SubscriptionHistoryWritten,
    "SubscriptionHistoryWrittenHandler"
);
handler_wrapper!(
    /// OrderConverted用のハンドラーラッパー
    OrderConvertedHandlerWrapper,
    OrderConverted,
    "OrderConvertedHandler"
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{OrderConverted, OrderWritten};
    use crate::domain::model::OrderId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler<OrderWritten> for CountingHandler {
        async fn handle(&self, _event: OrderWritten) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_wrapper_dispatches_matching_event() {
        let calls = Arc::new(AtomicUsize::new(0));
        let wrapper = OrderWrittenHandlerWrapper::new(CountingHandler {
            calls: calls.clone(),
        });

        let event = HostEvent::OrderWritten(OrderWritten::new(OrderId::new()));
        assert!(wrapper.can_handle(&event));
        wrapper.handle_event(&event).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(wrapper.handler_name(), "OrderWrittenHandler");
    }

    #[tokio::test]
    async fn test_wrapper_rejects_other_event() {
        let wrapper = OrderWrittenHandlerWrapper::with_name(
            CountingHandler {
                calls: Arc::new(AtomicUsize::new(0)),
            },
            "Tagger".to_string(),
        );

        let event = HostEvent::OrderConverted(OrderConverted::new(None));
        assert!(!wrapper.can_handle(&event));
        assert!(wrapper.handle_event(&event).await.is_err());
        assert_eq!(wrapper.handler_name(), "Tagger");
    }
}
