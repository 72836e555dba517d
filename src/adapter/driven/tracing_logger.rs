use crate::domain::port::{LogLevel, Logger};
use std::collections::HashMap;
use uuid::Uuid;

/// tracingによるログ実装
/// コンポーネント名・相関ID・コンテキストを構造化フィールドとして出力する
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }

    /// コンテキストをキー順に並べて1つのフィールドにまとめる
    fn format_context(context: Option<HashMap<String, String>>) -> String {
        let Some(context) = context else {
            return String::new();
        };
        let mut pairs: Vec<(String, String)> = context.into_iter().collect();
        pairs.sort();
        pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn log(
        &self,
        level: LogLevel,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        let correlation_id = correlation_id.map(|id| id.to_string()).unwrap_or_default();
        let context = Self::format_context(context);

        match level {
            LogLevel::Debug => {
                tracing::debug!(component, correlation_id = %correlation_id, context = %context, "{}", message)
            }
            LogLevel::Info => {
                tracing::info!(component, correlation_id = %correlation_id, context = %context, "{}", message)
            }
            LogLevel::Warning => {
                tracing::warn!(component, correlation_id = %correlation_id, context = %context, "{}", message)
            }
            LogLevel::Error => {
                tracing::error!(component, correlation_id = %correlation_id, context = %context, "{}", message)
            }
        }
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for TracingLogger {
    fn debug(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        self.log(LogLevel::Debug, component, message, correlation_id, context);
    }

    fn info(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        self.log(LogLevel::Info, component, message, correlation_id, context);
    }

    fn warn(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        self.log(LogLevel::Warning, component, message, correlation_id, context);
    }

    fn error(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        self.log(LogLevel::Error, component, message, correlation_id, context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_is_sorted_by_key() {
        let context = HashMap::from([
            ("order_id".to_string(), "o-1".to_string()),
            ("amount".to_string(), "3".to_string()),
        ]);
        assert_eq!(
            TracingLogger::format_context(Some(context)),
            "amount=3, order_id=o-1"
        );
        assert_eq!(TracingLogger::format_context(None), "");
    }

    #[test]
    fn test_logging_without_subscriber_does_not_panic() {
        let logger = TracingLogger::new();
        logger.info("Test", "hello", Some(Uuid::new_v4()), None);
        logger.error("Test", "failure", None, Some(HashMap::new()));
    }
}
