use crate::domain::event::HostEvent;
use thiserror::Error;

/// シリアライゼーションエラー
#[derive(Debug, Error, Clone)]
pub enum SerializationError {
    #[error("JSON serialization failed: {message}. Event type: {event_type}")]
    JsonSerializationFailed { message: String, event_type: String },

    #[error("JSON deserialization failed: {message}. Expected type: {expected_type}, Input: {input_preview}")]
    JsonDeserializationFailed {
        message: String,
        expected_type: String,
        input_preview: String,
    },

    #[error("Missing required field: {field_name} in event type {event_type}")]
    MissingRequiredField {
        field_name: String,
        event_type: String,
    },

    #[error("Event schema validation failed: {validation_error} for event type {event_type}")]
    SchemaValidationFailed {
        validation_error: String,
        event_type: String,
    },

    #[error("Unsupported event format: {format}")]
    UnsupportedEventFormat { format: String },
}

impl SerializationError {
    /// 入力データのプレビューを生成（デバッグ用、最大100文字）
    fn create_input_preview(input: &str) -> String {
        if input.chars().count() <= 100 {
            input.to_string()
        } else {
            let head: String = input.chars().take(97).collect();
            format!("{}...", head)
        }
    }

    /// JSONデシリアライゼーションエラーを作成
    pub fn json_deserialization_failed(message: String, input: &str) -> Self {
        Self::JsonDeserializationFailed {
            message,
            expected_type: "HostEvent".to_string(),
            input_preview: Self::create_input_preview(input),
        }
    }
}

/// イベントシリアライザー
/// {"event_type": ..., "event_data": {...}} 形式のエンベロープを扱う
pub struct EventSerializer;

impl EventSerializer {
    pub fn new() -> Self {
        Self
    }

    /// ホストイベントをJSONにシリアライズ
    pub fn serialize_event(&self, event: &HostEvent) -> Result<String, SerializationError> {
        self.validate_event(event)?;

        serde_json::to_string(event).map_err(|e| SerializationError::JsonSerializationFailed {
            message: e.to_string(),
            event_type: event.event_type().to_string(),
        })
    }

    /// JSONからホストイベントにデシリアライズ
    pub fn deserialize_event(&self, json: &str) -> Result<HostEvent, SerializationError> {
        if json.trim().is_empty() {
            return Err(SerializationError::JsonDeserializationFailed {
                message: "Empty JSON input".to_string(),
                expected_type: "HostEvent".to_string(),
                input_preview: "".to_string(),
            });
        }

        // JSONの構文検証
        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| {
            SerializationError::json_deserialization_failed(
                format!("Invalid JSON syntax: {}", e),
                json,
            )
        })?;

        // エンベロープの必須フィールド
        for field in ["event_type", "event_data"] {
            if value.get(field).is_none() {
                return Err(SerializationError::MissingRequiredField {
                    field_name: field.to_string(),
                    event_type: value
                        .get("event_type")
                        .and_then(|v| v.as_str())
                        .unwrap_or("Unknown")
                        .to_string(),
                });
            }
        }

        let event = serde_json::from_value::<HostEvent>(value)
            .map_err(|e| self.analyze_deserialization_error(&e, json))?;

        self.validate_event(&event)?;
        Ok(event)
    }

    /// メタデータの整合性チェック
    fn validate_event(&self, event: &HostEvent) -> Result<(), SerializationError> {
        let metadata = event.metadata();

        if metadata.correlation_id.is_nil() {
            return Err(SerializationError::SchemaValidationFailed {
                validation_error: "correlation_id must not be nil".to_string(),
                event_type: event.event_type().to_string(),
            });
        }

        if metadata.event_id.is_some_and(|id| id.is_nil()) {
            return Err(SerializationError::SchemaValidationFailed {
                validation_error: "event_id must not be nil when present".to_string(),
                event_type: event.event_type().to_string(),
            });
        }

        Ok(())
    }

    /// デシリアライゼーションエラーの詳細分析
    fn analyze_deserialization_error(
        &self,
        serde_error: &serde_json::Error,
        json: &str,
    ) -> SerializationError {
        let error_msg = serde_error.to_string();

        if error_msg.contains("missing field") {
            let field_name = error_msg
                .split("missing field `")
                .nth(1)
                .and_then(|s| s.split('`').next())
                .unwrap_or("unknown");

            SerializationError::MissingRequiredField {
                field_name: field_name.to_string(),
                event_type: "Unknown".to_string(),
            }
        } else if error_msg.contains("unknown variant") {
            SerializationError::UnsupportedEventFormat { format: error_msg }
        } else {
            SerializationError::json_deserialization_failed(error_msg, json)
        }
    }
}

impl Default for EventSerializer {
    fn default() -> Self {
        Self::new()
    }
}
