//! Log record model and submission normalization

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::ValidationFault;

/// Kind of log record a producer can submit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Application,
    System,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Application => "application",
            LogType::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "application" => Some(LogType::Application),
            "system" => Some(LogType::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored log record
///
/// `detail_string` and `raw_stack_trace` hold the serialized forms of
/// `details` and `stack_trace`; both are `None` exactly when the source
/// value is empty. Text search runs against the serialized forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub id: Uuid,
    pub project_id: String,
    pub project_object_id: Uuid,
    pub level: String,
    pub environment: String,
    pub category: String,
    pub log_type: LogType,
    pub hostname: Option<String>,
    pub message: String,
    pub stack_trace: Vec<Value>,
    pub raw_stack_trace: Option<String>,
    pub details: Map<String, Value>,
    pub detail_string: Option<String>,
    #[serde(rename = "timestampMS")]
    pub timestamp_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// Producer submission body for `POST /api/v1/logs`
///
/// All fields are optional at the serde layer so that validation can name
/// the first missing field instead of surfacing a generic decode error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSubmission {
    pub level: Option<String>,
    pub environment: Option<String>,
    pub project_id: Option<String>,
    pub message: Option<String>,
    pub log_type: Option<String>,
    pub category: Option<String>,
    pub hostname: Option<String>,
    #[serde(default)]
    pub stack_trace: Vec<Value>,
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(rename = "timestampMS")]
    pub timestamp_ms: Option<i64>,
}

impl LogSubmission {
    /// Validate the payload shape and produce a normalized record.
    ///
    /// `level`, `environment`, `projectId`, `message`, and `logType` are
    /// required; `category` falls back to `"default"` when omitted or
    /// blank; `timestampMS` falls back to the server clock.
    pub fn normalize(
        self,
        project_object_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<LogRecord, ValidationFault> {
        let level = require_nonblank("level", self.level)?;
        let environment = require_nonblank("environment", self.environment)?;
        let project_id = require_nonblank("projectId", self.project_id)?;
        let message = match self.message {
            Some(m) if !m.is_empty() => m,
            _ => return Err(ValidationFault::missing("message")),
        };
        let log_type = match self.log_type.as_deref() {
            None => return Err(ValidationFault::missing("logType")),
            Some(raw) => LogType::parse(raw).ok_or(ValidationFault {
                field: "logType",
                message: "logType must be one of: application, system",
            })?,
        };

        let category = match self.category {
            Some(c) if !c.trim().is_empty() => c,
            _ => "default".to_string(),
        };

        let detail_string = serialize_nonempty(&Value::Object(self.details.clone()));
        let raw_stack_trace = serialize_nonempty(&Value::Array(self.stack_trace.clone()));

        Ok(LogRecord {
            id: Uuid::new_v4(),
            project_id,
            project_object_id,
            level,
            environment,
            category,
            log_type,
            hostname: self.hostname,
            message,
            stack_trace: self.stack_trace,
            raw_stack_trace,
            details: self.details,
            detail_string,
            timestamp_ms: self.timestamp_ms.unwrap_or_else(|| now.timestamp_millis()),
            created_at: now,
        })
    }
}

fn require_nonblank(
    field: &'static str,
    value: Option<String>,
) -> Result<String, ValidationFault> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationFault::missing(field)),
    }
}

fn serialize_nonempty(value: &Value) -> Option<String> {
    let empty = match value {
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => true,
    };
    if empty {
        None
    } else {
        serde_json::to_string(value).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission() -> LogSubmission {
        LogSubmission {
            level: Some("error".into()),
            environment: Some("production".into()),
            project_id: Some("acme-api".into()),
            message: Some("connection refused".into()),
            log_type: Some("application".into()),
            ..Default::default()
        }
    }

    #[test]
    fn normalizes_a_minimal_submission() {
        let now = Utc::now();
        let log = submission().normalize(Uuid::new_v4(), now).unwrap();

        assert_eq!(log.category, "default");
        assert_eq!(log.log_type, LogType::Application);
        assert_eq!(log.timestamp_ms, now.timestamp_millis());
        assert!(log.detail_string.is_none());
        assert!(log.raw_stack_trace.is_none());
    }

    #[test]
    fn detail_string_is_null_iff_details_empty() {
        let mut sub = submission();
        sub.details = serde_json::from_value(json!({"userId": 42})).unwrap();
        let log = sub.normalize(Uuid::new_v4(), Utc::now()).unwrap();

        let detail_string = log.detail_string.expect("details were non-empty");
        assert!(detail_string.contains("userId"));

        let empty = submission().normalize(Uuid::new_v4(), Utc::now()).unwrap();
        assert!(empty.detail_string.is_none());
    }

    #[test]
    fn raw_stack_trace_mirrors_stack_trace() {
        let mut sub = submission();
        sub.stack_trace = vec![json!({"file": "main.rs", "line": 7})];
        let log = sub.normalize(Uuid::new_v4(), Utc::now()).unwrap();
        assert!(log.raw_stack_trace.unwrap().contains("main.rs"));
    }

    #[test]
    fn blank_category_falls_back_to_default() {
        let mut sub = submission();
        sub.category = Some("   ".into());
        let log = sub.normalize(Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(log.category, "default");
    }

    #[test]
    fn missing_fields_name_the_offender() {
        let mut sub = submission();
        sub.environment = None;
        let err = sub.normalize(Uuid::new_v4(), Utc::now()).unwrap_err();
        assert_eq!(err.field, "environment");

        let mut sub = submission();
        sub.log_type = Some("access".into());
        let err = sub.normalize(Uuid::new_v4(), Utc::now()).unwrap_err();
        assert_eq!(err.field, "logType");
    }

    #[test]
    fn explicit_timestamp_is_preserved() {
        let mut sub = submission();
        sub.timestamp_ms = Some(1_700_000_000_000);
        let log = sub.normalize(Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(log.timestamp_ms, 1_700_000_000_000);
    }
}
