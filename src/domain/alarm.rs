//! Project alarm configuration and match rules

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::log::{LogRecord, LogType};

/// Where a triggered alarm is delivered
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeliveryMethod {
    Email {
        addresses: Vec<String>,
    },
    Slack {
        #[serde(rename = "webhookUrl")]
        webhook_url: String,
    },
    Webhook {
        url: String,
    },
}

/// An alarm configured on a project.
///
/// `level` accepts a single string or a list on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAlarm {
    pub id: Uuid,
    pub log_type: LogType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "level", with = "one_or_many")]
    pub levels: Vec<String>,
    pub environment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    pub delivery_methods: Vec<DeliveryMethod>,
}

impl ProjectAlarm {
    /// Whether this alarm fires for the given log record.
    ///
    /// Requires equal log type and environment, level membership, category
    /// membership when `categories` is configured, and a case-insensitive
    /// substring match when a `message` pattern is configured.
    pub fn matches(&self, log: &LogRecord) -> bool {
        if self.log_type != log.log_type {
            return false;
        }
        if self.environment != log.environment {
            return false;
        }
        if !self.levels.iter().any(|l| l == &log.level) {
            return false;
        }
        if let Some(categories) = &self.categories {
            if !categories.iter().any(|c| c == &log.category) {
                return false;
            }
        }
        if let Some(pattern) = &self.message {
            if !log
                .message
                .to_lowercase()
                .contains(&pattern.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

/// Serde adapter: accept `"error"` or `["error", "warn"]`, emit a list.
mod one_or_many {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    pub fn deserialize<'de, D>(de: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match OneOrMany::deserialize(de)? {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        })
    }

    pub fn serialize<S>(levels: &[String], ser: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        levels.serialize(ser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn log(level: &str, environment: &str, category: &str, message: &str) -> LogRecord {
        LogRecord {
            id: Uuid::new_v4(),
            project_id: "acme-api".into(),
            project_object_id: Uuid::new_v4(),
            level: level.into(),
            environment: environment.into(),
            category: category.into(),
            log_type: LogType::Application,
            hostname: None,
            message: message.into(),
            stack_trace: vec![],
            raw_stack_trace: None,
            details: Default::default(),
            detail_string: None,
            timestamp_ms: 0,
            created_at: Utc::now(),
        }
    }

    fn alarm() -> ProjectAlarm {
        serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "logType": "application",
            "level": ["error", "warn"],
            "environment": "production",
            "deliveryMethods": [
                {"type": "slack", "webhookUrl": "https://hooks.slack.example/T0/B0"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn matches_on_level_set_and_environment() {
        let a = alarm();
        assert!(a.matches(&log("error", "production", "default", "boom")));
        assert!(a.matches(&log("warn", "production", "default", "boom")));
        assert!(!a.matches(&log("info", "production", "default", "boom")));
        assert!(!a.matches(&log("error", "staging", "default", "boom")));
    }

    #[test]
    fn message_pattern_is_case_insensitive_substring() {
        let mut a = alarm();
        a.message = Some("Timeout".into());
        assert!(a.matches(&log("error", "production", "default", "request TIMEOUT after 30s")));
        assert!(!a.matches(&log("error", "production", "default", "connection refused")));
    }

    #[test]
    fn categories_restrict_when_present() {
        let mut a = alarm();
        a.categories = Some(vec!["payments".into()]);
        assert!(a.matches(&log("error", "production", "payments", "boom")));
        assert!(!a.matches(&log("error", "production", "default", "boom")));
    }

    #[test]
    fn single_level_string_deserializes() {
        let a: ProjectAlarm = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "logType": "system",
            "level": "error",
            "environment": "production",
            "deliveryMethods": []
        }))
        .unwrap();
        assert_eq!(a.levels, vec!["error"]);
    }
}
