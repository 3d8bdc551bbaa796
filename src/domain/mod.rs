//! Domain types: projects, API keys, logs, alarms, and search requests

pub mod alarm;
pub mod log;
pub mod project;
pub mod query;

pub use alarm::{DeliveryMethod, ProjectAlarm};
pub use log::{LogRecord, LogSubmission, LogType};
pub use project::{ApiKey, ApiKeyConstraints, Project, ProjectUser, Role};
pub use query::{QueryRequest, QuerySpec};

/// A single offending field, surfaced as a 400 with a stable message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFault {
    pub field: &'static str,
    pub message: &'static str,
}

impl ValidationFault {
    pub fn missing(field: &'static str) -> Self {
        ValidationFault {
            field,
            message: "required field is missing or empty",
        }
    }
}

impl std::fmt::Display for ValidationFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationFault {}
