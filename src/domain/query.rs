//! Search request shape and validation
//!
//! The wire request is deserialized loosely (strings where the API defines
//! enums) so that validation can return a stable 400 naming the offending
//! field instead of a serde decode error. `validate` compiles the request
//! into a [`QuerySpec`], applying defaults and the docFilter precedence
//! rule: a document-wide filter supersedes all per-field filters.

use serde::{Deserialize, Serialize};

use super::log::LogType;
use super::ValidationFault;

pub const MAX_PAGE_SIZE: u32 = 1000;
pub const MAX_FILTER_VALUES: usize = 10;

/// How a text phrase is matched against a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    Contains,
    StartsWith,
    EndsWith,
}

impl MatchType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "contains" => Some(MatchType::Contains),
            "startsWith" => Some(MatchType::StartsWith),
            "endsWith" => Some(MatchType::EndsWith),
            _ => None,
        }
    }
}

/// Operator joining the conditions of a compound field filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

/// Sort direction over `timestampMS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// A validated text predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCondition {
    pub phrase: String,
    pub match_type: MatchType,
}

/// A validated compound predicate over one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub operator: FilterOperator,
    pub conditions: Vec<TextCondition>,
}

/// Per-field compound predicates (all optional, ANDed across fields)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldQueries {
    pub message: Option<FieldFilter>,
    pub stack_trace: Option<FieldFilter>,
    pub details: Option<FieldFilter>,
}

impl FieldQueries {
    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.stack_trace.is_none() && self.details.is_none()
    }
}

/// The textual part of a compiled query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextQuery {
    /// Document-wide predicate over message, raw stack trace, and details
    Document(TextCondition),
    /// Per-field compound predicates
    Fields(FieldQueries),
}

/// Compiled, validated query ready for the search index
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub page: u32,
    pub page_size: u32,
    pub levels: Vec<String>,
    pub environments: Vec<String>,
    pub categories: Vec<String>,
    pub hostnames: Vec<String>,
    pub log_type: Option<LogType>,
    pub start_time_ms: Option<i64>,
    pub end_time_ms: Option<i64>,
    pub sort: SortOrder,
    pub text: Option<TextQuery>,
}

/// `string or string[]` wire values
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringOrVec {
    One(String),
    Many(Vec<String>),
}

impl StringOrVec {
    fn into_vec(self) -> Vec<String> {
        match self {
            StringOrVec::One(s) => vec![s],
            StringOrVec::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCondition {
    pub phrase: Option<String>,
    pub match_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFieldFilter {
    pub operator: Option<String>,
    #[serde(default)]
    pub conditions: Vec<RawCondition>,
}

/// Search request body for `POST /api/v1/logs/:projectId/search`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub level: Option<StringOrVec>,
    pub environment: Option<StringOrVec>,
    pub category: Option<StringOrVec>,
    pub hostname: Option<StringOrVec>,
    pub log_type: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub sort_order: Option<String>,
    pub doc_filter: Option<RawCondition>,
    pub message: Option<RawFieldFilter>,
    pub stack_trace: Option<RawFieldFilter>,
    pub details: Option<RawFieldFilter>,
}

impl QueryRequest {
    /// Whether any per-field compound filter is present on the wire.
    pub fn has_field_filters(&self) -> bool {
        self.message.is_some() || self.stack_trace.is_some() || self.details.is_some()
    }

    /// Validate and compile into a [`QuerySpec`].
    pub fn validate(self) -> Result<QuerySpec, ValidationFault> {
        let page = match self.page {
            None => 1,
            Some(0) => {
                return Err(ValidationFault {
                    field: "page",
                    message: "page must be a positive integer",
                })
            }
            Some(p) => p,
        };

        let page_size = match self.page_size {
            None => 50,
            Some(s) if (1..=MAX_PAGE_SIZE).contains(&s) => s,
            Some(_) => {
                return Err(ValidationFault {
                    field: "pageSize",
                    message: "pageSize must be between 1 and 1000",
                })
            }
        };

        let levels = validate_values("level", self.level)?;
        let environments = validate_values("environment", self.environment)?;
        let categories = validate_values("category", self.category)?;
        let hostnames = validate_values("hostname", self.hostname)?;

        let log_type = match self.log_type.as_deref() {
            None => None,
            Some(raw) => Some(LogType::parse(raw).ok_or(ValidationFault {
                field: "logType",
                message: "logType must be one of: application, system",
            })?),
        };

        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(ValidationFault {
                    field: "startTime",
                    message: "startTime must not be greater than endTime",
                });
            }
        }

        let sort = match self.sort_order.as_deref() {
            None => SortOrder::Desc,
            Some("asc") => SortOrder::Asc,
            Some("desc") => SortOrder::Desc,
            Some(_) => {
                return Err(ValidationFault {
                    field: "sortOrder",
                    message: "sortOrder must be \"asc\" or \"desc\"",
                })
            }
        };

        // Document-wide filter supersedes the per-field filters.
        let text = if let Some(raw) = self.doc_filter {
            Some(TextQuery::Document(validate_condition("docFilter", raw)?))
        } else {
            let fields = FieldQueries {
                message: validate_field_filter("message", self.message)?,
                stack_trace: validate_field_filter("stackTrace", self.stack_trace)?,
                details: validate_field_filter("details", self.details)?,
            };
            if fields.is_empty() {
                None
            } else {
                Some(TextQuery::Fields(fields))
            }
        };

        Ok(QuerySpec {
            page,
            page_size,
            levels,
            environments,
            categories,
            hostnames,
            log_type,
            start_time_ms: self.start_time,
            end_time_ms: self.end_time,
            sort,
            text,
        })
    }
}

fn validate_values(
    field: &'static str,
    value: Option<StringOrVec>,
) -> Result<Vec<String>, ValidationFault> {
    let values = match value {
        None => return Ok(vec![]),
        Some(v) => v.into_vec(),
    };
    if values.is_empty() {
        return Err(ValidationFault {
            field,
            message: "filter array must not be empty",
        });
    }
    if values.len() > MAX_FILTER_VALUES {
        return Err(ValidationFault {
            field,
            message: "filter array must not exceed 10 entries",
        });
    }
    if values.iter().any(|v| v.trim().is_empty()) {
        return Err(ValidationFault {
            field,
            message: "filter values must not be blank",
        });
    }
    Ok(values)
}

fn validate_condition(
    field: &'static str,
    raw: RawCondition,
) -> Result<TextCondition, ValidationFault> {
    let phrase = match raw.phrase {
        Some(p) if !p.is_empty() => p,
        _ => {
            return Err(ValidationFault {
                field,
                message: "phrase is required",
            })
        }
    };
    let match_type = raw
        .match_type
        .as_deref()
        .and_then(MatchType::parse)
        .ok_or(ValidationFault {
            field,
            message: "matchType must be one of: contains, startsWith, endsWith",
        })?;
    Ok(TextCondition { phrase, match_type })
}

fn validate_field_filter(
    field: &'static str,
    raw: Option<RawFieldFilter>,
) -> Result<Option<FieldFilter>, ValidationFault> {
    let raw = match raw {
        None => return Ok(None),
        Some(r) => r,
    };
    let operator = match raw.operator.as_deref() {
        Some("AND") => FilterOperator::And,
        Some("OR") => FilterOperator::Or,
        _ => {
            return Err(ValidationFault {
                field,
                message: "compound filter requires operator \"AND\" or \"OR\"",
            })
        }
    };
    if raw.conditions.is_empty() {
        return Err(ValidationFault {
            field,
            message: "compound filter requires at least one condition",
        });
    }
    let conditions = raw
        .conditions
        .into_iter()
        .map(|c| validate_condition(field, c))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(FieldFilter {
        operator,
        conditions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: serde_json::Value) -> QueryRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn defaults_apply() {
        let spec = request(json!({})).validate().unwrap();
        assert_eq!(spec.page, 1);
        assert_eq!(spec.page_size, 50);
        assert_eq!(spec.sort, SortOrder::Desc);
        assert!(spec.text.is_none());
        assert!(spec.levels.is_empty());
    }

    #[test]
    fn single_string_and_array_both_accepted() {
        let spec = request(json!({"level": "error"})).validate().unwrap();
        assert_eq!(spec.levels, vec!["error"]);

        let spec = request(json!({"level": ["error", "warn"]})).validate().unwrap();
        assert_eq!(spec.levels, vec!["error", "warn"]);
    }

    #[test]
    fn empty_and_oversized_arrays_rejected() {
        let err = request(json!({"environment": []})).validate().unwrap_err();
        assert_eq!(err.field, "environment");

        let eleven: Vec<String> = (0..11).map(|i| format!("env{i}")).collect();
        let err = request(json!({"environment": eleven})).validate().unwrap_err();
        assert_eq!(err.field, "environment");
    }

    #[test]
    fn blank_category_rejected() {
        let err = request(json!({"category": ["  "]})).validate().unwrap_err();
        assert_eq!(err.field, "category");
    }

    #[test]
    fn inverted_time_range_rejected() {
        let err = request(json!({"startTime": 200, "endTime": 100}))
            .validate()
            .unwrap_err();
        assert_eq!(err.field, "startTime");
    }

    #[test]
    fn invalid_enums_rejected() {
        assert_eq!(
            request(json!({"logType": "access"})).validate().unwrap_err().field,
            "logType"
        );
        assert_eq!(
            request(json!({"sortOrder": "newest"})).validate().unwrap_err().field,
            "sortOrder"
        );
        assert_eq!(
            request(json!({"pageSize": 1001})).validate().unwrap_err().field,
            "pageSize"
        );
    }

    #[test]
    fn doc_filter_supersedes_field_filters() {
        let req = request(json!({
            "docFilter": {"phrase": "timeout", "matchType": "contains"},
            "message": {"operator": "AND", "conditions": [
                {"phrase": "refused", "matchType": "contains"}
            ]}
        }));
        assert!(req.has_field_filters());
        let spec = req.validate().unwrap();
        match spec.text {
            Some(TextQuery::Document(cond)) => {
                assert_eq!(cond.phrase, "timeout");
                assert_eq!(cond.match_type, MatchType::Contains);
            }
            other => panic!("expected document filter, got {other:?}"),
        }
    }

    #[test]
    fn compound_filter_requires_operator_and_conditions() {
        let err = request(json!({
            "message": {"conditions": [{"phrase": "x", "matchType": "contains"}]}
        }))
        .validate()
        .unwrap_err();
        assert_eq!(err.field, "message");

        let err = request(json!({
            "message": {"operator": "AND", "conditions": []}
        }))
        .validate()
        .unwrap_err();
        assert_eq!(err.field, "message");

        let err = request(json!({
            "stackTrace": {"operator": "OR", "conditions": [
                {"phrase": "x", "matchType": "fuzzy"}
            ]}
        }))
        .validate()
        .unwrap_err();
        assert_eq!(err.field, "stackTrace");
    }
}
