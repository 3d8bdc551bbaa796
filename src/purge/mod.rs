//! Purge planning
//!
//! Translates the two purge request modes into bounded deletes: an
//! explicit id list, or a time filter given as a lookback duration XOR an
//! absolute range. Parsed here, executed by the store and the index.

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::ValidationFault;

pub const MAX_PURGE_IDS: usize = 1000;

/// Compiled time/scalar filter for a purge-by-filters request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeFilter {
    pub min_timestamp_ms: i64,
    pub max_timestamp_ms: i64,
    pub environment: Option<String>,
    pub level: Option<String>,
}

/// Query parameters of `DELETE /api/v1/logs/:projectId`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeParams {
    pub lookback_time: Option<String>,
    pub time_range: Option<String>,
    pub env: Option<String>,
    pub level: Option<String>,
}

impl PurgeParams {
    pub fn has_time_selector(&self) -> bool {
        self.lookback_time.is_some() || self.time_range.is_some()
    }

    /// Compile the parameters into a [`PurgeFilter`].
    ///
    /// Exactly one of `lookbackTime` and `timeRange` must be present.
    pub fn plan(&self, now: DateTime<Utc>) -> Result<PurgeFilter, ValidationFault> {
        let (min, max) = match (&self.lookback_time, &self.time_range) {
            (Some(_), Some(_)) => {
                return Err(ValidationFault {
                    field: "lookbackTime",
                    message: "provide either lookbackTime or timeRange, not both",
                })
            }
            (None, None) => {
                return Err(ValidationFault {
                    field: "lookbackTime",
                    message: "a time selector is required: lookbackTime or timeRange",
                })
            }
            (Some(lookback), None) => parse_lookback(lookback, now).ok_or(ValidationFault {
                field: "lookbackTime",
                message: "expected an integer with unit m, h, d, w, or months (e.g. \"5d\")",
            })?,
            (None, Some(range)) => parse_time_range(range).ok_or(ValidationFault {
                field: "timeRange",
                message: "expected \"YYYY-MM-DD to YYYY-MM-DD\" or \"YYYY-MM-DD-HH:MM:SS to YYYY-MM-DD-HH:MM:SS\"",
            })?,
        };

        Ok(PurgeFilter {
            min_timestamp_ms: min,
            max_timestamp_ms: max,
            environment: self.env.clone(),
            level: self.level.clone(),
        })
    }
}

/// Validate a purge-by-ids request body.
pub fn validate_log_ids(ids: &[String]) -> Result<Vec<Uuid>, ValidationFault> {
    if ids.is_empty() {
        return Err(ValidationFault {
            field: "logIds",
            message: "logIds must contain at least one id",
        });
    }
    if ids.len() > MAX_PURGE_IDS {
        return Err(ValidationFault {
            field: "logIds",
            message: "logIds must not exceed 1000 entries",
        });
    }
    ids.iter()
        .map(|raw| {
            raw.parse::<Uuid>().map_err(|_| ValidationFault {
                field: "logIds",
                message: "logIds entries must be log id strings",
            })
        })
        .collect()
}

static LOOKBACK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d+)\s*(mo|months?|m|mins?|minutes?|h|hrs?|hours?|d|days?|w|weeks?)\s*$")
        .expect("lookback pattern is valid")
});

/// Parse a lookback duration such as `5d`, `2h`, `10m`, or `3months` into
/// a `(min, max)` millisecond range ending at `now`.
fn parse_lookback(raw: &str, now: DateTime<Utc>) -> Option<(i64, i64)> {
    let captures = LOOKBACK.captures(raw)?;
    let amount: i64 = captures[1].parse().ok()?;
    let unit = captures[2].to_ascii_lowercase();

    let start = match unit.as_str() {
        "m" | "min" | "mins" | "minute" | "minutes" => now - Duration::minutes(amount),
        "h" | "hr" | "hrs" | "hour" | "hours" => now - Duration::hours(amount),
        "d" | "day" | "days" => now - Duration::days(amount),
        "w" | "week" | "weeks" => now - Duration::weeks(amount),
        "mo" | "month" | "months" => now.checked_sub_months(Months::new(amount.try_into().ok()?))?,
        _ => return None,
    };

    Some((start.timestamp_millis(), now.timestamp_millis()))
}

/// Parse an absolute range: `YYYY-MM-DD to YYYY-MM-DD` (whole days,
/// inclusive) or `YYYY-MM-DD-HH:MM:SS to YYYY-MM-DD-HH:MM:SS`.
fn parse_time_range(raw: &str) -> Option<(i64, i64)> {
    let (from_raw, to_raw) = raw.split_once(" to ")?;
    let from_raw = from_raw.trim();
    let to_raw = to_raw.trim();

    if let (Ok(from), Ok(to)) = (
        NaiveDateTime::parse_from_str(from_raw, "%Y-%m-%d-%H:%M:%S"),
        NaiveDateTime::parse_from_str(to_raw, "%Y-%m-%d-%H:%M:%S"),
    ) {
        let min = Utc.from_utc_datetime(&from).timestamp_millis();
        let max = Utc.from_utc_datetime(&to).timestamp_millis();
        return (min <= max).then_some((min, max));
    }

    let from = NaiveDate::parse_from_str(from_raw, "%Y-%m-%d").ok()?;
    let to = NaiveDate::parse_from_str(to_raw, "%Y-%m-%d").ok()?;
    if from > to {
        return None;
    }
    let min = Utc
        .from_utc_datetime(&from.and_hms_opt(0, 0, 0)?)
        .timestamp_millis();
    // The end date is inclusive: cover it through its last millisecond.
    let max = Utc
        .from_utc_datetime(&to.succ_opt()?.and_hms_opt(0, 0, 0)?)
        .timestamp_millis()
        - 1;
    Some((min, max))
}
