//! Core domain model for herobot: date ranges, the weekday walk, and stat records.

use std::iter::FusedIterator;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub const CRATE_NAME: &str = "herobot-core";

/// Wire format for every calendar date accepted or emitted by the service.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be a date formatted as YYYY-MM-DD, got {value:?}")]
    MalformedDate { field: &'static str, value: String },
    #[error("start_date {start} is after end_date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
}

/// Inclusive calendar range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = ValidationError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse both bounds with [`DATE_FORMAT`] and check ordering.
    pub fn parse(start: &str, end: &str) -> Result<Self, ValidationError> {
        let start = parse_date("start_date", start)?;
        let end = parse_date("end_date", end)?;
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Every occurrence of `weekday` inside the range, ascending.
    ///
    /// The returned iterator is lazy and cheap to clone; calling this again
    /// restarts the walk from the first occurrence.
    pub fn weekdays(&self, weekday: Weekday) -> WeekdayWalk {
        WeekdayWalk::new(self, weekday)
    }

    pub fn mondays(&self) -> WeekdayWalk {
        self.weekdays(Weekday::Mon)
    }
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        ValidationError::MalformedDate {
            field,
            value: value.to_string(),
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekdayWalk {
    next: Option<NaiveDate>,
    end: NaiveDate,
}

impl WeekdayWalk {
    fn new(range: &DateRange, weekday: Weekday) -> Self {
        let offset = (7 + weekday.num_days_from_monday()
            - range.start.weekday().num_days_from_monday())
            % 7;
        let first = range
            .start
            .checked_add_days(Days::new(u64::from(offset)))
            .filter(|d| *d <= range.end);
        Self {
            next: first,
            end: range.end,
        }
    }
}

impl Iterator for WeekdayWalk {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next?;
        self.next = current
            .checked_add_days(Days::new(7))
            .filter(|d| *d <= self.end);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.next {
            Some(next) => ((self.end - next).num_days() / 7 + 1) as usize,
            None => 0,
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for WeekdayWalk {}

impl FusedIterator for WeekdayWalk {}

/// Result of a single stats API call, tagged by whether the upstream answered 2xx.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    Success { status: u16, payload: JsonValue },
    Failure { status: u16, payload: JsonValue },
}

impl FetchOutcome {
    pub fn from_status(status: u16, payload: JsonValue) -> Self {
        if (200..300).contains(&status) {
            Self::Success { status, payload }
        } else {
            Self::Failure { status, payload }
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Success { status, .. } | Self::Failure { status, .. } => *status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn into_payload(self) -> JsonValue {
        match self {
            Self::Success { payload, .. } | Self::Failure { payload, .. } => payload,
        }
    }
}

/// Which fetch outcomes reach the persistence sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorePolicy {
    /// Persist whatever the upstream returned, error bodies included.
    #[default]
    Always,
    SuccessOnly,
}

impl StorePolicy {
    pub fn admits(&self, outcome: &FetchOutcome) -> bool {
        match self {
            Self::Always => true,
            Self::SuccessOnly => outcome.is_success(),
        }
    }
}

impl std::str::FromStr for StorePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "success-only" | "success_only" => Ok(Self::SuccessOnly),
            other => Err(format!("unknown store policy {other:?}")),
        }
    }
}

/// One persisted stats snapshot for an entity on a given date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    pub ocid: String,
    pub date: NaiveDate,
    pub upstream_status: u16,
    pub payload: JsonValue,
}

impl StatRecord {
    pub fn from_outcome(ocid: impl Into<String>, date: NaiveDate, outcome: FetchOutcome) -> Self {
        let upstream_status = outcome.status();
        Self {
            ocid: ocid.into(),
            date,
            upstream_status,
            payload: outcome.into_payload(),
        }
    }
}

/// Summary returned to the caller of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionResult {
    pub ocid: String,
    pub from: String,
    pub to: String,
    /// Number of records written.
    pub mondays: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub skipped: usize,
    pub status: String,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn january_2024_mondays() {
        let range = DateRange::parse("2024-01-01", "2024-01-31").unwrap();
        let dates: Vec<String> = range
            .mondays()
            .map(|d| d.format(DATE_FORMAT).to_string())
            .collect();
        assert_eq!(
            dates,
            ["2024-01-01", "2024-01-08", "2024-01-15", "2024-01-22", "2024-01-29"]
        );
    }

    #[test]
    fn start_mid_week_rolls_forward() {
        let range = DateRange::parse("2024-01-03", "2024-01-20").unwrap();
        let dates: Vec<_> = range.mondays().collect();
        assert_eq!(dates, vec![ymd(2024, 1, 8), ymd(2024, 1, 15)]);
    }

    #[test]
    fn range_without_target_weekday_is_empty() {
        let range = DateRange::parse("2024-01-02", "2024-01-07").unwrap();
        assert_eq!(range.mondays().count(), 0);
        assert_eq!(range.mondays().len(), 0);
    }

    #[test]
    fn single_day_range_on_monday() {
        let range = DateRange::parse("2024-01-08", "2024-01-08").unwrap();
        assert_eq!(range.mondays().collect::<Vec<_>>(), vec![ymd(2024, 1, 8)]);
    }

    #[test]
    fn other_weekdays_are_supported() {
        let range = DateRange::parse("2024-02-01", "2024-02-29").unwrap();
        let fridays: Vec<_> = range.weekdays(Weekday::Fri).collect();
        assert_eq!(
            fridays,
            vec![ymd(2024, 2, 2), ymd(2024, 2, 9), ymd(2024, 2, 16), ymd(2024, 2, 23)]
        );
    }

    #[test]
    fn walk_length_matches_closed_form() {
        let base = ymd(2023, 12, 20);
        for start_offset in 0..15u64 {
            for span in 0..60u64 {
                let start = base + Days::new(start_offset);
                let end = start + Days::new(span);
                let range = DateRange::new(start, end).unwrap();
                let dates: Vec<_> = range.mondays().collect();

                let brute: Vec<_> = (0..=span)
                    .map(|i| start + Days::new(i))
                    .filter(|d| d.weekday() == Weekday::Mon)
                    .collect();
                assert_eq!(dates, brute);

                let expected = match (brute.first(), brute.last()) {
                    (Some(first), Some(last)) => ((*last - *first).num_days() / 7 + 1) as usize,
                    _ => 0,
                };
                assert_eq!(dates.len(), expected);
                assert_eq!(range.mondays().len(), expected);
                assert!(dates.iter().all(|d| *d >= start && *d <= end));
            }
        }
    }

    #[test]
    fn walk_is_restartable() {
        let range = DateRange::parse("2024-01-01", "2024-01-31").unwrap();
        let mut walk = range.mondays();
        let snapshot = walk.clone();
        walk.next();
        walk.next();
        assert_eq!(walk.len(), 3);
        assert_eq!(snapshot.len(), 5);
        assert_eq!(range.mondays().next(), Some(ymd(2024, 1, 1)));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = DateRange::parse("2024-02-01", "2024-01-01").unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvertedRange {
                start: ymd(2024, 2, 1),
                end: ymd(2024, 1, 1),
            }
        );
    }

    #[test]
    fn malformed_dates_are_rejected() {
        let err = DateRange::parse("2024/01/01", "2024-01-31").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::MalformedDate { field: "start_date", .. }
        ));
        let err = DateRange::parse("2024-01-01", "not-a-date").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::MalformedDate { field: "end_date", .. }
        ));
    }

    #[test]
    fn outcome_tagging_follows_status_class() {
        assert!(FetchOutcome::from_status(200, json!({})).is_success());
        assert!(!FetchOutcome::from_status(429, json!({"error": {}})).is_success());
        assert!(!FetchOutcome::from_status(500, JsonValue::Null).is_success());
    }

    #[test]
    fn store_policy_gates_failures() {
        let failed = FetchOutcome::from_status(400, json!({"error": {"name": "OPENAPI00004"}}));
        let ok = FetchOutcome::from_status(200, json!({"date": "2024-01-01"}));
        assert!(StorePolicy::Always.admits(&failed));
        assert!(!StorePolicy::SuccessOnly.admits(&failed));
        assert!(StorePolicy::SuccessOnly.admits(&ok));
        assert_eq!("success-only".parse::<StorePolicy>().unwrap(), StorePolicy::SuccessOnly);
        assert!("sometimes".parse::<StorePolicy>().is_err());
    }

    #[test]
    fn record_keeps_upstream_status() {
        let record = StatRecord::from_outcome(
            "abc",
            ymd(2024, 1, 1),
            FetchOutcome::from_status(404, json!({"error": "missing"})),
        );
        assert_eq!(record.upstream_status, 404);
        assert_eq!(record.payload, json!({"error": "missing"}));
    }

    #[test]
    fn ingestion_result_omits_zero_skips() {
        let result = IngestionResult {
            ocid: "abc".into(),
            from: "2024-01-01".into(),
            to: "2024-01-31".into(),
            mondays: 5,
            skipped: 0,
            status: "ok".into(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({"ocid": "abc", "from": "2024-01-01", "to": "2024-01-31", "mondays": 5, "status": "ok"})
        );
    }

    #[test]
    fn deserialized_ranges_are_order_checked() {
        let range: DateRange = serde_json::from_str(r#"{"start":"2024-01-01","end":"2024-01-31"}"#).unwrap();
        assert_eq!(range.mondays().count(), 5);

        let err = serde_json::from_str::<DateRange>(r#"{"start":"2024-02-01","end":"2024-01-01"}"#).unwrap_err();
        assert!(err.to_string().contains("after end_date"));
    }
}
