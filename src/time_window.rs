use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

/// Filter name the remote store uses for time windows.
pub const TIME_WINDOW_FILTER_NAME: &str = "Microsoft.TimeWindow";

/// Enables a flag only between `Start` and `End`, both inclusive.
///
/// Either bound may be absent, but never both.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TimeWindowFilter {
    #[serde(rename = "Start", default)]
    pub start: Option<String>,
    #[serde(rename = "End", default)]
    pub end: Option<String>,
}

impl TimeWindowFilter {
    pub(crate) fn from_parameters(parameters: &serde_json::Value) -> Option<Self> {
        let bound = |name: &str| {
            parameters
                .get(name)
                .and_then(serde_json::Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let start = bound("Start");
        let end = bound("End");
        if start.is_none() && end.is_none() {
            return None;
        }
        Some(TimeWindowFilter { start, end })
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    /// Returns true if `now` lies inside the window. A bound that cannot be parsed is ignored.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(start) = &self.start {
            match parse_timestamp(start) {
                Some(start) if now >= start => (),
                Some(_) => return false,
                None => warn!("Ignoring invalid Start timestamp in time window filter: {}", start),
            }
        }

        if let Some(end) = &self.end {
            match parse_timestamp(end) {
                Some(end) if now <= end => (),
                Some(_) => return false,
                None => warn!("Ignoring invalid End timestamp in time window filter: {}", end),
            }
        }

        true
    }
}

/// Parses RFC 3339 and RFC 2822 timestamps. Timestamps without an offset are read as UTC.
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use spectral::prelude::*;
    use test_case::test_case;

    fn window(start: Option<&str>, end: Option<&str>) -> TimeWindowFilter {
        TimeWindowFilter {
            start: start.map(String::from),
            end: end.map(String::from),
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test_case(Some("2024-06-01T00:00:00Z"), None, true; "started")]
    #[test_case(Some("2024-06-02T00:00:00Z"), None, false; "not started")]
    #[test_case(None, Some("2024-06-02T00:00:00Z"), true; "not ended")]
    #[test_case(None, Some("2024-06-01T11:59:59Z"), false; "ended")]
    #[test_case(Some("2024-06-01T12:00:00Z"), Some("2024-06-01T12:00:00Z"), true; "inclusive bounds")]
    #[test_case(Some("2024-05-01T00:00:00Z"), Some("2024-07-01T00:00:00Z"), true; "inside")]
    #[test_case(Some("Sat, 01 Jun 2024 11:00:00 GMT"), Some("Sat, 01 Jun 2024 13:00:00 GMT"), true; "rfc 2822")]
    #[test_case(Some("2024-06-01T14:00:00+02:00"), None, true; "offset")]
    #[test_case(Some("2024-06-01"), Some("2024-06-02"), true; "dates")]
    #[test_case(Some("not a date"), None, true; "unparseable start")]
    #[test_case(None, Some("tomorrow"), true; "unparseable end")]
    #[test_case(Some("not a date"), Some("2030-01-01T00:00:00Z"), true; "unparseable start before end")]
    #[test_case(Some("not a date"), Some("2024-01-01T00:00:00Z"), false; "unparseable start after end")]
    #[test_case(Some("2024-07-01T00:00:00Z"), Some("tomorrow"), false; "unparseable end before start")]
    fn test_is_active_at(start: Option<&str>, end: Option<&str>, expected: bool) {
        assert_that!(window(start, end).is_active_at(noon())).is_equal_to(expected);
    }

    #[test]
    fn is_active_uses_current_time() {
        assert!(window(Some("2000-01-01T00:00:00Z"), None).is_active());
        assert!(!window(Some("2999-01-01T00:00:00Z"), None).is_active());
    }

    #[test]
    fn test_from_parameters() {
        assert_that!(TimeWindowFilter::from_parameters(&json!({"Start": "2024-01-01T00:00:00Z", "End": null})))
            .is_equal_to(Some(window(Some("2024-01-01T00:00:00Z"), None)));
        assert_that!(TimeWindowFilter::from_parameters(&json!({"End": "2024-01-01T00:00:00Z"})))
            .is_equal_to(Some(window(None, Some("2024-01-01T00:00:00Z"))));
        assert_that!(TimeWindowFilter::from_parameters(&json!({"Start": "a", "End": "b"})))
            .is_equal_to(Some(window(Some("a"), Some("b"))));

        assert_that!(TimeWindowFilter::from_parameters(&json!({"Start": null, "End": null}))).is_none();
        assert_that!(TimeWindowFilter::from_parameters(&json!({"Start": ""}))).is_none();
        assert_that!(TimeWindowFilter::from_parameters(&json!({"Start": 5}))).is_none();
        assert_that!(TimeWindowFilter::from_parameters(&json!({}))).is_none();
    }
}
