use crate::requests::{admin::validate_days, report::parse_date_bound};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// Admins may look back a year, merchants a quarter.
pub const ADMIN_MAX_DAYS: i64 = 365;
pub const MERCHANT_MAX_DAYS: i64 = 90;
pub const ADMIN_MAX_LIMIT: i64 = 100;
pub const MERCHANT_MAX_LIMIT: i64 = 50;

fn default_days() -> i64 {
    30
}

fn default_limit() -> i64 {
    10
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub merchant_id: Option<Uuid>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub merchant_id: Option<Uuid>,
    #[serde(default = "default_days")]
    pub days: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

pub type DateRange = (Option<DateTime<Utc>>, Option<DateTime<Utc>>);

impl RangeQuery {
    pub fn range(&self) -> Result<DateRange, String> {
        let start = self
            .start_date
            .as_deref()
            .map(|d| parse_date_bound(d, false))
            .transpose()?;
        let end = self
            .end_date
            .as_deref()
            .map(|d| parse_date_bound(d, true))
            .transpose()?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err("start_date must not be after end_date".to_string());
            }
        }
        Ok((start, end))
    }
}

impl WindowQuery {
    /// Returns `(days, limit)` once both are within the caller's bounds.
    pub fn bounded(&self, max_days: i64, max_limit: i64) -> Result<(i64, i64), String> {
        let days = validate_days(self.days, max_days)?;
        if !(1..=max_limit).contains(&self.limit) {
            return Err(format!("limit must be between 1 and {}", max_limit));
        }
        Ok((days, self.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ranges_accept_bare_dates() {
        let q = RangeQuery {
            start_date: Some("2025-03-01".into()),
            end_date: Some("2025-03-01".into()),
            ..Default::default()
        };
        let (start, end) = q.range().unwrap();
        assert_eq!(start, Some(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()));
        assert!(end.unwrap() > start.unwrap());

        let q = RangeQuery {
            start_date: Some("2025-03-02".into()),
            end_date: Some("2025-03-01".into()),
            ..Default::default()
        };
        assert!(q.range().is_err());
        assert_eq!(RangeQuery::default().range().unwrap(), (None, None));
    }

    #[test]
    fn window_bounds_depend_on_caller() {
        let q: WindowQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(q.bounded(ADMIN_MAX_DAYS, ADMIN_MAX_LIMIT), Ok((30, 10)));

        let q: WindowQuery = serde_json::from_value(serde_json::json!({"days": 120, "limit": 60})).unwrap();
        assert!(q.bounded(ADMIN_MAX_DAYS, ADMIN_MAX_LIMIT).is_ok());
        assert!(q.bounded(MERCHANT_MAX_DAYS, MERCHANT_MAX_LIMIT).is_err());

        let q: WindowQuery = serde_json::from_value(serde_json::json!({"days": 30, "limit": 60})).unwrap();
        assert_eq!(
            q.bounded(MERCHANT_MAX_DAYS, MERCHANT_MAX_LIMIT),
            Err("limit must be between 1 and 50".to_string())
        );
    }
}
