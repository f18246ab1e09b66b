use crate::models::payment::{Page, PaymentFilter, PaymentStatus, PaymentType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MIN_PAGE_SIZE: i64 = 5;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Filters and pagination shared by payment listings, reports and exports.
#[derive(Debug, Default, Deserialize)]
pub struct PaymentQuery {
    pub merchant_id: Option<Uuid>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
    pub payment_type: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS` or a bare `YYYY-MM-DD`. A bare
/// end date covers the whole day.
pub fn parse_date_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| format!("Invalid date: {}", raw))?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        Some(NaiveTime::MIN)
    };
    time.map(|t| date.and_time(t).and_utc())
        .ok_or_else(|| format!("Invalid date: {}", raw))
}

impl PaymentQuery {
    pub fn page(&self) -> Result<Page, String> {
        let page = self.page.unwrap_or(1);
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 {
            return Err("page must be at least 1".to_string());
        }
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(format!(
                "page_size must be between {} and {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE
            ));
        }
        Ok(Page { page, page_size })
    }

    pub fn filter(&self) -> Result<PaymentFilter, String> {
        let start_date = self
            .start_date
            .as_deref()
            .map(|d| parse_date_bound(d, false))
            .transpose()?;
        let end_date = self
            .end_date
            .as_deref()
            .map(|d| parse_date_bound(d, true))
            .transpose()?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                return Err("start_date must not be after end_date".to_string());
            }
        }

        let status = self
            .status
            .as_deref()
            .map(|s| PaymentStatus::from_str(s).map_err(|_| format!("Invalid status: {}", s)))
            .transpose()?;
        let payment_type = self
            .payment_type
            .as_deref()
            .map(|t| {
                PaymentType::from_str(&t.to_ascii_uppercase()).map_err(|_| format!("Invalid payment_type: {}", t))
            })
            .transpose()?;

        Ok(PaymentFilter {
            merchant_id: self.merchant_id,
            start_date,
            end_date,
            status,
            payment_type,
        })
    }

    /// Same filters, restricted to one merchant regardless of what was asked.
    pub fn filter_for_merchant(&self, merchant_id: Uuid) -> Result<PaymentFilter, String> {
        let mut filter = self.filter()?;
        filter.merchant_id = Some(merchant_id);
        Ok(filter)
    }
}
