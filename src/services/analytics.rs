use crate::{
    database::connection::DbPool,
    models::payment::{PaymentMethod, PaymentStatus},
    requests::analytics::DateRange,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Percentage rounded to two places; zero when there is nothing to divide.
pub fn success_rate(successful: i64, total: i64) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(successful) * Decimal::from(100) / Decimal::from(total)).round_dp(2)
}

/// Whole seconds, zero when there was nothing to measure.
pub fn round_secs(secs: Option<f64>) -> i64 {
    secs.filter(|s| s.is_finite()).map_or(0, |s| s.round() as i64)
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AmountSummary {
    pub total_deposit_amount: Decimal,
    pub total_withdrawal_amount: Decimal,
    pub net_amount: Decimal,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PaymentSummary {
    pub total_count: i64,
    pub status_counts: BTreeMap<String, i64>,
    pub amount_summary: AmountSummary,
    pub success_rate: Decimal,
}

impl PaymentSummary {
    pub fn from_parts(status_rows: &[(PaymentStatus, i64)], deposits: Decimal, withdrawals: Decimal) -> Self {
        let status_counts: BTreeMap<String, i64> = status_rows
            .iter()
            .map(|(status, count)| (status.as_str().to_string(), *count))
            .collect();
        let total_count = status_counts.values().sum();
        let confirmed = status_counts
            .get(PaymentStatus::Confirmed.as_str())
            .copied()
            .unwrap_or(0);

        Self {
            total_count,
            status_counts,
            amount_summary: AmountSummary {
                total_deposit_amount: deposits,
                total_withdrawal_amount: withdrawals,
                net_amount: deposits - withdrawals,
            },
            success_rate: success_rate(confirmed, total_count),
        }
    }
}

#[derive(Debug, Serialize, FromRow)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub total_count: i64,
    pub confirmed_count: i64,
    pub declined_count: i64,
    pub pending_count: i64,
    pub expired_count: i64,
    pub confirmed_amount: Decimal,
}

#[derive(Debug, FromRow)]
pub struct MerchantVolume {
    pub merchant_id: Uuid,
    pub business_name: String,
    pub total_payments: i64,
    pub confirmed_payments: i64,
    pub confirmed_amount: Decimal,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct MerchantPerformance {
    pub merchant_id: Uuid,
    pub business_name: String,
    pub total_payments: i64,
    pub confirmed_payments: i64,
    pub confirmed_amount: Decimal,
    pub success_rate: Decimal,
}

impl From<MerchantVolume> for MerchantPerformance {
    fn from(row: MerchantVolume) -> Self {
        Self {
            success_rate: success_rate(row.confirmed_payments, row.total_payments),
            merchant_id: row.merchant_id,
            business_name: row.business_name,
            total_payments: row.total_payments,
            confirmed_payments: row.confirmed_payments,
            confirmed_amount: row.confirmed_amount,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct LinkVolume {
    pub payment_link_id: Uuid,
    pub title: String,
    pub unique_code: String,
    pub used_count: i32,
    pub total_payments: i64,
    pub confirmed_payments: i64,
    pub confirmed_amount: Decimal,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct LinkPerformance {
    pub payment_link_id: Uuid,
    pub title: String,
    pub unique_code: String,
    pub used_count: i32,
    pub total_payments: i64,
    pub confirmed_payments: i64,
    pub confirmed_amount: Decimal,
    pub conversion_rate: Decimal,
}

impl From<LinkVolume> for LinkPerformance {
    fn from(row: LinkVolume) -> Self {
        Self {
            conversion_rate: success_rate(row.confirmed_payments, row.total_payments),
            payment_link_id: row.payment_link_id,
            title: row.title,
            unique_code: row.unique_code,
            used_count: row.used_count,
            total_payments: row.total_payments,
            confirmed_payments: row.confirmed_payments,
            confirmed_amount: row.confirmed_amount,
        }
    }
}

/// Times are seconds from request to verification.
#[derive(Debug, Serialize, PartialEq)]
pub struct VerificationMetrics {
    pub average_verification_time: i64,
    pub min_verification_time: i64,
    pub max_verification_time: i64,
    pub verification_methods: BTreeMap<String, i64>,
    pub pending_verifications: i64,
}

const RANGE_CLAUSE: &str = "($1::uuid IS NULL OR merchant_id = $1)
      AND ($2::timestamptz IS NULL OR created_at >= $2)
      AND ($3::timestamptz IS NULL OR created_at <= $3)";

/// Read-only aggregations over the payments table. `merchant_id = None`
/// spans every merchant.
pub struct AnalyticsService<'a> {
    pool: &'a DbPool,
}

impl<'a> AnalyticsService<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    pub async fn summary(&self, merchant_id: Option<Uuid>, range: DateRange) -> Result<PaymentSummary, sqlx::Error> {
        let (start, end) = range;
        let status_rows: Vec<(PaymentStatus, i64)> = sqlx::query_as(&format!(
            "SELECT status, COUNT(*) FROM payments WHERE {RANGE_CLAUSE} GROUP BY status"
        ))
        .bind(merchant_id)
        .bind(start)
        .bind(end)
        .fetch_all(self.pool)
        .await?;

        let (deposits, withdrawals): (Decimal, Decimal) = sqlx::query_as(&format!(
            "SELECT
                COALESCE(SUM(amount) FILTER (WHERE payment_type = 'DEPOSIT'), 0),
                COALESCE(SUM(amount) FILTER (WHERE payment_type = 'WITHDRAWAL'), 0)
             FROM payments WHERE status = 'CONFIRMED' AND {RANGE_CLAUSE}"
        ))
        .bind(merchant_id)
        .bind(start)
        .bind(end)
        .fetch_one(self.pool)
        .await?;

        Ok(PaymentSummary::from_parts(&status_rows, deposits, withdrawals))
    }

    /// One row per UTC day that saw payments.
    pub async fn daily_trends(
        &self,
        merchant_id: Option<Uuid>,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyTrend>, sqlx::Error> {
        sqlx::query_as::<_, DailyTrend>(
            "SELECT
                (created_at AT TIME ZONE 'UTC')::date AS date,
                COUNT(*) AS total_count,
                COUNT(*) FILTER (WHERE status = 'CONFIRMED') AS confirmed_count,
                COUNT(*) FILTER (WHERE status = 'DECLINED') AS declined_count,
                COUNT(*) FILTER (WHERE status = 'PENDING') AS pending_count,
                COUNT(*) FILTER (WHERE status = 'EXPIRED') AS expired_count,
                COALESCE(SUM(amount) FILTER (WHERE status = 'CONFIRMED'), 0) AS confirmed_amount
             FROM payments
             WHERE created_at >= $1 AND ($2::uuid IS NULL OR merchant_id = $2)
             GROUP BY 1
             ORDER BY 1",
        )
        .bind(since)
        .bind(merchant_id)
        .fetch_all(self.pool)
        .await
    }

    pub async fn method_distribution(
        &self,
        merchant_id: Option<Uuid>,
        range: DateRange,
    ) -> Result<BTreeMap<String, i64>, sqlx::Error> {
        let (start, end) = range;
        let rows: Vec<(PaymentMethod, i64)> = sqlx::query_as(&format!(
            "SELECT payment_method, COUNT(*) FROM payments WHERE {RANGE_CLAUSE} GROUP BY payment_method"
        ))
        .bind(merchant_id)
        .bind(start)
        .bind(end)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(method, count)| (method.as_str().to_string(), count))
            .collect())
    }

    /// Merchants ranked by confirmed volume since `since`.
    pub async fn merchant_performance(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<MerchantPerformance>, sqlx::Error> {
        let rows = sqlx::query_as::<_, MerchantVolume>(
            "SELECT
                m.id AS merchant_id,
                m.business_name,
                COUNT(p.id) AS total_payments,
                COUNT(p.id) FILTER (WHERE p.status = 'CONFIRMED') AS confirmed_payments,
                COALESCE(SUM(p.amount) FILTER (WHERE p.status = 'CONFIRMED'), 0) AS confirmed_amount
             FROM merchants m
             LEFT JOIN payments p ON p.merchant_id = m.id AND p.created_at >= $1
             GROUP BY m.id, m.business_name
             ORDER BY confirmed_amount DESC, total_payments DESC
             LIMIT $2",
        )
        .bind(since)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(MerchantPerformance::from).collect())
    }

    pub async fn link_performance(
        &self,
        merchant_id: Option<Uuid>,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<LinkPerformance>, sqlx::Error> {
        let rows = sqlx::query_as::<_, LinkVolume>(
            "SELECT
                pl.id AS payment_link_id,
                pl.title,
                pl.unique_code,
                pl.used_count,
                COUNT(p.id) AS total_payments,
                COUNT(p.id) FILTER (WHERE p.status = 'CONFIRMED') AS confirmed_payments,
                COALESCE(SUM(p.amount) FILTER (WHERE p.status = 'CONFIRMED'), 0) AS confirmed_amount
             FROM payment_links pl
             LEFT JOIN payments p ON p.payment_link_id = pl.id AND p.created_at >= $1
             WHERE ($3::uuid IS NULL OR pl.merchant_id = $3)
             GROUP BY pl.id, pl.title, pl.unique_code, pl.used_count
             ORDER BY confirmed_amount DESC, total_payments DESC
             LIMIT $2",
        )
        .bind(since)
        .bind(limit)
        .bind(merchant_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(LinkPerformance::from).collect())
    }

    pub async fn verification_metrics(
        &self,
        merchant_id: Option<Uuid>,
        since: DateTime<Utc>,
    ) -> Result<VerificationMetrics, sqlx::Error> {
        let (avg, min, max): (Option<f64>, Option<f64>, Option<f64>) = sqlx::query_as(
            "SELECT
                AVG(EXTRACT(EPOCH FROM verified_at - created_at))::float8,
                MIN(EXTRACT(EPOCH FROM verified_at - created_at))::float8,
                MAX(EXTRACT(EPOCH FROM verified_at - created_at))::float8
             FROM payments
             WHERE status = 'CONFIRMED' AND verified_at IS NOT NULL
               AND created_at >= $1 AND ($2::uuid IS NULL OR merchant_id = $2)",
        )
        .bind(since)
        .bind(merchant_id)
        .fetch_one(self.pool)
        .await?;

        let methods: Vec<(String, i64)> = sqlx::query_as(
            "SELECT COALESCE(verification_method, 'UNKNOWN'), COUNT(*)
             FROM payments
             WHERE status = 'CONFIRMED' AND created_at >= $1 AND ($2::uuid IS NULL OR merchant_id = $2)
             GROUP BY 1",
        )
        .bind(since)
        .bind(merchant_id)
        .fetch_all(self.pool)
        .await?;

        let pending: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payments
             WHERE status = 'PENDING' AND created_at >= $1 AND ($2::uuid IS NULL OR merchant_id = $2)",
        )
        .bind(since)
        .bind(merchant_id)
        .fetch_one(self.pool)
        .await?;

        Ok(VerificationMetrics {
            average_verification_time: round_secs(avg),
            min_verification_time: round_secs(min),
            max_verification_time: round_secs(max),
            verification_methods: methods.into_iter().collect(),
            pending_verifications: pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn success_rate_rounds_to_two_places() {
        assert_eq!(success_rate(0, 0), Decimal::ZERO);
        assert_eq!(success_rate(1, 3), dec!(33.33));
        assert_eq!(success_rate(2, 3), dec!(66.67));
        assert_eq!(success_rate(5, 5), dec!(100));
    }

    #[test]
    fn summary_totals_statuses_and_net_amount() {
        let summary = PaymentSummary::from_parts(
            &[
                (PaymentStatus::Confirmed, 3),
                (PaymentStatus::Pending, 4),
                (PaymentStatus::Declined, 1),
            ],
            dec!(4500),
            dec!(1200.50),
        );
        assert_eq!(summary.total_count, 8);
        assert_eq!(summary.status_counts["CONFIRMED"], 3);
        assert!(!summary.status_counts.contains_key("EXPIRED"));
        assert_eq!(summary.success_rate, dec!(37.5));
        assert_eq!(summary.amount_summary.net_amount, dec!(3299.50));

        let empty = PaymentSummary::from_parts(&[], Decimal::ZERO, Decimal::ZERO);
        assert_eq!(empty.total_count, 0);
        assert_eq!(empty.success_rate, Decimal::ZERO);
    }

    #[test]
    fn performance_rows_carry_rates() {
        let row = MerchantVolume {
            merchant_id: Uuid::nil(),
            business_name: "Acme Traders".into(),
            total_payments: 0,
            confirmed_payments: 0,
            confirmed_amount: Decimal::ZERO,
        };
        assert_eq!(MerchantPerformance::from(row).success_rate, Decimal::ZERO);

        let row = LinkVolume {
            payment_link_id: Uuid::nil(),
            title: "Hamper".into(),
            unique_code: "HXK7M2PQ9R".into(),
            used_count: 4,
            total_payments: 4,
            confirmed_payments: 3,
            confirmed_amount: dec!(3000),
        };
        let perf = LinkPerformance::from(row);
        assert_eq!(perf.conversion_rate, dec!(75));
        assert_eq!(perf.used_count, 4);
    }

    #[test]
    fn verification_seconds_are_rounded() {
        assert_eq!(round_secs(None), 0);
        assert_eq!(round_secs(Some(59.5)), 60);
        assert_eq!(round_secs(Some(12.4)), 12);
        assert_eq!(round_secs(Some(f64::NAN)), 0);
    }
}
