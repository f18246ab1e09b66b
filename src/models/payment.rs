use crate::database::connection::DbPool;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgExecutor, Type, types::Json};
use std::{fmt, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment with ID {id} not found")]
    NotFound { id: Uuid },
    #[error("Payment is already in {from} status")]
    InvalidTransition { from: PaymentStatus },
    #[error("Reference {reference} has already been used")]
    DuplicateReference { reference: String },
    #[error("UTR {utr} is already attached to a confirmed payment")]
    UtrAlreadyUsed { utr: String },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "payment_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentType {
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Upi,
    BankTransfer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Declined,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMethod {
    Manual,
    BankStatement,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::Manual => "MANUAL",
            VerificationMethod::BankStatement => "BANK_STATEMENT",
        }
    }
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Deposit => "DEPOSIT",
            PaymentType::Withdrawal => "WITHDRAWAL",
        }
    }
}

impl FromStr for PaymentType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(PaymentType::Deposit),
            "WITHDRAWAL" => Ok(PaymentType::Withdrawal),
            _ => Err(()),
        }
    }
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Upi => "UPI",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
        }
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Confirmed => "CONFIRMED",
            PaymentStatus::Declined => "DECLINED",
            PaymentStatus::Expired => "EXPIRED",
        }
    }

    /// Status code reported to merchants in callbacks: 2 confirmed, 3 otherwise.
    pub fn callback_code(&self) -> Option<u8> {
        match self {
            PaymentStatus::Pending => None,
            PaymentStatus::Confirmed => Some(2),
            PaymentStatus::Declined | PaymentStatus::Expired => Some(3),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "CONFIRMED" => Ok(PaymentStatus::Confirmed),
            "DECLINED" => Ok(PaymentStatus::Declined),
            "EXPIRED" => Ok(PaymentStatus::Expired),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub reference: String,
    pub trxn_hash_key: String,
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub upi_id: Option<String>,
    pub bank_name: Option<String>,
    pub account_name: Option<String>,
    pub account_number: Option<String>,
    pub ifsc_code: Option<String>,
    pub utr_number: Option<String>,
    pub verified_by: Option<Uuid>,
    pub verification_method: Option<String>,
    pub callback_url: Option<String>,
    pub user_data: Option<Json<Value>>,
    pub callback_sent: bool,
    pub callback_response: Option<Json<Value>>,
    pub remarks: Option<String>,
    pub payment_link_id: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub merchant_id: Uuid,
    pub reference: String,
    pub trxn_hash_key: String,
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    pub currency: String,
    pub upi_id: Option<String>,
    pub bank_name: Option<String>,
    pub account_name: Option<String>,
    pub account_number: Option<String>,
    pub ifsc_code: Option<String>,
    pub callback_url: Option<String>,
    pub user_data: Option<Value>,
    pub payment_link_id: Option<Uuid>,
}

/// Optional filters shared by the listing, report and export queries.
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub merchant_id: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: Option<PaymentStatus>,
    pub payment_type: Option<PaymentType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub page_size: i64,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    pub fn pages(&self, total: i64) -> i64 {
        (total + self.page_size - 1) / self.page_size
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentPage {
    pub items: Vec<Payment>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub pages: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentTotals {
    pub total_transactions: i64,
    pub successful_transactions: i64,
    pub total_deposit_amount: Decimal,
    pub total_withdrawal_amount: Decimal,
    pub pending_verification: i64,
}

const FILTER_CLAUSE: &str = "WHERE ($1::uuid IS NULL OR merchant_id = $1)
      AND ($2::timestamptz IS NULL OR created_at >= $2)
      AND ($3::timestamptz IS NULL OR created_at <= $3)
      AND ($4::payment_status IS NULL OR status = $4)
      AND ($5::payment_type IS NULL OR payment_type = $5)";

fn classify_unique_violation(err: sqlx::Error, reference: &str, utr: Option<&str>) -> PaymentError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            match db.constraint() {
                Some("payments_merchant_reference_key") => {
                    return PaymentError::DuplicateReference {
                        reference: reference.to_string(),
                    };
                }
                Some("payments_confirmed_utr_key") => {
                    return PaymentError::UtrAlreadyUsed {
                        utr: utr.unwrap_or_default().to_string(),
                    };
                }
                _ => {}
            }
        }
    }
    PaymentError::Database(err)
}

impl Payment {
    pub async fn create<'e, E>(executor: E, payment: CreatePayment) -> Result<Self, PaymentError>
    where
        E: PgExecutor<'e>,
    {
        let now = Utc::now();
        let reference = payment.reference.clone();

        let payment = sqlx::query_as::<_, Payment>(
            "INSERT INTO payments (id, merchant_id, reference, trxn_hash_key, payment_type, payment_method,
                 amount, currency, status, upi_id, bank_name, account_name, account_number, ifsc_code,
                 callback_url, user_data, payment_link_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'PENDING', $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(payment.merchant_id)
        .bind(payment.reference)
        .bind(payment.trxn_hash_key)
        .bind(payment.payment_type)
        .bind(payment.payment_method)
        .bind(payment.amount)
        .bind(payment.currency)
        .bind(payment.upi_id)
        .bind(payment.bank_name)
        .bind(payment.account_name)
        .bind(payment.account_number)
        .bind(payment.ifsc_code)
        .bind(payment.callback_url)
        .bind(payment.user_data.map(Json))
        .bind(payment.payment_link_id)
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await
        .map_err(|e| classify_unique_violation(e, &reference, None))?;

        Ok(payment)
    }

    pub async fn find_by_id(pool: &DbPool, id: Uuid) -> Result<Option<Self>, PaymentError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(payment)
    }

    pub async fn find_by_hash(pool: &DbPool, trxn_hash_key: &str) -> Result<Option<Self>, PaymentError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE trxn_hash_key = $1")
            .bind(trxn_hash_key)
            .fetch_optional(pool)
            .await?;

        Ok(payment)
    }

    pub async fn find_by_utr(pool: &DbPool, utr_number: &str) -> Result<Vec<Self>, PaymentError> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE utr_number = $1 ORDER BY created_at DESC",
        )
        .bind(utr_number)
        .fetch_all(pool)
        .await?;

        Ok(payments)
    }

    pub async fn find_pending(
        pool: &DbPool,
        merchant_id: Option<Uuid>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Self>, PaymentError> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments
             WHERE status = 'PENDING'
               AND ($1::uuid IS NULL OR merchant_id = $1)
               AND created_at >= $2
             ORDER BY created_at ASC",
        )
        .bind(merchant_id)
        .bind(since)
        .fetch_all(pool)
        .await?;

        Ok(payments)
    }

    pub async fn search(
        pool: &DbPool,
        filter: &PaymentFilter,
        page: Page,
    ) -> Result<PaymentPage, PaymentError> {
        let count_sql = format!("SELECT COUNT(*) FROM payments {FILTER_CLAUSE}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(filter.merchant_id)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(filter.status)
            .bind(filter.payment_type)
            .fetch_one(pool)
            .await?;

        let list_sql = format!(
            "SELECT * FROM payments {FILTER_CLAUSE} ORDER BY created_at DESC LIMIT $6 OFFSET $7"
        );
        let items = sqlx::query_as::<_, Payment>(&list_sql)
            .bind(filter.merchant_id)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(filter.status)
            .bind(filter.payment_type)
            .bind(page.page_size)
            .bind(page.offset())
            .fetch_all(pool)
            .await?;

        Ok(PaymentPage {
            items,
            total,
            page: page.page,
            page_size: page.page_size,
            pages: page.pages(total),
        })
    }

    pub async fn list_filtered(pool: &DbPool, filter: &PaymentFilter) -> Result<Vec<Self>, PaymentError> {
        let sql = format!("SELECT * FROM payments {FILTER_CLAUSE} ORDER BY created_at ASC");
        let payments = sqlx::query_as::<_, Payment>(&sql)
            .bind(filter.merchant_id)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(filter.status)
            .bind(filter.payment_type)
            .fetch_all(pool)
            .await?;

        Ok(payments)
    }

    /// PENDING -> CONFIRMED. The status guard in the WHERE clause makes the
    /// transition race-free; the partial unique index rejects a reused UTR.
    pub async fn confirm(
        pool: &DbPool,
        id: Uuid,
        utr_number: &str,
        verified_by: Uuid,
        method: VerificationMethod,
        remarks: Option<String>,
    ) -> Result<Self, PaymentError> {
        let confirmed = sqlx::query_as::<_, Payment>(
            "UPDATE payments
             SET status = 'CONFIRMED', utr_number = $2, verified_by = $3, verification_method = $4,
                 remarks = COALESCE($5, remarks), verified_at = $6, updated_at = $6
             WHERE id = $1 AND status = 'PENDING'
             RETURNING *",
        )
        .bind(id)
        .bind(utr_number)
        .bind(verified_by)
        .bind(method.as_str())
        .bind(remarks)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
        .map_err(|e| classify_unique_violation(e, "", Some(utr_number)))?;

        match confirmed {
            Some(payment) => Ok(payment),
            None => Err(Self::explain_missed_transition(pool, id).await),
        }
    }

    /// PENDING -> DECLINED.
    pub async fn decline(
        pool: &DbPool,
        id: Uuid,
        remarks: &str,
        verified_by: Uuid,
    ) -> Result<Self, PaymentError> {
        let declined = sqlx::query_as::<_, Payment>(
            "UPDATE payments
             SET status = 'DECLINED', remarks = $2, verified_by = $3, verified_at = $4, updated_at = $4
             WHERE id = $1 AND status = 'PENDING'
             RETURNING *",
        )
        .bind(id)
        .bind(remarks)
        .bind(verified_by)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;

        match declined {
            Some(payment) => Ok(payment),
            None => Err(Self::explain_missed_transition(pool, id).await),
        }
    }

    /// Stores a customer-supplied UTR on a pending payment-link payment for
    /// staff to verify. The status does not change.
    pub async fn attach_customer_utr(pool: &DbPool, id: Uuid, utr_number: &str) -> Result<Self, PaymentError> {
        let updated = sqlx::query_as::<_, Payment>(
            "UPDATE payments
             SET utr_number = $2, remarks = 'UTR number submitted by customer, awaiting verification',
                 updated_at = $3
             WHERE id = $1 AND status = 'PENDING' AND payment_link_id IS NOT NULL
             RETURNING *",
        )
        .bind(id)
        .bind(utr_number)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(payment) => Ok(payment),
            None => match Self::find_by_id(pool, id).await? {
                Some(existing) if existing.payment_link_id.is_some() => Err(PaymentError::InvalidTransition {
                    from: existing.status,
                }),
                _ => Err(PaymentError::NotFound { id }),
            },
        }
    }

    /// PENDING deposits created before `cutoff` -> EXPIRED.
    pub async fn expire_stale(pool: &DbPool, cutoff: DateTime<Utc>) -> Result<Vec<Self>, PaymentError> {
        let expired = sqlx::query_as::<_, Payment>(
            "UPDATE payments
             SET status = 'EXPIRED', remarks = COALESCE(remarks, 'Payment window expired'), updated_at = $2
             WHERE status = 'PENDING' AND payment_type = 'DEPOSIT' AND created_at < $1
             RETURNING *",
        )
        .bind(cutoff)
        .bind(Utc::now())
        .fetch_all(pool)
        .await?;

        Ok(expired)
    }

    async fn explain_missed_transition(pool: &DbPool, id: Uuid) -> PaymentError {
        match Self::find_by_id(pool, id).await {
            Ok(Some(existing)) => PaymentError::InvalidTransition {
                from: existing.status,
            },
            Ok(None) => PaymentError::NotFound { id },
            Err(e) => e,
        }
    }

    pub async fn record_callback(
        pool: &DbPool,
        id: Uuid,
        sent: bool,
        response: Value,
    ) -> Result<(), PaymentError> {
        sqlx::query(
            "UPDATE payments SET callback_sent = callback_sent OR $2, callback_response = $3, updated_at = $4
             WHERE id = $1",
        )
        .bind(id)
        .bind(sent)
        .bind(Json(response))
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn totals_since(pool: &DbPool, since: DateTime<Utc>) -> Result<PaymentTotals, PaymentError> {
        let totals = sqlx::query_as::<_, PaymentTotals>(
            "SELECT
                COUNT(*) FILTER (WHERE created_at >= $1) AS total_transactions,
                COUNT(*) FILTER (WHERE created_at >= $1 AND status = 'CONFIRMED') AS successful_transactions,
                COALESCE(SUM(amount) FILTER (
                    WHERE created_at >= $1 AND status = 'CONFIRMED' AND payment_type = 'DEPOSIT'), 0)
                    AS total_deposit_amount,
                COALESCE(SUM(amount) FILTER (
                    WHERE created_at >= $1 AND status = 'CONFIRMED' AND payment_type = 'WITHDRAWAL'), 0)
                    AS total_withdrawal_amount,
                COUNT(*) FILTER (WHERE status = 'PENDING') AS pending_verification
             FROM payments",
        )
        .bind(since)
        .fetch_one(pool)
        .await?;

        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_codes() {
        assert_eq!(PaymentStatus::Pending.callback_code(), None);
        assert_eq!(PaymentStatus::Confirmed.callback_code(), Some(2));
        assert_eq!(PaymentStatus::Declined.callback_code(), Some(3));
        assert_eq!(PaymentStatus::Expired.callback_code(), Some(3));
    }

    #[test]
    fn enums_use_wire_names() {
        assert_eq!(serde_json::to_value(PaymentMethod::BankTransfer).unwrap(), "BANK_TRANSFER");
        assert_eq!(serde_json::to_value(PaymentType::Withdrawal).unwrap(), "WITHDRAWAL");
        assert_eq!("confirmed".parse::<PaymentStatus>(), Ok(PaymentStatus::Confirmed));
        assert_eq!("DEPOSIT".parse::<PaymentType>(), Ok(PaymentType::Deposit));
        assert!("deposit".parse::<PaymentType>().is_err());
    }

    #[test]
    fn paging_math() {
        let page = Page { page: 3, page_size: 20 };
        assert_eq!(page.offset(), 40);
        assert_eq!(page.pages(0), 0);
        assert_eq!(page.pages(41), 3);
        assert_eq!(page.pages(40), 2);
    }
}
