use crate::{database::connection::DbPool, models::payment::PaymentMethod};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgExecutor, types::Json};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PaymentLinkError {
    #[error("Payment link not found")]
    NotFound,
    #[error("Link code {0} is already taken")]
    CodeTaken(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentLink {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub unique_code: String,
    pub amount: Option<Decimal>,
    pub currency: String,
    pub allowed_methods: Option<Json<Vec<PaymentMethod>>>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
    pub metadata: Option<Json<Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreatePaymentLink {
    pub merchant_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub unique_code: String,
    pub amount: Option<Decimal>,
    pub currency: String,
    pub allowed_methods: Option<Vec<PaymentMethod>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePaymentLink {
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub is_active: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
    pub metadata: Option<Value>,
}

impl PaymentLink {
    /// Path of the customer-facing payment page.
    pub fn payment_path(&self) -> String {
        format!("/payment/{}", self.unique_code)
    }

    /// Methods the customer may pick from; every method when unrestricted.
    pub fn methods(&self) -> Vec<PaymentMethod> {
        match &self.allowed_methods {
            Some(methods) if !methods.is_empty() => methods.0.clone(),
            _ => vec![PaymentMethod::Upi, PaymentMethod::BankTransfer],
        }
    }

    pub async fn create(pool: &DbPool, link: CreatePaymentLink) -> Result<Self, PaymentLinkError> {
        let now = Utc::now();
        let code = link.unique_code.clone();

        let link = sqlx::query_as::<_, PaymentLink>(
            "INSERT INTO payment_links (id, merchant_id, title, description, unique_code, amount, currency,
                 allowed_methods, is_active, expires_at, max_uses, used_count, success_url, cancel_url,
                 metadata, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, $9, $10, 0, $11, $12, $13, $14, $15)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(link.merchant_id)
        .bind(link.title)
        .bind(link.description)
        .bind(link.unique_code)
        .bind(link.amount)
        .bind(link.currency)
        .bind(link.allowed_methods.map(Json))
        .bind(link.expires_at)
        .bind(link.max_uses)
        .bind(link.success_url)
        .bind(link.cancel_url)
        .bind(link.metadata.map(Json))
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.constraint() == Some("payment_links_unique_code_key") => {
                PaymentLinkError::CodeTaken(code)
            }
            _ => PaymentLinkError::Database(e),
        })?;

        Ok(link)
    }

    pub async fn find_for_merchant(
        pool: &DbPool,
        id: Uuid,
        merchant_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PaymentLink>("SELECT * FROM payment_links WHERE id = $1 AND merchant_id = $2")
            .bind(id)
            .bind(merchant_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_merchant(
        pool: &DbPool,
        merchant_id: Uuid,
        skip: i64,
        limit: i64,
        active_only: bool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PaymentLink>(
            "SELECT * FROM payment_links
             WHERE merchant_id = $1 AND (NOT $2 OR is_active)
             ORDER BY created_at DESC OFFSET $3 LIMIT $4",
        )
        .bind(merchant_id)
        .bind(active_only)
        .bind(skip)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Active link by its public code, row-locked so concurrent payments
    /// see each other's use counts.
    pub async fn lock_active_by_code<'e, E>(executor: E, code: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, PaymentLink>(
            "SELECT * FROM payment_links WHERE unique_code = $1 AND is_active FOR UPDATE",
        )
        .bind(code)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_active_by_code(pool: &DbPool, code: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PaymentLink>("SELECT * FROM payment_links WHERE unique_code = $1 AND is_active")
            .bind(code)
            .fetch_optional(pool)
            .await
    }

    pub async fn record_use<'e, E>(executor: E, id: Uuid) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query("UPDATE payment_links SET used_count = used_count + 1, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn update(
        pool: &DbPool,
        id: Uuid,
        merchant_id: Uuid,
        update_data: UpdatePaymentLink,
    ) -> Result<Self, PaymentLinkError> {
        let updated = sqlx::query_as::<_, PaymentLink>(
            r#"
            UPDATE payment_links
            SET
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                amount = COALESCE($5, amount),
                is_active = COALESCE($6, is_active),
                expires_at = COALESCE($7, expires_at),
                max_uses = COALESCE($8, max_uses),
                success_url = COALESCE($9, success_url),
                cancel_url = COALESCE($10, cancel_url),
                metadata = COALESCE($11, metadata),
                updated_at = $12
            WHERE id = $1 AND merchant_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(merchant_id)
        .bind(update_data.title)
        .bind(update_data.description)
        .bind(update_data.amount)
        .bind(update_data.is_active)
        .bind(update_data.expires_at)
        .bind(update_data.max_uses)
        .bind(update_data.success_url)
        .bind(update_data.cancel_url)
        .bind(update_data.metadata.map(Json))
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;

        updated.ok_or(PaymentLinkError::NotFound)
    }

    /// Soft delete.
    pub async fn deactivate(pool: &DbPool, id: Uuid, merchant_id: Uuid) -> Result<Self, PaymentLinkError> {
        Self::update(
            pool,
            id,
            merchant_id,
            UpdatePaymentLink {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::payment_link;

    #[test]
    fn unrestricted_link_offers_every_method() {
        let mut link = payment_link(None);
        assert_eq!(link.methods(), vec![PaymentMethod::Upi, PaymentMethod::BankTransfer]);

        link.allowed_methods = Some(Json(vec![]));
        assert_eq!(link.methods().len(), 2);

        link.allowed_methods = Some(Json(vec![PaymentMethod::BankTransfer]));
        assert_eq!(link.methods(), vec![PaymentMethod::BankTransfer]);
    }

    #[test]
    fn allowed_methods_use_wire_names() {
        let mut link = payment_link(None);
        link.allowed_methods = Some(Json(vec![PaymentMethod::Upi]));
        let body = serde_json::to_value(&link).unwrap();
        assert_eq!(body["allowed_methods"], serde_json::json!(["UPI"]));
        assert_eq!(link.payment_path(), format!("/payment/{}", link.unique_code));
    }
}
