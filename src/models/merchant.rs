use crate::database::connection::DbPool;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, types::Json};
use std::net::IpAddr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum MerchantError {
    #[error("The merchant with this ID does not exist in the system")]
    NotFound { id: Uuid },
    #[error("Invalid IP address: {0}")]
    InvalidIp(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_name: String,
    pub account_number: String,
    pub ifsc_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpiDetails {
    pub upi_id: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Merchant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub business_name: String,
    pub business_type: Option<String>,
    pub contact_phone: String,
    pub address: Option<String>,
    pub api_key: String,
    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,
    pub callback_url: Option<String>,
    pub is_active: bool,
    pub whitelist_ips: Json<Vec<String>>,
    pub bank_details: Option<Json<BankDetails>>,
    pub upi_details: Option<Json<UpiDetails>>,
    pub min_deposit: Decimal,
    pub max_deposit: Decimal,
    pub min_withdrawal: Decimal,
    pub max_withdrawal: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateMerchant {
    pub user_id: Uuid,
    pub business_name: String,
    pub business_type: Option<String>,
    pub contact_phone: String,
    pub address: Option<String>,
    pub api_key: String,
    pub webhook_secret: Option<String>,
    pub callback_url: Option<String>,
    pub is_active: bool,
    pub whitelist_ips: Vec<String>,
    pub bank_details: Option<BankDetails>,
    pub upi_details: Option<UpiDetails>,
    pub min_deposit: Decimal,
    pub max_deposit: Decimal,
    pub min_withdrawal: Decimal,
    pub max_withdrawal: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMerchant {
    pub business_name: Option<String>,
    pub business_type: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub callback_url: Option<String>,
    pub is_active: Option<bool>,
    pub bank_details: Option<BankDetails>,
    pub upi_details: Option<UpiDetails>,
    pub min_deposit: Option<Decimal>,
    pub max_deposit: Option<Decimal>,
    pub min_withdrawal: Option<Decimal>,
    pub max_withdrawal: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WhitelistOperation {
    Add,
    Remove,
    Replace,
}

/// Parses each address and returns it in canonical textual form, so that
/// stored entries compare equal to peer addresses.
pub fn normalize_ips(addresses: &[String]) -> Result<Vec<String>, MerchantError> {
    addresses
        .iter()
        .map(|raw| {
            raw.trim()
                .parse::<IpAddr>()
                .map(|ip| ip.to_string())
                .map_err(|_| MerchantError::InvalidIp(raw.clone()))
        })
        .collect()
}

impl WhitelistOperation {
    pub fn apply(self, current: &[String], addresses: &[String]) -> Vec<String> {
        match self {
            WhitelistOperation::Add => {
                let mut updated = current.to_vec();
                for ip in addresses {
                    if !updated.contains(ip) {
                        updated.push(ip.clone());
                    }
                }
                updated
            }
            WhitelistOperation::Remove => current
                .iter()
                .filter(|ip| !addresses.contains(ip))
                .cloned()
                .collect(),
            WhitelistOperation::Replace => {
                let mut updated: Vec<String> = Vec::with_capacity(addresses.len());
                for ip in addresses {
                    if !updated.contains(ip) {
                        updated.push(ip.clone());
                    }
                }
                updated
            }
        }
    }
}

impl Merchant {
    /// An empty whitelist admits every address.
    pub fn allows_ip(&self, ip: Option<IpAddr>) -> bool {
        if self.whitelist_ips.is_empty() {
            return true;
        }
        match ip {
            Some(ip) => {
                let ip = ip.to_string();
                self.whitelist_ips.iter().any(|allowed| *allowed == ip)
            }
            None => false,
        }
    }

    pub async fn create<'e, E>(executor: E, merchant: CreateMerchant) -> Result<Self, MerchantError>
    where
        E: PgExecutor<'e>,
    {
        let now = Utc::now();

        let merchant = sqlx::query_as::<_, Merchant>(
            "INSERT INTO merchants (id, user_id, business_name, business_type, contact_phone, address, api_key,
                 webhook_secret, callback_url, is_active, whitelist_ips, bank_details, upi_details,
                 min_deposit, max_deposit, min_withdrawal, max_withdrawal, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(merchant.user_id)
        .bind(merchant.business_name)
        .bind(merchant.business_type)
        .bind(merchant.contact_phone)
        .bind(merchant.address)
        .bind(merchant.api_key)
        .bind(merchant.webhook_secret)
        .bind(merchant.callback_url)
        .bind(merchant.is_active)
        .bind(Json(merchant.whitelist_ips))
        .bind(merchant.bank_details.map(Json))
        .bind(merchant.upi_details.map(Json))
        .bind(merchant.min_deposit)
        .bind(merchant.max_deposit)
        .bind(merchant.min_withdrawal)
        .bind(merchant.max_withdrawal)
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await?;

        Ok(merchant)
    }

    pub async fn find_by_id(pool: &DbPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let merchant = sqlx::query_as::<_, Merchant>("SELECT * FROM merchants WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(merchant)
    }

    pub async fn find_by_api_key(pool: &DbPool, api_key: &str) -> Result<Option<Self>, sqlx::Error> {
        let merchant = sqlx::query_as::<_, Merchant>("SELECT * FROM merchants WHERE api_key = $1")
            .bind(api_key)
            .fetch_optional(pool)
            .await?;

        Ok(merchant)
    }

    pub async fn find_all(pool: &DbPool, skip: i64, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        let merchants = sqlx::query_as::<_, Merchant>(
            "SELECT * FROM merchants ORDER BY created_at DESC OFFSET $1 LIMIT $2",
        )
        .bind(skip)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(merchants)
    }

    pub async fn update(
        pool: &DbPool,
        id: Uuid,
        update_data: UpdateMerchant,
    ) -> Result<Self, MerchantError> {
        let updated = sqlx::query_as::<_, Merchant>(
            r#"
            UPDATE merchants
            SET
                business_name = COALESCE($2, business_name),
                business_type = COALESCE($3, business_type),
                contact_phone = COALESCE($4, contact_phone),
                address = COALESCE($5, address),
                callback_url = COALESCE($6, callback_url),
                is_active = COALESCE($7, is_active),
                bank_details = COALESCE($8, bank_details),
                upi_details = COALESCE($9, upi_details),
                min_deposit = COALESCE($10, min_deposit),
                max_deposit = COALESCE($11, max_deposit),
                min_withdrawal = COALESCE($12, min_withdrawal),
                max_withdrawal = COALESCE($13, max_withdrawal),
                updated_at = $14
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update_data.business_name)
        .bind(update_data.business_type)
        .bind(update_data.contact_phone)
        .bind(update_data.address)
        .bind(update_data.callback_url)
        .bind(update_data.is_active)
        .bind(update_data.bank_details.map(Json))
        .bind(update_data.upi_details.map(Json))
        .bind(update_data.min_deposit)
        .bind(update_data.max_deposit)
        .bind(update_data.min_withdrawal)
        .bind(update_data.max_withdrawal)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;

        updated.ok_or(MerchantError::NotFound { id })
    }

    /// Rotates the merchant key and mirrors it onto the owning user.
    pub async fn regenerate_api_key(
        pool: &DbPool,
        id: Uuid,
        new_key: &str,
    ) -> Result<Self, MerchantError> {
        let mut tx = pool.begin().await?;

        let merchant = sqlx::query_as::<_, Merchant>(
            "UPDATE merchants SET api_key = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(new_key)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(MerchantError::NotFound { id })?;

        crate::models::user::User::set_api_key(&mut *tx, merchant.user_id, new_key).await?;
        tx.commit().await?;

        Ok(merchant)
    }

    pub async fn set_whitelist(
        pool: &DbPool,
        id: Uuid,
        whitelist: Vec<String>,
    ) -> Result<Self, MerchantError> {
        let merchant = sqlx::query_as::<_, Merchant>(
            "UPDATE merchants SET whitelist_ips = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(Json(whitelist))
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;

        merchant.ok_or(MerchantError::NotFound { id })
    }

    pub async fn set_webhook_secret(pool: &DbPool, id: Uuid, secret: &str) -> Result<Self, MerchantError> {
        let merchant = sqlx::query_as::<_, Merchant>(
            "UPDATE merchants SET webhook_secret = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(secret)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;

        merchant.ok_or(MerchantError::NotFound { id })
    }

    /// Returns `(total, active)` merchant counts.
    pub async fn counts(pool: &DbPool) -> Result<(i64, i64), sqlx::Error> {
        let counts: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active) FROM merchants",
        )
        .fetch_one(pool)
        .await?;

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::merchant_with_whitelist;

    fn ips(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn whitelist_add_skips_duplicates() {
        let updated = WhitelistOperation::Add.apply(&ips(&["10.0.0.1"]), &ips(&["10.0.0.1", "10.0.0.2"]));
        assert_eq!(updated, ips(&["10.0.0.1", "10.0.0.2"]));
    }

    #[test]
    fn whitelist_remove_and_replace() {
        let current = ips(&["10.0.0.1", "10.0.0.2"]);
        assert_eq!(
            WhitelistOperation::Remove.apply(&current, &ips(&["10.0.0.1"])),
            ips(&["10.0.0.2"])
        );
        assert_eq!(
            WhitelistOperation::Replace.apply(&current, &ips(&["::1", "::1"])),
            ips(&["::1"])
        );
    }

    #[test]
    fn addresses_are_normalized() {
        assert_eq!(
            normalize_ips(&ips(&[" 10.0.0.1 ", "0:0:0:0:0:0:0:1"])).unwrap(),
            ips(&["10.0.0.1", "::1"])
        );
        assert!(matches!(
            normalize_ips(&ips(&["10.0.0.300"])),
            Err(MerchantError::InvalidIp(_))
        ));
    }

    #[test]
    fn empty_whitelist_allows_everyone() {
        let merchant = merchant_with_whitelist(vec![]);
        assert!(merchant.allows_ip(None));
        assert!(merchant.allows_ip(Some("1.2.3.4".parse().unwrap())));
    }

    #[test]
    fn whitelist_restricts_peers() {
        let merchant = merchant_with_whitelist(ips(&["10.0.0.1"]));
        assert!(merchant.allows_ip(Some("10.0.0.1".parse().unwrap())));
        assert!(!merchant.allows_ip(Some("10.0.0.2".parse().unwrap())));
        assert!(!merchant.allows_ip(None));
    }
}
