use crate::models::user::UserRole;
use serde::Deserialize;
use uuid::Uuid;

fn default_true() -> bool {
    true
}

fn default_limit() -> i64 {
    100
}

fn default_pending_days() -> i64 {
    7
}

fn default_stats_days() -> i64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub role: UserRole,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl ListQuery {
    pub fn validate(&self) -> Result<(), String> {
        if self.skip < 0 {
            return Err("skip must not be negative".to_string());
        }
        if !(1..=1000).contains(&self.limit) {
            return Err("limit must be between 1 and 1000".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct PendingPaymentsQuery {
    pub merchant_id: Option<Uuid>,
    #[serde(default = "default_pending_days")]
    pub days: i64,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_stats_days")]
    pub days: i64,
}

/// `days` must fall within `1..=max`.
pub fn validate_days(days: i64, max: i64) -> Result<i64, String> {
    if (1..=max).contains(&days) {
        Ok(days)
    } else {
        Err(format!("days must be between 1 and {}", max))
    }
}

#[derive(Debug, Deserialize)]
pub struct AdminVerifyRequest {
    pub utr_number: String,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeclineRequest {
    pub remarks: String,
}
