use crate::database::connection::DbPool;
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, Type};
use std::{fmt, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum UserError {
    #[error("User with ID {id} not found")]
    NotFound { id: Uuid },
    #[error("The user with this email already exists in the system")]
    EmailTaken,
    #[error("No fields provided for update")]
    NoUpdateFields,
    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Staff,
    Merchant,
}

impl FromStr for UserRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "staff" => Ok(UserRole::Staff),
            "merchant" => Ok(UserRole::Merchant),
            _ => Err(()),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self {
            UserRole::Admin => "admin",
            UserRole::Staff => "staff",
            UserRole::Merchant => "merchant",
        };
        f.write_str(role)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

impl UpdateUser {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.password.is_none()
            && self.full_name.is_none()
            && self.role.is_none()
            && self.is_active.is_none()
    }
}

fn email_conflict(err: sqlx::Error) -> UserError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => UserError::EmailTaken,
        _ => UserError::Database(err),
    }
}

impl User {
    pub async fn create<'e, E>(executor: E, user: CreateUser) -> Result<Self, UserError>
    where
        E: PgExecutor<'e>,
    {
        let now = Utc::now();
        let hashed_password = hash(user.password.as_bytes(), DEFAULT_COST)?;

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email, password_hash, full_name, role, is_active, api_key, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user.email)
        .bind(hashed_password)
        .bind(user.full_name)
        .bind(user.role)
        .bind(user.is_active)
        .bind(user.api_key)
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await
        .map_err(email_conflict)?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &DbPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    pub async fn find_by_email<'e, E>(executor: E, email: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(executor)
            .await?;

        Ok(user)
    }

    pub async fn find_all(pool: &DbPool, skip: i64, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users ORDER BY created_at DESC OFFSET $1 LIMIT $2",
        )
        .bind(skip)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(users)
    }

    pub async fn update(pool: &DbPool, id: Uuid, update_data: UpdateUser) -> Result<Self, UserError> {
        if update_data.is_empty() {
            return Err(UserError::NoUpdateFields);
        }

        let password_hash = match update_data.password {
            Some(password) => Some(hash(password.as_bytes(), DEFAULT_COST)?),
            None => None,
        };

        let updated = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET
                email = COALESCE($2, email),
                password_hash = COALESCE($3, password_hash),
                full_name = COALESCE($4, full_name),
                role = COALESCE($5, role),
                is_active = COALESCE($6, is_active),
                updated_at = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update_data.email)
        .bind(password_hash)
        .bind(update_data.full_name)
        .bind(update_data.role)
        .bind(update_data.is_active)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
        .map_err(email_conflict)?;

        updated.ok_or(UserError::NotFound { id })
    }

    pub async fn set_password(pool: &DbPool, id: Uuid, password: &str) -> Result<(), UserError> {
        let hashed_password = hash(password.as_bytes(), DEFAULT_COST)?;

        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(hashed_password)
            .bind(Utc::now())
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(UserError::NotFound { id });
        }

        Ok(())
    }

    pub async fn set_api_key<'e, E>(executor: E, id: Uuid, api_key: &str) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query("UPDATE users SET api_key = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(api_key)
            .bind(Utc::now())
            .execute(executor)
            .await?;

        Ok(())
    }

    pub fn verify_password(&self, password: &str) -> Result<bool, bcrypt::BcryptError> {
        verify(password, &self.password_hash)
    }

    pub async fn authenticate(
        pool: &DbPool,
        email: &str,
        password: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        if let Some(user) = Self::find_by_email(pool, email).await? {
            if user.verify_password(password).unwrap_or(false) {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(password: &str) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "ops@example.com".into(),
            password_hash: hash(password, 4).unwrap(),
            full_name: None,
            role: UserRole::Staff,
            is_active: true,
            api_key: Some("secret".into()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn role_parses_and_displays() {
        for role in [UserRole::Admin, UserRole::Staff, UserRole::Merchant] {
            assert_eq!(role.to_string().parse::<UserRole>(), Ok(role));
        }
        assert!("root".parse::<UserRole>().is_err());
    }

    #[test]
    fn password_verification() {
        let user = sample_user("hunter22");
        assert!(user.verify_password("hunter22").unwrap());
        assert!(!user.verify_password("hunter23").unwrap());
    }

    #[test]
    fn secrets_are_not_serialized() {
        let body = serde_json::to_value(sample_user("pw")).unwrap();
        assert!(body.get("password_hash").is_none());
        assert!(body.get("api_key").is_none());
        assert_eq!(body["role"], "staff");
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(UpdateUser::default().is_empty());
        let update = UpdateUser {
            is_active: Some(false),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
