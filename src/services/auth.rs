use crate::{
    config::Settings,
    database::connection::DbPool,
    models::{auth::Claims, user::User},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Issues and validates HS256 access tokens.
#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_minutes: i64,
}

impl AuthService {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_minutes,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.secret_key, settings.access_token_expire_minutes)
    }

    pub fn generate_token(&self, user: &User) -> Result<String, AuthError> {
        let claims = Claims::new(user.id, user.role, self.ttl_minutes);
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }

    pub async fn authenticate_user(
        &self,
        pool: &DbPool,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, AuthError> {
        Ok(User::authenticate(pool, email, password).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;
    use chrono::Utc;
    use uuid::Uuid;

    fn user(role: UserRole) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "admin@example.com".into(),
            password_hash: String::new(),
            full_name: None,
            role,
            is_active: true,
            api_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn token_round_trip_keeps_subject_and_role() {
        let service = AuthService::new("secret", 60);
        let admin = user(UserRole::Admin);
        let token = service.generate_token(&admin).unwrap();
        let claims = service.validate_token(&token).unwrap();
        assert_eq!(claims.sub, admin.id);
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = AuthService::new("one", 60)
            .generate_token(&user(UserRole::Staff))
            .unwrap();
        assert!(AuthService::new("two", 60).validate_token(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let service = AuthService::new("secret", -10);
        let token = service.generate_token(&user(UserRole::Staff)).unwrap();
        assert!(service.validate_token(&token).is_err());
    }
}
