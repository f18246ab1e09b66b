use crate::{
    database::connection::DbPool,
    models::user::{User, UserRole},
    services::auth::AuthService,
    utils::helpers::ApiError,
};
use actix_web::{FromRequest, HttpRequest, dev::Payload, http::header, web};
use futures_util::future::LocalBoxFuture;
use tracing::error;
use uuid::Uuid;

/// The caller behind a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// An [`AuthenticatedUser`] whose role is `admin`.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    (scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty()).then(|| token.trim().to_string())
}

async fn authenticate(req: HttpRequest) -> Result<AuthenticatedUser, ApiError> {
    let token = bearer_token(&req).ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

    let auth = req
        .app_data::<web::Data<AuthService>>()
        .ok_or_else(|| ApiError::internal("Authentication service unavailable"))?;
    let claims = auth
        .validate_token(&token)
        .map_err(|_| ApiError::forbidden("Could not validate credentials"))?;

    let pool = req
        .app_data::<web::Data<DbPool>>()
        .ok_or_else(|| ApiError::internal("Database unavailable"))?;
    let user = User::find_by_id(pool, claims.sub)
        .await
        .map_err(|e| {
            error!("Database error loading user {}: {}", claims.sub, e);
            ApiError::internal("Failed to load user")
        })?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !user.is_active {
        return Err(ApiError::bad_request("Inactive user"));
    }

    Ok(AuthenticatedUser {
        user_id: user.id,
        email: user.email,
        role: user.role,
    })
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        Box::pin(authenticate(req.clone()))
    }
}

impl FromRequest for AdminUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let user = authenticate(req).await?;
            if !user.is_admin() {
                return Err(ApiError::forbidden("The user doesn't have enough privileges"));
            }
            Ok(AdminUser(user))
        })
    }
}
