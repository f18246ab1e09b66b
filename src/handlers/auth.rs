use crate::{
    database::connection::DbPool,
    middleware::auth::AuthenticatedUser,
    models::{auth::TokenResponse, user::User},
    requests::auth::{LoginRequest, ResetPasswordRequest},
    services::auth::AuthService,
    utils::helpers::ApiResponse,
};
use actix_web::{Either, HttpResponse, Result, http::StatusCode, web};
use tracing::{error, info, warn};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Accepts the credentials as JSON or as an OAuth2 password form.
pub async fn login(
    pool: web::Data<DbPool>,
    auth: web::Data<AuthService>,
    request: Either<web::Json<LoginRequest>, web::Form<LoginRequest>>,
) -> Result<HttpResponse> {
    let request = match request {
        Either::Left(json) => json.into_inner(),
        Either::Right(form) => form.into_inner(),
    };

    let user = match auth
        .authenticate_user(&pool, &request.username, &request.password)
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!("Failed login for {}", request.username);
            return Ok(ApiResponse::<()>::error("Incorrect email or password".to_string())
                .to_response(StatusCode::BAD_REQUEST));
        }
        Err(e) => {
            error!("Authentication error: {}", e);
            return Ok(ApiResponse::<()>::error("Authentication error".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR));
        }
    };

    if !user.is_active {
        return Ok(ApiResponse::<()>::error("Inactive user".to_string()).to_response(StatusCode::BAD_REQUEST));
    }

    match auth.generate_token(&user) {
        Ok(token) => {
            info!("User {} logged in", user.id);
            Ok(HttpResponse::Ok().json(TokenResponse::bearer(token)))
        }
        Err(e) => {
            error!("Failed to generate token: {}", e);
            Ok(ApiResponse::<()>::error("Failed to generate token".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

pub async fn reset_password(
    pool: web::Data<DbPool>,
    user: AuthenticatedUser,
    request: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse> {
    if request.new_password.len() < MIN_PASSWORD_LEN {
        return Ok(ApiResponse::<()>::error(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ))
        .to_response(StatusCode::BAD_REQUEST));
    }

    let account = match User::find_by_id(&pool, user.user_id).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            return Ok(ApiResponse::<()>::error("User not found".to_string()).to_response(StatusCode::NOT_FOUND));
        }
        Err(e) => {
            error!("Database error loading user {}: {}", user.user_id, e);
            return Ok(ApiResponse::<()>::error("Failed to reset password".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR));
        }
    };

    if !account.verify_password(&request.current_password).unwrap_or(false) {
        return Ok(ApiResponse::<()>::error("Incorrect password".to_string()).to_response(StatusCode::BAD_REQUEST));
    }

    match User::set_password(&pool, account.id, &request.new_password).await {
        Ok(()) => {
            info!("Password updated for user {}", account.id);
            Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
                (),
                "Password updated successfully".to_string(),
            )))
        }
        Err(e) => {
            error!("Failed to update password for {}: {}", account.id, e);
            Ok(ApiResponse::<()>::error("Failed to reset password".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}
