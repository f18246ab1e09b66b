use crate::{
    config::Settings,
    database::connection::DbPool,
    middleware::auth::AdminUser,
    models::{
        merchant::{CreateMerchant, Merchant, MerchantError, UpdateMerchant, normalize_ips},
        user::{CreateUser, User, UserError, UserRole},
    },
    requests::{
        admin::ListQuery,
        merchant::{CreateMerchantRequest, UpdateMerchantRequest, check_limits},
    },
    utils::{
        helpers::ApiResponse,
        keys::{generate_api_key, generate_webhook_secret},
    },
};
use actix_web::{HttpResponse, Result, http::StatusCode, web};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Error, Debug)]
enum OnboardingError {
    #[error("Either user_id or email is required")]
    MissingOwner,
    #[error("The user with this ID does not exist in the system")]
    OwnerNotFound,
    #[error("password is required to create a new merchant user")]
    MissingPassword,
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Merchant(#[from] MerchantError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A merchant together with its webhook signing secret. Only returned when
/// the secret is issued; merchant listings never carry it.
#[derive(Debug, Serialize)]
pub struct IssuedMerchant {
    #[serde(flatten)]
    pub merchant: Merchant,
    pub webhook_secret: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookSecret {
    pub merchant_id: Uuid,
    pub webhook_secret: String,
}

/// Resolves or creates the owning user, then inserts the merchant and
/// mirrors its key onto the user, all in one transaction.
async fn onboard(
    pool: &DbPool,
    settings: &Settings,
    request: CreateMerchantRequest,
) -> Result<IssuedMerchant, OnboardingError> {
    let whitelist_ips = normalize_ips(&request.whitelist_ips).map_err(|e| OnboardingError::Invalid(e.to_string()))?;
    let min_deposit = request.min_deposit.unwrap_or(settings.min_deposit_amount);
    let max_deposit = request.max_deposit.unwrap_or(settings.max_deposit_amount);
    let min_withdrawal = request.min_withdrawal.unwrap_or(settings.min_withdrawal_amount);
    let max_withdrawal = request.max_withdrawal.unwrap_or(settings.max_withdrawal_amount);
    check_limits(min_deposit, max_deposit, "deposit").map_err(OnboardingError::Invalid)?;
    check_limits(min_withdrawal, max_withdrawal, "withdrawal").map_err(OnboardingError::Invalid)?;

    let api_key = generate_api_key();
    let webhook_secret = generate_webhook_secret();
    let mut tx = pool.begin().await?;

    let owner_id = match (request.user_id, request.email.as_deref()) {
        (Some(user_id), _) => {
            let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
            exists.ok_or(OnboardingError::OwnerNotFound)?
        }
        (None, Some(email)) => match User::find_by_email(&mut *tx, email).await? {
            Some(user) => user.id,
            None => {
                let password = request.password.clone().ok_or(OnboardingError::MissingPassword)?;
                let user = User::create(
                    &mut *tx,
                    CreateUser {
                        email: email.to_string(),
                        password,
                        full_name: request.full_name.clone().or_else(|| Some(request.business_name.clone())),
                        role: UserRole::Merchant,
                        is_active: true,
                        api_key: None,
                    },
                )
                .await?;
                user.id
            }
        },
        (None, None) => return Err(OnboardingError::MissingOwner),
    };

    let merchant = Merchant::create(
        &mut *tx,
        CreateMerchant {
            user_id: owner_id,
            business_name: request.business_name,
            business_type: request.business_type,
            contact_phone: request.contact_phone,
            address: request.address,
            api_key: api_key.clone(),
            webhook_secret: Some(webhook_secret.clone()),
            callback_url: request.callback_url,
            is_active: true,
            whitelist_ips,
            bank_details: request.bank_details,
            upi_details: request.upi_details,
            min_deposit,
            max_deposit,
            min_withdrawal,
            max_withdrawal,
        },
    )
    .await?;
    User::set_api_key(&mut *tx, owner_id, &api_key).await?;
    tx.commit().await?;

    Ok(IssuedMerchant {
        merchant,
        webhook_secret,
    })
}

pub async fn list_merchants(
    pool: web::Data<DbPool>,
    _admin: AdminUser,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    if let Err(message) = query.validate() {
        return Ok(ApiResponse::<()>::error(message).to_response(StatusCode::UNPROCESSABLE_ENTITY));
    }

    match Merchant::find_all(&pool, query.skip, query.limit).await {
        Ok(merchants) => Ok(HttpResponse::Ok().json(ApiResponse::success(merchants))),
        Err(e) => {
            error!("Database error listing merchants: {}", e);
            Ok(ApiResponse::<()>::error("Failed to retrieve merchants".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

pub async fn create_merchant(
    pool: web::Data<DbPool>,
    settings: web::Data<Settings>,
    admin: AdminUser,
    request: web::Json<CreateMerchantRequest>,
) -> Result<HttpResponse> {
    info!("Admin {} onboarding merchant {}", admin.0.user_id, request.business_name);

    match onboard(&pool, &settings, request.into_inner()).await {
        Ok(issued) => {
            info!("Successfully created merchant with ID: {}", issued.merchant.id);
            Ok(HttpResponse::Created().json(ApiResponse::success(issued)))
        }
        Err(OnboardingError::OwnerNotFound) => Ok(ApiResponse::<()>::error(
            OnboardingError::OwnerNotFound.to_string(),
        )
        .to_response(StatusCode::NOT_FOUND)),
        Err(e @ (OnboardingError::Database(_) | OnboardingError::Merchant(MerchantError::Database(_)))) => {
            error!("Database error creating merchant: {}", e);
            Ok(ApiResponse::<()>::error("Failed to create merchant".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
        Err(OnboardingError::User(UserError::Database(e))) => {
            error!("Database error creating merchant user: {}", e);
            Ok(ApiResponse::<()>::error("Failed to create merchant".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
        Err(e) => Ok(ApiResponse::<()>::error(e.to_string()).to_response(StatusCode::BAD_REQUEST)),
    }
}

pub async fn get_merchant(
    pool: web::Data<DbPool>,
    _admin: AdminUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let merchant_id = path.into_inner();

    match Merchant::find_by_id(&pool, merchant_id).await {
        Ok(Some(merchant)) => Ok(HttpResponse::Ok().json(ApiResponse::success(merchant))),
        Ok(None) => Ok(ApiResponse::<()>::error("Merchant not found".to_string())
            .to_response(StatusCode::NOT_FOUND)),
        Err(e) => {
            error!("Database error getting merchant: {}", e);
            Ok(ApiResponse::<()>::error("Failed to retrieve merchant".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

pub async fn update_merchant(
    pool: web::Data<DbPool>,
    admin: AdminUser,
    path: web::Path<Uuid>,
    request: web::Json<UpdateMerchantRequest>,
) -> Result<HttpResponse> {
    let merchant_id = path.into_inner();
    info!("Admin {} updating merchant {}", admin.0.user_id, merchant_id);

    let current = match Merchant::find_by_id(&pool, merchant_id).await {
        Ok(Some(merchant)) => merchant,
        Ok(None) => {
            return Ok(ApiResponse::<()>::error("Merchant not found".to_string())
                .to_response(StatusCode::NOT_FOUND));
        }
        Err(e) => {
            error!("Database error loading merchant {}: {}", merchant_id, e);
            return Ok(ApiResponse::<()>::error("Failed to update merchant".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR));
        }
    };
    if let Err(message) = request.check_limits_against(&current) {
        return Ok(ApiResponse::<()>::error(message).to_response(StatusCode::BAD_REQUEST));
    }

    let update: UpdateMerchant = request.into_inner().into();
    match Merchant::update(&pool, merchant_id, update).await {
        Ok(merchant) => Ok(HttpResponse::Ok().json(ApiResponse::success(merchant))),
        Err(MerchantError::NotFound { .. }) => Ok(ApiResponse::<()>::error("Merchant not found".to_string())
            .to_response(StatusCode::NOT_FOUND)),
        Err(e) => {
            error!("Error updating merchant {}: {}", merchant_id, e);
            Ok(ApiResponse::<()>::error("Failed to update merchant".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

pub async fn regenerate_api_key(
    pool: web::Data<DbPool>,
    admin: AdminUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let merchant_id = path.into_inner();

    match Merchant::regenerate_api_key(&pool, merchant_id, &generate_api_key()).await {
        Ok(merchant) => {
            info!("Admin {} rotated API key for merchant {}", admin.0.user_id, merchant_id);
            Ok(HttpResponse::Ok().json(ApiResponse::success(merchant)))
        }
        Err(MerchantError::NotFound { .. }) => Ok(ApiResponse::<()>::error("Merchant not found".to_string())
            .to_response(StatusCode::NOT_FOUND)),
        Err(e) => {
            error!("Failed to rotate API key for merchant {}: {}", merchant_id, e);
            Ok(ApiResponse::<()>::error("Failed to regenerate API key".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

pub async fn regenerate_webhook_secret(
    pool: web::Data<DbPool>,
    admin: AdminUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let merchant_id = path.into_inner();

    match Merchant::set_webhook_secret(&pool, merchant_id, &generate_webhook_secret()).await {
        Ok(merchant) => {
            info!("Admin {} rotated webhook secret for merchant {}", admin.0.user_id, merchant_id);
            Ok(HttpResponse::Ok().json(ApiResponse::success(WebhookSecret {
                merchant_id: merchant.id,
                webhook_secret: merchant.webhook_secret.unwrap_or_default(),
            })))
        }
        Err(MerchantError::NotFound { .. }) => Ok(ApiResponse::<()>::error("Merchant not found".to_string())
            .to_response(StatusCode::NOT_FOUND)),
        Err(e) => {
            error!("Failed to rotate webhook secret for merchant {}: {}", merchant_id, e);
            Ok(ApiResponse::<()>::error("Failed to regenerate webhook secret".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::merchant;

    #[test]
    fn issued_secret_is_shown_once_beside_the_merchant() {
        let mut m = merchant();
        m.webhook_secret = Some("whsec_stored".into());
        let listed = serde_json::to_value(&m).unwrap();
        assert!(listed.get("webhook_secret").is_none());

        let body = serde_json::to_value(IssuedMerchant {
            merchant: m.clone(),
            webhook_secret: "whsec_stored".into(),
        })
        .unwrap();
        assert_eq!(body["webhook_secret"], "whsec_stored");
        assert_eq!(body["id"], m.id.to_string());
        assert_eq!(body["business_name"], "Acme Traders");
    }
}
