use crate::{
    database::connection::DbPool,
    middleware::auth::AdminUser,
    models::merchant::{Merchant, MerchantError, normalize_ips},
    requests::whitelist::WhitelistRequest,
    utils::helpers::ApiResponse,
};
use actix_web::{HttpResponse, Result, http::StatusCode, web};
use tracing::{error, info};
use uuid::Uuid;

fn not_found() -> HttpResponse {
    ApiResponse::<()>::error("Merchant not found".to_string()).to_response(StatusCode::NOT_FOUND)
}

pub async fn get_whitelist(
    pool: web::Data<DbPool>,
    _admin: AdminUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    match Merchant::find_by_id(&pool, path.into_inner()).await {
        Ok(Some(merchant)) => Ok(HttpResponse::Ok().json(ApiResponse::success(merchant.whitelist_ips.0))),
        Ok(None) => Ok(not_found()),
        Err(e) => {
            error!("Database error reading whitelist: {}", e);
            Ok(ApiResponse::<()>::error("Failed to retrieve whitelist".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

pub async fn update_whitelist(
    pool: web::Data<DbPool>,
    admin: AdminUser,
    path: web::Path<Uuid>,
    request: web::Json<WhitelistRequest>,
) -> Result<HttpResponse> {
    let merchant_id = path.into_inner();

    let addresses = match normalize_ips(&request.ip_addresses) {
        Ok(addresses) => addresses,
        Err(e) => return Ok(ApiResponse::<()>::error(e.to_string()).to_response(StatusCode::BAD_REQUEST)),
    };

    let merchant = match Merchant::find_by_id(&pool, merchant_id).await {
        Ok(Some(merchant)) => merchant,
        Ok(None) => return Ok(not_found()),
        Err(e) => {
            error!("Database error reading whitelist: {}", e);
            return Ok(ApiResponse::<()>::error("Failed to update whitelist".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR));
        }
    };

    let updated = request.operation.apply(&merchant.whitelist_ips, &addresses);
    match Merchant::set_whitelist(&pool, merchant_id, updated).await {
        Ok(merchant) => {
            info!(
                "Admin {} updated whitelist of merchant {} ({} entries)",
                admin.0.user_id,
                merchant_id,
                merchant.whitelist_ips.len()
            );
            Ok(HttpResponse::Ok().json(ApiResponse::success(merchant.whitelist_ips.0)))
        }
        Err(MerchantError::NotFound { .. }) => Ok(not_found()),
        Err(e) => {
            error!("Failed to update whitelist of merchant {}: {}", merchant_id, e);
            Ok(ApiResponse::<()>::error("Failed to update whitelist".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}
