use crate::{
    database::connection::DbPool,
    middleware::{api_key::ApiMerchant, auth::AdminUser},
    requests::analytics::{
        ADMIN_MAX_DAYS, ADMIN_MAX_LIMIT, MERCHANT_MAX_DAYS, MERCHANT_MAX_LIMIT, RangeQuery, WindowQuery,
    },
    services::analytics::AnalyticsService,
    utils::helpers::ApiResponse,
};
use actix_web::{HttpResponse, Result, http::StatusCode, web};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt::Display;
use tracing::error;
use uuid::Uuid;

fn unprocessable(message: String) -> HttpResponse {
    ApiResponse::<()>::error(message).to_response(StatusCode::UNPROCESSABLE_ENTITY)
}

fn respond<T: Serialize>(result: Result<T, sqlx::Error>, what: &str) -> HttpResponse {
    match result {
        Ok(data) => HttpResponse::Ok().json(ApiResponse::success(data)),
        Err(e) => {
            error!("Database error computing {}: {}", what, e);
            ApiResponse::<()>::error(format!("Failed to compute {}", what))
                .to_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn since(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

/// Admin windows may be narrowed to one merchant; merchant windows are always their own.
fn window(query: &WindowQuery, scope: Scope) -> Result<(Option<Uuid>, DateTime<Utc>, i64), String> {
    let (max_days, max_limit, merchant_id) = match scope {
        Scope::Admin => (ADMIN_MAX_DAYS, ADMIN_MAX_LIMIT, query.merchant_id),
        Scope::Merchant(id) => (MERCHANT_MAX_DAYS, MERCHANT_MAX_LIMIT, Some(id)),
    };
    let (days, limit) = query.bounded(max_days, max_limit)?;
    Ok((merchant_id, since(days), limit))
}

#[derive(Debug, Clone, Copy)]
enum Scope {
    Admin,
    Merchant(Uuid),
}

impl Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Admin => write!(f, "all merchants"),
            Scope::Merchant(id) => write!(f, "merchant {}", id),
        }
    }
}

async fn summary(pool: &DbPool, query: &RangeQuery, scope: Scope) -> HttpResponse {
    let range = match query.range() {
        Ok(range) => range,
        Err(message) => return unprocessable(message),
    };
    let merchant_id = match scope {
        Scope::Admin => query.merchant_id,
        Scope::Merchant(id) => Some(id),
    };
    respond(
        AnalyticsService::new(pool).summary(merchant_id, range).await,
        &format!("payment summary for {}", scope),
    )
}

async fn methods(pool: &DbPool, query: &RangeQuery, scope: Scope) -> HttpResponse {
    let range = match query.range() {
        Ok(range) => range,
        Err(message) => return unprocessable(message),
    };
    let merchant_id = match scope {
        Scope::Admin => query.merchant_id,
        Scope::Merchant(id) => Some(id),
    };
    respond(
        AnalyticsService::new(pool).method_distribution(merchant_id, range).await,
        "payment method distribution",
    )
}

async fn trends(pool: &DbPool, query: &WindowQuery, scope: Scope) -> HttpResponse {
    match window(query, scope) {
        Ok((merchant_id, since, _)) => respond(
            AnalyticsService::new(pool).daily_trends(merchant_id, since).await,
            "payment trends",
        ),
        Err(message) => unprocessable(message),
    }
}

async fn link_performance(pool: &DbPool, query: &WindowQuery, scope: Scope) -> HttpResponse {
    match window(query, scope) {
        Ok((merchant_id, since, limit)) => respond(
            AnalyticsService::new(pool)
                .link_performance(merchant_id, since, limit)
                .await,
            "payment link performance",
        ),
        Err(message) => unprocessable(message),
    }
}

async fn verification(pool: &DbPool, query: &WindowQuery, scope: Scope) -> HttpResponse {
    match window(query, scope) {
        Ok((merchant_id, since, _)) => respond(
            AnalyticsService::new(pool)
                .verification_metrics(merchant_id, since)
                .await,
            "verification metrics",
        ),
        Err(message) => unprocessable(message),
    }
}

pub async fn admin_summary(
    pool: web::Data<DbPool>,
    _admin: AdminUser,
    query: web::Query<RangeQuery>,
) -> Result<HttpResponse> {
    Ok(summary(&pool, &query, Scope::Admin).await)
}

pub async fn admin_trends(
    pool: web::Data<DbPool>,
    _admin: AdminUser,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse> {
    Ok(trends(&pool, &query, Scope::Admin).await)
}

pub async fn admin_payment_methods(
    pool: web::Data<DbPool>,
    _admin: AdminUser,
    query: web::Query<RangeQuery>,
) -> Result<HttpResponse> {
    Ok(methods(&pool, &query, Scope::Admin).await)
}

pub async fn admin_merchant_performance(
    pool: web::Data<DbPool>,
    _admin: AdminUser,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse> {
    match window(&query, Scope::Admin) {
        Ok((_, since, limit)) => Ok(respond(
            AnalyticsService::new(&pool).merchant_performance(since, limit).await,
            "merchant performance",
        )),
        Err(message) => Ok(unprocessable(message)),
    }
}

pub async fn admin_link_performance(
    pool: web::Data<DbPool>,
    _admin: AdminUser,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse> {
    Ok(link_performance(&pool, &query, Scope::Admin).await)
}

pub async fn admin_verification_metrics(
    pool: web::Data<DbPool>,
    _admin: AdminUser,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse> {
    Ok(verification(&pool, &query, Scope::Admin).await)
}

pub async fn merchant_summary(
    pool: web::Data<DbPool>,
    merchant: ApiMerchant,
    query: web::Query<RangeQuery>,
) -> Result<HttpResponse> {
    Ok(summary(&pool, &query, Scope::Merchant(merchant.id)).await)
}

pub async fn merchant_trends(
    pool: web::Data<DbPool>,
    merchant: ApiMerchant,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse> {
    Ok(trends(&pool, &query, Scope::Merchant(merchant.id)).await)
}

pub async fn merchant_payment_methods(
    pool: web::Data<DbPool>,
    merchant: ApiMerchant,
    query: web::Query<RangeQuery>,
) -> Result<HttpResponse> {
    Ok(methods(&pool, &query, Scope::Merchant(merchant.id)).await)
}

pub async fn merchant_link_performance(
    pool: web::Data<DbPool>,
    merchant: ApiMerchant,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse> {
    Ok(link_performance(&pool, &query, Scope::Merchant(merchant.id)).await)
}

pub async fn merchant_verification_metrics(
    pool: web::Data<DbPool>,
    merchant: ApiMerchant,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse> {
    Ok(verification(&pool, &query, Scope::Merchant(merchant.id)).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(body: serde_json::Value) -> WindowQuery {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn merchant_scope_ignores_requested_merchant() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let q = query(serde_json::json!({"merchant_id": other, "days": 7}));

        let (merchant_id, _, limit) = window(&q, Scope::Merchant(own)).unwrap();
        assert_eq!(merchant_id, Some(own));
        assert_eq!(limit, 10);

        let (merchant_id, since, _) = window(&q, Scope::Admin).unwrap();
        assert_eq!(merchant_id, Some(other));
        assert!(since < Utc::now() - Duration::days(6));
    }

    #[test]
    fn merchant_windows_are_narrower() {
        let q = query(serde_json::json!({"days": 180}));
        assert!(window(&q, Scope::Admin).is_ok());
        assert_eq!(
            window(&q, Scope::Merchant(Uuid::nil())).unwrap_err(),
            "days must be between 1 and 90"
        );
    }

    #[test]
    fn database_errors_become_500() {
        let resp = respond::<()>(Err(sqlx::Error::RowNotFound), "payment trends");
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(unprocessable("bad".into()).status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
