use crate::{
    database::connection::DbPool,
    middleware::api_key::ApiMerchant,
    models::payment::Payment,
    requests::report::PaymentQuery,
    services::csv_exporter::{download_filename, render_payments_csv},
    utils::helpers::ApiResponse,
};
use actix_web::{
    HttpResponse, Result,
    http::{StatusCode, header},
    web,
};
use chrono::Utc;
use tracing::{error, info};

pub async fn payments(
    pool: web::Data<DbPool>,
    merchant: ApiMerchant,
    query: web::Query<PaymentQuery>,
) -> Result<HttpResponse> {
    let (filter, page) = match (query.filter_for_merchant(merchant.id), query.page()) {
        (Ok(filter), Ok(page)) => (filter, page),
        (Err(message), _) | (_, Err(message)) => {
            return Ok(ApiResponse::<()>::error(message).to_response(StatusCode::UNPROCESSABLE_ENTITY));
        }
    };

    match Payment::search(&pool, &filter, page).await {
        Ok(result) => Ok(HttpResponse::Ok().json(result)),
        Err(e) => {
            error!("Error building report for merchant {}: {}", merchant.id, e);
            Ok(ApiResponse::<()>::error("Failed to retrieve payments".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

pub async fn download_payments(
    pool: web::Data<DbPool>,
    merchant: ApiMerchant,
    query: web::Query<PaymentQuery>,
) -> Result<HttpResponse> {
    let filter = match query.filter_for_merchant(merchant.id) {
        Ok(filter) => filter,
        Err(message) => {
            return Ok(ApiResponse::<()>::error(message).to_response(StatusCode::UNPROCESSABLE_ENTITY));
        }
    };

    let payments = match Payment::list_filtered(&pool, &filter).await {
        Ok(payments) => payments,
        Err(e) => {
            error!("Error loading payments for merchant {}: {}", merchant.id, e);
            return Ok(ApiResponse::<()>::error("Failed to export payments".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR));
        }
    };
    if payments.is_empty() {
        return Ok(ApiResponse::<()>::error("No payments found for the given criteria".to_string())
            .to_response(StatusCode::NOT_FOUND));
    }

    match render_payments_csv(&payments) {
        Ok(content) => {
            info!("Merchant {} downloaded {} payments", merchant.id, payments.len());
            let filename = download_filename(&merchant.business_name, Utc::now().date_naive());
            Ok(HttpResponse::Ok()
                .content_type("text/csv")
                .insert_header((
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ))
                .body(content))
        }
        Err(e) => {
            error!("Failed to render CSV for merchant {}: {}", merchant.id, e);
            Ok(ApiResponse::<()>::error("Failed to export payments".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}
