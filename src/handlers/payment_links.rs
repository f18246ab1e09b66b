use crate::{
    config::Settings,
    database::connection::DbPool,
    middleware::api_key::ApiMerchant,
    models::{
        payment::{PaymentMethod, PaymentStatus},
        payment_link::{PaymentLink, PaymentLinkError, UpdatePaymentLink},
    },
    requests::payment_link::{
        CreatePaymentLinkRequest, LinkListQuery, LinkPaymentRequest, SubmitUtrQuery, UpdatePaymentLinkRequest,
    },
    services::{
        payment_links::{LinkError, PaymentLinkService},
        payment_processor::RequestReceipt,
    },
    utils::helpers::ApiResponse,
};
use actix_web::{HttpResponse, Result, http::StatusCode, web};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

/// A link as shown to its merchant, with the customer-facing path.
#[derive(Debug, Serialize)]
pub struct LinkView {
    #[serde(flatten)]
    pub link: PaymentLink,
    pub payment_url: String,
}

impl From<PaymentLink> for LinkView {
    fn from(link: PaymentLink) -> Self {
        let payment_url = link.payment_path();
        Self { link, payment_url }
    }
}

/// What the public payment page needs to render a link.
#[derive(Debug, Serialize)]
pub struct PublicLink {
    pub title: String,
    pub description: Option<String>,
    pub merchant: String,
    pub amount: Option<Decimal>,
    pub currency: String,
    pub allowed_methods: Vec<PaymentMethod>,
    pub custom_amount: bool,
    pub merchant_id: Uuid,
    pub payment_link_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LinkPaymentResult {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<RequestReceipt>,
}

fn link_error_response(err: LinkError) -> HttpResponse {
    let status = match &err {
        LinkError::NotFound | LinkError::PaymentNotFound => StatusCode::NOT_FOUND,
        LinkError::Database(e) => {
            error!("Database error handling payment link: {}", e);
            return ApiResponse::<()>::error("Internal server error".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
        _ => StatusCode::BAD_REQUEST,
    };
    ApiResponse::<()>::error(err.to_string()).to_response(status)
}

fn not_found() -> HttpResponse {
    ApiResponse::<()>::error("Payment link not found".to_string()).to_response(StatusCode::NOT_FOUND)
}

fn internal(message: &str) -> HttpResponse {
    ApiResponse::<()>::error(message.to_string()).to_response(StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn create_link(
    pool: web::Data<DbPool>,
    settings: web::Data<Settings>,
    merchant: ApiMerchant,
    request: web::Json<CreatePaymentLinkRequest>,
) -> Result<HttpResponse> {
    if let Err(message) = request.validate(&settings.currency) {
        return Ok(ApiResponse::<()>::error(message).to_response(StatusCode::BAD_REQUEST));
    }

    match PaymentLinkService::new(&pool).create_link(&merchant, request.into_inner()).await {
        Ok(link) => Ok(HttpResponse::Created().json(ApiResponse::success(LinkView::from(link)))),
        Err(e) => Ok(link_error_response(e)),
    }
}

pub async fn list_links(
    pool: web::Data<DbPool>,
    merchant: ApiMerchant,
    query: web::Query<LinkListQuery>,
) -> Result<HttpResponse> {
    if let Err(message) = query.validate() {
        return Ok(ApiResponse::<()>::error(message).to_response(StatusCode::UNPROCESSABLE_ENTITY));
    }

    match PaymentLink::list_for_merchant(&pool, merchant.id, query.skip, query.limit, query.active_only).await {
        Ok(links) => {
            let views: Vec<LinkView> = links.into_iter().map(LinkView::from).collect();
            Ok(HttpResponse::Ok().json(ApiResponse::success(views)))
        }
        Err(e) => {
            error!("Database error listing payment links for merchant {}: {}", merchant.id, e);
            Ok(internal("Failed to retrieve payment links"))
        }
    }
}

pub async fn get_link(
    pool: web::Data<DbPool>,
    merchant: ApiMerchant,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    match PaymentLink::find_for_merchant(&pool, path.into_inner(), merchant.id).await {
        Ok(Some(link)) => Ok(HttpResponse::Ok().json(ApiResponse::success(LinkView::from(link)))),
        Ok(None) => Ok(not_found()),
        Err(e) => {
            error!("Database error loading payment link: {}", e);
            Ok(internal("Failed to retrieve payment link"))
        }
    }
}

pub async fn update_link(
    pool: web::Data<DbPool>,
    merchant: ApiMerchant,
    path: web::Path<Uuid>,
    request: web::Json<UpdatePaymentLinkRequest>,
) -> Result<HttpResponse> {
    if let Err(message) = request.validate() {
        return Ok(ApiResponse::<()>::error(message).to_response(StatusCode::BAD_REQUEST));
    }

    let link_id = path.into_inner();
    let update: UpdatePaymentLink = request.into_inner().into();
    match PaymentLink::update(&pool, link_id, merchant.id, update).await {
        Ok(link) => {
            info!("Merchant {} updated payment link {}", merchant.id, link_id);
            Ok(HttpResponse::Ok().json(ApiResponse::success(LinkView::from(link))))
        }
        Err(PaymentLinkError::NotFound) => Ok(not_found()),
        Err(e) => {
            error!("Error updating payment link {}: {}", link_id, e);
            Ok(internal("Failed to update payment link"))
        }
    }
}

pub async fn deactivate_link(
    pool: web::Data<DbPool>,
    merchant: ApiMerchant,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let link_id = path.into_inner();
    match PaymentLink::deactivate(&pool, link_id, merchant.id).await {
        Ok(link) => {
            info!("Merchant {} deactivated payment link {}", merchant.id, link_id);
            Ok(HttpResponse::Ok().json(ApiResponse::success(LinkView::from(link))))
        }
        Err(PaymentLinkError::NotFound) => Ok(not_found()),
        Err(e) => {
            error!("Error deactivating payment link {}: {}", link_id, e);
            Ok(internal("Failed to deactivate payment link"))
        }
    }
}

pub async fn public_link(pool: web::Data<DbPool>, path: web::Path<String>) -> Result<HttpResponse> {
    match PaymentLinkService::new(&pool).public_link(&path).await {
        Ok((link, merchant)) => Ok(HttpResponse::Ok().json(ApiResponse::success(PublicLink {
            allowed_methods: link.methods(),
            custom_amount: link.amount.is_none(),
            title: link.title,
            description: link.description,
            merchant: merchant.business_name,
            amount: link.amount,
            currency: link.currency,
            merchant_id: link.merchant_id,
            payment_link_id: link.id,
        }))),
        Err(e) => Ok(link_error_response(e)),
    }
}

pub async fn pay_link(
    pool: web::Data<DbPool>,
    path: web::Path<String>,
    request: web::Json<LinkPaymentRequest>,
) -> Result<HttpResponse> {
    match PaymentLinkService::new(&pool).pay(&path, &request).await {
        Ok((payment, receipt)) => Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            LinkPaymentResult {
                payment_id: payment.id,
                status: payment.status,
                response: Some(receipt),
            },
            "Payment created successfully".to_string(),
        ))),
        Err(e) => Ok(link_error_response(e)),
    }
}

pub async fn submit_utr(
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
    query: web::Query<SubmitUtrQuery>,
) -> Result<HttpResponse> {
    match PaymentLinkService::new(&pool)
        .submit_utr(path.into_inner(), &query.utr_number)
        .await
    {
        Ok(payment) => Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            LinkPaymentResult {
                payment_id: payment.id,
                status: payment.status,
                response: None,
            },
            "UTR number submitted successfully".to_string(),
        ))),
        Err(e) => Ok(link_error_response(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::payment_link;
    use rust_decimal_macros::dec;

    #[test]
    fn link_view_carries_payment_url() {
        let body = serde_json::to_value(LinkView::from(payment_link(Some(dec!(1000))))).unwrap();
        assert_eq!(body["payment_url"], "/payment/HXK7M2PQ9R");
        assert_eq!(body["unique_code"], "HXK7M2PQ9R");
        assert_eq!(body["amount"], "1000");
    }

    #[test]
    fn link_errors_map_to_statuses() {
        assert_eq!(link_error_response(LinkError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(link_error_response(LinkError::Expired).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            link_error_response(LinkError::AlreadyProcessed("CONFIRMED".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(link_error_response(LinkError::PaymentNotFound).status(), StatusCode::NOT_FOUND);
    }
}
