use crate::{
    config::Settings,
    database::connection::DbPool,
    middleware::{api_key::ApiMerchant, auth::AuthenticatedUser},
    models::payment::{Payment, PaymentError, VerificationMethod},
    requests::payment::{CheckRequest, CreatePaymentRequest, VerifyPaymentRequest},
    services::{
        callback::CallbackNotifier,
        payment_processor::PaymentProcessor,
        utr_verifier::{UtrVerifier, normalize_utr},
    },
    utils::helpers::{ApiResponse, GatewayResponse},
};
use actix_web::{HttpResponse, Result, http::StatusCode, web};
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatus {
    pub transaction_id: String,
    pub reference: String,
    #[serde(rename = "type")]
    pub payment_type: String,
    pub status: String,
    pub remarks: String,
    pub requested_date: String,
}

impl From<&Payment> for RequestStatus {
    fn from(payment: &Payment) -> Self {
        Self {
            transaction_id: payment.id.to_string(),
            reference: payment.reference.clone(),
            payment_type: payment.payment_type.as_str().to_string(),
            status: payment.status.as_str().to_string(),
            remarks: payment.remarks.clone().unwrap_or_default(),
            requested_date: payment.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

pub async fn create_request(
    pool: web::Data<DbPool>,
    settings: web::Data<Settings>,
    merchant: ApiMerchant,
    request: web::Json<CreatePaymentRequest>,
) -> Result<HttpResponse> {
    info!(
        "Payment request from merchant {}: {} {} (ref {})",
        merchant.id, request.action, request.amount, request.reference
    );

    let processor = PaymentProcessor::new(&pool, &settings.currency);
    match processor.process(&merchant, &request).await {
        Ok((_, receipt)) => Ok(GatewayResponse::success(201, receipt).to_response()),
        Err(e) => {
            if e.status() >= 500 {
                error!("Payment request failed for merchant {}: {}", merchant.id, e);
                return Ok(GatewayResponse::error(e.status(), e.code(), "Internal server error".to_string())
                    .to_response());
            }
            info!("Payment request rejected for merchant {}: {}", merchant.id, e);
            Ok(GatewayResponse::error(e.status(), e.code(), e.to_string()).to_response())
        }
    }
}

pub async fn check_request(
    pool: web::Data<DbPool>,
    merchant: ApiMerchant,
    request: web::Json<CheckRequest>,
) -> Result<HttpResponse> {
    match Payment::find_by_hash(&pool, request.trxn_hash_key.trim()).await {
        Ok(Some(payment)) if payment.merchant_id != merchant.id => Ok(ApiResponse::<()>::error(
            "Not authorized to access this transaction".to_string(),
        )
        .to_response(StatusCode::FORBIDDEN)),
        Ok(Some(payment)) => Ok(GatewayResponse::success(200, RequestStatus::from(&payment)).to_response()),
        Ok(None) => Ok(ApiResponse::<()>::error("Transaction not found".to_string())
            .to_response(StatusCode::NOT_FOUND)),
        Err(e) => {
            error!("Database error checking request: {}", e);
            Ok(GatewayResponse::error(500, 1005, "Internal server error".to_string()).to_response())
        }
    }
}

/// Shared by the staff and admin verification endpoints.
pub(crate) async fn confirm_with_utr(
    pool: &DbPool,
    notifier: &CallbackNotifier,
    user: &AuthenticatedUser,
    payment_id: uuid::Uuid,
    raw_utr: &str,
    remarks: Option<String>,
) -> HttpResponse {
    let Some(utr) = normalize_utr(raw_utr) else {
        return ApiResponse::<()>::error(format!("Invalid UTR number: {}", raw_utr.trim()))
            .to_response(StatusCode::BAD_REQUEST);
    };

    let verifier = UtrVerifier::new(pool);
    match verifier
        .verify_utr(&utr, payment_id, user.user_id, VerificationMethod::Manual, remarks)
        .await
    {
        Ok(payment) => {
            info!("User {} verified payment {}", user.user_id, payment.id);
            notifier.dispatch(payment.clone());
            HttpResponse::Ok().json(ApiResponse::success_with_message(
                payment,
                "Payment verified successfully".to_string(),
            ))
        }
        Err(PaymentError::NotFound { .. }) | Err(PaymentError::InvalidTransition { .. }) => {
            ApiResponse::<()>::error("Payment not found or already processed".to_string())
                .to_response(StatusCode::NOT_FOUND)
        }
        Err(e @ PaymentError::UtrAlreadyUsed { .. }) => {
            ApiResponse::<()>::error(e.to_string()).to_response(StatusCode::CONFLICT)
        }
        Err(e) => {
            error!("Failed to verify payment {}: {}", payment_id, e);
            ApiResponse::<()>::error("Failed to verify payment".to_string())
                .to_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn verify_payment(
    pool: web::Data<DbPool>,
    notifier: web::Data<CallbackNotifier>,
    user: AuthenticatedUser,
    request: web::Json<VerifyPaymentRequest>,
) -> Result<HttpResponse> {
    Ok(confirm_with_utr(&pool, &notifier, &user, request.payment_id, &request.utr_number, None).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::pending_deposit;
    use rust_decimal_macros::dec;

    #[test]
    fn request_status_uses_merchant_field_names() {
        let payment = pending_deposit(dec!(750), 0);
        let body = serde_json::to_value(RequestStatus::from(&payment)).unwrap();
        assert_eq!(body["transactionId"], payment.id.to_string());
        assert_eq!(body["remarks"], "");
        assert_eq!(body["type"], "DEPOSIT");
        assert_eq!(body["status"], "PENDING");
        assert_eq!(body["requestedDate"].as_str().unwrap().len(), 19);

        let mut declined = pending_deposit(dec!(750), 0);
        declined.remarks = Some("Amount mismatch".into());
        let body = serde_json::to_value(RequestStatus::from(&declined)).unwrap();
        assert_eq!(body["remarks"], "Amount mismatch");
    }
}
