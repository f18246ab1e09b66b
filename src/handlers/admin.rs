use crate::{
    config::Settings,
    database::connection::DbPool,
    handlers::payments::confirm_with_utr,
    middleware::auth::AdminUser,
    models::{
        merchant::Merchant,
        payment::{Payment, PaymentError},
        user::{CreateUser, UpdateUser, User, UserError},
    },
    requests::{
        admin::{
            AdminVerifyRequest, CreateUserRequest, DeclineRequest, ListQuery, PendingPaymentsQuery,
            StatsQuery, UpdateUserRequest, validate_days,
        },
        report::PaymentQuery,
    },
    services::{
        analytics::success_rate,
        bank_statement::{BankStatementProcessor, StatementError},
        callback::CallbackNotifier,
        csv_exporter::export_to_dir,
        utr_verifier::{UtrVerifier, normalize_utr},
    },
    utils::helpers::ApiResponse,
};
use actix_web::{
    HttpResponse, Result,
    http::{StatusCode, header},
    web,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Serialize, PartialEq)]
pub struct DashboardStats {
    pub total_merchants: i64,
    pub active_merchants: i64,
    pub total_transactions: i64,
    pub successful_transactions: i64,
    pub success_rate: Decimal,
    pub total_deposit_amount: Decimal,
    pub total_withdrawal_amount: Decimal,
    pub pending_verification: i64,
    pub days: i64,
}

fn bad_request(message: String) -> HttpResponse {
    ApiResponse::<()>::error(message).to_response(StatusCode::BAD_REQUEST)
}

fn unprocessable(message: String) -> HttpResponse {
    ApiResponse::<()>::error(message).to_response(StatusCode::UNPROCESSABLE_ENTITY)
}

fn internal(message: &str) -> HttpResponse {
    ApiResponse::<()>::error(message.to_string()).to_response(StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn list_users(
    pool: web::Data<DbPool>,
    _admin: AdminUser,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    if let Err(message) = query.validate() {
        return Ok(unprocessable(message));
    }

    match User::find_all(&pool, query.skip, query.limit).await {
        Ok(users) => Ok(HttpResponse::Ok().json(ApiResponse::success(users))),
        Err(e) => {
            error!("Database error listing users: {}", e);
            Ok(internal("Failed to retrieve users"))
        }
    }
}

pub async fn create_user(
    pool: web::Data<DbPool>,
    admin: AdminUser,
    request: web::Json<CreateUserRequest>,
) -> Result<HttpResponse> {
    let request = request.into_inner();
    info!("Admin {} creating user {}", admin.0.user_id, request.email);

    let create_user = CreateUser {
        email: request.email,
        password: request.password,
        full_name: request.full_name,
        role: request.role,
        is_active: request.is_active,
        api_key: None,
    };

    match User::create(pool.get_ref(), create_user).await {
        Ok(user) => {
            info!("Successfully created user with ID: {}", user.id);
            Ok(HttpResponse::Created().json(ApiResponse::success(user)))
        }
        Err(UserError::EmailTaken) => Ok(bad_request(
            "The user with this email already exists in the system".to_string(),
        )),
        Err(e) => {
            error!("Error creating user: {}", e);
            Ok(internal("Failed to create user"))
        }
    }
}

pub async fn update_user(
    pool: web::Data<DbPool>,
    admin: AdminUser,
    path: web::Path<Uuid>,
    request: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let request = request.into_inner();
    info!("Admin {} updating user {}", admin.0.user_id, user_id);

    let update = UpdateUser {
        email: request.email,
        password: request.password,
        full_name: request.full_name,
        role: request.role,
        is_active: request.is_active,
    };

    match User::update(&pool, user_id, update).await {
        Ok(user) => Ok(HttpResponse::Ok().json(ApiResponse::success(user))),
        Err(UserError::NotFound { .. }) => Ok(ApiResponse::<()>::error(
            "The user with this ID does not exist in the system".to_string(),
        )
        .to_response(StatusCode::NOT_FOUND)),
        Err(UserError::Database(e)) => {
            error!("Database error updating user {}: {}", user_id, e);
            Ok(internal("Failed to update user"))
        }
        Err(e) => Ok(bad_request(e.to_string())),
    }
}

pub async fn pending_payments(
    pool: web::Data<DbPool>,
    _admin: AdminUser,
    query: web::Query<PendingPaymentsQuery>,
) -> Result<HttpResponse> {
    let days = match validate_days(query.days, 90) {
        Ok(days) => days,
        Err(message) => return Ok(unprocessable(message)),
    };

    let verifier = UtrVerifier::new(&pool);
    match verifier.get_pending_payments(query.merchant_id, days).await {
        Ok(payments) => Ok(HttpResponse::Ok().json(ApiResponse::success(payments))),
        Err(e) => {
            error!("Error listing pending payments: {}", e);
            Ok(internal("Failed to retrieve pending payments"))
        }
    }
}

pub async fn verify_payment(
    pool: web::Data<DbPool>,
    notifier: web::Data<CallbackNotifier>,
    admin: AdminUser,
    path: web::Path<Uuid>,
    request: web::Json<AdminVerifyRequest>,
) -> Result<HttpResponse> {
    let request = request.into_inner();
    Ok(confirm_with_utr(
        &pool,
        &notifier,
        &admin.0,
        path.into_inner(),
        &request.utr_number,
        request.remarks.filter(|r| !r.trim().is_empty()),
    )
    .await)
}

pub async fn decline_payment(
    pool: web::Data<DbPool>,
    notifier: web::Data<CallbackNotifier>,
    admin: AdminUser,
    path: web::Path<Uuid>,
    request: web::Json<DeclineRequest>,
) -> Result<HttpResponse> {
    let payment_id = path.into_inner();
    let remarks = request.remarks.trim();
    if remarks.is_empty() {
        return Ok(bad_request("remarks must not be empty".to_string()));
    }

    match Payment::decline(&pool, payment_id, remarks, admin.0.user_id).await {
        Ok(payment) => {
            info!("Admin {} declined payment {}", admin.0.user_id, payment.id);
            notifier.dispatch(payment.clone());
            Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
                payment,
                "Payment declined successfully".to_string(),
            )))
        }
        Err(PaymentError::NotFound { .. }) => Ok(ApiResponse::<()>::error("Payment not found".to_string())
            .to_response(StatusCode::NOT_FOUND)),
        Err(e @ PaymentError::InvalidTransition { .. }) => Ok(bad_request(e.to_string())),
        Err(e) => {
            error!("Failed to decline payment {}: {}", payment_id, e);
            Ok(internal("Failed to decline payment"))
        }
    }
}

pub async fn export_payments(
    pool: web::Data<DbPool>,
    settings: web::Data<Settings>,
    _admin: AdminUser,
    query: web::Query<PaymentQuery>,
) -> Result<HttpResponse> {
    let filter = match query.filter() {
        Ok(filter) => filter,
        Err(message) => return Ok(unprocessable(message)),
    };

    let payments = match Payment::list_filtered(&pool, &filter).await {
        Ok(payments) => payments,
        Err(e) => {
            error!("Error loading payments for export: {}", e);
            return Ok(internal("Failed to export payments"));
        }
    };
    if payments.is_empty() {
        return Ok(ApiResponse::<()>::error("No payments found for the given criteria".to_string())
            .to_response(StatusCode::NOT_FOUND));
    }

    match export_to_dir(Path::new(&settings.csv_export_path), filter.merchant_id, &payments).await {
        Ok((path, content)) => {
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "payments.csv".to_string());
            Ok(HttpResponse::Ok()
                .content_type("text/csv")
                .insert_header((
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ))
                .body(content))
        }
        Err(e) => {
            error!("Failed to write payment export: {}", e);
            Ok(internal("Failed to export payments"))
        }
    }
}

pub async fn dashboard_stats(
    pool: web::Data<DbPool>,
    _admin: AdminUser,
    query: web::Query<StatsQuery>,
) -> Result<HttpResponse> {
    let days = match validate_days(query.days, 365) {
        Ok(days) => days,
        Err(message) => return Ok(unprocessable(message)),
    };

    let (total_merchants, active_merchants) = match Merchant::counts(&pool).await {
        Ok(counts) => counts,
        Err(e) => {
            error!("Database error counting merchants: {}", e);
            return Ok(internal("Failed to compute dashboard stats"));
        }
    };
    let totals = match Payment::totals_since(&pool, Utc::now() - Duration::days(days)).await {
        Ok(totals) => totals,
        Err(e) => {
            error!("Database error computing payment totals: {}", e);
            return Ok(internal("Failed to compute dashboard stats"));
        }
    };

    let stats = DashboardStats {
        total_merchants,
        active_merchants,
        total_transactions: totals.total_transactions,
        successful_transactions: totals.successful_transactions,
        success_rate: success_rate(totals.successful_transactions, totals.total_transactions),
        total_deposit_amount: totals.total_deposit_amount,
        total_withdrawal_amount: totals.total_withdrawal_amount,
        pending_verification: totals.pending_verification,
        days,
    };
    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

/// Body is the raw CSV export of a bank statement.
pub async fn upload_bank_statement(
    pool: web::Data<DbPool>,
    notifier: web::Data<CallbackNotifier>,
    admin: AdminUser,
    body: web::Bytes,
) -> Result<HttpResponse> {
    if body.is_empty() {
        return Ok(bad_request("Bank statement is empty".to_string()));
    }

    let processor = BankStatementProcessor::new(&pool);
    match processor.process_statement(&body, admin.0.user_id).await {
        Ok(report) => {
            info!(
                "Admin {} uploaded statement: {} matched of {}",
                admin.0.user_id, report.matches_found, report.total_transactions
            );
            for payment in &report.confirmed {
                notifier.dispatch(payment.clone());
            }
            Ok(HttpResponse::Ok().json(ApiResponse::success(report)))
        }
        Err(e @ (StatementError::Csv(_) | StatementError::NoUtrColumn)) => {
            warn!("Rejected bank statement: {}", e);
            Ok(bad_request(format!("Error processing bank statement: {}", e)))
        }
        Err(e) => {
            error!("Failed to process bank statement: {}", e);
            Ok(internal("Failed to process bank statement"))
        }
    }
}

pub async fn list_payments(
    pool: web::Data<DbPool>,
    _admin: AdminUser,
    query: web::Query<PaymentQuery>,
) -> Result<HttpResponse> {
    let (filter, page) = match (query.filter(), query.page()) {
        (Ok(filter), Ok(page)) => (filter, page),
        (Err(message), _) | (_, Err(message)) => return Ok(unprocessable(message)),
    };

    match Payment::search(&pool, &filter, page).await {
        Ok(result) => Ok(HttpResponse::Ok().json(ApiResponse::success(result))),
        Err(e) => {
            error!("Error listing payments: {}", e);
            Ok(internal("Failed to retrieve payments"))
        }
    }
}

pub async fn payments_by_utr(
    pool: web::Data<DbPool>,
    _admin: AdminUser,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let raw = path.into_inner();
    let Some(utr) = normalize_utr(&raw) else {
        return Ok(bad_request(format!("Invalid UTR number: {}", raw)));
    };

    match UtrVerifier::new(&pool).find_by_utr(&utr).await {
        Ok(payments) => Ok(HttpResponse::Ok().json(ApiResponse::success(payments))),
        Err(e) => {
            error!("Error looking up UTR {}: {}", utr, e);
            Ok(internal("Failed to retrieve payments"))
        }
    }
}
