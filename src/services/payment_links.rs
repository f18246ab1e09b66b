use crate::{
    database::connection::DbPool,
    models::{
        merchant::Merchant,
        payment::{CreatePayment, Payment, PaymentError, PaymentType},
        payment_link::{CreatePaymentLink, PaymentLink, PaymentLinkError},
    },
    requests::payment_link::{CreatePaymentLinkRequest, LinkPaymentRequest},
    services::{
        payment_processor::{PaymentPlan, RequestError, RequestReceipt, attach_deposit_receiver, validate_amount},
        utr_verifier::normalize_utr,
    },
    utils::keys::{generate_link_code, generate_transaction_hash, random_hex},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Attempts at drawing an unused link code before giving up.
const CODE_ATTEMPTS: usize = 5;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Payment link not found")]
    NotFound,
    #[error("This payment link is no longer active")]
    Inactive,
    #[error("This payment link has expired")]
    Expired,
    #[error("This payment link has reached its maximum usage limit")]
    Exhausted,
    #[error("{0}")]
    Invalid(String),
    #[error("Payment not found")]
    PaymentNotFound,
    #[error("Payment is already in {0} status")]
    AlreadyProcessed(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<RequestError> for LinkError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Database(e) => LinkError::Database(e),
            other => LinkError::Invalid(other.to_string()),
        }
    }
}

impl From<PaymentError> for LinkError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotFound { .. } => LinkError::PaymentNotFound,
            PaymentError::InvalidTransition { from } => LinkError::AlreadyProcessed(from.to_string()),
            PaymentError::Database(e) => LinkError::Database(e),
            other => LinkError::Invalid(other.to_string()),
        }
    }
}

impl From<PaymentLinkError> for LinkError {
    fn from(err: PaymentLinkError) -> Self {
        match err {
            PaymentLinkError::NotFound => LinkError::NotFound,
            PaymentLinkError::Database(e) => LinkError::Database(e),
            other => LinkError::Invalid(other.to_string()),
        }
    }
}

/// A link accepts payments while it is active, unexpired and under its
/// use limit.
pub fn check_usable(link: &PaymentLink, now: DateTime<Utc>) -> Result<(), LinkError> {
    if !link.is_active {
        return Err(LinkError::Inactive);
    }
    if link.expires_at.is_some_and(|expires| expires < now) {
        return Err(LinkError::Expired);
    }
    if link.max_uses.is_some_and(|max| link.used_count >= max) {
        return Err(LinkError::Exhausted);
    }
    Ok(())
}

/// Reference of a payment opened through a link: `PLINK-<code prefix>-<random>`.
pub fn link_reference(code: &str) -> String {
    let prefix: String = code.chars().take(8).collect();
    format!("PLINK-{}-{}", prefix, random_hex(4))
}

/// Validates a customer submission against the link and its merchant and
/// derives the deposit to record. Nothing is persisted here.
pub fn plan_link_payment(
    link: &PaymentLink,
    merchant: &Merchant,
    request: &LinkPaymentRequest,
    now: DateTime<Utc>,
) -> Result<PaymentPlan, LinkError> {
    if !merchant.is_active {
        return Err(LinkError::Inactive);
    }

    let amount = request
        .custom_amount
        .or(link.amount)
        .ok_or_else(|| LinkError::Invalid("Amount is required".to_string()))?;
    if amount <= rust_decimal::Decimal::ZERO || amount != amount.round_dp(2) {
        return Err(LinkError::Invalid(format!("Invalid amount: {}", amount)));
    }
    if !link.methods().contains(&request.payment_method) {
        return Err(LinkError::Invalid(format!(
            "{} is not accepted by this payment link",
            request.payment_method.as_str()
        )));
    }
    validate_amount(amount, merchant.min_deposit, merchant.max_deposit, PaymentType::Deposit)?;

    let reference = link_reference(&link.unique_code);
    let trxn_hash_key = generate_transaction_hash(&reference, &merchant.id.to_string(), &amount.to_string());
    let customer = json!({
        "name": request.name,
        "email": request.email,
        "phone": request.phone,
    });

    let mut record = CreatePayment {
        merchant_id: merchant.id,
        reference,
        trxn_hash_key: trxn_hash_key.clone(),
        payment_type: PaymentType::Deposit,
        payment_method: request.payment_method,
        amount,
        currency: link.currency.clone(),
        upi_id: None,
        bank_name: None,
        account_name: None,
        account_number: None,
        ifsc_code: None,
        callback_url: merchant.callback_url.clone(),
        user_data: Some(json!({
            "payment_link_id": link.id,
            "customer": customer,
        })),
        payment_link_id: Some(link.id),
    };
    let mut receipt = RequestReceipt {
        payment_method: None,
        receiver_info: None,
        upi_string: None,
        receiver_bank_info: None,
        trxn_hash_key,
        amount: amount.normalize().to_string(),
        requested_date: now.to_rfc3339_opts(SecondsFormat::Secs, true),
    };
    attach_deposit_receiver(merchant, request.payment_method, &link.currency, &mut record, &mut receipt)?;

    Ok(PaymentPlan { record, receipt })
}

pub struct PaymentLinkService<'a> {
    pool: &'a DbPool,
}

impl<'a> PaymentLinkService<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_link(
        &self,
        merchant: &Merchant,
        request: CreatePaymentLinkRequest,
    ) -> Result<PaymentLink, LinkError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let link = CreatePaymentLink {
                merchant_id: merchant.id,
                title: request.title.trim().to_string(),
                description: request.description.clone(),
                unique_code: generate_link_code(),
                amount: request.amount,
                currency: request.currency.clone(),
                allowed_methods: request.allowed_methods.clone(),
                expires_at: request.expires_at,
                max_uses: request.max_uses,
                success_url: request.success_url.clone(),
                cancel_url: request.cancel_url.clone(),
                metadata: request.metadata.clone(),
            };

            match PaymentLink::create(self.pool, link).await {
                Ok(link) => {
                    info!("Merchant {} created payment link {}", merchant.id, link.unique_code);
                    return Ok(link);
                }
                Err(PaymentLinkError::CodeTaken(code)) if attempt < CODE_ATTEMPTS => {
                    warn!("Payment link code {} collided, drawing another", code);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Active, usable link by its public code.
    pub async fn public_link(&self, code: &str) -> Result<(PaymentLink, Merchant), LinkError> {
        let link = PaymentLink::find_active_by_code(self.pool, code)
            .await?
            .ok_or(LinkError::NotFound)?;
        check_usable(&link, Utc::now())?;
        let merchant = Merchant::find_by_id(self.pool, link.merchant_id)
            .await?
            .ok_or(LinkError::NotFound)?;
        if !merchant.is_active {
            return Err(LinkError::Inactive);
        }
        Ok((link, merchant))
    }

    /// Opens a pending deposit through the link and counts the use, in one
    /// transaction holding the link row. A UTR given with the submission is
    /// stored for staff to verify.
    pub async fn pay(
        &self,
        code: &str,
        request: &LinkPaymentRequest,
    ) -> Result<(Payment, RequestReceipt), LinkError> {
        let mut tx = self.pool.begin().await?;

        let link = PaymentLink::lock_active_by_code(&mut *tx, code)
            .await?
            .ok_or(LinkError::NotFound)?;
        let now = Utc::now();
        check_usable(&link, now)?;
        let merchant = sqlx::query_as::<_, Merchant>("SELECT * FROM merchants WHERE id = $1")
            .bind(link.merchant_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LinkError::NotFound)?;

        let plan = plan_link_payment(&link, &merchant, request, now)?;
        let payment = Payment::create(&mut *tx, plan.record).await?;
        PaymentLink::record_use(&mut *tx, link.id).await?;
        tx.commit().await?;

        info!(
            "Payment link {} opened deposit {} for {}",
            link.unique_code, payment.id, payment.amount
        );

        let payment = match request.utr_number.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(utr) => self.submit_utr(payment.id, utr).await?,
            None => payment,
        };
        Ok((payment, plan.receipt))
    }

    pub async fn submit_utr(&self, payment_id: Uuid, raw_utr: &str) -> Result<Payment, LinkError> {
        let utr = normalize_utr(raw_utr)
            .ok_or_else(|| LinkError::Invalid(format!("Invalid UTR number: {}", raw_utr.trim())))?;
        let payment = Payment::attach_customer_utr(self.pool, payment_id, &utr).await?;
        info!("Customer submitted UTR {} for payment {}", utr, payment_id);
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::payment::PaymentMethod,
        test_support::{merchant, payment_link},
    };
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use sqlx::types::Json;

    fn customer(method: PaymentMethod, custom_amount: Option<rust_decimal::Decimal>) -> LinkPaymentRequest {
        LinkPaymentRequest {
            name: Some("Priya Shah".into()),
            email: Some("priya@example.com".into()),
            phone: None,
            custom_amount,
            payment_method: method,
            utr_number: None,
        }
    }

    #[test]
    fn usability_checks() {
        let now = Utc::now();
        let mut link = payment_link(Some(dec!(1000)));
        assert!(check_usable(&link, now).is_ok());

        link.expires_at = Some(now - Duration::minutes(1));
        assert!(matches!(check_usable(&link, now), Err(LinkError::Expired)));
        link.expires_at = Some(now + Duration::days(1));

        link.max_uses = Some(2);
        link.used_count = 2;
        assert!(matches!(check_usable(&link, now), Err(LinkError::Exhausted)));
        link.used_count = 1;
        assert!(check_usable(&link, now).is_ok());

        link.is_active = false;
        assert!(matches!(check_usable(&link, now), Err(LinkError::Inactive)));
    }

    #[test]
    fn fixed_amount_upi_payment() {
        let m = merchant();
        let mut link = payment_link(Some(dec!(1000)));
        link.merchant_id = m.id;

        let plan = plan_link_payment(&link, &m, &customer(PaymentMethod::Upi, None), Utc::now()).unwrap();
        assert_eq!(plan.record.amount, dec!(1000));
        assert_eq!(plan.record.payment_type, PaymentType::Deposit);
        assert_eq!(plan.record.payment_link_id, Some(link.id));
        assert_eq!(plan.record.upi_id.as_deref(), Some("acme@hdfcbank"));
        assert!(plan.record.reference.starts_with("PLINK-HXK7M2PQ-"));
        assert_eq!(plan.record.reference.len(), "PLINK-HXK7M2PQ-".len() + 8);
        assert_eq!(plan.record.user_data.as_ref().unwrap()["customer"]["name"], "Priya Shah");
        assert!(plan.receipt.upi_string.is_some());
    }

    #[test]
    fn custom_amount_and_bank_transfer() {
        let m = merchant();
        let link = payment_link(None);

        let err = plan_link_payment(&link, &m, &customer(PaymentMethod::BankTransfer, None), Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "Amount is required");

        let plan = plan_link_payment(
            &link,
            &m,
            &customer(PaymentMethod::BankTransfer, Some(dec!(2500))),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(plan.record.payment_method, PaymentMethod::BankTransfer);
        assert_eq!(plan.receipt.receiver_bank_info.unwrap().bank_ifsc, "HDFC0001234");
    }

    #[test]
    fn merchant_limits_and_methods_apply() {
        let m = merchant();
        let mut link = payment_link(None);

        let err = plan_link_payment(&link, &m, &customer(PaymentMethod::Upi, Some(dec!(100))), Utc::now())
            .unwrap_err();
        assert_eq!(err.to_string(), "Deposit amount must be between ₹ 500 and ₹ 300000.");

        link.allowed_methods = Some(Json(vec![PaymentMethod::BankTransfer]));
        let err = plan_link_payment(&link, &m, &customer(PaymentMethod::Upi, Some(dec!(1000))), Utc::now())
            .unwrap_err();
        assert_eq!(err.to_string(), "UPI is not accepted by this payment link");

        let mut inactive = merchant();
        inactive.is_active = false;
        assert!(matches!(
            plan_link_payment(&payment_link(Some(dec!(1000))), &inactive, &customer(PaymentMethod::Upi, None), Utc::now()),
            Err(LinkError::Inactive)
        ));
    }
}
