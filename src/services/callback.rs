use crate::{
    database::connection::DbPool,
    models::{
        merchant::Merchant,
        payment::{Payment, PaymentError},
    },
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

pub const SIGNATURE_HEADER: &str = "X-Signature";
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Invalid signing key: {0}")]
    Key(#[from] hmac::digest::InvalidLength),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// Body POSTed to the merchant. Fields are declared in key order so the
/// compact JSON encoding is the canonical form that gets signed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallbackPayload {
    pub amount: String,
    pub reference_id: String,
    pub remarks: String,
    pub status: u8,
}

impl CallbackPayload {
    /// `None` while the payment is still pending.
    pub fn for_payment(payment: &Payment) -> Option<Self> {
        let status = payment.status.callback_code()?;
        Some(Self {
            amount: payment.amount.normalize().to_string(),
            reference_id: payment.reference.clone(),
            remarks: payment
                .remarks
                .clone()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| "Payment processed".to_string()),
            status,
        })
    }
}

fn keyed_mac(secret: &str, timestamp: i64, body: &str) -> Result<HmacSha256, CallbackError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    Ok(mac)
}

/// `t=<unix>,v1=<hex hmac-sha256 of "<t>.<body>">`
pub fn sign_payload(body: &str, secret: &str, timestamp: i64) -> Result<String, CallbackError> {
    let digest = keyed_mac(secret, timestamp, body)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
}

pub fn verify_signature(body: &str, header: &str, secret: &str, now: i64, tolerance: i64) -> bool {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signature = hex::decode(value).ok(),
            _ => {}
        }
    }
    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return false;
    };
    if (now - timestamp).abs() > tolerance {
        return false;
    }

    keyed_mac(secret, timestamp, body)
        .map(|mac| mac.verify_slice(&signature).is_ok())
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Delivered { status: u16 },
    Rejected { status: u16 },
    Skipped,
}

/// Delivers status callbacks to merchants and records the outcome on the payment.
#[derive(Clone)]
pub struct CallbackNotifier {
    client: reqwest::Client,
    pool: DbPool,
}

impl CallbackNotifier {
    pub fn new(pool: DbPool, timeout_secs: u64) -> Result<Self, CallbackError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, pool })
    }

    /// Fire-and-forget delivery; failures are logged and stored, never returned.
    pub fn dispatch(&self, payment: Payment) {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.deliver(&payment).await {
                error!("Callback bookkeeping failed for payment {}: {}", payment.id, e);
            }
        });
    }

    pub async fn deliver(&self, payment: &Payment) -> Result<CallbackOutcome, CallbackError> {
        let Some(payload) = CallbackPayload::for_payment(payment) else {
            return Ok(CallbackOutcome::Skipped);
        };

        let merchant = Merchant::find_by_id(&self.pool, payment.merchant_id).await?;
        let url = payment
            .callback_url
            .clone()
            .or_else(|| merchant.as_ref().and_then(|m| m.callback_url.clone()));
        let Some(url) = url else {
            warn!("No callback URL for payment {}", payment.id);
            return Ok(CallbackOutcome::Skipped);
        };

        let body = serde_json::to_string(&payload)?;
        let mut request = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = merchant.as_ref().and_then(|m| m.webhook_secret.as_deref()) {
            request = request.header(SIGNATURE_HEADER, sign_payload(&body, secret, Utc::now().timestamp())?);
        }

        match request.body(body).send().await {
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                let record = json!({
                    "callback_status": status.as_u16(),
                    "callback_response": if status.is_success() { Some(text) } else { None },
                });
                Payment::record_callback(&self.pool, payment.id, status.is_success(), record).await?;

                info!("Callback sent for payment {}, status: {}", payment.id, status);
                if status.is_success() {
                    Ok(CallbackOutcome::Delivered { status: status.as_u16() })
                } else {
                    Ok(CallbackOutcome::Rejected { status: status.as_u16() })
                }
            }
            Err(e) => {
                error!("Callback error for payment {}: {}", payment.id, e);
                Payment::record_callback(&self.pool, payment.id, false, json!({ "callback_error": e.to_string() }))
                    .await?;
                Err(CallbackError::Http(e))
            }
        }
    }
}
