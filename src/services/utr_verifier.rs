use crate::{
    database::connection::DbPool,
    models::payment::{Payment, PaymentError, VerificationMethod},
};
use chrono::{Duration, Utc};
use tracing::{error, info};
use uuid::Uuid;

pub const UTR_MIN_LEN: usize = 6;
pub const UTR_MAX_LEN: usize = 22;

/// Trims and upper-cases a UTR, rejecting anything that is not 6 to 22
/// ASCII alphanumerics.
pub fn normalize_utr(raw: &str) -> Option<String> {
    let utr = raw.trim();
    let valid = (UTR_MIN_LEN..=UTR_MAX_LEN).contains(&utr.len())
        && utr.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| utr.to_ascii_uppercase())
}

pub struct UtrVerifier<'a> {
    pool: &'a DbPool,
}

impl<'a> UtrVerifier<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    pub async fn verify_utr(
        &self,
        utr_number: &str,
        payment_id: Uuid,
        verified_by: Uuid,
        method: VerificationMethod,
        remarks: Option<String>,
    ) -> Result<Payment, PaymentError> {
        let payment = Payment::confirm(self.pool, payment_id, utr_number, verified_by, method, remarks)
            .await
            .inspect_err(|e| error!("Could not verify payment {} with UTR {}: {}", payment_id, utr_number, e))?;

        info!("Payment {} verified with UTR {}", payment_id, utr_number);
        Ok(payment)
    }

    pub async fn find_by_utr(&self, utr_number: &str) -> Result<Vec<Payment>, PaymentError> {
        Payment::find_by_utr(self.pool, utr_number).await
    }

    pub async fn get_pending_payments(
        &self,
        merchant_id: Option<Uuid>,
        days: i64,
    ) -> Result<Vec<Payment>, PaymentError> {
        let since = Utc::now() - Duration::days(days);
        Payment::find_pending(self.pool, merchant_id, since).await
    }
}
