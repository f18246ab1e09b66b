use crate::models::merchant::{BankDetails, Merchant, UpdateMerchant, UpiDetails};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

/// Either `user_id` of an existing user or an `email` (plus `password` when
/// that user does not exist yet) identifies the owner.
#[derive(Debug, Deserialize)]
pub struct CreateMerchantRequest {
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub business_name: String,
    pub business_type: Option<String>,
    pub contact_phone: String,
    pub address: Option<String>,
    pub callback_url: Option<String>,
    #[serde(default)]
    pub whitelist_ips: Vec<String>,
    pub bank_details: Option<BankDetails>,
    pub upi_details: Option<UpiDetails>,
    pub min_deposit: Option<Decimal>,
    pub max_deposit: Option<Decimal>,
    pub min_withdrawal: Option<Decimal>,
    pub max_withdrawal: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMerchantRequest {
    pub business_name: Option<String>,
    pub business_type: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub callback_url: Option<String>,
    pub is_active: Option<bool>,
    pub bank_details: Option<BankDetails>,
    pub upi_details: Option<UpiDetails>,
    pub min_deposit: Option<Decimal>,
    pub max_deposit: Option<Decimal>,
    pub min_withdrawal: Option<Decimal>,
    pub max_withdrawal: Option<Decimal>,
}

impl UpdateMerchantRequest {
    /// Checks the limits the merchant would end up with once the supplied
    /// values are merged over the stored ones.
    pub fn check_limits_against(&self, current: &Merchant) -> Result<(), String> {
        check_limits(
            self.min_deposit.unwrap_or(current.min_deposit),
            self.max_deposit.unwrap_or(current.max_deposit),
            "deposit",
        )?;
        check_limits(
            self.min_withdrawal.unwrap_or(current.min_withdrawal),
            self.max_withdrawal.unwrap_or(current.max_withdrawal),
            "withdrawal",
        )
    }
}

impl From<UpdateMerchantRequest> for UpdateMerchant {
    fn from(req: UpdateMerchantRequest) -> Self {
        UpdateMerchant {
            business_name: req.business_name,
            business_type: req.business_type,
            contact_phone: req.contact_phone,
            address: req.address,
            callback_url: req.callback_url,
            is_active: req.is_active,
            bank_details: req.bank_details,
            upi_details: req.upi_details,
            min_deposit: req.min_deposit,
            max_deposit: req.max_deposit,
            min_withdrawal: req.min_withdrawal,
            max_withdrawal: req.max_withdrawal,
        }
    }
}

/// Rejects a limit pair whose minimum exceeds its maximum.
pub fn check_limits(min: Decimal, max: Decimal, label: &str) -> Result<(), String> {
    if min <= Decimal::ZERO || min > max {
        return Err(format!("Invalid {} limits: {} - {}", label, min, max));
    }
    Ok(())
}
