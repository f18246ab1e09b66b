use crate::{
    database::connection::DbPool,
    models::{
        merchant::Merchant,
        payment::{CreatePayment, Payment, PaymentError, PaymentMethod, PaymentType},
    },
    requests::payment::CreatePaymentRequest,
    utils::keys::generate_transaction_hash,
};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Rejections of a merchant payment request. Each maps to a stable error
/// code in the merchant response envelope.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Invalid action. Use 'DEPOSIT' or 'WITHDRAWAL'")]
    InvalidAction,
    #[error("Only {0} currency is supported")]
    UnsupportedCurrency(String),
    #[error("{0}")]
    InvalidField(String),
    #[error("{0}")]
    Rejected(String),
    #[error("Reference {0} has already been used")]
    DuplicateReference(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RequestError {
    pub fn code(&self) -> u16 {
        match self {
            RequestError::InvalidAction => 1001,
            RequestError::UnsupportedCurrency(_) => 1002,
            RequestError::InvalidField(_) => 1003,
            RequestError::Rejected(_) => 1004,
            RequestError::Database(_) => 1005,
            RequestError::DuplicateReference(_) => 1006,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            RequestError::Database(_) => 500,
            RequestError::DuplicateReference(_) => 409,
            _ => 400,
        }
    }
}

impl From<PaymentError> for RequestError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::DuplicateReference { reference } => RequestError::DuplicateReference(reference),
            PaymentError::Database(e) => RequestError::Database(e),
            other => RequestError::Rejected(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpiReceiver {
    pub upi_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BankReceiver {
    pub bank: String,
    pub account_name: String,
    pub account_number: String,
    pub bank_ifsc: String,
}

/// What the merchant needs to complete the payment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestReceipt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_info: Option<UpiReceiver>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upi_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_bank_info: Option<BankReceiver>,
    pub trxn_hash_key: String,
    pub amount: String,
    pub requested_date: String,
}

#[derive(Debug, Clone)]
pub struct PaymentPlan {
    pub record: CreatePayment,
    pub receipt: RequestReceipt,
}

pub struct PaymentProcessor<'a> {
    pool: &'a DbPool,
    currency: &'a str,
}

impl<'a> PaymentProcessor<'a> {
    pub fn new(pool: &'a DbPool, currency: &'a str) -> Self {
        Self { pool, currency }
    }

    pub async fn process(
        &self,
        merchant: &Merchant,
        request: &CreatePaymentRequest,
    ) -> Result<(Payment, RequestReceipt), RequestError> {
        let plan = plan_payment(merchant, request, self.currency, Utc::now())?;
        let payment = Payment::create(self.pool, plan.record).await?;

        info!(
            "Merchant {} opened {} {} for {} (ref {})",
            merchant.id,
            payment.payment_type.as_str(),
            payment.id,
            payment.amount,
            payment.reference
        );
        Ok((payment, plan.receipt))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// IFSC: four bank letters, a literal zero, six branch characters.
pub fn is_valid_ifsc(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == 11
        && bytes[..4].iter().all(u8::is_ascii_uppercase)
        && bytes[4] == b'0'
        && bytes[5..].iter().all(u8::is_ascii_alphanumeric)
}

pub fn validate_amount(
    amount: Decimal,
    min: Decimal,
    max: Decimal,
    payment_type: PaymentType,
) -> Result<(), RequestError> {
    if amount < min || amount > max {
        let kind = match payment_type {
            PaymentType::Deposit => "Deposit",
            PaymentType::Withdrawal => "Withdrawal",
        };
        return Err(RequestError::Rejected(format!(
            "{} amount must be between ₹ {} and ₹ {}.",
            kind,
            min.normalize(),
            max.normalize()
        )));
    }
    Ok(())
}

pub fn deposit_method(bank: Option<&str>, account_number: Option<&str>) -> PaymentMethod {
    if bank.is_some() && account_number.is_some() {
        PaymentMethod::BankTransfer
    } else {
        PaymentMethod::Upi
    }
}

pub fn upi_payment_string(
    upi_id: &str,
    name: &str,
    amount: Decimal,
    trxn_hash_key: &str,
    currency: &str,
) -> Result<String, RequestError> {
    let amount = amount.normalize().to_string();
    Url::parse_with_params(
        "upi://pay",
        &[
            ("pa", upi_id),
            ("pn", name),
            ("am", amount.as_str()),
            ("tr", trxn_hash_key),
            ("cu", currency),
        ],
    )
    .map(String::from)
    .map_err(|e| RequestError::InvalidField(format!("Could not build UPI link: {}", e)))
}

/// Points a deposit at the merchant's receiving UPI handle or bank account
/// and fills the matching receipt fields.
pub fn attach_deposit_receiver(
    merchant: &Merchant,
    method: PaymentMethod,
    currency: &str,
    record: &mut CreatePayment,
    receipt: &mut RequestReceipt,
) -> Result<(), RequestError> {
    record.payment_method = method;
    receipt.payment_method = Some(method);

    match method {
        PaymentMethod::Upi => {
            let upi = merchant
                .upi_details
                .as_ref()
                .ok_or_else(|| RequestError::Rejected("Merchant UPI details not configured".to_string()))?;
            let name = if upi.name.trim().is_empty() {
                merchant.business_name.clone()
            } else {
                upi.name.clone()
            };
            receipt.upi_string = Some(upi_payment_string(
                &upi.upi_id,
                &name,
                record.amount,
                &receipt.trxn_hash_key,
                currency,
            )?);
            receipt.receiver_info = Some(UpiReceiver {
                upi_id: upi.upi_id.clone(),
                name,
            });
            record.upi_id = Some(upi.upi_id.clone());
        }
        PaymentMethod::BankTransfer => {
            let bank = merchant
                .bank_details
                .as_ref()
                .ok_or_else(|| RequestError::Rejected("Merchant bank details not configured".to_string()))?;
            record.bank_name = Some(bank.bank_name.clone());
            record.account_name = Some(bank.account_name.clone());
            record.account_number = Some(bank.account_number.clone());
            record.ifsc_code = Some(bank.ifsc_code.clone());
            receipt.receiver_bank_info = Some(BankReceiver {
                bank: bank.bank_name.clone(),
                account_name: bank.account_name.clone(),
                account_number: bank.account_number.clone(),
                bank_ifsc: bank.ifsc_code.clone(),
            });
        }
    }
    Ok(())
}

/// Validates a merchant request and derives the row to insert plus the
/// receipt returned to the merchant. Nothing is persisted here.
pub fn plan_payment(
    merchant: &Merchant,
    request: &CreatePaymentRequest,
    currency: &str,
    now: DateTime<Utc>,
) -> Result<PaymentPlan, RequestError> {
    let payment_type: PaymentType = request
        .action
        .trim()
        .parse()
        .map_err(|_| RequestError::InvalidAction)?;

    if request.currency != currency {
        return Err(RequestError::UnsupportedCurrency(currency.to_string()));
    }

    if let Some(api_key) = non_empty(&request.api_key) {
        if api_key != merchant.api_key {
            return Err(RequestError::InvalidField(
                "api_key does not match the X-API-Key header".to_string(),
            ));
        }
    }

    let reference = request.reference.trim();
    if reference.is_empty() {
        return Err(RequestError::InvalidField("reference must not be empty".to_string()));
    }
    if request.amount <= Decimal::ZERO {
        return Err(RequestError::InvalidField("amount must be positive".to_string()));
    }
    if request.amount.scale() > 2 && request.amount != request.amount.round_dp(2) {
        return Err(RequestError::InvalidField(
            "amount must have at most two decimal places".to_string(),
        ));
    }
    let amount = request.amount.round_dp(2);

    if let Some(ifsc) = non_empty(&request.bank_ifsc) {
        if !is_valid_ifsc(ifsc) {
            return Err(RequestError::InvalidField(format!("Invalid IFSC code: {}", ifsc)));
        }
    }
    if let Some(url) = non_empty(&request.callback_url) {
        let parsed = Url::parse(url)
            .map_err(|_| RequestError::InvalidField(format!("Invalid callback_url: {}", url)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(RequestError::InvalidField(format!("Invalid callback_url: {}", url)));
        }
    }

    let trxn_hash_key = generate_transaction_hash(reference, &merchant.id.to_string(), &amount.to_string());
    let requested_date = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let callback_url = non_empty(&request.callback_url)
        .map(str::to_string)
        .or_else(|| merchant.callback_url.clone());

    let mut record = CreatePayment {
        merchant_id: merchant.id,
        reference: reference.to_string(),
        trxn_hash_key: trxn_hash_key.clone(),
        payment_type,
        payment_method: PaymentMethod::BankTransfer,
        amount,
        currency: currency.to_string(),
        upi_id: None,
        bank_name: None,
        account_name: None,
        account_number: None,
        ifsc_code: None,
        callback_url,
        user_data: request.user_data.clone(),
        payment_link_id: None,
    };
    let mut receipt = RequestReceipt {
        payment_method: None,
        receiver_info: None,
        upi_string: None,
        receiver_bank_info: None,
        trxn_hash_key,
        amount: amount.normalize().to_string(),
        requested_date,
    };

    match payment_type {
        PaymentType::Deposit => {
            validate_amount(amount, merchant.min_deposit, merchant.max_deposit, payment_type)?;

            let method = deposit_method(non_empty(&request.bank), non_empty(&request.account_number));
            attach_deposit_receiver(merchant, method, currency, &mut record, &mut receipt)?;
        }
        PaymentType::Withdrawal => {
            validate_amount(amount, merchant.min_withdrawal, merchant.max_withdrawal, payment_type)?;

            let (Some(account_name), Some(account_number), Some(bank), Some(ifsc)) = (
                non_empty(&request.account_name),
                non_empty(&request.account_number),
                non_empty(&request.bank),
                non_empty(&request.bank_ifsc),
            ) else {
                return Err(RequestError::Rejected(
                    "Bank account details are required for withdrawal.".to_string(),
                ));
            };

            record.bank_name = Some(bank.to_string());
            record.account_name = Some(account_name.to_string());
            record.account_number = Some(account_number.to_string());
            record.ifsc_code = Some(ifsc.to_string());
            receipt.receiver_bank_info = Some(BankReceiver {
                bank: bank.to_string(),
                account_name: account_name.to_string(),
                account_number: account_number.to_string(),
                bank_ifsc: ifsc.to_string(),
            });
        }
    }

    Ok(PaymentPlan { record, receipt })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::merchant;
    use rust_decimal_macros::dec;

    fn request(action: &str, amount: Decimal) -> CreatePaymentRequest {
        CreatePaymentRequest {
            api_key: None,
            service_type: 1,
            currency: "INR".into(),
            action: action.into(),
            reference: "ORD-1001".into(),
            amount,
            account_name: None,
            account_number: None,
            bank: None,
            bank_ifsc: None,
            callback_url: None,
            ae_type: "1".into(),
            user_data: None,
        }
    }

    fn withdrawal(amount: Decimal) -> CreatePaymentRequest {
        CreatePaymentRequest {
            account_name: Some("Ravi Kumar".into()),
            account_number: Some("123456789012".into()),
            bank: Some("State Bank of India".into()),
            bank_ifsc: Some("SBIN0001234".into()),
            ..request("WITHDRAWAL", amount)
        }
    }

    fn plan(req: &CreatePaymentRequest) -> Result<PaymentPlan, RequestError> {
        plan_payment(&merchant(), req, "INR", Utc::now())
    }

    #[test]
    fn upi_deposit_returns_receiver_and_link() {
        let plan = plan(&request("DEPOSIT", dec!(1500))).unwrap();
        assert_eq!(plan.record.payment_method, PaymentMethod::Upi);
        assert_eq!(plan.record.upi_id.as_deref(), Some("acme@hdfcbank"));
        assert_eq!(plan.receipt.amount, "1500");
        assert_eq!(plan.record.callback_url.as_deref(), Some("https://merchant.example/callback"));

        let link = Url::parse(plan.receipt.upi_string.as_deref().unwrap()).unwrap();
        assert_eq!(link.scheme(), "upi");
        let params: Vec<(String, String)> = link.query_pairs().into_owned().collect();
        assert!(params.contains(&("pa".into(), "acme@hdfcbank".into())));
        assert!(params.contains(&("pn".into(), "Acme Traders".into())));
        assert!(params.contains(&("am".into(), "1500".into())));
        assert!(params.contains(&("tr".into(), plan.receipt.trxn_hash_key.clone())));
        assert!(params.contains(&("cu".into(), "INR".into())));
    }

    #[test]
    fn deposit_with_bank_fields_uses_merchant_bank() {
        let req = CreatePaymentRequest {
            bank: Some("HDFC".into()),
            account_number: Some("999".into()),
            ..request("DEPOSIT", dec!(2500))
        };
        let plan = plan(&req).unwrap();
        assert_eq!(plan.record.payment_method, PaymentMethod::BankTransfer);
        let bank = plan.receipt.receiver_bank_info.unwrap();
        assert_eq!(bank.bank_ifsc, "HDFC0001234");
        assert!(plan.receipt.upi_string.is_none());
    }

    #[test]
    fn deposit_limits_are_enforced() {
        let err = plan(&request("DEPOSIT", dec!(499))).unwrap_err();
        assert_eq!(err.code(), 1004);
        assert_eq!(err.to_string(), "Deposit amount must be between ₹ 500 and ₹ 300000.");
        assert!(plan(&request("DEPOSIT", dec!(300000))).is_ok());
        assert_eq!(plan(&request("DEPOSIT", dec!(300000.01))).unwrap_err().code(), 1004);
    }

    #[test]
    fn unknown_action_and_currency() {
        assert_eq!(plan(&request("REFUND", dec!(1000))).unwrap_err().code(), 1001);
        let req = CreatePaymentRequest {
            currency: "USD".into(),
            ..request("DEPOSIT", dec!(1000))
        };
        assert_eq!(plan(&req).unwrap_err().code(), 1002);
    }

    #[test]
    fn field_validation() {
        let req = CreatePaymentRequest {
            reference: "   ".into(),
            ..request("DEPOSIT", dec!(1000))
        };
        assert_eq!(plan(&req).unwrap_err().code(), 1003);
        assert_eq!(plan(&request("DEPOSIT", dec!(-5))).unwrap_err().code(), 1003);
        assert_eq!(plan(&request("DEPOSIT", dec!(1000.555))).unwrap_err().code(), 1003);

        let req = CreatePaymentRequest {
            callback_url: Some("ftp://merchant".into()),
            ..request("DEPOSIT", dec!(1000))
        };
        assert_eq!(plan(&req).unwrap_err().code(), 1003);

        let req = CreatePaymentRequest {
            api_key: Some("someone-else".into()),
            ..request("DEPOSIT", dec!(1000))
        };
        assert_eq!(plan(&req).unwrap_err().code(), 1003);
    }

    #[test]
    fn withdrawal_requires_bank_details() {
        let err = plan(&request("WITHDRAWAL", dec!(5000))).unwrap_err();
        assert_eq!(err.code(), 1004);

        let plan = plan(&withdrawal(dec!(5000))).unwrap();
        assert_eq!(plan.record.payment_type, PaymentType::Withdrawal);
        assert_eq!(plan.record.payment_method, PaymentMethod::BankTransfer);
        assert_eq!(plan.record.ifsc_code.as_deref(), Some("SBIN0001234"));
        assert!(plan.receipt.payment_method.is_none());
    }

    #[test]
    fn withdrawal_rejects_bad_ifsc_and_small_amounts() {
        let req = CreatePaymentRequest {
            bank_ifsc: Some("SBIN1234".into()),
            ..withdrawal(dec!(5000))
        };
        assert_eq!(plan(&req).unwrap_err().code(), 1003);
        assert_eq!(plan(&withdrawal(dec!(999))).unwrap_err().code(), 1004);
    }

    #[test]
    fn missing_upi_configuration_is_rejected() {
        let mut m = merchant();
        m.upi_details = None;
        let err = plan_payment(&m, &request("DEPOSIT", dec!(1000)), "INR", Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "Merchant UPI details not configured");
    }

    #[test]
    fn ifsc_format() {
        assert!(is_valid_ifsc("HDFC0001234"));
        assert!(is_valid_ifsc("SBIN0ABC123"));
        assert!(!is_valid_ifsc("hdfc0001234"));
        assert!(!is_valid_ifsc("HDFC1001234"));
        assert!(!is_valid_ifsc("HDFC000123"));
    }

    #[test]
    fn receipt_serializes_in_camel_case() {
        let plan = plan(&request("DEPOSIT", dec!(1000))).unwrap();
        let body = serde_json::to_value(&plan.receipt).unwrap();
        assert_eq!(body["paymentMethod"], "UPI");
        assert!(body.get("trxnHashKey").is_some());
        assert!(body.get("requestedDate").is_some());
        assert!(body.get("receiverBankInfo").is_none());
    }
}
