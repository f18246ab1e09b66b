use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

fn default_service_type() -> i32 {
    1
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_ae_type() -> String {
    "1".to_string()
}

/// Body of `POST /payments/request`.
#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub api_key: Option<String>,
    #[serde(default = "default_service_type")]
    pub service_type: i32,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub action: String,
    pub reference: String,
    pub amount: Decimal,
    pub account_name: Option<String>,
    pub account_number: Option<String>,
    pub bank: Option<String>,
    pub bank_ifsc: Option<String>,
    pub callback_url: Option<String>,
    #[serde(default = "default_ae_type")]
    pub ae_type: String,
    pub user_data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    #[serde(rename = "trxnHashKey")]
    pub trxn_hash_key: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub utr_number: String,
    pub payment_id: Uuid,
}
