use crate::models::{payment::PaymentMethod, payment_link::UpdatePaymentLink};
use chrono::{DateTime, Utc};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_currency() -> String {
    "INR".to_string()
}

fn default_link_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentLinkRequest {
    pub title: String,
    pub description: Option<String>,
    /// Fixed amount; leave out to let the customer choose.
    pub amount: Option<Decimal>,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub allowed_methods: Option<Vec<PaymentMethod>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentLinkRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub is_active: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct LinkListQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_link_limit")]
    pub limit: i64,
    #[serde(default)]
    pub active_only: bool,
}

/// What the customer submits on the payment page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkPaymentRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub custom_amount: Option<Decimal>,
    pub payment_method: PaymentMethod,
    pub utr_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitUtrQuery {
    pub utr_number: String,
}

fn check_amount(amount: Option<Decimal>) -> Result<(), String> {
    match amount {
        Some(a) if a <= Decimal::ZERO => Err("Amount must be greater than 0".to_string()),
        Some(a) if a != a.round_dp(2) => Err("Amount must have at most two decimal places".to_string()),
        _ => Ok(()),
    }
}

fn check_max_uses(max_uses: Option<i32>) -> Result<(), String> {
    match max_uses {
        Some(n) if n <= 0 => Err("Max uses must be greater than 0".to_string()),
        _ => Ok(()),
    }
}

fn check_redirect(url: &Option<String>, field: &str) -> Result<(), String> {
    let Some(url) = url.as_deref() else {
        return Ok(());
    };
    match Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => Ok(()),
        _ => Err(format!("Invalid {}: {}", field, url)),
    }
}

impl CreatePaymentLinkRequest {
    pub fn validate(&self, currency: &str) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        if self.currency != currency {
            return Err(format!("Only {} currency is supported", currency));
        }
        if self.allowed_methods.as_ref().is_some_and(Vec::is_empty) {
            return Err("allowed_methods must not be empty".to_string());
        }
        check_amount(self.amount)?;
        check_max_uses(self.max_uses)?;
        check_redirect(&self.success_url, "success_url")?;
        check_redirect(&self.cancel_url, "cancel_url")
    }
}

impl UpdatePaymentLinkRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err("title must not be empty".to_string());
        }
        check_amount(self.amount)?;
        check_max_uses(self.max_uses)?;
        check_redirect(&self.success_url, "success_url")?;
        check_redirect(&self.cancel_url, "cancel_url")
    }
}

impl From<UpdatePaymentLinkRequest> for UpdatePaymentLink {
    fn from(req: UpdatePaymentLinkRequest) -> Self {
        UpdatePaymentLink {
            title: req.title,
            description: req.description,
            amount: req.amount,
            is_active: req.is_active,
            expires_at: req.expires_at,
            max_uses: req.max_uses,
            success_url: req.success_url,
            cancel_url: req.cancel_url,
            metadata: req.metadata,
        }
    }
}

impl LinkListQuery {
    pub fn validate(&self) -> Result<(), String> {
        if self.skip < 0 {
            return Err("skip must not be negative".to_string());
        }
        if !(1..=100).contains(&self.limit) {
            return Err("limit must be between 1 and 100".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create(body: Value) -> CreatePaymentLinkRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn create_defaults_and_validation() {
        let req = create(json!({"title": "Donation"}));
        assert_eq!(req.currency, "INR");
        assert!(req.amount.is_none());
        assert!(req.validate("INR").is_ok());

        assert!(create(json!({"title": "  "})).validate("INR").is_err());
        assert!(create(json!({"title": "T", "amount": "0"})).validate("INR").is_err());
        assert!(create(json!({"title": "T", "amount": "10.555"})).validate("INR").is_err());
        assert!(create(json!({"title": "T", "max_uses": 0})).validate("INR").is_err());
        assert!(create(json!({"title": "T", "currency": "USD"})).validate("INR").is_err());
        assert!(create(json!({"title": "T", "allowed_methods": []})).validate("INR").is_err());
        assert!(create(json!({"title": "T", "success_url": "javascript:alert(1)"})).validate("INR").is_err());

        let req = create(json!({
            "title": "T",
            "amount": "1499.50",
            "allowed_methods": ["BANK_TRANSFER"],
            "success_url": "https://shop.example/thanks"
        }));
        assert!(req.validate("INR").is_ok());
        assert_eq!(req.allowed_methods, Some(vec![PaymentMethod::BankTransfer]));
    }

    #[test]
    fn customer_payment_body() {
        let req: LinkPaymentRequest = serde_json::from_value(json!({
            "name": "Priya",
            "payment_method": "UPI",
            "custom_amount": "750"
        }))
        .unwrap();
        assert_eq!(req.payment_method, PaymentMethod::Upi);
        assert!(req.utr_number.is_none());

        let bad: Result<LinkPaymentRequest, _> = serde_json::from_value(json!({"payment_method": "CARD"}));
        assert!(bad.is_err());
    }

    #[test]
    fn list_limits() {
        let q: LinkListQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!((q.skip, q.limit, q.active_only), (0, 100, false));
        assert!(q.validate().is_ok());
        let q: LinkListQuery = serde_json::from_value(json!({"limit": 101})).unwrap();
        assert!(q.validate().is_err());
    }
}
