//! Fixtures shared by unit tests.

use crate::models::{
    merchant::{BankDetails, Merchant, UpiDetails},
    payment::{Payment, PaymentMethod, PaymentStatus, PaymentType},
    payment_link::PaymentLink,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use uuid::Uuid;

pub fn merchant_with_whitelist(whitelist: Vec<String>) -> Merchant {
    let now = Utc::now();
    Merchant {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        business_name: "Acme Traders".into(),
        business_type: None,
        contact_phone: "+919800000000".into(),
        address: None,
        api_key: "k".repeat(64),
        webhook_secret: None,
        callback_url: Some("https://merchant.example/callback".into()),
        is_active: true,
        whitelist_ips: Json(whitelist),
        bank_details: Some(Json(BankDetails {
            bank_name: "HDFC Bank".into(),
            account_name: "Acme Traders".into(),
            account_number: "50100012345678".into(),
            ifsc_code: "HDFC0001234".into(),
        })),
        upi_details: Some(Json(UpiDetails {
            upi_id: "acme@hdfcbank".into(),
            name: "Acme Traders".into(),
            description: None,
        })),
        min_deposit: Decimal::from(500),
        max_deposit: Decimal::from(300_000),
        min_withdrawal: Decimal::from(1000),
        max_withdrawal: Decimal::from(1_000_000),
        created_at: now,
        updated_at: now,
    }
}

pub fn merchant() -> Merchant {
    merchant_with_whitelist(vec![])
}

pub fn pending_deposit(amount: Decimal, age_minutes: i64) -> Payment {
    let created = Utc::now() - Duration::minutes(age_minutes);
    Payment {
        id: Uuid::new_v4(),
        merchant_id: Uuid::new_v4(),
        reference: format!("ORD-{}", &Uuid::new_v4().simple().to_string()[..8]),
        trxn_hash_key: Uuid::new_v4().simple().to_string(),
        payment_type: PaymentType::Deposit,
        payment_method: PaymentMethod::Upi,
        amount,
        currency: "INR".into(),
        status: PaymentStatus::Pending,
        upi_id: Some("acme@hdfcbank".into()),
        bank_name: None,
        account_name: None,
        account_number: None,
        ifsc_code: None,
        utr_number: None,
        verified_by: None,
        verification_method: None,
        callback_url: None,
        user_data: None,
        callback_sent: false,
        callback_response: None,
        remarks: None,
        payment_link_id: None,
        verified_at: None,
        created_at: created,
        updated_at: created,
    }
}

pub fn payment_link(amount: Option<Decimal>) -> PaymentLink {
    let now = Utc::now();
    PaymentLink {
        id: Uuid::new_v4(),
        merchant_id: Uuid::new_v4(),
        title: "Festival hamper".into(),
        description: None,
        unique_code: "HXK7M2PQ9R".into(),
        amount,
        currency: "INR".into(),
        allowed_methods: None,
        is_active: true,
        expires_at: None,
        max_uses: None,
        used_count: 0,
        success_url: None,
        cancel_url: None,
        metadata: None,
        created_at: now,
        updated_at: now,
    }
}
