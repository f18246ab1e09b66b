//! Payment state rules that live in SQL. These run against the database
//! named by `DATABASE_URL` and are skipped when it is not set.

use paytrack::{
    database::connection::{DbPool, run_migrations},
    models::{
        merchant::{CreateMerchant, Merchant, UpiDetails},
        payment::{CreatePayment, Payment, PaymentError, PaymentMethod, PaymentStatus, PaymentType, VerificationMethod},
        payment_link::{CreatePaymentLink, PaymentLink},
        user::{CreateUser, User, UserRole},
    },
    requests::payment_link::LinkPaymentRequest,
    services::payment_links::{LinkError, PaymentLinkService},
    utils::keys::{generate_api_key, generate_link_code},
};
use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn pool() -> Option<DbPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let pool = PgPoolOptions::new().max_connections(4).connect(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    Some(pool)
}

fn unique_utr() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_uppercase()
}

async fn staff(pool: &DbPool) -> User {
    User::create(
        pool,
        CreateUser {
            email: format!("staff-{}@example.com", Uuid::new_v4()),
            password: "correct horse".into(),
            full_name: Some("Desk Staff".into()),
            role: UserRole::Staff,
            is_active: true,
            api_key: None,
        },
    )
    .await
    .unwrap()
}

async fn merchant(pool: &DbPool, owner: &User) -> Merchant {
    Merchant::create(
        pool,
        CreateMerchant {
            user_id: owner.id,
            business_name: "Acme Traders".into(),
            business_type: None,
            contact_phone: "9876543210".into(),
            address: None,
            api_key: generate_api_key(),
            webhook_secret: None,
            callback_url: None,
            is_active: true,
            whitelist_ips: vec![],
            bank_details: None,
            upi_details: Some(UpiDetails {
                upi_id: "acme@hdfcbank".into(),
                name: "Acme Traders".into(),
                description: None,
            }),
            min_deposit: dec!(500),
            max_deposit: dec!(300000),
            min_withdrawal: dec!(1000),
            max_withdrawal: dec!(1000000),
        },
    )
    .await
    .unwrap()
}

fn deposit(merchant: &Merchant, reference: &str) -> CreatePayment {
    CreatePayment {
        merchant_id: merchant.id,
        reference: reference.to_string(),
        trxn_hash_key: Uuid::new_v4().simple().to_string(),
        payment_type: PaymentType::Deposit,
        payment_method: PaymentMethod::Upi,
        amount: dec!(1500),
        currency: "INR".into(),
        upi_id: Some("acme@hdfcbank".into()),
        bank_name: None,
        account_name: None,
        account_number: None,
        ifsc_code: None,
        callback_url: None,
        user_data: None,
        payment_link_id: None,
    }
}

#[actix_web::test]
async fn second_confirmation_is_refused() {
    let Some(pool) = pool().await else { return };
    let user = staff(&pool).await;
    let m = merchant(&pool, &user).await;
    let payment = Payment::create(&pool, deposit(&m, "ORDER-1")).await.unwrap();
    let utr = unique_utr();

    let confirmed = Payment::confirm(&pool, payment.id, &utr, user.id, VerificationMethod::Manual, None)
        .await
        .unwrap();
    assert_eq!(confirmed.status, PaymentStatus::Confirmed);
    assert!(confirmed.verified_at.is_some());

    let again = Payment::confirm(&pool, payment.id, &unique_utr(), user.id, VerificationMethod::Manual, None).await;
    assert!(matches!(
        again,
        Err(PaymentError::InvalidTransition { from: PaymentStatus::Confirmed })
    ));

    let declined = Payment::decline(&pool, payment.id, "late", user.id).await;
    assert!(matches!(
        declined,
        Err(PaymentError::InvalidTransition { from: PaymentStatus::Confirmed })
    ));

    let missing = Payment::decline(&pool, Uuid::new_v4(), "none", user.id).await;
    assert!(matches!(missing, Err(PaymentError::NotFound { .. })));
}

#[actix_web::test]
async fn utr_settles_one_payment_only() {
    let Some(pool) = pool().await else { return };
    let user = staff(&pool).await;
    let m = merchant(&pool, &user).await;
    let first = Payment::create(&pool, deposit(&m, "ORDER-A")).await.unwrap();
    let second = Payment::create(&pool, deposit(&m, "ORDER-B")).await.unwrap();
    let utr = unique_utr();

    Payment::confirm(&pool, first.id, &utr, user.id, VerificationMethod::Manual, None)
        .await
        .unwrap();
    let reused = Payment::confirm(&pool, second.id, &utr, user.id, VerificationMethod::BankStatement, None).await;
    assert!(matches!(reused, Err(PaymentError::UtrAlreadyUsed { utr: ref u }) if *u == utr));

    let still_pending = Payment::find_by_id(&pool, second.id).await.unwrap().unwrap();
    assert_eq!(still_pending.status, PaymentStatus::Pending);
}

#[actix_web::test]
async fn references_are_unique_per_merchant() {
    let Some(pool) = pool().await else { return };
    let user = staff(&pool).await;
    let m = merchant(&pool, &user).await;
    let other = merchant(&pool, &user).await;

    Payment::create(&pool, deposit(&m, "ORDER-7")).await.unwrap();
    let duplicate = Payment::create(&pool, deposit(&m, "ORDER-7")).await;
    assert!(matches!(
        duplicate,
        Err(PaymentError::DuplicateReference { ref reference }) if reference == "ORDER-7"
    ));

    assert!(Payment::create(&pool, deposit(&other, "ORDER-7")).await.is_ok());
}

#[actix_web::test]
async fn link_payments_count_uses_and_take_customer_utr() {
    let Some(pool) = pool().await else { return };
    let user = staff(&pool).await;
    let m = merchant(&pool, &user).await;
    let link = PaymentLink::create(
        &pool,
        CreatePaymentLink {
            merchant_id: m.id,
            title: "Festival hamper".into(),
            description: None,
            unique_code: generate_link_code(),
            amount: Some(dec!(1000)),
            currency: "INR".into(),
            allowed_methods: None,
            expires_at: None,
            max_uses: Some(1),
            success_url: None,
            cancel_url: None,
            metadata: None,
        },
    )
    .await
    .unwrap();

    let service = PaymentLinkService::new(&pool);
    let request = LinkPaymentRequest {
        name: Some("Priya Shah".into()),
        email: None,
        phone: None,
        custom_amount: None,
        payment_method: PaymentMethod::Upi,
        utr_number: Some(" 412345678901 ".into()),
    };
    let (payment, _) = service.pay(&link.unique_code, &request).await.unwrap();
    assert_eq!(payment.payment_link_id, Some(link.id));
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.utr_number.as_deref(), Some("412345678901"));

    let exhausted = service.pay(&link.unique_code, &request).await;
    assert!(matches!(exhausted, Err(LinkError::Exhausted)));

    // Only link payments accept a customer UTR.
    let direct = Payment::create(&pool, deposit(&m, "ORDER-DIRECT")).await.unwrap();
    assert!(matches!(
        service.submit_utr(direct.id, &unique_utr()).await,
        Err(LinkError::PaymentNotFound)
    ));

    Payment::confirm(&pool, payment.id, &unique_utr(), user.id, VerificationMethod::Manual, None)
        .await
        .unwrap();
    assert!(matches!(
        service.submit_utr(payment.id, &unique_utr()).await,
        Err(LinkError::AlreadyProcessed(ref s)) if s == "CONFIRMED"
    ));
}
