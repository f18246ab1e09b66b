use crate::{
    database::connection::DbPool,
    models::payment::{Payment, PaymentError, PaymentType, VerificationMethod},
    services::utr_verifier::{UtrVerifier, normalize_utr},
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::{collections::HashSet, str::FromStr};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Pending payments older than this are not considered for matching.
pub const MATCH_WINDOW_DAYS: i64 = 30;

const UTR_COLUMNS: [&str; 5] = ["utr", "reference", "ref", "transaction id", "txn"];
const AMOUNT_COLUMNS: [&str; 4] = ["amount", "amt", "credit", "deposit"];
const DATE_COLUMNS: [&str; 1] = ["date"];

#[derive(Error, Debug)]
pub enum StatementError {
    #[error("Statement is not valid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("No UTR column found in statement")]
    NoUtrColumn,
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// One statement line. `utr` is `None` when the reference cell holds
/// something that is not a valid UTR; such lines still count but never match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementEntry {
    pub utr: Option<String>,
    pub amount: Option<Decimal>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchedPayment {
    pub payment_id: Uuid,
    pub reference: String,
    pub amount: Decimal,
    pub utr: String,
}

#[derive(Debug, Serialize)]
pub struct StatementReport {
    pub total_transactions: usize,
    pub matches_found: usize,
    pub matched_payments: Vec<MatchedPayment>,
    pub unmatched_transactions: usize,
    #[serde(skip)]
    pub confirmed: Vec<Payment>,
}

// Patterns are tried in order so "UTR No" beats "Txn Date".
fn find_column(headers: &[String], patterns: &[&str]) -> Option<usize> {
    patterns
        .iter()
        .find_map(|p| headers.iter().position(|h| h.contains(p)))
}

fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("INR")
        .trim_start_matches("Rs.")
        .trim_start_matches("Rs")
        .trim_start_matches('₹')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    Decimal::from_str(&cleaned).ok().filter(|a| *a > Decimal::ZERO)
}

/// Reads a bank statement export. Columns are located by header name, so
/// any bank layout with a UTR-like column works.
pub fn parse_statement(content: &[u8]) -> Result<Vec<StatementEntry>, StatementError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_lowercase()).collect();
    let utr_col = find_column(&headers, &UTR_COLUMNS).ok_or(StatementError::NoUtrColumn)?;
    let amount_col = find_column(&headers, &AMOUNT_COLUMNS);
    let date_col = find_column(&headers, &DATE_COLUMNS);

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(raw_utr) = record.get(utr_col).filter(|cell| !cell.is_empty()) else {
            continue;
        };
        entries.push(StatementEntry {
            utr: normalize_utr(raw_utr),
            amount: amount_col.and_then(|i| record.get(i)).and_then(parse_amount),
            date: date_col
                .and_then(|i| record.get(i))
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        });
    }
    Ok(entries)
}

/// Within 1% of the expected amount.
pub fn amount_matches(expected: Decimal, observed: Decimal) -> bool {
    let margin = expected / Decimal::from(100);
    (expected - observed).abs() <= margin
}

/// Pairs statement credits with pending deposits. Exact amounts win over
/// near ones, older payments over newer. Each payment and each UTR is used
/// at most once. Returns `(entry index, payment id)` pairs and the indices
/// of entries left unmatched.
pub fn plan_matches(entries: &[StatementEntry], pending: &[Payment]) -> (Vec<(usize, Uuid)>, Vec<usize>) {
    let mut candidates: Vec<&Payment> = pending
        .iter()
        .filter(|p| p.payment_type == PaymentType::Deposit)
        .collect();
    candidates.sort_by_key(|p| p.created_at);

    let mut taken: HashSet<Uuid> = HashSet::new();
    let mut seen_utrs: HashSet<&str> = HashSet::new();
    let mut matched = Vec::new();
    let mut unmatched = Vec::new();

    for (idx, entry) in entries.iter().enumerate() {
        let (Some(utr), Some(amount)) = (entry.utr.as_deref(), entry.amount) else {
            unmatched.push(idx);
            continue;
        };
        if !seen_utrs.insert(utr) {
            unmatched.push(idx);
            continue;
        }

        let available = || candidates.iter().filter(|p| !taken.contains(&p.id));
        let choice = available()
            .find(|p| p.amount == amount)
            .or_else(|| available().find(|p| amount_matches(p.amount, amount)))
            .map(|p| p.id);

        match choice {
            Some(payment_id) => {
                taken.insert(payment_id);
                matched.push((idx, payment_id));
            }
            None => unmatched.push(idx),
        }
    }

    (matched, unmatched)
}

pub struct BankStatementProcessor<'a> {
    pool: &'a DbPool,
}

impl<'a> BankStatementProcessor<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    pub async fn process_statement(
        &self,
        content: &[u8],
        verified_by: Uuid,
    ) -> Result<StatementReport, StatementError> {
        let entries = parse_statement(content)?;
        let since = Utc::now() - Duration::days(MATCH_WINDOW_DAYS);
        let pending = Payment::find_pending(self.pool, None, since).await?;
        let (planned, mut unmatched) = plan_matches(&entries, &pending);

        let verifier = UtrVerifier::new(self.pool);
        let mut matched_payments = Vec::new();
        let mut confirmed = Vec::new();

        for (idx, payment_id) in planned {
            let Some(utr) = entries[idx].utr.as_deref() else {
                unmatched.push(idx);
                continue;
            };
            match verifier
                .verify_utr(utr, payment_id, verified_by, VerificationMethod::BankStatement, None)
                .await
            {
                Ok(payment) => {
                    matched_payments.push(MatchedPayment {
                        payment_id: payment.id,
                        reference: payment.reference.clone(),
                        amount: payment.amount,
                        utr: utr.to_string(),
                    });
                    confirmed.push(payment);
                }
                Err(PaymentError::Database(e)) => return Err(PaymentError::Database(e).into()),
                Err(e) => {
                    warn!("Statement line {} with UTR {} not applied: {}", idx + 1, utr, e);
                    unmatched.push(idx);
                }
            }
        }

        info!(
            "Bank statement processed: {} lines, {} matched",
            entries.len(),
            matched_payments.len()
        );

        Ok(StatementReport {
            total_transactions: entries.len(),
            matches_found: matched_payments.len(),
            matched_payments,
            unmatched_transactions: unmatched.len(),
            confirmed,
        })
    }
}
