use crate::models::payment::Payment;
use chrono::{DateTime, NaiveDate, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub const EXPORT_HEADERS: [&str; 20] = [
    "id",
    "merchant_id",
    "reference",
    "trxn_hash_key",
    "payment_type",
    "payment_method",
    "amount",
    "currency",
    "status",
    "upi_id",
    "bank_name",
    "account_name",
    "account_number",
    "ifsc_code",
    "utr_number",
    "verified_by",
    "verification_method",
    "created_at",
    "updated_at",
    "remarks",
];

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("Export I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV buffer could not be flushed: {0}")]
    Flush(String),
}

fn row(payment: &Payment) -> [String; 20] {
    let opt = |value: &Option<String>| value.clone().unwrap_or_default();
    [
        payment.id.to_string(),
        payment.merchant_id.to_string(),
        payment.reference.clone(),
        payment.trxn_hash_key.clone(),
        payment.payment_type.as_str().to_string(),
        payment.payment_method.as_str().to_string(),
        payment.amount.to_string(),
        payment.currency.clone(),
        payment.status.as_str().to_string(),
        opt(&payment.upi_id),
        opt(&payment.bank_name),
        opt(&payment.account_name),
        opt(&payment.account_number),
        opt(&payment.ifsc_code),
        opt(&payment.utr_number),
        payment.verified_by.map(|id| id.to_string()).unwrap_or_default(),
        opt(&payment.verification_method),
        payment.created_at.to_rfc3339(),
        payment.updated_at.to_rfc3339(),
        opt(&payment.remarks),
    ]
}

pub fn render_payments_csv(payments: &[Payment]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(EXPORT_HEADERS)?;
    for payment in payments {
        writer.write_record(row(payment))?;
    }
    writer.into_inner().map_err(|e| ExportError::Flush(e.to_string()))
}

pub fn export_filename(merchant_id: Option<Uuid>, now: DateTime<Utc>) -> String {
    let stamp = now.format("%Y%m%d_%H%M%S");
    match merchant_id {
        Some(id) => format!("payments_{}_{}.csv", id, stamp),
        None => format!("payments_{}.csv", stamp),
    }
}

/// Attachment name for merchant downloads, e.g. `payments_Acme_Traders_20250301.csv`.
pub fn download_filename(business_name: &str, date: NaiveDate) -> String {
    let business: String = business_name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("payments_{}_{}.csv", business, date.format("%Y%m%d"))
}

/// Writes the export under `dir`, creating it if needed, and returns the
/// file path along with the bytes written.
pub async fn export_to_dir(
    dir: &Path,
    merchant_id: Option<Uuid>,
    payments: &[Payment],
) -> Result<(PathBuf, Vec<u8>), ExportError> {
    let content = render_payments_csv(payments)?;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(export_filename(merchant_id, Utc::now()));
    tokio::fs::write(&path, &content).await?;

    info!("Exported {} payments to {}", payments.len(), path.display());
    Ok((path, content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::payment::PaymentStatus, test_support::pending_deposit};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn renders_header_and_rows() {
        let mut confirmed = pending_deposit(dec!(1500.50), 0);
        confirmed.status = PaymentStatus::Confirmed;
        confirmed.utr_number = Some("412345678901".into());
        confirmed.remarks = Some("paid, thanks".into());

        let bytes = render_payments_csv(&[confirmed.clone()]).unwrap();
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, EXPORT_HEADERS);

        let records: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0][2], confirmed.reference);
        assert_eq!(&records[0][6], "1500.50");
        assert_eq!(&records[0][8], "CONFIRMED");
        assert_eq!(&records[0][14], "412345678901");
        assert_eq!(&records[0][19], "paid, thanks");
    }

    #[test]
    fn filenames() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 14, 5, 9).unwrap();
        assert_eq!(export_filename(None, now), "payments_20250301_140509.csv");
        let id = Uuid::nil();
        assert_eq!(
            export_filename(Some(id), now),
            format!("payments_{}_20250301_140509.csv", id)
        );
        assert_eq!(
            download_filename("Acme Traders/Ltd", now.date_naive()),
            "payments_Acme_Traders_Ltd_20250301.csv"
        );
    }

    #[tokio::test]
    async fn export_writes_into_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("exports");
        let payments = vec![pending_deposit(dec!(100), 1), pending_deposit(dec!(200), 2)];

        let (path, content) = export_to_dir(&dir, None, &payments).await.unwrap();
        assert!(path.starts_with(&dir));
        let on_disk = tokio::fs::read(&path).await.unwrap();
        assert_eq!(on_disk, content);
        assert_eq!(String::from_utf8(on_disk).unwrap().lines().count(), 3);
    }
}
