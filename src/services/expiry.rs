use crate::{
    database::connection::DbPool,
    models::payment::Payment,
    services::callback::CallbackNotifier,
};
use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Deposits created before the returned instant are stale. `None` when
/// expiry is switched off or the window does not fit a timestamp.
pub fn expiry_cutoff(now: DateTime<Utc>, expiry_minutes: i64) -> Option<DateTime<Utc>> {
    if expiry_minutes <= 0 {
        return None;
    }
    Duration::try_minutes(expiry_minutes).and_then(|window| now.checked_sub_signed(window))
}

pub async fn sweep_once(pool: &DbPool, notifier: &CallbackNotifier, expiry_minutes: i64) -> usize {
    let Some(cutoff) = expiry_cutoff(Utc::now(), expiry_minutes) else {
        return 0;
    };

    match Payment::expire_stale(pool, cutoff).await {
        Ok(expired) => {
            if !expired.is_empty() {
                info!("Expired {} stale deposits", expired.len());
            }
            let count = expired.len();
            for payment in expired {
                notifier.dispatch(payment);
            }
            count
        }
        Err(e) => {
            error!("Expiry sweep failed: {}", e);
            0
        }
    }
}

pub fn spawn_expiry_sweeper(
    pool: DbPool,
    notifier: CallbackNotifier,
    expiry_minutes: i64,
    interval_secs: u64,
) -> Option<JoinHandle<()>> {
    if expiry_cutoff(Utc::now(), expiry_minutes).is_none() {
        info!("Payment expiry disabled (PAYMENT_EXPIRY_MINUTES={})", expiry_minutes);
        return None;
    }

    info!(
        "Expiring pending deposits after {} minutes, sweeping every {}s",
        expiry_minutes, interval_secs
    );
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            sweep_once(&pool, &notifier, expiry_minutes).await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cutoff_is_disabled_for_non_positive_minutes() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(expiry_cutoff(now, 0), None);
        assert_eq!(expiry_cutoff(now, -5), None);
        assert_eq!(
            expiry_cutoff(now, 30),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 11, 30, 0).unwrap())
        );
    }

    #[test]
    fn oversized_window_disables_expiry() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(expiry_cutoff(now, i64::MAX), None);
        assert_eq!(expiry_cutoff(now, 200_000_000_000_000), None);
        // Representable as a duration but reaches before the earliest timestamp.
        assert_eq!(expiry_cutoff(now, 100_000_000_000_000), None);
    }
}
