use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::database::{gender_change_repo, otp_repo};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub codes_removed: u64,
    pub unconfirmed_expired: u64,
    pub unverified_expired: u64,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.codes_removed == 0 && self.unconfirmed_expired == 0 && self.unverified_expired == 0
    }
}

/// Drops expired OTPs and closes requests that can no longer progress.
///
/// Every statement only touches rows still in the expected status, so running
/// it twice (or concurrently) is harmless.
pub async fn sweep_expired(pool: &SqlitePool, now: DateTime<Utc>) -> sqlx::Result<SweepReport> {
    let mut tx = pool.begin().await?;
    let codes_removed = otp_repo::delete_expired(&mut *tx, now).await?;
    let unconfirmed_expired = gender_change_repo::expire_unconfirmed(&mut *tx, now).await?;
    let unverified_expired = gender_change_repo::expire_without_otp(&mut *tx, now).await?;
    tx.commit().await?;

    let report = SweepReport {
        codes_removed,
        unconfirmed_expired,
        unverified_expired,
    };
    if !report.is_empty() {
        info!(
            "🧹 Expiry sweep: codes_removed={}, unconfirmed_expired={}, unverified_expired={}",
            report.codes_removed, report.unconfirmed_expired, report.unverified_expired
        );
    }
    Ok(report)
}

pub fn spawn_sweeper(pool: SqlitePool, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_expired(&pool, Utc::now()).await {
                warn!("🧹 Expiry sweep failed: {}", e);
            }
        }
    })
}
