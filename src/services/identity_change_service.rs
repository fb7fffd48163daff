use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::database::{admin_alert_repo, gender_change_repo, otp_repo, user_repo};
use crate::error::{conflict_on_unique, ServiceError, ServiceResult};
use crate::models::{
    AdminAlertRow, AlertStatus, AlertType, Gender, GenderChangeStatus, NotificationKind,
    PendingGenderChangeRow, ReviewDecision, TempGenderVerificationRow,
};
use crate::services::delivery_service::CodeDelivery;
use crate::services::notification_service::{dispatch_notification, Notifier};

const OTP_DIGITS: usize = 6;

/// `review_notes` left on requests closed before reaching review.
pub const CLOSED_EXPIRED: &str = "expired";
pub const CLOSED_LOCKED_OUT: &str = "locked_out";

#[derive(Debug, Clone)]
pub struct VerificationSettings {
    pub otp_max_attempts: i64,
    pub otp_ttl: Duration,
    pub token_ttl: Duration,
    pub admin_alert_email: Option<String>,
}

impl VerificationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            otp_max_attempts: config.otp_max_attempts,
            otp_ttl: config.otp_ttl,
            token_ttl: config.verification_token_ttl,
            admin_alert_email: config.admin_alert_email.clone(),
        }
    }
}

/// Drives a gender change through email confirmation, OTP entry and admin review.
pub struct IdentityChangeManager {
    pool: SqlitePool,
    notifier: Arc<dyn Notifier>,
    delivery: Arc<dyn CodeDelivery>,
    settings: VerificationSettings,
}

impl IdentityChangeManager {
    pub fn new(
        pool: SqlitePool,
        notifier: Arc<dyn Notifier>,
        delivery: Arc<dyn CodeDelivery>,
        settings: VerificationSettings,
    ) -> Self {
        Self {
            pool,
            notifier,
            delivery,
            settings,
        }
    }

    pub fn settings(&self) -> &VerificationSettings {
        &self.settings
    }

    pub async fn create_request(
        &self,
        user_id: &str,
        requested_gender: Gender,
    ) -> ServiceResult<PendingGenderChangeRow> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let user = user_repo::load_user(&mut *tx, user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("user not found"))?;
        let email = user
            .contact_email()
            .map(str::to_string)
            .ok_or_else(|| ServiceError::invalid("an email address is required to verify this change"))?;
        if user.gender == Some(requested_gender) {
            return Err(ServiceError::invalid(format!(
                "gender is already {}",
                requested_gender
            )));
        }
        if let Some(open) = gender_change_repo::find_open_for_user(&mut *tx, user_id).await? {
            let Some(reason) = self.stale_reason(&mut *tx, &open, now).await? else {
                return Err(ServiceError::conflict("a change request is already in progress"));
            };
            self.close_stale(&mut *tx, &open.id, reason, now).await?;
            info!(request_id = %open.id, reason, "stale change request closed");
        }

        let id = Uuid::new_v4().to_string();
        let token = generate_token();
        gender_change_repo::insert_request(
            &mut *tx,
            gender_change_repo::NewGenderChange {
                id: &id,
                user_id,
                requested_gender,
                current_gender: user.gender,
                verification_token: &token,
                token_expires_at: now + self.settings.token_ttl,
                created_at: now,
            },
        )
        .await
        .map_err(|e| conflict_on_unique(e, "a change request is already in progress"))?;

        let row = gender_change_repo::find_by_id(&mut *tx, &id)
            .await?
            .ok_or(ServiceError::Database(sqlx::Error::RowNotFound))?;
        tx.commit().await?;

        info!(request_id = %id, user_id = %user_id, "gender change requested");
        if let Err(e) = self.delivery.send_verification_link(&email, &token).await {
            warn!(request_id = %id, "✉️ Verification link delivery failed: {:#}", e);
        }

        Ok(row)
    }

    pub async fn confirm_email(&self, token: &str) -> ServiceResult<PendingGenderChangeRow> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ServiceError::not_found("unknown verification token"));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let row = gender_change_repo::find_by_token(&mut *tx, token)
            .await?
            .ok_or_else(|| ServiceError::not_found("unknown verification token"))?;
        if row.status != GenderChangeStatus::Pending {
            return Err(ServiceError::conflict(format!(
                "request is {}, not awaiting email confirmation",
                row.status.as_str()
            )));
        }
        if row.token_expires_at < now {
            self.close_stale(&mut *tx, &row.id, CLOSED_EXPIRED, now).await?;
            tx.commit().await?;
            info!(request_id = %row.id, "verification link expired, request closed");
            return Err(closed_error(CLOSED_EXPIRED));
        }

        if gender_change_repo::mark_email_verified(&mut *tx, &row.id, now).await? != 1 {
            return Err(ServiceError::conflict("request was confirmed concurrently"));
        }

        let user = user_repo::load_user(&mut *tx, &row.user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("user not found"))?;
        let email = user
            .contact_email()
            .map(str::to_string)
            .ok_or_else(|| ServiceError::invalid("no email address on file"))?;

        let code = generate_otp();
        self.store_otp(&mut *tx, &row, &code, now).await?;
        tx.commit().await?;

        info!(request_id = %row.id, "email confirmed, code issued");
        self.deliver_code(&row.id, &email, &code).await;

        self.reload(&row.id).await
    }

    /// Issues a fresh code for a request waiting on OTP entry. Failed attempts
    /// carry over to the new code. A locked or expired code closes the request
    /// instead.
    pub async fn resend_otp(&self, pending_change_id: &str, user_id: &str) -> ServiceResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let row = self.load_for_otp(&mut *tx, pending_change_id, user_id).await?;
        if let Some(reason) = self.stale_reason(&mut *tx, &row, now).await? {
            self.close_stale(&mut *tx, &row.id, reason, now).await?;
            tx.commit().await?;
            info!(request_id = %row.id, reason, "change request closed on resend");
            return Err(closed_error(reason));
        }

        let user = user_repo::load_user(&mut *tx, user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("user not found"))?;
        let email = user
            .contact_email()
            .map(str::to_string)
            .ok_or_else(|| ServiceError::invalid("no email address on file"))?;

        let code = generate_otp();
        self.store_otp(&mut *tx, &row, &code, now).await?;
        tx.commit().await?;

        info!(request_id = %row.id, "verification code re-issued");
        self.deliver_code(&row.id, &email, &code).await;
        Ok(())
    }

    pub async fn verify_otp(
        &self,
        pending_change_id: &str,
        user_id: &str,
        code: &str,
    ) -> ServiceResult<PendingGenderChangeRow> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let row = self.load_for_otp(&mut *tx, pending_change_id, user_id).await?;
        let otp = otp_repo::find_for_change(&mut *tx, &row.id)
            .await?
            .ok_or_else(|| ServiceError::not_found("no verification code has been issued"))?;

        // Lockout wins over everything else, including a correct code.
        if let Some(reason) = otp_closure(&otp, self.settings.otp_max_attempts, now) {
            self.close_stale(&mut *tx, &row.id, reason, now).await?;
            tx.commit().await?;
            info!(request_id = %row.id, reason, "change request closed");
            return Err(closed_error(reason));
        }

        let code = code.trim();
        if !is_well_formed(code) || hash_otp(&row.id, code) != otp.otp_hash {
            otp_repo::increment_attempts(&mut *tx, &otp.id).await?;
            tx.commit().await?;
            let remaining = (self.settings.otp_max_attempts - otp.attempts - 1).max(0);
            warn!(request_id = %row.id, remaining, "incorrect verification code");
            return Err(ServiceError::invalid(format!(
                "incorrect verification code, {} attempt(s) left",
                remaining
            )));
        }

        otp_repo::delete_for_change(&mut *tx, &row.id).await?;

        let alert_id = Uuid::new_v4().to_string();
        let details = serde_json::json!({
            "pending_change_id": row.id,
            "requested_gender": row.requested_gender,
            "current_gender": row.current_gender,
        })
        .to_string();
        admin_alert_repo::insert_alert(
            &mut *tx,
            admin_alert_repo::NewAdminAlert {
                id: &alert_id,
                user_id: &row.user_id,
                alert_type: AlertType::GenderChange,
                details: &details,
                created_at: now,
            },
        )
        .await?;

        if gender_change_repo::enter_admin_review(&mut *tx, &row.id, &alert_id, now).await? != 1 {
            return Err(ServiceError::conflict("request changed concurrently"));
        }
        let updated = gender_change_repo::find_by_id(&mut *tx, &row.id)
            .await?
            .ok_or(ServiceError::Database(sqlx::Error::RowNotFound))?;
        tx.commit().await?;

        info!(request_id = %row.id, alert_id = %alert_id, "code verified, sent to admin review");
        self.raise_review_alert(&updated, &alert_id).await;

        Ok(updated)
    }

    pub async fn review_request(
        &self,
        admin_alert_id: &str,
        admin_id: &str,
        decision: ReviewDecision,
        notes: Option<&str>,
    ) -> ServiceResult<PendingGenderChangeRow> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        self.require_admin(&mut *tx, admin_id).await?;

        let alert = admin_alert_repo::find_by_id(&mut *tx, admin_alert_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("alert not found"))?;
        if alert.status != AlertStatus::Pending {
            return Err(ServiceError::conflict("alert has already been reviewed"));
        }
        let row = gender_change_repo::find_by_alert_id(&mut *tx, admin_alert_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("no change request for this alert"))?;

        let (outcome, alert_status) = decision.outcome();
        let notes = notes.map(str::trim).filter(|s| !s.is_empty());
        if gender_change_repo::record_review(&mut *tx, &row.id, outcome, admin_id, notes, now).await?
            != 1
        {
            return Err(ServiceError::conflict(format!(
                "request is {}, not awaiting review",
                row.status.as_str()
            )));
        }

        if decision == ReviewDecision::Approve
            && user_repo::update_gender(&mut *tx, &row.user_id, row.requested_gender, now).await?
                != 1
        {
            return Err(ServiceError::not_found("user no longer exists"));
        }

        if admin_alert_repo::resolve_pending(&mut *tx, admin_alert_id, alert_status, admin_id, now)
            .await?
            != 1
        {
            return Err(ServiceError::conflict("alert was reviewed concurrently"));
        }

        let updated = gender_change_repo::find_by_id(&mut *tx, &row.id)
            .await?
            .ok_or(ServiceError::Database(sqlx::Error::RowNotFound))?;
        tx.commit().await?;

        info!(
            request_id = %row.id,
            admin_id = %admin_id,
            outcome = outcome.as_str(),
            "gender change reviewed"
        );
        let kind = match decision {
            ReviewDecision::Approve => NotificationKind::IdentityChangeApproved,
            ReviewDecision::Reject => NotificationKind::IdentityChangeRejected,
            ReviewDecision::RequiresInfo => NotificationKind::IdentityChangeRequiresInfo,
        };
        dispatch_notification(
            self.notifier.as_ref(),
            &updated.user_id,
            kind,
            serde_json::json!({ "request_id": updated.id, "notes": updated.review_notes }),
        )
        .await;

        Ok(updated)
    }

    pub async fn current_request(&self, user_id: &str) -> ServiceResult<Option<PendingGenderChangeRow>> {
        let mut conn = self.pool.acquire().await?;
        let row = gender_change_repo::find_open_for_user(&mut *conn, user_id).await?;
        Ok(row)
    }

    pub async fn list_pending_alerts(&self, admin_id: &str, limit: i64) -> ServiceResult<Vec<AdminAlertRow>> {
        {
            let mut conn = self.pool.acquire().await?;
            self.require_admin(&mut *conn, admin_id).await?;
        }
        let rows = admin_alert_repo::list_pending(&self.pool, limit.clamp(1, 200)).await?;
        Ok(rows)
    }

    async fn require_admin(&self, conn: &mut sqlx::SqliteConnection, user_id: &str) -> ServiceResult<()> {
        let is_admin = user_repo::load_user(conn, user_id)
            .await?
            .map(|u| u.is_admin())
            .unwrap_or(false);
        if !is_admin {
            return Err(ServiceError::forbidden("admin capability required"));
        }
        Ok(())
    }

    async fn load_for_otp(
        &self,
        conn: &mut sqlx::SqliteConnection,
        pending_change_id: &str,
        user_id: &str,
    ) -> ServiceResult<PendingGenderChangeRow> {
        let row = gender_change_repo::find_by_id(conn, pending_change_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("change request not found"))?;
        if row.user_id != user_id {
            return Err(ServiceError::forbidden("change request belongs to another user"));
        }
        if !row.status.accepts_otp() {
            return Err(ServiceError::conflict(format!(
                "request is {}, not awaiting a verification code",
                row.status.as_str()
            )));
        }
        Ok(row)
    }

    /// Why an open request can no longer progress, if it cannot.
    async fn stale_reason(
        &self,
        conn: &mut sqlx::SqliteConnection,
        row: &PendingGenderChangeRow,
        now: chrono::DateTime<Utc>,
    ) -> ServiceResult<Option<&'static str>> {
        if row.status == GenderChangeStatus::Pending {
            return Ok((row.token_expires_at < now).then_some(CLOSED_EXPIRED));
        }
        if !row.status.accepts_otp() {
            return Ok(None);
        }
        // Codes are issued in the same transaction as email confirmation, so a
        // missing row means the sweeper already removed an expired one.
        let reason = match otp_repo::find_for_change(conn, &row.id).await? {
            Some(otp) => otp_closure(&otp, self.settings.otp_max_attempts, now),
            None => Some(CLOSED_EXPIRED),
        };
        Ok(reason)
    }

    async fn close_stale(
        &self,
        conn: &mut sqlx::SqliteConnection,
        request_id: &str,
        reason: &str,
        now: chrono::DateTime<Utc>,
    ) -> ServiceResult<()> {
        otp_repo::delete_for_change(&mut *conn, request_id).await?;
        if gender_change_repo::close_unreviewed(&mut *conn, request_id, reason, now).await? != 1 {
            return Err(ServiceError::conflict("request changed concurrently"));
        }
        Ok(())
    }

    async fn store_otp(
        &self,
        conn: &mut sqlx::SqliteConnection,
        row: &PendingGenderChangeRow,
        code: &str,
        now: chrono::DateTime<Utc>,
    ) -> ServiceResult<()> {
        let otp_id = Uuid::new_v4().to_string();
        let otp_hash = hash_otp(&row.id, code);
        otp_repo::upsert_otp(
            conn,
            otp_repo::NewOtp {
                id: &otp_id,
                user_id: &row.user_id,
                pending_change_id: &row.id,
                otp_hash: &otp_hash,
                expires_at: now + self.settings.otp_ttl,
                created_at: now,
            },
        )
        .await?;
        Ok(())
    }

    /// Hands the code to the delivery service and, once it is out, marks the
    /// request as waiting for entry. Failures are logged; the request stays in
    /// `email_verified` and the user may ask for a new code.
    async fn deliver_code(&self, request_id: &str, email: &str, code: &str) {
        if let Err(e) = self.delivery.send_verification_code(email, code).await {
            warn!(request_id = %request_id, "✉️ Verification code delivery failed: {:#}", e);
            return;
        }

        let marked = match self.pool.acquire().await {
            Ok(mut conn) => {
                gender_change_repo::transition(
                    &mut *conn,
                    request_id,
                    GenderChangeStatus::EmailVerified,
                    GenderChangeStatus::OtpPending,
                    Utc::now(),
                )
                .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = marked {
            warn!(request_id = %request_id, "could not mark code as delivered: {}", e);
        }
    }

    async fn raise_review_alert(&self, row: &PendingGenderChangeRow, alert_id: &str) {
        match user_repo::list_admin_ids(&self.pool).await {
            Ok(admins) => {
                for admin_id in admins {
                    dispatch_notification(
                        self.notifier.as_ref(),
                        &admin_id,
                        NotificationKind::IdentityChangeReviewRequired,
                        serde_json::json!({ "alert_id": alert_id, "user_id": row.user_id }),
                    )
                    .await;
                }
            }
            Err(e) => warn!(alert_id = %alert_id, "could not load admins to notify: {}", e),
        }

        if let Some(destination) = &self.settings.admin_alert_email {
            let subject = "Gender change awaiting review";
            let body = format!(
                "User {} requested a change to {} (alert {}).",
                row.user_id, row.requested_gender, alert_id
            );
            if let Err(e) = self
                .delivery
                .send_alert_email(destination, subject, &body)
                .await
            {
                warn!(alert_id = %alert_id, "✉️ Admin alert email failed: {:#}", e);
            }
        }
    }

    async fn reload(&self, id: &str) -> ServiceResult<PendingGenderChangeRow> {
        let mut conn = self.pool.acquire().await?;
        gender_change_repo::find_by_id(&mut *conn, id)
            .await?
            .ok_or_else(|| ServiceError::not_found("change request not found"))
    }
}

fn otp_closure(
    otp: &TempGenderVerificationRow,
    max_attempts: i64,
    now: chrono::DateTime<Utc>,
) -> Option<&'static str> {
    if otp.attempts >= max_attempts {
        Some(CLOSED_LOCKED_OUT)
    } else if otp.expires_at < now {
        Some(CLOSED_EXPIRED)
    } else {
        None
    }
}

fn closed_error(reason: &str) -> ServiceError {
    if reason == CLOSED_LOCKED_OUT {
        ServiceError::LockedOut("too many incorrect codes, please submit a new request".to_string())
    } else {
        ServiceError::Expired("verification has expired, please submit a new request".to_string())
    }
}

fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn generate_otp() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", n)
}

fn is_well_formed(code: &str) -> bool {
    code.len() == OTP_DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

/// Codes are stored hashed and salted with the request id.
fn hash_otp(pending_change_id: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pending_change_id.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    general_purpose::STANDARD_NO_PAD.encode(hasher.finalize())
}
