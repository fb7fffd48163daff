use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::models::{Gender, GenderChangeStatus, PendingGenderChangeRow};

pub struct NewGenderChange<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub requested_gender: Gender,
    pub current_gender: Option<Gender>,
    pub verification_token: &'a str,
    pub token_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

const SELECT_COLUMNS: &str = r#"
SELECT
  id,
  user_id,
  requested_gender,
  current_gender,
  verification_token,
  token_expires_at,
  is_email_verified,
  status,
  reviewed_by,
  review_notes,
  admin_alert_id,
  created_at,
  updated_at
FROM pending_gender_changes
"#;

const SQL_INSERT_REQUEST: &str = r#"
INSERT INTO pending_gender_changes (
  id,
  user_id,
  requested_gender,
  current_gender,
  verification_token,
  token_expires_at,
  is_email_verified,
  status,
  created_at,
  updated_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 'pending', ?7, ?7)
"#;

const SQL_MARK_EMAIL_VERIFIED: &str = r#"
UPDATE pending_gender_changes
SET is_email_verified = 1,
    status = 'email_verified',
    updated_at = ?2
WHERE id = ?1
  AND status = 'pending'
"#;

const SQL_TRANSITION: &str = r#"
UPDATE pending_gender_changes
SET status = ?3,
    updated_at = ?4
WHERE id = ?1
  AND status = ?2
"#;

const SQL_ENTER_ADMIN_REVIEW: &str = r#"
UPDATE pending_gender_changes
SET status = 'admin_review',
    admin_alert_id = ?2,
    updated_at = ?3
WHERE id = ?1
  AND status IN ('email_verified', 'otp_pending')
"#;

const SQL_RECORD_REVIEW: &str = r#"
UPDATE pending_gender_changes
SET status = ?2,
    reviewed_by = ?3,
    review_notes = ?4,
    updated_at = ?5
WHERE id = ?1
  AND status = 'admin_review'
"#;

const SQL_CLOSE_UNREVIEWED: &str = r#"
UPDATE pending_gender_changes
SET status = 'rejected',
    review_notes = ?2,
    updated_at = ?3
WHERE id = ?1
  AND status IN ('pending', 'email_verified', 'otp_pending')
"#;

const SQL_EXPIRE_UNCONFIRMED: &str = r#"
UPDATE pending_gender_changes
SET status = 'rejected',
    review_notes = 'expired',
    updated_at = ?1
WHERE status = 'pending'
  AND token_expires_at < ?1
"#;

const SQL_EXPIRE_WITHOUT_OTP: &str = r#"
UPDATE pending_gender_changes
SET status = 'rejected',
    review_notes = 'expired',
    updated_at = ?1
WHERE status IN ('email_verified', 'otp_pending')
  AND NOT EXISTS (
    SELECT 1 FROM temp_gender_verifications t
    WHERE t.pending_change_id = pending_gender_changes.id
  )
"#;

pub async fn insert_request(
    conn: &mut SqliteConnection,
    new: NewGenderChange<'_>,
) -> sqlx::Result<()> {
    sqlx::query(SQL_INSERT_REQUEST)
        .bind(new.id)
        .bind(new.user_id)
        .bind(new.requested_gender)
        .bind(new.current_gender)
        .bind(new.verification_token)
        .bind(new.token_expires_at)
        .bind(new.created_at)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn find_by_id(
    conn: &mut SqliteConnection,
    id: &str,
) -> sqlx::Result<Option<PendingGenderChangeRow>> {
    let sql = format!("{} WHERE id = ?1 LIMIT 1", SELECT_COLUMNS);
    sqlx::query_as::<_, PendingGenderChangeRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn find_by_token(
    conn: &mut SqliteConnection,
    token: &str,
) -> sqlx::Result<Option<PendingGenderChangeRow>> {
    let sql = format!("{} WHERE verification_token = ?1 LIMIT 1", SELECT_COLUMNS);
    sqlx::query_as::<_, PendingGenderChangeRow>(&sql)
        .bind(token)
        .fetch_optional(conn)
        .await
}

pub async fn find_by_alert_id(
    conn: &mut SqliteConnection,
    admin_alert_id: &str,
) -> sqlx::Result<Option<PendingGenderChangeRow>> {
    let sql = format!("{} WHERE admin_alert_id = ?1 LIMIT 1", SELECT_COLUMNS);
    sqlx::query_as::<_, PendingGenderChangeRow>(&sql)
        .bind(admin_alert_id)
        .fetch_optional(conn)
        .await
}

pub async fn find_open_for_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> sqlx::Result<Option<PendingGenderChangeRow>> {
    let sql = format!(
        "{} WHERE user_id = ?1 AND status IN ('pending', 'email_verified', 'otp_pending', 'admin_review') LIMIT 1",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, PendingGenderChangeRow>(&sql)
        .bind(user_id)
        .fetch_optional(conn)
        .await
}

pub async fn mark_email_verified(
    conn: &mut SqliteConnection,
    id: &str,
    now: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_MARK_EMAIL_VERIFIED)
        .bind(id)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

pub async fn transition(
    conn: &mut SqliteConnection,
    id: &str,
    from: GenderChangeStatus,
    to: GenderChangeStatus,
    now: DateTime<Utc>,
) -> sqlx::Result<u64> {
    debug_assert!(from.can_transition_to(to));
    let res = sqlx::query(SQL_TRANSITION)
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

pub async fn enter_admin_review(
    conn: &mut SqliteConnection,
    id: &str,
    admin_alert_id: &str,
    now: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_ENTER_ADMIN_REVIEW)
        .bind(id)
        .bind(admin_alert_id)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

pub async fn record_review(
    conn: &mut SqliteConnection,
    id: &str,
    outcome: GenderChangeStatus,
    reviewed_by: &str,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> sqlx::Result<u64> {
    debug_assert!(GenderChangeStatus::AdminReview.can_transition_to(outcome));
    let res = sqlx::query(SQL_RECORD_REVIEW)
        .bind(id)
        .bind(outcome)
        .bind(reviewed_by)
        .bind(notes)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

/// Rejects a request that never reached admin review, recording why.
pub async fn close_unreviewed(
    conn: &mut SqliteConnection,
    id: &str,
    notes: &str,
    now: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_CLOSE_UNREVIEWED)
        .bind(id)
        .bind(notes)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

/// Rejects `pending` requests whose email token has run out.
pub async fn expire_unconfirmed(conn: &mut SqliteConnection, now: DateTime<Utc>) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_EXPIRE_UNCONFIRMED)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

/// Rejects requests waiting for an OTP that no longer exists.
pub async fn expire_without_otp(conn: &mut SqliteConnection, now: DateTime<Utc>) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_EXPIRE_WITHOUT_OTP)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}
