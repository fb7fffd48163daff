use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::models::TempGenderVerificationRow;

pub struct NewOtp<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub pending_change_id: &'a str,
    pub otp_hash: &'a str,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// A re-issued code keeps the attempt counter of the one it replaces.
const SQL_UPSERT_OTP: &str = r#"
INSERT INTO temp_gender_verifications (
  id,
  user_id,
  pending_change_id,
  otp_hash,
  expires_at,
  attempts,
  created_at
) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
ON CONFLICT (pending_change_id) DO UPDATE SET
  otp_hash = excluded.otp_hash,
  expires_at = excluded.expires_at,
  created_at = excluded.created_at
"#;

const SQL_FIND_FOR_CHANGE: &str = r#"
SELECT id, user_id, pending_change_id, otp_hash, expires_at, attempts, created_at
FROM temp_gender_verifications
WHERE pending_change_id = ?1
LIMIT 1
"#;

const SQL_INCREMENT_ATTEMPTS: &str = r#"
UPDATE temp_gender_verifications
SET attempts = attempts + 1
WHERE id = ?1
"#;

const SQL_DELETE_FOR_CHANGE: &str = r#"
DELETE FROM temp_gender_verifications
WHERE pending_change_id = ?1
"#;

const SQL_DELETE_EXPIRED: &str = r#"
DELETE FROM temp_gender_verifications
WHERE expires_at < ?1
"#;

pub async fn upsert_otp(conn: &mut SqliteConnection, new: NewOtp<'_>) -> sqlx::Result<()> {
    sqlx::query(SQL_UPSERT_OTP)
        .bind(new.id)
        .bind(new.user_id)
        .bind(new.pending_change_id)
        .bind(new.otp_hash)
        .bind(new.expires_at)
        .bind(new.created_at)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn find_for_change(
    conn: &mut SqliteConnection,
    pending_change_id: &str,
) -> sqlx::Result<Option<TempGenderVerificationRow>> {
    sqlx::query_as::<_, TempGenderVerificationRow>(SQL_FIND_FOR_CHANGE)
        .bind(pending_change_id)
        .fetch_optional(conn)
        .await
}

pub async fn increment_attempts(conn: &mut SqliteConnection, otp_id: &str) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_INCREMENT_ATTEMPTS)
        .bind(otp_id)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

pub async fn delete_for_change(
    conn: &mut SqliteConnection,
    pending_change_id: &str,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_DELETE_FOR_CHANGE)
        .bind(pending_change_id)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

pub async fn delete_expired(conn: &mut SqliteConnection, now: DateTime<Utc>) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_DELETE_EXPIRED)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}
