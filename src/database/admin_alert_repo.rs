use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::models::{AdminAlertRow, AlertStatus, AlertType};

pub struct NewAdminAlert<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub alert_type: AlertType,
    pub details: &'a str,
    pub created_at: DateTime<Utc>,
}

const SQL_INSERT_ALERT: &str = r#"
INSERT INTO admin_alerts (
  id,
  user_id,
  alert_type,
  details,
  status,
  created_at
) VALUES (?1, ?2, ?3, ?4, 'pending', ?5)
"#;

const SQL_FIND_BY_ID: &str = r#"
SELECT id, user_id, alert_type, details, status, reviewed_by, created_at, reviewed_at
FROM admin_alerts
WHERE id = ?1
LIMIT 1
"#;

const SQL_RESOLVE_PENDING: &str = r#"
UPDATE admin_alerts
SET status = ?2,
    reviewed_by = ?3,
    reviewed_at = ?4
WHERE id = ?1
  AND status = 'pending'
"#;

const SQL_LIST_PENDING: &str = r#"
SELECT id, user_id, alert_type, details, status, reviewed_by, created_at, reviewed_at
FROM admin_alerts
WHERE status = 'pending'
ORDER BY created_at ASC
LIMIT ?1
"#;

pub async fn insert_alert(conn: &mut SqliteConnection, new: NewAdminAlert<'_>) -> sqlx::Result<()> {
    sqlx::query(SQL_INSERT_ALERT)
        .bind(new.id)
        .bind(new.user_id)
        .bind(new.alert_type)
        .bind(new.details)
        .bind(new.created_at)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn find_by_id(
    conn: &mut SqliteConnection,
    alert_id: &str,
) -> sqlx::Result<Option<AdminAlertRow>> {
    sqlx::query_as::<_, AdminAlertRow>(SQL_FIND_BY_ID)
        .bind(alert_id)
        .fetch_optional(conn)
        .await
}

pub async fn resolve_pending(
    conn: &mut SqliteConnection,
    alert_id: &str,
    status: AlertStatus,
    reviewed_by: &str,
    now: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_RESOLVE_PENDING)
        .bind(alert_id)
        .bind(status)
        .bind(reviewed_by)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

pub async fn list_pending(pool: &SqlitePool, limit: i64) -> sqlx::Result<Vec<AdminAlertRow>> {
    sqlx::query_as::<_, AdminAlertRow>(SQL_LIST_PENDING)
        .bind(limit)
        .fetch_all(pool)
        .await
}
