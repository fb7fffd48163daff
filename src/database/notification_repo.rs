use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::{NotificationKind, NotificationRow};

pub struct NewNotification<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub event_type: NotificationKind,
    pub payload: &'a str,
    pub created_at: DateTime<Utc>,
}

const SQL_INSERT_NOTIFICATION: &str = r#"
INSERT INTO notifications (
  id,
  user_id,
  event_type,
  payload,
  is_read,
  created_at
) VALUES (?1, ?2, ?3, ?4, 0, ?5)
"#;

const SQL_LIST_FOR_USER: &str = r#"
SELECT id, user_id, event_type, payload, is_read, created_at
FROM notifications
WHERE user_id = ?1
ORDER BY created_at DESC
LIMIT ?2
"#;

const SQL_MARK_READ: &str = r#"
UPDATE notifications
SET is_read = 1
WHERE id = ?1
  AND user_id = ?2
"#;

pub async fn insert_notification(
    pool: &SqlitePool,
    new: NewNotification<'_>,
) -> sqlx::Result<()> {
    sqlx::query(SQL_INSERT_NOTIFICATION)
        .bind(new.id)
        .bind(new.user_id)
        .bind(new.event_type)
        .bind(new.payload)
        .bind(new.created_at)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: &str,
    limit: i64,
) -> sqlx::Result<Vec<NotificationRow>> {
    sqlx::query_as::<_, NotificationRow>(SQL_LIST_FOR_USER)
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
}

pub async fn mark_read(pool: &SqlitePool, notification_id: &str, user_id: &str) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_MARK_READ)
        .bind(notification_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}
