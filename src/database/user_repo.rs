use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::models::{Gender, UsersRow};

pub const SQL_LOAD_USER: &str = r#"
SELECT
    user_id,
    name,
    email,
    gender,
    role
FROM users
WHERE user_id = ?1
  AND (is_deleted = 0 OR is_deleted IS NULL)
LIMIT 1
"#;

const SQL_UPDATE_GENDER: &str = r#"
UPDATE users
SET gender = ?2,
    updated_at = ?3
WHERE user_id = ?1
  AND (is_deleted = 0 OR is_deleted IS NULL)
"#;

const SQL_LIST_ADMIN_IDS: &str = r#"
SELECT user_id
FROM users
WHERE role = 'admin'
  AND (is_deleted = 0 OR is_deleted IS NULL)
"#;

pub async fn load_user(conn: &mut SqliteConnection, user_id: &str) -> sqlx::Result<Option<UsersRow>> {
    sqlx::query_as::<_, UsersRow>(SQL_LOAD_USER)
        .bind(user_id)
        .fetch_optional(conn)
        .await
}

pub async fn update_gender(
    conn: &mut SqliteConnection,
    user_id: &str,
    gender: Gender,
    now: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_UPDATE_GENDER)
        .bind(user_id)
        .bind(gender)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

pub async fn list_admin_ids(pool: &SqlitePool) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar::<_, String>(SQL_LIST_ADMIN_IDS)
        .fetch_all(pool)
        .await
}
