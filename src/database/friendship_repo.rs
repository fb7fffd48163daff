use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::models::{FriendsRow, FriendshipStatus};

pub struct NewFriendship<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub friend_id: &'a str,
    pub created_at: DateTime<Utc>,
}

const SQL_INSERT_FRIENDSHIP: &str = r#"
INSERT INTO friendships (
  id,
  user_id,
  friend_id,
  status,
  action_user_id,
  accepted_at,
  created_at,
  updated_at,
  deleted_at
) VALUES (?1, ?2, ?3, 'pending', ?2, NULL, ?4, ?4, NULL)
"#;

const SQL_FIND_LIVE_BETWEEN: &str = r#"
SELECT id, user_id, friend_id, status, action_user_id, accepted_at, created_at, updated_at, deleted_at
FROM friendships
WHERE ((user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1))
  AND deleted_at IS NULL
LIMIT 1
"#;

const SQL_FIND_LIVE_BY_ID: &str = r#"
SELECT id, user_id, friend_id, status, action_user_id, accepted_at, created_at, updated_at, deleted_at
FROM friendships
WHERE id = ?1
  AND deleted_at IS NULL
LIMIT 1
"#;

const SQL_RESOLVE_PENDING: &str = r#"
UPDATE friendships
SET status = ?2,
    action_user_id = ?3,
    accepted_at = ?4,
    updated_at = ?5
WHERE id = ?1
  AND status = 'pending'
  AND deleted_at IS NULL
"#;

const SQL_SOFT_DELETE_IF_STATUS: &str = r#"
UPDATE friendships
SET deleted_at = ?3,
    action_user_id = ?4,
    updated_at = ?3
WHERE id = ?1
  AND status = ?2
  AND deleted_at IS NULL
"#;

const SQL_LIST_ACCEPTED_FOR_USER: &str = r#"
SELECT id, user_id, friend_id, status, action_user_id, accepted_at, created_at, updated_at, deleted_at
FROM friendships
WHERE (user_id = ?1 OR friend_id = ?1)
  AND status = 'accepted'
  AND deleted_at IS NULL
ORDER BY accepted_at DESC
"#;

const SQL_LIST_INCOMING_PENDING: &str = r#"
SELECT id, user_id, friend_id, status, action_user_id, accepted_at, created_at, updated_at, deleted_at
FROM friendships
WHERE friend_id = ?1
  AND status = 'pending'
  AND deleted_at IS NULL
ORDER BY created_at DESC
"#;

pub async fn insert_friendship(
    conn: &mut SqliteConnection,
    new: NewFriendship<'_>,
) -> sqlx::Result<()> {
    sqlx::query(SQL_INSERT_FRIENDSHIP)
        .bind(new.id)
        .bind(new.user_id)
        .bind(new.friend_id)
        .bind(new.created_at)
        .execute(conn)
        .await?;
    Ok(())
}

/// Looks up the live record for the unordered pair, in either storage order.
pub async fn find_live_between(
    conn: &mut SqliteConnection,
    a: &str,
    b: &str,
) -> sqlx::Result<Option<FriendsRow>> {
    sqlx::query_as::<_, FriendsRow>(SQL_FIND_LIVE_BETWEEN)
        .bind(a)
        .bind(b)
        .fetch_optional(conn)
        .await
}

pub async fn find_live_by_id(
    conn: &mut SqliteConnection,
    friendship_id: &str,
) -> sqlx::Result<Option<FriendsRow>> {
    sqlx::query_as::<_, FriendsRow>(SQL_FIND_LIVE_BY_ID)
        .bind(friendship_id)
        .fetch_optional(conn)
        .await
}

/// Moves a still-pending record to `status`. Returns affected rows (0 when it
/// was resolved concurrently).
pub async fn resolve_pending(
    conn: &mut SqliteConnection,
    friendship_id: &str,
    status: FriendshipStatus,
    action_user_id: &str,
    accepted_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_RESOLVE_PENDING)
        .bind(friendship_id)
        .bind(status)
        .bind(action_user_id)
        .bind(accepted_at)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

pub async fn soft_delete_if_status(
    conn: &mut SqliteConnection,
    friendship_id: &str,
    expected: FriendshipStatus,
    action_user_id: &str,
    now: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_SOFT_DELETE_IF_STATUS)
        .bind(friendship_id)
        .bind(expected)
        .bind(now)
        .bind(action_user_id)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

pub async fn list_accepted_for_user(
    pool: &SqlitePool,
    user_id: &str,
) -> sqlx::Result<Vec<FriendsRow>> {
    sqlx::query_as::<_, FriendsRow>(SQL_LIST_ACCEPTED_FOR_USER)
        .bind(user_id)
        .fetch_all(pool)
        .await
}

pub async fn list_incoming_pending(
    pool: &SqlitePool,
    user_id: &str,
) -> sqlx::Result<Vec<FriendsRow>> {
    sqlx::query_as::<_, FriendsRow>(SQL_LIST_INCOMING_PENDING)
        .bind(user_id)
        .fetch_all(pool)
        .await
}
