use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::database::notification_repo;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{NotificationKind, NotificationRow};

/// Fan-out of user-facing events. Delivery is best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        payload: Value,
    ) -> anyhow::Result<()>;
}

/// Stores notifications in the `notifications` table for the client to poll.
pub struct DbNotifier {
    pool: SqlitePool,
}

impl DbNotifier {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Notifier for DbNotifier {
    async fn notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        payload: Value,
    ) -> anyhow::Result<()> {
        let id = Uuid::new_v4().to_string();
        let payload = payload.to_string();
        notification_repo::insert_notification(
            &self.pool,
            notification_repo::NewNotification {
                id: &id,
                user_id,
                event_type: kind,
                payload: &payload,
                created_at: Utc::now(),
            },
        )
        .await?;
        Ok(())
    }
}

/// Sends a notification and logs (never returns) a failure.
pub async fn dispatch_notification(
    notifier: &dyn Notifier,
    user_id: &str,
    kind: NotificationKind,
    payload: Value,
) {
    if let Err(e) = notifier.notify(user_id, kind, payload).await {
        warn!(
            user_id = %user_id,
            kind = kind.as_str(),
            "🔔 Notification dispatch failed: {:#}",
            e
        );
    }
}

pub async fn list_notifications(
    pool: &SqlitePool,
    user_id: &str,
    limit: i64,
) -> ServiceResult<Vec<NotificationRow>> {
    let rows = notification_repo::list_for_user(pool, user_id, limit.clamp(1, 100)).await?;
    Ok(rows)
}

pub async fn mark_notification_read(
    pool: &SqlitePool,
    notification_id: &str,
    user_id: &str,
) -> ServiceResult<()> {
    let updated = notification_repo::mark_read(pool, notification_id, user_id).await?;
    if updated == 0 {
        return Err(ServiceError::not_found("notification not found"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _: &str, _: NotificationKind, _: Value) -> anyhow::Result<()> {
            anyhow::bail!("channel closed")
        }
    }

    #[tokio::test]
    async fn db_notifier_stores_and_lists_per_user() {
        let pool = database::connect_in_memory().await.unwrap();
        let notifier = DbNotifier::new(pool.clone());

        notifier
            .notify(
                "u1",
                NotificationKind::FriendRequest,
                serde_json::json!({ "from_user_id": "u2" }),
            )
            .await
            .unwrap();

        let rows = list_notifications(&pool, "u1", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, NotificationKind::FriendRequest);
        assert!(!rows[0].is_read);
        assert!(list_notifications(&pool, "u2", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_read_is_scoped_to_the_owner() {
        let pool = database::connect_in_memory().await.unwrap();
        DbNotifier::new(pool.clone())
            .notify("u1", NotificationKind::FriendRequestAccepted, Value::Null)
            .await
            .unwrap();
        let id = list_notifications(&pool, "u1", 10).await.unwrap()[0].id.clone();

        let err = mark_notification_read(&pool, &id, "u2").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        mark_notification_read(&pool, &id, "u1").await.unwrap();
        assert!(list_notifications(&pool, "u1", 10).await.unwrap()[0].is_read);
    }

    #[tokio::test]
    async fn dispatch_swallows_failures() {
        dispatch_notification(
            &FailingNotifier,
            "u1",
            NotificationKind::FriendRequest,
            Value::Null,
        )
        .await;
    }
}
