use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::database::{friendship_repo, user_repo};
use crate::error::{conflict_on_unique, ServiceError, ServiceResult};
use crate::models::{FriendDecision, FriendsRow, FriendshipStatus, NotificationKind};
use crate::services::notification_service::{dispatch_notification, Notifier};

#[derive(Debug, Clone, Serialize)]
pub struct FriendView {
    pub friendship_id: String,
    pub friend_id: String,
    pub accepted_at: Option<DateTime<Utc>>,
}

/// Friend-request lifecycle over the `friendships` table.
///
/// Every pair of users has at most one live record. The initiator is stored
/// as `user_id`; only the addressee (`friend_id`) can answer a request.
pub struct FriendshipManager {
    pool: SqlitePool,
    notifier: Arc<dyn Notifier>,
}

impl FriendshipManager {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn Notifier>) -> Self {
        Self { pool, notifier }
    }

    /// Opens a pending request from `user_id` to `friend_id`.
    ///
    /// Any live record for the pair, in either direction, is a Conflict. A
    /// rejected or blocked record stays live and is never cleared, so the pair
    /// cannot be requested again. Only `unfriend` and `cancel_request` free it.
    pub async fn request_friend(&self, user_id: &str, friend_id: &str) -> ServiceResult<FriendsRow> {
        let user_id = user_id.trim();
        let friend_id = friend_id.trim();
        if user_id.is_empty() || friend_id.is_empty() {
            return Err(ServiceError::invalid("user ids must not be empty"));
        }
        if user_id == friend_id {
            return Err(ServiceError::conflict("cannot send a friend request to yourself"));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for id in [user_id, friend_id] {
            if user_repo::load_user(&mut *tx, id).await?.is_none() {
                return Err(ServiceError::not_found(format!("user {} not found", id)));
            }
        }

        if let Some(existing) = friendship_repo::find_live_between(&mut *tx, user_id, friend_id).await? {
            return Err(ServiceError::conflict(format!(
                "a {} friendship already exists between these users",
                existing.status.as_str()
            )));
        }

        let id = Uuid::new_v4().to_string();
        friendship_repo::insert_friendship(
            &mut *tx,
            friendship_repo::NewFriendship {
                id: &id,
                user_id,
                friend_id,
                created_at: now,
            },
        )
        .await
        .map_err(|e| conflict_on_unique(e, "a friendship already exists between these users"))?;

        let row = friendship_repo::find_live_by_id(&mut *tx, &id)
            .await?
            .ok_or(ServiceError::Database(sqlx::Error::RowNotFound))?;
        tx.commit().await?;

        info!(friendship_id = %id, from = %user_id, to = %friend_id, "friend request created");
        dispatch_notification(
            self.notifier.as_ref(),
            friend_id,
            NotificationKind::FriendRequest,
            serde_json::json!({ "friendship_id": id, "from_user_id": user_id }),
        )
        .await;

        Ok(row)
    }

    pub async fn respond_to_request(
        &self,
        friendship_id: &str,
        responder_id: &str,
        decision: FriendDecision,
    ) -> ServiceResult<FriendsRow> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let row = friendship_repo::find_live_by_id(&mut *tx, friendship_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("friend request not found"))?;

        if row.user_id == responder_id {
            return Err(ServiceError::forbidden(
                "only the addressed user can answer a friend request",
            ));
        }
        if row.friend_id != responder_id {
            return Err(ServiceError::forbidden("not a party to this friendship"));
        }
        if row.status != FriendshipStatus::Pending {
            return Err(ServiceError::conflict(format!(
                "friend request already {}",
                row.status.as_str()
            )));
        }

        let status = decision.target_status();
        let accepted_at = (decision == FriendDecision::Accept).then_some(now);
        let updated = friendship_repo::resolve_pending(
            &mut *tx,
            friendship_id,
            status,
            responder_id,
            accepted_at,
            now,
        )
        .await?;
        if updated != 1 {
            return Err(ServiceError::conflict("friend request was already answered"));
        }

        let row = friendship_repo::find_live_by_id(&mut *tx, friendship_id)
            .await?
            .ok_or(ServiceError::Database(sqlx::Error::RowNotFound))?;
        tx.commit().await?;

        info!(friendship_id = %friendship_id, status = status.as_str(), "friend request answered");
        if decision == FriendDecision::Accept {
            dispatch_notification(
                self.notifier.as_ref(),
                &row.user_id,
                NotificationKind::FriendRequestAccepted,
                serde_json::json!({ "friendship_id": row.id, "friend_id": row.friend_id }),
            )
            .await;
        }

        Ok(row)
    }

    /// Soft-deletes an accepted friendship; the pair may become friends again later.
    pub async fn unfriend(&self, friendship_id: &str, requester_id: &str) -> ServiceResult<()> {
        self.soft_delete(friendship_id, requester_id, FriendshipStatus::Accepted)
            .await
    }

    /// Withdraws a request that has not been answered yet. Initiator only.
    pub async fn cancel_request(&self, friendship_id: &str, requester_id: &str) -> ServiceResult<()> {
        self.soft_delete(friendship_id, requester_id, FriendshipStatus::Pending)
            .await
    }

    async fn soft_delete(
        &self,
        friendship_id: &str,
        requester_id: &str,
        expected: FriendshipStatus,
    ) -> ServiceResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let row = friendship_repo::find_live_by_id(&mut *tx, friendship_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("friendship not found"))?;

        let allowed = match expected {
            FriendshipStatus::Pending => row.user_id == requester_id,
            _ => row.involves(requester_id),
        };
        if !allowed {
            return Err(ServiceError::forbidden("not allowed to remove this friendship"));
        }
        if row.status != expected {
            return Err(ServiceError::conflict(format!(
                "friendship is {}, expected {}",
                row.status.as_str(),
                expected.as_str()
            )));
        }

        let updated =
            friendship_repo::soft_delete_if_status(&mut *tx, friendship_id, expected, requester_id, now)
                .await?;
        if updated != 1 {
            return Err(ServiceError::conflict("friendship changed concurrently"));
        }
        tx.commit().await?;

        info!(friendship_id = %friendship_id, by = %requester_id, "friendship removed");
        Ok(())
    }

    pub async fn list_friends(&self, user_id: &str) -> ServiceResult<Vec<FriendView>> {
        let rows = friendship_repo::list_accepted_for_user(&self.pool, user_id).await?;
        Ok(rows
            .into_iter()
            .map(|row| FriendView {
                friend_id: row.other_party(user_id).to_string(),
                friendship_id: row.id,
                accepted_at: row.accepted_at,
            })
            .collect())
    }

    pub async fn list_incoming_requests(&self, user_id: &str) -> ServiceResult<Vec<FriendsRow>> {
        let rows = friendship_repo::list_incoming_pending(&self.pool, user_id).await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::services::notification_service::{self, DbNotifier};

    async fn setup() -> (SqlitePool, FriendshipManager) {
        let pool = database::connect_in_memory().await.unwrap();
        for id in ["alice", "bob", "carol"] {
            sqlx::query("INSERT INTO users (user_id, name, email, role) VALUES (?1, ?1, ?1 || '@example.com', 'member')")
                .bind(id)
                .execute(&pool)
                .await
                .unwrap();
        }
        let manager = FriendshipManager::new(pool.clone(), Arc::new(DbNotifier::new(pool.clone())));
        (pool, manager)
    }

    #[tokio::test]
    async fn second_request_for_the_same_pair_conflicts_in_both_orders() {
        let (_pool, manager) = setup().await;
        manager.request_friend("alice", "bob").await.unwrap();

        let same = manager.request_friend("alice", "bob").await.unwrap_err();
        assert!(matches!(same, ServiceError::Conflict(_)));

        let reversed = manager.request_friend("bob", "alice").await.unwrap_err();
        assert!(matches!(reversed, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn self_request_conflicts_and_unknown_target_is_not_found() {
        let (_pool, manager) = setup().await;
        assert!(matches!(
            manager.request_friend("alice", "alice").await.unwrap_err(),
            ServiceError::Conflict(_)
        ));
        assert!(matches!(
            manager.request_friend("alice", "zed").await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn accepting_sets_accepted_at_and_notifies_the_initiator() {
        let (pool, manager) = setup().await;
        let req = manager.request_friend("alice", "bob").await.unwrap();
        assert_eq!(req.status, FriendshipStatus::Pending);
        assert_eq!(req.action_user_id, "alice");
        assert!(req.accepted_at.is_none());

        let row = manager
            .respond_to_request(&req.id, "bob", FriendDecision::Accept)
            .await
            .unwrap();
        assert_eq!(row.status, FriendshipStatus::Accepted);
        assert_eq!(row.action_user_id, "bob");
        assert!(row.accepted_at.is_some());

        let alice_inbox = notification_service::list_notifications(&pool, "alice", 10)
            .await
            .unwrap();
        assert_eq!(alice_inbox[0].event_type, NotificationKind::FriendRequestAccepted);
        let bob_inbox = notification_service::list_notifications(&pool, "bob", 10)
            .await
            .unwrap();
        assert_eq!(bob_inbox[0].event_type, NotificationKind::FriendRequest);
    }

    #[tokio::test]
    async fn rejecting_and_blocking_never_set_accepted_at() {
        let (_pool, manager) = setup().await;
        let first = manager.request_friend("alice", "bob").await.unwrap();
        let rejected = manager
            .respond_to_request(&first.id, "bob", FriendDecision::Reject)
            .await
            .unwrap();
        assert_eq!(rejected.status, FriendshipStatus::Rejected);
        assert!(rejected.accepted_at.is_none());

        let second = manager.request_friend("carol", "bob").await.unwrap();
        let blocked = manager
            .respond_to_request(&second.id, "bob", FriendDecision::Block)
            .await
            .unwrap();
        assert_eq!(blocked.status, FriendshipStatus::Blocked);
        assert!(blocked.accepted_at.is_none());
    }

    #[tokio::test]
    async fn rejected_and_blocked_pairs_stay_closed() {
        let (_pool, manager) = setup().await;
        let first = manager.request_friend("alice", "bob").await.unwrap();
        manager
            .respond_to_request(&first.id, "bob", FriendDecision::Reject)
            .await
            .unwrap();
        for (from, to) in [("alice", "bob"), ("bob", "alice")] {
            let err = manager.request_friend(from, to).await.unwrap_err();
            assert!(matches!(err, ServiceError::Conflict(_)));
        }

        let second = manager.request_friend("carol", "bob").await.unwrap();
        manager
            .respond_to_request(&second.id, "bob", FriendDecision::Block)
            .await
            .unwrap();
        let err = manager.request_friend("carol", "bob").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        let err = manager.cancel_request(&second.id, "carol").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn only_the_addressee_may_respond() {
        let (_pool, manager) = setup().await;
        let req = manager.request_friend("alice", "bob").await.unwrap();

        let by_initiator = manager
            .respond_to_request(&req.id, "alice", FriendDecision::Accept)
            .await
            .unwrap_err();
        assert!(matches!(by_initiator, ServiceError::Forbidden(_)));

        let by_stranger = manager
            .respond_to_request(&req.id, "carol", FriendDecision::Accept)
            .await
            .unwrap_err();
        assert!(matches!(by_stranger, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn answered_requests_cannot_be_answered_again() {
        let (_pool, manager) = setup().await;
        let req = manager.request_friend("alice", "bob").await.unwrap();
        manager
            .respond_to_request(&req.id, "bob", FriendDecision::Accept)
            .await
            .unwrap();

        let again = manager
            .respond_to_request(&req.id, "bob", FriendDecision::Reject)
            .await
            .unwrap_err();
        assert!(matches!(again, ServiceError::Conflict(_)));

        let by_initiator = manager
            .respond_to_request(&req.id, "alice", FriendDecision::Accept)
            .await
            .unwrap_err();
        assert!(matches!(by_initiator, ServiceError::Forbidden(_)));

        let missing = manager
            .respond_to_request("nope", "bob", FriendDecision::Accept)
            .await
            .unwrap_err();
        assert!(matches!(missing, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn unfriend_requires_an_accepted_friendship_between_parties() {
        let (_pool, manager) = setup().await;
        let req = manager.request_friend("alice", "bob").await.unwrap();

        let pending = manager.unfriend(&req.id, "alice").await.unwrap_err();
        assert!(matches!(pending, ServiceError::Conflict(_)));

        manager
            .respond_to_request(&req.id, "bob", FriendDecision::Accept)
            .await
            .unwrap();
        let stranger = manager.unfriend(&req.id, "carol").await.unwrap_err();
        assert!(matches!(stranger, ServiceError::Forbidden(_)));

        manager.unfriend(&req.id, "bob").await.unwrap();
        assert!(manager.list_friends("alice").await.unwrap().is_empty());

        // the pair is free again once the old record is gone
        manager.request_friend("bob", "alice").await.unwrap();
    }

    #[tokio::test]
    async fn cancel_is_reserved_for_the_initiator() {
        let (_pool, manager) = setup().await;
        let req = manager.request_friend("alice", "bob").await.unwrap();

        let by_addressee = manager.cancel_request(&req.id, "bob").await.unwrap_err();
        assert!(matches!(by_addressee, ServiceError::Forbidden(_)));

        manager.cancel_request(&req.id, "alice").await.unwrap();
        assert!(manager.list_incoming_requests("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listings_resolve_the_other_party() {
        let (_pool, manager) = setup().await;
        let ab = manager.request_friend("alice", "bob").await.unwrap();
        manager.request_friend("carol", "alice").await.unwrap();
        manager
            .respond_to_request(&ab.id, "bob", FriendDecision::Accept)
            .await
            .unwrap();

        let friends = manager.list_friends("bob").await.unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].friend_id, "alice");

        let incoming = manager.list_incoming_requests("alice").await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].user_id, "carol");
    }
}
