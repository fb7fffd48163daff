use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
    Rejected,
    Blocked,
}

impl FriendshipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FriendshipStatus::Pending => "pending",
            FriendshipStatus::Accepted => "accepted",
            FriendshipStatus::Rejected => "rejected",
            FriendshipStatus::Blocked => "blocked",
        }
    }
}

/// Answer of the addressed user to a pending friend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendDecision {
    Accept,
    Reject,
    Block,
}

impl FriendDecision {
    pub fn target_status(self) -> FriendshipStatus {
        match self {
            FriendDecision::Accept => FriendshipStatus::Accepted,
            FriendDecision::Reject => FriendshipStatus::Rejected,
            FriendDecision::Block => FriendshipStatus::Blocked,
        }
    }
}

/// `user_id` is always the initiator of the request; `friend_id` the addressee.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FriendsRow {
    pub id: String,
    pub user_id: String,
    pub friend_id: String,
    pub status: FriendshipStatus,
    pub action_user_id: String,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FriendsRow {
    pub fn involves(&self, user_id: &str) -> bool {
        self.user_id == user_id || self.friend_id == user_id
    }

    pub fn other_party(&self, user_id: &str) -> &str {
        if self.user_id == user_id {
            &self.friend_id
        } else {
            &self.user_id
        }
    }
}
