use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FriendRequest,
    FriendRequestAccepted,
    IdentityChangeReviewRequired,
    IdentityChangeApproved,
    IdentityChangeRejected,
    IdentityChangeRequiresInfo,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::FriendRequest => "friend_request",
            NotificationKind::FriendRequestAccepted => "friend_request_accepted",
            NotificationKind::IdentityChangeReviewRequired => "identity_change_review_required",
            NotificationKind::IdentityChangeApproved => "identity_change_approved",
            NotificationKind::IdentityChangeRejected => "identity_change_rejected",
            NotificationKind::IdentityChangeRequiresInfo => "identity_change_requires_info",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub event_type: NotificationKind,
    pub payload: String, // JSON
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
