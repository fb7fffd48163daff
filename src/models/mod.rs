pub mod admin_alerts;
pub mod friends;
pub mod gender_changes;
pub mod notifications;
pub mod users;

pub use admin_alerts::{AdminAlertRow, AlertStatus, AlertType};
pub use friends::{FriendDecision, FriendsRow, FriendshipStatus};
pub use gender_changes::{
    GenderChangeStatus, PendingGenderChangeRow, ReviewDecision, TempGenderVerificationRow,
};
pub use notifications::{NotificationKind, NotificationRow};
pub use users::{Gender, UserRole, UsersRow};
