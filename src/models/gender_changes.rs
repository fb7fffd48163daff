use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AlertStatus, Gender};

/// Lifecycle of a protected gender change.
///
/// `pending → email_verified → otp_pending → admin_review → {approved | rejected | requires_info}`
///
/// `email_verified` means the emailed token was confirmed and an OTP was issued;
/// `otp_pending` means that OTP reached the delivery service and awaits entry.
/// An OTP may be entered from either state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GenderChangeStatus {
    Pending,
    EmailVerified,
    OtpPending,
    AdminReview,
    Approved,
    Rejected,
    RequiresInfo,
}

impl GenderChangeStatus {
    pub const OPEN: [GenderChangeStatus; 4] = [
        GenderChangeStatus::Pending,
        GenderChangeStatus::EmailVerified,
        GenderChangeStatus::OtpPending,
        GenderChangeStatus::AdminReview,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GenderChangeStatus::Pending => "pending",
            GenderChangeStatus::EmailVerified => "email_verified",
            GenderChangeStatus::OtpPending => "otp_pending",
            GenderChangeStatus::AdminReview => "admin_review",
            GenderChangeStatus::Approved => "approved",
            GenderChangeStatus::Rejected => "rejected",
            GenderChangeStatus::RequiresInfo => "requires_info",
        }
    }

    /// An open request blocks the user from starting another one.
    pub fn is_open(self) -> bool {
        Self::OPEN.contains(&self)
    }

    /// Whether an OTP may currently be entered or re-issued.
    pub fn accepts_otp(self) -> bool {
        matches!(
            self,
            GenderChangeStatus::EmailVerified | GenderChangeStatus::OtpPending
        )
    }

    pub fn can_transition_to(self, next: GenderChangeStatus) -> bool {
        use GenderChangeStatus::*;
        match (self, next) {
            (Pending, EmailVerified) => true,
            (EmailVerified, OtpPending) => true,
            (EmailVerified, AdminReview) | (OtpPending, AdminReview) => true,
            (AdminReview, Approved) | (AdminReview, Rejected) | (AdminReview, RequiresInfo) => {
                true
            }
            // expiry sweep
            (Pending, Rejected) | (EmailVerified, Rejected) | (OtpPending, Rejected) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
    RequiresInfo,
}

impl ReviewDecision {
    /// Resulting request status and alert status.
    pub fn outcome(self) -> (GenderChangeStatus, AlertStatus) {
        match self {
            ReviewDecision::Approve => (GenderChangeStatus::Approved, AlertStatus::Approved),
            ReviewDecision::Reject => (GenderChangeStatus::Rejected, AlertStatus::Rejected),
            ReviewDecision::RequiresInfo => {
                (GenderChangeStatus::RequiresInfo, AlertStatus::Flagged)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PendingGenderChangeRow {
    pub id: String,
    pub user_id: String,
    pub requested_gender: Gender,
    pub current_gender: Option<Gender>,
    #[serde(skip_serializing)]
    pub verification_token: String,
    #[serde(skip_serializing)]
    pub token_expires_at: DateTime<Utc>,
    pub is_email_verified: bool,
    pub status: GenderChangeStatus,
    pub reviewed_by: Option<String>,
    pub review_notes: Option<String>,
    pub admin_alert_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TempGenderVerificationRow {
    pub id: String,
    pub user_id: String,
    pub pending_change_id: String,
    pub otp_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
}
