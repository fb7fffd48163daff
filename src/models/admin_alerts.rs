use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    GenderChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Approved,
    Rejected,
    Flagged,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdminAlertRow {
    pub id: String,
    pub user_id: String,
    pub alert_type: AlertType,
    pub details: String, // JSON
    pub status: AlertStatus,
    pub reviewed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}
