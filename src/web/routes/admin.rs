use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ServiceError;
use crate::models::{AdminAlertRow, PendingGenderChangeRow, ReviewDecision};
use crate::services::identity_change_service::IdentityChangeManager;
use crate::web::middleware::auth::AuthenticatedUser;

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub decision: ReviewDecision, // approve|reject|requires_info
    pub notes: Option<String>,
}

pub async fn list_alerts_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(manager): State<Arc<IdentityChangeManager>>,
    Query(q): Query<AlertsQuery>,
) -> Result<Json<Vec<AdminAlertRow>>, ServiceError> {
    let rows = manager
        .list_pending_alerts(&auth_user.id, q.limit.unwrap_or(50))
        .await?;
    Ok(Json(rows))
}

pub async fn review_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(alert_id): Path<String>,
    State(manager): State<Arc<IdentityChangeManager>>,
    Json(body): Json<ReviewBody>,
) -> Result<Json<PendingGenderChangeRow>, ServiceError> {
    let row = manager
        .review_request(&alert_id, &auth_user.id, body.decision, body.notes.as_deref())
        .await?;
    Ok(Json(row))
}
