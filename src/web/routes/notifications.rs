use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::error::ServiceError;
use crate::models::NotificationRow;
use crate::services::notification_service;
use crate::web::middleware::auth::AuthenticatedUser;

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub limit: Option<i64>,
}

pub async fn list_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(pool): State<SqlitePool>,
    Query(q): Query<ListNotificationsQuery>,
) -> Result<Json<Vec<NotificationRow>>, ServiceError> {
    let rows =
        notification_service::list_notifications(&pool, &auth_user.id, q.limit.unwrap_or(50))
            .await?;
    Ok(Json(rows))
}

pub async fn mark_read_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(notification_id): Path<String>,
    State(pool): State<SqlitePool>,
) -> Result<StatusCode, ServiceError> {
    notification_service::mark_notification_read(&pool, &notification_id, &auth_user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
