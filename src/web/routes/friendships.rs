use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ServiceError;
use crate::models::{FriendDecision, FriendsRow};
use crate::services::friendship_service::{FriendView, FriendshipManager};
use crate::web::middleware::auth::AuthenticatedUser;

#[derive(Debug, Deserialize)]
pub struct FriendRequestBody {
    pub friend_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RespondBody {
    pub decision: FriendDecision, // accept|reject|block
}

pub async fn request_friend_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(manager): State<Arc<FriendshipManager>>,
    Json(body): Json<FriendRequestBody>,
) -> Result<(StatusCode, Json<FriendsRow>), ServiceError> {
    let row = manager
        .request_friend(&auth_user.id, &body.friend_id)
        .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn respond_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(friendship_id): Path<String>,
    State(manager): State<Arc<FriendshipManager>>,
    Json(body): Json<RespondBody>,
) -> Result<Json<FriendsRow>, ServiceError> {
    let row = manager
        .respond_to_request(&friendship_id, &auth_user.id, body.decision)
        .await?;
    Ok(Json(row))
}

pub async fn cancel_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(friendship_id): Path<String>,
    State(manager): State<Arc<FriendshipManager>>,
) -> Result<StatusCode, ServiceError> {
    manager.cancel_request(&friendship_id, &auth_user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unfriend_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(friendship_id): Path<String>,
    State(manager): State<Arc<FriendshipManager>>,
) -> Result<StatusCode, ServiceError> {
    manager.unfriend(&friendship_id, &auth_user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_friends_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(manager): State<Arc<FriendshipManager>>,
) -> Result<Json<Vec<FriendView>>, ServiceError> {
    Ok(Json(manager.list_friends(&auth_user.id).await?))
}

pub async fn incoming_requests_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(manager): State<Arc<FriendshipManager>>,
) -> Result<Json<Vec<FriendsRow>>, ServiceError> {
    Ok(Json(manager.list_incoming_requests(&auth_user.id).await?))
}
