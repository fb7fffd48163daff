use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ServiceError;
use crate::models::{Gender, PendingGenderChangeRow};
use crate::services::identity_change_service::IdentityChangeManager;
use crate::web::middleware::auth::AuthenticatedUser;

#[derive(Debug, Deserialize)]
pub struct GenderChangeBody {
    pub requested_gender: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpBody {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmEmailQuery {
    pub token: String,
}

pub async fn create_request_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(manager): State<Arc<IdentityChangeManager>>,
    Json(body): Json<GenderChangeBody>,
) -> Result<(StatusCode, Json<PendingGenderChangeRow>), ServiceError> {
    let requested: Gender = body
        .requested_gender
        .parse()
        .map_err(|e: crate::models::users::UnknownGender| ServiceError::invalid(e.to_string()))?;
    let row = manager.create_request(&auth_user.id, requested).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn current_request_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(manager): State<Arc<IdentityChangeManager>>,
) -> Result<Json<PendingGenderChangeRow>, ServiceError> {
    manager
        .current_request(&auth_user.id)
        .await?
        .map(Json)
        .ok_or_else(|| ServiceError::not_found("no change request in progress"))
}

/// Target of the emailed link; the token is the credential.
pub async fn confirm_email_handler(
    State(manager): State<Arc<IdentityChangeManager>>,
    Query(q): Query<ConfirmEmailQuery>,
) -> Result<Json<PendingGenderChangeRow>, ServiceError> {
    Ok(Json(manager.confirm_email(&q.token).await?))
}

pub async fn verify_otp_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(request_id): Path<String>,
    State(manager): State<Arc<IdentityChangeManager>>,
    Json(body): Json<OtpBody>,
) -> Result<Json<PendingGenderChangeRow>, ServiceError> {
    let row = manager
        .verify_otp(&request_id, &auth_user.id, &body.code)
        .await?;
    Ok(Json(row))
}

pub async fn resend_otp_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(request_id): Path<String>,
    State(manager): State<Arc<IdentityChangeManager>>,
) -> Result<StatusCode, ServiceError> {
    manager.resend_otp(&request_id, &auth_user.id).await?;
    Ok(StatusCode::ACCEPTED)
}
