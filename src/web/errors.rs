use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::error::{ErrorKind, ServiceError};

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Invalid => StatusCode::BAD_REQUEST,
        ErrorKind::Expired => StatusCode::GONE,
        ErrorKind::LockedOut => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        if let ServiceError::Database(e) = &self {
            warn!("Database error while handling request: {}", e);
        }
        (
            status_for(kind),
            Json(serde_json::json!({
                "error": kind.as_str(),
                "message": self.message(),
            })),
        )
            .into_response()
    }
}
