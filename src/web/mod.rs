pub mod errors;
pub mod middleware;
pub mod routes;

use axum::{
    extract::FromRef,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Json, Router,
};
use http::header::{HeaderValue, CACHE_CONTROL};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::services::friendship_service::FriendshipManager;
use crate::services::identity_change_service::IdentityChangeManager;
use self::middleware::auth as auth_middleware;
use self::routes::{admin, friendships, identity, notifications};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub friendships: Arc<FriendshipManager>,
    pub identity: Arc<IdentityChangeManager>,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<FriendshipManager> {
    fn from_ref(state: &AppState) -> Self {
        state.friendships.clone()
    }
}

impl FromRef<AppState> for Arc<IdentityChangeManager> {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/api/friendships",
            get(friendships::list_friends_handler).post(friendships::request_friend_handler),
        )
        .route(
            "/api/friendships/requests",
            get(friendships::incoming_requests_handler),
        )
        .route(
            "/api/friendships/:friendship_id",
            delete(friendships::unfriend_handler),
        )
        .route(
            "/api/friendships/:friendship_id/respond",
            post(friendships::respond_handler),
        )
        .route(
            "/api/friendships/:friendship_id/cancel",
            post(friendships::cancel_handler),
        )
        .route(
            "/api/identity/gender-changes",
            post(identity::create_request_handler),
        )
        .route(
            "/api/identity/gender-changes/current",
            get(identity::current_request_handler),
        )
        .route(
            "/api/identity/gender-changes/:request_id/otp",
            post(identity::verify_otp_handler),
        )
        .route(
            "/api/identity/gender-changes/:request_id/otp/resend",
            post(identity::resend_otp_handler),
        )
        .route("/api/admin/alerts", get(admin::list_alerts_handler))
        .route(
            "/api/admin/alerts/:alert_id/review",
            post(admin::review_handler),
        )
        .route("/api/notifications", get(notifications::list_handler))
        .route(
            "/api/notifications/:notification_id/read",
            post(notifications::mark_read_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.pool.clone(),
            auth_middleware::require_auth,
        ));

    Router::new()
        // Public routes
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({ "status": "ok" })) }),
        )
        .route(
            "/identity/confirm-email",
            get(identity::confirm_email_handler),
        )
        // Protected routes
        .merge(protected_routes)
        // Layers
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CatchPanicLayer::new())
        // State
        .with_state(state)
}
