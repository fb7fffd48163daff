use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::warn;

use crate::database::user_repo;

#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub id: String,
}

#[derive(Deserialize)]
struct JwtPayload {
    sub: String,
}

/// Tokens are issued and signature-checked by the auth gateway in front of
/// this service; here only the subject is read.
pub fn subject_from_token(token: &str) -> Option<String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .ok()?;
    let payload = serde_json::from_slice::<JwtPayload>(&payload_bytes).ok()?;
    let sub = payload.sub.trim();
    (!sub.is_empty()).then(|| sub.to_string())
}

fn extract_token(request: &Request) -> Option<String> {
    let headers = request.headers();

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|hv| hv.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get(header::COOKIE)
        .and_then(|hv| hv.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split("; ")
                .find_map(|c| c.strip_prefix("access_token="))
                .map(|t| t.to_string())
        })
}

pub async fn require_auth(
    State(pool): State<SqlitePool>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(user_id) = extract_token(&request).as_deref().and_then(subject_from_token) else {
        return unauthorized();
    };

    let known = match pool.acquire().await {
        Ok(mut conn) => user_repo::load_user(&mut *conn, &user_id).await,
        Err(e) => Err(e),
    };
    match known {
        Ok(Some(_)) => {
            request
                .extensions_mut()
                .insert(AuthenticatedUser { id: user_id });
            next.run(request).await
        }
        Ok(None) => unauthorized(),
        Err(e) => {
            warn!("Auth user lookup failed for {}: {}", user_id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "unauthorized", "message": "Please login" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_for(payload: &str) -> String {
        format!(
            "header.{}.signature",
            general_purpose::URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn reads_subject_from_payload() {
        let token = token_for(r#"{"sub":"user-1","exp":1}"#);
        assert_eq!(subject_from_token(&token).as_deref(), Some("user-1"));
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert_eq!(subject_from_token("not-a-jwt"), None);
        assert_eq!(subject_from_token(&token_for(r#"{"name":"x"}"#)), None);
        assert_eq!(subject_from_token(&token_for(r#"{"sub":"  "}"#)), None);
    }
}
