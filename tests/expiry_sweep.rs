mod common;

use chrono::{Duration, Utc};

use common::{harness, otp_attempts};
use social_graph::error::ServiceError;
use social_graph::models::{Gender, GenderChangeStatus};
use social_graph::services::sweep_service::{sweep_expired, SweepReport};

async fn status_of(pool: &sqlx::SqlitePool, id: &str) -> GenderChangeStatus {
    sqlx::query_scalar("SELECT status FROM pending_gender_changes WHERE id = ?1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn sweep_leaves_fresh_requests_alone() {
    let h = harness().await;
    let created = h.identity.create_request("alice", Gender::Male).await.unwrap();
    h.identity
        .confirm_email(&created.verification_token)
        .await
        .unwrap();

    let report = sweep_expired(&h.pool, Utc::now()).await.unwrap();
    assert_eq!(report, SweepReport::default());
    assert_eq!(status_of(&h.pool, &created.id).await, GenderChangeStatus::OtpPending);
}

#[tokio::test]
async fn sweep_expires_stale_codes_and_unconfirmed_requests() {
    let h = harness().await;

    let unconfirmed = h.identity.create_request("bob", Gender::Female).await.unwrap();
    let waiting = h.identity.create_request("alice", Gender::Male).await.unwrap();
    h.identity
        .confirm_email(&waiting.verification_token)
        .await
        .unwrap();

    let later = Utc::now() + Duration::days(2);
    let report = sweep_expired(&h.pool, later).await.unwrap();
    assert_eq!(
        report,
        SweepReport {
            codes_removed: 1,
            unconfirmed_expired: 1,
            unverified_expired: 1,
        }
    );
    assert_eq!(status_of(&h.pool, &unconfirmed.id).await, GenderChangeStatus::Rejected);
    assert_eq!(status_of(&h.pool, &waiting.id).await, GenderChangeStatus::Rejected);
    assert_eq!(otp_attempts(&h.pool, &waiting.id).await, None);

    // a second pass finds nothing left to do
    let again = sweep_expired(&h.pool, later).await.unwrap();
    assert!(again.is_empty());

    // the flow has to be restarted
    let err = h
        .identity
        .verify_otp(&waiting.id, "alice", "123456")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
    h.identity.create_request("alice", Gender::Male).await.unwrap();
}

#[tokio::test]
async fn sweep_does_not_touch_requests_under_review() {
    let h = harness().await;
    let created = h.identity.create_request("alice", Gender::Male).await.unwrap();
    h.identity
        .confirm_email(&created.verification_token)
        .await
        .unwrap();
    let code = h.delivery.last_code().unwrap();
    h.identity
        .verify_otp(&created.id, "alice", &code)
        .await
        .unwrap();

    let report = sweep_expired(&h.pool, Utc::now() + Duration::days(30)).await.unwrap();
    assert!(report.is_empty());
    assert_eq!(status_of(&h.pool, &created.id).await, GenderChangeStatus::AdminReview);
}
