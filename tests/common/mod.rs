#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use social_graph::database;
use social_graph::models::NotificationKind;
use social_graph::services::delivery_service::CodeDelivery;
use social_graph::services::friendship_service::FriendshipManager;
use social_graph::services::identity_change_service::{IdentityChangeManager, VerificationSettings};
use social_graph::services::notification_service::Notifier;

pub const MAX_ATTEMPTS: i64 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Link { to: String, token: String },
    Code { to: String, code: String },
    Alert { to: String, subject: String },
}

#[derive(Default)]
pub struct RecordingDelivery {
    pub sent: Mutex<Vec<Sent>>,
    pub fail_codes: AtomicBool,
}

impl RecordingDelivery {
    pub fn last_code(&self) -> Option<String> {
        self.sent.lock().unwrap().iter().rev().find_map(|s| match s {
            Sent::Code { code, .. } => Some(code.clone()),
            _ => None,
        })
    }

    pub fn alerts(&self) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|s| matches!(s, Sent::Alert { .. }))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CodeDelivery for RecordingDelivery {
    async fn send_verification_link(&self, destination: &str, token: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(Sent::Link {
            to: destination.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }

    async fn send_verification_code(&self, destination: &str, code: &str) -> anyhow::Result<()> {
        if self.fail_codes.load(Ordering::SeqCst) {
            anyhow::bail!("sms gateway unavailable");
        }
        self.sent.lock().unwrap().push(Sent::Code {
            to: destination.to_string(),
            code: code.to_string(),
        });
        Ok(())
    }

    async fn send_alert_email(
        &self,
        destination: &str,
        subject: &str,
        _body: &str,
    ) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(Sent::Alert {
            to: destination.to_string(),
            subject: subject.to_string(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<(String, NotificationKind, Value)>>,
}

impl RecordingNotifier {
    pub fn kinds_for(&self, user_id: &str) -> Vec<NotificationKind> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _, _)| u == user_id)
            .map(|(_, k, _)| *k)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: &str, kind: NotificationKind, payload: Value) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((user_id.to_string(), kind, payload));
        Ok(())
    }
}

pub struct Harness {
    pub pool: SqlitePool,
    pub delivery: Arc<RecordingDelivery>,
    pub notifier: Arc<RecordingNotifier>,
    pub identity: IdentityChangeManager,
    pub friendships: FriendshipManager,
}

pub async fn harness() -> Harness {
    let pool = database::connect_in_memory().await.unwrap();
    seed_user(&pool, "alice", Some("female"), "member").await;
    seed_user(&pool, "bob", Some("male"), "member").await;
    seed_user(&pool, "root", None, "admin").await;

    let delivery = Arc::new(RecordingDelivery::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let settings = VerificationSettings {
        otp_max_attempts: MAX_ATTEMPTS,
        otp_ttl: Duration::minutes(10),
        token_ttl: Duration::hours(24),
        admin_alert_email: Some("moderation@example.com".to_string()),
    };
    let identity =
        IdentityChangeManager::new(pool.clone(), notifier.clone(), delivery.clone(), settings);
    let friendships = FriendshipManager::new(pool.clone(), notifier.clone());

    Harness {
        pool,
        delivery,
        notifier,
        identity,
        friendships,
    }
}

pub async fn seed_user(pool: &SqlitePool, user_id: &str, gender: Option<&str>, role: &str) {
    sqlx::query(
        "INSERT INTO users (user_id, name, email, gender, role) VALUES (?1, ?1, ?1 || '@example.com', ?2, ?3)",
    )
    .bind(user_id)
    .bind(gender)
    .bind(role)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn user_gender(pool: &SqlitePool, user_id: &str) -> Option<String> {
    sqlx::query_scalar("SELECT gender FROM users WHERE user_id = ?1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn otp_attempts(pool: &SqlitePool, request_id: &str) -> Option<i64> {
    sqlx::query_scalar("SELECT attempts FROM temp_gender_verifications WHERE pending_change_id = ?1")
        .bind(request_id)
        .fetch_optional(pool)
        .await
        .unwrap()
}
