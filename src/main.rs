use anyhow::Context;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use social_graph::config::AppConfig;
use social_graph::database;
use social_graph::services::friendship_service::FriendshipManager;
use social_graph::services::identity_change_service::{IdentityChangeManager, VerificationSettings};
use social_graph::services::notification_service::DbNotifier;
use social_graph::services::{delivery_service, sweep_service};
use social_graph::web::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // 1. Logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    // 2. Database
    info!("Connecting to database: {}", config.database_url);
    let pool = database::connect(&config.database_url)
        .await
        .context("could not open database")?;

    // 3. Collaborators, created once and shared by reference
    let notifier = Arc::new(DbNotifier::new(pool.clone()));
    let delivery = delivery_service::from_config(&config);
    if config.mail_api_url.is_none() {
        warn!("MAIL_API_URL not set, verification emails are only logged");
    }

    let settings = VerificationSettings::from_config(&config);
    info!(
        "OTP policy: max_attempts={}, ttl={}s, link ttl={}s",
        settings.otp_max_attempts,
        settings.otp_ttl.num_seconds(),
        settings.token_ttl.num_seconds()
    );

    let state = AppState {
        pool: pool.clone(),
        friendships: Arc::new(FriendshipManager::new(pool.clone(), notifier.clone())),
        identity: Arc::new(IdentityChangeManager::new(
            pool.clone(),
            notifier,
            delivery,
            settings,
        )),
    };

    // 4. Background expiry sweep
    sweep_service::spawn_sweeper(pool, Duration::from_secs(config.sweep_interval_secs));

    let app = web::router(state);

    // 5. Serve (with fallback port)
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("could not parse host/port")?;

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            let fallback: SocketAddr = format!("{}:{}", config.host, config.port + 1)
                .parse()
                .context("could not parse fallback host/port")?;
            warn!("⚠️  Could not bind {}: {}. Trying fallback {}", addr, e, fallback);
            tokio::net::TcpListener::bind(fallback)
                .await
                .context("could not bind fallback port")?
        }
    };

    info!("🚀 Server running on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
