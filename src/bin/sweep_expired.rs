use anyhow::Context;
use chrono::Utc;
use dotenvy::dotenv;
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

use social_graph::database;
use social_graph::services::sweep_service;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let db_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = database::connect(&db_url)
        .await
        .context("could not open database")?;

    let report = sweep_service::sweep_expired(&pool, Utc::now())
        .await
        .context("expiry sweep failed")?;
    info!(
        codes_removed = report.codes_removed,
        unconfirmed_expired = report.unconfirmed_expired,
        unverified_expired = report.unverified_expired,
        "expiry sweep finished"
    );
    Ok(())
}
