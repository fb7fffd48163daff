use anyhow::{Context, Result};
use chrono::Duration;
use std::env;

/// Upper bound for any verification window.
const MAX_TTL_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Failed OTP entries allowed before the code is locked.
    pub otp_max_attempts: i64,
    pub otp_ttl: Duration,
    pub verification_token_ttl: Duration,
    pub sweep_interval_secs: u64,
    /// Upstream mail service. When unset, deliveries are only logged.
    pub mail_api_url: Option<String>,
    pub mail_service_host: String,
    pub mail_api_key: Option<String>,
    /// Receives an email whenever a change is routed to admin review.
    pub admin_alert_email: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_var("PORT", 3000u16)?;

        let otp_max_attempts = parse_var("OTP_MAX_ATTEMPTS", 5i64)?;
        if otp_max_attempts < 1 {
            anyhow::bail!("OTP_MAX_ATTEMPTS must be at least 1");
        }
        let otp_ttl = ttl_from_secs("OTP_TTL_SECS", parse_var("OTP_TTL_SECS", 600i64)?)?;
        let verification_token_ttl = ttl_from_secs(
            "VERIFICATION_TOKEN_TTL_SECS",
            parse_var("VERIFICATION_TOKEN_TTL_SECS", 86_400i64)?,
        )?;
        let sweep_interval_secs = parse_var("SWEEP_INTERVAL_SECS", 300u64)?;
        if sweep_interval_secs == 0 {
            anyhow::bail!("SWEEP_INTERVAL_SECS must be greater than 0");
        }

        let mail_api_url = optional_var("MAIL_API_URL");
        let mail_service_host =
            env::var("MAIL_SERVICE_HOST").unwrap_or_else(|_| "mail.localhost".to_string());
        let mail_api_key = optional_var("MAIL_API_KEY");
        let admin_alert_email = optional_var("ADMIN_ALERT_EMAIL");

        Ok(AppConfig {
            database_url,
            host,
            port,
            otp_max_attempts,
            otp_ttl,
            verification_token_ttl,
            sweep_interval_secs,
            mail_api_url,
            mail_service_host,
            mail_api_key,
            admin_alert_email,
        })
    }
}

fn ttl_from_secs(name: &str, secs: i64) -> Result<Duration> {
    if !(1..=MAX_TTL_SECS).contains(&secs) {
        anyhow::bail!("{} must be between 1 and {} seconds", name, MAX_TTL_SECS);
    }
    Duration::try_seconds(secs).with_context(|| format!("{} is out of range", name))
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} must be a valid number", name)),
        _ => Ok(default),
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_accepts_sane_windows() {
        assert_eq!(ttl_from_secs("OTP_TTL_SECS", 600).unwrap(), Duration::minutes(10));
        assert_eq!(
            ttl_from_secs("OTP_TTL_SECS", MAX_TTL_SECS).unwrap(),
            Duration::days(30)
        );
    }

    #[test]
    fn ttl_rejects_empty_and_huge_windows() {
        assert!(ttl_from_secs("OTP_TTL_SECS", 0).is_err());
        assert!(ttl_from_secs("OTP_TTL_SECS", -5).is_err());
        assert!(ttl_from_secs("VERIFICATION_TOKEN_TTL_SECS", MAX_TTL_SECS + 1).is_err());

        let err = ttl_from_secs("VERIFICATION_TOKEN_TTL_SECS", i64::MAX).unwrap_err();
        assert!(err.to_string().contains("VERIFICATION_TOKEN_TTL_SECS"));
    }
}
