use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;

/// Outbound email/SMS used by the verification flow.
#[async_trait]
pub trait CodeDelivery: Send + Sync {
    async fn send_verification_link(&self, destination: &str, token: &str) -> anyhow::Result<()>;

    async fn send_verification_code(&self, destination: &str, code: &str) -> anyhow::Result<()>;

    async fn send_alert_email(
        &self,
        destination: &str,
        subject: &str,
        body: &str,
    ) -> anyhow::Result<()>;
}

/// Posts messages to the mail service behind the local ingress.
pub struct HttpMailer {
    client: reqwest::Client,
    base_url: String,
    host_header: String,
    api_key: Option<String>,
}

impl HttpMailer {
    pub fn new(base_url: String, host_header: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            host_header,
            api_key,
        }
    }

    async fn post_message(
        &self,
        to: &str,
        template: &str,
        subject: &str,
        variables: serde_json::Value,
    ) -> anyhow::Result<()> {
        let url = format!("{}/api/v1/messages", self.base_url.trim_end_matches('/'));

        let mut req = self
            .client
            .post(&url)
            .header("Host", &self.host_header)
            .json(&serde_json::json!({
                "to": to,
                "template": template,
                "subject": subject,
                "variables": variables,
            }));
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("mail upstream returned {} for {}", resp.status(), url);
        }
        Ok(())
    }
}

#[async_trait]
impl CodeDelivery for HttpMailer {
    async fn send_verification_link(&self, destination: &str, token: &str) -> anyhow::Result<()> {
        self.post_message(
            destination,
            "identity_change_confirm",
            "Confirm your profile change",
            serde_json::json!({ "token": token }),
        )
        .await
    }

    async fn send_verification_code(&self, destination: &str, code: &str) -> anyhow::Result<()> {
        self.post_message(
            destination,
            "identity_change_code",
            "Your verification code",
            serde_json::json!({ "code": code }),
        )
        .await
    }

    async fn send_alert_email(
        &self,
        destination: &str,
        subject: &str,
        body: &str,
    ) -> anyhow::Result<()> {
        self.post_message(
            destination,
            "admin_alert",
            subject,
            serde_json::json!({ "body": body }),
        )
        .await
    }
}

/// Local/offline fallback: deliveries only show up in the log.
pub struct LogDelivery;

#[async_trait]
impl CodeDelivery for LogDelivery {
    async fn send_verification_link(&self, destination: &str, token: &str) -> anyhow::Result<()> {
        info!("✉️  verification link for {}: /identity/confirm-email?token={}", destination, token);
        Ok(())
    }

    async fn send_verification_code(&self, destination: &str, code: &str) -> anyhow::Result<()> {
        info!("✉️  verification code for {}: {}", destination, code);
        Ok(())
    }

    async fn send_alert_email(
        &self,
        destination: &str,
        subject: &str,
        body: &str,
    ) -> anyhow::Result<()> {
        info!("✉️  alert for {}: {}: {}", destination, subject, body);
        Ok(())
    }
}

pub fn from_config(config: &AppConfig) -> Arc<dyn CodeDelivery> {
    match &config.mail_api_url {
        Some(url) => Arc::new(HttpMailer::new(
            url.clone(),
            config.mail_service_host.clone(),
            config.mail_api_key.clone(),
        )),
        None => Arc::new(LogDelivery),
    }
}
