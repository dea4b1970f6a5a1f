use anyhow::Context;
use axum::async_trait;
use serde::Serialize;
use tracing::info;
use url::Url;

use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

/// Local dev notifier: logs the message instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.html_body,
            "email send stub"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Delivers through an HTTP mail relay that accepts a JSON message.
#[derive(Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    from: String,
}

impl HttpNotifier {
    pub fn new(endpoint: Url, api_key: Option<String>, from: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build mail http client")?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        let mut req = self.client.post(self.endpoint.clone()).json(&RelayPayload {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html_body,
        });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send()
            .await
            .context("mail relay request")?
            .error_for_status()
            .context("mail relay response")?;
        Ok(())
    }
}

/// Pick the relay when one is configured, otherwise log messages.
pub fn from_config(cfg: &MailConfig) -> anyhow::Result<std::sync::Arc<dyn Notifier>> {
    match &cfg.api_url {
        Some(api_url) => {
            let endpoint = Url::parse(api_url).context("parse MAIL_API_URL")?;
            info!(endpoint = %endpoint, "mail relay notifier enabled");
            Ok(std::sync::Arc::new(HttpNotifier::new(
                endpoint,
                cfg.api_key.clone(),
                cfg.from.clone(),
            )?))
        }
        None => {
            info!("MAIL_API_URL not set; emails will only be logged");
            Ok(std::sync::Arc::new(LogNotifier))
        }
    }
}
