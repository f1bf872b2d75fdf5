//! Discord REST notifier
//!
//! Posts one embed per alert to a channel via `POST /channels/{id}/messages`.
//! Docs: https://discord.com/developers/docs/resources/message#create-message

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER},
    Client, StatusCode,
};
use serde::Deserialize;
use std::time::Duration;

use super::{AlertMessage, DeliveryError, Notifier};
use crate::config::DiscordConfig;

const FOOTER_TEXT: &str = "Liquidity Whale Alert";

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    /// Seconds, fractional
    retry_after: Option<f64>,
}

/// Sends alerts to a single Discord channel as a bot user
pub struct DiscordNotifier {
    client: Client,
    messages_url: String,
}

impl DiscordNotifier {
    pub fn new(config: &DiscordConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bot {}", config.token.trim()))
            .map_err(|_| anyhow::anyhow!("Discord token contains invalid header characters"))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            messages_url: format!(
                "{}/channels/{}/messages",
                config.api_base.trim_end_matches('/'),
                config.channel_id.trim()
            ),
        })
    }

    /// JSON body for a create-message call carrying a single embed
    pub fn embed_payload(message: &AlertMessage) -> serde_json::Value {
        serde_json::json!({
            "embeds": [{
                "title": message.title,
                "description": message.body,
                "color": message.color,
                "timestamp": message.timestamp.to_rfc3339(),
                "footer": { "text": FOOTER_TEXT },
            }],
            "allowed_mentions": { "parse": [] },
        })
    }

    fn parse_retry_after(headers: &HeaderMap, body: &str) -> Option<Duration> {
        let from_body = serde_json::from_str::<RateLimitBody>(body)
            .ok()
            .and_then(|b| b.retry_after);
        let from_header = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok());

        from_body
            .or(from_header)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &'static str {
        "Discord"
    }

    async fn send(&self, message: &AlertMessage) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.messages_url)
            .json(&Self::embed_payload(message))
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DeliveryError::RateLimited {
                retry_after: Self::parse_retry_after(&headers, &body),
            });
        }

        Err(DeliveryError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }
}
