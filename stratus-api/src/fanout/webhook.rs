//! Integration event publisher over signed webhooks.
//!
//! Each event is POSTed as JSON with an HMAC-SHA256 signature of the body in
//! `X-Stratus-Signature: sha256=<hex>`. The delivery id is the outbox record
//! id, so a consumer can drop the duplicates a relay retry produces.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use stratus_core::{FanoutError, IntegrationEvent, MessagePublisher};

use super::search::{rejection, transport_error};
use crate::constants::SIGNATURE_HEADER;

const TARGET: &str = "webhook";

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `payload` under `secret`.
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String, FanoutError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
        FanoutError::Payload {
            reason: format!("Failed to initialize HMAC: {}", e),
        }
    })?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a `sha256=<hex>` header value against `payload`, in constant time.
pub fn verify_signature(payload: &[u8], secret: &str, header: &str) -> bool {
    let Some(hex_sig) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

pub struct WebhookPublisher {
    client: reqwest::Client,
    url: String,
    secret: String,
}

impl WebhookPublisher {
    pub fn new(client: reqwest::Client, url: &str, secret: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            secret: secret.to_string(),
        }
    }
}

#[async_trait]
impl MessagePublisher for WebhookPublisher {
    async fn publish(&self, event: &IntegrationEvent) -> Result<(), FanoutError> {
        let body = serde_json::to_vec(event).map_err(|e| FanoutError::Payload {
            reason: e.to_string(),
        })?;
        let signature = sign_payload(&body, &self.secret)?;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, format!("sha256={}", signature))
            .header("X-Stratus-Event", event.event_type.as_str())
            .header("X-Stratus-Delivery", event.event_id.to_string())
            .header("User-Agent", "Stratus-Webhook/1.0")
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error(TARGET, e))?;

        if response.status().is_success() {
            tracing::debug!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                status = %response.status(),
                "Integration event delivered"
            );
            Ok(())
        } else {
            Err(rejection(TARGET, response).await)
        }
    }
}
