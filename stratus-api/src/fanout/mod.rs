//! Fanout Targets
//!
//! Concrete implementations of the downstream contracts the outbox relay
//! dispatches to:
//!
//! - `search`: [`HttpSearchIndexer`], document upserts over HTTP
//! - `webhook`: [`WebhookPublisher`], HMAC-signed integration events
//! - `realtime`: [`BroadcastNotifier`], in-process channel feeding websockets
//!
//! A target left unconfigured is replaced by a disabled variant that logs and
//! succeeds, so records still drain in development.

pub mod realtime;
pub mod search;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use stratus_core::{
    FanoutError, IntegrationEvent, MessagePublisher, RealtimeNotifier, SearchIndexer, TenantId,
    UserDocument, UserId,
};

use crate::config::FanoutConfig;
use crate::error::{ApiError, ApiResult};

pub use realtime::BroadcastNotifier;
pub use search::HttpSearchIndexer;
pub use webhook::{sign_payload, verify_signature, WebhookPublisher};

/// The three targets one relay dispatches to.
#[derive(Clone)]
pub struct FanoutTargets {
    pub indexer: Arc<dyn SearchIndexer>,
    pub publisher: Arc<dyn MessagePublisher>,
    pub notifier: Arc<dyn RealtimeNotifier>,
}

impl FanoutTargets {
    pub fn new(
        indexer: Arc<dyn SearchIndexer>,
        publisher: Arc<dyn MessagePublisher>,
        notifier: Arc<dyn RealtimeNotifier>,
    ) -> Self {
        Self {
            indexer,
            publisher,
            notifier,
        }
    }

    /// Build HTTP targets from configuration, falling back to disabled ones.
    pub fn from_config(config: &FanoutConfig, notifier: Arc<BroadcastNotifier>) -> ApiResult<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::internal_error(format!("Failed to build HTTP client: {}", e)))?;

        let indexer: Arc<dyn SearchIndexer> = match &config.search_url {
            Some(url) => {
                tracing::info!(url = %url, index = %config.search_index, "Search indexing enabled");
                Arc::new(HttpSearchIndexer::new(client.clone(), url, &config.search_index))
            }
            None => {
                tracing::warn!("STRATUS_SEARCH_URL not set, search indexing disabled");
                Arc::new(DisabledIndexer)
            }
        };

        let publisher: Arc<dyn MessagePublisher> =
            match (&config.webhook_url, &config.webhook_secret) {
                (Some(url), Some(secret)) => {
                    tracing::info!(url = %url, "Integration webhooks enabled");
                    Arc::new(WebhookPublisher::new(client, url, secret))
                }
                _ => {
                    tracing::warn!("STRATUS_WEBHOOK_URL not set, integration events disabled");
                    Arc::new(DisabledPublisher)
                }
            };

        Ok(Self::new(indexer, publisher, notifier))
    }
}

/// Stands in for an unconfigured search index.
#[derive(Debug, Default)]
pub struct DisabledIndexer;

#[async_trait]
impl SearchIndexer for DisabledIndexer {
    async fn index(&self, document: &UserDocument) -> Result<(), FanoutError> {
        tracing::debug!(user_id = %document.id, "Search indexing disabled, skipping index");
        Ok(())
    }

    async fn remove(&self, _tenant_id: TenantId, id: UserId) -> Result<(), FanoutError> {
        tracing::debug!(user_id = %id, "Search indexing disabled, skipping remove");
        Ok(())
    }
}

/// Stands in for an unconfigured message bus.
#[derive(Debug, Default)]
pub struct DisabledPublisher;

#[async_trait]
impl MessagePublisher for DisabledPublisher {
    async fn publish(&self, event: &IntegrationEvent) -> Result<(), FanoutError> {
        tracing::debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            "Integration events disabled, skipping publish"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_from_config_rejects_unsigned_webhook() {
        let config = FanoutConfig {
            webhook_url: Some("http://hooks.internal/events".to_string()),
            ..Default::default()
        };
        let result = FanoutTargets::from_config(&config, Arc::new(BroadcastNotifier::new(4)));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_targets_succeed() {
        let config = FanoutConfig {
            request_timeout: Duration::from_secs(1),
            ..Default::default()
        };
        let targets = FanoutTargets::from_config(&config, Arc::new(BroadcastNotifier::new(4)))
            .expect("targets should build");

        targets
            .indexer
            .remove(TenantId::now_v7(), UserId::now_v7())
            .await
            .expect("disabled remove should succeed");
    }
}
