//! In-process Change Subscribers
//!
//! After a change commits, the recorder hands its [`DomainChangeEvent`] to an
//! ordered list of subscribers, invoked synchronously on the request task.
//! Subscribers must not block; anything slow belongs in the outbox relay.

use std::sync::Arc;

use stratus_core::DomainChangeEvent;

use crate::telemetry::with_metrics;

/// Observer of committed changes.
pub trait ChangeSubscriber: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    fn on_change(&self, event: &DomainChangeEvent);
}

/// Ordered subscriber list, fixed at composition time.
#[derive(Clone, Default)]
pub struct ChangeSubscribers {
    subscribers: Vec<Arc<dyn ChangeSubscriber>>,
}

impl ChangeSubscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subscriber; it runs after every subscriber already added.
    pub fn with(mut self, subscriber: Arc<dyn ChangeSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Logging and metrics subscribers, in that order.
    pub fn standard() -> Self {
        Self::new()
            .with(Arc::new(LoggingSubscriber))
            .with(Arc::new(MetricsSubscriber))
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver `event` to every subscriber in registration order.
    pub fn publish(&self, event: &DomainChangeEvent) {
        for subscriber in &self.subscribers {
            tracing::trace!(
                subscriber = subscriber.name(),
                event_id = %event.event_id,
                "Delivering change event"
            );
            subscriber.on_change(event);
        }
    }
}

/// Writes one structured line per committed change.
#[derive(Debug, Default)]
pub struct LoggingSubscriber;

impl ChangeSubscriber for LoggingSubscriber {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn on_change(&self, event: &DomainChangeEvent) {
        tracing::info!(
            event_id = %event.event_id,
            kind = %event.kind,
            tenant_id = %event.tenant_id,
            entity_kind = %event.entity.kind,
            entity_id = %event.entity.id,
            outbox_id = %event.outbox_id,
            "Change committed"
        );
    }
}

/// Counts committed changes by kind.
#[derive(Debug, Default)]
pub struct MetricsSubscriber;

impl ChangeSubscriber for MetricsSubscriber {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn on_change(&self, event: &DomainChangeEvent) {
        with_metrics(|m| m.record_change(event.kind.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use stratus_core::{ChangeKind, EntityKind, EntityRef, OutboxRecord, TenantId};
    use uuid::Uuid;

    struct Tagging {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ChangeSubscriber for Tagging {
        fn name(&self) -> &'static str {
            self.tag
        }

        fn on_change(&self, _event: &DomainChangeEvent) {
            self.log
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(self.tag);
        }
    }

    #[test]
    fn test_subscribers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let subscribers = ChangeSubscribers::new()
            .with(Arc::new(Tagging { tag: "first", log: Arc::clone(&log) }))
            .with(Arc::new(Tagging { tag: "second", log: Arc::clone(&log) }))
            .with(Arc::new(LoggingSubscriber));

        let record = OutboxRecord::pending(
            ChangeKind::UserCreated,
            &serde_json::json!({}),
            chrono::Utc::now(),
        )
        .expect("payload should serialize");
        let event = DomainChangeEvent::committed(
            ChangeKind::UserCreated,
            TenantId::now_v7(),
            EntityRef {
                kind: EntityKind::User,
                id: Uuid::now_v7(),
            },
            &record,
        );

        subscribers.publish(&event);
        subscribers.publish(&event);

        let seen = log.lock().unwrap_or_else(|e| e.into_inner()).clone();
        assert_eq!(seen, vec!["first", "second", "first", "second"]);
        assert_eq!(subscribers.len(), 3);
    }
}
