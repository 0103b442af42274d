//! Realtime notifier over a tokio broadcast channel.
//!
//! The websocket gateway subscribes and forwards each notification to the
//! connected clients of its tenant. With nobody listening a notification is
//! dropped, which is not an error.

use async_trait::async_trait;
use stratus_core::{FanoutError, Notification, RealtimeNotifier};
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    /// `capacity` bounds how far a slow subscriber may lag before it skips.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl RealtimeNotifier for BroadcastNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), FanoutError> {
        match self.tx.send(notification.clone()) {
            Ok(receivers) => {
                tracing::debug!(
                    tenant_id = %notification.tenant_id,
                    subject_id = %notification.subject_id,
                    receivers,
                    "Notification broadcast"
                );
            }
            Err(_) => {
                tracing::debug!(
                    tenant_id = %notification.tenant_id,
                    "No receivers for notification"
                );
            }
        }
        Ok(())
    }
}
