//! WebSocket Notification Gateway
//!
//! Clients connect to `GET /api/v1/ws` with their `X-Tenant-Id` and receive
//! the realtime notifications the outbox relay broadcasts for that tenant,
//! one JSON text frame each. Notifications for other tenants are never sent.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use stratus_core::{Notification, TenantId};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::fanout::BroadcastNotifier;
use crate::middleware::TenantContext;
use crate::telemetry::with_metrics;

/// Frames sent to websocket clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsFrame {
    Connected { tenant_id: TenantId },
    Notification(Notification),
    /// The client fell behind and `skipped` notifications were dropped.
    Lagged { skipped: u64 },
}

/// Upgrade to a tenant-filtered notification stream.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(notifier): State<Arc<BroadcastNotifier>>,
    tenant: TenantContext,
) -> Response {
    info!(tenant_id = %tenant.tenant_id, "WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, notifier, tenant.tenant_id))
}

async fn handle_socket(socket: WebSocket, notifier: Arc<BroadcastNotifier>, tenant_id: TenantId) {
    with_metrics(|m| m.ws_connected());
    info!(tenant_id = %tenant_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let mut rx = notifier.subscribe();

    if let Err(e) = send_frame(&mut sender, &WsFrame::Connected { tenant_id }).await {
        error!(tenant_id = %tenant_id, error = %e, "Failed to send connected frame");
        with_metrics(|m| m.ws_disconnected());
        return;
    }

    // Inbound frames are ignored; the task only watches for the client leaving.
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(tenant_id = %tenant_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            result = rx.recv() => {
                let frame = match result {
                    Ok(notification) if should_forward(&notification, tenant_id) => {
                        WsFrame::Notification(notification)
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(tenant_id = %tenant_id, skipped, "Client lagged, notifications dropped");
                        WsFrame::Lagged { skipped }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(tenant_id = %tenant_id, "Notification channel closed");
                        break;
                    }
                };
                if let Err(e) = send_frame(&mut sender, &frame).await {
                    debug!(tenant_id = %tenant_id, error = %e, "Send failed, closing connection");
                    break;
                }
            }

            _ = &mut recv_task => {
                debug!(tenant_id = %tenant_id, "Client went away");
                break;
            }
        }
    }

    recv_task.abort();
    with_metrics(|m| m.ws_disconnected());
    info!(tenant_id = %tenant_id, "WebSocket disconnected");
}

async fn send_frame(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    frame: &WsFrame,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}

fn should_forward(notification: &Notification, tenant_id: TenantId) -> bool {
    notification.tenant_id == tenant_id
}
