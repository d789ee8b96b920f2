// ============================
// crates/backend-lib/src/ws_router.rs
// ============================
//! HTTP router and WebSocket connection handling.
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use roomsync_common::{events, ClientFrame, ServerFrame};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::handlers::{handle_client_frame, http};
use crate::metrics::{WS_ACTIVE, WS_CONNECTION, WS_DISCONNECTION, WS_MALFORMED};
use crate::middleware::rate_limit;
use crate::AppState;

/// How long the writer may take to flush and close after the reader stops
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Create the application router: `/ws`, `/socket/*` and `/healthz`
pub fn create_router(state: Arc<AppState>) -> Router {
    let socket_routes = Router::new()
        .route("/users", get(http::list_users))
        .route("/users/{platform}", get(http::list_platform_users))
        .route("/alert", post(http::post_alert))
        .route("/notification", post(http::post_notification))
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(http::healthz))
        .nest("/socket", socket_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for WebSocket connections
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    counter!(WS_CONNECTION).increment(1);

    let max_message_bytes = state.settings.max_message_bytes;
    ws.max_message_size(max_message_bytes)
        .on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut outbox_rx) = mpsc::channel::<ServerFrame>(state.settings.outbound_buffer);

    let coordinator = state.coordinator.clone();
    let connection_id = coordinator.connect(outbox.clone());
    gauge!(WS_ACTIVE).increment(1.0);
    info!(%connection_id, "websocket connected");

    // Writer: drains the outbox (acks and pushes) in order
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbox_rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(err) => {
                    warn!(%connection_id, event = %frame.event, %err, "failed to encode frame");
                    continue;
                },
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        // completes the close handshake once the outbox is drained
        let _ = sink.close().await;
    });

    // Reader: one frame at a time
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                debug!(%connection_id, %err, "websocket read failed");
                break;
            },
        };

        match message {
            Message::Text(text) => {
                let reply = match serde_json::from_str::<ClientFrame>(text.as_str()) {
                    Ok(frame) => handle_client_frame(&coordinator, connection_id, frame).await,
                    Err(err) => {
                        debug!(%connection_id, %err, "malformed frame");
                        counter!(WS_MALFORMED).increment(1);
                        Some(ServerFrame::push(events::ERROR, AppError::from(err).to_ack()))
                    },
                };

                if let Some(reply) = reply {
                    if outbox.send(reply).await.is_err() {
                        break;
                    }
                }
            },
            Message::Close(_) => break,
            _ => {},
        }
    }

    // Cleanup: implicit leave of the connection's membership
    coordinator.disconnect(connection_id).await;
    drop(outbox);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_task)
        .await
        .is_err()
    {
        debug!(%connection_id, "writer did not drain in time");
        send_task.abort();
    }

    counter!(WS_DISCONNECTION).increment(1);
    gauge!(WS_ACTIVE).decrement(1.0);
    info!(%connection_id, "websocket disconnected");
}
