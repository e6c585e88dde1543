// ============================
// crates/backend-lib/src/ws_router.rs
// ============================
//! WebSocket router and connection handling.
use crate::handlers::{error_payload, SessionHandler};
use crate::rate_limit::Admission;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::debug;
use wordrush_common::{ClientToServer, ServerToClient};

use crate::error::AppError;
use crate::metrics as keys;

/// Create the router: the WebSocket endpoint plus a health probe.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handler for WebSocket connections
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    counter!(keys::WS_CONNECTION).increment(1);
    gauge!(keys::WS_ACTIVE).increment(1.0);

    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Liveness plus shared-store reachability.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.coordinator.ping_store().await {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "store unreachable")
    }
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Channel for everything headed to this client: direct responses
    // and fan-out events share it.
    let (client_tx, mut client_rx) = mpsc::channel::<ServerToClient>(32);

    let mut handler = SessionHandler::new(Arc::clone(&state), client_tx.clone());

    // Task: serialize outbound messages onto the socket
    let send_task = tokio::spawn(async move {
        while let Some(server_msg) = client_rx.recv().await {
            let json = match serde_json::to_string(&server_msg) {
                Ok(json) => json,
                Err(_) => continue,
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Main task: process incoming WebSocket messages
    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            Message::Text(text) => {
                let client_msg = match serde_json::from_str::<ClientToServer>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        let err_msg = ServerToClient::MalformedMessage {
                            err_msg: e.to_string(),
                        };
                        if client_tx.send(err_msg).await.is_err() {
                            break;
                        }
                        continue;
                    },
                };

                // Admission control runs before any dispatch, per
                // (method, room segment, caller) tuple.
                let admission = state
                    .limiter
                    .admit(
                        client_msg.method_name(),
                        &client_msg.room_segment(),
                        handler.caller_id(),
                    )
                    .await;
                if admission == Admission::Denied {
                    debug!(method = client_msg.method_name(), "rate limited");
                    let payload = error_payload(&AppError::RateLimitExceeded);
                    if client_tx.send(payload).await.is_err() {
                        break;
                    }
                    continue;
                }

                let response = match handler.handle_message(client_msg).await {
                    Ok(response) => response,
                    Err(e) => error_payload(&e),
                };
                if client_tx.send(response).await.is_err() {
                    break;
                }
            },
            Message::Close(_) => break,
            // Axum answers pings itself
            _ => {},
        }
    }

    // Cleanup: leave joined rooms and unregister fan-out senders
    handler.handle_disconnect().await;

    counter!(keys::WS_DISCONNECTION).increment(1);
    gauge!(keys::WS_ACTIVE).decrement(1.0);

    send_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::store::MemoryStore;
    use crate::words::{FileLexicon, Lexicon};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state_with_store(store: Arc<MemoryStore>) -> Arc<AppState> {
        let words: Arc<dyn Lexicon> = Arc::new(FileLexicon::from_words(["bad"]));
        Arc::new(AppState::new(store, words, Settings::for_tests()))
    }

    #[tokio::test]
    async fn test_healthz_reports_store_reachability() {
        let store = Arc::new(MemoryStore::new());
        let app = create_router(state_with_store(Arc::clone(&store)));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        store.set_available(false);
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_plain_get_on_ws_route_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let app = create_router(state_with_store(store));

        // No upgrade headers: the extractor refuses the request.
        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::OK);
    }
}
