// WebSocket bridge to the front-end.

use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State as AxumState;
use axum::response::IntoResponse;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use relay_core::burst::{FrontEndPayload, SensoryData};

use crate::app::AppState;
use crate::buffers::LatestSlot;
use crate::constants::EMPTY_ACK;
use crate::utils::{monotonic_ms, next_sequence, wait_for_shutdown};

pub async fn ws_handler(
    AxumState(app_state): AxumState<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(mut socket: WebSocket, app_state: AppState) {
    let client_id = next_sequence(app_state.client_sequence.as_ref());
    let mut active_rx = app_state.active_client.subscribe();
    let previous = app_state.active_client.send_replace(client_id);
    if previous != 0 {
        info!(client_id, previous, "ws client replaces previous connection");
    } else {
        info!(client_id, "ws connected");
    }
    let mut shutdown = app_state.shutdown.clone();
    app_state.client_connected.store(true, Ordering::Relaxed);
    app_state.shared.front_end.lock().await.forget_served();

    let mut last_received: Option<String> = None;
    let mut last_sent: Option<String> = None;

    loop {
        tokio::select! {
            inbound = socket.next() => {
                let text = match inbound {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) => break,
                    Some(Err(err)) => {
                        warn!(?err, "ws error");
                        break;
                    }
                    None => break,
                };

                if last_received.as_deref() != Some(text.as_str()) {
                    debug!(client_id, frame = %text, "front-end frame");
                    last_received = Some(text.clone());
                }

                let reply = respond(&app_state.shared.front_end, &app_state.shared.sensory, &text).await;
                if last_sent.as_deref() != Some(reply.as_str()) {
                    debug!(client_id, payload = %reply, "relaying payload to front-end");
                    last_sent = Some(reply.clone());
                }
                if socket.send(Message::Text(reply)).await.is_err() {
                    break;
                }
            }
            changed = active_rx.changed() => {
                if changed.is_err() || *active_rx.borrow() != client_id {
                    let _ = socket.send(Message::Close(None)).await;
                    info!(client_id, "ws connection superseded");
                    break;
                }
            }
            _ = wait_for_shutdown(&mut shutdown) => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    if *app_state.active_client.borrow() == client_id {
        app_state.client_connected.store(false, Ordering::Relaxed);
    }
    info!(
        client_id,
        uptime_ms = monotonic_ms(app_state.start_instant),
        "ws disconnected"
    );
}

/// Handles one front-end frame: stores any pushed sensory data, then answers
/// with the latest payload or an empty acknowledgment.
pub async fn respond(
    front_end: &Mutex<LatestSlot<FrontEndPayload>>,
    sensory: &Mutex<LatestSlot<SensoryData>>,
    frame: &str,
) -> String {
    if let Some(data) = parse_sensory_frame(frame) {
        if sensory.lock().await.push(data) {
            debug!("unconsumed front-end frame superseded");
        }
    }

    let payload = front_end.lock().await.serve();
    match payload {
        Some(payload) => match serde_json::to_string(&payload) {
            Ok(text) => text,
            Err(err) => {
                warn!(?err, "failed to serialize front-end payload");
                EMPTY_ACK.to_string()
            }
        },
        None => EMPTY_ACK.to_string(),
    }
}

/// A JSON object with at least one entry is sensory data; anything else is a
/// plain request for the latest payload.
pub fn parse_sensory_frame(frame: &str) -> Option<SensoryData> {
    let value: serde_json::Value = serde_json::from_str(frame.trim()).ok()?;
    let serde_json::Value::Object(map) = value else {
        return None;
    };
    if map.is_empty() {
        return None;
    }
    Some(map.into_iter().collect())
}
