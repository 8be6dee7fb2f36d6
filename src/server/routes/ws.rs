//! `GET /ws` (§4.5, §6.2): the realtime push bridge. Upgrades to a native
//! `axum` WebSocket and relays every event published to the caller's room
//! until either side disconnects, generalizing the teacher's SSE `StreamHub`
//! subscriber loop to a duplex socket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;

use crate::kernel::realtime::RealtimeHub;
use crate::server::app::AppState;
use crate::server::middleware::ExternalSubject;

pub async fn upgrade(
    State(state): State<AppState>,
    axum::extract::Extension(ExternalSubject(subject)): axum::extract::Extension<ExternalSubject>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, subject))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, subject: String) {
    let room = RealtimeHub::room_for_subject(&subject);
    let mut events = state.deps.realtime.subscribe(&room);

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(payload) => {
                        let Ok(text) = serde_json::to_string(&payload) else { continue };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => continue,
                }
            }
        }
    }
}
