//! WebSocket transport for the lock protocol.
//!
//! Each socket gets one [`Connection`]. Inbound text frames are decoded as
//! [`ClientMessage`] envelopes and dispatched in arrival order; snapshots the
//! presence channel queues for the connection are written out as text frames.
//! Malformed frames are logged and dropped, the socket stays open.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use elk_schemas::ClientMessage;
use tracing::{debug, warn};

use crate::{coordinator::Coordinator, state::AppState};

pub(crate) async fn ws_upgrade(ws: WebSocketUpgrade, State(st): State<Arc<AppState>>) -> Response {
    let coordinator = Arc::clone(&st.coordinator);
    ws.on_upgrade(move |socket| serve_socket(socket, coordinator))
}

/// Drive one upgraded socket until either side closes it.
pub async fn serve_socket(mut socket: WebSocket, coordinator: Arc<Coordinator>) {
    let (mut conn, mut outbound) = coordinator.open_connection();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let frame = match incoming {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        debug!(connection_id = conn.id(), error = %e, "socket read failed");
                        break;
                    }
                    None => break,
                };
                match frame {
                    Message::Text(text) => match ClientMessage::decode(&text) {
                        Ok(msg) => {
                            let event = msg.event_name();
                            let outcome = conn.handle(msg).await;
                            debug!(connection_id = conn.id(), %event, ?outcome, "dispatched");
                        }
                        Err(e) => {
                            warn!(connection_id = conn.id(), error = %e, "dropping malformed frame");
                        }
                    },
                    Message::Close(_) => break,
                    // Pings are answered by axum; binary frames are not part of the protocol.
                    Message::Binary(_) => {
                        warn!(connection_id = conn.id(), "dropping binary frame");
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            queued = outbound.recv() => {
                // The connection holds a sender, so the queue never closes first.
                let Some(msg) = queued else { break };
                if let Err(e) = socket.send(Message::Text(msg.encode())).await {
                    debug!(connection_id = conn.id(), error = %e, "socket write failed");
                    break;
                }
            }
        }
    }

    conn.close();
}
