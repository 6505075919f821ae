//! WebSocket transport (tokio-tungstenite).

use elk_schemas::{ClientMessage, ServerMessage};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::transport::{Transport, TransportError};

type Sink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Inbound queue depth; matches the daemon's default subscriber buffer.
const INBOUND_BUFFER: usize = 64;

pub struct WsTransport {
    sink: tokio::sync::Mutex<Sink>,
    reader: JoinHandle<()>,
}

impl WsTransport {
    /// Connect to `url` (e.g. `ws://127.0.0.1:8787/v1/ws`). Server messages
    /// arrive on the returned receiver, which closes when the socket does.
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, mpsc::Receiver<ServerMessage>), TransportError> {
        let (socket, _resp) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (sink, mut stream) = socket.split();
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);

        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(error = %e, "websocket read failed");
                        break;
                    }
                };
                match ServerMessage::decode(&text) {
                    Ok(msg) => {
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "ignoring undecodable server frame"),
                }
            }
        });

        Ok((
            Self {
                sink: tokio::sync::Mutex::new(sink),
                reader,
            },
            rx,
        ))
    }

    /// Send a close frame. Leases held over this connection are not released.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn send(&self, msg: ClientMessage) -> Result<(), TransportError> {
        if self.reader.is_finished() {
            return Err(TransportError::Closed);
        }
        self.sink
            .lock()
            .await
            .send(Message::Text(msg.encode()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
