//! Socket plumbing shared by the speaker and viewer endpoints.
//!
//! Each connection owns a bounded outbound queue drained by a write pump
//! that also emits protocol pings. Outbound sends never block: a full
//! queue drops the message with a warning. The read side enforces an
//! idle deadline that any inbound frame (including pongs) refreshes.

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{MessageType, WsMessage, PING_INTERVAL, READ_DEADLINE, SEND_QUEUE_CAPACITY, WRITE_DEADLINE};

/// Sending half of a connection. Cheap to clone; all clones feed the same
/// write pump.
#[derive(Clone)]
pub struct Connection {
    pub id: String,
    send_tx: mpsc::Sender<String>,
}

impl Connection {
    /// Split the socket, spawn the write pump, and hand back the send
    /// handle plus the reading half.
    pub fn start(id: String, socket: WebSocket) -> (Self, ConnectionReader) {
        let (sink, stream) = socket.split();
        let (send_tx, send_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);

        tokio::spawn(write_pump(id.clone(), sink, send_rx));

        (
            Self { id, send_tx },
            ConnectionReader { stream },
        )
    }

    /// Queue an enveloped message for delivery. The server timestamp is
    /// stamped here. Never blocks; a full queue drops the message.
    pub fn send_json<P: Serialize>(&self, message_type: MessageType, payload: P) {
        let message = WsMessage {
            message_type,
            payload: match serde_json::to_value(payload) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Failed to encode {message_type:?} payload: {e}");
                    return;
                }
            },
            timestamp: Some(Utc::now()),
        };
        let data = match serde_json::to_string(&message) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to encode message: {e}");
                return;
            }
        };

        match self.send_tx.try_send(data) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Send buffer full for connection {}, dropping message", self.id);
            }
            Err(TrySendError::Closed(_)) => {
                // Write pump already gone; the read side will notice.
            }
        }
    }
}

/// Reading half of a connection.
pub struct ConnectionReader {
    stream: SplitStream<WebSocket>,
}

impl ConnectionReader {
    /// Next text frame from the client, or `None` once the connection is
    /// done for (close frame, transport error, or read deadline).
    ///
    /// Protocol ping/pong frames refresh the deadline and are otherwise
    /// swallowed; binary frames are ignored.
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            let frame = tokio::time::timeout(READ_DEADLINE, self.stream.next()).await;
            match frame {
                Err(_) => {
                    debug!("Read deadline hit, closing connection");
                    return None;
                }
                Ok(None) => return None,
                Ok(Some(Err(e))) => {
                    debug!("WebSocket read error: {e}");
                    return None;
                }
                Ok(Some(Ok(Message::Text(text)))) => return Some(text),
                Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
                Ok(Some(Ok(Message::Binary(_)))) => {
                    debug!("Ignoring unexpected binary frame");
                    continue;
                }
                Ok(Some(Ok(Message::Close(_)))) => return None,
            }
        }
    }
}

async fn write_pump(
    id: String,
    mut sink: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<String>,
) {
    let mut ping = tokio::time::interval(PING_INTERVAL);
    // The first tick fires immediately; skip it.
    ping.tick().await;

    loop {
        tokio::select! {
            message = send_rx.recv() => {
                let Some(data) = message else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let write = tokio::time::timeout(
                    WRITE_DEADLINE,
                    sink.send(Message::Text(data)),
                ).await;
                match write {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!("WebSocket write error on {id}: {e}");
                        break;
                    }
                    Err(_) => {
                        warn!("Write deadline exceeded on {id}");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                let write = tokio::time::timeout(
                    WRITE_DEADLINE,
                    sink.send(Message::Ping(Vec::new())),
                ).await;
                if !matches!(write, Ok(Ok(()))) {
                    break;
                }
            }
        }
    }

    debug!("Write pump for connection {id} stopped");
}
