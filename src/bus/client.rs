//! Bus client with request-response support
//!
//! Connects to the assistant message bus over a Unix domain socket.
//! Messages are JSON-encoded, prefixed with a 4-byte little-endian length.
//! Replies to in-flight requests are routed to their waiters in the reader
//! task, so a handler blocked in `wait_for_response` never stalls delivery.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::message::Message;

/// Maximum accepted frame size
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Errors from the bus transport
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus connection closed")]
    Closed,

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle for publishing to the bus and issuing correlated requests
#[derive(Clone)]
pub struct BusClient {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>>,
    next_id: Arc<AtomicU64>,
}

impl BusClient {
    /// Create a client writing to the given outgoing channel
    ///
    /// Used directly in tests; production code goes through `connect`.
    pub fn new(outgoing: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            outgoing,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Create a client backed by an in-process channel pair
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Connect to the bus socket
    ///
    /// Spawns reader and writer tasks. Returns the client plus the stream of
    /// inbound messages that are not replies to in-flight requests.
    pub async fn connect(socket_path: &Path) -> Result<(Self, mpsc::UnboundedReceiver<Message>)> {
        let stream = UnixStream::connect(socket_path)
            .await
            .with_context(|| format!("failed to connect to bus at {}", socket_path.display()))?;
        let (read_half, write_half) = stream.into_split();

        let (client, outgoing_rx) = Self::channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(write_half, outgoing_rx));

        let reader_client = client.clone();
        tokio::spawn(async move {
            if let Err(e) = read_loop(read_half, reader_client, event_tx).await {
                error!(?e, "bus reader stopped");
            }
        });

        Ok((client, event_rx))
    }

    /// Publish a message, fire and forget
    pub fn publish(&self, topic: &str, data: Value) {
        self.send(Message::new(topic, data));
    }

    /// Send a prepared message
    pub fn send(&self, msg: Message) {
        if self.outgoing.send(msg).is_err() {
            warn!("bus connection closed, message dropped");
        }
    }

    /// Send a request and wait for its correlated reply
    ///
    /// Returns `None` if no reply arrives within `timeout` or the connection
    /// is closed. The waiter is removed on timeout so a late reply is dropped
    /// rather than leaked.
    pub async fn wait_for_response(&self, mut msg: Message, timeout: Duration) -> Option<Message> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        msg.id = Some(id.clone());

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id.clone(), tx);

        if self.outgoing.send(msg).is_err() {
            self.pending.lock().unwrap().remove(&id);
            warn!("bus connection closed, request dropped");
            return None;
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Some(reply),
            _ => {
                self.pending.lock().unwrap().remove(&id);
                None
            }
        }
    }

    /// Route an inbound message
    ///
    /// Replies to in-flight requests are delivered to their waiters and
    /// consumed; anything else is returned for handler dispatch.
    pub fn dispatch_inbound(&self, msg: Message) -> Option<Message> {
        if let Some(id) = msg.response_to.as_deref() {
            let waiter = self.pending.lock().unwrap().remove(id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(msg);
                }
                None => debug!(id, "reply with no waiter, dropped"),
            }
            return None;
        }
        Some(msg)
    }
}

async fn write_loop(
    mut write_half: tokio::net::unix::OwnedWriteHalf,
    mut outgoing_rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = outgoing_rx.recv().await {
        if let Err(e) = write_frame(&mut write_half, &msg).await {
            error!(?e, "bus write failed");
            break;
        }
    }
}

async fn read_loop(
    mut read_half: tokio::net::unix::OwnedReadHalf,
    client: BusClient,
    event_tx: mpsc::UnboundedSender<Message>,
) -> Result<(), BusError> {
    let mut len_buf = [0u8; 4];

    loop {
        match read_half.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("bus closed the connection");
                return Err(BusError::Closed);
            }
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            return Err(BusError::FrameTooLarge(len));
        }

        let mut msg_buf = vec![0u8; len];
        read_half.read_exact(&mut msg_buf).await?;

        let msg: Message = match serde_json::from_slice(&msg_buf) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(?e, "unparseable bus message, skipped");
                continue;
            }
        };

        if let Some(event) = client.dispatch_inbound(msg) {
            if event_tx.send(event).is_err() {
                debug!("event consumer gone, reader stopping");
                return Ok(());
            }
        }
    }
}

/// Write a length-prefixed JSON frame
async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, msg: &Message) -> Result<(), BusError> {
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::topic;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_frame_is_length_prefixed_json() {
        let mut buf = Vec::new();
        let msg = Message::new(topic::READY, json!({}));
        write_frame(&mut buf, &msg).await.unwrap();

        let len = u32::from_le_bytes(buf[..4].try_into().unwrap()) as usize;
        assert_eq!(len, buf.len() - 4);

        let decoded: Message = serde_json::from_slice(&buf[4..]).unwrap();
        assert_eq!(decoded.topic, topic::READY);
    }

    #[tokio::test]
    async fn test_publish_goes_out() {
        let (client, mut rx) = BusClient::channel();
        client.publish(topic::TTS_STOP, json!({}));

        let sent = rx.recv().await.unwrap();
        assert_eq!(sent.topic, topic::TTS_STOP);
        assert!(sent.id.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_response_correlates_by_id() {
        let (client, mut rx) = BusClient::channel();

        let request_client = client.clone();
        let waiter = tokio::spawn(async move {
            request_client
                .wait_for_response(
                    Message::new(topic::GUI_HANDLE_IDLE, json!({"skill_id": "a"})),
                    Duration::from_secs(5),
                )
                .await
        });

        let request = rx.recv().await.unwrap();
        assert!(request.id.is_some());

        // An unrelated event passes through instead of resolving the waiter
        let event = client.dispatch_inbound(Message::new(topic::GUI_IDLE, json!({})));
        assert!(event.is_some());

        let reply = request.response(json!({"handled": true}));
        assert!(client.dispatch_inbound(reply).is_none());

        let got = waiter.await.unwrap().unwrap();
        assert!(got.bool_field("handled"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_response_times_out() {
        let (client, mut rx) = BusClient::channel();

        let got = client
            .wait_for_response(
                Message::new(topic::GUI_HANDLE_IDLE, json!({"skill_id": "a"})),
                Duration::from_millis(200),
            )
            .await;
        assert!(got.is_none());

        // The waiter is cleaned up, so a late reply is dropped silently
        let request = rx.recv().await.unwrap();
        let late = request.response(json!({"handled": true}));
        assert!(client.dispatch_inbound(late).is_none());
        assert!(client.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_response_on_closed_bus() {
        let (client, rx) = BusClient::channel();
        drop(rx);

        let got = client
            .wait_for_response(
                Message::new(topic::GUI_HANDLE_IDLE, json!({"skill_id": "a"})),
                Duration::from_secs(1),
            )
            .await;
        assert!(got.is_none());
        assert!(client.pending.lock().unwrap().is_empty());
    }
}
