//! WebSocket plumbing on top of axum.
//!
//! A socket is split into a read half, wrapped by [`WebSocketReader`], and a
//! write half owned by a writer task fed through a [`ChannelSink`].

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::channel::ChannelSink;
use crate::traits::{ConnectionId, TransportError};

/// Split an upgraded socket into a sink, a reader and the writer task.
///
/// The writer task ends once every clone of the sink is dropped and the queue
/// is drained, or as soon as a write fails.
pub fn split(
    socket: WebSocket,
    id: &ConnectionId,
) -> (
    ChannelSink,
    WebSocketReader<futures_util::stream::SplitStream<WebSocket>>,
    JoinHandle<()>,
) {
    let (write_half, read_half) = socket.split();
    let (sink, rx) = ChannelSink::new();
    let writer = spawn_writer(write_half, rx, id.clone());
    (sink, WebSocketReader::new(read_half, id.clone()), writer)
}

/// Spawn a task that forwards queued frames to the socket.
pub fn spawn_writer<S>(
    mut sender: S,
    mut rx: mpsc::UnboundedReceiver<Arc<str>>,
    id: ConnectionId,
) -> JoinHandle<()>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: std::fmt::Display,
{
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = sender.send(Message::Text(text.to_string())).await {
                debug!(connection = %id, error = %e, "WebSocket write failed");
                break;
            }
        }

        // Fail any later sends fast instead of queueing into the void.
        rx.close();
        let _ = sender.close().await;
        debug!(connection = %id, "Writer task finished");
    })
}

/// Read half of a WebSocket connection.
pub struct WebSocketReader<R> {
    stream: R,
    id: ConnectionId,
}

impl<R> WebSocketReader<R>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    /// Wrap a message stream.
    pub fn new(stream: R, id: ConnectionId) -> Self {
        Self { stream, id }
    }

    /// Receive the next text frame.
    ///
    /// Binary frames are decoded as UTF-8 (lossily). Control frames are
    /// skipped. Returns `None` once the peer has closed the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying socket fails.
    pub async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(String::from_utf8_lossy(&data).into_owned()));
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Pongs are queued by the socket itself
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(connection = %self.id, ?frame, "Received close frame");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    warn!(connection = %self.id, error = %e, "WebSocket error");
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}
