//! Queue-backed message sink.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::traits::{MessageSink, TransportError};

/// A [`MessageSink`] that queues text frames on an unbounded channel.
///
/// The receiving half is drained by a writer task (see
/// [`crate::websocket::spawn_writer`]). Once the receiver is dropped every
/// send fails with [`TransportError::ConnectionClosed`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Arc<str>>,
}

impl ChannelSink {
    /// Create a sink and the receiver its frames are delivered to.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Arc<str>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageSink for ChannelSink {
    fn send_text(&self, text: Arc<str>) -> Result<(), TransportError> {
        self.tx
            .send(text)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();

        sink.send_text("one".into()).unwrap();
        sink.send_text("two".into()).unwrap();

        assert_eq!(&*rx.recv().await.unwrap(), "one");
        assert_eq!(&*rx.recv().await.unwrap(), "two");
    }

    #[test]
    fn test_channel_sink_closed_after_receiver_drop() {
        let (sink, rx) = ChannelSink::new();
        assert!(sink.is_open());

        drop(rx);

        assert!(!sink.is_open());
        assert!(matches!(
            sink.send_text("lost".into()),
            Err(TransportError::ConnectionClosed)
        ));
    }
}
