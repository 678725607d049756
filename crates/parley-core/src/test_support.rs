//! Shared fixtures for unit tests.

use crate::connection::ConnectionHandle;
use parley_transport::{ChannelSink, MessageSink, TransportError};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A connection whose frames land in the returned receiver.
pub(crate) fn connection(peer: &str) -> (ConnectionHandle, mpsc::UnboundedReceiver<Arc<str>>) {
    let (sink, rx) = ChannelSink::new();
    (ConnectionHandle::new(peer, sink), rx)
}

/// A sink whose every write fails without the peer being gone.
pub(crate) struct FailingSink;

impl MessageSink for FailingSink {
    fn send_text(&self, _text: Arc<str>) -> Result<(), TransportError> {
        Err(TransportError::SendFailed("injected failure".into()))
    }

    fn is_open(&self) -> bool {
        true
    }
}
