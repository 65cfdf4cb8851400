//! Observer sinks - the transport side of an observer
//!
//! The hub only needs "send one opaque message" and "tell me it failed".
//! Framing (websocket, SSE, stdout lines) belongs to the sink.

use async_trait::async_trait;
use tasktrack_foundation::{Error, Result};
use tokio::sync::mpsc;

/// Outbound half of a live connection
#[async_trait]
pub trait ObserverSink: Send + Sync {
    /// Deliver one serialized message; an error marks the observer dead
    async fn send(&self, message: &str) -> Result<()>;

    /// Label for diagnostics
    fn name(&self) -> &str {
        "observer"
    }
}

/// Sink backed by an unbounded channel; fails once the receiver is dropped
pub struct ChannelSink {
    name: String,
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new(name: impl Into<String>, tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            name: name.into(),
            tx,
        }
    }

    /// Sink plus the receiving end the transport drains
    pub fn pair(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(name, tx), rx)
    }
}

#[async_trait]
impl ObserverSink for ChannelSink {
    async fn send(&self, message: &str) -> Result<()> {
        self.tx
            .send(message.to_string())
            .map_err(|_| Error::Delivery(format!("{}: receiver closed", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_then_fails() {
        let (sink, mut rx) = ChannelSink::pair("test");

        sink.send("hello").await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));

        drop(rx);
        let err = sink.send("lost").await.unwrap_err();
        assert!(matches!(err, Error::Delivery(_)));
    }
}
