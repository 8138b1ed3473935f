use crate::ports::outbound::{Transport, TransportError};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Transport backed by a bounded channel; the receiving half is drained
/// by the socket writer.
///
/// Sends never wait: a full buffer is a delivery failure for that frame.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<String>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Transport plus the receiver its frames arrive on.
    pub fn pair(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, frame: String) -> Result<(), TransportError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TransportError::Io("outbound buffer full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}
