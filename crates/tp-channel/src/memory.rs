//! In-process channel pair.

use crate::error::TransportError;
use crate::Channel;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

/// One end of an in-memory duplex link.
///
/// Closing an end drops its outbound sender, so the peer's next `receive`
/// after draining returns [`TransportError::Closed`].
pub struct MemoryChannel {
    outbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    inbound: AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryChannel {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let a = Self {
            outbound: Mutex::new(Some(a_tx)),
            inbound: AsyncMutex::new(b_rx),
        };
        let b = Self {
            outbound: Mutex::new(Some(b_tx)),
            inbound: AsyncMutex::new(a_rx),
        };
        (a, b)
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        let guard = self.outbound.lock();
        let sender = guard.as_ref().ok_or(TransportError::Closed)?;
        sender
            .send(frame.to_vec())
            .map_err(|_| TransportError::Closed)
    }

    async fn receive(&self) -> Result<Vec<u8>, TransportError> {
        let mut inbound = self.inbound.lock().await;
        inbound.recv().await.ok_or(TransportError::Closed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.outbound.lock().take();
        Ok(())
    }
}
