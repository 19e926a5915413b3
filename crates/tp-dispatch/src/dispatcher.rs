//! Message Multiplexer.
//!
//! Owns the channel. A single spawned receive loop reads every inbound frame
//! and either resolves a pending request or queues the message as unsolicited.
//! Writers share the channel through [`MessageDispatcher::send`],
//! [`MessageDispatcher::reply`] and [`MessageDispatcher::send_and_receive`].

use crate::error::DispatchError;
use crate::registry::CorrelationRegistry;
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tp_channel::Channel;
use tp_telemetry::{DROPPED_FRAMES, SUB_REQUESTS, UNSOLICITED_MESSAGES};
use tp_types::{CorrelationId, Message, ProtocolMessage};
use tracing::{debug, error, info, warn};

/// Default time to wait for a reply to a sub-request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct MessageDispatcher {
    channel: Arc<dyn Channel>,
    registry: Arc<CorrelationRegistry>,
    unsolicited: AsyncMutex<mpsc::UnboundedReceiver<Message>>,
    shutdown: watch::Sender<bool>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
    default_timeout: Duration,
}

impl MessageDispatcher {
    /// Take ownership of `channel` and start the receive loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(channel: Arc<dyn Channel>, default_timeout: Duration) -> Self {
        let registry = Arc::new(CorrelationRegistry::new());
        let (unsolicited_tx, unsolicited_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(receive_loop(
            Arc::clone(&channel),
            Arc::clone(&registry),
            unsolicited_tx,
            shutdown_rx,
        ));

        Self {
            channel,
            registry,
            unsolicited: AsyncMutex::new(unsolicited_rx),
            shutdown: shutdown_tx,
            receive_task: Mutex::new(Some(task)),
            default_timeout,
        }
    }

    /// Fire-and-forget send under a fresh token.
    pub async fn send<P: ProtocolMessage>(
        &self,
        payload: &P,
    ) -> Result<CorrelationId, DispatchError> {
        let correlation_id = CorrelationId::generate();
        let message = Message::from_payload(correlation_id.clone(), payload)?;
        self.write(&message).await?;
        Ok(correlation_id)
    }

    /// Fire-and-forget send echoing the token of the message being answered.
    pub async fn reply<P: ProtocolMessage>(
        &self,
        correlation_id: &CorrelationId,
        payload: &P,
    ) -> Result<(), DispatchError> {
        let message = Message::from_payload(correlation_id.clone(), payload)?;
        self.write(&message).await
    }

    /// Send `request` and wait for the reply carrying the same token.
    ///
    /// Only the calling task waits. On timeout the pending entry is removed;
    /// the request frame itself may already be on the wire.
    pub async fn send_and_receive<Req, Resp>(
        &self,
        request: &Req,
        timeout: Option<Duration>,
    ) -> Result<Resp, DispatchError>
    where
        Req: ProtocolMessage,
        Resp: ProtocolMessage,
    {
        let message = Message::from_payload(CorrelationId::generate(), request)?;
        let result = self
            .request_message(message, timeout)
            .await
            .and_then(|reply| reply.decode_payload::<Resp>().map_err(DispatchError::from));

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.outcome(),
        };
        SUB_REQUESTS
            .with_label_values(&[Req::MESSAGE_TYPE.as_str(), outcome])
            .inc();
        result
    }

    /// Untyped form of [`send_and_receive`](Self::send_and_receive).
    ///
    /// `message.correlation_id` must not be outstanding.
    pub async fn request_message(
        &self,
        message: Message,
        timeout: Option<Duration>,
    ) -> Result<Message, DispatchError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let correlation_id = message.correlation_id.clone();
        let rx = self
            .registry
            .register(correlation_id.clone(), message.message_type)?;
        let guard = PendingGuard {
            registry: &self.registry,
            correlation_id: &correlation_id,
        };

        self.write(&message).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DispatchError::ChannelClosed),
            Err(_) => {
                self.registry.expire(&correlation_id);
                drop(guard);
                warn!(
                    correlation_id = %correlation_id,
                    message_type = %message.message_type,
                    timeout_ms = timeout.as_millis() as u64,
                    "Request timed out"
                );
                Err(DispatchError::Timeout {
                    correlation_id,
                    timeout,
                })
            }
        }
    }

    /// Wait for the next message from the validator that is not a reply.
    ///
    /// Messages are delivered in wire order. Fails with `ChannelClosed` once
    /// the receive loop has stopped and the queue is drained.
    pub async fn next_unsolicited(&self) -> Result<Message, DispatchError> {
        let mut unsolicited = self.unsolicited.lock().await;
        unsolicited.recv().await.ok_or(DispatchError::ChannelClosed)
    }

    /// Stop the receive loop, close the channel and fail every waiter.
    ///
    /// Idempotent.
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        let woken = self.registry.close();
        if woken > 0 {
            debug!(woken, "Failed pending requests on close");
        }
        if let Err(e) = self.channel.close().await {
            debug!(error = %e, "Error closing channel");
        }
        let task = self.receive_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// The registry backing this dispatcher, for stats and inspection.
    pub fn registry(&self) -> &CorrelationRegistry {
        &self.registry
    }

    async fn write(&self, message: &Message) -> Result<(), DispatchError> {
        if self.registry.is_closed() {
            return Err(DispatchError::ChannelClosed);
        }
        let frame = message.to_bytes()?;
        self.channel.send(&frame).await?;
        Ok(())
    }
}

impl Drop for MessageDispatcher {
    fn drop(&mut self) {
        if let Some(task) = self.receive_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Removes a pending entry if the waiting future is dropped or fails early.
struct PendingGuard<'a> {
    registry: &'a CorrelationRegistry,
    correlation_id: &'a CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.registry.cancel(self.correlation_id);
    }
}

async fn receive_loop(
    channel: Arc<dyn Channel>,
    registry: Arc<CorrelationRegistry>,
    unsolicited: mpsc::UnboundedSender<Message>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("Receive loop started");

    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!("Receive loop stopping on local close");
                break;
            }
            frame = channel.receive() => frame,
        };

        let bytes = match frame {
            Ok(bytes) => bytes,
            Err(e) if e.is_closed() => {
                info!("Validator closed the connection");
                break;
            }
            Err(e) => {
                error!(error = %e, "Channel read failed");
                break;
            }
        };

        let message = match Message::from_bytes(&bytes) {
            Ok(message) => message,
            Err(e) => {
                registry
                    .stats()
                    .total_dropped_frames
                    .fetch_add(1, Ordering::Relaxed);
                DROPPED_FRAMES.inc();
                warn!(error = %e, len = bytes.len(), "Dropping malformed frame");
                continue;
            }
        };

        if let Err(message) = registry.complete(message) {
            registry
                .stats()
                .total_unsolicited
                .fetch_add(1, Ordering::Relaxed);
            UNSOLICITED_MESSAGES
                .with_label_values(&[message.message_type.as_str()])
                .inc();
            debug!(
                correlation_id = %message.correlation_id,
                message_type = %message.message_type,
                "Queued unsolicited message"
            );
            if unsolicited.send(message).is_err() {
                debug!("Unsolicited queue has no consumer");
            }
        }
    }

    registry.close();
    debug!("Receive loop stopped");
}
