//! Correlation Registry.
//!
//! Maps outstanding correlation tokens to the one task waiting on each reply.
//!
//! Flow:
//! 1. Caller mints a token and calls `register()` to get a oneshot receiver
//! 2. Caller writes the request frame
//! 3. Receive loop calls `complete()` with every inbound message
//! 4. Caller awaits the receiver or gives up (`expire()` / `cancel()`)
//!
//! The lock is held only for the map operation itself, never across an await.

use crate::error::DispatchError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::oneshot;
use tp_telemetry::PENDING_SUB_REQUESTS;
use tp_types::{CorrelationId, Message, MessageType};
use tracing::{debug, trace};

/// What a waiter eventually receives.
pub type ReplyResult = Result<Message, DispatchError>;

struct PendingRequest {
    sender: oneshot::Sender<ReplyResult>,
    created_at: Instant,
    message_type: MessageType,
}

/// Counters for the registry and the receive loop that feeds it.
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total requests registered
    pub total_registered: AtomicU64,
    /// Total requests answered
    pub total_completed: AtomicU64,
    /// Total requests abandoned on timeout
    pub total_timeouts: AtomicU64,
    /// Total requests abandoned by the caller or failed on close
    pub total_cancelled: AtomicU64,
    /// Inbound messages that matched no pending request
    pub total_unsolicited: AtomicU64,
    /// Inbound frames that could not be decoded
    pub total_dropped_frames: AtomicU64,
}

#[derive(Default)]
struct Inner {
    pending: HashMap<CorrelationId, PendingRequest>,
    closed: bool,
}

/// Guarded token → waiter map.
#[derive(Default)]
pub struct CorrelationRegistry {
    inner: Mutex<Inner>,
    stats: PendingStats,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pending request and return the slot its reply will land in.
    ///
    /// The empty token is refused, so it never matches a pending request.
    pub fn register(
        &self,
        correlation_id: CorrelationId,
        message_type: MessageType,
    ) -> Result<oneshot::Receiver<ReplyResult>, DispatchError> {
        if correlation_id.is_empty() {
            return Err(DispatchError::EmptyCorrelationId);
        }
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(DispatchError::ChannelClosed);
            }
            if inner.pending.contains_key(&correlation_id) {
                return Err(DispatchError::DuplicateCorrelationId(correlation_id));
            }
            inner.pending.insert(
                correlation_id.clone(),
                PendingRequest {
                    sender: tx,
                    created_at: Instant::now(),
                    message_type,
                },
            );
        }

        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        PENDING_SUB_REQUESTS.inc();
        trace!(
            correlation_id = %correlation_id,
            message_type = %message_type,
            "Registered pending request"
        );
        Ok(rx)
    }

    /// Hand `message` to the waiter registered under its token.
    ///
    /// Returns the message back when no such waiter exists.
    pub fn complete(&self, message: Message) -> Result<(), Message> {
        let pending = self.inner.lock().pending.remove(&message.correlation_id);
        let Some(pending) = pending else {
            return Err(message);
        };
        PENDING_SUB_REQUESTS.dec();

        let correlation_id = message.correlation_id.clone();
        let response_time = pending.created_at.elapsed();
        match pending.sender.send(Ok(message)) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                trace!(
                    correlation_id = %correlation_id,
                    message_type = %pending.message_type,
                    response_time_us = response_time.as_micros() as u64,
                    "Completed pending request"
                );
            }
            Err(_) => {
                // Waiter went away between registering and the reply.
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    message_type = %pending.message_type,
                    "Reply arrived for abandoned request"
                );
            }
        }
        Ok(())
    }

    /// Remove an entry whose waiter timed out.
    pub fn expire(&self, correlation_id: &CorrelationId) -> bool {
        let removed = self.remove(correlation_id);
        if removed {
            self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Remove an entry whose waiter no longer wants the reply.
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        let removed = self.remove(correlation_id);
        if removed {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Fail every pending entry with `ChannelClosed` and refuse new ones.
    ///
    /// Returns the number of waiters woken.
    pub fn close(&self) -> usize {
        let drained: Vec<(CorrelationId, PendingRequest)> = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.pending.drain().collect()
        };

        let count = drained.len();
        for (correlation_id, pending) in drained {
            PENDING_SUB_REQUESTS.dec();
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id = %correlation_id,
                message_type = %pending.message_type,
                "Failing pending request, channel closed"
            );
            let _ = pending.sender.send(Err(DispatchError::ChannelClosed));
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of requests currently awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.inner.lock().pending.contains_key(correlation_id)
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    fn remove(&self, correlation_id: &CorrelationId) -> bool {
        let removed = self.inner.lock().pending.remove(correlation_id).is_some();
        if removed {
            PENDING_SUB_REQUESTS.dec();
        }
        removed
    }
}
