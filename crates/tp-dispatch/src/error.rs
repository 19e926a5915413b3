//! Dispatcher errors.

use std::time::Duration;
use thiserror::Error;
use tp_channel::TransportError;
use tp_types::{CodecError, CorrelationId};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The connection is gone, or the dispatcher was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// No reply arrived in time. The pending entry has been removed.
    #[error("request {correlation_id} timed out after {timeout:?}")]
    Timeout {
        correlation_id: CorrelationId,
        timeout: Duration,
    },

    /// A request was registered under a token that is still outstanding.
    #[error("correlation id {0} is already outstanding")]
    DuplicateCorrelationId(CorrelationId),

    /// A request was registered under the empty token.
    #[error("correlation id is empty")]
    EmptyCorrelationId,

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("transport error: {0}")]
    Transport(TransportError),
}

impl From<TransportError> for DispatchError {
    fn from(err: TransportError) -> Self {
        if err.is_closed() {
            Self::ChannelClosed
        } else {
            Self::Transport(err)
        }
    }
}

impl DispatchError {
    /// Label used for the sub-request outcome metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::ChannelClosed => "closed",
            Self::Timeout { .. } => "timeout",
            _ => "error",
        }
    }
}
