//! # Message Envelope
//!
//! The single frame shape on a processor connection.
//!
//! ```text
//! ┌──────────────────┬──────────────┬─────────────────────┐
//! │ correlation_id   │ message_type │ content (payload)   │
//! └──────────────────┴──────────────┴─────────────────────┘
//! ```
//!
//! - Requests carry a freshly minted `correlation_id`.
//! - Replies carry the `correlation_id` of the request they answer.

use crate::codec::{self, CodecError};
use crate::correlation::CorrelationId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag naming the payload carried in [`Message::content`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    PingRequest,
    PingResponse,
    TpRegisterRequest,
    TpRegisterResponse,
    TpUnregisterRequest,
    TpUnregisterResponse,
    TpProcessRequest,
    TpProcessResponse,
    TpStateGetRequest,
    TpStateGetResponse,
    TpStateSetRequest,
    TpStateSetResponse,
    TpStateDeleteRequest,
    TpStateDeleteResponse,
    TpReceiptAddDataRequest,
    TpReceiptAddDataResponse,
    TpEventAddRequest,
    TpEventAddResponse,
    /// Validator asks the processor to stop. Expects no reply.
    TpShutdownNotification,
}

impl MessageType {
    /// Stable label used in logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PingRequest => "PING_REQUEST",
            Self::PingResponse => "PING_RESPONSE",
            Self::TpRegisterRequest => "TP_REGISTER_REQUEST",
            Self::TpRegisterResponse => "TP_REGISTER_RESPONSE",
            Self::TpUnregisterRequest => "TP_UNREGISTER_REQUEST",
            Self::TpUnregisterResponse => "TP_UNREGISTER_RESPONSE",
            Self::TpProcessRequest => "TP_PROCESS_REQUEST",
            Self::TpProcessResponse => "TP_PROCESS_RESPONSE",
            Self::TpStateGetRequest => "TP_STATE_GET_REQUEST",
            Self::TpStateGetResponse => "TP_STATE_GET_RESPONSE",
            Self::TpStateSetRequest => "TP_STATE_SET_REQUEST",
            Self::TpStateSetResponse => "TP_STATE_SET_RESPONSE",
            Self::TpStateDeleteRequest => "TP_STATE_DELETE_REQUEST",
            Self::TpStateDeleteResponse => "TP_STATE_DELETE_RESPONSE",
            Self::TpReceiptAddDataRequest => "TP_RECEIPT_ADD_DATA_REQUEST",
            Self::TpReceiptAddDataResponse => "TP_RECEIPT_ADD_DATA_RESPONSE",
            Self::TpEventAddRequest => "TP_EVENT_ADD_REQUEST",
            Self::TpEventAddResponse => "TP_EVENT_ADD_RESPONSE",
            Self::TpShutdownNotification => "TP_SHUTDOWN_NOTIFICATION",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload type bound to its envelope tag.
pub trait ProtocolMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Tag written into the envelope for this payload.
    const MESSAGE_TYPE: MessageType;
}

/// The envelope for every frame exchanged with the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Token linking this frame to a request or reply.
    pub correlation_id: CorrelationId,
    /// Which payload `content` holds.
    pub message_type: MessageType,
    /// Serialized payload.
    pub content: Vec<u8>,
}

impl Message {
    pub fn new(
        correlation_id: CorrelationId,
        message_type: MessageType,
        content: Vec<u8>,
    ) -> Self {
        Self {
            correlation_id,
            message_type,
            content,
        }
    }

    /// Build an envelope around a typed payload.
    pub fn from_payload<P: ProtocolMessage>(
        correlation_id: CorrelationId,
        payload: &P,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            correlation_id,
            message_type: P::MESSAGE_TYPE,
            content: codec::encode(payload)?,
        })
    }

    /// Decode the payload, checking the envelope tag first.
    pub fn decode_payload<P: ProtocolMessage>(&self) -> Result<P, CodecError> {
        if self.message_type != P::MESSAGE_TYPE {
            return Err(CodecError::UnexpectedMessageType {
                expected: P::MESSAGE_TYPE,
                actual: self.message_type,
            });
        }
        codec::decode(&self.content)
    }

    /// Serialize the whole envelope into one frame body.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(self)
    }

    /// Parse one frame body.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        codec::decode(bytes)
    }
}
