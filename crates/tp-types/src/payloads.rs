//! # Message Payloads
//!
//! Bodies carried in [`Message::content`](crate::Message). Each type is
//! bound to its envelope tag through [`ProtocolMessage`].
//!
//! ## Design Rules
//!
//! - Payloads never carry their own correlation token; the envelope owns it.
//! - Every request expecting a reply has a matching `*Response` type.
//! - Status enums are per-response so a caller can only observe the
//!   outcomes that response actually defines.

use crate::codec::{self, CodecError};
use crate::features::HeaderStyle;
use crate::message::{MessageType, ProtocolMessage};
use serde::{Deserialize, Serialize};

macro_rules! protocol_messages {
    ($($payload:ty => $tag:ident),* $(,)?) => {
        $(
            impl ProtocolMessage for $payload {
                const MESSAGE_TYPE: MessageType = MessageType::$tag;
            }
        )*
    };
}

protocol_messages! {
    PingRequest => PingRequest,
    PingResponse => PingResponse,
    TpRegisterRequest => TpRegisterRequest,
    TpRegisterResponse => TpRegisterResponse,
    TpUnregisterRequest => TpUnregisterRequest,
    TpUnregisterResponse => TpUnregisterResponse,
    TpProcessRequest => TpProcessRequest,
    TpProcessResponse => TpProcessResponse,
    TpStateGetRequest => TpStateGetRequest,
    TpStateGetResponse => TpStateGetResponse,
    TpStateSetRequest => TpStateSetRequest,
    TpStateSetResponse => TpStateSetResponse,
    TpStateDeleteRequest => TpStateDeleteRequest,
    TpStateDeleteResponse => TpStateDeleteResponse,
    TpReceiptAddDataRequest => TpReceiptAddDataRequest,
    TpReceiptAddDataResponse => TpReceiptAddDataResponse,
    TpEventAddRequest => TpEventAddRequest,
    TpEventAddResponse => TpEventAddResponse,
    TpShutdownNotification => TpShutdownNotification,
}

// =============================================================================
// CONNECTION MAINTENANCE
// =============================================================================

/// Liveness probe sent by the validator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest;

/// Answer to [`PingRequest`], echoing its correlation token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse;

/// Validator-initiated stop. No reply is expected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpShutdownNotification;

// =============================================================================
// REGISTRATION
// =============================================================================

/// Announces one (family, version) pair this processor can execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpRegisterRequest {
    /// Transaction family name.
    pub family: String,
    /// One supported family version.
    pub version: String,
    /// State address prefixes the family reads and writes.
    pub namespaces: Vec<String>,
    /// How many requests the processor accepts concurrently.
    pub max_occupancy: u32,
    /// Highest feature level requested (see `FeatureVersion`).
    pub protocol_version: u32,
    /// Header encoding requested for process requests.
    pub request_header_style: HeaderStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpRegisterResponse {
    pub status: RegisterStatus,
    /// Feature level the validator acknowledges.
    pub protocol_version: u32,
}

/// Withdraws every registration made on this connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpUnregisterRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnregisterStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpUnregisterResponse {
    pub status: UnregisterStatus,
}

// =============================================================================
// TRANSACTION EXECUTION
// =============================================================================

/// Signed transaction header as produced by the submitting client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHeader {
    pub family_name: String,
    pub family_version: String,
    pub batcher_public_key: String,
    pub signer_public_key: String,
    pub nonce: String,
    /// Addresses the transaction may read.
    pub inputs: Vec<String>,
    /// Addresses the transaction may write.
    pub outputs: Vec<String>,
    /// Header signatures of transactions that must execute first.
    pub dependencies: Vec<String>,
    pub payload_sha512: String,
}

impl TransactionHeader {
    /// Serialize for transport in `header_bytes`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(self)
    }

    /// Parse a header received in `header_bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        codec::decode(bytes)
    }
}

/// Asks the processor to execute one transaction.
///
/// With [`HeaderStyle::Expanded`] the validator fills `header`; with
/// [`HeaderStyle::Raw`] it fills `header_bytes` instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpProcessRequest {
    pub header: Option<TransactionHeader>,
    pub header_bytes: Vec<u8>,
    pub payload: Vec<u8>,
    /// Header signature; doubles as the transaction id.
    pub signature: String,
    /// Validator-side execution context for state access.
    pub context_id: String,
    /// Block height hint, zero when unknown.
    pub tip: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessStatus {
    Ok,
    /// Semantically rejected; the validator drops the transaction.
    InvalidTransaction,
    /// Processing failed; the validator may retry.
    InternalError,
}

impl ProcessStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InvalidTransaction => "invalid_transaction",
            Self::InternalError => "internal_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpProcessResponse {
    pub status: ProcessStatus,
    pub message: String,
    /// Opaque detail attached to an invalid-transaction result.
    pub extended_data: Vec<u8>,
}

impl TpProcessResponse {
    pub fn ok() -> Self {
        Self {
            status: ProcessStatus::Ok,
            message: String::new(),
            extended_data: Vec::new(),
        }
    }

    pub fn invalid_transaction(message: impl Into<String>, extended_data: Vec<u8>) -> Self {
        Self {
            status: ProcessStatus::InvalidTransaction,
            message: message.into(),
            extended_data,
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            status: ProcessStatus::InternalError,
            message: message.into(),
            extended_data: Vec::new(),
        }
    }
}

// =============================================================================
// STATE ACCESS
// =============================================================================

/// One address/value pair in global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpStateEntry {
    pub address: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateStatus {
    Ok,
    /// The address is outside the transaction's declared inputs/outputs.
    AuthorizationError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpStateGetRequest {
    pub context_id: String,
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpStateGetResponse {
    /// Empty `data` means the address holds no value.
    pub entries: Vec<TpStateEntry>,
    pub status: StateStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpStateSetRequest {
    pub context_id: String,
    pub entries: Vec<TpStateEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpStateSetResponse {
    /// Addresses actually written.
    pub addresses: Vec<String>,
    pub status: StateStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpStateDeleteRequest {
    pub context_id: String,
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpStateDeleteResponse {
    /// Addresses actually deleted.
    pub addresses: Vec<String>,
    pub status: StateStatus,
}

// =============================================================================
// RECEIPTS AND EVENTS
// =============================================================================

/// Outcome of a receipt-data or event append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppendStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpReceiptAddDataRequest {
    pub context_id: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpReceiptAddDataResponse {
    pub status: AppendStatus,
}

/// Application event emitted during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub attributes: Vec<(String, String)>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpEventAddRequest {
    pub context_id: String,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpEventAddResponse {
    pub status: AppendStatus,
}
