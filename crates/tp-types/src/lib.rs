//! # TP Types Crate
//!
//! The wire vocabulary shared by the dispatcher, the processor core and any
//! code that speaks to a validator on a processor's behalf.
//!
//! ## Layout
//!
//! - [`correlation`]: the opaque token linking a request to its reply.
//! - [`message`]: the `Message` envelope and its `MessageType` tag.
//! - [`payloads`]: every `Tp*` request/response body.
//! - [`features`]: feature-version negotiation and request header styles.
//! - [`codec`]: the serialization collaborator (serde + bincode).
//!
//! ## Envelope Rules
//!
//! - Every frame carries exactly one `Message`.
//! - A reply reuses the `correlation_id` of the request it answers.
//! - Payload types know their own tag through [`ProtocolMessage`], so a
//!   typed send cannot mislabel its body.

pub mod codec;
pub mod correlation;
pub mod features;
pub mod message;
pub mod payloads;

pub use codec::CodecError;
pub use correlation::CorrelationId;
pub use features::{FeatureVersion, HeaderStyle, ParseHeaderStyleError};
pub use message::{Message, MessageType, ProtocolMessage};
pub use payloads::*;
