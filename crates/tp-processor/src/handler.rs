//! # Transaction Handler Contract
//!
//! Business logic plugs into the processor by implementing
//! [`TransactionHandler`]. One handler serves one family, under one or more
//! versions.
//!
//! ## Example Implementation
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use tp_processor::{ApplyError, TransactionContext, TransactionHandler};
//! use tp_types::TpProcessRequest;
//!
//! pub struct Counter;
//!
//! #[async_trait]
//! impl TransactionHandler for Counter {
//!     fn family_name(&self) -> String { "counter".into() }
//!     fn family_versions(&self) -> Vec<String> { vec!["1.0".into()] }
//!     fn namespaces(&self) -> Vec<String> { vec!["c0ffee".into()] }
//!
//!     async fn apply(
//!         &self,
//!         request: &TpProcessRequest,
//!         context: &dyn TransactionContext,
//!     ) -> Result<(), ApplyError> {
//!         context.set_state_entry("c0ffee00".into(), request.payload.clone()).await?;
//!         Ok(())
//!     }
//! }
//! ```

use crate::context::{ContextError, TransactionContext};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tp_types::{TpProcessRequest, TpProcessResponse};

/// Executes transactions of one family.
#[async_trait]
pub trait TransactionHandler: Send + Sync {
    /// Family this handler executes.
    fn family_name(&self) -> String;

    /// Versions of the family this handler understands. Must not be empty.
    fn family_versions(&self) -> Vec<String>;

    /// State address prefixes advertised to the validator.
    fn namespaces(&self) -> Vec<String>;

    /// Execute one transaction.
    ///
    /// The request header is always populated when this is called.
    async fn apply(
        &self,
        request: &TpProcessRequest,
        context: &dyn TransactionContext,
    ) -> Result<(), ApplyError>;
}

/// Type alias for a shared handler.
pub type DynHandler = Arc<dyn TransactionHandler>;

/// Why a transaction was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// The transaction is semantically invalid. Not retried.
    #[error("invalid transaction: {message}")]
    InvalidTransaction {
        message: String,
        extended_data: Vec<u8>,
    },

    /// Something went wrong executing an otherwise acceptable transaction.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ApplyError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidTransaction {
            message: message.into(),
            extended_data: Vec::new(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// The response reported to the validator for this failure.
    pub fn into_response(self) -> TpProcessResponse {
        match self {
            Self::InvalidTransaction {
                message,
                extended_data,
            } => TpProcessResponse::invalid_transaction(message, extended_data),
            Self::InternalError(message) => TpProcessResponse::internal_error(message),
        }
    }
}

impl From<ContextError> for ApplyError {
    fn from(err: ContextError) -> Self {
        Self::InternalError(err.to_string())
    }
}
