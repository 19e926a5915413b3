//! # Execution Context
//!
//! State, receipt, and event access for one handler invocation. Every call is
//! one correlated round trip through the dispatcher, so contexts belonging to
//! concurrent invocations never see each other's replies.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tp_dispatch::{DispatchError, MessageDispatcher};
use tp_types::{
    AppendStatus, Event, StateStatus, TpEventAddRequest, TpEventAddResponse,
    TpReceiptAddDataRequest, TpReceiptAddDataResponse, TpStateDeleteRequest,
    TpStateDeleteResponse, TpStateEntry, TpStateGetRequest, TpStateGetResponse, TpStateSetRequest,
    TpStateSetResponse,
};

#[derive(Debug, Error)]
pub enum ContextError {
    /// The validator refused access to one of the addresses.
    #[error("state access denied for addresses {0:?}")]
    StateAccess(Vec<String>),

    #[error("validator rejected receipt data")]
    ReceiptError,

    #[error("validator rejected event '{0}'")]
    EventError(String),

    #[error("no reply from validator within {0:?}")]
    Timeout(Duration),

    #[error("channel closed")]
    ChannelClosed,

    #[error("dispatch error: {0}")]
    Dispatch(DispatchError),
}

impl From<DispatchError> for ContextError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::ChannelClosed => Self::ChannelClosed,
            DispatchError::Timeout { timeout, .. } => Self::Timeout(timeout),
            other => Self::Dispatch(other),
        }
    }
}

/// Operations a handler may perform while applying a transaction.
#[async_trait]
pub trait TransactionContext: Send + Sync {
    /// Read the given addresses. Addresses without data are absent from the
    /// returned map.
    async fn get_state(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, ContextError>;

    /// Write entries, returning the addresses the validator accepted.
    async fn set_state(
        &self,
        entries: Vec<(String, Vec<u8>)>,
    ) -> Result<Vec<String>, ContextError>;

    /// Delete addresses, returning those that were deleted.
    async fn delete_state(&self, addresses: &[String]) -> Result<Vec<String>, ContextError>;

    /// Attach opaque data to the transaction receipt.
    async fn add_receipt_data(&self, data: &[u8]) -> Result<(), ContextError>;

    /// Emit an event when the transaction commits.
    async fn add_event(
        &self,
        event_type: String,
        attributes: Vec<(String, String)>,
        data: &[u8],
    ) -> Result<(), ContextError>;

    /// Read a single address.
    async fn get_state_entry(&self, address: &str) -> Result<Option<Vec<u8>>, ContextError> {
        let mut entries = self.get_state(&[address.to_string()]).await?;
        Ok(entries.remove(address))
    }

    /// Write a single address.
    async fn set_state_entry(&self, address: String, data: Vec<u8>) -> Result<(), ContextError> {
        self.set_state(vec![(address, data)]).await.map(|_| ())
    }
}

/// Context backed by the processor's dispatcher.
pub struct MessageContext {
    dispatcher: Arc<MessageDispatcher>,
    context_id: String,
    timeout: Option<Duration>,
}

impl MessageContext {
    /// `timeout` of `None` uses the dispatcher's default.
    pub fn new(
        dispatcher: Arc<MessageDispatcher>,
        context_id: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            dispatcher,
            context_id: context_id.into(),
            timeout,
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }
}

#[async_trait]
impl TransactionContext for MessageContext {
    async fn get_state(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, ContextError> {
        let request = TpStateGetRequest {
            context_id: self.context_id.clone(),
            addresses: addresses.to_vec(),
        };
        let response: TpStateGetResponse = self
            .dispatcher
            .send_and_receive(&request, self.timeout)
            .await?;

        match response.status {
            StateStatus::Ok => Ok(response
                .entries
                .into_iter()
                .filter(|entry| !entry.data.is_empty())
                .map(|entry| (entry.address, entry.data))
                .collect()),
            StateStatus::AuthorizationError => Err(ContextError::StateAccess(request.addresses)),
        }
    }

    async fn set_state(
        &self,
        entries: Vec<(String, Vec<u8>)>,
    ) -> Result<Vec<String>, ContextError> {
        let request = TpStateSetRequest {
            context_id: self.context_id.clone(),
            entries: entries
                .into_iter()
                .map(|(address, data)| TpStateEntry { address, data })
                .collect(),
        };
        let response: TpStateSetResponse = self
            .dispatcher
            .send_and_receive(&request, self.timeout)
            .await?;

        match response.status {
            StateStatus::Ok => Ok(response.addresses),
            StateStatus::AuthorizationError => Err(ContextError::StateAccess(
                request.entries.into_iter().map(|e| e.address).collect(),
            )),
        }
    }

    async fn delete_state(&self, addresses: &[String]) -> Result<Vec<String>, ContextError> {
        let request = TpStateDeleteRequest {
            context_id: self.context_id.clone(),
            addresses: addresses.to_vec(),
        };
        let response: TpStateDeleteResponse = self
            .dispatcher
            .send_and_receive(&request, self.timeout)
            .await?;

        match response.status {
            StateStatus::Ok => Ok(response.addresses),
            StateStatus::AuthorizationError => Err(ContextError::StateAccess(request.addresses)),
        }
    }

    async fn add_receipt_data(&self, data: &[u8]) -> Result<(), ContextError> {
        let request = TpReceiptAddDataRequest {
            context_id: self.context_id.clone(),
            data: data.to_vec(),
        };
        let response: TpReceiptAddDataResponse = self
            .dispatcher
            .send_and_receive(&request, self.timeout)
            .await?;

        match response.status {
            AppendStatus::Ok => Ok(()),
            AppendStatus::Error => Err(ContextError::ReceiptError),
        }
    }

    async fn add_event(
        &self,
        event_type: String,
        attributes: Vec<(String, String)>,
        data: &[u8],
    ) -> Result<(), ContextError> {
        let request = TpEventAddRequest {
            context_id: self.context_id.clone(),
            event: Event {
                event_type,
                attributes,
                data: data.to_vec(),
            },
        };
        let response: TpEventAddResponse = self
            .dispatcher
            .send_and_receive(&request, self.timeout)
            .await?;

        match response.status {
            AppendStatus::Ok => Ok(()),
            AppendStatus::Error => Err(ContextError::EventError(request.event.event_type)),
        }
    }
}
