//! Processor errors.

use crate::config::ConfigError;
use crate::processor::ProcessorState;
use crate::registry::RegistryError;
use thiserror::Error;
use tp_channel::TransportError;
use tp_dispatch::DispatchError;

#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The operation is not allowed in the current lifecycle state.
    #[error("cannot {operation} while processor is {state}")]
    InvalidState {
        operation: &'static str,
        state: ProcessorState,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The validator refused a handler registration.
    #[error("validator rejected registration of {family} {version}")]
    RegistrationFailed { family: String, version: String },

    #[error("no transaction handlers registered")]
    NoHandlersRegistered,

    /// The connection to the validator was lost.
    #[error("channel closed")]
    ChannelClosed,

    #[error("dispatch error: {0}")]
    Dispatch(DispatchError),

    #[error("transport error: {0}")]
    Transport(TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<DispatchError> for ProcessorError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::ChannelClosed => Self::ChannelClosed,
            other => Self::Dispatch(other),
        }
    }
}

impl From<TransportError> for ProcessorError {
    fn from(err: TransportError) -> Self {
        if err.is_closed() {
            Self::ChannelClosed
        } else {
            Self::Transport(err)
        }
    }
}
