//! # TP Processor
//!
//! The runtime core of a transaction processor.
//!
//! ## Lifecycle
//!
//! ```text
//! Created ──run()──► Registering ──all acks OK──► Running
//!    │                    │                          │ shutdown notification,
//!    │                    │ rejected / error         │ local shutdown, or
//!    │                    ▼                          ▼ channel loss
//!    └──────────────► Stopped ◄──────────────── Unregistering
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let processor = TransactionProcessor::new(ProcessorConfig::from_env());
//! processor.register_handler(Arc::new(MyHandler))?;
//! processor.run().await?;
//! ```

pub mod config;
pub mod context;
pub mod error;
mod execution;
pub mod handler;
pub mod processor;
pub mod registry;

pub use config::{ConfigError, ProcessorConfig};
pub use context::{ContextError, MessageContext, TransactionContext};
pub use error::ProcessorError;
pub use handler::{ApplyError, DynHandler, TransactionHandler};
pub use processor::{ProcessorState, ShutdownHandle, TransactionProcessor};
pub use registry::{HandlerDescriptor, HandlerRegistry, RegistryError};
