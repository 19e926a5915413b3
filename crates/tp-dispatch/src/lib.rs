//! # TP Dispatch
//!
//! Request/reply multiplexing over a single processor connection.
//!
//! ```text
//!   handler tasks ──send_and_receive──┐
//!                                     ▼
//!                           ┌──────────────────┐   frames   ┌───────────┐
//!                           │ MessageDispatcher│◄──────────►│ Validator │
//!                           └──────────────────┘            └───────────┘
//!                             │              │
//!          known token ───────┘              └─────── unknown token
//!   CorrelationRegistry::complete            unsolicited queue
//!   (wakes exactly one waiter)               (next_unsolicited)
//! ```

pub mod dispatcher;
pub mod error;
pub mod registry;

pub use dispatcher::{MessageDispatcher, DEFAULT_REQUEST_TIMEOUT};
pub use error::DispatchError;
pub use registry::{CorrelationRegistry, PendingStats};
