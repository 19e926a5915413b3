//! # Transaction Processor Test Suite
//!
//! Cross-crate tests driving a full processor against a scripted validator.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # MockValidator, RunningProcessor, scripted handlers
//! └── integration/      # End-to-end flows over an in-memory channel
//!     ├── processor_flows.rs
//!     ├── multiplexing.rs
//!     └── intkey_flow.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p tp-tests
//!
//! # By category
//! cargo test -p tp-tests integration::multiplexing
//!
//! # Benchmarks
//! cargo bench -p tp-tests
//! ```

pub mod integration;
