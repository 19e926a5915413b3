//! # TP Channel
//!
//! The byte-frame transport under a processor connection.
//!
//! A [`Channel`] moves whole frames: one `send` is one frame, one `receive`
//! yields one frame. Implementations serialize concurrent writers internally
//! so frames never interleave on the wire.
//!
//! ## Implementations
//!
//! - [`TcpChannel`]: length-prefixed frames over TCP (production).
//! - [`MemoryChannel`]: an in-process pair for tests and embedding.

pub mod endpoint;
pub mod error;
pub mod memory;
pub mod tcp;

pub use endpoint::parse_endpoint;
pub use error::TransportError;
pub use memory::MemoryChannel;
pub use tcp::TcpChannel;

use async_trait::async_trait;

/// Largest frame accepted by default (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A duplex, frame-oriented transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Write one frame. Frames from concurrent callers never interleave.
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Read the next frame, waiting until one is available.
    ///
    /// Returns [`TransportError::Closed`] once the peer has gone away.
    async fn receive(&self) -> Result<Vec<u8>, TransportError>;

    /// Close the write side. Idempotent.
    async fn close(&self) -> Result<(), TransportError>;
}
