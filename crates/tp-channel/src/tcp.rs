//! TCP transport with u32 big-endian length-prefixed frames.

use crate::endpoint::parse_endpoint;
use crate::error::TransportError;
use crate::Channel;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A framed TCP connection.
///
/// Each half sits behind its own async mutex, so one reader and any number
/// of writers can make progress independently while whole frames are
/// written atomically.
pub struct TcpChannel {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    max_frame_size: usize,
    closed: AtomicBool,
}

impl TcpChannel {
    /// Connect to `endpoint` (`tcp://host:port` or `host:port`).
    pub async fn connect(endpoint: &str, max_frame_size: usize) -> Result<Self, TransportError> {
        let address = parse_endpoint(endpoint)?;
        let stream = TcpStream::connect(&address).await?;
        info!(endpoint = %address, "Connected to validator");
        Ok(Self::from_stream(stream, max_frame_size))
    }

    /// Wrap an already established stream.
    pub fn from_stream(stream: TcpStream, max_frame_size: usize) -> Self {
        // Frames are small and latency-bound.
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            max_frame_size,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Channel for TcpChannel {
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        if frame.len() > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: self.max_frame_size,
            });
        }
        let len = u32::try_from(frame.len()).map_err(|_| TransportError::FrameTooLarge {
            size: frame.len(),
            max: u32::MAX as usize,
        })?;

        let mut writer = self.writer.lock().await;
        writer.write_all(&len.to_be_bytes()).await?;
        writer.write_all(frame).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<u8>, TransportError> {
        let mut reader = self.reader.lock().await;

        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("Peer closed connection");
                return Err(TransportError::Closed);
            }
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        let mut frame = vec![0u8; len];
        match reader.read_exact(&mut frame).await {
            Ok(_) => Ok(frame),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(TransportError::Closed),
            Err(e) => Err(e.into()),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        match writer.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.kind() == std::io::ErrorKind::NotConnected {
                    return Ok(());
                }
                let err = TransportError::from(e);
                if err.is_closed() {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }
}
