//! Transport abstraction - the seam between the session and the socket
//!
//! A `Connector` opens one full-duplex channel and hands back its two
//! halves. `Transport` owns the lifecycle on top of any connector:
//! idempotent connect, graceful disconnect, reconnection after abnormal
//! closes and an observable status.

use crate::error::Result;
use async_trait::async_trait;

pub mod connection;
pub mod memory;
pub mod ws;

pub use connection::{Transport, TransportEvent, TransportStatus};

/// Close code for a clean, intentional close
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the peer vanished without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// A frame received from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// JSON text frame
    Text(String),
    /// Peer-initiated close
    Close { code: u16, reason: String },
}

/// Write half of an open channel
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Send a close frame with the given code
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

/// Read half of an open channel
#[async_trait]
pub trait FrameStream: Send {
    /// Next frame; `None` means the channel ended without a close frame
    async fn next_frame(&mut self) -> Option<Result<Frame>>;
}

/// Opens channels to an endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)>;

    /// Connector name (e.g., "websocket", "memory")
    fn name(&self) -> &str;
}
