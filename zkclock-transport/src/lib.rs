//! Transport layer for ZKTeco terminals
//!
//! Each transport owns its socket and a reader task. Inbound frames are
//! published on a broadcast channel so that a request/response exchange
//! and the real-time event listener can consume the same stream.

pub mod error;
mod link;
pub mod tcp;
pub mod udp;

pub use error::{Error, Result};
pub use link::SocketCallbacks;
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

use async_trait::async_trait;
use tokio::sync::broadcast;
use zkclock_core::{Frame, TransportKind};

/// Broadcast capacity for inbound frames
pub const INBOUND_CAPACITY: usize = 1024;

/// Message published by a transport's reader task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// One complete frame
    Frame(Frame),
    /// The socket went away; nothing follows
    Closed,
}

/// Message-stream abstraction over a device socket
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which framing this transport uses
    fn kind(&self) -> TransportKind;

    /// Open the socket and start the reader task
    async fn open(&mut self, callbacks: SocketCallbacks) -> Result<()>;

    /// Close the socket; always resolves to `true` within the close guard
    async fn close(&mut self) -> Result<bool>;

    /// Check if the link is up
    fn is_open(&self) -> bool;

    /// Send one complete frame
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receiver for every frame published from now on
    fn subscribe(&self) -> Result<broadcast::Receiver<Inbound>>;

    /// Get remote address
    fn remote_addr(&self) -> String;
}
