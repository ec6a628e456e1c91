//! TCP transport
//!
//! Frames carry the 8-byte magic/length prefix. Reads are fed through a
//! [`StreamReassembler`] so that coalesced or split frames come out whole.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use zkclock_core::constants::{CLOSE_GUARD_TIMEOUT, DEFAULT_TIMEOUT};
use zkclock_core::{StreamReassembler, TransportKind};

use crate::link::{Link, SocketCallbacks};
use crate::{error::*, Inbound, Transport, INBOUND_CAPACITY};

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// TCP transport for ZKTeco devices
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    writer: Option<OwnedWriteHalf>,
    reader: Option<JoinHandle<()>>,
    events: Option<broadcast::Sender<Inbound>>,
    link: Arc<Link>,
    connect_timeout: Duration,
    max_frame: usize,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            writer: None,
            reader: None,
            events: None,
            link: Link::new(TransportKind::Tcp),
            connect_timeout: DEFAULT_TIMEOUT,
            max_frame: StreamReassembler::DEFAULT_MAX_FRAME,
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the largest inner frame the reassembler accepts
    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addr = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .next()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(addr);
        Ok(addr)
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    events: broadcast::Sender<Inbound>,
    link: Arc<Link>,
    max_frame: usize,
) {
    let mut reassembler = StreamReassembler::with_max_frame(max_frame);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("TCP connection closed by remote");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "TCP read failed");
                link.report_error(&e);
                break;
            }
        };

        trace!(len = n, bytes = %hex::encode(&buf[..n]), "Received TCP bytes");
        reassembler.push(&buf[..n]);

        loop {
            match reassembler.next_frame() {
                Ok(Some(frame)) => {
                    trace!(%frame, "Received frame");
                    // No subscribers is fine
                    let _ = events.send(Inbound::Frame(frame));
                }
                Ok(None) => break,
                Err(e) => warn!(error = %e, "Dropping undecodable TCP bytes"),
            }
        }
    }

    link.mark_closed();
    let _ = events.send(Inbound::Closed);
}

#[async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    async fn open(&mut self, callbacks: SocketCallbacks) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyConnected);
        }

        let addr = self.resolve_addr().await?;
        self.link.set_callbacks(callbacks);

        debug!("Connecting to {} via TCP...", addr);

        let stream = match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Err(_) => return Err(Error::ConnectionTimeout),
            Ok(Err(e)) => {
                self.link.report_error(&e);
                return Err(Error::Io(e));
            }
            Ok(Ok(stream)) => stream,
        };

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        let (events, _) = broadcast::channel(INBOUND_CAPACITY);

        self.link.mark_open();
        self.reader = Some(tokio::spawn(read_loop(
            reader,
            events.clone(),
            self.link.clone(),
            self.max_frame,
        )));
        self.writer = Some(writer);
        self.events = Some(events);

        info!("Connected to {} via TCP", addr);
        Ok(())
    }

    async fn close(&mut self) -> Result<bool> {
        if let Some(mut writer) = self.writer.take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            match timeout(CLOSE_GUARD_TIMEOUT, writer.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "TCP shutdown failed"),
                Err(_) => warn!("TCP shutdown did not finish within the close guard"),
            }
        }

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(events) = self.events.take() {
            let _ = events.send(Inbound::Closed);
        }
        self.link.mark_closed();

        Ok(true)
    }

    fn is_open(&self) -> bool {
        self.link.is_open()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.link.is_open() {
            return Err(Error::NotConnected);
        }
        let writer = self.writer.as_mut().ok_or(Error::NotConnected)?;

        trace!(len = data.len(), bytes = %hex::encode(data), "Sending TCP frame");

        writer.write_all(data).await?;
        writer.flush().await?;

        Ok(())
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<Inbound>> {
        self.events
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(Error::NotConnected)
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            if self.link.is_open() {
                warn!("TCP transport dropped while still connected");
            }
            reader.abort();
        }
    }
}
