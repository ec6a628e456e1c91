//! UDP transport for ZKTeco devices
//!
//! One datagram carries exactly one frame, without the TCP prefix.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use zkclock_core::constants::DEFAULT_TIMEOUT;
use zkclock_core::{Frame, TransportKind};

use crate::link::{Link, SocketCallbacks};
use crate::{error::*, Inbound, Transport, INBOUND_CAPACITY};

/// Largest datagram the reader accepts
const MAX_DATAGRAM: usize = 64 * 1024;

/// UDP transport for ZKTeco devices
pub struct UdpTransport {
    addr: String,
    port: u16,
    local_port: u16,
    remote_addr: Option<SocketAddr>,
    socket: Option<Arc<UdpSocket>>,
    reader: Option<JoinHandle<()>>,
    events: Option<broadcast::Sender<Inbound>>,
    link: Arc<Link>,
    connect_timeout: Duration,
}

impl UdpTransport {
    /// Create new UDP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            local_port: 0,
            remote_addr: None,
            socket: None,
            reader: None,
            events: None,
            link: Link::new(TransportKind::Udp),
            connect_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the local port to bind (0 picks an ephemeral one)
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    /// Set connection timeout (covers resolve and bind)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.remote_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addr = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .next()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.remote_addr = Some(addr);
        Ok(addr)
    }

    /// Bind the configured local port, or an ephemeral one when it is taken
    async fn bind(&self, remote: SocketAddr) -> io::Result<UdpSocket> {
        let local = |port: u16| -> SocketAddr {
            if remote.is_ipv4() {
                ([0, 0, 0, 0], port).into()
            } else {
                ([0u16; 8], port).into()
            }
        };

        let socket = match UdpSocket::bind(local(self.local_port)).await {
            Ok(socket) => socket,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && self.local_port != 0 => {
                warn!(local_port = self.local_port, "Local port in use, binding an ephemeral one");
                UdpSocket::bind(local(0)).await?
            }
            Err(e) => return Err(e),
        };
        // Sets the default send target and filters inbound datagrams
        socket.connect(remote).await?;
        Ok(socket)
    }
}

async fn read_loop(socket: Arc<UdpSocket>, events: broadcast::Sender<Inbound>, link: Arc<Link>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let n = match socket.recv(&mut buf).await {
            Ok(n) => n,
            // ICMP port unreachable surfaces here; the socket is still usable
            Err(e) if matches!(e.kind(), io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset) => {
                debug!(error = %e, "UDP peer unreachable");
                link.report_error(&e);
                continue;
            }
            Err(e) => {
                warn!(error = %e, "UDP receive failed");
                link.report_error(&e);
                break;
            }
        };

        trace!(len = n, bytes = %hex::encode(&buf[..n]), "Received UDP datagram");

        match Frame::decode(TransportKind::Udp, &buf[..n]) {
            Ok(frame) => {
                trace!(%frame, "Received frame");
                let _ = events.send(Inbound::Frame(frame));
            }
            Err(e) => warn!(error = %e, "Dropping malformed datagram"),
        }
    }

    link.mark_closed();
    let _ = events.send(Inbound::Closed);
}

#[async_trait]
impl Transport for UdpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    async fn open(&mut self, callbacks: SocketCallbacks) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyConnected);
        }

        let remote = self.resolve_addr().await?;
        self.link.set_callbacks(callbacks);

        debug!(local_port = self.local_port, "Opening UDP socket to {}...", remote);

        let socket = match timeout(self.connect_timeout, self.bind(remote)).await {
            Err(_) => return Err(Error::ConnectionTimeout),
            Ok(Err(e)) => {
                self.link.report_error(&e);
                return Err(Error::Io(e));
            }
            Ok(Ok(socket)) => Arc::new(socket),
        };

        let (events, _) = broadcast::channel(INBOUND_CAPACITY);

        self.link.mark_open();
        self.reader = Some(tokio::spawn(read_loop(
            socket.clone(),
            events.clone(),
            self.link.clone(),
        )));
        self.socket = Some(socket);
        self.events = Some(events);

        info!("Listening for {} via UDP", remote);
        Ok(())
    }

    async fn close(&mut self) -> Result<bool> {
        if self.socket.take().is_some() {
            debug!("Disconnecting from {}...", self.remote_addr());
        }

        // The reader holds the other socket handle; aborting it releases the port
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
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;

        trace!(len = data.len(), bytes = %hex::encode(data), "Sending UDP datagram");

        socket.send(data).await?;

        Ok(())
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<Inbound>> {
        self.events
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(Error::NotConnected)
    }

    fn remote_addr(&self) -> String {
        self.remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
