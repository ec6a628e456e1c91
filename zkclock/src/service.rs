//! Transport selection and dispatch
//!
//! [`DeviceService`] tries TCP first and falls back to UDP when the
//! device refuses the stream connection. Every operation afterwards goes
//! through the driver that won.

use std::io;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};
use zkclock_core::TransportKind;
use zkclock_protocol::{EventHandler, ProgressHandler, RecordSet};
use zkclock_transport::SocketCallbacks;
use zkclock_types::{AttendanceRecord, DeviceInfo, UserRecord};

use crate::config::DeviceConfig;
use crate::driver::{DeviceDriver, TcpDriver, UdpDriver};
use crate::error::{Error, Result};

/// Where the service is in its connect sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    ConnectingTcp,
    ConnectedTcp,
    ConnectingUdp,
    ConnectedUdp,
}

/// Device client with TCP → UDP fallback
///
/// ```no_run
/// use zkclock::{DeviceConfig, DeviceService};
///
/// # async fn run() -> zkclock::Result<()> {
/// let mut service = DeviceService::new(DeviceConfig::new("192.168.1.201"));
/// service.connect().await?;
///
/// let users = service.get_users().await?;
/// println!("{} users", users.records.len());
///
/// service.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct DeviceService<S = TcpDriver, D = UdpDriver> {
    ip: String,
    tcp: S,
    udp: D,
    callbacks: SocketCallbacks,
    active: Option<TransportKind>,
    state: ConnectionState,
}

impl DeviceService {
    pub fn new(config: DeviceConfig) -> Self {
        let tcp = TcpDriver::from_config(&config);
        let udp = UdpDriver::from_config(&config);
        Self::with_drivers(config.ip, tcp, udp)
    }
}

/// The driver selected by the guard, with what an error needs to say
struct Active<'a> {
    transport: TransportKind,
    ip: &'a str,
    driver: &'a mut dyn DeviceDriver,
}

impl Active<'_> {
    fn wrap<T>(&self, result: zkclock_protocol::Result<T>) -> Result<T> {
        result.map_err(|source| Error::Operation {
            transport: self.transport,
            ip: self.ip.to_string(),
            source,
        })
    }
}

impl<S: DeviceDriver, D: DeviceDriver> DeviceService<S, D> {
    pub fn with_drivers(ip: impl Into<String>, tcp: S, udp: D) -> Self {
        Self {
            ip: ip.into(),
            tcp,
            udp,
            callbacks: SocketCallbacks::new(),
            active: None,
            state: ConnectionState::Disconnected,
        }
    }

    /// Socket hooks used by the next [`connect`](Self::connect)
    pub fn with_callbacks(mut self, callbacks: SocketCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn active_transport(&self) -> Option<TransportKind> {
        self.active
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Open a session, TCP first
    ///
    /// A refused TCP connection moves on to UDP; any other TCP failure
    /// ends the attempt. A driver whose socket is still open is reused
    /// as is, so an existing UDP binding is kept; a taken local port is
    /// handled by the transport binding an ephemeral one.
    pub async fn connect(&mut self) -> Result<()> {
        self.state = ConnectionState::ConnectingTcp;
        info!(ip = %self.ip, "Connecting via TCP");

        match open(&mut self.tcp, self.callbacks.clone()).await {
            Ok(()) => {
                self.active = Some(TransportKind::Tcp);
                self.state = ConnectionState::ConnectedTcp;
                return Ok(());
            }
            Err(e) if e.io_kind() == Some(io::ErrorKind::ConnectionRefused) => {
                warn!(ip = %self.ip, error = %e, "TCP refused, falling back to UDP");
                self.tcp.disconnect().await;
            }
            Err(e) => {
                warn!(ip = %self.ip, error = %e, "TCP connect failed");
                self.tcp.disconnect().await;
                self.state = ConnectionState::Disconnected;
                return Err(Error::Connect {
                    transport: TransportKind::Tcp,
                    ip: self.ip.clone(),
                    source: e,
                });
            }
        }

        self.state = ConnectionState::ConnectingUdp;
        info!(ip = %self.ip, "Connecting via UDP");

        if let Err(e) = open(&mut self.udp, self.callbacks.clone()).await {
            warn!(ip = %self.ip, error = %e, "UDP connect failed");
            self.udp.disconnect().await;
            self.state = ConnectionState::Disconnected;
            return Err(Error::Connect {
                transport: TransportKind::Udp,
                ip: self.ip.clone(),
                source: e,
            });
        }

        self.active = Some(TransportKind::Udp);
        self.state = ConnectionState::ConnectedUdp;
        Ok(())
    }

    /// Install socket hooks and connect
    pub async fn create_socket(&mut self, callbacks: SocketCallbacks) -> Result<()> {
        self.callbacks = callbacks;
        self.connect().await
    }

    fn guard(&mut self) -> Result<Active<'_>> {
        let driver: &mut dyn DeviceDriver = match self.active {
            Some(TransportKind::Tcp) if self.tcp.is_socket_open() => &mut self.tcp,
            Some(TransportKind::Udp) if self.udp.is_socket_open() => &mut self.udp,
            transport => {
                return Err(Error::NotConnected {
                    transport,
                    ip: self.ip.clone(),
                });
            }
        };

        Ok(Active {
            transport: driver.kind(),
            ip: &self.ip,
            driver,
        })
    }

    pub async fn get_users(&mut self) -> Result<RecordSet<UserRecord>> {
        let active = self.guard()?;
        let result = active.driver.get_users().await;
        active.wrap(result)
    }

    pub async fn get_attendances(
        &mut self,
        progress: Option<ProgressHandler>,
    ) -> Result<RecordSet<AttendanceRecord>> {
        let active = self.guard()?;
        let result = active.driver.get_attendances(progress).await;
        active.wrap(result)
    }

    pub async fn get_real_time_logs(&mut self, handler: EventHandler) -> Result<()> {
        let active = self.guard()?;
        let result = active.driver.get_real_time_logs(handler).await;
        active.wrap(result)
    }

    pub async fn get_time(&mut self) -> Result<NaiveDateTime> {
        let active = self.guard()?;
        let result = active.driver.get_time().await;
        active.wrap(result)
    }

    pub async fn get_info(&mut self) -> Result<DeviceInfo> {
        let active = self.guard()?;
        let result = active.driver.get_info().await;
        active.wrap(result)
    }

    pub async fn enable_device(&mut self) -> Result<()> {
        let active = self.guard()?;
        let result = active.driver.enable_device().await;
        active.wrap(result)
    }

    pub async fn disable_device(&mut self) -> Result<()> {
        let active = self.guard()?;
        let result = active.driver.disable_device().await;
        active.wrap(result)
    }

    pub async fn clear_attendance_log(&mut self) -> Result<()> {
        let active = self.guard()?;
        let result = active.driver.clear_attendance_log().await;
        active.wrap(result)
    }

    pub async fn free_data(&mut self) -> Result<()> {
        let active = self.guard()?;
        let result = active.driver.free_data().await;
        active.wrap(result)
    }

    /// Close the active session
    pub async fn disconnect(&mut self) -> Result<bool> {
        let active = self.guard()?;
        let closed = active.driver.disconnect().await;

        self.active = None;
        self.state = ConnectionState::Disconnected;
        Ok(closed)
    }
}

async fn open<T: DeviceDriver + ?Sized>(
    driver: &mut T,
    callbacks: SocketCallbacks,
) -> zkclock_protocol::Result<()> {
    if driver.is_socket_open() {
        debug!(transport = %driver.kind(), "Socket already open");
        return Ok(());
    }
    driver.create_socket(callbacks).await?;
    driver.connect().await
}
