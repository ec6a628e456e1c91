//! Device command drivers
//!
//! A driver maps the semantic device operations onto protocol commands
//! for one transport. [`TcpDriver`] and [`UdpDriver`] differ only in the
//! transport they carry; the framing differences live below the engine.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};
use zkclock_core::constants::request;
use zkclock_core::{Command, Frame, TransportKind};
use zkclock_protocol::{
    EngineConfig, Error, EventHandler, ProgressHandler, ProtocolEngine, RecordSet, Result,
};
use zkclock_transport::{SocketCallbacks, TcpTransport, Transport, UdpTransport};
use zkclock_types::{decode_time, AttendanceRecord, DeviceInfo, UserRecord};

use crate::config::DeviceConfig;

/// Operations every transport variant supports
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceDriver: Send {
    /// Which transport this driver speaks
    fn kind(&self) -> TransportKind;

    fn is_socket_open(&self) -> bool;

    /// Open the socket without handshaking
    async fn create_socket(&mut self, callbacks: SocketCallbacks) -> Result<()>;

    /// CMD_CONNECT handshake
    async fn connect(&mut self) -> Result<()>;

    /// Device clock
    async fn get_time(&mut self) -> Result<NaiveDateTime>;

    /// User and log counters
    async fn get_info(&mut self) -> Result<DeviceInfo>;

    async fn enable_device(&mut self) -> Result<()>;

    /// Lock the keypad and sensor until re-enabled
    async fn disable_device(&mut self) -> Result<()>;

    async fn clear_attendance_log(&mut self) -> Result<()>;

    async fn free_data(&mut self) -> Result<()>;

    /// Best-effort CMD_EXIT, then close the socket
    async fn disconnect(&mut self) -> bool;

    async fn get_users(&mut self) -> Result<RecordSet<UserRecord>>;

    async fn get_attendances(
        &mut self,
        progress: Option<ProgressHandler>,
    ) -> Result<RecordSet<AttendanceRecord>>;

    /// Subscribe to live attendance pushes
    async fn get_real_time_logs(&mut self, handler: EventHandler) -> Result<()>;
}

/// Driver over any [`Transport`]
pub struct ZkDriver<T: Transport> {
    engine: ProtocolEngine<T>,
}

/// Driver speaking the prefixed stream framing
pub type TcpDriver = ZkDriver<TcpTransport>;

/// Driver speaking one frame per datagram
pub type UdpDriver = ZkDriver<UdpTransport>;

impl<T: Transport> ZkDriver<T> {
    pub fn new(transport: T, ip: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            engine: ProtocolEngine::new(transport, ip, config),
        }
    }

    pub fn engine(&self) -> &ProtocolEngine<T> {
        &self.engine
    }

    async fn command(&mut self, command: Command, payload: &[u8]) -> Result<Frame> {
        let reply = self.engine.execute_cmd(command, payload).await?;
        if !reply.is(Command::AckOk) {
            debug!(%command, reply = %Command::name_of(reply.command_id), "Device did not acknowledge");
        }
        Ok(reply)
    }
}

impl TcpDriver {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.tcp_transport(), config.ip.clone(), config.engine())
    }
}

impl UdpDriver {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.udp_transport(), config.ip.clone(), config.engine())
    }
}

#[async_trait]
impl<T: Transport> DeviceDriver for ZkDriver<T> {
    fn kind(&self) -> TransportKind {
        self.engine.kind()
    }

    fn is_socket_open(&self) -> bool {
        self.engine.is_socket_open()
    }

    async fn create_socket(&mut self, callbacks: SocketCallbacks) -> Result<()> {
        self.engine.create_socket(callbacks).await
    }

    async fn connect(&mut self) -> Result<()> {
        let reply = self.engine.execute_cmd(Command::Connect, &[]).await?;
        info!(
            transport = %self.kind(),
            ip = %self.engine.ip(),
            session_id = reply.session_id,
            "Connected"
        );
        Ok(())
    }

    async fn get_time(&mut self) -> Result<NaiveDateTime> {
        let reply = self.command(Command::GetTime, &[]).await?;
        let raw: [u8; 4] = reply
            .payload
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or(Error::ShortReply {
                expected: 4,
                actual: reply.payload.len(),
            })?;

        Ok(decode_time(u32::from_le_bytes(raw))?)
    }

    async fn get_info(&mut self) -> Result<DeviceInfo> {
        let reply = self.command(Command::GetFreeSizes, &[]).await?;
        Ok(DeviceInfo::decode(&reply.payload)?)
    }

    async fn enable_device(&mut self) -> Result<()> {
        self.command(Command::EnableDevice, &[]).await?;
        Ok(())
    }

    async fn disable_device(&mut self) -> Result<()> {
        self.command(Command::DisableDevice, &request::DISABLE_DEVICE).await?;
        Ok(())
    }

    async fn clear_attendance_log(&mut self) -> Result<()> {
        self.command(Command::ClearAttLog, &[]).await?;
        Ok(())
    }

    async fn free_data(&mut self) -> Result<()> {
        self.engine.free_data().await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> bool {
        let kind = self.kind();

        if self.engine.is_socket_open() {
            if let Err(e) = self.engine.execute_cmd(Command::Exit, &[]).await {
                warn!(transport = %kind, error = %e, "CMD_EXIT failed");
            }
        }

        if let Err(e) = self.engine.close_socket().await {
            warn!(transport = %kind, error = %e, "Failed to close socket");
        }

        info!(transport = %kind, ip = %self.engine.ip(), "Disconnected");
        true
    }

    async fn get_users(&mut self) -> Result<RecordSet<UserRecord>> {
        self.engine.get_users().await
    }

    async fn get_attendances(
        &mut self,
        progress: Option<ProgressHandler>,
    ) -> Result<RecordSet<AttendanceRecord>> {
        self.engine.get_attendances(progress).await
    }

    async fn get_real_time_logs(&mut self, handler: EventHandler) -> Result<()> {
        self.engine.get_real_time_logs(handler).await
    }
}
