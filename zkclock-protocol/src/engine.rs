//! Protocol engine
//!
//! Drives one device session over a [`Transport`]: builds requests,
//! matches replies, runs chunked bulk reads and attaches the real-time
//! event listener. All exchanges are sequential; `&mut self` on every
//! operation keeps it that way.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, trace, warn};
use zkclock_core::constants::{request, MAX_CHUNK, TCP_CHUNK_TIMEOUT, UDP_CHUNK_TIMEOUT};
use zkclock_core::{build_request, Command, EventFlags, Frame, Session, TransportKind};
use zkclock_transport::{Inbound, SocketCallbacks, Transport};
use zkclock_types::{AttendanceRecord, RealTimeLog, UserRecord};

use crate::error::{Error, Result};
use crate::transfer::{Absorb, BulkTransfer, ChunkPlan};

/// Called with `(bytes_received, total_bytes)` as a bulk read advances
pub type ProgressHandler = Box<dyn FnMut(usize, usize) + Send>;

/// Called for every real-time attendance push
pub type EventHandler = Box<dyn FnMut(RealTimeLog) + Send>;

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Reply window for everything except CMD_CONNECT / CMD_EXIT
    pub timeout: Duration,

    /// Largest window requested per CMD_DATA_RDY
    pub chunk_size: usize,

    /// Inactivity window during a chunked read; `None` uses the transport default
    pub chunk_timeout: Option<Duration>,

    /// Reject solicited replies whose checksum does not verify
    pub strict_checksum: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: zkclock_core::constants::DEFAULT_TIMEOUT,
            chunk_size: MAX_CHUNK,
            chunk_timeout: None,
            strict_checksum: false,
        }
    }
}

impl EngineConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_chunk_timeout(mut self, chunk_timeout: Duration) -> Self {
        self.chunk_timeout = Some(chunk_timeout);
        self
    }

    pub fn with_strict_checksum(mut self, strict: bool) -> Self {
        self.strict_checksum = strict;
        self
    }

    /// Chunk inactivity window for a transport
    pub fn chunk_timeout_for(&self, kind: TransportKind) -> Duration {
        self.chunk_timeout.unwrap_or(match kind {
            TransportKind::Tcp => TCP_CHUNK_TIMEOUT,
            TransportKind::Udp => UDP_CHUNK_TIMEOUT,
        })
    }
}

/// Result of a bulk read
#[derive(Debug)]
pub struct BulkRead {
    pub data: Bytes,
    /// The whole table came back in the first CMD_DATA reply
    pub inline: bool,
    /// Set when the transfer ended early; `data` holds what arrived
    pub error: Option<Error>,
}

/// Decoded records plus the trailing error of a partial transfer
#[derive(Debug)]
pub struct RecordSet<T> {
    pub records: Vec<T>,
    pub error: Option<Error>,
}

impl<T> RecordSet<T> {
    /// True when every requested byte arrived
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Protocol engine for one connection
pub struct ProtocolEngine<T: Transport> {
    transport: T,
    session: Session,
    config: EngineConfig,
    ip: String,
    listener: Option<JoinHandle<()>>,
}

impl<T: Transport> ProtocolEngine<T> {
    pub fn new(transport: T, ip: impl Into<String>, config: EngineConfig) -> Self {
        let session = Session::new(transport.kind(), config.timeout);
        Self {
            transport,
            session,
            config,
            ip: ip.into(),
            listener: None,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Open the underlying socket
    pub async fn create_socket(&mut self, callbacks: SocketCallbacks) -> Result<()> {
        self.transport.open(callbacks).await?;
        Ok(())
    }

    pub fn is_socket_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Send one command and wait for its reply
    ///
    /// CMD_CONNECT restarts the session and adopts the session id the
    /// device answers with.
    pub async fn execute_cmd(&mut self, command: Command, payload: &[u8]) -> Result<Frame> {
        let kind = self.kind();
        let (session_id, reply_id) = self.session.next_ids(command);
        let window = self.session.timeout_for(command);
        let buf = build_request(kind, command, session_id, reply_id, payload);

        debug!(transport = %kind, %command, session_id, reply_id, "Executing command");

        let mut rx = self.transport.subscribe()?;
        timeout(window, self.transport.send(&buf))
            .await
            .map_err(|_| Error::WriteTimeout(command))??;

        let reply = timeout(window, recv_reply(&mut rx, kind, |_| true))
            .await
            .map_err(|_| Error::ResponseTimeout(command))??;
        self.check_reply(&reply)?;

        trace!(%reply, "Reply received");

        if command == Command::Connect {
            self.session.establish(reply.session_id);
        }
        Ok(reply)
    }

    /// Fetch a table with CMD_DATA_WRRQ
    ///
    /// Errors before the transfer starts are returned as `Err`; once
    /// chunks are flowing, a timeout or a closed socket ends the read
    /// with the partial data and the error in [`BulkRead::error`].
    pub async fn read_with_buffer(
        &mut self,
        request: &[u8],
        mut progress: Option<&mut ProgressHandler>,
    ) -> Result<BulkRead> {
        let kind = self.kind();
        let (session_id, reply_id) = self.session.advance();
        let buf = build_request(kind, Command::DataWrrq, session_id, reply_id, request);

        let mut rx = self.transport.subscribe()?;
        timeout(self.config.timeout, self.transport.send(&buf))
            .await
            .map_err(|_| Error::WriteTimeout(Command::DataWrrq))??;

        // TCP replies carry at least one payload byte, UDP ones at least the size field
        let min_payload = match kind {
            TransportKind::Tcp => 1,
            TransportKind::Udp => 5,
        };
        let reply = timeout(
            self.config.timeout,
            recv_reply(&mut rx, kind, |f| {
                f.is(Command::Data) || f.payload.len() >= min_payload
            }),
        )
        .await
        .map_err(|_| Error::ResponseTimeout(Command::DataWrrq))??;
        self.check_reply(&reply)?;

        match reply.command() {
            Some(Command::Data) => {
                debug!(len = reply.payload.len(), "Bulk data returned inline");
                Ok(BulkRead {
                    data: reply.payload,
                    inline: true,
                    error: None,
                })
            }
            Some(Command::AckOk) | Some(Command::PrepareData) => {
                if reply.payload.len() < 5 {
                    return Err(Error::ShortReply {
                        expected: 5,
                        actual: reply.payload.len(),
                    });
                }
                let p = &reply.payload;
                let total = u32::from_le_bytes([p[1], p[2], p[3], p[4]]) as usize;
                let plan = ChunkPlan::new(total, self.config.chunk_size);

                debug!(total, chunks = plan.chunk_count, "Starting chunked read");

                if plan.chunk_count == 0 {
                    return Ok(BulkRead {
                        data: Bytes::new(),
                        inline: false,
                        error: None,
                    });
                }

                for (start, size) in plan.requests() {
                    self.send_chunk_request(start, size).await;
                }

                Ok(self.collect_chunks(&mut rx, plan, &mut progress).await)
            }
            _ => Err(Error::UnhandledCommand(Command::name_of(reply.command_id))),
        }
    }

    async fn send_chunk_request(&mut self, start: u32, size: u32) {
        let kind = self.kind();
        let (session_id, reply_id) = self.session.advance();
        let payload = ChunkPlan::request_payload(start, size);
        let buf = build_request(kind, Command::DataRdy, session_id, reply_id, &payload);

        trace!(start, size, "Requesting chunk");

        // A lost request shows up as a chunk timeout
        if let Err(e) = self.transport.send(&buf).await {
            warn!(transport = %kind, start, size, error = %e, "Failed to send chunk request");
        }
    }

    async fn collect_chunks(
        &mut self,
        rx: &mut broadcast::Receiver<Inbound>,
        plan: ChunkPlan,
        progress: &mut Option<&mut ProgressHandler>,
    ) -> BulkRead {
        let kind = self.kind();
        let window = self.config.chunk_timeout_for(kind);
        let mut transfer = BulkTransfer::new(kind, plan);
        let mut deadline = Instant::now() + window;

        loop {
            let inbound = match timeout_at(deadline, rx.recv()).await {
                Ok(inbound) => inbound,
                Err(_) => {
                    let remaining = transfer.remaining();
                    warn!(transport = %kind, remaining, received = transfer.received(), "Chunk timeout");
                    return BulkRead {
                        data: transfer.into_data(),
                        inline: false,
                        error: Some(Error::ChunkTimeout { remaining }),
                    };
                }
            };

            let frame = match inbound {
                Ok(Inbound::Frame(frame)) => frame,
                Ok(Inbound::Closed) | Err(RecvError::Closed) => {
                    warn!(transport = %kind, received = transfer.received(), "Socket closed during transfer");
                    return BulkRead {
                        data: transfer.into_data(),
                        inline: false,
                        error: Some(Error::Disconnected),
                    };
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Inbound queue overflowed during transfer");
                    continue;
                }
            };

            // Event pushes neither feed reassembly nor extend the deadline
            if frame.is_realtime_event(kind) {
                trace!("Ignoring event frame during transfer");
                continue;
            }
            deadline = Instant::now() + window;

            match transfer.absorb(&frame) {
                Absorb::Activity => {}
                Absorb::Progress { received, total } => {
                    if let Some(cb) = progress.as_mut() {
                        cb(received, total);
                    }
                }
                Absorb::Complete => {
                    let total = transfer.plan().total_size;
                    if kind == TransportKind::Tcp {
                        if let Some(cb) = progress.as_mut() {
                            cb(transfer.received(), total);
                        }
                    }
                    debug!(total, "Chunked read complete");
                    return BulkRead {
                        data: transfer.into_data(),
                        inline: false,
                        error: None,
                    };
                }
                Absorb::Failed(e) => {
                    warn!(error = %e, "Chunked read failed");
                    return BulkRead {
                        data: Bytes::new(),
                        inline: false,
                        error: Some(e),
                    };
                }
            }
        }
    }

    /// Subscribe to real-time attendance pushes
    ///
    /// Sends CMD_REG_EVENT without waiting for an answer. Only one
    /// listener runs per connection; later calls re-register the event
    /// mask but keep the first handler.
    pub async fn get_real_time_logs(&mut self, handler: EventHandler) -> Result<()> {
        let kind = self.kind();
        let rx = self.transport.subscribe()?;

        let (session_id, reply_id) = self.session.advance();
        let buf = build_request(
            kind,
            Command::RegEvent,
            session_id,
            reply_id,
            &EventFlags::ATTLOG.to_payload(),
        );
        if let Err(e) = self.transport.send(&buf).await {
            warn!(transport = %kind, error = %e, "Failed to register for events");
        }

        if self.listener.as_ref().is_some_and(|l| !l.is_finished()) {
            debug!("Real-time listener already attached");
            return Ok(());
        }

        info!(transport = %kind, ip = %self.ip, "Listening for real-time events");
        self.listener = Some(tokio::spawn(listen(rx, kind, handler)));
        Ok(())
    }

    /// Download the user table
    pub async fn get_users(&mut self) -> Result<RecordSet<UserRecord>> {
        self.free_data_if_open().await?;
        let bulk = self.read_with_buffer(&request::users(), None).await?;
        self.free_data_if_open().await?;

        let (size, decode): (usize, fn(&[u8]) -> zkclock_types::Result<UserRecord>) = match self.kind() {
            TransportKind::Tcp => (UserRecord::TCP_SIZE, UserRecord::decode_tcp),
            TransportKind::Udp => (UserRecord::UDP_SIZE, UserRecord::decode_udp),
        };

        let records = records(&bulk.data, size)
            .map(decode)
            .collect::<zkclock_types::Result<Vec<_>>>()?;

        debug!(count = records.len(), complete = bulk.error.is_none(), "Decoded users");
        Ok(RecordSet {
            records,
            error: bulk.error,
        })
    }

    /// Download the attendance log
    pub async fn get_attendances(
        &mut self,
        mut progress: Option<ProgressHandler>,
    ) -> Result<RecordSet<AttendanceRecord>> {
        self.free_data_if_open().await?;
        let bulk = self
            .read_with_buffer(&request::attendance_logs(), progress.as_mut())
            .await?;
        self.free_data_if_open().await?;

        let (size, decode): (usize, fn(&[u8], &str) -> zkclock_types::Result<AttendanceRecord>) =
            match self.kind() {
                TransportKind::Tcp => (AttendanceRecord::TCP_SIZE, AttendanceRecord::decode_tcp),
                TransportKind::Udp if bulk.inline => {
                    (AttendanceRecord::UDP_INLINE_SIZE, AttendanceRecord::decode_udp)
                }
                TransportKind::Udp => (AttendanceRecord::UDP_SIZE, AttendanceRecord::decode_udp),
            };

        let records = records(&bulk.data, size)
            .map(|raw| decode(raw, &self.ip))
            .collect::<zkclock_types::Result<Vec<_>>>()?;

        debug!(count = records.len(), complete = bulk.error.is_none(), "Decoded attendance records");
        Ok(RecordSet {
            records,
            error: bulk.error,
        })
    }

    /// Release the device-side transfer buffer
    pub async fn free_data(&mut self) -> Result<Frame> {
        self.execute_cmd(Command::FreeData, &[]).await
    }

    async fn free_data_if_open(&mut self) -> Result<()> {
        if self.transport.is_open() {
            self.free_data().await?;
        }
        Ok(())
    }

    /// Stop the listener and close the socket
    pub async fn close_socket(&mut self) -> Result<bool> {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        let closed = self.transport.close().await?;
        self.session.close();
        Ok(closed)
    }

    fn check_reply(&self, reply: &Frame) -> Result<()> {
        if self.config.strict_checksum {
            reply.verify_checksum()?;
        }
        Ok(())
    }
}

impl<T: Transport> Drop for ProtocolEngine<T> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// Fixed-size records after the 4-byte count header
fn records(data: &[u8], size: usize) -> impl Iterator<Item = &[u8]> {
    data.get(4..).unwrap_or_default().chunks_exact(size)
}

/// Wait for the next non-event frame accepted by `accept`
async fn recv_reply(
    rx: &mut broadcast::Receiver<Inbound>,
    kind: TransportKind,
    accept: impl Fn(&Frame) -> bool,
) -> Result<Frame> {
    loop {
        match rx.recv().await {
            Ok(Inbound::Frame(frame)) => {
                if frame.is_realtime_event(kind) {
                    trace!("Skipping event frame while awaiting reply");
                    continue;
                }
                if accept(&frame) {
                    return Ok(frame);
                }
                trace!(%frame, "Skipping frame while awaiting reply");
            }
            Ok(Inbound::Closed) | Err(RecvError::Closed) => return Err(Error::Disconnected),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Inbound queue overflowed"),
        }
    }
}

async fn listen(mut rx: broadcast::Receiver<Inbound>, kind: TransportKind, mut handler: EventHandler) {
    loop {
        let frame = match rx.recv().await {
            Ok(Inbound::Frame(frame)) => frame,
            Ok(Inbound::Closed) | Err(RecvError::Closed) => break,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Real-time listener fell behind");
                continue;
            }
        };

        if !frame.is_realtime_event(kind) {
            continue;
        }

        let decoded = match kind {
            TransportKind::Tcp => RealTimeLog::decode_tcp(&frame.payload),
            TransportKind::Udp => RealTimeLog::decode_udp(&frame.payload),
        };
        match decoded {
            Ok(log) => {
                debug!(user_id = %log.user_id, time = %log.att_time, "Real-time attendance");
                handler(log);
            }
            Err(e) => debug!(error = %e, "Ignoring undecodable event"),
        }
    }

    debug!(transport = %kind, "Real-time listener stopped");
}
