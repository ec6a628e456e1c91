//! In-memory transport for engine tests

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use zkclock_core::{Command, Frame, TransportKind};
use zkclock_transport::{Error, Inbound, Result, SocketCallbacks, Transport, INBOUND_CAPACITY};

use crate::transfer::CHUNK_PREAMBLE;

type Responder = Box<dyn FnMut(&Frame) -> Vec<Frame> + Send + Sync>;

/// Answers every request through a closure
pub(crate) struct ScriptedTransport {
    kind: TransportKind,
    open: bool,
    events: broadcast::Sender<Inbound>,
    sent: Arc<Mutex<Vec<Frame>>>,
    responder: Responder,
}

impl ScriptedTransport {
    pub(crate) fn new(
        kind: TransportKind,
        responder: impl FnMut(&Frame) -> Vec<Frame> + Send + Sync + 'static,
    ) -> Self {
        let (events, _) = broadcast::channel(INBOUND_CAPACITY);
        Self {
            kind,
            open: false,
            events,
            sent: Arc::new(Mutex::new(Vec::new())),
            responder: Box::new(responder),
        }
    }

    /// Every frame the engine has sent, decoded
    pub(crate) fn sent(&self) -> Arc<Mutex<Vec<Frame>>> {
        self.sent.clone()
    }

    /// Publish frames as if the device pushed them
    pub(crate) fn handle(&self) -> broadcast::Sender<Inbound> {
        self.events.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn open(&mut self, _callbacks: SocketCallbacks) -> Result<()> {
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<bool> {
        self.open = false;
        let _ = self.events.send(Inbound::Closed);
        Ok(true)
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(Error::NotConnected);
        }
        let frame = Frame::decode(self.kind, data).expect("engine sent a malformed frame");
        for reply in (self.responder)(&frame) {
            let _ = self.events.send(Inbound::Frame(reply));
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<Inbound>> {
        if !self.open {
            return Err(Error::NotConnected);
        }
        Ok(self.events.subscribe())
    }

    fn remote_addr(&self) -> String {
        "scripted".to_string()
    }
}

/// Device answer to one CMD_DATA_RDY request over `data`
///
/// Both transports see the same sequence: the announcement carrying the
/// 8-byte preamble, the data, then an acknowledgement.
pub(crate) fn chunk_frames(data: &[u8], request: &Frame) -> Vec<Frame> {
    let p = &request.payload;
    let start = u32::from_le_bytes([p[0], p[1], p[2], p[3]]) as usize;
    let size = u32::from_le_bytes([p[4], p[5], p[6], p[7]]) as usize;
    let chunk = data[start..start + size].to_vec();

    let mut preamble = vec![0u8; CHUNK_PREAMBLE];
    preamble[..4].copy_from_slice(&(size as u32).to_le_bytes());

    vec![
        Frame::new(Command::PrepareData, 1, 0, preamble),
        Frame::new(Command::Data, 1, 0, chunk),
        Frame::new(Command::AckOk, 1, 0, Vec::new()),
    ]
}
