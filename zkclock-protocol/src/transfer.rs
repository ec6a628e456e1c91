//! Chunked bulk transfer
//!
//! Large tables are fetched by asking for fixed-size windows with
//! CMD_DATA_RDY and stitching the replies back together. The two
//! transports frame those replies differently:
//!
//! - TCP: the payloads of successive frames form one byte stream; each
//!   chunk is an 8-byte preamble followed by the chunk data.
//! - UDP: CMD_PREPARE_DATA announces a chunk, CMD_DATA carries data and
//!   CMD_ACK_OK closes the transfer once every byte is in.

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};
use zkclock_core::{Command, Frame, TransportKind};

use crate::error::Error;

/// Bytes preceding each chunk in the TCP payload stream
pub const CHUNK_PREAMBLE: usize = 8;

/// How a total size splits into CMD_DATA_RDY requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub total_size: usize,
    pub chunk_size: usize,
    pub remainder: usize,
    pub full_chunks: usize,
    pub chunk_count: usize,
}

impl ChunkPlan {
    pub fn new(total_size: usize, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let remainder = total_size % chunk_size;
        let full_chunks = (total_size - remainder) / chunk_size;

        Self {
            total_size,
            chunk_size,
            remainder,
            full_chunks,
            chunk_count: full_chunks + usize::from(remainder > 0),
        }
    }

    /// Size of chunk `index`
    pub fn chunk_len(&self, index: usize) -> usize {
        if index < self.full_chunks {
            self.chunk_size
        } else if index == self.full_chunks && self.remainder > 0 {
            self.remainder
        } else {
            0
        }
    }

    /// `(start, size)` of every request: full chunks, then the remainder
    pub fn requests(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (0..self.chunk_count).map(move |i| ((i * self.chunk_size) as u32, self.chunk_len(i) as u32))
    }

    /// Chunks still needed once `received` bytes have arrived
    pub fn chunks_left(&self, received: usize) -> usize {
        let left = self.total_size.saturating_sub(received);
        left.div_ceil(self.chunk_size)
    }

    /// CMD_DATA_RDY payload for one request
    pub fn request_payload(start: u32, size: u32) -> [u8; 8] {
        let mut payload = [0u8; 8];
        payload[..4].copy_from_slice(&start.to_le_bytes());
        payload[4..].copy_from_slice(&size.to_le_bytes());
        payload
    }
}

/// Transfer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Waiting for chunk `n` (0-based)
    AwaitingChunk(usize),
    Done,
    Failed,
}

/// Outcome of feeding one frame to a transfer
#[derive(Debug)]
pub enum Absorb {
    /// Frame belongs to the transfer but added no data
    Activity,
    /// New data arrived
    Progress { received: usize, total: usize },
    /// Every byte is in
    Complete,
    /// The device answered with something the transfer cannot use
    Failed(Error),
}

/// Reassembly state for one bulk read
#[derive(Debug)]
pub struct BulkTransfer {
    kind: TransportKind,
    plan: ChunkPlan,
    state: TransferState,
    data: BytesMut,
    /// TCP payload bytes not yet forming a whole chunk
    pending: BytesMut,
    completed: usize,
}

impl BulkTransfer {
    pub fn new(kind: TransportKind, plan: ChunkPlan) -> Self {
        let state = if plan.chunk_count == 0 {
            TransferState::Done
        } else {
            TransferState::AwaitingChunk(0)
        };

        Self {
            kind,
            plan,
            state,
            data: BytesMut::with_capacity(plan.total_size),
            pending: BytesMut::new(),
            completed: 0,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Data bytes collected so far
    pub fn received(&self) -> usize {
        self.data.len()
    }

    /// Chunks not yet received
    pub fn remaining(&self) -> usize {
        match self.kind {
            TransportKind::Tcp => self.plan.chunk_count - self.completed,
            TransportKind::Udp => self.plan.chunks_left(self.data.len()),
        }
    }

    /// Feed one non-event frame
    pub fn absorb(&mut self, frame: &Frame) -> Absorb {
        if self.state != TransferState::AwaitingChunk(self.completed) {
            return Absorb::Activity;
        }

        match self.kind {
            TransportKind::Tcp => self.absorb_stream(frame),
            TransportKind::Udp => self.absorb_datagram(frame),
        }
    }

    fn absorb_stream(&mut self, frame: &Frame) -> Absorb {
        self.pending.extend_from_slice(&frame.payload);

        let mut progressed = false;
        while self.completed < self.plan.chunk_count {
            let need = self.plan.chunk_len(self.completed) + CHUNK_PREAMBLE;
            if self.pending.len() < need {
                break;
            }

            let chunk = self.pending.split_to(need);
            self.data.extend_from_slice(&chunk[CHUNK_PREAMBLE..]);
            // Bytes trailing a finished chunk are not part of the next one
            self.pending.clear();
            self.completed += 1;
            progressed = true;

            debug!(
                chunk = self.completed,
                of = self.plan.chunk_count,
                received = self.data.len(),
                "Chunk complete"
            );
        }

        if self.completed == self.plan.chunk_count {
            self.state = TransferState::Done;
            return Absorb::Complete;
        }
        self.state = TransferState::AwaitingChunk(self.completed);

        if progressed {
            Absorb::Progress {
                received: self.data.len(),
                total: self.plan.total_size,
            }
        } else {
            trace!(pending = self.pending.len(), "Partial chunk buffered");
            Absorb::Activity
        }
    }

    fn absorb_datagram(&mut self, frame: &Frame) -> Absorb {
        match frame.command() {
            Some(Command::PrepareData) => Absorb::Activity,
            Some(Command::Data) => {
                self.data.extend_from_slice(&frame.payload);
                self.completed = self.plan.chunk_count - self.plan.chunks_left(self.data.len());
                self.state = TransferState::AwaitingChunk(self.completed);
                Absorb::Progress {
                    received: self.data.len(),
                    total: self.plan.total_size,
                }
            }
            Some(Command::AckOk) => {
                if self.data.len() == self.plan.total_size {
                    self.completed = self.plan.chunk_count;
                    self.state = TransferState::Done;
                    Absorb::Complete
                } else {
                    Absorb::Activity
                }
            }
            _ => {
                self.state = TransferState::Failed;
                Absorb::Failed(Error::UnhandledCommand(Command::name_of(frame.command_id)))
            }
        }
    }

    /// Collected data, complete or not
    pub fn into_data(self) -> Bytes {
        self.data.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn tcp_chunk_frames(data: &[u8]) -> Vec<Frame> {
        let mut preamble = vec![0u8; CHUNK_PREAMBLE];
        preamble[..4].copy_from_slice(&(data.len() as u32).to_le_bytes());
        vec![
            Frame::new(Command::PrepareData, 1, 0, preamble),
            Frame::new(Command::Data, 1, 0, data.to_vec()),
            Frame::new(Command::AckOk, 1, 0, Bytes::new()),
        ]
    }

    #[test]
    fn test_plan_divisible() {
        let plan = ChunkPlan::new(300, 100);
        assert_eq!(plan.chunk_count, 3);
        assert_eq!(plan.remainder, 0);
        assert_eq!(
            plan.requests().collect::<Vec<_>>(),
            vec![(0, 100), (100, 100), (200, 100)]
        );
    }

    #[test]
    fn test_plan_with_remainder() {
        let plan = ChunkPlan::new(250, 100);
        assert_eq!(plan.full_chunks, 2);
        assert_eq!(plan.chunk_count, 3);
        assert_eq!(
            plan.requests().collect::<Vec<_>>(),
            vec![(0, 100), (100, 100), (200, 50)]
        );
    }

    #[test]
    fn test_plan_smaller_than_chunk() {
        let plan = ChunkPlan::new(40, 65472);
        assert_eq!(plan.full_chunks, 0);
        assert_eq!(plan.requests().collect::<Vec<_>>(), vec![(0, 40)]);
    }

    #[test]
    fn test_plan_empty() {
        let plan = ChunkPlan::new(0, 100);
        assert_eq!(plan.chunk_count, 0);
        assert_eq!(
            BulkTransfer::new(TransportKind::Tcp, plan).state(),
            TransferState::Done
        );
    }

    #[test]
    fn test_request_payload() {
        assert_eq!(
            ChunkPlan::request_payload(65472, 100),
            [0xC0, 0xFF, 0x00, 0x00, 0x64, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_tcp_transfer_strips_preambles() {
        let mut transfer = BulkTransfer::new(TransportKind::Tcp, ChunkPlan::new(6, 4));

        let mut outcomes = Vec::new();
        for frame in tcp_chunk_frames(&[1, 2, 3, 4]).iter().chain(&tcp_chunk_frames(&[5, 6])) {
            outcomes.push(transfer.absorb(frame));
        }

        assert!(matches!(outcomes[0], Absorb::Activity));
        assert!(matches!(outcomes[1], Absorb::Progress { received: 4, total: 6 }));
        assert!(matches!(outcomes[4], Absorb::Complete));
        assert_eq!(transfer.state(), TransferState::Done);
        assert_eq!(transfer.into_data().as_ref(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_tcp_remaining_counts_chunks() {
        let mut transfer = BulkTransfer::new(TransportKind::Tcp, ChunkPlan::new(250, 100));
        for frame in tcp_chunk_frames(&[0; 100]) {
            transfer.absorb(&frame);
        }
        assert_eq!(transfer.remaining(), 2);
        assert_eq!(transfer.state(), TransferState::AwaitingChunk(1));
    }

    #[test]
    fn test_udp_transfer() {
        let mut transfer = BulkTransfer::new(TransportKind::Udp, ChunkPlan::new(5, 3));

        assert!(matches!(
            transfer.absorb(&Frame::new(Command::PrepareData, 1, 0, vec![0; 4])),
            Absorb::Activity
        ));
        assert!(matches!(
            transfer.absorb(&Frame::new(Command::Data, 1, 0, vec![1, 2, 3])),
            Absorb::Progress { received: 3, total: 5 }
        ));
        assert_eq!(transfer.remaining(), 1);
        assert!(matches!(
            transfer.absorb(&Frame::new(Command::AckOk, 1, 0, Bytes::new())),
            Absorb::Activity
        ));
        transfer.absorb(&Frame::new(Command::Data, 1, 0, vec![4, 5]));
        assert!(matches!(
            transfer.absorb(&Frame::new(Command::AckOk, 1, 0, Bytes::new())),
            Absorb::Complete
        ));
        assert_eq!(transfer.into_data().as_ref(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_udp_unexpected_command_fails() {
        let mut transfer = BulkTransfer::new(TransportKind::Udp, ChunkPlan::new(5, 3));
        let outcome = transfer.absorb(&Frame::new(Command::AckError, 1, 0, Bytes::new()));

        match outcome {
            Absorb::Failed(Error::UnhandledCommand(name)) => assert_eq!(name, "CMD_ACK_ERROR"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(transfer.state(), TransferState::Failed);
    }

    proptest! {
        #[test]
        fn prop_plan_covers_total(total in 0usize..1_000_000, chunk in 1usize..70_000) {
            let plan = ChunkPlan::new(total, chunk);
            let requests: Vec<_> = plan.requests().collect();

            prop_assert_eq!(requests.len(), plan.chunk_count);
            prop_assert_eq!(requests.iter().map(|r| r.1 as usize).sum::<usize>(), total);
            for (i, (start, size)) in requests.iter().enumerate() {
                prop_assert_eq!(*start as usize, i * chunk);
                prop_assert!(*size as usize <= chunk && *size > 0);
            }
        }
    }
}
