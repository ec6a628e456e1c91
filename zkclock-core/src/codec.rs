//! Stream reassembly for TCP
//!
//! A single read may carry several frames, or only part of one. The
//! reassembler keeps unconsumed bytes between reads and yields every
//! frame once its declared length has arrived.

use bytes::{Buf, BytesMut};
use tracing::{trace, warn};

use crate::{
    constants::{TCP_MAGIC, TCP_PREFIX_SIZE},
    error::{Error, Result},
    packet::{Frame, Header, TransportKind},
};

/// Accumulates TCP bytes and splits them into frames
#[derive(Debug)]
pub struct StreamReassembler {
    buf: BytesMut,
    max_frame: usize,
}

impl StreamReassembler {
    /// Largest inner frame accepted by default (one full chunk plus headroom)
    pub const DEFAULT_MAX_FRAME: usize = 1 << 20;

    pub fn new() -> Self {
        Self::with_max_frame(Self::DEFAULT_MAX_FRAME)
    }

    /// Create a reassembler with a custom frame size cap
    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            max_frame,
        }
    }

    /// Append bytes from one physical read
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes held waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial frame
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Take the next complete frame, if one is buffered
    ///
    /// Garbage before the magic is skipped. A declared length above the
    /// cap discards the buffer and returns `FrameTooLarge`.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.resync() {
            return Ok(None);
        }

        if self.buf.len() < TCP_PREFIX_SIZE {
            return Ok(None);
        }

        let declared = u32::from_le_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]) as usize;
        if declared > self.max_frame {
            self.buf.clear();
            return Err(Error::FrameTooLarge {
                size: declared,
                max: self.max_frame,
            });
        }
        if declared < Header::SIZE {
            // Not a frame; skip the magic and look for the next one
            warn!(declared, "Discarding TCP prefix with impossible length");
            self.buf.advance(TCP_MAGIC.len());
            return self.next_frame();
        }

        let total = TCP_PREFIX_SIZE + declared;
        if self.buf.len() < total {
            trace!(buffered = self.buf.len(), needed = total, "Waiting for rest of frame");
            return Ok(None);
        }

        let raw = self.buf.split_to(total);
        Frame::decode(TransportKind::Tcp, &raw).map(Some)
    }

    /// Drain every complete frame currently buffered
    pub fn drain_frames(&mut self) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Align the buffer on the magic; false when more bytes are needed
    fn resync(&mut self) -> bool {
        if self.buf.len() < TCP_MAGIC.len() {
            return false;
        }
        if self.buf[..TCP_MAGIC.len()] == TCP_MAGIC {
            return true;
        }

        match self
            .buf
            .windows(TCP_MAGIC.len())
            .position(|w| w == TCP_MAGIC)
        {
            Some(pos) => {
                warn!(skipped = pos, "Resynchronising TCP stream on magic");
                self.buf.advance(pos);
                true
            }
            None => {
                // Keep a possible partial magic at the tail
                let keep = TCP_MAGIC.len() - 1;
                let skipped = self.buf.len() - keep;
                warn!(skipped, "Discarding TCP bytes without magic");
                self.buf.advance(skipped);
                false
            }
        }
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use pretty_assertions::assert_eq;

    fn tcp(command: Command, payload: Vec<u8>) -> BytesMut {
        Frame::new(command, 1, 2, payload).encode(TransportKind::Tcp)
    }

    #[test]
    fn test_two_frames_in_one_read() {
        let mut data = tcp(Command::AckOk, vec![1, 2, 3]);
        data.extend_from_slice(&tcp(Command::Data, vec![4, 5]));

        let mut reassembler = StreamReassembler::new();
        reassembler.push(&data);
        let frames = reassembler.drain_frames().unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command(), Some(Command::AckOk));
        assert_eq!(frames[1].payload.as_ref(), &[4, 5]);
        assert_eq!(reassembler.buffered(), 0);
    }

    #[test]
    fn test_split_frame_across_reads() {
        let data = tcp(Command::Data, vec![7; 100]);
        let mut reassembler = StreamReassembler::new();

        reassembler.push(&data[..20]);
        assert_eq!(reassembler.next_frame().unwrap(), None);

        reassembler.push(&data[20..]);
        let frame = reassembler.next_frame().unwrap().unwrap();
        assert_eq!(frame.payload.len(), 100);
        assert_eq!(reassembler.next_frame().unwrap(), None);
    }

    #[test]
    fn test_tail_kept_for_next_frame() {
        let first = tcp(Command::AckOk, vec![]);
        let second = tcp(Command::Data, vec![1, 2, 3, 4]);

        let mut data = first.clone();
        data.extend_from_slice(&second[..5]);

        let mut reassembler = StreamReassembler::new();
        reassembler.push(&data);
        assert_eq!(reassembler.drain_frames().unwrap().len(), 1);
        assert_eq!(reassembler.buffered(), 5);

        reassembler.push(&second[5..]);
        let frames = reassembler.drain_frames().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.as_ref(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_resync_skips_garbage() {
        let mut data = BytesMut::from(&[0xDE, 0xAD, 0xBE][..]);
        data.extend_from_slice(&tcp(Command::AckOk, vec![9]));

        let mut reassembler = StreamReassembler::new();
        reassembler.push(&data);
        let frame = reassembler.next_frame().unwrap().unwrap();

        assert_eq!(frame.payload.as_ref(), &[9]);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut reassembler = StreamReassembler::with_max_frame(64);
        reassembler.push(&[0x50, 0x50, 0x82, 0x7d, 0x00, 0x10, 0x00, 0x00]);

        let result = reassembler.next_frame();
        assert!(matches!(result, Err(Error::FrameTooLarge { size: 4096, max: 64 })));
        assert_eq!(reassembler.buffered(), 0);
    }
}
