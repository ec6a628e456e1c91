//! Frame structure and encoding/decoding
//!
//! # Frame Structure
//!
//! ```text
//! ┌─────────────┬─────────────┬─────────────┬─────────────┬─────────────┐
//! │   Command   │  Checksum   │  SessionID  │  ReplyID    │   Payload   │
//! │   2 bytes   │   2 bytes   │   2 bytes   │   2 bytes   │   N bytes   │
//! │ (LE u16)    │  (LE u16)   │  (LE u16)   │  (LE u16)   │   (bytes)   │
//! └─────────────┴─────────────┴─────────────┴─────────────┴─────────────┘
//! ```
//!
//! Over TCP the frame is preceded by an 8-byte prefix: the magic
//! `50 50 82 7d`, the inner frame length (LE u16) and two zero bytes.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use tracing::trace;

use crate::{
    checksum,
    command::Command,
    constants::{EventFlags, TCP_MAGIC, TCP_PREFIX_SIZE, USHRT_MAX},
    error::{Error, Result},
};

/// Which transport a frame travels over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Stream transport, frames carry the 8-byte prefix
    Tcp,
    /// Datagram transport, one frame per datagram
    Udp,
}

impl TransportKind {
    /// Bytes preceding the inner frame
    pub fn prefix_size(self) -> usize {
        match self {
            Self::Tcp => TCP_PREFIX_SIZE,
            Self::Udp => 0,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("TCP"),
            Self::Udp => f.write_str("UDP"),
        }
    }
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub command_id: u16,
    pub checksum: u16,
    pub session_id: u16,
    pub reply_id: u16,
    /// Length of the inner frame as declared by the TCP prefix,
    /// or the payload length seen in a UDP datagram
    pub payload_size: usize,
}

impl Header {
    /// Inner header size in bytes
    pub const SIZE: usize = 8;

    /// Parse the header at the start of `bytes`
    pub fn parse(kind: TransportKind, bytes: &[u8]) -> Result<Self> {
        let offset = kind.prefix_size();
        let needed = offset + Self::SIZE;
        if bytes.len() < needed {
            return Err(Error::PacketTooShort {
                expected: needed,
                actual: bytes.len(),
            });
        }

        let payload_size = match kind {
            TransportKind::Tcp => {
                if bytes[..4] != TCP_MAGIC {
                    return Err(Error::BadMagic(hex::encode(&bytes[..4])));
                }
                u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize
            }
            TransportKind::Udp => bytes.len() - Self::SIZE,
        };

        let inner = &bytes[offset..needed];
        Ok(Self {
            command_id: u16::from_le_bytes([inner[0], inner[1]]),
            checksum: u16::from_le_bytes([inner[2], inner[3]]),
            session_id: u16::from_le_bytes([inner[4], inner[5]]),
            reply_id: u16::from_le_bytes([inner[6], inner[7]]),
            payload_size,
        })
    }
}

/// Build an outgoing request
///
/// The checksum covers `reply_id` as given; the reply id field is then
/// rewritten to `(reply_id + 1) % 65535`. Devices expect this exact byte
/// sequence.
///
/// # Examples
///
/// ```
/// use zkclock_core::{packet::build_request, Command, TransportKind};
///
/// let buf = build_request(TransportKind::Udp, Command::Connect, 0, 0, &[]);
/// assert_eq!(&buf[..], &[0xE8, 0x03, 0x16, 0xFC, 0x00, 0x00, 0x01, 0x00]);
/// ```
pub fn build_request(
    kind: TransportKind,
    command: Command,
    session_id: u16,
    reply_id: u16,
    payload: &[u8],
) -> BytesMut {
    let prefix = kind.prefix_size();
    let inner_len = Header::SIZE + payload.len();
    let mut buf = BytesMut::with_capacity(prefix + inner_len);

    if kind == TransportKind::Tcp {
        buf.put_slice(&TCP_MAGIC);
        buf.put_u16_le(inner_len as u16);
        buf.put_u16_le(0);
    }

    buf.put_u16_le(command.into());
    buf.put_u16_le(0);
    buf.put_u16_le(session_id);
    buf.put_u16_le(reply_id);
    buf.put_slice(payload);

    let sum = checksum::calculate(&buf[prefix..]);
    buf[prefix + 2..prefix + 4].copy_from_slice(&sum.to_le_bytes());

    let wire_reply = ((reply_id as u32 + 1) % USHRT_MAX) as u16;
    buf[prefix + 6..prefix + 8].copy_from_slice(&wire_reply.to_le_bytes());

    trace!(
        transport = %kind,
        command = %command,
        session_id,
        reply_id = wire_reply,
        bytes = %hex::encode(&buf),
        "Built request"
    );

    buf
}

/// One protocol frame
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw command code (may be outside the known command table)
    pub command_id: u16,

    /// Checksum as carried on the wire
    pub checksum: u16,

    /// Session identifier; carries the event code on event pushes
    pub session_id: u16,

    pub reply_id: u16,

    pub payload: Bytes,
}

impl Frame {
    /// Create a frame with a freshly computed checksum
    pub fn new(command: Command, session_id: u16, reply_id: u16, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let command_id = u16::from(command);
        Self {
            command_id,
            checksum: checksum::calculate_fields(command_id, session_id, reply_id, &payload),
            session_id,
            reply_id,
            payload,
        }
    }

    /// Decode one complete frame (prefix included for TCP)
    ///
    /// The checksum is recorded but not verified; see [`Frame::verify_checksum`].
    pub fn decode(kind: TransportKind, bytes: &[u8]) -> Result<Self> {
        let header = Header::parse(kind, bytes)?;
        let start = kind.prefix_size() + Header::SIZE;

        let end = match kind {
            TransportKind::Tcp => {
                let end = kind.prefix_size() + header.payload_size;
                if header.payload_size < Header::SIZE || bytes.len() < end {
                    return Err(Error::PacketTooShort {
                        expected: end.max(start),
                        actual: bytes.len(),
                    });
                }
                end
            }
            TransportKind::Udp => bytes.len(),
        };

        Ok(Self {
            command_id: header.command_id,
            checksum: header.checksum,
            session_id: header.session_id,
            reply_id: header.reply_id,
            payload: Bytes::copy_from_slice(&bytes[start..end]),
        })
    }

    /// Encode the frame with its fields as they are
    pub fn encode(&self, kind: TransportKind) -> BytesMut {
        let inner_len = Header::SIZE + self.payload.len();
        let mut buf = BytesMut::with_capacity(kind.prefix_size() + inner_len);

        if kind == TransportKind::Tcp {
            buf.put_slice(&TCP_MAGIC);
            buf.put_u16_le(inner_len as u16);
            buf.put_u16_le(0);
        }

        buf.put_u16_le(self.command_id);
        buf.put_u16_le(self.checksum);
        buf.put_u16_le(self.session_id);
        buf.put_u16_le(self.reply_id);
        buf.put_slice(&self.payload);
        buf
    }

    /// Known command, if the code is in the command table
    pub fn command(&self) -> Option<Command> {
        Command::try_from(self.command_id).ok()
    }

    /// Whether the frame carries the given command
    pub fn is(&self, command: Command) -> bool {
        self.command_id == u16::from(command)
    }

    /// Recompute the checksum and compare it with the carried one
    pub fn verify_checksum(&self) -> Result<()> {
        let expected = checksum::calculate_fields(
            self.command_id,
            self.session_id,
            self.reply_id,
            &self.payload,
        );
        if expected != self.checksum {
            return Err(Error::ChecksumMismatch {
                expected,
                received: self.checksum,
            });
        }
        Ok(())
    }

    /// Unsolicited real-time event push
    ///
    /// Over TCP the event code travels in the session field and only
    /// attendance events count; over UDP any CMD_REG_EVENT frame does.
    pub fn is_realtime_event(&self, kind: TransportKind) -> bool {
        if !self.is(Command::RegEvent) {
            return false;
        }
        match kind {
            TransportKind::Tcp => self.session_id as u32 == EventFlags::ATTLOG.bits(),
            TransportKind::Udp => true,
        }
    }

    /// Inner frame size (header plus payload)
    pub fn size(&self) -> usize {
        Header::SIZE + self.payload.len()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("command", &Command::name_of(self.command_id))
            .field("session_id", &format!("0x{:04X}", self.session_id))
            .field("reply_id", &format!("0x{:04X}", self.reply_id))
            .field("checksum", &format!("0x{:04X}", self.checksum))
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame[{}({})](session={}, reply={}, len={})",
            Command::name_of(self.command_id),
            self.command_id,
            self.session_id,
            self.reply_id,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_connect_request_udp_bytes() {
        let buf = build_request(TransportKind::Udp, Command::Connect, 0, 0, &[]);
        assert_eq!(&buf[..], &[0xE8, 0x03, 0x16, 0xFC, 0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn test_connect_request_tcp_prefix() {
        let buf = build_request(TransportKind::Tcp, Command::Connect, 0, 0, &[]);
        assert_eq!(
            &buf[..],
            &[
                0x50, 0x50, 0x82, 0x7d, 0x08, 0x00, 0x00, 0x00, 0xE8, 0x03, 0x16, 0xFC, 0x00,
                0x00, 0x01, 0x00
            ]
        );
    }

    #[test]
    fn test_reply_id_rewrite_wraps() {
        let buf = build_request(TransportKind::Udp, Command::FreeData, 7, 65534, &[]);
        let header = Header::parse(TransportKind::Udp, &buf).unwrap();
        assert_eq!(header.reply_id, 0);
        assert_eq!(header.session_id, 7);
    }

    #[test]
    fn test_header_parse_tcp() {
        let buf = build_request(TransportKind::Tcp, Command::DataRdy, 0x1234, 9, &[0; 8]);
        let header = Header::parse(TransportKind::Tcp, &buf).unwrap();

        assert_eq!(header.command_id, 1504);
        assert_eq!(header.session_id, 0x1234);
        assert_eq!(header.reply_id, 10);
        assert_eq!(header.payload_size, 16);
    }

    #[test]
    fn test_header_parse_bad_magic() {
        let buf = [0u8; 16];
        let result = Header::parse(TransportKind::Tcp, &buf);
        assert!(matches!(result, Err(Error::BadMagic(_))));
    }

    #[test]
    fn test_header_too_short() {
        let result = Header::parse(TransportKind::Udp, &[1, 2, 3]);
        assert!(matches!(
            result,
            Err(Error::PacketTooShort { expected: 8, actual: 3 })
        ));
    }

    #[test]
    fn test_frame_decode_tcp_ignores_trailing_bytes() {
        let mut buf = Frame::new(Command::AckOk, 1, 2, vec![9, 9]).encode(TransportKind::Tcp);
        buf.extend_from_slice(&[0xAA, 0xBB]);

        let frame = Frame::decode(TransportKind::Tcp, &buf).unwrap();
        assert_eq!(frame.payload.as_ref(), &[9, 9]);
    }

    #[test]
    fn test_frame_checksum_verification() {
        let mut frame = Frame::new(Command::AckOk, 100, 5, vec![1, 2, 3]);
        assert!(frame.verify_checksum().is_ok());

        frame.checksum ^= 0xFF;
        assert!(matches!(
            frame.verify_checksum(),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_realtime_event_classification() {
        let tcp_event = Frame::new(Command::RegEvent, 1, 0, vec![0; 32]);
        let tcp_other = Frame::new(Command::RegEvent, 2, 0, vec![0; 32]);
        let reply = Frame::new(Command::AckOk, 1, 0, Bytes::new());

        assert!(tcp_event.is_realtime_event(TransportKind::Tcp));
        assert!(!tcp_other.is_realtime_event(TransportKind::Tcp));
        assert!(tcp_other.is_realtime_event(TransportKind::Udp));
        assert!(!reply.is_realtime_event(TransportKind::Udp));
    }

    #[test]
    fn test_unknown_command_survives_decode() {
        let frame = Frame {
            command_id: 4242,
            checksum: 0,
            session_id: 0,
            reply_id: 0,
            payload: Bytes::new(),
        };
        let decoded = Frame::decode(TransportKind::Udp, &frame.encode(TransportKind::Udp)).unwrap();

        assert_eq!(decoded.command_id, 4242);
        assert_eq!(decoded.command(), None);
    }

    proptest! {
        #[test]
        fn prop_built_request_parses_back(
            session in any::<u16>(),
            reply in 0u16..65534,
            payload in proptest::collection::vec(any::<u8>(), 0..256),
            tcp in any::<bool>(),
        ) {
            let kind = if tcp { TransportKind::Tcp } else { TransportKind::Udp };
            let buf = build_request(kind, Command::DataWrrq, session, reply, &payload);
            let frame = Frame::decode(kind, &buf).unwrap();

            prop_assert_eq!(frame.command_id, 1503);
            prop_assert_eq!(frame.session_id, session);
            prop_assert_eq!(frame.reply_id, reply + 1);
            prop_assert_eq!(frame.payload.as_ref(), payload.as_slice());
            prop_assert_eq!(
                frame.checksum,
                checksum::calculate_fields(1503, session, reply, &payload)
            );
        }
    }
}
