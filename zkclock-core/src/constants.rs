//! Protocol constants

use std::time::Duration;

use bitflags::bitflags;

use crate::command::Command;

/// Magic bytes opening every TCP-wrapped frame
pub const TCP_MAGIC: [u8; 4] = [0x50, 0x50, 0x82, 0x7d];

/// Size of the TCP outer prefix (magic + length + reserved)
pub const TCP_PREFIX_SIZE: usize = 8;

/// `USHRT_MAX` as used by the checksum and reply-id arithmetic
pub const USHRT_MAX: u32 = 65535;

/// Largest chunk the device hands out per CMD_DATA_RDY request
pub const MAX_CHUNK: usize = 65472;

/// Reply window for CMD_CONNECT and CMD_EXIT
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default request/response timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for a graceful socket close
pub const CLOSE_GUARD_TIMEOUT: Duration = Duration::from_millis(2000);

/// Per-chunk inactivity window over TCP
pub const TCP_CHUNK_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-chunk inactivity window over UDP
pub const UDP_CHUNK_TIMEOUT: Duration = Duration::from_secs(3);

bitflags! {
    /// Real-time event flags (CMD_REG_EVENT mask)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventFlags: u32 {
        /// Attendance log
        const ATTLOG = 1;
        /// Fingerprint pressed
        const FINGER = 1 << 1;
        /// User enrolled
        const ENROLL_USER = 1 << 2;
        /// Fingerprint enrolled
        const ENROLL_FINGER = 1 << 3;
        /// Button pressed
        const BUTTON = 1 << 4;
        /// Door unlocked
        const UNLOCK = 1 << 5;
        /// Verification event
        const VERIFY = 1 << 7;
        /// Fingerprint minutiae captured
        const FPFTR = 1 << 8;
        /// Alarm signal
        const ALARM = 1 << 9;
    }
}

impl EventFlags {
    /// Payload for CMD_REG_EVENT
    pub fn to_payload(self) -> [u8; 4] {
        self.bits().to_le_bytes()
    }
}

/// Data type flags (the `fct` field of a bulk read request)
pub mod data_types {
    /// User record
    pub const FCT_USER: i32 = 5;
}

/// Build a CMD_DATA_WRRQ request token: `[1][command u16][fct i32][ext i32]`
pub fn bulk_read_request(command: Command, fct: i32) -> [u8; 11] {
    let mut token = [0u8; 11];
    token[0] = 1;
    token[1..3].copy_from_slice(&u16::from(command).to_le_bytes());
    token[3..7].copy_from_slice(&fct.to_le_bytes());
    token
}

/// Fixed request payloads
pub mod request {
    use super::{bulk_read_request, data_types};
    use crate::command::Command;

    /// CMD_DATA_WRRQ token for the user table
    pub fn users() -> [u8; 11] {
        bulk_read_request(Command::UserTempRrq, data_types::FCT_USER)
    }

    /// CMD_DATA_WRRQ token for the attendance log
    pub fn attendance_logs() -> [u8; 11] {
        bulk_read_request(Command::AttLogRrq, 0)
    }

    /// CMD_DISABLEDEVICE payload
    pub const DISABLE_DEVICE: [u8; 4] = [0x00, 0x00, 0x00, 0x00];
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_tokens_match_device_bytes() {
        assert_eq!(
            request::users(),
            [0x01, 0x09, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            request::attendance_logs(),
            [0x01, 0x0d, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_attlog_event_payload() {
        assert_eq!(EventFlags::ATTLOG.to_payload(), [0x01, 0x00, 0x00, 0x00]);
    }
}
