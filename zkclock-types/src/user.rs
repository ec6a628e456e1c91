//! User table records

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ensure_len, Result};
use crate::nul_terminated;

/// One enrolled user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Internal slot number
    pub uid: u16,

    /// Privilege level (0 = user, 14 = admin on most firmware)
    pub role: u8,

    pub password: String,

    pub name: String,

    /// RFID card number, 0 when unset
    pub card_no: u32,

    /// User id as entered on the terminal
    pub user_id: String,
}

impl UserRecord {
    /// Record size over TCP
    pub const TCP_SIZE: usize = 72;

    /// Record size over UDP
    pub const UDP_SIZE: usize = 28;

    /// Decode a 72-byte record
    ///
    /// ```text
    /// 0   uid u16
    /// 2   role u8
    /// 3   password [8]
    /// 11  name [24]
    /// 35  card u32
    /// 48  user id [9]
    /// ```
    pub fn decode_tcp(buf: &[u8]) -> Result<Self> {
        ensure_len("TCP user", buf, Self::TCP_SIZE)?;

        Ok(Self {
            uid: LittleEndian::read_u16(&buf[0..2]),
            role: buf[2],
            password: nul_terminated(&buf[3..11]),
            name: nul_terminated(&buf[11..35]),
            card_no: LittleEndian::read_u32(&buf[35..39]),
            user_id: nul_terminated(&buf[48..57]),
        })
    }

    /// Decode a 28-byte record
    ///
    /// ```text
    /// 0   uid u16
    /// 2   role u8
    /// 3   password [5]
    /// 8   name [8]
    /// 16  card u32
    /// 24  user id u32
    /// ```
    pub fn decode_udp(buf: &[u8]) -> Result<Self> {
        ensure_len("UDP user", buf, Self::UDP_SIZE)?;

        Ok(Self {
            uid: LittleEndian::read_u16(&buf[0..2]),
            role: buf[2],
            password: nul_terminated(&buf[3..8]),
            name: nul_terminated(&buf[8..16]),
            card_no: LittleEndian::read_u32(&buf[16..20]),
            user_id: LittleEndian::read_u32(&buf[24..28]).to_string(),
        })
    }
}

impl fmt::Display for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "User[{}](uid={}, name={:?})", self.user_id, self.uid, self.name)
    }
}
