//! Attendance log records

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use chrono::NaiveDateTime;

use crate::error::{ensure_len, Result};
use crate::nul_terminated;
use crate::time::decode_time;

/// One punch from the attendance log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    /// Log serial number (TCP layout only)
    pub user_sn: Option<u16>,

    pub device_user_id: String,

    pub record_time: NaiveDateTime,

    /// Address of the terminal that produced the record
    pub ip: String,
}

impl AttendanceRecord {
    /// Record size over TCP
    pub const TCP_SIZE: usize = 40;

    /// Record size of a chunked UDP transfer
    pub const UDP_SIZE: usize = 16;

    /// Record size when the log fits in one inline CMD_DATA reply over UDP
    pub const UDP_INLINE_SIZE: usize = 8;

    /// Decode a 40-byte record
    ///
    /// ```text
    /// 0   user sn u16
    /// 2   user id [9]
    /// 27  time u32
    /// ```
    pub fn decode_tcp(buf: &[u8], ip: &str) -> Result<Self> {
        ensure_len("TCP attendance", buf, Self::TCP_SIZE)?;

        Ok(Self {
            user_sn: Some(LittleEndian::read_u16(&buf[0..2])),
            device_user_id: nul_terminated(&buf[2..11]),
            record_time: decode_time(LittleEndian::read_u32(&buf[27..31]))?,
            ip: ip.to_string(),
        })
    }

    /// Decode an 8- or 16-byte UDP record
    ///
    /// ```text
    /// 0   user id u16
    /// 4   time u32
    /// ```
    pub fn decode_udp(buf: &[u8], ip: &str) -> Result<Self> {
        ensure_len("UDP attendance", buf, Self::UDP_INLINE_SIZE)?;

        Ok(Self {
            user_sn: None,
            device_user_id: LittleEndian::read_u16(&buf[0..2]).to_string(),
            record_time: decode_time(LittleEndian::read_u32(&buf[4..8]))?,
            ip: ip.to_string(),
        })
    }
}

impl fmt::Display for AttendanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Attendance[{}]({} @ {})",
            self.device_user_id, self.record_time, self.ip
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::encode_time;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_decode_tcp_record() {
        let mut buf = [0u8; 40];
        buf[0..2].copy_from_slice(&12u16.to_le_bytes());
        buf[2..6].copy_from_slice(b"2001");
        buf[27..31].copy_from_slice(&encode_time(at(8, 1)).unwrap().to_le_bytes());

        let record = AttendanceRecord::decode_tcp(&buf, "10.0.0.5").unwrap();
        assert_eq!(
            record,
            AttendanceRecord {
                user_sn: Some(12),
                device_user_id: "2001".into(),
                record_time: at(8, 1),
                ip: "10.0.0.5".into(),
            }
        );
    }

    #[test]
    fn test_decode_udp_record() {
        let mut buf = [0u8; 16];
        buf[0..2].copy_from_slice(&501u16.to_le_bytes());
        buf[4..8].copy_from_slice(&encode_time(at(17, 45)).unwrap().to_le_bytes());

        let record = AttendanceRecord::decode_udp(&buf[..8], "10.0.0.6").unwrap();
        assert_eq!(record.user_sn, None);
        assert_eq!(record.device_user_id, "501");
        assert_eq!(record.record_time, at(17, 45));
    }
}
