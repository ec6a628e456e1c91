//! Real-time attendance pushes

use chrono::NaiveDateTime;

use crate::error::{ensure_len, Error, Result};
use crate::nul_terminated;
use crate::time::DeviceTime;

/// A live check-in pushed by the terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealTimeLog {
    pub user_id: String,
    pub att_time: NaiveDateTime,
}

impl RealTimeLog {
    /// Minimum event payload over TCP
    pub const TCP_MIN_SIZE: usize = 32;

    /// Event payload size over UDP
    pub const UDP_SIZE: usize = 10;

    /// Decode a TCP event payload: user id `[0..9]`, compact time `[26..32]`
    pub fn decode_tcp(payload: &[u8]) -> Result<Self> {
        ensure_len("TCP real-time", payload, Self::TCP_MIN_SIZE)?;

        Ok(Self {
            user_id: nul_terminated(&payload[0..9]),
            att_time: DeviceTime::from_compact(&payload[26..32])?.to_datetime()?,
        })
    }

    /// Decode a UDP event payload: user id byte `[0]`, compact time `[4..10]`
    pub fn decode_udp(payload: &[u8]) -> Result<Self> {
        if payload.len() != Self::UDP_SIZE {
            return Err(Error::RecordTooShort {
                record: "UDP real-time",
                expected: Self::UDP_SIZE,
                actual: payload.len(),
            });
        }

        Ok(Self {
            user_id: payload[0].to_string(),
            att_time: DeviceTime::from_compact(&payload[4..10])?.to_datetime()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_tcp_event() {
        let mut payload = vec![0u8; 52];
        payload[0..3].copy_from_slice(b"777");
        payload[26..32].copy_from_slice(&[24, 5, 20, 7, 58, 3]);

        let log = RealTimeLog::decode_tcp(&payload).unwrap();
        assert_eq!(log.user_id, "777");
        assert_eq!(
            log.att_time,
            NaiveDate::from_ymd_opt(2024, 5, 20)
                .unwrap()
                .and_hms_opt(7, 58, 3)
                .unwrap()
        );
    }

    #[test]
    fn test_decode_udp_event() {
        let payload = [9, 0, 0, 0, 23, 12, 31, 23, 59, 0];

        let log = RealTimeLog::decode_udp(&payload).unwrap();
        assert_eq!(log.user_id, "9");
        assert_eq!(log.att_time.to_string(), "2023-12-31 23:59:00");
    }

    #[test]
    fn test_udp_event_must_be_exact_size() {
        assert!(RealTimeLog::decode_udp(&[0u8; 11]).is_err());
        assert!(RealTimeLog::decode_tcp(&[0u8; 20]).is_err());
    }
}
