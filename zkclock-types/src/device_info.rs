//! Device capacity information

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ensure_len, Result};

/// Counters reported by CMD_GET_FREE_SIZES
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    /// Enrolled users
    pub user_count: u32,

    /// Stored attendance records
    pub log_count: u32,

    /// Attendance record capacity
    pub log_capacity: u32,
}

impl DeviceInfo {
    const USER_COUNT_OFFSET: usize = 16;
    const LOG_COUNT_OFFSET: usize = 32;
    const LOG_CAPACITY_OFFSET: usize = 64;

    /// Minimum reply payload
    pub const MIN_SIZE: usize = Self::LOG_CAPACITY_OFFSET + 4;

    /// Decode the CMD_GET_FREE_SIZES reply payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        ensure_len("free sizes", payload, Self::MIN_SIZE)?;

        let read = |offset: usize| LittleEndian::read_u32(&payload[offset..offset + 4]);
        Ok(Self {
            user_count: read(Self::USER_COUNT_OFFSET),
            log_count: read(Self::LOG_COUNT_OFFSET),
            log_capacity: read(Self::LOG_CAPACITY_OFFSET),
        })
    }

    /// Records that can still be stored
    pub fn free_logs(&self) -> u32 {
        self.log_capacity.saturating_sub(self.log_count)
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device[users: {}, logs: {}/{}]",
            self.user_count, self.log_count, self.log_capacity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_free_sizes() {
        let mut payload = vec![0u8; 80];
        payload[16..20].copy_from_slice(&25u32.to_le_bytes());
        payload[32..36].copy_from_slice(&1200u32.to_le_bytes());
        payload[64..68].copy_from_slice(&100_000u32.to_le_bytes());

        let info = DeviceInfo::decode(&payload).unwrap();
        assert_eq!(
            info,
            DeviceInfo {
                user_count: 25,
                log_count: 1200,
                log_capacity: 100_000,
            }
        );
        assert_eq!(info.free_logs(), 98_800);
    }

    #[test]
    fn test_short_payload() {
        assert!(DeviceInfo::decode(&[0u8; 67]).is_err());
    }
}
