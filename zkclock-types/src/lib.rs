//! Record types for zkclock
//!
//! Fixed-layout decoders for the tables a terminal hands out, plus the
//! device time codec they share.

pub mod attendance;
pub mod device_info;
pub mod error;
pub mod realtime;
pub mod time;
pub mod user;

pub use attendance::AttendanceRecord;
pub use device_info::DeviceInfo;
pub use error::{Error, Result};
pub use realtime::RealTimeLog;
pub use time::{decode_time, encode_time, DeviceTime};
pub use user::UserRecord;

/// ASCII field up to the first NUL
pub(crate) fn nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
