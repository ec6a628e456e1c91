//! ZKTeco checksum algorithm
//!
//! 1. Zero the checksum field of the frame
//! 2. Sum the buffer as unsigned 16-bit little-endian words
//!    (a trailing odd byte is added as-is)
//! 3. Reduce the running sum modulo `USHRT_MAX` after every addition
//! 4. Return `USHRT_MAX - sum - 1`

use tracing::trace;

use crate::constants::USHRT_MAX;

/// Calculate the checksum over a raw inner frame
///
/// The caller is responsible for zeroing bytes 2..4 (the checksum field)
/// before calling this.
///
/// # Examples
///
/// ```
/// use zkclock_core::checksum;
///
/// // CMD_CONNECT, session 0, reply 0
/// let frame = [0xE8, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
/// assert_eq!(checksum::calculate(&frame), 0xFC16);
/// ```
pub fn calculate(buf: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    for chunk in buf.chunks(2) {
        let word = if chunk.len() == 2 {
            u16::from_le_bytes([chunk[0], chunk[1]]) as u32
        } else {
            // Odd trailing byte
            chunk[0] as u32
        };

        sum = (sum + word) % USHRT_MAX;
    }

    let checksum = (USHRT_MAX - sum - 1) as u16;

    trace!(
        len = buf.len(),
        checksum = format!("0x{:04X}", checksum),
        "Calculated checksum"
    );

    checksum
}

/// Calculate the checksum for header fields and payload
pub fn calculate_fields(command: u16, session_id: u16, reply_id: u16, payload: &[u8]) -> u16 {
    let mut buf = Vec::with_capacity(8 + payload.len());
    buf.extend_from_slice(&command.to_le_bytes());
    buf.extend_from_slice(&[0, 0]); // Checksum placeholder
    buf.extend_from_slice(&session_id.to_le_bytes());
    buf.extend_from_slice(&reply_id.to_le_bytes());
    buf.extend_from_slice(payload);

    calculate(&buf)
}

/// Verify checksum
pub fn verify(
    command: u16,
    session_id: u16,
    reply_id: u16,
    payload: &[u8],
    expected: u16,
) -> bool {
    calculate_fields(command, session_id, reply_id, payload) == expected
}
