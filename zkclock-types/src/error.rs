//! Error types for record decoding

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fixed-layout record shorter than its layout
    #[error("{record} record too short: expected {expected} bytes, got {actual} bytes")]
    RecordTooShort {
        record: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Timestamp fields do not form a valid calendar time
    #[error("Invalid device time: {0}")]
    InvalidTime(String),
}

pub(crate) fn ensure_len(record: &'static str, buf: &[u8], expected: usize) -> Result<()> {
    if buf.len() < expected {
        return Err(Error::RecordTooShort {
            record,
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}
