//! Error types for zkclock-core

/// Result type alias for frame-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Buffer is too short to hold a frame
    #[error("Packet too short: expected at least {expected} bytes, got {actual} bytes")]
    PacketTooShort {
        expected: usize,
        actual: usize,
    },

    /// Checksum verification failed (strict mode only)
    #[error("Checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    ChecksumMismatch {
        expected: u16,
        received: u16,
    },

    /// Unknown command code
    #[error("Unknown command code: {0}")]
    UnknownCommand(u16),

    /// TCP frame does not start with the magic prefix
    #[error("Bad TCP magic: {0}")]
    BadMagic(String),

    /// Declared TCP frame length exceeds the safety cap
    #[error("Frame too large: {size} bytes (max: {max} bytes)")]
    FrameTooLarge {
        size: usize,
        max: usize,
    },
}
