//! Protocol engine errors

use std::io;

use zkclock_core::Command;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] zkclock_transport::Error),

    #[error("Core protocol error: {0}")]
    Core(#[from] zkclock_core::Error),

    #[error("Record error: {0}")]
    Types(#[from] zkclock_types::Error),

    /// The request could not be written in time
    #[error("Timed out writing {0}")]
    WriteTimeout(Command),

    /// No reply arrived in time
    #[error("Timed out waiting for reply to {0}")]
    ResponseTimeout(Command),

    /// A chunked transfer went quiet
    #[error("Timed out receiving data: {remaining} chunks remain")]
    ChunkTimeout { remaining: usize },

    /// The socket closed while a reply or chunk was outstanding
    #[error("Socket is disconnected unexpectedly")]
    Disconnected,

    /// Reply command not valid at this point of the exchange
    #[error("Unhandled command in reply: {0}")]
    UnhandledCommand(&'static str),

    #[error("Reply too short: expected {expected} payload bytes, got {actual}")]
    ShortReply { expected: usize, actual: usize },
}

impl Error {
    /// OS-level error kind, when the failure came from a socket call
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Transport(e) => e.io_kind(),
            _ => None,
        }
    }

    /// Whether the failure was a deadline expiring
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::WriteTimeout(_)
                | Self::ResponseTimeout(_)
                | Self::ChunkTimeout { .. }
                | Self::Transport(zkclock_transport::Error::ConnectionTimeout)
        )
    }
}
