//! High-level error types

use std::io;

use zkclock_core::TransportKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No transport selected, or its socket has gone away
    #[error("Device {ip} is not connected (transport: {transport:?})")]
    NotConnected {
        transport: Option<TransportKind>,
        ip: String,
    },

    #[error("Failed to connect to {ip} via {transport}: {source}")]
    Connect {
        transport: TransportKind,
        ip: String,
        #[source]
        source: zkclock_protocol::Error,
    },

    #[error("Operation on {ip} via {transport} failed: {source}")]
    Operation {
        transport: TransportKind,
        ip: String,
        #[source]
        source: zkclock_protocol::Error,
    },
}

impl Error {
    /// Transport involved, if one was selected
    pub fn transport(&self) -> Option<TransportKind> {
        match self {
            Self::NotConnected { transport, .. } => *transport,
            Self::Connect { transport, .. } | Self::Operation { transport, .. } => Some(*transport),
        }
    }

    pub fn ip(&self) -> &str {
        match self {
            Self::NotConnected { ip, .. } | Self::Connect { ip, .. } | Self::Operation { ip, .. } => ip,
        }
    }

    /// OS-level error kind behind a failed socket call
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Connect { source, .. } | Self::Operation { source, .. } => source.io_kind(),
            Self::NotConnected { .. } => None,
        }
    }
}
