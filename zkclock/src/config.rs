//! Connection settings

use std::time::Duration;

use zkclock_core::constants::{DEFAULT_TIMEOUT, MAX_CHUNK};
use zkclock_core::DEFAULT_PORT;
use zkclock_protocol::EngineConfig;
use zkclock_transport::{TcpTransport, UdpTransport};

/// Settings for one device
///
/// ```
/// use std::time::Duration;
/// use zkclock::DeviceConfig;
///
/// let config = DeviceConfig::new("192.168.1.201")
///     .with_timeout(Duration::from_secs(3))
///     .with_local_port(5200);
/// assert_eq!(config.port, 4370);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub ip: String,
    pub port: u16,
    /// Reply window for ordinary commands
    pub timeout: Duration,
    /// Local UDP port; 0 picks an ephemeral one
    pub local_port: u16,
    pub chunk_size: usize,
    pub chunk_timeout: Option<Duration>,
    pub strict_checksum: bool,
}

impl DeviceConfig {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            local_port: 0,
            chunk_size: MAX_CHUNK,
            chunk_timeout: None,
            strict_checksum: false,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_local_port(mut self, local_port: u16) -> Self {
        self.local_port = local_port;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Override the per-transport chunk inactivity window
    pub fn with_chunk_timeout(mut self, chunk_timeout: Duration) -> Self {
        self.chunk_timeout = Some(chunk_timeout);
        self
    }

    pub fn with_strict_checksum(mut self, strict: bool) -> Self {
        self.strict_checksum = strict;
        self
    }

    pub(crate) fn engine(&self) -> EngineConfig {
        let config = EngineConfig::default()
            .with_timeout(self.timeout)
            .with_chunk_size(self.chunk_size)
            .with_strict_checksum(self.strict_checksum);

        match self.chunk_timeout {
            Some(window) => config.with_chunk_timeout(window),
            None => config,
        }
    }

    pub(crate) fn tcp_transport(&self) -> TcpTransport {
        TcpTransport::new(self.ip.clone(), self.port).with_connect_timeout(self.timeout)
    }

    pub(crate) fn udp_transport(&self) -> UdpTransport {
        UdpTransport::new(self.ip.clone(), self.port)
            .with_local_port(self.local_port)
            .with_connect_timeout(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::new("10.0.0.2");
        assert_eq!(config.port, 4370);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.local_port, 0);
        assert_eq!(config.chunk_size, 65472);
        assert_eq!(config.engine(), EngineConfig::default());
    }

    #[test]
    fn test_engine_config_follows_builders() {
        let engine = DeviceConfig::new("10.0.0.2")
            .with_timeout(Duration::from_secs(1))
            .with_chunk_size(1024)
            .with_chunk_timeout(Duration::from_millis(500))
            .with_strict_checksum(true)
            .engine();

        assert_eq!(engine.timeout, Duration::from_secs(1));
        assert_eq!(engine.chunk_size, 1024);
        assert_eq!(engine.chunk_timeout, Some(Duration::from_millis(500)));
        assert!(engine.strict_checksum);
    }
}
